//! Agent runtime: collaborators and per-call orchestration.
//!
//! This crate is where a call comes alive:
//! - Turns transcripts into structured intents (`recognizer`, `llm`)
//! - Performs email operations under scoped per-caller credentials (`executor`, `mailbox`)
//! - Runs one conversation manager task per call (`manager`)
//! - Supervises call lifecycles (`orchestrator`)
//!
//! # Architecture
//!
//! ```text
//! VoiceChannel ─► ConversationManager ─► TurnEngine (pure)
//!                     │        │
//!                     │        ├─► IntentRecognizer (rules | LLM + rules)
//!                     │        └─► EmailExecutor ─► MailBackend
//!                     ▼
//!                 speak / cancel_speech
//! ```
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It never decides whether an email is
//! sent; irreversible operations always pass through an explicit spoken
//! confirmation decided by the turn engine.

pub mod audit;
pub mod executor;
pub mod llm;
pub mod mailbox;
pub mod manager;
pub mod orchestrator;
pub mod recognizer;

pub use audit::TracingAuditSink;
pub use executor::{
    AccountCredentials, CredentialVault, EmailExecutor, ExecutionContext, MailBackend,
    MailboxExecutor, SessionLease,
};
pub use llm::{build_recognizer, LlmClient, LlmError, LlmIntentRecognizer};
pub use mailbox::InMemoryMailbox;
pub use manager::{CallEnd, CallReport, Collaborators, ConversationManager, ManagerHandle, ManagerSettings};
pub use orchestrator::{ActiveCallInfo, CallCompletion, Orchestrator, OrchestratorError};
pub use recognizer::{IntentRecognizer, LayeredRecognizer, RecognitionRequest, RuleBasedRecognizer};
