pub mod audit;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod prompts;
pub mod replies;
pub mod slots;
pub mod turns;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
pub use conversation::{CallId, CallerId, ConversationState, ShortTermMemory, Speaker, Turn};
pub use domain::email::{Email, EmailParts, ExecutionOutput, MessageId, ThreadId};
pub use domain::intent::{Intent, IntentKind, SlotName, SlotValue};
pub use errors::{
    ApplicationError, DomainError, ExecutionError, FailureClass, InterfaceError, RecognitionError,
};
pub use replies::{KeywordReplyClassifier, ReplyClass, ReplyClassifier, ReplyPhrases};
pub use turns::{
    EmailTurnFlow, TransitionOutcome, TurnContext, TurnEffect, TurnEngine, TurnEvent, TurnPhase,
    TurnPolicy, TurnState,
};
