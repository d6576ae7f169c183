use std::fmt;

use serde::{Deserialize, Serialize};

use crate::conversation::{ShortTermMemory, Speaker};
use crate::domain::email::{ExecutionOutput, MessageId};
use crate::domain::intent::{Intent, SlotName};
use crate::errors::{ExecutionError, RecognitionError};
use crate::replies::ReplyClass;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    /// `in_flight` is false right after a barge-in, while the new utterance is
    /// still being spoken, and true once the recognizer has been called.
    Recognizing { in_flight: bool },
    SlotFilling { awaiting: SlotName },
    Confirming { attempts: u8 },
    /// `interrupted` is set when the caller starts talking while the executor
    /// call is outstanding.
    Executing { intent: Intent, interrupted: bool },
    Responding,
}

impl TurnState {
    pub fn phase(&self) -> TurnPhase {
        match self {
            Self::Idle => TurnPhase::Idle,
            Self::Recognizing { .. } => TurnPhase::Recognizing,
            Self::SlotFilling { .. } => TurnPhase::SlotFilling,
            Self::Confirming { .. } => TurnPhase::Confirming,
            Self::Executing { .. } => TurnPhase::Executing,
            Self::Responding => TurnPhase::Responding,
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phase().as_str())
    }
}

/// Payload-free view of [`TurnState`], used in logs, audit metadata and assertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Recognizing,
    SlotFilling,
    Confirming,
    Executing,
    Responding,
}

impl TurnPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recognizing => "recognizing",
            Self::SlotFilling => "slot_filling",
            Self::Confirming => "confirming",
            Self::Executing => "executing",
            Self::Responding => "responding",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TurnEvent {
    UtteranceStarted,
    /// A completed utterance. `reply` is the classifier's reading of it, which
    /// only matters while confirming or slot filling.
    FinalUtterance { text: String, reply: ReplyClass },
    Recognized { text: String, intent: Intent },
    RecognitionFailed { error: RecognitionError },
    ExecutionSucceeded { output: ExecutionOutput },
    ExecutionFailed { error: ExecutionError },
    SpeechFinished,
}

impl TurnEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UtteranceStarted => "utterance_started",
            Self::FinalUtterance { .. } => "final_utterance",
            Self::Recognized { .. } => "recognized",
            Self::RecognitionFailed { .. } => "recognition_failed",
            Self::ExecutionSucceeded { .. } => "execution_succeeded",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::SpeechFinished => "speech_finished",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechPriority {
    Low,
    Normal,
    High,
}

/// Side effects requested by a transition. The conversation manager performs
/// them in order; the transition itself never touches I/O.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnEffect {
    Recognize { text: String },
    RecordTurn { speaker: Speaker, text: String, intent: Option<Intent> },
    SetPending { intent: Intent },
    ClearPending,
    Execute { intent: Intent },
    RecordExecuted { intent: Intent },
    ForgetLastExecuted,
    /// `source` is the message a reply, forward or delete acted on.
    Remember { output: ExecutionOutput, source: Option<MessageId> },
    Speak { text: String, priority: SpeechPriority },
    CancelSpeech,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurnPolicy {
    pub max_confirmation_attempts: u8,
    pub min_confidence: f32,
}

impl Default for TurnPolicy {
    fn default() -> Self {
        Self { max_confirmation_attempts: 2, min_confidence: 0.5 }
    }
}

/// Read-only view of the call handed to the transition function.
#[derive(Clone, Copy, Debug)]
pub struct TurnContext<'a> {
    pub pending: Option<&'a Intent>,
    pub memory: &'a ShortTermMemory,
    pub speech_active: bool,
    pub policy: TurnPolicy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionOutcome {
    pub from: TurnState,
    pub to: TurnState,
    pub event: TurnEvent,
    pub effects: Vec<TurnEffect>,
}

impl TransitionOutcome {
    pub fn spoken(&self) -> Vec<&str> {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                TurnEffect::Speak { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}
