use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::conversation::{ShortTermMemory, Speaker};
use crate::domain::intent::{Intent, IntentKind, SlotName, SlotValue};
use crate::prompts;
use crate::replies::ReplyClass;
use crate::turns::states::{
    SpeechPriority, TransitionOutcome, TurnContext, TurnEffect, TurnEvent, TurnPhase, TurnState,
};

pub trait TurnDefinition {
    fn initial_state(&self) -> TurnState;
    fn transition(
        &self,
        current: &TurnState,
        event: &TurnEvent,
        context: &TurnContext<'_>,
    ) -> Result<TransitionOutcome, TurnTransitionError>;
}

/// The listen, recognize, fill, confirm, execute, respond cycle.
#[derive(Clone, Debug, Default)]
pub struct EmailTurnFlow;

impl TurnDefinition for EmailTurnFlow {
    fn initial_state(&self) -> TurnState {
        TurnState::Idle
    }

    fn transition(
        &self,
        current: &TurnState,
        event: &TurnEvent,
        context: &TurnContext<'_>,
    ) -> Result<TransitionOutcome, TurnTransitionError> {
        transition_turn(current, event, context)
    }
}

pub struct TurnEngine<F> {
    flow: F,
}

impl<F> TurnEngine<F>
where
    F: TurnDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> TurnState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &TurnState,
        event: &TurnEvent,
        context: &TurnContext<'_>,
    ) -> Result<TransitionOutcome, TurnTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &TurnState,
        event: &TurnEvent,
        context: &TurnContext<'_>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, TurnTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "turn.transition_applied",
                        AuditCategory::Turn,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.phase().as_str())
                    .with_metadata("to", outcome.to.phase().as_str())
                    .with_metadata("event", outcome.event.name())
                    .with_metadata("effects", outcome.effects.len().to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "turn.transition_rejected",
                        AuditCategory::Turn,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for TurnEngine<EmailTurnFlow> {
    fn default() -> Self {
        Self::new(EmailTurnFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnTransitionError {
    #[error("invalid transition from {state:?} using event {event}")]
    InvalidTransition { state: TurnPhase, event: &'static str },
    #[error("{state:?} requires a pending intent but none is held")]
    MissingPendingIntent { state: TurnPhase },
}

fn transition_turn(
    current: &TurnState,
    event: &TurnEvent,
    context: &TurnContext<'_>,
) -> Result<TransitionOutcome, TurnTransitionError> {
    use TurnEffect::{
        CancelSpeech, ClearPending, ForgetLastExecuted, RecordExecuted, Recognize, Remember,
    };
    use TurnEvent::{
        ExecutionFailed, ExecutionSucceeded, FinalUtterance, RecognitionFailed, Recognized,
        SpeechFinished, UtteranceStarted,
    };
    use TurnState::{Confirming, Executing, Idle, Recognizing, Responding, SlotFilling};

    let mut effects = Vec::new();
    let to = match (current, event) {
        (Executing { intent, .. }, UtteranceStarted) => {
            Executing { intent: intent.clone(), interrupted: true }
        }
        (Responding, UtteranceStarted) => {
            effects.push(CancelSpeech);
            Recognizing { in_flight: false }
        }
        (Recognizing { .. }, UtteranceStarted) => current.clone(),
        (Idle | SlotFilling { .. } | Confirming { .. }, UtteranceStarted) => {
            if context.speech_active {
                effects.push(CancelSpeech);
            }
            current.clone()
        }

        (Idle | Recognizing { in_flight: false }, FinalUtterance { text, .. }) => {
            effects.push(Recognize { text: text.clone() });
            Recognizing { in_flight: true }
        }
        (Responding, FinalUtterance { text, .. }) => {
            effects.push(CancelSpeech);
            effects.push(Recognize { text: text.clone() });
            Recognizing { in_flight: true }
        }
        // A dictated answer may itself start with "cancel" or "stop".
        (SlotFilling { .. }, FinalUtterance { text, reply: ReplyClass::Cancel }) => {
            let pending = require_pending(current, context)?;
            record_caller(&mut effects, text, None);
            effects.push(ClearPending);
            say(&mut effects, prompts::cancelled(pending.kind()), SpeechPriority::Normal);
            Idle
        }
        (SlotFilling { .. }, FinalUtterance { text, .. }) => {
            effects.push(Recognize { text: text.clone() });
            Recognizing { in_flight: true }
        }
        (Confirming { attempts }, FinalUtterance { text, reply }) => {
            let pending = require_pending(current, context)?;
            confirm(pending, *attempts, text, *reply, context, &mut effects)
        }

        (Recognizing { in_flight: true }, Recognized { text, intent }) => {
            route(text, intent, context, &mut effects)
        }
        (Recognizing { in_flight: true }, RecognitionFailed { .. }) => {
            // Conversation state stays untouched: no turn, no pending change.
            effects.push(TurnEffect::Speak {
                text: prompts::RECOGNITION_REPROMPT.to_owned(),
                priority: SpeechPriority::Normal,
            });
            match context.pending.and_then(Intent::next_missing_slot) {
                Some(awaiting) => SlotFilling { awaiting },
                None => Idle,
            }
        }

        (Executing { intent, interrupted }, ExecutionSucceeded { output }) => {
            effects.push(RecordExecuted { intent: intent.clone() });
            let source =
                intent.slot(SlotName::MessageRef).and_then(SlotValue::as_reference).cloned();
            effects.push(Remember { output: output.clone(), source });
            if *interrupted {
                Recognizing { in_flight: false }
            } else {
                say(&mut effects, prompts::execution_summary(intent, output), SpeechPriority::Normal);
                Responding
            }
        }
        (Executing { intent, .. }, ExecutionFailed { error }) => {
            effects.push(ForgetLastExecuted);
            say(&mut effects, prompts::execution_failure(intent.kind(), error), SpeechPriority::High);
            Responding
        }

        (Responding, SpeechFinished) => Idle,
        (_, SpeechFinished) => current.clone(),

        _ => {
            return Err(TurnTransitionError::InvalidTransition {
                state: current.phase(),
                event: event.name(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), effects })
}

fn confirm(
    pending: &Intent,
    attempts: u8,
    text: &str,
    reply: ReplyClass,
    context: &TurnContext<'_>,
    effects: &mut Vec<TurnEffect>,
) -> TurnState {
    record_caller(effects, text, None);
    match reply {
        ReplyClass::Affirmative => {
            effects.push(TurnEffect::ClearPending);
            effects.push(TurnEffect::Execute { intent: pending.clone() });
            TurnState::Executing { intent: pending.clone(), interrupted: false }
        }
        ReplyClass::Negative | ReplyClass::Cancel | ReplyClass::LeadingCancel => {
            effects.push(TurnEffect::ClearPending);
            say(effects, prompts::declined(pending.kind()), SpeechPriority::Normal);
            TurnState::Idle
        }
        ReplyClass::Unclear => {
            let attempts = attempts.saturating_add(1);
            if attempts >= context.policy.max_confirmation_attempts {
                effects.push(TurnEffect::ClearPending);
                say(effects, prompts::confirmation_abandoned(pending.kind()), SpeechPriority::High);
                TurnState::Idle
            } else {
                say(
                    effects,
                    prompts::confirmation_reprompt(pending, context.memory),
                    SpeechPriority::Normal,
                );
                TurnState::Confirming { attempts }
            }
        }
    }
}

/// Decides where a recognized utterance leads. With a pending intent the
/// utterance only ever fills the slot that was asked for.
fn route(
    text: &str,
    recognized: &Intent,
    context: &TurnContext<'_>,
    effects: &mut Vec<TurnEffect>,
) -> TurnState {
    record_caller(effects, text, Some(recognized.clone()));

    let candidate = match context.pending {
        Some(pending) => match pending.next_missing_slot() {
            Some(awaiting) => pending.clone().absorb(recognized, awaiting),
            None => pending.clone(),
        },
        None if recognized.kind() == IntentKind::Unknown
            || recognized.confidence() < context.policy.min_confidence =>
        {
            say(effects, prompts::clarification(), SpeechPriority::Normal);
            return TurnState::Idle;
        }
        None => recognized.clone(),
    };
    let candidate = resolve_reference(candidate, context.memory);

    if let Some(awaiting) = candidate.next_missing_slot() {
        let prompt = prompts::ask_for_missing(&candidate, awaiting);
        effects.push(TurnEffect::SetPending { intent: candidate });
        say(effects, prompt, SpeechPriority::Normal);
        return TurnState::SlotFilling { awaiting };
    }

    if candidate.kind().is_irreversible() {
        let prompt = prompts::confirmation(&candidate, context.memory);
        effects.push(TurnEffect::SetPending { intent: candidate });
        say(effects, prompt, SpeechPriority::Normal);
        return TurnState::Confirming { attempts: 0 };
    }

    if context.pending.is_some() {
        effects.push(TurnEffect::ClearPending);
    }
    effects.push(TurnEffect::Execute { intent: candidate.clone() });
    TurnState::Executing { intent: candidate, interrupted: false }
}

/// Turns a spoken message reference into a concrete id, or drops it so the
/// caller is asked again.
fn resolve_reference(intent: Intent, memory: &ShortTermMemory) -> Intent {
    let Some(phrase) = intent.slot_text(SlotName::MessageRef).map(ToOwned::to_owned) else {
        return intent;
    };
    match memory.resolve(&phrase) {
        Some(id) => intent.with_slot(SlotName::MessageRef, SlotValue::Reference(id)),
        None => intent.without_slot(SlotName::MessageRef),
    }
}

fn require_pending<'a>(
    current: &TurnState,
    context: &TurnContext<'a>,
) -> Result<&'a Intent, TurnTransitionError> {
    context.pending.ok_or(TurnTransitionError::MissingPendingIntent { state: current.phase() })
}

fn record_caller(effects: &mut Vec<TurnEffect>, text: &str, intent: Option<Intent>) {
    effects.push(TurnEffect::RecordTurn { speaker: Speaker::Caller, text: text.to_owned(), intent });
}

fn say(effects: &mut Vec<TurnEffect>, text: String, priority: SpeechPriority) {
    effects.push(TurnEffect::RecordTurn { speaker: Speaker::Assistant, text: text.clone(), intent: None });
    effects.push(TurnEffect::Speak { text, priority });
}
