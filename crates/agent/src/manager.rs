//! Per-call conversation manager.
//!
//! One manager task owns one call: its [`TurnState`] and its
//! [`ConversationState`]. Everything that happens to the call, voice events,
//! recognizer answers, executor answers, playback acknowledgements, arrives
//! as a message on a single inbox and is processed in order. The turn engine
//! decides; this module performs the effects it returns.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mailvoice_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use mailvoice_core::config::ConversationConfig;
use mailvoice_core::conversation::{CallId, CallerId, ConversationState, Speaker};
use mailvoice_core::domain::email::ExecutionOutput;
use mailvoice_core::domain::intent::{Intent, IntentKind};
use mailvoice_core::errors::{ExecutionError, FailureClass, RecognitionError};
use mailvoice_core::prompts;
use mailvoice_core::replies::ReplyClassifier;
use mailvoice_core::turns::{
    EmailTurnFlow, SpeechPriority, TurnContext, TurnEffect, TurnEngine, TurnEvent, TurnPolicy,
    TurnState,
};
use mailvoice_voice::{ChannelError, SpeechAck, SpeechId, SpeechRequest, VoiceChannel, VoiceEvent};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::executor::{EmailExecutor, ExecutionContext};
use crate::recognizer::{IntentRecognizer, RecognitionRequest};

#[derive(Clone, Debug, PartialEq)]
pub struct ManagerSettings {
    pub recognizer_timeout: Duration,
    pub executor_timeout: Duration,
    pub history_window: usize,
    pub greeting: Option<String>,
    pub policy: TurnPolicy,
}

impl ManagerSettings {
    pub fn from_config(config: &ConversationConfig) -> Self {
        let greeting = config.greeting.trim();
        Self {
            recognizer_timeout: Duration::from_millis(config.recognizer_timeout_ms),
            executor_timeout: Duration::from_millis(config.executor_timeout_ms),
            history_window: config.history_window,
            greeting: (!greeting.is_empty()).then(|| greeting.to_owned()),
            policy: config.turn_policy(),
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            recognizer_timeout: Duration::from_millis(4_000),
            executor_timeout: Duration::from_millis(15_000),
            history_window: 6,
            greeting: Some(prompts::DEFAULT_GREETING.to_owned()),
            policy: TurnPolicy::default(),
        }
    }
}

/// Everything a manager talks to besides the voice channel. Shared by all calls.
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn IntentRecognizer>,
    pub executor: Arc<dyn EmailExecutor>,
    pub replies: Arc<dyn ReplyClassifier>,
    pub audit: Arc<dyn AuditSink>,
}

/// Why a call stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallEnd {
    /// The caller hung up.
    Hangup,
    /// The channel went away without saying goodbye.
    ChannelClosed,
    TransportFailed(ChannelError),
    /// `end_call` or server shutdown.
    Terminated,
}

impl CallEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hangup => "hangup",
            Self::ChannelClosed => "channel_closed",
            Self::TransportFailed(_) => "transport_failed",
            Self::Terminated => "terminated",
        }
    }

    pub fn is_abnormal(&self) -> bool {
        matches!(self, Self::ChannelClosed | Self::TransportFailed(_))
    }
}

/// Final account of a call, produced when its manager stops.
#[derive(Clone, Debug)]
pub struct CallReport {
    pub call_id: CallId,
    pub end: CallEnd,
    pub final_state: TurnState,
    pub conversation: ConversationState,
    /// Irreversible operation still running when the call ended. Whether it
    /// landed is unknown to the caller.
    pub unknown_side_effect: Option<IntentKind>,
}

enum Inbound {
    Voice(VoiceEvent),
    ChannelFailed(ChannelError),
    ChannelClosed,
    Recognized { text: String, result: Result<Intent, RecognitionError> },
    Executed { result: Result<ExecutionOutput, ExecutionError> },
    SpeechDone { id: SpeechId, result: Result<SpeechAck, ChannelError> },
    Terminate,
}

/// Lets the orchestrator stop a running manager.
#[derive(Clone)]
pub struct ManagerHandle {
    call_id: CallId,
    inbox: mpsc::UnboundedSender<Inbound>,
}

impl ManagerHandle {
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Returns false when the manager has already stopped.
    pub fn terminate(&self) -> bool {
        self.inbox.send(Inbound::Terminate).is_ok()
    }
}

struct InFlight {
    kind: IntentKind,
    correlation_id: String,
}

pub struct ConversationManager {
    call_id: CallId,
    caller: CallerId,
    channel: Arc<dyn VoiceChannel>,
    collaborators: Collaborators,
    settings: ManagerSettings,
    engine: TurnEngine<EmailTurnFlow>,
    state: TurnState,
    conversation: ConversationState,
    audit_context: AuditContext,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    speech_tx: mpsc::UnboundedSender<SpeechRequest>,
    speech_rx: Option<mpsc::UnboundedReceiver<SpeechRequest>>,
    cancelled_through: Arc<AtomicU64>,
    last_speech_id: u64,
    /// Latest speech request not yet acknowledged. The only source of
    /// `speech_active` for the turn engine.
    outstanding_speech: Option<SpeechId>,
    partial: String,
    backlog: VecDeque<String>,
    recognition: Option<JoinHandle<()>>,
    in_flight: Option<InFlight>,
}

impl ConversationManager {
    pub fn new(
        call_id: CallId,
        caller: CallerId,
        channel: Arc<dyn VoiceChannel>,
        collaborators: Collaborators,
        settings: ManagerSettings,
    ) -> Self {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (speech_tx, speech_rx) = mpsc::unbounded_channel();
        let engine = TurnEngine::default();
        let state = engine.initial_state();
        let audit_context =
            AuditContext::new(Some(call_id.clone()), Uuid::new_v4().to_string(), "conversation-manager");

        Self {
            conversation: ConversationState::new(call_id.clone()),
            call_id,
            caller,
            channel,
            collaborators,
            settings,
            engine,
            state,
            audit_context,
            inbox_tx,
            inbox,
            speech_tx,
            speech_rx: Some(speech_rx),
            cancelled_through: Arc::new(AtomicU64::new(0)),
            last_speech_id: 0,
            outstanding_speech: None,
            partial: String::new(),
            backlog: VecDeque::new(),
            recognition: None,
            in_flight: None,
        }
    }

    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle { call_id: self.call_id.clone(), inbox: self.inbox_tx.clone() }
    }

    /// Drives the call until it ends and reports what happened.
    pub async fn run(mut self) -> CallReport {
        let reader = tokio::spawn(read_events(Arc::clone(&self.channel), self.inbox_tx.clone()));
        let speaker = self.speech_rx.take().map(|queue| {
            tokio::spawn(play_speech(
                Arc::clone(&self.channel),
                queue,
                Arc::clone(&self.cancelled_through),
                self.inbox_tx.clone(),
            ))
        });

        info!(
            event_name = "call.started",
            call_id = %self.call_id,
            caller = %self.caller,
            correlation_id = %self.audit_context.correlation_id,
            "call started"
        );
        self.audit(AuditEvent::new(
            &self.audit_context,
            "call.started",
            AuditCategory::Lifecycle,
            AuditOutcome::Success,
        ));

        let end = self.event_loop().await;

        reader.abort();
        if let Some(speaker) = speaker {
            speaker.abort();
        }
        if let Some(recognition) = self.recognition.take() {
            recognition.abort();
        }
        self.finish(end)
    }

    async fn event_loop(&mut self) -> CallEnd {
        self.greet();

        while let Some(message) = self.inbox.recv().await {
            let step = match message {
                Inbound::Voice(event) => self.on_voice_event(event).await,
                Inbound::ChannelFailed(error) => Err(CallEnd::TransportFailed(error)),
                Inbound::ChannelClosed => Err(CallEnd::ChannelClosed),
                Inbound::Recognized { text, result } => self.on_recognized(text, result).await,
                Inbound::Executed { result } => self.on_executed(result).await,
                Inbound::SpeechDone { id, result } => self.on_speech_done(id, result).await,
                Inbound::Terminate => Err(CallEnd::Terminated),
            };
            if let Err(end) = step {
                return end;
            }
            if let Err(end) = self.drain_backlog().await {
                return end;
            }
        }

        CallEnd::ChannelClosed
    }

    fn greet(&mut self) {
        if let Some(greeting) = self.settings.greeting.clone() {
            self.conversation.append_turn(Speaker::Assistant, greeting.clone(), None);
            self.queue_speech(greeting, SpeechPriority::Normal);
        }
    }

    async fn on_voice_event(&mut self, event: VoiceEvent) -> Result<(), CallEnd> {
        debug!(call_id = %self.call_id, event = event.event_type(), state = %self.state, "voice event");
        match event {
            VoiceEvent::UtteranceStarted => self.fire(TurnEvent::UtteranceStarted).await,
            VoiceEvent::UtterancePartial { text } => {
                // Partials are running hypotheses; only the latest one matters.
                self.partial = text;
                Ok(())
            }
            VoiceEvent::UtteranceFinal { text } => {
                let buffered = std::mem::take(&mut self.partial);
                let text = if text.trim().is_empty() { buffered } else { text };
                let text = text.trim().to_owned();
                if text.is_empty() {
                    debug!(call_id = %self.call_id, "ignoring empty utterance");
                    return Ok(());
                }

                // A live utterance during playback is a barge-in; queued ones wait.
                if self.backlog.is_empty() && self.accepts_live_utterance() {
                    self.fire_utterance(text).await
                } else {
                    self.backlog.push_back(text);
                    Ok(())
                }
            }
            VoiceEvent::CallEnded => Err(CallEnd::Hangup),
        }
    }

    async fn on_recognized(
        &mut self,
        text: String,
        result: Result<Intent, RecognitionError>,
    ) -> Result<(), CallEnd> {
        self.recognition = None;
        match result {
            Ok(intent) => {
                if !intent.ambiguities().is_empty() {
                    info!(
                        event_name = "recognition.ambiguous",
                        call_id = %self.call_id,
                        failure_class = FailureClass::AmbiguousIntent.as_str(),
                        kind = intent.kind().label(),
                        "recognized intent has competing slot values"
                    );
                }
                self.audit(
                    AuditEvent::new(
                        &self.audit_context,
                        "recognition.completed",
                        AuditCategory::Recognition,
                        AuditOutcome::Success,
                    )
                    .with_metadata("kind", intent.kind().label())
                    .with_metadata("confidence", format!("{:.2}", intent.confidence())),
                );
                self.fire(TurnEvent::Recognized { text, intent }).await
            }
            Err(error) => {
                warn!(
                    event_name = "recognition.failed",
                    call_id = %self.call_id,
                    failure_class = FailureClass::RecognitionFailed.as_str(),
                    error = %error,
                    "recognition failed, re-prompting"
                );
                self.audit(
                    AuditEvent::new(
                        &self.audit_context,
                        "recognition.failed",
                        AuditCategory::Recognition,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                self.fire(TurnEvent::RecognitionFailed { error }).await
            }
        }
    }

    async fn on_executed(
        &mut self,
        result: Result<ExecutionOutput, ExecutionError>,
    ) -> Result<(), CallEnd> {
        self.in_flight = None;
        match result {
            Ok(output) => self.fire(TurnEvent::ExecutionSucceeded { output }).await,
            Err(error) => {
                warn!(
                    event_name = "executor.failed",
                    call_id = %self.call_id,
                    failure_class = FailureClass::ExecutionFailed.as_str(),
                    outcome_unknown = error.outcome_unknown(),
                    error = %error,
                    "email operation failed"
                );
                self.fire(TurnEvent::ExecutionFailed { error }).await
            }
        }
    }

    async fn on_speech_done(
        &mut self,
        id: SpeechId,
        result: Result<SpeechAck, ChannelError>,
    ) -> Result<(), CallEnd> {
        let ack = match result {
            Ok(ack) => ack,
            Err(ChannelError::Closed) => return Err(CallEnd::ChannelClosed),
            Err(error) => return Err(CallEnd::TransportFailed(error)),
        };
        debug!(call_id = %self.call_id, speech_id = %id, ?ack, "speech acknowledged");

        if self.outstanding_speech != Some(id) {
            return Ok(());
        }
        self.outstanding_speech = None;
        self.fire(TurnEvent::SpeechFinished).await
    }

    async fn drain_backlog(&mut self) -> Result<(), CallEnd> {
        while self.accepts_queued_utterance() {
            let Some(text) = self.backlog.pop_front() else {
                break;
            };
            self.fire_utterance(text).await?;
        }
        Ok(())
    }

    fn accepts_live_utterance(&self) -> bool {
        !matches!(self.state, TurnState::Recognizing { in_flight: true } | TurnState::Executing { .. })
    }

    /// Queued utterances also wait for a response to finish playing.
    fn accepts_queued_utterance(&self) -> bool {
        self.accepts_live_utterance() && self.state != TurnState::Responding
    }

    async fn fire_utterance(&mut self, text: String) -> Result<(), CallEnd> {
        let reply = self.collaborators.replies.classify(&text);
        self.fire(TurnEvent::FinalUtterance { text, reply }).await
    }

    async fn fire(&mut self, event: TurnEvent) -> Result<(), CallEnd> {
        let context = TurnContext {
            pending: self.conversation.pending_intent(),
            memory: self.conversation.memory(),
            speech_active: self.outstanding_speech.is_some(),
            policy: self.settings.policy,
        };
        let outcome = match self.engine.apply_with_audit(
            &self.state,
            &event,
            &context,
            self.collaborators.audit.as_ref(),
            &self.audit_context,
        ) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    event_name = "turn.transition_rejected",
                    call_id = %self.call_id,
                    state = %self.state,
                    event = event.name(),
                    error = %error,
                    "ignoring event"
                );
                return Ok(());
            }
        };

        debug!(
            event_name = "turn.transition",
            call_id = %self.call_id,
            from = %outcome.from,
            to = %outcome.to,
            event = outcome.event.name(),
            effects = outcome.effects.len(),
            "turn transition"
        );
        self.state = outcome.to;
        for effect in outcome.effects {
            self.perform(effect).await?;
        }
        Ok(())
    }

    async fn perform(&mut self, effect: TurnEffect) -> Result<(), CallEnd> {
        match effect {
            TurnEffect::Recognize { text } => self.start_recognition(text),
            TurnEffect::RecordTurn { speaker, text, intent } => {
                self.conversation.append_turn(speaker, text, intent);
            }
            TurnEffect::SetPending { intent } => self.conversation.set_pending_intent(intent),
            TurnEffect::ClearPending => {
                self.conversation.clear_pending_intent();
            }
            TurnEffect::Execute { intent } => self.start_execution(intent),
            TurnEffect::RecordExecuted { intent } => self.conversation.record_executed(intent),
            TurnEffect::ForgetLastExecuted => self.conversation.clear_last_executed(),
            TurnEffect::Remember { output, source } => {
                self.conversation.remember_result(&output, source.as_ref());
            }
            TurnEffect::Speak { text, priority } => self.queue_speech(text, priority),
            TurnEffect::CancelSpeech => self.cancel_speech().await?,
        }
        Ok(())
    }

    fn start_recognition(&mut self, text: String) {
        let request = RecognitionRequest::new(text)
            .with_pending(self.conversation.pending_intent().cloned())
            .with_recent_turns(self.conversation.recent_turns(self.settings.history_window).to_vec());
        let recognizer = Arc::clone(&self.collaborators.recognizer);
        let inbox = self.inbox_tx.clone();
        let limit = self.settings.recognizer_timeout;

        self.recognition = Some(tokio::spawn(async move {
            let result = match timeout(limit, recognizer.recognize(&request)).await {
                Ok(result) => result,
                Err(_) => Err(RecognitionError::Timeout { after_ms: millis(limit) }),
            };
            let _ = inbox.send(Inbound::Recognized { text: request.text, result });
        }));
    }

    /// The executor call runs in its own task and is never cancelled; only
    /// the wait for it is bounded.
    fn start_execution(&mut self, intent: Intent) {
        let kind = intent.kind();
        let correlation_id = Uuid::new_v4().to_string();
        let context = ExecutionContext {
            call_id: self.call_id.clone(),
            caller: self.caller.clone(),
            correlation_id: correlation_id.clone(),
        };
        let audit_context =
            AuditContext::new(Some(self.call_id.clone()), correlation_id.clone(), "email-executor");
        let executor = Arc::clone(&self.collaborators.executor);
        let audit = Arc::clone(&self.collaborators.audit);
        let inbox = self.inbox_tx.clone();
        let limit = self.settings.executor_timeout;

        info!(
            event_name = "executor.started",
            call_id = %self.call_id,
            correlation_id = %correlation_id,
            kind = kind.label(),
            "email operation started"
        );
        self.in_flight = Some(InFlight { kind, correlation_id });

        let mut work = tokio::spawn(async move { executor.execute(&intent, &context).await });
        tokio::spawn(async move {
            match timeout(limit, &mut work).await {
                Ok(joined) => {
                    let result = flatten(joined);
                    record_side_effect(audit.as_ref(), &audit_context, kind, &result, false);
                    let _ = inbox.send(Inbound::Executed { result });
                }
                Err(_) => {
                    let error = ExecutionError::Timeout { after_ms: millis(limit) };
                    if kind.is_irreversible() {
                        warn!(
                            event_name = "executor.side_effect_unknown",
                            call_id = ?audit_context.call_id,
                            correlation_id = %audit_context.correlation_id,
                            kind = kind.label(),
                            "executor timed out; the operation may still land"
                        );
                        audit.emit(
                            AuditEvent::new(
                                &audit_context,
                                "executor.side_effect_unknown",
                                AuditCategory::Execution,
                                AuditOutcome::Failed,
                            )
                            .with_metadata("kind", kind.label())
                            .with_metadata("reason", "timeout"),
                        );
                    }
                    let _ = inbox.send(Inbound::Executed { result: Err(error) });

                    let late = flatten(work.await);
                    record_side_effect(audit.as_ref(), &audit_context, kind, &late, true);
                }
            }
        });
    }

    fn queue_speech(&mut self, text: String, priority: SpeechPriority) {
        self.last_speech_id += 1;
        let id = SpeechId(self.last_speech_id);
        self.outstanding_speech = Some(id);
        if self.speech_tx.send(SpeechRequest { id, text, priority }).is_err() {
            // Playback task is gone; the reader reports why.
            self.outstanding_speech = None;
        }
    }

    async fn cancel_speech(&mut self) -> Result<(), CallEnd> {
        self.cancelled_through.store(self.last_speech_id, Ordering::SeqCst);
        self.outstanding_speech = None;
        debug!(call_id = %self.call_id, through = self.last_speech_id, "cancelling speech");
        match self.channel.cancel_speech().await {
            Ok(()) => Ok(()),
            Err(ChannelError::Closed) => Err(CallEnd::ChannelClosed),
            Err(error) => Err(CallEnd::TransportFailed(error)),
        }
    }

    fn finish(mut self, end: CallEnd) -> CallReport {
        let mut unknown_side_effect = None;
        if let Some(in_flight) = self.in_flight.take() {
            if in_flight.kind.is_irreversible() {
                warn!(
                    event_name = "executor.side_effect_unknown",
                    call_id = %self.call_id,
                    correlation_id = %in_flight.correlation_id,
                    kind = in_flight.kind.label(),
                    end = end.as_str(),
                    failure_class = FailureClass::UnrecoverableSession.as_str(),
                    "call ended while an email operation was in flight; its outcome is unknown"
                );
                self.audit(
                    AuditEvent::new(
                        &self.audit_context,
                        "executor.side_effect_unknown",
                        AuditCategory::Execution,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("kind", in_flight.kind.label())
                    .with_metadata("reason", end.as_str())
                    .with_metadata("execution_correlation_id", in_flight.correlation_id.clone()),
                );
                unknown_side_effect = Some(in_flight.kind);
            } else {
                debug!(call_id = %self.call_id, kind = in_flight.kind.label(), "dropping read-only operation");
            }
        }

        match &end {
            CallEnd::TransportFailed(error) => warn!(
                event_name = "call.ended",
                call_id = %self.call_id,
                end = end.as_str(),
                failure_class = FailureClass::UnrecoverableSession.as_str(),
                error = %error,
                turns = self.conversation.turn_count(),
                "call ended by transport failure"
            ),
            _ => info!(
                event_name = "call.ended",
                call_id = %self.call_id,
                end = end.as_str(),
                turns = self.conversation.turn_count(),
                "call ended"
            ),
        }
        let outcome = if end.is_abnormal() { AuditOutcome::Failed } else { AuditOutcome::Success };
        self.audit(
            AuditEvent::new(&self.audit_context, "call.ended", AuditCategory::Lifecycle, outcome)
                .with_metadata("end", end.as_str())
                .with_metadata("state", self.state.phase().as_str()),
        );

        CallReport {
            call_id: self.call_id,
            end,
            final_state: self.state,
            conversation: self.conversation,
            unknown_side_effect,
        }
    }

    fn audit(&self, event: AuditEvent) {
        self.collaborators.audit.emit(event);
    }
}

async fn read_events(channel: Arc<dyn VoiceChannel>, inbox: mpsc::UnboundedSender<Inbound>) {
    loop {
        let (message, last) = match channel.next_event().await {
            Ok(Some(event)) => {
                let last = event == VoiceEvent::CallEnded;
                (Inbound::Voice(event), last)
            }
            Ok(None) => (Inbound::ChannelClosed, true),
            Err(error) => (Inbound::ChannelFailed(error), true),
        };
        if inbox.send(message).is_err() || last {
            return;
        }
    }
}

/// Plays queued requests one at a time. Requests cancelled before their turn
/// are acknowledged without reaching the channel.
async fn play_speech(
    channel: Arc<dyn VoiceChannel>,
    mut queue: mpsc::UnboundedReceiver<SpeechRequest>,
    cancelled_through: Arc<AtomicU64>,
    inbox: mpsc::UnboundedSender<Inbound>,
) {
    while let Some(request) = queue.recv().await {
        let id = request.id;
        if id.0 <= cancelled_through.load(Ordering::SeqCst) {
            let _ = inbox.send(Inbound::SpeechDone { id, result: Ok(SpeechAck::Cancelled) });
            continue;
        }

        let result = channel.speak(request).await;
        let failed = result.is_err();
        if inbox.send(Inbound::SpeechDone { id, result }).is_err() || failed {
            return;
        }
    }
}

fn flatten(
    joined: Result<Result<ExecutionOutput, ExecutionError>, JoinError>,
) -> Result<ExecutionOutput, ExecutionError> {
    joined.unwrap_or_else(|error| Err(ExecutionError::Backend(format!("executor task failed: {error}"))))
}

fn record_side_effect(
    audit: &dyn AuditSink,
    context: &AuditContext,
    kind: IntentKind,
    result: &Result<ExecutionOutput, ExecutionError>,
    late: bool,
) {
    if !kind.is_irreversible() {
        return;
    }
    let (event_type, outcome) = match result {
        Ok(_) => ("executor.side_effect_completed", AuditOutcome::Success),
        Err(_) => ("executor.side_effect_failed", AuditOutcome::Failed),
    };
    let mut event = AuditEvent::new(context, event_type, AuditCategory::Execution, outcome)
        .with_metadata("kind", kind.label())
        .with_metadata("late", late.to_string());
    if let Err(error) = result {
        event = event.with_metadata("error", error.to_string());
    }
    if late {
        info!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            kind = kind.label(),
            "timed out email operation finished"
        );
    }
    audit.emit(event);
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mailvoice_core::config::AppConfig;

    use super::{CallEnd, ManagerSettings};
    use mailvoice_voice::ChannelError;

    #[test]
    fn settings_follow_conversation_config() {
        let mut config = AppConfig::default().conversation;
        config.recognizer_timeout_ms = 1_500;
        config.max_confirmation_attempts = 3;
        config.greeting = "   ".to_owned();

        let settings = ManagerSettings::from_config(&config);
        assert_eq!(settings.recognizer_timeout, Duration::from_millis(1_500));
        assert_eq!(settings.policy.max_confirmation_attempts, 3);
        assert_eq!(settings.greeting, None);
    }

    #[test]
    fn only_transport_loss_is_abnormal() {
        assert!(CallEnd::TransportFailed(ChannelError::Transport("reset".to_owned())).is_abnormal());
        assert!(CallEnd::ChannelClosed.is_abnormal());
        assert!(!CallEnd::Hangup.is_abnormal());
        assert!(!CallEnd::Terminated.is_abnormal());
    }
}
