//! In-process voice channel. The agent side gets a [`LocalVoiceChannel`],
//! whoever plays the caller (a websocket bridge, the simulator, a test) gets
//! the matching [`CallerHandle`].

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::debug;

use crate::channel::{ChannelError, VoiceChannel};
use crate::events::{SpeechAck, SpeechRequest, VoiceEvent};

enum Inbound {
    Event(VoiceEvent),
    Failure(String),
}

/// Instruction sent towards the caller's playback device.
#[derive(Debug)]
pub enum VoiceCommand {
    Speak { request: SpeechRequest, ack: PlaybackAck },
    CancelSpeech,
}

/// Completes a speech request. Dropping it counts as a cancellation.
#[derive(Debug)]
pub struct PlaybackAck(oneshot::Sender<SpeechAck>);

impl PlaybackAck {
    pub fn played(self) {
        let _ = self.0.send(SpeechAck::Played);
    }

    pub fn cancelled(self) {
        let _ = self.0.send(SpeechAck::Cancelled);
    }
}

pub struct LocalVoiceChannel {
    inbound: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    commands: mpsc::UnboundedSender<VoiceCommand>,
}

pub struct CallerHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    commands: mpsc::UnboundedReceiver<VoiceCommand>,
}

impl LocalVoiceChannel {
    pub fn pair() -> (LocalVoiceChannel, CallerHandle) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (
            LocalVoiceChannel { inbound: Mutex::new(inbound_rx), commands: command_tx },
            CallerHandle { inbound: inbound_tx, commands: command_rx },
        )
    }
}

#[async_trait]
impl VoiceChannel for LocalVoiceChannel {
    async fn next_event(&self) -> Result<Option<VoiceEvent>, ChannelError> {
        match self.inbound.lock().await.recv().await {
            Some(Inbound::Event(event)) => Ok(Some(event)),
            Some(Inbound::Failure(reason)) => Err(ChannelError::Transport(reason)),
            None => Ok(None),
        }
    }

    async fn speak(&self, request: SpeechRequest) -> Result<SpeechAck, ChannelError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(VoiceCommand::Speak { request, ack: PlaybackAck(ack_tx) })
            .map_err(|_| ChannelError::Closed)?;
        Ok(ack_rx.await.unwrap_or(SpeechAck::Cancelled))
    }

    async fn cancel_speech(&self) -> Result<(), ChannelError> {
        self.commands.send(VoiceCommand::CancelSpeech).map_err(|_| ChannelError::Closed)
    }
}

impl CallerHandle {
    pub fn send(&self, event: VoiceEvent) -> Result<(), ChannelError> {
        self.inbound.send(Inbound::Event(event)).map_err(|_| ChannelError::Closed)
    }

    pub fn start_speaking(&self) -> Result<(), ChannelError> {
        self.send(VoiceEvent::UtteranceStarted)
    }

    /// A complete utterance: speech start followed by the final transcript.
    pub fn say(&self, text: &str) -> Result<(), ChannelError> {
        self.start_speaking()?;
        self.send(VoiceEvent::UtteranceFinal { text: text.to_owned() })
    }

    pub fn hang_up(&self) -> Result<(), ChannelError> {
        self.send(VoiceEvent::CallEnded)
    }

    /// Makes the agent side observe a transport failure.
    pub fn fail(&self, reason: &str) -> Result<(), ChannelError> {
        self.inbound.send(Inbound::Failure(reason.to_owned())).map_err(|_| ChannelError::Closed)
    }

    pub async fn next_command(&mut self) -> Option<VoiceCommand> {
        self.commands.recv().await
    }

    /// Waits for the next speech request, plays it instantly and returns its
    /// text. Cancellations seen on the way are skipped.
    pub async fn hear(&mut self) -> Option<String> {
        loop {
            match self.commands.recv().await? {
                VoiceCommand::Speak { request, ack } => {
                    debug!(speech_id = %request.id, "caller heard speech");
                    ack.played();
                    return Some(request.text);
                }
                VoiceCommand::CancelSpeech => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalVoiceChannel, VoiceCommand};
    use crate::channel::{ChannelError, VoiceChannel};
    use crate::events::{SpeechAck, SpeechId, SpeechPriority, SpeechRequest, VoiceEvent};

    fn request(id: u64, text: &str) -> SpeechRequest {
        SpeechRequest { id: SpeechId(id), text: text.to_owned(), priority: SpeechPriority::Normal }
    }

    #[tokio::test]
    async fn caller_events_arrive_in_order() {
        let (channel, caller) = LocalVoiceChannel::pair();
        caller.say("read my email").expect("channel open");
        caller.hang_up().expect("channel open");

        assert_eq!(channel.next_event().await, Ok(Some(VoiceEvent::UtteranceStarted)));
        assert_eq!(
            channel.next_event().await,
            Ok(Some(VoiceEvent::UtteranceFinal { text: "read my email".to_owned() }))
        );
        assert_eq!(channel.next_event().await, Ok(Some(VoiceEvent::CallEnded)));

        drop(caller);
        assert_eq!(channel.next_event().await, Ok(None));
    }

    #[tokio::test]
    async fn speak_resolves_when_the_caller_acknowledges() {
        let (channel, mut caller) = LocalVoiceChannel::pair();
        let speaking = tokio::spawn(async move { channel.speak(request(1, "Hello")).await });

        assert_eq!(caller.hear().await.as_deref(), Some("Hello"));
        let ack = speaking.await.expect("speak task should finish");
        assert_eq!(ack, Ok(SpeechAck::Played));
    }

    #[tokio::test]
    async fn dropped_acknowledgement_counts_as_cancelled() {
        let (channel, mut caller) = LocalVoiceChannel::pair();
        let speaking = tokio::spawn(async move {
            let ack = channel.speak(request(1, "A long summary")).await;
            (channel, ack)
        });

        match caller.next_command().await {
            Some(VoiceCommand::Speak { ack, .. }) => drop(ack),
            other => panic!("expected a speak command, got {other:?}"),
        }
        let (channel, ack) = speaking.await.expect("speak task should finish");
        assert_eq!(ack, Ok(SpeechAck::Cancelled));

        channel.cancel_speech().await.expect("channel open");
        assert!(matches!(caller.next_command().await, Some(VoiceCommand::CancelSpeech)));
    }

    #[tokio::test]
    async fn transport_failure_and_closed_caller_are_reported() {
        let (channel, caller) = LocalVoiceChannel::pair();
        caller.fail("socket reset").expect("channel open");
        assert_eq!(
            channel.next_event().await,
            Err(ChannelError::Transport("socket reset".to_owned()))
        );

        drop(caller);
        assert_eq!(channel.speak(request(2, "anyone there?")).await, Err(ChannelError::Closed));
    }
}
