use async_trait::async_trait;
use thiserror::Error;

use crate::events::{SpeechAck, SpeechRequest, VoiceEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The transport broke; the call cannot continue.
    #[error("voice transport failed: {0}")]
    Transport(String),
    #[error("voice channel is closed")]
    Closed,
}

/// One realtime voice session.
///
/// `next_event` is only ever polled from a single task. `speak` and
/// `cancel_speech` may be called from other tasks while it is pending.
#[async_trait]
pub trait VoiceChannel: Send + Sync {
    /// `Ok(None)` means the far side went away without a `CallEnded`.
    async fn next_event(&self) -> Result<Option<VoiceEvent>, ChannelError>;

    /// Resolves once the request has been played out or cancelled.
    async fn speak(&self, request: SpeechRequest) -> Result<SpeechAck, ChannelError>;

    async fn cancel_speech(&self) -> Result<(), ChannelError>;
}
