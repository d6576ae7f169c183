//! Voice channel contract between a realtime audio transport and the agent.
//!
//! - **Events** (`events`) - utterance boundaries and transcripts coming in, speech requests going out
//! - **Channel** (`channel`) - the `VoiceChannel` trait the conversation manager talks to
//! - **Local** (`local`) - an in-process channel pair used by transports, the simulator and tests
//!
//! ```text
//! transport → VoiceEvent → VoiceChannel → ConversationManager
//!                               ↑
//!            speak / cancel_speech
//! ```

pub mod channel;
pub mod events;
pub mod local;

pub use channel::{ChannelError, VoiceChannel};
pub use events::{SpeechAck, SpeechId, SpeechPriority, SpeechRequest, VoiceEvent};
pub use local::{CallerHandle, LocalVoiceChannel, PlaybackAck, VoiceCommand};
