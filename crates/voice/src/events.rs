use std::fmt;

use serde::{Deserialize, Serialize};

pub use mailvoice_core::turns::SpeechPriority;

/// What the voice transport reports about the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceEvent {
    UtteranceStarted,
    UtterancePartial { text: String },
    UtteranceFinal { text: String },
    CallEnded,
}

impl VoiceEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::UtteranceStarted => "utterance_started",
            Self::UtterancePartial { .. } => "utterance_partial",
            Self::UtteranceFinal { .. } => "utterance_final",
            Self::CallEnded => "call_ended",
        }
    }
}

/// Monotonic per-call identifier of a speech request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpeechId(pub u64);

impl fmt::Display for SpeechId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "speech-{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub id: SpeechId,
    pub text: String,
    pub priority: SpeechPriority,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechAck {
    Played,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::{SpeechId, SpeechPriority, SpeechRequest, VoiceEvent};

    #[test]
    fn voice_events_use_tagged_json() {
        let event: VoiceEvent =
            serde_json::from_str(r#"{"type":"utterance_final","text":"read my email"}"#)
                .expect("final utterance should decode");
        assert_eq!(event, VoiceEvent::UtteranceFinal { text: "read my email".to_owned() });
        assert_eq!(event.event_type(), "utterance_final");

        let ended: VoiceEvent =
            serde_json::from_str(r#"{"type":"call_ended"}"#).expect("call end should decode");
        assert_eq!(ended, VoiceEvent::CallEnded);
    }

    #[test]
    fn speech_request_serializes_priority_in_snake_case() {
        let request = SpeechRequest {
            id: SpeechId(4),
            text: "Done.".to_owned(),
            priority: SpeechPriority::High,
        };
        let json = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(json["priority"], "high");
        assert_eq!(json["id"], 4);
        assert_eq!(request.id.to_string(), "speech-4");
    }
}
