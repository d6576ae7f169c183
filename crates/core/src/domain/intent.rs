use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::email::MessageId;
use crate::errors::DomainError;
use crate::slots;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Send,
    Read,
    Reply,
    Forward,
    Delete,
    Search,
    Unknown,
}

impl IntentKind {
    pub const ALL: [IntentKind; 7] = [
        Self::Send,
        Self::Read,
        Self::Reply,
        Self::Forward,
        Self::Delete,
        Self::Search,
        Self::Unknown,
    ];

    /// Kinds whose execution has an external side effect the assistant cannot undo.
    pub fn is_irreversible(self) -> bool {
        matches!(self, Self::Send | Self::Reply | Self::Forward | Self::Delete)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Read => "read",
            Self::Reply => "reply",
            Self::Forward => "forward",
            Self::Delete => "delete",
            Self::Search => "search",
            Self::Unknown => "unknown",
        }
    }

    pub fn required_slots(self) -> &'static [SlotName] {
        slots::required_slots(self)
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for IntentKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.label() == normalized).ok_or_else(|| {
            DomainError::InvariantViolation(format!("unsupported intent kind `{normalized}`"))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Recipient,
    Subject,
    Body,
    MessageRef,
    Query,
    Count,
}

impl SlotName {
    pub const ALL: [SlotName; 6] =
        [Self::Recipient, Self::Subject, Self::Body, Self::MessageRef, Self::Query, Self::Count];

    /// Stable key used on the wire and in recognizer payloads.
    pub fn key(self) -> &'static str {
        match self {
            Self::Recipient => "recipient",
            Self::Subject => "subject",
            Self::Body => "body",
            Self::MessageRef => "message_ref",
            Self::Query => "query",
            Self::Count => "count",
        }
    }

    /// Spoken name used when asking the caller for the slot.
    pub fn spoken_name(self) -> &'static str {
        match self {
            Self::Recipient => "recipient",
            Self::Subject => "subject",
            Self::Body => "body",
            Self::MessageRef => "message",
            Self::Query => "search terms",
            Self::Count => "number of emails",
        }
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SlotName {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|slot| slot.key() == normalized).ok_or_else(|| {
            DomainError::InvariantViolation(format!("unsupported slot name `{normalized}`"))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotValue {
    Text(String),
    Reference(MessageId),
    Number(u32),
}

impl SlotValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&MessageId> {
        match self {
            Self::Reference(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(value) => value.trim().is_empty(),
            Self::Reference(id) => id.0.trim().is_empty(),
            Self::Number(_) => false,
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Reference(id) => write!(f, "message {}", id.0),
            Self::Number(value) => write!(f, "{value}"),
        }
    }
}

/// A recognized caller goal plus whatever slots have been extracted so far.
///
/// Intents are values: every change produces a new `Intent`, which keeps the
/// pending intent held by the conversation state replaceable as a whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    kind: IntentKind,
    slots: BTreeMap<SlotName, SlotValue>,
    ambiguities: BTreeMap<SlotName, Vec<SlotValue>>,
    confidence: f32,
}

impl Intent {
    pub fn new(kind: IntentKind, confidence: f32) -> Result<Self, DomainError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DomainError::ConfidenceOutOfRange(confidence.to_string()));
        }

        Ok(Self { kind, slots: BTreeMap::new(), ambiguities: BTreeMap::new(), confidence })
    }

    pub fn unknown() -> Self {
        Self {
            kind: IntentKind::Unknown,
            slots: BTreeMap::new(),
            ambiguities: BTreeMap::new(),
            confidence: 0.0,
        }
    }

    pub fn with_slot(mut self, slot: SlotName, value: SlotValue) -> Self {
        if value.is_blank() {
            self.slots.remove(&slot);
        } else {
            self.slots.insert(slot, value);
        }
        self.ambiguities.remove(&slot);
        self
    }

    pub fn without_slot(mut self, slot: SlotName) -> Self {
        self.slots.remove(&slot);
        self
    }

    /// Records conflicting fills for a slot. Fewer than two candidates is not an
    /// ambiguity and collapses into a plain fill.
    pub fn with_ambiguity(mut self, slot: SlotName, mut candidates: Vec<SlotValue>) -> Self {
        candidates.retain(|candidate| !candidate.is_blank());
        candidates.dedup();
        match candidates.len() {
            0 => self,
            1 => self.with_slot(slot, candidates.remove(0)),
            _ => {
                self.slots.remove(&slot);
                self.ambiguities.insert(slot, candidates);
                self
            }
        }
    }

    /// Takes whatever the newer intent says about `slot`, leaving every other slot untouched.
    pub fn absorb(self, newer: &Intent, slot: SlotName) -> Self {
        if let Some(candidates) = newer.ambiguities.get(&slot) {
            return self.with_ambiguity(slot, candidates.clone());
        }
        match newer.slots.get(&slot) {
            Some(value) => self.with_slot(slot, value.clone()),
            None => self,
        }
    }

    pub fn kind(&self) -> IntentKind {
        self.kind
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn slots(&self) -> &BTreeMap<SlotName, SlotValue> {
        &self.slots
    }

    pub fn slot(&self, slot: SlotName) -> Option<&SlotValue> {
        self.slots.get(&slot)
    }

    pub fn slot_text(&self, slot: SlotName) -> Option<&str> {
        self.slots.get(&slot).and_then(SlotValue::as_text)
    }

    pub fn ambiguities(&self) -> &BTreeMap<SlotName, Vec<SlotValue>> {
        &self.ambiguities
    }

    pub fn ambiguity(&self, slot: SlotName) -> Option<&[SlotValue]> {
        self.ambiguities.get(&slot).map(Vec::as_slice)
    }

    /// Required slots for this kind that are unfilled, ambiguous slots first.
    pub fn missing_slots(&self) -> Vec<SlotName> {
        let mut missing = self.ambiguities.keys().copied().collect::<Vec<_>>();
        for slot in self.kind.required_slots() {
            if !self.slots.contains_key(slot) && !missing.contains(slot) {
                missing.push(*slot);
            }
        }
        missing
    }

    pub fn next_missing_slot(&self) -> Option<SlotName> {
        self.missing_slots().into_iter().next()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_slots().is_empty()
    }

    /// `unknown` is never executable, however complete it looks.
    pub fn is_executable(&self) -> bool {
        self.kind != IntentKind::Unknown && self.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::{Intent, IntentKind, SlotName, SlotValue};
    use crate::domain::email::MessageId;

    fn send_to_jane() -> Intent {
        Intent::new(IntentKind::Send, 0.8)
            .expect("valid confidence")
            .with_slot(SlotName::Recipient, SlotValue::text("jane"))
            .with_slot(SlotName::Subject, SlotValue::text("meeting"))
    }

    #[test]
    fn send_intent_reports_body_as_missing() {
        let intent = send_to_jane();
        assert_eq!(intent.missing_slots(), vec![SlotName::Body]);
        assert!(!intent.is_complete());
        assert!(!intent.is_executable());
    }

    #[test]
    fn absorbing_the_awaited_slot_completes_the_intent() {
        let newer = Intent::new(IntentKind::Send, 0.7)
            .expect("valid confidence")
            .with_slot(SlotName::Body, SlotValue::text("it's moved to 3pm"))
            .with_slot(SlotName::Recipient, SlotValue::text("bob"));

        let merged = send_to_jane().absorb(&newer, SlotName::Body);
        assert!(merged.is_executable());
        assert_eq!(merged.slot_text(SlotName::Recipient), Some("jane"));
        assert_eq!(merged.slot_text(SlotName::Body), Some("it's moved to 3pm"));
    }

    #[test]
    fn unknown_intent_is_never_executable() {
        let intent = Intent::unknown();
        assert!(intent.kind().required_slots().is_empty());
        assert!(intent.is_complete());
        assert!(!intent.is_executable());
    }

    #[test]
    fn confidence_outside_unit_interval_is_rejected() {
        assert!(Intent::new(IntentKind::Read, 1.2).is_err());
        assert!(Intent::new(IntentKind::Read, -0.1).is_err());
        assert!(Intent::new(IntentKind::Read, f32::NAN).is_err());
    }

    #[test]
    fn ambiguous_slot_is_asked_before_other_missing_slots() {
        let intent = Intent::new(IntentKind::Send, 0.9).expect("valid confidence").with_ambiguity(
            SlotName::Subject,
            vec![SlotValue::text("budget"), SlotValue::text("roadmap")],
        );

        assert_eq!(
            intent.missing_slots(),
            vec![SlotName::Subject, SlotName::Recipient, SlotName::Body]
        );

        let resolved = intent.with_slot(SlotName::Subject, SlotValue::text("budget"));
        assert!(resolved.ambiguity(SlotName::Subject).is_none());
    }

    #[test]
    fn single_candidate_ambiguity_collapses_to_fill() {
        let intent = Intent::new(IntentKind::Delete, 0.9).expect("valid confidence").with_ambiguity(
            SlotName::MessageRef,
            vec![SlotValue::Reference(MessageId("m-1".to_owned()))],
        );
        assert!(intent.is_executable());
    }

    #[test]
    fn kinds_and_slots_parse_from_wire_keys() {
        assert_eq!("forward".parse::<IntentKind>().ok(), Some(IntentKind::Forward));
        assert_eq!("message_ref".parse::<SlotName>().ok(), Some(SlotName::MessageRef));
        assert!("archive".parse::<IntentKind>().is_err());
    }
}
