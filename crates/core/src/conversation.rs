//! Per-call conversation state.
//!
//! One `ConversationState` exists per call and is owned by that call's
//! conversation manager. Every mutation here is total: it cannot fail and
//! cannot leave the state half-updated.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::email::{Email, ExecutionOutput, MessageId};
use crate::domain::intent::{Intent, SlotName};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(pub String);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the person on the line, used to scope mailbox credentials.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallerId(pub String);

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Caller,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub index: usize,
    pub speaker: Speaker,
    pub text: String,
    pub intent: Option<Intent>,
    pub recorded_at: DateTime<Utc>,
}

const MEMORY_CAPACITY: usize = 10;

const ORDINALS: &[(&str, usize)] = &[
    ("first", 0),
    ("1st", 0),
    ("second", 1),
    ("2nd", 1),
    ("two", 1),
    ("2", 1),
    ("third", 2),
    ("3rd", 2),
    ("three", 2),
    ("3", 2),
    ("fourth", 3),
    ("4th", 3),
    ("four", 3),
    ("4", 3),
    ("fifth", 4),
    ("5th", 4),
    ("five", 4),
    ("5", 4),
];

const FOCUS_WORDS: &[&str] = &["it", "that", "this", "last", "latest", "recent", "newest", "same"];

const FILLER_WORDS: &[&str] =
    &["the", "a", "an", "email", "emails", "message", "mail", "one", "number", "most", "to"];

/// Recently surfaced messages, so "reply to the second one" or "delete it"
/// can be turned into a concrete message id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortTermMemory {
    recent: Vec<Email>,
    focused: Option<MessageId>,
}

impl ShortTermMemory {
    pub fn recent(&self) -> &[Email] {
        &self.recent
    }

    pub fn focused(&self) -> Option<&MessageId> {
        self.focused.as_ref()
    }

    /// Result of acting on `source`: the caller is still talking about the
    /// source message, so it keeps the focus. Without a source this is
    /// [`ShortTermMemory::remember`].
    pub fn remember_result(&mut self, output: &ExecutionOutput, source: Option<&MessageId>) {
        match source {
            Some(id) => self.focused = Some(id.clone()),
            None => self.remember(output),
        }
    }

    /// Listings replace the recent set; a single message becomes the focus.
    pub fn remember(&mut self, output: &ExecutionOutput) {
        match output {
            ExecutionOutput::Messages(emails) => {
                self.recent = emails.iter().take(MEMORY_CAPACITY).cloned().collect();
                self.focused = self.recent.first().and_then(|email| email.id().cloned());
            }
            ExecutionOutput::Message(email) => {
                if let Some(id) = email.id() {
                    self.focused = Some(id.clone());
                }
            }
        }
    }

    pub fn resolve(&self, phrase: &str) -> Option<MessageId> {
        let normalized = phrase
            .to_lowercase()
            .chars()
            .map(|ch| if ch.is_alphanumeric() || ch == '-' { ch } else { ' ' })
            .collect::<String>();
        let tokens = normalized.split_whitespace().collect::<Vec<_>>();

        if let Some(id) = self.recent.iter().filter_map(Email::id).find(|id| {
            tokens.iter().any(|token| token.eq_ignore_ascii_case(&id.0))
        }) {
            return Some(id.clone());
        }

        if let Some(position) = tokens.iter().position(|token| *token == "from") {
            let sender = tokens.get(position + 1)?;
            return self
                .recent
                .iter()
                .find(|email| email.sender().to_lowercase().contains(*sender))
                .and_then(|email| email.id().cloned());
        }

        if let Some(position) = tokens.iter().position(|token| *token == "about") {
            let topic = tokens[position + 1..].join(" ");
            if topic.is_empty() {
                return None;
            }
            return self
                .recent
                .iter()
                .find(|email| email.subject().to_lowercase().contains(&topic))
                .and_then(|email| email.id().cloned());
        }

        let ordinal = tokens.iter().enumerate().find_map(|(position, token)| {
            // "one" is only a position after "number"; otherwise it is "that one".
            if matches!(*token, "one" | "1") {
                return (position > 0 && tokens[position - 1] == "number").then_some(0);
            }
            ORDINALS.iter().find(|(word, _)| word == token).map(|(_, index)| *index)
        });
        let focus = || {
            self.focused
                .clone()
                .or_else(|| self.recent.first().and_then(|email| email.id().cloned()))
        };

        if tokens.iter().any(|token| FOCUS_WORDS.contains(token)) {
            return focus();
        }
        if let Some(index) = ordinal {
            return self.recent.get(index).and_then(|email| email.id().cloned());
        }
        if tokens.iter().all(|token| FILLER_WORDS.contains(token)) {
            return focus();
        }

        None
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    call_id: CallId,
    turns: Vec<Turn>,
    pending: Option<Intent>,
    last_executed: Option<Intent>,
    memory: ShortTermMemory,
    started_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(call_id: CallId) -> Self {
        Self {
            call_id,
            turns: Vec::new(),
            pending: None,
            last_executed: None,
            memory: ShortTermMemory::default(),
            started_at: Utc::now(),
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// The last `window` turns, oldest first.
    pub fn recent_turns(&self, window: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    pub fn pending_intent(&self) -> Option<&Intent> {
        self.pending.as_ref()
    }

    pub fn last_executed(&self) -> Option<&Intent> {
        self.last_executed.as_ref()
    }

    pub fn memory(&self) -> &ShortTermMemory {
        &self.memory
    }

    /// Missing slots of the pending intent, empty when nothing is pending.
    pub fn missing_slots(&self) -> Vec<SlotName> {
        self.pending.as_ref().map(Intent::missing_slots).unwrap_or_default()
    }

    /// Appends a turn and returns its index. Turns are never edited or removed.
    pub fn append_turn(
        &mut self,
        speaker: Speaker,
        text: impl Into<String>,
        intent: Option<Intent>,
    ) -> usize {
        let index = self.turns.len();
        self.turns.push(Turn { index, speaker, text: text.into(), intent, recorded_at: Utc::now() });
        index
    }

    /// Replaces the pending intent as a whole.
    pub fn set_pending_intent(&mut self, intent: Intent) {
        self.pending = Some(intent);
    }

    pub fn clear_pending_intent(&mut self) -> Option<Intent> {
        self.pending.take()
    }

    pub fn record_executed(&mut self, intent: Intent) {
        self.last_executed = Some(intent);
    }

    pub fn clear_last_executed(&mut self) {
        self.last_executed = None;
    }

    pub fn remember(&mut self, output: &ExecutionOutput) {
        self.memory.remember(output);
    }

    pub fn remember_result(&mut self, output: &ExecutionOutput, source: Option<&MessageId>) {
        self.memory.remember_result(output, source);
    }
}

#[cfg(test)]
mod tests {
    use super::{CallId, ConversationState, ShortTermMemory, Speaker};
    use crate::domain::email::{Email, EmailParts, ExecutionOutput, MessageId};
    use crate::domain::intent::{Intent, IntentKind, SlotName, SlotValue};

    fn inbox() -> ExecutionOutput {
        let email = |id: &str, sender: &str, subject: &str| {
            Email::received(EmailParts {
                id: Some(MessageId(id.to_owned())),
                sender: sender.to_owned(),
                recipients: vec!["me@example.com".to_owned()],
                subject: subject.to_owned(),
                ..EmailParts::default()
            })
        };
        ExecutionOutput::Messages(vec![
            email("m-1", "Alice Smith", "Quarterly budget"),
            email("m-2", "Bob", "Lunch plans"),
            email("m-3", "Carol", "Roadmap review"),
        ])
    }

    #[test]
    fn turns_are_appended_in_order() {
        let mut state = ConversationState::new(CallId("call-1".to_owned()));
        assert_eq!(state.append_turn(Speaker::Caller, "hello", None), 0);
        assert_eq!(state.append_turn(Speaker::Assistant, "hi there", None), 1);
        assert_eq!(state.append_turn(Speaker::Caller, "read my email", None), 2);

        assert_eq!(state.turn_count(), 3);
        let recent = state.recent_turns(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "hi there");
        assert_eq!(recent[1].index, 2);
        assert_eq!(state.recent_turns(10).len(), 3);
    }

    #[test]
    fn pending_intent_is_replaced_whole_and_cleared() {
        let mut state = ConversationState::new(CallId("call-2".to_owned()));
        let draft = Intent::new(IntentKind::Send, 0.9)
            .expect("valid confidence")
            .with_slot(SlotName::Recipient, SlotValue::text("jane"));
        state.set_pending_intent(draft.clone());
        assert_eq!(state.missing_slots(), vec![SlotName::Subject, SlotName::Body]);

        let completed = draft.with_slot(SlotName::Subject, SlotValue::text("meeting"));
        state.set_pending_intent(completed);
        assert_eq!(state.missing_slots(), vec![SlotName::Body]);

        assert!(state.clear_pending_intent().is_some());
        assert!(state.pending_intent().is_none());
        assert!(state.missing_slots().is_empty());
    }

    #[test]
    fn memory_resolves_ordinals_pronouns_and_senders() {
        let mut memory = ShortTermMemory::default();
        memory.remember(&inbox());

        assert_eq!(memory.resolve("the second one"), Some(MessageId("m-2".to_owned())));
        assert_eq!(memory.resolve("number 3"), Some(MessageId("m-3".to_owned())));
        assert_eq!(memory.resolve("it"), Some(MessageId("m-1".to_owned())));
        assert_eq!(memory.resolve("the email from bob"), Some(MessageId("m-2".to_owned())));
        assert_eq!(memory.resolve("the one about roadmap"), Some(MessageId("m-3".to_owned())));
        assert_eq!(memory.resolve("the email from dave"), None);
        assert_eq!(memory.resolve("the fifth one"), None);
    }

    #[test]
    fn focus_stays_on_the_message_that_was_replied_to() {
        let mut memory = ShortTermMemory::default();
        memory.remember(&inbox());
        let reply = ExecutionOutput::Message(Email::received(EmailParts {
            id: Some(MessageId("sent-9".to_owned())),
            sender: "me@example.com".to_owned(),
            recipients: vec!["Bob".to_owned()],
            subject: "Re: Lunch plans".to_owned(),
            ..EmailParts::default()
        }));
        memory.remember_result(&reply, Some(&MessageId("m-2".to_owned())));

        let second = Some(MessageId("m-2".to_owned()));
        assert_eq!(memory.resolve("it"), second);
        assert_eq!(memory.resolve("that one"), second);
        assert_eq!(memory.resolve("the last one"), second);
        assert_eq!(memory.resolve("this email"), second);
        assert_eq!(memory.resolve("the first one"), Some(MessageId("m-1".to_owned())));
        assert_eq!(memory.resolve("number one"), Some(MessageId("m-1".to_owned())));
        assert_eq!(memory.recent().len(), 3);
    }

    #[test]
    fn empty_memory_resolves_nothing() {
        let memory = ShortTermMemory::default();
        assert_eq!(memory.resolve("it"), None);
        assert_eq!(memory.resolve("the first one"), None);
    }
}
