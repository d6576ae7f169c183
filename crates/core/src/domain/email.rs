use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::intent::{Intent, IntentKind, SlotName};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

/// Raw fields used to build an [`Email`]. Validation happens in the constructors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmailParts {
    pub id: Option<MessageId>,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<ThreadId>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    id: Option<MessageId>,
    sender: String,
    recipients: Vec<String>,
    subject: String,
    body: String,
    thread_id: Option<ThreadId>,
    timestamp: DateTime<Utc>,
}

impl Email {
    /// Builds a message the assistant is about to send. Outbound mail needs at
    /// least one non-blank recipient.
    pub fn outbound(parts: EmailParts) -> Result<Self, DomainError> {
        let recipients = parts
            .recipients
            .into_iter()
            .map(|recipient| recipient.trim().to_owned())
            .filter(|recipient| !recipient.is_empty())
            .collect::<Vec<_>>();
        if recipients.is_empty() {
            return Err(DomainError::MissingRecipients);
        }

        Ok(Self {
            id: parts.id,
            sender: parts.sender,
            recipients,
            subject: parts.subject,
            body: parts.body,
            thread_id: parts.thread_id,
            timestamp: parts.timestamp.unwrap_or_else(Utc::now),
        })
    }

    /// Builds a message read from the mailbox.
    pub fn received(parts: EmailParts) -> Self {
        Self {
            id: parts.id,
            sender: parts.sender,
            recipients: parts.recipients,
            subject: parts.subject,
            body: parts.body,
            thread_id: parts.thread_id,
            timestamp: parts.timestamp.unwrap_or_else(Utc::now),
        }
    }

    /// Draft for a complete `send` intent.
    pub fn from_send_intent(intent: &Intent, sender: &str) -> Result<Self, DomainError> {
        if intent.kind() != IntentKind::Send || !intent.is_executable() {
            return Err(DomainError::InvariantViolation(format!(
                "cannot draft an email from an incomplete {} intent",
                intent.kind()
            )));
        }

        let text = |slot| intent.slot(slot).map(ToString::to_string).unwrap_or_default();
        Self::outbound(EmailParts {
            sender: sender.to_owned(),
            recipients: split_recipients(&text(SlotName::Recipient)),
            subject: text(SlotName::Subject),
            body: text(SlotName::Body),
            ..EmailParts::default()
        })
    }

    pub fn id(&self) -> Option<&MessageId> {
        self.id.as_ref()
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn thread_id(&self) -> Option<&ThreadId> {
        self.thread_id.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// One-line spoken description of the message.
    pub fn voice_line(&self) -> String {
        let subject = if self.subject.trim().is_empty() { "no subject" } else { &self.subject };
        format!("From {}, subject: {}", self.sender, subject)
    }
}

/// Splits a spoken recipient list such as "jane, bob and carol".
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .flat_map(|part| part.split(" and "))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// What a successful execution produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ExecutionOutput {
    Message(Email),
    Messages(Vec<Email>),
}

impl ExecutionOutput {
    pub fn emails(&self) -> &[Email] {
        match self {
            Self::Message(email) => std::slice::from_ref(email),
            Self::Messages(emails) => emails,
        }
    }
}
