//! Spoken text the assistant produces. Everything the caller hears is
//! composed here so wording stays consistent across the turn machine.

use crate::conversation::ShortTermMemory;
use crate::domain::email::{Email, ExecutionOutput, MessageId};
use crate::domain::intent::{Intent, IntentKind, SlotName, SlotValue};
use crate::errors::ExecutionError;

pub const DEFAULT_GREETING: &str = "Hello! I'm your email assistant. I can help you send emails, \
read your inbox, or search for specific messages. How can I help you today?";

pub const RECOGNITION_REPROMPT: &str = "I didn't catch that, could you repeat?";

pub const HELP: &str = "I can help you with your emails. You can ask me to send an email, read \
your recent emails, search for specific emails, reply to or forward a message, or delete one. \
What would you like to do?";

/// Read and search results never list more than this many messages aloud.
pub const MAX_SPOKEN_SUMMARIES: usize = 3;

pub fn clarification() -> String {
    format!("I'm not sure what you'd like to do. {HELP}")
}

pub fn ask_for_slot(kind: IntentKind, slot: SlotName) -> String {
    match (kind, slot) {
        (IntentKind::Forward, SlotName::Recipient) => {
            "Who should I forward it to?".to_owned()
        }
        (_, SlotName::Recipient) => "Who would you like to send this email to?".to_owned(),
        (_, SlotName::Subject) => "What should the subject be?".to_owned(),
        (IntentKind::Reply, SlotName::Body) => {
            "What would you like the body of your reply to say?".to_owned()
        }
        (_, SlotName::Body) => "What would you like the body of the email to say?".to_owned(),
        (_, SlotName::MessageRef) => "Which email do you mean? You can say the first one, or the \
one from a particular sender."
            .to_owned(),
        (_, SlotName::Query) => "What should I search for?".to_owned(),
        (_, SlotName::Count) => "How many emails should I read?".to_owned(),
    }
}

pub fn disambiguate(slot: SlotName, candidates: &[SlotValue]) -> String {
    let options = candidates.iter().map(ToString::to_string).collect::<Vec<_>>();
    format!(
        "I heard more than one {}: {}. Which one did you mean?",
        slot.spoken_name(),
        join_spoken(&options, "or")
    )
}

/// Prompt for whatever the intent still needs: a disambiguation when a slot
/// is ambiguous, otherwise the slot by name.
pub fn ask_for_missing(intent: &Intent, slot: SlotName) -> String {
    match intent.ambiguity(slot) {
        Some(candidates) => disambiguate(slot, candidates),
        None => ask_for_slot(intent.kind(), slot),
    }
}

pub fn confirmation(intent: &Intent, memory: &ShortTermMemory) -> String {
    let text = |slot| intent.slot(slot).map(ToString::to_string).unwrap_or_default();
    match intent.kind() {
        IntentKind::Send => format!(
            "Send email to {}, subject {}, body '{}'?",
            text(SlotName::Recipient),
            text(SlotName::Subject),
            text(SlotName::Body)
        ),
        IntentKind::Reply => format!(
            "Reply to {} saying '{}'?",
            describe_reference(intent, memory),
            text(SlotName::Body)
        ),
        IntentKind::Forward => format!(
            "Forward {} to {}?",
            describe_reference(intent, memory),
            text(SlotName::Recipient)
        ),
        IntentKind::Delete => format!("Delete {}?", describe_reference(intent, memory)),
        kind => format!("Go ahead and {}?", action_phrase(kind)),
    }
}

pub fn confirmation_reprompt(intent: &Intent, memory: &ShortTermMemory) -> String {
    format!("Sorry, I need a yes or a no. {}", confirmation(intent, memory))
}

pub fn confirmation_abandoned(kind: IntentKind) -> String {
    format!("I still couldn't tell whether to go ahead, so I won't {}. Nothing was changed.", action_phrase(kind))
}

pub fn declined(kind: IntentKind) -> String {
    format!("Okay, I won't {}.", action_phrase(kind))
}

pub fn cancelled(kind: IntentKind) -> String {
    format!("Okay, I've dropped the request to {}. What else can I do for you?", action_phrase(kind))
}

pub fn execution_summary(intent: &Intent, output: &ExecutionOutput) -> String {
    let emails = output.emails();
    match intent.kind() {
        IntentKind::Send => match emails.first() {
            Some(email) => {
                format!("Done. Your email to {} has been sent.", join_spoken(email.recipients(), "and"))
            }
            None => "Done. Your email has been sent.".to_owned(),
        },
        IntentKind::Reply => match emails.first() {
            Some(email) => {
                format!("Done. Your reply to {} has been sent.", join_spoken(email.recipients(), "and"))
            }
            None => "Done. Your reply has been sent.".to_owned(),
        },
        IntentKind::Forward => match emails.first() {
            Some(email) => format!(
                "Done. I forwarded '{}' to {}.",
                email.subject(),
                join_spoken(email.recipients(), "and")
            ),
            None => "Done. The email has been forwarded.".to_owned(),
        },
        IntentKind::Delete => match emails.first() {
            Some(email) => format!("Done. I deleted the email '{}'.", email.subject()),
            None => "Done. The email has been deleted.".to_owned(),
        },
        IntentKind::Read => {
            if emails.is_empty() {
                return "You don't have any emails in your inbox right now.".to_owned();
            }
            let heading = format!("You have {} recent {}.", emails.len(), plural(emails.len()));
            list_messages(heading, "Email", emails)
        }
        IntentKind::Search => {
            let query = intent.slot(SlotName::Query).map(ToString::to_string).unwrap_or_default();
            if emails.is_empty() {
                return format!("I couldn't find any emails matching '{query}'.");
            }
            let heading =
                format!("I found {} {} matching '{query}'.", emails.len(), plural(emails.len()));
            list_messages(heading, "Result", emails)
        }
        IntentKind::Unknown => HELP.to_owned(),
    }
}

pub fn execution_failure(kind: IntentKind, error: &ExecutionError) -> String {
    if error.outcome_unknown() && kind.is_irreversible() {
        return format!(
            "I didn't hear back from your mail service in time, so I can't tell whether I managed \
to {}. Please check before asking me again.",
            action_phrase(kind)
        );
    }
    format!("Sorry, I couldn't {}: {}.", action_phrase(kind), error.user_summary())
}

fn action_phrase(kind: IntentKind) -> &'static str {
    match kind {
        IntentKind::Send => "send the email",
        IntentKind::Reply => "send the reply",
        IntentKind::Forward => "forward the email",
        IntentKind::Delete => "delete the email",
        IntentKind::Read => "read your inbox",
        IntentKind::Search => "search your inbox",
        IntentKind::Unknown => "do that",
    }
}

fn describe_reference(intent: &Intent, memory: &ShortTermMemory) -> String {
    let Some(id) = intent.slot(SlotName::MessageRef).and_then(SlotValue::as_reference) else {
        return "that email".to_owned();
    };
    match find(memory, id) {
        Some(email) => format!("the email from {} about {}", email.sender(), email.subject()),
        None => format!("message {id}"),
    }
}

fn find<'a>(memory: &'a ShortTermMemory, id: &MessageId) -> Option<&'a Email> {
    memory.recent().iter().find(|email| email.id() == Some(id))
}

fn list_messages(heading: String, label: &str, emails: &[Email]) -> String {
    let mut parts = vec![heading];
    for (index, email) in emails.iter().take(MAX_SPOKEN_SUMMARIES).enumerate() {
        parts.push(format!("{label} {}: {}.", index + 1, email.voice_line()));
    }
    if emails.len() > MAX_SPOKEN_SUMMARIES {
        parts.push(format!("And {} more.", emails.len() - MAX_SPOKEN_SUMMARIES));
    }
    parts.join(" ")
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "email"
    } else {
        "emails"
    }
}

fn join_spoken(items: &[String], conjunction: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} {conjunction} {last}", head.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ask_for_missing, confirmation, execution_failure, execution_summary, MAX_SPOKEN_SUMMARIES,
    };
    use crate::conversation::ShortTermMemory;
    use crate::domain::email::{Email, EmailParts, ExecutionOutput, MessageId};
    use crate::domain::intent::{Intent, IntentKind, SlotName, SlotValue};
    use crate::errors::ExecutionError;

    fn inbox(count: usize) -> Vec<Email> {
        (1..=count)
            .map(|n| {
                Email::received(EmailParts {
                    id: Some(MessageId(format!("m-{n}"))),
                    sender: format!("Sender {n}"),
                    recipients: vec!["me@example.com".to_owned()],
                    subject: format!("Topic {n}"),
                    ..EmailParts::default()
                })
            })
            .collect()
    }

    #[test]
    fn send_confirmation_quotes_the_body() {
        let intent = Intent::new(IntentKind::Send, 0.9)
            .expect("valid confidence")
            .with_slot(SlotName::Recipient, SlotValue::text("jane"))
            .with_slot(SlotName::Subject, SlotValue::text("meeting"))
            .with_slot(SlotName::Body, SlotValue::text("it's moved to 3pm"));

        assert_eq!(
            confirmation(&intent, &ShortTermMemory::default()),
            "Send email to jane, subject meeting, body 'it's moved to 3pm'?"
        );
    }

    #[test]
    fn delete_confirmation_names_the_remembered_message() {
        let mut memory = ShortTermMemory::default();
        memory.remember(&ExecutionOutput::Messages(inbox(2)));
        let intent = Intent::new(IntentKind::Delete, 0.9)
            .expect("valid confidence")
            .with_slot(SlotName::MessageRef, SlotValue::Reference(MessageId("m-2".to_owned())));

        assert_eq!(confirmation(&intent, &memory), "Delete the email from Sender 2 about Topic 2?");
    }

    #[test]
    fn missing_slot_prompt_names_the_slot() {
        let intent = Intent::new(IntentKind::Send, 0.9).expect("valid confidence");
        let prompt = ask_for_missing(&intent, SlotName::Body);
        assert!(prompt.contains("body"), "{prompt}");

        let ambiguous = intent.with_ambiguity(
            SlotName::Recipient,
            vec![SlotValue::text("jane"), SlotValue::text("john")],
        );
        assert_eq!(
            ask_for_missing(&ambiguous, SlotName::Recipient),
            "I heard more than one recipient: jane or john. Which one did you mean?"
        );
    }

    #[test]
    fn read_summary_lists_at_most_three_messages() {
        let intent = Intent::new(IntentKind::Read, 0.9).expect("valid confidence");
        let summary = execution_summary(&intent, &ExecutionOutput::Messages(inbox(5)));

        assert!(summary.starts_with("You have 5 recent emails."));
        assert!(summary.contains("Email 3: From Sender 3, subject: Topic 3."));
        assert!(!summary.contains("Email 4"));
        assert!(summary.ends_with(&format!("And {} more.", 5 - MAX_SPOKEN_SUMMARIES)));
    }

    #[test]
    fn empty_search_says_nothing_matched() {
        let intent = Intent::new(IntentKind::Search, 0.9)
            .expect("valid confidence")
            .with_slot(SlotName::Query, SlotValue::text("invoices"));
        assert_eq!(
            execution_summary(&intent, &ExecutionOutput::Messages(Vec::new())),
            "I couldn't find any emails matching 'invoices'."
        );
    }

    #[test]
    fn timed_out_send_is_reported_as_unknown_outcome() {
        let spoken =
            execution_failure(IntentKind::Send, &ExecutionError::Timeout { after_ms: 15_000 });
        assert!(spoken.contains("can't tell whether"), "{spoken}");

        let spoken = execution_failure(
            IntentKind::Send,
            &ExecutionError::InvalidRecipient("jane".to_owned()),
        );
        assert_eq!(spoken, "Sorry, I couldn't send the email: I couldn't find an address for jane.");
    }
}
