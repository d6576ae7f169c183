//! Classification of short caller replies ("yes", "no", "cancel").
//!
//! The conversation manager only depends on [`ReplyClassifier`]; the keyword
//! classifier here is the default and its phrase lists come from config.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyClass {
    Affirmative,
    Negative,
    /// The whole utterance is a cancel phrase.
    Cancel,
    /// Starts with a cancel phrase but says more, as in "stop by my desk".
    /// Only a confirmation prompt treats this as cancelling.
    LeadingCancel,
    Unclear,
}

pub trait ReplyClassifier: Send + Sync {
    fn classify(&self, text: &str) -> ReplyClass;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPhrases {
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
    pub cancel: Vec<String>,
}

impl Default for ReplyPhrases {
    fn default() -> Self {
        Self {
            affirmative: owned(&[
                "yes", "yeah", "yep", "yup", "sure", "correct", "right", "confirm", "send it",
                "go ahead", "do it", "ok", "okay",
            ]),
            negative: owned(&["no", "nope", "nah", "don't", "do not", "wait", "not yet"]),
            cancel: owned(&["cancel", "stop", "never mind", "nevermind", "forget it", "abort"]),
        }
    }
}

/// Matches an utterance against phrase lists. A phrase matches when the
/// normalized utterance equals it or starts with it as whole words. Cancel
/// phrases are reported apart depending on which of the two happened.
#[derive(Clone, Debug)]
pub struct KeywordReplyClassifier {
    phrases: ReplyPhrases,
}

impl KeywordReplyClassifier {
    pub fn new(phrases: ReplyPhrases) -> Self {
        let normalize_all = |list: Vec<String>| -> Vec<String> {
            list.iter().map(|phrase| normalize(phrase)).filter(|phrase| !phrase.is_empty()).collect()
        };
        Self {
            phrases: ReplyPhrases {
                affirmative: normalize_all(phrases.affirmative),
                negative: normalize_all(phrases.negative),
                cancel: normalize_all(phrases.cancel),
            },
        }
    }
}

impl Default for KeywordReplyClassifier {
    fn default() -> Self {
        Self::new(ReplyPhrases::default())
    }
}

impl ReplyClassifier for KeywordReplyClassifier {
    fn classify(&self, text: &str) -> ReplyClass {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return ReplyClass::Unclear;
        }

        let affirmative = leads_with_any(&normalized, &self.phrases.affirmative);
        let negative = leads_with_any(&normalized, &self.phrases.negative);
        let cancel = leads_with_any(&normalized, &self.phrases.cancel);

        match (affirmative, negative, cancel) {
            (false, _, true) if self.phrases.cancel.contains(&normalized) => ReplyClass::Cancel,
            (false, _, true) => ReplyClass::LeadingCancel,
            (false, true, false) => ReplyClass::Negative,
            (true, false, false) => ReplyClass::Affirmative,
            _ => ReplyClass::Unclear,
        }
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| (*word).to_owned()).collect()
}

fn leads_with_any(normalized: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|phrase| {
        normalized == phrase
            || normalized.strip_prefix(phrase.as_str()).is_some_and(|rest| rest.starts_with(' '))
    })
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '\'' { ch } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
