use std::sync::Arc;

use async_trait::async_trait;
use mailvoice_core::conversation::Turn;
use mailvoice_core::domain::intent::{Intent, IntentKind, SlotName, SlotValue};
use mailvoice_core::errors::RecognitionError;
use tracing::debug;

/// Confidence reported for utterances matched by an explicit command pattern.
pub const PATTERN_CONFIDENCE: f32 = 0.8;
/// Confidence reported when the caller's words were taken as the awaited slot.
pub const CONTEXT_CONFIDENCE: f32 = 0.7;

#[derive(Clone, Debug, PartialEq)]
pub struct RecognitionRequest {
    pub text: String,
    pub recent_turns: Vec<Turn>,
    pub pending: Option<Intent>,
}

impl RecognitionRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), recent_turns: Vec::new(), pending: None }
    }

    pub fn with_pending(mut self, pending: Option<Intent>) -> Self {
        self.pending = pending;
        self
    }

    pub fn with_recent_turns(mut self, recent_turns: Vec<Turn>) -> Self {
        self.recent_turns = recent_turns;
        self
    }
}

/// Turns a transcript into an [`Intent`]. An utterance that means nothing
/// email related comes back as [`Intent::unknown`]; errors are reserved for
/// recognizers that could not run at all.
#[async_trait]
pub trait IntentRecognizer: Send + Sync {
    async fn recognize(&self, request: &RecognitionRequest) -> Result<Intent, RecognitionError>;
}

/// Keyword and marker-word recognizer. Needs no network and never fails.
#[derive(Clone, Debug, Default)]
pub struct RuleBasedRecognizer;

impl RuleBasedRecognizer {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str, pending: Option<&Intent>) -> Intent {
        let normalized_text = normalize_text(text);
        let tokens = tokenize(&normalized_text);
        if tokens.is_empty() {
            return Intent::unknown();
        }

        if let Some(pending) = pending {
            if let Some(awaiting) = pending.next_missing_slot() {
                return fill_awaited_slot(pending.kind(), awaiting, text, &tokens);
            }
        }

        let Some((kind, trigger)) = detect_kind(&tokens) else {
            return Intent::unknown();
        };
        if kind == IntentKind::Unknown {
            return Intent::unknown();
        }
        let intent = intent_of(kind, PATTERN_CONFIDENCE);
        let after_trigger = &tokens[trigger..];

        match kind {
            IntentKind::Send => extract_send(intent, after_trigger),
            IntentKind::Read => extract_read(intent, after_trigger),
            IntentKind::Search => extract_search(intent, after_trigger),
            IntentKind::Reply => extract_reply(intent, after_trigger),
            IntentKind::Forward => extract_forward(intent, after_trigger),
            IntentKind::Delete => extract_delete(intent, after_trigger),
            IntentKind::Unknown => intent,
        }
    }
}

#[async_trait]
impl IntentRecognizer for RuleBasedRecognizer {
    async fn recognize(&self, request: &RecognitionRequest) -> Result<Intent, RecognitionError> {
        Ok(self.extract(&request.text, request.pending.as_ref()))
    }
}

/// Asks `primary` first and falls back when it fails, returns `unknown`, or
/// is less sure than `accept_confidence`.
pub struct LayeredRecognizer {
    primary: Arc<dyn IntentRecognizer>,
    fallback: Arc<dyn IntentRecognizer>,
    accept_confidence: f32,
}

impl LayeredRecognizer {
    pub fn new(
        primary: Arc<dyn IntentRecognizer>,
        fallback: Arc<dyn IntentRecognizer>,
        accept_confidence: f32,
    ) -> Self {
        Self { primary, fallback, accept_confidence }
    }
}

#[async_trait]
impl IntentRecognizer for LayeredRecognizer {
    async fn recognize(&self, request: &RecognitionRequest) -> Result<Intent, RecognitionError> {
        match self.primary.recognize(request).await {
            Ok(intent)
                if intent.kind() != IntentKind::Unknown
                    && intent.confidence() >= self.accept_confidence =>
            {
                Ok(intent)
            }
            Ok(intent) => {
                debug!(
                    event_name = "recognition.fallback",
                    reason = "low_confidence",
                    kind = %intent.kind(),
                    confidence = intent.confidence(),
                    "primary recognizer was not confident; using fallback"
                );
                self.fallback.recognize(request).await
            }
            Err(error) => {
                debug!(
                    event_name = "recognition.fallback",
                    reason = "primary_failed",
                    error = %error,
                    "primary recognizer failed; using fallback"
                );
                self.fallback.recognize(request).await
            }
        }
    }
}

const ARTICLES: &[&str] = &["the", "a", "an", "my"];

const RECIPIENT_STOPS: &[&str] =
    &["about", "subject", "regarding", "titled", "saying", "says", "telling", "with", "body"];
const SUBJECT_STOPS: &[&str] = &["saying", "says", "telling", "tell", "with", "body"];
const REFERENCE_STOPS: &[&str] = &["saying", "says", "telling", "tell", "with", "and", "to"];

const SUBJECT_MARKERS: &[&[&str]] =
    &[&["subject", "is"], &["subject"], &["about"], &["regarding"], &["titled"]];
const BODY_MARKERS: &[&[&str]] = &[
    &["that", "says"],
    &["with", "body"],
    &["body", "is"],
    &["body"],
    &["saying"],
    &["says"],
    &["tell", "her"],
    &["tell", "him"],
    &["tell", "them"],
    &["telling", "her"],
    &["telling", "him"],
    &["telling", "them"],
];
const SEARCH_MARKERS: &[&[&str]] = &[
    &["search", "for"],
    &["look", "for"],
    &["looking", "for"],
    &["where", "is"],
    &["where", "are"],
    &["search"],
    &["find"],
];

/// Words a caller may put in front of the thing that was asked for.
const LEAD_INS: &[(SlotName, &[&[&str]])] = &[
    (
        SlotName::Recipient,
        &[&["send", "it", "to"], &["it's", "for"], &["it", "is", "for"], &["to"], &["for"]],
    ),
    (
        SlotName::Subject,
        &[
            &["the", "subject", "is"],
            &["subject", "is"],
            &["it's", "about"],
            &["it", "is", "about"],
            &["call", "it"],
            &["subject"],
            &["about"],
        ],
    ),
    (
        SlotName::Body,
        &[
            &["it", "should", "say"],
            &["the", "body", "is"],
            &["tell", "her"],
            &["tell", "him"],
            &["tell", "them"],
            &["say", "that"],
            &["saying"],
            &["say"],
        ],
    ),
    (SlotName::Query, &[&["search", "for"], &["look", "for"], &["emails", "about"], &["for"], &["about"]]),
];

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];

/// Words that already make sense to short-term memory on their own.
const REFERENCE_WORDS: &[&str] = &[
    "it", "that", "this", "the", "last", "latest", "first", "second", "third", "fourth", "fifth",
    "one", "email", "message", "from", "about",
];

fn intent_of(kind: IntentKind, confidence: f32) -> Intent {
    Intent::new(kind, confidence).unwrap_or_else(|_| Intent::unknown())
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || matches!(character, '@' | '.' | '\'' | '-' | '_' | '+') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_matches(|ch| ch == '.' || ch == '-' || ch == '\''))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Finds the command word and its position. Reply, forward and delete are
/// checked before send so "reply and send it" is not read as a new email.
fn detect_kind(tokens: &[String]) -> Option<(IntentKind, usize)> {
    let position = |words: &[&str]| tokens.iter().position(|token| words.contains(&token.as_str()));
    let mentions = |words: &[&str]| tokens.iter().any(|token| words.contains(&token.as_str()));

    if mentions(&["help"]) || contains_phrase(tokens, &["what", "can", "you", "do"]) {
        return Some((IntentKind::Unknown, 0));
    }
    if let Some(index) = position(&["reply", "respond"]) {
        return Some((IntentKind::Reply, index));
    }
    if let Some(index) = position(&["forward"]) {
        return Some((IntentKind::Forward, index));
    }
    if let Some(index) = position(&["delete", "remove", "trash"]) {
        return Some((IntentKind::Delete, index));
    }
    if let Some(index) = position(&["search", "find"])
        .or_else(|| phrase_position(tokens, &["look", "for"]))
        .or_else(|| phrase_position(tokens, &["looking", "for"]))
        .or_else(|| phrase_position(tokens, &["where", "is"]))
        .or_else(|| phrase_position(tokens, &["where", "are"]))
    {
        return Some((IntentKind::Search, index));
    }
    if let Some(index) = position(&["send", "write", "compose", "draft"]) {
        return Some((IntentKind::Send, index));
    }
    if tokens.first().map(String::as_str) == Some("email") && tokens.len() > 1 {
        return Some((IntentKind::Send, 0));
    }
    let mailbox_words = ["email", "emails", "inbox", "messages", "mail"];
    if let Some(index) = position(&["read", "check", "show", "any", "new", "list"]) {
        if mentions(&mailbox_words) {
            return Some((IntentKind::Read, index));
        }
    }
    if contains_phrase(tokens, &["in", "my", "inbox"]) {
        return Some((IntentKind::Read, 0));
    }
    None
}

fn extract_send(intent: Intent, tokens: &[String]) -> Intent {
    let recipient = segment_after(tokens, &[&["to"]], RECIPIENT_STOPS).or_else(|| {
        // "email jane about lunch"
        match tokens.first().map(String::as_str) {
            Some("email") => segment_after(tokens, &[&["email"]], RECIPIENT_STOPS),
            _ => None,
        }
    });
    let intent = match recipient {
        Some(recipient) => with_recipient(intent, &recipient),
        None => intent,
    };
    let intent = match segment_after(tokens, SUBJECT_MARKERS, SUBJECT_STOPS) {
        Some(subject) => intent.with_slot(SlotName::Subject, SlotValue::text(subject)),
        None => intent,
    };
    match segment_after(tokens, BODY_MARKERS, &[]) {
        Some(body) => intent.with_slot(SlotName::Body, SlotValue::text(body)),
        None => intent,
    }
}

fn extract_read(intent: Intent, tokens: &[String]) -> Intent {
    match tokens.iter().find_map(|token| parse_count(token)) {
        Some(count) => intent.with_slot(SlotName::Count, SlotValue::Number(count)),
        None => intent,
    }
}

fn extract_search(intent: Intent, tokens: &[String]) -> Intent {
    let Some(query) = segment_after(tokens, SEARCH_MARKERS, &[]) else {
        return intent;
    };
    let query =
        strip_leading(&query, &["emails", "email", "messages", "mail", "any", "about", "for"]);
    if query.is_empty() {
        return intent;
    }
    intent.with_slot(SlotName::Query, SlotValue::text(query))
}

fn extract_reply(intent: Intent, tokens: &[String]) -> Intent {
    let intent = match segment_after(tokens, &[&["reply", "to"], &["respond", "to"]], REFERENCE_STOPS)
    {
        Some(reference) => {
            intent.with_slot(SlotName::MessageRef, SlotValue::text(reference_phrase(&reference)))
        }
        None => intent,
    };
    match segment_after(tokens, BODY_MARKERS, &[]) {
        Some(body) => intent.with_slot(SlotName::Body, SlotValue::text(body)),
        None => intent,
    }
}

fn extract_forward(intent: Intent, tokens: &[String]) -> Intent {
    let intent = match segment_after(tokens, &[&["forward"]], REFERENCE_STOPS) {
        Some(reference) => {
            intent.with_slot(SlotName::MessageRef, SlotValue::text(reference_phrase(&reference)))
        }
        None => intent,
    };
    let intent = match segment_after(tokens, &[&["to"]], &["saying", "adding", "with"]) {
        Some(recipient) => with_recipient(intent, &recipient),
        None => intent,
    };
    match segment_after(tokens, &[&["saying"], &["adding"]], &[]) {
        Some(note) => intent.with_slot(SlotName::Body, SlotValue::text(note)),
        None => intent,
    }
}

fn extract_delete(intent: Intent, tokens: &[String]) -> Intent {
    match segment_after(tokens, &[&["delete"], &["remove"], &["trash"]], &[]) {
        Some(reference) => {
            intent.with_slot(SlotName::MessageRef, SlotValue::text(reference_phrase(&reference)))
        }
        None => intent,
    }
}

/// Context fill: the utterance answers the question that was asked. Free
/// text slots keep the caller's own wording; tokens only find the lead-in.
fn fill_awaited_slot(
    kind: IntentKind,
    awaiting: SlotName,
    text: &str,
    tokens: &[String],
) -> Intent {
    let intent = intent_of(kind, CONTEXT_CONFIDENCE);
    let lead_ins = LEAD_INS
        .iter()
        .find(|(slot, _)| *slot == awaiting)
        .map(|(_, lead_ins)| *lead_ins)
        .unwrap_or(&[]);

    match awaiting {
        SlotName::Body | SlotName::Subject | SlotName::Query => {
            let value = dictated_text(text, lead_ins);
            if value.chars().any(char::is_alphanumeric) {
                intent.with_slot(awaiting, SlotValue::text(value))
            } else {
                intent
            }
        }
        _ => {
            let value = strip_lead_in(&tokens.join(" "), lead_ins);
            if value.is_empty() {
                return intent;
            }
            match awaiting {
                SlotName::Recipient => with_recipient(intent, &value),
                SlotName::Count => match value.split(' ').find_map(parse_count) {
                    Some(count) => intent.with_slot(SlotName::Count, SlotValue::Number(count)),
                    None => intent,
                },
                SlotName::MessageRef => intent
                    .with_slot(SlotName::MessageRef, SlotValue::text(reference_phrase(&value))),
                slot => intent.with_slot(slot, SlotValue::text(value)),
            }
        }
    }
}

/// The original utterance, trimmed, with the longest lead-in cut off at a
/// word boundary. Casing and punctuation are kept.
fn dictated_text(text: &str, lead_ins: &[&[&str]]) -> String {
    let words = word_spans(text);
    let longest = lead_ins
        .iter()
        .filter(|lead_in| {
            lead_in.len() < words.len()
                && lead_in.iter().zip(&words).all(|(lead, (_, word))| bare_word(word) == *lead)
        })
        .map(|lead_in| lead_in.len())
        .max()
        .unwrap_or(0);

    match words.get(longest) {
        Some((start, _)) if longest > 0 => {
            let separators = |ch: char| ch.is_whitespace() || matches!(ch, ',' | ':' | ';' | '-');
            text[*start..].trim_start_matches(separators).trim_end().to_string()
        }
        _ => text.trim().to_string(),
    }
}

/// Whitespace separated words with their byte offsets.
fn word_spans(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;
    for (index, character) in text.char_indices() {
        match (character.is_whitespace(), start) {
            (true, Some(begin)) => {
                words.push((begin, &text[begin..index]));
                start = None;
            }
            (false, None) => start = Some(index),
            _ => {}
        }
    }
    if let Some(begin) = start {
        words.push((begin, &text[begin..]));
    }
    words
}

fn bare_word(word: &str) -> String {
    word.trim_matches(|ch: char| !ch.is_alphanumeric()).to_lowercase()
}

/// "jane or john" is two competing recipients; "jane and john" is one list.
fn with_recipient(intent: Intent, raw: &str) -> Intent {
    let recipient = strip_leading(raw, ARTICLES);
    if recipient.is_empty() || matches!(recipient.as_str(), "email" | "message" | "mail") {
        return intent;
    }
    let candidates = recipient
        .split(" or ")
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(SlotValue::text)
        .collect::<Vec<_>>();
    intent.with_ambiguity(SlotName::Recipient, candidates)
}

/// A bare name like "jane" is read as "the email from jane".
fn reference_phrase(segment: &str) -> String {
    let words = segment.split_whitespace().collect::<Vec<_>>();
    match words.as_slice() {
        [only] if !REFERENCE_WORDS.contains(only) && parse_count(only).is_none() => {
            format!("from {only}")
        }
        _ => segment.to_string(),
    }
}

fn parse_count(token: &str) -> Option<u32> {
    if let Ok(value) = token.parse::<u32>() {
        return (value > 0).then_some(value);
    }
    NUMBER_WORDS.iter().find(|(word, _)| *word == token).map(|(_, value)| *value)
}

/// Words following the first marker phrase, up to the next stop word.
fn segment_after(tokens: &[String], markers: &[&[&str]], stops: &[&str]) -> Option<String> {
    let (start, marker) = markers
        .iter()
        .filter_map(|marker| phrase_position(tokens, marker).map(|index| (index, *marker)))
        .min_by_key(|(index, marker)| (*index, std::cmp::Reverse(marker.len())))?;

    let words = tokens[start + marker.len()..]
        .iter()
        .take_while(|token| !stops.contains(&token.as_str()))
        .map(String::as_str)
        .collect::<Vec<_>>();
    let segment = strip_leading(&words.join(" "), &["is", "the", "a", "an"]);
    (!segment.is_empty()).then_some(segment)
}

fn phrase_position(tokens: &[String], phrase: &[&str]) -> Option<usize> {
    if phrase.is_empty() || tokens.len() < phrase.len() {
        return None;
    }
    tokens
        .windows(phrase.len())
        .position(|window| window.iter().zip(phrase).all(|(token, word)| token == word))
}

fn contains_phrase(tokens: &[String], phrase: &[&str]) -> bool {
    phrase_position(tokens, phrase).is_some()
}

fn strip_leading(text: &str, words: &[&str]) -> String {
    let mut remaining = text.split_whitespace().collect::<Vec<_>>();
    while remaining.first().is_some_and(|word| words.contains(word)) {
        remaining.remove(0);
    }
    remaining.join(" ")
}

/// Removes the longest matching lead-in, once.
fn strip_lead_in(text: &str, lead_ins: &[&[&str]]) -> String {
    let words = text.split_whitespace().collect::<Vec<_>>();
    let longest = lead_ins
        .iter()
        .filter(|lead_in| lead_in.len() < words.len() && words.starts_with(lead_in))
        .map(|lead_in| lead_in.len())
        .max()
        .unwrap_or(0);
    words[longest..].join(" ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use mailvoice_core::domain::intent::{Intent, IntentKind, SlotName, SlotValue};
    use mailvoice_core::errors::RecognitionError;

    use super::{
        IntentRecognizer, LayeredRecognizer, RecognitionRequest, RuleBasedRecognizer,
        CONTEXT_CONFIDENCE,
    };

    struct FixedRecognizer(Result<Intent, RecognitionError>);

    #[async_trait]
    impl IntentRecognizer for FixedRecognizer {
        async fn recognize(&self, _request: &RecognitionRequest) -> Result<Intent, RecognitionError> {
            self.0.clone()
        }
    }

    #[test]
    fn extracts_recipient_and_subject_from_send_request() {
        let intent =
            RuleBasedRecognizer::new().extract("Send an email to Jane about the meeting", None);

        assert_eq!(intent.kind(), IntentKind::Send);
        assert_eq!(intent.slot_text(SlotName::Recipient), Some("jane"));
        assert_eq!(intent.slot_text(SlotName::Subject), Some("meeting"));
        assert_eq!(intent.slot(SlotName::Body), None);
        assert_eq!(intent.next_missing_slot(), Some(SlotName::Body));
    }

    #[test]
    fn extracts_full_send_request_with_address() {
        let intent = RuleBasedRecognizer::new().extract(
            "Write an email to bob@example.com subject lunch saying see you at noon.",
            None,
        );

        assert_eq!(intent.slot_text(SlotName::Recipient), Some("bob@example.com"));
        assert_eq!(intent.slot_text(SlotName::Subject), Some("lunch"));
        assert_eq!(intent.slot_text(SlotName::Body), Some("see you at noon"));
        assert!(intent.is_executable());
    }

    #[test]
    fn competing_recipients_become_an_ambiguity() {
        let intent = RuleBasedRecognizer::new().extract("email jane or john about lunch", None);

        assert_eq!(intent.kind(), IntentKind::Send);
        assert_eq!(
            intent.ambiguity(SlotName::Recipient),
            Some(&[SlotValue::text("jane"), SlotValue::text("john")][..])
        );
        assert_eq!(intent.next_missing_slot(), Some(SlotName::Recipient));
    }

    #[test]
    fn pending_intent_takes_the_utterance_as_the_awaited_slot() {
        let pending = Intent::new(IntentKind::Send, 0.8)
            .expect("valid confidence")
            .with_slot(SlotName::Recipient, SlotValue::text("jane"))
            .with_slot(SlotName::Subject, SlotValue::text("meeting"));

        let intent =
            RuleBasedRecognizer::new().extract("tell her it's moved to 3pm", Some(&pending));

        assert_eq!(intent.kind(), IntentKind::Send);
        assert_eq!(intent.confidence(), CONTEXT_CONFIDENCE);
        assert_eq!(intent.slot_text(SlotName::Body), Some("it's moved to 3pm"));
    }

    #[test]
    fn dictated_body_keeps_casing_and_punctuation() {
        let pending = Intent::new(IntentKind::Send, 0.8)
            .expect("valid confidence")
            .with_slot(SlotName::Recipient, SlotValue::text("jane"))
            .with_slot(SlotName::Subject, SlotValue::text("budget"));
        let recognizer = RuleBasedRecognizer::new();

        let dictated = "Hi Jane, the budget is $5,000. Call me at (555) 123-4567!";
        let intent = recognizer.extract(dictated, Some(&pending));
        assert_eq!(intent.slot_text(SlotName::Body), Some(dictated));

        let led_in = recognizer.extract("  Tell her, That works for me!  ", Some(&pending));
        assert_eq!(led_in.slot_text(SlotName::Body), Some("That works for me!"));
    }

    #[test]
    fn dictated_subject_drops_only_the_lead_in() {
        let pending = Intent::new(IntentKind::Send, 0.8)
            .expect("valid confidence")
            .with_slot(SlotName::Recipient, SlotValue::text("jane"));

        let intent =
            RuleBasedRecognizer::new().extract("The subject is Q3 Budget (draft)", Some(&pending));
        assert_eq!(intent.slot_text(SlotName::Subject), Some("Q3 Budget (draft)"));
    }

    #[test]
    fn recognizes_read_search_and_message_commands() {
        let recognizer = RuleBasedRecognizer::new();

        let read = recognizer.extract("read my last five emails", None);
        assert_eq!(read.kind(), IntentKind::Read);
        assert_eq!(read.slot(SlotName::Count), Some(&SlotValue::Number(5)));

        let search = recognizer.extract("search for emails about invoices", None);
        assert_eq!(search.kind(), IntentKind::Search);
        assert_eq!(search.slot_text(SlotName::Query), Some("invoices"));

        let reply = recognizer.extract("reply to the second one saying thanks a lot", None);
        assert_eq!(reply.kind(), IntentKind::Reply);
        assert_eq!(reply.slot_text(SlotName::MessageRef), Some("second one"));
        assert_eq!(reply.slot_text(SlotName::Body), Some("thanks a lot"));

        let forward = recognizer.extract("forward it to carol", None);
        assert_eq!(forward.kind(), IntentKind::Forward);
        assert_eq!(forward.slot_text(SlotName::MessageRef), Some("it"));
        assert_eq!(forward.slot_text(SlotName::Recipient), Some("carol"));

        let delete = recognizer.extract("delete alice", None);
        assert_eq!(delete.kind(), IntentKind::Delete);
        assert_eq!(delete.slot_text(SlotName::MessageRef), Some("from alice"));
    }

    #[test]
    fn small_talk_and_help_are_unknown() {
        let recognizer = RuleBasedRecognizer::new();
        for text in ["what's the weather like", "help", "what can you do", "   "] {
            assert_eq!(recognizer.extract(text, None).kind(), IntentKind::Unknown, "{text}");
        }
    }

    #[tokio::test]
    async fn layered_recognizer_falls_back_on_failure_and_low_confidence() {
        let fallback: Arc<dyn IntentRecognizer> = Arc::new(RuleBasedRecognizer::new());
        let request = RecognitionRequest::new("check my inbox");

        let failing = LayeredRecognizer::new(
            Arc::new(FixedRecognizer(Err(RecognitionError::Unavailable("offline".to_owned())))),
            Arc::clone(&fallback),
            0.7,
        );
        let intent = failing.recognize(&request).await.expect("fallback should answer");
        assert_eq!(intent.kind(), IntentKind::Read);

        let unsure = LayeredRecognizer::new(
            Arc::new(FixedRecognizer(Ok(
                Intent::new(IntentKind::Delete, 0.3).expect("valid confidence")
            ))),
            Arc::clone(&fallback),
            0.7,
        );
        let intent = unsure.recognize(&request).await.expect("fallback should answer");
        assert_eq!(intent.kind(), IntentKind::Read);

        let confident = LayeredRecognizer::new(
            Arc::new(FixedRecognizer(Ok(
                Intent::new(IntentKind::Search, 0.95).expect("valid confidence")
            ))),
            fallback,
            0.7,
        );
        let intent = confident.recognize(&request).await.expect("primary should answer");
        assert_eq!(intent.kind(), IntentKind::Search);
    }
}
