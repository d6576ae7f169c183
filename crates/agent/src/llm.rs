//! LLM-backed intent recognition. The model only translates speech into a
//! structured intent; everything it returns is validated before use.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailvoice_core::config::{LlmConfig, LlmProvider};
use mailvoice_core::conversation::Speaker;
use mailvoice_core::domain::intent::{Intent, IntentKind, SlotName, SlotValue};
use mailvoice_core::errors::RecognitionError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::recognizer::{IntentRecognizer, LayeredRecognizer, RecognitionRequest, RuleBasedRecognizer};

/// LLM answers below this confidence are handed to the rule-based recognizer.
pub const LLM_ACCEPT_CONFIDENCE: f32 = 0.7;

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),
    #[error("llm endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm client could not be built: {0}")]
    Setup(String),
}

impl From<LlmError> for RecognitionError {
    fn from(error: LlmError) -> Self {
        match error {
            LlmError::Decode(detail) => RecognitionError::Malformed(detail),
            other => RecognitionError::Unavailable(other.to_string()),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(http: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into(), model: model.into() }
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .json(&json!({
                "model": self.model,
                "system": system,
                "prompt": prompt,
                "format": "json",
                "stream": false,
            }))
            .send()
            .await
            .map_err(|error| LlmError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let payload: OllamaResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        Ok(payload.response)
    }
}

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        http: Client,
        base_url: Option<String>,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string()),
            api_key,
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "model": self.model,
                "temperature": 0,
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": prompt },
                ],
            }))
            .send()
            .await
            .map_err(|error| LlmError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let completion: ChatCompletion =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Decode("completion carried no message content".to_string()))
    }
}

const SYSTEM_PROMPT: &str = "You turn one spoken request to an email assistant into JSON. \
Answer with a single JSON object and nothing else: \
{\"kind\": one of send|read|reply|forward|delete|search|unknown, \
\"confidence\": number between 0 and 1, \
\"slots\": {\"recipient\"?: string, \"subject\"?: string, \"body\"?: string, \
\"message_ref\"?: string, \"query\"?: string, \"count\"?: integer}, \
\"ambiguous\": {slot name: [competing values]}}. \
Only fill slots the caller actually said. Use kind unknown for anything that is not an email task.";

/// Recognizer that asks a language model for a JSON intent.
pub struct LlmIntentRecognizer {
    client: Arc<dyn LlmClient>,
}

impl LlmIntentRecognizer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IntentRecognizer for LlmIntentRecognizer {
    async fn recognize(&self, request: &RecognitionRequest) -> Result<Intent, RecognitionError> {
        let prompt = build_prompt(request);
        let raw = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
        let intent = parse_intent(&raw)?;

        // While a slot is awaited the answer can only ever be about the pending kind.
        match &request.pending {
            Some(pending) if pending.next_missing_slot().is_some() && intent.kind() != pending.kind() => {
                let mut coerced = Intent::new(pending.kind(), intent.confidence())
                    .map_err(|error| RecognitionError::Malformed(error.to_string()))?;
                for (slot, value) in intent.slots() {
                    coerced = coerced.with_slot(*slot, value.clone());
                }
                Ok(coerced)
            }
            _ => Ok(intent),
        }
    }
}

fn build_prompt(request: &RecognitionRequest) -> String {
    let mut lines = Vec::new();
    if !request.recent_turns.is_empty() {
        lines.push("Recent conversation:".to_string());
        for turn in &request.recent_turns {
            let speaker = match turn.speaker {
                Speaker::Caller => "caller",
                Speaker::Assistant => "assistant",
            };
            lines.push(format!("- {speaker}: {}", turn.text));
        }
    }
    if let Some(pending) = &request.pending {
        let filled = pending
            .slots()
            .iter()
            .map(|(slot, value)| format!("{}={value}", slot.key()))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "A {} request is in progress with: {}.",
            pending.kind().label(),
            if filled.is_empty() { "nothing yet".to_string() } else { filled }
        ));
        if let Some(awaiting) = pending.next_missing_slot() {
            lines.push(format!(
                "The assistant just asked for the {}; treat the caller's words as that value.",
                awaiting.key()
            ));
        }
    }
    lines.push(format!("Caller said: \"{}\"", request.text));
    lines.join("\n")
}

#[derive(Debug, Deserialize)]
struct IntentPayload {
    kind: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    slots: BTreeMap<String, Value>,
    #[serde(default)]
    ambiguous: BTreeMap<String, Vec<Value>>,
}

/// Validates a model answer. Unknown slot names are dropped; a kind the
/// assistant does not support is an error.
pub fn parse_intent(raw: &str) -> Result<Intent, RecognitionError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| RecognitionError::Malformed("no JSON object in model output".to_string()))?;
    let payload: IntentPayload = serde_json::from_str(json)
        .map_err(|error| RecognitionError::Malformed(error.to_string()))?;

    let kind = payload
        .kind
        .parse::<IntentKind>()
        .map_err(|error| RecognitionError::Malformed(error.to_string()))?;
    if kind == IntentKind::Unknown {
        return Ok(Intent::unknown());
    }

    let confidence = payload.confidence.unwrap_or(0.0).clamp(0.0, 1.0);
    let mut intent = Intent::new(kind, confidence)
        .map_err(|error| RecognitionError::Malformed(error.to_string()))?;

    for (name, value) in &payload.slots {
        let Ok(slot) = name.parse::<SlotName>() else {
            warn!(event_name = "recognition.llm.unknown_slot", slot = %name, "ignoring slot");
            continue;
        };
        if let Some(value) = slot_value(slot, value) {
            intent = intent.with_slot(slot, value);
        }
    }
    for (name, values) in &payload.ambiguous {
        let Ok(slot) = name.parse::<SlotName>() else {
            continue;
        };
        let candidates = values.iter().filter_map(|value| slot_value(slot, value)).collect();
        intent = intent.with_ambiguity(slot, candidates);
    }

    Ok(intent)
}

fn slot_value(slot: SlotName, value: &Value) -> Option<SlotValue> {
    match (slot, value) {
        (SlotName::Count, Value::Number(number)) => {
            number.as_u64().and_then(|count| u32::try_from(count).ok()).map(SlotValue::Number)
        }
        (SlotName::Count, Value::String(text)) => text.trim().parse().ok().map(SlotValue::Number),
        (_, Value::String(text)) if !text.trim().is_empty() => Some(SlotValue::text(text.trim())),
        (_, Value::Number(number)) => Some(SlotValue::text(number.to_string())),
        _ => None,
    }
}

/// Models sometimes wrap JSON in prose or code fences.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

pub fn build_llm_client(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>, LlmError> {
    let http = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|error| LlmError::Setup(error.to_string()))?;

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::Rules => return Ok(None),
        LlmProvider::Ollama => {
            let base_url = config
                .base_url
                .clone()
                .ok_or_else(|| LlmError::Setup("ollama needs llm.base_url".to_string()))?;
            Arc::new(OllamaClient::new(http, base_url, config.model.clone()))
        }
        LlmProvider::OpenAi => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| LlmError::Setup("openai needs llm.api_key".to_string()))?;
            Arc::new(OpenAiClient::new(http, config.base_url.clone(), api_key, config.model.clone()))
        }
    };
    Ok(Some(client))
}

/// Rule-based recognition alone, or the model first with rules as fallback.
pub fn build_recognizer(config: &LlmConfig) -> Result<Arc<dyn IntentRecognizer>, LlmError> {
    let rules: Arc<dyn IntentRecognizer> = Arc::new(RuleBasedRecognizer::new());
    Ok(match build_llm_client(config)? {
        None => rules,
        Some(client) => Arc::new(LayeredRecognizer::new(
            Arc::new(LlmIntentRecognizer::new(client)),
            rules,
            LLM_ACCEPT_CONFIDENCE,
        )),
    })
}
