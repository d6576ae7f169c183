use std::env;
use std::fs;
use std::path::Path;

use mailvoice_core::config::{resolve_config_path, AppConfig};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::load_options;

struct Sources {
    doc: Option<Value>,
    path: Option<String>,
}

pub fn run(config_path: Option<&Path>) -> String {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = resolve_config_path(config_path);
    let sources = Sources {
        doc: load_config_file_doc(file_path.as_deref()),
        path: file_path.map(|path| path.display().to_string()),
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key: &str, value: String, env_keys: &[&str]| {
        lines.push(render_line(key, &value, field_source(key, env_keys, &sources)));
    };

    push("server.bind_address", config.server.bind_address.clone(), &["MAILVOICE_SERVER_BIND_ADDRESS"]);
    push("server.port", config.server.port.to_string(), &["MAILVOICE_SERVER_PORT"]);
    push(
        "server.graceful_shutdown_secs",
        config.server.graceful_shutdown_secs.to_string(),
        &["MAILVOICE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
    );

    push("llm.provider", config.llm.provider.as_str().to_string(), &["MAILVOICE_LLM_PROVIDER"]);
    push("llm.model", config.llm.model.clone(), &["MAILVOICE_LLM_MODEL"]);
    push(
        "llm.base_url",
        config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        &["MAILVOICE_LLM_BASE_URL"],
    );
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    push("llm.api_key", llm_api_key.to_string(), &["MAILVOICE_LLM_API_KEY"]);
    push("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["MAILVOICE_LLM_TIMEOUT_SECS"]);

    let conversation = &config.conversation;
    push(
        "conversation.recognizer_timeout_ms",
        conversation.recognizer_timeout_ms.to_string(),
        &["MAILVOICE_CONVERSATION_RECOGNIZER_TIMEOUT_MS"],
    );
    push(
        "conversation.executor_timeout_ms",
        conversation.executor_timeout_ms.to_string(),
        &["MAILVOICE_CONVERSATION_EXECUTOR_TIMEOUT_MS"],
    );
    push(
        "conversation.max_confirmation_attempts",
        conversation.max_confirmation_attempts.to_string(),
        &["MAILVOICE_CONVERSATION_MAX_CONFIRMATION_ATTEMPTS"],
    );
    push(
        "conversation.min_confidence",
        conversation.min_confidence.to_string(),
        &["MAILVOICE_CONVERSATION_MIN_CONFIDENCE"],
    );
    push(
        "conversation.history_window",
        conversation.history_window.to_string(),
        &["MAILVOICE_CONVERSATION_HISTORY_WINDOW"],
    );
    push(
        "conversation.greeting",
        format!("{:?}", conversation.greeting),
        &["MAILVOICE_CONVERSATION_GREETING"],
    );

    push("replies.affirmative", config.replies.affirmative.join(", "), &["MAILVOICE_REPLIES_AFFIRMATIVE"]);
    push("replies.negative", config.replies.negative.join(", "), &["MAILVOICE_REPLIES_NEGATIVE"]);
    push("replies.cancel", config.replies.cancel.join(", "), &["MAILVOICE_REPLIES_CANCEL"]);

    push(
        "mailbox.sender_address",
        config.mailbox.sender_address.clone(),
        &["MAILVOICE_MAILBOX_SENDER_ADDRESS"],
    );
    let account_token = match &config.mailbox.account_token {
        Some(token) => redact_token(token.expose_secret()),
        None => "<unset>".to_string(),
    };
    push("mailbox.account_token", account_token, &["MAILVOICE_MAILBOX_ACCOUNT_TOKEN"]);

    push(
        "logging.level",
        config.logging.level.clone(),
        &["MAILVOICE_LOGGING_LEVEL", "MAILVOICE_LOG_LEVEL"],
    );
    push(
        "logging.format",
        format!("{:?}", config.logging.format).to_lowercase(),
        &["MAILVOICE_LOGGING_FORMAT", "MAILVOICE_LOG_FORMAT"],
    );

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(key_path: &str, env_keys: &[&str], sources: &Sources) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = &sources.doc {
        if contains_path(doc, key_path) {
            let file_path = sources.path.as_deref().unwrap_or("config file");
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn tokens_keep_only_their_prefix() {
        assert_eq!(redact_token("tok-abc123"), "tok-***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file() {
        let doc: toml::Value = "[llm]\nmodel = \"phi3\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.provider"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
