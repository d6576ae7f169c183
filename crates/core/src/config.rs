use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompts::DEFAULT_GREETING;
use crate::replies::ReplyPhrases;
use crate::turns::TurnPolicy;

/// Files tried, in order, when no explicit config path is given.
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["mailvoice.toml", "config/mailvoice.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub conversation: ConversationConfig,
    pub replies: ReplyPhrases,
    pub mailbox: MailboxConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub recognizer_timeout_ms: u64,
    pub executor_timeout_ms: u64,
    pub max_confirmation_attempts: u8,
    pub min_confidence: f32,
    pub history_window: usize,
    pub greeting: String,
}

impl ConversationConfig {
    pub fn turn_policy(&self) -> TurnPolicy {
        TurnPolicy {
            max_confirmation_attempts: self.max_confirmation_attempts,
            min_confidence: self.min_confidence,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MailboxConfig {
    pub sender_address: String,
    pub account_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Rules,
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub recognizer_timeout_ms: Option<u64>,
    pub executor_timeout_ms: Option<u64>,
    pub mailbox_account_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            llm: LlmConfig {
                provider: LlmProvider::Rules,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                timeout_secs: 10,
            },
            conversation: ConversationConfig {
                recognizer_timeout_ms: 4_000,
                executor_timeout_ms: 15_000,
                max_confirmation_attempts: 2,
                min_confidence: 0.5,
                history_window: 6,
                greeting: DEFAULT_GREETING.to_string(),
            },
            replies: ReplyPhrases::default(),
            mailbox: MailboxConfig {
                sender_address: "assistant@localhost".to_string(),
                account_token: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected rules|ollama|openai)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(value) = conversation.recognizer_timeout_ms {
                self.conversation.recognizer_timeout_ms = value;
            }
            if let Some(value) = conversation.executor_timeout_ms {
                self.conversation.executor_timeout_ms = value;
            }
            if let Some(value) = conversation.max_confirmation_attempts {
                self.conversation.max_confirmation_attempts = value;
            }
            if let Some(value) = conversation.min_confidence {
                self.conversation.min_confidence = value;
            }
            if let Some(value) = conversation.history_window {
                self.conversation.history_window = value;
            }
            if let Some(greeting) = conversation.greeting {
                self.conversation.greeting = greeting;
            }
        }

        if let Some(replies) = patch.replies {
            if let Some(affirmative) = replies.affirmative {
                self.replies.affirmative = affirmative;
            }
            if let Some(negative) = replies.negative {
                self.replies.negative = negative;
            }
            if let Some(cancel) = replies.cancel {
                self.replies.cancel = cancel;
            }
        }

        if let Some(mailbox) = patch.mailbox {
            if let Some(sender_address) = mailbox.sender_address {
                self.mailbox.sender_address = sender_address;
            }
            if let Some(account_token_value) = mailbox.account_token {
                self.mailbox.account_token = Some(secret_value(account_token_value));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MAILVOICE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MAILVOICE_SERVER_PORT") {
            self.server.port = parse_u16("MAILVOICE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MAILVOICE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MAILVOICE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("MAILVOICE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("MAILVOICE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MAILVOICE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("MAILVOICE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("MAILVOICE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("MAILVOICE_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MAILVOICE_CONVERSATION_RECOGNIZER_TIMEOUT_MS") {
            self.conversation.recognizer_timeout_ms =
                parse_u64("MAILVOICE_CONVERSATION_RECOGNIZER_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("MAILVOICE_CONVERSATION_EXECUTOR_TIMEOUT_MS") {
            self.conversation.executor_timeout_ms =
                parse_u64("MAILVOICE_CONVERSATION_EXECUTOR_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("MAILVOICE_CONVERSATION_MAX_CONFIRMATION_ATTEMPTS") {
            self.conversation.max_confirmation_attempts =
                parse_u8("MAILVOICE_CONVERSATION_MAX_CONFIRMATION_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("MAILVOICE_CONVERSATION_MIN_CONFIDENCE") {
            self.conversation.min_confidence =
                parse_f32("MAILVOICE_CONVERSATION_MIN_CONFIDENCE", &value)?;
        }
        if let Some(value) = read_env("MAILVOICE_CONVERSATION_HISTORY_WINDOW") {
            self.conversation.history_window =
                parse_usize("MAILVOICE_CONVERSATION_HISTORY_WINDOW", &value)?;
        }
        if let Some(value) = read_env("MAILVOICE_CONVERSATION_GREETING") {
            self.conversation.greeting = value;
        }

        if let Some(value) = read_env("MAILVOICE_REPLIES_AFFIRMATIVE") {
            self.replies.affirmative = split_list(&value);
        }
        if let Some(value) = read_env("MAILVOICE_REPLIES_NEGATIVE") {
            self.replies.negative = split_list(&value);
        }
        if let Some(value) = read_env("MAILVOICE_REPLIES_CANCEL") {
            self.replies.cancel = split_list(&value);
        }

        if let Some(value) = read_env("MAILVOICE_MAILBOX_SENDER_ADDRESS") {
            self.mailbox.sender_address = value;
        }
        if let Some(value) = read_env("MAILVOICE_MAILBOX_ACCOUNT_TOKEN") {
            self.mailbox.account_token = Some(secret_value(value));
        }

        let log_level =
            read_env("MAILVOICE_LOGGING_LEVEL").or_else(|| read_env("MAILVOICE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MAILVOICE_LOGGING_FORMAT").or_else(|| read_env("MAILVOICE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(value) = overrides.recognizer_timeout_ms {
            self.conversation.recognizer_timeout_ms = value;
        }
        if let Some(value) = overrides.executor_timeout_ms {
            self.conversation.executor_timeout_ms = value;
        }
        if let Some(account_token) = overrides.mailbox_account_token {
            self.mailbox.account_token = Some(secret_value(account_token));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_llm(&self.llm)?;
        validate_conversation(&self.conversation)?;
        validate_replies(&self.replies)?;
        validate_mailbox(&self.mailbox)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Config file that `load` would read for the given explicit path, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::Rules => {}
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider (set MAILVOICE_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider (e.g. http://localhost:11434)"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.recognizer_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "conversation.recognizer_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if conversation.executor_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "conversation.executor_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if conversation.max_confirmation_attempts == 0 {
        return Err(ConfigError::Validation(
            "conversation.max_confirmation_attempts must be at least 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&conversation.min_confidence) {
        return Err(ConfigError::Validation(
            "conversation.min_confidence must be in range 0.0..=1.0".to_string(),
        ));
    }

    if conversation.history_window == 0 {
        return Err(ConfigError::Validation(
            "conversation.history_window must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_replies(replies: &ReplyPhrases) -> Result<(), ConfigError> {
    let lists = [
        ("replies.affirmative", &replies.affirmative),
        ("replies.negative", &replies.negative),
        ("replies.cancel", &replies.cancel),
    ];
    for (key, phrases) in lists {
        if phrases.iter().all(|phrase| phrase.trim().is_empty()) {
            return Err(ConfigError::Validation(format!("{key} needs at least one phrase")));
        }
    }

    Ok(())
}

fn validate_mailbox(mailbox: &MailboxConfig) -> Result<(), ConfigError> {
    if !mailbox.sender_address.contains('@') {
        return Err(ConfigError::Validation(
            "mailbox.sender_address must be an email address".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| invalid(key, value))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| invalid(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    llm: Option<LlmPatch>,
    conversation: Option<ConversationPatch>,
    replies: Option<RepliesPatch>,
    mailbox: Option<MailboxPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    recognizer_timeout_ms: Option<u64>,
    executor_timeout_ms: Option<u64>,
    max_confirmation_attempts: Option<u8>,
    min_confidence: Option<f32>,
    history_window: Option<usize>,
    greeting: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RepliesPatch {
    affirmative: Option<Vec<String>>,
    negative: Option<Vec<String>>,
    cancel: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct MailboxPatch {
    sender_address: Option<String>,
    account_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
