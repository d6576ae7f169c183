use std::sync::Arc;

use mailvoice_agent::{
    build_recognizer, AccountCredentials, Collaborators, CredentialVault, InMemoryMailbox,
    LlmError, MailboxExecutor, ManagerSettings, Orchestrator, TracingAuditSink,
};
use mailvoice_core::config::{AppConfig, ConfigError, LoadOptions};
use mailvoice_core::replies::KeywordReplyClassifier;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{info, warn};

/// Token used for the in-memory mailbox session when none is configured.
const LOCAL_SESSION_TOKEN: &str = "local-session";

pub struct Application {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("intent recognizer setup failed: {0}")]
    Recognizer(#[from] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        "starting application bootstrap"
    );

    let recognizer = build_recognizer(&config.llm)?;
    info!(
        event_name = "system.bootstrap.recognizer_ready",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        "intent recognizer ready"
    );

    let token = match &config.mailbox.account_token {
        Some(token) => token.expose_secret().to_owned(),
        None => {
            warn!(
                event_name = "system.bootstrap.mailbox_token_missing",
                correlation_id = "bootstrap",
                "mailbox.account_token not set; using a local session for the in-memory mailbox"
            );
            LOCAL_SESSION_TOKEN.to_owned()
        }
    };
    let vault = Arc::new(
        CredentialVault::new()
            .with_fallback(AccountCredentials::new(config.mailbox.sender_address.clone(), token)),
    );
    let mailbox = Arc::new(InMemoryMailbox::with_sample_inbox());

    let collaborators = Collaborators {
        recognizer,
        executor: Arc::new(MailboxExecutor::new(
            mailbox,
            vault,
            config.mailbox.sender_address.clone(),
        )),
        replies: Arc::new(KeywordReplyClassifier::new(config.replies.clone())),
        audit: Arc::new(TracingAuditSink),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        collaborators,
        ManagerSettings::from_config(&config.conversation),
    ));

    info!(
        event_name = "system.bootstrap.complete",
        correlation_id = "bootstrap",
        "application bootstrap complete"
    );
    Ok(Application { config, orchestrator })
}

#[cfg(test)]
mod tests {
    use mailvoice_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_an_openai_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("openai without a key must fail").to_string();
        assert!(message.contains("llm.api_key"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_with_rules_starts_without_calls() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::Rules),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("rule-based bootstrap should succeed");

        assert_eq!(app.orchestrator.active_call_count(), 0);
        assert_eq!(app.config.llm.provider, LlmProvider::Rules);
    }
}
