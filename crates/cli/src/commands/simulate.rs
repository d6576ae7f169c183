//! Rehearses a call: a scripted caller talks to a real orchestrator backed by
//! the in-memory mailbox, and the recorded dialogue is printed.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mailvoice_agent::{
    build_recognizer, AccountCredentials, CallEnd, Collaborators, CredentialVault,
    InMemoryMailbox, MailboxExecutor, ManagerSettings, Orchestrator, TracingAuditSink,
};
use mailvoice_core::config::AppConfig;
use mailvoice_core::conversation::{CallId, CallerId, Speaker};
use mailvoice_core::replies::KeywordReplyClassifier;
use mailvoice_voice::{CallerHandle, LocalVoiceChannel};
use secrecy::ExposeSecret;
use tokio::time::timeout;

use crate::commands::{load_options, CommandResult};

const DEFAULT_SCRIPT: &[&str] = &[
    "send an email to jane about the meeting",
    "tell her it's moved to 3pm",
    "yes",
    "read my emails",
];

const SIMULATED_CALL: &str = "simulated-call";
const SIMULATED_CALLER: &str = "simulator";
const SPEECH_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct Simulation {
    pub dialogue: Vec<(Speaker, String)>,
    pub sent: usize,
    pub end: CallEnd,
}

impl Simulation {
    pub fn render(&self) -> String {
        let mut lines = self
            .dialogue
            .iter()
            .map(|(speaker, text)| {
                let who = match speaker {
                    Speaker::Caller => "caller",
                    Speaker::Assistant => "assistant",
                };
                format!("{who}: {text}")
            })
            .collect::<Vec<_>>();
        lines.push(format!("-- call ended ({}), {} email(s) sent", self.end.as_str(), self.sent));
        lines.join("\n")
    }
}

pub fn run(config_path: Option<&Path>, script: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("simulate", "config_validation", error.to_string(), 2)
        }
    };

    let utterances = match script {
        Some(path) => match fs::read_to_string(path) {
            Ok(raw) => parse_script(&raw),
            Err(error) => {
                return CommandResult::failure(
                    "simulate",
                    "script",
                    format!("could not read script `{}`: {error}", path.display()),
                    3,
                )
            }
        },
        None => DEFAULT_SCRIPT.iter().map(|line| line.to_string()).collect(),
    };
    if utterances.is_empty() {
        return CommandResult::failure("simulate", "script", "script has no caller lines", 3);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                4,
            )
        }
    };

    match runtime.block_on(simulate(&config, &utterances)) {
        Ok(simulation) => CommandResult::success("simulate", simulation.render()),
        Err(error) => CommandResult::failure("simulate", "simulation", error, 5),
    }
}

/// Caller lines from a script file. Blank lines and `#` comments are skipped.
pub fn parse_script(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub async fn simulate(config: &AppConfig, utterances: &[String]) -> Result<Simulation, String> {
    let recognizer = build_recognizer(&config.llm).map_err(|error| error.to_string())?;
    let token = config
        .mailbox
        .account_token
        .as_ref()
        .map(|token| token.expose_secret().to_string())
        .unwrap_or_else(|| "local-session".to_string());
    let vault = Arc::new(
        CredentialVault::new()
            .with_fallback(AccountCredentials::new(config.mailbox.sender_address.clone(), token)),
    );
    let mailbox = Arc::new(InMemoryMailbox::with_sample_inbox());
    let collaborators = Collaborators {
        recognizer,
        executor: Arc::new(MailboxExecutor::new(
            mailbox.clone(),
            vault,
            config.mailbox.sender_address.clone(),
        )),
        replies: Arc::new(KeywordReplyClassifier::new(config.replies.clone())),
        audit: Arc::new(TracingAuditSink),
    };
    let settings = ManagerSettings::from_config(&config.conversation);
    let reply_wait = settings.recognizer_timeout + settings.executor_timeout + SPEECH_MARGIN;
    let greets = settings.greeting.is_some();
    let orchestrator = Orchestrator::new(collaborators, settings);

    let (channel, mut caller) = LocalVoiceChannel::pair();
    let completion = orchestrator
        .start_call(
            CallId(SIMULATED_CALL.to_string()),
            CallerId(SIMULATED_CALLER.to_string()),
            Arc::new(channel),
        )
        .map_err(|error| error.to_string())?;

    if greets {
        hear(&mut caller, reply_wait, "the greeting").await?;
    }
    for utterance in utterances {
        caller.say(utterance).map_err(|error| error.to_string())?;
        hear(&mut caller, reply_wait, utterance).await?;
    }
    caller.hang_up().map_err(|error| error.to_string())?;

    let report = timeout(reply_wait, completion.wait())
        .await
        .map_err(|_| "call did not end after hang-up".to_string())?
        .ok_or_else(|| "call ended without a report".to_string())?;

    Ok(Simulation {
        dialogue: report
            .conversation
            .turns()
            .iter()
            .map(|turn| (turn.speaker, turn.text.clone()))
            .collect(),
        sent: mailbox.sent().len(),
        end: report.end,
    })
}

async fn hear(caller: &mut CallerHandle, wait: Duration, after: &str) -> Result<String, String> {
    match timeout(wait, caller.hear()).await {
        Ok(Some(text)) => Ok(text),
        Ok(None) => Err(format!("call closed while waiting for a reply to `{after}`")),
        Err(_) => Err(format!("assistant did not respond to `{after}` in time")),
    }
}
