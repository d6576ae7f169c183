use std::path::Path;

use mailvoice_agent::{build_recognizer, CallEnd};
use mailvoice_core::config::{AppConfig, LlmProvider};
use serde::Serialize;

use crate::commands::simulate::simulate;
use crate::commands::{load_options, CommandResult};

const REHEARSAL_LINE: &str = "read my emails";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(config_path: Option<&Path>, json_output: bool) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(config_path: Option<&Path>) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(load_options(config_path)) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            let recognizer = check_recognizer(&config);
            let recognizer_ready = recognizer.status == CheckStatus::Pass;
            checks.push(recognizer);
            checks.push(check_mailbox_credentials(&config));
            if recognizer_ready {
                checks.push(check_rehearsal_call(&config));
            } else {
                checks.push(skipped("rehearsal_call", "intent recognizer is not ready"));
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["recognizer_readiness", "mailbox_credentials", "rehearsal_call"] {
                checks.push(skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str, reason: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
}

fn check_recognizer(config: &AppConfig) -> DoctorCheck {
    match build_recognizer(&config.llm) {
        Ok(_) => {
            let details = match config.llm.provider {
                LlmProvider::Rules => "rule-based recognizer, no model required".to_string(),
                provider => format!(
                    "`{}` model `{}` with rule-based fallback",
                    provider.as_str(),
                    config.llm.model
                ),
            };
            DoctorCheck { name: "recognizer_readiness", status: CheckStatus::Pass, details }
        }
        Err(error) => DoctorCheck {
            name: "recognizer_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_mailbox_credentials(config: &AppConfig) -> DoctorCheck {
    let details = if config.mailbox.account_token.is_some() {
        format!("account token configured for `{}`", config.mailbox.sender_address)
    } else {
        format!(
            "no account token for `{}`; the in-memory mailbox runs on a local session",
            config.mailbox.sender_address
        )
    };
    DoctorCheck { name: "mailbox_credentials", status: CheckStatus::Pass, details }
}

fn check_rehearsal_call(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "rehearsal_call",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let script = [REHEARSAL_LINE.to_string()];
    match runtime.block_on(simulate(config, &script)) {
        Ok(simulation) if simulation.end == CallEnd::Hangup => DoctorCheck {
            name: "rehearsal_call",
            status: CheckStatus::Pass,
            details: format!("`{REHEARSAL_LINE}` answered in {} turns", simulation.dialogue.len()),
        },
        Ok(simulation) => DoctorCheck {
            name: "rehearsal_call",
            status: CheckStatus::Fail,
            details: format!("call ended unexpectedly ({})", simulation.end.as_str()),
        },
        Err(error) => DoctorCheck { name: "rehearsal_call", status: CheckStatus::Fail, details: error },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
