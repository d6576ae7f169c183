use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use mailvoice_cli::commands::{config, doctor, simulate};
use serde_json::Value;

#[test]
fn config_attributes_env_values_and_redacts_tokens() {
    with_env(
        &[("MAILVOICE_LLM_MODEL", "mistral"), ("MAILVOICE_MAILBOX_ACCOUNT_TOKEN", "tok-secret123")],
        || {
            let output = config::run(None);

            assert!(output.starts_with("effective config (source precedence: env > file > default):"));
            assert!(output.contains("- llm.model = mistral (source: env (MAILVOICE_LLM_MODEL))"));
            assert!(output.contains(
                "- mailbox.account_token = tok-*** (source: env (MAILVOICE_MAILBOX_ACCOUNT_TOKEN))"
            ));
            assert!(output.contains("- server.port = 8080 (source: default)"));
            assert!(output.contains("- llm.api_key = <unset> (source: default)"));
            assert!(!output.contains("secret123"), "tokens must never be printed");
        },
    );
}

#[test]
fn config_attributes_file_values_and_log_aliases() {
    with_env(&[("MAILVOICE_LOG_LEVEL", "debug")], || {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("mailvoice.toml");
        fs::write(&path, "[conversation]\nhistory_window = 4\n").expect("config file");

        let output = config::run(Some(&path));

        let expected = format!(
            "- conversation.history_window = 4 (source: file ({}))",
            path.display()
        );
        assert!(output.contains(&expected), "{output}");
        assert!(output.contains("- logging.level = debug (source: env (MAILVOICE_LOG_LEVEL))"));
    });
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[("MAILVOICE_LLM_PROVIDER", "openai")], || {
        let output = config::run(None);
        assert!(output.starts_with("config validation failed:"), "{output}");
        assert!(output.contains("llm.api_key"));
    });
}

#[test]
fn doctor_passes_with_default_config() {
    with_env(&[], || {
        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 0, "expected all checks to pass: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let names = payload["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .map(|check| check["name"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["config_validation", "recognizer_readiness", "mailbox_credentials", "rehearsal_call"]
        );
    });
}

#[test]
fn doctor_skips_remaining_checks_when_config_is_invalid() {
    with_env(&[("MAILVOICE_CONVERSATION_MAX_CONFIRMATION_ATTEMPTS", "0")], || {
        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][3]["name"], "rehearsal_call");
        assert_eq!(payload["checks"][3]["status"], "skipped");
    });
}

#[test]
fn doctor_human_output_lists_each_check() {
    with_env(&[], || {
        let result = doctor::run(None, false);
        assert!(result.output.starts_with("doctor: all readiness checks passed"));
        assert!(result.output.contains("- [ok] rehearsal_call:"));
    });
}

#[test]
fn simulate_default_script_sends_an_email() {
    with_env(&[], || {
        let result = simulate::run(None, None);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "simulate");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("assistant: Hello! I'm your email assistant."));
        assert!(message.contains("caller: send an email to jane about the meeting"));
        assert!(message.contains("assistant: Send email to jane, subject meeting, body 'it's moved to 3pm'?"));
        assert!(message.contains("assistant: Done. Your email to jane@example.com has been sent."));
        assert!(message.contains("assistant: You have 3 recent emails."));
    });
}

#[test]
fn simulate_runs_a_script_file() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("temp dir");
        let script = dir.path().join("delete.txt");
        fs::write(&script, "# tidy up\nread my emails\n\ndelete the second one\nyes\n")
            .expect("script file");

        let result = simulate::run(None, Some(&script));
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("assistant: Delete the email from john@example.com about Lunch on Friday?"));
        assert!(message.contains("assistant: Done. I deleted the email 'Lunch on Friday'."));
        assert!(message.ends_with("-- call ended (hangup), 0 email(s) sent"));
    });
}

#[test]
fn simulate_rejects_an_empty_script() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("temp dir");
        let script = dir.path().join("empty.txt");
        fs::write(&script, "# nothing to say\n\n").expect("script file");

        let result = simulate::run(None, Some(&script));
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "script");
    });
}

#[test]
fn simulate_returns_config_failure_for_a_missing_config_file() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("absent.toml");

        let result = simulate::run(Some(&missing), None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "MAILVOICE_SERVER_BIND_ADDRESS",
        "MAILVOICE_SERVER_PORT",
        "MAILVOICE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "MAILVOICE_LLM_PROVIDER",
        "MAILVOICE_LLM_API_KEY",
        "MAILVOICE_LLM_BASE_URL",
        "MAILVOICE_LLM_MODEL",
        "MAILVOICE_LLM_TIMEOUT_SECS",
        "MAILVOICE_CONVERSATION_RECOGNIZER_TIMEOUT_MS",
        "MAILVOICE_CONVERSATION_EXECUTOR_TIMEOUT_MS",
        "MAILVOICE_CONVERSATION_MAX_CONFIRMATION_ATTEMPTS",
        "MAILVOICE_CONVERSATION_MIN_CONFIDENCE",
        "MAILVOICE_CONVERSATION_HISTORY_WINDOW",
        "MAILVOICE_CONVERSATION_GREETING",
        "MAILVOICE_REPLIES_AFFIRMATIVE",
        "MAILVOICE_REPLIES_NEGATIVE",
        "MAILVOICE_REPLIES_CANCEL",
        "MAILVOICE_MAILBOX_SENDER_ADDRESS",
        "MAILVOICE_MAILBOX_ACCOUNT_TOKEN",
        "MAILVOICE_LOGGING_LEVEL",
        "MAILVOICE_LOGGING_FORMAT",
        "MAILVOICE_LOG_LEVEL",
        "MAILVOICE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
