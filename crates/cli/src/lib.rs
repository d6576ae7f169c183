pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "mailvoice",
    about = "Mailvoice operator CLI",
    long_about = "Inspect configuration, check readiness, and rehearse calls against the in-memory mailbox.",
    after_help = "Examples:\n  mailvoice doctor --json\n  mailvoice config\n  mailvoice simulate --script calls/send.txt"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this file instead of mailvoice.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, recognizer setup, and a rehearsal call")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Play a scripted caller transcript through a full call and print the dialogue")]
    Simulate {
        #[arg(long, help = "File with one caller utterance per line; `#` starts a comment")]
        script: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config_path) }
        }
        Command::Doctor { json } => commands::doctor::run(config_path, json),
        Command::Simulate { script } => commands::simulate::run(config_path, script.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
