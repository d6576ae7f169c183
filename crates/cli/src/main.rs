use std::process::ExitCode;

fn main() -> ExitCode {
    mailvoice_cli::run()
}
