pub mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use procura_core::JobName;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "procura",
    about = "Procura operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations and run scheduled sweeps on demand.",
    after_help = "Examples:\n  procura doctor --json\n  procura config\n  procura sweep vendor-expiry-check"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, notification dispatcher and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one scheduled sweep now and print its report")]
    Sweep {
        #[arg(help = "daily-reminders | urgent-reminders | delivery-delay-check | vendor-expiry-check | quote-conflict-reminder")]
        job: JobName,
        #[arg(long, help = "Evaluate the sweep as of this RFC 3339 instant instead of now")]
        at: Option<DateTime<Utc>>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Sweep { job, at } => commands::sweep::run(job, at.unwrap_or_else(Utc::now)),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
