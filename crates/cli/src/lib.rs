pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "dcx",
    about = "Pay-per-call exchange operator CLI",
    long_about = "Operate the call exchange: migrations, demo data, config inspection, \
                  readiness checks and routing previews.",
    after_help = "Examples:\n  dcx migrate\n  dcx seed\n  dcx route --campaign camp-demo-auto \
                  --supplier sup-demo\n  dcx doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo supplier, campaign, buyers, offers and tracking number")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Preview (or with --commit, perform) a routing decision for a campaign")]
    Route(commands::route::RouteArgs),
    #[command(about = "Validate config, signature readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Route(args) => commands::route::run(args),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
