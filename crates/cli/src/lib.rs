pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use policyplanner_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "planner",
    about = "PolicyPlanner operator CLI",
    long_about = "Inspect configuration, check readiness, migrate the enquiry store, inspect or clear stored enquiries, and drive enquiry journeys headlessly.",
    after_help = "Examples:\n  planner doctor --json\n  planner inspect --product supertopup\n  planner journey --script demos/journeys/super-top-up.json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a policyplanner.toml file")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        default_value = commands::DEFAULT_SESSION_ID,
        help = "Session identity used for session-scoped storage"
    )]
    session: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, storage connectivity, and collaborator endpoints")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending storage migrations and return structured status output")]
    Migrate,
    #[command(about = "Show what a product's wizard would find in storage on mount")]
    Inspect {
        #[arg(long, help = "supertopup | pa | gmc | hospicash")]
        product: String,
    },
    #[command(about = "Remove a product's stored enquiry, restore flag and last-page marker")]
    Clear {
        #[arg(long, help = "supertopup | pa | gmc | hospicash")]
        product: String,
    },
    #[command(about = "Drive one product wizard from a JSON action script and print a report")]
    Journey {
        #[arg(long, help = "Path to the journey script")]
        script: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = || LoadOptions { config_path: cli.config.clone(), ..LoadOptions::default() };

    if let Ok(config) = AppConfig::load(options()) {
        logging::init_logging(&config);
    }

    let result = match &cli.command {
        Command::Config => commands::CommandResult {
            exit_code: 0,
            output: commands::config::run(options()),
        },
        Command::Doctor { json } => commands::CommandResult {
            exit_code: 0,
            output: commands::doctor::run(options(), *json),
        },
        Command::Migrate => commands::migrate::run(options()),
        Command::Inspect { product } => commands::inspect::run(options(), product, &cli.session),
        Command::Clear { product } => commands::clear::run(options(), product, &cli.session),
        Command::Journey { script } => commands::journey::run(options(), script, &cli.session),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
