pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use repricer_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "repricer",
    about = "Repricer operator CLI",
    long_about = "Operate quote pricing: calculate and apply prices, inspect staleness, \
                  update price settings, and run the legacy-flag migration lifecycle.",
    after_help = "Examples:\n  repricer seed\n  repricer calculate quote-sheet-001\n  repricer settings update --file settings.json\n  repricer legacy run"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Calculate (or return the cached) price for one quote")]
    Calculate {
        quote_id: String,
        #[arg(long, help = "Recompute even when the cached price is still current")]
        force: bool,
    },
    #[command(about = "Apply a quote's calculated price to its displayed price")]
    Apply { quote_id: String },
    #[command(about = "Calculate prices for a list of quotes, isolating per-item failures")]
    BatchCalculate {
        ids: Vec<String>,
        #[arg(long, help = "Process every stored quote")]
        all: bool,
        #[arg(long, help = "Recompute even when cached prices are still current")]
        force: bool,
    },
    #[command(about = "Apply calculated prices for a list of quotes")]
    BatchApply {
        ids: Vec<String>,
        #[arg(long, help = "Process every stored quote")]
        all: bool,
    },
    #[command(about = "Recompute one quote without committing, flagging price or content drift")]
    Drift { quote_id: String },
    #[command(about = "Show per-state quote counts and the active settings version")]
    Status,
    #[command(subcommand, about = "Inspect or update the price settings document")]
    Settings(SettingsCommand),
    #[command(subcommand, about = "Run the legacy-flag migration lifecycle")]
    Legacy(LegacyCommand),
    #[command(about = "Apply pending database schema migrations")]
    Migrate,
    #[command(about = "Load deterministic demo fixtures")]
    Seed,
    #[command(about = "Run readiness checks: config, database, settings, formula")]
    Doctor,
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    #[command(about = "Show the active settings document")]
    Show,
    #[command(about = "Save a new settings version and sweep stale quotes")]
    Update {
        #[arg(long, help = "JSON file with the new formula and parameters")]
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum LegacyCommand {
    #[command(about = "Convert quotes from the old flag scheme to price statuses")]
    Run,
    #[command(about = "Scan for structural defects without changing anything")]
    Validate,
    #[command(about = "Strip preserved legacy backups once validation passes")]
    Cleanup,
    #[command(about = "Emergency: restore the old flags from the preserved backups")]
    Rollback,
}

/// Installs the tracing subscriber once, honoring the configured level and
/// format. Commands keep working if config loading fails; they report the
/// config error themselves.
fn init_tracing() {
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match config.logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    // A second init (tests, embedding) is fine; logging just stays as-is.
    let _ = result;
}

pub fn run() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Calculate { quote_id, force } => commands::calculate::run(&quote_id, force),
        Command::Apply { quote_id } => commands::apply::run(&quote_id),
        Command::BatchCalculate { ids, all, force } => {
            commands::batch::run_calculate(ids, all, force)
        }
        Command::BatchApply { ids, all } => commands::batch::run_apply(ids, all),
        Command::Drift { quote_id } => commands::drift::run(&quote_id),
        Command::Status => commands::status::run(),
        Command::Settings(SettingsCommand::Show) => commands::settings::run_show(),
        Command::Settings(SettingsCommand::Update { file }) => {
            commands::settings::run_update(file)
        }
        Command::Legacy(LegacyCommand::Run) => commands::legacy::run_migrate(),
        Command::Legacy(LegacyCommand::Validate) => commands::legacy::run_validate(),
        Command::Legacy(LegacyCommand::Cleanup) => commands::legacy::run_cleanup(),
        Command::Legacy(LegacyCommand::Rollback) => commands::legacy::run_rollback(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor => commands::doctor::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
