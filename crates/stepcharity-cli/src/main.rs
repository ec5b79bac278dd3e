use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "stepcharity", version, about = "StepCharity step tracker CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Step counts for today and recent days
    Steps {
        #[command(subcommand)]
        action: commands::steps::StepsAction,
    },
    /// Push step counts to the ledger
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Inspect or reset the stored step baseline
    Baseline {
        #[command(subcommand)]
        action: commands::baseline::BaselineAction,
    },
    /// Sensor and baseline debug report
    Diagnose,
    /// Register this device for an employee
    Register(commands::register::RegisterArgs),
    /// Participating companies
    Companies {
        #[command(subcommand)]
        action: commands::companies::CompaniesAction,
    },
    /// Dashboard: today, the last 7 days and lifetime totals
    Stats,
    /// Program goal settings
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("STEPCHARITY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Steps { action } => commands::steps::run(action).await,
        Commands::Sync { action } => commands::sync::run(action).await,
        Commands::Baseline { action } => commands::baseline::run(action).await,
        Commands::Diagnose => commands::diagnose::run().await,
        Commands::Register(args) => commands::register::run(args).await,
        Commands::Companies { action } => commands::companies::run(action).await,
        Commands::Stats => commands::stats::run().await,
        Commands::Settings { action } => commands::settings::run(action).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
