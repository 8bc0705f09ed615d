mod signals;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mongo_bootstrap::{
    MongoAdminChannel, ProvisionReport, Provisioner, ProvisionerConfig, init_logging,
};
use tokio_util::sync::CancellationToken;

/// Exit status when a run completed but some tenant failed.
const EXIT_PARTIAL: u8 = 2;

/// TinyX provisioner - prepares the MongoDB replica set and service databases
#[derive(Parser)]
#[command(name = "tinyx-provisioner")]
#[command(about = "TinyX provisioner - prepares the MongoDB replica set and service databases")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the replica set, root user and tenant databases
    Run,
    /// Validate configuration and exit
    Check,
    /// Print the tenant catalog and exit
    Catalog,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Some(path) = cli.config.as_deref()
        && !path.is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.display());
    }

    // Layered config: defaults -> YAML (if provided) -> env (TINYX__*)
    let config = ProvisionerConfig::load(cli.config.as_deref())
        .with_context(|| describe_source(cli.config.as_deref()))?;

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(ExitCode::SUCCESS);
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_logging(&config.logging, cli.verbose)?;
            run(&config).await
        }
        Commands::Check => {
            println!("Configuration is valid");
            print!("{}", config.to_yaml()?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Catalog => {
            for tenant in &config.catalog()? {
                println!("{}: {}", tenant.database, tenant.collections.join(", "));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn describe_source(path: Option<&Path>) -> String {
    match path {
        Some(path) => format!("failed to load configuration from {}", path.display()),
        None => "failed to load configuration".to_owned(),
    }
}

async fn run(config: &ProvisionerConfig) -> Result<ExitCode> {
    tracing::info!("TinyX provisioner starting");

    let plan = config.plan()?;
    let admin = Arc::new(
        MongoAdminChannel::connect(&config.connection)
            .await
            .context("failed to set up MongoDB client")?,
    );

    let cancel = CancellationToken::new();
    signals::cancel_on_signal(cancel.clone());

    let provisioner = Provisioner::new(admin, plan);
    match provisioner.run(&cancel).await {
        Ok(report) => Ok(exit_code(&report)),
        Err(e) => {
            tracing::error!(error = %e, "Initialization halted");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn exit_code(report: &ProvisionReport) -> ExitCode {
    if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    }
}
