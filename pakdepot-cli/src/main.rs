//! pakdepot CLI - install and inspect packages from a JSON catalog.

mod commands;
mod error;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pakdepot::manager::{ManagerConfig, PackageManager};

use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "pakdepot", version, about)]
struct Cli {
    /// Path to the JSON package catalog.
    #[arg(long, global = true, default_value = "catalog.json")]
    catalog: PathBuf,

    /// Installation directory (defaults to the platform data directory).
    #[arg(long, global = true)]
    install_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download and install a package
    Install {
        /// Package id from the catalog
        id: String,

        /// Install this exact version instead of the latest
        #[arg(long)]
        version: Option<String>,

        /// Install the latest version built for this SDK version
        #[arg(long, conflicts_with = "version")]
        sdk_version: Option<String>,

        /// Keep the downloaded archive after installation
        #[arg(long)]
        keep_archive: bool,

        /// Download timeout in seconds
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
    /// Update installed packages to their latest catalog versions
    Update {
        /// Package id from the catalog; all updatable packages when omitted
        id: Option<String>,
    },
    /// List catalog packages and their installation status
    List,
    /// Show details for one package
    Info {
        /// Package id from the catalog
        id: String,
    },
    /// Remove an installed package
    Uninstall {
        /// Package id from the catalog
        id: String,
    },
}

fn build_manager(cli: &Cli, keep_archives: bool, timeout: Duration) -> Result<PackageManager, CliError> {
    let mut config = match &cli.install_dir {
        Some(dir) => ManagerConfig::new(dir),
        None => ManagerConfig::default(),
    };
    config = config.with_keep_archives(keep_archives).with_timeout(timeout);

    let manager = PackageManager::new(config);
    manager.load_catalog(&cli.catalog)?;
    Ok(manager)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Commands::Install {
            id,
            version,
            sdk_version,
            keep_archive,
            timeout,
        } => {
            let manager = build_manager(&cli, *keep_archive, Duration::from_secs(*timeout))?;
            commands::install::run(&manager, id, version.as_deref(), sdk_version.as_deref()).await
        }
        Commands::Update { id } => {
            let manager = build_manager(&cli, false, Duration::from_secs(300))?;
            commands::update::run(&manager, id.as_deref()).await
        }
        Commands::List => {
            let manager = build_manager(&cli, false, Duration::from_secs(300))?;
            commands::list::run(&manager)
        }
        Commands::Info { id } => {
            let manager = build_manager(&cli, false, Duration::from_secs(300))?;
            commands::info::run(&manager, id)
        }
        Commands::Uninstall { id } => {
            let manager = build_manager(&cli, false, Duration::from_secs(300))?;
            commands::uninstall::run(&manager, id)
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
