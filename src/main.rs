//! Timewolf CLI

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use timewolf::config::{KernelConfig, DEFAULT_CONFIG_FILE};
use timewolf_core::ContainerRegistry;
use timewolf_modules::create_default_registry;

#[derive(Parser)]
#[command(name = "timewolf", about = "Timewolf - forensic pipeline orchestration kernel")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered container types
    Containers,
    /// List registered modules
    Modules,
    /// Print the effective configuration
    Config {
        /// Print the resolved config file path instead
        #[arg(long)]
        path: bool,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = KernelConfig::load_with_env(&cli.config)?;
    timewolf::logging::init(&config.logging)?;
    tracing::debug!(
        path = %cli.config.display(),
        pool_size = config.runner.pool_size,
        "configuration loaded"
    );

    match cli.command {
        Some(Commands::Containers) => {
            for tag in ContainerRegistry::with_catalog().tags() {
                println!("{}", tag);
            }
        }
        Some(Commands::Modules) => {
            let registry = create_default_registry();
            for name in registry.list() {
                let description = registry
                    .create(name)
                    .map(|m| m.description().to_string())
                    .unwrap_or_default();
                println!("{:<24} {}", name, description);
            }
        }
        Some(Commands::Config { path: true }) => {
            let resolved = std::fs::canonicalize(&cli.config).unwrap_or_else(|_| cli.config.clone());
            println!("{}", resolved.display());
        }
        Some(Commands::Config { path: false }) => {
            print!("{}", config.to_toml()?);
        }
        Some(Commands::Version) | None => {
            println!("timewolf {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
