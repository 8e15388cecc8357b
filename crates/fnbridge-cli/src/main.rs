//! fnbridge — invoke a function on an out-of-process language worker.
//!
//! # Usage
//!
//! ```text
//! fnbridge invoke --function greet/function.json --http-method post \
//!     --url http://localhost/api/greet --header content-type:application/json \
//!     --body '{"name":"ada"}'
//! fnbridge invoke --function nightly/function.json --timer --past-due
//! fnbridge config --config fnbridge.toml
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use fnbridge_core::BridgeConfig;
use fnbridge_core::config::LogFormat;
use tracing_subscriber::EnvFilter;

mod bindings;
mod commands;

use commands::invoke::TriggerArgs;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "fnbridge.toml";

#[derive(Parser)]
#[command(
    name = "fnbridge",
    about = "Invocation bridge to out-of-process function workers",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to fnbridge.toml (default: ./fnbridge.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke a function once and print its outputs.
    ///
    /// Input bindings of type `literal` yield their `value` property. Every
    /// output binding is printed as `name = value`.
    Invoke {
        /// Path to the function's function.json
        #[arg(short, long)]
        function: PathBuf,

        #[command(flatten)]
        trigger: TriggerArgs,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config)?;

    match cli.command {
        Commands::Invoke { function, trigger } => {
            commands::invoke::run(&function, &config, trigger).await
        }
        Commands::Config => commands::config::show(&config),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            BridgeConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("loading {DEFAULT_CONFIG_FILE}"))
        }
        None => Ok(BridgeConfig::default()),
    }
}

/// `RUST_LOG` wins over `logging.filter`. Logs go to stderr so stdout only
/// carries function outputs.
fn init_tracing(config: &BridgeConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .with_context(|| format!("invalid log filter '{}'", config.logging.filter))?;

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}
