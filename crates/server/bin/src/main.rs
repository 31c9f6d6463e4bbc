//! Outbox Relay Server
//!
//! Main entry point: bootstrap the store, serve the HTTP API, or run the
//! change-capture relay.

mod config;
mod startup;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use config::{AppConfig, CaptureMode};

/// CLI arguments for outbox-relay
#[derive(Parser, Debug)]
#[command(name = "outbox-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Transactional outbox relay", long_about = None)]
struct Args {
    /// Configuration file, layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Capture strategy, overriding the configuration
    #[arg(long, value_enum, global = true)]
    mode: Option<CaptureMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Serve the HTTP API and run the relay in the same process
    Serve,
    /// Create the database, tables and (replication mode) slot and publication
    Setup,
    /// Run only the change-capture relay
    Relay,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging(args.debug, args.log_format);

    let config = AppConfig::load(args.config.as_deref(), args.mode)?;

    match args.command {
        Command::Setup => startup::setup(&config).await,
        Command::Serve => startup::serve(config).await,
        Command::Relay => startup::relay(config).await,
    }
}

/// Setup logging based on debug flag and output format.
fn setup_logging(debug: bool, format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = fmt().with_env_filter(env_filter).with_target(true);
    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_relay_with_overrides() {
        let args = Args::try_parse_from([
            "outbox-relay",
            "--debug",
            "--log-format",
            "json",
            "relay",
            "--mode",
            "replication",
        ])
        .unwrap();
        assert_eq!(args.command, Command::Relay);
        assert!(args.debug);
        assert_eq!(args.log_format, LogFormat::Json);
        assert_eq!(args.mode, Some(CaptureMode::Replication));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Args::try_parse_from(["outbox-relay"]).is_err());
    }
}
