//! secugen-ble - protocol tool for SecuGen Unity 20 BLE fingerprint readers.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use secugen_ble as app;

use app::config::{AppConfig, ConfigLoadResult, LoggingConfig};
use app::replay;

/// Protocol tool for SecuGen Unity 20 BLE fingerprint readers.
#[derive(Parser)]
#[command(name = "secugen-ble", version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded frame trace, printing results as JSON lines
    Replay { trace: PathBuf },
    /// Decode and check one 12-byte header
    Header {
        #[arg(required = true, num_args = 1..)]
        hex: Vec<String>,
    },
    /// Manage the config file
    Config {
        /// Write the default config
        #[arg(long)]
        init: bool,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let (config, load_note) = match AppConfig::try_load(&config_path) {
        ConfigLoadResult::Loaded(config) => (config, "Config loaded successfully"),
        ConfigLoadResult::Missing => (AppConfig::default(), "Config missing, using defaults"),
        ConfigLoadResult::Invalid(e) => {
            bail!("Config invalid ({}): {e}", config_path.display())
        }
    };

    // Initialize logging
    let _guard = init_logging(&config.logging)?;
    tracing::info!("Config path: {:?}", config_path);
    tracing::info!("{load_note}");

    match cli.command {
        Commands::Replay { trace } => run_replay(&trace, &config),
        Commands::Header { hex } => decode_header(&hex.join(" ")),
        Commands::Config { init, force } => {
            if !init {
                println!("{}", toml::to_string_pretty(&config)?);
                return Ok(());
            }
            if config_path.exists() && !force {
                bail!("{} already exists (use --force)", config_path.display());
            }
            AppConfig::default()
                .save(&config_path)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
    }
}

/// Console logging on stderr, plus a daily rolling file when configured.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(
        config
            .level
            .parse()
            .with_context(|| format!("Invalid log level '{}'", config.level))?,
    );
    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(directory) = &config.directory else {
        tracing_subscriber::registry().with(filter).with(console).init();
        return Ok(None);
    };

    let appender = tracing_appender::rolling::daily(directory, "secugen-ble.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

fn run_replay(trace: &Path, config: &AppConfig) -> anyhow::Result<()> {
    let lines = replay::run_file(trace, config).with_context(|| format!("Failed to replay {}", trace.display()))?;
    print!("{}", replay::to_json_lines(&lines)?);
    Ok(())
}

fn decode_header(hex: &str) -> anyhow::Result<()> {
    let value = replay::describe_header(hex)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
