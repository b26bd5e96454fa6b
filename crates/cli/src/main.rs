mod commands;
mod metrics;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omniconvert_core::config::load_config_from_env;
use omniconvert_core::{load_config, validate_config, Config, LogFormat};

/// Environment variable naming the configuration file
const CONFIG_ENV: &str = "OMNICONVERT_CONFIG";

/// Configuration file picked up from the working directory
const DEFAULT_CONFIG_FILE: &str = "omniconvert.toml";

#[derive(Parser)]
#[command(name = "omniconvert")]
#[command(version, about = "Convert files between formats, chaining engines when needed", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one or more files
    Convert {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Target format (extension)
        #[arg(short, long, value_name = "FORMAT")]
        to: String,

        /// Output file, only with a single input
        #[arg(short, long, conflicts_with = "output_dir")]
        output: Option<PathBuf>,

        /// Directory for output files
        #[arg(short = 'd', long)]
        output_dir: Option<PathBuf>,

        /// Number of concurrent conversions
        #[arg(short, long)]
        workers: Option<usize>,

        /// Print Prometheus metrics once all conversions finished
        #[arg(long)]
        metrics: bool,
    },

    /// Show the plan for a conversion
    Route {
        source: String,
        target: String,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the formats a file or format can be converted into
    Targets {
        #[arg(value_name = "FORMAT_OR_PATH")]
        source: String,
    },

    /// Check that engine binaries are installed
    Check,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = config_path(cli.config, std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let config = match &config_path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => load_config_from_env().context("Failed to load config from environment")?,
    };
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(&config);
    match &config_path {
        Some(path) => info!("Configuration loaded from {:?}", path),
        None => info!("Using default configuration"),
    }

    match cli.command {
        Commands::Convert {
            inputs,
            to,
            output,
            output_dir,
            workers,
            metrics,
        } => {
            let mut config = config;
            if let Some(workers) = workers {
                config.queue.workers = workers;
                validate_config(&config).context("Invalid --workers")?;
            }
            let result = commands::convert(&config, inputs, &to, output, output_dir).await;
            if metrics {
                print!("{}", crate::metrics::encode_metrics()?);
            }
            result
        }
        Commands::Route {
            source,
            target,
            json,
        } => commands::route(&config, &source, &target, json),
        Commands::Targets { source } => commands::targets(&config, &source),
        Commands::Check => commands::check(&config).await,
    }
}

/// Picks the configuration file: the flag, then the environment, then
/// `omniconvert.toml` when it exists.
fn config_path(flag: Option<PathBuf>, env: Option<PathBuf>) -> Option<PathBuf> {
    flag.or(env).or_else(|| {
        let default = Path::new(DEFAULT_CONFIG_FILE);
        default.exists().then(|| default.to_path_buf())
    })
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());
    let json = config.logging.format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}
