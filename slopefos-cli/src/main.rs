//! slopefos CLI: train FoS models and serve predictions.
//!
//! `train` runs the full pipeline and writes an artifact directory;
//! `serve` exposes the promoted models over HTTP.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// slopefos: slope-stability Factor of Safety prediction
#[derive(Parser, Debug)]
#[command(name = "slopefos", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Extract the dataset, train the roster, test promoted models, save artifacts
    Train {
        /// CSV export of the source spreadsheet
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Artifact output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Train without the pore-pressure ratio feature
        #[arg(long)]
        no_ru: bool,
        /// Seed for the train/test permutation
        #[arg(long)]
        seed: Option<u64>,
        /// Fraction of rows held out for testing
        #[arg(long)]
        test_fraction: Option<f64>,
        /// Promote the top N models by training R² instead of the fixed pair
        #[arg(long)]
        ranked: Option<usize>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve predictions over HTTP
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Artifact directory to load
        #[arg(short, long)]
        models: Option<PathBuf>,
    },
    /// Predict FoS for one layer, or for a JSON request body
    Predict {
        /// Cohesion (kPa)
        #[arg(long, required_unless_present = "request")]
        cohesion: Option<f64>,
        /// Friction angle (degrees)
        #[arg(long, required_unless_present = "request")]
        friction_angle: Option<f64>,
        /// Unit weight (kN/m³)
        #[arg(long, required_unless_present = "request")]
        unit_weight: Option<f64>,
        /// Pore-pressure ratio
        #[arg(long, default_value_t = 0.0)]
        ru: f64,
        /// gradient_boosting or xgboost
        #[arg(long)]
        model: Option<String>,
        /// JSON file in the `POST /predict` format (single- or multi-layer)
        #[arg(long, conflicts_with_all = ["cohesion", "friction_angle", "unit_weight", "model"])]
        request: Option<PathBuf>,
        /// Artifact directory to load
        #[arg(short, long)]
        models: Option<PathBuf>,
    },
    /// Show the manifest and results of an artifact directory
    Inspect {
        /// Artifact directory to inspect
        #[arg(short, long)]
        models: Option<PathBuf>,
        /// Re-check every file checksum
        #[arg(long)]
        verify: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file into the workspace
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // RUST_LOG overrides -v/-q on stderr; the JSON file always records debug
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    let log_dir = directories::ProjectDirs::from("dev", "slopefos", "slopefos")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "slopefos.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
