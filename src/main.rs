use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod config;
mod runtime;

use config::PipelineConfig;

#[derive(Parser)]
#[command(name = "flk")]
#[command(about = "feature-link - Write geographic features into file and relational stores", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from YAML configuration
    Run {
        /// Path to pipeline YAML file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a pipeline configuration
    Validate {
        /// Path to pipeline YAML file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Run { config } => {
            let pipeline = PipelineConfig::from_yaml_file(&config)?;
            runtime::run_pipeline(&pipeline)?;
        }
        Commands::Validate { config } => {
            let _pipeline = PipelineConfig::from_yaml_file(&config)?;
            println!("✓ Pipeline configuration is valid");
        }
        Commands::Version => {
            println!("flk version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
