//! ExamSnap - exam problem capture and tutoring CLI
//!
#![doc = "ExamSnap - exam problem capture and tutoring CLI"]
#![doc = "Main entry point for the ExamSnap application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use examsnap::cli::{Cli, Commands};
use examsnap::commands;
use examsnap::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing
    init_tracing(cli.verbose, config.logging.json);
    tracing::debug!("Configuration loaded from {}", config_path);

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Analyze { file, speak } => {
            tracing::info!("Analyzing {}", file.display());
            commands::analyze::run_analyze(config, &file, speak).await?;
            Ok(())
        }
        Commands::Capture { fallback, speak } => {
            tracing::info!("Starting camera capture");
            if let Some(path) = &fallback {
                tracing::debug!("Upload fallback: {}", path.display());
            }
            commands::capture::run_capture(config, fallback, speak).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(command, &config.history).await?;
            Ok(())
        }
        Commands::Session => {
            tracing::info!("Starting interactive capture session");
            commands::session::run_session(config).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "examsnap=debug" } else { "examsnap=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
