//! cross-cron - Publish due scheduled posts
//!
//! Unix-style tool that runs the scheduler, either a single tick for
//! external cron or a built-in interval loop.

use clap::{Parser, Subcommand};
use libcrosscast::logging::{LogFormat, LoggingConfig};
use libcrosscast::service::CrosscastService;
use libcrosscast::{CrosscastError, Result, TickSummary};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cross-cron")]
#[command(version)]
#[command(about = "Publish due scheduled posts")]
#[command(long_about = "\
cross-cron - Publish due scheduled posts

DESCRIPTION:
    cross-cron drives the Crosscast scheduler. Each tick claims every
    scheduled post whose time has passed and publishes it to the post's
    selected platforms. Claims are atomic, so overlapping runs (two cron
    entries, a tick racing the loop) never publish a post twice.

COMMANDS:
    tick    Run a single scheduler pass and exit
    run     Tick continuously at a fixed interval

USAGE EXAMPLES:
    # One pass, for an external crontab entry
    cross-cron tick

    # One pass with machine-readable output
    cross-cron tick --format json

    # Built-in loop, one pass per minute
    cross-cron run --interval 60s

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Database location: ~/.local/share/crosscast/crosscast.db

    Override with environment variables:
        CROSSCAST_CONFIG       - Path to config file
        CROSSCAST_LOG_FORMAT   - Log format: text, json, pretty
        CROSSCAST_LOG_LEVEL    - Log level (default: info)

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database, configuration, or credential error
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single scheduler pass
    Tick {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Tick continuously at a fixed interval
    Run {
        /// Time between passes (e.g. "60s", "5m")
        #[arg(short, long, default_value = "60s")]
        interval: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    LoggingConfig::new(LogFormat::Text, level.to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let service = CrosscastService::new().await?;

    match cli.command {
        Commands::Tick { format } => {
            let summary = service.scheduler().tick().await?;
            output_summary(&summary, &format)?;
        }
        Commands::Run { interval } => {
            let interval: Duration = humantime::parse_duration(&interval).map_err(|e| {
                CrosscastError::InvalidInput(format!("invalid interval '{}': {}", interval, e))
            })?;
            if interval.is_zero() {
                return Err(CrosscastError::InvalidInput(
                    "interval must be greater than zero".to_string(),
                ));
            }

            tracing::info!(interval = %humantime::format_duration(interval), "scheduler loop started");
            let mut timer = tokio::time::interval(interval);
            loop {
                timer.tick().await;
                // One bad pass must not kill the loop
                if let Err(e) = service.scheduler().tick().await {
                    tracing::error!(error = %e, "scheduler tick failed");
                }
            }
        }
    }

    Ok(())
}

fn output_summary(summary: &TickSummary, format: &str) -> Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(summary)
                .map_err(|e| CrosscastError::InvalidInput(e.to_string()))?;
            println!("{}", json);
        }
        "text" => {
            println!(
                "Processed {} post(s): {} published, {} failed",
                summary.processed, summary.published, summary.failed
            );
            for error in &summary.errors {
                println!("  error: {}", error);
            }
        }
        other => {
            return Err(CrosscastError::InvalidInput(format!(
                "Invalid format '{}'. Must be 'text' or 'json'",
                other
            )));
        }
    }
    Ok(())
}
