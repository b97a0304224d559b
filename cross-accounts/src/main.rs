//! cross-accounts - Inspect and manage platform connections
//!
//! Unix-style tool over the connection store: list what a user has
//! connected and disconnect platforms, with best-effort remote
//! revocation.

use clap::{Parser, Subcommand};
use libcrosscast::logging::{LogFormat, LoggingConfig};
use libcrosscast::service::CrosscastService;
use libcrosscast::types::ConnectionSummary;
use libcrosscast::{CrosscastError, Platform, Result};

#[derive(Parser, Debug)]
#[command(name = "cross-accounts")]
#[command(version)]
#[command(about = "Inspect and manage platform connections")]
#[command(long_about = "\
cross-accounts - Inspect and manage platform connections

DESCRIPTION:
    cross-accounts shows which social platforms a user has connected and
    disconnects them on request. Disconnecting clears the stored tokens
    in place and tries to revoke the grant upstream; a failed revocation
    never blocks the local disconnect.

COMMANDS:
    list         List a user's connections
    connect      Print the authorize URL to connect a platform
    disconnect   Disconnect a platform

USAGE EXAMPLES:
    # Show all connections for a user
    cross-accounts list --user alice

    # Machine-readable output
    cross-accounts list --user alice --format json

    # Start connecting a platform (open the printed URL in a browser)
    cross-accounts connect twitter

    # Disconnect a platform
    cross-accounts disconnect youtube --user alice

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
    3 - Invalid input (unknown platform, bad format)
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
    /// List a user's connections
    List {
        /// User to list connections for
        #[arg(short, long)]
        user: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the authorize URL to connect a platform
    Connect {
        /// Platform: youtube, instagram, facebook, twitter, linkedin
        platform: String,
    },

    /// Disconnect a platform
    Disconnect {
        /// Platform: youtube, instagram, facebook, twitter, linkedin
        platform: String,

        /// User to disconnect for
        #[arg(short, long)]
        user: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    LoggingConfig::new(LogFormat::Text, level.to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let service = CrosscastService::new().await?;

    match cli.command {
        Commands::List { user, format } => {
            let summaries = service.connections().list(&user).await?;
            output_list(&summaries, &format)?;
        }
        Commands::Connect { platform } => {
            let platform = parse_platform(&platform)?;
            let redirect = service.connections().begin_connect(platform)?;
            println!("Open this URL to authorize {}:", platform);
            println!("{}", redirect.url);
        }
        Commands::Disconnect { platform, user } => {
            let platform = parse_platform(&platform)?;
            service.connections().disconnect(&user, platform).await?;
            println!("Disconnected {} for {}", platform, user);
        }
    }

    Ok(())
}

fn parse_platform(s: &str) -> Result<Platform> {
    s.parse().map_err(|_| {
        CrosscastError::InvalidInput(format!(
            "Unknown platform '{}'. Valid platforms: youtube, instagram, facebook, twitter, linkedin",
            s
        ))
    })
}

fn output_list(summaries: &[ConnectionSummary], format: &str) -> Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(summaries)
                .map_err(|e| CrosscastError::InvalidInput(e.to_string()))?;
            println!("{}", json);
        }
        "text" => {
            if summaries.is_empty() {
                println!("No connections");
                return Ok(());
            }
            for s in summaries {
                let state = if s.connected { "connected" } else { "disconnected" };
                println!("{:<12} {}", s.platform.to_string(), state);
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
