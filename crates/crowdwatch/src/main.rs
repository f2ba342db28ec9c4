//! crowdwatch - crowd density monitoring daemon
//!
//! Runs the monitoring pipeline for a venue and inspects its alert history.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crowd_audit::AcknowledgmentStatus;
use crowd_proto::ThresholdLevel;
use crowdwatch::commands::{self, HistoryQuery};
use crowdwatch::{VenueConfig, WatchError};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "crowdwatch")]
#[command(about = "Crowd density monitoring and alerting")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring pipeline
    Run {
        /// Path to venue config
        #[arg(short, long, default_value = "crowdwatch.toml", env = "CROWDWATCH_CONFIG")]
        config: PathBuf,

        /// Stop after this many seconds instead of waiting for ctrl-c
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Validate a venue config and print a summary
    CheckConfig {
        /// Path to venue config
        #[arg(short, long, default_value = "crowdwatch.toml", env = "CROWDWATCH_CONFIG")]
        config: PathBuf,
    },

    /// Write a sample venue config
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "crowdwatch.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the persisted alert history
    History {
        /// Path to venue config
        #[arg(short, long, default_value = "crowdwatch.toml", env = "CROWDWATCH_CONFIG")]
        config: PathBuf,

        /// Only alerts for this area (repeatable)
        #[arg(long)]
        area: Vec<String>,

        /// Only alerts of this severity (repeatable)
        #[arg(long)]
        severity: Vec<ThresholdLevel>,

        /// Only emergency escalations
        #[arg(long)]
        emergency: bool,

        /// Only acknowledged alerts
        #[arg(long, conflicts_with = "unacknowledged")]
        acknowledged: bool,

        /// Only unacknowledged alerts
        #[arg(long)]
        unacknowledged: bool,

        /// Earliest timestamp (RFC 3339)
        #[arg(long)]
        since: Option<String>,

        /// Latest timestamp (RFC 3339)
        #[arg(long)]
        until: Option<String>,

        /// Maximum entries to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// List oldest first
        #[arg(long)]
        oldest_first: bool,

        /// Print entries as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show areas, adjacency and thresholds in people
    Areas {
        /// Path to venue config
        #[arg(short, long, default_value = "crowdwatch.toml", env = "CROWDWATCH_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("crowdwatch=info,crowd_alerts=info,crowd_density=info,crowd_audit=info")
    };
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    match cli.command {
        Commands::Run { config, duration } => {
            info!(config = %config.display(), "starting crowdwatch");
            let venue = VenueConfig::from_file(&config)?;
            commands::run(venue, duration.map(Duration::from_secs)).await?;
        }

        Commands::CheckConfig { config } => {
            print!("{}", commands::check_config(&config)?);
        }

        Commands::InitConfig { output, force } => {
            commands::init_config(&output, force)?;
            println!("Sample config written to {}", output.display());
            println!();
            println!("Next steps:");
            println!("  1. Edit the areas, capacities and adjacency for your venue");
            println!("  2. Set audit.persistence_path to keep alert history");
            println!("  3. Run: crowdwatch run --config {}", output.display());
        }

        Commands::History {
            config,
            area,
            severity,
            emergency,
            acknowledged,
            unacknowledged,
            since,
            until,
            limit,
            oldest_first,
            json,
        } => {
            let venue = VenueConfig::from_file(&config)?;
            let acknowledgment = if acknowledged {
                AcknowledgmentStatus::Acknowledged
            } else if unacknowledged {
                AcknowledgmentStatus::Unacknowledged
            } else {
                AcknowledgmentStatus::All
            };
            let query = HistoryQuery {
                areas: area,
                severities: severity,
                emergency_only: emergency,
                acknowledgment,
                since: since.as_deref().map(commands::parse_timestamp).transpose()?,
                until: until.as_deref().map(commands::parse_timestamp).transpose()?,
                limit,
                oldest_first,
            };
            if let (Some(since), Some(until)) = (query.since, query.until) {
                if since > until {
                    return Err(WatchError::Argument("--since is after --until".to_string()).into());
                }
            }
            commands::history(&venue, &query, json)?;
        }

        Commands::Areas { config } => {
            let venue = VenueConfig::from_file(&config)?;
            print!("{}", commands::describe_areas(&venue.graph()?, &venue.thresholds));
        }
    }

    Ok(())
}
