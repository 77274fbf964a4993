//! featurevault CLI - ingest events and query the feature stores
//!
//! Commands:
//! - `ingest` - Stream a CSV file through the feature store
//! - `latest` - Show the latest features of one entity
//! - `history` - Show historical features in a time window
//! - `health` - Check both stores are reachable
//! - `clean` - Remove all stored features
//! - `demo` - Ingest, query, clean and close in one run

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod loader;
mod logging;
mod output;
mod stores;

use commands::{clean, demo, health, history, ingest, latest};
use output::OutputFormat;

/// featurevault CLI - minimal feature store
#[derive(Parser)]
#[command(name = "featurevault")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Latest-value and historical feature store", long_about = None)]
struct Cli {
    /// Configuration file path (default: featurevault.yaml if present)
    #[arg(short, long, env = "FEATUREVAULT_CONFIG")]
    config: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table")]
    output: String,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a CSV file of events through the feature store
    Ingest {
        /// CSV file (defaults to the configured data path)
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Show the latest features of an entity
    Latest {
        /// Entity id
        entity_id: String,
    },

    /// Show historical features between two timestamps (inclusive)
    History {
        /// Window start ("2022-01-01 00:00:00", RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Window end
        #[arg(long)]
        end: String,
    },

    /// Check that both stores are reachable
    Health,

    /// Remove all stored features from both stores
    Clean,

    /// Ingest a file, print one entity and one window, then clean up
    Demo {
        /// CSV file (defaults to the configured data path)
        #[arg(short, long)]
        file: Option<String>,

        /// Entity to show the latest features for
        #[arg(long, default_value = "16")]
        entity: String,

        #[arg(long, default_value = "2022-01-01 00:00:00")]
        start: String,

        #[arg(long, default_value = "2022-02-01 00:00:00")]
        end: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;
    let format = OutputFormat::parse(&cli.output);

    let result = match cli.command {
        Commands::Ingest { file } => ingest::run(&config, file.as_deref(), format).await,
        Commands::Latest { entity_id } => latest::run(&config, &entity_id, format).await,
        Commands::History { start, end } => history::run(&config, &start, &end, format).await,
        Commands::Health => health::run(&config, format).await,
        Commands::Clean => clean::run(&config).await,
        Commands::Demo {
            file,
            entity,
            start,
            end,
        } => {
            let args = demo::DemoArgs {
                file: file.as_deref(),
                entity: &entity,
                start: &start,
                end: &end,
            };
            demo::run(&config, args).await
        }
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
