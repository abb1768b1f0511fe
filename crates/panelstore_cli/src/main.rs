//! panelstore CLI
//!
//! Maintenance tools for a panelstore key space.
//!
//! # Commands
//!
//! - `rebuild-indexes` - Re-derive index sets from the stored records
//! - `verify-indexes` - Compare index sets against the stored records
//! - `inspect` - Show table sizes or a single record

mod commands;

use clap::{Parser, Subcommand};
use panelstore_core::{models, Connector, StoreConfig, TableSchema};
use tracing_subscriber::EnvFilter;

/// panelstore command-line maintenance tools.
#[derive(Parser)]
#[command(name = "panelstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Redis URL (defaults to REDIS_URL, then a local server)
    #[arg(global = true, short, long, env = "REDIS_URL")]
    url: Option<String>,

    /// Restrict the command to one table
    #[arg(global = true, short, long)]
    table: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-derive index sets from the stored records
    RebuildIndexes {
        /// Drop existing index sets first so stale memberships go away
        #[arg(short, long)]
        exact: bool,
    },

    /// Compare index sets against the stored records
    VerifyIndexes {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show table sizes, or one record with --id
    Inspect {
        /// Entity id to show
        #[arg(short, long)]
        id: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn selected_tables(
    table: Option<&str>,
) -> Result<Vec<&'static TableSchema>, Box<dyn std::error::Error>> {
    match table {
        Some(name) => {
            let schema = models::schema_by_name(name)
                .ok_or_else(|| format!("Unknown table: {name}"))?;
            Ok(vec![schema])
        }
        None => Ok(models::all_schemas().to_vec()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("panelstore CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("panelstore Core v{}", panelstore_core::VERSION);
        return Ok(());
    }

    let mut config = StoreConfig::from_env()?;
    if let Some(url) = cli.url {
        config = config.redis_url(url);
    }
    let tables = selected_tables(cli.table.as_deref())?;

    let connector = Connector::open(&config)?;
    connector.try_connect().await?;
    tracing::debug!(
        tables = tables.len(),
        encrypted = connector.is_encrypted(),
        "connected"
    );

    let outcome = match cli.command {
        Commands::RebuildIndexes { exact } => {
            commands::rebuild::run(&connector, &tables, exact).await
        }
        Commands::VerifyIndexes { format } => {
            commands::verify::run(&connector, &tables, &format).await
        }
        Commands::Inspect { id, format } => {
            commands::inspect::run(&connector, &tables, id.as_deref(), &format).await
        }
        Commands::Version => Ok(()),
    };

    connector.disconnect().await?;
    outcome
}
