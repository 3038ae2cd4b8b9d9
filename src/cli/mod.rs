//! CLI module for the cost book ingestion tool.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::{ConfigOverrides, OutputFormat};

/// Embed construction cost records and upsert them into a Qdrant collection.
#[derive(Debug, Parser)]
#[command(name = "costbook-ingest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, short = 'c', global = true, help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Ingest options used when no subcommand is given.
    #[command(flatten)]
    pub ingest: commands::IngestArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Credentials and endpoints, usually supplied through the environment.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConnectionArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", global = true)]
    pub embedding_url: Option<String>,

    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true, global = true)]
    pub qdrant_api_key: Option<String>,

    #[arg(long, env = "QDRANT_URL", global = true)]
    pub qdrant_url: Option<String>,

    #[arg(long, env = "QDRANT_COLLECTION", global = true)]
    pub collection: Option<String>,

    #[arg(long, env = "COSTBOOK_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Embed every record of the input file and upsert it (default)
    Ingest(commands::IngestArgs),

    /// Check vector store reachability and collection size
    Status,
}

impl Cli {
    /// Collect command-line and environment values into config overrides.
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            openai_api_key: self.connection.openai_api_key.clone(),
            embedding_url: self.connection.embedding_url.clone(),
            qdrant_api_key: self.connection.qdrant_api_key.clone(),
            qdrant_url: self.connection.qdrant_url.clone(),
            collection: self.connection.collection.clone(),
            timeout_secs: self.connection.timeout_secs,
            ..Default::default()
        };
        let ingest = self.ingest_args();
        overrides.input = ingest.input.clone();
        overrides.batch_size = ingest.batch_size;
        overrides
    }

    /// Ingest options of the effective command.
    pub fn ingest_args(&self) -> &commands::IngestArgs {
        match &self.command {
            Some(Commands::Ingest(args)) => args,
            _ => &self.ingest,
        }
    }
}
