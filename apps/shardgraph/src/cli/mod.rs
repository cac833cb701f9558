//! # shardgraph CLI Module
//!
//! ## Available Commands
//!
//! - `load` - Run a local cluster over CSV shards and publish the fragment group
//! - `inspect` - Show a published fragment group, or list persisted objects

mod commands;

use crate::config::{AppConfig, Backend};
use clap::{Parser, Subcommand};
use shardgraph_core::{LoadError, ObjectId, PartitionStrategy};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// shardgraph - partitioned property-graph loader
///
/// Loads tabular vertex and edge shards into one immutable graph, split into
/// fragments across a set of cooperating workers.
#[derive(Parser, Debug)]
#[command(name = "shardgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load CSV shards into fragments
    Load {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// `;`-separated vertex shard base paths
        #[arg(long)]
        vertex_files: Option<String>,

        /// `;`-separated edge shard base paths
        #[arg(long)]
        edge_files: Option<String>,

        /// Number of vertex labels
        #[arg(long)]
        vertex_label_num: Option<usize>,

        /// Number of edge labels
        #[arg(long)]
        edge_label_num: Option<usize>,

        /// Vertex partitioning strategy (hash, segmented)
        #[arg(short, long)]
        partition: Option<String>,

        /// Load edges as undirected
        #[arg(long)]
        undirected: bool,

        /// Object store backend
        #[arg(short = 'B', long, value_enum)]
        backend: Option<Backend>,

        /// redb file for the redb backend
        #[arg(short = 'S', long)]
        store: Option<PathBuf>,
    },

    /// Show a fragment group from a redb store
    Inspect {
        /// redb file to read
        #[arg(short = 'S', long, default_value = crate::config::DEFAULT_STORE_PATH)]
        store: PathBuf,

        /// Fragment group id; lists persisted objects when absent
        #[arg(short, long)]
        group: Option<String>,
    },
}

/// Flag values that override the configuration file.
#[derive(Debug, Default)]
pub struct LoadOverrides {
    pub workers: Option<usize>,
    pub vertex_files: Option<String>,
    pub edge_files: Option<String>,
    pub vertex_label_num: Option<usize>,
    pub edge_label_num: Option<usize>,
    pub partition: Option<String>,
    pub undirected: bool,
    pub backend: Option<Backend>,
    pub store: Option<PathBuf>,
}

impl LoadOverrides {
    /// Apply every set flag to `config`.
    pub fn apply(self, config: &mut AppConfig) -> Result<(), LoadError> {
        if let Some(workers) = self.workers {
            config.cluster.workers = workers;
        }
        if let Some(files) = self.vertex_files {
            config.loader.vertex_files = files;
        }
        if let Some(files) = self.edge_files {
            config.loader.edge_files = files;
        }
        if let Some(n) = self.vertex_label_num {
            config.loader.vertex_label_num = n;
        }
        if let Some(n) = self.edge_label_num {
            config.loader.edge_label_num = n;
        }
        if let Some(partition) = self.partition {
            config.loader.partition = parse_partition(&partition)?;
        }
        if self.undirected {
            config.loader.directed = false;
        }
        if let Some(backend) = self.backend {
            config.store.backend = backend;
        }
        if let Some(path) = self.store {
            config.store.path = path;
        }
        Ok(())
    }
}

fn parse_partition(name: &str) -> Result<PartitionStrategy, LoadError> {
    match name {
        "hash" => Ok(PartitionStrategy::Hash),
        "segmented" => Ok(PartitionStrategy::Segmented),
        other => Err(LoadError::InvalidArgument(format!(
            "unknown partition strategy: {other}"
        ))),
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), LoadError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Load {
            config,
            workers,
            vertex_files,
            edge_files,
            vertex_label_num,
            edge_label_num,
            partition,
            undirected,
            backend,
            store,
        } => {
            let mut app_config = match config {
                Some(path) => AppConfig::from_file(&path)?,
                None => AppConfig::default(),
            };
            LoadOverrides {
                workers,
                vertex_files,
                edge_files,
                vertex_label_num,
                edge_label_num,
                partition,
                undirected,
                backend,
                store,
            }
            .apply(&mut app_config)?;
            cmd_load(&app_config, json_mode)
        }
        Commands::Inspect { store, group } => {
            let group = group.map(|g| g.parse::<ObjectId>()).transpose()?;
            cmd_inspect(&store, group, json_mode)
        }
    }
}
