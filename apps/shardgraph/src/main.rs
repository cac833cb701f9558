//! # shardgraph
//!
//! Loads vertex and edge shards into a partitioned property graph on a
//! cluster of in-process workers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                apps/shardgraph (THE BINARY)              │
//! │                                                          │
//! │   ┌────────────┐   ┌────────────┐   ┌────────────────┐   │
//! │   │   CLI      │   │  Config    │   │ Local cluster  │   │
//! │   │  (clap)    │   │  (toml)    │   │ (1 thread/wkr) │   │
//! │   └─────┬──────┘   └─────┬──────┘   └───────┬────────┘   │
//! │         └────────────────┼──────────────────┘            │
//! │                          ▼                               │
//! │                 ┌─────────────────┐                      │
//! │                 │ shardgraph-core │                      │
//! │                 │   (THE LOGIC)   │                      │
//! │                 └─────────────────┘                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Four workers, hash partitioning, in-memory store
//! shardgraph load -w 4 --vertex-files data/person --edge-files data/knows
//!
//! # From a config file, persisted to redb
//! shardgraph load -c load.toml -B redb -S graph.redb
//! shardgraph inspect -S graph.redb -g o0000000000000007
//! ```

use clap::Parser;
use shardgraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // SHARDGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("SHARDGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_env("SHARDGRAPH_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| "shardgraph=info,shardgraph_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
