//! # Application Configuration
//!
//! A TOML file with three tables. Every key is optional.
//!
//! ```toml
//! [loader]
//! vertex_files = "data/person;data/city"
//! edge_files = "data/knows"
//! partition = "segmented"
//!
//! [cluster]
//! workers = 4
//!
//! [store]
//! backend = "redb"
//! path = "graph.redb"
//! ```
//!
//! Command-line flags override the file.

use serde::{Deserialize, Serialize};
use shardgraph_core::{LoadError, LoaderConfig};
use std::path::{Path, PathBuf};

/// Upper bound on threads the local launcher will start.
pub const MAX_LOCAL_WORKERS: usize = 256;

/// Default redb file for the `redb` backend.
pub const DEFAULT_STORE_PATH: &str = "shardgraph.redb";

// =============================================================================
// SECTIONS
// =============================================================================

/// Object store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Objects live only for the duration of the process.
    #[default]
    Memory,
    /// Persisted objects survive in a redb file.
    Redb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    pub workers: usize,
    /// `fragment_order[fid]` is the worker serving `fid`. Identity when unset.
    pub fragment_order: Option<Vec<usize>>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            fragment_order: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: Backend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub loader: LoaderConfig,
    pub cluster: ClusterConfig,
    pub store: StoreConfig,
}

// =============================================================================
// LOADING
// =============================================================================

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, LoadError> {
        toml::from_str(text)
            .map_err(|e| LoadError::InvalidArgument(format!("invalid configuration: {e}")))
    }

    /// Read and parse the file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoadError::IoError(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Reject configurations the launcher cannot run.
    pub fn validate(&self) -> Result<(), LoadError> {
        self.loader.validate()?;

        let workers = self.worker_num();
        if workers == 0 || workers > MAX_LOCAL_WORKERS {
            return Err(LoadError::InvalidArgument(format!(
                "worker count {workers} outside 1..={MAX_LOCAL_WORKERS}"
            )));
        }
        if let Some(order) = &self.cluster.fragment_order
            && order.len() != self.cluster.workers
        {
            return Err(LoadError::InvalidArgument(format!(
                "fragment_order names {} workers but workers = {}",
                order.len(),
                self.cluster.workers
            )));
        }
        Ok(())
    }

    /// Number of workers the launcher starts.
    pub fn worker_num(&self) -> usize {
        self.cluster
            .fragment_order
            .as_ref()
            .map_or(self.cluster.workers, Vec::len)
    }
}

// =============================================================================
// TESTS
// =============================================================================
