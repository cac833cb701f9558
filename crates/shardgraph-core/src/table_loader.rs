//! # Table Loader
//!
//! Reads this worker's slice of every shard into per-label tables.
//!
//! For each role and each label index, every base path in the role's file
//! list contributes the shard at `base_label`, read restricted to this
//! worker's part. Each shard is schema-reconciled across workers, its id
//! columns are moved to the front and its metadata is stamped. Shards of the
//! same label are then concatenated.
//!
//! Metadata stamped on every table:
//!
//! | key | vertex | edge |
//! |-----|--------|------|
//! | `type` | `VERTEX` | `EDGE` |
//! | `label` | label name | label name |
//! | `label_index` | label index | label index |
//! | `id_column` | `0` | |
//! | `src_column` / `dst_column` | | `0` / `1` |
//! | `sub_label_num` | | `1` |
//! | `src_label_0` / `dst_label_0` | | endpoint vertex label indices |

use crate::comm::Communicator;
use crate::config::LoaderConfig;
use crate::io::IoFactory;
use crate::primitives::{
    LABEL_SUFFIX_SEPARATOR, META_DST_COLUMN, META_DST_LABEL_PREFIX, META_ID_COLUMN, META_LABEL,
    META_LABEL_INDEX, META_SRC_COLUMN, META_SRC_LABEL_PREFIX, META_SUB_LABEL_NUM, META_TYPE,
    OPTION_SEPARATOR,
};
use crate::schema_sync::SchemaReconciler;
use crate::{LabelId, LoadError, Oid, Role, Table};
use std::collections::BTreeMap;

/// Shard reader bound to one worker.
pub struct TableLoader<'a, C: Communicator + ?Sized> {
    config: &'a LoaderConfig,
    comm: &'a C,
    reconciler: SchemaReconciler,
}

impl<'a, C: Communicator + ?Sized> TableLoader<'a, C> {
    #[must_use]
    pub fn new(config: &'a LoaderConfig, comm: &'a C) -> Self {
        Self {
            config,
            comm,
            reconciler: SchemaReconciler::new(),
        }
    }

    /// One table per vertex label, indexed by label.
    #[tracing::instrument(skip_all)]
    pub fn load_vertex_tables(&mut self, io: &dyn IoFactory) -> Result<Vec<Table>, LoadError> {
        self.load_role(io, Role::Vertex)
    }

    /// One table per edge label, indexed by label.
    #[tracing::instrument(skip_all)]
    pub fn load_edge_tables(&mut self, io: &dyn IoFactory) -> Result<Vec<Table>, LoadError> {
        self.load_role(io, Role::Edge)
    }

    fn load_role(&mut self, io: &dyn IoFactory, role: Role) -> Result<Vec<Table>, LoadError> {
        let paths = match role {
            Role::Vertex => self.config.vertex_paths(),
            Role::Edge => self.config.edge_paths(),
        };
        let mut tables = Vec::with_capacity(self.config.label_num(role));
        for label in 0..self.config.label_num(role) {
            let label = LabelId(label as u32);
            let mut parts = Vec::with_capacity(paths.len());
            for base in &paths {
                let location = self.location(base, label);
                let raw = read_shard(io, &location, self.comm.worker_id(), self.comm.worker_num())?;
                tracing::debug!(
                    worker = self.comm.worker_id(),
                    location = %location,
                    rows = raw.num_rows(),
                    "read shard"
                );
                parts.push(raw);
            }
            if parts.is_empty() {
                return Err(LoadError::IoError(format!(
                    "no {} files for label {}",
                    role.as_str(),
                    label.0
                )));
            }
            let mut prepared = Vec::with_capacity(parts.len());
            for raw in parts {
                prepared.push(self.prepare(raw, role, label)?);
            }
            tables.push(Table::concat(prepared)?);
        }
        Ok(tables)
    }

    /// Reconcile, reorder and stamp one raw table. Collective.
    ///
    /// Also the entry point for tables handed in by the caller.
    pub fn prepare(&mut self, raw: Table, role: Role, label: LabelId) -> Result<Table, LoadError> {
        let mut table = self.reconciler.sync(raw, self.comm)?;
        match role {
            Role::Vertex => table.swap_column(0, self.config.id_column)?,
            Role::Edge => {
                let (src, dst) = (self.config.src_column, self.config.dst_column);
                table.swap_column(0, src)?;
                let shifted_dst = if dst < src { dst + 1 } else { dst };
                table.swap_column(1, shifted_dst)?;
            }
        }
        table.replace_schema_metadata(self.metadata(role, label));
        Ok(table)
    }

    /// Every vertex id of every vertex shard, read in full.
    ///
    /// Every worker reads the same bytes, so every worker computes the same
    /// sample without communicating.
    pub fn sample_vertex_ids(&self, io: &dyn IoFactory) -> Result<Vec<Oid>, LoadError> {
        let mut ids = Vec::new();
        for label in 0..self.config.vertex_label_num {
            for base in self.config.vertex_paths() {
                let location = self.location(base, LabelId(label as u32));
                let table = read_shard(io, &location, 0, 1)?;
                let column = table.column(self.config.id_column)?;
                for value in column.values() {
                    ids.push(Oid::try_from(value)?);
                }
            }
        }
        Ok(ids)
    }

    fn location(&self, base: &str, label: LabelId) -> String {
        format!(
            "{base}{LABEL_SUFFIX_SEPARATOR}{}{OPTION_SEPARATOR}header_row={}&delimiter={}",
            label.0, self.config.header_row, self.config.delimiter
        )
    }

    fn metadata(&self, role: Role, label: LabelId) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::new();
        meta.insert(META_TYPE.to_string(), role.as_str().to_string());
        meta.insert(META_LABEL.to_string(), self.config.label_name(role, label));
        meta.insert(META_LABEL_INDEX.to_string(), label.0.to_string());
        match role {
            Role::Vertex => {
                meta.insert(META_ID_COLUMN.to_string(), "0".to_string());
            }
            Role::Edge => {
                let (src, dst) = self.config.relation(label);
                meta.insert(META_SRC_COLUMN.to_string(), "0".to_string());
                meta.insert(META_DST_COLUMN.to_string(), "1".to_string());
                meta.insert(META_SUB_LABEL_NUM.to_string(), "1".to_string());
                meta.insert(format!("{META_SRC_LABEL_PREFIX}0"), src.0.to_string());
                meta.insert(format!("{META_DST_LABEL_PREFIX}0"), dst.0.to_string());
            }
        }
        meta
    }
}

/// Open, read and close one shard location.
fn read_shard(
    io: &dyn IoFactory,
    location: &str,
    index: usize,
    total_parts: usize,
) -> Result<Table, LoadError> {
    let mut adaptor = io.create(location)?;
    adaptor.set_partial_read(index, total_parts)?;
    adaptor.open()?;
    let table = adaptor.read_table();
    adaptor.close()?;
    table
}

// =============================================================================
// TESTS
// =============================================================================
