//! Loader configuration.
//!
//! Every worker must be handed an identical `LoaderConfig`; the load is SPMD
//! and file lists, label counts and column positions decide which collectives
//! run.

use crate::primitives::{
    DEFAULT_DST_COLUMN, DEFAULT_ID_COLUMN, DEFAULT_SRC_COLUMN, FILE_LIST_SEPARATOR,
    LABEL_PLACEHOLDER,
};
use crate::{LabelId, LoadError, Role};
use serde::{Deserialize, Serialize};

/// How vertex ids are assigned to fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStrategy {
    /// `stable_hash(oid) mod fnum`.
    #[default]
    Hash,
    /// Range cuts over every vertex id in the input.
    Segmented,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// `;`-separated vertex shard base paths. Label `i` of base `b` is read
    /// from `b_i`.
    pub vertex_files: String,
    /// `;`-separated edge shard base paths.
    pub edge_files: String,
    pub vertex_label_num: usize,
    pub edge_label_num: usize,
    pub directed: bool,
    pub partition: PartitionStrategy,
    /// Column of the vertex id in vertex shards.
    pub id_column: usize,
    pub src_column: usize,
    pub dst_column: usize,
    pub header_row: bool,
    pub delimiter: char,
    /// Optional vertex label names, one per label.
    pub vertex_labels: Vec<String>,
    /// Optional edge label names, one per label.
    pub edge_labels: Vec<String>,
    /// Optional `(src vertex label, dst vertex label)` per edge label.
    /// Defaults to `(0, 0)`.
    pub edge_relations: Vec<(u32, u32)>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            vertex_files: String::new(),
            edge_files: String::new(),
            vertex_label_num: 1,
            edge_label_num: 1,
            directed: true,
            partition: PartitionStrategy::Hash,
            id_column: DEFAULT_ID_COLUMN,
            src_column: DEFAULT_SRC_COLUMN,
            dst_column: DEFAULT_DST_COLUMN,
            header_row: true,
            delimiter: ',',
            vertex_labels: Vec::new(),
            edge_labels: Vec::new(),
            edge_relations: Vec::new(),
        }
    }
}

impl LoaderConfig {
    /// Reject configurations no worker could load.
    pub fn validate(&self) -> Result<(), LoadError> {
        let bad = |msg: String| Err(LoadError::InvalidArgument(msg));

        if self.vertex_label_num == 0 && !self.vertex_paths().is_empty() {
            return bad("vertex files given but vertex_label_num is 0".to_string());
        }
        if self.edge_label_num == 0 && !self.edge_paths().is_empty() {
            return bad("edge files given but edge_label_num is 0".to_string());
        }
        if self.edge_label_num > 0 && self.vertex_label_num == 0 {
            return bad("edge labels require at least one vertex label".to_string());
        }
        if self.src_column == self.dst_column {
            return bad(format!(
                "src_column and dst_column are both {}",
                self.src_column
            ));
        }
        if !self.vertex_labels.is_empty() && self.vertex_labels.len() != self.vertex_label_num {
            return bad(format!(
                "{} vertex label names for {} vertex labels",
                self.vertex_labels.len(),
                self.vertex_label_num
            ));
        }
        if !self.edge_labels.is_empty() && self.edge_labels.len() != self.edge_label_num {
            return bad(format!(
                "{} edge label names for {} edge labels",
                self.edge_labels.len(),
                self.edge_label_num
            ));
        }
        if !self.edge_relations.is_empty() && self.edge_relations.len() != self.edge_label_num {
            return bad(format!(
                "{} edge relations for {} edge labels",
                self.edge_relations.len(),
                self.edge_label_num
            ));
        }
        for &(src, dst) in &self.edge_relations {
            if src as usize >= self.vertex_label_num || dst as usize >= self.vertex_label_num {
                return bad(format!(
                    "relation ({src}, {dst}) names a vertex label outside 0..{}",
                    self.vertex_label_num
                ));
            }
        }
        if !self.delimiter.is_ascii() || self.delimiter == '&' {
            return bad(format!("unsupported delimiter '{}'", self.delimiter));
        }
        Ok(())
    }

    #[must_use]
    pub fn vertex_paths(&self) -> Vec<&str> {
        split_paths(&self.vertex_files)
    }

    #[must_use]
    pub fn edge_paths(&self) -> Vec<&str> {
        split_paths(&self.edge_files)
    }

    #[must_use]
    pub fn label_num(&self, role: Role) -> usize {
        match role {
            Role::Vertex => self.vertex_label_num,
            Role::Edge => self.edge_label_num,
        }
    }

    /// Configured name of a label, or the placeholder.
    #[must_use]
    pub fn label_name(&self, role: Role, label: LabelId) -> String {
        let names = match role {
            Role::Vertex => &self.vertex_labels,
            Role::Edge => &self.edge_labels,
        };
        names
            .get(label.index())
            .cloned()
            .unwrap_or_else(|| LABEL_PLACEHOLDER.to_string())
    }

    /// Endpoint vertex labels of an edge label.
    #[must_use]
    pub fn relation(&self, edge_label: LabelId) -> (LabelId, LabelId) {
        self.edge_relations
            .get(edge_label.index())
            .map_or((LabelId(0), LabelId(0)), |&(src, dst)| {
                (LabelId(src), LabelId(dst))
            })
    }
}

fn split_paths(list: &str) -> Vec<&str> {
    list.split(FILE_LIST_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}
