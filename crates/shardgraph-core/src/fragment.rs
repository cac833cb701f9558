//! # Fragment
//!
//! One worker's sealed slice of the graph: its owned vertex tables (row `i`
//! of label `l` is GID `(fid, l, i)`), its owned edge tables with GID
//! endpoints, the graph schema and the id of the vertex map it was built
//! against.

use crate::graph_schema::PropertyGraphSchema;
use crate::id_parser::IdParser;
use crate::store::{ObjectKind, ObjectStore, Sealable};
use crate::{FragmentId, Gid, LabelId, LoadError, ObjectId, Table};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    fid: FragmentId,
    fnum: usize,
    directed: bool,
    parser: IdParser,
    schema: PropertyGraphSchema,
    vertex_map: ObjectId,
    vertex_tables: Vec<Table>,
    edge_tables: Vec<Table>,
}

impl Sealable for Fragment {
    const KIND: ObjectKind = ObjectKind::Fragment;
}

impl Fragment {
    #[must_use]
    pub fn fid(&self) -> FragmentId {
        self.fid
    }

    #[must_use]
    pub fn fnum(&self) -> usize {
        self.fnum
    }

    #[must_use]
    pub fn directed(&self) -> bool {
        self.directed
    }

    #[must_use]
    pub fn schema(&self) -> &PropertyGraphSchema {
        &self.schema
    }

    /// Object id of the vertex map this fragment's GIDs come from.
    #[must_use]
    pub fn vertex_map_id(&self) -> ObjectId {
        self.vertex_map
    }

    #[must_use]
    pub fn vertex_label_num(&self) -> usize {
        self.vertex_tables.len()
    }

    #[must_use]
    pub fn edge_label_num(&self) -> usize {
        self.edge_tables.len()
    }

    #[must_use]
    pub fn vertex_table(&self, label: LabelId) -> Option<&Table> {
        self.vertex_tables.get(label.index())
    }

    #[must_use]
    pub fn edge_table(&self, label: LabelId) -> Option<&Table> {
        self.edge_tables.get(label.index())
    }

    /// Vertices of `label` this fragment owns.
    #[must_use]
    pub fn inner_vertex_num(&self, label: LabelId) -> usize {
        self.vertex_table(label).map_or(0, Table::num_rows)
    }

    #[must_use]
    pub fn edge_num(&self, label: LabelId) -> usize {
        self.edge_table(label).map_or(0, Table::num_rows)
    }

    /// GID of row `row` of the `label` vertex table.
    pub fn vertex_gid(&self, label: LabelId, row: usize) -> Result<Gid, LoadError> {
        if row >= self.inner_vertex_num(label) {
            return Err(LoadError::InvalidArgument(format!(
                "row {row} outside label {} of fragment {}",
                label.0, self.fid
            )));
        }
        self.parser.generate(self.fid, label, row as u64)
    }

    /// Whether `gid` belongs to this fragment.
    #[must_use]
    pub fn is_inner(&self, gid: Gid) -> bool {
        self.parser.fid(gid) == self.fid
    }
}

/// Seals one worker's owned tables into a `Fragment`.
#[derive(Debug)]
pub struct FragmentBuilder {
    fragment: Fragment,
}

impl FragmentBuilder {
    pub fn new(
        fid: FragmentId,
        fnum: usize,
        vertex_tables: Vec<Table>,
        edge_tables: Vec<Table>,
        schema: PropertyGraphSchema,
        vertex_map: ObjectId,
        directed: bool,
    ) -> Result<Self, LoadError> {
        if fid.index() >= fnum {
            return Err(LoadError::InvalidArgument(format!(
                "fragment {fid} outside 0..{fnum}"
            )));
        }
        if schema.vertex_label_num() != vertex_tables.len()
            || schema.edge_label_num() != edge_tables.len()
        {
            return Err(LoadError::InvalidSchema(format!(
                "schema describes {}/{} labels, fragment holds {}/{} tables",
                schema.vertex_label_num(),
                schema.edge_label_num(),
                vertex_tables.len(),
                edge_tables.len()
            )));
        }
        Ok(Self {
            fragment: Fragment {
                fid,
                fnum,
                directed,
                parser: IdParser::new(fnum, vertex_tables.len())?,
                schema,
                vertex_map,
                vertex_tables,
                edge_tables,
            },
        })
    }

    /// Seal and persist the fragment, returning its object id.
    pub fn seal(self, store: &dyn ObjectStore) -> Result<ObjectId, LoadError> {
        let id = self.fragment.seal(store)?;
        store.persist(id)?;
        tracing::info!(
            fid = %self.fragment.fid,
            object = %id,
            vertex_labels = self.fragment.vertex_label_num(),
            edge_labels = self.fragment.edge_label_num(),
            "fragment sealed"
        );
        Ok(id)
    }
}
