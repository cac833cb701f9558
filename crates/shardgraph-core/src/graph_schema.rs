//! Property-graph schema assembled from stamped table metadata.

use crate::primitives::{
    EDGE_ID_COLUMNS, META_DST_LABEL_PREFIX, META_LABEL, META_SRC_LABEL_PREFIX, META_SUB_LABEL_NUM,
    META_TYPE,
};
use crate::table::Field;
use crate::{LabelId, LoadError, Role, Table};
use serde::{Deserialize, Serialize};

/// One vertex or edge label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub id: LabelId,
    pub role: Role,
    pub label: String,
    /// Property columns, id columns excluded.
    pub properties: Vec<Field>,
    /// `(src vertex label, dst vertex label)` pairs; empty for vertices.
    pub relations: Vec<(LabelId, LabelId)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropertyGraphSchema {
    vertex_entries: Vec<SchemaEntry>,
    edge_entries: Vec<SchemaEntry>,
}

impl PropertyGraphSchema {
    /// Build from post-shuffle tables: vertex tables without their id column,
    /// edge tables with src/dst first.
    pub fn from_tables(vertex_tables: &[Table], edge_tables: &[Table]) -> Result<Self, LoadError> {
        let mut schema = Self::default();
        for (label, table) in vertex_tables.iter().enumerate() {
            schema.add_entry(entry_from(table, LabelId(label as u32), Role::Vertex, 0)?)?;
        }
        for (label, table) in edge_tables.iter().enumerate() {
            schema.add_entry(entry_from(
                table,
                LabelId(label as u32),
                Role::Edge,
                EDGE_ID_COLUMNS,
            )?)?;
        }
        Ok(schema)
    }

    /// Append an entry; ids must arrive in order per role.
    pub fn add_entry(&mut self, entry: SchemaEntry) -> Result<(), LoadError> {
        let entries = match entry.role {
            Role::Vertex => &mut self.vertex_entries,
            Role::Edge => &mut self.edge_entries,
        };
        if entry.id.index() != entries.len() {
            return Err(LoadError::InvalidArgument(format!(
                "{} label {} added out of order",
                entry.role.as_str(),
                entry.id.0
            )));
        }
        entries.push(entry);
        Ok(())
    }

    #[must_use]
    pub fn vertex_label_num(&self) -> usize {
        self.vertex_entries.len()
    }

    #[must_use]
    pub fn edge_label_num(&self) -> usize {
        self.edge_entries.len()
    }

    #[must_use]
    pub fn entry(&self, role: Role, label: LabelId) -> Option<&SchemaEntry> {
        match role {
            Role::Vertex => self.vertex_entries.get(label.index()),
            Role::Edge => self.edge_entries.get(label.index()),
        }
    }

    #[must_use]
    pub fn entries(&self, role: Role) -> &[SchemaEntry] {
        match role {
            Role::Vertex => &self.vertex_entries,
            Role::Edge => &self.edge_entries,
        }
    }

    /// First label of `role` named `name`.
    #[must_use]
    pub fn label_id(&self, role: Role, name: &str) -> Option<LabelId> {
        self.entries(role)
            .iter()
            .find(|e| e.label == name)
            .map(|e| e.id)
    }
}

fn entry_from(
    table: &Table,
    id: LabelId,
    expected: Role,
    skip_columns: usize,
) -> Result<SchemaEntry, LoadError> {
    let schema = table.schema();
    let role = Role::parse(schema.require_metadata(META_TYPE)?)?;
    if role != expected {
        return Err(LoadError::InvalidArgument(format!(
            "table for {} label {} is stamped {}",
            expected.as_str(),
            id.0,
            role.as_str()
        )));
    }

    let mut relations = Vec::new();
    if role == Role::Edge {
        let label_at = |key: String| -> Result<LabelId, LoadError> {
            let raw = schema.metadata_usize(&key)?;
            u32::try_from(raw)
                .map(LabelId)
                .map_err(|_| LoadError::InvalidArgument(format!("metadata '{key}' out of range")))
        };
        for i in 0..schema.metadata_usize(META_SUB_LABEL_NUM)? {
            relations.push((
                label_at(format!("{META_SRC_LABEL_PREFIX}{i}"))?,
                label_at(format!("{META_DST_LABEL_PREFIX}{i}"))?,
            ));
        }
    }

    Ok(SchemaEntry {
        id,
        role,
        label: schema.require_metadata(META_LABEL)?.to_string(),
        properties: schema.fields().iter().skip(skip_columns).cloned().collect(),
        relations,
    })
}
