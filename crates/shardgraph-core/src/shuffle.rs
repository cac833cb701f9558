//! # Shuffle
//!
//! Redistributes loaded rows so every worker ends up holding exactly the rows
//! it owns.
//!
//! ## Algorithm
//!
//! 1. Compute the destination worker of every local row.
//! 2. Per destination, cut one sub-table per label. Sub-tables keep their
//!    schema metadata, including `label_index`. Empty sub-tables are still
//!    sent so every destination learns every label's schema.
//! 3. One all-to-all exchange carries the encoded sub-table lists.
//! 4. Received sub-tables are placed back into their `label_index` slot and
//!    concatenated in source-rank order.
//!
//! Vertex rows are owned by `partition_id(oid)`. Edge rows are owned by the
//! owner of their source vertex, and leave the shuffle with both endpoints
//! rewritten as `UInt64` GID columns.

use crate::comm::Communicator;
use crate::formats::{decode, encode};
use crate::partitioner::Partitioner;
use crate::primitives::{META_DST_LABEL_PREFIX, META_LABEL_INDEX, META_SRC_LABEL_PREFIX};
use crate::table::{Column, DataType, Field, Value};
use crate::{FragmentId, Gid, LabelId, LoadError, Oid, Table};

/// Owned vertex tables plus the ids their rows carried.
#[derive(Debug, Clone, PartialEq)]
pub struct ShuffledVertices {
    /// One table per label, id column removed.
    pub tables: Vec<Table>,
    /// `oids[label][row]` is the id of row `row` of `tables[label]`.
    pub oids: Vec<Vec<Oid>>,
}

/// Runs the vertex and edge exchanges for one worker.
pub struct ShuffleEngine<'a, C: Communicator + ?Sized> {
    comm: &'a C,
    partitioner: &'a dyn Partitioner,
}

impl<'a, C: Communicator + ?Sized> ShuffleEngine<'a, C> {
    pub fn new(comm: &'a C, partitioner: &'a dyn Partitioner) -> Result<Self, LoadError> {
        if partitioner.fnum() != comm.fnum() {
            return Err(LoadError::InvalidArgument(format!(
                "partitioner cuts {} fragments but the cluster has {}",
                partitioner.fnum(),
                comm.fnum()
            )));
        }
        Ok(Self { comm, partitioner })
    }

    fn owner_worker(&self, oid: &Oid) -> Result<usize, LoadError> {
        self.comm.frag_to_worker(self.partitioner.partition_id(oid))
    }

    /// Shuffle vertex tables (id column first) by `partition_id`.
    #[tracing::instrument(skip_all, fields(labels = tables.len()))]
    pub fn shuffle_vertex_tables(&self, tables: Vec<Table>) -> Result<ShuffledVertices, LoadError> {
        let label_num = tables.len();
        let mut routes = Vec::with_capacity(label_num);
        for table in &tables {
            let ids = table.column(0)?;
            let mut dests = Vec::with_capacity(ids.len());
            for value in ids.values() {
                dests.push(self.owner_worker(&Oid::try_from(value)?)?);
            }
            routes.push(dests);
        }

        let owned = self.exchange(&tables, &routes)?;

        let mut shuffled = ShuffledVertices {
            tables: Vec::with_capacity(label_num),
            oids: Vec::with_capacity(label_num),
        };
        for mut table in owned {
            let (_, ids) = table.remove_column(0)?;
            let oids = ids
                .values()
                .iter()
                .map(Oid::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            shuffled.tables.push(table);
            shuffled.oids.push(oids);
        }
        tracing::info!(
            worker = self.comm.worker_id(),
            vertices = shuffled.oids.iter().map(Vec::len).sum::<usize>(),
            "vertex shuffle complete"
        );
        Ok(shuffled)
    }

    /// Shuffle edge tables (src, dst first) to the owner of each source.
    ///
    /// `resolve(fid, label, oid)` maps an endpoint owned by `fid` to its GID.
    #[tracing::instrument(skip_all, fields(labels = tables.len()))]
    pub fn shuffle_edge_tables<F>(&self, tables: Vec<Table>, resolve: F) -> Result<Vec<Table>, LoadError>
    where
        F: Fn(FragmentId, LabelId, &Oid) -> Result<Gid, LoadError>,
    {
        let mut converted = Vec::with_capacity(tables.len());
        let mut routes = Vec::with_capacity(tables.len());
        for mut table in tables {
            let (src_label, dst_label) = relation_of(&table)?;
            let mut src_gids = Vec::with_capacity(table.num_rows());
            let mut dst_gids = Vec::with_capacity(table.num_rows());
            let mut dests = Vec::with_capacity(table.num_rows());
            for (src, dst) in table.column(0)?.values().iter().zip(table.column(1)?.values()) {
                let src = Oid::try_from(src)?;
                let dst = Oid::try_from(dst)?;
                let src_fid = self.partitioner.partition_id(&src);
                let dst_fid = self.partitioner.partition_id(&dst);
                src_gids.push(Value::UInt64(resolve(src_fid, src_label, &src)?.0));
                dst_gids.push(Value::UInt64(resolve(dst_fid, dst_label, &dst)?.0));
                dests.push(self.comm.frag_to_worker(src_fid)?);
            }
            replace_id_column(&mut table, 0, src_gids)?;
            replace_id_column(&mut table, 1, dst_gids)?;
            converted.push(table);
            routes.push(dests);
        }

        let owned = self.exchange(&converted, &routes)?;
        tracing::info!(
            worker = self.comm.worker_id(),
            edges = owned.iter().map(Table::num_rows).sum::<usize>(),
            "edge shuffle complete"
        );
        Ok(owned)
    }

    /// Route row `r` of `tables[l]` to `routes[l][r]` and collect what arrives.
    fn exchange(&self, tables: &[Table], routes: &[Vec<usize>]) -> Result<Vec<Table>, LoadError> {
        let worker_num = self.comm.worker_num();
        let mut outgoing = Vec::with_capacity(worker_num);
        for dst in 0..worker_num {
            let mut per_label = Vec::with_capacity(tables.len());
            for (table, dests) in tables.iter().zip(routes) {
                let rows: Vec<usize> = dests
                    .iter()
                    .enumerate()
                    .filter_map(|(row, &d)| (d == dst).then_some(row))
                    .collect();
                per_label.push(table.take(&rows)?);
            }
            outgoing.push(encode(&per_label)?);
        }

        let incoming = self.comm.all_to_all(outgoing)?;
        let mut received = Vec::with_capacity(incoming.len());
        for bytes in &incoming {
            received.push(decode::<Vec<Table>>(bytes)?);
        }
        reindex_by_label(received, tables.len())
    }
}

/// Place every received sub-table into its `label_index` slot and
/// concatenate each slot in source order.
///
/// `received[src]` is the list sent by worker `src`; its physical order
/// carries no meaning.
pub fn reindex_by_label(received: Vec<Vec<Table>>, label_num: usize) -> Result<Vec<Table>, LoadError> {
    let mut slots: Vec<Vec<Table>> = (0..label_num).map(|_| Vec::new()).collect();
    for (src, tables) in received.into_iter().enumerate() {
        let mut seen = vec![false; label_num];
        for table in tables {
            let label = table.schema().metadata_usize(META_LABEL_INDEX)?;
            if label >= label_num {
                return Err(LoadError::InvalidArgument(format!(
                    "worker {src} sent label_index {label} outside 0..{label_num}"
                )));
            }
            if std::mem::replace(&mut seen[label], true) {
                return Err(LoadError::InvalidArgument(format!(
                    "worker {src} sent label_index {label} twice"
                )));
            }
            slots[label].push(table);
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(label, parts)| {
            if parts.is_empty() {
                return Err(LoadError::InvalidArgument(format!(
                    "no worker sent a table for label_index {label}"
                )));
            }
            Table::concat(parts)
        })
        .collect()
}

/// Endpoint labels of the single relation of an edge table.
fn relation_of(table: &Table) -> Result<(LabelId, LabelId), LoadError> {
    let schema = table.schema();
    let label = |key: String| -> Result<LabelId, LoadError> {
        Ok(LabelId(u32::try_from(schema.metadata_usize(&key)?).map_err(|_| {
            LoadError::InvalidArgument(format!("metadata '{key}' is out of range"))
        })?))
    };
    Ok((
        label(format!("{META_SRC_LABEL_PREFIX}0"))?,
        label(format!("{META_DST_LABEL_PREFIX}0"))?,
    ))
}

fn replace_id_column(table: &mut Table, position: usize, gids: Vec<Value>) -> Result<(), LoadError> {
    let (field, _) = table.remove_column(position)?;
    let gid_field = Field {
        name: field.name,
        data_type: DataType::UInt64,
        nullable: false,
    };
    table.add_column(position, gid_field, Column::new(gids))
}

// =============================================================================
// TESTS
// =============================================================================
