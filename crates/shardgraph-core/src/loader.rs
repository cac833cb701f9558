//! # Fragment Loader
//!
//! Drives one worker through the whole load. Every worker of the cluster
//! constructs a `FragmentLoader` with the same configuration and calls the
//! same entry point; the phases below then run in lock step.
//!
//! ```text
//! read + reconcile ─► partition ─► vertex shuffle ─► vertex map
//!        ─► edge shuffle ─► fragment ─► (fragment group)
//! ```
//!
//! Any error ends the load on the worker that hit it. Peers blocked in a
//! collective observe the departure as a `Communication` error once the
//! failed worker's communicator is dropped.

use crate::comm::Communicator;
use crate::config::{LoaderConfig, PartitionStrategy};
use crate::fragment::FragmentBuilder;
use crate::fragment_group::construct_fragment_group;
use crate::graph_schema::PropertyGraphSchema;
use crate::io::IoFactory;
use crate::partitioner::{HashPartitioner, Partitioner, SegmentedPartitioner};
use crate::shuffle::ShuffleEngine;
use crate::store::{ObjectStore, Sealable};
use crate::table_loader::TableLoader;
use crate::vertex_map::VertexMapBuilder;
use crate::{LabelId, LoadError, ObjectId, Oid, Role, Table};

enum Source<'a> {
    Files(&'a dyn IoFactory),
    Tables {
        vertices: Vec<Table>,
        edges: Vec<Table>,
    },
}

/// Loads this worker's fragment.
pub struct FragmentLoader<'a, C: Communicator + ?Sized> {
    comm: &'a C,
    store: &'a dyn ObjectStore,
    config: LoaderConfig,
    source: Source<'a>,
    partitioner: Option<Box<dyn Partitioner + 'a>>,
}

impl<'a, C: Communicator + ?Sized> FragmentLoader<'a, C> {
    /// Load from the shard files named in `config`.
    pub fn new(
        comm: &'a C,
        store: &'a dyn ObjectStore,
        io: &'a dyn IoFactory,
        config: LoaderConfig,
    ) -> Result<Self, LoadError> {
        config.validate()?;
        Ok(Self {
            comm,
            store,
            config,
            source: Source::Files(io),
            partitioner: None,
        })
    }

    /// Load from tables this worker already read, one per label.
    ///
    /// The tables are this worker's partial slice of the input; they still
    /// go through schema reconciliation and the shuffle. Label counts are
    /// taken from the table lists, file lists in `config` are ignored.
    pub fn from_tables(
        comm: &'a C,
        store: &'a dyn ObjectStore,
        mut config: LoaderConfig,
        vertices: Vec<Table>,
        edges: Vec<Table>,
    ) -> Result<Self, LoadError> {
        config.vertex_files.clear();
        config.edge_files.clear();
        config.vertex_label_num = vertices.len();
        config.edge_label_num = edges.len();
        config.validate()?;
        Ok(Self {
            comm,
            store,
            config,
            source: Source::Tables { vertices, edges },
            partitioner: None,
        })
    }

    /// Use `partitioner` instead of the configured strategy.
    #[must_use]
    pub fn with_partitioner(mut self, partitioner: Box<dyn Partitioner + 'a>) -> Self {
        self.partitioner = Some(partitioner);
        self
    }

    /// Run the pipeline and return this worker's persisted fragment id.
    #[tracing::instrument(skip_all, fields(worker = self.comm.worker_id(), fid = %self.comm.fid()))]
    pub fn load_fragment(mut self) -> Result<ObjectId, LoadError> {
        let comm = self.comm;
        let store = self.store;

        let (vertex_tables, edge_tables, sample) = self.read_tables()?;
        tracing::info!(
            vertex_rows = vertex_tables.iter().map(Table::num_rows).sum::<usize>(),
            edge_rows = edge_tables.iter().map(Table::num_rows).sum::<usize>(),
            "local tables loaded"
        );

        let partitioner = match self.partitioner.take() {
            Some(custom) => custom,
            None => self.build_partitioner(sample)?,
        };
        let engine = ShuffleEngine::new(comm, partitioner.as_ref())?;

        let vertices = engine.shuffle_vertex_tables(vertex_tables)?;
        let vertex_map = VertexMapBuilder::build_collective(comm, &vertices.oids)?;
        let vertex_map_id = vertex_map.seal(store)?;
        store.persist(vertex_map_id)?;

        let edges = engine.shuffle_edge_tables(edge_tables, |fid, label, oid| {
            vertex_map.get_gid_in_label(fid, label, oid)
        })?;

        let schema = PropertyGraphSchema::from_tables(&vertices.tables, &edges)?;
        FragmentBuilder::new(
            comm.fid(),
            comm.fnum(),
            vertices.tables,
            edges,
            schema,
            vertex_map_id,
            self.config.directed,
        )?
        .seal(store)
    }

    /// Run the pipeline, then publish the fragment group. Returns the group
    /// id, identical on every worker.
    pub fn load_fragment_as_group(self) -> Result<ObjectId, LoadError> {
        let comm = self.comm;
        let store = self.store;
        let vertex_label_num = self.config.vertex_label_num;
        let edge_label_num = self.config.edge_label_num;
        let fragment = self.load_fragment()?;
        construct_fragment_group(comm, store, fragment, vertex_label_num, edge_label_num)
    }

    /// Per-label tables plus the id sample a segmented partitioner needs.
    fn read_tables(&self) -> Result<(Vec<Table>, Vec<Table>, Vec<Oid>), LoadError> {
        let mut loader = TableLoader::new(&self.config, self.comm);
        let segmented = self.partitioner.is_none()
            && self.config.partition == PartitionStrategy::Segmented;
        match &self.source {
            Source::Files(io) => {
                let sample = if segmented {
                    loader.sample_vertex_ids(*io)?
                } else {
                    Vec::new()
                };
                let vertices = loader.load_vertex_tables(*io)?;
                let edges = loader.load_edge_tables(*io)?;
                Ok((vertices, edges, sample))
            }
            Source::Tables { vertices, edges } => {
                let mut prepared_vertices = Vec::with_capacity(vertices.len());
                for (label, table) in vertices.iter().enumerate() {
                    prepared_vertices.push(loader.prepare(
                        table.clone(),
                        Role::Vertex,
                        LabelId(label as u32),
                    )?);
                }
                let mut prepared_edges = Vec::with_capacity(edges.len());
                for (label, table) in edges.iter().enumerate() {
                    prepared_edges.push(loader.prepare(
                        table.clone(),
                        Role::Edge,
                        LabelId(label as u32),
                    )?);
                }
                let sample = if segmented {
                    gather_sample(self.comm, &prepared_vertices)?
                } else {
                    Vec::new()
                };
                Ok((prepared_vertices, prepared_edges, sample))
            }
        }
    }

    fn build_partitioner(&self, sample: Vec<Oid>) -> Result<Box<dyn Partitioner + 'a>, LoadError> {
        let fnum = self.comm.fnum();
        Ok(match self.config.partition {
            PartitionStrategy::Hash => Box::new(HashPartitioner::new(fnum)?),
            PartitionStrategy::Segmented => {
                tracing::debug!(sample = sample.len(), "cutting segments");
                Box::new(SegmentedPartitioner::new(fnum, sample)?)
            }
        })
    }
}

/// All-gather the id column of every prepared vertex table.
fn gather_sample<C: Communicator + ?Sized>(comm: &C, tables: &[Table]) -> Result<Vec<Oid>, LoadError> {
    let mut local = Vec::new();
    for table in tables {
        for value in table.column(0)?.values() {
            local.push(Oid::try_from(value)?);
        }
    }
    let mut sample = Vec::new();
    for bytes in comm.all_gather(crate::formats::encode(&local)?)? {
        sample.extend(crate::formats::decode::<Vec<Oid>>(&bytes)?);
    }
    Ok(sample)
}
