//! # shardgraph-core
//!
//! The distributed property-graph loader for shardgraph - THE LOGIC.
//!
//! A fixed set of workers, each holding a slice of the raw vertex and edge
//! shards, cooperate to build one partitioned, immutable property graph:
//! every worker ends the load owning one sealed `Fragment`, and a
//! `FragmentGroup` tells any worker where every fragment lives.
//!
//! ## Pipeline
//!
//! - `table_loader` reads the local shard slices into per-label tables
//! - `schema_sync` reconciles each table's schema across workers
//! - `partitioner` decides fragment ownership from the vertex id alone
//! - `shuffle` moves every row to its owner
//! - `vertex_map` assigns GIDs and resolves edge endpoints
//! - `fragment` / `fragment_group` seal and publish the result
//!
//! `loader::FragmentLoader` runs the whole sequence.
//!
//! ## Architectural Constraints
//!
//! - SPMD: every worker runs the same calls in the same order and meets its
//!   peers only at collectives (`comm`)
//! - Workers with no local data still join every collective
//! - Sealed objects (`store`) are write-once

// =============================================================================
// MODULES
// =============================================================================

pub mod comm;
pub mod config;
pub mod formats;
pub mod fragment;
pub mod fragment_group;
pub mod graph_schema;
pub mod id_parser;
pub mod io;
pub mod loader;
pub mod partitioner;
pub mod primitives;
pub mod schema_sync;
pub mod shuffle;
pub mod store;
pub mod table;
pub mod table_loader;
pub mod types;
pub mod vertex_map;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ErrorKind, FragmentId, Gid, InstanceId, LabelId, LoadError, ObjectId, Oid, Role,
};

// =============================================================================
// RE-EXPORTS: Tables and I/O
// =============================================================================

pub use io::{CsvIoFactory, IoAdaptor, IoFactory, MemoryIoFactory};
pub use table::{Column, DataType, Field, Schema, Table, Value};

// =============================================================================
// RE-EXPORTS: Pipeline
// =============================================================================

pub use comm::{Communicator, LocalCluster, LocalComm};
pub use config::{LoaderConfig, PartitionStrategy};
pub use fragment::{Fragment, FragmentBuilder};
pub use fragment_group::{FragmentGroup, FragmentLocation, construct_fragment_group};
pub use graph_schema::{PropertyGraphSchema, SchemaEntry};
pub use id_parser::IdParser;
pub use loader::FragmentLoader;
pub use partitioner::{HashPartitioner, Partitioner, SegmentedPartitioner, stable_hash};
pub use schema_sync::SchemaReconciler;
pub use shuffle::{ShuffleEngine, ShuffledVertices, reindex_by_label};
pub use store::{
    MemoryObjectStore, ObjectHandle, ObjectKind, ObjectStore, RedbObjectStore, Sealable,
};
pub use vertex_map::{VertexMap, VertexMapBuilder};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{PayloadHeader, decode, encode};
