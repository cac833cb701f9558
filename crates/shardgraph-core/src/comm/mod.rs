//! # Collective Communication
//!
//! The `Communicator` trait is the only way workers talk to each other.
//!
//! Every method is a blocking collective: all workers of the communicator
//! must call the same method in the same order, or the load stalls. Workers
//! with nothing to contribute still call, passing an empty payload. Helpers
//! built on top of the trait never skip a call based on local data shape.
//!
//! ## Topology
//!
//! Fragments are logical (`0..fnum`); `frag_to_worker` translates a fragment
//! id to the rank of the worker serving it. With the default assignment the
//! two coincide.

mod local;

pub use local::{LocalCluster, LocalComm};

use crate::{FragmentId, LoadError};

/// Rank of the worker that coordinates gather/broadcast phases.
pub const COORDINATOR: usize = 0;

/// A blocking collective-communication facility spanning the worker set.
pub trait Communicator {
    /// Rank of this worker in `0..worker_num()`.
    fn worker_id(&self) -> usize;

    /// Number of workers in the communicator.
    fn worker_num(&self) -> usize;

    /// Fragment served by this worker.
    fn fid(&self) -> FragmentId;

    /// Total number of fragments.
    fn fnum(&self) -> usize {
        self.worker_num()
    }

    /// Rank of the worker serving `fid`.
    fn frag_to_worker(&self, fid: FragmentId) -> Result<usize, LoadError>;

    /// Variable-length gather to `root`.
    ///
    /// The root receives every worker's payload indexed by rank (its own
    /// included); every other worker receives `None`.
    fn gather(&self, payload: Vec<u8>, root: usize) -> Result<Option<Vec<Vec<u8>>>, LoadError>;

    /// Broadcast `root`'s payload. Non-root payloads are ignored.
    fn broadcast(&self, payload: Vec<u8>, root: usize) -> Result<Vec<u8>, LoadError>;

    /// Send `outgoing[dst]` to every `dst`; returns what each rank sent here,
    /// indexed by source rank.
    fn all_to_all(&self, outgoing: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, LoadError>;

    /// Fixed-size gather of one `u64` per worker.
    fn gather_u64(&self, value: u64, root: usize) -> Result<Option<Vec<u64>>, LoadError> {
        let gathered = self.gather(value.to_le_bytes().to_vec(), root)?;
        gathered
            .map(|payloads| payloads.iter().map(|bytes| decode_u64(bytes)).collect())
            .transpose()
    }

    /// Broadcast one `u64` from `root`.
    fn broadcast_u64(&self, value: u64, root: usize) -> Result<u64, LoadError> {
        let bytes = self.broadcast(value.to_le_bytes().to_vec(), root)?;
        decode_u64(&bytes)
    }

    /// Every worker receives every worker's payload, indexed by rank.
    fn all_gather(&self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>, LoadError> {
        self.all_to_all(vec![payload; self.worker_num()])
    }
}

fn decode_u64(bytes: &[u8]) -> Result<u64, LoadError> {
    let fixed: [u8; 8] = bytes.try_into().map_err(|_| {
        LoadError::Communication(format!(
            "fixed-size payload has {} bytes, expected 8",
            bytes.len()
        ))
    })?;
    Ok(u64::from_le_bytes(fixed))
}
