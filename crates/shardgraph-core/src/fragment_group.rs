//! # Fragment Group
//!
//! The cluster-wide directory `fid -> (instance, fragment object)`.
//!
//! ## Protocol
//!
//! 1. Every worker gathers its store instance id and its persisted fragment
//!    id to the coordinator (two fixed-size gathers).
//! 2. The coordinator maps every fragment id to the worker serving it through
//!    `frag_to_worker`, seals the group and persists it.
//! 3. The coordinator broadcasts the group id. A failed coordinator
//!    broadcasts an empty payload instead, so every worker fails with it.
//!
//! Each worker must have persisted its own fragment before entering.

use crate::comm::{COORDINATOR, Communicator};
use crate::store::{ObjectKind, ObjectStore, Sealable};
use crate::{FragmentId, InstanceId, LoadError, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where one fragment lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentLocation {
    pub instance: InstanceId,
    pub object: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentGroup {
    total_frag_num: usize,
    vertex_label_num: usize,
    edge_label_num: usize,
    fragments: BTreeMap<FragmentId, FragmentLocation>,
}

impl Sealable for FragmentGroup {
    const KIND: ObjectKind = ObjectKind::FragmentGroup;
}

impl FragmentGroup {
    #[must_use]
    pub fn total_frag_num(&self) -> usize {
        self.total_frag_num
    }

    #[must_use]
    pub fn vertex_label_num(&self) -> usize {
        self.vertex_label_num
    }

    #[must_use]
    pub fn edge_label_num(&self) -> usize {
        self.edge_label_num
    }

    #[must_use]
    pub fn fragments(&self) -> &BTreeMap<FragmentId, FragmentLocation> {
        &self.fragments
    }

    #[must_use]
    pub fn location(&self, fid: FragmentId) -> Option<FragmentLocation> {
        self.fragments.get(&fid).copied()
    }
}

/// Collective: publish the group of every worker's fragment.
///
/// Returns the group's object id on every worker.
#[tracing::instrument(skip_all, fields(fragment = %fragment))]
pub fn construct_fragment_group<C: Communicator + ?Sized>(
    comm: &C,
    store: &dyn ObjectStore,
    fragment: ObjectId,
    vertex_label_num: usize,
    edge_label_num: usize,
) -> Result<ObjectId, LoadError> {
    let instances = comm.gather_u64(store.instance_id().0, COORDINATOR)?;
    let objects = comm.gather_u64(fragment.0, COORDINATOR)?;

    if let (Some(instances), Some(objects)) = (instances, objects) {
        let sealed = assemble(comm, &instances, &objects, vertex_label_num, edge_label_num)
            .and_then(|group| {
                let id = group.seal(store)?;
                store.persist(id)?;
                Ok(id)
            });
        let payload = match &sealed {
            Ok(id) => id.0.to_le_bytes().to_vec(),
            Err(_) => Vec::new(),
        };
        comm.broadcast(payload, COORDINATOR)?;
        if let Ok(id) = &sealed {
            tracing::info!(group = %id, fnum = comm.fnum(), "fragment group published");
        }
        return sealed;
    }

    let payload = comm.broadcast(Vec::new(), COORDINATOR)?;
    let fixed: [u8; 8] = payload.as_slice().try_into().map_err(|_| {
        LoadError::Communication("coordinator failed to publish the fragment group".to_string())
    })?;
    Ok(ObjectId(u64::from_le_bytes(fixed)))
}

fn assemble<C: Communicator + ?Sized>(
    comm: &C,
    instances: &[u64],
    objects: &[u64],
    vertex_label_num: usize,
    edge_label_num: usize,
) -> Result<FragmentGroup, LoadError> {
    let fnum = comm.fnum();
    let mut fragments = BTreeMap::new();
    for fid in 0..fnum {
        let fid = FragmentId(fid as u32);
        let worker = comm.frag_to_worker(fid)?;
        let (instance, object) = instances
            .get(worker)
            .zip(objects.get(worker))
            .ok_or_else(|| {
                LoadError::Communication(format!(
                    "no gathered fragment for worker {worker} serving fragment {fid}"
                ))
            })?;
        fragments.insert(
            fid,
            FragmentLocation {
                instance: InstanceId(*instance),
                object: ObjectId(*object),
            },
        );
    }
    Ok(FragmentGroup {
        total_frag_num: fnum,
        vertex_label_num,
        edge_label_num,
        fragments,
    })
}
