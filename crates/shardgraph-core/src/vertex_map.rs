//! # Vertex Map
//!
//! The OID to GID directory, replicated on every worker.
//!
//! After the vertex shuffle every worker all-gathers its owned id lists, so
//! each worker assembles the same `VertexMap` from the same input. Offsets
//! follow the order of the owned list: row `i` of fragment `f`'s table for
//! label `l` gets GID `(f, l, i)`. Once built the map is sealed into the
//! object store and only read.

use crate::comm::Communicator;
use crate::formats::{decode, encode};
use crate::id_parser::IdParser;
use crate::store::{ObjectKind, Sealable};
use crate::{FragmentId, Gid, LabelId, LoadError, Oid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-only `(fid, oid) -> gid` lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexMap {
    parser: IdParser,
    fnum: usize,
    label_num: usize,
    /// `oids[fid][label][offset]`
    oids: Vec<Vec<Vec<Oid>>>,
    /// `index[fid][label][oid] = offset`
    index: Vec<Vec<BTreeMap<Oid, u64>>>,
}

impl Sealable for VertexMap {
    const KIND: ObjectKind = ObjectKind::VertexMap;
}

impl VertexMap {
    #[must_use]
    pub fn fnum(&self) -> usize {
        self.fnum
    }

    #[must_use]
    pub fn label_num(&self) -> usize {
        self.label_num
    }

    #[must_use]
    pub fn parser(&self) -> &IdParser {
        &self.parser
    }

    /// GID of `oid` in fragment `fid`, under any label.
    ///
    /// Fails with `InvalidArgument` when more than one label holds `oid`;
    /// use [`VertexMap::get_gid_in_label`] for those.
    pub fn get_gid(&self, fid: FragmentId, oid: &Oid) -> Result<Gid, LoadError> {
        let mut found = None;
        for label in 0..self.label_num {
            let label = LabelId(label as u32);
            if let Ok(gid) = self.get_gid_in_label(fid, label, oid) {
                if let Some((first, _)) = found {
                    return Err(LoadError::InvalidArgument(format!(
                        "vertex {oid} in fragment {fid} is held by labels {first} and {}",
                        label.0
                    )));
                }
                found = Some((label.0, gid));
            }
        }
        found.map(|(_, gid)| gid).ok_or_else(|| unassigned(fid, oid))
    }

    /// GID of `oid` under `label` in fragment `fid`.
    pub fn get_gid_in_label(&self, fid: FragmentId, label: LabelId, oid: &Oid) -> Result<Gid, LoadError> {
        let offset = self
            .index
            .get(fid.index())
            .and_then(|labels| labels.get(label.index()))
            .and_then(|map| map.get(oid))
            .ok_or_else(|| unassigned(fid, oid))?;
        self.parser.generate(fid, label, *offset)
    }

    /// OID behind `gid`, if `gid` was assigned.
    #[must_use]
    pub fn get_oid(&self, gid: Gid) -> Option<&Oid> {
        let fid = self.parser.fid(gid);
        let label = self.parser.label(gid);
        let offset = usize::try_from(self.parser.offset(gid)).ok()?;
        self.oids
            .get(fid.index())?
            .get(label.index())?
            .get(offset)
    }

    /// Vertices of `label` owned by `fid`.
    #[must_use]
    pub fn inner_vertex_num(&self, fid: FragmentId, label: LabelId) -> usize {
        self.oids
            .get(fid.index())
            .and_then(|labels| labels.get(label.index()))
            .map_or(0, Vec::len)
    }

    /// Vertices of `label` across all fragments.
    #[must_use]
    pub fn total_vertex_num(&self, label: LabelId) -> usize {
        (0..self.fnum)
            .map(|fid| self.inner_vertex_num(FragmentId(fid as u32), label))
            .sum()
    }
}

fn unassigned(fid: FragmentId, oid: &Oid) -> LoadError {
    LoadError::InvalidPartition(format!("vertex {oid} is not assigned to fragment {fid}"))
}

/// Owned id lists one worker contributes to the map.
#[derive(Debug, Serialize, Deserialize)]
struct Contribution {
    fid: FragmentId,
    oids: Vec<Vec<Oid>>,
}

/// Accumulates owned id lists, then assigns offsets.
#[derive(Debug)]
pub struct VertexMapBuilder {
    parser: IdParser,
    fnum: usize,
    label_num: usize,
    oids: Vec<Vec<Vec<Oid>>>,
}

impl VertexMapBuilder {
    pub fn new(fnum: usize, label_num: usize) -> Result<Self, LoadError> {
        Ok(Self {
            parser: IdParser::new(fnum, label_num)?,
            fnum,
            label_num,
            oids: vec![vec![Vec::new(); label_num]; fnum],
        })
    }

    /// Record the ids `fid` owns under `label`, in offset order.
    pub fn add_vertices(&mut self, fid: FragmentId, label: LabelId, oids: Vec<Oid>) -> Result<(), LoadError> {
        let slot = self
            .oids
            .get_mut(fid.index())
            .and_then(|labels| labels.get_mut(label.index()))
            .ok_or_else(|| {
                LoadError::InvalidArgument(format!(
                    "fragment {fid} label {} outside the map's {}x{} shape",
                    label.0, self.fnum, self.label_num
                ))
            })?;
        slot.extend(oids);
        Ok(())
    }

    /// Assign offsets. A repeated id under one label and fragment is rejected.
    pub fn finish(self) -> Result<VertexMap, LoadError> {
        let mut index = Vec::with_capacity(self.fnum);
        for (fid, labels) in self.oids.iter().enumerate() {
            let mut per_label = Vec::with_capacity(self.label_num);
            for (label, oids) in labels.iter().enumerate() {
                if oids.len() as u64 > self.parser.offset_capacity() {
                    return Err(LoadError::InvalidArgument(format!(
                        "fragment {fid} label {label} holds more vertices than GIDs can address"
                    )));
                }
                let mut map = BTreeMap::new();
                for (offset, oid) in oids.iter().enumerate() {
                    if map.insert(oid.clone(), offset as u64).is_some() {
                        return Err(LoadError::InvalidArgument(format!(
                            "vertex {oid} appears twice in fragment {fid} label {label}"
                        )));
                    }
                }
                per_label.push(map);
            }
            index.push(per_label);
        }
        Ok(VertexMap {
            parser: self.parser,
            fnum: self.fnum,
            label_num: self.label_num,
            oids: self.oids,
            index,
        })
    }

    /// Collective: all-gather every worker's owned ids and build the map.
    ///
    /// `owned[label]` lists the ids this worker now owns, in row order.
    #[tracing::instrument(skip_all)]
    pub fn build_collective<C: Communicator + ?Sized>(
        comm: &C,
        owned: &[Vec<Oid>],
    ) -> Result<VertexMap, LoadError> {
        let payload = encode(&Contribution {
            fid: comm.fid(),
            oids: owned.to_vec(),
        })?;
        let gathered = comm.all_gather(payload)?;

        let mut builder = Self::new(comm.fnum(), owned.len())?;
        for bytes in &gathered {
            let contribution: Contribution = decode(bytes)?;
            if contribution.oids.len() != owned.len() {
                return Err(LoadError::Communication(format!(
                    "fragment {} reported {} labels, expected {}",
                    contribution.fid,
                    contribution.oids.len(),
                    owned.len()
                )));
            }
            for (label, oids) in contribution.oids.into_iter().enumerate() {
                builder.add_vertices(contribution.fid, LabelId(label as u32), oids)?;
            }
        }
        let map = builder.finish()?;
        tracing::info!(
            worker = comm.worker_id(),
            fnum = map.fnum,
            labels = map.label_num,
            "vertex map built"
        );
        Ok(map)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalCluster;
    use std::thread;

    fn two_fragment_map() -> VertexMap {
        let mut builder = VertexMapBuilder::new(2, 1).expect("builder");
        builder
            .add_vertices(FragmentId(0), LabelId(0), vec![Oid::Int(1), Oid::Int(3)])
            .expect("add");
        builder
            .add_vertices(FragmentId(1), LabelId(0), vec![Oid::Int(2), Oid::Int(4)])
            .expect("add");
        builder.finish().expect("finish")
    }

    #[test]
    fn gids_encode_owner_and_offset() {
        let map = two_fragment_map();
        let gid = map.get_gid(FragmentId(1), &Oid::Int(4)).expect("gid");
        assert_eq!(map.parser().fid(gid), FragmentId(1));
        assert_eq!(map.parser().offset(gid), 1);
        assert_eq!(map.get_oid(gid), Some(&Oid::Int(4)));
    }

    #[test]
    fn lookup_in_wrong_fragment_is_invalid_partition() {
        let map = two_fragment_map();
        assert!(matches!(
            map.get_gid(FragmentId(0), &Oid::Int(2)),
            Err(LoadError::InvalidPartition(_))
        ));
        assert!(matches!(
            map.get_gid(FragmentId(0), &Oid::Int(99)),
            Err(LoadError::InvalidPartition(_))
        ));
    }

    #[test]
    fn oid_under_two_labels_needs_an_explicit_label() {
        let mut builder = VertexMapBuilder::new(1, 2).expect("builder");
        builder
            .add_vertices(FragmentId(0), LabelId(0), vec![Oid::Int(7)])
            .expect("add");
        builder
            .add_vertices(FragmentId(0), LabelId(1), vec![Oid::Int(7), Oid::Int(8)])
            .expect("add");
        let map = builder.finish().expect("finish");

        assert!(matches!(
            map.get_gid(FragmentId(0), &Oid::Int(7)),
            Err(LoadError::InvalidArgument(_))
        ));
        let gid = map
            .get_gid_in_label(FragmentId(0), LabelId(1), &Oid::Int(7))
            .expect("gid");
        assert_eq!(map.parser().label(gid), LabelId(1));
        let only = map.get_gid(FragmentId(0), &Oid::Int(8)).expect("gid");
        assert_eq!(map.parser().label(only), LabelId(1));
    }

    #[test]
    fn counts_per_fragment_and_total() {
        let map = two_fragment_map();
        assert_eq!(map.inner_vertex_num(FragmentId(0), LabelId(0)), 2);
        assert_eq!(map.total_vertex_num(LabelId(0)), 4);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut builder = VertexMapBuilder::new(1, 1).expect("builder");
        builder
            .add_vertices(FragmentId(0), LabelId(0), vec![Oid::Int(1), Oid::Int(1)])
            .expect("add");
        assert!(matches!(builder.finish(), Err(LoadError::InvalidArgument(_))));
    }

    #[test]
    fn every_worker_builds_the_same_map() {
        let comms = LocalCluster::connect(2).expect("cluster");
        let owned = vec![
            vec![vec![Oid::Int(1), Oid::Int(3)]],
            vec![vec![Oid::Int(2), Oid::Int(4)]],
        ];
        let maps: Vec<VertexMap> = thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .zip(owned)
                .map(|(comm, ids)| s.spawn(move || VertexMapBuilder::build_collective(&comm, &ids)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker").expect("build"))
                .collect()
        });
        assert_eq!(maps[0], maps[1]);
        assert_eq!(maps[0], two_fragment_map());
    }
}
