//! # Partitioner
//!
//! Maps an external vertex id to the fragment that owns it.
//!
//! `partition_id` is pure and total: every worker evaluating it for the same
//! id and fragment count gets the same answer. The shuffle relies on this;
//! no worker ever asks another where a vertex belongs.

use crate::{FragmentId, LoadError, Oid};

/// Deterministic OID to fragment assignment.
pub trait Partitioner: Send + Sync {
    /// Number of fragments the id domain is cut into.
    fn fnum(&self) -> usize;

    /// Fragment owning `oid`.
    fn partition_id(&self, oid: &Oid) -> FragmentId;
}

/// Stable 64-bit hash of an OID, identical on every platform.
///
/// BLAKE3 over `Oid::canonical_bytes`, first eight bytes little-endian.
#[must_use]
pub fn stable_hash(oid: &Oid) -> u64 {
    let digest = blake3::hash(&oid.canonical_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

fn check_fnum(fnum: usize) -> Result<(), LoadError> {
    if fnum == 0 || fnum > u32::MAX as usize {
        return Err(LoadError::InvalidArgument(format!(
            "fragment count must be in 1..=u32::MAX, got {fnum}"
        )));
    }
    Ok(())
}

// =============================================================================
// HASH PARTITIONER
// =============================================================================

/// `stable_hash(oid) mod fnum`. No rebalancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPartitioner {
    fnum: usize,
}

impl HashPartitioner {
    pub fn new(fnum: usize) -> Result<Self, LoadError> {
        check_fnum(fnum)?;
        Ok(Self { fnum })
    }
}

impl Partitioner for HashPartitioner {
    fn fnum(&self) -> usize {
        self.fnum
    }

    fn partition_id(&self, oid: &Oid) -> FragmentId {
        FragmentId((stable_hash(oid) % self.fnum as u64) as u32)
    }
}

// =============================================================================
// SEGMENTED PARTITIONER
// =============================================================================

/// Range partitioning seeded by a sample of the id distribution.
///
/// The sorted, distinct sample is cut into `fnum` contiguous segments of
/// near-equal size. Segment `k` starts at `boundaries[k - 1]`; ids below the
/// first boundary belong to fragment 0, ids outside the sample fall into the
/// segment their order places them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedPartitioner {
    fnum: usize,
    boundaries: Vec<Oid>,
}

impl SegmentedPartitioner {
    pub fn new(fnum: usize, mut sampled_ids: Vec<Oid>) -> Result<Self, LoadError> {
        check_fnum(fnum)?;
        sampled_ids.sort();
        sampled_ids.dedup();

        let total = sampled_ids.len();
        let base = total / fnum;
        let extra = total % fnum;
        let mut boundaries = Vec::with_capacity(fnum.saturating_sub(1));
        let mut start = 0;
        for segment in 0..fnum {
            if segment > 0 {
                match sampled_ids.get(start) {
                    Some(first) => boundaries.push(first.clone()),
                    None => break,
                }
            }
            start += base + usize::from(segment < extra);
        }
        Ok(Self { fnum, boundaries })
    }

    /// First id of every segment after the first.
    #[must_use]
    pub fn boundaries(&self) -> &[Oid] {
        &self.boundaries
    }
}

impl Partitioner for SegmentedPartitioner {
    fn fnum(&self) -> usize {
        self.fnum
    }

    fn partition_id(&self, oid: &Oid) -> FragmentId {
        let segment = self.boundaries.partition_point(|b| b <= oid);
        FragmentId(segment.min(self.fnum - 1) as u32)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_partitioner_is_stable_for_known_ids() {
        let p = HashPartitioner::new(4).expect("partitioner");
        let first = p.partition_id(&Oid::Int(12345));
        for _ in 0..10 {
            assert_eq!(p.partition_id(&Oid::Int(12345)), first);
        }
        assert_eq!(
            HashPartitioner::new(4).expect("p").partition_id(&Oid::from("alice")),
            p.partition_id(&Oid::from("alice"))
        );
    }

    #[test]
    fn hash_partitioner_stays_in_range() {
        let p = HashPartitioner::new(3).expect("partitioner");
        for v in -100..100 {
            assert!(p.partition_id(&Oid::Int(v)).index() < 3);
        }
    }

    #[test]
    fn single_fragment_owns_everything() {
        let p = HashPartitioner::new(1).expect("partitioner");
        assert_eq!(p.partition_id(&Oid::Int(-9)), FragmentId(0));
    }

    #[test]
    fn zero_fragments_rejected() {
        assert!(HashPartitioner::new(0).is_err());
        assert!(SegmentedPartitioner::new(0, vec![]).is_err());
    }

    #[test]
    fn segmented_cuts_sorted_sample() {
        let sample = vec![Oid::Int(4), Oid::Int(1), Oid::Int(3), Oid::Int(2), Oid::Int(2)];
        let p = SegmentedPartitioner::new(2, sample).expect("partitioner");
        assert_eq!(p.boundaries(), &[Oid::Int(3)]);
        assert_eq!(p.partition_id(&Oid::Int(1)), FragmentId(0));
        assert_eq!(p.partition_id(&Oid::Int(2)), FragmentId(0));
        assert_eq!(p.partition_id(&Oid::Int(3)), FragmentId(1));
        assert_eq!(p.partition_id(&Oid::Int(99)), FragmentId(1));
        assert_eq!(p.partition_id(&Oid::Int(-5)), FragmentId(0));
    }

    #[test]
    fn segmented_with_small_sample_uses_leading_fragments() {
        let p = SegmentedPartitioner::new(4, vec![Oid::Int(10), Oid::Int(20)]).expect("p");
        assert_eq!(p.partition_id(&Oid::Int(10)), FragmentId(0));
        assert_eq!(p.partition_id(&Oid::Int(25)), FragmentId(1));
    }

    #[test]
    fn segmented_distributes_remainder_to_leading_segments() {
        let sample = (0..7).map(Oid::Int).collect();
        let p = SegmentedPartitioner::new(3, sample).expect("p");
        assert_eq!(p.boundaries(), &[Oid::Int(3), Oid::Int(5)]);
    }
}
