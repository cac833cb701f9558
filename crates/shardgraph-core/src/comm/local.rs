//! In-process communicator: one worker per thread, crossbeam channels between
//! every ordered pair of workers.

use super::Communicator;
use crate::{FragmentId, LoadError};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::cell::Cell;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Gather,
    Broadcast,
    AllToAll,
}

#[derive(Debug)]
struct Envelope {
    seq: u64,
    op: Op,
    payload: Vec<u8>,
}

/// Builder for a set of connected `LocalComm`s.
pub struct LocalCluster;

impl LocalCluster {
    /// Connect `worker_num` workers; fragment `i` is served by worker `i`.
    pub fn connect(worker_num: usize) -> Result<Vec<LocalComm>, LoadError> {
        Self::with_fragment_order((0..worker_num).collect())
    }

    /// Connect workers with an explicit fragment-to-worker assignment.
    ///
    /// `frag_to_worker[fid]` is the rank serving fragment `fid`; it must be a
    /// permutation of `0..len`.
    pub fn with_fragment_order(frag_to_worker: Vec<usize>) -> Result<Vec<LocalComm>, LoadError> {
        let worker_num = frag_to_worker.len();
        if worker_num == 0 {
            return Err(LoadError::InvalidArgument(
                "a cluster needs at least one worker".to_string(),
            ));
        }
        let mut fid_of_worker = vec![None; worker_num];
        for (fid, &worker) in frag_to_worker.iter().enumerate() {
            let slot = fid_of_worker.get_mut(worker).ok_or_else(|| {
                LoadError::InvalidArgument(format!("fragment {fid} assigned to unknown worker {worker}"))
            })?;
            if slot.replace(FragmentId(fid as u32)).is_some() {
                return Err(LoadError::InvalidArgument(format!(
                    "worker {worker} assigned more than one fragment"
                )));
            }
        }

        // channels[src][dst]
        let mut senders: Vec<Vec<Sender<Envelope>>> = Vec::with_capacity(worker_num);
        let mut receivers: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..worker_num).map(|_| Vec::with_capacity(worker_num)).collect();
        for _src in 0..worker_num {
            let mut row = Vec::with_capacity(worker_num);
            for inbox in &mut receivers {
                let (tx, rx) = unbounded();
                row.push(tx);
                inbox.push(Some(rx));
            }
            senders.push(row);
        }

        let assignment = Arc::new(frag_to_worker);
        let mut comms = Vec::with_capacity(worker_num);
        for (worker_id, (outbox, inbox)) in senders.into_iter().zip(receivers).enumerate() {
            let fid = fid_of_worker[worker_id].ok_or_else(|| {
                LoadError::InvalidArgument(format!("worker {worker_id} serves no fragment"))
            })?;
            comms.push(LocalComm {
                worker_id,
                worker_num,
                fid,
                frag_to_worker: Arc::clone(&assignment),
                senders: outbox,
                receivers: inbox.into_iter().flatten().collect(),
                seq: Cell::new(0),
            });
        }
        Ok(comms)
    }
}

/// One worker's endpoint in a `LocalCluster`.
///
/// Dropping an endpoint disconnects it: peers blocked on it observe a
/// `Communication` error instead of waiting forever.
pub struct LocalComm {
    worker_id: usize,
    worker_num: usize,
    fid: FragmentId,
    frag_to_worker: Arc<Vec<usize>>,
    /// senders[dst]
    senders: Vec<Sender<Envelope>>,
    /// receivers[src]
    receivers: Vec<Receiver<Envelope>>,
    seq: Cell<u64>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("worker_id", &self.worker_id)
            .field("worker_num", &self.worker_num)
            .field("fid", &self.fid)
            .field("seq", &self.seq.get())
            .finish_non_exhaustive()
    }
}

impl LocalComm {
    fn next_seq(&self) -> u64 {
        let seq = self.seq.get();
        self.seq.set(seq.saturating_add(1));
        seq
    }

    fn check_root(&self, root: usize) -> Result<(), LoadError> {
        if root >= self.worker_num {
            return Err(LoadError::InvalidArgument(format!(
                "root {root} out of range for {} workers",
                self.worker_num
            )));
        }
        Ok(())
    }

    fn send(&self, dst: usize, seq: u64, op: Op, payload: Vec<u8>) -> Result<(), LoadError> {
        self.senders[dst]
            .send(Envelope { seq, op, payload })
            .map_err(|_| LoadError::Communication(format!("worker {dst} left the cluster")))
    }

    fn recv(&self, src: usize, seq: u64, op: Op) -> Result<Vec<u8>, LoadError> {
        let envelope = self.receivers[src]
            .recv()
            .map_err(|_| LoadError::Communication(format!("worker {src} left the cluster")))?;
        if envelope.seq != seq || envelope.op != op {
            return Err(LoadError::Communication(format!(
                "worker {src} is at collective #{} ({:?}), worker {} expected #{seq} ({op:?})",
                envelope.seq, envelope.op, self.worker_id
            )));
        }
        Ok(envelope.payload)
    }
}

impl Communicator for LocalComm {
    fn worker_id(&self) -> usize {
        self.worker_id
    }

    fn worker_num(&self) -> usize {
        self.worker_num
    }

    fn fid(&self) -> FragmentId {
        self.fid
    }

    fn frag_to_worker(&self, fid: FragmentId) -> Result<usize, LoadError> {
        self.frag_to_worker
            .get(fid.index())
            .copied()
            .ok_or_else(|| LoadError::InvalidArgument(format!("fragment {fid} out of range")))
    }

    fn gather(&self, payload: Vec<u8>, root: usize) -> Result<Option<Vec<Vec<u8>>>, LoadError> {
        self.check_root(root)?;
        let seq = self.next_seq();
        if self.worker_id != root {
            self.send(root, seq, Op::Gather, payload)?;
            return Ok(None);
        }
        let mut own = Some(payload);
        let mut gathered = Vec::with_capacity(self.worker_num);
        for src in 0..self.worker_num {
            if src == root {
                gathered.push(own.take().unwrap_or_default());
            } else {
                gathered.push(self.recv(src, seq, Op::Gather)?);
            }
        }
        Ok(Some(gathered))
    }

    fn broadcast(&self, payload: Vec<u8>, root: usize) -> Result<Vec<u8>, LoadError> {
        self.check_root(root)?;
        let seq = self.next_seq();
        if self.worker_id != root {
            return self.recv(root, seq, Op::Broadcast);
        }
        for dst in (0..self.worker_num).filter(|&dst| dst != root) {
            self.send(dst, seq, Op::Broadcast, payload.clone())?;
        }
        Ok(payload)
    }

    fn all_to_all(&self, outgoing: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, LoadError> {
        if outgoing.len() != self.worker_num {
            return Err(LoadError::InvalidArgument(format!(
                "all-to-all needs {} payloads, got {}",
                self.worker_num,
                outgoing.len()
            )));
        }
        let seq = self.next_seq();
        let mut own = None;
        for (dst, payload) in outgoing.into_iter().enumerate() {
            if dst == self.worker_id {
                own = Some(payload);
            } else {
                self.send(dst, seq, Op::AllToAll, payload)?;
            }
        }
        let mut incoming = Vec::with_capacity(self.worker_num);
        for src in 0..self.worker_num {
            if src == self.worker_id {
                incoming.push(own.take().unwrap_or_default());
            } else {
                incoming.push(self.recv(src, seq, Op::AllToAll)?);
            }
        }
        Ok(incoming)
    }
}

// =============================================================================
// TESTS
// =============================================================================
