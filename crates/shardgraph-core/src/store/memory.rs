//! In-process object store shared by worker threads.

use super::{ObjectHandle, ObjectKind, ObjectStore, make_object_id, visible_to};
use crate::{InstanceId, LoadError, ObjectId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
struct Entry {
    kind: ObjectKind,
    persisted: bool,
    payload: Arc<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Shared {
    objects: BTreeMap<ObjectId, Entry>,
    next_sequence: BTreeMap<InstanceId, u64>,
}

/// Object store held in memory; `connect` hands out further instances.
#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    instance: InstanceId,
    shared: Arc<RwLock<Shared>>,
}

impl MemoryObjectStore {
    /// A fresh store, connected as `instance`.
    pub fn new(instance: InstanceId) -> Result<Self, LoadError> {
        make_object_id(instance, 0)?;
        Ok(Self {
            instance,
            shared: Arc::new(RwLock::new(Shared::default())),
        })
    }

    /// Another connection to the same store.
    pub fn connect(&self, instance: InstanceId) -> Result<Self, LoadError> {
        make_object_id(instance, 0)?;
        Ok(Self {
            instance,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Number of stored objects, persisted or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.read().objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn instance_id(&self) -> InstanceId {
        self.instance
    }

    fn put(&self, kind: ObjectKind, payload: Vec<u8>) -> Result<ObjectId, LoadError> {
        let mut shared = self.shared.write();
        let sequence = shared.next_sequence.entry(self.instance).or_insert(0);
        let id = make_object_id(self.instance, *sequence)?;
        *sequence += 1;
        shared.objects.insert(
            id,
            Entry {
                kind,
                persisted: false,
                payload: Arc::new(payload),
            },
        );
        Ok(id)
    }

    fn persist(&self, id: ObjectId) -> Result<(), LoadError> {
        let mut shared = self.shared.write();
        match shared.objects.get_mut(&id) {
            Some(entry) if visible_to(id, entry.persisted, self.instance) => {
                entry.persisted = true;
                Ok(())
            }
            _ => Err(LoadError::ObjectNotFound(id)),
        }
    }

    fn is_persisted(&self, id: ObjectId) -> Result<bool, LoadError> {
        Ok(self.get(id)?.is_persisted())
    }

    fn get(&self, id: ObjectId) -> Result<ObjectHandle, LoadError> {
        let shared = self.shared.read();
        match shared.objects.get(&id) {
            Some(entry) if visible_to(id, entry.persisted, self.instance) => Ok(ObjectHandle::new(
                id,
                entry.kind,
                entry.persisted,
                Arc::clone(&entry.payload),
            )),
            _ => Err(LoadError::ObjectNotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpersisted_objects_are_private() {
        let a = MemoryObjectStore::new(InstanceId(0)).expect("store");
        let b = a.connect(InstanceId(1)).expect("connect");

        let id = a.put(ObjectKind::Fragment, vec![1, 2, 3]).expect("put");
        assert!(a.get(id).is_ok());
        assert!(matches!(b.get(id), Err(LoadError::ObjectNotFound(_))));
        assert!(matches!(b.persist(id), Err(LoadError::ObjectNotFound(_))));

        a.persist(id).expect("persist");
        assert!(b.is_persisted(id).expect("persisted"));
        assert_eq!(b.get(id).expect("get").kind(), ObjectKind::Fragment);
    }

    #[test]
    fn persist_twice_is_noop() {
        let store = MemoryObjectStore::new(InstanceId(2)).expect("store");
        let id = store.put(ObjectKind::VertexMap, vec![]).expect("put");
        store.persist(id).expect("first");
        store.persist(id).expect("second");
        assert!(store.is_persisted(id).expect("persisted"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn instances_mint_distinct_ids() {
        let a = MemoryObjectStore::new(InstanceId(0)).expect("store");
        let b = a.connect(InstanceId(1)).expect("connect");
        let ia = a.put(ObjectKind::Fragment, vec![]).expect("put");
        let ib = b.put(ObjectKind::Fragment, vec![]).expect("put");
        assert_ne!(ia, ib);
    }

    #[test]
    fn unknown_object_not_found() {
        let store = MemoryObjectStore::new(InstanceId(0)).expect("store");
        assert!(matches!(
            store.get(ObjectId(99)),
            Err(LoadError::ObjectNotFound(ObjectId(99)))
        ));
    }
}
