//! # redb-backed Object Store
//!
//! A file-backed object store using the redb embedded database.
//!
//! Persisted objects survive the process and can be inspected after the
//! load. Objects that were never persisted are transient: they are purged the
//! next time the file is opened.
//!
//! Worker connections made with `connect` share one `Database` handle; redb
//! serializes the write transactions.

use super::{ObjectHandle, ObjectKind, ObjectStore, make_object_id, visible_to};
use crate::{InstanceId, LoadError, ObjectId};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Table for objects: ObjectId(u64) -> kind tag byte followed by the payload
const OBJECTS: TableDefinition<u64, &[u8]> = TableDefinition::new("objects");

/// Table of persisted object ids
const PERSISTED: TableDefinition<u64, u8> = TableDefinition::new("persisted");

/// Table for per-instance sequence counters: InstanceId(u64) -> next sequence
const SEQUENCES: TableDefinition<u64, u64> = TableDefinition::new("sequences");

fn io(e: impl std::fmt::Display) -> LoadError {
    LoadError::IoError(e.to_string())
}

/// One instance's connection to a redb object file.
#[derive(Clone)]
pub struct RedbObjectStore {
    instance: InstanceId,
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbObjectStore")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl RedbObjectStore {
    /// Open or create the store at `path`, connected as `instance`.
    pub fn open(path: impl AsRef<Path>, instance: InstanceId) -> Result<Self, LoadError> {
        make_object_id(instance, 0)?;
        let db = Database::create(path.as_ref()).map_err(io)?;

        let write_txn = db.begin_write().map_err(io)?;
        {
            let mut objects = write_txn.open_table(OBJECTS).map_err(io)?;
            let persisted = write_txn.open_table(PERSISTED).map_err(io)?;
            let _ = write_txn.open_table(SEQUENCES).map_err(io)?;

            let mut transient = Vec::new();
            for entry in objects.iter().map_err(io)? {
                let (key, _) = entry.map_err(io)?;
                let id = key.value();
                if persisted.get(id).map_err(io)?.is_none() {
                    transient.push(id);
                }
            }
            for id in transient {
                objects.remove(id).map_err(io)?;
            }
        }
        write_txn.commit().map_err(io)?;

        Ok(Self {
            instance,
            db: Arc::new(db),
        })
    }

    /// Another connection to the same file.
    pub fn connect(&self, instance: InstanceId) -> Result<Self, LoadError> {
        make_object_id(instance, 0)?;
        Ok(Self {
            instance,
            db: Arc::clone(&self.db),
        })
    }

    /// Ids of every persisted object, in order.
    pub fn persisted_ids(&self) -> Result<Vec<ObjectId>, LoadError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(PERSISTED).map_err(io)?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(io)? {
            let (key, _) = entry.map_err(io)?;
            ids.push(ObjectId(key.value()));
        }
        Ok(ids)
    }
}

impl ObjectStore for RedbObjectStore {
    fn instance_id(&self) -> InstanceId {
        self.instance
    }

    fn put(&self, kind: ObjectKind, payload: Vec<u8>) -> Result<ObjectId, LoadError> {
        let mut row = Vec::with_capacity(payload.len() + 1);
        row.push(kind.tag());
        row.extend_from_slice(&payload);

        let write_txn = self.db.begin_write().map_err(io)?;
        let id = {
            let mut sequences = write_txn.open_table(SEQUENCES).map_err(io)?;
            let sequence = sequences
                .get(self.instance.0)
                .map_err(io)?
                .map(|v| v.value())
                .unwrap_or(0);
            let id = make_object_id(self.instance, sequence)?;
            sequences
                .insert(self.instance.0, sequence + 1)
                .map_err(io)?;

            let mut objects = write_txn.open_table(OBJECTS).map_err(io)?;
            objects.insert(id.0, row.as_slice()).map_err(io)?;
            id
        };
        write_txn.commit().map_err(io)?;
        Ok(id)
    }

    fn persist(&self, id: ObjectId) -> Result<(), LoadError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let objects = write_txn.open_table(OBJECTS).map_err(io)?;
            let mut persisted = write_txn.open_table(PERSISTED).map_err(io)?;
            let exists = objects.get(id.0).map_err(io)?.is_some();
            let already = persisted.get(id.0).map_err(io)?.is_some();
            if !exists || !visible_to(id, already, self.instance) {
                return Err(LoadError::ObjectNotFound(id));
            }
            if !already {
                persisted.insert(id.0, 1).map_err(io)?;
            }
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }

    fn is_persisted(&self, id: ObjectId) -> Result<bool, LoadError> {
        Ok(self.get(id)?.is_persisted())
    }

    fn get(&self, id: ObjectId) -> Result<ObjectHandle, LoadError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let objects = read_txn.open_table(OBJECTS).map_err(io)?;
        let persisted = read_txn.open_table(PERSISTED).map_err(io)?;

        let row = objects
            .get(id.0)
            .map_err(io)?
            .map(|v| v.value().to_vec())
            .ok_or(LoadError::ObjectNotFound(id))?;
        let is_persisted = persisted.get(id.0).map_err(io)?.is_some();
        if !visible_to(id, is_persisted, self.instance) {
            return Err(LoadError::ObjectNotFound(id));
        }

        let (&tag, payload) = row
            .split_first()
            .ok_or_else(|| LoadError::DeserializationError(format!("object {id} has no tag")))?;
        Ok(ObjectHandle::new(
            id,
            ObjectKind::from_tag(tag)?,
            is_persisted,
            Arc::new(payload.to_vec()),
        ))
    }
}

// =============================================================================
// TESTS
// =============================================================================
