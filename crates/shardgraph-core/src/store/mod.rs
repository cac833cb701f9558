//! # Object Store
//!
//! Sealed, immutable objects shared between workers.
//!
//! Every worker owns one store instance. Sealing an object hands back a
//! cluster-wide `ObjectId`; the creating instance's id is packed into its
//! high bits so ids minted by different workers never collide. An object is
//! visible only to its creator until it is persisted, after which every
//! instance connected to the same store can read it. Persisting twice is a
//! no-op.
//!
//! Objects are stored as tagged payloads and read back through
//! `ObjectHandle::downcast`, which fails with `InvalidArgument` when the tag
//! does not match the requested type.

mod memory;
mod redb_store;

pub use memory::MemoryObjectStore;
pub use redb_store::RedbObjectStore;

use crate::formats::{decode, encode};
use crate::primitives::OBJECT_INSTANCE_BITS;
use crate::{InstanceId, LoadError, ObjectId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Type tag of a sealed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    VertexMap,
    Fragment,
    FragmentGroup,
}

impl ObjectKind {
    /// Storage tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::VertexMap => 1,
            Self::Fragment => 2,
            Self::FragmentGroup => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, LoadError> {
        match tag {
            1 => Ok(Self::VertexMap),
            2 => Ok(Self::Fragment),
            3 => Ok(Self::FragmentGroup),
            other => Err(LoadError::DeserializationError(format!(
                "unknown object tag {other}"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VertexMap => "vertex_map",
            Self::Fragment => "fragment",
            Self::FragmentGroup => "fragment_group",
        }
    }
}

/// Largest instance id that fits the object id layout.
pub const MAX_INSTANCE: u64 = (1 << OBJECT_INSTANCE_BITS) - 1;

const SEQUENCE_BITS: u32 = u64::BITS - OBJECT_INSTANCE_BITS;

/// Pack a creator instance and its per-instance sequence number.
pub fn make_object_id(instance: InstanceId, sequence: u64) -> Result<ObjectId, LoadError> {
    if instance.0 > MAX_INSTANCE {
        return Err(LoadError::InvalidArgument(format!(
            "instance id {} exceeds {MAX_INSTANCE}",
            instance.0
        )));
    }
    if sequence >> SEQUENCE_BITS != 0 {
        return Err(LoadError::InvalidArgument(format!(
            "instance {} exhausted its object ids",
            instance.0
        )));
    }
    Ok(ObjectId((instance.0 << SEQUENCE_BITS) | sequence))
}

/// Instance that created `id`.
#[must_use]
pub const fn creator_of(id: ObjectId) -> InstanceId {
    InstanceId(id.0 >> SEQUENCE_BITS)
}

/// A type that can be sealed into the store.
pub trait Sealable: Serialize + DeserializeOwned {
    const KIND: ObjectKind;

    /// Seal `self` into `store`, returning the new object's id.
    fn seal(&self, store: &dyn ObjectStore) -> Result<ObjectId, LoadError> {
        store.put(Self::KIND, encode(self)?)
    }

    /// Read object `id` back as `Self`.
    fn fetch(store: &dyn ObjectStore, id: ObjectId) -> Result<Self, LoadError> {
        store.get(id)?.downcast()
    }
}

/// A readable view of one stored object.
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    id: ObjectId,
    kind: ObjectKind,
    persisted: bool,
    payload: Arc<Vec<u8>>,
}

impl ObjectHandle {
    pub(crate) fn new(id: ObjectId, kind: ObjectKind, persisted: bool, payload: Arc<Vec<u8>>) -> Self {
        Self {
            id,
            kind,
            persisted,
            payload,
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    #[must_use]
    pub fn creator(&self) -> InstanceId {
        creator_of(self.id)
    }

    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Typed view of the payload.
    pub fn downcast<T: Sealable>(&self) -> Result<T, LoadError> {
        if self.kind != T::KIND {
            return Err(LoadError::InvalidArgument(format!(
                "object {} is a {}, not a {}",
                self.id,
                self.kind.as_str(),
                T::KIND.as_str()
            )));
        }
        decode(&self.payload)
    }
}

/// One worker's connection to the shared object store.
pub trait ObjectStore: Send + Sync {
    /// Instance id of this connection.
    fn instance_id(&self) -> InstanceId;

    /// Store an unpersisted object created by this instance.
    fn put(&self, kind: ObjectKind, payload: Vec<u8>) -> Result<ObjectId, LoadError>;

    /// Make `id` visible to every instance.
    fn persist(&self, id: ObjectId) -> Result<(), LoadError>;

    fn is_persisted(&self, id: ObjectId) -> Result<bool, LoadError>;

    /// Look up `id`; unpersisted foreign objects are `ObjectNotFound`.
    fn get(&self, id: ObjectId) -> Result<ObjectHandle, LoadError>;
}

/// Whether `instance` may read an object created by `creator`.
pub(crate) fn visible_to(id: ObjectId, persisted: bool, instance: InstanceId) -> bool {
    persisted || creator_of(id) == instance
}
