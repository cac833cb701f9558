//! # Core Type Definitions
//!
//! This module contains the identifier and error types shared by every
//! pipeline component:
//! - Vertex identifiers (`Oid`, `Gid`)
//! - Topology identifiers (`FragmentId`, `LabelId`, `InstanceId`, `ObjectId`)
//! - Table roles (`Role`)
//! - Error types (`LoadError`, `ErrorKind`)
//!
//! ## Determinism Guarantees
//!
//! All identifier types implement `Ord` so they can key `BTreeMap`/`BTreeSet`,
//! and `Oid` exposes a canonical byte encoding that every worker hashes the
//! same way.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// TOPOLOGY IDENTIFIERS
// =============================================================================

/// Logical fragment number in `0..fnum`.
///
/// A fragment is served by exactly one worker, but not necessarily the worker
/// whose rank equals the fragment id. See `Communicator::frag_to_worker`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FragmentId(pub u32);

impl FragmentId {
    /// The fragment number as a `usize` index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer index of a vertex or edge label, assigned at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabelId(pub u32);

impl LabelId {
    /// The label index as a `usize` slot.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of an object-store instance (one per worker process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

/// Cluster-wide identifier of a sealed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{:016x}", self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = LoadError;

    /// Accepts the `o`-prefixed hex form `Display` prints, or a plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix('o') {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse(),
        };
        parsed
            .map(Self)
            .map_err(|_| LoadError::InvalidArgument(format!("not an object id: '{s}'")))
    }
}

// =============================================================================
// VERTEX IDENTIFIERS
// =============================================================================

/// Global vertex id: owning fragment, label and local offset packed into 64 bits.
///
/// The layout is owned by `IdParser`; the fragment bits are always the
/// high-order slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gid(pub u64);

/// External, user-supplied vertex identifier.
///
/// Unique within a label. Not ordered across workers in any meaningful way;
/// the `Ord` impl exists for deterministic containers and segment cuts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Oid {
    /// Integer identifier.
    Int(i64),
    /// String identifier.
    Str(String),
}

impl Oid {
    /// Canonical byte encoding: one tag byte followed by the payload.
    ///
    /// Integers are little-endian so the encoding is platform independent.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Self::Int(v) => {
                let mut out = Vec::with_capacity(9);
                out.push(0);
                out.extend_from_slice(&v.to_le_bytes());
                out
            }
            Self::Str(s) => {
                let mut out = Vec::with_capacity(s.len() + 1);
                out.push(1);
                out.extend_from_slice(s.as_bytes());
                out
            }
        }
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Oid {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Oid {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

// =============================================================================
// TABLE ROLE
// =============================================================================

/// Role of a loaded table, stamped into its schema metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Vertex table: one row per vertex, id column first.
    Vertex,
    /// Edge table: source and destination id columns first.
    Edge,
}

impl Role {
    /// Metadata spelling of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vertex => "VERTEX",
            Self::Edge => "EDGE",
        }
    }

    /// Parse the metadata spelling.
    pub fn parse(s: &str) -> Result<Self, LoadError> {
        match s {
            "VERTEX" => Ok(Self::Vertex),
            "EDGE" => Ok(Self::Edge),
            other => Err(LoadError::InvalidArgument(format!(
                "unknown table role '{other}'"
            ))),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while loading a distributed graph.
///
/// - No silent failures
/// - Every fallible step returns `Result<T, LoadError>`
/// - A failure inside a collective phase is fatal for the whole load
#[derive(Debug, Error)]
pub enum LoadError {
    /// Shard open/read/parse failure, or no worker holds data for a label.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Schemas cannot be reconciled or tables cannot be coerced.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// An OID was never assigned to any fragment.
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    /// A caller passed a malformed request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A collective call failed or workers diverged in their call sequence.
    #[error("Communication error: {0}")]
    Communication(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// The requested object is unknown or not visible to this instance.
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),
}

/// Coarse classification of a `LoadError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    InvalidSchema,
    InvalidPartition,
    InvalidArgument,
    Communication,
    Serialization,
    ObjectStore,
}

impl LoadError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::IoError(_) => ErrorKind::Io,
            Self::InvalidSchema(_) => ErrorKind::InvalidSchema,
            Self::InvalidPartition(_) => ErrorKind::InvalidPartition,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Communication(_) => ErrorKind::Communication,
            Self::SerializationError(_) | Self::DeserializationError(_) => {
                ErrorKind::Serialization
            }
            Self::ObjectNotFound(_) => ErrorKind::ObjectStore,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_canonical_bytes_distinguish_kinds() {
        let int = Oid::Int(49);
        let text = Oid::from("1");
        assert_ne!(int.canonical_bytes(), text.canonical_bytes());
        assert_eq!(int.canonical_bytes()[0], 0);
        assert_eq!(text.canonical_bytes(), vec![1, b'1']);
    }

    #[test]
    fn object_id_parses_its_display_form() {
        let id = ObjectId(0x0001_0000_0000_002a);
        assert_eq!(id.to_string().parse::<ObjectId>().expect("hex"), id);
        assert_eq!("42".parse::<ObjectId>().expect("decimal"), ObjectId(42));
        assert!(matches!(
            "oxyz".parse::<ObjectId>(),
            Err(LoadError::InvalidArgument(_))
        ));
    }

    #[test]
    fn oid_ordering_is_total() {
        let mut oids = vec![Oid::from("b"), Oid::Int(3), Oid::from("a"), Oid::Int(-1)];
        oids.sort();
        assert_eq!(
            oids,
            vec![Oid::Int(-1), Oid::Int(3), Oid::from("a"), Oid::from("b")]
        );
    }

    #[test]
    fn role_roundtrips_through_metadata_spelling() {
        assert_eq!(Role::parse(Role::Vertex.as_str()).expect("parse"), Role::Vertex);
        assert_eq!(Role::parse("EDGE").expect("parse"), Role::Edge);
        assert!(matches!(
            Role::parse("vertex"),
            Err(LoadError::InvalidArgument(_))
        ));
    }

    #[test]
    fn error_kind_groups_codec_failures() {
        assert_eq!(
            LoadError::SerializationError("x".into()).kind(),
            ErrorKind::Serialization
        );
        assert_eq!(
            LoadError::DeserializationError("x".into()).kind(),
            ErrorKind::Serialization
        );
        assert_eq!(
            LoadError::ObjectNotFound(ObjectId(7)).kind(),
            ErrorKind::ObjectStore
        );
    }
}
