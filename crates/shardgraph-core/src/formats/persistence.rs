//! # Payload Format
//!
//! Binary serialization for schemas, shuffled tables, oid lists and sealed
//! objects.
//!
//! Format: Header (5 bytes) + postcard-serialized payload.
//! - 4 bytes: Magic ("SGRF")
//! - 1 byte: Version
//!
//! ## Validation
//!
//! Every decode checks, before touching the payload:
//! - Maximum payload size (`MAX_PAYLOAD_SIZE`)
//! - Header magic and version
//!
//! A zero-length byte string is never a valid payload; collectives use it as
//! the "nothing to contribute" sentinel instead.

use crate::{LoadError, primitives};
use serde::Serialize;
use serde::de::DeserializeOwned;

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum accepted payload size.
///
/// Validated BEFORE attempting deserialization so a corrupted length cannot
/// trigger a huge allocation.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024 * 1024; // 1 GiB

/// Header length in bytes.
const HEADER_LEN: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// The header preceding every payload.
#[derive(Debug, Clone, Copy)]
pub struct PayloadHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PayloadHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), LoadError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(LoadError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(LoadError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() < HEADER_LEN {
            return Err(LoadError::DeserializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for PayloadHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a value to bytes (header + payload).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LoadError> {
    let header = PayloadHeader::new();
    let payload =
        postcard::to_stdvec(value).map_err(|e| LoadError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LEN + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a value from bytes produced by `encode`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LoadError> {
    if bytes.len() > MAX_PAYLOAD_SIZE {
        return Err(LoadError::DeserializationError(format!(
            "Payload size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let header = PayloadHeader::from_bytes(bytes)?;
    header.validate()?;

    postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| {
        LoadError::DeserializationError(format!("Failed to decode payload: {}", e))
    })
}

// =============================================================================
// TESTS
// =============================================================================
