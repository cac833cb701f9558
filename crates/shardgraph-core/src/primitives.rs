//! # Loader Primitives
//!
//! Fixed constants shared by every worker of a load.
//!
//! Workers never negotiate these values: two workers built from the same
//! crate version agree on column positions, metadata keys and the wire
//! header by construction.

// =============================================================================
// COLUMN LAYOUT
// =============================================================================

/// Default position of the vertex id column in a vertex shard.
pub const DEFAULT_ID_COLUMN: usize = 0;

/// Default position of the source id column in an edge shard.
pub const DEFAULT_SRC_COLUMN: usize = 0;

/// Default position of the destination id column in an edge shard.
pub const DEFAULT_DST_COLUMN: usize = 1;

/// Number of leading id columns in a stamped edge table (src, dst).
pub const EDGE_ID_COLUMNS: usize = 2;

// =============================================================================
// SCHEMA METADATA KEYS
// =============================================================================

/// Table role: `VERTEX` or `EDGE`.
pub const META_TYPE: &str = "type";

/// Human label name.
pub const META_LABEL: &str = "label";

/// Integer label index; the slot a table is re-indexed into after a shuffle.
pub const META_LABEL_INDEX: &str = "label_index";

/// Position of the vertex id column.
pub const META_ID_COLUMN: &str = "id_column";

/// Position of the edge source column.
pub const META_SRC_COLUMN: &str = "src_column";

/// Position of the edge destination column.
pub const META_DST_COLUMN: &str = "dst_column";

/// Number of (src-label, dst-label) relation pairs on an edge table.
pub const META_SUB_LABEL_NUM: &str = "sub_label_num";

/// Prefix of the i-th relation's source label key (`src_label_0`, ...).
pub const META_SRC_LABEL_PREFIX: &str = "src_label_";

/// Prefix of the i-th relation's destination label key (`dst_label_0`, ...).
pub const META_DST_LABEL_PREFIX: &str = "dst_label_";

/// Label name stamped when the configuration does not name a label.
pub const LABEL_PLACEHOLDER: &str = "_";

// =============================================================================
// SHARD NAMING
// =============================================================================

/// Separator between shard base paths in a file-set string.
pub const FILE_LIST_SEPARATOR: char = ';';

/// Separator between a shard base path and its label index.
pub const LABEL_SUFFIX_SEPARATOR: char = '_';

/// Separator between a shard location and its adaptor options.
pub const OPTION_SEPARATOR: char = '#';

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Magic bytes heading every payload this crate serializes.
pub const MAGIC_BYTES: &[u8; 4] = b"SGRF";

/// Current payload format version.
///
/// Increment this when making breaking changes to any serialized type.
pub const FORMAT_VERSION: u8 = 1;

/// Bits of an `ObjectId` reserved for the creating instance.
pub const OBJECT_INSTANCE_BITS: u32 = 16;
