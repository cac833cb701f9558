//! # Wire and Object Formats
//!
//! Byte encodings for everything that crosses a collective or lands in the
//! object store.

pub mod persistence;

pub use persistence::{PayloadHeader, decode, encode};
