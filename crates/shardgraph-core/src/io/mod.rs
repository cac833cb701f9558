//! # Shard I/O
//!
//! The adaptor layer that turns a shard location into a `Table`.
//!
//! A location is a path plus `#`-separated options:
//! `vertices_0#header_row=true&delimiter=,`. Adaptors are opened, told which
//! part of the shard this worker reads, read once and closed. Every failure
//! is reported as `LoadError::IoError`; nothing is retried here.

mod csv_adaptor;
mod memory;

pub use csv_adaptor::{CsvIoAdaptor, CsvIoFactory};
pub use memory::MemoryIoFactory;

use crate::primitives::OPTION_SEPARATOR;
use crate::{LoadError, Table};
use std::collections::BTreeMap;
use std::ops::Range;

/// Reader for one shard location.
pub trait IoAdaptor {
    /// Restrict the read to part `index` of `total_parts`.
    fn set_partial_read(&mut self, index: usize, total_parts: usize) -> Result<(), LoadError>;

    fn open(&mut self) -> Result<(), LoadError>;

    /// Read the (partial) shard into a table.
    fn read_table(&mut self) -> Result<Table, LoadError>;

    fn close(&mut self) -> Result<(), LoadError>;
}

/// Creates adaptors for locations.
pub trait IoFactory: Send + Sync {
    fn create(&self, location: &str) -> Result<Box<dyn IoAdaptor>, LoadError>;
}

/// A parsed shard location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub options: BTreeMap<String, String>,
}

impl Location {
    /// Parse `path[#key=value[&key=value...]]`.
    pub fn parse(location: &str) -> Result<Self, LoadError> {
        let (path, raw_options) = match location.split_once(OPTION_SEPARATOR) {
            Some((path, options)) => (path, options),
            None => (location, ""),
        };
        if path.is_empty() {
            return Err(LoadError::IoError(format!(
                "location '{location}' has no path"
            )));
        }
        let mut options = BTreeMap::new();
        for pair in raw_options.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                LoadError::IoError(format!("malformed option '{pair}' in '{location}'"))
            })?;
            options.insert(key.to_string(), value.to_string());
        }
        Ok(Self {
            path: path.to_string(),
            options,
        })
    }

    /// Boolean option, `default` when absent.
    pub fn option_bool(&self, key: &str, default: bool) -> Result<bool, LoadError> {
        match self.options.get(key).map(String::as_str) {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(LoadError::IoError(format!(
                "option '{key}' must be true or false, got '{other}'"
            ))),
        }
    }
}

/// Rows `[n * index / total, n * (index + 1) / total)` of an `n`-row shard.
pub fn partial_range(rows: usize, index: usize, total_parts: usize) -> Range<usize> {
    let start = rows * index / total_parts;
    let end = rows * (index + 1) / total_parts;
    start..end
}

fn check_partial(index: usize, total_parts: usize) -> Result<(), LoadError> {
    if total_parts == 0 || index >= total_parts {
        return Err(LoadError::IoError(format!(
            "invalid partial read: part {index} of {total_parts}"
        )));
    }
    Ok(())
}
