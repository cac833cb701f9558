//! Shards served from tables already in memory.

use super::{IoAdaptor, IoFactory, Location, check_partial, partial_range};
use crate::{LoadError, Table};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serves registered tables by path; options in the location are ignored.
#[derive(Debug, Clone, Default)]
pub struct MemoryIoFactory {
    tables: Arc<BTreeMap<String, Table>>,
}

impl MemoryIoFactory {
    #[must_use]
    pub fn new(tables: BTreeMap<String, Table>) -> Self {
        Self {
            tables: Arc::new(tables),
        }
    }
}

impl IoFactory for MemoryIoFactory {
    fn create(&self, location: &str) -> Result<Box<dyn IoAdaptor>, LoadError> {
        Ok(Box::new(MemoryAdaptor {
            location: Location::parse(location)?,
            tables: Arc::clone(&self.tables),
            part: (0, 1),
            opened: None,
        }))
    }
}

struct MemoryAdaptor {
    location: Location,
    tables: Arc<BTreeMap<String, Table>>,
    part: (usize, usize),
    opened: Option<Table>,
}

impl IoAdaptor for MemoryAdaptor {
    fn set_partial_read(&mut self, index: usize, total_parts: usize) -> Result<(), LoadError> {
        check_partial(index, total_parts)?;
        self.part = (index, total_parts);
        Ok(())
    }

    fn open(&mut self) -> Result<(), LoadError> {
        let table = self.tables.get(&self.location.path).ok_or_else(|| {
            LoadError::IoError(format!("no table registered at '{}'", self.location.path))
        })?;
        self.opened = Some(table.clone());
        Ok(())
    }

    fn read_table(&mut self) -> Result<Table, LoadError> {
        let table = self.opened.as_ref().ok_or_else(|| {
            LoadError::IoError(format!("'{}' read before open", self.location.path))
        })?;
        let (index, total) = self.part;
        let rows: Vec<usize> = partial_range(table.num_rows(), index, total).collect();
        table.take(&rows)
    }

    fn close(&mut self) -> Result<(), LoadError> {
        self.opened = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, DataType, Field, Schema, Value};

    #[test]
    fn serves_partial_rows() {
        let table = Table::try_new(
            Schema::new(vec![Field::new("id", DataType::Int64)]),
            vec![Column::new((1..=4).map(Value::Int64).collect())],
        )
        .expect("table");
        let factory = MemoryIoFactory::new(BTreeMap::from([("v_0".to_string(), table)]));

        let mut adaptor = factory.create("v_0#header_row=true").expect("create");
        adaptor.set_partial_read(0, 2).expect("partial");
        adaptor.open().expect("open");
        let part = adaptor.read_table().expect("read");
        adaptor.close().expect("close");

        assert_eq!(
            part.column(0).expect("id").values(),
            &[Value::Int64(1), Value::Int64(2)]
        );
    }

    #[test]
    fn unknown_path_is_io_error() {
        let factory = MemoryIoFactory::default();
        let mut adaptor = factory.create("nope_0").expect("create");
        assert!(matches!(adaptor.open(), Err(LoadError::IoError(_))));
    }
}
