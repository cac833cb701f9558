//! Local delimited-text shards.

use super::{IoAdaptor, IoFactory, Location, check_partial, partial_range};
use crate::table::{Column, DataType, Field, Schema, Table, Value};
use crate::LoadError;
use csv::{Reader, ReaderBuilder, StringRecord};
use std::fs::File;

/// Reads a CSV shard from the local filesystem.
///
/// Options: `header_row` (default `true`), `delimiter` (default `,`).
/// Column types are inferred over the rows this worker selects, so two
/// workers may legitimately infer different types for the same column; schema
/// reconciliation settles that afterwards.
pub struct CsvIoAdaptor {
    location: Location,
    part: (usize, usize),
    reader: Option<Reader<File>>,
}

impl std::fmt::Debug for CsvIoAdaptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvIoAdaptor")
            .field("location", &self.location)
            .field("part", &self.part)
            .field("open", &self.reader.is_some())
            .finish()
    }
}

impl CsvIoAdaptor {
    pub fn new(location: &str) -> Result<Self, LoadError> {
        Ok(Self {
            location: Location::parse(location)?,
            part: (0, 1),
            reader: None,
        })
    }

    fn delimiter(&self) -> Result<u8, LoadError> {
        match self.location.options.get("delimiter").map(String::as_bytes) {
            None => Ok(b','),
            Some([byte]) => Ok(*byte),
            Some(other) => Err(LoadError::IoError(format!(
                "delimiter must be a single byte, got {} bytes",
                other.len()
            ))),
        }
    }
}

impl IoAdaptor for CsvIoAdaptor {
    fn set_partial_read(&mut self, index: usize, total_parts: usize) -> Result<(), LoadError> {
        check_partial(index, total_parts)?;
        self.part = (index, total_parts);
        Ok(())
    }

    fn open(&mut self) -> Result<(), LoadError> {
        let header_row = self.location.option_bool("header_row", true)?;
        let reader = ReaderBuilder::new()
            .has_headers(header_row)
            .delimiter(self.delimiter()?)
            .from_path(&self.location.path)
            .map_err(|e| {
                LoadError::IoError(format!("cannot open '{}': {}", self.location.path, e))
            })?;
        self.reader = Some(reader);
        Ok(())
    }

    fn read_table(&mut self) -> Result<Table, LoadError> {
        let path = self.location.path.clone();
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| LoadError::IoError(format!("'{path}' read before open")))?;

        let mut records = Vec::new();
        for record in reader.records() {
            records.push(
                record.map_err(|e| LoadError::IoError(format!("cannot parse '{path}': {e}")))?,
            );
        }

        let names: Vec<String> = if reader.has_headers() {
            reader
                .headers()
                .map_err(|e| LoadError::IoError(format!("cannot read header of '{path}': {e}")))?
                .iter()
                .map(str::to_string)
                .collect()
        } else {
            let width = records.first().map_or(0, StringRecord::len);
            (0..width).map(|i| format!("f{i}")).collect()
        };

        let (index, total) = self.part;
        let selected = records
            .get(partial_range(records.len(), index, total))
            .unwrap_or_default();
        build_table(&names, selected)
    }

    fn close(&mut self) -> Result<(), LoadError> {
        self.reader = None;
        Ok(())
    }
}

/// Infer a column type from its raw cells. Empty cells are nulls.
fn infer_type<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> DataType {
    let mut present = cells.filter(|c| !c.is_empty()).peekable();
    if present.peek().is_none() {
        return DataType::Null;
    }
    if present.clone().all(|c| parse_bool(c).is_some()) {
        DataType::Boolean
    } else if present.clone().all(|c| c.parse::<i64>().is_ok()) {
        DataType::Int64
    } else if present.all(|c| c.parse::<f64>().is_ok()) {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_cell(cell: &str, data_type: DataType) -> Result<Value, LoadError> {
    if cell.is_empty() {
        return Ok(Value::Null);
    }
    let bad = || LoadError::IoError(format!("cannot parse '{cell}' as {}", data_type.type_key()));
    Ok(match data_type {
        DataType::Null => Value::Null,
        DataType::Boolean => Value::Boolean(parse_bool(cell).ok_or_else(bad)?),
        DataType::Int64 => Value::Int64(cell.parse().map_err(|_| bad())?),
        DataType::UInt64 => Value::UInt64(cell.parse().map_err(|_| bad())?),
        DataType::Float64 => Value::Float64(cell.parse().map_err(|_| bad())?),
        DataType::Utf8 => Value::Utf8(cell.to_string()),
    })
}

fn build_table(names: &[String], records: &[StringRecord]) -> Result<Table, LoadError> {
    let mut fields = Vec::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let cells = records.iter().map(move |r| r.get(i).unwrap_or(""));
        let data_type = infer_type(cells.clone());
        let values = cells
            .map(|cell| parse_cell(cell, data_type))
            .collect::<Result<Vec<_>, _>>()?;
        fields.push(Field::new(name.clone(), data_type));
        columns.push(Column::new(values));
    }
    Table::try_new(Schema::new(fields), columns)
}

/// Factory producing `CsvIoAdaptor`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvIoFactory;

impl IoFactory for CsvIoFactory {
    fn create(&self, location: &str) -> Result<Box<dyn IoAdaptor>, LoadError> {
        Ok(Box::new(CsvIoAdaptor::new(location)?))
    }
}

// =============================================================================
// TESTS
// =============================================================================
