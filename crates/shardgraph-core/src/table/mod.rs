//! # Columnar Tables
//!
//! The in-memory table representation every pipeline stage passes around.
//!
//! A `Table` is an ordered sequence of rows sharing one `Schema`; it is stored
//! column-wise. The schema carries a string key/value metadata map that the
//! loader uses to stamp role, label and id-column information onto a table so
//! the stamp survives serialization and the shuffle.
//!
//! Tables are mutated only by the loader (metadata stamping, column
//! reordering) and by schema reconciliation (promotion). After the shuffle
//! they are consumed, never edited.

use crate::{LoadError, Oid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// DATA TYPES
// =============================================================================

/// Scalar column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Column with no observed value.
    Null,
    Boolean,
    Int64,
    UInt64,
    Float64,
    Utf8,
}

impl DataType {
    /// Canonical type key. Modal-schema computation sorts candidate fields by it.
    #[must_use]
    pub const fn type_key(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "bool",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float64 => "double",
            Self::Utf8 => "string",
        }
    }

    /// Whether a column of this type can be promoted to `target` without loss.
    #[must_use]
    pub fn can_promote_to(self, target: Self) -> bool {
        self == target || self == Self::Null || (self == Self::Int64 && target == Self::Float64)
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// One cell of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Utf8(String),
}

impl Value {
    /// Whether this cell is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Type of the cell. Null cells report `DataType::Null`.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int64(_) => DataType::Int64,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
        }
    }

    fn cast(self, target: DataType) -> Result<Self, LoadError> {
        match (self, target) {
            (Self::Null, _) => Ok(Self::Null),
            (Self::Int64(v), DataType::Float64) => Ok(Self::Float64(v as f64)),
            (value, target) if value.data_type() == target => Ok(value),
            (value, target) => Err(LoadError::InvalidSchema(format!(
                "cannot cast {} value to {}",
                value.data_type().type_key(),
                target.type_key()
            ))),
        }
    }
}

impl TryFrom<&Value> for Oid {
    type Error = LoadError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int64(v) => Ok(Self::Int(*v)),
            Value::UInt64(v) => i64::try_from(*v).map(Self::Int).map_err(|_| {
                LoadError::InvalidArgument(format!("vertex id {v} does not fit in int64"))
            }),
            Value::Utf8(s) => Ok(Self::Str(s.clone())),
            other => Err(LoadError::InvalidArgument(format!(
                "unsupported vertex id type {}",
                other.data_type().type_key()
            ))),
        }
    }
}

impl From<&Oid> for Value {
    fn from(oid: &Oid) -> Self {
        match oid {
            Oid::Int(v) => Self::Int64(*v),
            Oid::Str(s) => Self::Utf8(s.clone()),
        }
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// A named, typed column slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    /// Create a nullable field.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

/// Ordered fields plus string metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
    metadata: BTreeMap<String, String>,
}

impl Schema {
    /// Create a schema with no metadata.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            metadata: BTreeMap::new(),
        }
    }

    /// Replace the metadata map.
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    #[must_use]
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Position of the first field named `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Look up a metadata value, failing if the key is absent.
    pub fn require_metadata(&self, key: &str) -> Result<&str, LoadError> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| LoadError::InvalidArgument(format!("missing schema metadata '{key}'")))
    }

    /// Look up a metadata value and parse it as an unsigned integer.
    pub fn metadata_usize(&self, key: &str) -> Result<usize, LoadError> {
        let raw = self.require_metadata(key)?;
        raw.parse().map_err(|_| {
            LoadError::InvalidArgument(format!("schema metadata '{key}' is not an integer: {raw}"))
        })
    }

    /// Field-wise equality, ignoring metadata.
    #[must_use]
    pub fn same_fields(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

// =============================================================================
// COLUMN
// =============================================================================

/// A single column of cells.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Column {
    values: Vec<Value>,
}

impl Column {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// A column of `len` nulls.
    #[must_use]
    pub fn nulls(len: usize) -> Self {
        Self {
            values: vec![Value::Null; len],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row)
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Whether every cell is null (vacuously true when empty).
    #[must_use]
    pub fn all_null(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }
}

impl From<Vec<Value>> for Column {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

// =============================================================================
// TABLE
// =============================================================================

/// A schema plus equally long columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    schema: Schema,
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    /// Build a table, checking column count, column lengths and cell types.
    pub fn try_new(schema: Schema, columns: Vec<Column>) -> Result<Self, LoadError> {
        if schema.num_fields() != columns.len() {
            return Err(LoadError::InvalidSchema(format!(
                "schema has {} fields but {} columns were supplied",
                schema.num_fields(),
                columns.len()
            )));
        }
        let num_rows = columns.first().map_or(0, Column::len);
        for (field, column) in schema.fields().iter().zip(&columns) {
            if column.len() != num_rows {
                return Err(LoadError::InvalidSchema(format!(
                    "column '{}' has {} rows, expected {}",
                    field.name,
                    column.len(),
                    num_rows
                )));
            }
            for value in column.values() {
                if value.is_null() {
                    if !field.nullable {
                        return Err(LoadError::InvalidSchema(format!(
                            "null in non-nullable column '{}'",
                            field.name
                        )));
                    }
                } else if value.data_type() != field.data_type {
                    return Err(LoadError::InvalidSchema(format!(
                        "column '{}' declared {} holds a {} value",
                        field.name,
                        field.data_type.type_key(),
                        value.data_type().type_key()
                    )));
                }
            }
        }
        Ok(Self {
            schema,
            columns,
            num_rows,
        })
    }

    /// A zero-row table with exactly `schema`.
    #[must_use]
    pub fn empty(schema: Schema) -> Self {
        let columns = vec![Column::default(); schema.num_fields()];
        Self {
            schema,
            columns,
            num_rows: 0,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn column(&self, i: usize) -> Result<&Column, LoadError> {
        self.columns.get(i).ok_or_else(|| {
            LoadError::InvalidArgument(format!(
                "column index {i} out of range for {} columns",
                self.columns.len()
            ))
        })
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Replace the schema metadata wholesale.
    pub fn replace_schema_metadata(&mut self, metadata: BTreeMap<String, String>) {
        self.schema.metadata = metadata;
    }

    /// Insert `column` at position `i`.
    pub fn add_column(&mut self, i: usize, field: Field, column: Column) -> Result<(), LoadError> {
        if i > self.columns.len() {
            return Err(LoadError::InvalidArgument(format!(
                "cannot insert column at {i} into a table of {} columns",
                self.columns.len()
            )));
        }
        if !self.columns.is_empty() && column.len() != self.num_rows {
            return Err(LoadError::InvalidArgument(format!(
                "column '{}' has {} rows, table has {}",
                field.name,
                column.len(),
                self.num_rows
            )));
        }
        if self.columns.is_empty() {
            self.num_rows = column.len();
        }
        self.schema.fields.insert(i, field);
        self.columns.insert(i, column);
        Ok(())
    }

    /// Remove and return the column at position `i`.
    pub fn remove_column(&mut self, i: usize) -> Result<(Field, Column), LoadError> {
        if i >= self.columns.len() {
            return Err(LoadError::InvalidArgument(format!(
                "cannot remove column {i} from a table of {} columns",
                self.columns.len()
            )));
        }
        Ok((self.schema.fields.remove(i), self.columns.remove(i)))
    }

    /// Move the column at `rhs` to position `lhs`, shifting the columns between.
    ///
    /// `lhs == rhs` is a no-op; `lhs > rhs` is rejected.
    pub fn swap_column(&mut self, lhs: usize, rhs: usize) -> Result<(), LoadError> {
        if lhs == rhs {
            return Ok(());
        }
        if lhs > rhs {
            return Err(LoadError::InvalidArgument(
                "lhs index must be smaller than rhs index".to_string(),
            ));
        }
        let (field, column) = self.remove_column(rhs)?;
        self.add_column(lhs, field, column)
    }

    /// Coerce this table to `target`, matching columns by name.
    ///
    /// Missing columns become all-null; present columns are upcast where
    /// `DataType::can_promote_to` allows. Columns outside `target` are dropped
    /// only if they hold no values. The result carries `target`'s metadata.
    pub fn promote_to_schema(self, target: &Schema) -> Result<Self, LoadError> {
        let num_rows = self.num_rows;
        let Self {
            schema: local_schema,
            columns: local_columns,
            ..
        } = self;

        let mut slots: Vec<Option<Column>> = local_columns.into_iter().map(Some).collect();
        let mut columns = Vec::with_capacity(target.num_fields());

        for field in target.fields() {
            let slot = local_schema
                .index_of(&field.name)
                .and_then(|i| slots.get_mut(i).and_then(Option::take).map(|c| (i, c)));
            match slot {
                Some((i, column)) => {
                    let local_type = local_schema.fields[i].data_type;
                    if !local_type.can_promote_to(field.data_type) {
                        return Err(LoadError::InvalidSchema(format!(
                            "column '{}' of type {} cannot be promoted to {}",
                            field.name,
                            local_type.type_key(),
                            field.data_type.type_key()
                        )));
                    }
                    let values = column
                        .into_values()
                        .into_iter()
                        .map(|v| v.cast(field.data_type))
                        .collect::<Result<Vec<_>, _>>()?;
                    columns.push(Column::new(values));
                }
                None => {
                    if !field.nullable && num_rows > 0 {
                        return Err(LoadError::InvalidSchema(format!(
                            "missing non-nullable column '{}'",
                            field.name
                        )));
                    }
                    columns.push(Column::nulls(num_rows));
                }
            }
        }

        for (i, leftover) in slots.into_iter().enumerate() {
            if let Some(column) = leftover
                && !column.all_null()
            {
                return Err(LoadError::InvalidSchema(format!(
                    "column '{}' holds values but is not part of the agreed schema",
                    local_schema.fields[i].name
                )));
            }
        }

        let mut promoted = Self::try_new(target.clone(), columns)?;
        promoted.num_rows = num_rows;
        Ok(promoted)
    }

    /// A new table holding `rows` (in the given order), same schema.
    pub fn take(&self, rows: &[usize]) -> Result<Self, LoadError> {
        let mut columns = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let mut values = Vec::with_capacity(rows.len());
            for &row in rows {
                let value = column.get(row).ok_or_else(|| {
                    LoadError::InvalidArgument(format!(
                        "row {row} out of range for {} rows",
                        self.num_rows
                    ))
                })?;
                values.push(value.clone());
            }
            columns.push(Column::new(values));
        }
        Ok(Self {
            schema: self.schema.clone(),
            columns,
            num_rows: rows.len(),
        })
    }

    /// Append the rows of every table, in order. All tables must share fields.
    ///
    /// Metadata is taken from the first table.
    pub fn concat(tables: Vec<Self>) -> Result<Self, LoadError> {
        let mut iter = tables.into_iter();
        let mut acc = iter
            .next()
            .ok_or_else(|| LoadError::InvalidArgument("cannot concatenate zero tables".into()))?;
        for table in iter {
            if !acc.schema.same_fields(&table.schema) {
                return Err(LoadError::InvalidSchema(
                    "cannot concatenate tables with different fields".to_string(),
                ));
            }
            acc.num_rows += table.num_rows;
            for (dst, src) in acc.columns.iter_mut().zip(table.columns) {
                dst.values.extend(src.values);
            }
        }
        Ok(acc)
    }
}

// =============================================================================
// TESTS
// =============================================================================
