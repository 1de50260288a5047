//! Schema Module
//!
//! Typed column descriptors and the fixed binary record codec.
//!
//! ## Responsibilities
//! - Describe each table's columns and their constraints
//! - Validate every value before it is written
//! - Encode/decode rows in declared column order
//! - Map strongly-typed record structs onto ordinal value tuples
//!
//! A table is described by a struct implementing [`Record`]. The struct keeps
//! named fields while `to_values`/`from_values` preserve the ordinal layout
//! the codec writes.

mod codec;
mod column;
mod value;

use bytes::{Buf, BytesMut};

use crate::error::{LedgerError, Result};

pub use codec::{NullBitmap, Schema, NARROW_BITMAP_MAX_COLUMNS, WIDE_BITMAP_MAX_COLUMNS};
pub use column::{Column, ColumnType, MAX_TEXT_LEN};
pub use value::Value;

/// A strongly-typed row of one table
pub trait Record: Clone + std::fmt::Debug + Sized {
    /// Column list and bitmap variant of the table
    const SCHEMA: Schema;

    /// Values in column order
    fn to_values(&self) -> Vec<Value>;

    /// Build the record from values in column order
    fn from_values(values: Vec<Value>) -> Result<Self>;

    /// Check every column constraint without encoding
    fn validate(&self) -> Result<()> {
        Self::SCHEMA.validate(&self.to_values())
    }

    /// Validate and append this record's encoding to `out`
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        Self::SCHEMA.encode(&self.to_values(), out)
    }

    /// Decode one record from the front of `buf`
    fn decode(buf: &mut impl Buf) -> Result<Self> {
        Self::from_values(Self::SCHEMA.decode(buf)?)
    }
}

/// Reads typed values out of a decoded tuple, in column order
pub struct Fields {
    schema: Schema,
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Fields {
    pub fn new(schema: Schema, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.column_count() {
            return Err(LedgerError::Serialization(format!(
                "{}: expected {} values, got {}",
                schema.table,
                schema.column_count(),
                values.len()
            )));
        }
        Ok(Self {
            schema,
            values: values.into_iter(),
            position: 0,
        })
    }

    pub fn int(&mut self) -> Result<i32> {
        match self.next_value()? {
            Value::Int(v) => Ok(v),
            other => Err(self.mismatch("int", &other)),
        }
    }

    pub fn long(&mut self) -> Result<i64> {
        match self.next_value()? {
            Value::Long(v) => Ok(v),
            other => Err(self.mismatch("long", &other)),
        }
    }

    pub fn double(&mut self) -> Result<f64> {
        match self.next_value()? {
            Value::Double(v) => Ok(v),
            other => Err(self.mismatch("double", &other)),
        }
    }

    pub fn text(&mut self) -> Result<String> {
        match self.next_value()? {
            Value::Text(v) => Ok(v),
            other => Err(self.mismatch("text", &other)),
        }
    }

    pub fn byte(&mut self) -> Result<u8> {
        match self.next_value()? {
            Value::Byte(v) => Ok(v),
            other => Err(self.mismatch("byte", &other)),
        }
    }

    pub fn flag(&mut self) -> Result<bool> {
        Ok(self.byte()? != 0)
    }

    pub fn opt_int(&mut self) -> Result<Option<i32>> {
        match self.next_value()? {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(v)),
            other => Err(self.mismatch("int or null", &other)),
        }
    }

    pub fn opt_text(&mut self) -> Result<Option<String>> {
        match self.next_value()? {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v)),
            other => Err(self.mismatch("text or null", &other)),
        }
    }

    fn next_value(&mut self) -> Result<Value> {
        let value = self.values.next().ok_or_else(|| {
            LedgerError::Serialization(format!(
                "{}: ran out of values at position {}",
                self.schema.table, self.position
            ))
        })?;
        self.position += 1;
        Ok(value)
    }

    fn mismatch(&self, expected: &str, found: &Value) -> LedgerError {
        let column = self
            .schema
            .columns
            .get(self.position.saturating_sub(1))
            .map(|c| c.name)
            .unwrap_or("?");
        LedgerError::Serialization(format!(
            "{}: column '{}' expected {}, found {}",
            self.schema.table,
            column,
            expected,
            found.type_name()
        ))
    }
}
