//! Record codec
//!
//! Fixed-schema binary encoding of a row. Values are written back to back in
//! column order, with no tags and no length header for the row itself.
//!
//! ## Row Format
//! ```text
//! ┌────────────────────┬──────────┬──────────┬─────┬──────────┐
//! │ Null bitmap (0/1/4)│ Column 0 │ Column 1 │ ... │ Column N │
//! └────────────────────┴──────────┴──────────┴─────┴──────────┘
//!
//! int    : i32 big-endian (4)
//! long   : i64 big-endian (8)
//! double : f64 big-endian (8)
//! byte   : u8 (1)
//! text   : u16 big-endian length + UTF-8 bytes
//! null   : nothing (bit set in the bitmap)
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{LedgerError, Result};

use super::{Column, ColumnType, Value};

/// Highest column count a narrow (1 byte) bitmap can describe
pub const NARROW_BITMAP_MAX_COLUMNS: usize = 8;

/// Highest column count accepted by the wide (4 byte) bitmap.
// TODO: the 32-bit bitmap has room for 32 columns; confirm the intended
// ceiling with the format owners before raising this from 8.
pub const WIDE_BITMAP_MAX_COLUMNS: usize = 8;

/// Null bitmap variant preceding each row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullBitmap {
    /// No bitmap; every column must hold a value
    Absent,
    /// One byte, bit i set when column i is null
    Narrow,
    /// Four bytes, bit i set when column i is null
    Wide,
}

impl NullBitmap {
    fn max_columns(&self) -> Option<usize> {
        match self {
            NullBitmap::Absent => None,
            NullBitmap::Narrow => Some(NARROW_BITMAP_MAX_COLUMNS),
            NullBitmap::Wide => Some(WIDE_BITMAP_MAX_COLUMNS),
        }
    }
}

/// Column list and bitmap variant of one logical table
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub table: &'static str,
    pub columns: &'static [Column],
    pub bitmap: NullBitmap,
}

impl Schema {
    pub const fn new(table: &'static str, columns: &'static [Column]) -> Self {
        Self {
            table,
            columns,
            bitmap: NullBitmap::Absent,
        }
    }

    pub const fn with_bitmap(mut self, bitmap: NullBitmap) -> Self {
        self.bitmap = bitmap;
        self
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check arity, bitmap capacity and every column constraint
    ///
    /// The error names the first offending column.
    pub fn validate(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(LedgerError::Serialization(format!(
                "{}: expected {} values, got {}",
                self.table,
                self.columns.len(),
                values.len()
            )));
        }

        if let Some(max) = self.bitmap.max_columns() {
            if self.columns.len() > max {
                return Err(LedgerError::Serialization(format!(
                    "{}: {} columns exceed the {:?} bitmap limit of {}",
                    self.table,
                    self.columns.len(),
                    self.bitmap,
                    max
                )));
            }
        }

        for (column, value) in self.columns.iter().zip(values) {
            column.validate(value)?;
            if value.is_null() && self.bitmap == NullBitmap::Absent {
                return Err(LedgerError::invalid_value(
                    column.name,
                    "null requires a schema with a null bitmap",
                ));
            }
        }

        Ok(())
    }

    /// Validate and encode one row
    ///
    /// Every value is checked before anything is written, so a failed call
    /// leaves `out` untouched.
    pub fn encode(&self, values: &[Value], out: &mut BytesMut) -> Result<()> {
        self.validate(values)?;

        let null_mask = values
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_null())
            .fold(0u32, |mask, (i, _)| mask | (1 << i));

        match self.bitmap {
            NullBitmap::Absent => {}
            NullBitmap::Narrow => out.put_u8(null_mask as u8),
            NullBitmap::Wide => out.put_u32(null_mask),
        }

        for value in values {
            write_value(value, out);
        }

        Ok(())
    }

    /// Decode one row, reading exactly this schema's column count
    pub fn decode(&self, buf: &mut impl Buf) -> Result<Vec<Value>> {
        let null_mask = match self.bitmap {
            NullBitmap::Absent => 0,
            NullBitmap::Narrow => {
                ensure_remaining(buf.remaining(), 1, self.table, "null bitmap")?;
                buf.get_u8() as u32
            }
            NullBitmap::Wide => {
                ensure_remaining(buf.remaining(), 4, self.table, "null bitmap")?;
                buf.get_u32()
            }
        };

        let mut values = Vec::with_capacity(self.columns.len());
        for (i, column) in self.columns.iter().enumerate() {
            let is_null = i < 32 && null_mask & (1 << i) != 0;
            let value = if is_null {
                Value::Null
            } else {
                self.read_value(column, buf)?
            };

            column.validate(&value).map_err(|e| {
                LedgerError::corrupted(format!("{}: stored row failed validation: {}", self.table, e))
            })?;
            values.push(value);
        }

        Ok(values)
    }

    fn read_value(&self, column: &Column, buf: &mut impl Buf) -> Result<Value> {
        let value = match column.column_type {
            ColumnType::Int => {
                ensure_remaining(buf.remaining(), 4, self.table, column.name)?;
                Value::Int(buf.get_i32())
            }
            ColumnType::Long => {
                ensure_remaining(buf.remaining(), 8, self.table, column.name)?;
                Value::Long(buf.get_i64())
            }
            ColumnType::Double => {
                ensure_remaining(buf.remaining(), 8, self.table, column.name)?;
                Value::Double(buf.get_f64())
            }
            ColumnType::Byte => {
                ensure_remaining(buf.remaining(), 1, self.table, column.name)?;
                Value::Byte(buf.get_u8())
            }
            ColumnType::Text => {
                ensure_remaining(buf.remaining(), 2, self.table, column.name)?;
                let len = buf.get_u16() as usize;
                ensure_remaining(buf.remaining(), len, self.table, column.name)?;
                let bytes = buf.copy_to_bytes(len);
                let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    LedgerError::Serialization(format!(
                        "{}: column '{}' is not UTF-8: {}",
                        self.table, column.name, e
                    ))
                })?;
                Value::Text(text)
            }
        };
        Ok(value)
    }
}

fn write_value(value: &Value, out: &mut BytesMut) {
    match value {
        Value::Null => {}
        Value::Int(v) => out.put_i32(*v),
        Value::Long(v) => out.put_i64(*v),
        Value::Double(v) => out.put_f64(*v),
        Value::Byte(v) => out.put_u8(*v),
        Value::Text(s) => {
            // Length already bounded by Column::validate
            out.put_u16(s.len() as u16);
            out.put_slice(s.as_bytes());
        }
    }
}

fn ensure_remaining(remaining: usize, needed: usize, table: &str, field: &str) -> Result<()> {
    if remaining < needed {
        return Err(LedgerError::Serialization(format!(
            "{}: truncated record at '{}': need {} bytes, have {}",
            table,
            field,
            needed,
            remaining
        )));
    }
    Ok(())
}
