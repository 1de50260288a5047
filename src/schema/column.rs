//! Column descriptors
//!
//! A column has a name, an ordinal position, a primitive type and a set of
//! constraints. Every value written for a column must satisfy them.

use crate::error::{LedgerError, Result};

use super::Value;

/// Longest string a text column can hold (u16 length prefix)
pub const MAX_TEXT_LEN: usize = u16::MAX as usize;

/// Primitive column types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Long,
    Double,
    Text,
    Byte,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Long => "long",
            ColumnType::Double => "double",
            ColumnType::Text => "text",
            ColumnType::Byte => "byte",
        }
    }

    /// Check whether a non-null value has this type
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ColumnType::Int, Value::Int(_))
                | (ColumnType::Long, Value::Long(_))
                | (ColumnType::Double, Value::Double(_))
                | (ColumnType::Text, Value::Text(_))
                | (ColumnType::Byte, Value::Byte(_))
        )
    }
}

/// A named, ordinally positioned column with its constraints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub name: &'static str,
    pub position: usize,
    pub column_type: ColumnType,
    pub not_null: bool,
    pub non_negative: bool,
    /// Number of valid variants for enum-backed byte columns
    pub enum_range: Option<u8>,
}

impl Column {
    pub const fn new(name: &'static str, position: usize, column_type: ColumnType) -> Self {
        Self {
            name,
            position,
            column_type,
            not_null: false,
            non_negative: false,
            enum_range: None,
        }
    }

    pub const fn int(name: &'static str, position: usize) -> Self {
        Self::new(name, position, ColumnType::Int)
    }

    pub const fn long(name: &'static str, position: usize) -> Self {
        Self::new(name, position, ColumnType::Long)
    }

    pub const fn double(name: &'static str, position: usize) -> Self {
        Self::new(name, position, ColumnType::Double)
    }

    pub const fn text(name: &'static str, position: usize) -> Self {
        Self::new(name, position, ColumnType::Text)
    }

    pub const fn byte(name: &'static str, position: usize) -> Self {
        Self::new(name, position, ColumnType::Byte)
    }

    pub const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub const fn non_negative(mut self) -> Self {
        self.non_negative = true;
        self
    }

    /// Restrict a byte column to `0..variants`
    pub const fn enum_range(mut self, variants: u8) -> Self {
        self.enum_range = Some(variants);
        self
    }

    /// Validate a value against this column's type and constraints
    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if self.not_null {
                return Err(self.invalid("must not be null"));
            }
            return Ok(());
        }

        if !self.column_type.accepts(value) {
            return Err(self.invalid(format!(
                "expected {}, got {}",
                self.column_type.name(),
                value.type_name()
            )));
        }

        match value {
            Value::Int(v) if self.non_negative && *v < 0 => {
                Err(self.invalid(format!("{} is negative", v)))
            }
            Value::Long(v) if self.non_negative && *v < 0 => {
                Err(self.invalid(format!("{} is negative", v)))
            }
            Value::Double(v) if self.non_negative && !(*v >= 0.0) => {
                Err(self.invalid(format!("{} is negative or NaN", v)))
            }
            Value::Byte(v) => match self.enum_range {
                Some(range) if *v >= range => Err(self.invalid(format!(
                    "{} outside enum range 0..{}",
                    v, range
                ))),
                _ => Ok(()),
            },
            Value::Text(s) if s.len() > MAX_TEXT_LEN => Err(self.invalid(format!(
                "text of {} bytes exceeds {}",
                s.len(),
                MAX_TEXT_LEN
            ))),
            _ => Ok(()),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> LedgerError {
        LedgerError::invalid_value(self.name, reason)
    }
}
