//! Declarative binary structure decoding.
//!
//! A `Schema` is an ordered list of named fields. Decoding walks the fields
//! over a `ByteCursor` and produces a `Record` with the same shape. Array
//! lengths can be literal or computed from the part of the record decoded
//! so far, which replaces name lookups into a global table with an explicit
//! closure over the parent record.
//!
//! The stream attribute bitfields and the PGC command table are decoded
//! through here; the other IFO tables are read field by field from a cursor.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::bits::{BitReader, ByteCursor, CursorError};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error("field `{field}` in `{schema}` starts mid-byte after a bit run")]
    Misaligned { schema: &'static str, field: &'static str },
    #[error("bit run in `{schema}` does not end on a byte boundary")]
    UnterminatedBits { schema: &'static str },
}

/// Length of an array field.
#[derive(Clone)]
pub enum Count {
    Fixed(usize),
    /// Computed from the siblings decoded before the array.
    Computed(Arc<dyn Fn(&Record) -> usize + Send + Sync>),
}

impl Count {
    pub fn computed(f: impl Fn(&Record) -> usize + Send + Sync + 'static) -> Self {
        Count::Computed(Arc::new(f))
    }

    fn resolve(&self, parent: &Record) -> usize {
        match self {
            Count::Fixed(n) => *n,
            Count::Computed(f) => f(parent),
        }
    }
}

impl fmt::Debug for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Count::Fixed(n) => write!(f, "Fixed({n})"),
            Count::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Type descriptor of one field.
#[derive(Debug, Clone)]
pub enum Field {
    U8,
    U16,
    U32,
    U64,
    /// `n` bits, MSB first, sharing the bit lookahead with neighbouring runs.
    Bits(u8),
    /// Fixed-length string.
    Str(usize),
    /// Opaque bytes.
    Raw(usize),
    /// Bytes consumed but not recorded.
    Skip(usize),
    Array(Box<Field>, Count),
    Nested(Arc<Schema>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Uint(u64),
    Str(String),
    Raw(Vec<u8>),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}

/// Decoded record, fields in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Scalar field, 0 when absent.
    pub fn uint(&self, name: &str) -> u64 {
        self.get(name).and_then(Value::as_uint).unwrap_or(0)
    }

    pub fn str(&self, name: &str) -> &str {
        match self.get(name) {
            Some(Value::Str(s)) => s,
            _ => "",
        }
    }

    pub fn record(&self, name: &str) -> Option<&Record> {
        self.get(name).and_then(Value::as_record)
    }

    pub fn list(&self, name: &str) -> &[Value] {
        self.get(name).and_then(Value::as_list).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    name: &'static str,
    fields: Vec<(&'static str, Field)>,
}

impl Schema {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &'static str, field: Field) -> Self {
        self.fields.push((name, field));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Size in bytes when every field has a fixed size.
    pub fn fixed_size(&self) -> Option<usize> {
        fn size_bits(field: &Field) -> Option<usize> {
            Some(match field {
                Field::U8 => 8,
                Field::U16 => 16,
                Field::U32 => 32,
                Field::U64 => 64,
                Field::Bits(n) => *n as usize,
                Field::Str(n) | Field::Raw(n) | Field::Skip(n) => n * 8,
                Field::Array(inner, Count::Fixed(n)) => size_bits(inner)? * n,
                Field::Array(_, Count::Computed(_)) => return None,
                Field::Nested(schema) => schema.fixed_size()? * 8,
            })
        }
        let mut bits = 0;
        for (_, field) in &self.fields {
            bits += size_bits(field)?;
        }
        Some(bits / 8)
    }

    pub fn decode(&self, cursor: &mut ByteCursor) -> Result<Record, SchemaError> {
        let mut bits = BitReader::new();
        let mut record = Record::default();
        for (name, field) in &self.fields {
            let value = self.decode_field(name, field, cursor, &mut bits, &record)?;
            if let Some(value) = value {
                record.fields.push((name, value));
            }
        }
        if !bits.is_aligned() {
            return Err(SchemaError::UnterminatedBits { schema: self.name });
        }
        Ok(record)
    }

    fn decode_field(
        &self,
        name: &'static str,
        field: &Field,
        cursor: &mut ByteCursor,
        bits: &mut BitReader,
        parent: &Record,
    ) -> Result<Option<Value>, SchemaError> {
        if !matches!(field, Field::Bits(_)) && !bits.is_aligned() {
            return Err(SchemaError::Misaligned {
                schema: self.name,
                field: name,
            });
        }
        let value = match field {
            Field::U8 => Value::Uint(cursor.read_u8()? as u64),
            Field::U16 => Value::Uint(cursor.read_u16()? as u64),
            Field::U32 => Value::Uint(cursor.read_u32()? as u64),
            Field::U64 => Value::Uint(cursor.read_u64()?),
            Field::Bits(n) => Value::Uint(bits.read(cursor, *n)? as u64),
            Field::Str(n) => Value::Str(cursor.read_string(*n)?),
            Field::Raw(n) => Value::Raw(cursor.read_bytes(*n)?.to_vec()),
            Field::Skip(n) => {
                cursor.forward(*n)?;
                return Ok(None);
            }
            Field::Array(inner, count) => {
                let n = count.resolve(parent);
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    if let Some(v) = self.decode_field(name, inner, cursor, bits, parent)? {
                        items.push(v);
                    }
                }
                Value::List(items)
            }
            Field::Nested(schema) => Value::Record(schema.decode(cursor)?),
        };
        Ok(Some(value))
    }
}
