//! # Constant Pool
//!
//! Parsed constant pool of one class file. Every textual or numeric literal
//! referenced elsewhere in the class is resolved through here, with the
//! index range and entry kind checked on each lookup.

use super::bytes::{ByteReader, decode_modified_utf8};
use crate::primitives::{
    CONSTANT_CLASS, CONSTANT_DOUBLE, CONSTANT_DYNAMIC, CONSTANT_FIELDREF, CONSTANT_FLOAT,
    CONSTANT_INTEGER, CONSTANT_INTERFACE_METHODREF, CONSTANT_INVOKE_DYNAMIC, CONSTANT_LONG,
    CONSTANT_METHOD_HANDLE, CONSTANT_METHOD_TYPE, CONSTANT_METHODREF, CONSTANT_MODULE,
    CONSTANT_NAME_AND_TYPE, CONSTANT_PACKAGE, CONSTANT_STRING, CONSTANT_UTF8,
};
use crate::{DigestError, TypeName};

/// One constant pool slot.
///
/// Only the kinds annotations can reference keep their payload; the rest
/// are parsed for length and left as placeholders.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Constant {
    /// Slot 0 and the slot after every `Long`/`Double`.
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    Other,
}

impl Constant {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Unusable => "unusable slot",
            Self::Utf8(_) => "Utf8",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Long(_) => "Long",
            Self::Double(_) => "Double",
            Self::Class { .. } => "Class",
            Self::Other => "non-literal constant",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Parse `constant_pool_count - 1` entries from the cursor.
    pub(crate) fn parse(reader: &mut ByteReader<'_>) -> Result<Self, DigestError> {
        let count = reader.u16()? as usize;
        if count == 0 {
            return Err(DigestError::malformed(
                reader.offset(),
                "constant pool count must be at least 1",
            ));
        }

        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let at = reader.offset();
            let tag = reader.u8()?;
            let constant = match tag {
                CONSTANT_UTF8 => {
                    let len = reader.u16()? as usize;
                    let data_offset = reader.offset();
                    let raw = reader.take(len)?;
                    Constant::Utf8(decode_modified_utf8(raw, data_offset)?)
                }
                CONSTANT_INTEGER => Constant::Integer(reader.u32()? as i32),
                CONSTANT_FLOAT => Constant::Float(f32::from_bits(reader.u32()?)),
                CONSTANT_LONG => Constant::Long(reader.u64()? as i64),
                CONSTANT_DOUBLE => Constant::Double(f64::from_bits(reader.u64()?)),
                CONSTANT_CLASS => Constant::Class {
                    name_index: reader.u16()?,
                },
                CONSTANT_STRING | CONSTANT_METHOD_TYPE | CONSTANT_MODULE | CONSTANT_PACKAGE => {
                    reader.take(2)?;
                    Constant::Other
                }
                CONSTANT_METHOD_HANDLE => {
                    reader.take(3)?;
                    Constant::Other
                }
                CONSTANT_FIELDREF
                | CONSTANT_METHODREF
                | CONSTANT_INTERFACE_METHODREF
                | CONSTANT_NAME_AND_TYPE
                | CONSTANT_DYNAMIC
                | CONSTANT_INVOKE_DYNAMIC => {
                    reader.take(4)?;
                    Constant::Other
                }
                other => {
                    return Err(DigestError::malformed(
                        at,
                        format!("unknown constant pool tag {other}"),
                    ));
                }
            };

            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            entries.push(constant);
            if wide {
                if entries.len() >= count {
                    return Err(DigestError::malformed(
                        at,
                        "8-byte constant occupies the last pool slot",
                    ));
                }
                entries.push(Constant::Unusable);
            }
        }

        Ok(Self { entries })
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, index: u16, offset: usize) -> Result<&Constant, DigestError> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(DigestError::malformed(
                offset,
                format!(
                    "constant pool index {} out of range (pool size {})",
                    index,
                    self.entries.len()
                ),
            )),
            Some(constant) => Ok(constant),
        }
    }

    fn wrong_kind(index: u16, expected: &str, found: &Constant, offset: usize) -> DigestError {
        DigestError::malformed(
            offset,
            format!(
                "constant pool index {} is {}, expected {}",
                index,
                found.kind_name(),
                expected
            ),
        )
    }

    pub(crate) fn utf8(&self, index: u16, offset: usize) -> Result<&str, DigestError> {
        match self.entry(index, offset)? {
            Constant::Utf8(s) => Ok(s),
            other => Err(Self::wrong_kind(index, "Utf8", other, offset)),
        }
    }

    pub(crate) fn integer(&self, index: u16, offset: usize) -> Result<i32, DigestError> {
        match self.entry(index, offset)? {
            Constant::Integer(v) => Ok(*v),
            other => Err(Self::wrong_kind(index, "Integer", other, offset)),
        }
    }

    pub(crate) fn float(&self, index: u16, offset: usize) -> Result<f32, DigestError> {
        match self.entry(index, offset)? {
            Constant::Float(v) => Ok(*v),
            other => Err(Self::wrong_kind(index, "Float", other, offset)),
        }
    }

    pub(crate) fn long(&self, index: u16, offset: usize) -> Result<i64, DigestError> {
        match self.entry(index, offset)? {
            Constant::Long(v) => Ok(*v),
            other => Err(Self::wrong_kind(index, "Long", other, offset)),
        }
    }

    pub(crate) fn double(&self, index: u16, offset: usize) -> Result<f64, DigestError> {
        match self.entry(index, offset)? {
            Constant::Double(v) => Ok(*v),
            other => Err(Self::wrong_kind(index, "Double", other, offset)),
        }
    }

    /// Resolve a `CONSTANT_Class` entry to its type name.
    pub(crate) fn class_name(&self, index: u16, offset: usize) -> Result<TypeName, DigestError> {
        match self.entry(index, offset)? {
            Constant::Class { name_index } => Ok(TypeName::new(self.utf8(*name_index, offset)?)),
            other => Err(Self::wrong_kind(index, "Class", other, offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_bytes(count: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = count.to_be_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn long_takes_two_slots() {
        // #1 Long 7, #2 unusable, #3 Utf8 "x"
        let mut body = vec![CONSTANT_LONG];
        body.extend_from_slice(&7u64.to_be_bytes());
        body.extend_from_slice(&[CONSTANT_UTF8, 0, 1, b'x']);
        let bytes = pool_bytes(4, &body);

        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).expect("parse");
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.long(1, 0).expect("long"), 7);
        assert!(pool.utf8(2, 0).is_err());
        assert_eq!(pool.utf8(3, 0).expect("utf8"), "x");
    }

    #[test]
    fn out_of_range_index_is_malformed() {
        let bytes = pool_bytes(2, &[CONSTANT_UTF8, 0, 1, b'x']);
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).expect("parse");
        assert!(matches!(
            pool.utf8(9, 42),
            Err(DigestError::MalformedMetadata { offset: 42, .. })
        ));
        assert!(pool.utf8(0, 0).is_err());
    }

    #[test]
    fn wrong_kind_is_malformed() {
        let bytes = pool_bytes(2, &[CONSTANT_INTEGER, 0, 0, 0, 5]);
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).expect("parse");
        assert_eq!(pool.integer(1, 0).expect("int"), 5);
        assert!(pool.utf8(1, 0).is_err());
    }

    #[test]
    fn unknown_tag_rejected() {
        let bytes = pool_bytes(2, &[2, 0, 0]);
        assert!(ConstantPool::parse(&mut ByteReader::new(&bytes)).is_err());
    }

    #[test]
    fn truncated_pool_rejected() {
        let bytes = pool_bytes(3, &[CONSTANT_UTF8, 0, 1, b'x']);
        assert!(ConstantPool::parse(&mut ByteReader::new(&bytes)).is_err());
    }
}
