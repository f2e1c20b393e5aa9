//! # Binary Metadata Reader
//!
//! Parses class file bytes directly (no running VM) into a [`ClassInfo`]
//! and from there into the flat list of [`RawRecord`]s declared on the class.
//!
//! Only the annotation attributes and `AnnotationDefault` are decoded; every
//! other attribute is skipped by its declared length. The reader keeps no
//! state between calls and is safe to call concurrently on distinct inputs.

use super::bytes::ByteReader;
use super::pool::ConstantPool;
use crate::primitives::{
    ACC_ABSTRACT, ACC_ANNOTATION, ACC_BRIDGE, ACC_ENUM, ACC_INTERFACE, ATTR_ANNOTATION_DEFAULT,
    ATTR_INVISIBLE_ANNOTATIONS, ATTR_VISIBLE_ANNOTATIONS, CLASS_MAGIC, MAX_CLASS_FILE_SIZE,
    MAX_ELEMENT_NESTING,
};
use crate::{Annotation, DigestError, ElementRef, RawRecord, Retention, TypeName, Value};

// =============================================================================
// PARSED CLASS
// =============================================================================

/// A field or method with its annotation data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    /// Annotations in attribute order (visible before invisible when both
    /// attributes appear in that order).
    pub annotations: Vec<(Retention, Annotation)>,
    /// `AnnotationDefault` of an annotation interface element.
    pub annotation_default: Option<Value>,
}

impl MemberInfo {
    #[must_use]
    pub fn is_bridge(&self) -> bool {
        self.access_flags & ACC_BRIDGE != 0
    }

    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }
}

/// The parts of a class file the digest engine needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: TypeName,
    pub access_flags: u16,
    pub minor_version: u16,
    pub major_version: u16,
    /// `None` for `java/lang/Object` and `module-info`.
    pub super_class: Option<TypeName>,
    pub interfaces: Vec<TypeName>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    /// Class-level annotations.
    pub annotations: Vec<(Retention, Annotation)>,
}

impl ClassInfo {
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    #[must_use]
    pub fn is_annotation(&self) -> bool {
        self.access_flags & ACC_ANNOTATION != 0
    }

    #[must_use]
    pub fn is_enum(&self) -> bool {
        self.access_flags & ACC_ENUM != 0
    }

    /// Direct ancestors: superclass first, then interfaces in declaration order.
    pub fn direct_ancestors(&self) -> impl Iterator<Item = &TypeName> {
        self.super_class.iter().chain(self.interfaces.iter())
    }

    /// Flatten the annotation data into records.
    ///
    /// Order: class annotations, then fields, then methods, each in
    /// declaration order. Bridge methods are skipped because the compiler
    /// copies the bridged method's annotations onto them.
    #[must_use]
    pub fn records(&self) -> Vec<RawRecord> {
        let mut records = Vec::new();

        for (retention, annotation) in &self.annotations {
            records.push(RawRecord::new(
                ElementRef::of_type(self.name.clone()),
                annotation.clone(),
                *retention,
            ));
        }

        for field in &self.fields {
            for (retention, annotation) in &field.annotations {
                records.push(RawRecord::new(
                    ElementRef::field(self.name.clone(), &field.name, &field.descriptor),
                    annotation.clone(),
                    *retention,
                ));
            }
        }

        for method in self.methods.iter().filter(|m| !m.is_bridge()) {
            for (retention, annotation) in &method.annotations {
                records.push(RawRecord::new(
                    ElementRef::method(self.name.clone(), &method.name, &method.descriptor),
                    annotation.clone(),
                    *retention,
                ));
            }
        }

        records
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Parse a complete class file.
///
/// # Errors
///
/// `DigestError::MalformedMetadata` if the bytes are truncated, reference an
/// invalid constant pool entry, carry inconsistent lengths or unknown
/// element-value tags, or have trailing data after the class body.
pub fn read_class(bytes: &[u8]) -> Result<ClassInfo, DigestError> {
    if bytes.len() > MAX_CLASS_FILE_SIZE {
        return Err(DigestError::malformed(
            0,
            format!(
                "class data size {} bytes exceeds maximum allowed {} bytes",
                bytes.len(),
                MAX_CLASS_FILE_SIZE
            ),
        ));
    }

    let mut reader = ByteReader::new(bytes);
    let magic = reader.u32()?;
    if magic != CLASS_MAGIC {
        return Err(DigestError::malformed(0, "missing 0xCAFEBABE magic"));
    }
    let minor_version = reader.u16()?;
    let major_version = reader.u16()?;

    let pool = ConstantPool::parse(&mut reader)?;
    let parser = ClassParser { pool: &pool };

    let access_flags = reader.u16()?;
    let at = reader.offset();
    let name = pool.class_name(reader.u16()?, at)?;

    let at = reader.offset();
    let super_index = reader.u16()?;
    let super_class = if super_index == 0 {
        None
    } else {
        Some(pool.class_name(super_index, at)?)
    };

    let interface_count = reader.u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let at = reader.offset();
        interfaces.push(pool.class_name(reader.u16()?, at)?);
    }

    let fields = parser.members(&mut reader)?;
    let methods = parser.members(&mut reader)?;
    let class_attributes = parser.attributes(&mut reader)?;

    if !reader.is_empty() {
        return Err(DigestError::malformed(
            reader.offset(),
            format!("{} trailing bytes after class body", reader.remaining()),
        ));
    }

    Ok(ClassInfo {
        name,
        access_flags,
        minor_version,
        major_version,
        super_class,
        interfaces,
        fields,
        methods,
        annotations: class_attributes.annotations,
    })
}

/// Parse a class file and return the annotation records declared directly on it.
///
/// Ancestors are not consulted; walking the hierarchy is the resolver's job.
pub fn read_records(bytes: &[u8]) -> Result<Vec<RawRecord>, DigestError> {
    Ok(read_class(bytes)?.records())
}

// =============================================================================
// PARSER
// =============================================================================

/// Annotation-related attributes found in one attribute table.
#[derive(Default)]
struct AttributeSet {
    annotations: Vec<(Retention, Annotation)>,
    annotation_default: Option<Value>,
}

struct ClassParser<'p> {
    pool: &'p ConstantPool,
}

impl ClassParser<'_> {
    fn members(&self, reader: &mut ByteReader<'_>) -> Result<Vec<MemberInfo>, DigestError> {
        let count = reader.u16()?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let access_flags = reader.u16()?;
            let at = reader.offset();
            let name = self.pool.utf8(reader.u16()?, at)?.to_string();
            let at = reader.offset();
            let descriptor = self.pool.utf8(reader.u16()?, at)?.to_string();
            let attributes = self.attributes(reader)?;
            members.push(MemberInfo {
                name,
                descriptor,
                access_flags,
                annotations: attributes.annotations,
                annotation_default: attributes.annotation_default,
            });
        }
        Ok(members)
    }

    fn attributes(&self, reader: &mut ByteReader<'_>) -> Result<AttributeSet, DigestError> {
        let count = reader.u16()?;
        let mut set = AttributeSet::default();

        for _ in 0..count {
            let at = reader.offset();
            let name = self.pool.utf8(reader.u16()?, at)?;
            let length = reader.u32()? as usize;
            let mut body = reader.sub_reader(length)?;

            match name {
                ATTR_VISIBLE_ANNOTATIONS => {
                    let annotations = self.annotation_table(&mut body)?;
                    set.annotations
                        .extend(annotations.into_iter().map(|a| (Retention::Visible, a)));
                }
                ATTR_INVISIBLE_ANNOTATIONS => {
                    let annotations = self.annotation_table(&mut body)?;
                    set.annotations
                        .extend(annotations.into_iter().map(|a| (Retention::Invisible, a)));
                }
                ATTR_ANNOTATION_DEFAULT => {
                    set.annotation_default = Some(self.element_value(&mut body, 0)?);
                }
                _ => continue,
            }

            if !body.is_empty() {
                return Err(DigestError::malformed(
                    body.offset(),
                    format!(
                        "attribute {} declares {} bytes but {} were left unread",
                        name,
                        length,
                        body.remaining()
                    ),
                ));
            }
        }

        Ok(set)
    }

    fn annotation_table(&self, body: &mut ByteReader<'_>) -> Result<Vec<Annotation>, DigestError> {
        let count = body.u16()?;
        let mut annotations = Vec::with_capacity(count as usize);
        for _ in 0..count {
            annotations.push(self.annotation(body, 0)?);
        }
        Ok(annotations)
    }

    fn annotation(&self, body: &mut ByteReader<'_>, depth: usize) -> Result<Annotation, DigestError> {
        let at = body.offset();
        let type_name = self.descriptor_type(body.u16()?, at)?;
        let pair_count = body.u16()?;
        let mut attributes = Vec::with_capacity(pair_count as usize);
        for _ in 0..pair_count {
            let at = body.offset();
            let name = self.pool.utf8(body.u16()?, at)?.to_string();
            let value = self.element_value(body, depth + 1)?;
            attributes.push((name, value));
        }
        Ok(Annotation {
            type_name,
            attributes,
        })
    }

    fn element_value(&self, body: &mut ByteReader<'_>, depth: usize) -> Result<Value, DigestError> {
        let at = body.offset();
        if depth > MAX_ELEMENT_NESTING {
            return Err(DigestError::malformed(
                at,
                format!("element values nested deeper than {MAX_ELEMENT_NESTING}"),
            ));
        }

        let tag = body.u8()?;
        let value = match tag {
            b'B' => Value::Byte(self.int_const(body)? as i8),
            b'C' => Value::Char(self.int_const(body)? as u16),
            b'S' => Value::Short(self.int_const(body)? as i16),
            b'I' => Value::Int(self.int_const(body)?),
            b'Z' => Value::Boolean(self.int_const(body)? != 0),
            b'J' => {
                let at = body.offset();
                Value::Long(self.pool.long(body.u16()?, at)?)
            }
            b'F' => {
                let at = body.offset();
                Value::Float(self.pool.float(body.u16()?, at)?)
            }
            b'D' => {
                let at = body.offset();
                Value::Double(self.pool.double(body.u16()?, at)?)
            }
            b's' => {
                let at = body.offset();
                Value::String(self.pool.utf8(body.u16()?, at)?.to_string())
            }
            b'c' => {
                let at = body.offset();
                Value::Class(self.pool.utf8(body.u16()?, at)?.to_string())
            }
            b'e' => {
                let at = body.offset();
                let type_name = self.descriptor_type(body.u16()?, at)?;
                let at = body.offset();
                let constant = self.pool.utf8(body.u16()?, at)?.to_string();
                Value::Enum {
                    type_name,
                    constant,
                }
            }
            b'@' => Value::Annotation(self.annotation(body, depth + 1)?),
            b'[' => {
                let count = body.u16()?;
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    items.push(self.element_value(body, depth + 1)?);
                }
                Value::Array(items)
            }
            other => {
                return Err(DigestError::malformed(
                    at,
                    format!("unknown element value tag 0x{other:02x}"),
                ));
            }
        };
        Ok(value)
    }

    fn int_const(&self, body: &mut ByteReader<'_>) -> Result<i32, DigestError> {
        let at = body.offset();
        self.pool.integer(body.u16()?, at)
    }

    /// Resolve a Utf8 entry holding an object descriptor (`Lfoo/Bar;`).
    fn descriptor_type(&self, index: u16, at: usize) -> Result<TypeName, DigestError> {
        let descriptor = self.pool.utf8(index, at)?;
        TypeName::from_descriptor(descriptor).ok_or_else(|| {
            DigestError::malformed(at, format!("'{descriptor}' is not an object type descriptor"))
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
