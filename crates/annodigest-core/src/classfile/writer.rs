//! # Class File Writer
//!
//! Builds well-formed class files carrying annotation data. The output has
//! no bytecode; it holds exactly what the reader consumes (hierarchy,
//! member descriptors, annotation attributes and `AnnotationDefault`).
//!
//! Used to produce fixtures for synthetic hierarchies and by the CLI.

use super::bytes::encode_modified_utf8;
use crate::primitives::{
    ACC_PUBLIC, ATTR_ANNOTATION_DEFAULT, ATTR_INVISIBLE_ANNOTATIONS, ATTR_VISIBLE_ANNOTATIONS,
    CLASS_MAGIC, CONSTANT_CLASS, CONSTANT_DOUBLE, CONSTANT_FLOAT, CONSTANT_INTEGER, CONSTANT_LONG,
    CONSTANT_UTF8, DEFAULT_MAJOR_VERSION, OBJECT_TYPE,
};
use crate::{Annotation, DigestError, Retention, TypeName, Value};
use std::collections::BTreeMap;

// =============================================================================
// CONSTANT POOL BUILDER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(String),
}

/// Deduplicating constant pool.
#[derive(Debug, Default)]
struct PoolBuilder {
    bytes: Vec<u8>,
    index: BTreeMap<PoolKey, u16>,
    /// Number of slots used, including slot 0.
    slots: u32,
}

impl PoolBuilder {
    fn new() -> Self {
        Self {
            slots: 1,
            ..Self::default()
        }
    }

    fn intern(&mut self, key: PoolKey) -> Result<u16, DigestError> {
        if let Some(&index) = self.index.get(&key) {
            return Ok(index);
        }
        // The name entry goes in before the Class entry that points at it.
        let class_name_index = match &key {
            PoolKey::Class(name) => Some(self.utf8(name)?),
            _ => None,
        };

        let width = match key {
            PoolKey::Long(_) | PoolKey::Double(_) => 2,
            _ => 1,
        };
        if self.slots + width > u32::from(u16::MAX) {
            return Err(DigestError::SerializationError(
                "constant pool exceeds 65535 entries".to_string(),
            ));
        }
        let index = self.slots as u16;

        match &key {
            PoolKey::Utf8(s) => {
                let encoded = encode_modified_utf8(s);
                let len = u16::try_from(encoded.len()).map_err(|_| {
                    DigestError::SerializationError("string constant longer than 65535 bytes".into())
                })?;
                self.bytes.push(CONSTANT_UTF8);
                self.bytes.extend_from_slice(&len.to_be_bytes());
                self.bytes.extend_from_slice(&encoded);
            }
            PoolKey::Integer(v) => {
                self.bytes.push(CONSTANT_INTEGER);
                self.bytes.extend_from_slice(&v.to_be_bytes());
            }
            PoolKey::Float(bits) => {
                self.bytes.push(CONSTANT_FLOAT);
                self.bytes.extend_from_slice(&bits.to_be_bytes());
            }
            PoolKey::Long(v) => {
                self.bytes.push(CONSTANT_LONG);
                self.bytes.extend_from_slice(&v.to_be_bytes());
            }
            PoolKey::Double(bits) => {
                self.bytes.push(CONSTANT_DOUBLE);
                self.bytes.extend_from_slice(&bits.to_be_bytes());
            }
            PoolKey::Class(_) => {
                let name_index = class_name_index.unwrap_or_default();
                self.bytes.push(CONSTANT_CLASS);
                self.bytes.extend_from_slice(&name_index.to_be_bytes());
            }
        }

        self.slots += width;
        self.index.insert(key, index);
        Ok(index)
    }

    fn utf8(&mut self, s: &str) -> Result<u16, DigestError> {
        self.intern(PoolKey::Utf8(s.to_string()))
    }

    fn class(&mut self, name: &TypeName) -> Result<u16, DigestError> {
        self.intern(PoolKey::Class(name.as_str().to_string()))
    }
}

// =============================================================================
// MEMBER DEFINITION
// =============================================================================

/// A field or method to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDef {
    name: String,
    descriptor: String,
    access_flags: u16,
    annotations: Vec<(Retention, Annotation)>,
    default_value: Option<Value>,
}

impl MemberDef {
    /// A public member with the given name and descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            access_flags: ACC_PUBLIC,
            annotations: Vec::new(),
            default_value: None,
        }
    }

    /// Replace the access flags.
    #[must_use]
    pub fn access(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    #[must_use]
    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push((Retention::Visible, annotation));
        self
    }

    #[must_use]
    pub fn invisible_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push((Retention::Invisible, annotation));
        self
    }

    /// Emit an `AnnotationDefault` attribute.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

// =============================================================================
// CLASS WRITER
// =============================================================================

/// Builder for a class file.
///
/// Defaults: public, superclass `java/lang/Object`, major version 52.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassWriter {
    name: TypeName,
    access_flags: u16,
    major_version: u16,
    super_class: Option<TypeName>,
    interfaces: Vec<TypeName>,
    fields: Vec<MemberDef>,
    methods: Vec<MemberDef>,
    annotations: Vec<(Retention, Annotation)>,
    raw_attributes: Vec<(String, Vec<u8>)>,
}

impl ClassWriter {
    #[must_use]
    pub fn new(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            access_flags: ACC_PUBLIC,
            major_version: DEFAULT_MAJOR_VERSION,
            super_class: Some(TypeName::new(OBJECT_TYPE)),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            raw_attributes: Vec::new(),
        }
    }

    /// Replace the class access flags.
    #[must_use]
    pub fn access(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    #[must_use]
    pub fn major_version(mut self, version: u16) -> Self {
        self.major_version = version;
        self
    }

    #[must_use]
    pub fn super_class(mut self, name: impl Into<TypeName>) -> Self {
        self.super_class = Some(name.into());
        self
    }

    /// Emit no superclass, as `java/lang/Object` itself does.
    #[must_use]
    pub fn no_super_class(mut self) -> Self {
        self.super_class = None;
        self
    }

    #[must_use]
    pub fn interface(mut self, name: impl Into<TypeName>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    #[must_use]
    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push((Retention::Visible, annotation));
        self
    }

    #[must_use]
    pub fn invisible_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push((Retention::Invisible, annotation));
        self
    }

    #[must_use]
    pub fn field(mut self, field: MemberDef) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn method(mut self, method: MemberDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Append an arbitrary class attribute with a verbatim body.
    #[must_use]
    pub fn raw_attribute(mut self, name: impl Into<String>, body: Vec<u8>) -> Self {
        self.raw_attributes.push((name.into(), body));
        self
    }

    /// Serialize to class file bytes.
    ///
    /// `Value::Absent` attributes have no class file encoding and are omitted.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DigestError> {
        let mut pool = PoolBuilder::new();
        let mut body = Vec::new();

        body.extend_from_slice(&self.access_flags.to_be_bytes());
        body.extend_from_slice(&pool.class(&self.name)?.to_be_bytes());
        let super_index = match &self.super_class {
            Some(name) => pool.class(name)?,
            None => 0,
        };
        body.extend_from_slice(&super_index.to_be_bytes());

        put_count(&mut body, self.interfaces.len())?;
        for interface in &self.interfaces {
            body.extend_from_slice(&pool.class(interface)?.to_be_bytes());
        }

        for members in [&self.fields, &self.methods] {
            put_count(&mut body, members.len())?;
            for member in members {
                write_member(&mut pool, &mut body, member)?;
            }
        }

        let mut attributes = annotation_attributes(&mut pool, &self.annotations)?;
        for (name, raw) in &self.raw_attributes {
            attributes.push((pool.utf8(name)?, raw.clone()));
        }
        write_attributes(&mut body, &attributes)?;

        let mut out = Vec::with_capacity(10 + pool.bytes.len() + body.len());
        out.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&self.major_version.to_be_bytes());
        out.extend_from_slice(&(pool.slots as u16).to_be_bytes());
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

// =============================================================================
// ENCODING HELPERS
// =============================================================================

fn put_count(out: &mut Vec<u8>, count: usize) -> Result<(), DigestError> {
    let count = u16::try_from(count)
        .map_err(|_| DigestError::SerializationError(format!("count {count} exceeds 65535")))?;
    out.extend_from_slice(&count.to_be_bytes());
    Ok(())
}

fn write_member(
    pool: &mut PoolBuilder,
    out: &mut Vec<u8>,
    member: &MemberDef,
) -> Result<(), DigestError> {
    out.extend_from_slice(&member.access_flags.to_be_bytes());
    out.extend_from_slice(&pool.utf8(&member.name)?.to_be_bytes());
    out.extend_from_slice(&pool.utf8(&member.descriptor)?.to_be_bytes());

    let mut attributes = annotation_attributes(pool, &member.annotations)?;
    if let Some(default) = &member.default_value {
        let mut raw = Vec::new();
        write_element_value(pool, &mut raw, default)?;
        attributes.push((pool.utf8(ATTR_ANNOTATION_DEFAULT)?, raw));
    }
    write_attributes(out, &attributes)
}

/// Encode annotations into one attribute per retention, visible first.
fn annotation_attributes(
    pool: &mut PoolBuilder,
    annotations: &[(Retention, Annotation)],
) -> Result<Vec<(u16, Vec<u8>)>, DigestError> {
    let mut attributes = Vec::new();
    for (retention, attr_name) in [
        (Retention::Visible, ATTR_VISIBLE_ANNOTATIONS),
        (Retention::Invisible, ATTR_INVISIBLE_ANNOTATIONS),
    ] {
        let selected: Vec<&Annotation> = annotations
            .iter()
            .filter(|(r, _)| *r == retention)
            .map(|(_, a)| a)
            .collect();
        if selected.is_empty() {
            continue;
        }
        let mut raw = Vec::new();
        put_count(&mut raw, selected.len())?;
        for annotation in selected {
            write_annotation(pool, &mut raw, annotation)?;
        }
        attributes.push((pool.utf8(attr_name)?, raw));
    }
    Ok(attributes)
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[(u16, Vec<u8>)]) -> Result<(), DigestError> {
    put_count(out, attributes.len())?;
    for (name_index, raw) in attributes {
        let len = u32::try_from(raw.len())
            .map_err(|_| DigestError::SerializationError("attribute too large".to_string()))?;
        out.extend_from_slice(&name_index.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(raw);
    }
    Ok(())
}

fn write_annotation(
    pool: &mut PoolBuilder,
    out: &mut Vec<u8>,
    annotation: &Annotation,
) -> Result<(), DigestError> {
    out.extend_from_slice(&pool.utf8(&annotation.type_name.to_descriptor())?.to_be_bytes());
    let present: Vec<&(String, Value)> = annotation
        .attributes
        .iter()
        .filter(|(_, value)| !matches!(value, Value::Absent))
        .collect();
    put_count(out, present.len())?;
    for (name, value) in present {
        out.extend_from_slice(&pool.utf8(name)?.to_be_bytes());
        write_element_value(pool, out, value)?;
    }
    Ok(())
}

fn write_element_value(
    pool: &mut PoolBuilder,
    out: &mut Vec<u8>,
    value: &Value,
) -> Result<(), DigestError> {
    let index = match value {
        Value::Absent => {
            return Err(DigestError::SerializationError(
                "absent values cannot be encoded".to_string(),
            ));
        }
        Value::Byte(v) => pool.intern(PoolKey::Integer(i32::from(*v)))?,
        Value::Char(v) => pool.intern(PoolKey::Integer(i32::from(*v)))?,
        Value::Short(v) => pool.intern(PoolKey::Integer(i32::from(*v)))?,
        Value::Int(v) => pool.intern(PoolKey::Integer(*v))?,
        Value::Boolean(v) => pool.intern(PoolKey::Integer(i32::from(*v)))?,
        Value::Long(v) => pool.intern(PoolKey::Long(*v))?,
        Value::Float(v) => pool.intern(PoolKey::Float(v.to_bits()))?,
        Value::Double(v) => pool.intern(PoolKey::Double(v.to_bits()))?,
        Value::String(s) | Value::Class(s) => pool.utf8(s)?,
        Value::Enum {
            type_name,
            constant,
        } => {
            let type_index = pool.utf8(&type_name.to_descriptor())?;
            let const_index = pool.utf8(constant)?;
            out.push(b'e');
            out.extend_from_slice(&type_index.to_be_bytes());
            out.extend_from_slice(&const_index.to_be_bytes());
            return Ok(());
        }
        Value::Annotation(nested) => {
            out.push(b'@');
            return write_annotation(pool, out, nested);
        }
        Value::Array(items) => {
            out.push(b'[');
            put_count(out, items.len())?;
            for item in items {
                write_element_value(pool, out, item)?;
            }
            return Ok(());
        }
    };

    out.push(value.tag() as u8);
    out.extend_from_slice(&index.to_be_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::read_class;

    #[test]
    fn pool_deduplicates_entries() {
        let mut pool = PoolBuilder::new();
        let a = pool.utf8("x").expect("utf8");
        let b = pool.utf8("x").expect("utf8");
        assert_eq!(a, b);
        assert_eq!(pool.slots, 2);
    }

    #[test]
    fn class_entry_follows_its_name() {
        let mut pool = PoolBuilder::new();
        let class = pool.class(&TypeName::new("a/B")).expect("class");
        assert_eq!(class, 2);
        assert_eq!(pool.utf8("a/B").expect("utf8"), 1);
        assert_eq!(pool.class(&TypeName::new("a/B")).expect("class"), 2);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = PoolBuilder::new();
        assert_eq!(pool.intern(PoolKey::Long(1)).expect("long"), 1);
        assert_eq!(pool.utf8("after").expect("utf8"), 3);
    }

    #[test]
    fn absent_attributes_are_omitted() {
        let bytes = ClassWriter::new("a/Gap")
            .annotation(
                Annotation::new("a/Ann")
                    .with("kept", Value::Int(1))
                    .with("gone", Value::Absent),
            )
            .to_bytes()
            .expect("write");
        let info = read_class(&bytes).expect("read");
        let (_, ann) = &info.annotations[0];
        assert_eq!(ann.attributes, vec![("kept".to_string(), Value::Int(1))]);
    }

    #[test]
    fn root_class_without_super() {
        let bytes = ClassWriter::new(OBJECT_TYPE)
            .no_super_class()
            .to_bytes()
            .expect("write");
        let info = read_class(&bytes).expect("read");
        assert!(info.super_class.is_none());
    }
}
