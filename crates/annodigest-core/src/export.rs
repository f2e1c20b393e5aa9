//! # Canonical Export Module
//!
//! Bit-exact serialization of a digest to a `postcard` stream.
//!
//! Two digests built from the same class bytes export to identical bytes,
//! which makes the export the reference for determinism checks and the
//! format for handing digests between processes.
//!
//! Format:
//! ```text
//! [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalDigest (postcard)]
//! ```

use crate::digest::{AnnotationDatum, AnnotationsDigest};
use crate::hierarchy::{TruncatedAncestor, WalkMode};
use crate::primitives::{MAX_ELEMENT_NESTING, MAX_EXPORT_SIZE};
use crate::{Annotation, DigestError, ElementRef, RawRecord, Retention, TypeName, Value};
use serde::{Deserialize, Serialize};

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"ADGX"; // Annotation DiGest eXport

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Number of class-level data.
    pub class_count: u64,

    /// Number of method-level data.
    pub method_count: u64,

    /// Number of field-level data.
    pub field_count: u64,

    /// Checksum of the data section.
    pub checksum: u64,
}

impl CanonicalHeader {
    #[must_use]
    pub fn new(canonical: &CanonicalDigest, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            class_count: canonical.class_data.len() as u64,
            method_count: group_len(&canonical.method_data),
            field_count: group_len(&canonical.field_data),
            checksum,
        }
    }

    /// Validate magic and version.
    ///
    /// Error messages stay generic and do not echo the offending bytes.
    pub fn validate(&self) -> Result<(), DigestError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(DigestError::SerializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != CANONICAL_VERSION {
            return Err(DigestError::SerializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

/// A digest in canonical form.
///
/// Member data are grouped by annotation type in sorted order; records
/// keep their walk order inside each group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalDigest {
    pub root: TypeName,
    pub mode: WalkMode,
    pub visited: Vec<TypeName>,
    pub truncated: Vec<TruncatedAncestor>,
    pub class_data: Vec<CanonicalRecord>,
    pub method_data: Vec<(TypeName, Vec<CanonicalRecord>)>,
    pub field_data: Vec<(TypeName, Vec<CanonicalRecord>)>,
}

impl CanonicalDigest {
    #[must_use]
    pub fn from_digest(digest: &AnnotationsDigest) -> Self {
        let records = |data: &[AnnotationDatum]| -> Vec<CanonicalRecord> {
            data.iter()
                .map(|d| CanonicalRecord::from_record(d.record()))
                .collect()
        };
        Self {
            root: digest.root().clone(),
            mode: digest.mode(),
            visited: digest.visited().to_vec(),
            truncated: digest.truncated().to_vec(),
            class_data: digest
                .class_iter()
                .map(|d| CanonicalRecord::from_record(d.record()))
                .collect(),
            method_data: digest
                .methods()
                .map(|(t, data)| (t.clone(), records(data)))
                .collect(),
            field_data: digest
                .fields()
                .map(|(t, data)| (t.clone(), records(data)))
                .collect(),
        }
    }

    /// Rebuild the digest. The result uses the identity mapper.
    ///
    /// # Errors
    ///
    /// Returns `DigestError::SerializationError` if any record's value
    /// table is malformed.
    pub fn to_digest(&self) -> Result<AnnotationsDigest, DigestError> {
        let class_data = self
            .class_data
            .iter()
            .map(|r| r.to_record().map(AnnotationDatum::new))
            .collect::<Result<Vec<_>, _>>()?;
        let mut digest = AnnotationsDigest::from_parts(
            self.root.clone(),
            self.mode,
            self.visited.clone(),
            self.truncated.clone(),
            class_data,
        );
        for (_, records) in self.method_data.iter().chain(self.field_data.iter()) {
            for record in records {
                digest.push(record.to_record()?);
            }
        }
        Ok(digest)
    }

    /// Serialize the data section.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DigestError> {
        postcard::to_allocvec(self)
            .map_err(|e| DigestError::SerializationError(format!("Data: {}", e)))
    }
}

// =============================================================================
// VALUE TABLES
// =============================================================================

/// One node of a record's value table.
///
/// Children are referenced by index and always precede their parent, so
/// nothing in the table is recursive and decoding never descends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CanonicalNode {
    Absent,
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    /// IEEE-754 bits.
    Float(u32),
    /// IEEE-754 bits.
    Double(u64),
    Boolean(bool),
    String(String),
    Class(String),
    Enum {
        type_name: TypeName,
        constant: String,
    },
    Annotation {
        type_name: TypeName,
        attributes: Vec<(String, u32)>,
    },
    Array(Vec<u32>),
}

/// A record whose annotation is stored as a post-order node table.
///
/// The last node is the record's annotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalRecord {
    pub element: ElementRef,
    pub retention: Retention,
    pub nodes: Vec<CanonicalNode>,
}

impl CanonicalRecord {
    #[must_use]
    pub fn from_record(record: &RawRecord) -> Self {
        let mut nodes = Vec::new();
        flatten_annotation(&record.annotation, &mut nodes);
        Self {
            element: record.element.clone(),
            retention: record.retention,
            nodes,
        }
    }

    /// Rebuild the record.
    ///
    /// # Errors
    ///
    /// Returns `DigestError::SerializationError` if a node refers forward,
    /// a node is used twice or never, values nest deeper than the reader
    /// accepts, or the last node is not an annotation.
    pub fn to_record(&self) -> Result<RawRecord, DigestError> {
        match rebuild(&self.nodes)? {
            Value::Annotation(annotation) => Ok(RawRecord::new(
                self.element.clone(),
                annotation,
                self.retention,
            )),
            _ => Err(table_error("record root is not an annotation")),
        }
    }
}

fn flatten_annotation(annotation: &Annotation, nodes: &mut Vec<CanonicalNode>) -> u32 {
    let attributes = annotation
        .attributes
        .iter()
        .map(|(name, value)| (name.clone(), flatten(value, nodes)))
        .collect();
    push_node(
        nodes,
        CanonicalNode::Annotation {
            type_name: annotation.type_name.clone(),
            attributes,
        },
    )
}

fn flatten(value: &Value, nodes: &mut Vec<CanonicalNode>) -> u32 {
    let node = match value {
        Value::Absent => CanonicalNode::Absent,
        Value::Byte(v) => CanonicalNode::Byte(*v),
        Value::Char(v) => CanonicalNode::Char(*v),
        Value::Short(v) => CanonicalNode::Short(*v),
        Value::Int(v) => CanonicalNode::Int(*v),
        Value::Long(v) => CanonicalNode::Long(*v),
        Value::Float(v) => CanonicalNode::Float(v.to_bits()),
        Value::Double(v) => CanonicalNode::Double(v.to_bits()),
        Value::Boolean(v) => CanonicalNode::Boolean(*v),
        Value::String(v) => CanonicalNode::String(v.clone()),
        Value::Class(v) => CanonicalNode::Class(v.clone()),
        Value::Enum {
            type_name,
            constant,
        } => CanonicalNode::Enum {
            type_name: type_name.clone(),
            constant: constant.clone(),
        },
        Value::Annotation(nested) => return flatten_annotation(nested, nodes),
        Value::Array(items) => {
            CanonicalNode::Array(items.iter().map(|item| flatten(item, nodes)).collect())
        }
    };
    push_node(nodes, node)
}

fn push_node(nodes: &mut Vec<CanonicalNode>, node: CanonicalNode) -> u32 {
    nodes.push(node);
    (nodes.len() - 1) as u32
}

/// Built value and its nesting height, one slot per node until claimed.
type Slot = Option<(Value, usize)>;

/// Claim a finished child. Forward references and second uses find no slot.
fn take_child(slots: &mut [Slot], child: u32) -> Result<(Value, usize), DigestError> {
    slots
        .get_mut(child as usize)
        .and_then(Option::take)
        .ok_or_else(|| table_error("node reference is forward or reused"))
}

/// Rebuild the value at the end of a node table, bottom-up.
fn rebuild(nodes: &[CanonicalNode]) -> Result<Value, DigestError> {
    // The record's own annotation sits one level above its element values.
    let max_height = MAX_ELEMENT_NESTING + 1;
    let mut slots: Vec<Slot> = Vec::with_capacity(nodes.len());

    for node in nodes {
        let (value, height) = match node {
            CanonicalNode::Array(children) => {
                let mut items = Vec::with_capacity(children.len());
                let mut height = 0;
                for child in children {
                    let (item, h) = take_child(&mut slots, *child)?;
                    height = height.max(h);
                    items.push(item);
                }
                (Value::Array(items), height + 1)
            }
            CanonicalNode::Annotation {
                type_name,
                attributes,
            } => {
                let mut pairs = Vec::with_capacity(attributes.len());
                let mut height = 0;
                for (name, child) in attributes {
                    let (value, h) = take_child(&mut slots, *child)?;
                    height = height.max(h);
                    pairs.push((name.clone(), value));
                }
                let annotation = Annotation {
                    type_name: type_name.clone(),
                    attributes: pairs,
                };
                (Value::Annotation(annotation), height + 1)
            }
            CanonicalNode::Absent => (Value::Absent, 1),
            CanonicalNode::Byte(v) => (Value::Byte(*v), 1),
            CanonicalNode::Char(v) => (Value::Char(*v), 1),
            CanonicalNode::Short(v) => (Value::Short(*v), 1),
            CanonicalNode::Int(v) => (Value::Int(*v), 1),
            CanonicalNode::Long(v) => (Value::Long(*v), 1),
            CanonicalNode::Float(bits) => (Value::Float(f32::from_bits(*bits)), 1),
            CanonicalNode::Double(bits) => (Value::Double(f64::from_bits(*bits)), 1),
            CanonicalNode::Boolean(v) => (Value::Boolean(*v), 1),
            CanonicalNode::String(v) => (Value::String(v.clone()), 1),
            CanonicalNode::Class(v) => (Value::Class(v.clone()), 1),
            CanonicalNode::Enum {
                type_name,
                constant,
            } => (
                Value::Enum {
                    type_name: type_name.clone(),
                    constant: constant.clone(),
                },
                1,
            ),
        };
        if height > max_height {
            return Err(table_error(&format!(
                "values nested deeper than {MAX_ELEMENT_NESTING}"
            )));
        }
        slots.push(Some((value, height)));
    }

    let (root, _) = slots
        .pop()
        .flatten()
        .ok_or_else(|| table_error("empty value table"))?;
    if slots.iter().any(Option::is_some) {
        return Err(table_error("unreferenced value node"));
    }
    Ok(root)
}

fn table_error(reason: &str) -> DigestError {
    DigestError::SerializationError(format!("Value table: {reason}"))
}

/// Deterministic checksum of a data section.
///
/// XOR-rotate over the bytes. Detects accidental corruption only; use
/// `canonical_hash` (feature `crypto-hash`) where tampering matters.
#[must_use]
pub fn checksum_bytes(data: &[u8]) -> u64 {
    data.iter().fold(data.len() as u64, |hash, byte| {
        hash.rotate_left(7) ^ u64::from(*byte)
    })
}

fn group_len(groups: &[(TypeName, Vec<CanonicalRecord>)]) -> u64 {
    groups.iter().map(|(_, records)| records.len() as u64).sum()
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export a digest to canonical postcard format.
///
/// # Errors
///
/// Returns `DigestError::SerializationError` if serialization fails.
pub fn export_canonical(digest: &AnnotationsDigest) -> Result<Vec<u8>, DigestError> {
    frame(&CanonicalDigest::from_digest(digest))
}

/// Prefix a canonical digest with its header.
fn frame(canonical: &CanonicalDigest) -> Result<Vec<u8>, DigestError> {
    let data_bytes = canonical.to_bytes()?;
    let header = CanonicalHeader::new(canonical, checksum_bytes(&data_bytes));

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| DigestError::SerializationError(format!("Header: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);

    Ok(result)
}

/// Split an export into its validated header and data section.
fn split_export(data: &[u8]) -> Result<(CanonicalHeader, &[u8]), DigestError> {
    if data.len() > MAX_EXPORT_SIZE {
        return Err(DigestError::SerializationError(format!(
            "Export size {} exceeds maximum allowed {}",
            data.len(),
            MAX_EXPORT_SIZE
        )));
    }
    let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
        return Err(DigestError::SerializationError(
            "Data too short".to_string(),
        ));
    };
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    if rest.len() < header_len {
        return Err(DigestError::SerializationError(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, body) = rest.split_at(header_len);

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| DigestError::SerializationError(format!("Header: {}", e)))?;
    header.validate()?;

    let computed = checksum_bytes(body);
    if computed != header.checksum {
        return Err(DigestError::SerializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    Ok((header, body))
}

/// Import a digest from canonical postcard format.
///
/// # Errors
///
/// Returns `DigestError::SerializationError` if the data is oversized,
/// has a bad header, fails the checksum, disagrees with the header counts,
/// or carries a malformed value table.
pub fn import_canonical(data: &[u8]) -> Result<AnnotationsDigest, DigestError> {
    let (header, body) = split_export(data)?;

    let canonical: CanonicalDigest = postcard::from_bytes(body)
        .map_err(|e| DigestError::SerializationError(format!("Data: {}", e)))?;

    if canonical.class_data.len() as u64 != header.class_count
        || group_len(&canonical.method_data) != header.method_count
        || group_len(&canonical.field_data) != header.field_count
    {
        return Err(DigestError::SerializationError(
            "Record count mismatch".to_string(),
        ));
    }

    canonical.to_digest()
}

/// Verify that a digest matches a canonical export.
pub fn verify_canonical(
    digest: &AnnotationsDigest,
    canonical_data: &[u8],
) -> Result<bool, DigestError> {
    let imported = import_canonical(canonical_data)?;
    Ok(CanonicalDigest::from_digest(digest) == CanonicalDigest::from_digest(&imported))
}

/// Checksum of a digest's canonical data section.
pub fn canonical_checksum(digest: &AnnotationsDigest) -> Result<u64, DigestError> {
    Ok(checksum_bytes(&CanonicalDigest::from_digest(digest).to_bytes()?))
}

// =============================================================================
// CRYPTOGRAPHIC HASH SUPPORT
// =============================================================================

/// BLAKE3 hash of the canonical export, as 64 hex characters.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
pub fn canonical_hash(digest: &AnnotationsDigest) -> Result<String, DigestError> {
    let data = export_canonical(digest)?;
    Ok(blake3::hash(&data).to_hex().to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{ClassWriter, MemberDef};
    use crate::provider::MemoryProvider;
    use crate::session::Session;

    fn digest() -> AnnotationsDigest {
        let base = ClassWriter::new("a/Base")
            .annotation(Annotation::new("a/Named").with("value", Value::string("base")))
            .field(MemberDef::new("x", "J").annotation(
                Annotation::new("a/Config").with("limit", Value::Double(0.5)),
            ))
            .to_bytes()
            .expect("base");
        let child = ClassWriter::new("a/Child")
            .super_class("a/Base")
            .method(MemberDef::new("f", "()V").annotation(Annotation::new("a/M")))
            .to_bytes()
            .expect("child");
        let provider = MemoryProvider::new()
            .with_class(base)
            .and_then(|p| p.with_class(child))
            .expect("provider");
        Session::new(provider)
            .digest(&TypeName::new("a/Child"))
            .expect("digest")
    }

    #[test]
    fn export_import_restores_equal_digest() {
        let original = digest();
        let bytes = export_canonical(&original).expect("export");
        let restored = import_canonical(&bytes).expect("import");
        assert_eq!(original, restored);
        assert!(verify_canonical(&original, &bytes).expect("verify"));
    }

    #[test]
    fn export_is_deterministic() {
        let a = export_canonical(&digest()).expect("export");
        let b = export_canonical(&digest()).expect("export");
        assert_eq!(a, b);
        assert_eq!(
            canonical_checksum(&digest()).expect("checksum"),
            canonical_checksum(&digest()).expect("checksum")
        );
    }

    #[test]
    fn tampered_data_is_rejected() {
        let mut bytes = export_canonical(&digest()).expect("export");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(import_canonical(&bytes).is_err());
    }

    #[test]
    fn bad_header_is_rejected() {
        assert!(import_canonical(&[]).is_err());
        assert!(import_canonical(&[200, 0, 0, 0, 1]).is_err());

        let mut bytes = export_canonical(&digest()).expect("export");
        bytes[4] = b'X';
        assert!(import_canonical(&bytes).is_err());
    }

    /// A record whose `value` is an int wrapped in `depth` arrays.
    fn chain(depth: usize) -> CanonicalRecord {
        let mut nodes = vec![CanonicalNode::Int(1)];
        for i in 0..depth {
            nodes.push(CanonicalNode::Array(vec![i as u32]));
        }
        let top = (nodes.len() - 1) as u32;
        nodes.push(CanonicalNode::Annotation {
            type_name: TypeName::new("a/Deep"),
            attributes: vec![("value".to_string(), top)],
        });
        record_of(nodes)
    }

    fn record_of(nodes: Vec<CanonicalNode>) -> CanonicalRecord {
        CanonicalRecord {
            element: ElementRef::of_type(TypeName::new("a/Root")),
            retention: Retention::Visible,
            nodes,
        }
    }

    fn canonical_with(record: CanonicalRecord) -> CanonicalDigest {
        CanonicalDigest {
            root: TypeName::new("a/Root"),
            mode: WalkMode::Full,
            visited: vec![TypeName::new("a/Root")],
            truncated: Vec::new(),
            class_data: vec![record],
            method_data: Vec::new(),
            field_data: Vec::new(),
        }
    }

    #[test]
    fn deeply_chained_values_are_rejected_on_import() {
        let bytes = frame(&canonical_with(chain(200_000))).expect("frame");
        assert!(matches!(
            import_canonical(&bytes),
            Err(DigestError::SerializationError(_))
        ));
    }

    #[test]
    fn nesting_limit_matches_reader() {
        // 63 arrays put the int at element-value depth 64, the reader's last legal level.
        let record = chain(MAX_ELEMENT_NESTING - 1).to_record().expect("at limit");
        let mut value = &record.annotation.attributes[0].1;
        let mut arrays = 0;
        while let Value::Array(items) = value {
            arrays += 1;
            value = &items[0];
        }
        assert_eq!(arrays, MAX_ELEMENT_NESTING - 1);
        assert_eq!(value, &Value::Int(1));

        assert!(chain(MAX_ELEMENT_NESTING).to_record().is_err());
    }

    #[test]
    fn value_table_rejects_bad_links() {
        let annotation = |attributes: Vec<(String, u32)>| CanonicalNode::Annotation {
            type_name: TypeName::new("a/Bad"),
            attributes,
        };
        let a = || "a".to_string();
        let b = || "b".to_string();

        let shared = vec![
            CanonicalNode::Int(1),
            annotation(vec![(a(), 0), (b(), 0)]),
        ];
        let forward = vec![CanonicalNode::Array(vec![1]), CanonicalNode::Int(1)];
        let orphan = vec![
            CanonicalNode::Int(1),
            CanonicalNode::Int(2),
            annotation(vec![(a(), 1)]),
        ];
        let not_annotation = vec![CanonicalNode::Int(1)];

        for nodes in [shared, forward, orphan, not_annotation, Vec::new()] {
            assert!(matches!(
                record_of(nodes).to_record(),
                Err(DigestError::SerializationError(_))
            ));
        }
    }

    #[test]
    fn floats_keep_their_bits() {
        let record = RawRecord::new(
            ElementRef::of_type(TypeName::new("a/Root")),
            Annotation::new("a/F")
                .with("nan", Value::Float(f32::NAN))
                .with("neg_zero", Value::Double(f64::from_bits(1 << 63))),
            Retention::Invisible,
        );
        let canonical = CanonicalRecord::from_record(&record);
        assert_eq!(canonical.to_record().expect("rebuild"), record);
    }

    #[test]
    fn checksum_is_order_sensitive() {
        assert_ne!(checksum_bytes(&[1, 2]), checksum_bytes(&[2, 1]));
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn crypto_hash_is_stable() {
        let a = canonical_hash(&digest()).expect("hash");
        assert_eq!(a.len(), 64);
        assert_eq!(a, canonical_hash(&digest()).expect("hash"));
    }
}
