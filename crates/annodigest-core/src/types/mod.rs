//! # Core Type Definitions
//!
//! This module contains all core types for the annotation digest engine:
//! - Element identifiers (`TypeName`, `MemberSignature`, `ElementRef`)
//! - Annotation data (`Value`, `Annotation`, `RawRecord`)
//! - Error types (`DigestError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Compare floating-point values by bit pattern, so equality is total
//! - Keep attribute order exactly as it was declared in the class file
//! - Are immutable once produced by the reader

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// TYPE & MEMBER IDENTIFIERS
// =============================================================================

/// Binary name of a class or interface in internal form (`com/example/Foo`).
///
/// Dotted names are accepted on construction and normalized to slashes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeName(String);

impl TypeName {
    /// Create a type name, normalizing `.` separators to `/`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.contains('.') {
            Self(name.replace('.', "/"))
        } else {
            Self(name)
        }
    }

    /// Parse a field descriptor of the form `Lcom/example/Foo;`.
    ///
    /// Returns `None` for primitive or array descriptors.
    #[must_use]
    pub fn from_descriptor(descriptor: &str) -> Option<Self> {
        descriptor
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
            .filter(|inner| !inner.is_empty())
            .map(|inner| Self(inner.to_string()))
    }

    /// The field descriptor for this type (`Lcom/example/Foo;`).
    #[must_use]
    pub fn to_descriptor(&self) -> String {
        format!("L{};", self.0)
    }

    /// Get the internal form as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Source-style dotted form (`com.example.Foo`).
    #[must_use]
    pub fn dotted(&self) -> String {
        self.0.replace('/', ".")
    }

    /// The last path segment (`Foo` for `com/example/Foo`).
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TypeName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// The kind of element an annotation is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Type,
    Method,
    Field,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Type => "type",
            Self::Method => "method",
            Self::Field => "field",
        };
        f.write_str(name)
    }
}

/// Signature used to match a member across hierarchy levels.
///
/// Methods match on name plus parameter types (`find(ILjava/lang/String;)`),
/// so covariant return types still line up. Fields match on name alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberSignature(String);

impl MemberSignature {
    /// Signature of a method from its name and full descriptor.
    #[must_use]
    pub fn method(name: &str, descriptor: &str) -> Self {
        let params = match descriptor.find(')') {
            Some(end) => &descriptor[..=end],
            None => descriptor,
        };
        Self(format!("{name}{params}"))
    }

    /// Signature of a field.
    #[must_use]
    pub fn field(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Get the signature as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The member name without parameter types.
    #[must_use]
    pub fn name(&self) -> &str {
        match self.0.find('(') {
            Some(start) => &self.0[..start],
            None => &self.0,
        }
    }
}

impl fmt::Display for MemberSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The element that owns an annotation occurrence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    /// Class, method or field.
    pub kind: ElementKind,
    /// The type that declares the element.
    pub declaring_type: TypeName,
    /// Member signature. `None` for class-level elements.
    pub member: Option<MemberSignature>,
    /// Full member descriptor, kept for display.
    pub descriptor: Option<String>,
}

impl ElementRef {
    /// Reference to a class itself.
    #[must_use]
    pub fn of_type(declaring_type: TypeName) -> Self {
        Self {
            kind: ElementKind::Type,
            declaring_type,
            member: None,
            descriptor: None,
        }
    }

    /// Reference to a method.
    #[must_use]
    pub fn method(declaring_type: TypeName, name: &str, descriptor: &str) -> Self {
        Self {
            kind: ElementKind::Method,
            declaring_type,
            member: Some(MemberSignature::method(name, descriptor)),
            descriptor: Some(descriptor.to_string()),
        }
    }

    /// Reference to a field.
    #[must_use]
    pub fn field(declaring_type: TypeName, name: &str, descriptor: &str) -> Self {
        Self {
            kind: ElementKind::Field,
            declaring_type,
            member: Some(MemberSignature::field(name)),
            descriptor: Some(descriptor.to_string()),
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(member) => write!(f, "{}#{}", self.declaring_type, member),
            None => write!(f, "{}", self.declaring_type),
        }
    }
}

// =============================================================================
// ANNOTATION VALUES
// =============================================================================

/// A single annotation element value.
///
/// Arrays keep their array tag even with one element: a `{ "x" }`
/// declaration is `Array([String("x")])`, never `String("x")`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// No stored value; readers fall back to the declared default.
    Absent,
    Byte(i8),
    /// UTF-16 code unit, as stored in the class file.
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
    /// Class literal as a return descriptor (`Ljava/lang/String;`, `I`, `V`).
    Class(String),
    Enum {
        type_name: TypeName,
        constant: String,
    },
    Annotation(Annotation),
    Array(Vec<Value>),
}

impl Value {
    /// The element-value tag used in the class file format.
    #[must_use]
    pub fn tag(&self) -> char {
        match self {
            Self::Absent => '-',
            Self::Byte(_) => 'B',
            Self::Char(_) => 'C',
            Self::Short(_) => 'S',
            Self::Int(_) => 'I',
            Self::Long(_) => 'J',
            Self::Float(_) => 'F',
            Self::Double(_) => 'D',
            Self::Boolean(_) => 'Z',
            Self::String(_) => 's',
            Self::Class(_) => 'c',
            Self::Enum { .. } => 'e',
            Self::Annotation(_) => '@',
            Self::Array(_) => '[',
        }
    }

    /// Human readable kind name for error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Byte(_) => "byte",
            Self::Char(_) => "char",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
            Self::String(_) => "String",
            Self::Class(_) => "Class",
            Self::Enum { .. } => "enum",
            Self::Annotation(_) => "annotation",
            Self::Array(_) => "array",
        }
    }

    /// Convenience constructor for string values.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Convenience constructor for enum constants.
    #[must_use]
    pub fn enum_constant(type_name: impl Into<TypeName>, constant: impl Into<String>) -> Self {
        Self::Enum {
            type_name: type_name.into(),
            constant: constant.into(),
        }
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Absent, Self::Absent) => true,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Class(a), Self::Class(b)) => a == b,
            (
                Self::Enum {
                    type_name: ta,
                    constant: ca,
                },
                Self::Enum {
                    type_name: tb,
                    constant: cb,
                },
            ) => ta == tb && ca == cb,
            (Self::Annotation(a), Self::Annotation(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("<absent>"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "'{c}'"),
                None => write!(f, "'\\u{v:04x}'"),
            },
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v}f"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Class(v) => write!(f, "{v}.class"),
            Self::Enum {
                type_name,
                constant,
            } => write!(f, "{}.{}", type_name.simple_name(), constant),
            Self::Annotation(a) => write!(f, "{a}"),
            Self::Array(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

// =============================================================================
// ANNOTATION
// =============================================================================

/// One annotation: its type plus attribute values in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// The annotation interface.
    pub type_name: TypeName,
    /// Attribute name/value pairs in the order they were stored.
    pub attributes: Vec<(String, Value)>,
}

impl Annotation {
    /// Create an annotation with no attributes.
    #[must_use]
    pub fn new(type_name: impl Into<TypeName>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: Vec::new(),
        }
    }

    /// Append an attribute (builder style).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.push((name.into(), value));
        self
    }

    /// Look up an attribute by its stored name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value)
    }

    /// Stored attribute names in declaration order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.type_name.dotted())?;
        if self.attributes.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        for (i, (name, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str(")")
    }
}

/// Which class-file attribute an annotation was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Retention {
    /// `RuntimeVisibleAnnotations`
    Visible,
    /// `RuntimeInvisibleAnnotations`
    Invisible,
}

// =============================================================================
// RAW RECORD
// =============================================================================

/// One annotation occurrence as parsed from a class file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// The annotated element.
    pub element: ElementRef,
    /// The annotation itself.
    pub annotation: Annotation,
    /// The attribute it was stored in.
    pub retention: Retention,
}

impl RawRecord {
    #[must_use]
    pub fn new(element: ElementRef, annotation: Annotation, retention: Retention) -> Self {
        Self {
            element,
            annotation,
            retention,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while reading, walking or viewing annotation data.
///
/// - Parse and resolution errors propagate to whoever asked for the digest
/// - View errors only affect the accessor call that raised them
/// - The engine never panics on bad input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    /// The class bytes are truncated or structurally invalid.
    #[error("Malformed class data at offset {offset}: {reason}")]
    MalformedMetadata { offset: usize, reason: String },

    /// The root type of a digest could not be found.
    #[error("Type not found: {0}")]
    UnresolvableType(TypeName),

    /// A superclass or interface could not be found during a full walk.
    #[error("Ancestor {ancestor} of {referenced_by} could not be resolved")]
    UnresolvableAncestor {
        ancestor: TypeName,
        referenced_by: TypeName,
    },

    /// An accessor has neither a stored value nor a default.
    #[error("Attribute '{attribute}' of {annotation} has no value and no default")]
    MissingAttribute {
        annotation: TypeName,
        attribute: String,
    },

    /// A stored value cannot be presented in the requested shape.
    #[error("Attribute '{attribute}' of {annotation}: expected {expected}, found {found}")]
    ShapeMismatch {
        annotation: TypeName,
        attribute: String,
        expected: String,
        found: String,
    },

    /// A shape was requested from a type that is not an annotation interface.
    #[error("Not an annotation interface: {0}")]
    NotAnAnnotation(TypeName),

    /// The class provider failed to produce bytes.
    #[error("Class provider error: {0}")]
    ProviderError(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl DigestError {
    /// Shorthand for a malformed-data error.
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            offset,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
