//! # Dynamic View Synthesizer
//!
//! Presents one stored annotation through a caller-declared [`Shape`]: a set
//! of named, typed accessors with optional defaults. A [`View`] is a small
//! interpreter over that table; there is no generated code.
//!
//! ## Accessor Resolution
//!
//! ```text
//! get(name):
//!     stored = map_attribute(shape type, name)
//!     value  = annotation[stored]  or  accessor default  or  MissingAttribute
//!     coerce(value, accessor kind)
//! ```
//!
//! Coercion is strict except for one case: a one-element array backing a
//! scalar accessor is unwrapped. A scalar backing an array accessor, or a
//! longer array backing a scalar accessor, is `ShapeMismatch`.
//!
//! Errors are local to the accessor call; the view and the digest it came
//! from stay usable.

use crate::digest::AnnotationDatum;
use crate::mapper::{IdentityMapper, Mapper};
use crate::{Annotation, DigestError, TypeName, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// SHAPE
// =============================================================================

/// Declared return kind of an accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    String,
    Class,
    /// Constant of the given enum type.
    Enum(TypeName),
    /// A nested annotation, viewed through its own shape.
    Nested(Arc<Shape>),
    Array(Box<ValueKind>),
}

impl ValueKind {
    #[must_use]
    pub fn array_of(element: ValueKind) -> Self {
        Self::Array(Box::new(element))
    }

    #[must_use]
    pub fn nested(shape: Shape) -> Self {
        Self::Nested(Arc::new(shape))
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Whether a stored scalar has this kind.
    fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Byte, Value::Byte(_))
                | (Self::Char, Value::Char(_))
                | (Self::Short, Value::Short(_))
                | (Self::Int, Value::Int(_))
                | (Self::Long, Value::Long(_))
                | (Self::Float, Value::Float(_))
                | (Self::Double, Value::Double(_))
                | (Self::Boolean, Value::Boolean(_))
                | (Self::String, Value::String(_))
                | (Self::Class, Value::Class(_))
                | (Self::Enum(_), Value::Enum { .. })
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => f.write_str("byte"),
            Self::Char => f.write_str("char"),
            Self::Short => f.write_str("short"),
            Self::Int => f.write_str("int"),
            Self::Long => f.write_str("long"),
            Self::Float => f.write_str("float"),
            Self::Double => f.write_str("double"),
            Self::Boolean => f.write_str("boolean"),
            Self::String => f.write_str("String"),
            Self::Class => f.write_str("Class"),
            Self::Enum(t) => write!(f, "enum {}", t.simple_name()),
            Self::Nested(shape) => write!(f, "@{}", shape.annotation_type.simple_name()),
            Self::Array(element) => write!(f, "{element}[]"),
        }
    }
}

/// One accessor of a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    pub name: String,
    pub kind: ValueKind,
    /// Used when the annotation does not store the attribute.
    pub default: Option<Value>,
}

/// A caller-side annotation interface: the type it expects plus accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    annotation_type: TypeName,
    accessors: BTreeMap<String, Accessor>,
}

impl Shape {
    #[must_use]
    pub fn new(annotation_type: impl Into<TypeName>) -> Self {
        Self {
            annotation_type: annotation_type.into(),
            accessors: BTreeMap::new(),
        }
    }

    /// Add an accessor without a default.
    #[must_use]
    pub fn accessor(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.insert(name.into(), kind, None)
    }

    /// Add an accessor with a declared default.
    #[must_use]
    pub fn accessor_with_default(
        self,
        name: impl Into<String>,
        kind: ValueKind,
        default: Value,
    ) -> Self {
        self.insert(name.into(), kind, Some(default))
    }

    fn insert(mut self, name: String, kind: ValueKind, default: Option<Value>) -> Self {
        self.accessors.insert(
            name.clone(),
            Accessor {
                name,
                kind,
                default,
            },
        );
        self
    }

    /// The client-expected annotation type.
    #[must_use]
    pub fn annotation_type(&self) -> &TypeName {
        &self.annotation_type
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Accessor> {
        self.accessors.get(name)
    }

    /// Accessors sorted by name.
    pub fn accessors(&self) -> impl Iterator<Item = &Accessor> {
        self.accessors.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

// =============================================================================
// VIEW
// =============================================================================

/// Result of one accessor call.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewValue {
    Scalar(Value),
    Nested(View),
    Array(Vec<ViewValue>),
}

impl ViewValue {
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_view(&self) -> Option<&View> {
        match self {
            Self::Nested(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[ViewValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// A stored annotation seen through a shape.
///
/// Owns its data: a view outlives the digest it was built from. Two views
/// over equal annotations with equal shapes compare equal.
#[derive(Debug, Clone)]
pub struct View {
    annotation: Arc<Annotation>,
    shape: Arc<Shape>,
    mapper: Arc<dyn Mapper>,
}

impl View {
    /// View a digest datum.
    #[must_use]
    pub fn new(datum: &AnnotationDatum, shape: Arc<Shape>, mapper: Arc<dyn Mapper>) -> Self {
        Self::over(Arc::new(datum.annotation().clone()), shape, mapper)
    }

    /// View a bare annotation with the identity mapper.
    #[must_use]
    pub fn of(annotation: Annotation, shape: Shape) -> Self {
        Self::over(Arc::new(annotation), Arc::new(shape), Arc::new(IdentityMapper))
    }

    fn over(annotation: Arc<Annotation>, shape: Arc<Shape>, mapper: Arc<dyn Mapper>) -> Self {
        Self {
            annotation,
            shape,
            mapper,
        }
    }

    #[must_use]
    pub fn annotation(&self) -> &Annotation {
        &self.annotation
    }

    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Resolve one accessor.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if the shape has no such accessor, or the
    /// annotation stores no value and the accessor declares no default.
    /// `ShapeMismatch` if the stored value cannot take the declared kind.
    pub fn get(&self, name: &str) -> Result<ViewValue, DigestError> {
        let accessor = self.shape.get(name).ok_or_else(|| self.missing(name))?;
        let stored_name = self.mapper.map_attribute(&self.shape.annotation_type, name);

        let value = match self.annotation.get(&stored_name) {
            Some(Value::Absent) | None => accessor.default.as_ref(),
            Some(value) => Some(value),
        };
        let value = value.ok_or_else(|| self.missing(name))?;

        self.coerce(name, &accessor.kind, value)
    }

    fn coerce(&self, name: &str, kind: &ValueKind, value: &Value) -> Result<ViewValue, DigestError> {
        match (kind, value) {
            (ValueKind::Array(element), Value::Array(items)) => items
                .iter()
                .map(|item| self.coerce(name, element, item))
                .collect::<Result<Vec<_>, _>>()
                .map(ViewValue::Array),
            (ValueKind::Array(_), _) => Err(self.mismatch(name, kind, value)),
            (_, Value::Array(items)) => match items.as_slice() {
                [single] if !single.is_array() => self.coerce(name, kind, single),
                _ => Err(self.mismatch(name, kind, value)),
            },
            (ValueKind::Nested(shape), Value::Annotation(nested)) => {
                if nested.type_name != self.mapper.map_type(&shape.annotation_type) {
                    return Err(self.mismatch(name, kind, value));
                }
                Ok(ViewValue::Nested(Self::over(
                    Arc::new(nested.clone()),
                    shape.clone(),
                    self.mapper.clone(),
                )))
            }
            _ if kind.accepts(value) => Ok(ViewValue::Scalar(value.clone())),
            _ => Err(self.mismatch(name, kind, value)),
        }
    }

    fn missing(&self, name: &str) -> DigestError {
        DigestError::MissingAttribute {
            annotation: self.shape.annotation_type.clone(),
            attribute: name.to_string(),
        }
    }

    fn mismatch(&self, name: &str, kind: &ValueKind, value: &Value) -> DigestError {
        let found = match value {
            Value::Annotation(a) => format!("@{}", a.type_name.simple_name()),
            other => other.kind_name().to_string(),
        };
        DigestError::ShapeMismatch {
            annotation: self.shape.annotation_type.clone(),
            attribute: name.to_string(),
            expected: kind.to_string(),
            found,
        }
    }

    fn scalar(&self, name: &str, expected: &str) -> Result<Value, DigestError> {
        match self.get(name)? {
            ViewValue::Scalar(value) => Ok(value),
            ViewValue::Nested(_) => Err(self.wrong_helper(name, expected, "annotation")),
            ViewValue::Array(_) => Err(self.wrong_helper(name, expected, "array")),
        }
    }

    fn wrong_helper(&self, name: &str, expected: &str, found: &str) -> DigestError {
        DigestError::ShapeMismatch {
            annotation: self.shape.annotation_type.clone(),
            attribute: name.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Typed helpers
    // -------------------------------------------------------------------------

    pub fn get_str(&self, name: &str) -> Result<String, DigestError> {
        match self.scalar(name, "String")? {
            Value::String(s) => Ok(s),
            other => Err(self.wrong_helper(name, "String", other.kind_name())),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, DigestError> {
        match self.scalar(name, "boolean")? {
            Value::Boolean(b) => Ok(b),
            other => Err(self.wrong_helper(name, "boolean", other.kind_name())),
        }
    }

    /// Any integral kind up to `int`.
    pub fn get_int(&self, name: &str) -> Result<i32, DigestError> {
        match self.scalar(name, "int")? {
            Value::Int(v) => Ok(v),
            Value::Short(v) => Ok(i32::from(v)),
            Value::Byte(v) => Ok(i32::from(v)),
            Value::Char(v) => Ok(i32::from(v)),
            other => Err(self.wrong_helper(name, "int", other.kind_name())),
        }
    }

    pub fn get_long(&self, name: &str) -> Result<i64, DigestError> {
        match self.scalar(name, "long")? {
            Value::Long(v) => Ok(v),
            Value::Int(v) => Ok(i64::from(v)),
            other => Err(self.wrong_helper(name, "long", other.kind_name())),
        }
    }

    /// Enum constant name.
    pub fn get_enum(&self, name: &str) -> Result<String, DigestError> {
        match self.scalar(name, "enum")? {
            Value::Enum { constant, .. } => Ok(constant),
            other => Err(self.wrong_helper(name, "enum", other.kind_name())),
        }
    }

    /// Class literal descriptor.
    pub fn get_class(&self, name: &str) -> Result<String, DigestError> {
        match self.scalar(name, "Class")? {
            Value::Class(descriptor) => Ok(descriptor),
            other => Err(self.wrong_helper(name, "Class", other.kind_name())),
        }
    }

    pub fn get_nested(&self, name: &str) -> Result<View, DigestError> {
        match self.get(name)? {
            ViewValue::Nested(view) => Ok(view),
            ViewValue::Scalar(v) => Err(self.wrong_helper(name, "annotation", v.kind_name())),
            ViewValue::Array(_) => Err(self.wrong_helper(name, "annotation", "array")),
        }
    }

    pub fn get_views(&self, name: &str) -> Result<Vec<View>, DigestError> {
        let items = self.array(name, "annotation[]")?;
        items
            .into_iter()
            .map(|item| match item {
                ViewValue::Nested(view) => Ok(view),
                _ => Err(self.wrong_helper(name, "annotation[]", "scalar[]")),
            })
            .collect()
    }

    pub fn get_strings(&self, name: &str) -> Result<Vec<String>, DigestError> {
        let items = self.array(name, "String[]")?;
        items
            .into_iter()
            .map(|item| match item {
                ViewValue::Scalar(Value::String(s)) => Ok(s),
                _ => Err(self.wrong_helper(name, "String[]", "non-String element")),
            })
            .collect()
    }

    fn array(&self, name: &str, expected: &str) -> Result<Vec<ViewValue>, DigestError> {
        match self.get(name)? {
            ViewValue::Array(items) => Ok(items),
            ViewValue::Scalar(v) => Err(self.wrong_helper(name, expected, v.kind_name())),
            ViewValue::Nested(_) => Err(self.wrong_helper(name, expected, "annotation")),
        }
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.annotation == other.annotation && self.shape == other.shape
    }
}

// =============================================================================
// TYPED VIEWS
// =============================================================================

/// A Rust type that can be read out of a view.
///
/// ```
/// use annodigest_core::{DigestError, FromView, Shape, ValueKind, View};
///
/// struct Named {
///     value: String,
/// }
///
/// impl FromView for Named {
///     fn shape() -> Shape {
///         Shape::new("a/Named").accessor("value", ValueKind::String)
///     }
///
///     fn from_view(view: &View) -> Result<Self, DigestError> {
///         Ok(Self { value: view.get_str("value")? })
///     }
/// }
/// ```
pub trait FromView: Sized {
    /// The shape this type expects.
    fn shape() -> Shape;

    fn from_view(view: &View) -> Result<Self, DigestError>;
}

// =============================================================================
// TESTS
// =============================================================================
