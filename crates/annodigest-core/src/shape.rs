//! # Shape Derivation
//!
//! Builds a [`Shape`] from a compiled annotation interface, so callers can
//! view data through the interface's own declaration instead of writing
//! the shape by hand.
//!
//! Each abstract element method becomes an accessor. Its return descriptor
//! gives the kind and its `AnnotationDefault` gives the default. Object
//! return types other than `String` and `Class` are loaded to tell enums
//! from nested annotation interfaces.

use crate::classfile::{ClassInfo, read_class};
use crate::primitives::{ACC_STATIC, CLASS_DESCRIPTOR, STRING_DESCRIPTOR};
use crate::provider::ClassProvider;
use crate::view::{Shape, ValueKind};
use crate::{DigestError, TypeName};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Derive the shape of an annotation interface from its class bytes.
///
/// Element types are resolved through `provider`.
///
/// # Errors
///
/// `NotAnAnnotation` if the bytes are not an annotation interface,
/// `UnresolvableType` if an element's enum or annotation type cannot be
/// found, plus any reader error.
pub fn shape_from_class(bytes: &[u8], provider: &dyn ClassProvider) -> Result<Shape, DigestError> {
    let class = read_class(bytes)?;
    derive_shape(&class, |name| match provider.class_bytes(name)? {
        Some(bytes) => Ok(Some(Arc::new(read_class(&bytes)?))),
        None => Ok(None),
    })
}

/// Derive the shape of a parsed annotation interface.
///
/// `load` resolves element types; `Ok(None)` means not found.
pub fn derive_shape<F>(class: &ClassInfo, load: F) -> Result<Shape, DigestError>
where
    F: FnMut(&TypeName) -> Result<Option<Arc<ClassInfo>>, DigestError>,
{
    let mut deriver = ShapeDeriver {
        load,
        in_progress: BTreeSet::new(),
        done: BTreeMap::new(),
    };
    deriver.shape(class).map(|shape| (*shape).clone())
}

struct ShapeDeriver<F> {
    load: F,
    /// Annotation types whose shape is being built; guards self-reference.
    in_progress: BTreeSet<TypeName>,
    done: BTreeMap<TypeName, Arc<Shape>>,
}

impl<F> ShapeDeriver<F>
where
    F: FnMut(&TypeName) -> Result<Option<Arc<ClassInfo>>, DigestError>,
{
    fn shape(&mut self, class: &ClassInfo) -> Result<Arc<Shape>, DigestError> {
        if !class.is_annotation() {
            return Err(DigestError::NotAnAnnotation(class.name.clone()));
        }
        if let Some(shape) = self.done.get(&class.name) {
            return Ok(shape.clone());
        }
        self.in_progress.insert(class.name.clone());

        let mut shape = Shape::new(class.name.clone());
        for method in &class.methods {
            if !method.is_abstract() || method.access_flags & ACC_STATIC != 0 {
                continue;
            }
            let returns = method
                .descriptor
                .strip_prefix("()")
                .ok_or_else(|| DigestError::MalformedMetadata {
                    offset: 0,
                    reason: format!(
                        "annotation element {}.{} has descriptor {}",
                        class.name, method.name, method.descriptor
                    ),
                })?;
            let kind = self.kind(&class.name, &method.name, returns)?;
            shape = match &method.annotation_default {
                Some(default) => shape.accessor_with_default(&method.name, kind, default.clone()),
                None => shape.accessor(&method.name, kind),
            };
        }

        self.in_progress.remove(&class.name);
        let shape = Arc::new(shape);
        self.done.insert(class.name.clone(), shape.clone());
        Ok(shape)
    }

    fn kind(
        &mut self,
        owner: &TypeName,
        element: &str,
        descriptor: &str,
    ) -> Result<ValueKind, DigestError> {
        let kind = match descriptor {
            "B" => ValueKind::Byte,
            "C" => ValueKind::Char,
            "S" => ValueKind::Short,
            "I" => ValueKind::Int,
            "J" => ValueKind::Long,
            "F" => ValueKind::Float,
            "D" => ValueKind::Double,
            "Z" => ValueKind::Boolean,
            STRING_DESCRIPTOR => ValueKind::String,
            CLASS_DESCRIPTOR => ValueKind::Class,
            array if array.starts_with('[') => {
                ValueKind::array_of(self.kind(owner, element, &array[1..])?)
            }
            object => {
                let Some(type_name) = TypeName::from_descriptor(object) else {
                    return Err(self.unsupported(owner, element, descriptor));
                };
                if self.in_progress.contains(&type_name) {
                    return Err(DigestError::ShapeMismatch {
                        annotation: owner.clone(),
                        attribute: element.to_string(),
                        expected: "acyclic element type".to_string(),
                        found: type_name.to_string(),
                    });
                }
                let class = (self.load)(&type_name)?
                    .ok_or_else(|| DigestError::UnresolvableType(type_name.clone()))?;
                if class.is_enum() {
                    ValueKind::Enum(type_name)
                } else if class.is_annotation() {
                    ValueKind::Nested(self.shape(&class)?)
                } else {
                    return Err(self.unsupported(owner, element, descriptor));
                }
            }
        };
        Ok(kind)
    }

    fn unsupported(&self, owner: &TypeName, element: &str, descriptor: &str) -> DigestError {
        DigestError::ShapeMismatch {
            annotation: owner.clone(),
            attribute: element.to_string(),
            expected: "annotation element type".to_string(),
            found: descriptor.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{ClassWriter, MemberDef};
    use crate::primitives::{ACC_ABSTRACT, ACC_ANNOTATION, ACC_ENUM, ACC_INTERFACE};
    use crate::provider::MemoryProvider;
    use crate::Value;

    const ANNOTATION: u16 = ACC_ANNOTATION | ACC_INTERFACE | ACC_ABSTRACT;

    fn element(name: &str, returns: &str) -> MemberDef {
        MemberDef::new(name, format!("(){returns}")).access(ACC_ABSTRACT)
    }

    fn provider() -> MemoryProvider {
        let mode = ClassWriter::new("a/Mode")
            .access(ACC_ENUM)
            .super_class("java/lang/Enum")
            .to_bytes()
            .expect("enum");
        let inner = ClassWriter::new("a/Inner")
            .access(ANNOTATION)
            .interface("java/lang/annotation/Annotation")
            .method(element("id", "Ljava/lang/String;"))
            .to_bytes()
            .expect("inner");
        MemoryProvider::new()
            .with_class(mode)
            .and_then(|p| p.with_class(inner))
            .expect("provider")
    }

    fn outer() -> Vec<u8> {
        ClassWriter::new("a/Outer")
            .access(ANNOTATION)
            .method(element("value", "Ljava/lang/String;").default_value(Value::string("")))
            .method(element("count", "I"))
            .method(element("types", "[Ljava/lang/Class;"))
            .method(element("mode", "La/Mode;"))
            .method(element("inner", "[La/Inner;"))
            .to_bytes()
            .expect("outer")
    }

    #[test]
    fn elements_become_accessors() {
        let shape = shape_from_class(&outer(), &provider()).expect("shape");
        assert_eq!(shape.annotation_type().as_str(), "a/Outer");
        assert_eq!(shape.len(), 5);

        let value = shape.get("value").expect("value");
        assert_eq!(value.kind, ValueKind::String);
        assert_eq!(value.default, Some(Value::string("")));

        assert_eq!(shape.get("count").expect("count").kind, ValueKind::Int);
        assert_eq!(
            shape.get("types").expect("types").kind,
            ValueKind::array_of(ValueKind::Class)
        );
        assert_eq!(
            shape.get("mode").expect("mode").kind,
            ValueKind::Enum(TypeName::new("a/Mode"))
        );

        let inner_shape = Shape::new("a/Inner").accessor("id", ValueKind::String);
        assert_eq!(
            shape.get("inner").expect("inner").kind,
            ValueKind::array_of(ValueKind::nested(inner_shape))
        );
    }

    #[test]
    fn plain_class_is_not_an_annotation() {
        let bytes = ClassWriter::new("a/Plain").to_bytes().expect("plain");
        assert_eq!(
            shape_from_class(&bytes, &MemoryProvider::new()),
            Err(DigestError::NotAnAnnotation(TypeName::new("a/Plain")))
        );
    }

    #[test]
    fn missing_element_type_is_reported() {
        assert_eq!(
            shape_from_class(&outer(), &MemoryProvider::new()),
            Err(DigestError::UnresolvableType(TypeName::new("a/Mode")))
        );
    }

    #[test]
    fn self_referencing_element_is_rejected() {
        let looped = ClassWriter::new("a/Loop")
            .access(ANNOTATION)
            .method(element("next", "La/Loop;"))
            .to_bytes()
            .expect("loop");
        let provider = MemoryProvider::new().with_class(looped.clone()).expect("provider");
        assert!(matches!(
            shape_from_class(&looped, &provider),
            Err(DigestError::ShapeMismatch { .. })
        ));
    }
}
