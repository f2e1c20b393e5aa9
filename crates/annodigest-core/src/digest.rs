//! # Annotations Digest
//!
//! The aggregate, queryable result of reading one type's own and inherited
//! annotations.
//!
//! ## Accumulation Rules
//!
//! - Class level: one datum per record at each visited type, in walk order.
//!   Nothing is deduplicated, so a type declaring `@C` whose ancestor also
//!   declares `@C` yields two data; `class_datum` returns the nearest.
//! - Method and field level: every record at every declaration site is kept,
//!   grouped by annotation type. A method overridden at three levels, each
//!   carrying `@M`, yields three data in derived-to-base order.
//!
//! A digest is immutable once built and is `Send + Sync`.

use crate::hierarchy::{TruncatedAncestor, Walk, WalkMode};
use crate::mapper::{IdentityMapper, Mapper};
use crate::primitives::PRIMARY_ATTRIBUTE;
use crate::{
    Annotation, ElementKind, ElementRef, MemberSignature, RawRecord, Retention, TypeName, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// ANNOTATION DATUM
// =============================================================================

/// Handle on one annotation occurrence inside a digest.
///
/// Cloning is cheap; the record is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationDatum {
    record: Arc<RawRecord>,
}

impl AnnotationDatum {
    #[must_use]
    pub fn new(record: RawRecord) -> Self {
        Self {
            record: Arc::new(record),
        }
    }

    /// The element the annotation is attached to.
    #[must_use]
    pub fn element(&self) -> &ElementRef {
        &self.record.element
    }

    #[must_use]
    pub fn annotation(&self) -> &Annotation {
        &self.record.annotation
    }

    /// The stored (canonical) annotation type.
    #[must_use]
    pub fn annotation_type(&self) -> &TypeName {
        &self.record.annotation.type_name
    }

    #[must_use]
    pub fn retention(&self) -> Retention {
        self.record.retention
    }

    /// Stored attribute by canonical name.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.record.annotation.get(attribute)
    }

    /// The `value` attribute, when it is the only attribute stored.
    ///
    /// Covers the single-element convention (`@Named("svc")`). Returns
    /// `None` when other attributes are present as well.
    #[must_use]
    pub fn primary_value(&self) -> Option<&Value> {
        match self.record.annotation.attributes.as_slice() {
            [(name, value)] if name == PRIMARY_ATTRIBUTE => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn record(&self) -> &RawRecord {
        &self.record
    }
}

// =============================================================================
// DIGEST
// =============================================================================

/// Resolved annotation data for one root type.
#[derive(Debug, Clone)]
pub struct AnnotationsDigest {
    root: TypeName,
    mode: WalkMode,
    visited: Vec<TypeName>,
    truncated: Vec<TruncatedAncestor>,
    class_data: Vec<AnnotationDatum>,
    method_data: BTreeMap<TypeName, Vec<AnnotationDatum>>,
    field_data: BTreeMap<TypeName, Vec<AnnotationDatum>>,
    /// Consulted by queries; not part of the digest's identity.
    mapper: Arc<dyn Mapper>,
}

impl AnnotationsDigest {
    /// Assemble a digest from a hierarchy walk.
    ///
    /// The first class of the walk is the root. Queries use the identity
    /// mapper until `with_mapper` replaces it.
    #[must_use]
    pub fn from_walk(walk: &Walk, mode: WalkMode) -> Self {
        let root = walk
            .classes
            .first()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| TypeName::new(""));

        let mut digest = Self::from_parts(
            root,
            mode,
            walk.visited(),
            walk.truncated.clone(),
            Vec::new(),
        );
        for class in &walk.classes {
            for record in class.records() {
                digest.push(record);
            }
        }
        digest
    }

    /// An empty digest; records are added with `push`.
    pub(crate) fn from_parts(
        root: TypeName,
        mode: WalkMode,
        visited: Vec<TypeName>,
        truncated: Vec<TruncatedAncestor>,
        class_data: Vec<AnnotationDatum>,
    ) -> Self {
        Self {
            root,
            mode,
            visited,
            truncated,
            class_data,
            method_data: BTreeMap::new(),
            field_data: BTreeMap::new(),
            mapper: Arc::new(IdentityMapper),
        }
    }

    /// Append one record under its element kind and annotation type.
    pub(crate) fn push(&mut self, record: RawRecord) {
        let kind = record.element.kind;
        let type_name = record.annotation.type_name.clone();
        let datum = AnnotationDatum::new(record);
        match kind {
            ElementKind::Type => self.class_data.push(datum),
            ElementKind::Method => self.method_data.entry(type_name).or_default().push(datum),
            ElementKind::Field => self.field_data.entry(type_name).or_default().push(datum),
        }
    }

    /// Replace the mapper used to translate requested annotation types.
    #[must_use]
    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.mapper = mapper;
        self
    }

    #[must_use]
    pub fn mapper(&self) -> &Arc<dyn Mapper> {
        &self.mapper
    }

    #[must_use]
    pub fn root(&self) -> &TypeName {
        &self.root
    }

    #[must_use]
    pub fn mode(&self) -> WalkMode {
        self.mode
    }

    /// Types read during the walk, root first.
    #[must_use]
    pub fn visited(&self) -> &[TypeName] {
        &self.visited
    }

    /// Ancestors skipped because they could not be found.
    #[must_use]
    pub fn truncated(&self) -> &[TruncatedAncestor] {
        &self.truncated
    }

    // -------------------------------------------------------------------------
    // Class-level queries
    // -------------------------------------------------------------------------

    /// The nearest class-level datum of the given annotation type.
    #[must_use]
    pub fn class_datum(&self, annotation_type: &TypeName) -> Option<&AnnotationDatum> {
        let canonical = self.mapper.map_type(annotation_type);
        self.class_data
            .iter()
            .find(|d| d.annotation_type() == &canonical)
    }

    /// Every class-level datum of the given annotation type, nearest first.
    #[must_use]
    pub fn class_data(&self, annotation_type: &TypeName) -> Vec<&AnnotationDatum> {
        let canonical = self.mapper.map_type(annotation_type);
        self.class_data
            .iter()
            .filter(|d| d.annotation_type() == &canonical)
            .collect()
    }

    /// All class-level data in hierarchy order.
    pub fn class_iter(&self) -> impl Iterator<Item = &AnnotationDatum> {
        self.class_data.iter()
    }

    // -------------------------------------------------------------------------
    // Member-level queries
    // -------------------------------------------------------------------------

    /// Method-level data of the given annotation type; empty when none exist.
    #[must_use]
    pub fn method_data(&self, annotation_type: &TypeName) -> &[AnnotationDatum] {
        lookup(&self.method_data, &self.mapper.map_type(annotation_type))
    }

    /// Method-level data of the given type on one method signature, across
    /// every declaration site.
    #[must_use]
    pub fn method_data_on(
        &self,
        annotation_type: &TypeName,
        signature: &MemberSignature,
    ) -> Vec<&AnnotationDatum> {
        on_member(self.method_data(annotation_type), signature)
    }

    /// Field-level data of the given annotation type; empty when none exist.
    #[must_use]
    pub fn field_data(&self, annotation_type: &TypeName) -> &[AnnotationDatum] {
        lookup(&self.field_data, &self.mapper.map_type(annotation_type))
    }

    #[must_use]
    pub fn field_data_on(
        &self,
        annotation_type: &TypeName,
        signature: &MemberSignature,
    ) -> Vec<&AnnotationDatum> {
        on_member(self.field_data(annotation_type), signature)
    }

    /// Method-level data grouped by stored annotation type, sorted by type.
    pub fn methods(&self) -> impl Iterator<Item = (&TypeName, &[AnnotationDatum])> {
        self.method_data.iter().map(|(t, d)| (t, d.as_slice()))
    }

    /// Field-level data grouped by stored annotation type, sorted by type.
    pub fn fields(&self) -> impl Iterator<Item = (&TypeName, &[AnnotationDatum])> {
        self.field_data.iter().map(|(t, d)| (t, d.as_slice()))
    }

    /// Total number of data across all element kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.class_data.len()
            + self.method_data.values().map(Vec::len).sum::<usize>()
            + self.field_data.values().map(Vec::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for AnnotationsDigest {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.mode == other.mode
            && self.visited == other.visited
            && self.truncated == other.truncated
            && self.class_data == other.class_data
            && self.method_data == other.method_data
            && self.field_data == other.field_data
    }
}

impl Eq for AnnotationsDigest {}

fn lookup<'a>(
    data: &'a BTreeMap<TypeName, Vec<AnnotationDatum>>,
    annotation_type: &TypeName,
) -> &'a [AnnotationDatum] {
    data.get(annotation_type).map(Vec::as_slice).unwrap_or(&[])
}

fn on_member<'a>(
    data: &'a [AnnotationDatum],
    signature: &MemberSignature,
) -> Vec<&'a AnnotationDatum> {
    data.iter()
        .filter(|d| d.element().member.as_ref() == Some(signature))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{ClassWriter, MemberDef, read_class};
    use crate::mapper::MappingTable;

    fn walk_of(classes: Vec<Vec<u8>>) -> Walk {
        Walk {
            classes: classes
                .iter()
                .map(|b| Arc::new(read_class(b).expect("read")))
                .collect(),
            truncated: Vec::new(),
            revisits_skipped: 0,
        }
    }

    fn named(value: &str) -> Annotation {
        Annotation::new("a/Named").with("value", Value::string(value))
    }

    fn sample() -> AnnotationsDigest {
        let child = ClassWriter::new("a/Child")
            .super_class("a/Parent")
            .annotation(named("child"))
            .field(MemberDef::new("port", "I").annotation(Annotation::new("a/Config")))
            .method(MemberDef::new("run", "()V").annotation(Annotation::new("a/Exposed")))
            .to_bytes()
            .expect("write");
        let parent = ClassWriter::new("a/Parent")
            .annotation(named("parent"))
            .annotation(Annotation::new("a/Marker"))
            .method(MemberDef::new("run", "()V").annotation(Annotation::new("a/Exposed")))
            .method(MemberDef::new("stop", "()V").annotation(Annotation::new("a/Exposed")))
            .to_bytes()
            .expect("write");
        AnnotationsDigest::from_walk(&walk_of(vec![child, parent]), WalkMode::Full)
    }

    #[test]
    fn class_data_keeps_every_occurrence_nearest_first() {
        let digest = sample();
        let named_type = TypeName::new("a/Named");
        let all = digest.class_data(&named_type);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].primary_value(), Some(&Value::string("child")));
        assert_eq!(all[1].primary_value(), Some(&Value::string("parent")));
        assert_eq!(digest.class_datum(&named_type), Some(all[0]));
        assert_eq!(digest.class_iter().count(), 3);
    }

    #[test]
    fn inherited_class_annotation_is_found() {
        let digest = sample();
        let marker = digest
            .class_datum(&TypeName::new("a/Marker"))
            .expect("inherited");
        assert_eq!(marker.element().declaring_type.as_str(), "a/Parent");
    }

    #[test]
    fn method_data_accumulates_per_declaration_site() {
        let digest = sample();
        let exposed = TypeName::new("a/Exposed");
        assert_eq!(digest.method_data(&exposed).len(), 3);

        let run = MemberSignature::method("run", "()V");
        let on_run = digest.method_data_on(&exposed, &run);
        let owners: Vec<&str> = on_run
            .iter()
            .map(|d| d.element().declaring_type.as_str())
            .collect();
        assert_eq!(owners, vec!["a/Child", "a/Parent"]);
    }

    #[test]
    fn no_match_is_empty() {
        let digest = sample();
        let nothing = TypeName::new("a/Nothing");
        assert!(digest.method_data(&nothing).is_empty());
        assert!(digest.field_data(&nothing).is_empty());
        assert!(digest.class_datum(&nothing).is_none());
        assert!(
            digest
                .field_data_on(&TypeName::new("a/Config"), &MemberSignature::field("other"))
                .is_empty()
        );
    }

    #[test]
    fn field_data_is_grouped() {
        let digest = sample();
        let config = TypeName::new("a/Config");
        assert_eq!(digest.field_data(&config).len(), 1);
        assert_eq!(
            digest
                .field_data_on(&config, &MemberSignature::field("port"))
                .len(),
            1
        );
        assert_eq!(digest.len(), 7);
    }

    #[test]
    fn primary_value_requires_sole_value_attribute() {
        let datum = AnnotationDatum::new(RawRecord::new(
            ElementRef::of_type(TypeName::new("a/X")),
            named("x").with("other", Value::Int(1)),
            Retention::Visible,
        ));
        assert!(datum.primary_value().is_none());
        assert_eq!(datum.get("other"), Some(&Value::Int(1)));
    }

    #[test]
    fn queries_go_through_the_mapper() {
        let mapper = MappingTable::new().map("old/Named", "a/Named");
        let digest = sample().with_mapper(Arc::new(mapper));
        let datum = digest
            .class_datum(&TypeName::new("old/Named"))
            .expect("mapped");
        assert_eq!(datum.annotation_type().as_str(), "a/Named");
    }

    #[test]
    fn equality_ignores_mapper() {
        let plain = sample();
        let mapped = sample().with_mapper(Arc::new(MappingTable::new().map("x/A", "x/B")));
        assert_eq!(plain, mapped);
    }
}
