//! # Type/Attribute Mapper
//!
//! Translates the annotation vocabulary a caller expects into the canonical
//! vocabulary stored in class files, e.g. when an annotation type was renamed
//! between versions and old client shapes must keep working.
//!
//! Lookups never fail: a name with no explicit entry maps to itself.

use crate::TypeName;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Maps client-side annotation types and attribute names to stored ones.
pub trait Mapper: Send + Sync + fmt::Debug {
    /// Canonical type for a client-expected annotation type.
    fn map_type(&self, client: &TypeName) -> TypeName {
        client.clone()
    }

    /// Canonical attribute name for an attribute of a client-expected type.
    fn map_attribute(&self, client: &TypeName, attribute: &str) -> String {
        let _ = client;
        attribute.to_string()
    }
}

/// Maps every type and attribute to itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityMapper;

impl Mapper for IdentityMapper {}

/// Explicit lookup table.
///
/// `{B → C, B.movie → value}` makes `map_type(B) == C` and
/// `map_attribute(B, "movie") == "value"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTable {
    types: BTreeMap<TypeName, TypeName>,
    attributes: BTreeMap<TypeName, BTreeMap<String, String>>,
}

impl MappingTable {
    /// An empty table (behaves as identity).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every listed type maps to itself.
    ///
    /// Used to declare an already-canonical vocabulary; `contains_type`
    /// then tells whether a type belongs to it.
    #[must_use]
    pub fn self_mapping(types: impl IntoIterator<Item = TypeName>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.clone(), t)).collect(),
            attributes: BTreeMap::new(),
        }
    }

    /// A table from explicit type and per-type attribute renames.
    #[must_use]
    pub fn explicit(
        types: BTreeMap<TypeName, TypeName>,
        attributes: BTreeMap<TypeName, BTreeMap<String, String>>,
    ) -> Self {
        Self { types, attributes }
    }

    /// Add a type mapping (builder style).
    #[must_use]
    pub fn map(mut self, client: impl Into<TypeName>, canonical: impl Into<TypeName>) -> Self {
        self.types.insert(client.into(), canonical.into());
        self
    }

    /// Add an attribute rename for a client type (builder style).
    #[must_use]
    pub fn rename(
        mut self,
        client: impl Into<TypeName>,
        attribute: impl Into<String>,
        canonical: impl Into<String>,
    ) -> Self {
        self.attributes
            .entry(client.into())
            .or_default()
            .insert(attribute.into(), canonical.into());
        self
    }

    /// Whether the table has an explicit entry for this type.
    #[must_use]
    pub fn contains_type(&self, client: &TypeName) -> bool {
        self.types.contains_key(client)
    }

    /// Types with an explicit entry, in sorted order.
    #[must_use]
    pub fn types(&self) -> BTreeSet<&TypeName> {
        self.types.keys().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.attributes.is_empty()
    }
}

impl Mapper for MappingTable {
    fn map_type(&self, client: &TypeName) -> TypeName {
        self.types
            .get(client)
            .cloned()
            .unwrap_or_else(|| client.clone())
    }

    fn map_attribute(&self, client: &TypeName, attribute: &str) -> String {
        self.attributes
            .get(client)
            .and_then(|renames| renames.get(attribute))
            .cloned()
            .unwrap_or_else(|| attribute.to_string())
    }
}
