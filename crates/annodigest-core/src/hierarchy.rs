//! # Hierarchy Resolver
//!
//! Walks a type's ancestors in the fixed order the digest relies on:
//!
//! ```text
//! visit(T):
//!     T
//!     visit(superclass of T)
//!     visit(each interface of T, in declaration order)
//! ```
//!
//! A type already visited in the current walk is skipped, so cyclic or
//! diamond-shaped graphs terminate. Boundary types (by default
//! `java/lang/Object`) are never loaded.

use crate::classfile::ClassInfo;
use crate::primitives::OBJECT_TYPE;
use crate::{DigestError, TypeName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

// =============================================================================
// WALK OPTIONS
// =============================================================================

/// How far a digest looks beyond the root type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkMode {
    /// Root, superclasses and interfaces, recursively.
    #[default]
    Full,
    /// Only the root type's own declarations.
    DirectOnly,
}

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    pub mode: WalkMode,
    /// Truncate the walk at ancestors the provider cannot find instead of failing.
    pub tolerate_missing: bool,
    /// Types that are never loaded or visited.
    pub boundary: BTreeSet<TypeName>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            mode: WalkMode::Full,
            tolerate_missing: false,
            boundary: BTreeSet::from([TypeName::new(OBJECT_TYPE)]),
        }
    }
}

impl WalkOptions {
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn direct_only() -> Self {
        Self {
            mode: WalkMode::DirectOnly,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: WalkMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn tolerate_missing(mut self, tolerate: bool) -> Self {
        self.tolerate_missing = tolerate;
        self
    }

    /// Replace the boundary set.
    #[must_use]
    pub fn with_boundary(mut self, boundary: impl IntoIterator<Item = TypeName>) -> Self {
        self.boundary = boundary.into_iter().collect();
        self
    }
}

// =============================================================================
// WALK RESULT
// =============================================================================

/// An ancestor that was referenced but could not be found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TruncatedAncestor {
    pub ancestor: TypeName,
    pub referenced_by: TypeName,
}

/// Types visited by one walk, in visitation order.
#[derive(Debug, Clone, Default)]
pub struct Walk {
    pub classes: Vec<Arc<ClassInfo>>,
    pub truncated: Vec<TruncatedAncestor>,
    /// References skipped because their target had already been visited.
    pub revisits_skipped: usize,
}

impl Walk {
    /// Names of visited types in visitation order.
    #[must_use]
    pub fn visited(&self) -> Vec<TypeName> {
        self.classes.iter().map(|c| c.name.clone()).collect()
    }
}

// =============================================================================
// WALK
// =============================================================================

/// Walk the hierarchy rooted at `root`.
///
/// `load` resolves an ancestor name to its parsed class, `Ok(None)` meaning
/// not found.
///
/// # Errors
///
/// `UnresolvableAncestor` for a missing ancestor unless
/// `options.tolerate_missing` is set; any error from `load` is propagated.
pub fn walk<F>(
    root: Arc<ClassInfo>,
    options: &WalkOptions,
    mut load: F,
) -> Result<Walk, DigestError>
where
    F: FnMut(&TypeName) -> Result<Option<Arc<ClassInfo>>, DigestError>,
{
    let mut result = Walk::default();
    let mut visited: BTreeSet<TypeName> = BTreeSet::new();
    visited.insert(root.name.clone());

    if options.mode == WalkMode::DirectOnly {
        result.classes.push(root);
        return Ok(result);
    }

    // Explicit stack: children are pushed in reverse so the superclass
    // subtree is finished before the first interface is taken.
    let mut stack: Vec<(TypeName, TypeName)> = Vec::new();
    push_ancestors(&mut stack, &root);
    result.classes.push(root);

    while let Some((name, referenced_by)) = stack.pop() {
        if options.boundary.contains(&name) {
            continue;
        }
        if visited.contains(&name) {
            result.revisits_skipped += 1;
            continue;
        }

        match load(&name)? {
            Some(class) => {
                visited.insert(name);
                push_ancestors(&mut stack, &class);
                result.classes.push(class);
            }
            None if options.tolerate_missing => {
                visited.insert(name.clone());
                result.truncated.push(TruncatedAncestor {
                    ancestor: name,
                    referenced_by,
                });
            }
            None => {
                return Err(DigestError::UnresolvableAncestor {
                    ancestor: name,
                    referenced_by,
                });
            }
        }
    }

    Ok(result)
}

fn push_ancestors(stack: &mut Vec<(TypeName, TypeName)>, class: &ClassInfo) {
    let ancestors: Vec<&TypeName> = class.direct_ancestors().collect();
    for ancestor in ancestors.into_iter().rev() {
        stack.push((ancestor.clone(), class.name.clone()));
    }
}

// =============================================================================
// TESTS
// =============================================================================
