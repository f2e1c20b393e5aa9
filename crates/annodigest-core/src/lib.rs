//! # annodigest-core
//!
//! The deterministic annotation-digest engine.
//!
//! Reads annotations straight out of JVM class files, merges them across a
//! type's superclasses and interfaces into an [`AnnotationsDigest`], and
//! presents individual occurrences through caller-declared shapes.
//!
//! ## Pipeline
//!
//! ```text
//! class bytes ──► reader ──► RawRecord*
//!                              │
//! ClassProvider ──► hierarchy walk ──► AnnotationsDigest ──► View (Shape, Mapper)
//! ```
//!
//! ## Architectural Constraints
//!
//! - No async, no network, no logging dependency
//! - Deterministic: BTreeMap only, same bytes always give the same digest
//! - Never panics on malformed input; every failure is a `DigestError`
//! - Parsed classes are cached per `Session` only, never across runs

// =============================================================================
// MODULES
// =============================================================================

pub mod classfile;
pub mod digest;
pub mod export;
pub mod hierarchy;
pub mod mapper;
pub mod primitives;
pub mod provider;
pub mod session;
pub mod shape;
pub mod types;
pub mod view;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Annotation, DigestError, ElementKind, ElementRef, MemberSignature, RawRecord, Retention,
    TypeName, Value,
};

// =============================================================================
// RE-EXPORTS: Reader & Resolver
// =============================================================================

pub use classfile::{ClassInfo, ClassWriter, MemberDef, MemberInfo, read_class, read_records};
pub use digest::{AnnotationDatum, AnnotationsDigest};
pub use hierarchy::{TruncatedAncestor, Walk, WalkMode, WalkOptions, walk};
pub use provider::{ChainProvider, ClassProvider, DirectoryProvider, JarProvider, MemoryProvider};
pub use session::{Described, Session};

// =============================================================================
// RE-EXPORTS: Views & Mapping
// =============================================================================

pub use mapper::{IdentityMapper, Mapper, MappingTable};
pub use shape::{derive_shape, shape_from_class};
pub use view::{Accessor, FromView, Shape, ValueKind, View, ViewValue};

// =============================================================================
// RE-EXPORTS: Export
// =============================================================================

#[cfg(feature = "crypto-hash")]
pub use export::canonical_hash;
pub use export::{
    CanonicalDigest, CanonicalHeader, CanonicalNode, CanonicalRecord, canonical_checksum,
    export_canonical, import_canonical, verify_canonical,
};
