//! # Session Module
//!
//! Digest construction entry points.
//!
//! A `Session` ties together a class provider, walk options and a mapper,
//! and caches parsed classes in memory so that digests of related types
//! share ancestor parsing. The cache lives as long as the session and is
//! never written anywhere.
//!
//! ## Entry Points
//!
//! - `digest(type)`: root and ancestors resolved through the provider
//! - `digest_bytes(bytes)`: root supplied directly, ancestors through the provider
//! - `digest_of(instance)`: the runtime type of a `Described` value

use crate::classfile::{ClassInfo, read_class};
use crate::digest::{AnnotationDatum, AnnotationsDigest};
use crate::hierarchy::{WalkMode, WalkOptions, walk};
use crate::mapper::{IdentityMapper, Mapper};
use crate::provider::ClassProvider;
use crate::shape::derive_shape;
use crate::view::{FromView, Shape, View};
use crate::{DigestError, TypeName};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// A value that knows its runtime type.
///
/// The live-instance shortcut: `Session::digest_of` builds the digest of
/// whatever type the value reports.
pub trait Described {
    fn type_name(&self) -> TypeName;
}

/// A digesting session.
pub struct Session {
    provider: Arc<dyn ClassProvider>,
    options: WalkOptions,
    mapper: Arc<dyn Mapper>,
    /// Parsed classes by name. Shared by every digest built in this session.
    cache: RwLock<BTreeMap<TypeName, Arc<ClassInfo>>>,
}

impl Session {
    /// Create a session with default walk options and the identity mapper.
    pub fn new(provider: impl ClassProvider + 'static) -> Self {
        Self::from_shared(Arc::new(provider))
    }

    /// Create a session over an already shared provider.
    pub fn from_shared(provider: Arc<dyn ClassProvider>) -> Self {
        Self {
            provider,
            options: WalkOptions::default(),
            mapper: Arc::new(IdentityMapper),
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_mapper(mut self, mapper: impl Mapper + 'static) -> Self {
        self.mapper = Arc::new(mapper);
        self
    }

    #[must_use]
    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    #[must_use]
    pub fn mapper(&self) -> &Arc<dyn Mapper> {
        &self.mapper
    }

    // =========================================================================
    // CLASS CACHE
    // =========================================================================

    /// Parse a class through the provider, or return the cached parse.
    ///
    /// `Ok(None)` if the provider does not know the type.
    pub fn class_info(&self, type_name: &TypeName) -> Result<Option<Arc<ClassInfo>>, DigestError> {
        {
            let cache = self.cache.read().map_err(|_| poisoned())?;
            if let Some(info) = cache.get(type_name) {
                return Ok(Some(info.clone()));
            }
        }

        let Some(bytes) = self.provider.class_bytes(type_name)? else {
            return Ok(None);
        };
        let info = read_class(&bytes)?;
        if &info.name != type_name {
            return Err(DigestError::ProviderError(format!(
                "provider returned {} when asked for {}",
                info.name, type_name
            )));
        }

        let info = Arc::new(info);
        let mut cache = self.cache.write().map_err(|_| poisoned())?;
        let entry = cache.entry(type_name.clone()).or_insert(info);
        Ok(Some(entry.clone()))
    }

    /// Number of classes parsed so far.
    pub fn cached_count(&self) -> Result<usize, DigestError> {
        let cache = self.cache.read().map_err(|_| poisoned())?;
        Ok(cache.len())
    }

    /// Drop every cached parse.
    pub fn clear(&self) -> Result<(), DigestError> {
        self.cache.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }

    // =========================================================================
    // DIGESTS
    // =========================================================================

    /// Digest a type using the session's walk mode.
    ///
    /// # Errors
    ///
    /// `UnresolvableType` if the provider does not know `type_name`; walk and
    /// reader errors otherwise.
    pub fn digest(&self, type_name: &TypeName) -> Result<AnnotationsDigest, DigestError> {
        self.digest_with_mode(type_name, self.options.mode)
    }

    /// Digest a type with an explicit walk mode.
    pub fn digest_with_mode(
        &self,
        type_name: &TypeName,
        mode: WalkMode,
    ) -> Result<AnnotationsDigest, DigestError> {
        let root = self
            .class_info(type_name)?
            .ok_or_else(|| DigestError::UnresolvableType(type_name.clone()))?;
        self.digest_root(root, mode)
    }

    /// Digest a class whose bytes the caller already holds.
    ///
    /// Ancestors are still resolved through the provider.
    pub fn digest_bytes(&self, bytes: &[u8]) -> Result<AnnotationsDigest, DigestError> {
        self.digest_bytes_with_mode(bytes, self.options.mode)
    }

    pub fn digest_bytes_with_mode(
        &self,
        bytes: &[u8],
        mode: WalkMode,
    ) -> Result<AnnotationsDigest, DigestError> {
        let root = Arc::new(read_class(bytes)?);
        self.digest_root(root, mode)
    }

    /// Digest the runtime type of a live value.
    pub fn digest_of(&self, instance: &dyn Described) -> Result<AnnotationsDigest, DigestError> {
        self.digest(&instance.type_name())
    }

    fn digest_root(
        &self,
        root: Arc<ClassInfo>,
        mode: WalkMode,
    ) -> Result<AnnotationsDigest, DigestError> {
        let options = self.options.clone().with_mode(mode);
        let walked = walk(root, &options, |name| self.class_info(name))?;
        Ok(AnnotationsDigest::from_walk(&walked, mode).with_mapper(self.mapper.clone()))
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    /// View a datum through a shape, using the session's mapper.
    #[must_use]
    pub fn view(&self, datum: &AnnotationDatum, shape: Arc<Shape>) -> View {
        View::new(datum, shape, self.mapper.clone())
    }

    /// Read a datum into a typed value.
    pub fn view_as<T: FromView>(&self, datum: &AnnotationDatum) -> Result<T, DigestError> {
        T::from_view(&self.view(datum, Arc::new(T::shape())))
    }

    /// Derive the shape of an annotation interface known to the provider.
    pub fn shape_of(&self, annotation_type: &TypeName) -> Result<Shape, DigestError> {
        let class = self
            .class_info(annotation_type)?
            .ok_or_else(|| DigestError::UnresolvableType(annotation_type.clone()))?;
        derive_shape(&class, |name| self.class_info(name))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("mapper", &self.mapper)
            .field("cached", &self.cached_count().ok())
            .finish()
    }
}

fn poisoned() -> DigestError {
    DigestError::ProviderError("class cache lock poisoned".to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{ClassWriter, MemberDef};
    use crate::mapper::MappingTable;
    use crate::provider::MemoryProvider;
    use crate::view::ValueKind;
    use crate::{Annotation, Value};

    fn provider() -> MemoryProvider {
        let base = ClassWriter::new("a/Base")
            .annotation(Annotation::new("a/Named").with("value", Value::string("base")))
            .method(MemberDef::new("f", "()V").annotation(Annotation::new("a/M")))
            .to_bytes()
            .expect("base");
        let child = ClassWriter::new("a/Child")
            .super_class("a/Base")
            .method(MemberDef::new("f", "()V").annotation(Annotation::new("a/M")))
            .to_bytes()
            .expect("child");
        MemoryProvider::new()
            .with_class(base)
            .and_then(|p| p.with_class(child))
            .expect("provider")
    }

    struct Widget;

    impl Described for Widget {
        fn type_name(&self) -> TypeName {
            TypeName::new("a.Child")
        }
    }

    struct Named {
        value: String,
    }

    impl FromView for Named {
        fn shape() -> Shape {
            Shape::new("a/Named").accessor("value", ValueKind::String)
        }

        fn from_view(view: &View) -> Result<Self, DigestError> {
            Ok(Self {
                value: view.get_str("value")?,
            })
        }
    }

    #[test]
    fn full_and_direct_digests() {
        let session = Session::new(provider());
        let child = TypeName::new("a/Child");
        let m = TypeName::new("a/M");

        let full = session.digest(&child).expect("full");
        assert_eq!(full.method_data(&m).len(), 2);
        assert_eq!(full.visited().len(), 2);

        let direct = session
            .digest_with_mode(&child, WalkMode::DirectOnly)
            .expect("direct");
        assert_eq!(direct.method_data(&m).len(), 1);
        assert_eq!(direct.visited(), &[child]);
    }

    #[test]
    fn classes_are_cached() {
        let session = Session::new(provider());
        session.digest(&TypeName::new("a/Child")).expect("digest");
        assert_eq!(session.cached_count(), Ok(2));
        session.clear().expect("clear");
        assert_eq!(session.cached_count(), Ok(0));
    }

    #[test]
    #[allow(clippy::panic)]
    fn poisoned_cache_fails_every_operation() {
        let session = Session::new(provider());
        let crashed = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = session.cache.write();
                panic!("worker died holding the cache");
            })
            .join()
        });
        assert!(crashed.is_err());

        assert_eq!(session.cached_count(), Err(poisoned()));
        assert_eq!(session.clear(), Err(poisoned()));
        assert!(matches!(
            session.digest(&TypeName::new("a/Child")),
            Err(DigestError::ProviderError(_))
        ));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn session_and_digests_are_shared_across_threads() {
        assert_send_sync::<Session>();
        assert_send_sync::<AnnotationsDigest>();
        assert_send_sync::<View>();

        let session = Session::new(provider());
        let child = TypeName::new("a/Child");
        let first = session.digest(&child).expect("digest");

        let (session, child, shared) = (&session, &child, &first);
        let digests: Vec<AnnotationsDigest> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(move || {
                        let datum = shared
                            .class_datum(&TypeName::new("a/Named"))
                            .expect("inherited");
                        let named: Named = session.view_as(datum).expect("view");
                        assert_eq!(named.value, "base");
                        session.digest(child).expect("digest")
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().expect("worker"))
                .collect()
        });

        assert_eq!(digests.len(), 4);
        assert!(digests.iter().all(|d| d == shared));
        assert_eq!(session.cached_count(), Ok(2));
    }

    #[test]
    fn unknown_root_is_unresolvable_type() {
        let session = Session::new(provider());
        assert_eq!(
            session.digest(&TypeName::new("a/Nope")),
            Err(DigestError::UnresolvableType(TypeName::new("a/Nope")))
        );
    }

    #[test]
    fn digest_bytes_resolves_ancestors() {
        let session = Session::new(provider());
        let bytes = ClassWriter::new("a/Loose")
            .super_class("a/Base")
            .to_bytes()
            .expect("loose");
        let digest = session.digest_bytes(&bytes).expect("digest");
        assert_eq!(digest.root().as_str(), "a/Loose");
        assert!(digest.class_datum(&TypeName::new("a/Named")).is_some());
    }

    #[test]
    fn digest_of_uses_runtime_type() {
        let session = Session::new(provider());
        let digest = session.digest_of(&Widget).expect("digest");
        assert_eq!(digest.root().as_str(), "a/Child");
    }

    #[test]
    fn typed_view_through_session() {
        let session = Session::new(provider());
        let digest = session.digest(&TypeName::new("a/Child")).expect("digest");
        let datum = digest
            .class_datum(&TypeName::new("a/Named"))
            .expect("inherited");
        let named: Named = session.view_as(datum).expect("view");
        assert_eq!(named.value, "base");
    }

    #[test]
    fn session_mapper_reaches_digest_and_views() {
        let mapper = MappingTable::new()
            .map("old/Label", "a/Named")
            .rename("old/Label", "text", "value");
        let session = Session::new(provider()).with_mapper(mapper);
        let digest = session.digest(&TypeName::new("a/Child")).expect("digest");
        let datum = digest
            .class_datum(&TypeName::new("old/Label"))
            .expect("mapped");
        let shape = Arc::new(Shape::new("old/Label").accessor("text", ValueKind::String));
        let view = session.view(datum, shape);
        assert_eq!(view.get_str("text").expect("text"), "base");
    }

    #[test]
    fn provider_returning_wrong_class_is_an_error() {
        let mut provider = MemoryProvider::new();
        provider.insert_named(
            "a/Claimed",
            ClassWriter::new("a/Actual").to_bytes().expect("bytes"),
        );
        let session = Session::new(provider);
        assert!(matches!(
            session.digest(&TypeName::new("a/Claimed")),
            Err(DigestError::ProviderError(_))
        ));
    }
}
