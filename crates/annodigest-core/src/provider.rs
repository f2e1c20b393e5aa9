//! # Class Providers
//!
//! The collaborator that turns a type name into class file bytes.
//!
//! The hierarchy walk asks a provider for every ancestor it visits, so
//! providers must be safe for concurrent lookup (`Send + Sync`). Providers
//! that wrap a non-shareable handle serialize access internally.
//!
//! - `MemoryProvider`: bytes held in memory, keyed by type name
//! - `DirectoryProvider`: a classpath directory (`a/b/C.class`)
//! - `JarProvider`: a jar or zip archive
//! - `ChainProvider`: first hit across several providers, classpath style

use crate::classfile::read_class;
use crate::primitives::MAX_CLASS_FILE_SIZE;
use crate::{DigestError, TypeName};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// =============================================================================
// CLASSPROVIDER TRAIT
// =============================================================================

/// Resolves a type name to the bytes of its class file.
pub trait ClassProvider: Send + Sync {
    /// Return the class bytes, or `Ok(None)` if this provider does not know the type.
    ///
    /// Errors are reserved for lookups that were attempted and failed
    /// (unreadable file, corrupt archive).
    fn class_bytes(&self, type_name: &TypeName) -> Result<Option<Vec<u8>>, DigestError>;
}

impl<P: ClassProvider + ?Sized> ClassProvider for Arc<P> {
    fn class_bytes(&self, type_name: &TypeName) -> Result<Option<Vec<u8>>, DigestError> {
        (**self).class_bytes(type_name)
    }
}

impl<P: ClassProvider + ?Sized> ClassProvider for Box<P> {
    fn class_bytes(&self, type_name: &TypeName) -> Result<Option<Vec<u8>>, DigestError> {
        (**self).class_bytes(type_name)
    }
}

/// Path of a class inside a classpath root (`a/b/C.class`).
///
/// `None` for names that cannot denote a class file under the root:
/// absolute names, empty segments, `.` or `..` segments, and segments
/// carrying path separators or drive prefixes.
fn class_entry_name(type_name: &TypeName) -> Option<String> {
    let name = type_name.as_str();
    let valid = name.split('/').all(|segment| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && !segment.contains(['\\', ':', '\0'])
    });
    valid.then(|| format!("{name}.class"))
}

/// Read at most `limit + 1` bytes, so oversized input is still rejected
/// by the reader without being buffered whole.
fn read_capped(source: impl Read, limit: usize, capacity: u64) -> std::io::Result<Vec<u8>> {
    let limit = limit as u64;
    let mut bytes = Vec::with_capacity(capacity.min(limit + 1) as usize);
    source.take(limit + 1).read_to_end(&mut bytes)?;
    Ok(bytes)
}

// =============================================================================
// MEMORY PROVIDER
// =============================================================================

/// Class bytes held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    classes: BTreeMap<TypeName, Arc<[u8]>>,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add class bytes, keyed by the class name read from the bytes.
    pub fn insert(&mut self, bytes: Vec<u8>) -> Result<TypeName, DigestError> {
        let name = read_class(&bytes)?.name;
        self.classes.insert(name.clone(), bytes.into());
        Ok(name)
    }

    /// Add class bytes under an explicit name without parsing them.
    pub fn insert_named(&mut self, type_name: impl Into<TypeName>, bytes: Vec<u8>) {
        self.classes.insert(type_name.into(), bytes.into());
    }

    /// Builder-style `insert`.
    pub fn with_class(mut self, bytes: Vec<u8>) -> Result<Self, DigestError> {
        self.insert(bytes)?;
        Ok(self)
    }

    #[must_use]
    pub fn contains(&self, type_name: &TypeName) -> bool {
        self.classes.contains_key(type_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassProvider for MemoryProvider {
    fn class_bytes(&self, type_name: &TypeName) -> Result<Option<Vec<u8>>, DigestError> {
        Ok(self.classes.get(type_name).map(|bytes| bytes.to_vec()))
    }
}

// =============================================================================
// DIRECTORY PROVIDER
// =============================================================================

/// A classpath directory laid out by package.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    /// Open a classpath directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, DigestError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(DigestError::IoError(format!(
                "classpath directory '{}' does not exist",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ClassProvider for DirectoryProvider {
    fn class_bytes(&self, type_name: &TypeName) -> Result<Option<Vec<u8>>, DigestError> {
        let Some(entry) = class_entry_name(type_name) else {
            return Ok(None);
        };
        let path = self.root.join(entry);
        let read_error = |e: std::io::Error| {
            DigestError::IoError(format!("cannot read '{}': {}", path.display(), e))
        };

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(read_error(e)),
        };
        let size = file.metadata().map_err(read_error)?.len();
        read_capped(file, MAX_CLASS_FILE_SIZE, size)
            .map(Some)
            .map_err(read_error)
    }
}

// =============================================================================
// JAR PROVIDER
// =============================================================================

/// A jar (or any zip) archive on the classpath.
///
/// `ZipArchive` needs `&mut` for every read, so lookups are serialized
/// through a mutex.
pub struct JarProvider {
    path: PathBuf,
    archive: Mutex<zip::ZipArchive<File>>,
}

impl JarProvider {
    /// Open an archive and read its central directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DigestError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            DigestError::IoError(format!("cannot open '{}': {}", path.display(), e))
        })?;
        let archive = zip::ZipArchive::new(file).map_err(|e| {
            DigestError::ProviderError(format!("'{}' is not a valid archive: {}", path.display(), e))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            archive: Mutex::new(archive),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for JarProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JarProvider")
            .field("path", &self.path)
            .finish()
    }
}

impl ClassProvider for JarProvider {
    fn class_bytes(&self, type_name: &TypeName) -> Result<Option<Vec<u8>>, DigestError> {
        let mut archive = self
            .archive
            .lock()
            .map_err(|_| DigestError::ProviderError("archive lock poisoned".to_string()))?;

        let Some(name) = class_entry_name(type_name) else {
            return Ok(None);
        };
        let mut entry = match archive.by_name(&name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(DigestError::ProviderError(format!(
                    "cannot read {} from '{}': {}",
                    type_name,
                    self.path.display(),
                    e
                )));
            }
        };

        // Declared sizes are untrusted; they only size the first allocation.
        let declared = entry.size();
        let bytes = read_capped(&mut entry, MAX_CLASS_FILE_SIZE, declared).map_err(|e| {
            DigestError::IoError(format!(
                "cannot inflate {} from '{}': {}",
                type_name,
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(bytes))
    }
}

// =============================================================================
// CHAIN PROVIDER
// =============================================================================

/// Consults providers in order and returns the first hit.
#[derive(Default)]
pub struct ChainProvider {
    providers: Vec<Box<dyn ClassProvider>>,
}

impl ChainProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider (builder style).
    #[must_use]
    pub fn with(mut self, provider: impl ClassProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn push(&mut self, provider: impl ClassProvider + 'static) {
        self.providers.push(Box::new(provider));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ChainProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainProvider")
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl ClassProvider for ChainProvider {
    fn class_bytes(&self, type_name: &TypeName) -> Result<Option<Vec<u8>>, DigestError> {
        for provider in &self.providers {
            if let Some(bytes) = provider.class_bytes(type_name)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

// =============================================================================
// TESTS
// =============================================================================
