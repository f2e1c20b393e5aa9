//! # Configuration
//!
//! Optional TOML configuration for the CLI.
//!
//! ```toml
//! classpath = ["target/classes", "lib/api.jar"]
//!
//! [walk]
//! mode = "full"            # or "direct_only"
//! tolerate_missing = true
//! boundary = ["java/lang/Object", "java/lang/Enum"]
//!
//! [mapping.types]
//! "com/client/Route" = "com/canonical/Route"
//!
//! [mapping.attributes."com/client/Route"]
//! path = "value"
//! ```
//!
//! Command-line flags override values read from the file.

use annodigest_core::{
    ChainProvider, DigestError, DirectoryProvider, JarProvider, MappingTable, TypeName, WalkMode,
    WalkOptions,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

// =============================================================================
// CONFIG FILE
// =============================================================================

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directories and jars searched for class files, in order.
    pub classpath: Vec<PathBuf>,
    pub walk: WalkConfig,
    pub mapping: MappingConfig,
}

/// `[walk]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalkConfig {
    pub mode: WalkMode,
    pub tolerate_missing: bool,
    /// Replaces the default boundary (`java/lang/Object`) when present.
    pub boundary: Option<Vec<String>>,
}

/// `[mapping]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MappingConfig {
    /// Client type to canonical type.
    pub types: BTreeMap<String, String>,
    /// Client type to (client attribute to canonical attribute).
    pub attributes: BTreeMap<String, BTreeMap<String, String>>,
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self, DigestError> {
        toml::from_str(text).map_err(|e| DigestError::ConfigError(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, DigestError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            DigestError::ConfigError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_SIZE {
            return Err(DigestError::ConfigError(format!(
                "Config file {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            DigestError::ConfigError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// Load the file if one was given, otherwise the defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, DigestError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Walk options from the `[walk]` section.
    #[must_use]
    pub fn walk_options(&self) -> WalkOptions {
        let options = WalkOptions::default()
            .with_mode(self.walk.mode)
            .tolerate_missing(self.walk.tolerate_missing);
        match &self.walk.boundary {
            Some(boundary) => options.with_boundary(boundary.iter().map(TypeName::new)),
            None => options,
        }
    }

    /// Mapping table from the `[mapping]` section.
    #[must_use]
    pub fn mapping_table(&self) -> MappingTable {
        let types = self
            .mapping
            .types
            .iter()
            .map(|(client, canonical)| (TypeName::new(client), TypeName::new(canonical)))
            .collect();
        let attributes = self
            .mapping
            .attributes
            .iter()
            .map(|(client, renames)| (TypeName::new(client), renames.clone()))
            .collect();
        MappingTable::explicit(types, attributes)
    }
}

// =============================================================================
// CLASSPATH
// =============================================================================

/// Build a provider over classpath entries, searched in order.
///
/// Directories are read as class-file trees; files ending in `.jar` or
/// `.zip` are read as archives. Anything else is a configuration error.
pub fn build_classpath(entries: &[PathBuf]) -> Result<ChainProvider, DigestError> {
    let mut chain = ChainProvider::new();
    for entry in entries {
        if entry.is_dir() {
            chain.push(DirectoryProvider::new(entry)?);
        } else if is_archive(entry) {
            chain.push(JarProvider::open(entry)?);
        } else {
            return Err(DigestError::ConfigError(format!(
                "Classpath entry '{}' is neither a directory nor a jar",
                entry.display()
            )));
        }
    }
    Ok(chain)
}

fn is_archive(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jar") || e.eq_ignore_ascii_case("zip"))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use annodigest_core::Mapper;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.walk_options(), WalkOptions::default());
        assert!(config.mapping_table().is_empty());
    }

    #[test]
    fn walk_section_is_applied() {
        let config = Config::parse(
            r#"
            [walk]
            mode = "direct_only"
            tolerate_missing = true
            boundary = ["java/lang/Object", "java.lang.Enum"]
            "#,
        )
        .expect("parse");
        let options = config.walk_options();
        assert_eq!(options.mode, WalkMode::DirectOnly);
        assert!(options.tolerate_missing);
        assert!(options.boundary.contains(&TypeName::new("java/lang/Enum")));
    }

    #[test]
    fn mapping_section_builds_table() {
        let config = Config::parse(
            r#"
            [mapping.types]
            "b/B" = "c/C"

            [mapping.attributes."b/B"]
            movie = "value"
            "#,
        )
        .expect("parse");
        let table = config.mapping_table();
        assert_eq!(table.map_type(&TypeName::new("b/B")), TypeName::new("c/C"));
        assert_eq!(table.map_attribute(&TypeName::new("b/B"), "movie"), "value");
        assert_eq!(table.map_attribute(&TypeName::new("b/B"), "other"), "other");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::parse("colour = 3").expect_err("unknown key");
        assert!(matches!(err, DigestError::ConfigError(_)));

        let err = Config::parse("[walk]\nmode = \"sideways\"").expect_err("bad mode");
        assert!(matches!(err, DigestError::ConfigError(_)));
    }

    #[test]
    fn classpath_rejects_plain_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"x").expect("write");
        assert!(matches!(
            build_classpath(&[file]),
            Err(DigestError::ConfigError(_))
        ));
        let chain = build_classpath(&[dir.path().to_path_buf()]).expect("dir entry");
        assert_eq!(chain.len(), 1);
    }
}
