//! # annodigest CLI Module
//!
//! This module implements the CLI interface for annodigest.
//!
//! ## Available Commands
//!
//! - `records` - Print the annotation records stored in one class file
//! - `digest` - Build the annotation digest of a type
//! - `view` - Resolve a type's annotation through the annotation's own shape
//! - `shape` - Derive the shape of an annotation interface
//! - `export` - Export a digest to the canonical binary format
//! - `verify` - Check a canonical export, optionally against a fresh digest
//! - `hash` - Compute the BLAKE3 hash of a type's canonical digest

mod commands;

use crate::config::{Config, build_classpath};
use annodigest_core::{DigestError, Session, WalkMode};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// annodigest - JVM annotation digests
///
/// Reads annotations straight out of class files and merges them across
/// superclasses and interfaces.
#[derive(Parser, Debug)]
#[command(name = "annodigest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Classpath entries (directories or jars), searched in order
    #[arg(short = 'c', long = "classpath", global = true, value_delimiter = ',')]
    pub classpath: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Walk flags shared by every command that builds a digest.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct WalkArgs {
    /// Only the type's own declarations, no ancestors
    #[arg(long)]
    pub direct: bool,

    /// Truncate the walk at ancestors missing from the classpath
    #[arg(long)]
    pub tolerate_missing: bool,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the annotation records stored in one class file
    Records {
        /// Path to a .class file
        file: PathBuf,
    },

    /// Build the annotation digest of a type
    Digest {
        /// Type name (com.example.Foo or com/example/Foo)
        type_name: String,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Resolve a type's class-level annotation through the annotation's shape
    View {
        /// Annotated type
        type_name: String,

        /// Annotation interface (must be on the classpath)
        annotation: String,

        /// Show every occurrence instead of the nearest one
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Derive the shape of an annotation interface
    Shape {
        /// Annotation interface
        annotation: String,
    },

    /// Export a digest to the canonical binary format
    Export {
        /// Type to digest
        type_name: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Check a canonical export file
    Verify {
        /// Export file
        file: PathBuf,

        /// Also compare against a fresh digest of this type
        #[arg(long)]
        against: Option<String>,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Compute the BLAKE3 hash of a type's canonical digest
    Hash {
        /// Type to digest
        type_name: String,

        #[command(flatten)]
        walk: WalkArgs,
    },
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Global flags merged over the configuration file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub json_mode: bool,
    pub verbose: bool,
}

impl Settings {
    /// Load the configuration file (if any) and apply global flags.
    pub fn from_cli(cli: &Cli) -> Result<Self, DigestError> {
        let mut config = Config::load_optional(cli.config.as_deref())?;
        if !cli.classpath.is_empty() {
            config.classpath = cli.classpath.clone();
        }
        Ok(Self {
            config,
            json_mode: cli.json_mode,
            verbose: cli.verbose,
        })
    }

    /// Open a session over the classpath with walk flags applied.
    pub fn session(&self, walk: WalkArgs) -> Result<Session, DigestError> {
        if self.config.classpath.is_empty() {
            return Err(DigestError::ConfigError(
                "No classpath given (use --classpath or a config file)".to_string(),
            ));
        }
        let provider = build_classpath(&self.config.classpath)?;
        tracing::debug!("Classpath: {} entries", provider.len());

        let mut options = self.config.walk_options();
        if walk.direct {
            options = options.with_mode(WalkMode::DirectOnly);
        }
        if walk.tolerate_missing {
            options = options.tolerate_missing(true);
        }

        Ok(Session::new(provider)
            .with_options(options)
            .with_mapper(self.config.mapping_table()))
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Execute the CLI command.
pub fn execute(cli: Cli) -> Result<(), DigestError> {
    let settings = Settings::from_cli(&cli)?;

    match cli.command {
        Commands::Records { file } => cmd_records(&settings, &file),
        Commands::Digest { type_name, walk } => cmd_digest(&settings, &type_name, walk),
        Commands::View {
            type_name,
            annotation,
            all,
            walk,
        } => cmd_view(&settings, &type_name, &annotation, all, walk),
        Commands::Shape { annotation } => cmd_shape(&settings, &annotation),
        Commands::Export {
            type_name,
            output,
            walk,
        } => cmd_export(&settings, &type_name, &output, walk),
        Commands::Verify {
            file,
            against,
            walk,
        } => cmd_verify(&settings, &file, against.as_deref(), walk),
        Commands::Hash { type_name, walk } => cmd_hash(&settings, &type_name, walk),
    }
}
