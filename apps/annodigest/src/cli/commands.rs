//! # CLI Command Implementations
//!
//! Each `cmd_*` function runs one subcommand and prints its result.
//! The report builders beside them do the work and are what tests call.

use super::{Settings, WalkArgs};
use crate::output::{DigestReport, RecordReport, ShapeReport, ViewReport};
use annodigest_core::primitives::{MAX_CLASS_FILE_SIZE, MAX_EXPORT_SIZE};
use annodigest_core::{
    AnnotationsDigest, DigestError, Session, TypeName, canonical_checksum, canonical_hash,
    export_canonical, import_canonical, read_records, verify_canonical,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// SECURITY HELPERS
// =============================================================================

/// Validate file size before reading to prevent memory exhaustion.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), DigestError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| DigestError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(DigestError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate that an input path exists and is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, DigestError> {
    let canonical = path.canonicalize().map_err(|e| {
        DigestError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(DigestError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Validate an output path: its parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, DigestError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        DigestError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    let file_name = path.file_name().ok_or_else(|| {
        DigestError::IoError(format!("Output path '{}' has no file name", path.display()))
    })?;

    Ok(canonical_parent.join(file_name))
}

/// Read a validated input file.
fn read_input(path: &Path, max_size: usize) -> Result<Vec<u8>, DigestError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, max_size as u64)?;
    std::fs::read(&path).map_err(|e| DigestError::IoError(e.to_string()))
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// REPORT BUILDERS
// =============================================================================

/// Records stored in one class file.
pub fn records_report(file: &Path) -> Result<Vec<RecordReport>, DigestError> {
    let bytes = read_input(file, MAX_CLASS_FILE_SIZE)?;
    let records = read_records(&bytes)?;
    tracing::debug!("{}: {} records", file.display(), records.len());
    Ok(records.iter().map(RecordReport::from_record).collect())
}

/// Build a digest, logging any ancestors the walk had to cut off.
pub fn build_digest(session: &Session, type_name: &str) -> Result<AnnotationsDigest, DigestError> {
    let type_name = TypeName::new(type_name);
    tracing::info!("Digesting {} ({:?})", type_name, session.options().mode);

    let digest = session.digest(&type_name)?;
    for truncated in digest.truncated() {
        tracing::warn!(
            "Ancestor {} of {} not on classpath; walk truncated",
            truncated.ancestor,
            truncated.referenced_by
        );
    }
    let cached = session.cached_count()?;
    tracing::debug!(
        "Visited {} types, {} data, {} classes cached",
        digest.visited().len(),
        digest.len(),
        cached
    );
    Ok(digest)
}

/// Views of a type's class-level annotation, nearest first.
///
/// Returns only the nearest occurrence unless `all` is set, and an empty
/// list when the type carries no such annotation.
pub fn view_reports(
    session: &Session,
    type_name: &str,
    annotation: &str,
    all: bool,
) -> Result<Vec<ViewReport>, DigestError> {
    let annotation_type = TypeName::new(annotation);
    let shape = Arc::new(session.shape_of(&annotation_type)?);
    let digest = build_digest(session, type_name)?;

    let data = if all {
        digest.class_data(&annotation_type)
    } else {
        digest.class_datum(&annotation_type).into_iter().collect()
    };

    let reports: Vec<ViewReport> = data
        .into_iter()
        .map(|datum| {
            let view = session.view(datum, shape.clone());
            ViewReport::new(datum.element().to_string(), &view)
        })
        .collect();
    for report in &reports {
        for name in report.errors() {
            tracing::warn!(
                "{} on {}: accessor '{}' failed",
                report.annotation,
                report.element,
                name
            );
        }
    }
    Ok(reports)
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Print the records of one class file.
pub fn cmd_records(settings: &Settings, file: &Path) -> Result<(), DigestError> {
    let records = records_report(file)?;

    if settings.json_mode {
        print_json(&records);
    } else {
        println!("Records in {}", file.display());
        println!("==========");
        for record in &records {
            println!("  [{}] {} {}", record.retention, record.element, record.display);
        }
        println!();
        println!("{} records", records.len());
    }
    Ok(())
}

/// Print the digest of a type.
pub fn cmd_digest(settings: &Settings, type_name: &str, walk: WalkArgs) -> Result<(), DigestError> {
    let session = settings.session(walk)?;
    let digest = build_digest(&session, type_name)?;
    let report = DigestReport::from_digest(&digest);

    if settings.json_mode {
        print_json(&report);
    } else {
        print!("{}", report.to_text());
        if settings.verbose {
            println!();
            println!("Data:           {}", report.len());
            println!("Classes parsed: {}", session.cached_count()?);
        }
    }
    Ok(())
}

/// Print the views of a type's annotation.
pub fn cmd_view(
    settings: &Settings,
    type_name: &str,
    annotation: &str,
    all: bool,
    walk: WalkArgs,
) -> Result<(), DigestError> {
    let session = settings.session(walk)?;
    let reports = view_reports(&session, type_name, annotation, all)?;

    if settings.json_mode {
        print_json(&reports);
    } else if reports.is_empty() {
        println!(
            "{} has no @{}",
            TypeName::new(type_name).dotted(),
            TypeName::new(annotation).dotted()
        );
    } else {
        for report in &reports {
            print!("{}", report.to_text());
        }
    }
    Ok(())
}

/// Print the derived shape of an annotation interface.
pub fn cmd_shape(settings: &Settings, annotation: &str) -> Result<(), DigestError> {
    let session = settings.session(WalkArgs::default())?;
    let shape = session.shape_of(&TypeName::new(annotation))?;
    let report = ShapeReport::from_shape(&shape);

    if settings.json_mode {
        print_json(&report);
    } else {
        print!("{}", report.to_text());
    }
    Ok(())
}

/// Export a digest to a canonical file.
pub fn cmd_export(
    settings: &Settings,
    type_name: &str,
    output: &Path,
    walk: WalkArgs,
) -> Result<(), DigestError> {
    let validated_output = validate_output_path(output)?;

    let session = settings.session(walk)?;
    let digest = build_digest(&session, type_name)?;
    let data = export_canonical(&digest)?;
    let checksum = canonical_checksum(&digest)?;

    std::fs::write(&validated_output, &data).map_err(|e| DigestError::IoError(e.to_string()))?;
    tracing::info!("Exported {} bytes to {:?}", data.len(), validated_output);

    if settings.json_mode {
        print_json(&serde_json::json!({
            "type": digest.root().dotted(),
            "output": validated_output.to_string_lossy(),
            "bytes": data.len(),
            "data": digest.len(),
            "checksum": format!("{checksum:016x}"),
        }));
    } else {
        println!(
            "Exported {} to {}",
            digest.root().dotted(),
            validated_output.display()
        );
        println!("  Bytes:    {}", data.len());
        println!("  Data:     {}", digest.len());
        println!("  Checksum: {checksum:016x}");
    }
    Ok(())
}

/// Check an export file and optionally compare it to a fresh digest.
pub fn cmd_verify(
    settings: &Settings,
    file: &Path,
    against: Option<&str>,
    walk: WalkArgs,
) -> Result<(), DigestError> {
    let data = read_input(file, MAX_EXPORT_SIZE)?;
    let imported = import_canonical(&data)?;
    let checksum = canonical_checksum(&imported)?;

    let matches = match against {
        Some(type_name) => {
            let session = settings.session(walk)?;
            let digest = build_digest(&session, type_name)?;
            Some(verify_canonical(&digest, &data)?)
        }
        None => None,
    };

    if settings.json_mode {
        print_json(&serde_json::json!({
            "type": imported.root().dotted(),
            "visited": imported.visited().len(),
            "data": imported.len(),
            "checksum": format!("{checksum:016x}"),
            "matches": matches,
        }));
    } else {
        println!("Export of {}", imported.root().dotted());
        println!("==========");
        println!("  Visited:  {}", imported.visited().len());
        println!("  Data:     {}", imported.len());
        println!("  Checksum: {checksum:016x}");
        if let Some(m) = matches {
            println!("  Matches:  {}", if m { "yes" } else { "NO" });
        }
    }

    match (matches, against) {
        (Some(false), Some(type_name)) => Err(DigestError::SerializationError(format!(
            "Export does not match the current digest of {}",
            TypeName::new(type_name).dotted()
        ))),
        _ => Ok(()),
    }
}

/// Print the BLAKE3 hash of a type's canonical digest.
pub fn cmd_hash(settings: &Settings, type_name: &str, walk: WalkArgs) -> Result<(), DigestError> {
    let session = settings.session(walk)?;
    let digest = build_digest(&session, type_name)?;
    let hash = canonical_hash(&digest)?;

    if settings.json_mode {
        print_json(&serde_json::json!({
            "type": digest.root().dotted(),
            "algorithm": "blake3",
            "hash": hash,
        }));
    } else {
        println!("{hash}");
    }
    Ok(())
}
