//! # CLI Integration Tests
//!
//! Drives the command layer over class files written to a temporary
//! classpath directory.

#![allow(clippy::unwrap_used, clippy::panic)]

use annodigest::cli::{
    Cli, Settings, WalkArgs, build_digest, cmd_export, cmd_verify, execute, records_report,
    view_reports,
};
use annodigest::output::{DigestReport, Resolved, ShapeReport};
use annodigest_core::primitives::{ACC_ABSTRACT, ACC_ANNOTATION, ACC_INTERFACE};
use annodigest_core::{
    Annotation, ClassWriter, DigestError, MemberDef, TypeName, Value, import_canonical,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ANNOTATION_FLAGS: u16 = ACC_ANNOTATION | ACC_INTERFACE | ACC_ABSTRACT;

// =============================================================================
// FIXTURES
// =============================================================================

fn write_class(root: &Path, writer: &ClassWriter) -> PathBuf {
    let bytes = writer.to_bytes().unwrap();
    let name = annodigest_core::read_class(&bytes).unwrap().name;
    let path = root.join(format!("{}.class", name.as_str()));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, bytes).unwrap();
    path
}

fn element(name: &str, returns: &str) -> MemberDef {
    MemberDef::new(name, format!("(){returns}")).access(ACC_ABSTRACT)
}

fn route(path: &str) -> Annotation {
    Annotation::new("web/Route").with("path", Value::string(path))
}

/// A classpath with:
/// - `web/Route { String path(); int order() default 0; }`
/// - `client/Link { String url(); }`
/// - `app/Api` (interface) tagged `@web/Tag`
/// - `app/Base` with `@Route("/base")`
/// - `app/Child extends Base implements Api` with `@Route("/child")`
/// - `app/Orphan extends gone/Missing`
fn classpath() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write_class(
        root,
        &ClassWriter::new("web/Route")
            .access(ANNOTATION_FLAGS)
            .method(element("path", "Ljava/lang/String;"))
            .method(element("order", "I").default_value(Value::Int(0))),
    );
    write_class(
        root,
        &ClassWriter::new("client/Link")
            .access(ANNOTATION_FLAGS)
            .method(element("url", "Ljava/lang/String;")),
    );
    write_class(
        root,
        &ClassWriter::new("app/Api")
            .access(ACC_INTERFACE | ACC_ABSTRACT)
            .annotation(Annotation::new("web/Tag")),
    );
    write_class(root, &ClassWriter::new("app/Base").annotation(route("/base")));
    write_class(
        root,
        &ClassWriter::new("app/Child")
            .super_class("app/Base")
            .interface("app/Api")
            .annotation(route("/child"))
            .method(
                MemberDef::new("handle", "(Ljava/lang/String;)V")
                    .annotation(Annotation::new("web/Get")),
            ),
    );
    write_class(root, &ClassWriter::new("app/Orphan").super_class("gone/Missing"));
    dir
}

fn settings(args: &[&str]) -> Settings {
    let cli = Cli::parse_from(args);
    Settings::from_cli(&cli).unwrap()
}

fn settings_for(dir: &TempDir) -> Settings {
    let cp = dir.path().to_string_lossy().to_string();
    settings(&["annodigest", "--classpath", cp.as_str(), "shape", "x/Unused"])
}

// =============================================================================
// RECORDS & DIGEST
// =============================================================================

#[test]
fn records_are_read_from_a_class_file() {
    let dir = classpath();
    let records = records_report(&dir.path().join("app/Child.class")).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].annotation, "web.Route");
    assert_eq!(records[0].attributes["path"], "/child");
    assert_eq!(records[1].kind, "method");
}

#[test]
fn records_reject_missing_files() {
    let dir = classpath();
    let err = records_report(&dir.path().join("app/Nope.class")).unwrap_err();
    assert!(matches!(err, DigestError::IoError(_)));
}

#[test]
fn digest_walks_superclass_then_interfaces() {
    let dir = classpath();
    let session = settings_for(&dir).session(WalkArgs::default()).unwrap();
    let report = DigestReport::from_digest(&build_digest(&session, "app.Child").unwrap());

    assert_eq!(report.visited, vec!["app.Child", "app.Base", "app.Api"]);
    let paths: Vec<_> = report
        .class_data
        .iter()
        .filter(|r| r.annotation == "web.Route")
        .map(|r| r.attributes["path"].clone())
        .collect();
    assert_eq!(paths, vec!["/child", "/base"]);
    assert_eq!(report.class_data.len(), 3);
    assert_eq!(report.method_data["web.Get"].len(), 1);
}

#[test]
fn direct_flag_limits_the_walk() {
    let dir = classpath();
    let walk = WalkArgs {
        direct: true,
        tolerate_missing: false,
    };
    let session = settings_for(&dir).session(walk).unwrap();
    let report = DigestReport::from_digest(&build_digest(&session, "app/Child").unwrap());
    assert_eq!(report.visited, vec!["app.Child"]);
    assert_eq!(report.class_data.len(), 1);
}

#[test]
fn missing_ancestor_fails_unless_tolerated() {
    let dir = classpath();
    let strict = settings_for(&dir).session(WalkArgs::default()).unwrap();
    assert!(matches!(
        build_digest(&strict, "app/Orphan"),
        Err(DigestError::UnresolvableAncestor { .. })
    ));

    let walk = WalkArgs {
        direct: false,
        tolerate_missing: true,
    };
    let lenient = settings_for(&dir).session(walk).unwrap();
    let digest = build_digest(&lenient, "app/Orphan").unwrap();
    assert_eq!(digest.truncated().len(), 1);
    assert_eq!(digest.truncated()[0].ancestor, TypeName::new("gone/Missing"));
}

// =============================================================================
// VIEWS & SHAPES
// =============================================================================

#[test]
fn view_resolves_nearest_occurrence_with_defaults() {
    let dir = classpath();
    let session = settings_for(&dir).session(WalkArgs::default()).unwrap();

    let nearest = view_reports(&session, "app/Child", "web/Route", false).unwrap();
    assert_eq!(nearest.len(), 1);
    assert_eq!(nearest[0].element, "app/Child");
    let values: Vec<_> = nearest[0]
        .values
        .iter()
        .map(|(name, resolved)| match resolved {
            Resolved::Value(v) => (name.as_str(), v.clone()),
            Resolved::Error(e) => panic!("{name}: {e}"),
        })
        .collect();
    assert_eq!(
        values,
        vec![
            ("order", serde_json::json!(0)),
            ("path", serde_json::json!("/child"))
        ]
    );

    let all = view_reports(&session, "app/Child", "web/Route", true).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].element, "app/Base");
}

#[test]
fn view_of_absent_annotation_is_empty() {
    let dir = classpath();
    let session = settings_for(&dir).session(WalkArgs::default()).unwrap();
    let reports = view_reports(&session, "app/Base", "client/Link", false).unwrap();
    assert!(reports.is_empty());
}

#[test]
fn shape_is_derived_from_classpath() {
    let dir = classpath();
    let session = settings_for(&dir).session(WalkArgs::default()).unwrap();
    let shape = session.shape_of(&TypeName::new("web/Route")).unwrap();
    let report = ShapeReport::from_shape(&shape);
    assert_eq!(report.annotation, "web.Route");
    let names: Vec<_> = report.accessors.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["order", "path"]);

    assert!(matches!(
        session.shape_of(&TypeName::new("app/Base")),
        Err(DigestError::NotAnAnnotation(_))
    ));
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[test]
fn config_file_supplies_classpath_and_mapping() {
    let dir = classpath();
    let config = dir.path().join("annodigest.toml");
    std::fs::write(
        &config,
        format!(
            r#"
            classpath = [{:?}]

            [mapping.types]
            "client/Link" = "web/Route"

            [mapping.attributes."client/Link"]
            url = "path"
            "#,
            dir.path().to_string_lossy()
        ),
    )
    .unwrap();

    let cfg = config.to_string_lossy().to_string();
    let settings = settings(&["annodigest", "--config", cfg.as_str(), "shape", "client/Link"]);
    let session = settings.session(WalkArgs::default()).unwrap();

    let reports = view_reports(&session, "app/Child", "client/Link", false).unwrap();
    assert_eq!(reports.len(), 1);
    let (name, resolved) = &reports[0].values[0];
    assert_eq!(name, "url");
    assert!(matches!(resolved, Resolved::Value(v) if v == "/child"));
}

#[test]
fn missing_classpath_is_a_config_error() {
    let settings = settings(&["annodigest", "digest", "app/Child"]);
    assert!(matches!(
        settings.session(WalkArgs::default()),
        Err(DigestError::ConfigError(_))
    ));
}

#[test]
fn bad_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "classpath = 7").unwrap();
    let cli = Cli::parse_from([
        "annodigest",
        "--config",
        config.to_str().unwrap(),
        "shape",
        "x/Y",
    ]);
    assert!(matches!(
        Settings::from_cli(&cli),
        Err(DigestError::ConfigError(_))
    ));
}

// =============================================================================
// EXPORT & VERIFY
// =============================================================================

#[test]
fn export_then_verify_against_fresh_digest() {
    let dir = classpath();
    let settings = settings_for(&dir);
    let out = dir.path().join("child.adgx");

    cmd_export(&settings, "app/Child", &out, WalkArgs::default()).unwrap();
    let imported = import_canonical(&std::fs::read(&out).unwrap()).unwrap();
    assert_eq!(imported.root(), &TypeName::new("app/Child"));
    assert_eq!(imported.len(), 4);

    cmd_verify(&settings, &out, Some("app/Child"), WalkArgs::default()).unwrap();

    // Change the class on disk: the old export no longer matches.
    write_class(
        dir.path(),
        &ClassWriter::new("app/Child")
            .super_class("app/Base")
            .interface("app/Api")
            .annotation(route("/moved")),
    );
    let err = cmd_verify(&settings, &out, Some("app/Child"), WalkArgs::default()).unwrap_err();
    assert!(matches!(err, DigestError::SerializationError(_)));
}

#[test]
fn export_rejects_missing_output_directory() {
    let dir = classpath();
    let out = dir.path().join("no/such/dir/out.adgx");
    let err = cmd_export(&settings_for(&dir), "app/Child", &out, WalkArgs::default()).unwrap_err();
    assert!(matches!(err, DigestError::IoError(_)));
}

#[test]
fn execute_runs_commands_end_to_end() {
    let dir = classpath();
    let cp = dir.path().to_string_lossy().to_string();

    let run = |args: &[&str]| {
        let mut full = vec!["annodigest", "--json-mode", "--classpath", cp.as_str()];
        full.extend_from_slice(args);
        execute(Cli::parse_from(full))
    };

    run(&["digest", "app.Child"]).unwrap();
    run(&["view", "app/Child", "web/Route", "--all"]).unwrap();
    run(&["shape", "web/Route"]).unwrap();
    run(&["hash", "app/Child", "--direct"]).unwrap();
    assert!(matches!(
        run(&["digest", "app/Nowhere"]),
        Err(DigestError::UnresolvableType(_))
    ));
}
