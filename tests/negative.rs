//! Schemas that must be rejected. Each `tests/negative/Negative*.bp` file states the
//! expected error with `# @message` and `# @what` lines.

use bluepacket::{parse, parse_files, ResolvedSchema, SchemaError};
use std::path::{Path, PathBuf};

fn negative_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/negative")
}

fn compile(path: &Path) -> Result<ResolvedSchema, SchemaError> {
    parse_files(&[path]).and_then(ResolvedSchema::resolve)
}

fn expected(source: &str, key: &str) -> Option<String> {
    let prefix = format!("# @{} ", key);
    source
        .lines()
        .find_map(|l| l.strip_prefix(prefix.as_str()))
        .map(|v| v.trim().to_string())
}

#[test]
fn every_negative_schema_fails_as_annotated() {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(negative_dir())
        .expect("negative dir")
        .map(|e| e.expect("entry").path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("Negative") && n.ends_with(".bp"))
        })
        .collect();
    paths.sort();
    assert!(paths.len() >= 20, "only {} negative schemas found", paths.len());

    let mut failures = Vec::new();
    for path in &paths {
        let source = std::fs::read_to_string(path).expect("read");
        let what = expected(&source, "what").expect("# @what annotation");
        let message = expected(&source, "message").expect("# @message annotation");
        match compile(path) {
            Ok(_) => failures.push(format!("{}: compiled", path.display())),
            Err(e) => {
                if e.what.as_deref() != Some(what.as_str()) || e.message != message {
                    failures.push(format!("{}: got {}", path.display(), e));
                }
                match &e.location {
                    Some(l) if l.file.ends_with(path.file_name().and_then(|n| n.to_str()).unwrap_or("")) => {}
                    other => failures.push(format!("{}: bad location {:?}", path.display(), other)),
                }
            }
        }
    }
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[test]
fn errors_point_at_the_offending_line() {
    let err = parse("P:\n  a int\n  b int\n  a long\n").unwrap_err();
    assert_eq!(err.location.map(|l| l.line), Some(4));

    let err = ResolvedSchema::resolve(parse("P:\n  a int\n\nQ:\n  x Nope\n").unwrap()).unwrap_err();
    assert_eq!(err.location.as_ref().map(|l| l.line), Some(5));
    assert_eq!(err.to_string(), "<input>:5: Packet field has unknown type: x Nope");
}

#[test]
fn body_line_before_any_header_is_malformed() {
    let err = parse("  a int\n").unwrap_err();
    assert_eq!(err.message, "Malformed definition header");
}

#[test]
fn fields_of_an_enum_are_malformed_members() {
    let err = parse("E: enum\n  A, B\n  x int\n").unwrap_err();
    assert_eq!(err.message, "Malformed enum values");
    assert_eq!(err.what.as_deref(), Some("x int"));
}

#[test]
fn unknown_field_type_inside_nested_type() {
    let err = ResolvedSchema::resolve(parse("P:\n  i I\n\n  I:\n    z Zed\n").unwrap()).unwrap_err();
    assert_eq!(err.message, "Packet field has unknown type");
    assert_eq!(err.what.as_deref(), Some("z Zed"));
}

#[test]
fn deprecated_fork_with_lowercase_hex_is_rejected() {
    let src = "Account:\n  id long\n  name string\n  email string\n\nAccount__fb7fee0a9171c44:\n  id long\n  name string\n";
    let err = ResolvedSchema::resolve(parse(src).unwrap()).unwrap_err();
    assert_eq!(err.message, "Deprecated packet named with wrong hex version");
    assert_eq!(
        err.what.as_deref(),
        Some("Account__fb7fee0a9171c44 should be Account__FB7FEE0A9171C44")
    );
}
