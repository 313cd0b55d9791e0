use super::*;
use crate::compare::{ComparisonResult, DiffEntry, DiffKind};
use crate::pipeline::{StageArtifact, StageTiming, ValidationResult};
use crate::shadow::ShadowFinding;
use std::path::PathBuf;
use tempfile::TempDir;

fn create_test_output(verdict: Verdict) -> BootstrapOutput {
    let entries = if verdict == Verdict::Diverged {
        vec![
            DiffEntry {
                relative_path: PathBuf::from("compiler/codegen.rs"),
                kind: DiffKind::Mismatch,
            },
            DiffEntry {
                relative_path: PathBuf::from("lexer.rs"),
                kind: DiffKind::Missing,
            },
        ]
    } else {
        vec![]
    };

    BootstrapOutput {
        verdict,
        output_root: PathBuf::from("/ws/target"),
        artifacts: vec![
            StageArtifact {
                stage: "stage0".to_string(),
                binary: PathBuf::from("/ws/target/debug/quiche_self"),
            },
            StageArtifact {
                stage: "stage1".to_string(),
                binary: PathBuf::from(
                    "/ws/target/bootstrap_stage1/target/debug/quiche_bootstrap_stage1",
                ),
            },
        ],
        trees: vec![],
        comparisons: vec![ComparisonResult {
            tree_a: PathBuf::from("/ws/target/stage1_out"),
            tree_b: PathBuf::from("/ws/target/stage2_out"),
            entries,
            matched: vec![PathBuf::from("main_gen.rs")],
        }],
        shadow_findings: vec![ShadowFinding {
            path: PathBuf::from("parser.rs"),
            line: 42,
            name: "cursor".to_string(),
        }],
        validations: vec![ValidationResult::pass("verify", "1 comparisons, 0 diverged")],
        timings: vec![
            StageTiming {
                stage: "stage0".to_string(),
                millis: 1200,
            },
            StageTiming {
                stage: "verify".to_string(),
                millis: 8,
            },
        ],
    }
}

fn create_test_report(verdict: Verdict) -> BootstrapReport {
    BootstrapReport::new(PathBuf::from("/ws"), 2, create_test_output(verdict))
}

// ============================================================================
// BOOTSTRAP REPORT TESTS
// ============================================================================

#[test]
fn test_bootstrap_report_new() {
    let report = create_test_report(Verdict::FixedPoint);
    assert_eq!(report.workspace_root, PathBuf::from("/ws"));
    assert_eq!(report.generations, 2);
    assert!(report.passed());
}

#[test]
fn test_diverged_report_fails() {
    assert!(!create_test_report(Verdict::Diverged).passed());
    assert!(!create_test_report(Verdict::ShadowViolation).passed());
}

#[test]
fn test_to_text_lists_differences() {
    let text = create_test_report(Verdict::Diverged).to_text();
    assert!(text.starts_with("BOOTSTRAP REPORT: /ws\n"));
    assert!(text.contains("Verdict: generations diverged"));
    assert!(text.contains("1 matched, 2 differing"));
    assert!(text.contains("mismatch compiler/codegen.rs"));
    assert!(text.contains("missing  lexer.rs"));
    assert!(text.contains("parser.rs:42:"));
}

#[test]
fn test_to_markdown_sections() {
    let md = create_test_report(Verdict::FixedPoint).to_markdown();
    assert!(md.starts_with("# Bootstrap Report: /ws"));
    assert!(md.contains("**Verdict:** ✅ fixed point verified"));
    assert!(md.contains("| verify | 8 | 1 comparisons, 0 diverged |"));
    assert!(md.contains("| stage0 | 1200 | - |"));
    assert!(md.contains("## Shadowed Bindings"));
    assert!(md.contains("`parser.rs:42` `let mut cursor`"));
}

#[test]
fn test_to_json_roundtrip() {
    let report = create_test_report(Verdict::Diverged);
    let json = report.to_json().unwrap();
    assert!(json.contains("\"verdict\": \"diverged\""));

    let back: BootstrapReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.output.comparisons[0].entries.len(), 2);
    assert_eq!(back.timestamp, report.timestamp);
}

// ============================================================================
// SAVE / LOAD TESTS
// ============================================================================

#[test]
fn test_save_json_and_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested/bootstrap_report.json");
    let report = create_test_report(Verdict::FixedPoint);

    report.save(&path, ReportFormat::Json).unwrap();
    let loaded = BootstrapReport::load(&path).unwrap();
    assert!(loaded.passed());
    assert_eq!(loaded.output.artifacts.len(), 2);
}

#[test]
fn test_save_text_and_markdown() {
    let temp = TempDir::new().unwrap();
    let report = create_test_report(Verdict::FixedPoint);

    let txt = temp.path().join("report.txt");
    report.save(&txt, ReportFormat::Text).unwrap();
    assert!(std::fs::read_to_string(&txt).unwrap().contains("SUMMARY"));

    let md = temp.path().join("report.md");
    report.save(&md, ReportFormat::Markdown).unwrap();
    assert!(std::fs::read_to_string(&md).unwrap().contains("## Comparisons"));
}

#[test]
fn test_load_missing_report_fails() {
    let temp = TempDir::new().unwrap();
    assert!(BootstrapReport::load(&temp.path().join("absent.json")).is_err());
}

#[test]
fn test_report_format_default() {
    assert_eq!(ReportFormat::default(), ReportFormat::Text);
}
