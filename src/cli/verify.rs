//! Standalone verification commands: diff, show-diff, shadow and locate.

use anyhow::Context;
use bootcheck::compare::{self, ComparisonResult, DiffKind};
use bootcheck::shadow;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;

fn resolve_pair(pattern_a: &str, pattern_b: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
    let a = compare::resolve_latest_dir(pattern_a)?;
    let b = compare::resolve_latest_dir(pattern_b)?;
    info!("Comparing {} against {}", a.display(), b.display());
    Ok((a, b))
}

fn read_lossy(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ============================================================================
// diff
// ============================================================================

/// Pass/fail comparison of two trees; returns whether they are equivalent
pub fn cmd_diff(pattern_a: &str, pattern_b: &str, extension: &str) -> anyhow::Result<bool> {
    let (a, b) = resolve_pair(pattern_a, pattern_b)?;
    let result = compare::compare_trees(&a, &b, extension)?;
    print_summary(&result);
    Ok(result.is_fixed_point())
}

fn print_summary(result: &ComparisonResult) {
    println!("{} {}", "A:".dimmed(), result.tree_a.display());
    println!("{} {}", "B:".dimmed(), result.tree_b.display());
    println!();

    for entry in &result.entries {
        let label = match entry.kind {
            DiffKind::Missing => "missing ".yellow(),
            DiffKind::Mismatch => "mismatch".red(),
        };
        println!("  {} {}", label, entry.relative_path.display());
    }

    if result.is_fixed_point() {
        println!(
            "{} {} files identical (whitespace-normalized)",
            "✓".bright_green(),
            result.matched.len()
        );
    } else {
        println!(
            "{} {} of {} files differ",
            "✗".bright_red(),
            result.entries.len(),
            result.entries.len() + result.matched.len()
        );
    }
}

// ============================================================================
// show-diff
// ============================================================================

/// Print a unified diff for every differing file; returns whether the trees are equivalent
pub fn cmd_show_diff(pattern_a: &str, pattern_b: &str, extension: &str) -> anyhow::Result<bool> {
    let (a, b) = resolve_pair(pattern_a, pattern_b)?;
    let result = compare::compare_trees(&a, &b, extension)?;

    for entry in &result.entries {
        let rel = &entry.relative_path;
        match entry.kind {
            DiffKind::Missing => {
                println!("{}", format!("=== Missing in B: {} ===", rel.display()).yellow());
            }
            DiffKind::Mismatch => {
                let left = read_lossy(&a.join(rel))?;
                let right = read_lossy(&b.join(rel))?;
                print!("{}", compare::unified_diff(rel, &left, &right));
                if let Some(divergence) = compare::first_divergence(&left, &right) {
                    println!("{}", divergence.to_string().dimmed());
                }
            }
        }
        println!();
    }

    if result.is_fixed_point() {
        println!("{} No differences", "✓".bright_green());
    }
    Ok(result.is_fixed_point())
}

// ============================================================================
// shadow
// ============================================================================

/// Report shadowed `let mut` bindings; advisory only, an unreadable tree included
pub fn cmd_shadow(tree: &Path, extension: &str) {
    let findings = match shadow::scan_tree(tree, extension) {
        Ok(findings) => findings,
        Err(e) => {
            eprintln!("{} Could not scan {}: {:#}", "⚠".yellow(), tree.display(), e);
            return;
        }
    };
    if findings.is_empty() {
        println!(
            "{} No shadowed bindings in {}",
            "✓".bright_green(),
            tree.display()
        );
        return;
    }

    for finding in &findings {
        println!("{} {}", "⚠".yellow(), finding);
    }
    println!();
    println!(
        "{} shadowed binding(s) in {}",
        findings.len().to_string().yellow().bold(),
        tree.display()
    );
}

// ============================================================================
// locate
// ============================================================================

/// Show where two files first diverge after normalization; returns whether they match
pub fn cmd_locate(file_a: &Path, file_b: &Path) -> anyhow::Result<bool> {
    let left = read_lossy(file_a)?;
    let right = read_lossy(file_b)?;

    match compare::first_divergence(&left, &right) {
        None => {
            println!("{} Files are identical after normalization", "✓".bright_green());
            Ok(true)
        }
        Some(divergence) => {
            println!("{}", divergence);
            Ok(false)
        }
    }
}
