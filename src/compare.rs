//! Tree comparator.
//!
//! Two generated trees are equivalent when every file of the first tree
//! exists in the second with the same whitespace-normalized text. Files that
//! exist only in the second tree are not reported.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

/// Characters of context shown on each side of a divergence
pub const DIVERGENCE_CONTEXT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Missing,
    Mismatch,
}

impl std::fmt::Display for DiffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffKind::Missing => write!(f, "missing"),
            DiffKind::Mismatch => write!(f, "mismatch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub relative_path: PathBuf,
    pub kind: DiffKind,
}

/// Outcome of comparing tree A against tree B
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub tree_a: PathBuf,
    pub tree_b: PathBuf,
    pub entries: Vec<DiffEntry>,
    pub matched: Vec<PathBuf>,
}

impl ComparisonResult {
    /// No missing or mismatched files
    pub fn is_fixed_point(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn missing(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| e.kind == DiffKind::Missing)
    }

    pub fn mismatched(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| e.kind == DiffKind::Mismatch)
    }
}

/// Collapse every whitespace run to a single space and trim the ends
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compare every `*.<extension>` file under `tree_a` with its counterpart in `tree_b`
pub fn compare_trees(tree_a: &Path, tree_b: &Path, extension: &str) -> Result<ComparisonResult> {
    let mut result = ComparisonResult {
        tree_a: tree_a.to_path_buf(),
        tree_b: tree_b.to_path_buf(),
        ..Default::default()
    };

    for rel in list_files(tree_a, extension)? {
        let other = tree_b.join(&rel);
        if !other.is_file() {
            debug!("missing in {}: {}", tree_b.display(), rel.display());
            result.entries.push(DiffEntry {
                relative_path: rel,
                kind: DiffKind::Missing,
            });
            continue;
        }

        let left = read_text(&tree_a.join(&rel))?;
        let right = read_text(&other)?;
        if normalize(&left) == normalize(&right) {
            result.matched.push(rel);
        } else {
            debug!("mismatch: {}", rel.display());
            result.entries.push(DiffEntry {
                relative_path: rel,
                kind: DiffKind::Mismatch,
            });
        }
    }

    Ok(result)
}

/// Relative paths of every file with `extension` under `root`, sorted
pub fn list_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?;
        files.push(rel.to_path_buf());
    }
    files.sort();
    Ok(files)
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Where two normalized texts first disagree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Divergence {
    /// Character at `index` differs
    Char {
        index: usize,
        context_a: String,
        context_b: String,
    },
    /// One text is a prefix of the other
    Length { len_a: usize, len_b: usize },
}

impl std::fmt::Display for Divergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Divergence::Char {
                index,
                context_a,
                context_b,
            } => {
                writeln!(f, "first mismatch at index {}", index)?;
                writeln!(f, "  A: ...{}...", context_a)?;
                write!(f, "  B: ...{}...", context_b)
            }
            Divergence::Length { len_a, len_b } => {
                write!(f, "length mismatch: {} vs {}", len_a, len_b)
            }
        }
    }
}

/// Locate the first divergence of the normalized forms of `a` and `b`
pub fn first_divergence(a: &str, b: &str) -> Option<Divergence> {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();

    if let Some(index) = a.iter().zip(&b).position(|(x, y)| x != y) {
        let window = |text: &[char]| -> String {
            let start = index.saturating_sub(DIVERGENCE_CONTEXT);
            let end = (index + DIVERGENCE_CONTEXT).min(text.len());
            text[start..end].iter().collect()
        };
        return Some(Divergence::Char {
            index,
            context_a: window(&a),
            context_b: window(&b),
        });
    }

    if a.len() != b.len() {
        return Some(Divergence::Length {
            len_a: a.len(),
            len_b: b.len(),
        });
    }
    None
}

/// Line-based unified diff of one file in both trees
pub fn unified_diff(relative_path: &Path, a: &str, b: &str) -> String {
    let rel = relative_path.display();
    TextDiff::from_lines(a, b)
        .unified_diff()
        .header(&format!("A/{}", rel), &format!("B/{}", rel))
        .to_string()
}

/// Resolve a directory glob to its most recently modified match
pub fn resolve_latest_dir(pattern: &str) -> Result<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in glob::glob(pattern).with_context(|| format!("Invalid pattern '{}'", pattern))? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                debug!("skipping unreadable match: {}", e);
                continue;
            }
        };
        if !path.is_dir() {
            continue;
        }
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if best.as_ref().map_or(true, |(t, _)| modified >= *t) {
            best = Some((modified, path));
        }
    }
    best.map(|(_, p)| p)
        .with_context(|| format!("No directory matches '{}'", pattern))
}
