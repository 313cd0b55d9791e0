//! Shadow detector for generated code.
//!
//! Flags `let mut` bindings that reuse a name already mutably bound in an
//! enclosing brace scope. The text is tokenized by a small state machine so
//! braces and bindings inside comments and literals are ignored.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

static LET_MUT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\blet\s+mut\s+([A-Za-z_][A-Za-z0-9_]*)\b").ok());

/// A shadowing `let mut` in one generated file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowFinding {
    pub path: PathBuf,
    pub line: usize,
    pub name: String,
}

impl std::fmt::Display for ShadowFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: `let mut {}` shadows an outer binding",
            self.path.display(),
            self.line,
            self.name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    LineComment,
    BlockComment { depth: usize },
    Str { escaped: bool },
    RawStr { hashes: usize },
    Char { escaped: bool },
}

/// Splits lines into code-only text, carrying literal and comment state across lines
struct CodeScanner {
    state: LexState,
}

impl CodeScanner {
    fn new() -> Self {
        Self {
            state: LexState::Code,
        }
    }

    /// Returns the line with every non-code character blanked, plus the braces seen in code
    fn scan_line(&mut self, line: &str) -> (String, Vec<char>) {
        let chars: Vec<char> = line.chars().collect();
        let mut code = String::with_capacity(line.len());
        let mut braces = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            match self.state {
                LexState::Code => match c {
                    '/' if next == Some('/') => {
                        self.state = LexState::LineComment;
                        code.push(' ');
                    }
                    '/' if next == Some('*') => {
                        self.state = LexState::BlockComment { depth: 1 };
                        code.push_str("  ");
                        i += 1;
                    }
                    '"' => {
                        self.state = LexState::Str { escaped: false };
                        code.push(' ');
                    }
                    'r' if !continues_ident(&chars, i) => {
                        if let Some((hashes, len)) = raw_string_open(&chars, i) {
                            self.state = LexState::RawStr { hashes };
                            code.extend(std::iter::repeat(' ').take(len));
                            i += len;
                            continue;
                        }
                        code.push(c);
                    }
                    '\'' if is_char_literal(&chars, i) => {
                        self.state = LexState::Char { escaped: false };
                        code.push(' ');
                    }
                    '{' | '}' => {
                        braces.push(c);
                        code.push(c);
                    }
                    _ => code.push(c),
                },
                LexState::LineComment => code.push(' '),
                LexState::BlockComment { depth } => {
                    if c == '/' && next == Some('*') {
                        self.state = LexState::BlockComment { depth: depth + 1 };
                        code.push_str("  ");
                        i += 1;
                    } else if c == '*' && next == Some('/') {
                        self.state = if depth == 1 {
                            LexState::Code
                        } else {
                            LexState::BlockComment { depth: depth - 1 }
                        };
                        code.push_str("  ");
                        i += 1;
                    } else {
                        code.push(' ');
                    }
                }
                LexState::Str { escaped } => {
                    self.state = match (escaped, c) {
                        (true, _) => LexState::Str { escaped: false },
                        (false, '\\') => LexState::Str { escaped: true },
                        (false, '"') => LexState::Code,
                        (false, _) => LexState::Str { escaped: false },
                    };
                    code.push(' ');
                }
                LexState::RawStr { hashes } => {
                    if c == '"' && closes_raw(&chars, i, hashes) {
                        self.state = LexState::Code;
                        code.extend(std::iter::repeat(' ').take(hashes + 1));
                        i += hashes + 1;
                        continue;
                    }
                    code.push(' ');
                }
                LexState::Char { escaped } => {
                    self.state = match (escaped, c) {
                        (true, _) => LexState::Char { escaped: false },
                        (false, '\\') => LexState::Char { escaped: true },
                        (false, '\'') => LexState::Code,
                        (false, _) => LexState::Char { escaped: false },
                    };
                    code.push(' ');
                }
            }
            i += 1;
        }

        if self.state == LexState::LineComment {
            self.state = LexState::Code;
        }
        (code, braces)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// True when the char at `i` sits inside an identifier (`for`, `bar`), so `r` opens no raw string
fn continues_ident(chars: &[char], i: usize) -> bool {
    match i.checked_sub(1).map(|p| chars[p]) {
        Some('b') => i >= 2 && is_ident_char(chars[i - 2]),
        Some(prev) => is_ident_char(prev),
        None => false,
    }
}

/// `r"`, `r#"`, `r##"` ...; returns the fence width and the opener length
fn raw_string_open(chars: &[char], i: usize) -> Option<(usize, usize)> {
    let mut j = i + 1;
    while chars.get(j) == Some(&'#') {
        j += 1;
    }
    (chars.get(j) == Some(&'"')).then(|| (j - i - 1, j - i + 1))
}

fn closes_raw(chars: &[char], i: usize, hashes: usize) -> bool {
    (1..=hashes).all(|k| chars.get(i + k) == Some(&'#'))
}

/// `'x'` and `'\n'` are literals; `'a` in `&'a str` is a lifetime
fn is_char_literal(chars: &[char], i: usize) -> bool {
    match chars.get(i + 1) {
        Some('\\') => true,
        Some(_) => chars.get(i + 2) == Some(&'\''),
        None => false,
    }
}

/// Scan generated text, returning `(line, name)` for every shadowing `let mut`
pub fn scan_text(text: &str) -> Vec<(usize, String)> {
    let mut scopes: Vec<HashSet<String>> = vec![HashSet::new()];
    let mut scanner = CodeScanner::new();
    let mut findings = Vec::new();
    let Some(let_mut) = LET_MUT.as_ref() else {
        return findings;
    };

    for (index, line) in text.lines().enumerate() {
        let (code, braces) = scanner.scan_line(line);

        for brace in braces {
            if brace == '{' {
                scopes.push(HashSet::new());
            } else if scopes.len() > 1 {
                scopes.pop();
            }
        }

        for caps in let_mut.captures_iter(&code) {
            let Some(name) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let innermost = scopes.len() - 1;
            if scopes[..innermost].iter().any(|s| s.contains(name)) {
                findings.push((index + 1, name.to_string()));
            }
            scopes[innermost].insert(name.to_string());
        }
    }

    findings
}

/// Scan every `*.<extension>` file under `root`
pub fn scan_tree(root: &Path, extension: &str) -> Result<Vec<ShadowFinding>> {
    let mut findings = Vec::new();
    for rel in crate::compare::list_files(root, extension)? {
        let path = root.join(&rel);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        findings.extend(scan_text(&text).into_iter().map(|(line, name)| ShadowFinding {
            path: rel.clone(),
            line,
            name,
        }));
    }
    Ok(findings)
}
