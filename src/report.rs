/// Report generation for bootstrap runs
use crate::pipeline::{BootstrapOutput, Verdict};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bootstrap run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub workspace_root: PathBuf,
    pub generations: usize,
    pub output: BootstrapOutput,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl BootstrapReport {
    pub fn new(workspace_root: PathBuf, generations: usize, output: BootstrapOutput) -> Self {
        Self {
            workspace_root,
            generations,
            output,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.output.verdict.passed()
    }

    /// Generate Markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "# Bootstrap Report: {}\n\n",
            self.workspace_root.display()
        ));
        md.push_str(&format!(
            "**Generated:** {}\n\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        md.push_str(&format!("**Verdict:** {}\n\n", verdict_badge(self.output.verdict)));

        md.push_str("## Stages\n\n");
        md.push_str("| Stage | Time (ms) | Result |\n");
        md.push_str("|-------|-----------|--------|\n");
        for timing in &self.output.timings {
            let validation = self
                .output
                .validations
                .iter()
                .find(|v| v.stage == timing.stage)
                .map(|v| v.message.as_str())
                .unwrap_or("-");
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                timing.stage, timing.millis, validation
            ));
        }
        md.push('\n');

        md.push_str("## Comparisons\n\n");
        for cmp in &self.output.comparisons {
            md.push_str(&format!(
                "### `{}` vs `{}`\n\n",
                cmp.tree_a.display(),
                cmp.tree_b.display()
            ));
            md.push_str(&format!("- Matched: {}\n", cmp.matched.len()));
            for entry in &cmp.entries {
                md.push_str(&format!(
                    "- **{}**: `{}`\n",
                    entry.kind,
                    entry.relative_path.display()
                ));
            }
            md.push('\n');
        }

        if !self.output.shadow_findings.is_empty() {
            md.push_str("## Shadowed Bindings\n\n");
            for finding in &self.output.shadow_findings {
                md.push_str(&format!(
                    "- `{}:{}` `let mut {}`\n",
                    finding.path.display(),
                    finding.line,
                    finding.name
                ));
            }
            md.push('\n');
        }

        md
    }

    /// Generate JSON report
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Generate plain text report
    pub fn to_text(&self) -> String {
        let mut text = String::new();

        text.push_str(&format!(
            "BOOTSTRAP REPORT: {}\n",
            self.workspace_root.display()
        ));
        text.push_str(&format!(
            "Generated: {}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        text.push_str(&"=".repeat(80));
        text.push_str("\n\n");

        text.push_str("SUMMARY\n");
        text.push_str(&"-".repeat(80));
        text.push('\n');
        text.push_str(&format!("Verdict: {}\n", self.output.verdict));
        text.push_str(&format!("Generations: {}\n", self.generations));
        for artifact in &self.output.artifacts {
            text.push_str(&format!(
                "{:10} {}\n",
                artifact.stage,
                artifact.binary.display()
            ));
        }
        text.push('\n');

        text.push_str("STAGES\n");
        text.push_str(&"-".repeat(80));
        text.push('\n');
        for timing in &self.output.timings {
            text.push_str(&format!("{:20} {:>10} ms\n", timing.stage, timing.millis));
        }
        text.push('\n');

        text.push_str("COMPARISONS\n");
        text.push_str(&"-".repeat(80));
        text.push('\n');
        for cmp in &self.output.comparisons {
            text.push_str(&format!(
                "{} vs {}: {} matched, {} differing\n",
                cmp.tree_a.display(),
                cmp.tree_b.display(),
                cmp.matched.len(),
                cmp.entries.len()
            ));
            for entry in &cmp.entries {
                text.push_str(&format!(
                    "  {:8} {}\n",
                    entry.kind.to_string(),
                    entry.relative_path.display()
                ));
            }
        }
        text.push('\n');

        if !self.output.shadow_findings.is_empty() {
            text.push_str("SHADOWED BINDINGS\n");
            text.push_str(&"-".repeat(80));
            text.push('\n');
            for finding in &self.output.shadow_findings {
                text.push_str(&format!("• {}\n", finding));
            }
            text.push('\n');
        }

        text
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        Ok(match format {
            ReportFormat::Markdown => self.to_markdown(),
            ReportFormat::Json => self.to_json()?,
            ReportFormat::Text => self.to_text(),
        })
    }

    /// Save report to file
    pub fn save(&self, path: &Path, format: ReportFormat) -> Result<()> {
        let content = self.render(format)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a JSON report written by [`BootstrapReport::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

fn verdict_badge(verdict: Verdict) -> String {
    match verdict {
        Verdict::FixedPoint => format!("✅ {}", verdict),
        _ => format!("❌ {}", verdict),
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
