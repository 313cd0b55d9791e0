//! CLI command logic.
//!
//! Argument parsing and logging setup stay in main.rs; the handlers here
//! print human output and return whether the command passed.

pub mod bootstrap;
pub mod verify;

use anyhow::Context;
use bootcheck::config::{BootstrapConfig, CONFIG_FILENAME};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load the explicit config file, else `bootcheck.toml` in `workspace_root`, else defaults.
///
/// Relative paths are anchored at `workspace_root`; `target_dir` overrides the output root.
pub fn load_config(
    workspace_root: &Path,
    explicit: Option<&Path>,
    target_dir: Option<PathBuf>,
) -> anyhow::Result<BootstrapConfig> {
    let implicit = workspace_root.join(CONFIG_FILENAME);
    let config = match explicit {
        Some(path) => BootstrapConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if implicit.exists() => {
            info!("Using {}", implicit.display());
            BootstrapConfig::load(&implicit)
                .with_context(|| format!("Failed to load config {}", implicit.display()))?
        }
        None => BootstrapConfig::default(),
    };
    Ok(config.resolve(workspace_root, target_dir))
}

// ============================================================================
// Init Command
// ============================================================================

pub fn cmd_init(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    BootstrapConfig::default().save(output)?;
    println!(
        "{} Wrote default configuration to {}",
        "✓".bright_green(),
        output.display().to_string().cyan()
    );
    println!();
    println!("Next step: {}", "bootcheck bootstrap".cyan());
    Ok(())
}
