//! `bootcheck bootstrap`: the end-to-end fixed-point run.

use bootcheck::config::BootstrapConfig;
use bootcheck::pipeline::{BootstrapOutput, BootstrapPipeline, Verdict};
use bootcheck::report::{BootstrapReport, ReportFormat};
use bootcheck::tools;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, clap::Args)]
pub struct BootstrapArgs {
    /// Configuration file (defaults to ./bootcheck.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of generated trees to produce and compare
    #[arg(long)]
    pub generations: Option<usize>,

    /// Concurrent translator invocations (0 = available parallelism)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Use a prebuilt stage 0 binary instead of building it
    #[arg(long)]
    pub stage0: Option<PathBuf>,

    /// Fail the run when shadowed `let mut` bindings are found
    #[arg(long)]
    pub fail_on_shadow: bool,

    /// Also write the report here
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Format of the --report file
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

impl BootstrapArgs {
    /// Flags win over the config file
    pub fn apply(&self, config: &mut BootstrapConfig) {
        if let Some(generations) = self.generations {
            config.pipeline.generations = generations;
        }
        if let Some(jobs) = self.jobs {
            config.pipeline.jobs = jobs;
        }
        if let Some(stage0) = &self.stage0 {
            config.stage0.binary = Some(stage0.clone());
        }
        if self.fail_on_shadow {
            config.pipeline.fail_on_shadow = true;
        }
    }
}

/// Run the bootstrap; returns whether a fixed point was verified
pub fn cmd_bootstrap(args: &BootstrapArgs, target_dir: Option<PathBuf>) -> anyhow::Result<bool> {
    println!("{}", "🔁 Verifying bootstrap fixed point...".bright_cyan().bold());
    println!();

    let workspace_root = std::env::current_dir()?;
    let mut config = super::load_config(&workspace_root, args.config.as_deref(), target_dir)?;
    args.apply(&mut config);

    match tools::detect_tool("cargo") {
        Some(cargo) => info!(
            "cargo {} at {}",
            cargo.version.as_deref().unwrap_or("unknown"),
            cargo.path.display()
        ),
        None => anyhow::bail!("cargo not found in PATH; it is needed to build stage binaries"),
    }

    print_settings(&config);

    let pipeline = BootstrapPipeline::standard(&config);
    let rt = tokio::runtime::Runtime::new()?;
    let output = rt.block_on(pipeline.run())?;

    display_output(&output);

    let report = BootstrapReport::new(
        config.project.workspace_root.clone(),
        config.pipeline.effective_generations(),
        output,
    );
    let report_path = config.report_path();
    report.save(&report_path, ReportFormat::Json)?;
    println!("Report: {}", report_path.display().to_string().dimmed());
    if let Some(path) = &args.report {
        report.save(path, args.format)?;
        println!("Report: {}", path.display().to_string().dimmed());
    }

    Ok(report.passed())
}

fn print_settings(config: &BootstrapConfig) {
    println!("{}", "Settings:".bright_yellow().bold());
    println!(
        "  {} Sources: {}",
        "•".bright_blue(),
        config.project.translator_src.display()
    );
    println!(
        "  {} Output root: {}",
        "•".bright_blue(),
        config.project.output_root.display()
    );
    println!(
        "  {} Generations: {}",
        "•".bright_blue(),
        config.pipeline.effective_generations()
    );
    println!(
        "  {} Jobs: {}",
        "•".bright_blue(),
        config.pipeline.effective_jobs()
    );
    match &config.stage0.binary {
        Some(bin) => println!("  {} Stage 0: {}", "•".bright_blue(), bin.display()),
        None => println!(
            "  {} Stage 0: cargo build -p {}",
            "•".bright_blue(),
            config.stage0.package
        ),
    }
    println!();
}

fn display_output(output: &BootstrapOutput) {
    for timing in &output.timings {
        println!(
            "{} {:20} {}",
            "✓".bright_green(),
            timing.stage,
            format!("{} ms", timing.millis).dimmed()
        );
    }
    println!();

    for cmp in &output.comparisons {
        if cmp.is_fixed_point() {
            continue;
        }
        println!(
            "{} {} vs {}",
            "✗".bright_red(),
            cmp.tree_a.display(),
            cmp.tree_b.display()
        );
        for entry in &cmp.entries {
            println!("    {:8} {}", entry.kind.to_string().red(), entry.relative_path.display());
        }
    }

    if !output.shadow_findings.is_empty() {
        println!("{}", "Shadowed bindings:".yellow().bold());
        for finding in &output.shadow_findings {
            warn!("{}", finding);
            println!("  {} {}", "⚠".yellow(), finding);
        }
        println!();
    }

    match output.verdict {
        Verdict::FixedPoint => println!("{}", "✅ Fixed point verified".bright_green().bold()),
        other => println!("{}", format!("❌ {}", other).bright_red().bold()),
    }
}

/// Print a report saved by an earlier run
pub fn show_saved_report(path: &Path, format: ReportFormat) -> anyhow::Result<bool> {
    let report = BootstrapReport::load(path)?;
    println!("{}", report.render(format)?);
    Ok(report.passed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let mut config = BootstrapConfig::default();
        let args = BootstrapArgs {
            generations: Some(3),
            jobs: Some(8),
            stage0: Some(PathBuf::from("/opt/quiche_self")),
            fail_on_shadow: true,
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.pipeline.generations, 3);
        assert_eq!(config.pipeline.jobs, 8);
        assert_eq!(config.stage0.binary, Some(PathBuf::from("/opt/quiche_self")));
        assert!(config.pipeline.fail_on_shadow);
    }

    #[test]
    fn test_single_generation_flag_runs_two() {
        let mut config = BootstrapConfig::default();
        let args = BootstrapArgs {
            generations: Some(1),
            ..Default::default()
        };
        args.apply(&mut config);
        assert_eq!(config.pipeline.effective_generations(), 2);
    }

    #[test]
    fn test_default_args_keep_config() {
        let mut config = BootstrapConfig::default();
        config.pipeline.fail_on_shadow = true;
        BootstrapArgs::default().apply(&mut config);
        assert_eq!(config.pipeline.generations, 2);
        assert!(config.pipeline.fail_on_shadow);
    }
}
