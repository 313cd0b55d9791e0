mod cli;

use bootcheck::config::{CONFIG_FILENAME, TARGET_DIR_ENV};
use bootcheck::report::ReportFormat;
use clap::{Parser, Subcommand};
use cli::bootstrap::BootstrapArgs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bootcheck")]
#[command(version, about = "Verify that a self-hosting translator reaches a bootstrap fixed point", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every stage and verify the generated trees agree (the default)
    Bootstrap(BootstrapArgs),

    /// Compare two generated trees and report pass/fail
    Diff {
        /// First tree (glob; the newest matching directory is used)
        tree_a: String,

        /// Second tree (glob; the newest matching directory is used)
        tree_b: String,

        /// Extension of generated files
        #[arg(long, default_value = "rs")]
        ext: String,
    },

    /// Print unified diffs for every differing file
    ShowDiff {
        tree_a: String,
        tree_b: String,

        #[arg(long, default_value = "rs")]
        ext: String,
    },

    /// Report shadowed `let mut` bindings in a generated tree
    Shadow {
        tree: PathBuf,

        #[arg(long, default_value = "rs")]
        ext: String,
    },

    /// Show where two generated files first diverge
    Locate { file_a: PathBuf, file_b: PathBuf },

    /// Print the report saved by the last bootstrap run
    Report {
        /// Report file (defaults to <output-root>/bootstrap_report.json)
        #[arg(long)]
        path: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },

    /// Write a default bootcheck.toml
    Init {
        #[arg(long, default_value = CONFIG_FILENAME)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter_layer = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::new("info")
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("bootcheck v{}", env!("CARGO_PKG_VERSION"));

    let target_dir = std::env::var_os(TARGET_DIR_ENV).map(PathBuf::from);

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Bootstrap(BootstrapArgs::default()));
    let passed = match command {
        Commands::Bootstrap(args) => cli::bootstrap::cmd_bootstrap(&args, target_dir)?,
        Commands::Diff { tree_a, tree_b, ext } => cli::verify::cmd_diff(&tree_a, &tree_b, &ext)?,
        Commands::ShowDiff { tree_a, tree_b, ext } => {
            cli::verify::cmd_show_diff(&tree_a, &tree_b, &ext)?
        }
        Commands::Shadow { tree, ext } => {
            cli::verify::cmd_shadow(&tree, &ext);
            true
        }
        Commands::Locate { file_a, file_b } => cli::verify::cmd_locate(&file_a, &file_b)?,
        Commands::Report { path, format } => {
            let path = match path {
                Some(p) => p,
                None => {
                    let workspace_root = std::env::current_dir()?;
                    cli::load_config(&workspace_root, None, target_dir)?.report_path()
                }
            };
            cli::bootstrap::show_saved_report(&path, format)?
        }
        Commands::Init { output, force } => {
            cli::cmd_init(&output, force)?;
            true
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
