//! cell - packaging compiler for the Sphere/minisphere JavaScript game
//! runtime.
//!
//! Evaluates a Cellscript against a sandboxed source tree, builds every
//! stale target under the output root, writes the game manifests, and
//! optionally bundles the result into a distributable archive. The script
//! itself is the build configuration — there is no separate project
//! manifest format.

/// Resolving `#/` and `~/` when nothing sandboxed overrides them.
pub mod paths;
/// The terminal [`Reporter`](cell_core::Reporter) implementation.
pub mod reporter;

use cell_core::driver::DriverError;
use cell_core::package::ZipPackageWriter;
use cell_core::{BuildContext, Roots};
use clap::Parser;
use crossterm::style::Stylize;
use reporter::TerminalReporter;
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line surface: a source tree in, a built tree out, plus the four
/// flags spec.md §6 names.
#[derive(Debug, Parser)]
#[command(name = "cell")]
#[command(author, version, about = "cell - packaging compiler for the Sphere JS game runtime")]
pub struct Cli {
    /// Directory containing the Cellscript and game assets (`$/`)
    pub source_dir: PathBuf,

    /// Directory the build writes its output to (`@/`)
    pub output_dir: PathBuf,

    /// Build script filename, relative to the source directory (default:
    /// `Cellscript.mjs`, then `Cellscript.js`)
    pub script: Option<String>,

    /// Rebuild every target regardless of staleness
    #[arg(long)]
    pub rebuild: bool,

    /// Emit `sources.json` alongside the other manifests
    #[arg(long)]
    pub debug: bool,

    /// Remove every artifact from a prior build instead of building
    #[arg(long)]
    pub clean: bool,

    /// After a successful build, bundle the output tree into an archive here
    #[arg(long)]
    pub package: Option<PathBuf>,
}

/// Run one CLI invocation to completion, returning the process exit code.
///
/// # Errors
///
/// Returns an error if the clean or package step itself fails outright. A
/// failed *build* is not a Rust error here: it is reported through the
/// visor as it happens and reflected in the returned exit code, per
/// spec.md §6's "exit code 0 iff build completed with zero errors".
pub fn run(cli: Cli) -> anyhow::Result<i32> {
    let roots = Roots {
        source: cli.source_dir.clone(),
        output: cli.output_dir.clone(),
        system: paths::system_root(),
        user: paths::user_root(),
    };

    let mut ctx = BuildContext::new(roots, Arc::new(TerminalReporter), "cell", env!("CARGO_PKG_VERSION"));
    if let Some(script) = &cli.script {
        ctx = ctx.with_entry(format!("$/{script}"));
    }

    if cli.clean {
        ctx.clean()?;
        return Ok(0);
    }

    let outcome = match ctx.build(cli.rebuild, cli.debug) {
        Ok(outcome) => outcome,
        Err(DriverError::NoEntryScript) => {
            eprintln!(
                "{} no Cellscript.mjs or Cellscript.js found under '{}'",
                "error:".red().bold(),
                cli.source_dir.display()
            );
            return Ok(1);
        }
        Err(DriverError::Build(e)) => {
            eprintln!("{} {e}", "error:".red().bold());
            return Ok(1);
        }
    };

    println!(
        "{} errors, {} warnings, {} artifacts",
        outcome.errors,
        outcome.warnings,
        outcome.artifacts.0.len()
    );

    if !outcome.is_success() {
        return Ok(1);
    }

    if let Some(archive_path) = &cli.package {
        let mut writer = ZipPackageWriter::new();
        ctx.package(&mut writer, archive_path)?;
    }

    Ok(0)
}
