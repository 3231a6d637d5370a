//! The terminal `Reporter`: renders the visor's nested operation stack and
//! diagnostics directly to stdout/stderr.
//!
//! Builds are single-threaded (spec.md §5), so unlike a downloader with many
//! concurrent writers, nothing here needs an actor thread to serialize
//! output — every call arrives from the one thread driving the build.

use cell_core::Reporter;
use crossterm::style::Stylize;

/// Prints each visor event as it happens, indenting nested operations by
/// two spaces per level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalReporter;

impl Reporter for TerminalReporter {
    fn begin(&self, depth: usize, description: &str) {
        println!("{}{}", "  ".repeat(depth), description.bold());
    }

    fn end(&self, _depth: usize) {}

    fn info(&self, msg: &str) {
        println!("  {msg}");
    }

    fn warn(&self, msg: &str) {
        eprintln!("{} {msg}", "warning:".yellow().bold());
    }

    fn error(&self, msg: &str) {
        eprintln!("{} {msg}", "error:".red().bold());
    }
}
