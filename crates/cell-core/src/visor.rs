//! The visor (C4): the build's diagnostic nerve center. Tracks a nested
//! stack of named operations, counts errors and warnings, and accumulates
//! the artifact list as targets are built. Everything user-facing is routed
//! through a [`Reporter`] injected at construction, so the engine itself
//! never prints.

use std::sync::Arc;

/// Where visor diagnostics go. Implementations decide how (or whether) to
/// render; the engine only ever calls through this trait.
pub trait Reporter: Send + Sync {
    /// A build operation started (e.g. building a target, running a tool).
    fn begin(&self, depth: usize, description: &str);

    /// The innermost operation finished.
    fn end(&self, depth: usize);

    /// An informational message, not tied to pass/fail.
    fn info(&self, msg: &str);

    /// A non-fatal problem; the build continues.
    fn warn(&self, msg: &str);

    /// A fatal or collected problem.
    fn error(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for Arc<T> {
    fn begin(&self, depth: usize, description: &str) {
        (**self).begin(depth, description);
    }
    fn end(&self, depth: usize) {
        (**self).end(depth);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warn(&self, msg: &str) {
        (**self).warn(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
}

/// A silent reporter, useful for tests and library embedding.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn begin(&self, _depth: usize, _description: &str) {}
    fn end(&self, _depth: usize) {}
    fn info(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

/// The nested diagnostic stack, error/warning counters, and artifact-list
/// accumulator for one build run.
///
/// Cloning a `Visor` shares the same counters and reporter: every clone
/// observes the same run.
pub struct Visor {
    reporter: Arc<dyn Reporter>,
    stack: std::sync::Mutex<Vec<String>>,
    errors: std::sync::atomic::AtomicUsize,
    warnings: std::sync::atomic::AtomicUsize,
    artifacts: std::sync::Mutex<Vec<String>>,
}

impl std::fmt::Debug for Visor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visor")
            .field("errors", &self.error_count())
            .field("warnings", &self.warning_count())
            .finish_non_exhaustive()
    }
}

/// An RAII guard closing the operation it opened when dropped, even if the
/// build unwinds out of it via `?`.
pub struct OpGuard<'a> {
    visor: &'a Visor,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        let depth = {
            let mut stack = self.visor.stack.lock().expect("visor stack poisoned");
            stack.pop();
            stack.len()
        };
        self.visor.reporter.end(depth);
    }
}

impl Visor {
    /// Construct a fresh visor reporting through `reporter`.
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            stack: std::sync::Mutex::new(Vec::new()),
            errors: std::sync::atomic::AtomicUsize::new(0),
            warnings: std::sync::atomic::AtomicUsize::new(0),
            artifacts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A visor that reports nowhere, for tests and embedding.
    pub fn silent() -> Self {
        Self::new(Arc::new(NullReporter))
    }

    /// Push a named operation scope, returning a guard that pops it on
    /// drop. Scopes nest: building a tool target inside a build inside a
    /// package run shows as three levels of indentation to the reporter.
    pub fn begin_op(&self, description: impl Into<String>) -> OpGuard<'_> {
        let description = description.into();
        let depth = {
            let mut stack = self.stack.lock().expect("visor stack poisoned");
            stack.push(description.clone());
            stack.len() - 1
        };
        self.reporter.begin(depth, &description);
        OpGuard { visor: self }
    }

    /// Current nesting depth (0 at the top level).
    pub fn depth(&self) -> usize {
        self.stack.lock().expect("visor stack poisoned").len()
    }

    /// Emit an informational message at the current depth.
    pub fn info(&self, msg: impl AsRef<str>) {
        self.reporter.info(msg.as_ref());
    }

    /// Emit a warning and increment the warning counter.
    pub fn warn(&self, msg: impl AsRef<str>) {
        self.warnings
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.reporter.warn(msg.as_ref());
    }

    /// Emit an error and increment the error counter.
    pub fn error(&self, msg: impl AsRef<str>) {
        self.errors
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.reporter.error(msg.as_ref());
    }

    /// Total errors reported so far.
    pub fn error_count(&self) -> usize {
        self.errors.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Total warnings reported so far.
    pub fn warning_count(&self) -> usize {
        self.warnings.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Whether any error has been reported; the driver uses this to decide
    /// the process exit code.
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Record an output-root-relative path as produced by this run.
    pub fn record_artifact(&self, path: impl Into<String>) {
        self.artifacts
            .lock()
            .expect("visor artifacts poisoned")
            .push(path.into());
    }

    /// The artifact list accumulated so far, in recorded order.
    pub fn artifacts(&self) -> Vec<String> {
        self.artifacts.lock().expect("visor artifacts poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scopes_track_depth() {
        let visor = Visor::silent();
        assert_eq!(visor.depth(), 0);
        let outer = visor.begin_op("build game");
        assert_eq!(visor.depth(), 1);
        {
            let _inner = visor.begin_op("build target");
            assert_eq!(visor.depth(), 2);
        }
        assert_eq!(visor.depth(), 1);
        drop(outer);
        assert_eq!(visor.depth(), 0);
    }

    #[test]
    fn error_and_warning_counters_accumulate() {
        let visor = Visor::silent();
        visor.warn("careful");
        visor.error("boom");
        visor.error("boom again");
        assert_eq!(visor.warning_count(), 1);
        assert_eq!(visor.error_count(), 2);
        assert!(visor.has_errors());
    }

    #[test]
    fn artifacts_accumulate_in_order() {
        let visor = Visor::silent();
        visor.record_artifact("@/a.js");
        visor.record_artifact("@/b.js");
        assert_eq!(visor.artifacts(), vec!["@/a.js".to_string(), "@/b.js".to_string()]);
    }
}
