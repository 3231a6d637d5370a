//! SphereFS: the prefix-routed sandbox resolver (C2).
//!
//! `resolve()` is the only way a logical path becomes a real filesystem
//! path anywhere in this crate; every other component (the file I/O façade,
//! the DSL bindings, the loader) funnels through it.

use cell_schema::Path as LogicalPath;
use std::path::{Path as StdPath, PathBuf};

/// The four real roots a [`SphereFs`] resolves logical paths against.
#[derive(Debug, Clone)]
pub struct Roots {
    /// `$/` — where the build script lives; default for relative paths.
    pub source: PathBuf,
    /// `@/` — where produced artifacts and manifests are written.
    pub output: PathBuf,
    /// `#/` — engine-bundled helpers; read-only by convention.
    pub system: PathBuf,
    /// `~/` — optional per-user writable area. `None` makes `~/` a sandbox
    /// violation.
    pub user: Option<PathBuf>,
}

/// A `resolve()` step escaped its root, or named an unconfigured one.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SandboxViolation {
    /// The path climbed above its root via `..`.
    #[error("path '{0}' escapes its sandboxed root")]
    Escape(String),
    /// `~/` was used but no user root is configured.
    #[error("path '{0}' uses '~/' but no user root is configured")]
    NoUserRoot(String),
    /// The path was platform-absolute, which is never permitted.
    #[error("path '{0}' is platform-absolute, which SphereFS forbids")]
    PlatformAbsolute(String),
}

/// Immutable after construction: the four real roots plus the resolver.
#[derive(Debug, Clone)]
pub struct SphereFs {
    roots: Roots,
}

impl SphereFs {
    /// Construct a resolver over the given roots.
    pub fn new(roots: Roots) -> Self {
        Self { roots }
    }

    /// The configured roots.
    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    /// Resolve a logical path string to a real filesystem path.
    ///
    /// Steps (spec.md §4.2):
    /// 1. Parse into a [`LogicalPath`].
    /// 2. Reject if platform-absolute.
    /// 3. Strip a known prefix hop (`$`, `@`, `#`, `~`) and rebase onto the
    ///    matching root; `~` with no configured user root fails. A path
    ///    whose first hop isn't one of these is treated as `$/`-relative.
    /// 4. Collapse `..`/`.`; fail if the result would climb above its root.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxViolation`] if any step above fails.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf, SandboxViolation> {
        let mut path = LogicalPath::new(logical);

        if Self::is_platform_absolute(logical) {
            return Err(SandboxViolation::PlatformAbsolute(logical.to_string()));
        }

        let root: &StdPath = match path.hop(0) {
            Some("$") => {
                path.remove_hop(0);
                &self.roots.source
            }
            Some("@") => {
                path.remove_hop(0);
                &self.roots.output
            }
            Some("#") => {
                path.remove_hop(0);
                &self.roots.system
            }
            Some("~") => {
                path.remove_hop(0);
                self.roots
                    .user
                    .as_deref()
                    .ok_or_else(|| SandboxViolation::NoUserRoot(logical.to_string()))?
            }
            _ => &self.roots.source,
        };

        path.collapse()
            .map_err(|_| SandboxViolation::Escape(logical.to_string()))?;

        let mut real = root.to_path_buf();
        for hop in path.hops() {
            real.push(hop);
        }
        Ok(real)
    }

    fn is_platform_absolute(s: &str) -> bool {
        StdPath::new(s).is_absolute()
    }
}
