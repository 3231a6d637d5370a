//! Hop-list path algebra shared by the SphereFS resolver and the build DSL.
//!
//! A [`Path`] is a pure value type: an ordered list of path components
//! ("hops") plus a flag recording whether the path denotes a directory (a
//! trailing separator). Hops never contain a `/`, which keeps every
//! operation below a simple list manipulation instead of string surgery.

use std::fmt;

/// An ordered sequence of path hops, with a trailing-separator flag.
///
/// Cloning a `Path` is a deep copy of its hop list; callers that need to
/// repeatedly derive variants (e.g. `rebase` then `collapse`) should clone
/// once up front rather than re-parsing strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    hops: Vec<String>,
    is_dir: bool,
}

/// A `collapse()` that would climb above the first hop.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("path escapes its root via '..'")]
pub struct CollapseEscapeError;

impl Path {
    /// Parse a path string into hops, splitting on `/` and `\`.
    ///
    /// A trailing separator (or an empty string) marks the path as a
    /// directory. Repeated separators collapse to a single hop boundary
    /// (empty hops are dropped), mirroring how the original C implementation
    /// tokenizes paths.
    pub fn new(s: &str) -> Self {
        let is_dir = s.is_empty() || s.ends_with('/') || s.ends_with('\\');
        let hops = s
            .split(['/', '\\'])
            .filter(|h| !h.is_empty())
            .map(str::to_owned)
            .collect();
        Self { hops, is_dir }
    }

    /// Parse a path string and force directory-ness regardless of trailing
    /// separator.
    pub fn new_dir(s: &str) -> Self {
        let mut path = Self::new(s);
        path.is_dir = true;
        path
    }

    /// Construct an empty (root-relative, zero-hop) directory path.
    pub fn empty_dir() -> Self {
        Self {
            hops: Vec::new(),
            is_dir: true,
        }
    }

    /// The hops, in order.
    pub fn hops(&self) -> &[String] {
        &self.hops
    }

    /// Number of hops.
    pub fn num_hops(&self) -> usize {
        self.hops.len()
    }

    /// The hop at `index`, if any.
    pub fn hop(&self, index: usize) -> Option<&str> {
        self.hops.get(index).map(String::as_str)
    }

    /// Whether the hop at `index` equals `s`.
    pub fn hop_is(&self, index: usize, s: &str) -> bool {
        self.hop(index) == Some(s)
    }

    /// Whether this path denotes a directory (trailing separator).
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Force directory-ness on, in place.
    pub fn to_dir(&mut self) {
        self.is_dir = true;
    }

    /// Append a hop to the end.
    pub fn append_hop(&mut self, hop: &str) {
        self.hops.push(hop.to_owned());
    }

    /// Insert a hop at `index`, shifting later hops right.
    pub fn insert_hop(&mut self, index: usize, hop: &str) {
        self.hops.insert(index, hop.to_owned());
    }

    /// Remove and return the hop at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds, same as `Vec::remove`.
    pub fn remove_hop(&mut self, index: usize) -> String {
        self.hops.remove(index)
    }

    /// Drop the last hop, turning a file path into its parent directory.
    ///
    /// A no-op on an already-empty path.
    pub fn strip(&mut self) {
        self.hops.pop();
        self.is_dir = true;
    }

    /// The filename extension of the last hop (without the dot), if any.
    pub fn extension(&self) -> Option<&str> {
        let last = self.hops.last()?;
        let dot = last.rfind('.')?;
        if dot == 0 { None } else { Some(&last[dot + 1..]) }
    }

    /// Whether the path is platform-absolute (starts with `/`, or a Windows
    /// drive letter) or begins with a bare SphereFS prefix hop (`$`, `@`,
    /// `#`, `~`).
    pub fn is_rooted(&self) -> bool {
        if self.is_platform_absolute() {
            return true;
        }
        matches!(self.hop(0), Some("$" | "@" | "#" | "~"))
    }

    fn is_platform_absolute(&self) -> bool {
        match self.hops.first() {
            Some(h) if h.len() == 2 && h.ends_with(':') => true, // C:, D:, ...
            _ => false,
        }
    }

    /// Prepend `base`'s hops onto `self`, in place.
    pub fn rebase(&mut self, base: &Path) {
        let mut hops = base.hops.clone();
        hops.append(&mut self.hops);
        self.hops = hops;
    }

    /// Return a new path with `base`'s common leading hops removed.
    ///
    /// If `self` and `base` don't share a first hop, `self` is returned
    /// unchanged (cloned), per spec.
    pub fn relativize(&self, base: &Path) -> Path {
        if self.hop(0) != base.hop(0) {
            return self.clone();
        }
        let common = self
            .hops
            .iter()
            .zip(base.hops.iter())
            .take_while(|(a, b)| a == b)
            .count();
        Self {
            hops: self.hops[common..].to_vec(),
            is_dir: self.is_dir,
        }
    }

    /// Fold `.` and `..` hops, erroring if a `..` would climb past the first
    /// hop (hop 0 is a hard stop: it is never removed by a `..`).
    ///
    /// Idempotent: collapsing an already-collapsed path is a no-op.
    pub fn collapse(&mut self) -> Result<(), CollapseEscapeError> {
        let mut out: Vec<String> = Vec::with_capacity(self.hops.len());
        for hop in &self.hops {
            match hop.as_str() {
                "." => {}
                ".." => {
                    if out.is_empty() {
                        return Err(CollapseEscapeError);
                    }
                    out.pop();
                }
                _ => out.push(hop.clone()),
            }
        }
        self.hops = out;
        Ok(())
    }

    /// Render the path back to a `/`-separated string.
    pub fn to_path_string(&self) -> String {
        let mut s = self.hops.join("/");
        if self.is_dir && !s.is_empty() {
            s.push('/');
        }
        s
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path_string())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}
