//! File I/O façade (C3): every read/write/stat the engine performs goes
//! through here, so it always crosses [`crate::spherefs::SphereFs::resolve`]
//! first. Nothing in this crate calls `std::fs` directly outside this
//! module and the package writer.

use crate::spherefs::SphereFs;
use cell_schema::CellError;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::SystemTime;

/// A resolved directory entry: its logical name and whether it's a
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Bare filename (no path), as it appears inside its parent directory.
    pub name: String,
    /// Whether this entry is itself a directory.
    pub is_dir: bool,
}

/// The file I/O façade. Wraps a [`SphereFs`] resolver with the actual
/// `std::fs` calls the engine needs.
#[derive(Debug, Clone)]
pub struct FileIo {
    sandbox: SphereFs,
}

impl FileIo {
    /// Build a façade over the given resolver.
    pub fn new(sandbox: SphereFs) -> Self {
        Self { sandbox }
    }

    /// The underlying resolver, for callers (the loader, the DSL) that need
    /// `resolve()` without also performing I/O.
    pub fn sandbox(&self) -> &SphereFs {
        &self.sandbox
    }

    fn real(&self, logical: &str) -> Result<PathBuf, CellError> {
        self.sandbox
            .resolve(logical)
            .map_err(|e| CellError::SandboxViolation(e.to_string()))
    }

    /// Whether a logical path names an existing file or directory.
    pub fn exists(&self, logical: &str) -> Result<bool, CellError> {
        Ok(self.real(logical)?.exists())
    }

    /// Whether a logical path names an existing directory.
    pub fn is_dir(&self, logical: &str) -> Result<bool, CellError> {
        Ok(self.real(logical)?.is_dir())
    }

    /// Read a file's full contents as bytes.
    pub fn read(&self, logical: &str) -> Result<Vec<u8>, CellError> {
        let path = self.real(logical)?;
        fs::read(&path).map_err(|source| CellError::Io {
            path: logical.to_string(),
            source,
        })
    }

    /// Read a file's full contents as UTF-8 text.
    pub fn read_text(&self, logical: &str) -> Result<String, CellError> {
        let path = self.real(logical)?;
        fs::read_to_string(&path).map_err(|source| CellError::Io {
            path: logical.to_string(),
            source,
        })
    }

    /// Write `contents` to a file, creating parent directories as needed and
    /// truncating any existing file.
    pub fn write(&self, logical: &str, contents: &[u8]) -> Result<(), CellError> {
        let path = self.real(logical)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CellError::Io {
                path: logical.to_string(),
                source,
            })?;
        }
        fs::write(&path, contents).map_err(|source| CellError::Io {
            path: logical.to_string(),
            source,
        })
    }

    /// Append `contents` to a file, creating it (and its parents) if absent.
    pub fn append(&self, logical: &str, contents: &[u8]) -> Result<(), CellError> {
        let path = self.real(logical)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CellError::Io {
                path: logical.to_string(),
                source,
            })?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| CellError::Io {
                path: logical.to_string(),
                source,
            })?;
        file.write_all(contents).map_err(|source| CellError::Io {
            path: logical.to_string(),
            source,
        })
    }

    /// Create a directory and all missing ancestors.
    pub fn mkdir_p(&self, logical: &str) -> Result<(), CellError> {
        let path = self.real(logical)?;
        fs::create_dir_all(&path).map_err(|source| CellError::Io {
            path: logical.to_string(),
            source,
        })
    }

    /// Remove a single file.
    pub fn remove_file(&self, logical: &str) -> Result<(), CellError> {
        let path = self.real(logical)?;
        fs::remove_file(&path).map_err(|source| CellError::Io {
            path: logical.to_string(),
            source,
        })
    }

    /// Remove a directory and everything under it.
    pub fn remove_dir_all(&self, logical: &str) -> Result<(), CellError> {
        let path = self.real(logical)?;
        if !path.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&path).map_err(|source| CellError::Io {
            path: logical.to_string(),
            source,
        })
    }

    /// Copy a file, creating the destination's parent directories as
    /// needed. When `overwrite` is `false` and the destination already
    /// exists, the copy is skipped rather than truncating it.
    pub fn copy(&self, from_logical: &str, to_logical: &str, overwrite: bool) -> Result<(), CellError> {
        let from = self.real(from_logical)?;
        let to = self.real(to_logical)?;
        if !overwrite && to.exists() {
            return Ok(());
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|source| CellError::Io {
                path: to_logical.to_string(),
                source,
            })?;
        }
        fs::copy(&from, &to).map(|_| ()).map_err(|source| CellError::Io {
            path: from_logical.to_string(),
            source,
        })
    }

    /// Set a file's modification time to now, matching the install tool's
    /// "touch the destination after copying" step (spec.md §4.7).
    pub fn touch(&self, logical: &str) -> Result<(), CellError> {
        let path = self.real(logical)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|source| CellError::Io {
                path: logical.to_string(),
                source,
            })?;
        file.set_modified(SystemTime::now()).map_err(|source| CellError::Io {
            path: logical.to_string(),
            source,
        })
    }

    /// List the immediate children of a directory, in filesystem order.
    pub fn read_dir(&self, logical: &str) -> Result<Vec<Entry>, CellError> {
        let path = self.real(logical)?;
        let mut entries = Vec::new();
        let iter = fs::read_dir(&path).map_err(|source| CellError::Io {
            path: logical.to_string(),
            source,
        })?;
        for item in iter {
            let item = item.map_err(|source| CellError::Io {
                path: logical.to_string(),
                source,
            })?;
            let name = item.file_name().to_string_lossy().into_owned();
            let is_dir = item.file_type().map(|t| t.is_dir()).unwrap_or(false);
            entries.push(Entry { name, is_dir });
        }
        Ok(entries)
    }

    /// The last-modified time of a file or directory, if it exists.
    pub fn mtime(&self, logical: &str) -> Result<Option<SystemTime>, CellError> {
        let path = self.real(logical)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.modified().map_err(|source| CellError::Io {
                path: logical.to_string(),
                source,
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CellError::Io {
                path: logical.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spherefs::Roots;

    fn io(dir: &std::path::Path) -> FileIo {
        FileIo::new(SphereFs::new(Roots {
            source: dir.join("src"),
            output: dir.join("out"),
            system: dir.join("system"),
            user: None,
        }))
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        io.write("$/a/b.txt", b"hello").unwrap();
        assert_eq!(io.read_text("$/a/b.txt").unwrap(), "hello");
    }

    #[test]
    fn mkdir_p_then_read_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        io.write("@/x.txt", b"1").unwrap();
        io.write("@/y.txt", b"2").unwrap();
        let mut names: Vec<String> = io.read_dir("@/").unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["x.txt".to_string(), "y.txt".to_string()]);
    }

    #[test]
    fn mtime_absent_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        assert_eq!(io.mtime("@/missing.txt").unwrap(), None);
    }

    #[test]
    fn remove_dir_all_on_absent_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        assert!(io.remove_dir_all("@/nope").is_ok());
    }

    #[test]
    fn copy_without_overwrite_leaves_existing_destination_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        io.write("$/a.txt", b"new").unwrap();
        io.write("@/a.txt", b"old").unwrap();

        io.copy("$/a.txt", "@/a.txt", false).unwrap();
        assert_eq!(io.read_text("@/a.txt").unwrap(), "old");

        io.copy("$/a.txt", "@/a.txt", true).unwrap();
        assert_eq!(io.read_text("@/a.txt").unwrap(), "new");
    }

    #[test]
    fn touch_advances_modification_time() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        io.write("@/a.txt", b"x").unwrap();
        let before = io.mtime("@/a.txt").unwrap().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        io.touch("@/a.txt").unwrap();
        let after = io.mtime("@/a.txt").unwrap().unwrap();
        assert!(after > before);
    }

    #[test]
    fn sandbox_violation_surfaces_as_cell_error() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        assert!(matches!(
            io.read("$/../../x"),
            Err(CellError::SandboxViolation(_))
        ));
    }
}
