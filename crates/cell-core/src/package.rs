//! Packaging (C11): bundles a built output tree into a single archive for
//! distribution. The default [`ZipPackageWriter`] is one implementation of
//! [`PackageWriter`]; the driver only depends on the trait.

use cell_schema::CellError;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Something that can receive files under archive-relative paths and
/// produce a finished package.
pub trait PackageWriter {
    /// Open (or truncate) the archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive file cannot be created.
    fn open(&mut self, path: &Path) -> Result<(), CellError>;

    /// Add a file's contents under `archive_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    fn add_file(&mut self, archive_path: &str, contents: &[u8]) -> Result<(), CellError>;

    /// Finalize and flush the archive. A no-op if called twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be finished and flushed.
    fn close(&mut self) -> Result<(), CellError>;
}

/// Writes a standard zip archive (what Sphere's `.spk` packages are).
pub struct ZipPackageWriter {
    path: Option<PathBuf>,
    writer: Option<ZipWriter<File>>,
}

impl Default for ZipPackageWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipPackageWriter {
    /// A writer with no archive open yet.
    pub fn new() -> Self {
        Self {
            path: None,
            writer: None,
        }
    }
}

fn io_err(path: &Path, source: std::io::Error) -> CellError {
    CellError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl PackageWriter for ZipPackageWriter {
    fn open(&mut self, path: &Path) -> Result<(), CellError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
        }
        let file = File::create(path).map_err(|e| io_err(path, e))?;
        self.writer = Some(ZipWriter::new(file));
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn add_file(&mut self, archive_path: &str, contents: &[u8]) -> Result<(), CellError> {
        let path = self.path.clone().unwrap_or_default();
        let writer = self.writer.as_mut().ok_or_else(|| CellError::ToolFailure(
            "package writer used before open()".to_string(),
        ))?;
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer
            .start_file(archive_path, options)
            .map_err(|e| CellError::Io {
                path: path.display().to_string(),
                source: std::io::Error::other(e),
            })?;
        writer.write_all(contents).map_err(|e| io_err(&path, e))
    }

    fn close(&mut self) -> Result<(), CellError> {
        let path = self.path.clone().unwrap_or_default();
        if let Some(mut writer) = self.writer.take() {
            writer.finish().map_err(|e| CellError::Io {
                path: path.display().to_string(),
                source: std::io::Error::other(e),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_single_file() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("game.spk");

        let mut writer = ZipPackageWriter::new();
        writer.open(&archive).unwrap();
        writer.add_file("game.json", b"{\"name\":\"Test\"}").unwrap();
        writer.close().unwrap();

        let file = File::open(&archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let mut entry = zip.by_name("game.json").unwrap();
        let mut contents = String::new();
        std::io::Read::read_to_string(&mut entry, &mut contents).unwrap();
        assert_eq!(contents, "{\"name\":\"Test\"}");
    }

    #[test]
    fn add_file_before_open_fails() {
        let mut writer = ZipPackageWriter::new();
        assert!(writer.add_file("a.txt", b"x").is_err());
    }
}
