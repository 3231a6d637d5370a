//! `install(destDir, sources)` (C7): copies one or more pre-existing
//! targets into `destDir`, producing a new, registered [`Target`] for each
//! — built later through the exact same [`ToolRunner`] path as any
//! user-defined tool, backed by the built-in [`InstallTool`] rather than a
//! special case in the graph.
//!
//! Grounded in `js_install` (build.c): `name = path_dup(target_name(source))`,
//! `path = path_rebase(path_dup(name), dest_path)`, then
//! `target_new(name, fs, path, installTool, build->timestamp, true)` with
//! `source` added as the new target's sole source. The built-in tool itself
//! is `install_target`: `fs_fcopy(fs, target_path, source_path, true)` (an
//! unconditional overwrite) followed by touching the destination's mtime.

use crate::fs::FileIo;
use crate::graph::{Target, ToolRunner};
use cell_schema::{CellError, Path as LogicalPath};
use std::rc::Rc;
use std::time::SystemTime;

/// The native tool every target `install()` produces is built with.
pub struct InstallTool {
    io: Rc<FileIo>,
}

impl InstallTool {
    /// Build the install tool over `io`.
    pub fn new(io: Rc<FileIo>) -> Self {
        Self { io }
    }
}

impl ToolRunner for InstallTool {
    fn name(&self) -> &str {
        "install"
    }

    fn run(&self, output: &str, inputs: &[String]) -> Result<(), CellError> {
        let source = inputs
            .first()
            .ok_or_else(|| CellError::ToolFailure(format!("install: '{output}' has no source")))?;
        self.io.copy(source, output, true)?;
        self.io.touch(output)
    }
}

fn install_one(
    io: &Rc<FileIo>,
    dest_dir: &str,
    source: &Rc<Target>,
    timestamp_floor: Option<SystemTime>,
) -> Rc<Target> {
    let mut path = LogicalPath::new(&source.name);
    path.rebase(&LogicalPath::new(dest_dir));
    Rc::new(Target {
        name: source.name.clone(),
        output: path.to_path_string(),
        sources: vec![Rc::clone(source)],
        tool: Some(Rc::new(InstallTool::new(Rc::clone(io)))),
        timestamp_floor,
    })
}

/// Install every target in `sources` under `dest_dir`, returning the newly
/// created targets in the same order. Callers register each on the shared
/// graph themselves (this function stays pure Rust, no engine dependency,
/// same as [`crate::dsl::files::files`]).
pub fn install(
    io: &Rc<FileIo>,
    dest_dir: &str,
    sources: &[Rc<Target>],
    timestamp_floor: Option<SystemTime>,
) -> Vec<Rc<Target>> {
    sources
        .iter()
        .map(|source| install_one(io, dest_dir, source, timestamp_floor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spherefs::{Roots, SphereFs};

    fn io(dir: &std::path::Path) -> Rc<FileIo> {
        Rc::new(FileIo::new(SphereFs::new(Roots {
            source: dir.to_path_buf(),
            output: dir.join("out"),
            system: dir.join("system"),
            user: None,
        })))
    }

    fn leaf(name: &str, output: &str) -> Rc<Target> {
        Rc::new(Target {
            name: name.to_string(),
            output: output.to_string(),
            sources: vec![],
            tool: None,
            timestamp_floor: None,
        })
    }

    #[test]
    fn install_rebases_name_onto_dest_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        let source = leaf("sub/a.txt", "$/sub/a.txt");

        let targets = install(&io, "@/", &[source], None);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].output, "@/sub/a.txt");
        assert_eq!(targets[0].name, "sub/a.txt");
        assert_eq!(targets[0].sources.len(), 1);
        assert!(targets[0].tool.is_some());
    }

    #[test]
    fn install_tool_copies_and_touches_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let io_handle = io(tmp.path());
        io_handle.write("$/a.txt", b"hello").unwrap();

        let tool = InstallTool::new(Rc::clone(&io_handle));
        tool.run("@/a.txt", &["$/a.txt".to_string()]).unwrap();

        assert_eq!(io_handle.read_text("@/a.txt").unwrap(), "hello");
    }

    #[test]
    fn install_tool_without_a_source_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let io_handle = io(tmp.path());
        let tool = InstallTool::new(io_handle);
        assert!(matches!(tool.run("@/a.txt", &[]), Err(CellError::ToolFailure(_))));
    }
}
