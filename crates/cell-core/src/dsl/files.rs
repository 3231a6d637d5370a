//! `files(pattern, recursive)` (C7): matches source files by a deliberately
//! primitive pattern — a literal directory plus a literal filename prefix
//! before a single trailing `*`. This is *not* the `glob` crate's pattern
//! language: there is no character class, no `**`, and anything after the
//! `*` in the final path segment is ignored rather than matched as a
//! suffix. A pattern like `*.js` therefore matches every file in the
//! directory, not just `.js` files — scripts are expected to write
//! `prefix*` patterns.
//!
//! Matches come back as leaf [`Target`]s (`tool = None`, no sources): a raw
//! reference to a pre-existing file, never registered on the shared
//! [`crate::graph::TargetGraph`] (`make_file_targets` pushes `false` for
//! its "add to build targets" argument). `install()` and `tool.stage()`
//! consume them as sources for targets that *are* registered.

use crate::fs::FileIo;
use crate::graph::Target;
use crate::visor::Visor;
use cell_schema::{CellError, Path as LogicalPath};
use std::rc::Rc;
use std::time::SystemTime;

/// Match files against `pattern`, descending into subdirectories when
/// `recursive` is set. Results are sorted by output path for deterministic
/// build output. `timestamp_floor` becomes every returned target's own
/// floor, so a target later built from one of these sources is forced
/// stale whenever the Cellscript that called `files()` changes.
///
/// Warns (but doesn't error) through `visor` when the pattern matches
/// nothing, mirroring `js_files`'s `visor_warn(build->visor, "no existing
/// files match '%s'", pattern)`.
///
/// # Errors
///
/// Returns an error if the pattern's directory can't be read (including a
/// sandbox violation from an escaping pattern).
pub fn files(
    io: &FileIo,
    visor: &Visor,
    pattern: &str,
    recursive: bool,
    timestamp_floor: Option<SystemTime>,
) -> Result<Vec<Rc<Target>>, CellError> {
    let mut dir = LogicalPath::new(pattern);
    let file_pattern = if dir.num_hops() > 0 {
        dir.remove_hop(dir.num_hops() - 1)
    } else {
        String::new()
    };
    dir.to_dir();
    let prefix = file_pattern.split('*').next().unwrap_or("").to_string();

    let mut matches = Vec::new();
    collect(io, &dir.to_path_string(), "", &prefix, recursive, &mut matches)?;
    matches.sort_by(|a, b| a.1.cmp(&b.1));

    if matches.is_empty() {
        visor.warn(format!("no existing files match '{pattern}'"));
    }

    Ok(matches
        .into_iter()
        .map(|(name, output)| {
            Rc::new(Target {
                name,
                output,
                sources: Vec::new(),
                tool: None,
                timestamp_floor,
            })
        })
        .collect())
}

fn collect(
    io: &FileIo,
    dir: &str,
    rel_prefix: &str,
    prefix: &str,
    recursive: bool,
    out: &mut Vec<(String, String)>,
) -> Result<(), CellError> {
    let dir_trimmed = dir.trim_end_matches('/');
    for entry in io.read_dir(dir)? {
        let child = format!("{dir_trimmed}/{}", entry.name);
        let rel = if rel_prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{rel_prefix}/{}", entry.name)
        };
        if entry.is_dir {
            if recursive {
                collect(io, &child, &rel, prefix, recursive, out)?;
            }
        } else if entry.name.starts_with(prefix) {
            out.push((rel, child));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spherefs::{Roots, SphereFs};

    fn io(dir: &std::path::Path) -> FileIo {
        FileIo::new(SphereFs::new(Roots {
            source: dir.to_path_buf(),
            output: dir.join("out"),
            system: dir.join("system"),
            user: None,
        }))
    }

    fn outputs(targets: &[Rc<Target>]) -> Vec<String> {
        targets.iter().map(|t| t.output.clone()).collect()
    }

    #[test]
    fn prefix_wildcard_matches_filenames_starting_with_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        io.write("$/data-1.txt", b"a").unwrap();
        io.write("$/data-2.txt", b"b").unwrap();
        io.write("$/other.txt", b"c").unwrap();

        let visor = Visor::silent();
        let matched = files(&io, &visor, "$/data-*", false, None).unwrap();
        assert_eq!(
            outputs(&matched),
            vec!["$/data-1.txt".to_string(), "$/data-2.txt".to_string()]
        );
        assert!(matched.iter().all(|t| t.tool.is_none() && t.sources.is_empty()));
        assert_eq!(visor.warning_count(), 0);
    }

    #[test]
    fn leading_wildcard_matches_everything_in_the_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        io.write("$/a.js", b"1").unwrap();
        io.write("$/b.json", b"2").unwrap();

        let visor = Visor::silent();
        let matched = files(&io, &visor, "$/*.js", false, None).unwrap();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn recursive_descends_into_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        io.write("$/sub/deep.txt", b"x").unwrap();

        let visor = Visor::silent();
        assert!(files(&io, &visor, "$/*", false, None).unwrap().is_empty());
        let matched = files(&io, &visor, "$/*", true, None).unwrap();
        assert_eq!(outputs(&matched), vec!["$/sub/deep.txt".to_string()]);
        assert_eq!(matched[0].name, "sub/deep.txt");
    }

    #[test]
    fn zero_matches_emits_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        let io = io(tmp.path());

        let visor = Visor::silent();
        let matched = files(&io, &visor, "$/nope-*", false, None).unwrap();
        assert!(matched.is_empty());
        assert_eq!(visor.warning_count(), 1);
    }

    #[test]
    fn timestamp_floor_is_carried_onto_every_match() {
        let tmp = tempfile::tempdir().unwrap();
        let io = io(tmp.path());
        io.write("$/a.txt", b"a").unwrap();

        let floor = SystemTime::now();
        let visor = Visor::silent();
        let matched = files(&io, &visor, "$/a*", false, Some(floor)).unwrap();
        assert_eq!(matched[0].timestamp_floor, Some(floor));
    }
}
