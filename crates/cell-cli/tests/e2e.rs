//! End-to-end coverage of the seed build scenarios, driven straight through
//! [`cell_core::BuildContext`] against real temp directories rather than by
//! spawning the compiled binary — there's no subprocess-assertion dependency
//! in this workspace, and every byte the CLI's `run()` touches already
//! passes through this same entry point.

use cell_core::driver::DriverError;
use cell_core::fs::FileIo;
use cell_core::package::ZipPackageWriter;
use cell_core::spherefs::SphereFs;
use cell_core::visor::NullReporter;
use cell_core::{BuildContext, Roots};
use cell_schema::{CellError, DescriptorError};
use std::path::Path;
use std::sync::Arc;

fn roots(dir: &Path) -> Roots {
    Roots {
        source: dir.join("src"),
        output: dir.join("out"),
        system: dir.join("system"),
        user: None,
    }
}

fn io(dir: &Path) -> FileIo {
    FileIo::new(SphereFs::new(roots(dir)))
}

fn write_src(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join("src").join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn descriptor_prelude() -> &'static str {
    "Sphere.Game.name = 'Test'; Sphere.Game.author = 'Me'; Sphere.Game.summary = 'A game'; \
     Sphere.Game.resolution = '320x240'; Sphere.Game.main = '@/a.txt';"
}

fn context(dir: &Path) -> BuildContext {
    BuildContext::new(roots(dir), Arc::new(NullReporter), "cell", "1.0.0")
}

/// S1: a minimal script that installs two files and fills out the
/// descriptor builds cleanly and leaves every manifest behind.
#[test]
fn s1_minimal_build_succeeds_and_writes_every_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    write_src(tmp.path(), "a.txt", "A");
    write_src(tmp.path(), "b.txt", "B");
    write_src(
        tmp.path(),
        "Cellscript.js",
        &format!("{} install('@/', files('$/*.txt'));", descriptor_prelude()),
    );

    let ctx = context(tmp.path());
    let outcome = ctx.build(false, false).unwrap();
    let io = io(tmp.path());

    assert!(outcome.is_success());
    assert_eq!(outcome.warnings, 0);
    assert_eq!(io.read_text("@/a.txt").unwrap(), "A");
    assert_eq!(io.read_text("@/b.txt").unwrap(), "B");
    assert!(io.exists("@/game.json").unwrap());
    assert!(io.exists("@/game.sgm").unwrap());
    assert!(io.exists("@/artifacts.json").unwrap());
    assert!(!io.exists("@/sources.json").unwrap());
}

/// S2: two installs landing on the same output path abort the whole build
/// before any manifest is written, reporting how many targets collided.
#[test]
fn s2_conflicting_targets_abort_before_any_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    write_src(tmp.path(), "a.txt", "A");
    write_src(
        tmp.path(),
        "Cellscript.js",
        &format!(
            "{} install('@/', files('$/*.txt')); install('@/', files('$/*.txt'));",
            descriptor_prelude()
        ),
    );

    let ctx = context(tmp.path());
    let err = ctx.build(false, false);

    assert!(matches!(
        err,
        Err(DriverError::Build(CellError::Conflict { count: 2, .. }))
    ));
    let io = io(tmp.path());
    assert!(!io.exists("@/game.json").unwrap());
    assert!(!io.exists("@/artifacts.json").unwrap());
}

/// S3: `--rebuild` forces every target to be rewritten even when its source
/// hasn't changed, so every produced file's mtime strictly advances.
#[test]
fn s3_forced_rebuild_advances_every_artifact_mtime() {
    let tmp = tempfile::tempdir().unwrap();
    write_src(tmp.path(), "a.txt", "A");
    write_src(
        tmp.path(),
        "Cellscript.js",
        &format!("{} install('@/', files('$/*.txt'));", descriptor_prelude()),
    );

    let ctx = context(tmp.path());
    ctx.build(false, false).unwrap();
    let io = io(tmp.path());
    let first_mtime = io.mtime("@/a.txt").unwrap().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    let outcome = ctx.build(true, false).unwrap();
    assert!(outcome.is_success());

    let second_mtime = io.mtime("@/a.txt").unwrap().unwrap();
    assert!(second_mtime > first_mtime);
}

/// Touching the Cellscript itself (without `--rebuild`) advances every
/// target's timestamp floor, forcing every artifact to be rewritten even
/// though none of its actual sources changed.
#[test]
fn touching_the_cellscript_forces_a_rebuild_without_the_rebuild_flag() {
    let tmp = tempfile::tempdir().unwrap();
    write_src(tmp.path(), "a.txt", "A");
    write_src(
        tmp.path(),
        "Cellscript.js",
        &format!("{} install('@/', files('$/*.txt'));", descriptor_prelude()),
    );

    let ctx = context(tmp.path());
    ctx.build(false, false).unwrap();
    let io = io(tmp.path());
    let first_mtime = io.mtime("@/a.txt").unwrap().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    io.touch("$/Cellscript.js").unwrap();

    let outcome = ctx.build(false, false).unwrap();
    assert!(outcome.is_success());

    let second_mtime = io.mtime("@/a.txt").unwrap().unwrap();
    assert!(second_mtime > first_mtime);
}

/// S4: when a later build no longer installs a file a prior run produced,
/// the stale artifact is deleted and dropped from `artifacts.json`.
#[test]
fn s4_removed_install_is_cleaned_up_on_the_next_build() {
    let tmp = tempfile::tempdir().unwrap();
    write_src(tmp.path(), "a.txt", "A");
    write_src(tmp.path(), "b.txt", "B");
    write_src(
        tmp.path(),
        "Cellscript.js",
        &format!("{} install('@/', files('$/*.txt'));", descriptor_prelude()),
    );

    let ctx = context(tmp.path());
    ctx.build(false, false).unwrap();
    let io = io(tmp.path());
    assert!(io.exists("@/b.txt").unwrap());

    // Next Cellscript only installs a.txt; b.txt's output should disappear.
    write_src(
        tmp.path(),
        "Cellscript.js",
        &format!("{} install('@/', files('$/a.txt'));", descriptor_prelude()),
    );
    let outcome = ctx.build(false, false).unwrap();

    assert!(outcome.is_success());
    assert!(io.exists("@/a.txt").unwrap());
    assert!(!io.exists("@/b.txt").unwrap());
    let artifacts_text = io.read_text("@/artifacts.json").unwrap();
    assert!(!artifacts_text.contains("b.txt"));
}

/// S5: a script that tries to read outside its sandbox via `../` never
/// reaches the real filesystem; the build fails with a sandbox violation
/// and nothing is written.
#[test]
fn s5_sandbox_escape_via_fs_read_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("secret"), "do not read me").unwrap();
    write_src(tmp.path(), "a.txt", "A");
    write_src(
        tmp.path(),
        "Cellscript.js",
        &format!("{} FS.readFile('$/../secret');", descriptor_prelude()),
    );

    let ctx = context(tmp.path());
    let err = ctx.build(false, false);

    let message = match err {
        Err(DriverError::Build(e)) => e.to_string(),
        other => panic!("expected a build error, got {other:?}"),
    };
    assert!(
        message.contains("sandbox violation"),
        "unexpected error message: {message}"
    );
    let io = io(tmp.path());
    assert!(!io.exists("@/game.json").unwrap());
}

/// S6: a tool that runs without producing its declared output is reported
/// as a failure, and the target itself never lands in the output tree.
#[test]
fn s6_tool_producing_nothing_is_reported_as_a_failure() {
    let tmp = tempfile::tempdir().unwrap();
    write_src(tmp.path(), "a.txt", "A");
    write_src(
        tmp.path(),
        "Cellscript.js",
        &format!(
            "{} var noop = new Tool(function (output, inputs) {{}}, 'noop'); \
             noop.stage('@/out.bin', files('$/a.txt'));",
            descriptor_prelude()
        ),
    );

    let ctx = context(tmp.path());
    let err = ctx.build(false, false);

    assert!(matches!(
        err,
        Err(DriverError::Build(CellError::ToolFailure(_)))
    ));
    let io = io(tmp.path());
    assert!(!io.exists("@/out.bin").unwrap());
}

/// Beyond the seed scenarios: a completed build packages cleanly into a
/// zip archive containing every manifest and installed asset.
#[test]
fn package_after_successful_build_bundles_every_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    write_src(tmp.path(), "a.txt", "A");
    write_src(
        tmp.path(),
        "Cellscript.js",
        &format!("{} install('@/', files('$/*.txt'));", descriptor_prelude()),
    );

    let ctx = context(tmp.path());
    ctx.build(false, false).unwrap();

    let archive = tmp.path().join("game.spk");
    let mut writer = ZipPackageWriter::new();
    ctx.package(&mut writer, &archive).unwrap();

    let file = std::fs::File::open(&archive).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    assert!(zip.by_name("a.txt").is_ok());
    assert!(zip.by_name("game.json").is_ok());
    assert!(zip.by_name("game.sgm").is_ok());
}

/// A descriptor missing its fatal fields (`main`) aborts the build with a
/// descriptor error rather than silently producing a broken package.
#[test]
fn build_without_main_reports_missing_main() {
    let tmp = tempfile::tempdir().unwrap();
    write_src(tmp.path(), "a.txt", "A");
    write_src(
        tmp.path(),
        "Cellscript.js",
        "Sphere.Game.name = 'Test'; install('@/', files('$/*.txt'));",
    );

    let ctx = context(tmp.path());
    let err = ctx.build(false, false);

    assert!(matches!(
        err,
        Err(DriverError::Build(CellError::Descriptor(DescriptorError::MissingMain)))
    ));
}
