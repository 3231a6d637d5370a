//! The build driver (C10): top-level orchestration for one invocation.
//!
//! [`BuildContext`] owns the collaborators a single build needs — the
//! sandboxed file façade, the visor, and (freshly, per call) the embedded
//! engine and target graph — and exposes the three verbs a frontend drives:
//! [`BuildContext::build`], [`BuildContext::clean`], [`BuildContext::package`].
//! `tracing` carries developer-facing internals (entry discovery, descriptor
//! validation) distinct from the visor's user-facing build diagnostics.

use crate::dsl::{self, DslState};
use crate::fs::FileIo;
use crate::graph::TargetGraph;
use crate::js::Bridge;
use crate::loader::ModuleLoader;
use crate::package::PackageWriter;
use crate::spherefs::{Roots, SphereFs};
use crate::visor::{Reporter, Visor};
use cell_schema::{ArtifactList, CellError, DescriptorError, GameDescriptor, Path as LogicalPath, SgmManifest, SourceMap};
use std::cell::RefCell;
use std::path::Path as StdPath;
use std::rc::Rc;
use std::sync::Arc;

/// Orchestration-layer failures distinct from [`CellError`]: things that go
/// wrong around a build rather than inside script evaluation itself.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Neither `Cellscript.mjs` nor `Cellscript.js` exists under the source
    /// root, and no explicit entry override was given.
    #[error("no Cellscript.mjs or Cellscript.js found under the source root")]
    NoEntryScript,

    /// Everything the build engine itself can produce.
    #[error(transparent)]
    Build(#[from] CellError),
}

/// What one [`BuildContext::build`] call did: enough for a frontend to pick
/// its exit code and, in debug runs, report what was written.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    /// Total errors the visor recorded during this run.
    pub errors: usize,
    /// Total warnings the visor recorded during this run.
    pub warnings: usize,
    /// The artifact list written to `@/artifacts.json`, including the
    /// manifests themselves when the build succeeded.
    pub artifacts: ArtifactList,
}

impl BuildOutcome {
    /// Whether this run completed with zero errors (the driver's exit-code
    /// contract, spec.md §6).
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }
}

/// One invocation's worth of shared state: the sandboxed roots, the visor
/// reporting through a frontend-supplied [`Reporter`], and an optional
/// explicit entry script overriding the default `Cellscript.mjs`/`.js`
/// discovery.
pub struct BuildContext {
    io: Rc<FileIo>,
    sandbox: SphereFs,
    visor: Rc<Visor>,
    entry: Option<String>,
    platform: String,
    version: String,
}

impl BuildContext {
    /// Build a context over the given sandboxed roots, reporting through
    /// `reporter`.
    pub fn new(
        roots: Roots,
        reporter: Arc<dyn Reporter>,
        platform: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let sandbox = SphereFs::new(roots);
        Self {
            io: Rc::new(FileIo::new(sandbox.clone())),
            sandbox,
            visor: Rc::new(Visor::new(reporter)),
            entry: None,
            platform: platform.into(),
            version: version.into(),
        }
    }

    /// Override entry-script discovery with an explicit logical path.
    pub fn with_entry(mut self, script: impl Into<String>) -> Self {
        self.entry = Some(script.into());
        self
    }

    /// The visor this context reports through, for a frontend that wants to
    /// read counters after a run without going through [`BuildOutcome`].
    pub fn visor(&self) -> &Visor {
        &self.visor
    }

    fn find_entry(&self) -> Result<String, DriverError> {
        if let Some(script) = &self.entry {
            return Ok(script.clone());
        }
        for candidate in ["$/Cellscript.mjs", "$/Cellscript.js"] {
            if self.io.exists(candidate).unwrap_or(false) {
                tracing::debug!(script = candidate, "entry script discovered");
                return Ok(candidate.to_string());
            }
        }
        Err(DriverError::NoEntryScript)
    }

    fn read_prior_artifacts(&self) -> ArtifactList {
        self.io
            .read_text("@/artifacts.json")
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    /// Evaluate the Cellscript, build every stale target under `@/`, and —
    /// if the run produced zero errors — write the persisted manifests.
    ///
    /// Mirrors spec.md §4.10 step by step: fresh engine and graph per call,
    /// conflict detection before any building, manifest emission gated on
    /// a clean error count, `artifacts.json` always written last.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NoEntryScript`] if no Cellscript is found, or
    /// [`DriverError::Build`] if the script fails to compile/evaluate, the
    /// descriptor is invalid, or a conflict is detected. Conflicts and
    /// descriptor errors abort before any target is built or any manifest
    /// is written.
    pub fn build(&self, rebuild: bool, debug: bool) -> Result<BuildOutcome, DriverError> {
        let entry = self.find_entry()?;
        let prior_artifacts = self.read_prior_artifacts();
        let script_mtime = self.io.mtime(&entry)?;

        let bridge = Rc::new(RefCell::new(Bridge::new()));
        let graph = Rc::new(RefCell::new(TargetGraph::new()));
        let state = DslState::new(
            Rc::clone(&bridge),
            Rc::clone(&self.io),
            Rc::clone(&graph),
            Rc::clone(&self.visor),
            self.platform.clone(),
            self.version.clone(),
            script_mtime,
        );
        dsl::install_globals(&state)?;

        let loader = ModuleLoader::new((*self.io).clone());
        {
            let mut guard = bridge.borrow_mut();
            loader.load_main(&mut guard, &entry)?;
            guard.run_pending_jobs();
        }

        let mut descriptor = self.read_descriptor(&bridge)?;
        self.validate_descriptor(&mut descriptor)?;

        graph.borrow().check_conflicts()?;
        graph.borrow().build_all(&self.io, &self.visor, rebuild)?;

        let main = descriptor.main.clone().unwrap_or_default();
        if !self.io.exists(&main).unwrap_or(false) {
            return Err(CellError::Descriptor(DescriptorError::MainNotFound(main)).into());
        }

        let mut artifacts = ArtifactList(self.visor.artifacts());

        if self.visor.has_errors() {
            let _ = self.io.remove_file("@/game.json");
            let _ = self.io.remove_file("@/game.sgm");
        } else {
            for stale in prior_artifacts.difference(&artifacts) {
                tracing::debug!(path = stale, "removing stale artifact");
                let _ = self.io.remove_file(stale);
            }
            self.write_manifests(&descriptor, debug, &graph.borrow(), &mut artifacts)?;
        }

        self.write_artifact_list(&artifacts)?;

        Ok(BuildOutcome {
            errors: self.visor.error_count(),
            warnings: self.visor.warning_count(),
            artifacts,
        })
    }

    fn read_descriptor(&self, bridge: &Rc<RefCell<Bridge>>) -> Result<GameDescriptor, DriverError> {
        let mut bridge = bridge.borrow_mut();
        let sphere = bridge.get_global("Sphere")?;
        let game = bridge.get_property(&sphere, "Game")?;
        let json = bridge.to_json(&game)?;
        Ok(serde_json::from_value(json).unwrap_or_default())
    }

    /// Validate `name`/`author`/`summary` (placeholder + warning if absent),
    /// then `resolution` and `main`'s shape (fatal if missing/invalid), per
    /// spec.md §4.10's descriptor validation rule. `main`'s *existence* is
    /// checked separately, after the graph has actually built it.
    fn validate_descriptor(&self, descriptor: &mut GameDescriptor) -> Result<(), DriverError> {
        if descriptor.name.is_none() {
            self.visor.warn("game descriptor missing 'name'; using a placeholder");
            descriptor.name = Some("Untitled".to_string());
        }
        if descriptor.author.is_none() {
            self.visor.warn("game descriptor missing 'author'; using a placeholder");
            descriptor.author = Some("Unknown".to_string());
        }
        if descriptor.summary.is_none() {
            self.visor.warn("game descriptor missing 'summary'; using a placeholder");
            descriptor.summary = Some(String::new());
        }

        descriptor.parse_resolution().map_err(CellError::from)?;

        let main = descriptor
            .main
            .clone()
            .ok_or(CellError::Descriptor(DescriptorError::MissingMain))?;
        if !LogicalPath::new(&main).hop_is(0, "@") {
            return Err(CellError::Descriptor(DescriptorError::MainOutsideOutputRoot(main)).into());
        }
        Ok(())
    }

    fn write_manifests(
        &self,
        descriptor: &GameDescriptor,
        debug: bool,
        graph: &TargetGraph,
        artifacts: &mut ArtifactList,
    ) -> Result<(), DriverError> {
        let json = serde_json::to_string_pretty(descriptor).map_err(|e| {
            CellError::Io {
                path: "@/game.json".to_string(),
                source: std::io::Error::other(e),
            }
        })?;
        self.io.write("@/game.json", json.as_bytes())?;
        artifacts.0.push("@/game.json".to_string());

        let main = descriptor.main.clone().unwrap_or_default();
        let resolution = descriptor.parse_resolution().map_err(CellError::from)?;
        let script = {
            let mut rel = LogicalPath::new(&main);
            rel = rel.relativize(&LogicalPath::new_dir("@/scripts"));
            rel.to_path_string()
        };
        let sgm = SgmManifest {
            name: descriptor.name.clone().unwrap_or_default(),
            author: descriptor.author.clone().unwrap_or_default(),
            description: descriptor.summary.clone().unwrap_or_default(),
            screen_width: resolution.width,
            screen_height: resolution.height,
            script,
        };
        self.io.write("@/game.sgm", sgm.to_text().as_bytes())?;
        artifacts.0.push("@/game.sgm".to_string());

        if debug {
            let mut file_map = std::collections::BTreeMap::new();
            for target in graph.targets() {
                if let Some(source) = target.sources.first() {
                    file_map.insert(target.output.clone(), source.clone());
                }
            }
            let source_map = SourceMap { file_map };
            let text = serde_json::to_string_pretty(&source_map).map_err(|e| CellError::Io {
                path: "@/sources.json".to_string(),
                source: std::io::Error::other(e),
            })?;
            self.io.write("@/sources.json", text.as_bytes())?;
            artifacts.0.push("@/sources.json".to_string());
        }

        Ok(())
    }

    fn write_artifact_list(&self, artifacts: &ArtifactList) -> Result<(), DriverError> {
        let json = serde_json::to_string_pretty(artifacts).map_err(|e| CellError::Io {
            path: "@/artifacts.json".to_string(),
            source: std::io::Error::other(e),
        })?;
        self.io.write("@/artifacts.json", json.as_bytes())?;
        Ok(())
    }

    /// Remove every file in the stored artifact list, then the list itself.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Build`] if `artifacts.json` exists but can't
    /// be parsed, or if removing a listed file fails for a reason other
    /// than it already being absent.
    pub fn clean(&self) -> Result<(), DriverError> {
        let artifacts = self.read_prior_artifacts();
        for path in &artifacts.0 {
            match self.io.remove_file(path) {
                Ok(()) => {}
                Err(CellError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if self.io.exists("@/artifacts.json").unwrap_or(false) {
            self.io.remove_file("@/artifacts.json")?;
        }
        Ok(())
    }

    /// Bundle every artifact named in `@/artifacts.json` (which already
    /// includes the manifests from the last successful build) into an
    /// archive at `archive_path` via `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Build`] if the archive can't be opened, an
    /// artifact can't be read, or the archive can't be closed.
    pub fn package(&self, writer: &mut dyn PackageWriter, archive_path: &StdPath) -> Result<(), DriverError> {
        writer.open(archive_path)?;

        let artifacts = self.read_prior_artifacts();
        let output_root = LogicalPath::new_dir("@/");
        for path in &artifacts.0 {
            let contents = self.io.read(path)?;
            let archive_name = LogicalPath::new(path).relativize(&output_root).to_path_string();
            writer.add_file(&archive_name, &contents)?;
        }

        writer.close()?;
        Ok(())
    }

    /// The sandboxed resolver this context builds over, for a frontend that
    /// needs to resolve a logical path outside of a build run (e.g. to
    /// print where `--package` will write).
    pub fn sandbox(&self) -> &SphereFs {
        &self.sandbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::ZipPackageWriter;
    use crate::visor::NullReporter;

    fn roots(dir: &StdPath) -> Roots {
        Roots {
            source: dir.join("src"),
            output: dir.join("out"),
            system: dir.join("system"),
            user: None,
        }
    }

    fn write_src(dir: &StdPath, rel: &str, contents: &str) {
        let path = dir.join("src").join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn descriptor_prelude() -> &'static str {
        "Sphere.Game.name = 'Test'; Sphere.Game.author = 'Me'; Sphere.Game.summary = 'A game'; \
         Sphere.Game.resolution = '320x240'; Sphere.Game.main = '@/a.txt';"
    }

    #[test]
    fn minimal_build_produces_artifacts_and_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        write_src(tmp.path(), "a.txt", "A");
        write_src(tmp.path(), "b.txt", "B");
        write_src(
            tmp.path(),
            "Cellscript.js",
            &format!(
                "{} install('@/', files('$/*.txt'));",
                descriptor_prelude()
            ),
        );

        let ctx = BuildContext::new(roots(tmp.path()), Arc::new(NullReporter), "cell", "1.0.0");
        let outcome = ctx.build(false, false).unwrap();

        assert!(outcome.is_success());
        assert_eq!(ctx.io.read_text("@/a.txt").unwrap(), "A");
        assert_eq!(ctx.io.read_text("@/b.txt").unwrap(), "B");
        assert!(ctx.io.exists("@/game.json").unwrap());
        assert!(ctx.io.read_text("@/game.sgm").unwrap().starts_with("name=Test"));
        let artifacts_text = ctx.io.read_text("@/artifacts.json").unwrap();
        assert!(artifacts_text.contains("a.txt"));
        assert!(artifacts_text.contains("game.json"));
    }

    #[test]
    fn conflicting_installs_abort_before_manifests() {
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

        let ctx = BuildContext::new(roots(tmp.path()), Arc::new(NullReporter), "cell", "1.0.0");
        let err = ctx.build(false, false);
        assert!(matches!(err, Err(DriverError::Build(CellError::Conflict { .. }))));
        assert!(!ctx.io.exists("@/game.json").unwrap());
    }

    #[test]
    fn missing_entry_script_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        let ctx = BuildContext::new(roots(tmp.path()), Arc::new(NullReporter), "cell", "1.0.0");
        assert!(matches!(ctx.build(false, false), Err(DriverError::NoEntryScript)));
    }

    #[test]
    fn invalid_resolution_is_fatal_descriptor_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_src(tmp.path(), "a.txt", "A");
        write_src(
            tmp.path(),
            "Cellscript.js",
            "Sphere.Game.name = 'Test'; Sphere.Game.main = '@/a.txt'; \
             Sphere.Game.resolution = 'widescreen'; install('@/', files('$/*.txt'));",
        );

        let ctx = BuildContext::new(roots(tmp.path()), Arc::new(NullReporter), "cell", "1.0.0");
        let err = ctx.build(false, false);
        assert!(matches!(
            err,
            Err(DriverError::Build(CellError::Descriptor(DescriptorError::InvalidResolution)))
        ));
    }

    #[test]
    fn clean_removes_prior_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        write_src(tmp.path(), "a.txt", "A");
        write_src(
            tmp.path(),
            "Cellscript.js",
            &format!("{} install('@/', files('$/*.txt'));", descriptor_prelude()),
        );

        let ctx = BuildContext::new(roots(tmp.path()), Arc::new(NullReporter), "cell", "1.0.0");
        ctx.build(false, false).unwrap();
        assert!(ctx.io.exists("@/a.txt").unwrap());

        ctx.clean().unwrap();
        assert!(!ctx.io.exists("@/a.txt").unwrap());
        assert!(!ctx.io.exists("@/artifacts.json").unwrap());
    }

    #[test]
    fn package_bundles_every_listed_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        write_src(tmp.path(), "a.txt", "A");
        write_src(
            tmp.path(),
            "Cellscript.js",
            &format!("{} install('@/', files('$/*.txt'));", descriptor_prelude()),
        );

        let ctx = BuildContext::new(roots(tmp.path()), Arc::new(NullReporter), "cell", "1.0.0");
        ctx.build(false, false).unwrap();

        let archive = tmp.path().join("game.spk");
        let mut writer = ZipPackageWriter::new();
        ctx.package(&mut writer, &archive).unwrap();

        let file = std::fs::File::open(&archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert!(zip.by_name("a.txt").is_ok());
        assert!(zip.by_name("game.json").is_ok());
    }
}
