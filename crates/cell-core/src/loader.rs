//! The CommonJS module loader (C6).
//!
//! `require()` resolution tries a path verbatim, then with `.mjs`, `.js`,
//! `.json`, `/package.json` (honoring its `main` field), `/index.mjs`,
//! `/index.js`, and `/index.json` appended, in that order — the same
//! eight-suffix table `find_cjs_module` (build.c) walks. A relative
//! specifier (`./`, `../`) resolves against the requiring module's own
//! directory; a sigil-prefixed one (`$/`, `@/`, `#/`, `~/`) resolves
//! absolutely regardless of who's asking; anything else is a bare module
//! name, tried in turn against the three system search roots `$/lib`,
//! `#/cell_modules`, and `#/runtime` (`js_require`, build.c). The one
//! `require` exposed to the top-level build script carries no origin of
//! its own and rejects relative specifiers outright — `"relative require
//! not allowed in global code"` — exactly as `js_require` does by reading
//! `parent_id` off its own native function and finding it unset.
//!
//! The cache stores a module's exports keyed by its resolved logical path;
//! a placeholder is inserted *before* the module body runs, so a circular
//! `require()` gets back the (possibly still partial) exports object
//! rather than recursing forever.

use crate::fs::FileIo;
use crate::js::{cell_error_to_js, extract_line, Bridge, ValueHandle};
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::object::builtins::JsPromise;
use boa_engine::{js_string, Context, JsObject, JsValue, Module, NativeFunction, Source};
use cell_schema::{CellError, JsErrorKind, Path as LogicalPath};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The three system roots a bare (non-relative, non-sigil) specifier is
/// tried against, in order, with the first successful match winning
/// (`js_require`'s `PATHS[]` loop in build.c).
const SEARCH_ROOTS: [&str; 3] = ["$/lib", "#/cell_modules", "#/runtime"];

/// The suffixes tried against a single base path, in order
/// (`find_cjs_module`'s `filenames[]` table in build.c).
const SUFFIXES: [&str; 8] = [
    "",
    ".mjs",
    ".js",
    ".json",
    "/package.json",
    "/index.mjs",
    "/index.js",
    "/index.json",
];

#[derive(Default)]
struct LoaderState {
    cache: HashMap<String, JsValue>,
    transpiler: Option<JsValue>,
}

/// Resolves and evaluates CommonJS modules (and native `.mjs` modules)
/// under sandbox control, with `require()` caching and cycle tolerance.
#[derive(Clone)]
pub struct ModuleLoader {
    io: FileIo,
    state: Rc<RefCell<LoaderState>>,
}

fn strip_shebang(source: &str) -> &str {
    if source.starts_with("#!") {
        source.find('\n').map_or("", |nl| &source[nl + 1..])
    } else {
        source
    }
}

fn compile_err(filename: &str, err: &boa_engine::JsError) -> CellError {
    let message = err.to_string();
    CellError::Compile {
        filename: filename.to_string(),
        line: extract_line(&message),
        message,
    }
}

fn runtime_err(filename: &str, err: &boa_engine::JsError) -> CellError {
    let message = err.to_string();
    CellError::Runtime {
        filename: filename.to_string(),
        line: extract_line(&message),
        message,
    }
}

fn module_not_found(specifier: &str) -> CellError {
    CellError::ResolutionFailed(specifier.to_string())
}

fn relative_require_in_global_code() -> CellError {
    CellError::Js {
        kind: JsErrorKind::TypeError,
        message: "relative require not allowed in global code".to_string(),
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

fn is_sigil(specifier: &str) -> bool {
    matches!(specifier.chars().next(), Some('$' | '@' | '#' | '~'))
}

fn join(dir: &str, relative: &str) -> String {
    let base = format!("{}/{relative}", dir.trim_end_matches('/'));
    let mut path = LogicalPath::new(&base);
    let _ = path.collapse();
    path.to_path_string()
}

impl ModuleLoader {
    /// Build a loader over the given sandboxed file façade.
    pub fn new(io: FileIo) -> Self {
        Self {
            io,
            state: Rc::new(RefCell::new(LoaderState::default())),
        }
    }

    /// Register a source-to-source transpiler collaborator (spec.md §4.5/
    /// §4.6): when set, it takes precedence over both the native `.mjs`
    /// module path and the `.js` IIFE path — every module is transpiled
    /// first and the result is always run as CommonJS. `callback` is
    /// called as `callback(source, options)` with
    /// `options = {module, allowJs, implicitStrict}` and must return the
    /// transpiled source as a string.
    pub(crate) fn set_transpiler(&self, callback: JsValue) {
        self.state.borrow_mut().transpiler = Some(callback);
    }

    /// Run the registered transpiler over `source`, if one is set. Returns
    /// `None` when no transpiler is registered (the default, faithful to
    /// `boa_engine`'s native handling of `.mjs`/`.js`).
    fn transpile(
        &self,
        context: &mut Context,
        resolved: &str,
        source: &str,
        as_module: bool,
        implicit_strict: bool,
    ) -> Result<Option<String>, CellError> {
        let Some(transpiler) = self.state.borrow().transpiler.clone() else {
            return Ok(None);
        };
        let Some(callable) = transpiler.as_object().filter(|o| o.is_callable()).cloned() else {
            return Ok(None);
        };

        let options = JsObject::with_null_proto();
        options
            .set(
                js_string!("module"),
                js_string!(if as_module { "ES-2015" } else { "" }),
                true,
                context,
            )
            .map_err(|e| runtime_err(resolved, &e))?;
        options
            .set(js_string!("allowJs"), true, true, context)
            .map_err(|e| runtime_err(resolved, &e))?;
        options
            .set(js_string!("implicitStrict"), implicit_strict, true, context)
            .map_err(|e| runtime_err(resolved, &e))?;

        let args = [JsValue::from(js_string!(source)), JsValue::from(options)];
        let result = callable
            .call(&JsValue::undefined(), &args, context)
            .map_err(|e| runtime_err(resolved, &e))?;
        let transpiled = result
            .to_string(context)
            .map_err(|e| runtime_err(resolved, &e))?
            .to_std_string_escaped();
        Ok(Some(transpiled))
    }

    /// Load and evaluate the build script entry point, returning its
    /// exports (for a `.js`/`.cjs` entry) or module namespace (for `.mjs`).
    ///
    /// The entry script's own `require`, if it's CommonJS, is the global
    /// one: no origin, relative specifiers rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::ResolutionFailed`] if no candidate file exists,
    /// [`CellError::Compile`] on a parse failure, or [`CellError::Runtime`]
    /// if the module body throws.
    pub fn load_main(&self, bridge: &mut Bridge, logical_path: &str) -> Result<ValueHandle, CellError> {
        let resolved = self.resolve(None, logical_path)?;
        let value = self.load(bridge.context_mut(), &resolved, None)?;
        Ok(ValueHandle::from_raw(value))
    }

    /// Resolve `specifier` to an existing file's logical path.
    ///
    /// `origin` is the resolved path of the requiring module, or `None` for
    /// the top-level script's own global `require`.
    fn resolve(&self, origin: Option<&str>, specifier: &str) -> Result<String, CellError> {
        if is_relative(specifier) {
            let origin = origin.ok_or_else(relative_require_in_global_code)?;
            let mut dir_path = LogicalPath::new(origin);
            dir_path.strip();
            let dir = dir_path.to_path_string();
            return self
                .find_in_dir(&dir, specifier)
                .ok_or_else(|| module_not_found(specifier));
        }

        if is_sigil(specifier) {
            return self
                .find_in_dir("", specifier)
                .ok_or_else(|| module_not_found(specifier));
        }

        for root in SEARCH_ROOTS {
            if let Some(found) = self.find_in_dir(root, specifier) {
                return Ok(found);
            }
        }
        Err(module_not_found(specifier))
    }

    /// Try every suffix in [`SUFFIXES`] against `specifier` relative to
    /// `dir`. A specifier starting with a root sigil resolves absolutely,
    /// ignoring `dir` entirely — matching `find_cjs_module`'s own
    /// `fs_full_path` shortcut for sigil-prefixed ids.
    fn find_in_dir(&self, dir: &str, specifier: &str) -> Option<String> {
        for suffix in SUFFIXES {
            let name = format!("{specifier}{suffix}");
            let candidate = if is_sigil(specifier) {
                let mut path = LogicalPath::new(&name);
                let _ = path.collapse();
                path.to_path_string()
            } else {
                join(dir, &name)
            };

            if !self.io.exists(&candidate).unwrap_or(false) || self.io.is_dir(&candidate).unwrap_or(true) {
                continue;
            }

            if candidate.rsplit('/').next() == Some("package.json") {
                if let Some(main) = self.package_main(&candidate) {
                    if self.io.exists(&main).unwrap_or(false) {
                        return Some(main);
                    }
                }
                continue;
            }

            return Some(candidate);
        }
        None
    }

    /// Read a matched `package.json`'s `main` field and resolve it against
    /// the package's own directory. Returns `None` if the field is absent
    /// or the file isn't valid JSON.
    fn package_main(&self, package_json: &str) -> Option<String> {
        let text = self.io.read_text(package_json).ok()?;
        let value: serde_json::Value = serde_json::from_str(&text).ok()?;
        let main = value.get("main")?.as_str()?;
        let mut dir = LogicalPath::new(package_json);
        dir.strip();
        Some(join(&dir.to_path_string(), main))
    }

    fn load(&self, context: &mut Context, resolved: &str, require_origin: Option<&str>) -> Result<JsValue, CellError> {
        if let Some(existing) = self.state.borrow().cache.get(resolved).cloned() {
            return Ok(existing);
        }

        let extension = LogicalPath::new(resolved).extension().map(str::to_owned);
        let raw = self.io.read_text(resolved)?;
        let source = strip_shebang(&raw);
        let is_module = extension.as_deref() == Some("mjs");
        let transpiled = if extension.as_deref() == Some("json") {
            None
        } else {
            self.transpile(context, resolved, source, is_module, !is_module)?
        };

        if let Some(transpiled_source) = transpiled.as_deref() {
            let module_obj = JsObject::with_null_proto();
            let placeholder = JsObject::with_null_proto();
            module_obj
                .set(js_string!("exports"), JsValue::from(placeholder.clone()), true, context)
                .map_err(|e| runtime_err(resolved, &e))?;
            self.state
                .borrow_mut()
                .cache
                .insert(resolved.to_string(), JsValue::from(placeholder));

            self.run_commonjs(context, resolved, transpiled_source, &module_obj, false, require_origin)?;

            let final_exports = module_obj
                .get(js_string!("exports"), context)
                .map_err(|e| runtime_err(resolved, &e))?;
            self.state
                .borrow_mut()
                .cache
                .insert(resolved.to_string(), final_exports.clone());
            return Ok(final_exports);
        }

        match extension.as_deref() {
            Some("json") => {
                let value = boa_engine::JsValue::from_json(
                    &serde_json::from_str(source).map_err(|e| CellError::Compile {
                        filename: resolved.to_string(),
                        line: 0,
                        message: e.to_string(),
                    })?,
                    context,
                )
                .map_err(|e| runtime_err(resolved, &e))?;
                self.state.borrow_mut().cache.insert(resolved.to_string(), value.clone());
                Ok(value)
            }
            Some("mjs") => {
                let namespace = self.eval_module_raw(context, resolved, source)?;
                let keys = namespace.own_property_keys(context).unwrap_or_default();
                let default_export = namespace
                    .get(js_string!("default"), context)
                    .map_err(|e| runtime_err(resolved, &e))?;
                let sole_default = keys.len() == 1 && !default_export.is_undefined();

                let value = if sole_default {
                    default_export
                } else {
                    let exports = JsObject::with_null_proto();
                    for key in keys {
                        let value = namespace
                            .get(key.clone(), context)
                            .map_err(|e| runtime_err(resolved, &e))?;
                        exports
                            .set(key, value, true, context)
                            .map_err(|e| runtime_err(resolved, &e))?;
                    }
                    JsValue::from(exports)
                };
                self.state.borrow_mut().cache.insert(resolved.to_string(), value.clone());
                Ok(value)
            }
            _ => {
                let module_obj = JsObject::with_null_proto();
                let placeholder = JsObject::with_null_proto();
                module_obj
                    .set(js_string!("exports"), JsValue::from(placeholder.clone()), true, context)
                    .map_err(|e| runtime_err(resolved, &e))?;
                self.state
                    .borrow_mut()
                    .cache
                    .insert(resolved.to_string(), JsValue::from(placeholder));

                self.run_commonjs(context, resolved, source, &module_obj, false, require_origin)?;

                let final_exports = module_obj
                    .get(js_string!("exports"), context)
                    .map_err(|e| runtime_err(resolved, &e))?;
                self.state
                    .borrow_mut()
                    .cache
                    .insert(resolved.to_string(), final_exports.clone());
                Ok(final_exports)
            }
        }
    }

    fn eval_module_raw(&self, context: &mut Context, resolved: &str, source: &str) -> Result<JsObject, CellError> {
        let parsed = Source::from_bytes(source.as_bytes());
        let module = Module::parse(parsed, None, context).map_err(|e| compile_err(resolved, &e))?;
        let promise: JsPromise = module.load_link_evaluate(context);
        context.run_jobs();
        match promise.state() {
            boa_engine::object::builtins::PromiseState::Fulfilled(_) => Ok(module.namespace(context)),
            boa_engine::object::builtins::PromiseState::Rejected(reason) => {
                Err(runtime_err(resolved, &boa_engine::JsError::from_opaque(reason)))
            }
            boa_engine::object::builtins::PromiseState::Pending => Err(CellError::Runtime {
                filename: resolved.to_string(),
                line: 0,
                message: "module evaluation did not settle synchronously".to_string(),
            }),
        }
    }

    fn run_commonjs(
        &self,
        context: &mut Context,
        resolved: &str,
        source: &str,
        module_obj: &JsObject,
        strict: bool,
        require_origin: Option<&str>,
    ) -> Result<(), CellError> {
        let prologue = if strict { "\"use strict\";\n" } else { "" };
        let mut dirname_path = LogicalPath::new(resolved);
        dirname_path.strip();
        let dirname = dirname_path.to_path_string();

        let wrapped =
            format!("{prologue}(function (exports, require, module, __filename, __dirname) {{\n{source}\n}})");
        let parsed = Source::from_bytes(wrapped.as_bytes());
        let wrapper = context.eval(parsed).map_err(|e| compile_err(resolved, &e))?;
        let function = wrapper
            .as_object()
            .filter(|o| o.is_callable())
            .ok_or_else(|| CellError::Compile {
                filename: resolved.to_string(),
                line: 0,
                message: "module body did not evaluate to a callable wrapper".to_string(),
            })?;

        let exports_value = module_obj
            .get(js_string!("exports"), context)
            .map_err(|e| runtime_err(resolved, &e))?;
        let require_fn = self.make_require_function(context, require_origin);
        let args = [
            exports_value,
            require_fn,
            JsValue::from(module_obj.clone()),
            JsValue::from(js_string!(resolved)),
            JsValue::from(js_string!(dirname)),
        ];

        match function.call(&JsValue::undefined(), &args, context) {
            Ok(_) => Ok(()),
            Err(e) if !strict && e.to_string().contains("Syntax") => {
                self.run_commonjs(context, resolved, source, module_obj, true, require_origin)
            }
            Err(e) => Err(runtime_err(resolved, &e)),
        }
    }

    /// Build a `require` bound to `origin` (`None` for the global,
    /// top-level one). Every module it successfully loads gets *its own*
    /// `require`, bound to itself — only the very first, top-level call
    /// ever passes `None` onward.
    fn make_require_function(&self, context: &mut Context, origin: Option<&str>) -> JsValue {
        let loader = self.clone();
        let origin = origin.map(str::to_string);

        let native = NativeFunction::from_closure(move |_this, args, context| {
            let specifier_value = args.first().cloned().unwrap_or_else(JsValue::undefined);
            let specifier = specifier_value.to_string(context)?.to_std_string_escaped();
            let resolved = loader
                .resolve(origin.as_deref(), &specifier)
                .map_err(cell_error_to_js)?;
            loader
                .load(context, &resolved, Some(&resolved))
                .map_err(cell_error_to_js)
        });

        let function = FunctionObjectBuilder::new(context.realm(), native)
            .name(js_string!("require"))
            .length(1)
            .build();
        JsValue::from(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spherefs::{Roots, SphereFs};

    fn loader(dir: &std::path::Path) -> ModuleLoader {
        let io = FileIo::new(SphereFs::new(Roots {
            source: dir.to_path_buf(),
            output: dir.join("out"),
            system: dir.join("system"),
            user: None,
        }));
        ModuleLoader::new(io)
    }

    #[test]
    fn resolves_exact_then_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("lib")).unwrap();
        std::fs::write(tmp.path().join("lib/a.js"), "module.exports = 1;").unwrap();
        let loader = loader(tmp.path());
        let resolved = loader.resolve(None, "a").unwrap();
        assert_eq!(resolved, "$/lib/a.js");
    }

    #[test]
    fn sigil_prefixed_specifier_resolves_absolutely() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.mjs"), "export default 1;").unwrap();
        let loader = loader(tmp.path());
        let resolved = loader.resolve(None, "$/a").unwrap();
        assert_eq!(resolved, "$/a.mjs");
    }

    #[test]
    fn index_suffix_is_tried_last() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("lib/pkg")).unwrap();
        std::fs::write(tmp.path().join("lib/pkg/index.js"), "module.exports = 1;").unwrap();
        let loader = loader(tmp.path());
        let resolved = loader.resolve(None, "pkg").unwrap();
        assert_eq!(resolved, "$/lib/pkg/index.js");
    }

    #[test]
    fn package_json_main_field_is_honored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("lib/pkg")).unwrap();
        std::fs::write(tmp.path().join("lib/pkg/package.json"), r#"{"main": "lib.js"}"#).unwrap();
        std::fs::write(tmp.path().join("lib/pkg/lib.js"), "module.exports = 1;").unwrap();
        let loader = loader(tmp.path());
        let resolved = loader.resolve(None, "pkg").unwrap();
        assert_eq!(resolved, "$/lib/pkg/lib.js");
    }

    #[test]
    fn relative_specifier_resolves_against_requiring_module() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/helper.js"), "module.exports = 1;").unwrap();
        let loader = loader(tmp.path());
        let resolved = loader.resolve(Some("$/src/main.js"), "./helper").unwrap();
        assert_eq!(resolved, "$/src/helper.js");
    }

    #[test]
    fn relative_specifier_at_global_scope_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader(tmp.path());
        assert!(matches!(
            loader.resolve(None, "./helper"),
            Err(CellError::Js {
                kind: JsErrorKind::TypeError,
                ..
            })
        ));
    }

    #[test]
    fn missing_module_is_resolution_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader(tmp.path());
        assert!(matches!(
            loader.resolve(None, "nope"),
            Err(CellError::ResolutionFailed(_))
        ));
    }

    #[test]
    fn registered_transpiler_takes_precedence_over_native_mjs_parsing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.mjs"), "this is not valid module syntax at all!").unwrap();
        let loader = loader(tmp.path());

        let mut bridge = Bridge::new();
        let transpiler = bridge
            .eval_script(
                "transpiler.js",
                "(function (source, options) { return 'module.exports = 42;'; })",
            )
            .unwrap();
        loader.set_transpiler(transpiler.into_raw());

        let handle = loader.load_main(&mut bridge, "$/a.mjs").unwrap();
        assert_eq!(bridge.to_number(&handle).unwrap(), 42.0);
    }

    #[test]
    fn shebang_is_stripped_before_parsing() {
        assert_eq!(strip_shebang("#!/usr/bin/env cell\nvar x = 1;"), "var x = 1;");
        assert_eq!(strip_shebang("var x = 1;"), "var x = 1;");
    }
}
