//! The build DSL (C7): everything a Cellscript sees as globals.
//!
//! [`files`] and [`install`] are pure Rust (no engine dependency, tested in
//! isolation); [`target`], [`tool`], [`streams`], and [`rng`] each need to
//! build fresh objects/functions from inside a native call and so talk to
//! `boa_engine` directly rather than through the engine-agnostic bridge
//! surface (see [`tool`]'s module doc for why). [`fs_api`] is the one DSL
//! binding simple enough to use the generic [`crate::js::NativeCallback`]
//! abstraction.
//!
//! [`install_globals`] wires all of it onto one engine instance, sharing one
//! [`TargetGraph`], one [`HostRegistry`], and one [`Visor`] across every
//! binding so a `files()` result can be passed straight into
//! `new Tool(...).stage(...)` or `install()`, and a `FileStream` handle can't
//! alias a `DirectoryStream`'s.

pub mod files;
pub mod fs_api;
pub mod install;
pub mod rng;
pub mod streams;
pub mod target;
pub mod tool;

use crate::dsl::target::{read_target, wrap_target};
use crate::fs::FileIo;
use crate::graph::TargetGraph;
use crate::js::{cell_error_to_js, js_error_to_cell, Bridge, HostRegistry};
use crate::visor::Visor;
use boa_engine::object::builtins::JsArray;
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{js_string, JsNativeError, JsObject, JsValue, NativeFunction};
use cell_schema::CellError;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::SystemTime;

/// Shared state every DSL binding closes over.
pub struct DslState {
    pub bridge: Rc<RefCell<Bridge>>,
    pub io: Rc<FileIo>,
    pub graph: Rc<RefCell<TargetGraph>>,
    pub registry: Rc<RefCell<HostRegistry>>,
    pub visor: Rc<Visor>,
    pub platform: String,
    pub version: String,
    /// The Cellscript's own mtime, folded into every target this run
    /// produces so editing the script forces a rebuild on its own.
    pub timestamp_floor: Option<SystemTime>,
}

impl DslState {
    /// A fresh DSL state over one engine, one file façade, and a
    /// driver-owned graph — the driver needs the same graph script
    /// evaluation populates so it can call `build_all` on it afterward.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bridge: Rc<RefCell<Bridge>>,
        io: Rc<FileIo>,
        graph: Rc<RefCell<TargetGraph>>,
        visor: Rc<Visor>,
        platform: impl Into<String>,
        version: impl Into<String>,
        timestamp_floor: Option<SystemTime>,
    ) -> Self {
        Self {
            bridge,
            io,
            graph,
            registry: Rc::new(RefCell::new(HostRegistry::new())),
            visor,
            platform: platform.into(),
            version: version.into(),
            timestamp_floor,
        }
    }
}

/// Install every DSL global onto `state`'s engine.
///
/// # Errors
///
/// Returns an error if any binding can't be wired onto the global object.
pub fn install_globals(state: &DslState) -> Result<(), CellError> {
    let mut bridge = state.bridge.borrow_mut();

    fs_api::install(&mut bridge, Rc::clone(&state.io))?;
    tool::install(
        &mut bridge,
        Rc::clone(&state.bridge),
        Rc::clone(&state.graph),
        Rc::clone(&state.registry),
        state.timestamp_floor,
    )?;
    streams::install(&mut bridge, Rc::clone(&state.io), Rc::clone(&state.registry))?;
    rng::install(&mut bridge, Rc::clone(&state.registry))?;
    install_sphere_object(&mut bridge, &state.platform, &state.version)?;
    install_diagnostics(&mut bridge, Rc::clone(&state.visor))?;
    install_files_and_install(
        &mut bridge,
        Rc::clone(&state.io),
        Rc::clone(&state.visor),
        Rc::clone(&state.graph),
        Rc::clone(&state.registry),
        state.timestamp_floor,
    )?;

    Ok(())
}

fn install_sphere_object(bridge: &mut Bridge, platform: &str, version: &str) -> Result<(), CellError> {
    let context = bridge.context_mut();
    let sphere = JsObject::with_null_proto();

    sphere
        .set(js_string!("Platform"), js_string!(platform), false, context)
        .map_err(|e| js_error_to_cell("<Sphere>", &e))?;
    sphere
        .set(js_string!("Version"), js_string!(version), false, context)
        .map_err(|e| js_error_to_cell("<Sphere>", &e))?;

    // `Sphere.Game` is a plain, mutable object: the script assigns `name`,
    // `author`, `summary`, `resolution`, and `main` directly onto it. The
    // driver reads those properties back once script evaluation finishes,
    // rather than wiring live getters/setters for each field.
    let game = JsObject::with_null_proto();
    sphere
        .set(js_string!("Game"), game, true, context)
        .map_err(|e| js_error_to_cell("<Sphere>", &e))?;

    let global = context.global_object();
    global
        .set(js_string!("Sphere"), sphere, true, context)
        .map_err(|e| js_error_to_cell("<global>", &e))
}

/// `error(msg)` / `warn(msg)` (C4): delegate straight to the visor.
fn install_diagnostics(bridge: &mut Bridge, visor: Rc<Visor>) -> Result<(), CellError> {
    let context = bridge.context_mut();

    {
        let visor = Rc::clone(&visor);
        let native = NativeFunction::from_closure(move |_this, args, context| {
            let message = args
                .first()
                .cloned()
                .unwrap_or_else(JsValue::undefined)
                .to_string(context)?
                .to_std_string_escaped();
            visor.error(message);
            Ok(JsValue::undefined())
        });
        let function = FunctionObjectBuilder::new(context.realm(), native)
            .name(js_string!("error"))
            .length(1)
            .build();
        context
            .global_object()
            .set(js_string!("error"), function, true, context)
            .map_err(|e| js_error_to_cell("<global>", &e))?;
    }

    {
        let native = NativeFunction::from_closure(move |_this, args, context| {
            let message = args
                .first()
                .cloned()
                .unwrap_or_else(JsValue::undefined)
                .to_string(context)?
                .to_std_string_escaped();
            visor.warn(message);
            Ok(JsValue::undefined())
        });
        let function = FunctionObjectBuilder::new(context.realm(), native)
            .name(js_string!("warn"))
            .length(1)
            .build();
        context
            .global_object()
            .set(js_string!("warn"), function, true, context)
            .map_err(|e| js_error_to_cell("<global>", &e))?;
    }

    Ok(())
}

/// `files(pattern, recursive)` and `install(destDir, sources)`: the two
/// globals that read/write [`crate::graph::Target`]s directly, so they share
/// the target-handle marshaling in [`target`].
fn install_files_and_install(
    bridge: &mut Bridge,
    io: Rc<FileIo>,
    visor: Rc<Visor>,
    graph: Rc<RefCell<TargetGraph>>,
    registry: Rc<RefCell<HostRegistry>>,
    timestamp_floor: Option<SystemTime>,
) -> Result<(), CellError> {
    let context = bridge.context_mut();

    {
        let io = Rc::clone(&io);
        let visor = Rc::clone(&visor);
        let registry = Rc::clone(&registry);
        let native = NativeFunction::from_closure(move |_this, args, context| {
            let pattern = args
                .first()
                .cloned()
                .unwrap_or_else(JsValue::undefined)
                .to_string(context)?
                .to_std_string_escaped();
            let recursive = args.get(1).is_some_and(JsValue::to_boolean);

            let matched = self::files::files(&io, &visor, &pattern, recursive, timestamp_floor)
                .map_err(cell_error_to_js)?;

            let mut values = Vec::with_capacity(matched.len());
            for target in matched {
                let object = wrap_target(context, &registry, target).map_err(cell_error_to_js)?;
                values.push(JsValue::from(object));
            }
            Ok(JsValue::from(JsArray::from_iter(values, context)))
        });
        let function = FunctionObjectBuilder::new(context.realm(), native)
            .name(js_string!("files"))
            .length(2)
            .build();
        context
            .global_object()
            .set(js_string!("files"), function, true, context)
            .map_err(|e| js_error_to_cell("<global>", &e))?;
    }

    {
        let native = NativeFunction::from_closure(move |_this, args, context| {
            let dest_dir = args
                .first()
                .cloned()
                .unwrap_or_else(JsValue::undefined)
                .to_string(context)?
                .to_std_string_escaped();

            let sources_value = args.get(1).cloned().unwrap_or_else(JsValue::undefined);
            let invalid_sources = || -> boa_engine::JsError {
                JsNativeError::typ()
                    .with_message("install: sources must be a Target or an array of Targets")
                    .into()
            };

            let mut sources = Vec::new();
            if let Some(target) = read_target(&sources_value, context, &registry) {
                sources.push(target);
            } else {
                let array = sources_value.as_object().ok_or_else(invalid_sources)?;
                let length = array.get(js_string!("length"), context)?.to_u32(context)?;
                for i in 0..length {
                    let item = array.get(i, context)?;
                    let target = read_target(&item, context, &registry).ok_or_else(invalid_sources)?;
                    sources.push(target);
                }
            }

            let targets = self::install::install(&io, &dest_dir, &sources, timestamp_floor);
            for target in targets {
                graph.borrow_mut().add(target);
            }
            Ok(JsValue::undefined())
        });
        let function = FunctionObjectBuilder::new(context.realm(), native)
            .name(js_string!("install"))
            .length(2)
            .build();
        context
            .global_object()
            .set(js_string!("install"), function, true, context)
            .map_err(|e| js_error_to_cell("<global>", &e))?;
    }

    Ok(())
}
