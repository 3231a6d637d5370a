//! `Tool`/`tool.stage()` (C7, C9): wraps a script callback as a reusable,
//! reference-counted build action. A `Tool` never runs its own callback
//! directly — `.stage(outputPath, sources, options?)` only records a new
//! [`Target`] on the shared graph; [`crate::tool_invoke::JsTool`] invokes
//! the callback later, once per stale target, when the graph is built.
//! Because that happens well after the Cellscript that called `Tool(...)`
//! has finished evaluating, the target needs its own way back into the
//! engine — `JsTool` holds a clone of the same `Rc<RefCell<Bridge>>` the
//! driver uses, not a borrow tied to this call.
//!
//! Grounded in `js_new_Tool`/`js_Tool_stage` (build.c): the constructor
//! takes `(callback, verb = "building")`; `stage` takes
//! `(outputPath, sources: Target[], options?)`, requiring `sources` to be
//! array-like (`TypeError: array required (argument #2)` otherwise) of
//! already-existing `Target`s, and returns the freshly staged `Target`
//! itself so it can chain straight into a later `install()`/`.stage()`
//! call. `options.name` overrides the default display name
//! (`path_filename(out_path)`).
//!
//! `Tool`'s own closure and `stage`'s closure are registered directly
//! against `boa_engine`, the same way `loader::ModuleLoader::make_require_function`
//! is: both need to build further objects/functions or walk a JS array from
//! inside a native call, which the engine-agnostic `NativeCallback` in
//! [`crate::js`] deliberately can't do.

use crate::dsl::target::{read_target, wrap_target};
use crate::graph::{Target, TargetGraph};
use crate::js::{cell_error_to_js, js_error_to_cell, Bridge, HostRegistry, StashKey};
use crate::tool_invoke::JsTool;
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{js_string, JsNativeError, JsObject, JsValue, NativeFunction};
use cell_schema::{CellError, Path as LogicalPath};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::SystemTime;

/// Register the global `Tool` constructor.
///
/// # Errors
///
/// Returns an error if the bridge can't wire the global function.
pub fn install(
    bridge: &mut Bridge,
    bridge_rc: Rc<RefCell<Bridge>>,
    graph: Rc<RefCell<TargetGraph>>,
    registry: Rc<RefCell<HostRegistry>>,
    timestamp_floor: Option<SystemTime>,
) -> Result<(), CellError> {
    let stash = bridge.stash_handle();
    let context = bridge.context_mut();

    let ctor = NativeFunction::from_closure(move |_this, args, context| {
        let callback = args.first().cloned().unwrap_or_else(JsValue::undefined);
        if !callback.as_object().is_some_and(|o| o.is_callable()) {
            return Err(JsNativeError::typ()
                .with_message("Tool: first argument must be a function")
                .into());
        }
        let verb = match args.get(1) {
            Some(value) if !value.is_undefined() => value.to_string(context)?.to_std_string_escaped(),
            _ => "building".to_string(),
        };

        let callback_index = {
            let mut stash = stash.borrow_mut();
            stash.push(callback);
            stash.len() - 1
        };

        let graph_for_stage = Rc::clone(&graph);
        let bridge_for_stage = Rc::clone(&bridge_rc);
        let registry_for_stage = Rc::clone(&registry);
        let verb_for_stage = verb.clone();

        let stage = NativeFunction::from_closure(move |_this, args, context| {
            let output = args
                .first()
                .cloned()
                .unwrap_or_else(JsValue::undefined)
                .to_string(context)?
                .to_std_string_escaped();

            let sources_value = args.get(1).cloned().unwrap_or_else(JsValue::undefined);
            let sources_object = sources_value.as_object().ok_or_else(array_required)?;
            let length = sources_object.get(js_string!("length"), context)?.to_u32(context)?;

            let mut sources = Vec::with_capacity(length as usize);
            for i in 0..length {
                let item = sources_object.get(i, context)?;
                let target = read_target(&item, context, &registry_for_stage).ok_or_else(array_required)?;
                sources.push(target);
            }

            let name = match args.get(2).cloned().unwrap_or_else(JsValue::undefined).as_object() {
                Some(options) => {
                    let name_value = options.get(js_string!("name"), context)?;
                    if name_value.is_undefined() {
                        None
                    } else {
                        Some(name_value.to_string(context)?.to_std_string_escaped())
                    }
                }
                None => None,
            };
            let name = name.unwrap_or_else(|| {
                LogicalPath::new(&output)
                    .hops()
                    .last()
                    .cloned()
                    .unwrap_or_default()
            });

            let runner = JsTool::new(
                verb_for_stage.clone(),
                StashKey::new(callback_index),
                Rc::clone(&bridge_for_stage),
            );
            let target = Rc::new(Target {
                name,
                output,
                sources,
                tool: Some(Rc::new(runner)),
                timestamp_floor,
            });
            graph_for_stage.borrow_mut().add(Rc::clone(&target));

            wrap_target(context, &registry_for_stage, target)
                .map(JsValue::from)
                .map_err(cell_error_to_js)
        });

        let stage_fn = FunctionObjectBuilder::new(context.realm(), stage)
            .name(js_string!("stage"))
            .length(3)
            .build();

        let tool_obj = JsObject::with_null_proto();
        tool_obj.set(js_string!("verb"), js_string!(verb), true, context)?;
        tool_obj.set(js_string!("stage"), stage_fn, true, context)?;
        Ok(JsValue::from(tool_obj))
    });

    let tool_fn = FunctionObjectBuilder::new(context.realm(), ctor)
        .name(js_string!("Tool"))
        .length(2)
        .build();

    let global = context.global_object();
    global
        .set(js_string!("Tool"), tool_fn, true, context)
        .map_err(|e| js_error_to_cell("<global>", &e))
}

fn array_required() -> boa_engine::JsError {
    JsNativeError::typ()
        .with_message("array required (argument #2)")
        .into()
}
