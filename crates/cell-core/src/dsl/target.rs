//! Target handle objects (C8): the plain JS objects scripts get back from
//! `files()`, `install()`, and `tool.stage()` so a [`Target`] can be passed
//! around and fed into a later DSL call.
//!
//! Unlike `FileStream`/`DirectoryStream`, a wrapped target exposes no native
//! methods to script — it only ever flows back into another `install()` or
//! `tool.stage()` call. It's stored in the same [`HostRegistry`] arena used
//! for stream state, keyed by a hidden handle property, so a `files()`
//! result (never registered on the shared [`TargetGraph`](crate::graph::TargetGraph))
//! round-trips exactly as well as a staged or installed one.

use crate::graph::Target;
use crate::js::{js_error_to_cell, HostHandle, HostRegistry};
use boa_engine::{js_string, Context, JsObject, JsValue};
use cell_schema::CellError;
use std::cell::RefCell;
use std::rc::Rc;

const HANDLE_PROPERTY: &str = "__targetHandle";

/// Wrap a target as the object script sees, stashing it in `registry` under
/// a fresh handle.
pub(crate) fn wrap_target(
    context: &mut Context,
    registry: &Rc<RefCell<HostRegistry>>,
    target: Rc<Target>,
) -> Result<JsObject, CellError> {
    let name = target.name.clone();
    let output = target.output.clone();
    let handle = registry.borrow_mut().insert(target);

    let object = JsObject::with_null_proto();
    object
        .set(js_string!("name"), js_string!(name), true, context)
        .map_err(|e| js_error_to_cell("<target>", &e))?;
    object
        .set(js_string!("output"), js_string!(output), true, context)
        .map_err(|e| js_error_to_cell("<target>", &e))?;
    object
        .set(js_string!(HANDLE_PROPERTY), f64::from(handle.as_u32()), true, context)
        .map_err(|e| js_error_to_cell("<target>", &e))?;
    Ok(object)
}

/// Recover the target behind a handle object, if `value` is one.
pub(crate) fn read_target(
    value: &JsValue,
    context: &mut Context,
    registry: &Rc<RefCell<HostRegistry>>,
) -> Option<Rc<Target>> {
    let object = value.as_object()?;
    let raw = object.get(js_string!(HANDLE_PROPERTY), context).ok()?;
    let handle = HostHandle::from_u32(raw.as_number()? as u32);
    registry.borrow().get::<Rc<Target>>(handle).cloned()
}
