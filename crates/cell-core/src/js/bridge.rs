//! The concrete engine binding. Everything here is private to this module
//! except the three types callers actually need: [`Bridge`] itself,
//! [`ValueHandle`] (an opaque, cloneable reference to a JS value), and
//! [`NativeCallback`] / [`StashKey`] for installing and pinning values.

use boa_engine::object::builtins::JsPromise;
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{
    js_string, Context, JsError, JsNativeError, JsValue, Module, NativeFunction, Source,
};
use cell_schema::{CellError, JsErrorKind};
use std::cell::RefCell;
use std::rc::Rc;

/// An opaque, cheaply-cloneable reference to a JS value.
///
/// Cloning a handle is a refcount bump on the underlying engine value, not a
/// deep copy; that's what makes it safe to pass by value through the DSL
/// layer and back into native callbacks.
#[derive(Clone)]
pub struct ValueHandle(JsValue);

impl std::fmt::Debug for ValueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ValueHandle({})", self.0.display())
    }
}

impl ValueHandle {
    /// Wrap a raw engine value. Only exposed within the crate: the loader
    /// needs it to hand module namespaces and `require()` results back
    /// across the js/loader boundary.
    pub(crate) fn from_raw(value: JsValue) -> Self {
        Self(value)
    }

    /// Unwrap back to the raw engine value.
    pub(crate) fn into_raw(self) -> JsValue {
        self.0
    }

    /// `undefined`, constructible without a live [`Bridge`] — native
    /// callbacks only ever see a `&[ValueHandle]`, not the engine itself.
    pub fn undefined() -> Self {
        Self(JsValue::undefined())
    }

    /// `null`.
    pub fn null() -> Self {
        Self(JsValue::null())
    }

    /// A boolean value, constructible without a live [`Bridge`].
    pub fn from_bool(b: bool) -> Self {
        Self(JsValue::from(b))
    }

    /// A number value, constructible without a live [`Bridge`].
    pub fn from_f64(n: f64) -> Self {
        Self(JsValue::from(n))
    }

    /// A string value, constructible without a live [`Bridge`].
    pub fn from_str(s: &str) -> Self {
        Self(JsValue::from(js_string!(s)))
    }

    /// Whether this is `undefined`.
    pub fn is_undefined(&self) -> bool {
        self.0.is_undefined()
    }

    /// Read this value as a `bool`, without JS truthiness coercion: only a
    /// literal boolean value returns `Some`.
    pub fn as_bool(&self) -> Option<bool> {
        self.0.as_boolean()
    }

    /// Read this value as an `f64`, without coercion: only a literal
    /// number value returns `Some`.
    pub fn as_f64(&self) -> Option<f64> {
        self.0.as_number()
    }

    /// Read this value as a `String`, without coercion: only a literal
    /// string value returns `Some`.
    pub fn as_str(&self) -> Option<String> {
        self.0.as_string().map(boa_engine::JsString::to_std_string_escaped)
    }
}

/// A Rust function installable as a JS-callable property.
///
/// Callbacks only ever see [`ValueHandle`]s, never the engine's own value
/// type; anything they need from the rest of the build (the visor, the file
/// façade, the target graph) they close over directly.
pub type NativeCallback = Box<dyn Fn(&[ValueHandle]) -> Result<ValueHandle, CellError>>;

/// A slot in the bridge's stash: a value pinned so it outlives the call
/// that produced it (a `Tool` or `Target` handed to script now, invoked
/// again on a later build pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StashKey(usize);

impl StashKey {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// The embedded engine, plus a flat stash of long-lived values.
///
/// The stash lives behind its own `Rc<RefCell<_>>` rather than as a plain
/// field: a `require()` or `tool()` binding registered deep in the DSL
/// layer needs to pin a value from inside a native call that only ever
/// receives `&mut Context`, never `&mut Bridge` itself.
pub struct Bridge {
    context: Context,
    stash: Rc<RefCell<Vec<JsValue>>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("stashed", &self.stash.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort line extraction from boa's own error message. Boa's parser
/// renders a position as `"... at line <N>, col <N>"`; runtime exceptions
/// carry no such suffix, so callers simply get `0` back (the existing
/// fallback) when none is found.
pub(crate) fn extract_line(message: &str) -> u32 {
    message
        .find("line ")
        .map(|idx| &message[idx + "line ".len()..])
        .and_then(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .unwrap_or(0)
}

pub(crate) fn js_error_to_cell(filename: &str, err: &JsError) -> CellError {
    let message = err.to_string();
    let line = extract_line(&message);
    CellError::Runtime {
        filename: filename.to_string(),
        line,
        message,
    }
}

pub(crate) fn cell_error_to_js(err: CellError) -> JsError {
    let kind = err.js_kind();
    let message = err.to_string();
    let native = match kind {
        JsErrorKind::Error => JsNativeError::error(),
        JsErrorKind::RangeError => JsNativeError::range(),
        JsErrorKind::ReferenceError => JsNativeError::reference(),
        JsErrorKind::SyntaxError => JsNativeError::syntax(),
        JsErrorKind::TypeError => JsNativeError::typ(),
        JsErrorKind::UriError => JsNativeError::uri(),
    };
    native.with_message(message).into()
}

impl Bridge {
    /// Direct access to the engine context, for the loader's `require()`
    /// binding, which needs to evaluate further modules reentrantly from
    /// inside a native call.
    pub(crate) fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// A clone of the stash handle, for bindings that need to pin values
    /// from inside a native closure without routing back through
    /// [`Bridge`] itself.
    pub(crate) fn stash_handle(&self) -> Rc<RefCell<Vec<JsValue>>> {
        Rc::clone(&self.stash)
    }

    /// Spin up a fresh engine instance with no globals beyond the
    /// standard library.
    pub fn new() -> Self {
        Self {
            context: Context::default(),
            stash: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// `undefined`.
    pub fn undefined(&self) -> ValueHandle {
        ValueHandle::undefined()
    }

    /// `null`.
    pub fn null(&self) -> ValueHandle {
        ValueHandle::null()
    }

    /// A boolean value.
    pub fn boolean(&self, b: bool) -> ValueHandle {
        ValueHandle::from_bool(b)
    }

    /// A number value.
    pub fn number(&self, n: f64) -> ValueHandle {
        ValueHandle::from_f64(n)
    }

    /// A string value.
    pub fn string(&self, s: &str) -> ValueHandle {
        ValueHandle(JsValue::from(js_string!(s)))
    }

    /// A freshly allocated, prototype-less plain object.
    pub fn new_object(&mut self) -> ValueHandle {
        ValueHandle(boa_engine::JsObject::with_null_proto().into())
    }

    /// A freshly allocated array holding `items`, in order.
    pub fn new_array(&mut self, items: &[ValueHandle]) -> ValueHandle {
        let values: Vec<JsValue> = items.iter().map(|v| v.0.clone()).collect();
        let array = boa_engine::object::builtins::JsArray::from_iter(values, &mut self.context);
        ValueHandle(array.into())
    }

    /// The global object, as a value.
    pub fn global_object(&mut self) -> ValueHandle {
        ValueHandle(self.context.global_object().into())
    }

    /// Read a global by name.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Runtime`] if the lookup itself throws (e.g. a
    /// getter defined on the global object).
    pub fn get_global(&mut self, name: &str) -> Result<ValueHandle, CellError> {
        let global = self.context.global_object();
        global
            .get(js_string!(name), &mut self.context)
            .map(ValueHandle)
            .map_err(|e| js_error_to_cell("<global>", &e))
    }

    /// Assign a global by name, creating it if absent.
    pub fn set_global(&mut self, name: &str, value: ValueHandle) -> Result<(), CellError> {
        let global = self.context.global_object();
        global
            .set(js_string!(name), value.0, true, &mut self.context)
            .map_err(|e| js_error_to_cell("<global>", &e))
    }

    /// Read a property off a value.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::ToolFailure`] if `target` isn't an object, or
    /// [`CellError::Runtime`] if a getter throws.
    pub fn get_property(&mut self, target: &ValueHandle, name: &str) -> Result<ValueHandle, CellError> {
        let object = target
            .0
            .as_object()
            .ok_or_else(|| CellError::ToolFailure(format!("'{name}': not an object")))?;
        object
            .get(js_string!(name), &mut self.context)
            .map(ValueHandle)
            .map_err(|e| js_error_to_cell("<bridge>", &e))
    }

    /// Assign a property on a value.
    pub fn set_property(
        &mut self,
        target: &ValueHandle,
        name: &str,
        value: ValueHandle,
    ) -> Result<(), CellError> {
        let object = target
            .0
            .as_object()
            .ok_or_else(|| CellError::ToolFailure(format!("'{name}': not an object")))?;
        object
            .set(js_string!(name), value.0, true, &mut self.context)
            .map_err(|e| js_error_to_cell("<bridge>", &e))
    }

    /// Whether a value can be invoked as a function.
    pub fn is_callable(&self, value: &ValueHandle) -> bool {
        value.0.as_object().is_some_and(|o| o.is_callable())
    }

    /// Call a function value with an explicit receiver.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::ToolFailure`] if `func` isn't callable, or
    /// [`CellError::Runtime`] if the call throws.
    pub fn call(
        &mut self,
        func: &ValueHandle,
        this: &ValueHandle,
        args: &[ValueHandle],
    ) -> Result<ValueHandle, CellError> {
        let function = func
            .0
            .as_object()
            .filter(|o| o.is_callable())
            .ok_or_else(|| CellError::ToolFailure("value is not callable".to_string()))?;
        let js_args: Vec<JsValue> = args.iter().map(|a| a.0.clone()).collect();
        function
            .call(&this.0, &js_args, &mut self.context)
            .map(ValueHandle)
            .map_err(|e| js_error_to_cell("<bridge>", &e))
    }

    /// Install a native function as a named, writable property on
    /// `target`.
    pub fn register_native_function(
        &mut self,
        target: &ValueHandle,
        name: &str,
        arity: usize,
        callback: NativeCallback,
    ) -> Result<(), CellError> {
        let object = target
            .0
            .as_object()
            .ok_or_else(|| CellError::ToolFailure(format!("'{name}': not an object")))?;

        let native = NativeFunction::from_closure(move |_this, args, _context| {
            let handles: Vec<ValueHandle> = args.iter().cloned().map(ValueHandle).collect();
            callback(&handles).map(|v| v.0).map_err(cell_error_to_js)
        });

        let function = FunctionObjectBuilder::new(self.context.realm(), native)
            .name(js_string!(name))
            .length(arity as u32)
            .build();

        object
            .set(js_string!(name), function, true, &mut self.context)
            .map_err(|e| js_error_to_cell("<bridge>", &e))
    }

    /// Evaluate a classic script.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Compile`] if parsing fails, or
    /// [`CellError::Runtime`] if evaluation throws.
    pub fn eval_script(&mut self, filename: &str, source: &str) -> Result<ValueHandle, CellError> {
        let parsed = boa_engine::Source::from_bytes(source.as_bytes());
        self.context.eval(parsed).map(ValueHandle).map_err(|e| {
            let message = e.to_string();
            if message.contains("Syntax") {
                CellError::Compile {
                    filename: filename.to_string(),
                    line: extract_line(&message),
                    message,
                }
            } else {
                js_error_to_cell(filename, &e)
            }
        })
    }

    /// Evaluate a native ECMAScript module and return its namespace object.
    ///
    /// Boa's own module linker resolves `import`/`export`, so this never
    /// transpiles; a `.mjs` file with syntax the linked engine can't parse
    /// surfaces as a compile error the same as a `.js` file would.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Compile`] on a parse/link failure, or
    /// [`CellError::Runtime`] if the module body throws.
    pub fn eval_module(&mut self, filename: &str, source: &str) -> Result<ValueHandle, CellError> {
        let parsed = Source::from_bytes(source.as_bytes());
        let module = Module::parse(parsed, None, &mut self.context).map_err(|e| {
            let message = e.to_string();
            CellError::Compile {
                filename: filename.to_string(),
                line: extract_line(&message),
                message,
            }
        })?;

        let promise: JsPromise = module.load_link_evaluate(&mut self.context);
        self.context.run_jobs();

        match promise.state() {
            boa_engine::object::builtins::PromiseState::Fulfilled(_) => {
                let namespace = module.namespace(&mut self.context);
                Ok(ValueHandle(namespace.into()))
            }
            boa_engine::object::builtins::PromiseState::Rejected(reason) => {
                Err(js_error_to_cell(filename, &JsError::from_opaque(reason)))
            }
            boa_engine::object::builtins::PromiseState::Pending => Err(CellError::Runtime {
                filename: filename.to_string(),
                line: 0,
                message: "module evaluation did not settle synchronously".to_string(),
            }),
        }
    }

    /// Drain any pending microtasks (timers and promise reactions queued
    /// by a tool callback or script body).
    pub fn run_pending_jobs(&mut self) {
        self.context.run_jobs();
    }

    /// Convert a value to a Rust `bool` using JS truthiness rules.
    pub fn to_bool(&self, value: &ValueHandle) -> bool {
        value.0.to_boolean()
    }

    /// Convert a value to `f64`.
    pub fn to_number(&mut self, value: &ValueHandle) -> Result<f64, CellError> {
        value
            .0
            .to_number(&mut self.context)
            .map_err(|e| js_error_to_cell("<bridge>", &e))
    }

    /// Convert a value to a Rust `String`.
    pub fn to_string(&mut self, value: &ValueHandle) -> Result<String, CellError> {
        value
            .0
            .to_string(&mut self.context)
            .map(|s| s.to_std_string_escaped())
            .map_err(|e| js_error_to_cell("<bridge>", &e))
    }

    /// Convert a value to a [`serde_json::Value`], the mirror image of how
    /// the loader turns parsed JSON into a JS value with `JsValue::from_json`.
    /// Lets callers (the driver, reading `Sphere.Game` back) deserialize a
    /// whole plain object through `serde` instead of walking it property by
    /// property.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Runtime`] if the value contains something JSON
    /// can't represent (a function, a `BigInt`, a cyclic reference).
    pub fn to_json(&mut self, value: &ValueHandle) -> Result<serde_json::Value, CellError> {
        value
            .0
            .to_json(&mut self.context)
            .map_err(|e| js_error_to_cell("<bridge>", &e))
    }

    /// Pin a value in the stash, returning a key that retrieves it later
    /// regardless of whether script still references it.
    pub fn stash(&mut self, value: ValueHandle) -> StashKey {
        let mut stash = self.stash.borrow_mut();
        stash.push(value.0);
        StashKey::new(stash.len() - 1)
    }

    /// Retrieve a previously stashed value.
    pub fn unstash(&self, key: StashKey) -> Option<ValueHandle> {
        self.stash.borrow().get(key.index()).cloned().map(ValueHandle)
    }
}
