//! The host bridge (C5): the only module that imports `boa_engine`
//! directly. Everything above this layer talks in [`ValueHandle`],
//! [`NativeCallback`], and [`StashKey`], so the concrete JS engine could be
//! swapped without touching the loader, the DSL bindings, or the driver.
//!
//! The loader (C6) is the one exception: CommonJS `require()` has to call
//! back into the same engine instance from inside a native function, so it
//! reaches past [`Bridge`] to [`Bridge::context_mut`] and works with
//! `boa_engine` directly for that one binding.

mod bridge;
mod registry;

pub use bridge::{Bridge, NativeCallback, StashKey, ValueHandle};
pub(crate) use bridge::{cell_error_to_js, extract_line, js_error_to_cell};
pub use registry::{HostHandle, HostRegistry};
