//! Native-to-JS tool invocation (C9): bridges [`crate::graph::ToolRunner`]
//! to a `Tool` object defined in script (`new Tool(callback, verb)`).
//!
//! The graph decides *whether* a target is stale and reports the
//! before/after mtime check; this module only has to marshal the call,
//! passing `output` first and `inputs` second — `tool_run`'s own calling
//! convention in the original (`callback(outputPath, inputsArray)`).

use crate::graph::ToolRunner;
use crate::js::{Bridge, StashKey};
use cell_schema::CellError;
use std::cell::RefCell;
use std::rc::Rc;

/// A tool backed by a script-defined callback.
///
/// Holds a [`StashKey`] rather than the callback value directly so the
/// bridge's stash — not this struct — owns the rooting; many `JsTool`s can
/// share one engine without juggling lifetimes.
pub struct JsTool {
    name: String,
    callback: StashKey,
    bridge: Rc<RefCell<Bridge>>,
}

impl JsTool {
    /// Wrap a stashed JS callback as a [`ToolRunner`].
    pub fn new(name: impl Into<String>, callback: StashKey, bridge: Rc<RefCell<Bridge>>) -> Self {
        Self {
            name: name.into(),
            callback,
            bridge,
        }
    }
}

impl ToolRunner for JsTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, output: &str, inputs: &[String]) -> Result<(), CellError> {
        let mut bridge = self.bridge.borrow_mut();
        let callback = bridge.unstash(self.callback).ok_or_else(|| {
            CellError::ToolFailure(format!("tool '{}' callback is no longer available", self.name))
        })?;

        if !bridge.is_callable(&callback) {
            return Err(CellError::ToolFailure(format!(
                "tool '{}' callback is not a function",
                self.name
            )));
        }

        let input_values: Vec<_> = inputs.iter().map(|path| bridge.string(path)).collect();
        let inputs_array = bridge.new_array(&input_values);
        let output_value = bridge.string(output);
        let this = bridge.undefined();

        bridge
            .call(&callback, &this, &[output_value, inputs_array])
            .map(|_| ())
            .map_err(|e| match e {
                CellError::Runtime { message, .. } => CellError::ToolFailure(message),
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_callback_fails_loudly() {
        let bridge = Rc::new(RefCell::new(Bridge::new()));
        let mut b = bridge.borrow_mut();
        let stray = b.stash(b.undefined());
        drop(b);
        // Unstash succeeds (undefined is a valid stashed value) but it isn't
        // callable, so run() must fail rather than silently no-op.
        let tool = JsTool::new("noop", stray, Rc::clone(&bridge));
        assert!(tool.run("@/out.txt", &[]).is_err());
    }
}
