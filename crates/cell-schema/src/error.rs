//! The closed error taxonomy produced by the core (spec.md §7).

use crate::manifest::DescriptorError;
use thiserror::Error;

/// The JS error class a [`CellError`] should surface as when it's thrown
/// back into script (spec.md §4.5: "construct an Error with (kind ∈
/// {Error, RangeError, ReferenceError, SyntaxError, TypeError, URIError},
/// message, filename, line)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsErrorKind {
    /// Generic `Error`.
    Error,
    /// `RangeError` — a numeric argument outside its valid domain.
    RangeError,
    /// `ReferenceError` — a `require()` specifier that couldn't be found.
    ReferenceError,
    /// `SyntaxError` — a script or module that failed to compile.
    SyntaxError,
    /// `TypeError` — wrong argument type, or a constructor called without
    /// `new`.
    TypeError,
    /// `URIError` — a malformed URI passed to a URI-decoding builtin.
    UriError,
}

/// Every error kind the build engine can produce.
///
/// Compile/descriptor errors abort the build immediately; tool errors and
/// sandbox violations are collected by the visor and only turn into a
/// nonzero exit code at the end of the run. See spec.md §7 for the full
/// propagation policy.
#[derive(Debug, Error)]
pub enum CellError {
    /// A `resolve()` step would escape the logical root, or named an
    /// unconfigured root (`~/` with no user path configured).
    #[error("sandbox violation: '{0}'")]
    SandboxViolation(String),

    /// A `require()` specifier could not be resolved to an existing file.
    #[error("no existing files match '{0}'")]
    ResolutionFailed(String),

    /// A script or module failed to compile.
    #[error("{message} ({filename}:{line})")]
    Compile {
        /// Source file that failed to compile.
        filename: String,
        /// 1-based line number, when known.
        line: u32,
        /// Compiler-reported message.
        message: String,
    },

    /// An uncaught JS exception escaped a script evaluation or tool
    /// callback.
    #[error("{message} ({filename}:{line})")]
    Runtime {
        /// Source file the exception was thrown from.
        filename: String,
        /// 1-based line number, when known.
        line: u32,
        /// Stringified exception.
        message: String,
    },

    /// Two or more targets produced the same output path.
    #[error("{count}-way conflict '{path}'")]
    Conflict {
        /// Number of targets sharing the path.
        count: usize,
        /// The shared output path.
        path: String,
    },

    /// A required game-descriptor field was missing or malformed.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// A tool callback threw, emitted an error to the visor, or failed to
    /// produce its output file.
    #[error("{0}")]
    ToolFailure(String),

    /// An underlying filesystem call failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The logical path the operation was attempted against.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A DSL binding rejecting its own arguments (wrong type, missing
    /// `new`, out-of-range constant, ...), carrying the exact JS error
    /// class it should throw as rather than the generic default.
    #[error("{message}")]
    Js {
        /// The JS error class to construct when this crosses back into
        /// script.
        kind: JsErrorKind,
        /// The error message.
        message: String,
    },
}

impl CellError {
    /// Whether this error kind should abort the build immediately rather
    /// than being collected and reported at the end.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CellError::Compile { .. } | CellError::Descriptor(_)
        )
    }

    /// The JS error class this should surface as when thrown back into
    /// script (spec.md §4.5). Grounded in `build.c`'s own `duk_error_blame`
    /// call sites: "constructor requires 'new'" and a top-level relative
    /// `require()` both throw `TypeError`; "module not found" throws
    /// `ReferenceError`; everything else not explicitly overridden throws
    /// a plain `Error`.
    pub fn js_kind(&self) -> JsErrorKind {
        match self {
            CellError::Js { kind, .. } => *kind,
            CellError::ResolutionFailed(_) => JsErrorKind::ReferenceError,
            CellError::Compile { .. } => JsErrorKind::SyntaxError,
            CellError::SandboxViolation(_) => JsErrorKind::TypeError,
            CellError::Runtime { .. }
            | CellError::Conflict { .. }
            | CellError::Descriptor(_)
            | CellError::ToolFailure(_)
            | CellError::Io { .. } => JsErrorKind::Error,
        }
    }
}
