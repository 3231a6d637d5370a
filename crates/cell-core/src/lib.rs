//! Core engine for Cell: SphereFS, the CommonJS loader, the build DSL, and
//! the target graph.
//!
//! This crate implements the Cellscript build pipeline end to end but stays
//! UI-agnostic — it is driven by `cell-cli` (or any other frontend) through
//! [`driver::BuildContext`] and reports progress through a [`visor::Reporter`]
//! the frontend supplies.
//!
//! # Component map
//!
//! - [`spherefs`] (C2) — the `@/`/`~/`/`#/`/`$/` prefix resolver.
//! - [`fs`] (C3) — the file I/O façade every read/write crosses.
//! - [`visor`] (C4) — diagnostics: operation stack, error/warning counts,
//!   the accumulating artifact list.
//! - [`js`] (C5) — the host bridge; the only module that imports `boa_engine`
//!   outside of [`loader`] and [`dsl`]'s composite-object bindings.
//! - [`loader`] (C6) — CommonJS `require()` resolution and module caching.
//! - [`dsl`] (C7) — the globals a Cellscript sees (`FS`, `tool`, `files`,
//!   `install`, `FileStream`, `DirectoryStream`, `RNG`, `Sphere`).
//! - [`graph`] (C8) — the target DAG and staleness check.
//! - [`tool_invoke`] (C9) — marshals a native build back into a script `Tool`.
//! - [`driver`] (C10) — orchestrates a full build/clean/package run.
//! - [`package`] (C11) — archives a built output tree for distribution.

pub mod driver;
pub mod dsl;
pub mod fs;
pub mod graph;
pub mod js;
pub mod loader;
pub mod package;
pub mod spherefs;
pub mod tool_invoke;
pub mod visor;

pub use driver::BuildContext;
pub use graph::{Target, TargetGraph};
pub use spherefs::{Roots, SphereFs};
pub use visor::{Reporter, Visor};
