//! Shared types and wire format for the Cell packaging compiler.
//!
//! This crate defines the canonical data structures used by both the build
//! engine and the CLI front end: the hop-list path algebra, the persisted
//! manifest/artifact types written under `@/`, and the closed error
//! taxonomy the engine produces.

/// Closed error taxonomy the build engine produces (spec.md §7).
pub mod error;
/// Manifest and persisted-state types (`game.json`, `game.sgm`,
/// `artifacts.json`, `sources.json`).
pub mod manifest;
/// Hop-list path algebra (C1).
pub mod path;

pub use error::{CellError, JsErrorKind};
pub use manifest::{ArtifactList, DescriptorError, GameDescriptor, Resolution, SgmManifest, SourceMap};
pub use path::{CollapseEscapeError, Path};
