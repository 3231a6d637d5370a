//! Manifest and persisted-state types written under `@/` by the build
//! driver: `game.json`, `game.sgm`, `artifacts.json`, `sources.json`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The Sphere-v2 game descriptor, populated by Cellscripts via `Sphere.Game`.
///
/// Serializes directly to `game.json`. Fields mirror what scripts assign;
/// `resolution` and `main` are validated by the driver before a manifest is
/// ever written (see [`GameDescriptor::validate`]).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GameDescriptor {
    /// Display name of the game.
    pub name: Option<String>,
    /// Author credit.
    pub author: Option<String>,
    /// One-line summary.
    pub summary: Option<String>,
    /// `"WxH"` screen resolution string.
    pub resolution: Option<String>,
    /// Output-root-relative path of the runtime entry point script.
    pub main: Option<String>,
    /// Any extra fields a script assigned on `Sphere.Game` that aren't one
    /// of the well-known ones above; preserved verbatim in `game.json`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A field missing or of the wrong shape on the game descriptor.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// `resolution` was absent or didn't match `^\d+x\d+$`.
    #[error("missing or invalid 'resolution' field")]
    InvalidResolution,
    /// `main` was absent or not a string.
    #[error("missing or invalid 'main' field")]
    MissingMain,
    /// `main` resolved outside of `@/`.
    #[error("'main': illegal prefix '{0}/' in filename")]
    MainOutsideOutputRoot(String),
    /// `main` named a file that doesn't exist.
    #[error("'main': file not found '{0}'")]
    MainNotFound(String),
}

/// The parsed `"WxH"` resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Screen width in pixels.
    pub width: u32,
    /// Screen height in pixels.
    pub height: u32,
}

impl GameDescriptor {
    /// Parse and validate the `resolution` field.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::InvalidResolution`] if the field is
    /// missing or doesn't match `^\d+x\d+$`.
    pub fn parse_resolution(&self) -> Result<Resolution, DescriptorError> {
        let raw = self
            .resolution
            .as_deref()
            .ok_or(DescriptorError::InvalidResolution)?;
        let (w, h) = raw
            .split_once('x')
            .ok_or(DescriptorError::InvalidResolution)?;
        let width: u32 = w.parse().map_err(|_| DescriptorError::InvalidResolution)?;
        let height: u32 = h.parse().map_err(|_| DescriptorError::InvalidResolution)?;
        Ok(Resolution { width, height })
    }
}

/// The legacy SGMv1 key=value manifest (`game.sgm`).
#[derive(Debug, Clone)]
pub struct SgmManifest {
    /// Display name.
    pub name: String,
    /// Author credit.
    pub author: String,
    /// Description (SGMv1's name for `summary`).
    pub description: String,
    /// Screen width.
    pub screen_width: u32,
    /// Screen height.
    pub screen_height: u32,
    /// Main script path, relative to `@/scripts`.
    pub script: String,
}

impl SgmManifest {
    /// Render as the `\n`-terminated `key=value` text format, one field per
    /// line, in the fixed order spec.md §6 requires.
    pub fn to_text(&self) -> String {
        format!(
            "name={}\nauthor={}\ndescription={}\nscreen_width={}\nscreen_height={}\nscript={}\n",
            self.name, self.author, self.description, self.screen_width, self.screen_height, self.script
        )
    }
}

/// The debugger source map (`sources.json`), written only in debug mode.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceMap {
    /// Maps each built output path to the source path it was produced from.
    #[serde(rename = "fileMap")]
    pub file_map: BTreeMap<String, String>,
}

/// The artifact list (`artifacts.json`): every output-root-relative path
/// produced or confirmed by the previous successful (or partial) run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ArtifactList(pub Vec<String>);

impl ArtifactList {
    /// An empty artifact list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries present in `self` but not in `other`: what cleanup should
    /// remove after a run.
    pub fn difference<'a>(&'a self, other: &'a ArtifactList) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |p| !other.0.iter().any(|o| o == *p))
            .map(String::as_str)
    }
}
