//! Plugin manifest discovery, processing and artifact generation.
//!
//! A plugin describes itself with a manifest descriptor: either a
//! `manifest.json` at the project root or a `"plinth": { "manifest": ... }`
//! block inside `package.json`. Each build derives two views of it:
//!
//! - **raw**: the descriptor exactly as the author wrote it. Entry fields
//!   like `main` and `ui` still point at source files, which is what the
//!   watch pipeline diffs against.
//! - **processed**: the descriptor as shipped to the design tool. Entries
//!   are rewritten to built artifact names, defaults are filled in and
//!   null fields are dropped.
//!
//! The processed view is written to `<output>/manifest.json` on every
//! manifest build.

mod builder;
mod reader;

pub use builder::build_manifest;
pub use reader::read_descriptor;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// API version stamped on manifests that do not declare one.
pub const DEFAULT_API_VERSION: &str = "1.0.0";

/// A plugin manifest descriptor.
///
/// Known fields are typed; everything else the author adds is carried
/// through `extra` untouched so the design tool sees it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDescriptor {
    /// Plugin display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Plugin identifier assigned by the design tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Plugin API version the code targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,

    /// Main-thread entry point. A source path in the raw view, `main.js`
    /// in the processed view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    /// UI entry point. A source path in the raw view, `ui.html` in the
    /// processed view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<String>,

    /// Plugin version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Network access declaration, passed through as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_access: Option<Value>,

    /// Any remaining descriptor fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where a descriptor was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorOrigin {
    /// A `manifest.json` file at the project root.
    ManifestJson,
    /// The `"plinth"."manifest"` block of `package.json`.
    PackageJson,
}

impl DescriptorOrigin {
    /// Human-readable source location for log lines.
    pub fn describe(&self) -> &'static str {
        match self {
            DescriptorOrigin::ManifestJson => "manifest.json",
            DescriptorOrigin::PackageJson => "package.json",
        }
    }
}

/// A descriptor together with the project context it was read from.
#[derive(Debug, Clone)]
pub struct DescriptorSource {
    /// The descriptor as written by the author.
    pub manifest: ManifestDescriptor,
    /// Parsed `package.json`, when the project has one.
    pub package: Option<Value>,
    /// Which file supplied the descriptor.
    pub origin: DescriptorOrigin,
}

/// Output of one manifest build.
#[derive(Debug, Clone)]
pub struct BuiltManifest {
    /// Descriptor as authored; entries still point at source files.
    pub raw: ManifestDescriptor,
    /// Descriptor as shipped; entries point at built artifacts.
    pub processed: ManifestDescriptor,
}

impl BuiltManifest {
    /// Name to show in session output.
    pub fn display_name(&self) -> &str {
        self.processed.name.as_deref().unwrap_or("plugin")
    }
}
