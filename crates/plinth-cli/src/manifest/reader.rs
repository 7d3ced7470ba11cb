//! Descriptor discovery.
//!
//! `manifest.json` at the project root wins. When it is absent the reader
//! falls back to the `"plinth"."manifest"` block of `package.json`. If
//! neither location yields a descriptor the session cannot start.

use crate::error::{ConfigError, Result};
use crate::manifest::{DescriptorOrigin, DescriptorSource, ManifestDescriptor};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read the plugin descriptor for the project at `cwd`.
pub fn read_descriptor(cwd: &Path) -> Result<DescriptorSource> {
    let package = read_package(cwd)?;

    let manifest_path = cwd.join("manifest.json");
    if manifest_path.exists() {
        let text = fs::read_to_string(&manifest_path)?;
        let manifest: ManifestDescriptor =
            serde_json::from_str(&text).map_err(|source| ConfigError::InvalidJson {
                file: "manifest.json".to_string(),
                source,
            })?;
        debug!("descriptor read from manifest.json");
        return Ok(DescriptorSource {
            manifest,
            package,
            origin: DescriptorOrigin::ManifestJson,
        });
    }

    if let Some(pkg) = &package {
        if let Some(block) = pkg.pointer("/plinth/manifest") {
            let manifest: ManifestDescriptor = serde_json::from_value(block.clone()).map_err(
                |source| ConfigError::InvalidJson {
                    file: "package.json".to_string(),
                    source,
                },
            )?;
            debug!("descriptor read from package.json");
            return Ok(DescriptorSource {
                manifest,
                package,
                origin: DescriptorOrigin::PackageJson,
            });
        }
    }

    Err(ConfigError::DescriptorNotFound(cwd.to_path_buf()).into())
}

fn read_package(cwd: &Path) -> Result<Option<Value>> {
    let path = cwd.join("package.json");
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)?;
    let value = serde_json::from_str(&text).map_err(|source| ConfigError::InvalidJson {
        file: "package.json".to_string(),
        source,
    })?;
    Ok(Some(value))
}
