//! Manifest processing and artifact generation.

use crate::config::RuntimeOptions;
use crate::error::Result;
use crate::manifest::{
    read_descriptor, BuiltManifest, DescriptorSource, ManifestDescriptor, DEFAULT_API_VERSION,
};
use tracing::debug;

/// Build the manifest artifact for the current session.
///
/// Reads the descriptor, derives the processed view and writes it to
/// `<output>/manifest.json` as pretty-printed JSON with a trailing
/// newline. The output directory is created if needed.
pub async fn build_manifest(options: &RuntimeOptions) -> Result<BuiltManifest> {
    let source = read_descriptor(&options.cwd)?;
    let processed = process(&source);

    tokio::fs::create_dir_all(&options.output).await?;
    let json = serde_json::to_string_pretty(&processed)?;
    tokio::fs::write(options.output_file("manifest.json"), format!("{json}\n")).await?;
    debug!(origin = source.origin.describe(), "manifest artifact written");

    Ok(BuiltManifest {
        raw: source.manifest,
        processed,
    })
}

/// Derive the processed manifest from a raw descriptor.
///
/// Entries that exist are rewritten to built artifact basenames, the API
/// version is defaulted, the name falls back to the package name, and
/// null extra fields are dropped.
fn process(source: &DescriptorSource) -> ManifestDescriptor {
    let mut manifest = source.manifest.clone();

    if manifest.api.is_none() {
        manifest.api = Some(DEFAULT_API_VERSION.to_string());
    }
    if manifest.main.is_some() {
        manifest.main = Some("main.js".to_string());
    }
    if manifest.ui.is_some() {
        manifest.ui = Some("ui.html".to_string());
    }
    if manifest.name.is_none() {
        manifest.name = source
            .package
            .as_ref()
            .and_then(|pkg| pkg.get("name"))
            .and_then(|name| name.as_str())
            .map(str::to_string);
    }
    manifest.extra.retain(|_, value| !value.is_null());

    manifest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandMode;

    fn options(dir: &tempfile::TempDir) -> RuntimeOptions {
        RuntimeOptions {
            mode: CommandMode::Build { watch: false },
            cwd: dir.path().to_path_buf(),
            output: dir.path().join("dist"),
            server_addr: None,
            relay_addr: None,
            room: "session-room".to_string(),
            open: false,
        }
    }

    #[tokio::test]
    async fn test_entries_point_at_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{ "name": "shapes", "main": "src/main.ts", "ui": "src/ui.html" }"#,
        )
        .unwrap();

        let built = build_manifest(&options(&dir)).await.unwrap();

        assert_eq!(built.raw.main.as_deref(), Some("src/main.ts"));
        assert_eq!(built.processed.main.as_deref(), Some("main.js"));
        assert_eq!(built.processed.ui.as_deref(), Some("ui.html"));
        assert_eq!(built.processed.api.as_deref(), Some(DEFAULT_API_VERSION));
    }

    #[tokio::test]
    async fn test_absent_entries_stay_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{ "name": "headless", "main": "src/main.ts" }"#,
        )
        .unwrap();

        let built = build_manifest(&options(&dir)).await.unwrap();
        assert!(built.processed.ui.is_none());
    }

    #[tokio::test]
    async fn test_name_falls_back_to_package_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{ "main": "src/main.ts" }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "my-plugin" }"#,
        )
        .unwrap();

        let built = build_manifest(&options(&dir)).await.unwrap();
        assert_eq!(built.processed.name.as_deref(), Some("my-plugin"));
        // The raw view is untouched.
        assert!(built.raw.name.is_none());
    }

    #[tokio::test]
    async fn test_null_extras_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{ "name": "shapes", "main": "src/main.ts", "menu": null, "editorType": ["figma"] }"#,
        )
        .unwrap();

        let built = build_manifest(&options(&dir)).await.unwrap();
        assert!(!built.processed.extra.contains_key("menu"));
        assert!(built.processed.extra.contains_key("editorType"));
        // Authored nulls survive in the raw view.
        assert!(built.raw.extra.contains_key("menu"));
    }

    #[tokio::test]
    async fn test_artifact_written_pretty_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{ "name": "shapes", "main": "src/main.ts" }"#,
        )
        .unwrap();

        build_manifest(&options(&dir)).await.unwrap();

        let written =
            std::fs::read_to_string(dir.path().join("dist").join("manifest.json")).unwrap();
        assert!(written.ends_with('\n'));
        assert!(written.contains("\n  \"main\": \"main.js\""));
    }

    #[tokio::test]
    async fn test_missing_descriptor_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_manifest(&options(&dir)).await.unwrap_err();
        assert!(err.to_string().contains("No plugin manifest found"));
        // No artifact directory is created on failure.
        assert!(!dir.path().join("dist").exists());
    }

    #[test]
    fn test_process_is_pure() {
        let source = DescriptorSource {
            manifest: serde_json::from_str(r#"{ "main": "src/main.ts" }"#).unwrap(),
            package: None,
            origin: crate::manifest::DescriptorOrigin::ManifestJson,
        };
        let processed = process(&source);
        assert_eq!(processed.main.as_deref(), Some("main.js"));
        assert_eq!(source.manifest.main.as_deref(), Some("src/main.ts"));
    }
}
