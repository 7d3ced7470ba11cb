//! Bridge document assembly.
//!
//! In interactive sessions the served UI is the author's markup wrapped in
//! a bridge document: a small page that connects to the message relay and
//! exposes the session's runtime configuration as `window.runtimeData`.
//! One-shot builds skip the wrapper and only inject the runtime script at
//! the top of the built document.

use crate::error::{Result, TemplateError};
use serde_json::Value;

/// Embedded bridge template. The `<body>` tag is the insertion anchor.
const BRIDGE_TEMPLATE: &str = include_str!("../../assets/bridge.html");

/// Wrap user markup in the bridge document.
///
/// The runtime script lands directly after the `<body>` anchor, ahead of
/// the markup, so `window.runtimeData` exists before any UI code runs.
///
/// # Errors
///
/// Fails if the template has lost its `<body>` anchor or the runtime data
/// cannot be serialized.
pub fn wrap_ui(markup: &str, runtime_data: &Value) -> Result<String> {
    wrap_with(BRIDGE_TEMPLATE, markup, runtime_data)
}

fn wrap_with(template: &str, markup: &str, runtime_data: &Value) -> Result<String> {
    let anchor = template
        .find("<body>")
        .ok_or(TemplateError::MissingBodyAnchor)?;
    let insert_at = anchor + "<body>".len();

    let script = runtime_script(runtime_data)?;
    let mut document = String::with_capacity(template.len() + script.len() + markup.len() + 2);
    document.push_str(&template[..insert_at]);
    document.push('\n');
    document.push_str(&script);
    document.push('\n');
    document.push_str(markup);
    document.push_str(&template[insert_at..]);
    Ok(document)
}

/// Prepend the runtime script to an already-built document.
pub fn inject_runtime_data(document: &str, runtime_data: &Value) -> Result<String> {
    Ok(format!("{}\n{}", runtime_script(runtime_data)?, document))
}

fn runtime_script(data: &Value) -> Result<String> {
    Ok(format!(
        "<script>window.runtimeData = {};</script>",
        serde_json::to_string(data)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use serde_json::json;

    #[test]
    fn test_wrap_places_script_before_markup() {
        let data = json!({ "command": "dev", "port": 4400 });
        let document = wrap_ui("<main>plugin ui</main>", &data).unwrap();

        let script_at = document.find("window.runtimeData").unwrap();
        let markup_at = document.find("<main>plugin ui</main>").unwrap();
        let body_at = document.find("<body>").unwrap();

        assert!(body_at < script_at);
        assert!(script_at < markup_at);
        assert!(document.contains(r#""command":"dev""#));
    }

    #[test]
    fn test_wrap_keeps_template_tail() {
        let document = wrap_ui("<p>ui</p>", &json!({})).unwrap();
        assert!(document.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_template_without_body_anchor_is_fatal() {
        let err = wrap_with("<html><div></div></html>", "ui", &json!({})).unwrap_err();
        match err {
            CliError::Template(TemplateError::MissingBodyAnchor) => {}
            other => panic!("expected MissingBodyAnchor, got {other:?}"),
        }
    }

    #[test]
    fn test_inject_prepends_script() {
        let data = json!({ "command": "build", "manifest": { "name": "shapes" } });
        let document = inject_runtime_data("<html><body>ui</body></html>", &data).unwrap();

        assert!(document.starts_with("<script>window.runtimeData = "));
        assert!(document.ends_with("<html><body>ui</body></html>"));
        assert!(document.contains(r#""name":"shapes""#));
    }

    #[test]
    fn test_embedded_template_has_anchor() {
        assert!(BRIDGE_TEMPLATE.contains("<body>"));
    }
}
