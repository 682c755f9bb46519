//! Screening of untrusted bundle content.
//!
//! Runs on the raw JSON tree before anything is deserialized or written.
//! Any hit rejects the whole bundle.

use design_core::sanitize::{contains_script, is_unsafe_path};
use serde_json::Value;

use crate::error::{BundleError, BundleResult};

/// Keys whose string value is an asset locator.
const LOCATOR_KEYS: [&str; 3] = ["src", "url", "asset"];

/// Whether a locator points outside the bundle's own asset space.
fn is_remote_or_inline(locator: &str) -> bool {
    let lower = locator.to_ascii_lowercase();
    lower.starts_with("data:") || lower.starts_with("http://") || lower.starts_with("https://")
}

/// HTML and SVG event-handler attributes, lowercase.
const EVENT_HANDLERS: [&str; 44] = [
    "onabort", "onactivate", "onanimationend", "onanimationstart", "onbegin", "onblur",
    "onchange", "onclick", "oncontextmenu", "oncopy", "oncut", "ondblclick", "ondrag",
    "ondrop", "onend", "onerror", "onfocus", "onfocusin", "onfocusout", "oninput",
    "onkeydown", "onkeypress", "onkeyup", "onload", "onmousedown", "onmouseenter",
    "onmouseleave", "onmousemove", "onmouseout", "onmouseover", "onmouseup", "onpaste",
    "onpointerdown", "onpointerup", "onrepeat", "onreset", "onresize", "onscroll",
    "onselect", "onsubmit", "ontoggle", "ontouchstart", "onunload", "onwheel",
];

/// `onclick`, `onLoad`, ...; ordinary keys such as `online` pass.
fn is_event_handler_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    EVENT_HANDLERS.contains(&lower.as_str())
}

/// Check a locator from an element or attachment.
///
/// # Errors
///
/// Returns [`BundleError::SecurityViolation`] for script URLs, traversal or
/// absolute paths.
pub fn check_locator(path: &str, locator: &str) -> BundleResult<()> {
    if contains_script(locator) {
        return Err(BundleError::security(path, "script URL"));
    }
    if !is_remote_or_inline(locator) && is_unsafe_path(locator) {
        return Err(BundleError::security(path, "path escapes the bundle"));
    }
    Ok(())
}

/// Walk a JSON tree and reject script-like strings, event-handler keys and
/// unsafe locators.
///
/// # Errors
///
/// Returns [`BundleError::SecurityViolation`] naming the first offending
/// JSON path.
pub fn scan(value: &Value) -> BundleResult<()> {
    scan_at("$", value)
}

fn scan_at(path: &str, value: &Value) -> BundleResult<()> {
    match value {
        Value::String(s) => {
            if contains_script(s) {
                return Err(BundleError::security(path, "script-like content"));
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                scan_at(&format!("{path}[{i}]"), item)?;
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let child = format!("{path}.{key}");
                if is_event_handler_key(key) {
                    return Err(BundleError::security(child, "event handler attribute"));
                }
                if let (true, Value::String(locator)) = (LOCATOR_KEYS.contains(&key.as_str()), item) {
                    check_locator(&child, locator)?;
                }
                scan_at(&child, item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn violation_path(value: &Value) -> String {
        match scan(value) {
            Err(BundleError::SecurityViolation { path, .. }) => path,
            other => panic!("expected violation, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_design_passes() {
        let value = json!({
            "title": "Card",
            "meta": {"_design_data": {"elements": [
                {"type": "text", "content": "Hello <b>there</b>"},
                {"type": "image", "src": "uploads/photo.png"},
                {"type": "image", "src": "https://cdn.example.com/a.png"},
                {"type": "image", "src": "data:image/png;base64,AAAA"}
            ]}}
        });
        scan(&value).expect("clean");
    }

    #[test]
    fn test_script_text_rejected() {
        let value = json!({"elements": [{"type": "text", "content": "<script>alert(1)</script>"}]});
        assert_eq!(violation_path(&value), "$.elements[0].content");
    }

    #[test]
    fn test_event_handler_key_rejected() {
        let value = json!({"elements": [{"type": "shape", "onclick": "x()"}]});
        assert_eq!(violation_path(&value), "$.elements[0].onclick");
        let value = json!({"meta": {"onLoad": "x()"}});
        assert_eq!(violation_path(&value), "$.meta.onLoad");
    }

    #[test]
    fn test_on_prefixed_metadata_passes() {
        let value = json!({"meta": {"online": true, "onSale": "yes", "one": 1, "onion": "red"}});
        scan(&value).expect("plain metadata");
    }

    #[test]
    fn test_traversal_and_absolute_paths_rejected() {
        for src in ["../../etc/passwd", "/etc/passwd", "C:\\Windows\\win.ini"] {
            let value = json!({"src": src});
            assert_eq!(violation_path(&value), "$.src");
        }
    }

    proptest! {
        #[test]
        fn prop_javascript_urls_always_rejected(prefix in "[a-zA-Z0-9 ]{0,12}", case in 0usize..3) {
            let scheme = ["javascript:", "JavaScript:", "JAVASCRIPT:"][case];
            let value = json!({"title": format!("{prefix}{scheme}alert(1)")});
            prop_assert!(scan(&value).is_err());
        }
    }
}
