//! Sanitization of untrusted strings.
//!
//! Text fields are stripped of markup before a document is accepted, and the
//! import path uses the detectors here to refuse script-like content and unsafe
//! asset paths outright.

use serde_json::Value;

/// Tags whose entire body is dropped, not just the tag itself.
const BLOCK_TAGS: [&str; 4] = ["script", "style", "iframe", "object"];

/// Substrings that mark content as script-like.
const SCRIPT_MARKERS: [&str; 5] = [
    "<script",
    "javascript:",
    "vbscript:",
    "data:text/html",
    "<iframe",
];

/// Strip markup from a text field and trim it.
///
/// Block tags (`script`, `style`, ...) are removed with their content; all other
/// tags are removed and their content kept. Control characters other than tab
/// and newlines are dropped. The result is stable under repeated application.
#[must_use]
pub fn sanitize_text(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let mut next = current.clone();
        for tag in BLOCK_TAGS {
            next = remove_blocks(&next, tag);
        }
        next = strip_tags(&next);
        next.retain(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'));
        let next = next.trim().to_string();
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Whether a string carries script-like content.
#[must_use]
pub fn contains_script(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    if SCRIPT_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    lower.contains('<') && has_event_handler(&lower)
}

/// Whether an asset path could escape its container.
///
/// Rejects parent-directory segments, absolute paths and drive prefixes.
#[must_use]
pub fn is_unsafe_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    if normalized.starts_with('/') {
        return true;
    }
    let bytes = normalized.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    normalized.split('/').any(|segment| segment == "..")
}

/// Trim every string in a JSON tree in place.
pub fn trim_strings(value: &mut Value) {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                *s = trimmed.to_string();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(trim_strings),
        Value::Object(map) => map.values_mut().for_each(trim_strings),
        _ => {}
    }
}

fn remove_blocks(input: &str, tag: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}");
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(rel) = lower[cursor..].find(&open) {
        let start = cursor + rel;
        out.push_str(&input[cursor..start]);
        cursor = match lower[start..].find(&close) {
            Some(close_rel) => {
                let close_start = start + close_rel;
                lower[close_start..]
                    .find('>')
                    .map_or(input.len(), |gt| close_start + gt + 1)
            }
            None => input.len(),
        };
    }
    out.push_str(&input[cursor..]);
    out
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let opens_tag = c == '<'
            && input[i + 1..]
                .chars()
                .next()
                .is_some_and(|n| n.is_ascii_alphabetic() || n == '/' || n == '!' || n == '?');
        if !opens_tag {
            out.push(c);
            continue;
        }
        if input[i..].contains('>') {
            for (_, skipped) in chars.by_ref() {
                if skipped == '>' {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn has_event_handler(lower: &str) -> bool {
    let bytes = lower.as_bytes();
    let mut i = 0;
    while let Some(rel) = lower[i..].find("on") {
        let start = i + rel;
        let preceded = start == 0
            || matches!(bytes[start - 1], b' ' | b'\t' | b'\n' | b'<' | b'/' | b'"' | b'\'');
        let mut j = start + 2;
        while j < bytes.len() && bytes[j].is_ascii_alphabetic() {
            j += 1;
        }
        let named = j > start + 2;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if preceded && named && j < bytes.len() && bytes[j] == b'=' {
            return true;
        }
        i = start + 2;
    }
    false
}
