//! The design document: settings plus an ordered element list.
//!
//! Raw JSON goes through [`validate_document`] (or
//! [`DesignDocument::parse_with`]) which checks structure on the untyped tree
//! first so that each failure maps to a precise [`ErrorKind`](crate::ErrorKind),
//! sanitizes text, deserializes, and finally range-checks every value.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::element::{Element, ElementKind, ELEMENT_TYPES};
use crate::error::{DesignError, DesignResult};
use crate::sanitize::{sanitize_text, trim_strings};
use crate::Color;

/// Document schema version written when none is supplied.
pub const DEFAULT_DOCUMENT_VERSION: &str = "1.0.0";

/// Default maximum number of elements in one document.
pub const MAX_ELEMENTS: usize = 10_000;

/// Default maximum length of one text field in bytes.
pub const MAX_TEXT_LEN: usize = 1_048_576; // 1MB

/// A complete design: canvas settings and elements in z-order (first = bottom).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignDocument {
    /// Elements, bottom first.
    pub elements: Vec<Element>,
    /// Canvas settings.
    pub settings: DesignSettings,
    /// Schema / content version (dotted numeric, e.g. `1.2.0`).
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    DEFAULT_DOCUMENT_VERSION.to_string()
}

/// Canvas settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignSettings {
    /// Trim width in design pixels.
    pub width: f32,
    /// Trim height in design pixels.
    pub height: f32,
    /// Canvas fill.
    #[serde(default = "DesignSettings::default_background")]
    pub background_color: String,
    /// Print bleed on every side in design pixels.
    #[serde(default)]
    pub bleed: f32,
    /// Inset of the safe area from the trim edge in design pixels.
    #[serde(default)]
    pub safe_zone: f32,
    /// Output resolution.
    #[serde(default = "DesignSettings::default_dpi")]
    pub dpi: f32,
    /// Unit shown to the editor.
    #[serde(default)]
    pub unit: Unit,
    /// Editor grid visibility.
    #[serde(default)]
    pub show_grid: bool,
    /// Editor grid snapping.
    #[serde(default)]
    pub snap_to_grid: bool,
    /// Grid pitch in design pixels.
    #[serde(default = "DesignSettings::default_grid_size")]
    pub grid_size: f32,
    /// Editor guide lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guides: Vec<Guide>,
}

impl DesignSettings {
    fn default_background() -> String {
        "#ffffff".to_string()
    }

    const fn default_dpi() -> f32 {
        300.0
    }

    const fn default_grid_size() -> f32 {
        10.0
    }

    /// Settings for a plain white canvas of the given size.
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            background_color: Self::default_background(),
            bleed: 0.0,
            safe_zone: 0.0,
            dpi: Self::default_dpi(),
            unit: Unit::Px,
            show_grid: false,
            snap_to_grid: false,
            grid_size: Self::default_grid_size(),
            guides: Vec::new(),
        }
    }

    fn validate(&self) -> DesignResult<()> {
        for (name, value) in [
            ("width", self.width),
            ("height", self.height),
            ("dpi", self.dpi),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DesignError::invalid(
                    format!("settings.{name}"),
                    format!("must be positive, got {value}"),
                ));
            }
        }
        for (name, value) in [
            ("bleed", self.bleed),
            ("safeZone", self.safe_zone),
            ("gridSize", self.grid_size),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DesignError::invalid(
                    format!("settings.{name}"),
                    format!("must not be negative, got {value}"),
                ));
            }
        }
        Color::parse(&self.background_color)
            .map_err(|e| DesignError::invalid("settings.backgroundColor", e.to_string()))?;
        Ok(())
    }
}

/// Measurement unit shown in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Pixels.
    #[default]
    Px,
    /// Millimetres.
    Mm,
    /// Centimetres.
    Cm,
    /// Inches.
    #[serde(rename = "in")]
    Inch,
}

impl Unit {
    /// Convert a length in this unit to design pixels at `dpi`.
    #[must_use]
    pub fn to_px(self, value: f32, dpi: f32) -> f32 {
        match self {
            Self::Px => value,
            Self::Mm => value / 25.4 * dpi,
            Self::Cm => value / 2.54 * dpi,
            Self::Inch => value * dpi,
        }
    }
}

/// An editor guide line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    /// `horizontal` or `vertical`.
    pub orientation: GuideOrientation,
    /// Offset from the trim edge in design pixels.
    pub position: f32,
}

/// Guide direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuideOrientation {
    /// Runs left to right.
    Horizontal,
    /// Runs top to bottom.
    Vertical,
}

/// Ceilings applied while parsing untrusted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Maximum element count.
    pub max_elements: usize,
    /// Maximum bytes in one text field.
    pub max_text_len: usize,
    /// Optional ceiling on the estimated in-memory size of the parsed tree.
    pub memory_limit: Option<usize>,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_elements: MAX_ELEMENTS,
            max_text_len: MAX_TEXT_LEN,
            memory_limit: None,
        }
    }
}

/// Parse and validate a raw JSON design document with default limits.
///
/// # Errors
///
/// - [`DesignError::InvalidDocument`] for malformed JSON or a non-object root.
/// - [`DesignError::MissingField`] for absent `elements`, `settings` or required keys.
/// - [`DesignError::UnsupportedElement`] for unknown element types.
/// - [`DesignError::InvalidValue`] for out-of-range or mistyped values.
/// - [`DesignError::ResourceExceeded`] when a limit is hit.
pub fn validate_document(raw: &str) -> DesignResult<DesignDocument> {
    DesignDocument::parse_with(raw, &ValidationLimits::default())
}

impl DesignDocument {
    /// An empty document of the given canvas size.
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            elements: Vec::new(),
            settings: DesignSettings::new(width, height),
            version: default_version(),
        }
    }

    /// Append an element on top.
    #[must_use]
    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    /// Parse raw JSON with explicit limits.
    ///
    /// # Errors
    ///
    /// See [`validate_document`].
    pub fn parse_with(raw: &str, limits: &ValidationLimits) -> DesignResult<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| DesignError::InvalidDocument(format!("malformed JSON: {e}")))?;
        Self::from_value_with(value, limits)
    }

    /// Validate an already-parsed JSON tree.
    ///
    /// # Errors
    ///
    /// See [`validate_document`].
    pub fn from_value_with(mut value: Value, limits: &ValidationLimits) -> DesignResult<Self> {
        if let Some(limit) = limits.memory_limit {
            let estimate = estimate_size(&value);
            if estimate > limit {
                return Err(DesignError::ResourceExceeded(format!(
                    "document needs ~{estimate} bytes, limit is {limit}"
                )));
            }
        }

        check_structure(&value, limits)?;
        trim_strings(&mut value);
        sanitize_text_fields(&mut value, limits)?;

        let document: Self = serde_json::from_value(value)
            .map_err(|e| DesignError::invalid("document", e.to_string()))?;
        document.validate()?;
        tracing::debug!(
            elements = document.elements.len(),
            width = document.settings.width,
            height = document.settings.height,
            "validated design document"
        );
        Ok(document)
    }

    /// Range-check settings and every element.
    ///
    /// # Errors
    ///
    /// Returns the first [`DesignError::InvalidValue`] found.
    pub fn validate(&self) -> DesignResult<()> {
        self.settings.validate()?;
        for (index, element) in self.elements.iter().enumerate() {
            element.validate(index)?;
        }
        Ok(())
    }

    /// Serialize to a JSON tree.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::InvalidDocument`] if a value cannot be represented
    /// in JSON (e.g. a non-finite float).
    pub fn to_value(&self) -> DesignResult<Value> {
        serde_json::to_value(self).map_err(|e| DesignError::InvalidDocument(e.to_string()))
    }

    /// Serialize to a JSON string.
    ///
    /// # Errors
    ///
    /// See [`DesignDocument::to_value`].
    pub fn to_json(&self) -> DesignResult<String> {
        serde_json::to_string(self).map_err(|e| DesignError::InvalidDocument(e.to_string()))
    }

    /// Elements in paint order (bottom first) with their sequence index.
    ///
    /// The stacking key is `zIndex` when present, else the sequence position;
    /// ties keep sequence order.
    #[must_use]
    pub fn stacking_order(&self) -> Vec<(usize, &Element)> {
        let mut ordered: Vec<_> = self.elements.iter().enumerate().collect();
        #[allow(clippy::cast_possible_wrap)]
        ordered.sort_by_key(|(index, element)| element.z_index.unwrap_or(*index as i64));
        ordered
    }
}

/// Compare dotted numeric version strings (`1.10.0` > `1.9`).
///
/// Missing components count as zero; non-numeric components compare
/// lexically after all numeric ones.
#[must_use]
pub fn compare_version_strings(a: &str, b: &str) -> Ordering {
    let parts = |s: &str| -> Vec<String> {
        s.trim()
            .trim_start_matches(['v', 'V'])
            .split(['.', '-', '+'])
            .map(str::to_string)
            .collect()
    };
    let (pa, pb) = (parts(a), parts(b));
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let x = pa.get(i).map_or("0", String::as_str);
        let y = pb.get(i).map_or("0", String::as_str);
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Rough in-memory footprint of a JSON tree in bytes.
#[must_use]
pub fn estimate_size(value: &Value) -> usize {
    const NODE: usize = 16;
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => NODE,
        Value::String(s) => NODE + s.len(),
        Value::Array(items) => NODE + items.iter().map(estimate_size).sum::<usize>(),
        Value::Object(map) => {
            NODE + map
                .iter()
                .map(|(k, v)| NODE + k.len() + estimate_size(v))
                .sum::<usize>()
        }
    }
}

fn check_structure(value: &Value, limits: &ValidationLimits) -> DesignResult<()> {
    let root = value
        .as_object()
        .ok_or_else(|| DesignError::InvalidDocument("document root must be an object".into()))?;

    let elements = root
        .get("elements")
        .ok_or_else(|| DesignError::MissingField("elements".into()))?
        .as_array()
        .ok_or_else(|| DesignError::invalid("elements", "must be an array"))?;
    let settings = root
        .get("settings")
        .ok_or_else(|| DesignError::MissingField("settings".into()))?
        .as_object()
        .ok_or_else(|| DesignError::invalid("settings", "must be an object"))?;

    for key in ["width", "height"] {
        if !settings.contains_key(key) {
            return Err(DesignError::MissingField(format!("settings.{key}")));
        }
    }

    if elements.len() > limits.max_elements {
        return Err(DesignError::ResourceExceeded(format!(
            "{} elements exceeds the limit of {}",
            elements.len(),
            limits.max_elements
        )));
    }

    for (index, element) in elements.iter().enumerate() {
        let object = element
            .as_object()
            .ok_or_else(|| DesignError::invalid(format!("elements[{index}]"), "must be an object"))?;
        let kind = object
            .get("type")
            .ok_or_else(|| DesignError::MissingField(format!("elements[{index}].type")))?
            .as_str()
            .ok_or_else(|| DesignError::invalid(format!("elements[{index}].type"), "must be a string"))?;
        if !ELEMENT_TYPES.contains(&kind) {
            return Err(DesignError::UnsupportedElement {
                index,
                kind: kind.to_string(),
            });
        }
        for alternatives in ElementKind::required_keys(kind) {
            if !alternatives.iter().any(|k| object.contains_key(*k)) {
                return Err(DesignError::MissingField(format!(
                    "elements[{index}].{}",
                    alternatives[0]
                )));
            }
        }
    }
    Ok(())
}

fn sanitize_text_fields(value: &mut Value, limits: &ValidationLimits) -> DesignResult<()> {
    let Some(elements) = value.get_mut("elements").and_then(Value::as_array_mut) else {
        return Ok(());
    };
    for (index, element) in elements.iter_mut().enumerate() {
        let is_text = element.get("type").and_then(Value::as_str) == Some("text");
        let Some(object) = element.as_object_mut() else {
            continue;
        };
        for key in ["content", "text"] {
            if let Some(Value::String(s)) = object.get_mut(key) {
                if s.len() > limits.max_text_len {
                    return Err(DesignError::ResourceExceeded(format!(
                        "elements[{index}].{key} is {} bytes, limit is {}",
                        s.len(),
                        limits.max_text_len
                    )));
                }
                if is_text {
                    *s = sanitize_text(s);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ShapeKind;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn scenario() -> Value {
        json!({
            "elements": [{
                "type": "text", "content": "Hi",
                "x": 0, "y": 0, "width": 100, "height": 20, "opacity": 1
            }],
            "settings": {"width": 200, "height": 100, "dpi": 300}
        })
    }

    #[test]
    fn test_scenario_document_parses() {
        let doc = validate_document(&scenario().to_string()).expect("valid");
        assert_eq!(doc.elements.len(), 1);
        assert_eq!(doc.version, DEFAULT_DOCUMENT_VERSION);
        assert_eq!(doc.settings.background_color, "#ffffff");
    }

    #[test]
    fn test_malformed_json_is_invalid_document() {
        let err = validate_document("{\"elements\": [").expect_err("malformed");
        assert_eq!(err.kind(), ErrorKind::InvalidDocument);
    }

    #[test]
    fn test_missing_top_level_keys() {
        let err = validate_document(r#"{"settings": {"width": 1, "height": 1}}"#).expect_err("no elements");
        assert_eq!(err, DesignError::MissingField("elements".into()));
        let err = validate_document(r#"{"elements": []}"#).expect_err("no settings");
        assert_eq!(err, DesignError::MissingField("settings".into()));
        let err = validate_document(r#"{"elements": [], "settings": {"height": 1}}"#)
            .expect_err("no width");
        assert_eq!(err, DesignError::MissingField("settings.width".into()));
    }

    #[test]
    fn test_unknown_element_type_rejected() {
        let mut raw = scenario();
        raw["elements"][0]["type"] = json!("video");
        let err = validate_document(&raw.to_string()).expect_err("unknown type");
        assert_eq!(err.kind(), ErrorKind::UnsupportedElement);
    }

    #[test]
    fn test_missing_variant_key() {
        let raw = json!({"elements": [{"type": "image"}], "settings": {"width": 1, "height": 1}});
        let err = validate_document(&raw.to_string()).expect_err("no src");
        assert_eq!(err.kind(), ErrorKind::MissingField);
    }

    #[test]
    fn test_out_of_range_values() {
        for (pointer, bad) in [
            ("/settings/width", json!(-5)),
            ("/settings/dpi", json!(0)),
            ("/settings/bleed", json!(-1)),
            ("/elements/0/opacity", json!(1.01)),
            ("/elements/0/opacity", json!(-0.1)),
        ] {
            let mut raw = scenario();
            *raw.pointer_mut(pointer).expect("pointer") = bad;
            let err = validate_document(&raw.to_string()).expect_err(pointer);
            assert_eq!(err.kind(), ErrorKind::InvalidValue, "{pointer}");
        }
    }

    #[test]
    fn test_type_mismatch_is_invalid_value() {
        let mut raw = scenario();
        raw["elements"][0]["fontSize"] = json!("huge");
        let err = validate_document(&raw.to_string()).expect_err("mistyped");
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_text_is_sanitized() {
        let mut raw = scenario();
        raw["elements"][0]["content"] = json!("  <b>Hi</b><script>steal()</script> ");
        let doc = validate_document(&raw.to_string()).expect("valid");
        let ElementKind::Text(text) = &doc.elements[0].kind else {
            panic!("expected text");
        };
        assert_eq!(text.content, "Hi");
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut raw = scenario();
        raw["elements"][0]["content"] = json!(" <i>Hello</i> ");
        let first = validate_document(&raw.to_string()).expect("first");
        let second = validate_document(&first.to_json().expect("json")).expect("second");
        assert_eq!(first, second);
        assert_eq!(first.to_value().expect("v"), second.to_value().expect("v"));
    }

    #[test]
    fn test_memory_limit() {
        let limits = ValidationLimits {
            memory_limit: Some(64),
            ..ValidationLimits::default()
        };
        let err = DesignDocument::parse_with(&scenario().to_string(), &limits).expect_err("limit");
        assert_eq!(err.kind(), ErrorKind::ResourceExceeded);
    }

    #[test]
    fn test_element_limit() {
        let limits = ValidationLimits {
            max_elements: 0,
            ..ValidationLimits::default()
        };
        let err = DesignDocument::parse_with(&scenario().to_string(), &limits).expect_err("limit");
        assert_eq!(err.kind(), ErrorKind::ResourceExceeded);
    }

    #[test]
    fn test_empty_canvas_is_valid() {
        let raw = json!({"elements": [], "settings": {"width": 10, "height": 10}});
        let doc = validate_document(&raw.to_string()).expect("blank canvas");
        assert!(doc.elements.is_empty());
    }

    #[test]
    fn test_stacking_order() {
        let doc = DesignDocument::new(100.0, 100.0)
            .with_element(Element::text("a").with_id("a"))
            .with_element(Element::text("b").with_id("b").with_z_index(-1))
            .with_element(Element::shape(ShapeKind::Circle, "#000").with_id("c"));
        let order: Vec<_> = doc
            .stacking_order()
            .iter()
            .map(|(_, e)| e.id.clone().unwrap_or_default())
            .collect();
        assert_eq!(order, ["b", "a", "c"]);
    }

    #[test]
    fn test_compare_version_strings() {
        assert_eq!(compare_version_strings("1.0.0", "2.0.0"), Ordering::Less);
        assert_eq!(compare_version_strings("1.10", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_version_strings("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_version_strings("v2", "1.9"), Ordering::Greater);
    }

    #[test]
    fn test_unit_conversion() {
        assert!((Unit::Inch.to_px(1.0, 300.0) - 300.0).abs() < 1e-3);
        assert!((Unit::Mm.to_px(25.4, 96.0) - 96.0).abs() < 1e-3);
    }
}
