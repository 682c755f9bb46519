//! Small helpers for emitting SVG markup.

use std::fmt::Write;

use design_core::{Border, BorderStyle, Color, Shadow};

/// Escape special XML characters and drop characters XML 1.0 cannot carry.
#[must_use]
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if is_xml_char(c) => out.push(c),
            _ => {}
        }
    }
    out
}

/// XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

/// Parse a validated color string, falling back to black.
pub(crate) fn color_or_black(input: &str) -> Color {
    Color::parse(input).unwrap_or(Color::BLACK)
}

/// `fill="#rrggbb" fill-opacity="a"` (or `stroke`) for a color.
pub(crate) fn paint_attrs(property: &str, color: Color) -> String {
    let mut attrs = format!("{property}=\"{}\"", color.to_hex_rgb());
    if color.a < 255 {
        let _ = write!(attrs, " {property}-opacity=\"{}\"", color.alpha());
    }
    attrs
}

/// Stroke attributes for a border, including its dash pattern.
pub(crate) fn border_attrs(border: &Border) -> String {
    let mut attrs = format!(
        "fill=\"none\" {} stroke-width=\"{}\"",
        paint_attrs("stroke", color_or_black(&border.color)),
        border.width
    );
    let w = border.width.max(0.5);
    match border.style {
        BorderStyle::Solid => {}
        BorderStyle::Dashed => {
            let _ = write!(attrs, " stroke-dasharray=\"{} {}\"", w * 3.0, w * 2.0);
        }
        BorderStyle::Dotted => {
            let _ = write!(attrs, " stroke-dasharray=\"{w} {w}\" stroke-linecap=\"round\"");
        }
    }
    attrs
}

/// A `<rect>` tracing `border` around the box at the origin.
pub(crate) fn border_rect(svg: &mut String, border: &Border, width: f32, height: f32) {
    if border.width <= 0.0 {
        return;
    }
    // Stroke centred on the box edge, inset by half so it stays inside.
    let inset = border.width / 2.0;
    let _ = write!(
        svg,
        "<rect x=\"{inset}\" y=\"{inset}\" width=\"{}\" height=\"{}\" rx=\"{}\" {}/>",
        (width - border.width).max(0.0),
        (height - border.width).max(0.0),
        border.radius,
        border_attrs(border),
    );
}

/// A drop-shadow filter definition with the given `id`.
pub(crate) fn shadow_filter(svg: &mut String, id: &str, shadow: &Shadow) {
    let color = color_or_black(&shadow.color);
    let _ = write!(
        svg,
        "<defs><filter id=\"{id}\" x=\"-50%\" y=\"-50%\" width=\"200%\" height=\"200%\">\
         <feDropShadow dx=\"{}\" dy=\"{}\" stdDeviation=\"{}\" flood-color=\"{}\" flood-opacity=\"{}\"/>\
         </filter></defs>",
        shadow.offset_x,
        shadow.offset_y,
        shadow.blur.max(0.0) / 2.0,
        color.to_hex_rgb(),
        color.alpha(),
    );
}
