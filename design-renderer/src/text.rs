//! Text layout: font resolution, wrapping and line placement.
//!
//! Glyph advances are estimated from the font size rather than read from the
//! face, so wrapping is stable whether or not the requested font is installed.

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

use design_core::{TextAlign, TextDecoration, TextSpec};
use usvg::fontdb;

use crate::svg::{border_rect, color_or_black, escape_xml, paint_attrs};

/// Family used when none of the requested families is available.
pub const DEFAULT_FAMILY: &str = "sans-serif";

const GENERIC_FAMILIES: [&str; 5] = ["serif", "sans-serif", "monospace", "cursive", "fantasy"];

/// Baseline position within the em box.
const ASCENT: f32 = 0.8;

/// Installed font families, shared with the rasterizer.
#[derive(Debug, Clone)]
pub struct FontCatalog {
    database: Arc<fontdb::Database>,
    families: HashSet<String>,
}

/// Outcome of resolving a CSS font-family list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFont {
    /// Family to draw with.
    pub family: String,
    /// Whether the requested family was unavailable.
    pub fallback: bool,
}

impl FontCatalog {
    /// Catalog of the fonts installed on this system.
    #[must_use]
    pub fn system() -> Self {
        let mut database = fontdb::Database::new();
        database.load_system_fonts();
        Self::from_database(database)
    }

    /// Catalog with no fonts; every request falls back.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_database(fontdb::Database::new())
    }

    /// Wrap a preloaded font database.
    #[must_use]
    pub fn from_database(database: fontdb::Database) -> Self {
        let families = database
            .faces()
            .flat_map(|face| face.families.iter().map(|(name, _)| name.to_lowercase()))
            .collect();
        Self {
            database: Arc::new(database),
            families,
        }
    }

    /// The underlying database, for the rasterizer.
    #[must_use]
    pub fn database(&self) -> Arc<fontdb::Database> {
        Arc::clone(&self.database)
    }

    /// Number of distinct installed families.
    #[must_use]
    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    /// Pick the first usable family from a CSS list such as
    /// `"Brush Script", Georgia, serif`.
    #[must_use]
    pub fn resolve(&self, requested: &str) -> ResolvedFont {
        for candidate in requested.split(',') {
            let name = candidate.trim().trim_matches(['"', '\'']).trim();
            if name.is_empty() {
                continue;
            }
            let lower = name.to_lowercase();
            if GENERIC_FAMILIES.contains(&lower.as_str()) || self.families.contains(&lower) {
                return ResolvedFont {
                    family: name.to_string(),
                    fallback: false,
                };
            }
        }
        tracing::debug!(requested, fallback = DEFAULT_FAMILY, "font unavailable, falling back");
        ResolvedFont {
            family: DEFAULT_FAMILY.to_string(),
            fallback: true,
        }
    }
}

impl Default for FontCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

fn is_bold(weight: &str) -> bool {
    match weight.trim() {
        "bold" | "bolder" => true,
        other => other.parse::<u32>().is_ok_and(|w| w >= 600),
    }
}

/// Estimated advance of one character in ems.
fn char_advance(c: char) -> f32 {
    match c {
        ' ' => 0.28,
        'i' | 'l' | 'j' | 't' | 'f' | 'I' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' => 0.3,
        'm' | 'w' | 'M' | 'W' | '@' => 0.85,
        c if c.is_ascii_uppercase() || c.is_ascii_digit() => 0.62,
        c if c.is_ascii() => 0.52,
        // CJK and other wide scripts.
        _ => 1.0,
    }
}

/// Estimated width of `text` in design pixels.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn measure(text: &str, font_size: f32, letter_spacing: f32, bold: bool) -> f32 {
    let count = text.chars().count();
    if count == 0 {
        return 0.0;
    }
    let ems: f32 = text.chars().map(char_advance).sum();
    let weight = if bold { 1.06 } else { 1.0 };
    ems * font_size * weight + letter_spacing * (count - 1) as f32
}

/// Greedy word wrap within `max_width`; explicit newlines always break.
///
/// Words wider than the box are split between characters.
#[must_use]
pub fn wrap_lines(
    content: &str,
    font_size: f32,
    letter_spacing: f32,
    bold: bool,
    max_width: f32,
) -> Vec<String> {
    let fits = |s: &str| measure(s, font_size, letter_spacing, bold) <= max_width;
    let mut lines = Vec::new();

    for paragraph in content.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if fits(&candidate) {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if fits(word) {
                line = word.to_string();
                continue;
            }
            for c in word.chars() {
                let mut next = line.clone();
                next.push(c);
                if !line.is_empty() && !fits(&next) {
                    lines.push(std::mem::take(&mut line));
                    line.push(c);
                } else {
                    line = next;
                }
            }
        }
        lines.push(line);
    }
    lines
}

/// Draw a text element into the box `(0, 0, width, height)`.
pub(crate) fn render_text(
    svg: &mut String,
    spec: &TextSpec,
    width: f32,
    height: f32,
    fonts: &FontCatalog,
) {
    if let Some(background) = &spec.background_color {
        let radius = spec.border.as_ref().map_or(0.0, |b| b.radius);
        let _ = write!(
            svg,
            "<rect width=\"{width}\" height=\"{height}\" rx=\"{radius}\" {}/>",
            paint_attrs("fill", color_or_black(background))
        );
    }
    if let Some(border) = &spec.border {
        border_rect(svg, border, width, height);
    }

    let font = fonts.resolve(&spec.font_family);
    let bold = is_bold(&spec.font_weight);
    let lines = wrap_lines(&spec.content, spec.font_size, spec.letter_spacing, bold, width);
    let line_height = spec.font_size * spec.line_height.max(0.1);

    let (x, anchor) = match spec.text_align {
        TextAlign::Left | TextAlign::Justify => (0.0, "start"),
        TextAlign::Center => (width / 2.0, "middle"),
        TextAlign::Right => (width, "end"),
    };
    let decoration = match spec.text_decoration {
        TextDecoration::None => None,
        TextDecoration::Underline => Some("underline"),
        TextDecoration::LineThrough => Some("line-through"),
        TextDecoration::Overline => Some("overline"),
    };

    let _ = write!(
        svg,
        "<g font-family=\"{}\" font-size=\"{}\" font-weight=\"{}\" font-style=\"{}\" {}",
        escape_xml(&font.family),
        spec.font_size,
        escape_xml(&spec.font_weight),
        escape_xml(&spec.font_style),
        paint_attrs("fill", color_or_black(&spec.color)),
    );
    if spec.letter_spacing != 0.0 {
        let _ = write!(svg, " letter-spacing=\"{}\"", spec.letter_spacing);
    }
    if let Some(decoration) = decoration {
        let _ = write!(svg, " text-decoration=\"{decoration}\"");
    }
    svg.push('>');

    let last = lines.len().saturating_sub(1);
    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let baseline =
            i as f32 * line_height + (line_height - spec.font_size) / 2.0 + spec.font_size * ASCENT;
        let _ = write!(
            svg,
            "<text x=\"{x}\" y=\"{baseline}\" text-anchor=\"{anchor}\" xml:space=\"preserve\""
        );
        if spec.text_align == TextAlign::Justify && i < last && line.contains(' ') {
            let _ = write!(svg, " textLength=\"{width}\" lengthAdjust=\"spacing\"");
        }
        let _ = write!(svg, ">{}</text>", escape_xml(line));
    }
    svg.push_str("</g>");

    if lines.len() > 1 {
        #[allow(clippy::cast_precision_loss)]
        let needed = lines.len() as f32 * line_height;
        if needed > height {
            tracing::debug!(lines = lines.len(), needed, height, "text overflows its box");
        }
    }
}
