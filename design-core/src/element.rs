//! Design elements - the positioned drawable units of a document.
//!
//! Elements are a tagged union on the JSON `type` key. The frame attributes
//! (`x`, `y`, `width`, `height`, `rotation`, `opacity`, `zIndex`) are shared by
//! every variant; variant payloads carry the style attributes.

use serde::{Deserialize, Deserializer, Serialize};

use crate::color::Color;
use crate::error::{DesignError, DesignResult};

/// Element `type` values the engine understands.
pub const ELEMENT_TYPES: [&str; 4] = ["text", "image", "shape", "qr"];

/// A positioned design element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Editor-assigned identifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Left edge in design pixels.
    #[serde(default)]
    pub x: f32,
    /// Top edge in design pixels.
    #[serde(default)]
    pub y: f32,
    /// Width in design pixels.
    #[serde(default)]
    pub width: f32,
    /// Height in design pixels.
    #[serde(default)]
    pub height: f32,
    /// Clockwise rotation in degrees about the element center.
    #[serde(default)]
    pub rotation: f32,
    /// Opacity in `0.0..=1.0`.
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Explicit stacking position; overrides sequence order when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    /// Hidden elements are kept in the document but not rendered.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Editor lock flag, carried through untouched.
    #[serde(default)]
    pub locked: bool,
    /// Variant payload.
    #[serde(flatten)]
    pub kind: ElementKind,
}

const fn default_opacity() -> f32 {
    1.0
}

const fn default_true() -> bool {
    true
}

/// The variant payload of an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementKind {
    /// A block of text.
    Text(TextSpec),
    /// A raster image.
    Image(ImageSpec),
    /// A vector primitive.
    Shape(ShapeSpec),
    /// A QR code.
    Qr(QrSpec),
}

impl ElementKind {
    /// The JSON `type` tag of this variant.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Shape(_) => "shape",
            Self::Qr(_) => "qr",
        }
    }

    /// Keys that must be present in the raw JSON for this `type`.
    ///
    /// Each inner slice is a set of alternatives; one of them must be present.
    #[must_use]
    pub fn required_keys(type_name: &str) -> &'static [&'static [&'static str]] {
        match type_name {
            "text" | "qr" => &[&["content", "text"]],
            "image" => &[&["src", "url", "asset"]],
            _ => &[],
        }
    }
}

/// Text element attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextSpec {
    /// The string to draw.
    #[serde(alias = "text")]
    pub content: String,
    /// Requested font family; the renderer falls back when unavailable.
    pub font_family: String,
    /// Font size in design pixels.
    pub font_size: f32,
    /// CSS-style weight (`normal`, `bold`, `100`..`900`).
    #[serde(deserialize_with = "string_or_number")]
    pub font_weight: String,
    /// `normal`, `italic` or `oblique`.
    pub font_style: String,
    /// Glyph color.
    pub color: String,
    /// Horizontal alignment within the element box.
    pub text_align: TextAlign,
    /// Line height as a multiple of the font size.
    pub line_height: f32,
    /// Extra spacing between glyphs in design pixels.
    pub letter_spacing: f32,
    /// Decoration line.
    pub text_decoration: TextDecoration,
    /// Fill drawn beneath the glyphs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    /// Box border.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border: Option<Border>,
    /// Drop shadow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Shadow>,
}

impl Default for TextSpec {
    fn default() -> Self {
        Self {
            content: String::new(),
            font_family: "Arial".to_string(),
            font_size: 16.0,
            font_weight: "normal".to_string(),
            font_style: "normal".to_string(),
            color: "#000000".to_string(),
            text_align: TextAlign::Left,
            line_height: 1.2,
            letter_spacing: 0.0,
            text_decoration: TextDecoration::None,
            background_color: None,
            border: None,
            shadow: None,
        }
    }
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    /// Flush left.
    #[default]
    #[serde(alias = "start")]
    Left,
    /// Centered.
    Center,
    /// Flush right.
    #[serde(alias = "end")]
    Right,
    /// Stretched to the box width (last line flush left).
    Justify,
}

/// Text decoration line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextDecoration {
    /// No decoration.
    #[default]
    None,
    /// Line under the glyphs.
    Underline,
    /// Line through the glyphs.
    LineThrough,
    /// Line above the glyphs.
    Overline,
}

/// Image element attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageSpec {
    /// Path, URL or data URI.
    #[serde(alias = "url", skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Opaque binary reference resolved by the asset collaborator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// How the image fills its box.
    pub object_fit: ObjectFit,
    /// Anchor within the box (`center`, `left top`, `25% 75%`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_position: Option<String>,
    /// Mirror horizontally.
    pub flip_x: bool,
    /// Mirror vertically.
    pub flip_y: bool,
    /// Source crop rectangle in image pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRect>,
    /// Pixel adjustments applied in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<ImageFilter>,
    /// Box border.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border: Option<Border>,
    /// Drop shadow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Shadow>,
}

impl ImageSpec {
    /// The locator to resolve: the binary reference wins over `src`.
    #[must_use]
    pub fn locator(&self) -> Option<&str> {
        self.asset.as_deref().or(self.src.as_deref())
    }
}

/// How an image is fitted into its element box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectFit {
    /// Stretch to the box.
    #[default]
    Fill,
    /// Scale to fit inside, preserving aspect.
    Contain,
    /// Scale to cover, preserving aspect; overflow is clipped.
    Cover,
    /// Natural size; overflow is clipped.
    None,
    /// The smaller of `none` and `contain`.
    ScaleDown,
}

/// Crop rectangle in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CropRect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

/// Named pixel adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Desaturate fully.
    Grayscale,
    /// Warm brown toning.
    Sepia,
    /// Invert color channels.
    Invert,
    /// Gaussian blur; value is sigma in pixels.
    Blur,
    /// Multiply brightness; value 1.0 is identity.
    Brightness,
    /// Scale contrast; value 1.0 is identity.
    Contrast,
    /// Rotate hue; value is degrees.
    HueRotate,
}

/// One image adjustment: either a bare name or `{ "name": ..., "value": ... }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageFilter {
    /// Adjustment kind.
    pub name: FilterKind,
    /// Optional strength; each kind has its own default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
}

impl<'de> Deserialize<'de> for ImageFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bare(FilterKind),
            Full {
                name: FilterKind,
                #[serde(default)]
                value: Option<f32>,
            },
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Bare(name) => Self { name, value: None },
            Repr::Full { name, value } => Self { name, value },
        })
    }
}

/// Vector shape attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShapeSpec {
    /// Which primitive to draw.
    pub shape: ShapeKind,
    /// Fill paint.
    pub fill: String,
    /// Stroke paint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    /// Stroke width in design pixels.
    pub stroke_width: f32,
    /// Horizontal corner radius (rectangles).
    pub rx: f32,
    /// Vertical corner radius (rectangles).
    pub ry: f32,
    /// Point count for stars and polygons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    /// Drop shadow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Shadow>,
}

impl Default for ShapeSpec {
    fn default() -> Self {
        Self {
            shape: ShapeKind::Rectangle,
            fill: "#000000".to_string(),
            stroke: None,
            stroke_width: 0.0,
            rx: 0.0,
            ry: 0.0,
            points: None,
            shadow: None,
        }
    }
}

/// Supported vector primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// Axis-aligned rectangle with optional rounded corners.
    #[default]
    #[serde(alias = "rect", alias = "square")]
    Rectangle,
    /// Circle inscribed in the box.
    Circle,
    /// Ellipse filling the box.
    Ellipse,
    /// Isosceles triangle pointing up.
    Triangle,
    /// Horizontal line through the box's vertical center.
    Line,
    /// Star with `points` tips.
    Star,
    /// Regular polygon with `points` sides.
    Polygon,
}

/// QR code attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QrSpec {
    /// Data to encode.
    #[serde(alias = "text")]
    pub content: String,
    /// Side length in design pixels; defaults to the smaller box side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
    /// Dark module color.
    pub fg_color: String,
    /// Light module color.
    pub bg_color: String,
    /// Error-correction level.
    pub error_correction: QrErrorCorrection,
    /// Quiet zone width in modules.
    pub margin: u32,
}

impl Default for QrSpec {
    fn default() -> Self {
        Self {
            content: String::new(),
            size: None,
            fg_color: "#000000".to_string(),
            bg_color: "#ffffff".to_string(),
            error_correction: QrErrorCorrection::M,
            margin: 2,
        }
    }
}

/// QR error-correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QrErrorCorrection {
    /// ~7% recovery.
    #[serde(alias = "l")]
    L,
    /// ~15% recovery.
    #[default]
    #[serde(alias = "m")]
    M,
    /// ~25% recovery.
    #[serde(alias = "q")]
    Q,
    /// ~30% recovery.
    #[serde(alias = "h")]
    H,
}

/// Box border.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Border {
    /// Stroke width in design pixels.
    pub width: f32,
    /// Stroke color.
    pub color: String,
    /// Corner radius.
    pub radius: f32,
    /// `solid`, `dashed` or `dotted`.
    pub style: BorderStyle,
}

impl Default for Border {
    fn default() -> Self {
        Self {
            width: 1.0,
            color: "#000000".to_string(),
            radius: 0.0,
            style: BorderStyle::Solid,
        }
    }
}

/// Border dash pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderStyle {
    /// Continuous.
    #[default]
    Solid,
    /// Long dashes.
    Dashed,
    /// Dots.
    Dotted,
}

/// Drop shadow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Shadow {
    /// Horizontal offset.
    pub offset_x: f32,
    /// Vertical offset.
    pub offset_y: f32,
    /// Blur radius.
    pub blur: f32,
    /// Shadow color.
    pub color: String,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            offset_x: 2.0,
            offset_y: 2.0,
            blur: 4.0,
            color: "rgba(0,0,0,0.5)".to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Str(String),
        Num(serde_json::Number),
    }
    Ok(match Repr::deserialize(deserializer)? {
        Repr::Str(s) => s,
        Repr::Num(n) => n.to_string(),
    })
}

impl Element {
    /// Create an element with the given payload and an empty frame.
    #[must_use]
    pub fn new(kind: ElementKind) -> Self {
        Self {
            id: None,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            opacity: 1.0,
            z_index: None,
            visible: true,
            locked: false,
            kind,
        }
    }

    /// Create a text element with default styling.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(ElementKind::Text(TextSpec {
            content: content.into(),
            ..TextSpec::default()
        }))
    }

    /// Create an image element pointing at `src`.
    #[must_use]
    pub fn image(src: impl Into<String>) -> Self {
        Self::new(ElementKind::Image(ImageSpec {
            src: Some(src.into()),
            ..ImageSpec::default()
        }))
    }

    /// Create a shape element of the given kind.
    #[must_use]
    pub fn shape(shape: ShapeKind, fill: impl Into<String>) -> Self {
        Self::new(ElementKind::Shape(ShapeSpec {
            shape,
            fill: fill.into(),
            ..ShapeSpec::default()
        }))
    }

    /// Create a QR element encoding `content`.
    #[must_use]
    pub fn qr(content: impl Into<String>) -> Self {
        Self::new(ElementKind::Qr(QrSpec {
            content: content.into(),
            ..QrSpec::default()
        }))
    }

    /// Set position and size.
    #[must_use]
    pub fn with_bounds(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
        self
    }

    /// Set the identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set opacity.
    #[must_use]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Set rotation in degrees.
    #[must_use]
    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = degrees;
        self
    }

    /// Set an explicit z-index.
    #[must_use]
    pub fn with_z_index(mut self, z_index: i64) -> Self {
        self.z_index = Some(z_index);
        self
    }

    /// The JSON `type` tag.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Human-readable label for diagnostics: the id if set, else `type#index`.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}#{index}", self.type_name()))
    }

    /// Drawn size; QR codes use `size` when set.
    #[must_use]
    pub fn extent(&self) -> (f32, f32) {
        match &self.kind {
            ElementKind::Qr(QrSpec { size: Some(s), .. }) => (*s, *s),
            _ => (self.width, self.height),
        }
    }

    /// Center point of the drawn box.
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        let (w, h) = self.extent();
        (self.x + w / 2.0, self.y + h / 2.0)
    }

    /// Check numeric ranges and color syntax.
    ///
    /// # Errors
    ///
    /// Returns [`DesignError::InvalidValue`] naming the first offending field.
    pub fn validate(&self, index: usize) -> DesignResult<()> {
        let field = |name: &str| format!("elements[{index}].{name}");

        for (name, value) in [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
            ("rotation", self.rotation),
            ("opacity", self.opacity),
        ] {
            if !value.is_finite() {
                return Err(DesignError::invalid(field(name), "must be a finite number"));
            }
        }
        if self.width < 0.0 {
            return Err(DesignError::invalid(field("width"), "must not be negative"));
        }
        if self.height < 0.0 {
            return Err(DesignError::invalid(field("height"), "must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(DesignError::invalid(
                field("opacity"),
                format!("{} is outside [0, 1]", self.opacity),
            ));
        }

        match &self.kind {
            ElementKind::Text(text) => {
                if text.font_size <= 0.0 || !text.font_size.is_finite() {
                    return Err(DesignError::invalid(field("fontSize"), "must be positive"));
                }
                if text.line_height <= 0.0 || !text.line_height.is_finite() {
                    return Err(DesignError::invalid(field("lineHeight"), "must be positive"));
                }
                check_color(&field("color"), &text.color)?;
                if let Some(bg) = &text.background_color {
                    check_color(&field("backgroundColor"), bg)?;
                }
                check_border(&field("border"), text.border.as_ref())?;
                check_shadow(&field("shadow"), text.shadow.as_ref())?;
            }
            ElementKind::Image(image) => {
                if image.locator().map_or(true, str::is_empty) {
                    return Err(DesignError::MissingField(field("src")));
                }
                if let Some(crop) = &image.crop {
                    if crop.width <= 0.0 || crop.height <= 0.0 || crop.x < 0.0 || crop.y < 0.0 {
                        return Err(DesignError::invalid(
                            field("crop"),
                            "crop rectangle must have a non-negative origin and positive size",
                        ));
                    }
                }
                check_border(&field("border"), image.border.as_ref())?;
                check_shadow(&field("shadow"), image.shadow.as_ref())?;
            }
            ElementKind::Shape(shape) => {
                check_color(&field("fill"), &shape.fill)?;
                if let Some(stroke) = &shape.stroke {
                    check_color(&field("stroke"), stroke)?;
                }
                if shape.stroke_width < 0.0 || shape.rx < 0.0 || shape.ry < 0.0 {
                    return Err(DesignError::invalid(
                        field("strokeWidth"),
                        "stroke width and corner radii must not be negative",
                    ));
                }
                if let Some(points) = shape.points {
                    if points < 3 {
                        return Err(DesignError::invalid(field("points"), "must be at least 3"));
                    }
                }
                check_shadow(&field("shadow"), shape.shadow.as_ref())?;
            }
            ElementKind::Qr(qr) => {
                if qr.content.is_empty() {
                    return Err(DesignError::MissingField(field("content")));
                }
                if let Some(size) = qr.size {
                    if size <= 0.0 || !size.is_finite() {
                        return Err(DesignError::invalid(field("size"), "must be positive"));
                    }
                }
                check_color(&field("fgColor"), &qr.fg_color)?;
                check_color(&field("bgColor"), &qr.bg_color)?;
            }
        }
        Ok(())
    }
}

fn check_color(field: &str, value: &str) -> DesignResult<()> {
    Color::parse(value)
        .map(|_| ())
        .map_err(|e| DesignError::invalid(field, e.to_string()))
}

fn check_border(field: &str, border: Option<&Border>) -> DesignResult<()> {
    let Some(border) = border else {
        return Ok(());
    };
    if border.width < 0.0 || border.radius < 0.0 {
        return Err(DesignError::invalid(field, "width and radius must not be negative"));
    }
    check_color(&format!("{field}.color"), &border.color)
}

fn check_shadow(field: &str, shadow: Option<&Shadow>) -> DesignResult<()> {
    let Some(shadow) = shadow else {
        return Ok(());
    };
    if shadow.blur < 0.0 {
        return Err(DesignError::invalid(format!("{field}.blur"), "must not be negative"));
    }
    check_color(&format!("{field}.color"), &shadow.color)
}
