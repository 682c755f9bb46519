//! Image loading and pixel processing.
//!
//! Sources are data URIs or locators handed to the [`AssetResolver`]. Crop,
//! flips and filters are applied to the decoded pixels; the result is
//! re-embedded as a PNG data URI and fitted into the element box.

use std::fmt::Write;
use std::io::Cursor;

use base64::Engine;
use design_core::{AssetResolver, CropRect, FilterKind, ImageFilter, ImageSpec, ObjectFit};
use image::{DynamicImage, RgbaImage};

use crate::error::ElementError;
use crate::svg::border_rect;

/// Source encodings recognized by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// PNG with alpha support.
    Png,
    /// JPEG (no alpha).
    Jpeg,
    /// `WebP` (alpha support).
    WebP,
    /// GIF.
    Gif,
    /// Unknown/other format.
    Unknown,
}

impl SourceFormat {
    /// Detect format from magic bytes.
    #[must_use]
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.len() < 4 {
            return Self::Unknown;
        }
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Self::Png;
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Self::Jpeg;
        }
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Self::WebP;
        }
        if data.starts_with(b"GIF8") {
            return Self::Gif;
        }
        Self::Unknown
    }

    /// Decoder to use, if the format is recognized.
    #[must_use]
    pub fn image_format(self) -> Option<image::ImageFormat> {
        match self {
            Self::Png => Some(image::ImageFormat::Png),
            Self::Jpeg => Some(image::ImageFormat::Jpeg),
            Self::WebP => Some(image::ImageFormat::WebP),
            Self::Gif => Some(image::ImageFormat::Gif),
            Self::Unknown => None,
        }
    }
}

/// Destination rectangle of a fitted image inside its box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitRect {
    /// Left edge relative to the box.
    pub x: f32,
    /// Top edge relative to the box.
    pub y: f32,
    /// Drawn width.
    pub width: f32,
    /// Drawn height.
    pub height: f32,
}

/// Decode the payload of a `data:` URI.
///
/// Supports base64 (`data:image/png;base64,...`) and percent-encoded payloads.
///
/// # Errors
///
/// Returns [`ElementError::Decode`] if the URI is malformed.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ElementError> {
    let uri_data = uri
        .strip_prefix("data:")
        .ok_or_else(|| ElementError::Decode("not a data URI".to_string()))?;

    let comma_pos = uri_data
        .find(',')
        .ok_or_else(|| ElementError::Decode("invalid data URI: missing comma".to_string()))?;

    let metadata = &uri_data[..comma_pos];
    let encoded_data = &uri_data[comma_pos + 1..];

    if metadata.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(encoded_data.trim())
            .map_err(|e| ElementError::Decode(format!("invalid base64: {e}")))
    } else {
        percent_decode(encoded_data)
    }
}

fn percent_decode(input: &str) -> Result<Vec<u8>, ElementError> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = input
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| ElementError::Decode("invalid URL encoding".to_string()))?;
            result.push(byte);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }
    Ok(result)
}

/// Fetch and decode the image an element points at.
///
/// # Errors
///
/// Returns [`ElementError::Asset`] when the bytes cannot be obtained and
/// [`ElementError::Decode`] when they are not a supported image.
pub fn load_source(
    spec: &ImageSpec,
    resolver: Option<&dyn AssetResolver>,
) -> Result<DynamicImage, ElementError> {
    let locator = spec
        .locator()
        .ok_or_else(|| ElementError::Asset("image has no source".to_string()))?;

    let bytes = if locator.starts_with("data:") {
        decode_data_uri(locator)?
    } else {
        let resolver = resolver
            .ok_or_else(|| ElementError::Asset(format!("no asset resolver for '{locator}'")))?;
        resolver
            .read(locator)
            .map_err(|e| ElementError::Asset(e.to_string()))?
    };

    let format = SourceFormat::from_magic_bytes(&bytes);
    tracing::debug!(
        locator = %truncate(locator, 64),
        bytes = bytes.len(),
        ?format,
        "loaded image source"
    );
    let decoded = match format.image_format() {
        Some(known) => image::load_from_memory_with_format(&bytes, known),
        None => image::load_from_memory(&bytes),
    };
    decoded.map_err(|e| ElementError::Decode(format!("{format:?} image: {e}")))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Apply crop, flips and filters, in that order.
///
/// # Errors
///
/// Returns [`ElementError::Unrenderable`] if the crop rectangle misses the image.
pub fn apply_adjustments(image: DynamicImage, spec: &ImageSpec) -> Result<DynamicImage, ElementError> {
    let mut image = match &spec.crop {
        Some(crop) => crop_image(&image, crop)?,
        None => image,
    };
    if spec.flip_x {
        image = image.fliph();
    }
    if spec.flip_y {
        image = image.flipv();
    }
    if spec.filters.is_empty() {
        return Ok(image);
    }

    let mut pixels = image.to_rgba8();
    for filter in &spec.filters {
        pixels = apply_filter(pixels, *filter);
    }
    Ok(DynamicImage::ImageRgba8(pixels))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn crop_image(image: &DynamicImage, crop: &CropRect) -> Result<DynamicImage, ElementError> {
    let (w, h) = (image.width(), image.height());
    let x = (crop.x.max(0.0).floor() as u32).min(w);
    let y = (crop.y.max(0.0).floor() as u32).min(h);
    let cw = (crop.width.max(0.0).round() as u32).min(w - x);
    let ch = (crop.height.max(0.0).round() as u32).min(h - y);
    if cw == 0 || ch == 0 {
        return Err(ElementError::Unrenderable(format!(
            "crop rect {}x{} at ({}, {}) lies outside the {w}x{h} image",
            crop.width, crop.height, crop.x, crop.y
        )));
    }
    Ok(image.crop_imm(x, y, cw, ch))
}

/// Default strength for filters given by bare name.
fn default_strength(kind: FilterKind) -> f32 {
    match kind {
        FilterKind::Grayscale | FilterKind::Sepia | FilterKind::Invert => 1.0,
        FilterKind::Blur => 2.0,
        FilterKind::Brightness | FilterKind::Contrast => 1.2,
        FilterKind::HueRotate => 90.0,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[allow(clippy::cast_possible_truncation)]
fn apply_filter(mut pixels: RgbaImage, filter: ImageFilter) -> RgbaImage {
    let value = filter.value.unwrap_or_else(|| default_strength(filter.name));
    let amount = value.clamp(0.0, 1.0);

    match filter.name {
        FilterKind::Blur => return image::imageops::blur(&pixels, value.max(0.0)),
        FilterKind::HueRotate => return image::imageops::huerotate(&pixels, value.round() as i32),
        _ => {}
    }

    for pixel in pixels.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
        let (nr, ng, nb) = match filter.name {
            FilterKind::Grayscale => {
                let lum = 0.2126 * r + 0.7152 * g + 0.0722 * b;
                (r + (lum - r) * amount, g + (lum - g) * amount, b + (lum - b) * amount)
            }
            FilterKind::Sepia => {
                let sr = 0.393 * r + 0.769 * g + 0.189 * b;
                let sg = 0.349 * r + 0.686 * g + 0.168 * b;
                let sb = 0.272 * r + 0.534 * g + 0.131 * b;
                (r + (sr - r) * amount, g + (sg - g) * amount, b + (sb - b) * amount)
            }
            FilterKind::Invert => (
                r + (255.0 - 2.0 * r) * amount,
                g + (255.0 - 2.0 * g) * amount,
                b + (255.0 - 2.0 * b) * amount,
            ),
            FilterKind::Brightness => (r * value, g * value, b * value),
            FilterKind::Contrast => (
                (r - 127.5) * value + 127.5,
                (g - 127.5) * value + 127.5,
                (b - 127.5) * value + 127.5,
            ),
            FilterKind::Blur | FilterKind::HueRotate => (r, g, b),
        };
        pixel.0 = [to_channel(nr), to_channel(ng), to_channel(nb), a];
    }
    pixels
}

/// Parse a CSS `object-position` into fractional anchors (0.0 = left/top).
#[must_use]
pub fn parse_object_position(position: Option<&str>) -> (f32, f32) {
    let Some(position) = position else {
        return (0.5, 0.5);
    };
    let mut x = None;
    let mut y = None;
    let mut percents = Vec::new();

    for token in position.split_whitespace() {
        match token.to_ascii_lowercase().as_str() {
            "left" => x = Some(0.0),
            "right" => x = Some(1.0),
            "top" => y = Some(0.0),
            "bottom" => y = Some(1.0),
            "center" => {}
            other => {
                if let Some(p) = other.strip_suffix('%').and_then(|p| p.parse::<f32>().ok()) {
                    percents.push((p / 100.0).clamp(0.0, 1.0));
                }
            }
        }
    }
    let mut percents = percents.into_iter();
    let x = x.or_else(|| percents.next()).unwrap_or(0.5);
    let y = y.or_else(|| percents.next()).unwrap_or(0.5);
    (x, y)
}

/// Where an image of `natural` size lands inside a box of `bounds` size.
#[must_use]
pub fn fit_rect(
    fit: ObjectFit,
    anchor: (f32, f32),
    natural: (f32, f32),
    bounds: (f32, f32),
) -> FitRect {
    let (iw, ih) = (natural.0.max(1.0), natural.1.max(1.0));
    let (bw, bh) = bounds;
    let contain = (bw / iw).min(bh / ih);
    let scale = match fit {
        ObjectFit::Fill => {
            return FitRect {
                x: 0.0,
                y: 0.0,
                width: bw,
                height: bh,
            }
        }
        ObjectFit::Contain => contain,
        ObjectFit::Cover => (bw / iw).max(bh / ih),
        ObjectFit::None => 1.0,
        ObjectFit::ScaleDown => contain.min(1.0),
    };
    let (w, h) = (iw * scale, ih * scale);
    FitRect {
        x: (bw - w) * anchor.0,
        y: (bh - h) * anchor.1,
        width: w,
        height: h,
    }
}

/// Downscale so the image is at most twice the drawn pixel size.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn limit_resolution(image: DynamicImage, drawn: &FitRect, scale: f32) -> DynamicImage {
    let max_w = ((drawn.width * scale * 2.0).ceil() as u32).max(1);
    let max_h = ((drawn.height * scale * 2.0).ceil() as u32).max(1);
    if image.width() <= max_w && image.height() <= max_h {
        return image;
    }
    image.resize_exact(
        image.width().min(max_w),
        image.height().min(max_h),
        image::imageops::FilterType::Lanczos3,
    )
}

/// Encode pixels as a PNG `data:` URI.
///
/// # Errors
///
/// Returns [`ElementError::Decode`] if PNG encoding fails.
pub fn to_png_data_uri(image: &DynamicImage) -> Result<String, ElementError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| ElementError::Decode(format!("PNG re-encoding failed: {e}")))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());
    Ok(format!("data:image/png;base64,{encoded}"))
}

/// Draw an image element into the box `(0, 0, width, height)`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn render_image(
    svg: &mut String,
    spec: &ImageSpec,
    width: f32,
    height: f32,
    resolver: Option<&dyn AssetResolver>,
    scale: f32,
    clip_id: &str,
) -> Result<(), ElementError> {
    let source = load_source(spec, resolver)?;
    let adjusted = apply_adjustments(source, spec)?;

    let natural = (adjusted.width() as f32, adjusted.height() as f32);
    let anchor = parse_object_position(spec.object_position.as_deref());
    let rect = fit_rect(spec.object_fit, anchor, natural, (width, height));
    let embedded = limit_resolution(adjusted, &rect, scale);
    let href = to_png_data_uri(&embedded)?;

    let radius = spec.border.as_ref().map_or(0.0, |b| b.radius);
    let _ = write!(
        svg,
        "<defs><clipPath id=\"{clip_id}\"><rect width=\"{width}\" height=\"{height}\" rx=\"{radius}\"/></clipPath></defs>\
         <g clip-path=\"url(#{clip_id})\"><image x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" preserveAspectRatio=\"none\" xlink:href=\"{href}\"/></g>",
        rect.x, rect.y, rect.width, rect.height,
    );
    if let Some(border) = &spec.border {
        border_rect(svg, border, width, height);
    }
    Ok(())
}
