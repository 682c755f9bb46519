//! Output encoding.
//!
//! Composed SVG is rasterized through resvg/tiny-skia and encoded as PNG,
//! JPEG, `WebP` or PDF. SVG output skips rasterization.

use std::fmt;
use std::str::FromStr;

use design_core::Color;
use image::ImageEncoder;
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};
use crate::text::FontCatalog;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG image.
    #[default]
    Png,
    /// JPEG image; alpha is flattened onto the background.
    Jpeg,
    /// Lossless `WebP` image.
    Webp,
    /// SVG document (UTF-8 bytes).
    Svg,
    /// PDF document with one raster page per design.
    Pdf,
}

impl OutputFormat {
    /// MIME type of the encoded bytes.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Svg => "image/svg+xml",
            Self::Pdf => "application/pdf",
        }
    }

    /// Conventional file extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Svg => "svg",
            Self::Pdf => "pdf",
        }
    }

    /// Whether encoding goes through a pixel buffer.
    #[must_use]
    pub const fn is_raster(self) -> bool {
        !matches!(self, Self::Svg)
    }
}

impl FromStr for OutputFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            "svg" => Ok(Self::Svg),
            "pdf" => Ok(Self::Pdf),
            other => Err(RenderError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Document information written into PDF output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfMetadata {
    /// Document title.
    pub title: String,
    /// Author.
    pub author: Option<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Keywords.
    pub keywords: Vec<String>,
}

impl Default for PdfMetadata {
    fn default() -> Self {
        Self {
            title: "Design".to_string(),
            author: None,
            subject: None,
            keywords: Vec::new(),
        }
    }
}

/// Rasterize an SVG string to a pixmap of its declared size.
///
/// # Errors
///
/// Returns [`RenderError::Encoding`] if the SVG does not parse or the pixmap
/// cannot be allocated.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rasterize(svg: &str, fonts: &FontCatalog) -> RenderResult<tiny_skia::Pixmap> {
    let opt = usvg::Options {
        fontdb: fonts.database(),
        ..usvg::Options::default()
    };
    let tree = usvg::Tree::from_str(svg, &opt)
        .map_err(|e| RenderError::Encoding(format!("SVG parsing failed: {e}")))?;

    let px_w = tree.size().width().round() as u32;
    let px_h = tree.size().height().round() as u32;

    let mut pixmap = tiny_skia::Pixmap::new(px_w.max(1), px_h.max(1))
        .ok_or_else(|| RenderError::Encoding("Failed to create pixmap".to_string()))?;

    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    Ok(pixmap)
}

/// Encode as PNG.
///
/// # Errors
///
/// Returns [`RenderError::Encoding`] on encoder failure.
pub fn encode_png(pixmap: &tiny_skia::Pixmap) -> RenderResult<Vec<u8>> {
    pixmap
        .encode_png()
        .map_err(|e| RenderError::Encoding(format!("PNG encoding failed: {e}")))
}

/// Composite the premultiplied pixmap over an opaque `background`, yielding
/// packed RGB.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn flatten_rgb(pixmap: &tiny_skia::Pixmap, background: Color) -> Vec<u8> {
    let bg = [background.r, background.g, background.b];
    let mut rgb = Vec::with_capacity(pixmap.data().len() / 4 * 3);
    for pixel in pixmap.data().chunks_exact(4) {
        let inv = 1.0 - f32::from(pixel[3]) / 255.0;
        for channel in 0..3 {
            let value = f32::from(bg[channel]).mul_add(inv, f32::from(pixel[channel]));
            rgb.push(value.round().clamp(0.0, 255.0) as u8);
        }
    }
    rgb
}

/// Straight (non-premultiplied) RGBA bytes.
fn straight_rgba(pixmap: &tiny_skia::Pixmap) -> Vec<u8> {
    pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect()
}

/// Encode as JPEG at `quality` (1-100), flattening alpha onto `background`.
///
/// # Errors
///
/// Returns [`RenderError::Encoding`] on encoder failure.
pub fn encode_jpeg(
    pixmap: &tiny_skia::Pixmap,
    quality: u8,
    background: Color,
) -> RenderResult<Vec<u8>> {
    let rgb = flatten_rgb(pixmap, background);
    let mut buf = std::io::Cursor::new(Vec::new());
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder
        .write_image(
            &rgb,
            pixmap.width(),
            pixmap.height(),
            image::ColorType::Rgb8.into(),
        )
        .map_err(|e| RenderError::Encoding(format!("JPEG encoding failed: {e}")))?;
    Ok(buf.into_inner())
}

/// Encode as lossless `WebP`.
///
/// # Errors
///
/// Returns [`RenderError::Encoding`] on encoder failure.
pub fn encode_webp(pixmap: &tiny_skia::Pixmap) -> RenderResult<Vec<u8>> {
    let rgba = straight_rgba(pixmap);
    let mut buf = std::io::Cursor::new(Vec::new());
    image::codecs::webp::WebPEncoder::new_lossless(&mut buf)
        .write_image(
            &rgba,
            pixmap.width(),
            pixmap.height(),
            image::ColorType::Rgba8.into(),
        )
        .map_err(|e| RenderError::Encoding(format!("WebP encoding failed: {e}")))?;
    Ok(buf.into_inner())
}

/// One rasterized page of a PDF.
#[derive(Debug)]
pub struct PdfPage {
    /// Page content.
    pub pixmap: tiny_skia::Pixmap,
    /// Page width in millimetres.
    pub width_mm: f32,
    /// Page height in millimetres.
    pub height_mm: f32,
}

impl PdfPage {
    /// A page whose physical size is the canvas size at `dpi`.
    #[must_use]
    pub fn from_canvas(pixmap: tiny_skia::Pixmap, canvas: (f32, f32), dpi: f32) -> Self {
        Self {
            pixmap,
            width_mm: canvas.0 / dpi * 25.4,
            height_mm: canvas.1 / dpi * 25.4,
        }
    }
}

/// Encode pages as a PDF, each page filled by its raster image.
///
/// # Errors
///
/// Returns [`RenderError::InvalidOptions`] for an empty page list and
/// [`RenderError::Encoding`] on encoder failure.
#[cfg(feature = "pdf")]
#[allow(clippy::cast_precision_loss)]
pub fn encode_pdf(pages: &[PdfPage], metadata: &PdfMetadata) -> RenderResult<Vec<u8>> {
    let Some(first) = pages.first() else {
        return Err(RenderError::InvalidOptions(
            "PDF needs at least one page".to_string(),
        ));
    };

    let (doc, page1, layer1) = printpdf::PdfDocument::new(
        metadata.title.as_str(),
        printpdf::Mm(first.width_mm),
        printpdf::Mm(first.height_mm),
        "Layer 1",
    );
    let mut doc = doc;
    if let Some(author) = &metadata.author {
        doc = doc.with_author(author.as_str());
    }
    if let Some(subject) = &metadata.subject {
        doc = doc.with_subject(subject.as_str());
    }
    if !metadata.keywords.is_empty() {
        doc = doc.with_keywords(metadata.keywords.clone());
    }

    for (i, page) in pages.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(page1).get_layer(layer1)
        } else {
            let (page_index, layer_index) = doc.add_page(
                printpdf::Mm(page.width_mm),
                printpdf::Mm(page.height_mm),
                format!("Layer {}", i + 1),
            );
            doc.get_page(page_index).get_layer(layer_index)
        };

        // Re-encode through printpdf's bundled image crate; PDF pages are
        // opaque so alpha is flattened onto white first.
        let rgb = flatten_rgb(&page.pixmap, Color::WHITE);
        let mut png = std::io::Cursor::new(Vec::new());
        image::codecs::png::PngEncoder::new(&mut png)
            .write_image(
                &rgb,
                page.pixmap.width(),
                page.pixmap.height(),
                image::ColorType::Rgb8.into(),
            )
            .map_err(|e| RenderError::Encoding(format!("PNG encoding failed: {e}")))?;
        let dynamic_image = printpdf::image_crate::load_from_memory(&png.into_inner())
            .map_err(|e| RenderError::Encoding(format!("Failed to decode PNG for PDF: {e}")))?;
        let pdf_image = printpdf::Image::from_dynamic_image(&dynamic_image);

        // Image drawn size is pixels / dpi, so this dpi makes it fill the page.
        let dpi = page.pixmap.width() as f32 / (page.width_mm / 25.4);
        let transform = printpdf::ImageTransform {
            translate_x: Some(printpdf::Mm(0.0)),
            translate_y: Some(printpdf::Mm(0.0)),
            dpi: Some(dpi),
            ..Default::default()
        };
        pdf_image.add_to_layer(layer, transform);
    }

    doc.save_to_bytes()
        .map_err(|e| RenderError::Encoding(format!("PDF save failed: {e}")))
}

/// Encode pages as a PDF.
///
/// # Errors
///
/// Always returns [`RenderError::UnsupportedFormat`]; this build has no PDF
/// support.
#[cfg(not(feature = "pdf"))]
pub fn encode_pdf(_pages: &[PdfPage], _metadata: &PdfMetadata) -> RenderResult<Vec<u8>> {
    Err(RenderError::UnsupportedFormat(
        "pdf (built without the `pdf` feature)".to_string(),
    ))
}
