//! Composition: document → canvas → encoded artifact.
//!
//! ```text
//! DesignDocument ──validate──▶ SVG canvas ──rasterize──▶ Pixmap ──encode──▶ bytes
//!                              │ background
//!                              │ elements (stacking order)
//!                              │ safe zone, crop marks, watermark
//! ```
//!
//! Coordinates in the composed SVG are design pixels; the root `viewBox`
//! maps them to the requested output size.

use std::fmt::Write;
use std::sync::Arc;

use design_core::{validate_document, AssetResolver, Color, DesignDocument};
use serde::Serialize;

use crate::element::ElementRenderer;
use crate::error::{Diagnostic, RenderError, RenderResult};
use crate::export::{
    encode_jpeg, encode_pdf, encode_png, encode_webp, rasterize, OutputFormat, PdfMetadata,
    PdfPage,
};
use crate::svg::{color_or_black, escape_xml, paint_attrs};
use crate::text::{FontCatalog, DEFAULT_FAMILY};

/// Default pixel ceiling for one output (100 megapixels).
pub const DEFAULT_MAX_PIXELS: u64 = 100_000_000;

/// Overlay text drawn across the whole canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    /// Text to draw.
    pub text: String,
    /// Fill color.
    pub color: String,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
    /// Rotation in degrees about the canvas center.
    pub rotation: f32,
    /// Font size in design pixels; defaults to an eighth of the shorter side.
    pub font_size: Option<f32>,
}

impl Watermark {
    /// A translucent diagonal watermark.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: "#000000".to_string(),
            opacity: 0.3,
            rotation: -30.0,
            font_size: None,
        }
    }
}

/// Render configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Output encoding.
    pub format: OutputFormat,
    /// Output pixels per design pixel; ignored when `width` and `height` are set.
    pub scale: f32,
    /// Exact output width. With only one of `width`/`height`, the other
    /// follows the canvas aspect ratio.
    pub width: Option<u32>,
    /// Exact output height.
    pub height: Option<u32>,
    /// Canvas fill overriding `settings.backgroundColor`.
    pub background: Option<String>,
    /// Extend the canvas by `settings.bleed` on every side.
    pub include_bleed: bool,
    /// Draw crop marks in the bleed area (needs `include_bleed`).
    pub crop_marks: bool,
    /// Outline the safe zone.
    pub safe_zone_guides: bool,
    /// Optional watermark, drawn last.
    pub watermark: Option<Watermark>,
    /// JPEG quality (1-100).
    pub quality: u8,
    /// PDF resolution overriding `settings.dpi`.
    pub dpi: Option<f32>,
    /// Maximum output pixel count.
    pub max_pixels: u64,
    /// PDF document information.
    pub pdf: PdfMetadata,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            scale: 1.0,
            width: None,
            height: None,
            background: None,
            include_bleed: false,
            crop_marks: false,
            safe_zone_guides: false,
            watermark: None,
            quality: 90,
            dpi: None,
            max_pixels: DEFAULT_MAX_PIXELS,
            pdf: PdfMetadata::default(),
        }
    }
}

impl RenderOptions {
    /// Default options for `format`.
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    fn validate(&self) -> RenderResult<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(RenderError::InvalidOptions(format!(
                "scale must be positive, got {}",
                self.scale
            )));
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(RenderError::InvalidOptions(
                "output size must be non-zero".to_string(),
            ));
        }
        if let Some(background) = &self.background {
            Color::parse(background).map_err(|e| {
                RenderError::InvalidOptions(format!("background '{background}': {e}"))
            })?;
        }
        if let Some(dpi) = self.dpi {
            if !dpi.is_finite() || dpi <= 0.0 {
                return Err(RenderError::InvalidOptions(format!(
                    "dpi must be positive, got {dpi}"
                )));
            }
        }
        Ok(())
    }
}

/// An encoded artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    /// Encoded bytes.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Encoding of `bytes`.
    pub format: OutputFormat,
    /// Elements drawn as error placeholders.
    pub diagnostics: Vec<Diagnostic>,
}

/// The composed SVG of one document, before encoding.
#[derive(Debug, Clone)]
pub struct Composition {
    /// Complete SVG document.
    pub svg: String,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Canvas size in design pixels, bleed included when requested.
    pub canvas: (f32, f32),
    /// Elements drawn as error placeholders.
    pub diagnostics: Vec<Diagnostic>,
}

/// Composes documents and encodes them.
#[derive(Debug, Clone)]
pub struct Compositor {
    elements: ElementRenderer,
}

impl Compositor {
    /// A compositor using `fonts`.
    #[must_use]
    pub fn new(fonts: Arc<FontCatalog>) -> Self {
        Self {
            elements: ElementRenderer::new(fonts),
        }
    }

    /// A compositor using the fonts installed on this system.
    #[must_use]
    pub fn with_system_fonts() -> Self {
        Self::new(Arc::new(FontCatalog::system()))
    }

    /// Resolve image locators through `resolver`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn AssetResolver>) -> Self {
        self.elements = self.elements.with_resolver(resolver);
        self
    }

    /// Validate raw JSON and render it.
    ///
    /// # Errors
    ///
    /// As [`Compositor::render`]; a document that fails validation yields
    /// [`RenderError::InvalidDocument`].
    pub fn render_json(&self, raw: &str, options: &RenderOptions) -> RenderResult<RenderOutput> {
        let doc = validate_document(raw)?;
        self.render(&doc, options)
    }

    /// Render `doc` to the format in `options`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidDocument`] if `doc` fails validation,
    /// [`RenderError::InvalidOptions`] or [`RenderError::ResourceExceeded`]
    /// for bad sizing, and [`RenderError::Encoding`] if encoding fails.
    /// Element-level failures do not abort; they appear in
    /// [`RenderOutput::diagnostics`].
    pub fn render(&self, doc: &DesignDocument, options: &RenderOptions) -> RenderResult<RenderOutput> {
        let composition = self.compose_svg(doc, options)?;
        let Composition {
            svg,
            width,
            height,
            canvas,
            diagnostics,
        } = composition;

        let bytes = match options.format {
            OutputFormat::Svg => svg.into_bytes(),
            OutputFormat::Png => encode_png(&rasterize(&svg, self.elements.fonts())?)?,
            OutputFormat::Jpeg => {
                let pixmap = rasterize(&svg, self.elements.fonts())?;
                encode_jpeg(&pixmap, options.quality, Self::background(doc, options))?
            }
            OutputFormat::Webp => encode_webp(&rasterize(&svg, self.elements.fonts())?)?,
            OutputFormat::Pdf => {
                let pixmap = rasterize(&svg, self.elements.fonts())?;
                let dpi = options.dpi.unwrap_or(doc.settings.dpi);
                encode_pdf(&[PdfPage::from_canvas(pixmap, canvas, dpi)], &options.pdf)?
            }
        };

        tracing::debug!(
            format = %options.format,
            width,
            height,
            bytes = bytes.len(),
            diagnostics = diagnostics.len(),
            "design rendered"
        );

        Ok(RenderOutput {
            bytes,
            width,
            height,
            format: options.format,
            diagnostics,
        })
    }

    /// Render several designs into one PDF, one page each.
    ///
    /// `options.format` is ignored. Diagnostics from all pages are collected
    /// in page order.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid document, or as [`Compositor::render`].
    pub fn render_pdf_pages(
        &self,
        docs: &[DesignDocument],
        options: &RenderOptions,
    ) -> RenderResult<RenderOutput> {
        let mut pages = Vec::with_capacity(docs.len());
        let mut diagnostics = Vec::new();
        let mut first_size = None;
        for doc in docs {
            let composition = self.compose_svg(doc, options)?;
            first_size.get_or_insert((composition.width, composition.height));
            let pixmap = rasterize(&composition.svg, self.elements.fonts())?;
            let dpi = options.dpi.unwrap_or(doc.settings.dpi);
            pages.push(PdfPage::from_canvas(pixmap, composition.canvas, dpi));
            diagnostics.extend(composition.diagnostics);
        }
        let bytes = encode_pdf(&pages, &options.pdf)?;
        let (width, height) = first_size.unwrap_or_default();
        tracing::debug!(pages = pages.len(), bytes = bytes.len(), "multi-page PDF rendered");
        Ok(RenderOutput {
            bytes,
            width,
            height,
            format: OutputFormat::Pdf,
            diagnostics,
        })
    }

    /// PNG of exactly `width` × `height`, stretched to fit, optionally
    /// watermarked.
    ///
    /// # Errors
    ///
    /// As [`Compositor::render`].
    pub fn thumbnail(
        &self,
        doc: &DesignDocument,
        width: u32,
        height: u32,
        watermark: Option<&str>,
    ) -> RenderResult<RenderOutput> {
        let options = RenderOptions {
            width: Some(width),
            height: Some(height),
            watermark: watermark.map(Watermark::new),
            ..RenderOptions::default()
        };
        self.render(doc, &options)
    }

    /// Print proof: PNG with bleed, crop marks and safe-zone guides.
    ///
    /// # Errors
    ///
    /// As [`Compositor::render`].
    pub fn preview(
        &self,
        doc: &DesignDocument,
        scale: f32,
        watermark: Option<&str>,
    ) -> RenderResult<RenderOutput> {
        let options = RenderOptions {
            scale,
            include_bleed: true,
            crop_marks: true,
            safe_zone_guides: true,
            watermark: watermark.map(Watermark::new),
            ..RenderOptions::default()
        };
        self.render(doc, &options)
    }

    /// Build the SVG for `doc` without encoding it.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidDocument`],
    /// [`RenderError::InvalidOptions`] or [`RenderError::ResourceExceeded`].
    pub fn compose_svg(
        &self,
        doc: &DesignDocument,
        options: &RenderOptions,
    ) -> RenderResult<Composition> {
        doc.validate()?;
        options.validate()?;

        let settings = &doc.settings;
        let bleed = if options.include_bleed {
            settings.bleed
        } else {
            0.0
        };
        let canvas = (
            settings.width + 2.0 * bleed,
            settings.height + 2.0 * bleed,
        );
        let (width, height) = output_size(canvas, options);
        let pixels = u64::from(width) * u64::from(height);
        if pixels > options.max_pixels {
            return Err(RenderError::ResourceExceeded(format!(
                "{width}x{height} output exceeds {} pixels",
                options.max_pixels
            )));
        }

        #[allow(clippy::cast_precision_loss)]
        let raster_scale = width as f32 / canvas.0;
        let mut svg = String::with_capacity(4096);
        let _ = write!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {} {}\" preserveAspectRatio=\"none\">",
            canvas.0, canvas.1
        );

        let _ = write!(
            svg,
            "<rect width=\"{}\" height=\"{}\" {}/>",
            canvas.0,
            canvas.1,
            paint_attrs("fill", Self::background(doc, options))
        );

        if bleed > 0.0 {
            let _ = write!(svg, "<g transform=\"translate({bleed} {bleed})\">");
        }
        let mut diagnostics = Vec::new();
        for (index, element) in doc.stacking_order() {
            if let Some(diagnostic) = self.elements.render(&mut svg, element, index, raster_scale) {
                diagnostics.push(diagnostic);
            }
        }
        if bleed > 0.0 {
            svg.push_str("</g>");
        }

        if options.safe_zone_guides {
            safe_zone_overlay(&mut svg, doc, bleed);
        }
        if options.crop_marks {
            if bleed > 0.0 {
                crop_marks_overlay(&mut svg, settings.width, settings.height, bleed);
            } else {
                tracing::debug!("crop marks skipped, canvas has no bleed");
            }
        }
        if let Some(watermark) = &options.watermark {
            watermark_overlay(&mut svg, watermark, canvas);
        }
        svg.push_str("</svg>");

        Ok(Composition {
            svg,
            width,
            height,
            canvas,
            diagnostics,
        })
    }

    /// Option backgrounds are checked up front; an unvalidated document
    /// background that does not parse falls back to white.
    fn background(doc: &DesignDocument, options: &RenderOptions) -> Color {
        let raw = options
            .background
            .as_deref()
            .unwrap_or(&doc.settings.background_color);
        Color::parse(raw).unwrap_or_else(|e| {
            tracing::warn!(background = raw, error = %e, "unparseable background, using white");
            Color::WHITE
        })
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn output_size(canvas: (f32, f32), options: &RenderOptions) -> (u32, u32) {
    let px = |v: f32| (v.round() as u32).max(1);
    match (options.width, options.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, px(w as f32 * canvas.1 / canvas.0)),
        (None, Some(h)) => (px(h as f32 * canvas.0 / canvas.1), h),
        (None, None) => (px(canvas.0 * options.scale), px(canvas.1 * options.scale)),
    }
}

fn safe_zone_overlay(svg: &mut String, doc: &DesignDocument, bleed: f32) {
    let settings = &doc.settings;
    let inset = settings.safe_zone;
    if inset <= 0.0 {
        return;
    }
    let w = settings.width - 2.0 * inset;
    let h = settings.height - 2.0 * inset;
    if w <= 0.0 || h <= 0.0 {
        tracing::debug!(inset, "safe zone larger than canvas");
        return;
    }
    let _ = write!(
        svg,
        "<rect x=\"{}\" y=\"{}\" width=\"{w}\" height=\"{h}\" fill=\"none\" stroke=\"#ff00ff\" stroke-width=\"1\" stroke-dasharray=\"6 4\"/>",
        bleed + inset,
        bleed + inset
    );
}

/// Corner marks aligned with the trim edges, drawn outside the trim box.
fn crop_marks_overlay(svg: &mut String, trim_w: f32, trim_h: f32, bleed: f32) {
    let gap = (bleed * 0.25).min(3.0);
    let len = bleed - gap;
    let (left, top) = (bleed, bleed);
    let (right, bottom) = (bleed + trim_w, bleed + trim_h);
    let (far_x, far_y) = (right + bleed, bottom + bleed);

    let mut d = String::new();
    for y in [top, bottom] {
        let _ = write!(d, "M0 {y}h{len}M{far_x} {y}h-{len}");
    }
    for x in [left, right] {
        let _ = write!(d, "M{x} 0v{len}M{x} {far_y}v-{len}");
    }
    let _ = write!(
        svg,
        "<path d=\"{d}\" fill=\"none\" stroke=\"#000000\" stroke-width=\"0.5\"/>"
    );
}

fn watermark_overlay(svg: &mut String, watermark: &Watermark, canvas: (f32, f32)) {
    let (cx, cy) = (canvas.0 / 2.0, canvas.1 / 2.0);
    let font_size = watermark
        .font_size
        .unwrap_or_else(|| canvas.0.min(canvas.1) / 8.0);
    let _ = write!(
        svg,
        "<text x=\"{cx}\" y=\"{cy}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{DEFAULT_FAMILY}\" font-weight=\"bold\" font-size=\"{font_size}\" {} opacity=\"{}\" transform=\"rotate({} {cx} {cy})\">{}</text>",
        paint_attrs("fill", color_or_black(&watermark.color)),
        watermark.opacity.clamp(0.0, 1.0),
        watermark.rotation,
        escape_xml(&watermark.text)
    );
}
