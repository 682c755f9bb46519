//! Per-element drawing.
//!
//! Each element becomes one SVG group in trim-box coordinates. The group
//! carries the element's translation, rotation about its center and opacity,
//! so every kind composites the same way.

use std::fmt::Write;
use std::sync::Arc;

use design_core::{AssetResolver, Element, ElementKind, Shadow};

use crate::error::{Diagnostic, ElementError};
use crate::image::render_image;
use crate::qr::render_qr;
use crate::shape::render_shape;
use crate::svg::{escape_xml, shadow_filter};
use crate::text::{render_text, FontCatalog};

/// Draws single elements as SVG fragments.
#[derive(Clone)]
pub struct ElementRenderer {
    fonts: Arc<FontCatalog>,
    resolver: Option<Arc<dyn AssetResolver>>,
}

impl std::fmt::Debug for ElementRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRenderer")
            .field("fonts", &self.fonts.family_count())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl ElementRenderer {
    /// A renderer with the given fonts and no asset resolver; only data URIs
    /// can be drawn.
    #[must_use]
    pub fn new(fonts: Arc<FontCatalog>) -> Self {
        Self {
            fonts,
            resolver: None,
        }
    }

    /// Resolve image locators through `resolver`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn AssetResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The font catalog used for text.
    #[must_use]
    pub fn fonts(&self) -> &FontCatalog {
        &self.fonts
    }

    /// Draw the element's content into its own box at the origin, without the
    /// positioning group.
    ///
    /// # Errors
    ///
    /// Returns the [`ElementError`] that prevented drawing.
    pub fn render_content(
        &self,
        element: &Element,
        index: usize,
        scale: f32,
    ) -> Result<String, ElementError> {
        let (width, height) = element.extent();
        let mut out = String::new();
        match &element.kind {
            ElementKind::Text(spec) => render_text(&mut out, spec, width, height, &self.fonts),
            ElementKind::Image(spec) => render_image(
                &mut out,
                spec,
                width,
                height,
                self.resolver.as_deref(),
                scale,
                &format!("clip-{index}"),
            )?,
            ElementKind::Shape(spec) => render_shape(&mut out, spec, width, height),
            ElementKind::Qr(spec) => {
                let size = width.min(height);
                if size <= 0.0 {
                    return Err(ElementError::Unrenderable("QR code has no size".to_string()));
                }
                render_qr(&mut out, spec, size)?;
            }
        }
        Ok(out)
    }

    /// Append the element to `svg`. Hidden elements are skipped.
    ///
    /// A failure is drawn as an error placeholder in the element's box and
    /// reported as a [`Diagnostic`].
    pub fn render(
        &self,
        svg: &mut String,
        element: &Element,
        index: usize,
        scale: f32,
    ) -> Option<Diagnostic> {
        if !element.visible {
            return None;
        }
        let (width, height) = element.extent();
        let (content, diagnostic) = match self.render_content(element, index, scale) {
            Ok(content) => (content, None),
            Err(err) => {
                tracing::warn!(
                    element = %element.label(index),
                    error = %err,
                    "element rendered as placeholder"
                );
                let diagnostic = Diagnostic {
                    element_index: index,
                    element_id: element.id.clone(),
                    element_type: element.type_name().to_string(),
                    kind: err.kind(),
                    message: err.to_string(),
                };
                (error_placeholder(width, height), Some(diagnostic))
            }
        };

        let _ = write!(
            svg,
            "<g id=\"element-{index}\" transform=\"translate({} {})",
            element.x, element.y
        );
        if element.rotation != 0.0 {
            let _ = write!(
                svg,
                " rotate({} {} {})",
                element.rotation,
                width / 2.0,
                height / 2.0
            );
        }
        svg.push('"');
        if element.opacity < 1.0 {
            let _ = write!(svg, " opacity=\"{}\"", element.opacity.clamp(0.0, 1.0));
        }
        svg.push('>');

        match shadow_of(element).filter(|_| diagnostic.is_none()) {
            Some(shadow) => {
                let filter_id = format!("shadow-{index}");
                shadow_filter(svg, &filter_id, shadow);
                let _ = write!(svg, "<g filter=\"url(#{filter_id})\">{content}</g>");
            }
            None => svg.push_str(&content),
        }
        svg.push_str("</g>");
        diagnostic
    }
}

fn shadow_of(element: &Element) -> Option<&Shadow> {
    match &element.kind {
        ElementKind::Text(spec) => spec.shadow.as_ref(),
        ElementKind::Image(spec) => spec.shadow.as_ref(),
        ElementKind::Shape(spec) => spec.shadow.as_ref(),
        ElementKind::Qr(_) => None,
    }
}

/// Hatched box with a red outline marking an element that failed to draw.
fn error_placeholder(width: f32, height: f32) -> String {
    let (w, h) = (width.max(1.0), height.max(1.0));
    format!(
        "<rect width=\"{w}\" height=\"{h}\" fill=\"#f3f4f6\" stroke=\"#ef4444\" stroke-width=\"2\" stroke-dasharray=\"6 4\"/>\
         <path d=\"M0 0L{w} {h}M{w} 0L0 {h}\" stroke=\"#ef4444\" stroke-width=\"1\"/>\
         <desc>{}</desc>",
        escape_xml("render error")
    )
}
