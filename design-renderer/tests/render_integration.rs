//! Integration tests for rendering design documents.
//!
//! Covers canvas sizing with bleed, stacking order in real pixels, element
//! failures recovered as diagnostics, and every output encoder.

use std::sync::Arc;

use base64::Engine;
use design_core::{validate_document, DesignDocument, Element, ErrorKind, MemoryAssets, ShapeKind};
use design_renderer::{Compositor, FontCatalog, OutputFormat, RenderError, RenderOptions};
use serde_json::json;

fn compositor() -> Compositor {
    Compositor::new(Arc::new(FontCatalog::empty()))
}

fn png_data_uri(w: u32, h: u32, rgba: [u8; 4]) -> String {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode fixture");
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(buf.into_inner())
    )
}

fn pixel(png: &[u8], x: u32, y: u32) -> [u8; 4] {
    let decoded = image::load_from_memory(png).expect("decode output").to_rgba8();
    decoded.get_pixel(x, y).0
}

fn birthday_card() -> String {
    json!({
        "settings": {"width": 400, "height": 300, "backgroundColor": "#fff7ed"},
        "elements": [
            {"type": "text", "content": "Happy Birthday", "x": 20, "y": 20, "width": 360,
             "height": 60, "fontSize": 36, "fontFamily": "Georgia, serif", "textAlign": "center"},
            {"type": "text", "content": "Wishing you a wonderful year ahead, full of surprises.",
             "x": 20, "y": 100, "width": 200, "height": 120, "fontSize": 14,
             "textDecoration": "underline", "color": "rgb(30, 30, 30)"},
            {"type": "shape", "shape": "star", "x": 300, "y": 200, "width": 80, "height": 80,
             "fill": "#f59e0b", "stroke": "#92400e", "strokeWidth": 2}
        ]
    })
    .to_string()
}

// ============================================================================
// Sizing
// ============================================================================

#[test]
fn test_bleed_sizing() {
    let mut doc = DesignDocument::new(800.0, 600.0);
    doc.settings.bleed = 10.0;
    let options = RenderOptions {
        include_bleed: true,
        ..RenderOptions::default()
    };
    let output = compositor().render(&doc, &options).expect("render");
    assert_eq!((output.width, output.height), (820, 620));
    let decoded = image::load_from_memory(&output.bytes).expect("decode");
    assert_eq!((decoded.width(), decoded.height()), (820, 620));
}

#[test]
fn test_thumbnail_has_exact_size() {
    let doc = validate_document(&birthday_card()).expect("valid");
    let output = compositor()
        .thumbnail(&doc, 64, 64, Some("SAMPLE"))
        .expect("thumbnail");
    let decoded = image::load_from_memory(&output.bytes).expect("decode");
    assert_eq!((decoded.width(), decoded.height()), (64, 64));
}

#[test]
fn test_pixel_ceiling() {
    let doc = DesignDocument::new(1000.0, 1000.0);
    let options = RenderOptions {
        scale: 20.0,
        ..RenderOptions::default()
    };
    let err = compositor().render(&doc, &options).expect_err("too many pixels");
    assert!(matches!(err, RenderError::ResourceExceeded(_)));
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn test_text_scenario_has_no_diagnostics() {
    let output = compositor()
        .render_json(&birthday_card(), &RenderOptions::default())
        .expect("render");
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(&output.bytes[..4], &[0x89, b'P', b'N', b'G']);
}

#[test]
fn test_z_index_decides_what_is_on_top() {
    let doc = DesignDocument::new(20.0, 20.0)
        .with_element(
            Element::shape(ShapeKind::Rectangle, "#ff0000")
                .with_bounds(0.0, 0.0, 20.0, 20.0)
                .with_z_index(5),
        )
        .with_element(
            Element::shape(ShapeKind::Rectangle, "#0000ff")
                .with_bounds(0.0, 0.0, 20.0, 20.0)
                .with_z_index(1),
        );
    let output = compositor()
        .render(&doc, &RenderOptions::default())
        .expect("render");
    assert_eq!(pixel(&output.bytes, 10, 10), [255, 0, 0, 255]);

    // Without z-index, later elements cover earlier ones.
    let mut doc = doc;
    for element in &mut doc.elements {
        element.z_index = None;
    }
    let output = compositor()
        .render(&doc, &RenderOptions::default())
        .expect("render");
    assert_eq!(pixel(&output.bytes, 10, 10), [0, 0, 255, 255]);
}

#[test]
fn test_embedded_image_is_drawn() {
    let doc = DesignDocument::new(10.0, 10.0).with_element(
        Element::image(png_data_uri(2, 2, [0, 200, 0, 255])).with_bounds(0.0, 0.0, 10.0, 10.0),
    );
    let output = compositor()
        .render(&doc, &RenderOptions::default())
        .expect("render");
    assert!(output.diagnostics.is_empty());
    assert_eq!(pixel(&output.bytes, 5, 5), [0, 200, 0, 255]);
}

#[test]
fn test_unreadable_image_yields_one_diagnostic() {
    let doc = DesignDocument::new(200.0, 100.0)
        .with_element(Element::text("still drawn").with_bounds(0.0, 0.0, 200.0, 40.0))
        .with_element(
            Element::image("uploads/missing.png")
                .with_id("hero")
                .with_bounds(10.0, 10.0, 50.0, 50.0),
        )
        .with_element(Element::qr("https://example.com").with_bounds(120.0, 10.0, 60.0, 60.0));
    let output = Compositor::new(Arc::new(FontCatalog::empty()))
        .with_resolver(Arc::new(MemoryAssets::new()))
        .render(&doc, &RenderOptions::default())
        .expect("render continues");
    assert_eq!(output.diagnostics.len(), 1);
    let diagnostic = &output.diagnostics[0];
    assert_eq!(diagnostic.element_index, 1);
    assert_eq!(diagnostic.element_id.as_deref(), Some("hero"));
    assert_eq!(diagnostic.element_type, "image");
    assert_eq!(diagnostic.kind, ErrorKind::NotFound);
}

#[test]
fn test_control_characters_do_not_fail_the_page() {
    let raw = json!({
        "settings": {"width": 200, "height": 100},
        "elements": [
            {"type": "text", "content": "Hi\u{1}\u{b}", "x": 0, "y": 0, "width": 200, "height": 40},
            {"type": "shape", "shape": "rectangle", "x": 0, "y": 50, "width": 200, "height": 50,
             "fill": "#2563eb"}
        ]
    });
    let doc = validate_document(&raw.to_string()).expect("valid");
    let output = compositor()
        .render(&doc, &RenderOptions::default())
        .expect("render");
    assert!(output.diagnostics.is_empty());

    // Unsanitized documents reach the SVG writer too.
    let unsanitized = DesignDocument::new(200.0, 100.0)
        .with_element(Element::text("A\u{1}B\u{fffe}").with_bounds(0.0, 0.0, 200.0, 40.0))
        .with_element(
            Element::shape(ShapeKind::Rectangle, "#2563eb").with_bounds(0.0, 50.0, 200.0, 50.0),
        );
    let output = compositor()
        .render(&unsanitized, &RenderOptions::default())
        .expect("render");
    assert_eq!(pixel(&output.bytes, 100, 75), [0x25, 0x63, 0xeb, 255]);
}

#[test]
fn test_malformed_json_is_invalid_document() {
    let err = compositor()
        .render_json("{\"settings\": ", &RenderOptions::default())
        .expect_err("malformed");
    assert_eq!(err.kind(), ErrorKind::InvalidDocument);
}

// ============================================================================
// Encoders
// ============================================================================

#[test]
fn test_every_format_has_its_signature() {
    let doc = validate_document(&birthday_card()).expect("valid");
    let compositor = compositor();
    for (format, magic) in [
        (OutputFormat::Png, &b"\x89PNG"[..]),
        (OutputFormat::Jpeg, &b"\xFF\xD8"[..]),
        (OutputFormat::Webp, &b"RIFF"[..]),
        (OutputFormat::Svg, &b"<svg"[..]),
        (OutputFormat::Pdf, &b"%PDF"[..]),
    ] {
        let output = compositor
            .render(&doc, &RenderOptions::new(format))
            .unwrap_or_else(|e| panic!("{format}: {e}"));
        assert!(output.bytes.starts_with(magic), "{format} signature");
        assert_eq!(output.format, format);
    }
}

#[test]
fn test_unsupported_format_string() {
    let err = "tiff".parse::<OutputFormat>().expect_err("unsupported");
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
}

#[test]
fn test_multi_page_pdf() {
    let front = validate_document(&birthday_card()).expect("valid");
    let back = DesignDocument::new(400.0, 300.0);
    let output = compositor()
        .render_pdf_pages(&[front, back], &RenderOptions::default())
        .expect("pdf");
    assert!(output.bytes.starts_with(b"%PDF"));
    assert_eq!(output.format, OutputFormat::Pdf);
}
