//! QR code rasterization.

use std::fmt::Write;

use design_core::{QrErrorCorrection, QrSpec};
use qrcode::{EcLevel, QrCode};

use crate::error::ElementError;
use crate::svg::{color_or_black, paint_attrs};

fn ec_level(level: QrErrorCorrection) -> EcLevel {
    match level {
        QrErrorCorrection::L => EcLevel::L,
        QrErrorCorrection::M => EcLevel::M,
        QrErrorCorrection::Q => EcLevel::Q,
        QrErrorCorrection::H => EcLevel::H,
    }
}

/// Encode `content` into a square module matrix (`true` = dark), row major.
///
/// # Errors
///
/// Returns [`ElementError::Qr`] when the payload does not fit any QR version
/// at the requested level.
pub fn encode_matrix(
    content: &str,
    level: QrErrorCorrection,
) -> Result<(usize, Vec<bool>), ElementError> {
    let code = QrCode::with_error_correction_level(content.as_bytes(), ec_level(level))
        .map_err(|e| ElementError::Qr(e.to_string()))?;
    let width = code.width();
    let modules = code
        .to_colors()
        .into_iter()
        .map(|c| c == qrcode::Color::Dark)
        .collect();
    Ok((width, modules))
}

/// Draw the code as background plus one rect per dark module, filling a
/// `size` × `size` square at the origin.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn render_qr(svg: &mut String, spec: &QrSpec, size: f32) -> Result<(), ElementError> {
    let (width, modules) = encode_matrix(&spec.content, spec.error_correction)?;
    let margin = spec.margin as usize;
    let total = width + margin * 2;
    let module = size / total as f32;

    let _ = write!(
        svg,
        "<rect width=\"{size}\" height=\"{size}\" {}/>",
        paint_attrs("fill", color_or_black(&spec.bg_color))
    );

    // One path for all dark modules keeps the SVG small.
    let mut d = String::new();
    for (i, dark) in modules.iter().enumerate() {
        if !dark {
            continue;
        }
        let x = (i % width + margin) as f32 * module;
        let y = (i / width + margin) as f32 * module;
        let _ = write!(d, "M{x} {y}h{module}v{module}h-{module}z");
    }
    let _ = write!(
        svg,
        "<path d=\"{d}\" {} shape-rendering=\"crispEdges\"/>",
        paint_attrs("fill", color_or_black(&spec.fg_color))
    );
    Ok(())
}
