//! Vector primitives.

use std::f32::consts::PI;
use std::fmt::Write;

use design_core::{ShapeKind, ShapeSpec};

use crate::svg::{color_or_black, paint_attrs};

/// Default point count for stars.
const STAR_POINTS: u32 = 5;
/// Default side count for polygons.
const POLYGON_SIDES: u32 = 6;
/// Inner radius of a star relative to its outer radius.
const STAR_INNER_RATIO: f32 = 0.5;

/// Draw `spec` into the element box `(0, 0, width, height)`.
pub(crate) fn render_shape(svg: &mut String, spec: &ShapeSpec, width: f32, height: f32) {
    let fill = color_or_black(&spec.fill);
    let mut paint = paint_attrs("fill", fill);
    if let Some(stroke) = &spec.stroke {
        let _ = write!(
            paint,
            " {} stroke-width=\"{}\"",
            paint_attrs("stroke", color_or_black(stroke)),
            spec.stroke_width.max(0.0)
        );
    }

    match spec.shape {
        ShapeKind::Rectangle => {
            let rx = spec.rx.max(0.0);
            let ry = if spec.ry > 0.0 { spec.ry } else { rx };
            let _ = write!(
                svg,
                "<rect width=\"{width}\" height=\"{height}\" rx=\"{rx}\" ry=\"{ry}\" {paint}/>"
            );
        }
        ShapeKind::Circle => {
            let r = width.min(height) / 2.0;
            let _ = write!(
                svg,
                "<circle cx=\"{}\" cy=\"{}\" r=\"{r}\" {paint}/>",
                width / 2.0,
                height / 2.0
            );
        }
        ShapeKind::Ellipse => {
            let _ = write!(
                svg,
                "<ellipse cx=\"{0}\" cy=\"{1}\" rx=\"{0}\" ry=\"{1}\" {paint}/>",
                width / 2.0,
                height / 2.0
            );
        }
        ShapeKind::Triangle => {
            let _ = write!(
                svg,
                "<polygon points=\"{},0 {width},{height} 0,{height}\" {paint}/>",
                width / 2.0
            );
        }
        ShapeKind::Line => {
            // A line is all stroke: fall back to the fill color and a hairline.
            let stroke = spec.stroke.as_deref().map_or(fill, color_or_black);
            let _ = write!(
                svg,
                "<line x1=\"0\" y1=\"0\" x2=\"{width}\" y2=\"{height}\" {} stroke-width=\"{}\"/>",
                paint_attrs("stroke", stroke),
                spec.stroke_width.max(1.0)
            );
        }
        ShapeKind::Star => {
            let points = spec.points.unwrap_or(STAR_POINTS).max(3);
            let d = star_path(width, height, points, STAR_INNER_RATIO);
            let _ = write!(svg, "<path d=\"{d}\" {paint}/>");
        }
        ShapeKind::Polygon => {
            let sides = spec.points.unwrap_or(POLYGON_SIDES).max(3);
            let d = polygon_path(width, height, sides);
            let _ = write!(svg, "<path d=\"{d}\" {paint}/>");
        }
    }
}

/// Alternating outer/inner vertices, first point straight up.
#[allow(clippy::cast_precision_loss)]
fn star_path(width: f32, height: f32, points: u32, inner_ratio: f32) -> String {
    let (cx, cy) = (width / 2.0, height / 2.0);
    let outer = width.min(height) / 2.0;
    let inner = outer * inner_ratio;

    let mut path = String::new();
    for i in 0..points * 2 {
        let angle = i as f32 * PI / points as f32 - PI / 2.0;
        let r = if i % 2 == 0 { outer } else { inner };
        let command = if i == 0 { "M" } else { " L" };
        let _ = write!(path, "{command} {},{}", cx + r * angle.cos(), cy + r * angle.sin());
    }
    path.push_str(" Z");
    path
}

/// Regular polygon inscribed in the box, scaled to fill both axes.
#[allow(clippy::cast_precision_loss)]
fn polygon_path(width: f32, height: f32, sides: u32) -> String {
    let (cx, cy) = (width / 2.0, height / 2.0);
    let mut path = String::new();
    for i in 0..sides {
        let angle = i as f32 * 2.0 * PI / sides as f32 - PI / 2.0;
        let command = if i == 0 { "M" } else { " L" };
        let _ = write!(path, "{command} {},{}", cx + cx * angle.cos(), cy + cy * angle.sin());
    }
    path.push_str(" Z");
    path
}
