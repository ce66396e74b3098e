use std::fmt::Write as _;
use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};

use super::raster::{corner_radii, Layout};
use super::{CornerShape, RenderError, RenderedCode};

/// Vector form of a rendered code. Geometry matches the raster canvas.
pub(crate) fn to_svg(code: &RenderedCode) -> Result<String, RenderError> {
    let style = &code.style;
    let grid = &code.grid;
    let layout = Layout::new(style, grid.width());
    let m = layout.module_px;
    let origin = layout.margin as f32;
    let fg = style.foreground.to_string();

    let mut out = String::new();
    let size = layout.size;
    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"#
    );
    if !style.transparent_background {
        let _ = writeln!(
            out,
            r#"<rect width="{size}" height="{size}" fill="{}"/>"#,
            style.background
        );
    }

    let mut path = String::new();
    for y in 0..grid.width() {
        for x in 0..grid.width() {
            if grid.finder_origin(x, y).is_some() || !grid.is_drawn(x, y) {
                continue;
            }
            let radii = corner_radii(style.module_shape, grid, x, y).map(|r| r * m);
            push_module(&mut path, origin + x as f32 * m, origin + y as f32 * m, m, radii);
        }
    }
    if !path.is_empty() {
        let _ = writeln!(out, r#"<path fill="{fg}" d="{path}"/>"#);
    }

    for (ox, oy) in grid.finder_origins() {
        let x = origin + ox as f32 * m;
        let y = origin + oy as f32 * m;
        push_finder(&mut out, style.corner_shape, x, y, m, &fg);
    }

    if let Some(logo) = &code.logo {
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(logo.image.clone())
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        let _ = writeln!(
            out,
            r#"<image x="{}" y="{}" width="{}" height="{}" href="data:image/png;base64,{}"/>"#,
            logo.x,
            logo.y,
            logo.image.width(),
            logo.image.height(),
            STANDARD.encode(&png)
        );
    }

    out.push_str("</svg>\n");
    Ok(out)
}

/// Appends one module as a closed path with per-corner radii `[tl, tr, br, bl]`.
fn push_module(path: &mut String, x: f32, y: f32, s: f32, radii: [f32; 4]) {
    let [tl, tr, br, bl] = radii;
    let _ = write!(
        path,
        "M{:.2},{:.2}H{:.2}A{tr:.2},{tr:.2} 0 0 1 {:.2},{:.2}V{:.2}A{br:.2},{br:.2} 0 0 1 {:.2},{:.2}H{:.2}A{bl:.2},{bl:.2} 0 0 1 {:.2},{:.2}V{:.2}A{tl:.2},{tl:.2} 0 0 1 {:.2},{:.2}Z",
        x + tl,
        y,
        x + s - tr,
        x + s,
        y + tr,
        y + s - br,
        x + s - br,
        y + s,
        x + bl,
        x,
        y + s - bl,
        y + tl,
        x + tl,
        y,
    );
}

fn push_finder(out: &mut String, shape: CornerShape, x: f32, y: f32, m: f32, fg: &str) {
    // The ring is drawn as a one-module stroke along its centre line.
    let ring = (x + 0.5 * m, y + 0.5 * m, 6.0 * m);
    let eye = (x + 2.0 * m, y + 2.0 * m, 3.0 * m);
    let (ring_radius, eye_radius) = match shape {
        CornerShape::Square => (0.0, 0.0),
        CornerShape::ExtraRounded => (2.0 * m, m),
        CornerShape::Dot => {
            let (cx, cy) = (x + 3.5 * m, y + 3.5 * m);
            let _ = writeln!(
                out,
                r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{:.2}" fill="none" stroke="{fg}" stroke-width="{m:.2}"/>"#,
                3.0 * m
            );
            let _ = writeln!(
                out,
                r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{:.2}" fill="{fg}"/>"#,
                1.5 * m
            );
            return;
        }
    };

    let _ = writeln!(
        out,
        r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" rx="{ring_radius:.2}" fill="none" stroke="{fg}" stroke-width="{m:.2}"/>"#,
        ring.0, ring.1, ring.2, ring.2
    );
    let _ = writeln!(
        out,
        r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" rx="{eye_radius:.2}" fill="{fg}"/>"#,
        eye.0, eye.1, eye.2, eye.2
    );
}
