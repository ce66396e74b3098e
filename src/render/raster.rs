use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use qrcode::types::QrError;
use qrcode::{Color, QrCode};

use super::{
    CornerShape, LogoConfig, ModuleGrid, ModuleShape, PlacedLogo, RenderAdapter, RenderError,
    RenderedCode, StyleConfig,
};
use crate::payload::Payload;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Renders with the `qrcode` symbol encoder and paints the matrix itself, so
/// module and finder shapes can be styled.
#[derive(Debug, Clone, Copy, Default)]
pub struct QrMatrixRenderer;

impl RenderAdapter for QrMatrixRenderer {
    fn render(&self, payload: &Payload, style: &StyleConfig) -> Result<RenderedCode, RenderError> {
        if payload.is_empty() {
            return Err(RenderError::NothingToEncode);
        }

        let code = QrCode::with_error_correction_level(payload.as_bytes(), style.ec_level.to_qrcode())
            .map_err(|err| match err {
                QrError::DataTooLong => RenderError::DataTooLong {
                    len: payload.as_bytes().len(),
                },
                other => RenderError::Symbol(other.to_string()),
            })?;

        let width = code.width();
        let dark = code.to_colors().into_iter().map(|c| c == Color::Dark).collect();
        let mut grid = ModuleGrid::new(width, dark);
        let layout = Layout::new(style, width);

        let logo = match &style.logo {
            Some(config) => Some(place_logo(config, &layout, &mut grid)?),
            None => None,
        };

        let canvas = paint(&grid, &layout, style, logo.as_ref());
        log_debug!(
            "rendered {} bytes as {}x{} modules on a {}px canvas",
            payload.as_bytes().len(),
            width,
            width,
            layout.size
        );

        Ok(RenderedCode {
            payload: payload.clone(),
            style: style.clone(),
            grid,
            canvas,
            logo,
        })
    }
}

/// Pixel geometry of the symbol on the canvas.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    pub size: u32,
    pub margin: u32,
    pub module_px: f32,
    pub width: usize,
}

impl Layout {
    pub fn new(style: &StyleConfig, width: usize) -> Self {
        let size = style.clamped_size();
        let margin = style.clamped_margin();
        Self {
            size,
            margin,
            module_px: (size - 2 * margin) as f32 / width as f32,
            width,
        }
    }

    pub fn symbol_px(&self) -> u32 {
        self.size - 2 * self.margin
    }

    /// Module coordinates of a canvas pixel centre: whole module plus offset in `[0, 1)`.
    fn locate(&self, px: u32, py: u32) -> Option<(usize, usize, f32, f32)> {
        let x = (px as f32 + 0.5 - self.margin as f32) / self.module_px;
        let y = (py as f32 + 0.5 - self.margin as f32) / self.module_px;
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let (mx, my) = (x.floor() as usize, y.floor() as usize);
        if mx >= self.width || my >= self.width {
            return None;
        }
        Some((mx, my, x - mx as f32, y - my as f32))
    }
}

fn place_logo(
    config: &LogoConfig,
    layout: &Layout,
    grid: &mut ModuleGrid,
) -> Result<PlacedLogo, RenderError> {
    let source = image::open(&config.path)
        .map_err(|source| RenderError::Logo {
            path: config.path.clone(),
            source,
        })?
        .to_rgba8();

    let ratio = config.size_ratio.clamp(0.05, 0.5);
    let max_side = (layout.symbol_px() as f32 * ratio).max(1.0);
    let scale = max_side / source.width().max(source.height()) as f32;
    let w = ((source.width() as f32 * scale).round() as u32).max(1);
    let h = ((source.height() as f32 * scale).round() as u32).max(1);
    let image = imageops::resize(&source, w, h, FilterType::Lanczos3);

    let x = (layout.size - w) / 2;
    let y = (layout.size - h) / 2;

    if config.hide_background_modules {
        let pad = config.margin as f32;
        let (left, top) = (x as f32 - pad, y as f32 - pad);
        let (right, bottom) = ((x + w) as f32 + pad, (y + h) as f32 + pad);
        let mut hidden = 0;
        for my in 0..grid.width() {
            for mx in 0..grid.width() {
                if grid.finder_origin(mx, my).is_some() {
                    continue;
                }
                let cx = layout.margin as f32 + (mx as f32 + 0.5) * layout.module_px;
                let cy = layout.margin as f32 + (my as f32 + 0.5) * layout.module_px;
                if cx >= left && cx <= right && cy >= top && cy <= bottom {
                    grid.hide(mx, my);
                    hidden += 1;
                }
            }
        }
        let share = hidden as f32 / (grid.width() * grid.width()) as f32;
        log_debug!("logo hides {hidden} modules ({:.1}% of the symbol)", share * 100.0);
    }

    Ok(PlacedLogo { image, x, y })
}

fn paint(grid: &ModuleGrid, layout: &Layout, style: &StyleConfig, logo: Option<&PlacedLogo>) -> RgbaImage {
    let background = Rgba(style.background_rgba());
    let foreground = Rgba(style.foreground.rgba());
    if style.logo.is_some() && style.ec_level.recovery_fraction() < 0.15 {
        log_warn!("logo over a low error-correction symbol may not scan");
    }

    let mut canvas = RgbaImage::from_pixel(layout.size, layout.size, background);
    for py in 0..layout.size {
        for px in 0..layout.size {
            let Some((mx, my, fx, fy)) = layout.locate(px, py) else {
                continue;
            };
            let inked = match grid.finder_origin(mx, my) {
                Some((ox, oy)) => {
                    let u = (mx - ox) as f32 + fx;
                    let v = (my - oy) as f32 + fy;
                    finder_covers(style.corner_shape, u, v)
                }
                None => {
                    grid.is_drawn(mx, my)
                        && module_covers(fx, fy, corner_radii(style.module_shape, grid, mx, my))
                }
            };
            if inked {
                canvas.put_pixel(px, py, foreground);
            }
        }
    }

    if let Some(logo) = logo {
        imageops::overlay(&mut canvas, &logo.image, logo.x as i64, logo.y as i64);
    }
    canvas
}

/// Corner radii `[top-left, top-right, bottom-right, bottom-left]` in module units.
/// A corner is rounded only when both modules touching it along the edges are empty.
pub(crate) fn corner_radii(shape: ModuleShape, grid: &ModuleGrid, x: usize, y: usize) -> [f32; 4] {
    let up = grid.drawn_neighbour(x, y, 0, -1);
    let down = grid.drawn_neighbour(x, y, 0, 1);
    let left = grid.drawn_neighbour(x, y, -1, 0);
    let right = grid.drawn_neighbour(x, y, 1, 0);
    let exposed = [!up && !left, !up && !right, !down && !right, !down && !left];

    let per_corner = |radius: [f32; 4]| {
        let mut radii = [0.0; 4];
        for i in 0..4 {
            if exposed[i] {
                radii[i] = radius[i];
            }
        }
        radii
    };

    match shape {
        ModuleShape::Square => [0.0; 4],
        ModuleShape::Dots => [0.5; 4],
        ModuleShape::Rounded => per_corner([0.3; 4]),
        ModuleShape::ExtraRounded => per_corner([0.5; 4]),
        ModuleShape::Classy => per_corner([0.5, 0.0, 0.5, 0.0]),
        ModuleShape::ClassyRounded => per_corner([0.5, 0.25, 0.5, 0.25]),
    }
}

/// Whether `(fx, fy)` inside a unit module falls within a square with the given corner radii.
fn module_covers(fx: f32, fy: f32, radii: [f32; 4]) -> bool {
    let [tl, tr, br, bl] = radii;
    let inside_arc = |cx: f32, cy: f32, r: f32| (fx - cx).powi(2) + (fy - cy).powi(2) <= r * r;

    if fx < tl && fy < tl {
        return inside_arc(tl, tl, tl);
    }
    if fx > 1.0 - tr && fy < tr {
        return inside_arc(1.0 - tr, tr, tr);
    }
    if fx > 1.0 - br && fy > 1.0 - br {
        return inside_arc(1.0 - br, 1.0 - br, br);
    }
    if fx < bl && fy > 1.0 - bl {
        return inside_arc(bl, 1.0 - bl, bl);
    }
    true
}

/// Point inside the box `[lo, hi]^2` with all corners rounded by `r`.
fn in_rounded_box(u: f32, v: f32, lo: f32, hi: f32, r: f32) -> bool {
    if u < lo || u > hi || v < lo || v > hi {
        return false;
    }
    let cx = u.clamp(lo + r, hi - r);
    let cy = v.clamp(lo + r, hi - r);
    (u - cx).powi(2) + (v - cy).powi(2) <= r * r
}

/// Coverage of a 7x7 finder pattern at `(u, v)` module units from its top-left corner.
fn finder_covers(shape: CornerShape, u: f32, v: f32) -> bool {
    match shape {
        CornerShape::Square => {
            (in_rounded_box(u, v, 0.0, 7.0, 0.0) && !in_rounded_box(u, v, 1.0, 6.0, 0.0))
                || in_rounded_box(u, v, 2.0, 5.0, 0.0)
        }
        CornerShape::ExtraRounded => {
            (in_rounded_box(u, v, 0.0, 7.0, 2.5) && !in_rounded_box(u, v, 1.0, 6.0, 1.5))
                || in_rounded_box(u, v, 2.0, 5.0, 1.0)
        }
        CornerShape::Dot => {
            let d = ((u - 3.5).powi(2) + (v - 3.5).powi(2)).sqrt();
            (2.5..=3.5).contains(&d) || d <= 1.5
        }
    }
}
