//! Turning a payload into a scannable image.

pub mod raster;
mod svg;

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payload::Payload;

pub use raster::QrMatrixRenderer;

pub const MIN_SIZE: u32 = 128;
pub const MAX_SIZE: u32 = 1024;

/// Stem used for exported files, e.g. `qrcode.png`.
pub const FILE_STEM: &str = "qrcode";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("nothing to encode")]
    NothingToEncode,

    #[error("payload of {len} bytes does not fit in a QR code at this error-correction level")]
    DataTooLong { len: usize },

    #[error("could not build QR symbol: {0}")]
    Symbol(String),

    #[error("failed to load logo {}: {source}", .path.display())]
    Logo {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode image: {0}")]
    Export(#[from] image::ImageError),

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Produces an image of the QR symbol for a payload.
pub trait RenderAdapter: Send + Sync {
    fn render(&self, payload: &Payload, style: &StyleConfig) -> Result<RenderedCode, RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleShape {
    #[default]
    Square,
    Rounded,
    Dots,
    Classy,
    ClassyRounded,
    ExtraRounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CornerShape {
    #[default]
    Square,
    ExtraRounded,
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum EcLevel {
    L,
    #[default]
    M,
    Q,
    H,
}

impl EcLevel {
    /// Approximate share of the symbol that can be damaged and still read.
    pub fn recovery_fraction(self) -> f32 {
        match self {
            EcLevel::L => 0.07,
            EcLevel::M => 0.15,
            EcLevel::Q => 0.25,
            EcLevel::H => 0.30,
        }
    }

    pub(crate) fn to_qrcode(self) -> qrcode::EcLevel {
        match self {
            EcLevel::L => qrcode::EcLevel::L,
            EcLevel::M => qrcode::EcLevel::M,
            EcLevel::Q => qrcode::EcLevel::Q,
            EcLevel::H => qrcode::EcLevel::H,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid color '{0}', expected #rgb, #rrggbb or #rrggbbaa")]
pub struct ColorParseError(String);

/// An sRGB color written as a CSS hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor([u8; 4]);

impl HexColor {
    pub const BLACK: HexColor = HexColor([0, 0, 0, 255]);
    pub const WHITE: HexColor = HexColor([255, 255, 255, 255]);

    pub fn rgba(self) -> [u8; 4] {
        self.0
    }
}

impl FromStr for HexColor {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ColorParseError(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let mut rgba = [255; 4];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16).ok_or_else(invalid)? as u8;
                    rgba[i] = v * 17;
                }
                Ok(HexColor(rgba))
            }
            6 => Ok(HexColor([channel(0)?, channel(2)?, channel(4)?, 255])),
            8 => Ok(HexColor([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for HexColor {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.to_string()
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        if a == 255 {
            write!(f, "#{r:02x}{g:02x}{b:02x}")
        } else {
            write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogoConfig {
    pub path: PathBuf,
    /// Largest logo side as a fraction of the symbol side.
    pub size_ratio: f32,
    /// Clear space around the logo, in pixels.
    pub margin: u32,
    pub hide_background_modules: bool,
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            size_ratio: 0.3,
            margin: 10,
            hide_background_modules: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleConfig {
    /// Output side length in pixels.
    pub size: u32,
    /// Quiet zone in pixels on every side.
    pub margin: u32,
    pub ec_level: EcLevel,
    pub module_shape: ModuleShape,
    pub corner_shape: CornerShape,
    pub foreground: HexColor,
    pub background: HexColor,
    pub transparent_background: bool,
    pub logo: Option<LogoConfig>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            size: 180,
            margin: 20,
            ec_level: EcLevel::M,
            module_shape: ModuleShape::Square,
            corner_shape: CornerShape::Square,
            foreground: HexColor::BLACK,
            background: HexColor::WHITE,
            transparent_background: false,
            logo: None,
        }
    }
}

impl StyleConfig {
    pub fn clamped_size(&self) -> u32 {
        self.size.clamp(MIN_SIZE, MAX_SIZE)
    }

    /// Margin limited so at least half the canvas is left for the symbol.
    pub fn clamped_margin(&self) -> u32 {
        self.margin.min(self.clamped_size() / 4)
    }

    pub(crate) fn background_rgba(&self) -> [u8; 4] {
        let [r, g, b, a] = self.background.rgba();
        if self.transparent_background {
            [r, g, b, 0]
        } else {
            [r, g, b, a]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Jpeg,
    Webp,
    Svg,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
            ExportFormat::Svg => "svg",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "webp" => Some(ExportFormat::Webp),
            "svg" => Some(ExportFormat::Svg),
            _ => None,
        }
    }

    /// `qrcode.<ext>`.
    pub fn default_file_name(self) -> String {
        format!("{FILE_STEM}.{}", self.extension())
    }
}

/// The module matrix of one symbol plus which dark modules are drawn.
#[derive(Debug, Clone)]
pub struct ModuleGrid {
    width: usize,
    dark: Vec<bool>,
    hidden: Vec<bool>,
}

impl ModuleGrid {
    pub(crate) fn new(width: usize, dark: Vec<bool>) -> Self {
        let hidden = vec![false; dark.len()];
        Self {
            width,
            dark,
            hidden,
        }
    }

    /// Modules per side.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.dark[y * self.width + x]
    }

    /// Dark and not covered by the logo.
    pub fn is_drawn(&self, x: usize, y: usize) -> bool {
        let i = y * self.width + x;
        self.dark[i] && !self.hidden[i]
    }

    pub(crate) fn hide(&mut self, x: usize, y: usize) {
        self.hidden[y * self.width + x] = true;
    }

    /// Top-left module of the finder pattern containing `(x, y)`, if any.
    pub fn finder_origin(&self, x: usize, y: usize) -> Option<(usize, usize)> {
        let far = self.width - 7;
        match (x < 7, x >= far, y < 7, y >= far) {
            (true, _, true, _) => Some((0, 0)),
            (_, true, true, _) => Some((far, 0)),
            (true, _, _, true) => Some((0, far)),
            _ => None,
        }
    }

    pub(crate) fn finder_origins(&self) -> [(usize, usize); 3] {
        let far = self.width - 7;
        [(0, 0), (far, 0), (0, far)]
    }

    /// A drawn data module at `(x + dx, y + dy)`; off-grid and finder modules count as empty.
    pub(crate) fn drawn_neighbour(&self, x: usize, y: usize, dx: isize, dy: isize) -> bool {
        let (Some(nx), Some(ny)) = (x.checked_add_signed(dx), y.checked_add_signed(dy)) else {
            return false;
        };
        nx < self.width
            && ny < self.width
            && self.finder_origin(nx, ny).is_none()
            && self.is_drawn(nx, ny)
    }
}

/// Where the logo sits on the canvas, already scaled.
#[derive(Debug, Clone)]
pub(crate) struct PlacedLogo {
    pub image: RgbaImage,
    pub x: u32,
    pub y: u32,
}

/// A rendered symbol, ready to be exported in any [`ExportFormat`].
#[derive(Debug, Clone)]
pub struct RenderedCode {
    payload: Payload,
    style: StyleConfig,
    grid: ModuleGrid,
    canvas: RgbaImage,
    logo: Option<PlacedLogo>,
}

impl RenderedCode {
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn style(&self) -> &StyleConfig {
        &self.style
    }

    pub fn grid(&self) -> &ModuleGrid {
        &self.grid
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>, RenderError> {
        let mut bytes = Vec::new();
        match format {
            ExportFormat::Svg => return Ok(svg::to_svg(self)?.into_bytes()),
            ExportFormat::Png => DynamicImage::ImageRgba8(self.canvas.clone())
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?,
            ExportFormat::Webp => DynamicImage::ImageRgba8(self.canvas.clone())
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::WebP)?,
            ExportFormat::Jpeg => DynamicImage::ImageRgb8(flatten_on_white(&self.canvas))
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?,
        }
        Ok(bytes)
    }

    /// Writes to `path`, picking the format from its extension (PNG when unknown).
    pub fn save(&self, path: &Path) -> Result<ExportFormat, RenderError> {
        let format = ExportFormat::from_path(path).unwrap_or(ExportFormat::Png);
        let bytes = self.export(format)?;
        std::fs::write(path, bytes).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(format)
    }

    /// Writes `qrcode.<ext>` into `dir`.
    pub fn save_in(&self, dir: &Path, format: ExportFormat) -> Result<PathBuf, RenderError> {
        let path = dir.join(format.default_file_name());
        let bytes = self.export(format)?;
        std::fs::write(&path, bytes).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// JPEG has no alpha channel.
fn flatten_on_white(canvas: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(canvas.width(), canvas.height(), |x, y| {
        let [r, g, b, a] = canvas.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
