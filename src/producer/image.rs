//! Image producer: bitmap pixel formats and BC1 block compression.
//!
//! Images are decoded to RGBA8. Bitmaps pack pixels row by row, MSB first,
//! with no padding between rows; only the final byte is zero-padded.
//!
//! BC1 output is the usual 8 bytes per 4×4 block: two RGB565 endpoints
//! (little-endian), then 32 bits of 2-bit palette indices, pixel 0 in the
//! lowest bits. Blocks containing transparent pixels use the three-colour
//! mode (`color0 <= color1`, index 3 transparent).

use std::fmt;
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::codec::BitWriter;
use crate::error::Result;
use crate::scan::Declaration;

use super::{failure, option_param, Produced, ProducerContext};

const FORMAT_PARAM: usize = 0;
const PATH_PARAM: usize = 1;

/// Alpha below this is transparent in BC1 blocks.
const BC1_ALPHA_THRESHOLD: u8 = 128;

/// Per-pixel encodings for `bitmap_<format>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8888,
    Rgb888,
    Rgb565,
    Rgba4444,
    /// RGB555 with a one-bit alpha flag between green and blue.
    Rgab5515,
    /// Four-bit grey.
    R4,
    A4,
    R1,
    A1,
}

impl PixelFormat {
    pub fn parse(name: &str) -> Option<Self> {
        let format = match name {
            "rgba8888" => PixelFormat::Rgba8888,
            "rgb888" => PixelFormat::Rgb888,
            "rgb565" => PixelFormat::Rgb565,
            "rgba4444" => PixelFormat::Rgba4444,
            "rgab5515" => PixelFormat::Rgab5515,
            "r4" => PixelFormat::R4,
            "a4" => PixelFormat::A4,
            "r1" => PixelFormat::R1,
            "a1" => PixelFormat::A1,
            _ => return None,
        };
        Some(format)
    }

    pub fn bits(&self) -> u32 {
        match self {
            PixelFormat::Rgba8888 => 32,
            PixelFormat::Rgb888 => 24,
            PixelFormat::Rgb565 | PixelFormat::Rgba4444 | PixelFormat::Rgab5515 => 16,
            PixelFormat::R4 | PixelFormat::A4 => 4,
            PixelFormat::R1 | PixelFormat::A1 => 1,
        }
    }

    pub fn encode(&self, [r, g, b, a]: [u8; 4]) -> u32 {
        let (r, g, b, a) = (r as u32, g as u32, b as u32, a as u32);
        match self {
            PixelFormat::Rgba8888 => (r << 24) | (g << 16) | (b << 8) | a,
            PixelFormat::Rgb888 => (r << 16) | (g << 8) | b,
            PixelFormat::Rgb565 => rgb565(r, g, b) as u32,
            PixelFormat::Rgba4444 => {
                ((r & 0xF0) << 8) | ((g & 0xF0) << 4) | (b & 0xF0) | ((a & 0xF0) >> 4)
            }
            PixelFormat::Rgab5515 => {
                let alpha = if a > 0 { 0x20 } else { 0 };
                ((r & 0xF8) << 8) | ((g & 0xF8) << 3) | alpha | (b >> 3)
            }
            PixelFormat::R4 => ((r + g + b + 2) / 3) >> 4,
            PixelFormat::A4 => a >> 4,
            PixelFormat::R1 => (r + g + b > 384) as u32,
            PixelFormat::A1 => (a > 0) as u32,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgba8888 => "rgba8888",
            PixelFormat::Rgb888 => "rgb888",
            PixelFormat::Rgb565 => "rgb565",
            PixelFormat::Rgba4444 => "rgba4444",
            PixelFormat::Rgab5515 => "rgab5515",
            PixelFormat::R4 => "r4",
            PixelFormat::A4 => "a4",
            PixelFormat::R1 => "r1",
            PixelFormat::A1 => "a1",
        };
        write!(f, "{}", name)
    }
}

fn rgb565(r: u32, g: u32, b: u32) -> u16 {
    (((r & 0xF8) << 8) | ((g & 0xFC) << 3) | (b >> 3)) as u16
}

fn expand565(color: u16) -> [i32; 3] {
    let r = ((color >> 11) & 0x1F) as i32;
    let g = ((color >> 5) & 0x3F) as i32;
    let b = (color & 0x1F) as i32;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

enum ImageFormat {
    Bitmap(PixelFormat),
    Bc1,
}

fn image_format(decl: &Declaration) -> Result<ImageFormat> {
    let text = option_param(decl, FORMAT_PARAM, "an image format")?;
    let mut parts = text.splitn(2, '_');
    match (parts.next(), parts.next()) {
        (Some("bitmap"), None) => Ok(ImageFormat::Bitmap(PixelFormat::Rgb565)),
        (Some("bitmap"), Some(pixel)) => PixelFormat::parse(pixel)
            .map(ImageFormat::Bitmap)
            .ok_or_else(|| failure(decl, format!("unknown pixel format '{}'", pixel))),
        (Some("bc1"), None) => Ok(ImageFormat::Bc1),
        _ => Err(failure(decl, format!("unknown image format '{}'", text))),
    }
}

/// Decode an image file to RGBA8.
pub(crate) fn load_rgba(decl: &Declaration, path: &Path) -> Result<RgbaImage> {
    let image = image::open(path).map_err(|e| {
        failure(
            decl,
            format!("cannot decode image {}: {}", path.display(), e),
        )
    })?;
    Ok(image.to_rgba8())
}

pub fn dependencies(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Vec<PathBuf>> {
    Ok(vec![ctx.resolve_param(decl, PATH_PARAM)?])
}

pub fn produce(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Produced> {
    let format = image_format(decl)?;
    let path = ctx.resolve_param(decl, PATH_PARAM)?;
    let image = load_rgba(decl, &path)?;

    let bytes = match format {
        ImageFormat::Bitmap(pixel) => bitmap(&image, pixel),
        ImageFormat::Bc1 => bc1(&image),
    };
    Ok(Produced {
        bytes,
        dependencies: vec![path],
    })
}

pub(crate) fn bitmap(image: &RgbaImage, format: PixelFormat) -> Vec<u8> {
    let total_bits = image.width() as usize * image.height() as usize * format.bits() as usize;
    let mut writer = BitWriter::with_capacity(total_bits.div_ceil(8));
    for pixel in image.pixels() {
        writer.write(format.encode(pixel.0) as u64, format.bits());
    }
    writer.finish()
}

pub(crate) fn bc1(image: &RgbaImage) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let mut out = Vec::with_capacity((width.div_ceil(4) * height.div_ceil(4) * 8) as usize);

    for by in (0..height).step_by(4) {
        for bx in (0..width).step_by(4) {
            let mut block = [None; 16];
            for (i, slot) in block.iter_mut().enumerate() {
                let (x, y) = (bx + (i as u32 % 4), by + (i as u32 / 4));
                if x < width && y < height {
                    *slot = Some(image.get_pixel(x, y).0);
                }
            }
            out.extend_from_slice(&bc1_block(&block));
        }
    }
    out
}

/// Encode one block; `None` marks pixels outside the image.
fn bc1_block(block: &[Option<[u8; 4]>; 16]) -> [u8; 8] {
    let opaque = |p: &Option<[u8; 4]>| p.filter(|p| p[3] >= BC1_ALPHA_THRESHOLD);
    let transparent = block.iter().any(|p| opaque(p).is_none());

    let mut low = [255u32; 3];
    let mut high = [0u32; 3];
    let mut any = false;
    for pixel in block.iter().filter_map(opaque) {
        any = true;
        for c in 0..3 {
            low[c] = low[c].min(pixel[c] as u32);
            high[c] = high[c].max(pixel[c] as u32);
        }
    }
    if !any {
        low = [0; 3];
    }
    let max = rgb565(high[0], high[1], high[2]);
    let min = rgb565(low[0], low[1], low[2]);

    let (color0, color1) = if transparent { (min, max) } else { (max, min) };
    let (e0, e1) = (expand565(color0), expand565(color1));
    let mix = |w0: i32, w1: i32| -> [i32; 3] {
        let mut c = [0; 3];
        for i in 0..3 {
            c[i] = (e0[i] * w0 + e1[i] * w1) / (w0 + w1);
        }
        c
    };
    let palette: Vec<[i32; 3]> = if transparent {
        vec![e0, e1, mix(1, 1)]
    } else {
        vec![e0, e1, mix(2, 1), mix(1, 2)]
    };

    let mut indices = 0u32;
    for (i, pixel) in block.iter().enumerate() {
        let index = match opaque(pixel) {
            None => 3,
            Some(p) => nearest(&palette, [p[0] as i32, p[1] as i32, p[2] as i32]),
        };
        indices |= index << (2 * i);
    }

    let mut out = [0u8; 8];
    out[0..2].copy_from_slice(&color0.to_le_bytes());
    out[2..4].copy_from_slice(&color1.to_le_bytes());
    out[4..8].copy_from_slice(&indices.to_le_bytes());
    out
}

fn nearest(palette: &[[i32; 3]], color: [i32; 3]) -> u32 {
    palette
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| (0..3).map(|c| (p[c] - color[c]).pow(2)).sum::<i32>())
        .map_or(0, |(i, _)| i as u32)
}
