//! Bitmap font producers.
//!
//! Glyphs are cut from an image. Each glyph is stored column by column;
//! inside a column `8 / bits` pixels share a byte, the topmost in the lowest
//! bits, and a column always ends on a byte boundary.
//!
//! Fixed fonts are a grid of equal cells read row by row. Variable fonts
//! are bands of `height` pixels in which every run of columns holding any
//! visible pixel is one glyph; their data is prefixed with a table of
//! big-endian u16 end offsets, one per glyph.

use std::fmt;
use std::path::PathBuf;

use image::{imageops, GenericImageView, Rgba, RgbaImage};

use crate::error::Result;
use crate::scan::Declaration;

use super::image::load_rgba;
use super::{failure, option_param, Produced, ProducerContext};

const SPACE: u32 = 0x20;

/// Which channel of the source image carries glyph coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontColor {
    /// Average of red, green and blue.
    Rgb,
    Alpha,
}

impl FontColor {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "rgb" => Some(FontColor::Rgb),
            "a" => Some(FontColor::Alpha),
            _ => None,
        }
    }

    pub fn value(&self, Rgba([r, g, b, a]): Rgba<u8>) -> u8 {
        match self {
            FontColor::Rgb => ((r as u32 + g as u32 + b as u32 + 2) / 3) as u8,
            FontColor::Alpha => a,
        }
    }
}

impl fmt::Display for FontColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontColor::Rgb => write!(f, "rgb"),
            FontColor::Alpha => write!(f, "a"),
        }
    }
}

/// Parameters shared by both font kinds.
struct FontParams {
    first: u32,
    count: u32,
    height: u32,
    bits: u32,
    color: FontColor,
}

fn font_params(
    decl: &Declaration,
    height_index: usize,
    bits_index: usize,
    color_index: usize,
) -> Result<FontParams> {
    let first = decl.uint_param(0, "the first character code")?;
    let count = decl.uint_param(1, "the glyph count")?;
    let height = decl.uint_param(height_index, "the glyph height")?;
    let bits = decl.uint_param(bits_index, "the bits per pixel")?;
    if !matches!(bits, 1 | 2 | 4 | 8) {
        return Err(failure(
            decl,
            format!("bits per pixel must be 1, 2, 4 or 8, got {}", bits),
        ));
    }
    if height == 0 {
        return Err(failure(decl, "glyph height must be at least 1"));
    }
    let color_text = option_param(decl, color_index, "a colour mode")?;
    let color = FontColor::parse(&color_text).ok_or_else(|| {
        failure(
            decl,
            format!("unknown colour mode '{}', expected rgb or a", color_text),
        )
    })?;
    Ok(FontParams {
        first,
        count,
        height,
        bits,
        color,
    })
}

/// Column-major glyph bytes for one glyph image.
pub fn character_columns<I>(glyph: &I, color: FontColor, bits: u32) -> Vec<u8>
where
    I: GenericImageView<Pixel = Rgba<u8>>,
{
    let (width, height) = glyph.dimensions();
    let per_byte = 8 / bits;
    let shift = 8 - bits;
    let mut out = Vec::with_capacity((width * height.div_ceil(per_byte)) as usize);

    for x in 0..width {
        let mut byte = 0u8;
        for y in 0..height {
            let value = color.value(glyph.get_pixel(x, y)) >> shift;
            byte |= value << ((y % per_byte) * bits);
            if y % per_byte == per_byte - 1 {
                out.push(byte);
                byte = 0;
            }
        }
        if height % per_byte != 0 {
            out.push(byte);
        }
    }
    out
}

fn blank_columns(width: u32, height: u32, bits: u32) -> Vec<u8> {
    vec![0; (width * height.div_ceil(8 / bits)) as usize]
}

pub fn fixed_dependencies(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Vec<PathBuf>> {
    Ok(vec![ctx.resolve_param(decl, 6)?])
}

pub fn produce_fixed(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Produced> {
    let params = font_params(decl, 3, 4, 5)?;
    let width = decl.uint_param(2, "the glyph width")?;
    if width == 0 {
        return Err(failure(decl, "glyph width must be at least 1"));
    }
    let path = ctx.resolve_param(decl, 6)?;
    let image = load_rgba(decl, &path)?;

    let columns = image.width() / width;
    let rows = image.height() / params.height;
    let mut bytes = Vec::new();
    let mut produced = 0;

    'grid: for row in 0..rows {
        for column in 0..columns {
            if produced == params.count {
                break 'grid;
            }
            let cell = imageops::crop_imm(
                &image,
                column * width,
                row * params.height,
                width,
                params.height,
            );
            bytes.extend(character_columns(&*cell, params.color, params.bits));
            produced += 1;
        }
    }

    if produced < params.count {
        log::warn!(
            "{}: {} holds {} of {} glyphs",
            decl.qualified_name(),
            path.display(),
            produced,
            params.count
        );
    }

    Ok(Produced {
        bytes,
        dependencies: vec![path],
    })
}

/// Horizontal extents of the glyphs in one band, left to right.
fn glyph_runs(image: &RgbaImage, top: u32, height: u32, color: FontColor) -> Vec<(u32, u32)> {
    let visible = |x: u32| (top..top + height).any(|y| color.value(*image.get_pixel(x, y)) > 0);

    let mut runs = Vec::new();
    let mut start = None;
    for x in 0..image.width() {
        match (visible(x), start) {
            (true, None) => start = Some(x),
            (false, Some(s)) => {
                runs.push((s, x));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, image.width()));
    }
    runs
}

pub fn variable_dependencies(
    decl: &Declaration,
    ctx: &ProducerContext<'_>,
) -> Result<Vec<PathBuf>> {
    Ok(vec![ctx.resolve_param(decl, 5)?])
}

pub fn produce_variable(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Produced> {
    let params = font_params(decl, 2, 3, 4)?;
    let path = ctx.resolve_param(decl, 5)?;
    let image = load_rgba(decl, &path)?;

    // The space glyph has no visible pixels, so it cannot be cut from the image.
    let space_at = (params.first <= SPACE && SPACE < params.first.saturating_add(params.count))
        .then(|| (SPACE - params.first) as usize);
    let from_image = params.count as usize - space_at.map_or(0, |_| 1);

    let mut glyphs: Vec<Vec<u8>> = Vec::with_capacity(params.count as usize);
    'bands: for band in 0..image.height() / params.height {
        let top = band * params.height;
        for (left, right) in glyph_runs(&image, top, params.height, params.color) {
            if glyphs.len() == from_image {
                break 'bands;
            }
            let glyph = imageops::crop_imm(&image, left, top, right - left, params.height);
            glyphs.push(character_columns(&*glyph, params.color, params.bits));
        }
    }

    if glyphs.len() < from_image {
        log::warn!(
            "{}: {} holds {} of {} glyphs",
            decl.qualified_name(),
            path.display(),
            glyphs.len(),
            from_image
        );
    }
    if let Some(index) = space_at {
        let width = (params.height / 3).max(1);
        let index = index.min(glyphs.len());
        glyphs.insert(index, blank_columns(width, params.height, params.bits));
    }

    let mut table = Vec::with_capacity(glyphs.len() * 2);
    let mut data = Vec::new();
    for glyph in &glyphs {
        data.extend_from_slice(glyph);
        let end = u16::try_from(data.len()).map_err(|_| {
            failure(
                decl,
                format!(
                    "glyph data reaches {} bytes, beyond the 16-bit offset table",
                    data.len()
                ),
            )
        })?;
        table.extend_from_slice(&end.to_be_bytes());
    }
    table.extend(data);

    Ok(Produced {
        bytes: table,
        dependencies: vec![path],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::MacroEnvironment;
    use crate::producer::test_support::declaration;
    use crate::resolve::SearchPaths;
    use tempfile::tempdir;

    const INK: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const PAPER: Rgba<u8> = Rgba([0, 0, 0, 0]);

    fn produce_with(image: &RgbaImage, src: &str, variable: bool) -> Result<Produced> {
        let dir = tempdir().unwrap();
        image.save(dir.path().join("font.png")).unwrap();
        let decl = declaration(dir.path(), src);
        let search = SearchPaths::new([dir.path().to_path_buf()]);
        let env = MacroEnvironment::new();
        let ctx = ProducerContext::new(&search, &env);
        if variable {
            produce_variable(&decl, &ctx)
        } else {
            produce_fixed(&decl, &ctx)
        }
    }

    #[test]
    fn test_columns_pack_lsb_first() {
        let mut glyph = RgbaImage::from_pixel(2, 3, PAPER);
        glyph.put_pixel(0, 0, INK);
        glyph.put_pixel(0, 2, INK);
        glyph.put_pixel(1, 1, INK);
        // 1 bit: 3 rows fit in one byte per column
        assert_eq!(character_columns(&glyph, FontColor::Alpha, 1), vec![0b101, 0b010]);
        // 4 bits: two rows per byte, the third gets a byte of its own
        assert_eq!(
            character_columns(&glyph, FontColor::Alpha, 4),
            vec![0x0F, 0x0F, 0xF0, 0x00]
        );
    }

    #[test]
    fn test_rgb_colour_mode_averages() {
        assert_eq!(FontColor::Rgb.value(Rgba([30, 60, 90, 0])), 60);
        assert_eq!(FontColor::Alpha.value(Rgba([30, 60, 90, 7])), 7);
    }

    #[test]
    fn test_fixed_font_reads_grid_row_major() {
        // 2x2 grid of 2x2 cells; each cell has one pixel lit at a different spot
        let mut image = RgbaImage::from_pixel(4, 4, PAPER);
        image.put_pixel(0, 0, INK);
        image.put_pixel(3, 0, INK);
        image.put_pixel(0, 3, INK);
        let produced = produce_with(
            &image,
            "BPFixedFontBuffer(uint8_t, Mono, 0x41, 3, 2, 2, 1, a, \"font.png\");",
            false,
        )
        .unwrap();
        assert_eq!(produced.bytes, vec![0b01, 0, 0, 0b01, 0b10, 0]);
    }

    #[test]
    fn test_variable_font_offsets() {
        let mut image = RgbaImage::from_pixel(7, 2, PAPER);
        for x in [0, 1, 4] {
            image.put_pixel(x, 0, INK);
        }
        image.put_pixel(6, 1, INK);
        let produced = produce_with(
            &image,
            "BPVariableFontBuffer(uint8_t, Prop, 0x41, 3, 2, 1, a, \"font.png\");",
            true,
        )
        .unwrap();
        // glyphs of 2, 1 and 1 columns; the last one touches the image edge
        assert_eq!(
            produced.bytes,
            vec![0, 2, 0, 3, 0, 4, 0b01, 0b01, 0b01, 0b10]
        );
    }

    #[test]
    fn test_variable_font_inserts_space() {
        let mut image = RgbaImage::from_pixel(3, 6, PAPER);
        image.put_pixel(0, 0, INK);
        image.put_pixel(2, 0, INK);
        let produced = produce_with(
            &image,
            "BPVariableFontBuffer(uint8_t, Prop, 0x1F, 3, 6, 8, a, \"font.png\");",
            true,
        )
        .unwrap();
        // 0x1F from the image, 0x20 blank and 2 columns wide, 0x21 from the image
        let glyph = 6usize;
        assert_eq!(&produced.bytes[..6], &[0, glyph as u8, 0, 3 * glyph as u8, 0, 4 * glyph as u8]);
        assert!(produced.bytes[6 + glyph..6 + 3 * glyph].iter().all(|&b| b == 0));
        assert_eq!(produced.bytes[6 + 3 * glyph], 0xFF);
    }

    #[test]
    fn test_rejects_bad_bit_depth_and_colour() {
        let image = RgbaImage::from_pixel(4, 4, PAPER);
        let err = produce_with(
            &image,
            "BPFixedFontBuffer(uint8_t, Mono, 0, 1, 2, 2, 3, a, \"font.png\");",
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("bits per pixel"));
        let err = produce_with(
            &image,
            "BPFixedFontBuffer(uint8_t, Mono, 0, 1, 2, 2, 1, cmyk, \"font.png\");",
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("colour mode"));
    }

    #[test]
    fn test_offset_table_overflow() {
        let image = RgbaImage::from_pixel(300, 255, INK);
        let err = produce_with(
            &image,
            "BPVariableFontBuffer(uint8_t, Huge, 0x41, 1, 255, 8, a, \"font.png\");",
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("16-bit offset table"));
    }
}
