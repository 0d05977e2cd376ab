//! MPFF font container, rasterised with fontdue.
//!
//! ```text
//! "MPFF" version:u8 pixelSize:u16 glyphCount:u16
//! per glyph, by code point:
//!   codePoint:u32 xmin:i16 ymin:i16 advance:u16 width:u16 height:u16
//!   coverage: width × height bytes, row major
//! ```
//!
//! Multi-byte fields are little-endian.

use std::path::PathBuf;

use fontdue::{Font, FontSettings};

use crate::error::Result;
use crate::scan::Declaration;

use super::{failure, Produced, ProducerContext};

pub const MPFF_MAGIC: &[u8; 4] = b"MPFF";
pub const MPFF_VERSION: u8 = 1;
/// Pixel size when the declaration does not give one.
pub const MPFF_DEFAULT_SIZE: u32 = 16;

/// One rasterised glyph.
#[derive(Debug, Clone, PartialEq)]
struct GlyphBitmap {
    codepoint: u32,
    xmin: i32,
    ymin: i32,
    advance: f32,
    width: usize,
    height: usize,
    coverage: Vec<u8>,
}

pub fn dependencies(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Vec<PathBuf>> {
    Ok(vec![ctx.resolve_param(decl, 0)?])
}

pub fn produce(decl: &Declaration, ctx: &ProducerContext<'_>) -> Result<Produced> {
    let size = if decl.params.len() > 1 {
        decl.uint_param(1, "the pixel size")?
    } else {
        MPFF_DEFAULT_SIZE
    };
    if size == 0 || size > u16::MAX as u32 {
        return Err(failure(decl, format!("pixel size {} is out of range", size)));
    }

    let (path, bytes) = ctx.read_param(decl, 0)?;
    let font = Font::from_bytes(
        bytes,
        FontSettings {
            scale: size as f32,
            ..FontSettings::default()
        },
    )
    .map_err(|e| failure(decl, format!("cannot parse font {}: {}", path.display(), e)))?;

    let mut codepoints: Vec<char> = font.chars().keys().copied().collect();
    codepoints.sort_unstable();

    let glyphs: Vec<GlyphBitmap> = codepoints
        .into_iter()
        .map(|ch| {
            let (metrics, coverage) = font.rasterize(ch, size as f32);
            GlyphBitmap {
                codepoint: ch as u32,
                xmin: metrics.xmin,
                ymin: metrics.ymin,
                advance: metrics.advance_width,
                width: metrics.width,
                height: metrics.height,
                coverage,
            }
        })
        .collect();

    log::debug!(
        "{}: rasterised {} glyphs at {}px",
        decl.qualified_name(),
        glyphs.len(),
        size
    );

    let bytes = write_container(size as u16, &glyphs).map_err(|message| failure(decl, message))?;
    Ok(Produced {
        bytes,
        dependencies: vec![path],
    })
}

fn write_container(size: u16, glyphs: &[GlyphBitmap]) -> std::result::Result<Vec<u8>, String> {
    let count = u16::try_from(glyphs.len())
        .map_err(|_| format!("{} glyphs do not fit the 16-bit glyph count", glyphs.len()))?;

    let mut out = Vec::new();
    out.extend_from_slice(MPFF_MAGIC);
    out.push(MPFF_VERSION);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());

    for glyph in glyphs {
        let range = |what: &str, value: i64| {
            format!(
                "glyph U+{:04X}: {} {} is out of range",
                glyph.codepoint, what, value
            )
        };
        let signed = |what: &str, value: i32| {
            i16::try_from(value).map_err(|_| range(what, value as i64))
        };
        let unsigned = |what: &str, value: i64| {
            u16::try_from(value).map_err(|_| range(what, value))
        };
        let xmin = signed("xmin", glyph.xmin)?;
        let ymin = signed("ymin", glyph.ymin)?;
        let advance = unsigned("advance", glyph.advance.round() as i64)?;
        let width = unsigned("width", glyph.width as i64)?;
        let height = unsigned("height", glyph.height as i64)?;

        out.extend_from_slice(&glyph.codepoint.to_le_bytes());
        out.extend_from_slice(&xmin.to_le_bytes());
        out.extend_from_slice(&ymin.to_le_bytes());
        out.extend_from_slice(&advance.to_le_bytes());
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&glyph.coverage);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::MacroEnvironment;
    use crate::producer::test_support::declaration;
    use crate::resolve::SearchPaths;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_container_layout() {
        let glyphs = vec![GlyphBitmap {
            codepoint: 0x41,
            xmin: -1,
            ymin: 2,
            advance: 6.6,
            width: 2,
            height: 1,
            coverage: vec![0x10, 0xFF],
        }];
        let bytes = write_container(16, &glyphs).unwrap();
        assert_eq!(
            bytes,
            vec![
                b'M', b'P', b'F', b'F', 1, 16, 0, 1, 0, // header
                0x41, 0, 0, 0, 0xFF, 0xFF, 2, 0, 7, 0, 2, 0, 1, 0, // metrics
                0x10, 0xFF,
            ]
        );
    }

    #[test]
    fn test_container_rejects_oversized_metrics() {
        let glyphs = vec![GlyphBitmap {
            codepoint: 0x42,
            xmin: 40_000,
            ymin: 0,
            advance: 1.0,
            width: 0,
            height: 0,
            coverage: Vec::new(),
        }];
        let err = write_container(16, &glyphs).unwrap_err();
        assert!(err.contains("U+0042"), "{}", err);
    }

    #[test]
    fn test_empty_font_container() {
        assert_eq!(
            write_container(12, &[]).unwrap(),
            vec![b'M', b'P', b'F', b'F', 1, 12, 0, 0, 0]
        );
    }

    #[test]
    fn test_invalid_font_is_a_producer_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("broken.ttf"), b"definitely not a font").unwrap();
        let decl = declaration(dir.path(), "BPMpffBuffer(uint8_t, Ui, \"broken.ttf\", 12);");
        let search = SearchPaths::new([dir.path().to_path_buf()]);
        let env = MacroEnvironment::new();
        let err = produce(&decl, &ProducerContext::new(&search, &env)).unwrap_err();
        assert!(matches!(err, crate::error::BufferError::Producer { .. }));
    }

    #[test]
    fn test_zero_size_rejected() {
        let dir = tempdir().unwrap();
        let decl = declaration(dir.path(), "BPMpffBuffer(uint8_t, Ui, \"ui.ttf\", 0);");
        let search = SearchPaths::new([dir.path().to_path_buf()]);
        let env = MacroEnvironment::new();
        let err = produce(&decl, &ProducerContext::new(&search, &env)).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
