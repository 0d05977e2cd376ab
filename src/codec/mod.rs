//! Compression codecs and the versioned container format.
//!
//! Every encoded buffer starts with one byte, `version << 4 | scheme`:
//!
//! | scheme | stream |
//! |---|---|
//! | 0 stored | `rawLength:32`, raw bytes |
//! | 1 LZSS | see [`lzss`] |
//! | 2 RLE | see [`rle`] |
//!
//! Fields are packed MSB first and the stream is zero-padded to a byte.
//! Every encode is decoded again and compared with its input before it is
//! accepted.

mod bitstream;
pub mod lzss;
pub mod rle;
mod search;

pub use bitstream::{bits_for, BitReader, BitWriter};
pub use lzss::LzssParams;
pub use rle::RleParams;
pub use search::{search, SearchLimits, SearchResult};

use std::fmt;

use crate::error::{BufferError, Result};

/// Container format version written in the high nibble of the first byte.
pub const FORMAT_VERSION: u8 = 1;

const STORED_ID: u8 = 0;
const LZSS_ID: u8 = 1;
const RLE_ID: u8 = 2;

/// Bytes to compress, with the element width they will be emitted as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawPayload {
    pub bytes: Vec<u8>,
    /// Size of one element in bytes.
    pub stride: usize,
}

impl RawPayload {
    pub fn new(bytes: Vec<u8>, stride: usize) -> Self {
        Self {
            bytes,
            stride: stride.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A concrete scheme with all of its parameters fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeParams {
    Stored,
    Lzss(LzssParams),
    Rle(RleParams),
}

impl SchemeParams {
    fn id(&self) -> u8 {
        match self {
            SchemeParams::Stored => STORED_ID,
            SchemeParams::Lzss(_) => LZSS_ID,
            SchemeParams::Rle(_) => RLE_ID,
        }
    }

    /// Preference on equal sizes: cheapest decoder first.
    fn rank(&self) -> u8 {
        match self {
            SchemeParams::Stored => 0,
            SchemeParams::Rle(_) => 1,
            SchemeParams::Lzss(_) => 2,
        }
    }
}

impl fmt::Display for SchemeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeParams::Stored => write!(f, "stored"),
            SchemeParams::Lzss(params) => write!(f, "{}", params),
            SchemeParams::Rle(params) => write!(f, "{}", params),
        }
    }
}

/// A verified container together with the parameters that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPayload {
    pub params: SchemeParams,
    /// Complete container bytes, including the leading scheme byte.
    pub bytes: Vec<u8>,
    pub raw_len: usize,
    pub stride: usize,
}

impl CompressedPayload {
    pub fn ratio(&self) -> f64 {
        if self.raw_len == 0 {
            return 1.0;
        }
        self.bytes.len() as f64 / self.raw_len as f64
    }
}

/// A compression request as written in a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionSpec {
    /// Emit the raw bytes.
    None,
    /// Fixed LZSS field widths.
    Lzss {
        window_bits: u32,
        length_bits: u32,
    },
    /// Search LZSS parameters within the limits, falling back to RLE or stored.
    Auto(SearchLimits),
    /// RLE; `None` uses the element width.
    Rle { width: Option<usize> },
}

impl CompressionSpec {
    /// Parse `none`, `lzss`, `lzss_auto`, `lzss_auto_W_L`, `lzss_W_L`, `rle` or `rle_BITS`.
    pub fn parse(text: &str) -> Result<Self> {
        let normalized = text.trim().trim_matches('"').trim().to_ascii_lowercase();
        let invalid = || BufferError::InvalidDeclaration {
            origin: Default::default(),
            message: format!("unknown compression scheme '{}'", text.trim()),
            help: Some(
                "Use none, lzss, lzss_auto, lzss_auto_<W>_<L>, lzss_<W>_<L>, rle or rle_<8|16|32|64>"
                    .to_string(),
            ),
        };
        let number = |s: &str| s.parse::<u32>().map_err(|_| invalid());

        let parts: Vec<&str> = normalized.split('_').collect();
        let spec = match parts.as_slice() {
            ["none"] => CompressionSpec::None,
            ["lzss"] | ["lzss", "auto"] => CompressionSpec::Auto(SearchLimits::default()),
            ["lzss", "auto", w, l] => {
                let limits = SearchLimits {
                    max_window_bits: number(*w)?,
                    max_length_bits: number(*l)?,
                };
                LzssParams::new(limits.max_window_bits, limits.max_length_bits)?;
                CompressionSpec::Auto(limits)
            }
            ["lzss", w, l] => {
                let params = LzssParams::new(number(*w)?, number(*l)?)?;
                CompressionSpec::Lzss {
                    window_bits: params.window_bits,
                    length_bits: params.length_bits,
                }
            }
            ["rle"] => CompressionSpec::Rle { width: None },
            ["rle", bits] => {
                let bits = number(*bits)?;
                if !matches!(bits, 8 | 16 | 32 | 64) {
                    return Err(invalid());
                }
                CompressionSpec::Rle {
                    width: Some(bits as usize / 8),
                }
            }
            _ => return Err(invalid()),
        };
        Ok(spec)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, CompressionSpec::None)
    }
}

/// Encoder, decoder and parameter search.
#[derive(Debug, Clone)]
pub struct CodecEngine {
    threads: usize,
}

impl Default for CodecEngine {
    fn default() -> Self {
        Self::new(crate::pool::default_threads())
    }
}

impl CodecEngine {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    /// Encode `raw` as requested, verifying the result.
    ///
    /// `name` identifies the buffer in diagnostics.
    pub fn encode(
        &self,
        name: &str,
        raw: &RawPayload,
        spec: &CompressionSpec,
    ) -> Result<CompressedPayload> {
        match *spec {
            CompressionSpec::None => Err(BufferError::codec(format!(
                "'{}' is not compressed; emit its raw bytes instead",
                name
            ))),
            CompressionSpec::Lzss {
                window_bits,
                length_bits,
            } => {
                let params = LzssParams::new(window_bits, length_bits)?;
                self.encode_with(name, raw, SchemeParams::Lzss(params))
            }
            CompressionSpec::Rle { width } => {
                let params = RleParams::new(width.unwrap_or(raw.stride))?;
                self.encode_with(name, raw, SchemeParams::Rle(params))
            }
            CompressionSpec::Auto(limits) => {
                let params = self.choose(raw, limits)?;
                self.encode_with(name, raw, params)
            }
        }
    }

    /// Encode with fixed parameters and verify the round trip.
    pub fn encode_with(
        &self,
        name: &str,
        raw: &RawPayload,
        params: SchemeParams,
    ) -> Result<CompressedPayload> {
        let bytes = write_container(&raw.bytes, &params)?;
        verify(name, &raw.bytes, &params, &bytes)?;
        Ok(CompressedPayload {
            params,
            bytes,
            raw_len: raw.len(),
            stride: raw.stride,
        })
    }

    pub fn decode(&self, payload: &CompressedPayload) -> Result<Vec<u8>> {
        let (params, bytes) = decode_container(&payload.bytes)?;
        if params != payload.params {
            return Err(BufferError::codec(format!(
                "container holds {} but the payload records {}",
                params, payload.params
            )));
        }
        Ok(bytes)
    }

    /// Exact container size in bytes for `params`, without building the container.
    pub fn estimate_size(&self, raw: &RawPayload, params: &SchemeParams) -> usize {
        let stream_bits = match params {
            SchemeParams::Stored => 32 + raw.len() * 8,
            SchemeParams::Lzss(p) => lzss::estimate_bits(&raw.bytes, p),
            SchemeParams::Rle(p) => rle::estimate_bits(&raw.bytes, p),
        };
        1 + stream_bits.div_ceil(8)
    }

    /// Smallest of the searched LZSS, RLE at element width and stored.
    fn choose(&self, raw: &RawPayload, limits: SearchLimits) -> Result<SchemeParams> {
        let found = search(&raw.bytes, limits, self.threads);

        let mut candidates = vec![SchemeParams::Lzss(found.params), SchemeParams::Stored];
        if let Ok(params) = RleParams::new(raw.stride) {
            candidates.push(SchemeParams::Rle(params));
        }

        let chosen = candidates
            .into_iter()
            .map(|params| (self.estimate_size(raw, &params), params))
            .inspect(|(size, params)| log::debug!("{}: {} bytes", params, size))
            .min_by_key(|(size, params)| (*size, params.rank()))
            .map(|(_, params)| params)
            .unwrap_or(SchemeParams::Stored);

        log::info!("chose {} for {} bytes", chosen, raw.len());
        Ok(chosen)
    }
}

fn write_container(data: &[u8], params: &SchemeParams) -> Result<Vec<u8>> {
    if data.len() > u32::MAX as usize {
        return Err(BufferError::codec(format!(
            "payload of {} bytes exceeds the 32-bit length field",
            data.len()
        )));
    }

    let mut writer = BitWriter::with_capacity(data.len() / 2 + 16);
    writer.write(((FORMAT_VERSION << 4) | params.id()) as u64, 8);
    match params {
        SchemeParams::Stored => {
            writer.write(data.len() as u64, 32);
            writer.write_bytes(data);
        }
        SchemeParams::Lzss(p) => lzss::encode_into(&mut writer, data, p),
        SchemeParams::Rle(p) => rle::encode_into(&mut writer, data, p),
    }
    Ok(writer.finish())
}

/// Decode a complete container.
pub fn decode_container(data: &[u8]) -> Result<(SchemeParams, Vec<u8>)> {
    let mut reader = BitReader::new(data);
    let tag = reader
        .read(8)
        .map_err(|_| BufferError::codec("empty container"))? as u8;
    let (version, id) = (tag >> 4, tag & 0x0F);
    if version != FORMAT_VERSION {
        return Err(BufferError::Codec {
            message: format!("unsupported container version {}", version),
            help: Some(format!("This build reads version {}", FORMAT_VERSION)),
        });
    }

    match id {
        STORED_ID => {
            let len = reader.read(32)? as usize;
            Ok((SchemeParams::Stored, reader.read_bytes(len)?))
        }
        LZSS_ID => {
            let (params, bytes) = lzss::decode_from(&mut reader)?;
            Ok((SchemeParams::Lzss(params), bytes))
        }
        RLE_ID => {
            let (params, bytes) = rle::decode_from(&mut reader)?;
            Ok((SchemeParams::Rle(params), bytes))
        }
        other => Err(BufferError::codec(format!("unknown scheme id {}", other))),
    }
}

/// Check that `container` decodes back to `raw`.
///
/// A mismatch is fatal; the parameters are logged so the encoder can be debugged.
pub(crate) fn verify(
    name: &str,
    raw: &[u8],
    params: &SchemeParams,
    container: &[u8],
) -> Result<()> {
    let message = match decode_container(container) {
        Ok((decoded_params, decoded)) if decoded == raw && decoded_params == *params => {
            return Ok(())
        }
        Ok((decoded_params, decoded)) => {
            let first_difference = decoded
                .iter()
                .zip(raw)
                .position(|(a, b)| a != b)
                .unwrap_or(decoded.len().min(raw.len()));
            format!(
                "decoded {} bytes with {} (expected {} bytes), first difference at byte {}",
                decoded.len(),
                decoded_params,
                raw.len(),
                first_difference
            )
        }
        Err(err) => format!("container does not decode: {}", err),
    };

    log::error!(
        "verification failed for '{}': scheme={} raw_len={} container_len={} {}",
        name,
        params,
        raw.len(),
        container.len(),
        message
    );
    Err(BufferError::CodecVerification {
        name: name.to_string(),
        message,
        parameters: Some(format!("parameters: {}", params)),
    })
}
