//! Run-length encoding over fixed-width elements.
//!
//! Stream layout (after the container byte), MSB first, `W` = width × 8:
//!
//! ```text
//! (width-1):4  rawLength:32  sentinel:W
//! token*       value:W                         value != sentinel
//!              sentinel:W value:W (count-1):W  run of `count` copies
//! ```
//!
//! The sentinel is the smallest element value absent from the input, or the
//! least frequent one when every value occurs. Literal occurrences of the
//! sentinel are escaped as runs of one.

use std::collections::{HashMap, HashSet};

use crate::error::{BufferError, Result};

use super::bitstream::{BitReader, BitWriter};

/// Runs shorter than this are cheaper as literals.
const MIN_RUN: usize = 4;
const HEADER_BITS: usize = 4 + 32;

/// Element width for one RLE stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RleParams {
    /// Bytes per element: 1, 2, 4 or 8.
    pub width: usize,
}

impl RleParams {
    pub fn new(width: usize) -> Result<Self> {
        if matches!(width, 1 | 2 | 4 | 8) {
            Ok(Self { width })
        } else {
            Err(BufferError::codec(format!(
                "RLE element width must be 1, 2, 4 or 8 bytes, got {}",
                width
            )))
        }
    }

    fn bits(&self) -> u32 {
        self.width as u32 * 8
    }

    fn max_count(&self) -> u64 {
        if self.width >= 4 {
            u32::MAX as u64
        } else {
            1u64 << self.bits()
        }
    }
}

impl std::fmt::Display for RleParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rle width={} bits", self.bits())
    }
}

/// Split into big-endian elements, zero-padding the last one.
fn elements(data: &[u8], width: usize) -> Vec<u64> {
    data.chunks(width)
        .map(|chunk| {
            let mut value = 0u64;
            for i in 0..width {
                value = (value << 8) | chunk.get(i).copied().unwrap_or(0) as u64;
            }
            value
        })
        .collect()
}

fn choose_sentinel(values: &[u64], width: usize) -> u64 {
    if width == 1 {
        let mut counts = [0usize; 256];
        for &v in values {
            counts[v as usize] += 1;
        }
        return counts
            .iter()
            .enumerate()
            .min_by_key(|&(value, &count)| (count, value))
            .map_or(0, |(value, _)| value as u64);
    }

    // With fewer values than the domain size some value is always unused.
    let present: HashSet<u64> = values.iter().copied().collect();
    (0u64..)
        .find(|v| !present.contains(v))
        .unwrap_or_else(|| least_frequent(values))
}

fn least_frequent(values: &[u64]) -> u64 {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for &v in values {
        *counts.entry(v).or_default() += 1;
    }
    counts
        .into_iter()
        .min_by_key(|&(value, count)| (count, value))
        .map_or(0, |(value, _)| value)
}

/// Token stream over `values`, reported through `emit(is_run, value, count)`.
fn tokens(values: &[u64], params: &RleParams, sentinel: u64, mut emit: impl FnMut(bool, u64, u64)) {
    let mut i = 0;
    while i < values.len() {
        let value = values[i];
        let run = values[i..].iter().take_while(|&&v| v == value).count();

        if run >= MIN_RUN || value == sentinel {
            let mut left = run as u64;
            while left > 0 {
                let count = left.min(params.max_count());
                emit(true, value, count);
                left -= count;
            }
        } else {
            for _ in 0..run {
                emit(false, value, 1);
            }
        }
        i += run;
    }
}

pub fn encode_into(writer: &mut BitWriter, data: &[u8], params: &RleParams) {
    let values = elements(data, params.width);
    let sentinel = choose_sentinel(&values, params.width);
    let bits = params.bits();

    writer.write(params.width as u64 - 1, 4);
    writer.write(data.len() as u64, 32);
    writer.write(sentinel, bits);

    tokens(&values, params, sentinel, |is_run, value, count| {
        if is_run {
            writer.write(sentinel, bits);
            writer.write(value, bits);
            writer.write(count - 1, bits);
        } else {
            writer.write(value, bits);
        }
    });
}

/// Exact stream size in bits.
pub fn estimate_bits(data: &[u8], params: &RleParams) -> usize {
    let values = elements(data, params.width);
    let sentinel = choose_sentinel(&values, params.width);
    let bits = params.bits() as usize;
    let mut total = HEADER_BITS + bits;
    tokens(&values, params, sentinel, |is_run, _, _| {
        total += if is_run { 3 * bits } else { bits };
    });
    total
}

pub fn decode_from(reader: &mut BitReader<'_>) -> Result<(RleParams, Vec<u8>)> {
    let width = reader.read(4)? as usize + 1;
    let params = RleParams::new(width)?;
    let raw_len = reader.read(32)? as usize;
    let bits = params.bits();
    let sentinel = reader.read(bits)?;

    let total = raw_len.div_ceil(width);
    let mut values: Vec<u64> = Vec::with_capacity(total.min(reader.remaining()));
    while values.len() < total {
        let value = reader.read(bits)?;
        if value != sentinel {
            values.push(value);
            continue;
        }
        let value = reader.read(bits)?;
        let count = reader.read(bits)?.saturating_add(1);
        if count > (total - values.len()) as u64 {
            return Err(BufferError::codec(format!(
                "RLE run of {} overruns the declared length of {} bytes",
                count, raw_len
            )));
        }
        values.extend(std::iter::repeat(value).take(count as usize));
    }

    let mut out = Vec::with_capacity(values.len() * width);
    for value in values {
        out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
    }
    out.truncate(raw_len);
    Ok((params, out))
}
