//! LZSS with hash-chain match finding.
//!
//! Stream layout (after the container byte), MSB first:
//!
//! ```text
//! windowBits:5  lengthBits:5  (minMatch-1):3  rawLength:32
//! token*        0 literal:8
//!               1 (distance-1):windowBits (length-minMatch):lengthBits
//! ```

use crate::error::{BufferError, Result};

use super::bitstream::{BitReader, BitWriter};

pub const MIN_WINDOW_BITS: u32 = 1;
pub const MAX_WINDOW_BITS: u32 = 24;
pub const MIN_LENGTH_BITS: u32 = 1;
pub const MAX_LENGTH_BITS: u32 = 16;

const HEADER_BITS: usize = 5 + 5 + 3 + 32;
const LITERAL_BITS: usize = 9;

const HASH_BITS: u32 = 16;
const MAX_CHAIN: usize = 48;
/// Once a match this long is found, only a few more candidates are tried.
const GOOD_LENGTH: usize = 32;
const GOOD_CHAIN: usize = 4;
const NIL: u32 = u32::MAX;

/// Window and match-length field widths for one LZSS stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LzssParams {
    pub window_bits: u32,
    pub length_bits: u32,
    pub min_match: u32,
}

impl LzssParams {
    /// Parameters with the break-even minimum match for these field widths.
    pub fn new(window_bits: u32, length_bits: u32) -> Result<Self> {
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits) {
            return Err(BufferError::codec(format!(
                "LZSS window bits must be {}..={}, got {}",
                MIN_WINDOW_BITS, MAX_WINDOW_BITS, window_bits
            )));
        }
        if !(MIN_LENGTH_BITS..=MAX_LENGTH_BITS).contains(&length_bits) {
            return Err(BufferError::codec(format!(
                "LZSS length bits must be {}..={}, got {}",
                MIN_LENGTH_BITS, MAX_LENGTH_BITS, length_bits
            )));
        }
        let reference_bits = 1 + window_bits + length_bits;
        // Shortest match whose reference is cheaper than the literals it replaces.
        let min_match = (reference_bits / LITERAL_BITS as u32 + 1).clamp(1, 8);
        Ok(Self {
            window_bits,
            length_bits,
            min_match,
        })
    }

    pub fn window(&self) -> usize {
        1 << self.window_bits
    }

    pub fn max_match(&self) -> usize {
        self.min_match as usize + (1 << self.length_bits) - 1
    }

    fn reference_bits(&self) -> usize {
        1 + self.window_bits as usize + self.length_bits as usize
    }
}

impl std::fmt::Display for LzssParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lzss window={} ({} bits) length={}..={} ({} bits)",
            self.window(),
            self.window_bits,
            self.min_match,
            self.max_match(),
            self.length_bits
        )
    }
}

/// Receives the token stream produced by the parser.
trait TokenSink {
    fn literal(&mut self, byte: u8);
    fn reference(&mut self, distance: usize, length: usize);
}

struct StreamSink<'a> {
    writer: &'a mut BitWriter,
    params: LzssParams,
}

impl TokenSink for StreamSink<'_> {
    fn literal(&mut self, byte: u8) {
        self.writer.write(byte as u64, 9);
    }

    fn reference(&mut self, distance: usize, length: usize) {
        self.writer.write_bit(true);
        self.writer
            .write((distance - 1) as u64, self.params.window_bits);
        self.writer.write(
            (length - self.params.min_match as usize) as u64,
            self.params.length_bits,
        );
    }
}

#[derive(Default)]
struct CountingSink {
    bits: usize,
    reference_bits: usize,
    literals: usize,
    references: usize,
}

impl TokenSink for CountingSink {
    fn literal(&mut self, _byte: u8) {
        self.bits += LITERAL_BITS;
        self.literals += 1;
    }

    fn reference(&mut self, _distance: usize, _length: usize) {
        self.bits += self.reference_bits;
        self.references += 1;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Match {
    length: usize,
    distance: usize,
}

/// Hash chains over the positions seen so far.
struct MatchFinder {
    head: Vec<u32>,
    prev: Vec<u32>,
    mask: usize,
    key_len: usize,
}

impl MatchFinder {
    fn new(input_len: usize, params: &LzssParams) -> Self {
        let ring = params.window().min(input_len.next_power_of_two()).max(1);
        Self {
            head: vec![NIL; 1 << HASH_BITS],
            prev: vec![NIL; ring],
            mask: ring - 1,
            key_len: (params.min_match as usize).min(3),
        }
    }

    fn hash(&self, data: &[u8], pos: usize) -> Option<usize> {
        let key = data.get(pos..pos + self.key_len)?;
        let value = key.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
        Some((value.wrapping_mul(2_654_435_761) >> (32 - HASH_BITS)) as usize)
    }

    fn insert(&mut self, data: &[u8], pos: usize) {
        if let Some(h) = self.hash(data, pos) {
            self.prev[pos & self.mask] = self.head[h];
            self.head[h] = pos as u32;
        }
    }

    /// Longest match for `pos` among earlier positions within the window.
    fn longest(&self, data: &[u8], pos: usize, params: &LzssParams) -> Match {
        let mut best = Match::default();
        let Some(h) = self.hash(data, pos) else {
            return best;
        };

        let max_len = params.max_match().min(data.len() - pos);
        let window = params.window();
        let target = &data[pos..pos + max_len];
        let mut candidate = self.head[h];
        let mut chain = MAX_CHAIN;

        while candidate != NIL && chain > 0 {
            let cand = candidate as usize;
            let distance = pos - cand;
            if distance > window {
                break;
            }

            if data[cand + best.length.min(max_len - 1)] == target[best.length.min(max_len - 1)] {
                let length = data[cand..]
                    .iter()
                    .zip(target)
                    .take_while(|(a, b)| a == b)
                    .count();
                if length > best.length {
                    best = Match { length, distance };
                    if length == max_len {
                        break;
                    }
                    if length >= GOOD_LENGTH {
                        chain = chain.min(GOOD_CHAIN);
                    }
                }
            }

            let next = self.prev[cand & self.mask];
            if next == NIL || next as usize >= cand {
                break;
            }
            candidate = next;
            chain -= 1;
        }

        best
    }
}

/// Greedy parse with one step of lazy evaluation.
fn parse(data: &[u8], params: &LzssParams, sink: &mut impl TokenSink) {
    if data.is_empty() {
        return;
    }

    let min_match = params.min_match as usize;
    let max_match = params.max_match();
    let mut finder = MatchFinder::new(data.len(), params);
    let mut pos = 0;
    let mut current = finder.longest(data, pos, params);

    while pos < data.len() {
        finder.insert(data, pos);

        if current.length >= min_match {
            if current.length < max_match && pos + 1 < data.len() {
                let next = finder.longest(data, pos + 1, params);
                if next.length > current.length {
                    sink.literal(data[pos]);
                    pos += 1;
                    current = next;
                    continue;
                }
            }

            sink.reference(current.distance, current.length);
            for p in pos + 1..pos + current.length {
                finder.insert(data, p);
            }
            pos += current.length;
        } else {
            sink.literal(data[pos]);
            pos += 1;
        }

        if pos < data.len() {
            current = finder.longest(data, pos, params);
        }
    }
}

/// Append the LZSS stream for `data` to `writer`.
pub fn encode_into(writer: &mut BitWriter, data: &[u8], params: &LzssParams) {
    writer.write(params.window_bits as u64, 5);
    writer.write(params.length_bits as u64, 5);
    writer.write((params.min_match - 1) as u64, 3);
    writer.write(data.len() as u64, 32);

    let mut sink = StreamSink {
        writer,
        params: *params,
    };
    parse(data, params, &mut sink);
}

/// Exact stream size in bits without building the stream.
pub fn estimate_bits(data: &[u8], params: &LzssParams) -> usize {
    let mut sink = CountingSink {
        reference_bits: params.reference_bits(),
        ..Default::default()
    };
    parse(data, params, &mut sink);
    log::trace!(
        "{}: {} literals, {} references",
        params,
        sink.literals,
        sink.references
    );
    HEADER_BITS + sink.bits
}

/// Decode an LZSS stream positioned just after the container byte.
pub fn decode_from(reader: &mut BitReader<'_>) -> Result<(LzssParams, Vec<u8>)> {
    let window_bits = reader.read(5)? as u32;
    let length_bits = reader.read(5)? as u32;
    let min_match = reader.read(3)? as u32 + 1;
    let raw_len = reader.read(32)? as usize;

    let mut params = LzssParams::new(window_bits, length_bits)?;
    params.min_match = min_match;

    // The declared length is untrusted; reserve no more than the stream could plausibly hold.
    let mut out = Vec::with_capacity(raw_len.min(reader.remaining().saturating_mul(8)));
    while out.len() < raw_len {
        if !reader.read_bit()? {
            out.push(reader.read(8)? as u8);
            continue;
        }

        let distance = reader.read(window_bits)? as usize + 1;
        let length = reader.read(length_bits)? as usize + min_match as usize;
        if distance > out.len() {
            return Err(BufferError::codec(format!(
                "LZSS reference reaches {} bytes back with only {} decoded",
                distance,
                out.len()
            )));
        }
        if out.len() + length > raw_len {
            return Err(BufferError::codec(format!(
                "LZSS reference overruns the declared length of {} bytes",
                raw_len
            )));
        }
        let start = out.len() - distance;
        for i in 0..length {
            let byte = out[start + i];
            out.push(byte);
        }
    }

    Ok((params, out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8], params: LzssParams) -> Vec<u8> {
        let mut writer = BitWriter::new();
        encode_into(&mut writer, data, &params);
        let bits = writer.bit_len();
        assert_eq!(bits, estimate_bits(data, &params), "estimate must be exact");
        let bytes = writer.finish();
        let (decoded_params, decoded) = decode_from(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(decoded_params, params);
        assert_eq!(decoded, data);
        bytes
    }

    #[test]
    fn test_min_match_from_field_widths() {
        assert_eq!(LzssParams::new(4, 3).unwrap().min_match, 1);
        assert_eq!(LzssParams::new(8, 4).unwrap().min_match, 2);
        assert_eq!(LzssParams::new(12, 8).unwrap().min_match, 3);
        assert_eq!(LzssParams::new(24, 16).unwrap().min_match, 5);
    }

    #[test]
    fn test_invalid_params() {
        assert!(LzssParams::new(0, 4).is_err());
        assert!(LzssParams::new(25, 4).is_err());
        assert!(LzssParams::new(8, 17).is_err());
    }

    #[test]
    fn test_roundtrip_small_inputs() {
        let params = LzssParams::new(8, 4).unwrap();
        roundtrip(&[], params);
        roundtrip(&[7], params);
        roundtrip(b"abcabcabcabcabc", params);
    }

    #[test]
    fn test_roundtrip_around_window_size() {
        let params = LzssParams::new(6, 4).unwrap();
        let window = params.window();
        for len in [window - 1, window, window + 1, 3 * window + 7] {
            let data: Vec<u8> = (0..len).map(|i| (i % 13) as u8 ^ (i / 50) as u8).collect();
            roundtrip(&data, params);
        }
    }

    #[test]
    fn test_long_run_uses_overlapping_reference() {
        let params = LzssParams::new(8, 8).unwrap();
        let data = vec![0x55u8; 1000];
        let bytes = roundtrip(&data, params);
        assert!(bytes.len() < 20, "{} bytes", bytes.len());
    }

    #[test]
    fn test_distance_never_exceeds_window() {
        // Repeats at distance 40, beyond a 32-byte window
        let block: Vec<u8> = (0..40u8).collect();
        let data: Vec<u8> = block.iter().chain(block.iter()).copied().collect();
        let params = LzssParams::new(5, 4).unwrap();
        let bytes = roundtrip(&data, params);
        let literal_only_bits = HEADER_BITS + data.len() * LITERAL_BITS;
        assert_eq!(bytes.len(), literal_only_bits.div_ceil(8));
    }

    #[test]
    fn test_decode_rejects_reference_before_start() {
        let mut writer = BitWriter::new();
        writer.write(4, 5);
        writer.write(3, 5);
        writer.write(0, 3);
        writer.write(4, 32);
        writer.write_bit(true);
        writer.write(2, 4); // distance 3 with nothing decoded
        writer.write(0, 3);
        let bytes = writer.finish();
        assert!(decode_from(&mut BitReader::new(&bytes)).is_err());
    }

    #[test]
    fn test_decode_rejects_truncated_stream() {
        let params = LzssParams::new(8, 4).unwrap();
        let mut writer = BitWriter::new();
        encode_into(&mut writer, b"hello hello hello", &params);
        let bytes = writer.finish();
        assert!(decode_from(&mut BitReader::new(&bytes[..bytes.len() - 3])).is_err());
    }

    #[test]
    fn test_decode_huge_declared_length_fails_cleanly() {
        let mut writer = BitWriter::new();
        writer.write(8, 5);
        writer.write(4, 5);
        writer.write(1, 3);
        writer.write(u32::MAX as u64, 32);
        writer.write_bit(false);
        writer.write(b'x' as u64, 8);
        let bytes = writer.finish();
        assert!(decode_from(&mut BitReader::new(&bytes)).is_err());
    }
}
