//! MSB-first bit packing shared by every container format.

use crate::error::{BufferError, Result};

/// Appends bit fields, most significant bit first.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Bits used in the last byte (0 means the last byte is full or absent).
    used: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            used: 0,
        }
    }

    /// Write the low `count` bits of `value` (count ≤ 64).
    pub fn write(&mut self, value: u64, count: u32) {
        debug_assert!(count <= 64);
        let mut remaining = count;
        while remaining > 0 {
            if self.used == 0 {
                self.bytes.push(0);
            }
            let free = 8 - self.used as u32;
            let take = free.min(remaining);
            let shift = remaining - take;
            let chunk = ((value >> shift) & ((1u64 << take) - 1)) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= chunk << (free - take);
            }
            self.used = ((self.used as u32 + take) % 8) as u8;
            remaining -= take;
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.write(bit as u64, 1);
    }

    /// Write whole bytes; fast path when aligned.
    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.used == 0 {
            self.bytes.extend_from_slice(data);
        } else {
            for &b in data {
                self.write(b as u64, 8);
            }
        }
    }

    pub fn bit_len(&self) -> usize {
        if self.used == 0 {
            self.bytes.len() * 8
        } else {
            (self.bytes.len() - 1) * 8 + self.used as usize
        }
    }

    /// Finish, zero-padding to a byte boundary.
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads bit fields written by [`BitWriter`].
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }

    /// Read `count` bits (count ≤ 64) as an unsigned value.
    pub fn read(&mut self, count: u32) -> Result<u64> {
        if count as usize > self.remaining() {
            return Err(BufferError::codec(format!(
                "stream ends early: need {} bits at bit {}, {} left",
                count,
                self.pos,
                self.remaining()
            )));
        }

        let mut value = 0u64;
        let mut remaining = count;
        while remaining > 0 {
            let byte = self.data[self.pos / 8];
            let offset = (self.pos % 8) as u32;
            let available = 8 - offset;
            let take = available.min(remaining);
            let chunk = (byte >> (available - take)) & ((1u16 << take) - 1) as u8;
            value = (value << take) | chunk as u64;
            self.pos += take as usize;
            remaining -= take;
        }
        Ok(value)
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read(1)? == 1)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        if self.pos % 8 == 0 {
            let start = self.pos / 8;
            let end = start
                .checked_add(count)
                .filter(|&end| end <= self.data.len())
                .ok_or_else(|| {
                    BufferError::codec(format!("stream ends early: need {} bytes", count))
                })?;
            self.pos = end * 8;
            return Ok(self.data[start..end].to_vec());
        }
        (0..count).map(|_| Ok(self.read(8)? as u8)).collect()
    }
}

/// Number of bits needed to represent `value` (at least 1).
pub fn bits_for(value: u64) -> u32 {
    (64 - value.leading_zeros()).max(1)
}
