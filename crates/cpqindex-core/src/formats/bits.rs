//! # Bit Codec
//!
//! Packs unsigned integers of arbitrary width (0 to 32 bits) into a
//! zero-initialized, byte-aligned buffer, most significant bit first.
//!
//! A write that straddles a byte boundary is split: the high-order bits fill
//! the remainder of the current byte and the rest continue in the next one.
//! The buffer never grows; callers size it to the exact bit count they intend
//! to write, and writing past it is reported as `IndexError::BitOverflow`.

use crate::IndexError;
use crate::primitives::MAX_FIELD_WIDTH;

/// Low `width` bits set.
#[inline]
fn mask(width: u32) -> u64 {
    (1u64 << width) - 1
}

fn check_width(width: u32) -> Result<(), IndexError> {
    if width > MAX_FIELD_WIDTH {
        return Err(IndexError::InvalidArgument(format!(
            "field width {} exceeds {} bits",
            width, MAX_FIELD_WIDTH
        )));
    }
    Ok(())
}

// =============================================================================
// WRITER
// =============================================================================

/// MSB-first bit writer over a pre-sized buffer.
#[derive(Debug, Clone)]
pub struct BitWriter {
    data: Vec<u8>,
    /// Index of the byte currently being filled.
    pos: usize,
    /// Bits still free in `data[pos]`.
    free: u32,
}

impl BitWriter {
    /// Create a writer for `bits` bits, rounded up to whole bytes.
    #[must_use]
    pub fn new(bits: usize) -> Self {
        Self {
            data: vec![0; bits.div_ceil(8)],
            pos: 0,
            free: 8,
        }
    }

    /// Total capacity in bits (a multiple of eight).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len() * 8
    }

    /// Number of bits written so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos * 8 + (8 - self.free as usize)
    }

    /// Write the low `width` bits of `value`.
    ///
    /// A width of zero writes nothing.
    pub fn write(&mut self, value: u32, width: u32) -> Result<(), IndexError> {
        check_width(width)?;
        if width == 0 {
            return Ok(());
        }

        let end = self.position() + width as usize;
        if end > self.capacity() {
            return Err(IndexError::BitOverflow {
                capacity: self.capacity(),
                requested: end,
            });
        }

        let value = u64::from(value) & mask(width);
        let mut remaining = width;
        while remaining > self.free {
            // finish the current byte with the high-order bits
            let high = (value >> (remaining - self.free)) & mask(self.free);
            self.data[self.pos] |= high as u8;
            remaining -= self.free;
            self.pos += 1;
            self.free = 8;
        }

        let low = value & mask(remaining);
        self.data[self.pos] |= (low << (self.free - remaining)) as u8;
        self.free -= remaining;
        if self.free == 0 && self.pos + 1 < self.data.len() {
            self.pos += 1;
            self.free = 8;
        }

        Ok(())
    }

    /// The written bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the writer and return the buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Render every byte as eight binary digits, separated by spaces.
    #[must_use]
    pub fn to_binary_string(&self) -> String {
        binary_string(&self.data)
    }
}

/// Render bytes as space-separated 8-digit binary groups.
#[must_use]
pub fn binary_string(data: &[u8]) -> String {
    data.iter()
        .map(|byte| format!("{:08b}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// READER
// =============================================================================

/// MSB-first reader, the inverse of [`BitWriter`].
///
/// Reading needs the same sequence of field widths used for writing.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Absolute bit offset of the next read.
    bit: usize,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit: 0 }
    }

    /// Number of bits consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.bit
    }

    /// Bits left in the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.bit
    }

    /// Read the next `width` bits as an unsigned value.
    pub fn read(&mut self, width: u32) -> Result<u32, IndexError> {
        check_width(width)?;
        if width as usize > self.remaining() {
            return Err(IndexError::BitOverflow {
                capacity: self.data.len() * 8,
                requested: self.bit + width as usize,
            });
        }

        let mut value: u64 = 0;
        let mut remaining = width;
        while remaining > 0 {
            let byte = u64::from(self.data[self.bit / 8]);
            let free = 8 - (self.bit % 8) as u32;
            let take = remaining.min(free);
            let chunk = (byte >> (free - take)) & mask(take);
            value = (value << take) | chunk;
            remaining -= take;
            self.bit += take as usize;
        }

        Ok(value as u32)
    }
}

// =============================================================================
// TESTS
// =============================================================================
