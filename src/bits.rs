//! Bit level access to packet bytes.
use crate::{Error, Result};

/// Extract `nbits` bits starting at bit `start` of `data` as a big-endian integer.
///
/// Bits are numbered from the most significant bit of the first byte. `nbits` must be in
/// `1..=64`. Returns `None` if the requested bits are not fully contained in `data`.
#[must_use]
pub fn extract_bits(data: &[u8], start: usize, nbits: usize) -> Option<u64> {
    if nbits == 0 || nbits > 64 || start + nbits > data.len() * 8 {
        return None;
    }
    let start_byte = start / 8;
    let bit_offset = start % 8;
    let end_byte = start_byte + (bit_offset + nbits + 7) / 8;

    // at most 9 bytes cover a 64 bit field, so the window always fits in a u128
    let window = data[start_byte..end_byte]
        .iter()
        .fold(0u128, |acc, b| (acc << 8) | u128::from(*b));
    if bit_offset == 0 && nbits % 8 == 0 {
        return Some(window as u64);
    }
    let shift = (end_byte - start_byte) * 8 - bit_offset - nbits;
    let mask = if nbits == 64 {
        u128::from(u64::MAX)
    } else {
        (1u128 << nbits) - 1
    };
    Some(((window >> shift) & mask) as u64)
}

/// Cursor over an immutable packet buffer.
///
/// The cursor is a bit offset from the start of the buffer and never exceeds
/// `data.len() * 8`; reads that would move past the end fail with [Error::OutOfBounds]
/// and leave the cursor untouched.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0 }
    }

    /// Current bit offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn len_bits(&self) -> usize {
        self.data.len() * 8
    }

    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.len_bits() - self.pos
    }

    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn check(&self, nbits: usize) -> Result<()> {
        if self.pos + nbits > self.len_bits() {
            return Err(Error::OutOfBounds {
                position: self.pos,
                requested: nbits,
                available: self.len_bits(),
            });
        }
        Ok(())
    }

    /// Move the cursor forward `nbits` without reading.
    ///
    /// # Errors
    /// [Error::OutOfBounds] if the new position would be past the end of the buffer.
    pub fn skip(&mut self, nbits: usize) -> Result<()> {
        self.check(nbits)?;
        self.pos += nbits;
        Ok(())
    }

    /// Read `nbits` (at most 64) as a big-endian unsigned integer.
    ///
    /// # Errors
    /// [Error::OutOfBounds] if there are not enough bits left, [Error::InvalidSize] if
    /// `nbits` is 0 or larger than 64.
    pub fn read_bits_as_int(&mut self, nbits: usize) -> Result<u64> {
        if nbits == 0 || nbits > 64 {
            return Err(Error::InvalidSize(format!(
                "integer reads must be 1 to 64 bits, got {nbits}"
            )));
        }
        self.check(nbits)?;
        let value = extract_bits(self.data, self.pos, nbits).ok_or(Error::OutOfBounds {
            position: self.pos,
            requested: nbits,
            available: self.len_bits(),
        })?;
        self.pos += nbits;
        Ok(value)
    }

    /// Read `nbits` as bytes.
    ///
    /// The result holds the minimum number of bytes covering `nbits`. When `nbits` is not
    /// a multiple of 8 the value is right aligned, i.e., the first byte is zero padded in its
    /// most significant bits.
    ///
    /// # Errors
    /// [Error::OutOfBounds] if there are not enough bits left.
    pub fn read_bits_as_bytes(&mut self, nbits: usize) -> Result<Vec<u8>> {
        self.check(nbits)?;
        let out = if self.pos % 8 == 0 && nbits % 8 == 0 {
            let start = self.pos / 8;
            self.data[start..start + nbits / 8].to_vec()
        } else {
            unaligned_bytes(self.data, self.pos, nbits)
        };
        self.pos += nbits;
        Ok(out)
    }

    /// Return the bytes from the cursor to the last whole byte of the buffer without
    /// moving the cursor.
    #[must_use]
    pub fn peek_remaining_bytes(&self) -> Vec<u8> {
        let nbits = self.remaining_bits() - self.remaining_bits() % 8;
        if self.pos % 8 == 0 {
            let start = self.pos / 8;
            self.data[start..start + nbits / 8].to_vec()
        } else {
            unaligned_bytes(self.data, self.pos, nbits)
        }
    }
}

fn unaligned_bytes(data: &[u8], start: usize, nbits: usize) -> Vec<u8> {
    let len = (nbits + 7) / 8;
    let pad = len * 8 - nbits;
    let mut out = vec![0u8; len];
    for i in 0..nbits {
        let src = start + i;
        let bit = (data[src / 8] >> (7 - src % 8)) & 1;
        let dst = pad + i;
        out[dst / 8] |= bit << (7 - dst % 8);
    }
    out
}
