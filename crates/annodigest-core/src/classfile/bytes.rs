//! Big-endian byte cursor and modified UTF-8 codec.

use crate::DigestError;

/// Forward-only cursor over class file bytes.
///
/// Every read is bounds-checked; running off the end is a
/// `MalformedMetadata` error carrying the absolute offset.
#[derive(Debug, Clone)]
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Absolute offset of `bytes[0]` within the whole class file.
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            base: 0,
        }
    }

    /// Absolute offset of the next byte.
    pub(crate) fn offset(&self) -> usize {
        self.base.saturating_add(self.pos)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], DigestError> {
        if len > self.remaining() {
            return Err(DigestError::malformed(
                self.offset(),
                format!(
                    "truncated data: need {} bytes, {} available",
                    len,
                    self.remaining()
                ),
            ));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.bytes[start..self.pos])
    }

    /// Split off the next `len` bytes as an independent reader.
    ///
    /// Offsets reported by the sub-reader stay absolute.
    pub(crate) fn sub_reader(&mut self, len: usize) -> Result<ByteReader<'a>, DigestError> {
        let base = self.offset();
        let bytes = self.take(len)?;
        Ok(ByteReader { bytes, pos: 0, base })
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DigestError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DigestError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DigestError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, DigestError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }
}

/// Decode the JVM's modified UTF-8 (JVMS §4.4.7).
///
/// Supplementary characters arrive as encoded surrogate pairs and are
/// reassembled through UTF-16; lone surrogates become U+FFFD.
pub(crate) fn decode_modified_utf8(bytes: &[u8], offset: usize) -> Result<String, DigestError> {
    if bytes.is_ascii() && !bytes.contains(&0) {
        return Ok(bytes.iter().map(|&b| b as char).collect());
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let invalid = |at: usize| DigestError::malformed(offset + at, "invalid modified UTF-8");

    while i < bytes.len() {
        let b = bytes[i];
        if b != 0 && b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1).ok_or_else(|| invalid(i))?;
            if b2 & 0xC0 != 0x80 {
                return Err(invalid(i));
            }
            units.push((u16::from(b & 0x1F) << 6) | u16::from(b2 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1).ok_or_else(|| invalid(i))?;
            let b3 = *bytes.get(i + 2).ok_or_else(|| invalid(i))?;
            if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return Err(invalid(i));
            }
            units.push(
                (u16::from(b & 0x0F) << 12) | (u16::from(b2 & 0x3F) << 6) | u16::from(b3 & 0x3F),
            );
            i += 3;
        } else {
            return Err(invalid(i));
        }
    }

    Ok(String::from_utf16_lossy(&units))
}

/// Encode a string as modified UTF-8.
pub(crate) fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
