//! Binary Encoding Helpers
//!
//! The registry's binary layout is PROTOCOL: records, undo entries and
//! transactions are hashed and persisted in this exact form.
//!
//! # Format Conventions
//!
//! - Integers are little-endian (keys in `storage::keys` are big-endian)
//! - Timestamps are 3 bytes (see `CompactTimestamp`)
//! - Variable-length byte strings carry a one byte length prefix

use crate::errors::{RegistryError, RegistryResult};

/// Largest value representable in 3 bytes
pub const MAX_U24: u32 = 0x00FF_FFFF;

/// Types with a canonical binary encoding
pub trait BinaryEncode {
    /// Append the encoding of `self` to `out`
    fn encode_to(&self, out: &mut Vec<u8>) -> RegistryResult<()>;

    /// Encode `self` into a fresh buffer
    fn to_bytes(&self) -> RegistryResult<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_to(&mut out)?;
        Ok(out)
    }
}

/// Types that can be read back from their canonical encoding
pub trait BinaryDecode: Sized {
    fn decode_from(reader: &mut Reader<'_>) -> RegistryResult<Self>;

    /// Decode a value that must span the whole buffer
    fn from_bytes(bytes: &[u8]) -> RegistryResult<Self> {
        let mut reader = Reader::new(bytes);
        let value = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Cursor over an encoded buffer
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> RegistryResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(RegistryError::Encoding(format!(
                "unexpected end of input: need {} bytes, {} left",
                len,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> RegistryResult<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> RegistryResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u24(&mut self) -> RegistryResult<u32> {
        let [a, b, c] = self.read_array::<3>()?;
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    pub fn read_u32(&mut self) -> RegistryResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u128(&mut self) -> RegistryResult<u128> {
        Ok(u128::from_le_bytes(self.read_array()?))
    }

    /// Read a byte string with a one byte length prefix
    pub fn read_short_bytes(&mut self) -> RegistryResult<&'a [u8]> {
        let len = self.read_u8()? as usize;
        self.read_bytes(len)
    }

    /// Fail if any input is left over
    pub fn finish(&self) -> RegistryResult<()> {
        if self.remaining() != 0 {
            return Err(RegistryError::Encoding(format!(
                "{} trailing bytes",
                self.remaining()
            )));
        }
        Ok(())
    }
}

pub fn write_u24(out: &mut Vec<u8>, value: u32) -> RegistryResult<()> {
    if value > MAX_U24 {
        return Err(RegistryError::Encoding(format!(
            "value {} does not fit in 3 bytes",
            value
        )));
    }
    out.extend_from_slice(&value.to_le_bytes()[..3]);
    Ok(())
}

pub fn write_short_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> RegistryResult<()> {
    let len = u8::try_from(bytes.len()).map_err(|_| {
        RegistryError::Encoding(format!("byte string of {} bytes is too long", bytes.len()))
    })?;
    out.push(len);
    out.extend_from_slice(bytes);
    Ok(())
}
