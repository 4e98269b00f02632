use thiserror::Error;

// Upper bound of any length-prefixed field. A forged prefix bigger than this is
// rejected instead of waiting for bytes which will never come.
pub const MAX_FIELD_LEN: usize = 16 * 1024 * 1024;

// Errors raised while decoding a raw buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer is incomplete, {missing} more bytes needed")]
    Incomplete { missing: usize },
    #[error("unknown packet type {0}")]
    UnknownPacket(u8),
    #[error("unknown file success kind {0}")]
    UnknownFileSuccessKind(u8),
    #[error("string is not valid utf-8")]
    InvalidString,
    #[error("declared length {declared} exceeds the maximum of {max}")]
    TooLarge { declared: usize, max: usize },
    #[error("{0} unexpected bytes after the packet")]
    TrailingBytes(usize),
}

impl CodecError {
    // Whether more bytes could turn this error into a valid decode.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, CodecError::Incomplete { .. })
    }
}

// Writers ---------------------------------------------------------------------
// Every integer is written big endian.

// Append a u16 as 2*u8.
pub fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend(value.to_be_bytes());
}

// Append a u32 as 4*u8.
pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend(value.to_be_bytes());
}

// Append a u64 as 8*u8.
pub fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend(value.to_be_bytes());
}

// Append a raw byte buffer.
// Buffer is length(4) + bytes(n).
pub fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

// Append a String.
// Buffer is length(4) + str as bytes(n).
pub fn put_string(buf: &mut Vec<u8>, value: &str) {
    put_bytes(buf, value.as_bytes());
}

// Append a u32 list.
// Buffer is count(4) + count*u32.
pub fn put_u32_list(buf: &mut Vec<u8>, list: &[u32]) {
    put_u32(buf, list.len() as u32);
    for value in list {
        put_u32(buf, *value);
    }
}

// Reader ----------------------------------------------------------------------

// Cursor over a raw buffer. Each read either consumes the wanted bytes, or
// fails with `Incomplete` and leaves the cursor untouched.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    // Number of bytes already consumed.
    pub fn position(&self) -> usize {
        self.pos
    }

    // Number of bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    // Consume exactly `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::Incomplete {
                missing: len - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self.take(N)?;
        Ok(core::array::from_fn(|idx| slice[idx]))
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    // Read a length prefix, and check it against the field limit. Items of
    // variable size are bounded by their smallest encoding.
    pub fn length(&mut self, item_size: usize) -> Result<usize, CodecError> {
        let declared = self.u32()? as usize;
        if declared.saturating_mul(item_size) > MAX_FIELD_LEN {
            return Err(CodecError::TooLarge {
                declared,
                max: MAX_FIELD_LEN / item_size,
            });
        }
        Ok(declared)
    }

    // Read a length(4) + bytes(n) buffer.
    pub fn bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let start = self.pos;
        let len = self.length(1)?;
        self.take(len).map(<[u8]>::to_vec).map_err(|err| {
            self.pos = start;
            err
        })
    }

    // Read a length(4) + str as bytes(n) buffer.
    pub fn string(&mut self) -> Result<String, CodecError> {
        let raw = self.bytes()?;
        String::from_utf8(raw).map_err(|_| CodecError::InvalidString)
    }

    // Read a count(4) + count*u32 list.
    pub fn u32_list(&mut self) -> Result<Vec<u32>, CodecError> {
        let start = self.pos;
        let count = self.length(4)?;
        let raw = self.take(count * 4).map_err(|err| {
            self.pos = start;
            err
        })?;
        Ok(raw
            .chunks_exact(4)
            .map(|item| u32::from_be_bytes([item[0], item[1], item[2], item[3]]))
            .collect())
    }

    // Read a count(4) + count*N list of fixed size arrays.
    pub fn array_list<const N: usize>(&mut self) -> Result<Vec<[u8; N]>, CodecError> {
        let start = self.pos;
        let count = self.length(N)?;
        let raw = self.take(count * N).map_err(|err| {
            self.pos = start;
            err
        })?;
        Ok(raw
            .chunks_exact(N)
            .map(|item| core::array::from_fn(|idx| item[idx]))
            .collect())
    }
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
