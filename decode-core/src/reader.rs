//! Raw byte access: length-bounded fixed-width reads and capped unsigned
//! LEB128 varints.

use crate::error::{DecodeError, DecodeErrorKind};
use decode_asm::{MemType, ValueType};

/// A little-endian fixed-width value the reader knows how to decode.
pub trait FixedOperand: Sized {
    /// Encoded width in bytes.
    const SIZE: usize;
    /// Decode from exactly `Self::SIZE` little-endian bytes.
    fn from_le_bytes(bytes: &[u8]) -> Self;
}

macro_rules! fixed_operand {
    ($ty:ty) => {
        impl FixedOperand for $ty {
            const SIZE: usize = core::mem::size_of::<$ty>();

            fn from_le_bytes(bytes: &[u8]) -> Self {
                let mut buf = [0u8; core::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

fixed_operand!(i8);
fixed_operand!(u8);
fixed_operand!(i16);
fixed_operand!(u16);
fixed_operand!(i32);
fixed_operand!(u32);
fixed_operand!(i64);
fixed_operand!(u64);
fixed_operand!(f32);
fixed_operand!(f64);

/// Bounds-checked reader over one function body's bytecode.
///
/// `limit` starts at the end of the code slice and is collapsed to `start`
/// the moment a diagnostic is latched: every read after that point fails
/// with [`DecodeErrorKind::BeyondEndOfCode`] instead of reading stale bytes,
/// which is what makes the "single-shot" guarantee hold without an explicit
/// poison flag on every call site.
pub struct Reader<'code> {
    code: &'code [u8],
    start: u32,
    limit: u32,
}

impl<'code> Reader<'code> {
    /// Build a reader over the full body; `limit` starts at `code.len()`.
    pub fn new(code: &'code [u8]) -> Self {
        let len = u32::try_from(code.len()).unwrap_or(u32::MAX);
        Self {
            code,
            start: 0,
            limit: len,
        }
    }

    /// Start offset (always 0 for a function body decoded from its own slice).
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Current end limit; collapses to `start` once poisoned.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Latch the single-shot poison state by collapsing the limit to the start.
    pub fn poison(&mut self) {
        self.limit = self.start;
    }

    /// Whether `pc` has reached or passed the limit (normal end-of-body).
    pub fn at_end(&self, pc: u32) -> bool {
        pc >= self.limit
    }

    fn slice(&self, pc: u32, len: u32) -> Option<&'code [u8]> {
        let start = pc as usize;
        let end = start.checked_add(len as usize)?;
        if (end as u32) > self.limit {
            return None;
        }
        self.code.get(start..end)
    }

    /// Read a fixed-width little-endian operand starting at `pc + 1` (the
    /// byte at `pc` is the opcode itself).
    pub fn fixed<V: FixedOperand>(&self, pc: u32) -> Result<V, DecodeError> {
        let len = V::SIZE as u32;
        match self.slice(pc + 1, len) {
            Some(bytes) => Ok(V::from_le_bytes(bytes)),
            None => Err(DecodeError::new(
                DecodeErrorKind::TruncatedOperand,
                pc,
                crate::alloc::format!(
                    "truncated operand: need {len} bytes at {}, {} remain",
                    pc + 1,
                    self.limit.saturating_sub(pc + 1)
                ),
            )),
        }
    }

    /// Read an unsigned LEB128 varint starting at `pc + 1`, capped at five
    /// payload bytes. Returns the decoded value and the total length
    /// consumed (opcode byte excluded), i.e. the number of payload bytes read.
    pub fn unsigned_leb128(&self, pc: u32) -> Result<(u64, u32), DecodeError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        let mut length = 0u32;
        loop {
            let byte = match self.slice(pc + 1 + length, 1) {
                Some(b) => b[0],
                None => {
                    if length == 0 {
                        return Err(DecodeError::new(
                            DecodeErrorKind::ExpectedLeb128,
                            pc,
                            crate::alloc::format!("expected LEB128 varint at {}", pc + 1),
                        ));
                    }
                    return Err(DecodeError::new(
                        DecodeErrorKind::TruncatedOperand,
                        pc,
                        crate::alloc::format!("truncated LEB128 varint at {}", pc + 1),
                    ));
                }
            };
            value |= u64::from(byte & 0x7f) << shift;
            length += 1;
            if byte & 0x80 == 0 {
                return Ok((value, length));
            }
            if length == 5 {
                return Err(DecodeError::new(
                    DecodeErrorKind::InvalidLeb128,
                    pc,
                    crate::alloc::format!("LEB128 varint at {} exceeds five bytes", pc + 1),
                ));
            }
            shift += 7;
        }
    }

    /// Decode a single-byte memory-access-type operand at `pc`. `declared`
    /// cross-checks against an already-known value type (see
    /// [`decode_asm::MemType::decode`]); pass `None` when no such type is
    /// known yet.
    pub fn mem_access_type(
        &self,
        pc: u32,
        declared: Option<ValueType>,
    ) -> Result<MemType, DecodeError> {
        let byte: u8 = self.fixed(pc)?;
        MemType::decode(byte, declared).map_err(|err| match err {
            decode_asm::MemTypeDecodeError::UnrecognizedBits => DecodeError::new(
                DecodeErrorKind::UnrecognizedBits,
                pc,
                crate::alloc::format!("memory-access operand {byte:#04x} sets a reserved bit"),
            ),
            decode_asm::MemTypeDecodeError::InvalidWidth => DecodeError::new(
                DecodeErrorKind::InvalidWidth,
                pc,
                crate::alloc::format!(
                    "memory-access operand {byte:#04x} is not valid for the expected value type"
                ),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_reads_little_endian() {
        let code = [0x00u8, 0x2a, 0x00, 0x00, 0x00];
        let reader = Reader::new(&code);
        let v: i32 = reader.fixed(0).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn fixed_fails_when_truncated() {
        let code = [0x00u8, 0x2a, 0x00];
        let reader = Reader::new(&code);
        let err = reader.fixed::<i32>(0).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::TruncatedOperand);
    }

    #[test]
    fn leb128_reads_multi_byte_value() {
        // 300 = 0b1_0010_1100 -> low7=0x2c|cont, next7=0x02
        let code = [0x00u8, 0xac, 0x02];
        let reader = Reader::new(&code);
        let (value, length) = reader.unsigned_leb128(0).unwrap();
        assert_eq!(value, 300);
        assert_eq!(length, 2);
    }

    #[test]
    fn leb128_rejects_continuation_on_fifth_byte() {
        let code = [0x00u8, 0x80, 0x80, 0x80, 0x80, 0x80];
        let reader = Reader::new(&code);
        let err = reader.unsigned_leb128(0).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidLeb128);
    }

    #[test]
    fn leb128_rejects_empty_payload() {
        let code = [0x00u8];
        let reader = Reader::new(&code);
        let err = reader.unsigned_leb128(0).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::ExpectedLeb128);
    }
}
