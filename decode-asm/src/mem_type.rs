use crate::value_type::ValueType;

/// The nine integer byte-width/signedness combinations plus the two float
/// widths usable by load/store opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemType {
    /// Signed 8-bit.
    I8,
    /// Unsigned 8-bit.
    U8,
    /// Signed 16-bit.
    I16,
    /// Unsigned 16-bit.
    U16,
    /// Signed 32-bit.
    I32,
    /// Unsigned 32-bit.
    U32,
    /// Signed 64-bit.
    I64,
    /// Unsigned 64-bit.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

/// Low two bits of the memory-access operand select the width class.
const WIDTH_MASK: u8 = 0b0000_0011;
/// Bit 2 selects sign-extension for integer widths.
const SIGN_BIT: u8 = 0b0000_0100;
/// Bit 3 selects the float widths instead of the integer ones.
const FLOAT_BIT: u8 = 0b0000_1000;
/// Any other bit set makes the operand malformed.
const RESERVED_MASK: u8 = !(WIDTH_MASK | SIGN_BIT | FLOAT_BIT);

const WIDTH_8: u8 = 0b00;
const WIDTH_16: u8 = 0b01;
const WIDTH_32: u8 = 0b10;
const WIDTH_64: u8 = 0b11;

/// Outcome of decoding a raw memory-access operand byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemTypeDecodeError {
    /// A bit outside the width/sign/float fields was set, or the sign bit
    /// was set together with the float bit.
    UnrecognizedBits,
    /// The width field selected something illegal for its class (e.g. a
    /// 16-bit float), or disagreed with the caller's declared value type.
    InvalidWidth,
}

impl MemType {
    /// The [`ValueType`] a value of this memory-access type widens to once loaded.
    pub const fn natural_value_type(self) -> ValueType {
        match self {
            Self::I8 | Self::U8 | Self::I16 | Self::U16 | Self::I32 | Self::U32 => ValueType::I32,
            Self::I64 | Self::U64 => ValueType::I64,
            Self::F32 => ValueType::F32,
            Self::F64 => ValueType::F64,
        }
    }

    /// Decode a memory-access-type operand byte.
    ///
    /// The byte alone determines width, signedness and int-vs-float; `declared`
    /// is an optional cross-check against an already-known value type (the
    /// type of the value being stored, for `store-mem`) and is compared
    /// against [`Self::natural_value_type`]. Pass `None` when no such type is
    /// known yet (`load-mem`, where the memory-access byte is itself the only
    /// source of the produced type).
    pub fn decode(byte: u8, declared: Option<ValueType>) -> Result<Self, MemTypeDecodeError> {
        if byte & RESERVED_MASK != 0 {
            return Err(MemTypeDecodeError::UnrecognizedBits);
        }
        let signed = byte & SIGN_BIT != 0;
        let width = byte & WIDTH_MASK;
        let mem = if byte & FLOAT_BIT != 0 {
            if signed {
                return Err(MemTypeDecodeError::UnrecognizedBits);
            }
            match width {
                WIDTH_32 => Self::F32,
                WIDTH_64 => Self::F64,
                _ => return Err(MemTypeDecodeError::InvalidWidth),
            }
        } else {
            match width {
                WIDTH_8 => if signed { Self::I8 } else { Self::U8 },
                WIDTH_16 => if signed { Self::I16 } else { Self::U16 },
                WIDTH_32 => if signed { Self::I32 } else { Self::U32 },
                WIDTH_64 => if signed { Self::I64 } else { Self::U64 },
                _ => unreachable!("width field is two bits"),
            }
        };
        if let Some(declared) = declared {
            if declared != mem.natural_value_type() {
                return Err(MemTypeDecodeError::InvalidWidth);
            }
        }
        Ok(mem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_int_widens_to_i32_unconstrained() {
        assert_eq!(MemType::decode(0b0000_0000, None), Ok(MemType::U8));
        assert_eq!(MemType::decode(0b0000_0100, None), Ok(MemType::I8));
    }

    #[test]
    fn wide_int_requires_i64_when_declared() {
        assert_eq!(
            MemType::decode(0b0000_0011, Some(ValueType::I32)),
            Err(MemTypeDecodeError::InvalidWidth)
        );
        assert_eq!(
            MemType::decode(0b0000_0111, Some(ValueType::I64)),
            Ok(MemType::I64)
        );
    }

    #[test]
    fn float_bit_selects_float_widths() {
        assert_eq!(MemType::decode(0b0000_1010, None), Ok(MemType::F32));
        assert_eq!(MemType::decode(0b0000_1011, None), Ok(MemType::F64));
        assert_eq!(
            MemType::decode(0b0000_1000, None),
            Err(MemTypeDecodeError::InvalidWidth)
        );
    }

    #[test]
    fn float_with_sign_bit_is_unrecognized() {
        assert_eq!(
            MemType::decode(0b0000_1110, None),
            Err(MemTypeDecodeError::UnrecognizedBits)
        );
    }

    #[test]
    fn reserved_bits_rejected() {
        assert_eq!(
            MemType::decode(0b0001_0000, None),
            Err(MemTypeDecodeError::UnrecognizedBits)
        );
    }
}
