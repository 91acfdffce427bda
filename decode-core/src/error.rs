//! Single-shot diagnostic sink.
//!
//! Exactly one [`DecodeError`] is ever produced per [`crate::decoder::decode`]
//! call: the first fault latches it and the decode loop is starved by
//! collapsing its read limit down to its start (see [`crate::reader::Reader::poison`]),
//! so nothing past that point can change the result.

use crate::alloc::String;
use decode_asm::ValueType;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, DecodeError>;

/// A latched diagnostic: the fault kind, the byte offset of the opcode that
/// triggered it, an optional secondary offset (e.g. the offending child
/// expression), and a formatted message.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    /// What went wrong.
    pub kind: DecodeErrorKind,
    /// Byte offset of the opcode being decoded when the fault was detected.
    pub error_pc: u32,
    /// Secondary offset, when the fault concerns a specific child expression.
    pub error_pt: Option<u32>,
    /// Human-readable description, including offsets and opcode names.
    pub message: String,
}

impl DecodeError {
    pub(crate) fn new(kind: DecodeErrorKind, error_pc: u32, message: String) -> Self {
        Self {
            kind,
            error_pc,
            error_pt: None,
            message,
        }
    }

    pub(crate) fn with_pt(mut self, error_pt: u32) -> Self {
        self.error_pt = Some(error_pt);
        self
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "at byte {}: {}", self.error_pc, self.message)
    }
}

/// Taxonomy of diagnostics the decoder can latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeErrorKind {
    /// A fixed-width operand read ran past the end limit.
    #[error("truncated operand")]
    TruncatedOperand,
    /// Decoding advanced `pc` past the end limit with no error latched yet.
    #[error("beyond end of code")]
    BeyondEndOfCode,
    /// A LEB128 varint's fifth byte still had its continuation bit set.
    #[error("invalid LEB128 varint")]
    InvalidLeb128,
    /// A LEB128 varint was expected but no payload bytes were present.
    #[error("expected LEB128 varint")]
    ExpectedLeb128,
    /// A local index operand named a local past the function's declared count.
    #[error("invalid local index")]
    InvalidLocalIndex,
    /// A global index operand named an undeclared global.
    #[error("invalid global index")]
    InvalidGlobalIndex,
    /// A function index operand named an undeclared function.
    #[error("invalid function index")]
    InvalidFunctionIndex,
    /// A function-table index operand named an undeclared indirect-call signature.
    #[error("invalid function-table index")]
    InvalidFunctionTableIndex,
    /// The opcode byte didn't match any known opcode.
    #[error("invalid opcode")]
    InvalidOpcode,
    /// A memory-access operand byte had a bit set outside its two recognized fields.
    #[error("unrecognized memory-access bits")]
    UnrecognizedBits,
    /// A memory-access operand selected a width illegal for the declared type.
    #[error("invalid memory-access width")]
    InvalidWidth,
    /// A child's type disagreed with the type expected at this reduce position.
    #[error("type check failed")]
    TypeCheck,
    /// A `break` depth named a frame that doesn't exist.
    #[error("improperly nested break")]
    ImproperlyNestedBreak,
    /// A `continue` depth named a frame that doesn't exist, or named a
    /// non-loop frame.
    #[error("improperly nested continue")]
    ImproperlyNestedContinue,
    /// A statement was encountered while the current environment is not reachable.
    #[error("unreachable code")]
    UnreachableCode,
    /// The body fell off the end still reachable without enough trailing
    /// values to satisfy the function's declared return types.
    #[error("implicit return shortage")]
    ImplicitReturnShortage,
    /// The body fell off the end with a trailing value of the wrong type
    /// for an implicit return.
    #[error("implicit return type mismatch")]
    ImplicitReturnTypeMismatch,
}

impl DecodeError {
    /// Build a `type-check` diagnostic for a child whose type disagreed with
    /// what the parent opcode expected at `child_index`.
    pub(crate) fn type_check(
        opcode_pc: u32,
        child_pc: u32,
        opcode: &'static str,
        child_index: usize,
        expected: ValueType,
        actual: ValueType,
    ) -> Self {
        Self::new(
            DecodeErrorKind::TypeCheck,
            opcode_pc,
            crate::alloc::format!(
                "{opcode}: child {child_index} expected type {expected}, found {actual}"
            ),
        )
        .with_pt(child_pc)
    }
}
