/// Byte representation of an opcode.
///
/// Two dispatch classes, per the decoder's shift–reduce engine:
///
/// - **Signature-driven** opcodes (arithmetic, comparisons, conversions)
///   have a fixed arity and fixed per-operand types looked up in
///   [`crate::signature_of`]; the decoder shifts a production of that
///   arity and never special-cases them beyond the signature check.
/// - **Structural** opcodes (`Block`, `Loop`, `If`, ...) are dispatched
///   explicitly by the engine; their arity may depend on an operand
///   (`Block`/`Loop`'s child count, `Switch`'s case count) or on the
///   enclosing function signature (`Return`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[non_exhaustive]
pub enum Opcode {
    /// Emits a `stmt`-typed leaf; has no effect.
    Nop = 0x00,
    /// `block n`: `n` children in sequence; falls through to the frame's
    /// break environment at structural end.
    Block = 0x01,
    /// `loop n`: `n` children, re-entered on every `continue`.
    Loop = 0x02,
    /// `if` (2 children: cond, body). No value.
    If = 0x03,
    /// `if-then` (3 children: cond, then, else). No value; joins the
    /// then-exit and false edge back into one environment. See `Ternary`
    /// for the value-producing form.
    IfThen = 0x04,
    /// `break d`: `d` is a one-byte block-nesting depth.
    Break = 0x05,
    /// `continue d`: `d` is a one-byte block-nesting depth; target must be a loop.
    Continue = 0x06,
    /// `switch n` (n+1 children: key, n cases); falls through between cases.
    Switch = 0x07,
    /// `switch-nf n`: like `switch`, but a case that doesn't break falls
    /// through to the break environment instead of the next case.
    SwitchNf = 0x08,
    /// Arity equals the function's declared return count.
    Return = 0x09,
    /// `ternary` (3 children: cond, then-expr, else-expr); always value-producing.
    Ternary = 0x0a,
    /// `comma` (2 children); result is the right child's type and value.
    Comma = 0x0b,
    /// Reads local `k` (LEB128); arity 0.
    GetLocal = 0x0c,
    /// Writes local `k` (LEB128); one child, also yields the child's value.
    SetLocal = 0x0d,
    /// Reads global `k` (LEB128); arity 0.
    LoadGlobal = 0x0e,
    /// Writes global `k` (LEB128); one child, also yields the child's value.
    StoreGlobal = 0x0f,
    /// Loads from memory with an `i32` address.
    LoadMemL = 0x10,
    /// Loads from memory with an `i64` address.
    LoadMemH = 0x11,
    /// Stores to memory with an `i32` address.
    StoreMemL = 0x12,
    /// Stores to memory with an `i64` address.
    StoreMemH = 0x13,
    /// Calls function `k` (LEB128) directly.
    CallFunction = 0x14,
    /// Calls through function-table index `k` (LEB128); first child is the dispatch index.
    CallIndirect = 0x15,
    /// 4-byte little-endian `i32` immediate.
    I32Const = 0x16,
    /// 1-byte sign-extended `i32` immediate.
    I32Const8 = 0x17,
    /// 8-byte little-endian `i64` immediate.
    I64Const = 0x18,
    /// 4-byte little-endian `f32` immediate.
    F32Const = 0x19,
    /// 8-byte little-endian `f64` immediate.
    F64Const = 0x1a,

    /// `$rA = $rB + $rC` over `i32`.
    I32Add = 0x20,
    I32Sub = 0x21,
    I32Mul = 0x22,
    I32DivS = 0x23,
    I32Eq = 0x24,
    I32LtS = 0x25,
    I32Eqz = 0x26,

    I64Add = 0x30,
    I64Sub = 0x31,
    I64Mul = 0x32,
    I64DivS = 0x33,
    I64Eq = 0x34,
    I64LtS = 0x35,
    I64Eqz = 0x36,

    F32Add = 0x40,
    F32Sub = 0x41,
    F32Mul = 0x42,
    F32Div = 0x43,
    F32Eq = 0x44,
    F32Lt = 0x45,
    F32Neg = 0x46,

    F64Add = 0x50,
    F64Sub = 0x51,
    F64Mul = 0x52,
    F64Div = 0x53,
    F64Eq = 0x54,
    F64Lt = 0x55,
    F64Neg = 0x56,

    /// Wraps an `i64` down to `i32`, discarding the high bits.
    I32WrapI64 = 0x60,
    /// Sign-extends an `i32` up to `i64`.
    I64ExtendI32S = 0x61,
    I32TruncF32S = 0x62,
    I32TruncF64S = 0x63,
    I64TruncF32S = 0x64,
    I64TruncF64S = 0x65,
    F32ConvertI32S = 0x66,
    F32ConvertI64S = 0x67,
    F64ConvertI32S = 0x68,
    F64ConvertI64S = 0x69,
    F32DemoteF64 = 0x6a,
    F64PromoteF32 = 0x6b,
}

impl Opcode {
    /// Decode a raw opcode byte, or `None` if it isn't assigned.
    pub fn from_byte(byte: u8) -> Option<Self> {
        // A match over every discriminant; kept as one block rather than a
        // generated table since the decoder needs exhaustiveness checked by
        // the compiler whenever a variant is added.
        Some(match byte {
            0x00 => Self::Nop,
            0x01 => Self::Block,
            0x02 => Self::Loop,
            0x03 => Self::If,
            0x04 => Self::IfThen,
            0x05 => Self::Break,
            0x06 => Self::Continue,
            0x07 => Self::Switch,
            0x08 => Self::SwitchNf,
            0x09 => Self::Return,
            0x0a => Self::Ternary,
            0x0b => Self::Comma,
            0x0c => Self::GetLocal,
            0x0d => Self::SetLocal,
            0x0e => Self::LoadGlobal,
            0x0f => Self::StoreGlobal,
            0x10 => Self::LoadMemL,
            0x11 => Self::LoadMemH,
            0x12 => Self::StoreMemL,
            0x13 => Self::StoreMemH,
            0x14 => Self::CallFunction,
            0x15 => Self::CallIndirect,
            0x16 => Self::I32Const,
            0x17 => Self::I32Const8,
            0x18 => Self::I64Const,
            0x19 => Self::F32Const,
            0x1a => Self::F64Const,
            0x20 => Self::I32Add,
            0x21 => Self::I32Sub,
            0x22 => Self::I32Mul,
            0x23 => Self::I32DivS,
            0x24 => Self::I32Eq,
            0x25 => Self::I32LtS,
            0x26 => Self::I32Eqz,
            0x30 => Self::I64Add,
            0x31 => Self::I64Sub,
            0x32 => Self::I64Mul,
            0x33 => Self::I64DivS,
            0x34 => Self::I64Eq,
            0x35 => Self::I64LtS,
            0x36 => Self::I64Eqz,
            0x40 => Self::F32Add,
            0x41 => Self::F32Sub,
            0x42 => Self::F32Mul,
            0x43 => Self::F32Div,
            0x44 => Self::F32Eq,
            0x45 => Self::F32Lt,
            0x46 => Self::F32Neg,
            0x50 => Self::F64Add,
            0x51 => Self::F64Sub,
            0x52 => Self::F64Mul,
            0x53 => Self::F64Div,
            0x54 => Self::F64Eq,
            0x55 => Self::F64Lt,
            0x56 => Self::F64Neg,
            0x60 => Self::I32WrapI64,
            0x61 => Self::I64ExtendI32S,
            0x62 => Self::I32TruncF32S,
            0x63 => Self::I32TruncF64S,
            0x64 => Self::I64TruncF32S,
            0x65 => Self::I64TruncF64S,
            0x66 => Self::F32ConvertI32S,
            0x67 => Self::F32ConvertI64S,
            0x68 => Self::F64ConvertI32S,
            0x69 => Self::F64ConvertI64S,
            0x6a => Self::F32DemoteF64,
            0x6b => Self::F64PromoteF32,
            _ => return None,
        })
    }

    /// Mnemonic used in diagnostic messages and tests.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Block => "block",
            Self::Loop => "loop",
            Self::If => "if",
            Self::IfThen => "if-then",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Switch => "switch",
            Self::SwitchNf => "switch-nf",
            Self::Return => "return",
            Self::Ternary => "ternary",
            Self::Comma => "comma",
            Self::GetLocal => "get-local",
            Self::SetLocal => "set-local",
            Self::LoadGlobal => "load-global",
            Self::StoreGlobal => "store-global",
            Self::LoadMemL => "load-mem-l",
            Self::LoadMemH => "load-mem-h",
            Self::StoreMemL => "store-mem-l",
            Self::StoreMemH => "store-mem-h",
            Self::CallFunction => "call-function",
            Self::CallIndirect => "call-indirect",
            Self::I32Const => "i32.const",
            Self::I32Const8 => "i32.const8",
            Self::I64Const => "i64.const",
            Self::F32Const => "f32.const",
            Self::F64Const => "f64.const",
            Self::I32Add => "i32.add",
            Self::I32Sub => "i32.sub",
            Self::I32Mul => "i32.mul",
            Self::I32DivS => "i32.div_s",
            Self::I32Eq => "i32.eq",
            Self::I32LtS => "i32.lt_s",
            Self::I32Eqz => "i32.eqz",
            Self::I64Add => "i64.add",
            Self::I64Sub => "i64.sub",
            Self::I64Mul => "i64.mul",
            Self::I64DivS => "i64.div_s",
            Self::I64Eq => "i64.eq",
            Self::I64LtS => "i64.lt_s",
            Self::I64Eqz => "i64.eqz",
            Self::F32Add => "f32.add",
            Self::F32Sub => "f32.sub",
            Self::F32Mul => "f32.mul",
            Self::F32Div => "f32.div",
            Self::F32Eq => "f32.eq",
            Self::F32Lt => "f32.lt",
            Self::F32Neg => "f32.neg",
            Self::F64Add => "f64.add",
            Self::F64Sub => "f64.sub",
            Self::F64Mul => "f64.mul",
            Self::F64Div => "f64.div",
            Self::F64Eq => "f64.eq",
            Self::F64Lt => "f64.lt",
            Self::F64Neg => "f64.neg",
            Self::I32WrapI64 => "i32.wrap_i64",
            Self::I64ExtendI32S => "i64.extend_i32_s",
            Self::I32TruncF32S => "i32.trunc_f32_s",
            Self::I32TruncF64S => "i32.trunc_f64_s",
            Self::I64TruncF32S => "i64.trunc_f32_s",
            Self::I64TruncF64S => "i64.trunc_f64_s",
            Self::F32ConvertI32S => "f32.convert_i32_s",
            Self::F32ConvertI64S => "f32.convert_i64_s",
            Self::F64ConvertI32S => "f64.convert_i32_s",
            Self::F64ConvertI64S => "f64.convert_i64_s",
            Self::F32DemoteF64 => "f32.demote_f64",
            Self::F64PromoteF32 => "f64.promote_f32",
        }
    }

    /// Whether this opcode is dispatched structurally rather than through
    /// [`crate::signature_of`].
    pub const fn is_structural(self) -> bool {
        matches!(
            self,
            Self::Nop
                | Self::Block
                | Self::Loop
                | Self::If
                | Self::IfThen
                | Self::Break
                | Self::Continue
                | Self::Switch
                | Self::SwitchNf
                | Self::Return
                | Self::Ternary
                | Self::Comma
                | Self::GetLocal
                | Self::SetLocal
                | Self::LoadGlobal
                | Self::StoreGlobal
                | Self::LoadMemL
                | Self::LoadMemH
                | Self::StoreMemL
                | Self::StoreMemH
                | Self::CallFunction
                | Self::CallIndirect
                | Self::I32Const
                | Self::I32Const8
                | Self::I64Const
                | Self::F32Const
                | Self::F64Const
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_variant_round_trips_through_from_byte_and_has_a_name() {
        for op in Opcode::iter() {
            assert_eq!(Opcode::from_byte(op as u8), Some(op));
            assert!(!op.name().is_empty());
        }
    }
}
