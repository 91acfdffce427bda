use crate::{Opcode, ValueType};

/// Fixed parameter/return types for a signature-driven opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Expected type of each child, in order.
    pub params: &'static [ValueType],
    /// Type produced by the completed expression.
    pub ret: ValueType,
}

impl Signature {
    /// Number of children this opcode shifts.
    pub const fn arity(&self) -> usize {
        self.params.len()
    }

    /// Expected type of child `index` (0-based).
    pub fn param(&self, index: usize) -> ValueType {
        self.params[index]
    }
}

macro_rules! binop {
    ($t:expr) => {
        Signature {
            params: &[$t, $t],
            ret: $t,
        }
    };
}

macro_rules! cmp {
    ($t:expr) => {
        Signature {
            params: &[$t, $t],
            ret: ValueType::I32,
        }
    };
}

macro_rules! unop {
    ($from:expr, $to:expr) => {
        Signature {
            params: &[$from],
            ret: $to,
        }
    };
}

/// Static signature for every non-structural ("signature-driven") opcode.
///
/// Structural opcodes (`Block`, `If`, `Return`, ...) have no entry here —
/// the decoder's shift–reduce engine determines their arity and operand
/// types from their own Reduce policy instead.
pub fn signature_of(op: Opcode) -> Option<Signature> {
    use ValueType::{F32, F64, I32, I64};
    Some(match op {
        Opcode::I32Add => binop!(I32),
        Opcode::I32Sub => binop!(I32),
        Opcode::I32Mul => binop!(I32),
        Opcode::I32DivS => binop!(I32),
        Opcode::I32Eq => cmp!(I32),
        Opcode::I32LtS => cmp!(I32),
        Opcode::I32Eqz => unop!(I32, I32),

        Opcode::I64Add => binop!(I64),
        Opcode::I64Sub => binop!(I64),
        Opcode::I64Mul => binop!(I64),
        Opcode::I64DivS => binop!(I64),
        Opcode::I64Eq => cmp!(I64),
        Opcode::I64LtS => cmp!(I64),
        Opcode::I64Eqz => unop!(I64, I32),

        Opcode::F32Add => binop!(F32),
        Opcode::F32Sub => binop!(F32),
        Opcode::F32Mul => binop!(F32),
        Opcode::F32Div => binop!(F32),
        Opcode::F32Eq => cmp!(F32),
        Opcode::F32Lt => cmp!(F32),
        Opcode::F32Neg => unop!(F32, F32),

        Opcode::F64Add => binop!(F64),
        Opcode::F64Sub => binop!(F64),
        Opcode::F64Mul => binop!(F64),
        Opcode::F64Div => binop!(F64),
        Opcode::F64Eq => cmp!(F64),
        Opcode::F64Lt => cmp!(F64),
        Opcode::F64Neg => unop!(F64, F64),

        Opcode::I32WrapI64 => unop!(I64, I32),
        Opcode::I64ExtendI32S => unop!(I32, I64),
        Opcode::I32TruncF32S => unop!(F32, I32),
        Opcode::I32TruncF64S => unop!(F64, I32),
        Opcode::I64TruncF32S => unop!(F32, I64),
        Opcode::I64TruncF64S => unop!(F64, I64),
        Opcode::F32ConvertI32S => unop!(I32, F32),
        Opcode::F32ConvertI64S => unop!(I64, F32),
        Opcode::F64ConvertI32S => unop!(I32, F64),
        Opcode::F64ConvertI64S => unop!(I64, F64),
        Opcode::F32DemoteF64 => unop!(F64, F32),
        Opcode::F64PromoteF32 => unop!(F32, F64),

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_non_structural_opcode_has_a_signature() {
        for byte in 0u8..=0xff {
            let Some(op) = Opcode::from_byte(byte) else {
                continue;
            };
            assert_eq!(
                signature_of(op).is_some(),
                !op.is_structural(),
                "opcode {} signature/structural mismatch",
                op.name()
            );
        }
    }

    #[test]
    fn binops_take_two_matching_operands_and_return_same_type() {
        let sig = signature_of(Opcode::I32Add).unwrap();
        assert_eq!(sig.arity(), 2);
        assert_eq!(sig.param(0), ValueType::I32);
        assert_eq!(sig.param(1), ValueType::I32);
        assert_eq!(sig.ret, ValueType::I32);
    }

    #[test]
    fn comparisons_always_return_i32() {
        let sig = signature_of(Opcode::F64Eq).unwrap();
        assert_eq!(sig.ret, ValueType::I32);
    }
}
