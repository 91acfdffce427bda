use core::fmt;

/// The type carried by a decoded [`Tree`](https://docs.rs/decode-core) node.
///
/// `Stmt` is the "no value" marker used for effectful statements and empty
/// blocks — it is not a runtime representation, only a type-checking
/// placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueType {
    /// No value; used for statements and empty blocks.
    Stmt,
    /// 32-bit signed/unsigned integer.
    I32,
    /// 64-bit signed/unsigned integer.
    I64,
    /// 32-bit IEEE-754 float.
    F32,
    /// 64-bit IEEE-754 float.
    F64,
}

impl ValueType {
    /// Short mnemonic used in diagnostic messages (`i32`, `f64`, `stmt`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Stmt => "stmt",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Whether a local/global/parameter may legally declare this type.
    ///
    /// `Stmt` is a decoder-internal marker and never a declarable type.
    pub const fn is_storable(self) -> bool {
        !matches!(self, Self::Stmt)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
