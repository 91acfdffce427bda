//! Shared wire-format data for the function-body decoder: value types,
//! memory access types, the opcode table and the static signature table
//! for simple arithmetic opcodes.
//!
//! This crate carries no control-flow logic — it is the "external data"
//! that `decode-core` consumes. A disassembler or an encoder for the same
//! bytecode would import this crate and nothing else.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

mod mem_type;
mod opcode;
mod signature;
mod value_type;

pub use mem_type::{MemType, MemTypeDecodeError};
pub use opcode::Opcode;
pub use signature::{signature_of, Signature};
pub use value_type::ValueType;
