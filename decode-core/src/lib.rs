//! Single-pass verifier and SSA-lowerer for one function body of a
//! stack-neutral, prefix-encoded bytecode.
//!
//! The same pass does both jobs: with a real [`Builder`](builder::Builder)
//! it lowers the body into a sea-of-nodes graph; with
//! [`NullBuilder`](builder::NullBuilder) it only verifies. The decoder does
//! not optimize, allocate executable memory, resolve imports or validate
//! module-level structure, and it halts on the first diagnostic rather than
//! attempting to recover.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

#[cfg(not(feature = "std"))]
extern crate alloc as alloc_crate;

pub mod arena;
pub mod builder;
pub mod decoder;
pub mod env;
pub mod error;
pub mod frame;
pub mod function_env;
pub mod reader;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testutil;

pub mod prelude {
    //! Convenient single-import surface for embedders.
    pub use crate::{
        arena::{Arena, Tree, TreeId},
        builder::{Builder, NullBuilder},
        decoder::{decode, Decoded},
        error::{DecodeError, DecodeErrorKind, Result},
        function_env::{FunctionEnvironment, FunctionSignature},
    };
    pub use decode_asm::{MemType, Opcode, ValueType};
}

#[cfg(not(feature = "std"))]
mod alloc {
    pub use alloc_crate::{format, string::String, string::ToString, vec, vec::Vec};
}

#[cfg(feature = "std")]
mod alloc {
    pub use std::{format, string::String, string::ToString, vec, vec::Vec};
}
