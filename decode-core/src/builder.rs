//! External collaborator the decoder drives but never constructs itself: the
//! IR builder. Opcode-specific node shapes, memory operations, calls, phis
//! and merges are the builder's problem; the core only invokes the
//! operations below and type-checks what comes back.

use decode_asm::{MemType, Opcode, ValueType};

/// Factory for IR graph nodes.
///
/// A `Builder` whose underlying graph is absent (see [`NullBuilder`]) must
/// accept every call as a no-op returning a sentinel handle — that is
/// "verify only" mode, and it is the reason every method here takes `&mut
/// self` rather than consuming it: the decoder drives one builder instance
/// across an entire function body.
pub trait Builder {
    /// Opaque handle to a constructed node (value, control, or effect).
    type Node: Copy + PartialEq + core::fmt::Debug;

    /// Called once, before decoding starts, with the function's total local count.
    fn start(&mut self, locals_count: u32);
    /// The initial control node entering the function body.
    fn start_control(&mut self) -> Self::Node;
    /// The initial effect node entering the function body.
    fn start_effect(&mut self) -> Self::Node;

    /// Materializes parameter `index` of declared type `ty`.
    fn param(&mut self, index: u32, ty: ValueType) -> Self::Node;
    /// A 32-bit integer constant.
    fn int32_constant(&mut self, value: i32) -> Self::Node;
    /// A 64-bit integer constant.
    fn int64_constant(&mut self, value: i64) -> Self::Node;
    /// A 32-bit float constant.
    fn float32_constant(&mut self, value: f32) -> Self::Node;
    /// A 64-bit float constant.
    fn float64_constant(&mut self, value: f64) -> Self::Node;

    /// A signature-driven unary operator.
    fn unop(&mut self, op: Opcode, a: Self::Node) -> Self::Node;
    /// A signature-driven binary operator.
    fn binop(&mut self, op: Opcode, a: Self::Node, b: Self::Node) -> Self::Node;

    /// A typed memory load.
    fn load_mem(&mut self, mem: MemType, addr: Self::Node) -> Self::Node;
    /// A typed memory store; returns the stored value's node (stores compose
    /// as expressions, so `store` can itself feed another expression).
    fn store_mem(&mut self, mem: MemType, addr: Self::Node, value: Self::Node) -> Self::Node;
    /// Reads global `index`.
    fn load_global(&mut self, index: u32) -> Self::Node;
    /// Writes global `index`; returns the stored value's node.
    fn store_global(&mut self, index: u32, value: Self::Node) -> Self::Node;

    /// A direct call to function `index`.
    fn call_direct(&mut self, index: u32, args: &[Self::Node]) -> Self::Node;
    /// An indirect call through function-table entry `index`; `args[0]` is
    /// the dispatch key, the remainder are the call arguments.
    fn call_indirect(&mut self, index: u32, args: &[Self::Node]) -> Self::Node;

    /// Splits `control` into a `(true, false)` pair of control edges guarded by `cond`.
    fn branch(&mut self, cond: Self::Node, control: Self::Node) -> (Self::Node, Self::Node);
    /// Builds a merge node over `n` control inputs.
    fn merge(&mut self, ctrls: &[Self::Node]) -> Self::Node;
    /// Extends an existing merge with one more control input.
    fn append_to_merge(&mut self, merge: Self::Node, ctrl: Self::Node);
    /// Builds an effect phi over `effects`, attached to `merge`.
    fn effect_phi(&mut self, effects: &[Self::Node], merge: Self::Node) -> Self::Node;
    /// Builds a value phi of type `ty` over `values`, attached to `merge`.
    fn phi(&mut self, ty: ValueType, values: &[Self::Node], merge: Self::Node) -> Self::Node;
    /// Whether `node` is a phi already attached to `merge` (as opposed to a
    /// plain value shared identically across all of `merge`'s predecessors).
    fn is_phi_with_merge(&self, node: Self::Node, merge: Self::Node) -> bool;
    /// Extends an existing phi on `merge` with one more input.
    fn append_to_phi(&mut self, merge: Self::Node, phi: Self::Node, value: Self::Node);
    /// Current input count of `merge`.
    fn input_count(&self, merge: Self::Node) -> usize;

    /// Wraps `control` as a loop header.
    fn loop_header(&mut self, control: Self::Node) -> Self::Node;
    /// Attaches a terminator carrying `effect` to a loop header `control`.
    fn terminate(&mut self, effect: Self::Node, control: Self::Node) -> Self::Node;

    /// Emits a `return` with `values`.
    fn ret(&mut self, values: &[Self::Node]);
    /// Emits a `return` with no values.
    fn return_void(&mut self);

    /// Placeholder node for an operand that failed to decode; used so a
    /// Reduce step can still produce *a* node and let the caller inspect
    /// the latched [`crate::error::DecodeError`] instead of panicking.
    fn error(&mut self) -> Self::Node;
}

/// Sentinel handle for [`NullBuilder`]: every call is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sentinel;

/// A [`Builder`] with no underlying graph: verify-only mode.
///
/// Every method is a no-op returning [`Sentinel`]. Because `Sentinel` is a
/// unit type, every node handle compares equal to every other, so the
/// decoder's "values differ across predecessors" phi-parsimony check never
/// fires under `NullBuilder` — correct, since there is no graph whose phi
/// count could be inspected; the decoder's accept/reject behavior and type
/// checking are unaffected.
#[derive(Debug, Default)]
pub struct NullBuilder;

impl Builder for NullBuilder {
    type Node = Sentinel;

    fn start(&mut self, _locals_count: u32) {}
    fn start_control(&mut self) -> Self::Node {
        Sentinel
    }
    fn start_effect(&mut self) -> Self::Node {
        Sentinel
    }
    fn param(&mut self, _index: u32, _ty: ValueType) -> Self::Node {
        Sentinel
    }
    fn int32_constant(&mut self, _value: i32) -> Self::Node {
        Sentinel
    }
    fn int64_constant(&mut self, _value: i64) -> Self::Node {
        Sentinel
    }
    fn float32_constant(&mut self, _value: f32) -> Self::Node {
        Sentinel
    }
    fn float64_constant(&mut self, _value: f64) -> Self::Node {
        Sentinel
    }
    fn unop(&mut self, _op: Opcode, _a: Self::Node) -> Self::Node {
        Sentinel
    }
    fn binop(&mut self, _op: Opcode, _a: Self::Node, _b: Self::Node) -> Self::Node {
        Sentinel
    }
    fn load_mem(&mut self, _mem: MemType, _addr: Self::Node) -> Self::Node {
        Sentinel
    }
    fn store_mem(&mut self, _mem: MemType, _addr: Self::Node, _value: Self::Node) -> Self::Node {
        Sentinel
    }
    fn load_global(&mut self, _index: u32) -> Self::Node {
        Sentinel
    }
    fn store_global(&mut self, _index: u32, _value: Self::Node) -> Self::Node {
        Sentinel
    }
    fn call_direct(&mut self, _index: u32, _args: &[Self::Node]) -> Self::Node {
        Sentinel
    }
    fn call_indirect(&mut self, _index: u32, _args: &[Self::Node]) -> Self::Node {
        Sentinel
    }
    fn branch(&mut self, _cond: Self::Node, _control: Self::Node) -> (Self::Node, Self::Node) {
        (Sentinel, Sentinel)
    }
    fn merge(&mut self, _ctrls: &[Self::Node]) -> Self::Node {
        Sentinel
    }
    fn append_to_merge(&mut self, _merge: Self::Node, _ctrl: Self::Node) {}
    fn effect_phi(&mut self, _effects: &[Self::Node], _merge: Self::Node) -> Self::Node {
        Sentinel
    }
    fn phi(&mut self, _ty: ValueType, _values: &[Self::Node], _merge: Self::Node) -> Self::Node {
        Sentinel
    }
    fn is_phi_with_merge(&self, _node: Self::Node, _merge: Self::Node) -> bool {
        false
    }
    fn append_to_phi(&mut self, _merge: Self::Node, _phi: Self::Node, _value: Self::Node) {}
    fn input_count(&self, _merge: Self::Node) -> usize {
        0
    }
    fn loop_header(&mut self, _control: Self::Node) -> Self::Node {
        Sentinel
    }
    fn terminate(&mut self, _effect: Self::Node, _control: Self::Node) -> Self::Node {
        Sentinel
    }
    fn ret(&mut self, _values: &[Self::Node]) {}
    fn return_void(&mut self) {}
    fn error(&mut self) -> Self::Node {
        Sentinel
    }
}
