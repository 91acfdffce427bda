//! Bytecode assembler, recording [`Builder`], and a configurable
//! [`FunctionEnvironment`] for exercising the decoder against hand-built
//! function bodies.
//!
//! Gated behind `test-helpers` (on by default for this crate's own tests,
//! and available to downstream crates the same way `fuel-tx`'s
//! `test_helper` module is): real production code never links this module.

use crate::alloc::{String, Vec};
use crate::builder::Builder;
use crate::function_env::{FunctionEnvironment, FunctionSignature};
use decode_asm::{MemType, Opcode, ValueType};

/// A growable byte buffer for assembling one function body, opcode by
/// opcode, in the same prefix order the decoder reads: a parent's opcode
/// (and its own fixed operand bytes) precede its children's bytes.
#[derive(Debug, Clone, Default)]
pub struct Program(Vec<u8>);

impl Program {
    /// An empty body.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// The assembled bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    fn op(mut self, op: Opcode) -> Self {
        self.0.push(op as u8);
        self
    }

    fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }

    fn leb128(mut self, mut v: u64) -> Self {
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            self.0.push(byte);
            if v == 0 {
                break;
            }
        }
        self
    }

    /// Append another assembled fragment (e.g. a child subexpression) after this one.
    pub fn then(mut self, other: Program) -> Self {
        self.0.extend_from_slice(&other.0);
        self
    }

    /// Append raw bytes verbatim (e.g. a deliberately malformed tail).
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.0.extend_from_slice(bytes);
        self
    }

    pub fn nop(self) -> Self {
        self.op(Opcode::Nop)
    }

    pub fn ret(self) -> Self {
        self.op(Opcode::Return)
    }

    pub fn i32_const(self, v: i32) -> Self {
        self.op(Opcode::I32Const).raw(&v.to_le_bytes())
    }

    pub fn i32_const8(self, v: i8) -> Self {
        self.op(Opcode::I32Const8).raw(&v.to_le_bytes())
    }

    pub fn i64_const(self, v: i64) -> Self {
        self.op(Opcode::I64Const).raw(&v.to_le_bytes())
    }

    pub fn f32_const(self, v: f32) -> Self {
        self.op(Opcode::F32Const).raw(&v.to_le_bytes())
    }

    pub fn f64_const(self, v: f64) -> Self {
        self.op(Opcode::F64Const).raw(&v.to_le_bytes())
    }

    pub fn get_local(self, k: u32) -> Self {
        self.op(Opcode::GetLocal).leb128(k as u64)
    }

    pub fn set_local(self, k: u32) -> Self {
        self.op(Opcode::SetLocal).leb128(k as u64)
    }

    pub fn load_global(self, k: u32) -> Self {
        self.op(Opcode::LoadGlobal).leb128(k as u64)
    }

    pub fn store_global(self, k: u32) -> Self {
        self.op(Opcode::StoreGlobal).leb128(k as u64)
    }

    pub fn block(self, n: u8) -> Self {
        self.op(Opcode::Block).u8(n)
    }

    pub fn loop_(self, n: u8) -> Self {
        self.op(Opcode::Loop).u8(n)
    }

    pub fn if_(self) -> Self {
        self.op(Opcode::If)
    }

    pub fn if_then(self) -> Self {
        self.op(Opcode::IfThen)
    }

    pub fn ternary(self) -> Self {
        self.op(Opcode::Ternary)
    }

    pub fn comma(self) -> Self {
        self.op(Opcode::Comma)
    }

    pub fn break_(self, d: u8) -> Self {
        self.op(Opcode::Break).u8(d)
    }

    pub fn continue_(self, d: u8) -> Self {
        self.op(Opcode::Continue).u8(d)
    }

    pub fn switch(self, n: u8) -> Self {
        self.op(Opcode::Switch).u8(n)
    }

    pub fn switch_nf(self, n: u8) -> Self {
        self.op(Opcode::SwitchNf).u8(n)
    }

    pub fn call_function(self, k: u32) -> Self {
        self.op(Opcode::CallFunction).leb128(k as u64)
    }

    pub fn call_indirect(self, k: u32) -> Self {
        self.op(Opcode::CallIndirect).leb128(k as u64)
    }

    pub fn load_mem_l(self, mem: u8) -> Self {
        self.op(Opcode::LoadMemL).u8(mem)
    }

    pub fn load_mem_h(self, mem: u8) -> Self {
        self.op(Opcode::LoadMemH).u8(mem)
    }

    pub fn store_mem_l(self, mem: u8) -> Self {
        self.op(Opcode::StoreMemL).u8(mem)
    }

    pub fn store_mem_h(self, mem: u8) -> Self {
        self.op(Opcode::StoreMemH).u8(mem)
    }

    pub fn binop(self, op: Opcode) -> Self {
        self.op(op)
    }

    pub fn unop(self, op: Opcode) -> Self {
        self.op(op)
    }
}

/// A `FunctionEnvironment` built up by hand for a single test body: fixed
/// signature, flat local types (parameters first), and lookup tables for
/// globals, directly-callable functions, and indirect-call signatures.
#[derive(Debug, Clone, Default)]
pub struct TestEnv {
    signature: FunctionSignature,
    locals: Vec<ValueType>,
    globals: Vec<ValueType>,
    functions: Vec<FunctionSignature>,
    table: Vec<FunctionSignature>,
}

impl TestEnv {
    /// A function with the given parameter/return types and no declared locals.
    pub fn new(params: &[ValueType], returns: &[ValueType]) -> Self {
        let signature = FunctionSignature {
            params: params.to_vec(),
            returns: returns.to_vec(),
        };
        let locals = signature.params.clone();
        Self {
            signature,
            locals,
            globals: Vec::new(),
            functions: Vec::new(),
            table: Vec::new(),
        }
    }

    /// Append one more declared local of type `ty`, after parameters and
    /// any previously declared locals.
    pub fn with_local(mut self, ty: ValueType) -> Self {
        self.locals.push(ty);
        self
    }

    /// Register global `globals().len()` with value type `ty`.
    pub fn with_global(mut self, ty: ValueType) -> Self {
        self.globals.push(ty);
        self
    }

    /// Register a directly-callable function with the given signature.
    pub fn with_function(mut self, params: &[ValueType], returns: &[ValueType]) -> Self {
        self.functions.push(FunctionSignature {
            params: params.to_vec(),
            returns: returns.to_vec(),
        });
        self
    }

    /// Register an indirect-call-table signature.
    pub fn with_table_signature(mut self, params: &[ValueType], returns: &[ValueType]) -> Self {
        self.table.push(FunctionSignature {
            params: params.to_vec(),
            returns: returns.to_vec(),
        });
        self
    }
}

impl FunctionEnvironment for TestEnv {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn total_locals(&self) -> u32 {
        self.locals.len() as u32
    }

    fn local_type(&self, index: u32) -> Option<ValueType> {
        self.locals.get(index as usize).copied()
    }

    fn is_valid_global(&self, index: u32) -> bool {
        (index as usize) < self.globals.len()
    }

    fn global_type(&self, index: u32) -> Option<ValueType> {
        self.globals.get(index as usize).copied()
    }

    fn is_valid_function(&self, index: u32) -> bool {
        (index as usize) < self.functions.len()
    }

    fn function_signature(&self, index: u32) -> Option<&FunctionSignature> {
        self.functions.get(index as usize)
    }

    fn function_table_signature(&self, index: u32) -> Option<&FunctionSignature> {
        self.table.get(index as usize)
    }
}

/// One IR node recorded by [`RecordingBuilder`], tagged with enough shape
/// to assert graph structure in tests without a real codegen backend.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOp {
    StartControl,
    StartEffect,
    Param(u32, ValueType),
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),
    Unop(Opcode, u32),
    Binop(Opcode, u32, u32),
    LoadMem(MemType, u32),
    StoreMem(MemType, u32, u32),
    LoadGlobal(u32),
    StoreGlobal(u32, u32),
    CallDirect(u32, Vec<u32>),
    CallIndirect(u32, Vec<u32>),
    BranchTrue { control: u32, cond: u32 },
    BranchFalse { control: u32, cond: u32 },
    Merge(Vec<u32>),
    EffectPhi { merge: u32, effects: Vec<u32> },
    Phi { merge: u32, ty: ValueType, values: Vec<u32> },
    LoopHeader(u32),
    Terminate { effect: u32, control: u32 },
    Error,
}

/// A [`Builder`] that records every constructed node instead of lowering to
/// a real graph, so tests can assert on shape (e.g. "the return value is a
/// `Binop(Add, Param(0), Param(1))`") without depending on a downstream
/// codegen crate.
#[derive(Debug, Default)]
pub struct RecordingBuilder {
    /// Every node built so far, indexed by its `u32` handle.
    pub nodes: Vec<NodeOp>,
    /// Each `Builder::ret` call's argument list, in call order.
    pub returns: Vec<Vec<u32>>,
    /// Count of `Builder::return_void` calls.
    pub return_void_calls: u32,
}

impl RecordingBuilder {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: NodeOp) -> u32 {
        self.nodes.push(node);
        (self.nodes.len() - 1) as u32
    }

    /// Borrow a previously recorded node by handle.
    pub fn get(&self, id: u32) -> &NodeOp {
        &self.nodes[id as usize]
    }
}

impl Builder for RecordingBuilder {
    type Node = u32;

    fn start(&mut self, _locals_count: u32) {}

    fn start_control(&mut self) -> Self::Node {
        self.push(NodeOp::StartControl)
    }

    fn start_effect(&mut self) -> Self::Node {
        self.push(NodeOp::StartEffect)
    }

    fn param(&mut self, index: u32, ty: ValueType) -> Self::Node {
        self.push(NodeOp::Param(index, ty))
    }

    fn int32_constant(&mut self, value: i32) -> Self::Node {
        self.push(NodeOp::I32Const(value))
    }

    fn int64_constant(&mut self, value: i64) -> Self::Node {
        self.push(NodeOp::I64Const(value))
    }

    fn float32_constant(&mut self, value: f32) -> Self::Node {
        self.push(NodeOp::F32Const(value))
    }

    fn float64_constant(&mut self, value: f64) -> Self::Node {
        self.push(NodeOp::F64Const(value))
    }

    fn unop(&mut self, op: Opcode, a: Self::Node) -> Self::Node {
        self.push(NodeOp::Unop(op, a))
    }

    fn binop(&mut self, op: Opcode, a: Self::Node, b: Self::Node) -> Self::Node {
        self.push(NodeOp::Binop(op, a, b))
    }

    fn load_mem(&mut self, mem: MemType, addr: Self::Node) -> Self::Node {
        self.push(NodeOp::LoadMem(mem, addr))
    }

    fn store_mem(&mut self, mem: MemType, addr: Self::Node, value: Self::Node) -> Self::Node {
        self.push(NodeOp::StoreMem(mem, addr, value));
        value
    }

    fn load_global(&mut self, index: u32) -> Self::Node {
        self.push(NodeOp::LoadGlobal(index))
    }

    fn store_global(&mut self, index: u32, value: Self::Node) -> Self::Node {
        self.push(NodeOp::StoreGlobal(index, value));
        value
    }

    fn call_direct(&mut self, index: u32, args: &[Self::Node]) -> Self::Node {
        self.push(NodeOp::CallDirect(index, args.to_vec()))
    }

    fn call_indirect(&mut self, index: u32, args: &[Self::Node]) -> Self::Node {
        self.push(NodeOp::CallIndirect(index, args.to_vec()))
    }

    fn branch(&mut self, cond: Self::Node, control: Self::Node) -> (Self::Node, Self::Node) {
        let t = self.push(NodeOp::BranchTrue { control, cond });
        let f = self.push(NodeOp::BranchFalse { control, cond });
        (t, f)
    }

    fn merge(&mut self, ctrls: &[Self::Node]) -> Self::Node {
        self.push(NodeOp::Merge(ctrls.to_vec()))
    }

    fn append_to_merge(&mut self, merge: Self::Node, ctrl: Self::Node) {
        if let NodeOp::Merge(ctrls) = &mut self.nodes[merge as usize] {
            ctrls.push(ctrl);
        } else {
            panic!("append_to_merge on a non-merge node");
        }
    }

    fn effect_phi(&mut self, effects: &[Self::Node], merge: Self::Node) -> Self::Node {
        self.push(NodeOp::EffectPhi {
            merge,
            effects: effects.to_vec(),
        })
    }

    fn phi(&mut self, ty: ValueType, values: &[Self::Node], merge: Self::Node) -> Self::Node {
        self.push(NodeOp::Phi {
            merge,
            ty,
            values: values.to_vec(),
        })
    }

    fn is_phi_with_merge(&self, node: Self::Node, merge: Self::Node) -> bool {
        match &self.nodes[node as usize] {
            NodeOp::Phi { merge: m, .. } | NodeOp::EffectPhi { merge: m, .. } => *m == merge,
            _ => false,
        }
    }

    fn append_to_phi(&mut self, _merge: Self::Node, phi: Self::Node, value: Self::Node) {
        match &mut self.nodes[phi as usize] {
            NodeOp::Phi { values, .. } => values.push(value),
            NodeOp::EffectPhi { effects, .. } => effects.push(value),
            _ => panic!("append_to_phi on a non-phi node"),
        }
    }

    fn input_count(&self, merge: Self::Node) -> usize {
        match &self.nodes[merge as usize] {
            NodeOp::Merge(ctrls) => ctrls.len(),
            _ => panic!("input_count on a non-merge node"),
        }
    }

    fn loop_header(&mut self, control: Self::Node) -> Self::Node {
        self.push(NodeOp::LoopHeader(control))
    }

    fn terminate(&mut self, effect: Self::Node, control: Self::Node) -> Self::Node {
        self.push(NodeOp::Terminate { effect, control })
    }

    fn ret(&mut self, values: &[Self::Node]) {
        self.returns.push(values.to_vec());
    }

    fn return_void(&mut self) {
        self.return_void_calls += 1;
    }

    fn error(&mut self) -> Self::Node {
        self.push(NodeOp::Error)
    }
}

/// Shorthand used by tests/benches that only need a human-readable
/// description of a [`crate::error::DecodeError`], e.g. for `assert!`
/// failure messages.
pub fn describe(err: &crate::error::DecodeError) -> String {
    crate::alloc::format!("{err}")
}
