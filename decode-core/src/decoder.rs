//! Shift–reduce engine: walks the prefix-encoded byte stream with one
//! explicit production stack, fuses type-checking with SSA lowering, and
//! drives the block/if frame stacks and environment merges as constructs
//! close.
//!
//! The byte stream is prefix (Polish-notation) encoded, so a child's full
//! subexpression always follows its parent directly — one stack of
//! in-progress [`Production`]s is enough to bubble completed [`Tree`]s up to
//! their parent without true recursion.

use crate::alloc::{String, Vec};
use crate::arena::{Arena, Production, Tree, TreeId};
use crate::builder::Builder;
use crate::env::{self, Environment, State};
use crate::error::{DecodeError, DecodeErrorKind, Result};
use crate::frame::{BlockFrame, IfFrame};
use crate::function_env::FunctionEnvironment;
use crate::reader::Reader;
use decode_asm::{signature_of, Opcode, ValueType};

/// Every [`Tree`] one [`decode`] call produced, plus its top-level roots.
#[derive(Debug)]
pub struct Decoded<N> {
    /// Owns every tree allocated while decoding this body.
    pub arena: Arena<N>,
    /// Completed top-level trees, in source order.
    pub roots: Vec<TreeId>,
}

/// Verify one function body and, if `builder` has a real backing graph,
/// lower it into SSA form at the same time.
///
/// Returns the first latched [`DecodeError`] on failure; the decoder halts
/// at the first fault rather than attempting to recover and report more
/// than one.
#[tracing::instrument(skip_all, fields(len = code.len()))]
pub fn decode<B: Builder>(
    code: &[u8],
    function_env: &dyn FunctionEnvironment,
    builder: &mut B,
) -> Result<Decoded<B::Node>> {
    let mut decoder = Decoder::new(code, function_env, builder);
    decoder.run();
    decoder.finish()
}

struct Decoder<'a, B: Builder> {
    code: &'a [u8],
    reader: Reader<'a>,
    function_env: &'a dyn FunctionEnvironment,
    builder: &'a mut B,
    local_types: Vec<ValueType>,
    arena: Arena<B::Node>,
    stack: Vec<Production<B::Node>>,
    blocks: Vec<BlockFrame<B::Node>>,
    ifs: Vec<IfFrame<B::Node>>,
    trees: Vec<TreeId>,
    env: Environment<B::Node>,
    pc: u32,
    error: Option<DecodeError>,
}

impl<'a, B: Builder> Decoder<'a, B> {
    fn new(code: &'a [u8], function_env: &'a dyn FunctionEnvironment, builder: &'a mut B) -> Self {
        let total_locals = function_env.total_locals();
        let mut local_types = Vec::with_capacity(total_locals as usize);
        for i in 0..total_locals {
            local_types.push(
                function_env
                    .local_type(i)
                    .expect("total_locals bounds every valid index"),
            );
        }

        builder.start(total_locals);
        let mut env = Environment::split(None);
        env.control = Some(builder.start_control());
        env.effect = Some(builder.start_effect());

        let signature = function_env.signature();
        let mut locals = Vec::with_capacity(total_locals as usize);
        for (i, &ty) in signature.params.iter().enumerate() {
            locals.push(builder.param(i as u32, ty));
        }
        for &ty in &local_types[signature.params.len()..] {
            locals.push(Self::zero_constant(builder, ty));
        }
        env.locals = Some(locals);

        Self {
            reader: Reader::new(code),
            code,
            function_env,
            builder,
            local_types,
            arena: Arena::new(),
            stack: Vec::new(),
            blocks: Vec::new(),
            ifs: Vec::new(),
            trees: Vec::new(),
            env,
            pc: 0,
            error: None,
        }
    }

    fn zero_constant(builder: &mut B, ty: ValueType) -> B::Node {
        match ty {
            ValueType::I32 => builder.int32_constant(0),
            ValueType::I64 => builder.int64_constant(0),
            ValueType::F32 => builder.float32_constant(0.0),
            ValueType::F64 => builder.float64_constant(0.0),
            ValueType::Stmt => builder.error(),
        }
    }

    fn run(&mut self) {
        loop {
            if self.error.is_some() {
                return;
            }
            if self.reader.at_end(self.pc) {
                return;
            }
            if !self.env.is_reachable() {
                self.fail(
                    DecodeErrorKind::UnreachableCode,
                    self.pc,
                    String::from("statement reached while control is unreachable"),
                );
                return;
            }
            self.step();
        }
    }

    fn step(&mut self) {
        let pc = self.pc;
        let byte = self.code[pc as usize];
        let opcode = match Opcode::from_byte(byte) {
            Some(op) => op,
            None => {
                self.fail(
                    DecodeErrorKind::InvalidOpcode,
                    pc,
                    crate::alloc::format!("unrecognized opcode byte {byte:#04x}"),
                );
                return;
            }
        };
        tracing::trace!(pc, opcode = opcode.name(), "decoding opcode");

        if let Some(sig) = signature_of(opcode) {
            self.pc = pc + 1;
            self.stack.push(Production::new(pc, sig.arity()));
            if sig.arity() == 0 {
                // No currently-defined signature-driven opcode has arity 0;
                // handled anyway since the shift rule is generic.
                let prod = self.stack.pop().expect("just pushed");
                let tree = Tree {
                    ty: sig.ret,
                    pc,
                    node: None,
                    children: prod.children,
                };
                let id = self.arena.alloc(tree);
                self.complete(id);
            }
        } else {
            self.shift_structural(opcode, pc);
        }

        if self.error.is_none() {
            let limit = self.reader.limit();
            if self.pc > limit {
                self.fail(
                    DecodeErrorKind::BeyondEndOfCode,
                    pc,
                    String::from("pc advanced past end of code"),
                );
            }
        }
    }

    fn finish(mut self) -> Result<Decoded<B::Node>> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if self.env.is_reachable() {
            self.add_implicit_return_at_end();
            if let Some(err) = self.error.take() {
                return Err(err);
            }
        }
        Ok(Decoded {
            arena: self.arena,
            roots: self.trees,
        })
    }

    fn add_implicit_return_at_end(&mut self) {
        let sig = self.function_env.signature();
        let return_count = sig.return_count();
        if return_count == 0 {
            self.builder.return_void();
            return;
        }
        if self.trees.len() < return_count {
            self.fail(
                DecodeErrorKind::ImplicitReturnShortage,
                self.pc,
                crate::alloc::format!(
                    "end of body with {} trailing values, need {return_count}",
                    self.trees.len()
                ),
            );
            return;
        }
        let start = self.trees.len() - return_count;
        let roots: Vec<TreeId> = self.trees[start..].to_vec();
        let mut values = Vec::with_capacity(return_count);
        // The trailing trees are pushed in program order, but `returns[0]`
        // binds to the *last* tree (the value deepest on the implicit
        // return stack), not the first: walk them back-to-front.
        for i in 0..return_count {
            let root = roots[return_count - 1 - i];
            let leaf = self.peel_block(root);
            let tree = self.arena.get(leaf);
            let expected = sig.returns[i];
            if tree.ty != expected {
                self.fail_with_pt(
                    DecodeErrorKind::ImplicitReturnTypeMismatch,
                    self.pc,
                    tree.pc,
                    crate::alloc::format!(
                        "implicit return: trailing value {i} expected type {expected}, found {}",
                        tree.ty
                    ),
                );
                return;
            }
            values.push(tree.node.expect("value-typed tree carries a node"));
        }
        self.builder.ret(&values);
    }

    /// A trailing value wrapped in an empty-bodied `block` peels through to
    /// that block's own last child, since the block itself carries no node.
    fn peel_block(&self, mut id: TreeId) -> TreeId {
        loop {
            let tree = self.arena.get(id);
            if self.opcode_at(tree.pc) == Opcode::Block {
                if let Some(&last) = tree.children.last() {
                    id = last;
                    continue;
                }
            }
            return id;
        }
    }

    fn opcode_at(&self, pc: u32) -> Opcode {
        Opcode::from_byte(self.code[pc as usize]).expect("pc previously validated as an opcode byte")
    }

    fn fail(&mut self, kind: DecodeErrorKind, pc: u32, message: String) {
        if self.error.is_some() {
            return;
        }
        self.error = Some(DecodeError::new(kind, pc, message));
        self.reader.poison();
    }

    fn latch(&mut self, err: DecodeError) {
        if self.error.is_some() {
            return;
        }
        self.error = Some(err);
        self.reader.poison();
    }

    fn fail_type_check(
        &mut self,
        pc: u32,
        child_pc: u32,
        opcode: &'static str,
        child_index: usize,
        expected: ValueType,
        actual: ValueType,
    ) {
        if self.error.is_some() {
            return;
        }
        self.error = Some(DecodeError::type_check(
            pc, child_pc, opcode, child_index, expected, actual,
        ));
        self.reader.poison();
    }

    /// Like [`Self::fail`], but also records a secondary offset (e.g. the
    /// offending child expression) on the latched diagnostic.
    fn fail_with_pt(&mut self, kind: DecodeErrorKind, pc: u32, pt: u32, message: String) {
        if self.error.is_some() {
            return;
        }
        self.error = Some(DecodeError::new(kind, pc, message).with_pt(pt));
        self.reader.poison();
    }

    /// Allocate a leaf tree (no children) and feed it to [`Self::complete`].
    fn leaf(&mut self, pc: u32, len: u32, ty: ValueType, node: Option<B::Node>) {
        self.pc = pc + len;
        let tree = Tree {
            ty,
            pc,
            node,
            children: Vec::new(),
        };
        let id = self.arena.alloc(tree);
        self.complete(id);
    }

    /// Attach `child` to the production it belongs to (or, if the stack is
    /// empty, record it as a new top-level root), running that opcode's
    /// Reduce policy and bubbling further up every time a production
    /// completes as a result.
    fn complete(&mut self, mut child: TreeId) {
        loop {
            if self.stack.is_empty() {
                self.trees.push(child);
                return;
            }
            let top = self.stack.len() - 1;
            let prod_pc = self.stack[top].pc;
            let opcode = self.opcode_at(prod_pc);
            self.stack[top].children.push(child);
            let attached_index = self.stack[top].children.len() - 1;

            let finalized = self.attach(opcode, prod_pc, attached_index);
            if self.error.is_some() {
                return;
            }
            match finalized {
                Some((ty, node)) => {
                    let prod = self.stack.pop().expect("top production exists");
                    let tree = Tree {
                        ty,
                        pc: prod.pc,
                        node,
                        children: prod.children,
                    };
                    child = self.arena.alloc(tree);
                }
                None => return,
            }
        }
    }

    /// Per-opcode Reduce policy: given the child just attached at
    /// `attached_index`, returns `Some((type, node))` once the production is
    /// fully attached (which the caller then pops and finalizes), or `None`
    /// to keep shifting.
    fn attach(
        &mut self,
        opcode: Opcode,
        prod_pc: u32,
        attached_index: usize,
    ) -> Option<(ValueType, Option<B::Node>)> {
        if let Some(sig) = signature_of(opcode) {
            return self.attach_signature(opcode, sig, prod_pc, attached_index);
        }
        match opcode {
            Opcode::Block => self.attach_block(),
            Opcode::Loop => self.attach_loop(attached_index),
            Opcode::If => self.attach_if(prod_pc, attached_index),
            Opcode::IfThen => self.attach_if_then(prod_pc, attached_index),
            Opcode::Ternary => self.attach_ternary(prod_pc, attached_index),
            Opcode::Comma => self.attach_comma(attached_index),
            Opcode::Switch => self.attach_switch(prod_pc, attached_index, false),
            Opcode::SwitchNf => self.attach_switch(prod_pc, attached_index, true),
            Opcode::Return => self.attach_return(prod_pc, attached_index),
            Opcode::SetLocal => self.attach_set_local(prod_pc),
            Opcode::StoreGlobal => self.attach_store_global(prod_pc),
            Opcode::LoadMemL => self.attach_load_mem(prod_pc, ValueType::I32),
            Opcode::LoadMemH => self.attach_load_mem(prod_pc, ValueType::I64),
            Opcode::StoreMemL => self.attach_store_mem(prod_pc, ValueType::I32),
            Opcode::StoreMemH => self.attach_store_mem(prod_pc, ValueType::I64),
            Opcode::CallFunction => self.attach_call_function(prod_pc, attached_index),
            Opcode::CallIndirect => self.attach_call_indirect(prod_pc, attached_index),
            _ => unreachable!("opcode {opcode:?} never opens a production"),
        }
    }

    fn attach_signature(
        &mut self,
        opcode: Opcode,
        sig: decode_asm::Signature,
        prod_pc: u32,
        attached_index: usize,
    ) -> Option<(ValueType, Option<B::Node>)> {
        let expected = sig.param(attached_index);
        let child_id = self.stack.last().unwrap().children[attached_index];
        let child_ty = self.arena.get(child_id).ty;
        if child_ty != expected {
            let child_pc = self.arena.get(child_id).pc;
            self.fail_type_check(prod_pc, child_pc, opcode.name(), attached_index, expected, child_ty);
            return None;
        }
        let count = self.stack.last().unwrap().count;
        if attached_index + 1 < count {
            return None;
        }
        let children = &self.stack.last().unwrap().children;
        let node = match children.len() {
            1 => {
                let a = self.arena.get(children[0]).node.expect("operand carries a node");
                self.builder.unop(opcode, a)
            }
            2 => {
                let a = self.arena.get(children[0]).node.expect("operand carries a node");
                let b = self.arena.get(children[1]).node.expect("operand carries a node");
                self.builder.binop(opcode, a, b)
            }
            _ => unreachable!("signature-driven opcodes have arity 1 or 2"),
        };
        Some((sig.ret, Some(node)))
    }

    // --- structural shift phase -------------------------------------------------

    fn shift_structural(&mut self, opcode: Opcode, pc: u32) {
        match opcode {
            Opcode::Nop => self.leaf(pc, 1, ValueType::Stmt, None),
            Opcode::GetLocal => self.shift_get_local(pc),
            Opcode::LoadGlobal => self.shift_load_global(pc),
            Opcode::I32Const => self.shift_i32_const(pc),
            Opcode::I32Const8 => self.shift_i32_const8(pc),
            Opcode::I64Const => self.shift_i64_const(pc),
            Opcode::F32Const => self.shift_f32_const(pc),
            Opcode::F64Const => self.shift_f64_const(pc),
            Opcode::Break => self.shift_break(pc),
            Opcode::Continue => self.shift_continue(pc),
            Opcode::Block => self.shift_block(pc),
            Opcode::Loop => self.shift_loop(pc),
            Opcode::If => self.shift_if(pc),
            Opcode::IfThen => self.shift_if_then(pc),
            Opcode::Ternary => self.shift_ternary(pc),
            Opcode::Comma => self.shift_comma(pc),
            Opcode::Switch => self.shift_switch(pc),
            Opcode::SwitchNf => self.shift_switch(pc),
            Opcode::Return => self.shift_return(pc),
            Opcode::SetLocal => self.shift_set_local(pc),
            Opcode::StoreGlobal => self.shift_store_global(pc),
            Opcode::LoadMemL => self.shift_load_mem(pc, ValueType::I32),
            Opcode::LoadMemH => self.shift_load_mem(pc, ValueType::I64),
            Opcode::StoreMemL => self.shift_store_mem(pc, ValueType::I32),
            Opcode::StoreMemH => self.shift_store_mem(pc, ValueType::I64),
            Opcode::CallFunction => self.shift_call_function(pc),
            Opcode::CallIndirect => self.shift_call_indirect(pc),
            _ => unreachable!("opcode {opcode:?} is signature-driven, handled elsewhere"),
        }
    }

    fn shift_get_local(&mut self, pc: u32) {
        let (k, len) = match self.reader.unsigned_leb128(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        let k = k as u32;
        if !self.function_env.is_valid_local(k) {
            self.fail(
                DecodeErrorKind::InvalidLocalIndex,
                pc,
                crate::alloc::format!("get-local: invalid local index {k}"),
            );
            return;
        }
        let ty = self.local_types[k as usize];
        let node = self.env.locals.as_ref().expect("reachable env carries locals")[k as usize];
        self.leaf(pc, 1 + len, ty, Some(node));
    }

    fn shift_load_global(&mut self, pc: u32) {
        let (k, len) = match self.reader.unsigned_leb128(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        let k = k as u32;
        let ty = match self.function_env.global_type(k) {
            Some(ty) => ty,
            None => {
                self.fail(
                    DecodeErrorKind::InvalidGlobalIndex,
                    pc,
                    crate::alloc::format!("load-global: invalid global index {k}"),
                );
                return;
            }
        };
        let node = self.builder.load_global(k);
        self.leaf(pc, 1 + len, ty, Some(node));
    }

    fn shift_i32_const(&mut self, pc: u32) {
        let v: i32 = match self.reader.fixed(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        let node = self.builder.int32_constant(v);
        self.leaf(pc, 1 + 4, ValueType::I32, Some(node));
    }

    fn shift_i32_const8(&mut self, pc: u32) {
        let v: i8 = match self.reader.fixed(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        let node = self.builder.int32_constant(v as i32);
        self.leaf(pc, 1 + 1, ValueType::I32, Some(node));
    }

    fn shift_i64_const(&mut self, pc: u32) {
        let v: i64 = match self.reader.fixed(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        let node = self.builder.int64_constant(v);
        self.leaf(pc, 1 + 8, ValueType::I64, Some(node));
    }

    fn shift_f32_const(&mut self, pc: u32) {
        let v: f32 = match self.reader.fixed(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        let node = self.builder.float32_constant(v);
        self.leaf(pc, 1 + 4, ValueType::F32, Some(node));
    }

    fn shift_f64_const(&mut self, pc: u32) {
        let v: f64 = match self.reader.fixed(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        let node = self.builder.float64_constant(v);
        self.leaf(pc, 1 + 8, ValueType::F64, Some(node));
    }

    fn shift_break(&mut self, pc: u32) {
        let d: u8 = match self.reader.fixed(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        match self.blocks.len().checked_sub(1 + d as usize) {
            Some(idx) => env::goto(self.builder, &mut self.env, &mut self.blocks[idx].break_env, &self.local_types),
            None => {
                self.fail(
                    DecodeErrorKind::ImproperlyNestedBreak,
                    pc,
                    crate::alloc::format!("break depth {d} exceeds enclosing block nesting"),
                );
                return;
            }
        }
        self.leaf(pc, 2, ValueType::Stmt, None);
    }

    fn shift_continue(&mut self, pc: u32) {
        let d: u8 = match self.reader.fixed(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        let idx = match self.blocks.len().checked_sub(1 + d as usize) {
            Some(idx) => idx,
            None => {
                self.fail(
                    DecodeErrorKind::ImproperlyNestedContinue,
                    pc,
                    crate::alloc::format!("continue depth {d} exceeds enclosing block nesting"),
                );
                return;
            }
        };
        match self.blocks[idx].cont_env.as_mut() {
            Some(cont) => env::goto(self.builder, &mut self.env, cont, &self.local_types),
            None => {
                self.fail(
                    DecodeErrorKind::ImproperlyNestedContinue,
                    pc,
                    crate::alloc::format!("continue depth {d} targets a non-loop frame"),
                );
                return;
            }
        }
        self.leaf(pc, 2, ValueType::Stmt, None);
    }

    fn shift_block(&mut self, pc: u32) {
        let n: u8 = match self.reader.fixed(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        if n == 0 {
            self.leaf(pc, 2, ValueType::Stmt, None);
            return;
        }
        self.blocks.push(BlockFrame {
            cont_env: None,
            break_env: Environment::unreachable(),
        });
        self.pc = pc + 2;
        self.stack.push(Production::new(pc, n as usize));
    }

    fn attach_block(&mut self) -> Option<(ValueType, Option<B::Node>)> {
        let top = self.stack.last().unwrap();
        if top.children.len() < top.count {
            return None;
        }
        let mut frame = self.blocks.pop().expect("block pushed a frame");
        env::goto(self.builder, &mut self.env, &mut frame.break_env, &self.local_types);
        self.env = frame.break_env;
        Some((ValueType::Stmt, None))
    }

    fn shift_loop(&mut self, pc: u32) {
        let n: u8 = match self.reader.fixed(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        if n == 0 {
            env::prepare_for_loop(self.builder, &mut self.env, &self.local_types);
            let mut back = Environment::split(Some(&self.env));
            env::goto(self.builder, &mut back, &mut self.env, &self.local_types);
            self.env = Environment::dead();
            self.leaf(pc, 2, ValueType::Stmt, None);
            return;
        }
        env::prepare_for_loop(self.builder, &mut self.env, &self.local_types);
        let cont_env = self.env.clone();
        self.env = Environment::split(Some(&cont_env));
        self.blocks.push(BlockFrame {
            cont_env: Some(cont_env),
            break_env: Environment::unreachable(),
        });
        self.pc = pc + 2;
        self.stack.push(Production::new(pc, n as usize));
    }

    fn attach_loop(&mut self, attached_index: usize) -> Option<(ValueType, Option<B::Node>)> {
        let count = self.stack.last().unwrap().count;
        if attached_index + 1 < count {
            return None;
        }
        let mut frame = self.blocks.pop().expect("loop pushed a frame");
        if self.env.is_reachable() {
            let cont_env = frame.cont_env.as_mut().expect("loop frame carries a continue target");
            env::goto(self.builder, &mut self.env, cont_env, &self.local_types);
        }
        self.env = frame.break_env;
        Some((ValueType::Stmt, None))
    }

    fn shift_if(&mut self, pc: u32) {
        self.pc = pc + 1;
        self.stack.push(Production::new(pc, 2));
    }

    fn attach_if(&mut self, prod_pc: u32, attached_index: usize) -> Option<(ValueType, Option<B::Node>)> {
        if attached_index == 0 {
            let cond_id = self.stack.last().unwrap().children[0];
            let cond_ty = self.arena.get(cond_id).ty;
            if cond_ty != ValueType::I32 {
                let cond_pc = self.arena.get(cond_id).pc;
                self.fail_type_check(prod_pc, cond_pc, "if", 0, ValueType::I32, cond_ty);
                return None;
            }
            let cond_node = self.arena.get(cond_id).node.expect("condition tree carries a node");
            let control = self.env.control.expect("reachable env carries control");
            let true_env = Environment::split(Some(&self.env));
            let mut false_env = core::mem::replace(&mut self.env, true_env);
            let (t, f) = self.builder.branch(cond_node, control);
            self.env.control = Some(t);
            false_env.control = Some(f);
            self.ifs.push(IfFrame {
                true_env: Environment::unreachable(),
                false_env,
            });
            None
        } else {
            let mut frame = self.ifs.pop().expect("if pushed a frame");
            // `false_env` is the pre-`if` environment with its control swapped
            // to the branch-false projection; if that pre-`if` environment
            // was already `Merged`, the stale state would make `goto` try to
            // extend a merge where `false_env.control` is really a plain
            // branch projection. Force it back to `Reached` first, as the
            // original decoder does.
            frame.false_env.state = State::Reached;
            env::goto(self.builder, &mut self.env, &mut frame.false_env, &self.local_types);
            self.env = frame.false_env;
            Some((ValueType::Stmt, None))
        }
    }

    fn shift_if_then(&mut self, pc: u32) {
        self.pc = pc + 1;
        self.stack.push(Production::new(pc, 3));
    }

    fn attach_if_then(&mut self, prod_pc: u32, attached_index: usize) -> Option<(ValueType, Option<B::Node>)> {
        match attached_index {
            0 => {
                let cond_id = self.stack.last().unwrap().children[0];
                let cond_ty = self.arena.get(cond_id).ty;
                if cond_ty != ValueType::I32 {
                    let cond_pc = self.arena.get(cond_id).pc;
                    self.fail_type_check(prod_pc, cond_pc, "if-then", 0, ValueType::I32, cond_ty);
                    return None;
                }
                let cond_node = self.arena.get(cond_id).node.expect("condition tree carries a node");
                let control = self.env.control.expect("reachable env carries control");
                let mut true_env = Environment::split(Some(&self.env));
                let mut false_env = Environment::split(Some(&self.env));
                let (t, f) = self.builder.branch(cond_node, control);
                true_env.control = Some(t);
                false_env.control = Some(f);
                self.env = true_env;
                self.ifs.push(IfFrame {
                    true_env: Environment::unreachable(),
                    false_env,
                });
                None
            }
            1 => {
                let false_env = {
                    let frame = self.ifs.last_mut().expect("if-then pushed a frame");
                    frame.true_env = self.env.clone();
                    frame.false_env.clone()
                };
                self.env = false_env;
                None
            }
            _ => {
                let mut frame = self.ifs.pop().expect("if-then pushed a frame");
                if self.env.is_reachable() {
                    if frame.true_env.is_reachable() {
                        // `self.env` is the else-branch exit; if the else
                        // branch contains its own join it can already be
                        // `Merged`, which would make `goto` try to extend a
                        // merge on a control that was never one. Force it
                        // back to `Reached` before joining the then-exit in.
                        self.env.state = State::Reached;
                        env::goto(self.builder, &mut frame.true_env, &mut self.env, &self.local_types);
                    }
                } else {
                    self.env = frame.true_env;
                }
                Some((ValueType::Stmt, None))
            }
        }
    }

    fn shift_ternary(&mut self, pc: u32) {
        self.pc = pc + 1;
        self.stack.push(Production::new(pc, 3));
    }

    fn attach_ternary(&mut self, prod_pc: u32, attached_index: usize) -> Option<(ValueType, Option<B::Node>)> {
        match attached_index {
            0 => {
                let cond_id = self.stack.last().unwrap().children[0];
                let cond_ty = self.arena.get(cond_id).ty;
                if cond_ty != ValueType::I32 {
                    let cond_pc = self.arena.get(cond_id).pc;
                    self.fail_type_check(prod_pc, cond_pc, "ternary", 0, ValueType::I32, cond_ty);
                    return None;
                }
                let cond_node = self.arena.get(cond_id).node.expect("condition tree carries a node");
                let control = self.env.control.expect("reachable env carries control");
                let mut true_env = Environment::split(Some(&self.env));
                let mut false_env = Environment::split(Some(&self.env));
                let (t, f) = self.builder.branch(cond_node, control);
                true_env.control = Some(t);
                false_env.control = Some(f);
                self.env = true_env;
                self.ifs.push(IfFrame {
                    true_env: Environment::unreachable(),
                    false_env,
                });
                None
            }
            1 => {
                let false_env = {
                    let frame = self.ifs.last_mut().expect("ternary pushed a frame");
                    frame.true_env = self.env.clone();
                    frame.false_env.clone()
                };
                self.env = false_env;
                None
            }
            _ => {
                let then_id = self.stack.last().unwrap().children[1];
                let then_ty = self.arena.get(then_id).ty;
                let else_id = self.stack.last().unwrap().children[2];
                let else_ty = self.arena.get(else_id).ty;
                if else_ty != then_ty {
                    let else_pc = self.arena.get(else_id).pc;
                    self.fail_type_check(prod_pc, else_pc, "ternary", 2, then_ty, else_ty);
                    return None;
                }
                let mut frame = self.ifs.pop().expect("ternary pushed a frame");
                if self.env.is_reachable() && frame.true_env.is_reachable() {
                    // Same reasoning as `if-then`: the else-arm exit may
                    // already be `Merged` from a join inside that arm, so it
                    // must be forced back to `Reached` before joining the
                    // then-arm exit in.
                    self.env.state = State::Reached;
                    env::goto(self.builder, &mut frame.true_env, &mut self.env, &self.local_types);
                } else if !self.env.is_reachable() {
                    self.env = frame.true_env;
                }
                let then_node = self.arena.get(then_id).node.expect("then-expr carries a node");
                let else_node = self.arena.get(else_id).node.expect("else-expr carries a node");
                let node = if then_node == else_node {
                    then_node
                } else {
                    let control = self.env.control.expect("joined env carries control");
                    self.builder.phi(then_ty, &[then_node, else_node], control)
                };
                Some((then_ty, Some(node)))
            }
        }
    }

    fn shift_comma(&mut self, pc: u32) {
        self.pc = pc + 1;
        self.stack.push(Production::new(pc, 2));
    }

    fn attach_comma(&mut self, attached_index: usize) -> Option<(ValueType, Option<B::Node>)> {
        if attached_index < 1 {
            return None;
        }
        let right_id = self.stack.last().unwrap().children[1];
        let tree = self.arena.get(right_id);
        Some((tree.ty, tree.node))
    }

    fn shift_switch(&mut self, pc: u32) {
        let n: u8 = match self.reader.fixed(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        self.pc = pc + 2;
        self.stack.push(Production::new(pc, n as usize + 1));
    }

    fn begin_switch_case(&mut self, case_index: u32) {
        let key_id = self.stack.last().unwrap().children[0];
        let key_node = self.arena.get(key_id).node.expect("key tree carries a node");
        let case_const = self.builder.int32_constant(case_index as i32);
        let cond = self.builder.binop(Opcode::I32Eq, key_node, case_const);

        let base = {
            let frame = self.ifs.last_mut().expect("switch pushed an if frame");
            core::mem::replace(&mut frame.false_env, Environment::unreachable())
        };
        let control = base.control.expect("reachable env carries control");
        let mut true_env = Environment::split(Some(&base));
        let mut false_env = base;
        let (t, f) = self.builder.branch(cond, control);
        true_env.control = Some(t);
        false_env.control = Some(f);
        self.ifs.last_mut().expect("switch pushed an if frame").false_env = false_env;
        self.env = true_env;
    }

    fn attach_switch(
        &mut self,
        prod_pc: u32,
        attached_index: usize,
        no_fallthrough: bool,
    ) -> Option<(ValueType, Option<B::Node>)> {
        if attached_index == 0 {
            let key_id = self.stack.last().unwrap().children[0];
            let key_ty = self.arena.get(key_id).ty;
            if key_ty != ValueType::I32 {
                let key_pc = self.arena.get(key_id).pc;
                self.fail_type_check(prod_pc, key_pc, "switch", 0, ValueType::I32, key_ty);
                return None;
            }
            let count = self.stack.last().unwrap().count;
            if count == 1 {
                // `switch 0`/`switch-nf 0`: no cases at all, so the key is
                // evaluated only for its side effects and control falls
                // straight through with no branch ever built.
                return Some((ValueType::Stmt, None));
            }
            self.blocks.push(BlockFrame {
                cont_env: None,
                break_env: Environment::unreachable(),
            });
            self.ifs.push(IfFrame {
                true_env: Environment::unreachable(),
                false_env: self.env.clone(),
            });
            self.begin_switch_case(0);
            return None;
        }

        let case_index = attached_index - 1;
        let count = self.stack.last().unwrap().count;
        let is_last_case = attached_index + 1 == count;
        let fallthrough = if self.env.is_reachable() {
            Some(core::mem::replace(&mut self.env, Environment::dead()))
        } else {
            None
        };

        if !is_last_case {
            self.begin_switch_case((case_index + 1) as u32);
            if let Some(mut tail) = fallthrough {
                if no_fallthrough {
                    let break_env = &mut self.blocks.last_mut().expect("switch pushed a block frame").break_env;
                    env::goto(self.builder, &mut tail, break_env, &self.local_types);
                } else {
                    env::goto(self.builder, &mut tail, &mut self.env, &self.local_types);
                }
            }
            return None;
        }

        let mut trailing = {
            let frame = self.ifs.last_mut().expect("switch pushed an if frame");
            core::mem::replace(&mut frame.false_env, Environment::unreachable())
        };
        {
            let break_env = &mut self.blocks.last_mut().expect("switch pushed a block frame").break_env;
            env::goto(self.builder, &mut trailing, break_env, &self.local_types);
        }
        if let Some(mut tail) = fallthrough {
            let break_env = &mut self.blocks.last_mut().expect("switch pushed a block frame").break_env;
            env::goto(self.builder, &mut tail, break_env, &self.local_types);
        }
        self.ifs.pop();
        let frame = self.blocks.pop().expect("switch pushed a block frame");
        self.env = frame.break_env;
        Some((ValueType::Stmt, None))
    }

    fn shift_return(&mut self, pc: u32) {
        let return_count = self.function_env.signature().return_count();
        self.pc = pc + 1;
        if return_count == 0 {
            self.builder.return_void();
            self.env = Environment::dead();
            let tree = Tree {
                ty: ValueType::Stmt,
                pc,
                node: None,
                children: Vec::new(),
            };
            let id = self.arena.alloc(tree);
            self.complete(id);
            return;
        }
        self.stack.push(Production::new(pc, return_count));
    }

    fn attach_return(&mut self, prod_pc: u32, attached_index: usize) -> Option<(ValueType, Option<B::Node>)> {
        let sig = self.function_env.signature();
        let expected = sig.returns[attached_index];
        let child_id = self.stack.last().unwrap().children[attached_index];
        let child_ty = self.arena.get(child_id).ty;
        if child_ty != expected {
            let child_pc = self.arena.get(child_id).pc;
            self.fail_type_check(prod_pc, child_pc, "return", attached_index, expected, child_ty);
            return None;
        }
        let count = self.stack.last().unwrap().count;
        if attached_index + 1 < count {
            return None;
        }
        let values: Vec<B::Node> = self
            .stack
            .last()
            .unwrap()
            .children
            .iter()
            .map(|&id| self.arena.get(id).node.expect("return value tree carries a node"))
            .collect();
        self.builder.ret(&values);
        self.env = Environment::dead();
        Some((ValueType::Stmt, None))
    }

    fn shift_set_local(&mut self, pc: u32) {
        let (_k, len) = match self.reader.unsigned_leb128(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        self.pc = pc + 1 + len;
        self.stack.push(Production::new(pc, 1));
    }

    fn attach_set_local(&mut self, prod_pc: u32) -> Option<(ValueType, Option<B::Node>)> {
        let (k, _len) = self
            .reader
            .unsigned_leb128(prod_pc)
            .expect("leb128 re-read must succeed");
        let k = k as u32;
        if !self.function_env.is_valid_local(k) {
            self.fail(
                DecodeErrorKind::InvalidLocalIndex,
                prod_pc,
                crate::alloc::format!("set-local: invalid local index {k}"),
            );
            return None;
        }
        let expected = self.local_types[k as usize];
        let child_id = self.stack.last().unwrap().children[0];
        let child_ty = self.arena.get(child_id).ty;
        if child_ty != expected {
            let child_pc = self.arena.get(child_id).pc;
            self.fail_type_check(prod_pc, child_pc, "set-local", 0, expected, child_ty);
            return None;
        }
        let child_node = self.arena.get(child_id).node.expect("value-typed child carries a node");
        self.env.locals.as_mut().expect("reachable env carries locals")[k as usize] = child_node;
        Some((child_ty, Some(child_node)))
    }

    fn shift_store_global(&mut self, pc: u32) {
        let (_k, len) = match self.reader.unsigned_leb128(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        self.pc = pc + 1 + len;
        self.stack.push(Production::new(pc, 1));
    }

    fn attach_store_global(&mut self, prod_pc: u32) -> Option<(ValueType, Option<B::Node>)> {
        let (k, _len) = self
            .reader
            .unsigned_leb128(prod_pc)
            .expect("leb128 re-read must succeed");
        let k = k as u32;
        let expected = match self.function_env.global_type(k) {
            Some(ty) => ty,
            None => {
                self.fail(
                    DecodeErrorKind::InvalidGlobalIndex,
                    prod_pc,
                    crate::alloc::format!("store-global: invalid global index {k}"),
                );
                return None;
            }
        };
        let child_id = self.stack.last().unwrap().children[0];
        let child_ty = self.arena.get(child_id).ty;
        if child_ty != expected {
            let child_pc = self.arena.get(child_id).pc;
            self.fail_type_check(prod_pc, child_pc, "store-global", 0, expected, child_ty);
            return None;
        }
        let child_node = self.arena.get(child_id).node.expect("value-typed child carries a node");
        let node = self.builder.store_global(k, child_node);
        Some((child_ty, Some(node)))
    }

    fn shift_load_mem(&mut self, pc: u32, _addr_ty: ValueType) {
        self.pc = pc + 2;
        self.stack.push(Production::new(pc, 1));
    }

    fn attach_load_mem(&mut self, prod_pc: u32, addr_ty: ValueType) -> Option<(ValueType, Option<B::Node>)> {
        let child_id = self.stack.last().unwrap().children[0];
        let child_ty = self.arena.get(child_id).ty;
        if child_ty != addr_ty {
            let child_pc = self.arena.get(child_id).pc;
            self.fail_type_check(prod_pc, child_pc, "load-mem", 0, addr_ty, child_ty);
            return None;
        }
        let mem = match self.reader.mem_access_type(prod_pc, None) {
            Ok(m) => m,
            Err(e) => {
                self.latch(e);
                return None;
            }
        };
        let addr_node = self.arena.get(child_id).node.expect("address tree carries a node");
        let node = self.builder.load_mem(mem, addr_node);
        Some((mem.natural_value_type(), Some(node)))
    }

    fn shift_store_mem(&mut self, pc: u32, _addr_ty: ValueType) {
        self.pc = pc + 2;
        self.stack.push(Production::new(pc, 2));
    }

    fn attach_store_mem(&mut self, prod_pc: u32, addr_ty: ValueType) -> Option<(ValueType, Option<B::Node>)> {
        let children_len = self.stack.last().unwrap().children.len();
        if children_len == 1 {
            let addr_id = self.stack.last().unwrap().children[0];
            let addr_ty_actual = self.arena.get(addr_id).ty;
            if addr_ty_actual != addr_ty {
                let addr_pc = self.arena.get(addr_id).pc;
                self.fail_type_check(prod_pc, addr_pc, "store-mem", 0, addr_ty, addr_ty_actual);
            }
            return None;
        }
        let addr_id = self.stack.last().unwrap().children[0];
        let value_id = self.stack.last().unwrap().children[1];
        let value_ty = self.arena.get(value_id).ty;
        let mem = match self.reader.mem_access_type(prod_pc, Some(value_ty)) {
            Ok(m) => m,
            Err(e) => {
                self.latch(e);
                return None;
            }
        };
        let addr_node = self.arena.get(addr_id).node.expect("address tree carries a node");
        let value_node = self.arena.get(value_id).node.expect("value tree carries a node");
        let node = self.builder.store_mem(mem, addr_node, value_node);
        Some((value_ty, Some(node)))
    }

    fn shift_call_function(&mut self, pc: u32) {
        let (k, len) = match self.reader.unsigned_leb128(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        let k = k as u32;
        let sig = match self.function_env.function_signature(k) {
            Some(s) => s,
            None => {
                self.fail(
                    DecodeErrorKind::InvalidFunctionIndex,
                    pc,
                    crate::alloc::format!("call-function: invalid function index {k}"),
                );
                return;
            }
        };
        let arity = sig.params.len();
        let total_len = 1 + len;
        if arity == 0 {
            let ty = sig.returns.first().copied().unwrap_or(ValueType::Stmt);
            let node = self.builder.call_direct(k, &[]);
            self.leaf(pc, total_len, ty, Some(node));
            return;
        }
        self.pc = pc + total_len;
        self.stack.push(Production::new(pc, arity));
    }

    fn attach_call_function(&mut self, prod_pc: u32, attached_index: usize) -> Option<(ValueType, Option<B::Node>)> {
        let (k, _len) = self
            .reader
            .unsigned_leb128(prod_pc)
            .expect("leb128 re-read must succeed");
        let k = k as u32;
        let sig = self
            .function_env
            .function_signature(k)
            .expect("validated at shift time");
        let expected = sig.params[attached_index];
        let child_id = self.stack.last().unwrap().children[attached_index];
        let child_ty = self.arena.get(child_id).ty;
        if child_ty != expected {
            let child_pc = self.arena.get(child_id).pc;
            self.fail_type_check(prod_pc, child_pc, "call-function", attached_index, expected, child_ty);
            return None;
        }
        let count = self.stack.last().unwrap().count;
        if attached_index + 1 < count {
            return None;
        }
        let ty = sig.returns.first().copied().unwrap_or(ValueType::Stmt);
        let args: Vec<B::Node> = self
            .stack
            .last()
            .unwrap()
            .children
            .iter()
            .map(|&id| self.arena.get(id).node.expect("argument tree carries a node"))
            .collect();
        let node = self.builder.call_direct(k, &args);
        Some((ty, Some(node)))
    }

    fn shift_call_indirect(&mut self, pc: u32) {
        let (k, len) = match self.reader.unsigned_leb128(pc) {
            Ok(v) => v,
            Err(e) => {
                self.latch(e);
                return;
            }
        };
        let k = k as u32;
        let sig = match self.function_env.function_table_signature(k) {
            Some(s) => s,
            None => {
                self.fail(
                    DecodeErrorKind::InvalidFunctionTableIndex,
                    pc,
                    crate::alloc::format!("call-indirect: invalid function-table index {k}"),
                );
                return;
            }
        };
        let arity = 1 + sig.params.len();
        self.pc = pc + 1 + len;
        self.stack.push(Production::new(pc, arity));
    }

    fn attach_call_indirect(&mut self, prod_pc: u32, attached_index: usize) -> Option<(ValueType, Option<B::Node>)> {
        let (k, _len) = self
            .reader
            .unsigned_leb128(prod_pc)
            .expect("leb128 re-read must succeed");
        let k = k as u32;
        let sig = self
            .function_env
            .function_table_signature(k)
            .expect("validated at shift time");
        let child_id = self.stack.last().unwrap().children[attached_index];
        let child_ty = self.arena.get(child_id).ty;
        if attached_index == 0 {
            if child_ty != ValueType::I32 {
                let child_pc = self.arena.get(child_id).pc;
                self.fail_type_check(prod_pc, child_pc, "call-indirect", 0, ValueType::I32, child_ty);
                return None;
            }
        } else {
            let expected = sig.params[attached_index - 1];
            if child_ty != expected {
                let child_pc = self.arena.get(child_id).pc;
                self.fail_type_check(prod_pc, child_pc, "call-indirect", attached_index, expected, child_ty);
                return None;
            }
        }
        let count = self.stack.last().unwrap().count;
        if attached_index + 1 < count {
            return None;
        }
        let ty = sig.returns.first().copied().unwrap_or(ValueType::Stmt);
        let args: Vec<B::Node> = self
            .stack
            .last()
            .unwrap()
            .children
            .iter()
            .map(|&id| self.arena.get(id).node.expect("argument tree carries a node"))
            .collect();
        let node = self.builder.call_indirect(k, &args);
        Some((ty, Some(node)))
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::NullBuilder;
    use crate::testutil::{NodeOp, Program, RecordingBuilder, TestEnv};
    use decode_asm::{Opcode, ValueType};

    use super::decode;

    #[test]
    fn comma_takes_the_right_childs_type_and_node() {
        let body = Program::new().ret().comma().nop().i32_const8(5);
        let env = TestEnv::new(&[], &[ValueType::I32]);

        let mut rb = RecordingBuilder::new();
        decode(body.bytes(), &env, &mut rb).expect("comma's type is its right child's type");
        let values = rb.returns.last().unwrap();
        assert_eq!(*rb.get(values[0]), NodeOp::I32Const(5));
    }

    #[test]
    fn ternary_shares_one_node_when_both_arms_agree() {
        let body = Program::new()
            .ret()
            .ternary()
            .get_local(0)
            .i32_const8(7)
            .i32_const8(7);
        let env = TestEnv::new(&[ValueType::I32], &[ValueType::I32]);

        let mut rb = RecordingBuilder::new();
        decode(body.bytes(), &env, &mut rb).expect("ternary with identical arms needs no phi");
        let has_phi = rb.nodes.iter().any(|n| matches!(n, NodeOp::Phi { .. }));
        assert!(!has_phi, "identical arm values must not synthesize a phi");
    }

    #[test]
    fn ternary_phis_differing_arms() {
        let body = Program::new()
            .ret()
            .ternary()
            .get_local(0)
            .i32_const8(1)
            .i32_const8(2);
        let env = TestEnv::new(&[ValueType::I32], &[ValueType::I32]);

        let mut rb = RecordingBuilder::new();
        decode(body.bytes(), &env, &mut rb).expect("ternary with differing arms needs a phi");
        let has_phi = rb.nodes.iter().any(|n| matches!(n, NodeOp::Phi { .. }));
        assert!(has_phi, "differing arm values must synthesize a phi");
    }

    #[test]
    fn ternary_arms_must_agree_in_type() {
        let body = Program::new()
            .ret()
            .ternary()
            .get_local(0)
            .i32_const8(1)
            .i64_const(2);
        let env = TestEnv::new(&[ValueType::I32], &[ValueType::I32]);

        let mut builder = NullBuilder;
        let err = decode(body.bytes(), &env, &mut builder).expect_err("i32 then, i64 else");
        assert_eq!(err.kind, crate::error::DecodeErrorKind::TypeCheck);
    }

    #[test]
    fn store_mem_composes_as_an_expression() {
        // store-mem-l's value carries through as the tree's own node, so it
        // can feed another expression the way `set-local`'s value does.
        let body = Program::new()
            .ret()
            .comma()
            .store_mem_l(0b0000_0010)
            .get_local(0)
            .i32_const8(9)
            .get_local(0);
        let env = TestEnv::new(&[ValueType::I32], &[ValueType::I32]);

        let mut rb = RecordingBuilder::new();
        decode(body.bytes(), &env, &mut rb).expect("store composes fine as comma's left operand");
        let has_store = rb
            .nodes
            .iter()
            .any(|n| matches!(n, NodeOp::StoreMem(_, _, _)));
        assert!(has_store, "a store-mem node must have been built");
    }

    #[test]
    fn unop_and_binop_reuse_the_signature_table() {
        let body = Program::new().ret().unop(Opcode::F32Neg).f32_const(1.5);
        let env = TestEnv::new(&[], &[ValueType::F32]);

        let mut rb = RecordingBuilder::new();
        decode(body.bytes(), &env, &mut rb).expect("f32.neg is unary over f32");
        let values = rb.returns.last().unwrap();
        assert!(matches!(rb.get(values[0]), NodeOp::Unop(Opcode::F32Neg, _)));
    }
}
