//! Integration tests pinning the byte-sequence scenarios and universal
//! properties from the decoder's specification: each test assembles one
//! function body with [`Program`] and decodes it against a [`TestEnv`],
//! checking either acceptance/rejection or recorded graph shape.

use decode_core::builder::NullBuilder;
use decode_core::decoder::decode;
use decode_core::error::DecodeErrorKind;
use decode_core::testutil::{NodeOp, Program, RecordingBuilder, TestEnv};
use decode_asm::{Opcode, ValueType};

#[test]
fn constant_return() {
    let body = Program::new().ret().i32_const(42);
    let env = TestEnv::new(&[], &[ValueType::I32]);

    let mut rb = RecordingBuilder::new();
    let decoded = decode(body.bytes(), &env, &mut rb).expect("well-typed body must decode");
    assert_eq!(decoded.roots.len(), 1, "the return is the body's sole top-level tree");

    let values = rb.returns.last().expect("one return was emitted");
    assert_eq!(values.len(), 1);
    assert_eq!(*rb.get(values[0]), NodeOp::I32Const(42));
}

#[test]
fn add_two_parameters() {
    let body = Program::new()
        .ret()
        .binop(Opcode::I32Add)
        .get_local(0)
        .get_local(1);
    let env = TestEnv::new(&[ValueType::I32, ValueType::I32], &[ValueType::I32]);

    let mut rb = RecordingBuilder::new();
    decode(body.bytes(), &env, &mut rb).expect("well-typed body must decode");

    let values = rb.returns.last().expect("one return was emitted");
    assert_eq!(values.len(), 1);
    let node = rb.get(values[0]).clone();
    let NodeOp::Binop(op, a, b) = node else {
        panic!("expected a Binop node, found {:?}", rb.get(values[0]));
    };
    assert_eq!(op, Opcode::I32Add);
    assert_eq!(*rb.get(a), NodeOp::Param(0, ValueType::I32));
    assert_eq!(*rb.get(b), NodeOp::Param(1, ValueType::I32));
}

#[test]
fn if_then_join_phis_the_two_branch_constants() {
    // [IF_THEN, GET_LOCAL 0, SET_LOCAL 1, I32CONST8 1, SET_LOCAL 1, I32CONST8 2, RETURN, GET_LOCAL 1]
    let body = Program::new()
        .if_then()
        .get_local(0)
        .set_local(1)
        .i32_const8(1)
        .set_local(1)
        .i32_const8(2)
        .ret()
        .get_local(1);
    let env = TestEnv::new(&[ValueType::I32], &[ValueType::I32]).with_local(ValueType::I32);

    let mut rb = RecordingBuilder::new();
    decode(body.bytes(), &env, &mut rb).expect("if-then join must type-check");

    let values = rb.returns.last().expect("one return was emitted");
    let NodeOp::Phi { ty, values: phi_inputs, .. } = rb.get(values[0]).clone() else {
        panic!(
            "local 1 must be phi'd at the join, since the two branches disagree; found {:?}",
            rb.get(values[0])
        );
    };
    assert_eq!(ty, ValueType::I32);
    let resolved: Vec<_> = phi_inputs.iter().map(|&id| rb.get(id).clone()).collect();
    assert_eq!(resolved, vec![NodeOp::I32Const(1), NodeOp::I32Const(2)]);
}

#[test]
fn statement_after_infinite_loop_is_unreachable() {
    let body = Program::new().loop_(0).nop();
    let env = TestEnv::new(&[], &[]);

    let mut builder = NullBuilder;
    let err = decode(body.bytes(), &env, &mut builder).expect_err("loop(0) never falls through");
    assert_eq!(err.kind, DecodeErrorKind::UnreachableCode);
}

#[test]
fn break_out_of_empty_block_body() {
    let body = Program::new().block(1).break_(0);
    let env = TestEnv::new(&[], &[]);

    let mut builder = NullBuilder;
    decode(body.bytes(), &env, &mut builder).expect("a single break is a valid block body");
}

#[test]
fn malformed_leb128_latches_invalid_leb128() {
    let mut raw = vec![Opcode::GetLocal as u8];
    raw.extend([0x80, 0x80, 0x80, 0x80, 0x80]);
    let env = TestEnv::new(&[ValueType::I32; 1], &[]);

    let mut builder = NullBuilder;
    let err = decode(&raw, &env, &mut builder).expect_err("continuation bit set on 5th byte");
    assert_eq!(err.kind, DecodeErrorKind::InvalidLeb128);
}

#[test]
fn type_mismatch_reports_child_position_and_types() {
    let body = Program::new()
        .binop(Opcode::I32Add)
        .i64_const(0)
        .i32_const8(1);
    let env = TestEnv::new(&[], &[]);

    let mut builder = NullBuilder;
    let err = decode(body.bytes(), &env, &mut builder).expect_err("i64 operand to i32.add");
    assert_eq!(err.kind, DecodeErrorKind::TypeCheck);
    assert!(err.message.contains("i32.add"));
    assert!(err.message.contains("i32"));
    assert!(err.message.contains("i64"));
}

#[test]
fn switch_nf_case_without_break_falls_to_default_not_next_case() {
    // case 0 has no break; switch-nf routes its fallthrough straight to
    // break_env instead of into case 1's true branch.
    let body = Program::new().switch_nf(2).get_local(0).nop().nop();
    let env = TestEnv::new(&[ValueType::I32], &[]);

    let mut builder = NullBuilder;
    decode(body.bytes(), &env, &mut builder).expect("switch-nf with fallthrough-free cases decodes");
}

#[test]
fn switch_with_fallthrough_reaches_next_case() {
    let body = Program::new().switch(2).get_local(0).nop().nop();
    let env = TestEnv::new(&[ValueType::I32], &[]);

    let mut builder = NullBuilder;
    decode(body.bytes(), &env, &mut builder).expect("plain switch falls through between cases");
}

#[test]
fn implicit_return_peels_through_trailing_empty_block() {
    // A trailing value wrapped in an empty-bodied block peels through to
    // that block's own last child.
    let body = Program::new().block(1).i32_const8(7);
    let env = TestEnv::new(&[], &[ValueType::I32]);

    let mut rb = RecordingBuilder::new();
    decode(body.bytes(), &env, &mut rb).expect("trailing block peels to its last child");
    let values = rb.returns.last().expect("implicit return was emitted");
    assert_eq!(*rb.get(values[0]), NodeOp::I32Const(7));
}

#[test]
fn implicit_return_shortage_is_an_error() {
    let body = Program::new();
    let env = TestEnv::new(&[], &[ValueType::I32]);

    let mut builder = NullBuilder;
    let err = decode(body.bytes(), &env, &mut builder).expect_err("no trailing i32 value");
    assert_eq!(err.kind, DecodeErrorKind::ImplicitReturnShortage);
}

#[test]
fn verifier_accepts_exactly_what_the_real_builder_accepts() {
    let body = Program::new()
        .ret()
        .binop(Opcode::I32Add)
        .get_local(0)
        .get_local(1);
    let env = TestEnv::new(&[ValueType::I32, ValueType::I32], &[ValueType::I32]);

    let mut null = NullBuilder;
    let verify_only = decode(body.bytes(), &env, &mut null).is_ok();

    let mut rb = RecordingBuilder::new();
    let with_graph = decode(body.bytes(), &env, &mut rb).is_ok();

    assert_eq!(verify_only, with_graph);
}

#[test]
fn loop_backedge_phis_a_local_that_changes_each_iteration() {
    // local 0 is a param; the loop body rebinds it to itself plus a
    // constant and loops unconditionally via `continue 0`, so the header
    // must carry a phi whose second input is the rebind.
    let body = Program::new()
        .loop_(2)
        .set_local(0)
        .binop(Opcode::I32Add)
        .get_local(0)
        .i32_const8(1)
        .continue_(0);
    let env = TestEnv::new(&[ValueType::I32], &[]);

    let mut rb = RecordingBuilder::new();
    decode(body.bytes(), &env, &mut rb).expect("unconditional continue back to the loop header");

    let header = rb
        .nodes
        .iter()
        .any(|n| matches!(n, NodeOp::LoopHeader(_)));
    assert!(header, "loop must wrap its control in a loop header");

    let phi = rb.nodes.iter().any(|n| matches!(n, NodeOp::Phi { .. }));
    assert!(phi, "local rebound on the backedge must be phi'd at the header");
}

#[test]
fn invalid_opcode_byte_is_rejected() {
    let body = vec![0xffu8];
    let env = TestEnv::new(&[], &[]);

    let mut builder = NullBuilder;
    let err = decode(&body, &env, &mut builder).expect_err("0xff is not an assigned opcode");
    assert_eq!(err.kind, DecodeErrorKind::InvalidOpcode);
}

#[test]
fn invalid_local_index_is_rejected() {
    let body = Program::new().get_local(5);
    let env = TestEnv::new(&[ValueType::I32], &[]);

    let mut builder = NullBuilder;
    let err = decode(body.bytes(), &env, &mut builder).expect_err("local 5 is never declared");
    assert_eq!(err.kind, DecodeErrorKind::InvalidLocalIndex);
}

#[test]
fn call_function_checks_argument_types_and_return_type() {
    let body = Program::new().ret().call_function(0).i32_const8(9);
    let env = TestEnv::new(&[], &[ValueType::I32]).with_function(&[ValueType::I32], &[ValueType::I32]);

    let mut rb = RecordingBuilder::new();
    decode(body.bytes(), &env, &mut rb).expect("call argument matches the declared signature");

    let values = rb.returns.last().unwrap();
    match rb.get(values[0]) {
        NodeOp::CallDirect(0, args) => assert_eq!(args.len(), 1),
        other => panic!("expected a direct call, found {other:?}"),
    }
}

#[test]
fn call_indirect_checks_dispatch_key_and_arguments() {
    let body = Program::new()
        .ret()
        .call_indirect(0)
        .get_local(0)
        .i32_const8(9);
    let env = TestEnv::new(&[ValueType::I32], &[ValueType::I32])
        .with_table_signature(&[ValueType::I32], &[ValueType::I32]);

    let mut rb = RecordingBuilder::new();
    decode(body.bytes(), &env, &mut rb).expect("dispatch key is i32, argument matches signature");

    let values = rb.returns.last().unwrap();
    match rb.get(values[0]) {
        NodeOp::CallIndirect(0, args) => assert_eq!(args.len(), 1),
        other => panic!("expected an indirect call, found {other:?}"),
    }
}

#[test]
fn mem_access_operand_rejects_reserved_bits() {
    let body = Program::new().load_mem_l(0b0001_0000).get_local(0);
    let env = TestEnv::new(&[ValueType::I32], &[]);

    let mut builder = NullBuilder;
    let err = decode(body.bytes(), &env, &mut builder).expect_err("bit 4 is reserved");
    assert_eq!(err.kind, DecodeErrorKind::UnrecognizedBits);
}

#[test]
fn mem_access_operand_rejects_i64_width_for_i32_store() {
    // width field 0b11 (64-bit) with an i32-typed value being stored.
    let body = Program::new().store_mem_l(0b0000_0011).get_local(0).i32_const8(1);
    let env = TestEnv::new(&[ValueType::I32], &[]);

    let mut builder = NullBuilder;
    let err = decode(body.bytes(), &env, &mut builder).expect_err("i64 width on an i32 store");
    assert_eq!(err.kind, DecodeErrorKind::InvalidWidth);
}

#[test]
fn break_depth_past_enclosing_blocks_is_rejected() {
    let body = Program::new().block(1).break_(1);
    let env = TestEnv::new(&[], &[]);

    let mut builder = NullBuilder;
    let err = decode(body.bytes(), &env, &mut builder).expect_err("only one block frame is open");
    assert_eq!(err.kind, DecodeErrorKind::ImproperlyNestedBreak);
}

#[test]
fn continue_into_a_block_rather_than_a_loop_is_rejected() {
    let body = Program::new().block(1).continue_(0);
    let env = TestEnv::new(&[], &[]);

    let mut builder = NullBuilder;
    let err = decode(body.bytes(), &env, &mut builder).expect_err("a block has no continue target");
    assert_eq!(err.kind, DecodeErrorKind::ImproperlyNestedContinue);
}

#[test]
fn switch_with_zero_cases_only_evaluates_the_key() {
    let body = Program::new().switch(0).get_local(0);
    let env = TestEnv::new(&[ValueType::I32], &[]);

    let mut builder = NullBuilder;
    decode(body.bytes(), &env, &mut builder).expect("a case-free switch just evaluates its key");
}

#[test]
fn decoding_the_same_body_twice_is_deterministic() {
    let body = Program::new()
        .ret()
        .binop(Opcode::I32Add)
        .get_local(0)
        .get_local(1);
    let env = TestEnv::new(&[ValueType::I32, ValueType::I32], &[ValueType::I32]);

    let mut rb_a = RecordingBuilder::new();
    let decoded_a = decode(body.bytes(), &env, &mut rb_a).unwrap();
    let mut rb_b = RecordingBuilder::new();
    let decoded_b = decode(body.bytes(), &env, &mut rb_b).unwrap();

    assert_eq!(decoded_a.arena.len(), decoded_b.arena.len());
    assert_eq!(decoded_a.roots.len(), decoded_b.roots.len());
    assert_eq!(rb_a.nodes, rb_b.nodes);
    assert_eq!(rb_a.returns, rb_b.returns);
}
