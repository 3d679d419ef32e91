// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! End-to-end scenarios against hand-built `MNML` artifacts, driving the
//! full `loader` → `deserialize` → `vm` pipeline the way `minvm::run_artifact`
//! does, without needing a front-end compiler or a file on disk.
//!
//! Each test is named after the behavior it exercises.

mod common;

use common::{build_artifact, chunk_bytes, function_const, int_const, string_const};
use minvm::deserialize::deserialize;
use minvm::intern::StringInterner;
use minvm::loader;
use minvm::object::{Heap, Object};
use minvm::opcode::op;
use minvm::value::Value;
use minvm::vm::Vm;

/// An artifact that is only the 4-byte header, nothing else.
#[test]
fn validation_rejects_truncated_artifact() {
    let bytes = b"MNML".to_vec();
    let err = loader::validate(&bytes).unwrap_err();
    assert!(err.to_string().contains("not valid"));
}

/// A structurally complete chunk followed by a zeroed-out checksum.
#[test]
fn validation_rejects_bad_checksum() {
    let chunk = chunk_bytes("", &[op::HALT], &[], &[]);
    let mut bytes = build_artifact(&chunk);
    let len = bytes.len();
    bytes[len - 4..].copy_from_slice(&[0, 0, 0, 0]);
    assert!(loader::validate(&bytes).is_err());
}

/// `PUSH_CONST 0` with constants `[Int(42)]` leaves one value, `42`, on
/// the stack.
#[test]
fn constant_int_push() {
    let chunk = chunk_bytes("", &[op::PUSH_CONST, 0, op::HALT], &[int_const(42)], &[]);
    let artifact = build_artifact(&chunk);
    loader::validate(&artifact).unwrap();

    let mut heap = Heap::new();
    let mut interner = StringInterner::new();
    let top = deserialize(&artifact, &mut heap, &mut interner).unwrap();
    let mut vm = Vm::new(top, heap, interner);
    assert_eq!(vm.run().unwrap(), Value::int(42));
}

/// Two separately encoded `"abc"` string constants intern to the same
/// object after deserialization.
#[test]
fn string_interning_collapses_equal_content() {
    let chunk = chunk_bytes("", &[], &[string_const("abc"), string_const("abc")], &[]);
    let artifact = build_artifact(&chunk);

    let mut heap = Heap::new();
    let mut interner = StringInterner::new();
    let top = deserialize(&artifact, &mut heap, &mut interner).unwrap();

    let (Value::Object(a), Value::Object(b)) = (top.constants[0], top.constants[1]) else {
        panic!("expected object constants");
    };
    let Object::StringObj(id_a) = heap.get(a) else {
        panic!("expected StringObj");
    };
    let Object::StringObj(id_b) = heap.get(b) else {
        panic!("expected StringObj");
    };
    assert_eq!(id_a, id_b);
}

/// `PUSH_CONST 1`, `PUSH_CONST 0`, integer `DIV` raises `DivByZero` with
/// a message containing "divide by zero", and the formatted diagnostic
/// names the chunk and the offending source position.
#[test]
fn division_by_zero_reports_runtime_error() {
    let code = vec![op::PUSH_CONST, 0, op::PUSH_CONST, 1, op::DIV, op::HALT];
    let meta = vec![(0, 0, 1), (0, 0, 1), (5, 9, 3), (0, 0, 1)];
    let chunk = chunk_bytes("main", &code, &[int_const(1), int_const(0)], &meta);
    let artifact = build_artifact(&chunk);

    let mut heap = Heap::new();
    let mut interner = StringInterner::new();
    let top = deserialize(&artifact, &mut heap, &mut interner).unwrap();
    let mut vm = Vm::new(top, heap, interner);

    let err = vm.run().unwrap_err();
    assert!(err.to_string().contains("divide by zero"));

    let report = vm.format_runtime_error(&err);
    assert!(report.contains("Runtime error"));
    assert!(report.contains("main"));
    assert!(report.contains("(6, 10)")); // line/col are 1-based in the report
}

/// Function `A(x)` builds a closure `B` capturing its local `x`, then calls
/// `B` *before* returning. `B` reads the upvalue while it is still open
/// (`x` still lives in `A`'s frame), and the value flows back through both
/// returns.
#[test]
fn closure_reads_open_upvalue_across_nested_call() {
    // Function B(): read upvalue 0, return it.
    let fn_b_code = vec![op::GET_UPVALUE, 0, op::RETURN];
    let fn_b_chunk = chunk_bytes("B", &fn_b_code, &[], &[]);

    // Function A(x): build closure over B capturing local 0 (= x), call it
    // with no arguments, return whatever B returned.
    let fn_a_code = vec![
        op::PUSH_CLOSURE,
        0, // function constant index (B)
        1,
        0,
        0,
        0, // upcount = 1
        1, // is_local = true
        0,
        0,
        0,
        0, // local slot 0
        op::CALL,
        0, // call B with 0 args
        op::RETURN,
    ];
    let fn_a_chunk = chunk_bytes("A", &fn_a_code, &[function_const(0, Some("B"), &fn_b_chunk)], &[]);

    // Top level: push closure A, push 7, call A(7), halt.
    let top_code = vec![
        op::PUSH_CLOSURE,
        1, // function constant index (A)
        0,
        0,
        0,
        0, // upcount = 0
        op::PUSH_CONST,
        0,
        op::CALL,
        1,
        op::HALT,
    ];
    let top_chunk = chunk_bytes(
        "",
        &top_code,
        &[int_const(7), function_const(1, Some("A"), &fn_a_chunk)],
        &[],
    );
    let artifact = build_artifact(&top_chunk);

    let mut heap = Heap::new();
    let mut interner = StringInterner::new();
    let top = deserialize(&artifact, &mut heap, &mut interner).unwrap();
    let mut vm = Vm::new(top, heap, interner);
    assert_eq!(vm.run().unwrap(), Value::int(7));
}

/// Function `A(x)` returns a closure `B` capturing its local `x` without
/// calling it. By the time the top level calls `B`, `A`'s frame has
/// already returned and the upvalue has closed — `B` must still observe
/// `x`'s last written value.
#[test]
fn closure_reads_closed_upvalue_after_return() {
    let fn_b_code = vec![op::GET_UPVALUE, 0, op::RETURN];
    let fn_b_chunk = chunk_bytes("B", &fn_b_code, &[], &[]);

    // Function A(x): build closure over B capturing local 0, return the
    // closure itself (not its result).
    let fn_a_code = vec![
        op::PUSH_CLOSURE,
        0,
        1,
        0,
        0,
        0,
        1,
        0,
        0,
        0,
        0,
        op::RETURN,
    ];
    let fn_a_chunk = chunk_bytes("A", &fn_a_code, &[function_const(0, Some("B"), &fn_b_chunk)], &[]);

    // Top level: call A(7) to get closure B back, then call B() directly.
    let top_code = vec![
        op::PUSH_CLOSURE,
        1,
        0,
        0,
        0,
        0,
        op::PUSH_CONST,
        0,
        op::CALL,
        1, // stack: [closure_B]
        op::CALL,
        0, // call closure_B with 0 args
        op::HALT,
    ];
    let top_chunk = chunk_bytes(
        "",
        &top_code,
        &[int_const(7), function_const(1, Some("A"), &fn_a_chunk)],
        &[],
    );
    let artifact = build_artifact(&top_chunk);

    let mut heap = Heap::new();
    let mut interner = StringInterner::new();
    let top = deserialize(&artifact, &mut heap, &mut interner).unwrap();
    let mut vm = Vm::new(top, heap, interner);
    assert_eq!(vm.run().unwrap(), Value::int(7));
}

/// End-to-end through the crate's single public entry point, `run_artifact`,
/// rather than driving `loader`/`deserialize`/`vm` by hand.
#[test]
fn run_artifact_executes_a_well_formed_program() {
    let chunk = chunk_bytes(
        "",
        &[
            op::PUSH_CONST,
            0,
            op::PUSH_CONST,
            1,
            op::ADD,
            op::HALT,
        ],
        &[int_const(40), int_const(2)],
        &[],
    );
    let artifact = build_artifact(&chunk);

    let path = std::env::temp_dir().join(format!(
        "minvm-run-artifact-test-{}.bin",
        std::process::id()
    ));
    std::fs::write(&path, &artifact).unwrap();
    let result = minvm::run_artifact(path.to_str().unwrap());
    std::fs::remove_file(&path).ok();

    assert_eq!(result.unwrap(), Value::int(42));
}
