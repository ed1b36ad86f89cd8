use super::helpers::*;
use crate::assembler::Assembler;
use crate::config::VmConfig;
use crate::error::VmError;
use crate::opcode::{BinaryOp, OpCode};
use crate::value::Value;

// ============================================================================
// Self tail calls reuse the running frame
// ============================================================================

/// sum := func(n, acc) { if n == 0 { return acc }; return sum(n - 1, acc + n) }
///
/// The recursive reference goes through `Callee`, so the call targets the
/// running function itself.
fn sum_function(p: &mut Program, pop_before_return: bool) -> usize {
    let zero = p.constant(Value::Int(0));
    let one = p.constant(Value::Int(1));

    let mut asm = Assembler::new();
    asm.emit(OpCode::GetLocal, &[0]);
    asm.emit(OpCode::Constant, &[zero]);
    asm.emit(OpCode::Equal, &[]);
    let to_recurse = asm.emit_jump(OpCode::JumpFalsy);
    asm.emit(OpCode::GetLocal, &[1]);
    asm.emit(OpCode::Return, &[1]);

    asm.patch_jump(to_recurse).unwrap();
    asm.emit(OpCode::Callee, &[]);
    asm.emit(OpCode::GetLocal, &[0]);
    asm.emit(OpCode::Constant, &[one]);
    asm.emit(OpCode::BinaryOp, &[bin(BinaryOp::Sub)]);
    asm.emit(OpCode::GetLocal, &[1]);
    asm.emit(OpCode::GetLocal, &[0]);
    asm.emit(OpCode::BinaryOp, &[bin(BinaryOp::Add)]);
    asm.emit(OpCode::Call, &[2, 0, 0, 0]);
    if pop_before_return {
        // statement-position call: result discarded, frame still reusable
        asm.emit(OpCode::Pop, &[]);
        asm.emit(OpCode::Return, &[0]);
    } else {
        asm.emit(OpCode::Return, &[1]);
    }

    p.constant(function(asm, |code| code.with_args(2)))
}

fn call_sum(n: i64, config: VmConfig) -> Result<Value, VmError> {
    let mut p = Program::new();
    let sum = sum_function(&mut p, false);
    p.op(OpCode::Constant, &[sum]).int(n).int(0).call(2);
    p.op(OpCode::SetGlobal, &[0]);

    let (vm, result) = run_with_config(p, config);
    result.map(|_| vm.global(0)).map_err(|e| e.error)
}

#[test]
fn test_tail_recursion_runs_in_constant_frames() {
    assert_eq!(
        call_sum(100_000, VmConfig::default()),
        Ok(Value::Int(5_000_050_000))
    );
}

#[test]
fn test_tail_recursion_fits_tiny_frame_limit() {
    let config = VmConfig::default().with_max_frames(8);
    assert_eq!(call_sum(10_000, config), Ok(Value::Int(50_005_000)));
}

#[test]
fn test_tail_call_followed_by_pop_return() {
    let mut p = Program::new();
    let sum = sum_function(&mut p, true);
    p.op(OpCode::Constant, &[sum]).int(50_000).int(0).call(2);
    p.op(OpCode::SetGlobal, &[0]);

    let (vm, result) = run_with_config(p, VmConfig::default().with_max_frames(4));
    result.unwrap();
    assert!(vm.is_stack_empty());
}

// ============================================================================
// Ordinary recursion is bounded by the frame limit
// ============================================================================

/// deep := func(n) { if n == 0 { return 0 }; return 1 + deep(n - 1) }
fn call_deep(n: i64, max_frames: usize) -> Result<Value, VmError> {
    let mut p = Program::new();
    let zero = p.constant(Value::Int(0));
    let one = p.constant(Value::Int(1));

    let mut asm = Assembler::new();
    asm.emit(OpCode::GetLocal, &[0]);
    asm.emit(OpCode::Constant, &[zero]);
    asm.emit(OpCode::Equal, &[]);
    let to_recurse = asm.emit_jump(OpCode::JumpFalsy);
    asm.emit(OpCode::Constant, &[zero]);
    asm.emit(OpCode::Return, &[1]);

    asm.patch_jump(to_recurse).unwrap();
    asm.emit(OpCode::Constant, &[one]);
    asm.emit(OpCode::Callee, &[]);
    asm.emit(OpCode::GetLocal, &[0]);
    asm.emit(OpCode::Constant, &[one]);
    asm.emit(OpCode::BinaryOp, &[bin(BinaryOp::Sub)]);
    asm.emit(OpCode::Call, &[1, 0, 0, 0]);
    asm.emit(OpCode::BinaryOp, &[bin(BinaryOp::Add)]);
    asm.emit(OpCode::Return, &[1]);
    let deep = p.constant(function(asm, |code| code.with_args(1)));

    p.op(OpCode::Constant, &[deep]).int(n).call(1);
    p.op(OpCode::SetGlobal, &[0]);

    let config = VmConfig::default().with_max_frames(max_frames);
    let (vm, result) = run_with_config(p, config);
    result.map(|_| vm.global(0)).map_err(|e| e.error)
}

#[test]
fn test_non_tail_recursion_within_limit() {
    assert_eq!(call_deep(10, 16), Ok(Value::Int(10)));
}

#[test]
fn test_non_tail_recursion_overflows() {
    assert_eq!(call_deep(100, 16), Err(VmError::StackOverflow));
}

#[test]
fn test_call_through_other_function_is_not_reused() {
    // outer := func(n) { return sum(n, 0) } is a tail call, but to a
    // different function, so it pushes a frame
    let mut p = Program::new();
    let sum = sum_function(&mut p, false);

    let mut asm = Assembler::new();
    let zero = p.constant(Value::Int(0));
    asm.emit(OpCode::Constant, &[sum]);
    asm.emit(OpCode::GetLocal, &[0]);
    asm.emit(OpCode::Constant, &[zero]);
    asm.emit(OpCode::Call, &[2, 0, 0, 0]);
    asm.emit(OpCode::Return, &[1]);
    let outer = p.constant(function(asm, |code| code.with_args(1)));

    p.op(OpCode::Constant, &[outer]).int(4).call(1);
    p.op(OpCode::SetGlobal, &[0]);

    // main + outer + sum
    let (vm, result) = run_with_config(p, VmConfig::default().with_max_frames(3));
    result.unwrap();
    assert_eq!(vm.global(0), Value::Int(10));
}
