use super::helpers::*;
use crate::bytecode::{Bytecode, FunctionCode};
use crate::config::VmConfig;
use crate::error::VmError;
use crate::opcode::OpCode;
use crate::value::{Value, ValueMap};
use crate::vm::{new_globals, RunContext};
use std::thread;
use std::time::Duration;

// ============================================================================
// Allocation budget
// ============================================================================

fn arrays(count: usize) -> Program {
    let mut p = Program::new();
    for _ in 0..count {
        p.op(OpCode::Array, &[0]).op(OpCode::Pop, &[]);
    }
    p
}

#[test]
fn test_allocation_limit() {
    let config = VmConfig::default().with_max_allocs(2);
    let (_, result) = run_with_config(arrays(2), config.clone());
    assert!(result.is_ok());

    let (_, result) = run_with_config(arrays(3), config);
    assert_eq!(result.unwrap_err().error, VmError::AllocationLimit);
}

#[test]
fn test_zero_budget_rejects_first_allocation() {
    let (_, result) = run_with_config(arrays(1), VmConfig::default().with_max_allocs(0));
    assert_eq!(result.unwrap_err().error, VmError::AllocationLimit);
}

#[test]
fn test_budget_resets_between_runs() {
    let mut vm = vm_for(
        arrays(2).bytecode(),
        new_globals(0),
        VmConfig::default().with_max_allocs(2),
    );
    vm.run().unwrap();
    vm.run().unwrap();
}

#[test]
fn test_child_vm_shares_allocation_budget() {
    let bytecode = Bytecode::new(FunctionCode::new(vec![OpCode::Suspend.as_u8()]), vec![]);
    let mut vm = vm_for(bytecode, new_globals(0), VmConfig::default().with_max_allocs(3));
    let two_arrays = function(
        body(&[
            (OpCode::Array, &[0]),
            (OpCode::Pop, &[]),
            (OpCode::Array, &[0]),
            (OpCode::Pop, &[]),
            (OpCode::Return, &[0]),
        ]),
        |code| code,
    );

    assert_eq!(
        vm.call(&two_arrays, vec![], ValueMap::new()),
        Ok(Value::Undefined)
    );
    assert_eq!(
        vm.call(&two_arrays, vec![], ValueMap::new()),
        Err(VmError::AllocationLimit)
    );
}

// ============================================================================
// Stack and frame limits
// ============================================================================

#[test]
fn test_operand_stack_overflow() {
    let mut p = Program::new();
    for i in 0..5 {
        p.int(i);
    }
    let (_, result) = run_with_config(p, VmConfig::default().with_stack_size(4));
    assert_eq!(result.unwrap_err().error, VmError::StackOverflow);
}

#[test]
fn test_locals_larger_than_stack() {
    let (_, result) = run_with_config(Program::with_locals(8), VmConfig::default().with_stack_size(4));
    assert_eq!(result.unwrap_err().error, VmError::StackOverflow);
}

// ============================================================================
// Abort, cancellation and deadlines
// ============================================================================

/// g0 = 1; for {}
fn endless_loop() -> Program {
    let mut p = Program::new();
    p.int(1).op(OpCode::SetGlobal, &[0]);
    let top = p.asm.offset();
    p.op(OpCode::Jump, &[top]);
    p
}

#[test]
fn test_abort_before_run_is_cleared_afterwards() {
    let mut p = Program::new();
    p.int(1).op(OpCode::SetGlobal, &[0]);
    let mut vm = vm_for(p.bytecode(), new_globals(0), VmConfig::default());

    vm.abort();
    assert_eq!(vm.run().unwrap_err().error, VmError::Aborted);
    assert_eq!(vm.global(0), Value::Undefined);

    vm.run().unwrap();
    assert_eq!(vm.global(0), Value::Int(1));
}

#[test]
fn test_abort_from_another_thread() {
    let mut vm = vm_for(endless_loop().bytecode(), new_globals(0), VmConfig::default());
    let handle = vm.abort_handle();

    let aborter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.abort();
    });
    let err = vm.run().unwrap_err();
    aborter.join().unwrap();

    assert_eq!(err.error, VmError::Aborted);
    // effects before the abort remain
    assert_eq!(vm.global(0), Value::Int(1));
    assert!(!vm.abort_handle().is_aborted());
}

#[test]
fn test_cancelled_context() {
    let mut vm = vm_for(endless_loop().bytecode(), new_globals(0), VmConfig::default());
    let ctx = RunContext::new();
    ctx.cancel();
    assert_eq!(vm.run_context(&ctx).unwrap_err().error, VmError::Aborted);
}

#[test]
fn test_context_deadline() {
    let mut vm = vm_for(endless_loop().bytecode(), new_globals(0), VmConfig::default());
    let ctx = RunContext::new().with_timeout(Duration::from_millis(10));

    let err = vm.run_context(&ctx).unwrap_err();
    assert_eq!(err.error, VmError::DeadlineExceeded);
    assert_eq!(vm.global(0), Value::Int(1));
}

#[test]
fn test_context_cancelled_from_another_thread() {
    let mut vm = vm_for(endless_loop().bytecode(), new_globals(0), VmConfig::default());
    let ctx = RunContext::new();
    let remote = ctx.clone();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        remote.cancel();
    });
    let err = vm.run_context(&ctx).unwrap_err();
    canceller.join().unwrap();

    assert_eq!(err.error, VmError::Aborted);
}
