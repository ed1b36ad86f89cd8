//! Error types for the VM
//!
//! [`VmError`] is the single error type raised by the value model, the
//! call protocol, the type system and the interpreter loop. A failed
//! [`Vm::run`](crate::vm::Vm::run) wraps it in a [`RuntimeError`] carrying
//! the back-trace of active frames.

use crate::bytecode::FilePos;
use std::fmt::Write as _;
use thiserror::Error;

/// VM runtime errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    // ===== Type errors =====
    /// Binary operator not defined for the operand kinds
    #[error("invalid operation: {left} {op} {right}")]
    InvalidOperation {
        left: String,
        op: String,
        right: String,
    },

    /// Unary operator not defined for the operand kind
    #[error("invalid operation: {op}{operand}")]
    InvalidUnaryOperation { op: &'static str, operand: String },

    #[error("not indexable: {0}")]
    NotIndexable(String),

    #[error("not iterable: {0}")]
    NotIterable(String),

    #[error("not callable: {0}")]
    NotCallable(String),

    /// Raised by native callables for a badly typed argument
    #[error("invalid type for argument '{name}': expected {expected}, found {found}")]
    InvalidArgumentType {
        name: String,
        expected: String,
        found: String,
    },

    /// [`VmError::InvalidArgumentType`] re-labelled with the callee
    #[error("invalid type for argument '{name}' in call to '{callee}': expected {expected}, found {found}")]
    InvalidArgumentTypeInCall {
        name: String,
        callee: String,
        expected: String,
        found: String,
    },

    // ===== Index errors =====
    #[error("invalid index type: {0}")]
    InvalidIndexType(String),

    #[error("invalid index value type: {0}")]
    InvalidIndexValueType(String),

    #[error("invalid index on error")]
    InvalidIndexOnError,

    /// Unknown key on a value with a fixed key set
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("index out of bounds")]
    IndexOutOfBounds,

    #[error("invalid slice index type: {0}")]
    InvalidSliceIndexType(String),

    #[error("invalid slice index: {low} > {high}")]
    InvalidSliceIndex { low: i64, high: i64 },

    #[error("not index-assignable: {0}")]
    NotIndexAssignable(String),

    #[error("not index-deletable: {0}")]
    NotIndexDeletable(String),

    #[error("property '{0}' is read-only")]
    ReadOnlyProperty(String),

    // ===== Arity errors =====
    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongNumArguments { want: usize, got: usize },

    #[error("wrong number of arguments: want>={want}, got={got}")]
    WrongNumArgumentsAtLeast { want: usize, got: usize },

    /// Raised by native callables; re-labelled with the callee name
    #[error("wrong number of arguments")]
    WrongArgumentCount,

    #[error("wrong number of arguments in call to '{0}'")]
    WrongArgumentCountInCall(String),

    #[error("unexpected kwarg {0:?}")]
    UnexpectedKwarg(String),

    #[error("unexpected kwargs")]
    UnexpectedKwargs,

    #[error("unexpected kwargs in call to '{0}'")]
    UnexpectedKwargsInCall(String),

    // ===== Capacity errors =====
    #[error("exceeding string size limit")]
    StringLimit,

    #[error("exceeding bytes size limit")]
    BytesLimit,

    #[error("exceeding array size limit")]
    ArrayLimit,

    #[error("allocation limit exceeded")]
    AllocationLimit,

    #[error("range step must be greater than 0")]
    InvalidRangeStep,

    // ===== Control errors =====
    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),

    /// Instruction pointer or operand outside the instruction stream
    #[error("invalid instruction at offset {0}")]
    InvalidInstruction(usize),

    /// Re-entrant call into a compiled function that is already executing
    #[error("compiled function is already running")]
    FunctionRunning,

    #[error("division by zero")]
    DivisionByZero,

    #[error("execution aborted")]
    Aborted,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    // ===== Conversion errors =====
    #[error("name of type is undefined")]
    UndefinedTypeName,

    #[error("name of type is empty")]
    EmptyTypeName,

    #[error("value {0} isn't convertible to method")]
    NotAMethod(String),

    #[error("{0}")]
    Conversion(String),
}

impl VmError {
    /// Attach the callee name to the argument errors native callables raise
    pub(crate) fn in_call(self, callee: &str) -> VmError {
        match self {
            VmError::WrongArgumentCount => VmError::WrongArgumentCountInCall(callee.to_string()),
            VmError::UnexpectedKwargs => VmError::UnexpectedKwargsInCall(callee.to_string()),
            VmError::InvalidArgumentType {
                name,
                expected,
                found,
            } => VmError::InvalidArgumentTypeInCall {
                name,
                callee: callee.to_string(),
                expected,
                found,
            },
            other => other,
        }
    }
}

/// Terminal error of a run, with one source position per active frame
/// (innermost first)
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Runtime Error: {error}{}", format_trace(.trace))]
pub struct RuntimeError {
    #[source]
    pub error: VmError,
    pub trace: Vec<FilePos>,
}

fn format_trace(trace: &[FilePos]) -> String {
    let mut out = String::new();
    for pos in trace {
        let _ = write!(out, "\n\tat {}", pos);
    }
    out
}
