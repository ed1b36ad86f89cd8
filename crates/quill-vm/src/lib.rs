//! Quill Virtual Machine
//!
//! This crate implements an embeddable, stack-based bytecode virtual
//! machine with a dynamic, reflective type system. A compiler (not part
//! of this crate) produces a [`Bytecode`] program; a host wraps it in a
//! [`Vm`] together with a shared globals table and runs it.
//!
//! # Architecture
//!
//! - Variable-length instructions: one opcode byte plus fixed-width
//!   big-endian operands
//! - One operand stack shared by all frames; each frame owns a window of
//!   local slots starting at its base pointer
//! - Closures capture boxed upvalues; `GetLocalPtr` boxes a local in place
//! - Self tail calls reuse the running frame
//! - Native code calls back into compiled functions through a child VM
//!
//! # Modules
//!
//! - `opcode`: instruction set and encoding
//! - `bytecode`: function code, compiled programs, source positions
//! - `assembler`: instruction emission with jump patching
//! - `value`: runtime values and their capabilities
//! - `types`: script-defined types and instances
//! - `vm`: execution engine
//! - `builtins`: built-in function registry and implementations
//! - `config`: runtime limits
//! - `error`: error types

#![allow(clippy::result_large_err)]

pub mod assembler;
pub mod builtins;
pub mod bytecode;
pub mod bytecode_debug;
pub mod config;
pub mod error;
pub mod opcode;
pub mod types;
pub mod value;
pub mod vm;

// Re-export main types
pub use assembler::Assembler;
pub use builtins::register_builtin;
pub use bytecode::{Bytecode, CompiledFunction, FilePos, FunctionCode, SourceFileSet};
pub use bytecode_debug::{disassemble_function, format_instructions};
pub use config::VmConfig;
pub use error::{RuntimeError, VmError};
pub use opcode::instruction::make_instruction;
pub use opcode::{BinaryOp, OpCode};
pub use value::{Value, ValueMap};
pub use vm::{new_globals, AbortHandle, CallContext, Globals, RunContext, Vm};
