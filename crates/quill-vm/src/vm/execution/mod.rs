//! Instruction execution handlers
//!
//! Opcodes are grouped by concern; each group decodes its own operands.

mod arithmetic;
mod containers;
mod control;
mod functions;
mod iterators;
mod variables;

use crate::error::VmError;
use crate::opcode::OpCode;
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute a single decoded instruction
    pub(crate) fn execute_instruction(
        &mut self,
        opcode: OpCode,
    ) -> Result<ExecutionResult, VmError> {
        use OpCode::*;
        match opcode {
            // Constants, literals and variables
            Constant | Null | Default | True | False | Pop | SetGlobal | SetSelGlobal
            | GetGlobal | DefineLocal | SetLocal | SetSelLocal | GetLocal | GetBuiltin
            | GetLocalPtr | GetFree | SetFree | GetFreePtr | SetSelFree => {
                self.execute_variables(opcode)
            }

            // Operators
            BinaryOp | Equal | NotEqual | LNot | BComplement | Minus => {
                self.execute_arithmetic(opcode)
            }

            // Jumps and suspension
            JumpFalsy | AndJump | OrJump | Jump | Suspend => self.execute_control(opcode),

            // Container construction and indexing
            Array | Map | Error | Immutable | Index | SliceIndex => {
                self.execute_containers(opcode)
            }

            // Calls, returns and closures
            Call | Return | Closure | Callee | CalledArgs | CalledKwargs => {
                self.execute_functions(opcode)
            }

            // Iteration protocol
            IteratorInit | IteratorNext | IteratorKey | IteratorValue => {
                self.execute_iterators(opcode)
            }
        }
    }
}
