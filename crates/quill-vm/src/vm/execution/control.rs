//! Control flow instruction execution

use crate::error::VmError;
use crate::opcode::OpCode;
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute control flow instructions. Jump targets are absolute.
    pub(crate) fn execute_control(&mut self, opcode: OpCode) -> Result<ExecutionResult, VmError> {
        match opcode {
            OpCode::Jump => {
                self.ip = self.read_u16()?;
            }

            OpCode::JumpFalsy => {
                let target = self.read_u16()?;
                if self.pop()?.is_falsy() {
                    self.ip = target;
                }
            }

            // `a && b`: a falsy `a` is the result
            OpCode::AndJump => {
                let target = self.read_u16()?;
                if self.top()?.is_falsy() {
                    self.ip = target;
                } else {
                    self.pop()?;
                }
            }

            // `a || b`: a truthy `a` is the result
            OpCode::OrJump => {
                let target = self.read_u16()?;
                if self.top()?.is_falsy() {
                    self.pop()?;
                } else {
                    self.ip = target;
                }
            }

            OpCode::Suspend => return Ok(ExecutionResult::Halt),

            other => return Err(VmError::UnknownOpcode(other.as_u8())),
        }
        Ok(ExecutionResult::Continue)
    }
}
