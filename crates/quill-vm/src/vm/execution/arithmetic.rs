//! Operator instruction execution

use crate::error::VmError;
use crate::opcode::{BinaryOp, OpCode};
use crate::value::Value;
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute operator instructions
    pub(crate) fn execute_arithmetic(
        &mut self,
        opcode: OpCode,
    ) -> Result<ExecutionResult, VmError> {
        match opcode {
            OpCode::BinaryOp => {
                let token = self.read_u8()?;
                let op = BinaryOp::from_u8(token as u8)
                    .ok_or(VmError::InvalidInstruction(self.op_ip))?;
                let right = self.pop()?;
                let left = self.pop()?;
                let result = left.binary_op(op, &right)?;
                self.alloc()?;
                self.push(result)?;
            }

            OpCode::Equal => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(Value::Bool(left.equals(&right)))?;
            }

            OpCode::NotEqual => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(Value::Bool(!left.equals(&right)))?;
            }

            OpCode::LNot => {
                let operand = self.pop()?;
                self.push(Value::Bool(operand.is_falsy()))?;
            }

            OpCode::BComplement => {
                let result = self.pop()?.complement()?;
                self.alloc()?;
                self.push(result)?;
            }

            OpCode::Minus => {
                let result = self.pop()?.negate()?;
                self.alloc()?;
                self.push(result)?;
            }

            other => return Err(VmError::UnknownOpcode(other.as_u8())),
        }
        Ok(ExecutionResult::Continue)
    }
}
