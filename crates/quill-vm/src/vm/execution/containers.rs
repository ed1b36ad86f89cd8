//! Container construction and indexing instruction execution

use crate::error::VmError;
use crate::opcode::OpCode;
use crate::value::{Value, ValueMap};
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute container instructions
    pub(crate) fn execute_containers(
        &mut self,
        opcode: OpCode,
    ) -> Result<ExecutionResult, VmError> {
        match opcode {
            OpCode::Array => {
                let count = self.read_u16()?;
                let items = self.pop_n(count)?;
                self.alloc()?;
                self.push(Value::array(items))?;
            }

            // Operand counts stack elements: key, value, key, value...
            OpCode::Map => {
                let count = self.read_u16()?;
                let elements = self.pop_n(count)?;
                let mut map = ValueMap::with_capacity(count / 2);
                let mut pairs = elements.into_iter();
                while let Some(key) = pairs.next() {
                    let value = pairs.next().unwrap_or_default();
                    let key = key
                        .to_key_string()
                        .ok_or_else(|| VmError::InvalidIndexType(key.type_name()))?;
                    map.insert(key, value);
                }
                self.alloc()?;
                self.push(Value::map(map))?;
            }

            OpCode::Error => {
                let value = self.pop()?;
                self.alloc()?;
                self.push(Value::error(value))?;
            }

            // Re-tag the shared storage; elements are not copied
            OpCode::Immutable => {
                let value = match self.pop()? {
                    Value::Array(items) => {
                        self.alloc()?;
                        Value::ImmutableArray(items)
                    }
                    Value::Map(map) => {
                        self.alloc()?;
                        Value::ImmutableMap(map)
                    }
                    other => other,
                };
                self.push(value)?;
            }

            OpCode::Index => {
                let index = self.pop()?;
                let target = self.pop()?;
                let value = target.index_get(self, &index)?;
                self.push(value)?;
            }

            OpCode::SliceIndex => {
                let high = self.pop()?;
                let low = self.pop()?;
                let target = self.pop()?;
                let value = target.slice(&low, &high)?;
                self.alloc()?;
                self.push(value)?;
            }

            other => return Err(VmError::UnknownOpcode(other.as_u8())),
        }
        Ok(ExecutionResult::Continue)
    }
}
