//! Iteration protocol instruction execution

use crate::error::VmError;
use crate::opcode::OpCode;
use crate::value::{shared, Shared, Value};
use crate::vm::iterator::ValueIterator;
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;

impl Vm {
    /// Execute iterator instructions
    pub(crate) fn execute_iterators(
        &mut self,
        opcode: OpCode,
    ) -> Result<ExecutionResult, VmError> {
        match opcode {
            OpCode::IteratorInit => {
                let iterable = self.pop()?;
                let iterator = ValueIterator::new(&iterable)?;
                self.alloc()?;
                self.push(Value::Iterator(shared(iterator)))?;
            }

            OpCode::IteratorNext => {
                let iterator = self.pop_iterator()?;
                let more = iterator.borrow_mut().next();
                self.push(Value::Bool(more))?;
            }

            OpCode::IteratorKey => {
                let key = self.pop_iterator()?.borrow().key();
                self.push(key)?;
            }

            OpCode::IteratorValue => {
                let value = self.pop_iterator()?.borrow().value();
                self.push(value)?;
            }

            other => return Err(VmError::UnknownOpcode(other.as_u8())),
        }
        Ok(ExecutionResult::Continue)
    }

    fn pop_iterator(&mut self) -> Result<Shared<ValueIterator>, VmError> {
        match self.pop()? {
            Value::Iterator(iterator) => Ok(iterator),
            other => Err(VmError::NotIterable(other.type_name())),
        }
    }
}
