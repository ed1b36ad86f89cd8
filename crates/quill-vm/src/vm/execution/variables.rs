//! Constant, global, local and free-variable instruction execution
//!
//! A local slot may hold an upvalue box ([`Value::ObjectPtr`]) once a
//! closure has captured it; reads dereference the box and `SetLocal`
//! writes through it, so every closure sharing the box sees the update.

use crate::error::VmError;
use crate::opcode::OpCode;
use crate::value::Value;
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;
use std::cell::RefCell;
use std::rc::Rc;

impl Vm {
    /// Execute constant and variable instructions
    pub(crate) fn execute_variables(
        &mut self,
        opcode: OpCode,
    ) -> Result<ExecutionResult, VmError> {
        match opcode {
            OpCode::Constant => {
                let index = self.read_u16()?;
                let constant = self
                    .bytecode
                    .constants
                    .get(index)
                    .cloned()
                    .ok_or(VmError::InvalidInstruction(self.op_ip))?;
                self.push(constant)?;
            }

            OpCode::Null => self.push(Value::Undefined)?,
            OpCode::Default => self.push(Value::Default)?,
            OpCode::True => self.push(Value::Bool(true))?,
            OpCode::False => self.push(Value::Bool(false))?,

            OpCode::Pop => {
                self.pop()?;
            }

            // ===== Globals =====
            OpCode::GetGlobal => {
                let index = self.read_u16()?;
                let value = self
                    .globals
                    .borrow()
                    .get(index)
                    .cloned()
                    .ok_or(VmError::InvalidInstruction(self.op_ip))?;
                self.push(value)?;
            }

            OpCode::SetGlobal => {
                let index = self.read_u16()?;
                let value = self.pop()?;
                let mut globals = self.globals.borrow_mut();
                let slot = globals
                    .get_mut(index)
                    .ok_or(VmError::InvalidInstruction(self.op_ip))?;
                *slot = value;
            }

            OpCode::SetSelGlobal => {
                let index = self.read_u16()?;
                let num_selectors = self.read_u8()?;
                let target = self
                    .globals
                    .borrow()
                    .get(index)
                    .cloned()
                    .ok_or(VmError::InvalidInstruction(self.op_ip))?;
                self.assign_selectors(target, num_selectors)?;
            }

            // ===== Locals =====
            OpCode::GetLocal => {
                let slot = self.local_slot()?;
                let value = match &self.stack[slot] {
                    Value::ObjectPtr(boxed) => boxed.borrow().clone(),
                    other => other.clone(),
                };
                self.push(value)?;
            }

            OpCode::SetLocal => {
                let slot = self.local_slot()?;
                let value = self.pop()?;
                match &mut self.stack[slot] {
                    Value::ObjectPtr(boxed) => *boxed.borrow_mut() = value,
                    local => *local = value,
                }
            }

            OpCode::DefineLocal => {
                let slot = self.local_slot()?;
                let value = self.pop()?;
                self.stack[slot] = value;
            }

            OpCode::SetSelLocal => {
                let slot = self.local_slot()?;
                let num_selectors = self.read_u8()?;
                let target = match &self.stack[slot] {
                    Value::ObjectPtr(boxed) => boxed.borrow().clone(),
                    other => other.clone(),
                };
                self.assign_selectors(target, num_selectors)?;
            }

            // Box the local in place so closures can share it
            OpCode::GetLocalPtr => {
                let slot = self.local_slot()?;
                let boxed = match &mut self.stack[slot] {
                    Value::ObjectPtr(boxed) => boxed.clone(),
                    local => {
                        let boxed = Rc::new(RefCell::new(std::mem::take(local)));
                        *local = Value::ObjectPtr(boxed.clone());
                        boxed
                    }
                };
                self.push(Value::ObjectPtr(boxed))?;
            }

            // ===== Builtins =====
            OpCode::GetBuiltin => {
                let index = self.read_u8()?;
                let builtin = self
                    .builtins
                    .get(index)
                    .cloned()
                    .ok_or(VmError::InvalidInstruction(self.op_ip))?;
                self.push(builtin)?;
            }

            // ===== Free variables =====
            OpCode::GetFree => {
                let index = self.read_u8()?;
                let value = self.current_frame()?.free(index)?.borrow().clone();
                self.push(value)?;
            }

            OpCode::SetFree => {
                let index = self.read_u8()?;
                let value = self.pop()?;
                *self.current_frame()?.free(index)?.borrow_mut() = value;
            }

            OpCode::GetFreePtr => {
                let index = self.read_u8()?;
                let boxed = self.current_frame()?.free(index)?.clone();
                self.push(Value::ObjectPtr(boxed))?;
            }

            OpCode::SetSelFree => {
                let index = self.read_u8()?;
                let num_selectors = self.read_u8()?;
                let target = self.current_frame()?.free(index)?.borrow().clone();
                self.assign_selectors(target, num_selectors)?;
            }

            other => return Err(VmError::UnknownOpcode(other.as_u8())),
        }
        Ok(ExecutionResult::Continue)
    }

    /// Read a local index operand and resolve it to a stack slot
    fn local_slot(&mut self) -> Result<usize, VmError> {
        let index = self.read_u8()?;
        let slot = self.current_frame()?.base_pointer + index;
        if slot >= self.stack.len() {
            return Err(VmError::StackOverflow);
        }
        Ok(slot)
    }

    /// Selector assignment: stack holds `value, sel0 .. sel(n-1)`.
    /// Selectors n-1 down to 1 are walked with index get; the last
    /// container reached receives `container[sel0] = value`.
    fn assign_selectors(&mut self, target: Value, num_selectors: usize) -> Result<(), VmError> {
        let selectors = self.pop_n(num_selectors)?;
        let value = self.pop()?;
        let Some((first, rest)) = selectors.split_first() else {
            return Err(VmError::InvalidInstruction(self.op_ip));
        };

        let mut container = target;
        for selector in rest.iter().rev() {
            container = container.index_get(self, selector)?;
        }
        container.index_set(self, first.clone(), value)
    }
}
