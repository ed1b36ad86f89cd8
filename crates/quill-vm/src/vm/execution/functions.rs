//! Function call, return and closure instruction execution
//!
//! Call site stack layout, bottom to top:
//!
//! ```text
//! [callee] [arg 0 .. arg n-1] [spread array]? [kwargs map]? [var-kwargs map]?
//!          ^ start
//! ```
//!
//! A compiled callee's frame is based at `start`: its bound parameters are
//! written over the argument slots and the callee slot later receives the
//! return value.

use crate::bytecode::{CompiledFunction, FunctionCode};
use crate::error::VmError;
use crate::opcode::OpCode;
use crate::value::{Upvalue, Value, ValueMap};
use crate::vm::frame::Frame;
use crate::vm::result::ExecutionResult;
use crate::vm::Vm;
use log::trace;
use std::cell::RefCell;
use std::rc::Rc;

impl Vm {
    /// Execute function-related instructions
    pub(crate) fn execute_functions(
        &mut self,
        opcode: OpCode,
    ) -> Result<ExecutionResult, VmError> {
        match opcode {
            OpCode::Call => self.execute_call(),

            OpCode::Return => self.execute_return(),

            OpCode::Closure => {
                let index = self.read_u16()?;
                let num_free = self.read_u8()?;
                let code = match self.bytecode.constants.get(index) {
                    Some(Value::CompiledFunction(func)) => func.code.clone(),
                    Some(other) => return Err(VmError::NotCallable(other.type_name())),
                    None => return Err(VmError::InvalidInstruction(self.op_ip)),
                };

                // Boxed values are shared, anything else gets a fresh box
                let free: Vec<Upvalue> = self
                    .pop_n(num_free)?
                    .into_iter()
                    .map(|value| match value {
                        Value::ObjectPtr(boxed) => boxed,
                        other => Rc::new(RefCell::new(other)),
                    })
                    .collect();

                self.alloc()?;
                self.push(Value::function(CompiledFunction::from_code(code, free)))?;
                Ok(ExecutionResult::Continue)
            }

            OpCode::Callee => {
                let func = self.current_frame()?.func.clone();
                self.push(Value::CompiledFunction(func))?;
                Ok(ExecutionResult::Continue)
            }

            OpCode::CalledArgs => {
                let args = self.current_frame()?.args.clone();
                self.push(Value::immutable_array(args))?;
                Ok(ExecutionResult::Continue)
            }

            OpCode::CalledKwargs => {
                let kwargs = self.current_frame()?.kwargs.clone();
                self.push(Value::immutable_map(kwargs))?;
                Ok(ExecutionResult::Continue)
            }

            other => Err(VmError::UnknownOpcode(other.as_u8())),
        }
    }

    fn execute_call(&mut self) -> Result<ExecutionResult, VmError> {
        let num_args = self.read_u8()?;
        let has_var_args = self.read_u8()? != 0;
        let has_kwargs = self.read_u8()? != 0;
        let has_var_kwargs = self.read_u8()? != 0;

        let slots = num_args + has_var_args as usize + has_kwargs as usize + has_var_kwargs as usize;
        let start = self
            .sp
            .checked_sub(slots)
            .filter(|&start| start >= 1)
            .ok_or(VmError::StackUnderflow)?;

        let callee = self.stack[start - 1].clone();
        if !callee.is_callable() {
            return Err(VmError::NotCallable(callee.type_name()));
        }

        let mut args = self.stack[start..start + num_args].to_vec();
        let mut at = start + num_args;
        if has_var_args {
            match &self.stack[at] {
                Value::Array(items) | Value::ImmutableArray(items) => {
                    args.extend(items.borrow().iter().cloned())
                }
                other => {
                    return Err(VmError::InvalidArgumentType {
                        name: "*args".into(),
                        expected: "array".into(),
                        found: other.type_name(),
                    })
                }
            }
            at += 1;
        }

        let mut kwargs = ValueMap::new();
        for slot in at..self.sp {
            match &self.stack[slot] {
                Value::Map(map) | Value::ImmutableMap(map) => {
                    kwargs.extend(map.borrow().iter().map(|(k, v)| (k.clone(), v.clone())))
                }
                Value::Undefined => {}
                other => {
                    return Err(VmError::InvalidArgumentType {
                        name: "**kwargs".into(),
                        expected: "map".into(),
                        found: other.type_name(),
                    })
                }
            }
        }

        match &callee {
            Value::CompiledFunction(func) => self.call_compiled(func.clone(), args, kwargs, start),
            Value::BoundMethod(method) => match &method.func {
                Value::CompiledFunction(func) => {
                    args.insert(0, method.receiver.get()?);
                    self.call_compiled(func.clone(), args, kwargs, start)
                }
                func => {
                    let this = Some(method.receiver.get()?);
                    self.call_native(func.clone(), args, kwargs, this, false, start)
                }
            },
            _ => {
                // A method-flagged native takes the value below the callee as `this`
                let this = if callee.is_method() && start >= 2 {
                    Some(self.stack[start - 2].clone())
                } else {
                    None
                };
                let from_stack = this.is_some();
                self.call_native(callee.clone(), args, kwargs, this, from_stack, start)
            }
        }
    }

    /// Enter a compiled function, reusing the current frame for a direct
    /// self tail call
    fn call_compiled(
        &mut self,
        func: Rc<CompiledFunction>,
        args: Vec<Value>,
        kwargs: ValueMap,
        start: usize,
    ) -> Result<ExecutionResult, VmError> {
        let code = func.code.clone();
        let bound = bind_arguments(&code, &args, &kwargs)?;
        let frame_size = code.frame_size();

        let is_self_call = self
            .frames
            .last()
            .map_or(false, |frame| Rc::ptr_eq(&frame.func, &func));
        if is_self_call && self.followed_by_return() {
            let base = self.current_frame()?.base_pointer;
            if base + frame_size > self.stack.len() {
                return Err(VmError::StackOverflow);
            }
            let end = self.sp.max(base + frame_size);
            self.load_frame_slots(base, bound, end);
            self.sp = base + frame_size;
            self.ip = 0;
            if let Some(frame) = self.frames.last_mut() {
                frame.args = args;
                frame.kwargs = kwargs;
            }
            trace!("tail call reuses frame #{} (base {})", self.frames.len() - 1, base);
            return Ok(ExecutionResult::Continue);
        }

        if self.frame_depth() >= self.config.max_frames {
            return Err(VmError::StackOverflow);
        }
        if start + frame_size > self.stack.len() {
            return Err(VmError::StackOverflow);
        }

        let end = self.sp.max(start + frame_size);
        self.load_frame_slots(start, bound, end);

        if let Some(caller) = self.frames.last_mut() {
            caller.ip = self.ip;
        }
        self.frames.push(Frame::new(func, start).with_args(args, kwargs));
        self.cur_insts = code.instructions.clone();
        self.ip = 0;
        self.sp = start + frame_size;

        trace!(
            "push frame #{} (base {}, size {})",
            self.frames.len() - 1,
            start,
            frame_size
        );
        Ok(ExecutionResult::Continue)
    }

    /// Write bound parameters at `base` and clear everything up to `end`
    fn load_frame_slots(&mut self, base: usize, bound: Vec<Value>, end: usize) {
        let params = bound.len();
        for (slot, value) in self.stack[base..].iter_mut().zip(bound) {
            *slot = value;
        }
        for slot in &mut self.stack[base + params..end] {
            *slot = Value::Undefined;
        }
    }

    /// Whether the next instruction is `Return`, or `Pop` then `Return`
    fn followed_by_return(&self) -> bool {
        let op_at = |at: usize| self.cur_insts.get(at).copied().and_then(OpCode::from_u8);
        match op_at(self.ip) {
            Some(OpCode::Return) => true,
            Some(OpCode::Pop) => op_at(self.ip + 1) == Some(OpCode::Return),
            _ => false,
        }
    }

    /// Invoke a native callable (builtin, user function, type) from the
    /// run loop and leave its result on the stack. With a receiver taken
    /// from the stack, the result replaces the receiver.
    fn call_native(
        &mut self,
        func: Value,
        args: Vec<Value>,
        kwargs: ValueMap,
        this: Option<Value>,
        from_stack: bool,
        start: usize,
    ) -> Result<ExecutionResult, VmError> {
        let result = self.invoke_native(&func, args, kwargs, this)?;

        for slot in &mut self.stack[start - 1..self.sp] {
            *slot = Value::Undefined;
        }
        self.sp = start - 1;
        self.alloc()?;

        if from_stack {
            self.stack[self.sp - 1] = result;
        } else {
            self.push(result)?;
        }
        Ok(ExecutionResult::Continue)
    }

    fn execute_return(&mut self) -> Result<ExecutionResult, VmError> {
        let has_value = self.read_u8()? != 0;
        let result = if has_value {
            self.pop()?
        } else {
            Value::Undefined
        };

        // Top level: stop like Suspend
        if self.frames.len() <= 1 {
            return Ok(ExecutionResult::Halt);
        }

        let frame = self.frames.pop().ok_or(VmError::StackUnderflow)?;
        let base = frame.base_pointer;
        for slot in &mut self.stack[base..self.sp.max(base)] {
            *slot = Value::Undefined;
        }
        self.sp = base;
        self.stack[base - 1] = result;

        let (insts, ip) = {
            let caller = self.current_frame()?;
            (caller.func.code.instructions.clone(), caller.ip)
        };
        self.cur_insts = insts;
        self.ip = ip;
        Ok(ExecutionResult::Continue)
    }
}

/// Bind call arguments to a function's parameter slots:
/// positional args, the variadic array, declared kwargs in declaration
/// order, then the var-kwargs map.
pub(crate) fn bind_arguments(
    code: &FunctionCode,
    args: &[Value],
    kwargs: &ValueMap,
) -> Result<Vec<Value>, VmError> {
    let mut slots = Vec::with_capacity(code.param_slots());

    if code.var_args {
        if args.len() < code.num_args {
            return Err(VmError::WrongNumArgumentsAtLeast {
                want: code.num_args,
                got: args.len(),
            });
        }
        let (fixed, rest) = args.split_at(code.num_args);
        slots.extend_from_slice(fixed);
        slots.push(Value::array(rest.to_vec()));
    } else {
        if args.len() != code.num_args {
            return Err(VmError::WrongNumArguments {
                want: code.num_args,
                got: args.len(),
            });
        }
        slots.extend_from_slice(args);
    }

    if !code.var_kwargs {
        let mut unknown: Vec<&String> = kwargs
            .keys()
            .filter(|name| code.kwarg_index(name).is_none())
            .collect();
        unknown.sort();
        if let Some(name) = unknown.first() {
            return Err(if code.kwargs.is_empty() {
                VmError::UnexpectedKwargs
            } else {
                VmError::UnexpectedKwarg(name.to_string())
            });
        }
    }

    for (name, default) in code.kwargs.iter().zip(&code.kwargs_defaults) {
        let value = match kwargs.get(name) {
            None | Some(Value::Default) => default.clone(),
            Some(value) => value.clone(),
        };
        slots.push(value);
    }

    if code.var_kwargs {
        let rest = kwargs
            .iter()
            .filter(|(name, _)| code.kwarg_index(name).is_none())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        slots.push(Value::map(rest));
    }

    Ok(slots)
}
