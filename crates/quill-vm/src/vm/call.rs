//! Calling values from native code
//!
//! Native callables receive a [`CallContext`]; the host and native code
//! call back into script values through [`Vm::call`]. A compiled function
//! called this way runs in a child VM whose bottom frame is a small
//! trampoline (`CALL 0 1 0 1; SUSPEND`) applying the arguments, so the
//! calling VM's stack and frames are never touched.

use super::frame::Frame;
use super::Vm;
use crate::bytecode::{CompiledFunction, FunctionCode};
use crate::error::VmError;
use crate::opcode::OpCode;
use crate::types;
use crate::value::{Receiver, Value, ValueMap};
use log::debug;
use std::rc::Rc;

/// `CALL 0 1 0 1` applies a spread array and a var-kwargs map
const TRAMPOLINE: [u8; 6] = [
    OpCode::Call as u8,
    0,
    1,
    0,
    1,
    OpCode::Suspend as u8,
];

/// Everything a native callable sees of its invocation
pub struct CallContext<'vm> {
    pub vm: &'vm mut Vm,
    pub args: Vec<Value>,
    pub kwargs: ValueMap,
    /// Bound receiver, if the callable was invoked as a method
    pub this: Option<Value>,
}

impl<'vm> CallContext<'vm> {
    pub fn new(vm: &'vm mut Vm, args: Vec<Value>, kwargs: ValueMap, this: Option<Value>) -> Self {
        CallContext {
            vm,
            args,
            kwargs,
            this,
        }
    }

    /// Positional argument `index`, Undefined when absent
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Keyword argument `name`, Undefined when absent
    pub fn kwarg(&self, name: &str) -> Value {
        self.kwargs.get(name).cloned().unwrap_or_default()
    }

    /// Require `min..=max` positional arguments
    pub fn check_args(&self, min: usize, max: usize) -> Result<(), VmError> {
        if self.args.len() < min || self.args.len() > max {
            return Err(VmError::WrongArgumentCount);
        }
        Ok(())
    }

    /// Reject keyword arguments outside `allowed`
    pub fn check_kwargs(&self, allowed: &[&str]) -> Result<(), VmError> {
        if self.kwargs.keys().any(|k| !allowed.contains(&k.as_str())) {
            return Err(VmError::UnexpectedKwargs);
        }
        Ok(())
    }

    /// Call another value through the VM
    pub fn call(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: ValueMap,
    ) -> Result<Value, VmError> {
        self.vm.call(callee, args, kwargs)
    }
}

impl Vm {
    /// Call any callable value and return its result
    pub fn call(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: ValueMap,
    ) -> Result<Value, VmError> {
        match callee {
            Value::CompiledFunction(func) => self.call_in_child(func, args, kwargs),
            Value::BoundMethod(method) => {
                let receiver = method.receiver.get()?;
                match &method.func {
                    Value::CompiledFunction(func) => {
                        self.call_in_child(func, with_receiver(receiver, args), kwargs)
                    }
                    func => self.invoke_native(func, args, kwargs, Some(receiver)),
                }
            }
            other => self.invoke_native(other, args, kwargs, None),
        }
    }

    /// Call `callee` bound to `receiver`. A compiled function is called
    /// as is, so its busy flag guards against re-entry through accessors
    /// and constructors.
    pub fn call_method(
        &mut self,
        callee: &Value,
        receiver: Value,
        args: Vec<Value>,
        kwargs: ValueMap,
    ) -> Result<Value, VmError> {
        match callee {
            Value::CompiledFunction(func) => {
                self.call_in_child(func, with_receiver(receiver, args), kwargs)
            }
            other => {
                let bound = other.to_method_of(Receiver::Strong(receiver))?;
                self.call(&bound, args, kwargs)
            }
        }
    }

    /// Dispatch to a native callable. Argument errors it raises are
    /// labelled with the callee's name.
    pub(crate) fn invoke_native(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: ValueMap,
        this: Option<Value>,
    ) -> Result<Value, VmError> {
        let result = match callee {
            Value::Builtin(builtin) => {
                let func = builtin.func;
                func(&mut CallContext::new(self, args, kwargs, this))
            }
            Value::UserFunction(user) => {
                let func = user.func.clone();
                func(&mut CallContext::new(self, args, kwargs, this))
            }
            Value::Type(ty) => types::construct(self, ty, args, kwargs),
            Value::CompiledFunction(_) | Value::BoundMethod(_) => self.call(callee, args, kwargs),
            other => Err(VmError::NotCallable(other.type_name())),
        };
        result.map_err(|e| e.in_call(&callee.type_name()))
    }

    /// Run a compiled function to completion in a child VM
    fn call_in_child(
        &mut self,
        func: &Rc<CompiledFunction>,
        args: Vec<Value>,
        kwargs: ValueMap,
    ) -> Result<Value, VmError> {
        if self.nesting >= self.config.max_nested_calls {
            debug!("sub-VM call refused at nesting {}", self.nesting);
            return Err(VmError::StackOverflow);
        }
        let _running = func.enter()?;

        debug!(
            "sub-VM call: {} args, {} kwargs, budget {}, depth {}",
            args.len(),
            kwargs.len(),
            self.allocs,
            self.frame_depth()
        );

        let mut child = self.spawn_child();
        child.stack[0] = Value::CompiledFunction(func.clone());
        child.stack[1] = Value::array(args);
        child.stack[2] = Value::map(kwargs);
        child.sp = 3;

        let result = child.execute();
        self.allocs = child.allocs;
        result?;
        Ok(std::mem::take(&mut child.stack[0]))
    }

    /// Child VM sharing everything but the stacks. Its bottom frame counts
    /// toward the frame limit like any other.
    fn spawn_child(&self) -> Vm {
        let main = Rc::new(CompiledFunction::new(FunctionCode::new(TRAMPOLINE.to_vec())));
        let mut frames = Vec::with_capacity(16);
        frames.push(Frame::new(main.clone(), 0));
        Vm {
            bytecode: self.bytecode.clone(),
            cur_insts: main.code.instructions.clone(),
            main,
            globals: self.globals.clone(),
            builtins: self.builtins.clone(),
            stack: vec![Value::Undefined; self.config.stack_size.max(3)],
            sp: 0,
            frames,
            outer_frames: self.frame_depth(),
            nesting: self.nesting + 1,
            ip: 0,
            op_ip: 0,
            aborting: self.aborting.clone(),
            context: self.context.clone(),
            ticks: 0,
            allocs: self.allocs,
            config: self.config.clone(),
            is_child: true,
        }
    }
}

fn with_receiver(receiver: Value, args: Vec<Value>) -> Vec<Value> {
    let mut all = Vec::with_capacity(args.len() + 1);
    all.push(receiver);
    all.extend(args);
    all
}
