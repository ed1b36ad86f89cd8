//! Call frame implementation

use crate::bytecode::CompiledFunction;
use crate::error::VmError;
use crate::value::{Upvalue, Value, ValueMap};
use std::rc::Rc;

/// One active call.
///
/// The frame's locals live on the shared operand stack starting at
/// `base_pointer`; the callee value itself sits just below it.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub func: Rc<CompiledFunction>,
    /// Positional arguments as received (after spreading)
    pub args: Vec<Value>,
    pub kwargs: ValueMap,
    /// Resume offset in the caller while a callee frame runs
    pub ip: usize,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(func: Rc<CompiledFunction>, base_pointer: usize) -> Self {
        Frame {
            func,
            args: Vec::new(),
            kwargs: ValueMap::new(),
            ip: 0,
            base_pointer,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>, kwargs: ValueMap) -> Self {
        self.args = args;
        self.kwargs = kwargs;
        self
    }

    /// Captured free-variable box
    #[inline]
    pub fn free(&self, index: usize) -> Result<&Upvalue, VmError> {
        self.func
            .free
            .get(index)
            .ok_or(VmError::InvalidInstruction(self.ip))
    }
}
