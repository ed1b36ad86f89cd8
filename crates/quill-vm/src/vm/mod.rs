//! Virtual Machine implementation
//!
//! One [`Vm`] executes one instruction stream against a fixed-capacity
//! operand stack and frame stack. Each frame's locals live on the operand
//! stack starting at its base pointer, with the callee in the slot just
//! below. Compiled functions invoked from native code (host callbacks,
//! property accessors, constructors) run in a child VM that shares the
//! globals, builtins, abort flag and allocation budget.

use crate::bytecode::{Bytecode, CompiledFunction, FilePos};
use crate::config::VmConfig;
use crate::error::{RuntimeError, VmError};
use crate::opcode::{instruction::read_u16, OpCode};
use crate::value::Value;
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Module structure
mod call;
mod execution;
mod frame;
pub mod iterator;
mod result;

// Re-export public types
pub use call::CallContext;
pub use iterator::ValueIterator;

// Internal imports
use frame::Frame;
use result::ExecutionResult;

/// Instructions executed between two looks at the run context
const CONTEXT_CHECK_INTERVAL: usize = 1024;

/// Global variable table, shareable between the host and VMs
pub type Globals = Rc<RefCell<Vec<Value>>>;

/// Create a globals table of `size` Undefined slots
pub fn new_globals(size: usize) -> Globals {
    Rc::new(RefCell::new(vec![Value::Undefined; size]))
}

/// Thread-safe handle requesting cooperative abort of a running VM
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Request abort; observed at the next instruction boundary
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Cancellation token plus optional deadline carried by a run
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel every run carrying this context (or a clone of it)
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Error describing why the run must stop, if it must
    pub fn check(&self) -> Result<(), VmError> {
        if self.is_cancelled() {
            return Err(VmError::Aborted);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(VmError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Virtual Machine
pub struct Vm {
    bytecode: Rc<Bytecode>,

    /// Function the bottom frame runs: the program's main function, or a
    /// call trampoline in a child VM
    main: Rc<CompiledFunction>,

    globals: Globals,

    /// Registry snapshot taken at construction
    builtins: Rc<[Value]>,

    /// Operand stack (fixed capacity)
    stack: Vec<Value>,
    sp: usize,

    /// Call stack; the last frame is the running one
    frames: Vec<Frame>,

    /// Frames held by the VMs this one is nested in
    outer_frames: usize,

    /// Number of enclosing VMs
    nesting: usize,

    /// Instructions and position of the running frame
    cur_insts: Rc<[u8]>,
    ip: usize,

    /// Offset of the instruction being executed
    op_ip: usize,

    aborting: Arc<AtomicBool>,
    context: Option<RunContext>,
    ticks: usize,

    /// Remaining allocation budget (see [`Vm::alloc`])
    allocs: i64,

    config: VmConfig,

    /// Child VMs leave the shared abort flag alone
    is_child: bool,
}

impl Vm {
    /// Create a VM for a compiled program. The globals table is grown to
    /// `config.globals_size` slots if it is smaller.
    pub fn new(bytecode: Rc<Bytecode>, globals: Globals, config: VmConfig) -> Self {
        {
            let mut table = globals.borrow_mut();
            if table.len() < config.globals_size {
                table.resize(config.globals_size, Value::Undefined);
            }
        }
        let main = bytecode.main.clone();
        Vm {
            cur_insts: main.code.instructions.clone(),
            main,
            bytecode,
            globals,
            builtins: crate::builtins::snapshot(),
            stack: vec![Value::Undefined; config.stack_size],
            sp: 0,
            frames: Vec::with_capacity(64),
            outer_frames: 0,
            nesting: 0,
            ip: 0,
            op_ip: 0,
            aborting: Arc::new(AtomicBool::new(false)),
            context: None,
            ticks: 0,
            allocs: config.max_allocs.saturating_add(1),
            config,
            is_child: false,
        }
    }

    /// Execute the program from the start until it halts or fails
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        debug!(
            "run: main {} bytes, {} constants, alloc budget {}",
            self.main.code.instructions.len(),
            self.bytecode.constants.len(),
            self.config.max_allocs
        );

        let result = self.reset().and_then(|_| self.execute());
        if !self.is_child {
            self.aborting.store(false, Ordering::Relaxed);
        }

        match result {
            Ok(()) => {
                if !self.is_stack_empty() {
                    warn!("run finished with {} values left on the stack", self.sp);
                }
                debug!("run finished");
                Ok(())
            }
            Err(error) => {
                debug!("run failed: {}", error);
                Err(RuntimeError {
                    trace: self.back_trace(),
                    error,
                })
            }
        }
    }

    /// Execute with a cancellation/deadline context
    pub fn run_context(&mut self, context: &RunContext) -> Result<(), RuntimeError> {
        let previous = self.context.replace(context.clone());
        let result = self.run();
        self.context = previous;
        result
    }

    /// Request cooperative abort of the current run
    pub fn abort(&self) {
        self.aborting.store(true, Ordering::Relaxed);
    }

    /// Handle for aborting this VM from another thread
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(self.aborting.clone())
    }

    /// Whether only the main function's locals remain on the stack
    pub fn is_stack_empty(&self) -> bool {
        self.sp <= self.main.code.frame_size()
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Value of one global slot (Undefined when out of range)
    pub fn global(&self, index: usize) -> Value {
        self.globals
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn bytecode(&self) -> &Rc<Bytecode> {
        &self.bytecode
    }

    fn reset(&mut self) -> Result<(), VmError> {
        let frame_size = self.main.code.frame_size();
        if frame_size > self.stack.len() {
            return Err(VmError::StackOverflow);
        }
        self.stack.iter_mut().for_each(|slot| *slot = Value::Undefined);
        self.sp = frame_size;
        self.frames.clear();
        self.frames.push(Frame::new(self.main.clone(), 0));
        self.cur_insts = self.main.code.instructions.clone();
        self.ip = 0;
        self.op_ip = 0;
        self.ticks = 0;
        self.allocs = self.config.max_allocs.saturating_add(1);
        Ok(())
    }

    /// Main execution loop
    fn execute(&mut self) -> Result<(), VmError> {
        loop {
            if self.aborting.load(Ordering::Relaxed) {
                debug!("abort observed at offset {}", self.ip);
                return Err(VmError::Aborted);
            }
            if self.ticks % CONTEXT_CHECK_INTERVAL == 0 {
                if let Some(context) = &self.context {
                    if let Err(e) = context.check() {
                        debug!("run context expired: {}", e);
                        self.abort();
                        return Err(e);
                    }
                }
            }
            self.ticks = self.ticks.wrapping_add(1);

            // Fetch and decode
            self.op_ip = self.ip;
            let byte = *self
                .cur_insts
                .get(self.ip)
                .ok_or(VmError::InvalidInstruction(self.ip))?;
            self.ip += 1;
            let opcode = OpCode::from_u8(byte).ok_or(VmError::UnknownOpcode(byte))?;

            match self.execute_instruction(opcode)? {
                ExecutionResult::Continue => {}
                ExecutionResult::Halt => return Ok(()),
            }
        }
    }

    /// One source position per active frame, innermost first
    fn back_trace(&self) -> Vec<FilePos> {
        let innermost = self.frames.len().saturating_sub(1);
        self.frames
            .iter()
            .enumerate()
            .rev()
            .map(|(i, frame)| {
                let ip = if i == innermost {
                    self.op_ip
                } else {
                    frame.ip.saturating_sub(1)
                };
                self.bytecode
                    .file_set
                    .position(frame.func.code.source_pos(ip))
            })
            .collect()
    }

    // ===== Stack helpers =====

    #[inline]
    pub(crate) fn push(&mut self, value: Value) -> Result<(), VmError> {
        let slot = self.stack.get_mut(self.sp).ok_or(VmError::StackOverflow)?;
        *slot = value;
        self.sp += 1;
        Ok(())
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Result<Value, VmError> {
        if self.sp == 0 {
            return Err(VmError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(std::mem::take(&mut self.stack[self.sp]))
    }

    #[inline]
    pub(crate) fn top(&self) -> Result<&Value, VmError> {
        self.sp
            .checked_sub(1)
            .map(|i| &self.stack[i])
            .ok_or(VmError::StackUnderflow)
    }

    /// Pop the top `n` values, bottom first
    pub(crate) fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, VmError> {
        let start = self.sp.checked_sub(n).ok_or(VmError::StackUnderflow)?;
        let values = self.stack[start..self.sp]
            .iter_mut()
            .map(std::mem::take)
            .collect();
        self.sp = start;
        Ok(values)
    }

    // ===== Operand helpers =====

    #[inline]
    pub(crate) fn read_u8(&mut self) -> Result<usize, VmError> {
        let byte = *self
            .cur_insts
            .get(self.ip)
            .ok_or(VmError::InvalidInstruction(self.op_ip))?;
        self.ip += 1;
        Ok(byte as usize)
    }

    #[inline]
    pub(crate) fn read_u16(&mut self) -> Result<usize, VmError> {
        let value =
            read_u16(&self.cur_insts, self.ip).ok_or(VmError::InvalidInstruction(self.op_ip))?;
        self.ip += 2;
        Ok(value as usize)
    }

    /// Frames in use by this VM and every VM it is nested in
    #[inline]
    pub(crate) fn frame_depth(&self) -> usize {
        self.outer_frames + self.frames.len()
    }

    /// Helper to get current frame
    #[inline]
    pub(crate) fn current_frame(&self) -> Result<&Frame, VmError> {
        self.frames.last().ok_or(VmError::StackUnderflow)
    }

    /// Charge one heap allocation against the budget
    #[inline]
    pub(crate) fn alloc(&mut self) -> Result<(), VmError> {
        if self.config.max_allocs < 0 {
            return Ok(());
        }
        self.allocs -= 1;
        if self.allocs <= 0 {
            return Err(VmError::AllocationLimit);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("sp", &self.sp)
            .field("frames", &self.frames.len())
            .field("nesting", &self.nesting)
            .field("ip", &self.ip)
            .field("allocs", &self.allocs)
            .field("is_child", &self.is_child)
            .finish()
    }
}
