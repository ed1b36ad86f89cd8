//! Bytecode format and data structures
//!
//! A compiled program is a [`Bytecode`]: the main function, a constant
//! pool and the [`SourceFileSet`] the source map positions refer to.
//! Function metadata lives in an immutable [`FunctionCode`] shared by
//! every [`CompiledFunction`] (closure) built from it.

use crate::bytecode_debug::format_instructions;
use crate::error::VmError;
use crate::value::{Upvalue, Value};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Offset into a [`SourceFileSet`]; 0 is "no position"
pub type Pos = usize;

pub const NO_POS: Pos = 0;

/// Resolved source position
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilePos {
    pub filename: String,
    pub line: usize,
    pub column: usize,
}

impl FilePos {
    pub fn new(filename: impl Into<String>, line: usize, column: usize) -> Self {
        FilePos {
            filename: filename.into(),
            line,
            column,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for FilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.filename.is_empty(), self.is_valid()) {
            (true, false) => write!(f, "-"),
            (false, false) => write!(f, "{}", self.filename),
            (true, true) => write!(f, "{}:{}", self.line, self.column),
            (false, true) => write!(f, "{}:{}:{}", self.filename, self.line, self.column),
        }
    }
}

/// One source file registered in a [`SourceFileSet`]
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    base: Pos,
    size: usize,
    /// Byte offsets of line starts
    lines: Vec<usize>,
}

impl SourceFile {
    /// Position of a byte offset inside this file
    pub fn pos(&self, offset: usize) -> Pos {
        self.base + offset.min(self.size)
    }

    fn position(&self, pos: Pos) -> FilePos {
        let offset = pos - self.base;
        let line = self.lines.partition_point(|&start| start <= offset);
        let line_start = self.lines.get(line.saturating_sub(1)).copied().unwrap_or(0);
        FilePos::new(self.name.clone(), line, offset - line_start + 1)
    }
}

/// Set of source files addressed by one flat position space
#[derive(Debug, Clone)]
pub struct SourceFileSet {
    base: Pos,
    files: Vec<SourceFile>,
}

impl Default for SourceFileSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceFileSet {
    pub fn new() -> Self {
        SourceFileSet {
            base: 1,
            files: Vec::new(),
        }
    }

    /// Register a file and return it
    pub fn add_file(&mut self, name: impl Into<String>, source: &str) -> &SourceFile {
        let mut lines = vec![0];
        lines.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        let file = SourceFile {
            name: name.into(),
            base: self.base,
            size: source.len(),
            lines,
        };
        self.base += file.size + 1;
        self.files.push(file);
        &self.files[self.files.len() - 1]
    }

    /// Resolve a position; unknown positions resolve to an invalid `FilePos`
    pub fn position(&self, pos: Pos) -> FilePos {
        if pos == NO_POS {
            return FilePos::default();
        }
        self.files
            .iter()
            .find(|f| pos >= f.base && pos <= f.base + f.size)
            .map(|f| f.position(pos))
            .unwrap_or_default()
    }
}

/// Immutable code and calling metadata of a compiled function
#[derive(Debug, Clone)]
pub struct FunctionCode {
    pub instructions: Rc<[u8]>,
    pub num_locals: usize,
    pub num_args: usize,
    pub var_args: bool,
    /// Keyword parameter names, in slot order
    pub kwargs: Vec<String>,
    /// Declared defaults, parallel to `kwargs`
    pub kwargs_defaults: Vec<Value>,
    pub var_kwargs: bool,
    pub is_method: bool,
    /// Instruction offset -> source position
    pub source_map: BTreeMap<usize, Pos>,
}

impl FunctionCode {
    pub fn new(instructions: Vec<u8>) -> Self {
        FunctionCode {
            instructions: instructions.into(),
            num_locals: 0,
            num_args: 0,
            var_args: false,
            kwargs: Vec::new(),
            kwargs_defaults: Vec::new(),
            var_kwargs: false,
            is_method: false,
            source_map: BTreeMap::new(),
        }
    }

    pub fn with_locals(mut self, num_locals: usize) -> Self {
        self.num_locals = num_locals;
        self
    }

    pub fn with_args(mut self, num_args: usize) -> Self {
        self.num_args = num_args;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.var_args = true;
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, default: Value) -> Self {
        self.kwargs.push(name.into());
        self.kwargs_defaults.push(default);
        self
    }

    pub fn with_var_kwargs(mut self) -> Self {
        self.var_kwargs = true;
        self
    }

    pub fn method(mut self) -> Self {
        self.is_method = true;
        self
    }

    pub fn with_source_map(mut self, source_map: BTreeMap<usize, Pos>) -> Self {
        self.source_map = source_map;
        self
    }

    /// Stack slots taken by bound parameters
    pub fn param_slots(&self) -> usize {
        self.num_args + self.var_args as usize + self.kwargs.len() + self.var_kwargs as usize
    }

    /// Stack slots reserved for a frame of this function
    pub fn frame_size(&self) -> usize {
        self.num_locals.max(self.param_slots())
    }

    pub fn kwarg_index(&self, name: &str) -> Option<usize> {
        self.kwargs.iter().position(|k| k == name)
    }

    /// Source position of the instruction at or before `ip`
    pub fn source_pos(&self, ip: usize) -> Pos {
        self.source_map
            .range(..=ip)
            .next_back()
            .map(|(_, &pos)| pos)
            .unwrap_or(NO_POS)
    }
}

/// Function value: shared code plus captured free-variable boxes
pub struct CompiledFunction {
    pub code: Rc<FunctionCode>,
    pub free: Vec<Upvalue>,
    running: Cell<bool>,
}

impl CompiledFunction {
    pub fn new(code: FunctionCode) -> Self {
        Self::from_code(Rc::new(code), Vec::new())
    }

    pub fn from_code(code: Rc<FunctionCode>, free: Vec<Upvalue>) -> Self {
        CompiledFunction {
            code,
            free,
            running: Cell::new(false),
        }
    }

    /// Whether a native-context call into this function is in progress
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Mark the function busy for the lifetime of the guard
    pub(crate) fn enter(&self) -> Result<RunningGuard<'_>, VmError> {
        if self.running.replace(true) {
            return Err(VmError::FunctionRunning);
        }
        Ok(RunningGuard(self))
    }

    /// Same code and free boxes, fresh busy flag
    pub fn duplicate(&self) -> Self {
        Self::from_code(self.code.clone(), self.free.clone())
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("num_args", &self.code.num_args)
            .field("num_locals", &self.code.num_locals)
            .field("free", &self.free.len())
            .field("size", &self.code.instructions.len())
            .finish()
    }
}

pub(crate) struct RunningGuard<'a>(&'a CompiledFunction);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.set(false);
    }
}

/// A compiled program
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub file_set: SourceFileSet,
    pub main: Rc<CompiledFunction>,
    pub constants: Vec<Value>,
}

impl Bytecode {
    pub fn new(main: FunctionCode, constants: Vec<Value>) -> Self {
        Bytecode {
            file_set: SourceFileSet::new(),
            main: Rc::new(CompiledFunction::new(main)),
            constants,
        }
    }

    pub fn with_file_set(mut self, file_set: SourceFileSet) -> Self {
        self.file_set = file_set;
        self
    }

    /// Disassembly of the main function and every compiled-function constant
    pub fn describe(&self) -> String {
        let mut out = String::from("Main:\n");
        for line in format_instructions(&self.main.code.instructions, 0) {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str("Constants:\n");
        for (i, constant) in self.constants.iter().enumerate() {
            match constant {
                Value::CompiledFunction(func) => {
                    out.push_str(&format!("[{:3}] (compiled-function)\n", i));
                    for line in format_instructions(&func.code.instructions, 0) {
                        out.push_str("     ");
                        out.push_str(&line);
                        out.push('\n');
                    }
                }
                other => out.push_str(&format!("[{:3}] {} ({})\n", i, other, other.type_name())),
            }
        }
        out
    }
}
