//! Instruction assembler
//!
//! Builds the instruction stream of one function. Compilers and tests emit
//! through it instead of concatenating `make_instruction` output by hand:
//! it tracks offsets, patches forward jumps and records the source map.

use crate::bytecode::{FunctionCode, Pos, NO_POS};
use crate::error::VmError;
use crate::opcode::instruction::{make_instruction, read_operands};
use crate::opcode::OpCode;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct Assembler {
    code: Vec<u8>,
    source_map: BTreeMap<usize, Pos>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction and return its offset
    pub fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        debug_assert!(
            op.operand_widths()
                .iter()
                .zip(operands)
                .all(|(&width, &operand)| operand < 1 << (8 * width)),
            "operand out of range for {}",
            op.name()
        );
        let offset = self.code.len();
        self.code.extend(make_instruction(op, operands));
        offset
    }

    /// Append a jump with a placeholder target; resolve it with
    /// [`Assembler::patch_jump`]
    pub fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit(op, &[0])
    }

    /// Point the jump at `at` to the current offset
    pub fn patch_jump(&mut self, at: usize) -> Result<(), VmError> {
        self.change_operand(at, self.offset())
    }

    /// Offset the next instruction will be written at
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Replace the first operand of the instruction at `at`
    pub fn change_operand(&mut self, at: usize, operand: usize) -> Result<(), VmError> {
        let op = self
            .code
            .get(at)
            .and_then(|&byte| OpCode::from_u8(byte))
            .ok_or(VmError::InvalidInstruction(at))?;
        let (mut operands, _) = read_operands(op.operand_widths(), &self.code[at + 1..])
            .ok_or(VmError::InvalidInstruction(at))?;
        let first = operands.first_mut().ok_or(VmError::InvalidInstruction(at))?;
        *first = operand;

        let patched = make_instruction(op, &operands);
        self.code[at..at + patched.len()].copy_from_slice(&patched);
        Ok(())
    }

    /// Attribute instructions emitted from here on to `pos`
    pub fn mark_source(&mut self, pos: Pos) {
        if pos != NO_POS {
            self.source_map.insert(self.offset(), pos);
        }
    }

    /// Raw instruction bytes emitted so far
    pub fn instructions(&self) -> &[u8] {
        &self.code
    }

    /// Finish into a [`FunctionCode`]; arity metadata is added with its
    /// builder methods
    pub fn finish(self) -> FunctionCode {
        FunctionCode::new(self.code).with_source_map(self.source_map)
    }
}
