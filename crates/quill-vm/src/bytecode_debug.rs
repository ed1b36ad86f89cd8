//! Bytecode debugging utilities

use crate::bytecode::FunctionCode;
use crate::opcode::{instruction::read_operands, BinaryOp, OpCode};

/// Render an instruction stream, one line per instruction:
///
/// ```text
/// 0000 CONST   1
/// 0003 BINARYOP +
/// ```
pub fn format_instructions(code: &[u8], pos_offset: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < code.len() {
        let byte = code[i];
        let Some(op) = OpCode::from_u8(byte) else {
            out.push(format!("{:04} UNKNOWN({})", pos_offset + i, byte));
            i += 1;
            continue;
        };

        let Some((operands, read)) = read_operands(op.operand_widths(), &code[i + 1..]) else {
            out.push(format!("{:04} {:<7} <truncated>", pos_offset + i, op.name()));
            break;
        };

        let mut line = format!("{:04} {:<7}", pos_offset + i, op.name());
        match (op, operands.as_slice()) {
            (OpCode::BinaryOp, [token]) => match BinaryOp::from_u8(*token as u8) {
                Some(token) => line.push_str(&format!(" {}", token)),
                None => line.push_str(&format!(" ?{}", token)),
            },
            (_, operands) => {
                for operand in operands {
                    line.push_str(&format!(" {:<5}", operand));
                }
            }
        }
        out.push(line.trim_end().to_string());
        i += 1 + read;
    }
    out
}

/// Disassembly of one function with its calling metadata
pub fn disassemble_function(code: &FunctionCode, name: &str) -> String {
    let mut out = format!("========== Function: {} ==========\n", name);
    out.push_str(&format!(
        "Parameters: {}{}\n",
        code.num_args,
        if code.var_args { " (+variadic)" } else { "" }
    ));
    if !code.kwargs.is_empty() || code.var_kwargs {
        out.push_str(&format!(
            "Keywords: [{}]{}\n",
            code.kwargs.join(", "),
            if code.var_kwargs { " (+variadic)" } else { "" }
        ));
    }
    out.push_str(&format!("Locals: {}\n", code.num_locals));
    for line in format_instructions(&code.instructions, 0) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}
