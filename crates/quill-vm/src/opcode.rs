//! OpCode definitions for the Quill VM
//!
//! This module defines the complete instruction set for the VM.
//! Every instruction is one opcode byte followed by zero or more
//! operands. Operand widths are fixed per opcode (see
//! [`OpCode::operand_widths`]) and multi-byte operands are big-endian:
//!
//! ```text
//! [CONST][hi][lo]            load constant #((hi << 8) | lo)
//! [CALL][args][spread][kws][varkw]
//! ```
//!
//! Jump operands are absolute instruction offsets.

use std::fmt;

/// Virtual machine instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ===== Constants & literals =====
    /// Push constant: K[u16]
    Constant = 0,
    /// Push Undefined
    Null = 1,
    /// Push the Default sentinel
    Default = 2,
    /// Push true
    True = 3,
    /// Push false
    False = 4,

    // ===== Operators =====
    /// Pop right, left; push left <op> right (operand: BinaryOp token)
    BinaryOp = 10,
    /// Pop two values; push equality
    Equal = 11,
    /// Pop two values; push inequality
    NotEqual = 12,
    /// Logical not
    LNot = 13,
    /// Bitwise complement
    BComplement = 14,
    /// Numeric negation
    Minus = 15,

    // ===== Stack =====
    /// Discard top of stack
    Pop = 20,

    // ===== Jumps =====
    /// Pop; jump if falsy
    JumpFalsy = 25,
    /// Jump if falsy, keeping the value; pop otherwise
    AndJump = 26,
    /// Jump if truthy, keeping the value; pop otherwise
    OrJump = 27,
    /// Unconditional jump
    Jump = 28,

    // ===== Variables =====
    /// Pop into global slot
    SetGlobal = 30,
    /// Selector assignment into a global (slot, selector count)
    SetSelGlobal = 31,
    /// Push global slot
    GetGlobal = 32,
    /// Pop into local slot, replacing any box
    DefineLocal = 33,
    /// Pop into local slot, writing through a box
    SetLocal = 34,
    /// Selector assignment into a local (slot, selector count)
    SetSelLocal = 35,
    /// Push local slot, dereferencing a box
    GetLocal = 36,
    /// Push builtin by registry index
    GetBuiltin = 37,
    /// Box the local slot in place and push the box
    GetLocalPtr = 38,
    /// Push free variable value
    GetFree = 39,
    /// Pop into free variable
    SetFree = 40,
    /// Push free variable box
    GetFreePtr = 41,
    /// Selector assignment into a free variable (slot, selector count)
    SetSelFree = 42,

    // ===== Containers =====
    /// Build Array from the top n values
    Array = 50,
    /// Build Map from the top n values (key, value pairs)
    Map = 51,
    /// Wrap top of stack in an Error
    Error = 52,
    /// Freeze Array/Map into its immutable counterpart
    Immutable = 53,
    /// Pop index, container; push container[index]
    Index = 54,
    /// Pop high, low, container; push container[low:high]
    SliceIndex = 55,

    // ===== Functions =====
    /// Call (positional count, spread flag, keyword flag, var-keyword flag)
    Call = 60,
    /// Return from function (1 = with value)
    Return = 61,
    /// Build closure from constant function and n free values
    Closure = 62,
    /// Push the running function
    Callee = 63,
    /// Push the running frame's positional arguments
    CalledArgs = 64,
    /// Push the running frame's keyword arguments
    CalledKwargs = 65,

    // ===== Iteration =====
    /// Pop iterable; push iterator
    IteratorInit = 70,
    /// Pop iterator; push whether it advanced
    IteratorNext = 71,
    /// Pop iterator; push current key
    IteratorKey = 72,
    /// Pop iterator; push current value
    IteratorValue = 73,

    // ===== Control =====
    /// Stop the run without error
    Suspend = 80,
}

impl OpCode {
    /// Convert from u8
    pub fn from_u8(byte: u8) -> Option<Self> {
        use OpCode::*;
        Some(match byte {
            0 => Constant,
            1 => Null,
            2 => Default,
            3 => True,
            4 => False,
            10 => BinaryOp,
            11 => Equal,
            12 => NotEqual,
            13 => LNot,
            14 => BComplement,
            15 => Minus,
            20 => Pop,
            25 => JumpFalsy,
            26 => AndJump,
            27 => OrJump,
            28 => Jump,
            30 => SetGlobal,
            31 => SetSelGlobal,
            32 => GetGlobal,
            33 => DefineLocal,
            34 => SetLocal,
            35 => SetSelLocal,
            36 => GetLocal,
            37 => GetBuiltin,
            38 => GetLocalPtr,
            39 => GetFree,
            40 => SetFree,
            41 => GetFreePtr,
            42 => SetSelFree,
            50 => Array,
            51 => Map,
            52 => Error,
            53 => Immutable,
            54 => Index,
            55 => SliceIndex,
            60 => Call,
            61 => Return,
            62 => Closure,
            63 => Callee,
            64 => CalledArgs,
            65 => CalledKwargs,
            70 => IteratorInit,
            71 => IteratorNext,
            72 => IteratorKey,
            73 => IteratorValue,
            80 => Suspend,
            _ => return None,
        })
    }

    /// Convert to u8
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Operand widths in bytes, in encoding order
    pub fn operand_widths(self) -> &'static [usize] {
        use OpCode::*;
        match self {
            Constant | JumpFalsy | AndJump | OrJump | Jump | SetGlobal | GetGlobal | Array
            | Map => &[2],
            SetSelGlobal | Closure => &[2, 1],
            BinaryOp | Return | DefineLocal | SetLocal | GetLocal | GetBuiltin | GetLocalPtr
            | GetFree | SetFree | GetFreePtr => &[1],
            SetSelLocal | SetSelFree => &[1, 1],
            Call => &[1, 1, 1, 1],
            Null | Default | True | False | Equal | NotEqual | LNot | BComplement | Minus
            | Pop | Error | Immutable | Index | SliceIndex | Callee | CalledArgs
            | CalledKwargs | IteratorInit | IteratorNext | IteratorKey | IteratorValue
            | Suspend => &[],
        }
    }

    /// Encoded size of the instruction, opcode byte included
    pub fn size(self) -> usize {
        1 + self.operand_widths().iter().sum::<usize>()
    }

    /// Get opcode name for debugging
    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            Constant => "CONST",
            Null => "NULL",
            Default => "DEFAULT",
            True => "TRUE",
            False => "FALSE",
            BinaryOp => "BINARYOP",
            Equal => "EQL",
            NotEqual => "NEQ",
            LNot => "NOT",
            BComplement => "NEG",
            Minus => "MINUS",
            Pop => "POP",
            JumpFalsy => "JMPF",
            AndJump => "ANDJMP",
            OrJump => "ORJMP",
            Jump => "JMP",
            SetGlobal => "SETG",
            SetSelGlobal => "SETSG",
            GetGlobal => "GETG",
            DefineLocal => "DEFL",
            SetLocal => "SETL",
            SetSelLocal => "SETSL",
            GetLocal => "GETL",
            GetBuiltin => "BUILTIN",
            GetLocalPtr => "GETLP",
            GetFree => "GETF",
            SetFree => "SETF",
            GetFreePtr => "GETFP",
            SetSelFree => "SETSF",
            Array => "ARR",
            Map => "MAP",
            Error => "ERROR",
            Immutable => "IMMUT",
            Index => "INDEX",
            SliceIndex => "SLICE",
            Call => "CALL",
            Return => "RET",
            Closure => "CLOSURE",
            Callee => "CALLEE",
            CalledArgs => "CALLARGS",
            CalledKwargs => "CALLKWARGS",
            IteratorInit => "ITER",
            IteratorNext => "ITNXT",
            IteratorKey => "ITKEY",
            IteratorValue => "ITVAL",
            Suspend => "SUSPEND",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Operator token carried by [`OpCode::BinaryOp`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Quo = 3,
    Rem = 4,
    And = 5,
    Or = 6,
    Xor = 7,
    AndNot = 8,
    Shl = 9,
    Shr = 10,
    Less = 11,
    Greater = 12,
    LessEq = 13,
    GreaterEq = 14,
}

impl BinaryOp {
    pub fn from_u8(byte: u8) -> Option<Self> {
        use BinaryOp::*;
        Some(match byte {
            0 => Add,
            1 => Sub,
            2 => Mul,
            3 => Quo,
            4 => Rem,
            5 => And,
            6 => Or,
            7 => Xor,
            8 => AndNot,
            9 => Shl,
            10 => Shr,
            11 => Less,
            12 => Greater,
            13 => LessEq,
            14 => GreaterEq,
            _ => return None,
        })
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Source-level spelling
    pub fn symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Quo => "/",
            Rem => "%",
            And => "&",
            Or => "|",
            Xor => "^",
            AndNot => "&^",
            Shl => "<<",
            Shr => ">>",
            Less => "<",
            Greater => ">",
            LessEq => "<=",
            GreaterEq => ">=",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Instruction encoding/decoding helpers
pub mod instruction {
    use super::OpCode;

    /// Encode one instruction. Missing operands encode as zero.
    pub fn make_instruction(op: OpCode, operands: &[usize]) -> Vec<u8> {
        let mut out = Vec::with_capacity(op.size());
        out.push(op.as_u8());
        for (i, width) in op.operand_widths().iter().enumerate() {
            let operand = operands.get(i).copied().unwrap_or(0);
            match width {
                1 => out.push(operand as u8),
                2 => out.extend_from_slice(&(operand as u16).to_be_bytes()),
                _ => unreachable!("operand width {}", width),
            }
        }
        out
    }

    /// Decode operands from `ins` (which starts right after the opcode
    /// byte). Returns the operands and the number of bytes read, or
    /// `None` if `ins` is too short.
    pub fn read_operands(widths: &[usize], ins: &[u8]) -> Option<(Vec<usize>, usize)> {
        let mut operands = Vec::with_capacity(widths.len());
        let mut offset = 0;
        for width in widths {
            match width {
                1 => operands.push(*ins.get(offset)? as usize),
                2 => operands.push(read_u16(ins, offset)? as usize),
                _ => return None,
            }
            offset += width;
        }
        Some((operands, offset))
    }

    /// Read a big-endian u16 at `at`
    #[inline]
    pub fn read_u16(ins: &[u8], at: usize) -> Option<u16> {
        let hi = *ins.get(at)?;
        let lo = *ins.get(at + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }
}
