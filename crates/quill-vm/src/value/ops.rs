//! Operator semantics
//!
//! Numeric tower: Int op Int stays Int (wrapping), any Float operand
//! promotes to Float. Chars take Int offsets. String, Bytes and Array
//! concatenate with `+`; Strings and Bytes are capped at
//! [`MAX_STRING_LEN`]/[`MAX_BYTES_LEN`].

use super::Value;
use crate::config::{MAX_BYTES_LEN, MAX_STRING_LEN};
use crate::error::VmError;
use crate::opcode::BinaryOp;
use std::cmp::Ordering;

impl Value {
    /// Apply a binary operator
    pub fn binary_op(&self, op: BinaryOp, rhs: &Value) -> Result<Value, VmError> {
        let result = match (self, rhs) {
            (Value::Int(l), Value::Int(r)) => int_op(*l, op, *r)?,
            (Value::Int(l), Value::Float(r)) => float_op(*l as f64, op, *r),
            (Value::Int(l), Value::Char(r)) => char_arith(*l, op, *r as i64)
                .or_else(|| compare(op, l.cmp(&(*r as i64)))),
            (Value::Float(l), Value::Float(r)) => float_op(*l, op, *r),
            (Value::Float(l), Value::Int(r)) => float_op(*l, op, *r as f64),
            (Value::Char(l), Value::Char(r)) => {
                char_arith(*l as i64, op, *r as i64).or_else(|| compare(op, l.cmp(r)))
            }
            (Value::Char(l), Value::Int(r)) => char_arith(*l as i64, op, *r)
                .or_else(|| compare(op, (*l as i64).cmp(r))),
            (Value::String(l), Value::String(r)) => match op {
                BinaryOp::Add => Some(concat_strings(l.as_str(), r.as_str())?),
                _ => compare(op, l.as_str().cmp(r.as_str())),
            },
            (Value::String(l), other) if op == BinaryOp::Add => {
                Some(concat_strings(l.as_str(), &other.to_key_string().unwrap_or_default())?)
            }
            (Value::Bytes(l), Value::Bytes(r)) if op == BinaryOp::Add => {
                if l.len() + r.len() > MAX_BYTES_LEN {
                    return Err(VmError::BytesLimit);
                }
                let mut joined = Vec::with_capacity(l.len() + r.len());
                joined.extend_from_slice(l);
                joined.extend_from_slice(r);
                Some(Value::bytes(joined))
            }
            (
                Value::Array(l) | Value::ImmutableArray(l),
                Value::Array(r) | Value::ImmutableArray(r),
            ) if op == BinaryOp::Add => {
                let mut joined = l.borrow().clone();
                joined.extend(r.borrow().iter().cloned());
                Some(Value::array(joined))
            }
            _ => None,
        };
        result.ok_or_else(|| VmError::InvalidOperation {
            left: self.type_name(),
            op: op.symbol().to_string(),
            right: rhs.type_name(),
        })
    }

    /// Unary minus
    pub fn negate(&self) -> Result<Value, VmError> {
        match self {
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(VmError::InvalidUnaryOperation {
                op: "-",
                operand: other.type_name(),
            }),
        }
    }

    /// Bitwise complement
    pub fn complement(&self) -> Result<Value, VmError> {
        match self {
            Value::Int(i) => Ok(Value::Int(!i)),
            other => Err(VmError::InvalidUnaryOperation {
                op: "^",
                operand: other.type_name(),
            }),
        }
    }
}

fn int_op(l: i64, op: BinaryOp, r: i64) -> Result<Option<Value>, VmError> {
    let v = match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mul => l.wrapping_mul(r),
        BinaryOp::Quo => {
            if r == 0 {
                return Err(VmError::DivisionByZero);
            }
            l.wrapping_div(r)
        }
        BinaryOp::Rem => {
            if r == 0 {
                return Err(VmError::DivisionByZero);
            }
            l.wrapping_rem(r)
        }
        BinaryOp::And => l & r,
        BinaryOp::Or => l | r,
        BinaryOp::Xor => l ^ r,
        BinaryOp::AndNot => l & !r,
        // shift counts are unsigned; anything >= 64 shifts everything out
        BinaryOp::Shl => match u32::try_from(r) {
            Ok(n) if n < 64 => l.wrapping_shl(n),
            _ => 0,
        },
        BinaryOp::Shr => match u32::try_from(r) {
            Ok(n) if n < 64 => l.wrapping_shr(n),
            _ if l < 0 => -1,
            _ => 0,
        },
        _ => return Ok(compare(op, l.cmp(&r))),
    };
    Ok(Some(Value::Int(v)))
}

fn float_op(l: f64, op: BinaryOp, r: f64) -> Option<Value> {
    let v = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Quo => l / r,
        BinaryOp::Less => return Some(Value::Bool(l < r)),
        BinaryOp::Greater => return Some(Value::Bool(l > r)),
        BinaryOp::LessEq => return Some(Value::Bool(l <= r)),
        BinaryOp::GreaterEq => return Some(Value::Bool(l >= r)),
        _ => return None,
    };
    Some(Value::Float(v))
}

/// `+`/`-` on code points; the result must be a valid char
fn char_arith(l: i64, op: BinaryOp, r: i64) -> Option<Value> {
    let v = match op {
        BinaryOp::Add => l.checked_add(r)?,
        BinaryOp::Sub => l.checked_sub(r)?,
        _ => return None,
    };
    u32::try_from(v).ok().and_then(char::from_u32).map(Value::Char)
}

fn compare(op: BinaryOp, ord: Ordering) -> Option<Value> {
    let b = match op {
        BinaryOp::Less => ord == Ordering::Less,
        BinaryOp::Greater => ord == Ordering::Greater,
        BinaryOp::LessEq => ord != Ordering::Greater,
        BinaryOp::GreaterEq => ord != Ordering::Less,
        _ => return None,
    };
    Some(Value::Bool(b))
}

fn concat_strings(l: &str, r: &str) -> Result<Value, VmError> {
    if l.len() + r.len() > MAX_STRING_LEN {
        return Err(VmError::StringLimit);
    }
    let mut s = String::with_capacity(l.len() + r.len());
    s.push_str(l);
    s.push_str(r);
    Ok(Value::string(s))
}
