//! Basic built-in functions: copy, range, delete

use crate::config::MAX_ARRAY_LEN;
use crate::error::VmError;
use crate::value::Value;
use crate::vm::CallContext;

/// copy(x) - deep copy of x
pub fn builtin_copy(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    ctx.check_args(1, 1)?;
    ctx.check_kwargs(&[])?;
    Ok(ctx.args[0].copy())
}

/// range(start, stop[, step]) - Int sequence from start towards stop
/// (exclusive), ascending when start <= stop, descending otherwise
pub fn builtin_range(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    ctx.check_args(2, 3)?;
    ctx.check_kwargs(&[])?;

    let mut bounds = [0i64, 0, 1];
    for (i, (arg, name)) in ctx.args.iter().zip(["start", "stop", "step"]).enumerate() {
        bounds[i] = arg.as_int().ok_or_else(|| VmError::InvalidArgumentType {
            name: name.to_string(),
            expected: "int".into(),
            found: arg.type_name(),
        })?;
    }
    let [start, stop, step] = bounds;
    if step <= 0 {
        return Err(VmError::InvalidRangeStep);
    }

    if range_len(start, stop, step) > MAX_ARRAY_LEN as u64 {
        return Err(VmError::ArrayLimit);
    }
    Ok(Value::array(build_range(start, stop, step)))
}

fn range_len(start: i64, stop: i64, step: i64) -> u64 {
    start.abs_diff(stop).div_ceil(step as u64)
}

pub(crate) fn build_range(start: i64, stop: i64, step: i64) -> Vec<Value> {
    let count = range_len(start, stop, step);
    let step = step as u64;
    let mut items = Vec::with_capacity(count.min(1 << 16) as usize);
    let mut current = start;
    for _ in 0..count {
        items.push(Value::Int(current));
        current = if start <= stop {
            current.wrapping_add_unsigned(step)
        } else {
            current.wrapping_sub_unsigned(step)
        };
    }
    items
}

/// delete(container, key...) - remove keys from a map-like value
pub fn builtin_delete(ctx: &mut CallContext<'_>) -> Result<Value, VmError> {
    if ctx.args.len() < 2 {
        return Err(VmError::WrongArgumentCount);
    }
    ctx.check_kwargs(&[])?;
    ctx.args[0].index_del(&ctx.args[1..])?;
    Ok(Value::Undefined)
}
