//! Compile-time evaluation with JVM numeric semantics
//!
//! Integer arithmetic wraps at its width, shift distances are masked to the
//! operand width, float-to-integer conversion saturates with NaN mapping to
//! zero, and floating-point remainder truncates like `fmod`.

use thiserror::Error;

use crate::bytecode::{ArithOp, CompareKind, Condition, ConvertTarget, NumericKind, Value};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The operation would throw `ArithmeticException` when executed
    #[error("{0} by zero")]
    DivisionByZero(&'static str),
    /// Operand tags do not match the instruction
    #[error("operand types do not match the instruction")]
    TypeMismatch,
}

pub type EvalResult<T> = Result<T, EvalError>;

fn op_name(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Rem => "remainder",
        _ => "division",
    }
}

/// Evaluate `op` over `operands` (deepest stack value first)
pub fn arithmetic(op: ArithOp, kind: NumericKind, operands: &[Value]) -> EvalResult<Value> {
    if operands.len() != op.arity() {
        return Err(EvalError::TypeMismatch);
    }
    if op == ArithOp::Neg {
        return Ok(match (kind, operands[0]) {
            (NumericKind::Int, Value::Int(a)) => Value::Int(a.wrapping_neg()),
            (NumericKind::Long, Value::Long(a)) => Value::Long(a.wrapping_neg()),
            (NumericKind::Float, Value::Float(a)) => Value::Float(-a),
            (NumericKind::Double, Value::Double(a)) => Value::Double(-a),
            _ => return Err(EvalError::TypeMismatch),
        });
    }

    let result = match (kind, operands[0], operands[1]) {
        (NumericKind::Int, Value::Int(a), Value::Int(b)) => Value::Int(int_op(op, a, b)?),
        (NumericKind::Long, Value::Long(a), Value::Long(b)) if !op.is_shift() => Value::Long(long_op(op, a, b)?),
        (NumericKind::Long, Value::Long(a), Value::Int(b)) if op.is_shift() => Value::Long(long_shift(op, a, b)?),
        (NumericKind::Float, Value::Float(a), Value::Float(b)) => Value::Float(float_op(op, a, b)?),
        (NumericKind::Double, Value::Double(a), Value::Double(b)) => Value::Double(double_op(op, a, b)?),
        _ => return Err(EvalError::TypeMismatch),
    };
    Ok(result)
}

fn int_op(op: ArithOp, a: i32, b: i32) -> EvalResult<i32> {
    Ok(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div | ArithOp::Rem if b == 0 => return Err(EvalError::DivisionByZero(op_name(op))),
        ArithOp::Div => a.wrapping_div(b),
        ArithOp::Rem => a.wrapping_rem(b),
        ArithOp::Shl => a.wrapping_shl(b as u32 & 0x1f),
        ArithOp::Shr => a >> (b & 0x1f),
        ArithOp::Ushr => ((a as u32) >> (b & 0x1f)) as i32,
        ArithOp::And => a & b,
        ArithOp::Or => a | b,
        ArithOp::Xor => a ^ b,
        ArithOp::Neg => return Err(EvalError::TypeMismatch),
    })
}

fn long_op(op: ArithOp, a: i64, b: i64) -> EvalResult<i64> {
    Ok(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div | ArithOp::Rem if b == 0 => return Err(EvalError::DivisionByZero(op_name(op))),
        ArithOp::Div => a.wrapping_div(b),
        ArithOp::Rem => a.wrapping_rem(b),
        ArithOp::And => a & b,
        ArithOp::Or => a | b,
        ArithOp::Xor => a ^ b,
        _ => return Err(EvalError::TypeMismatch),
    })
}

fn long_shift(op: ArithOp, a: i64, distance: i32) -> EvalResult<i64> {
    let distance = (distance & 0x3f) as u32;
    Ok(match op {
        ArithOp::Shl => a.wrapping_shl(distance),
        ArithOp::Shr => a >> distance,
        ArithOp::Ushr => ((a as u64) >> distance) as i64,
        _ => return Err(EvalError::TypeMismatch),
    })
}

fn float_op(op: ArithOp, a: f32, b: f32) -> EvalResult<f32> {
    Ok(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Rem => a % b,
        _ => return Err(EvalError::TypeMismatch),
    })
}

fn double_op(op: ArithOp, a: f64, b: f64) -> EvalResult<f64> {
    Ok(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Rem => a % b,
        _ => return Err(EvalError::TypeMismatch),
    })
}

/// Three-way comparison pushing -1, 0 or 1
pub fn compare(kind: CompareKind, a: Value, b: Value) -> EvalResult<Value> {
    fn three_way<T: PartialOrd>(a: T, b: T, nan: i32) -> i32 {
        match a.partial_cmp(&b) {
            Some(std::cmp::Ordering::Less) => -1,
            Some(std::cmp::Ordering::Equal) => 0,
            Some(std::cmp::Ordering::Greater) => 1,
            None => nan,
        }
    }
    let result = match (kind, a, b) {
        (CompareKind::Long, Value::Long(a), Value::Long(b)) => three_way(a, b, 0),
        (CompareKind::FloatL, Value::Float(a), Value::Float(b)) => three_way(a, b, -1),
        (CompareKind::FloatG, Value::Float(a), Value::Float(b)) => three_way(a, b, 1),
        (CompareKind::DoubleL, Value::Double(a), Value::Double(b)) => three_way(a, b, -1),
        (CompareKind::DoubleG, Value::Double(a), Value::Double(b)) => three_way(a, b, 1),
        _ => return Err(EvalError::TypeMismatch),
    };
    Ok(Value::Int(result))
}

/// Numeric conversion following JLS 5.1.2 / 5.1.3
pub fn convert(from: NumericKind, to: ConvertTarget, value: Value) -> EvalResult<Value> {
    if value.kind() != from {
        return Err(EvalError::TypeMismatch);
    }
    let result = match (value, to) {
        (Value::Int(v), ConvertTarget::Byte) => Value::Int(v as i8 as i32),
        (Value::Int(v), ConvertTarget::Char) => Value::Int(v as u16 as i32),
        (Value::Int(v), ConvertTarget::Short) => Value::Int(v as i16 as i32),
        (_, ConvertTarget::Byte | ConvertTarget::Char | ConvertTarget::Short) => return Err(EvalError::TypeMismatch),
        (Value::Int(v), ConvertTarget::Kind(kind)) => widen(v as i64, v as f64, v as f32, kind),
        (Value::Long(v), ConvertTarget::Kind(kind)) => widen(v, v as f64, v as f32, kind),
        (Value::Float(v), ConvertTarget::Kind(kind)) => match kind {
            NumericKind::Int => Value::Int(v as i32),
            NumericKind::Long => Value::Long(v as i64),
            NumericKind::Float => Value::Float(v),
            NumericKind::Double => Value::Double(v as f64),
        },
        (Value::Double(v), ConvertTarget::Kind(kind)) => match kind {
            NumericKind::Int => Value::Int(v as i32),
            NumericKind::Long => Value::Long(v as i64),
            NumericKind::Float => Value::Float(v as f32),
            NumericKind::Double => Value::Double(v),
        },
    };
    Ok(result)
}

/// Integer source converted to `kind`; float results come from the source
/// directly so `long -> float` rounds once
fn widen(integral: i64, as_double: f64, as_float: f32, kind: NumericKind) -> Value {
    match kind {
        NumericKind::Int => Value::Int(integral as i32),
        NumericKind::Long => Value::Long(integral),
        NumericKind::Float => Value::Float(as_float),
        NumericKind::Double => Value::Double(as_double),
    }
}

/// Whether a conditional branch jumps, given its operands (deepest first).
///
/// Returns `Ok(None)` for reference comparisons, which are never known.
pub fn branch_taken(condition: Condition, operands: &[Value]) -> EvalResult<Option<bool>> {
    match (condition, operands) {
        (Condition::Zero(rel), [Value::Int(v)]) => Ok(Some(rel.holds(*v, 0))),
        (Condition::IntPair(rel), [Value::Int(a), Value::Int(b)]) => Ok(Some(rel.holds(*a, *b))),
        (Condition::RefPair(_) | Condition::Null(_), _) => Ok(None),
        _ => Err(EvalError::TypeMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Relation;

    #[test]
    fn test_int_arithmetic_wraps() {
        let add = arithmetic(ArithOp::Add, NumericKind::Int, &[Value::Int(i32::MAX), Value::Int(1)]);
        assert_eq!(add, Ok(Value::Int(i32::MIN)));
        let div = arithmetic(ArithOp::Div, NumericKind::Int, &[Value::Int(i32::MIN), Value::Int(-1)]);
        assert_eq!(div, Ok(Value::Int(i32::MIN)));
        let rem = arithmetic(ArithOp::Rem, NumericKind::Int, &[Value::Int(-7), Value::Int(3)]);
        assert_eq!(rem, Ok(Value::Int(-1)));
    }

    #[test]
    fn test_division_by_zero_is_not_folded() {
        let div = arithmetic(ArithOp::Div, NumericKind::Int, &[Value::Int(10), Value::Int(0)]);
        assert_eq!(div, Err(EvalError::DivisionByZero("division")));
        let rem = arithmetic(ArithOp::Rem, NumericKind::Long, &[Value::Long(10), Value::Long(0)]);
        assert_eq!(rem, Err(EvalError::DivisionByZero("remainder")));
        let fdiv = arithmetic(ArithOp::Div, NumericKind::Double, &[Value::Double(1.0), Value::Double(0.0)]);
        assert_eq!(fdiv, Ok(Value::Double(f64::INFINITY)));
    }

    #[test]
    fn test_shifts_mask_distance() {
        let shl = arithmetic(ArithOp::Shl, NumericKind::Int, &[Value::Int(1), Value::Int(33)]);
        assert_eq!(shl, Ok(Value::Int(2)));
        let ushr = arithmetic(ArithOp::Ushr, NumericKind::Int, &[Value::Int(-1), Value::Int(28)]);
        assert_eq!(ushr, Ok(Value::Int(15)));
        let lshr = arithmetic(ArithOp::Shr, NumericKind::Long, &[Value::Long(-256), Value::Int(68)]);
        assert_eq!(lshr, Ok(Value::Long(-16)));
        let wrong = arithmetic(ArithOp::Shl, NumericKind::Long, &[Value::Long(1), Value::Long(1)]);
        assert_eq!(wrong, Err(EvalError::TypeMismatch));
    }

    #[test]
    fn test_float_remainder_truncates() {
        let rem = arithmetic(ArithOp::Rem, NumericKind::Double, &[Value::Double(-5.5), Value::Double(2.0)]);
        assert_eq!(rem, Ok(Value::Double(-1.5)));
    }

    #[test]
    fn test_compare_nan_bias() {
        let nan = Value::Float(f32::NAN);
        let one = Value::Float(1.0);
        assert_eq!(compare(CompareKind::FloatL, nan, one), Ok(Value::Int(-1)));
        assert_eq!(compare(CompareKind::FloatG, nan, one), Ok(Value::Int(1)));
        assert_eq!(compare(CompareKind::Long, Value::Long(3), Value::Long(7)), Ok(Value::Int(-1)));
        assert_eq!(compare(CompareKind::Long, Value::Long(7), Value::Long(3)), Ok(Value::Int(1)));
    }

    #[test]
    fn test_conversions() {
        let to_int = ConvertTarget::Kind(NumericKind::Int);
        assert_eq!(convert(NumericKind::Double, to_int, Value::Double(f64::NAN)), Ok(Value::Int(0)));
        assert_eq!(convert(NumericKind::Float, to_int, Value::Float(1e20)), Ok(Value::Int(i32::MAX)));
        assert_eq!(convert(NumericKind::Int, ConvertTarget::Byte, Value::Int(200)), Ok(Value::Int(-56)));
        assert_eq!(convert(NumericKind::Int, ConvertTarget::Char, Value::Int(-1)), Ok(Value::Int(65535)));
        assert_eq!(convert(NumericKind::Long, to_int, Value::Long(1 << 32 | 5)), Ok(Value::Int(5)));
        assert_eq!(
            convert(NumericKind::Long, ConvertTarget::Kind(NumericKind::Float), Value::Long(16_777_217)),
            Ok(Value::Float(16_777_216.0))
        );
        assert_eq!(convert(NumericKind::Long, to_int, Value::Int(1)), Err(EvalError::TypeMismatch));
    }

    #[test]
    fn test_branch_outcomes() {
        // if_icmple 2, 1 does not jump
        let le = Condition::IntPair(Relation::Le);
        assert_eq!(branch_taken(le, &[Value::Int(2), Value::Int(1)]), Ok(Some(false)));
        assert_eq!(branch_taken(Condition::Zero(Relation::Ne), &[Value::Int(0)]), Ok(Some(false)));
        assert_eq!(branch_taken(Condition::Null(true), &[]), Ok(None));
        assert_eq!(branch_taken(le, &[Value::Long(2), Value::Int(1)]), Err(EvalError::TypeMismatch));
    }
}
