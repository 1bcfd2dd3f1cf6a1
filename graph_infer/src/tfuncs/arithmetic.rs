//! Transfer functions for scalar arithmetic and comparisons.
//!
//! Operand dtypes are bound together, which resolves the pending dtypes of
//! numeric literals as a side effect. When both operands carry a concrete
//! VALUE the result is folded.

use crate::abstract_interp::engine::InferenceEngine;
use crate::error::{InferResult, InferenceError};
use crate::lattice::{AbstractValue, DType, DTypeTrack, ScalarValue, Track};
use std::cmp::Ordering;

use super::expect_args;

fn scalar_parts(value: &AbstractValue) -> InferResult<(&Track<ScalarValue>, DTypeTrack)> {
    match value {
        AbstractValue::Scalar { value, dtype } => Ok((value, *dtype)),
        other => Err(InferenceError::mismatch_text(
            "scalar",
            other.to_string(),
            "expected a scalar operand",
        )),
    }
}

fn require_number(dtype: DTypeTrack) -> InferResult<DTypeTrack> {
    match dtype {
        DTypeTrack::Known(d) if !d.is_number() => Err(InferenceError::mismatch_text(
            "number",
            d.to_string(),
            "arithmetic on a non-numeric type",
        )),
        other => Ok(other),
    }
}

fn as_f64(value: &ScalarValue) -> Option<f64> {
    match value {
        ScalarValue::Int(i) => Some(*i as f64),
        ScalarValue::Float(f) => Some(*f),
        _ => None,
    }
}

/// Fold two constants under their bound dtype. Integer dtypes use `int_op`
/// (`None` on overflow); float dtypes compute in `f64`.
fn fold_numeric(
    dtype: &DType,
    a: &ScalarValue,
    b: &ScalarValue,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Option<ScalarValue> {
    match (a, b) {
        (ScalarValue::Int(x), ScalarValue::Int(y)) if dtype.is_integer() => {
            int_op(*x, *y).map(ScalarValue::Int)
        }
        _ if dtype.is_float() => Some(ScalarValue::Float(float_op(as_f64(a)?, as_f64(b)?))),
        _ => None,
    }
}

fn binary_arith(
    engine: &InferenceEngine,
    args: &[AbstractValue],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> InferResult<AbstractValue> {
    let [a, b] = expect_args(args)?;
    let (va, da) = scalar_parts(a)?;
    let (vb, db) = scalar_parts(b)?;
    let dtype = require_number(engine.bind_dtypes(&da, &db)?)?;
    // Folding waits for a known dtype: `7 / 2` is 3 for integers and 3.5 for floats.
    let value = match (va, vb, &dtype) {
        (Track::Known(x), Track::Known(y), DTypeTrack::Known(d)) => {
            fold_numeric(d, x, y, int_op, float_op).map_or(Track::Anything, Track::Known)
        }
        _ => Track::Anything,
    };
    Ok(AbstractValue::Scalar { value, dtype })
}

/// Transfer function for `scalar_add`.
///
/// Type rules:
/// - both operands must bind to one numeric dtype
/// - constant operands fold; integer overflow gives an unknown value
///
/// # Examples
/// ```text
/// scalar_add(Int64, Int64)       → Int64
/// scalar_add(Int64(2), Int64(3)) → Int64(5)
/// scalar_add(Int64, Float64)     → TypeMismatch
/// ```
pub fn tfunc_add(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    binary_arith(engine, args, i64::checked_add, |x, y| x + y)
}

/// Transfer function for `scalar_sub`.
pub fn tfunc_sub(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    binary_arith(engine, args, i64::checked_sub, |x, y| x - y)
}

/// Transfer function for `scalar_mul`.
pub fn tfunc_mul(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    binary_arith(engine, args, i64::checked_mul, |x, y| x * y)
}

/// Transfer function for `scalar_div`.
///
/// Integer division truncates; dividing a constant by zero leaves the value
/// unknown rather than failing inference.
pub fn tfunc_div(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    binary_arith(engine, args, i64::checked_div, |x, y| x / y)
}

/// Transfer function for `scalar_mod`.
pub fn tfunc_mod(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    binary_arith(engine, args, i64::checked_rem, |x, y| x % y)
}

/// Transfer function for `scalar_neg`.
pub fn tfunc_neg(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [a] = expect_args(args)?;
    let (value, dtype) = scalar_parts(a)?;
    let dtype = require_number(dtype)?;
    let value = match value {
        Track::Known(ScalarValue::Int(i)) => {
            i.checked_neg().map_or(Track::Anything, |n| Track::Known(ScalarValue::Int(n)))
        }
        Track::Known(ScalarValue::Float(f)) => Track::Known(ScalarValue::Float(-f)),
        _ => Track::Anything,
    };
    Ok(AbstractValue::Scalar { value, dtype })
}

fn compare_values(a: &ScalarValue, b: &ScalarValue) -> Option<Ordering> {
    match (a, b) {
        (ScalarValue::Int(x), ScalarValue::Int(y)) => Some(x.cmp(y)),
        (ScalarValue::Bool(x), ScalarValue::Bool(y)) => Some(x.cmp(y)),
        (ScalarValue::Str(x), ScalarValue::Str(y)) => Some(x.cmp(y)),
        (ScalarValue::Nil, ScalarValue::Nil) => Some(Ordering::Equal),
        _ => as_f64(a)?.partial_cmp(&as_f64(b)?),
    }
}

fn comparison(
    engine: &InferenceEngine,
    args: &[AbstractValue],
    numeric: bool,
    test: fn(Ordering) -> bool,
) -> InferResult<AbstractValue> {
    let [a, b] = expect_args(args)?;
    let (va, da) = scalar_parts(a)?;
    let (vb, db) = scalar_parts(b)?;
    let dtype = engine.bind_dtypes(&da, &db)?;
    if numeric {
        require_number(dtype)?;
    }
    let value = match (va, vb) {
        (Track::Known(x), Track::Known(y)) => compare_values(x, y)
            .map_or(Track::Anything, |ord| Track::Known(ScalarValue::Bool(test(ord)))),
        _ => Track::Anything,
    };
    Ok(AbstractValue::Scalar {
        value,
        dtype: DTypeTrack::Known(DType::Bool),
    })
}

/// Transfer function for `scalar_lt`.
///
/// # Examples
/// ```text
/// scalar_lt(Int64, Int64)       → Bool
/// scalar_lt(Int64(1), Int64(2)) → Bool(true)
/// ```
pub fn tfunc_lt(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    comparison(engine, args, true, Ordering::is_lt)
}

pub fn tfunc_le(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    comparison(engine, args, true, Ordering::is_le)
}

pub fn tfunc_gt(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    comparison(engine, args, true, Ordering::is_gt)
}

pub fn tfunc_ge(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    comparison(engine, args, true, Ordering::is_ge)
}

/// Transfer function for `scalar_eq`. Operands of any one scalar dtype.
pub fn tfunc_eq(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    comparison(engine, args, false, Ordering::is_eq)
}

pub fn tfunc_ne(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    comparison(engine, args, false, Ordering::is_ne)
}

/// Transfer function for `bool_not`.
pub fn tfunc_not(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [a] = expect_args(args)?;
    let (value, dtype) = scalar_parts(a)?;
    engine.bind_dtypes(&dtype, &DTypeTrack::Known(DType::Bool))?;
    let value = match value {
        Track::Known(ScalarValue::Bool(b)) => Track::Known(ScalarValue::Bool(!b)),
        _ => Track::Anything,
    };
    Ok(AbstractValue::Scalar {
        value,
        dtype: DTypeTrack::Known(DType::Bool),
    })
}
