//! Transfer functions for array operations.

use crate::abstract_interp::engine::InferenceEngine;
use crate::error::{InferResult, InferenceError};
use crate::lattice::{AbstractValue, DType, DTypeTrack, ScalarValue, Track};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::rc::Rc;

use super::expect_args;

type Shape = Track<Vec<Track<u64>>>;

fn merge_shapes(a: &Shape, b: &Shape) -> InferResult<Shape> {
    let (Track::Known(xs), Track::Known(ys)) = (a, b) else {
        return Ok(Track::Anything);
    };
    if xs.len() != ys.len() {
        return Err(InferenceError::mismatch_text(
            format!("rank {}", xs.len()),
            format!("rank {}", ys.len()),
            "arrays of different rank",
        ));
    }
    xs.iter()
        .zip(ys)
        .map(|(x, y)| match (x, y) {
            (Track::Known(p), Track::Known(q)) if p != q => Err(InferenceError::mismatch_text(
                p.to_string(),
                q.to_string(),
                "array dimensions differ",
            )),
            (Track::Known(p), Track::Known(_)) => Ok(Track::Known(*p)),
            _ => Ok(Track::Anything),
        })
        .collect::<InferResult<Vec<_>>>()
        .map(Track::Known)
}

/// Transfer function for `array_map(f, arrays...)`.
///
/// `f` is called on the element types of the arrays, which must share a
/// shape. The result is an array of `f`'s result with that shape.
///
/// # Examples
/// ```text
/// array_map(scalar_add, Array[Int64; 2x3], Array[Int64; 2x3]) → Array[Int64; 2x3]
/// ```
pub fn tfunc_array_map(
    engine: Rc<InferenceEngine>,
    args: Vec<AbstractValue>,
) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
    async move {
        let Some((func, arrays)) = args.split_first() else {
            return Err(InferenceError::arity(2, 0));
        };
        if arrays.is_empty() {
            return Err(InferenceError::arity(2, 1));
        }
        let mut shape: Option<Shape> = None;
        let mut elements = Vec::with_capacity(arrays.len());
        for array in arrays {
            let AbstractValue::Array {
                element,
                shape: this,
            } = array
            else {
                return Err(InferenceError::mismatch_text(
                    "array",
                    array.to_string(),
                    "array_map over a non-array",
                ));
            };
            shape = Some(match shape {
                None => this.clone(),
                Some(prev) => merge_shapes(&prev, this)?,
            });
            elements.push((**element).clone());
        }
        let element = engine.execute(func, elements).await?;
        Ok(AbstractValue::Array {
            element: Box::new(element),
            shape: shape.unwrap_or(Track::Anything),
        })
    }
    .boxed_local()
}

/// Transfer function for `shape(array)`: a tuple of `UInt64` dimensions.
pub fn tfunc_shape(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [array] = expect_args(args)?;
    match array {
        AbstractValue::Array {
            shape: Track::Known(dims),
            ..
        } => Ok(AbstractValue::Tuple(
            dims.iter()
                .map(|d| AbstractValue::Scalar {
                    value: match d {
                        Track::Known(n) => Track::Known(ScalarValue::Int(*n as i64)),
                        Track::Anything => Track::Anything,
                    },
                    dtype: DTypeTrack::Known(DType::UInt(64)),
                })
                .collect(),
        )),
        AbstractValue::Array { .. } => Err(InferenceError::argument(
            "shape of an array of unknown rank",
        )),
        other => Err(InferenceError::mismatch_text(
            "array",
            other.to_string(),
            "shape of a non-array",
        )),
    }
}
