//! Transfer functions of the primitives.
//!
//! A transfer function computes the abstract result of a primitive from its
//! abstract arguments. Most are synchronous; higher-order primitives that call
//! back into the engine are asynchronous.
//!
//! # Architecture
//!
//! - `registry`: the [`PrimitiveRegistry`] mapping each primitive to its rule
//! - `arithmetic`: scalar arithmetic, comparisons and boolean negation
//! - `structural`: tuples, records, partial application, switch, J
//! - `array_ops`: `array_map` and `shape`
//!
//! # Usage
//!
//! ```
//! use graph_infer::tfuncs::PrimitiveRegistry;
//! use graph_infer::Primitive;
//!
//! let registry = PrimitiveRegistry::default();
//! assert!(registry.has(Primitive::ScalarAdd));
//! ```

pub mod arithmetic;
pub mod array_ops;
pub mod registry;
pub mod structural;

pub use registry::{AsyncTransferFn, PrimitiveRegistry, SyncTransferFn, TransferRule};

use crate::error::{InferResult, InferenceError};
use crate::lattice::AbstractValue;

/// Registers every primitive of the catalogue.
pub fn register_all(registry: &mut PrimitiveRegistry) {
    register_arithmetic(registry);
    register_structural(registry);
    register_array_ops(registry);
}

/// Registers arithmetic, comparison and boolean transfer functions.
pub fn register_arithmetic(registry: &mut PrimitiveRegistry) {
    use crate::ir::Primitive as P;
    registry.register(P::ScalarAdd, TransferRule::Sync(arithmetic::tfunc_add));
    registry.register(P::ScalarSub, TransferRule::Sync(arithmetic::tfunc_sub));
    registry.register(P::ScalarMul, TransferRule::Sync(arithmetic::tfunc_mul));
    registry.register(P::ScalarDiv, TransferRule::Sync(arithmetic::tfunc_div));
    registry.register(P::ScalarMod, TransferRule::Sync(arithmetic::tfunc_mod));
    registry.register(P::ScalarNeg, TransferRule::Sync(arithmetic::tfunc_neg));
    registry.register(P::ScalarLt, TransferRule::Sync(arithmetic::tfunc_lt));
    registry.register(P::ScalarLe, TransferRule::Sync(arithmetic::tfunc_le));
    registry.register(P::ScalarGt, TransferRule::Sync(arithmetic::tfunc_gt));
    registry.register(P::ScalarGe, TransferRule::Sync(arithmetic::tfunc_ge));
    registry.register(P::ScalarEq, TransferRule::Sync(arithmetic::tfunc_eq));
    registry.register(P::ScalarNe, TransferRule::Sync(arithmetic::tfunc_ne));
    registry.register(P::BoolNot, TransferRule::Sync(arithmetic::tfunc_not));
}

/// Registers structural transfer functions.
pub fn register_structural(registry: &mut PrimitiveRegistry) {
    use crate::ir::Primitive as P;
    registry.register(P::Return, TransferRule::Sync(structural::tfunc_return));
    registry.register(P::Switch, TransferRule::Sync(structural::tfunc_switch));
    registry.register(P::MakeTuple, TransferRule::Sync(structural::tfunc_make_tuple));
    registry.register(P::TupleGetItem, TransferRule::Sync(structural::tfunc_tuple_getitem));
    registry.register(P::TupleLen, TransferRule::Sync(structural::tfunc_tuple_len));
    registry.register(P::TupleTail, TransferRule::Sync(structural::tfunc_tuple_tail));
    registry.register(P::Partial, TransferRule::Sync(structural::tfunc_partial));
    registry.register(P::MakeRecord, TransferRule::Sync(structural::tfunc_make_record));
    registry.register(P::GetAttr, TransferRule::Sync(structural::tfunc_getattr));
    registry.register(P::MakeKwarg, TransferRule::Sync(structural::tfunc_make_kwarg));
    registry.register(P::J, TransferRule::Sync(structural::tfunc_j));
}

/// Registers array transfer functions.
pub fn register_array_ops(registry: &mut PrimitiveRegistry) {
    use crate::ir::Primitive as P;
    registry.register(P::ArrayMap, TransferRule::Async(array_ops::tfunc_array_map));
    registry.register(P::Shape, TransferRule::Sync(array_ops::tfunc_shape));
}

/// `args` as a fixed-size array, or an arity error.
pub(crate) fn expect_args<const N: usize>(args: &[AbstractValue]) -> InferResult<&[AbstractValue; N]> {
    args.try_into()
        .map_err(|_| InferenceError::arity(N, args.len()))
}

/// The known string VALUE of `value`.
pub(crate) fn expect_str<'a>(value: &'a AbstractValue, what: &str) -> InferResult<&'a str> {
    match crate::lattice::ops::known_scalar(value) {
        Some(crate::lattice::ScalarValue::Str(s)) => Ok(s),
        _ => Err(InferenceError::argument(format!(
            "{} must be a constant string, got {}",
            what, value
        ))),
    }
}
