//! Abstract value model.
//!
//! - [`types`]: the [`AbstractValue`] sum type and its tracks
//! - [`ops`]: merge (join), broaden and sensitivity transform
//! - [`convert`]: constants and external values to abstract values
//! - `display`: human-readable rendering used in error messages

pub mod convert;
mod display;
pub mod ops;
#[cfg(test)]
mod prop_tests;
pub mod types;

pub use convert::{
    register_converter, to_abstract, ConvertCx, Convertible, ConverterTable, LiteralTypes,
};
pub use ops::{reject_keywords, sensitivity_transform, DTypeBinder, MergeMode, NoPending};
pub use types::{
    AbstractValue, ClassLike, DType, DTypeTrack, FunctionSet, FunctionVariant, ScalarValue,
    Track, TypeVarId, NUMBER_TYPES,
};
