//! The primitive catalogue.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Builtin operations with fixed inference rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Primitive {
    Return,
    ScalarAdd,
    ScalarSub,
    ScalarMul,
    ScalarDiv,
    ScalarMod,
    ScalarNeg,
    ScalarLt,
    ScalarLe,
    ScalarGt,
    ScalarGe,
    ScalarEq,
    ScalarNe,
    BoolNot,
    Switch,
    MakeTuple,
    TupleGetItem,
    TupleLen,
    TupleTail,
    Partial,
    MakeRecord,
    GetAttr,
    MakeKwarg,
    J,
    ArrayMap,
    Shape,
}

impl Primitive {
    pub const ALL: [Primitive; 26] = [
        Primitive::Return,
        Primitive::ScalarAdd,
        Primitive::ScalarSub,
        Primitive::ScalarMul,
        Primitive::ScalarDiv,
        Primitive::ScalarMod,
        Primitive::ScalarNeg,
        Primitive::ScalarLt,
        Primitive::ScalarLe,
        Primitive::ScalarGt,
        Primitive::ScalarGe,
        Primitive::ScalarEq,
        Primitive::ScalarNe,
        Primitive::BoolNot,
        Primitive::Switch,
        Primitive::MakeTuple,
        Primitive::TupleGetItem,
        Primitive::TupleLen,
        Primitive::TupleTail,
        Primitive::Partial,
        Primitive::MakeRecord,
        Primitive::GetAttr,
        Primitive::MakeKwarg,
        Primitive::J,
        Primitive::ArrayMap,
        Primitive::Shape,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Return => "return_",
            Primitive::ScalarAdd => "scalar_add",
            Primitive::ScalarSub => "scalar_sub",
            Primitive::ScalarMul => "scalar_mul",
            Primitive::ScalarDiv => "scalar_div",
            Primitive::ScalarMod => "scalar_mod",
            Primitive::ScalarNeg => "scalar_neg",
            Primitive::ScalarLt => "scalar_lt",
            Primitive::ScalarLe => "scalar_le",
            Primitive::ScalarGt => "scalar_gt",
            Primitive::ScalarGe => "scalar_ge",
            Primitive::ScalarEq => "scalar_eq",
            Primitive::ScalarNe => "scalar_ne",
            Primitive::BoolNot => "bool_not",
            Primitive::Switch => "switch",
            Primitive::MakeTuple => "make_tuple",
            Primitive::TupleGetItem => "tuple_getitem",
            Primitive::TupleLen => "tuple_len",
            Primitive::TupleTail => "tuple_tail",
            Primitive::Partial => "partial",
            Primitive::MakeRecord => "make_record",
            Primitive::GetAttr => "getattr",
            Primitive::MakeKwarg => "make_kwarg",
            Primitive::J => "J",
            Primitive::ArrayMap => "array_map",
            Primitive::Shape => "shape",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for prim in Primitive::ALL {
            assert_eq!(Primitive::from_name(prim.name()), Some(prim));
        }
        assert_eq!(Primitive::from_name("nope"), None);
    }
}
