//! Property tests for the merge algebra.
//!
//! 1. Merge is commutative: merge(a, b) == merge(b, a), failures included
//! 2. Merge is idempotent: merge(a, a) == a
//! 3. ANYTHING absorbs: merge(a, broaden(a)) == broaden(a)
//! 4. Widening merge is associative where defined
//! 5. Broaden is idempotent and never fails to merge with its input

use proptest::prelude::*;

use super::ops::{MergeMode, NoPending};
use super::types::{AbstractValue, DType, ScalarValue, Track};

fn arb_dtype() -> impl Strategy<Value = DType> {
    prop_oneof![
        Just(DType::Bool),
        Just(DType::Int(64)),
        Just(DType::Int(32)),
        Just(DType::Float(64)),
    ]
}

fn arb_scalar() -> impl Strategy<Value = AbstractValue> {
    (arb_dtype(), prop::option::of(0i64..3)).prop_map(|(dtype, value)| match value {
        Some(v) => AbstractValue::constant(ScalarValue::Int(v), dtype),
        None => AbstractValue::scalar(dtype),
    })
}

fn arb_array() -> impl Strategy<Value = AbstractValue> {
    (arb_dtype(), prop::collection::vec(prop::option::of(1u64..3), 0..3)).prop_map(
        |(dtype, dims)| AbstractValue::Array {
            element: Box::new(AbstractValue::scalar(dtype)),
            shape: Track::Known(
                dims.into_iter()
                    .map(|d| d.map_or(Track::Anything, Track::Known))
                    .collect(),
            ),
        },
    )
}

fn arb_value(depth: u32) -> BoxedStrategy<AbstractValue> {
    if depth == 0 {
        prop_oneof![arb_scalar(), arb_array()].boxed()
    } else {
        prop_oneof![
            arb_scalar(),
            arb_array(),
            prop::collection::vec(arb_value(depth - 1), 0..3).prop_map(AbstractValue::Tuple),
        ]
        .boxed()
    }
}

fn merge(
    a: &AbstractValue,
    b: &AbstractValue,
    mode: MergeMode,
) -> Result<AbstractValue, crate::error::ErrorKind> {
    a.merge(b, &NoPending, mode).map_err(|e| e.kind)
}

fn arb_mode() -> impl Strategy<Value = MergeMode> {
    prop_oneof![Just(MergeMode::Exact), Just(MergeMode::Widen)]
}

proptest! {
    #[test]
    fn merge_is_commutative(a in arb_value(2), b in arb_value(2), mode in arb_mode()) {
        let ab = merge(&a, &b, mode);
        let ba = merge(&b, &a, mode);
        prop_assert_eq!(ab.is_ok(), ba.is_ok());
        if let (Ok(x), Ok(y)) = (ab, ba) {
            prop_assert_eq!(x, y);
        }
    }

    #[test]
    fn merge_is_idempotent(a in arb_value(2), mode in arb_mode()) {
        prop_assert_eq!(merge(&a, &a, mode), Ok(a.clone()));
    }

    #[test]
    fn anything_absorbs(a in arb_value(2), mode in arb_mode()) {
        let broad = a.broaden();
        prop_assert_eq!(merge(&a, &broad, mode), Ok(broad.clone()));
        prop_assert_eq!(merge(&broad, &a, mode), Ok(broad));
    }

    #[test]
    fn widening_merge_is_associative(
        a in arb_value(1),
        b in arb_value(1),
        c in arb_value(1),
    ) {
        let left = merge(&a, &b, MergeMode::Widen)
            .and_then(|ab| merge(&ab, &c, MergeMode::Widen));
        let right = merge(&b, &c, MergeMode::Widen)
            .and_then(|bc| merge(&a, &bc, MergeMode::Widen));
        if let (Ok(x), Ok(y)) = (left, right) {
            prop_assert_eq!(x, y);
        }
    }

    #[test]
    fn broaden_is_idempotent(a in arb_value(2)) {
        let once = a.broaden();
        let twice = once.broaden();
        prop_assert_eq!(once, twice);
    }
}
