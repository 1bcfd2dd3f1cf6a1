//! Lattice operations on abstract values.
//!
//! - `merge`: least upper bound, track by track
//! - `broaden`: forget concrete VALUEs
//! - `sensitivity_transform`: the type of a value's gradient

use super::types::{
    AbstractValue, ClassLike, DType, DTypeTrack, FunctionSet, FunctionVariant, ScalarValue,
    Track,
};
use crate::error::{InferResult, InferenceError};

/// How differing concrete values on a VALUE or SHAPE track are handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeMode {
    /// Two different concrete values fail. ANYTHING still absorbs.
    Exact,
    /// Two different concrete values widen to ANYTHING. Used when joining
    /// the outcomes of alternative branches or callees.
    Widen,
}

/// Unifies TYPE tracks, resolving pending dtypes as a side effect.
pub trait DTypeBinder {
    fn bind(&self, a: &DTypeTrack, b: &DTypeTrack) -> InferResult<DTypeTrack>;
}

/// Binder for contexts without an inference loop; pending dtypes only merge
/// with themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPending;

impl DTypeBinder for NoPending {
    fn bind(&self, a: &DTypeTrack, b: &DTypeTrack) -> InferResult<DTypeTrack> {
        match (a, b) {
            (DTypeTrack::Pending(x), DTypeTrack::Pending(y)) if x == y => Ok(*a),
            (DTypeTrack::Pending(_), _) | (_, DTypeTrack::Pending(_)) => Err(
                InferenceError::internal("pending dtype merged without an inference loop"),
            ),
            _ => merge_known_dtypes(a, b),
        }
    }
}

/// Join of two TYPE tracks that hold no pending dtype.
pub fn merge_known_dtypes(a: &DTypeTrack, b: &DTypeTrack) -> InferResult<DTypeTrack> {
    match (a, b) {
        (DTypeTrack::Anything, _) | (_, DTypeTrack::Anything) => Ok(DTypeTrack::Anything),
        (DTypeTrack::Known(x), DTypeTrack::Known(y)) if x == y => Ok(*a),
        (DTypeTrack::Known(x), DTypeTrack::Known(y)) => Err(InferenceError::mismatch_text(
            x.to_string(),
            y.to_string(),
            "incompatible element types",
        )),
        _ => Err(InferenceError::internal("unexpected pending dtype")),
    }
}

fn merge_track<T: Clone + PartialEq>(
    a: &Track<T>,
    b: &Track<T>,
    mode: MergeMode,
) -> Result<Track<T>, ()> {
    match (a, b) {
        (Track::Anything, _) | (_, Track::Anything) => Ok(Track::Anything),
        (Track::Known(x), Track::Known(y)) if x == y => Ok(a.clone()),
        _ => match mode {
            MergeMode::Exact => Err(()),
            MergeMode::Widen => Ok(Track::Anything),
        },
    }
}

fn merge_shapes(
    a: &Track<Vec<Track<u64>>>,
    b: &Track<Vec<Track<u64>>>,
    mode: MergeMode,
) -> Result<Track<Vec<Track<u64>>>, ()> {
    match (a, b) {
        (Track::Known(x), Track::Known(y)) if x.len() == y.len() => x
            .iter()
            .zip(y)
            .map(|(dx, dy)| merge_track(dx, dy, mode))
            .collect::<Result<Vec<_>, ()>>()
            .map(Track::Known),
        _ => merge_track(a, b, mode),
    }
}

fn merge_all(
    xs: &[AbstractValue],
    ys: &[AbstractValue],
    binder: &dyn DTypeBinder,
    mode: MergeMode,
) -> InferResult<Vec<AbstractValue>> {
    xs.iter().zip(ys).map(|(x, y)| x.merge(y, binder, mode)).collect()
}

fn merge_fields(
    a: &[(String, AbstractValue)],
    b: &[(String, AbstractValue)],
    binder: &dyn DTypeBinder,
    mode: MergeMode,
) -> Option<InferResult<Vec<(String, AbstractValue)>>> {
    if a.len() != b.len() || a.iter().zip(b).any(|((na, _), (nb, _))| na != nb) {
        return None;
    }
    Some(
        a.iter()
            .zip(b)
            .map(|((name, x), (_, y))| Ok((name.clone(), x.merge(y, binder, mode)?)))
            .collect(),
    )
}

fn merge_classes(
    a: &ClassLike,
    b: &ClassLike,
    binder: &dyn DTypeBinder,
    mode: MergeMode,
) -> Option<InferResult<ClassLike>> {
    if a.tag != b.tag {
        return None;
    }
    merge_fields(&a.fields, &b.fields, binder, mode).map(|fields| {
        Ok(ClassLike {
            tag: a.tag.clone(),
            fields: fields?,
            methods: a.methods.clone(),
        })
    })
}

impl AbstractValue {
    /// Least upper bound of `self` and `other`.
    ///
    /// Tracks join independently. ANYTHING absorbs concrete values; tuple
    /// arity, class tags, dict keys and element types must agree; functions
    /// join to the union of their callees.
    pub fn merge(
        &self,
        other: &AbstractValue,
        binder: &dyn DTypeBinder,
        mode: MergeMode,
    ) -> InferResult<AbstractValue> {
        use AbstractValue as AV;

        let mismatch = |reason: &str| InferenceError::type_mismatch(self, other, reason);

        match (self, other) {
            (
                AV::Scalar {
                    value: va,
                    dtype: da,
                },
                AV::Scalar {
                    value: vb,
                    dtype: db,
                },
            ) => {
                let dtype = binder.bind(da, db)?;
                let value = merge_track(&coerce_value(va, &dtype), &coerce_value(vb, &dtype), mode)
                    .map_err(|_| mismatch("different constant values"))?;
                Ok(AV::Scalar { value, dtype })
            }
            (AV::Tuple(xs), AV::Tuple(ys)) => {
                if xs.len() != ys.len() {
                    return Err(mismatch("tuples of different lengths"));
                }
                Ok(AV::Tuple(merge_all(xs, ys, binder, mode)?))
            }
            (
                AV::Array {
                    element: ea,
                    shape: sa,
                },
                AV::Array {
                    element: eb,
                    shape: sb,
                },
            ) => {
                let element = ea.merge(eb, binder, mode)?;
                let shape = merge_shapes(sa, sb, mode).map_err(|_| mismatch("different shapes"))?;
                Ok(AV::Array {
                    element: Box::new(element),
                    shape,
                })
            }
            (AV::Class(a), AV::Class(b)) => merge_classes(a, b, binder, mode)
                .ok_or_else(|| mismatch("different classes"))?
                .map(AV::Class),
            (AV::Adt(a), AV::Adt(b)) => merge_classes(a, b, binder, mode)
                .ok_or_else(|| mismatch("different data types"))?
                .map(AV::Adt),
            (AV::AdtRef(a), AV::AdtRef(b)) if a == b => Ok(self.clone()),
            (AV::Dict(a), AV::Dict(b)) => merge_fields(a, b, binder, mode)
                .ok_or_else(|| mismatch("dicts with different keys"))?
                .map(AV::Dict),
            (AV::Function(a), AV::Function(b)) => Ok(AV::Function(a.union(b))),
            (AV::Type(a), AV::Type(b)) if a == b => Ok(self.clone()),
            (
                AV::KeywordArgument {
                    name: na,
                    value: va,
                },
                AV::KeywordArgument {
                    name: nb,
                    value: vb,
                },
            ) if na == nb => Ok(AV::KeywordArgument {
                name: na.clone(),
                value: Box::new(va.merge(vb, binder, mode)?),
            }),
            (AV::JTagged(a), AV::JTagged(b)) => {
                Ok(AV::JTagged(Box::new(a.merge(b, binder, mode)?)))
            }
            (AV::External { type_name: a }, AV::External { type_name: b }) if a == b => {
                Ok(self.clone())
            }
            (AV::Error { reason: a }, AV::Error { reason: b }) if a == b => Ok(self.clone()),
            _ => Err(mismatch("incompatible abstract values")),
        }
    }

    /// Demote every concrete VALUE track to ANYTHING.
    ///
    /// Types, shapes and callees are kept.
    pub fn broaden(&self) -> AbstractValue {
        use AbstractValue as AV;
        match self {
            AV::Scalar { dtype, .. } => AV::Scalar {
                value: Track::Anything,
                dtype: *dtype,
            },
            AV::Tuple(xs) => AV::Tuple(xs.iter().map(AV::broaden).collect()),
            AV::Array { element, shape } => AV::Array {
                element: Box::new(element.broaden()),
                shape: shape.clone(),
            },
            AV::Class(c) => AV::Class(broaden_class(c)),
            AV::Adt(c) => AV::Adt(broaden_class(c)),
            AV::Dict(entries) => AV::Dict(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.broaden()))
                    .collect(),
            ),
            AV::KeywordArgument { name, value } => AV::KeywordArgument {
                name: name.clone(),
                value: Box::new(value.broaden()),
            },
            AV::JTagged(inner) => AV::JTagged(Box::new(inner.broaden())),
            AV::AdtRef(_)
            | AV::Function(_)
            | AV::Type(_)
            | AV::External { .. }
            | AV::Error { .. } => self.clone(),
        }
    }

    /// Rebuild the value with every TYPE track passed through `f`.
    ///
    /// Reaches into partial-application arguments and virtual signatures but
    /// not into context keys.
    pub fn try_map_dtypes(
        &self,
        f: &mut dyn FnMut(&DTypeTrack) -> InferResult<DTypeTrack>,
    ) -> InferResult<AbstractValue> {
        self.try_map_scalars(&mut |value: &Track<ScalarValue>, dtype: &DTypeTrack| {
            Ok(AbstractValue::Scalar {
                value: value.clone(),
                dtype: f(dtype)?,
            })
        })
    }

    /// Rebuild the value with every scalar replaced by `f(value, dtype)`.
    pub fn try_map_scalars(&self, f: &mut ScalarMap<'_>) -> InferResult<AbstractValue> {
        use AbstractValue as AV;
        Ok(match self {
            AV::Scalar { value, dtype } => f(value, dtype)?,
            AV::Tuple(xs) => AV::Tuple(map_many(xs, f)?),
            AV::Array { element, shape } => AV::Array {
                element: Box::new(element.try_map_scalars(f)?),
                shape: shape.clone(),
            },
            AV::Class(c) => AV::Class(map_class(c, f)?),
            AV::Adt(c) => AV::Adt(map_class(c, f)?),
            AV::Dict(entries) => AV::Dict(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.try_map_scalars(f)?)))
                    .collect::<InferResult<_>>()?,
            ),
            AV::Function(set) => {
                let mut variants = Vec::with_capacity(set.len());
                for v in set {
                    variants.push(map_variant(v, f)?);
                }
                AV::Function(FunctionSet::new(variants))
            }
            AV::Type(inner) => AV::Type(Box::new(inner.try_map_scalars(f)?)),
            AV::KeywordArgument { name, value } => AV::KeywordArgument {
                name: name.clone(),
                value: Box::new(value.try_map_scalars(f)?),
            },
            AV::JTagged(inner) => AV::JTagged(Box::new(inner.try_map_scalars(f)?)),
            AV::AdtRef(_) | AV::External { .. } | AV::Error { .. } => self.clone(),
        })
    }

    /// Whether any TYPE track is still pending.
    pub fn has_pending(&self) -> bool {
        let mut found = false;
        let _ = self.try_map_dtypes(&mut |t| {
            if matches!(t, DTypeTrack::Pending(_)) {
                found = true;
            }
            Ok(*t)
        });
        found
    }
}

/// Scalar rewrite used by [`AbstractValue::try_map_scalars`].
pub type ScalarMap<'a> =
    dyn FnMut(&Track<ScalarValue>, &DTypeTrack) -> InferResult<AbstractValue> + 'a;

fn map_many(xs: &[AbstractValue], f: &mut ScalarMap<'_>) -> InferResult<Vec<AbstractValue>> {
    xs.iter().map(|x| x.try_map_scalars(f)).collect()
}

fn map_class(c: &ClassLike, f: &mut ScalarMap<'_>) -> InferResult<ClassLike> {
    Ok(ClassLike {
        tag: c.tag.clone(),
        fields: c
            .fields
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.try_map_scalars(f)?)))
            .collect::<InferResult<_>>()?,
        methods: c.methods.clone(),
    })
}

fn map_variant(v: &FunctionVariant, f: &mut ScalarMap<'_>) -> InferResult<FunctionVariant> {
    Ok(match v {
        FunctionVariant::Partial { func, args } => FunctionVariant::Partial {
            func: Box::new(map_variant(func, f)?),
            args: map_many(args, f)?,
        },
        FunctionVariant::JTransformed(inner) => {
            FunctionVariant::JTransformed(Box::new(map_variant(inner, f)?))
        }
        FunctionVariant::Virtual { args, output } => FunctionVariant::Virtual {
            args: map_many(args, f)?,
            output: Box::new(output.try_map_scalars(f)?),
        },
        other => other.clone(),
    })
}

fn broaden_class(c: &ClassLike) -> ClassLike {
    ClassLike {
        tag: c.tag.clone(),
        fields: c
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.broaden()))
            .collect(),
        methods: c.methods.clone(),
    }
}

/// A known VALUE in the representation its dtype calls for.
///
/// Integer literals whose dtype resolved to a float become floats.
pub fn coerce_value(value: &Track<ScalarValue>, dtype: &DTypeTrack) -> Track<ScalarValue> {
    match (value, dtype) {
        (Track::Known(ScalarValue::Int(i)), DTypeTrack::Known(d)) if d.is_float() => {
            Track::Known(ScalarValue::Float(*i as f64))
        }
        _ => value.clone(),
    }
}

/// Type of the sensitivity (gradient) of a value of type `value`.
///
/// Functions become the environment scalar, J tags are stripped, containers
/// are transformed element-wise and scalars lose their concrete value.
pub fn sensitivity_transform(value: &AbstractValue) -> AbstractValue {
    use AbstractValue as AV;
    match value {
        AV::Function(_) => AV::Scalar {
            value: Track::Anything,
            dtype: DTypeTrack::Known(DType::Env),
        },
        AV::JTagged(inner) => sensitivity_transform(inner),
        AV::Tuple(xs) => AV::Tuple(xs.iter().map(sensitivity_transform).collect()),
        AV::Class(c) => AV::Class(ClassLike {
            tag: c.tag.clone(),
            fields: c
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), sensitivity_transform(v)))
                .collect(),
            methods: c.methods.clone(),
        }),
        AV::Array { element, shape } => AV::Array {
            element: Box::new(sensitivity_transform(element)),
            shape: shape.clone(),
        },
        other => other.broaden(),
    }
}

/// Fail with an argument error if any value is a keyword argument.
pub fn reject_keywords(args: &[AbstractValue]) -> InferResult<()> {
    match args
        .iter()
        .find(|a| matches!(a, AbstractValue::KeywordArgument { .. }))
    {
        Some(AbstractValue::KeywordArgument { name, .. }) => Err(InferenceError::argument(
            format!("keyword argument '{}' is not allowed here", name),
        )),
        _ => Ok(()),
    }
}

/// The concrete VALUE of a scalar, if known.
pub fn known_scalar(value: &AbstractValue) -> Option<&ScalarValue> {
    value.scalar_value().and_then(Track::known)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ir::Primitive;
    use pretty_assertions::assert_eq;

    fn int(v: i64) -> AbstractValue {
        AbstractValue::constant(ScalarValue::Int(v), DType::INT64)
    }

    fn merge(a: &AbstractValue, b: &AbstractValue, mode: MergeMode) -> InferResult<AbstractValue> {
        a.merge(b, &NoPending, mode)
    }

    #[test]
    fn test_merge_anything_absorbs() {
        let any = AbstractValue::int64();
        assert_eq!(merge(&int(3), &any, MergeMode::Exact).unwrap(), any);
        assert_eq!(merge(&any, &int(3), MergeMode::Exact).unwrap(), any);
        assert_eq!(merge(&int(3), &int(3), MergeMode::Exact).unwrap(), int(3));
    }

    #[test]
    fn test_merge_conflicting_values() {
        let err = merge(&int(1), &int(2), MergeMode::Exact).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
        assert_eq!(
            merge(&int(1), &int(2), MergeMode::Widen).unwrap(),
            AbstractValue::int64()
        );
    }

    #[test]
    fn test_merge_dtype_mismatch_fails_in_both_modes() {
        for mode in [MergeMode::Exact, MergeMode::Widen] {
            let err = merge(&AbstractValue::int64(), &AbstractValue::float64(), mode).unwrap_err();
            assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
        }
    }

    #[test]
    fn test_merge_tuples() {
        let a = AbstractValue::Tuple(vec![int(1), AbstractValue::bool()]);
        let b = AbstractValue::Tuple(vec![AbstractValue::int64(), AbstractValue::bool()]);
        assert_eq!(
            merge(&a, &b, MergeMode::Exact).unwrap(),
            AbstractValue::Tuple(vec![AbstractValue::int64(), AbstractValue::bool()])
        );
        let short = AbstractValue::Tuple(vec![int(1)]);
        assert!(merge(&a, &short, MergeMode::Widen).is_err());
    }

    #[test]
    fn test_merge_array_shapes() {
        let a = AbstractValue::array(DType::FLOAT32, &[2, 3]);
        let b = AbstractValue::array(DType::FLOAT32, &[2, 4]);
        assert!(merge(&a, &b, MergeMode::Exact).is_err());
        let widened = merge(&a, &b, MergeMode::Widen).unwrap();
        assert_eq!(
            widened,
            AbstractValue::Array {
                element: Box::new(AbstractValue::float32()),
                shape: Track::Known(vec![Track::Known(2), Track::Anything]),
            }
        );
    }

    #[test]
    fn test_merge_functions_is_union() {
        let add = AbstractValue::function(FunctionVariant::primitive(Primitive::ScalarAdd));
        let sub = AbstractValue::function(FunctionVariant::primitive(Primitive::ScalarSub));
        let joined = merge(&add, &sub, MergeMode::Exact).unwrap();
        assert_eq!(
            joined,
            AbstractValue::Function(FunctionSet::new([
                FunctionVariant::primitive(Primitive::ScalarSub),
                FunctionVariant::primitive(Primitive::ScalarAdd),
            ]))
        );
    }

    #[test]
    fn test_merge_classes_need_same_tag() {
        let p = AbstractValue::Class(ClassLike::new("Point", vec![("x".into(), int(1))]));
        let q = AbstractValue::Class(ClassLike::new("Other", vec![("x".into(), int(1))]));
        assert!(merge(&p, &q, MergeMode::Widen).is_err());
        assert_eq!(merge(&p, &p, MergeMode::Exact).unwrap(), p);
    }

    #[test]
    fn test_broaden_keeps_types_and_shapes() {
        let v = AbstractValue::Tuple(vec![int(4), AbstractValue::array(DType::INT64, &[3])]);
        assert_eq!(
            v.broaden(),
            AbstractValue::Tuple(vec![
                AbstractValue::int64(),
                AbstractValue::array(DType::INT64, &[3])
            ])
        );
    }

    #[test]
    fn test_sensitivity_transform() {
        let f = AbstractValue::function(FunctionVariant::primitive(Primitive::ScalarAdd));
        assert_eq!(sensitivity_transform(&f), AbstractValue::scalar(DType::Env));
        let tagged = AbstractValue::JTagged(Box::new(int(2)));
        assert_eq!(sensitivity_transform(&tagged), AbstractValue::int64());
    }

    #[test]
    fn test_reject_keywords() {
        assert!(reject_keywords(&[AbstractValue::int64()]).is_ok());
        let err = reject_keywords(&[AbstractValue::keyword("y", AbstractValue::int64())])
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Argument(_)));
    }

    #[test]
    fn test_no_pending_binder() {
        use crate::lattice::types::TypeVarId;
        let p = DTypeTrack::Pending(TypeVarId(0));
        assert_eq!(NoPending.bind(&p, &p).unwrap(), p);
        assert!(NoPending
            .bind(&p, &DTypeTrack::Known(DType::INT64))
            .is_err());
    }
}
