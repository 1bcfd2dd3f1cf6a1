//! Transfer functions for tuples, records, partial application and control.

use crate::abstract_interp::engine::InferenceEngine;
use crate::abstract_interp::inferrers::jtag;
use crate::abstract_interp::reference::Context;
use crate::error::{InferResult, InferenceError};
use crate::lattice::convert::normalize_adt;
use crate::lattice::ops::known_scalar;
use crate::lattice::{
    AbstractValue, ClassLike, DType, FunctionVariant, MergeMode, ScalarValue,
};

use super::{expect_args, expect_str};

/// Transfer function for `return_`: the identity.
pub fn tfunc_return(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [value] = expect_args(args)?;
    Ok(value.clone())
}

/// Transfer function for `switch(cond, if_true, if_false)`.
///
/// The condition's dtype is forced immediately and must be `Bool`. A known
/// condition selects one branch; otherwise both branches are joined.
///
/// # Examples
/// ```text
/// switch(Bool(true), Int64(1), Float64) → Int64(1)
/// switch(Bool, Int64(1), Int64(2))      → Int64
/// ```
pub fn tfunc_switch(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [cond, if_true, if_false] = expect_args(args)?;
    engine.check_immediate(std::slice::from_ref(cond), |d| *d == DType::Bool, "Bool")?;
    match known_scalar(cond) {
        Some(ScalarValue::Bool(true)) => Ok(if_true.clone()),
        Some(ScalarValue::Bool(false)) => Ok(if_false.clone()),
        _ => engine.abstract_merge(&[if_true.clone(), if_false.clone()], MergeMode::Widen),
    }
}

/// Transfer function for `make_tuple`.
pub fn tfunc_make_tuple(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    Ok(AbstractValue::Tuple(args.to_vec()))
}

fn expect_tuple<'a>(value: &'a AbstractValue) -> InferResult<&'a [AbstractValue]> {
    match value {
        AbstractValue::Tuple(items) => Ok(items),
        other => Err(InferenceError::mismatch_text(
            "tuple",
            other.to_string(),
            "expected a tuple",
        )),
    }
}

/// Transfer function for `tuple_getitem(tuple, index)`.
///
/// The index must be a constant integer; negative indices count from the end.
pub fn tfunc_tuple_getitem(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [tuple, index] = expect_args(args)?;
    let items = expect_tuple(tuple)?;
    let Some(ScalarValue::Int(i)) = known_scalar(index) else {
        return Err(InferenceError::argument(format!(
            "tuple index must be a constant integer, got {}",
            index
        )));
    };
    let len = items.len() as i64;
    let position = if *i < 0 { len + i } else { *i };
    if !(0..len).contains(&position) {
        return Err(InferenceError::argument(format!(
            "tuple index {} out of range for {} elements",
            i, len
        )));
    }
    Ok(items[position as usize].clone())
}

/// Transfer function for `tuple_len`: a constant `Int64`.
pub fn tfunc_tuple_len(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [tuple] = expect_args(args)?;
    let items = expect_tuple(tuple)?;
    Ok(AbstractValue::constant(
        ScalarValue::Int(items.len() as i64),
        DType::INT64,
    ))
}

/// Transfer function for `tuple_tail`: every element but the first.
pub fn tfunc_tuple_tail(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [tuple] = expect_args(args)?;
    match expect_tuple(tuple)? {
        [] => Err(InferenceError::argument("tuple_tail of an empty tuple")),
        [_, rest @ ..] => Ok(AbstractValue::Tuple(rest.to_vec())),
    }
}

/// Transfer function for `partial(f, args...)`.
///
/// Each callee of `f` is wrapped with the bound arguments.
pub fn tfunc_partial(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let Some((func, bound)) = args.split_first() else {
        return Err(InferenceError::arity(1, 0));
    };
    let Some(fns) = func.as_functions() else {
        return Err(InferenceError::not_callable(func.to_string()));
    };
    Ok(AbstractValue::Function(fns.map(|f| FunctionVariant::Partial {
        func: Box::new(f.clone()),
        args: bound.to_vec(),
    })))
}

/// Transfer function for `make_record(Type[C], fields...)`.
///
/// Each field value is checked against the declared field type and kept as
/// given.
pub fn tfunc_make_record(engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let Some((ty, values)) = args.split_first() else {
        return Err(InferenceError::arity(1, 0));
    };
    let (template, adt) = match ty {
        AbstractValue::Type(inner) => match inner.as_ref() {
            AbstractValue::Class(c) => (c, false),
            AbstractValue::Adt(c) => (c, true),
            other => {
                return Err(InferenceError::mismatch_text(
                    "record type",
                    other.to_string(),
                    "make_record needs a class type",
                ))
            }
        },
        other => {
            return Err(InferenceError::mismatch_text(
                "type",
                other.to_string(),
                "make_record needs a type",
            ))
        }
    };
    if template.fields.len() != values.len() {
        return Err(InferenceError::arity(template.fields.len(), values.len()));
    }
    let mut fields = Vec::with_capacity(values.len());
    for ((name, declared), value) in template.fields.iter().zip(values) {
        if !matches!(declared, AbstractValue::AdtRef(_)) {
            engine.abstract_merge(&[declared.clone(), value.clone()], MergeMode::Exact)?;
        }
        fields.push((name.clone(), value.clone()));
    }
    let class = ClassLike {
        tag: template.tag.clone(),
        fields,
        methods: template.methods.clone(),
    };
    Ok(if adt {
        normalize_adt(AbstractValue::Adt(class))
    } else {
        AbstractValue::Class(class)
    })
}

/// Transfer function for `getattr(obj, name)`.
///
/// Type rules:
/// - record field → the field's value; a self-reference of an ADT unrolls to
///   the ADT itself
/// - record method → the method graph partially applied to `obj`
/// - dict entry → the entry's value
pub fn tfunc_getattr(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [obj, name] = expect_args(args)?;
    let name = expect_str(name, "attribute name")?;
    match obj {
        AbstractValue::Class(c) | AbstractValue::Adt(c) => {
            if let Some(value) = c.field(name) {
                return Ok(match value {
                    AbstractValue::AdtRef(tag) if *tag == c.tag => obj.clone(),
                    other => other.clone(),
                });
            }
            match c.methods.get(name) {
                Some(graph) => Ok(AbstractValue::function(FunctionVariant::Partial {
                    func: Box::new(FunctionVariant::Graph {
                        graph: *graph,
                        context: Context::empty(),
                        tracking: None,
                    }),
                    args: vec![obj.clone()],
                })),
                None => Err(InferenceError::argument(format!(
                    "{} has no attribute '{}'",
                    c.tag, name
                ))),
            }
        }
        AbstractValue::Dict(entries) => entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| InferenceError::argument(format!("no entry '{}' in dict", name))),
        other => Err(InferenceError::mismatch_text(
            "record",
            other.to_string(),
            format!("cannot get attribute '{}'", name),
        )),
    }
}

/// Transfer function for `make_kwarg(name, value)`.
pub fn tfunc_make_kwarg(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [name, value] = expect_args(args)?;
    let name = expect_str(name, "keyword name")?;
    Ok(AbstractValue::keyword(name, value.clone()))
}

/// Transfer function for `J(x)`: functions become J-transformed callees,
/// other values are J-tagged.
pub fn tfunc_j(_engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<AbstractValue> {
    let [value] = expect_args(args)?;
    Ok(jtag(value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ir::{GraphId, GraphManager, Primitive};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn engine() -> Rc<InferenceEngine> {
        InferenceEngine::with_defaults(GraphManager::new())
    }

    fn int(v: i64) -> AbstractValue {
        AbstractValue::constant(ScalarValue::Int(v), DType::INT64)
    }

    fn string(s: &str) -> AbstractValue {
        AbstractValue::constant(ScalarValue::Str(s.to_string()), DType::Str)
    }

    fn boolean(b: bool) -> AbstractValue {
        AbstractValue::constant(ScalarValue::Bool(b), DType::Bool)
    }

    #[test]
    fn test_switch() {
        let e = engine();
        let f = AbstractValue::float64();
        assert_eq!(tfunc_switch(&e, &[boolean(true), int(1), f.clone()]).unwrap(), int(1));
        assert_eq!(tfunc_switch(&e, &[boolean(false), int(1), f.clone()]).unwrap(), f);
        assert_eq!(
            tfunc_switch(&e, &[AbstractValue::bool(), int(1), int(2)]).unwrap(),
            AbstractValue::int64()
        );
        assert!(tfunc_switch(&e, &[AbstractValue::bool(), int(1), f]).is_err());
    }

    #[test]
    fn test_switch_requires_bool() {
        let e = engine();
        let err = tfunc_switch(&e, &[int(1), int(1), int(2)]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn test_tuple_ops() {
        let e = engine();
        let t = AbstractValue::Tuple(vec![int(1), AbstractValue::float64(), boolean(true)]);
        assert_eq!(tfunc_tuple_len(&e, &[t.clone()]).unwrap(), int(3));
        assert_eq!(
            tfunc_tuple_getitem(&e, &[t.clone(), int(1)]).unwrap(),
            AbstractValue::float64()
        );
        assert_eq!(tfunc_tuple_getitem(&e, &[t.clone(), int(-1)]).unwrap(), boolean(true));
        assert!(tfunc_tuple_getitem(&e, &[t.clone(), int(3)]).is_err());
        assert!(tfunc_tuple_getitem(&e, &[t.clone(), AbstractValue::int64()]).is_err());
        assert_eq!(
            tfunc_tuple_tail(&e, &[t]).unwrap(),
            AbstractValue::Tuple(vec![AbstractValue::float64(), boolean(true)])
        );
        assert!(tfunc_tuple_tail(&e, &[AbstractValue::Tuple(vec![])]).is_err());
    }

    #[test]
    fn test_partial_wraps_every_callee() {
        let e = engine();
        let f = AbstractValue::Function(crate::lattice::FunctionSet::new([
            FunctionVariant::primitive(Primitive::ScalarAdd),
            FunctionVariant::primitive(Primitive::ScalarMul),
        ]));
        let out = tfunc_partial(&e, &[f, int(1)]).unwrap();
        let fns = out.as_functions().unwrap();
        assert_eq!(fns.len(), 2);
        assert!(fns
            .iter()
            .all(|v| matches!(v, FunctionVariant::Partial { args, .. } if args == &vec![int(1)])));

        let err = tfunc_partial(&e, &[int(1)]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NotCallable(_)));
    }

    #[test]
    fn test_make_record_and_getattr() {
        let e = engine();
        let mut point = ClassLike::new(
            "Point",
            vec![
                ("x".to_string(), AbstractValue::int64()),
                ("y".to_string(), AbstractValue::int64()),
            ],
        );
        point.methods.insert("norm".to_string(), GraphId(4));
        let ty = AbstractValue::Type(Box::new(AbstractValue::Class(point)));

        let record = tfunc_make_record(&e, &[ty.clone(), int(1), int(2)]).unwrap();
        assert_eq!(tfunc_getattr(&e, &[record.clone(), string("y")]).unwrap(), int(2));

        let method = tfunc_getattr(&e, &[record.clone(), string("norm")]).unwrap();
        assert!(matches!(
            method.as_functions().and_then(|f| f.iter().next()),
            Some(FunctionVariant::Partial { args, .. }) if args == &vec![record.clone()]
        ));

        assert!(tfunc_getattr(&e, &[record, string("z")]).is_err());
        assert!(tfunc_make_record(&e, &[ty.clone(), int(1)]).is_err());
        assert!(tfunc_make_record(&e, &[ty, int(1), AbstractValue::float64()]).is_err());
    }

    #[test]
    fn test_getattr_dict() {
        let e = engine();
        let d = AbstractValue::Dict(vec![("a".to_string(), int(1))]);
        assert_eq!(tfunc_getattr(&e, &[d.clone(), string("a")]).unwrap(), int(1));
        assert!(tfunc_getattr(&e, &[d, AbstractValue::scalar(DType::Str)]).is_err());
    }

    #[test]
    fn test_make_kwarg_and_j() {
        let e = engine();
        assert_eq!(
            tfunc_make_kwarg(&e, &[string("n"), int(1)]).unwrap(),
            AbstractValue::keyword("n", int(1))
        );
        assert_eq!(
            tfunc_j(&e, &[AbstractValue::int64()]).unwrap(),
            AbstractValue::JTagged(Box::new(AbstractValue::int64()))
        );
    }
}
