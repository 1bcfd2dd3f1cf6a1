//! Conversion of concrete values to abstract values.
//!
//! Constants carried by the IR convert structurally. Host values wrapped in
//! [`ExternalValue`] go through a converter table: frontends implement
//! [`Convertible`] and call [`register_converter`] during setup, and every
//! engine takes a [`ConverterTable::snapshot`] when it is built.

use super::ops::{DTypeBinder, MergeMode};
use super::types::{
    AbstractValue, ClassLike, DType, DTypeTrack, FunctionVariant, ScalarValue, Track,
};
use crate::abstract_interp::reference::Context;
use crate::error::{InferResult, InferenceError};
use crate::ir::{Constant, ExternalValue, NodeId, RecordValue};
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::RwLock;

/// Tag of the non-empty list cell.
pub const CONS_TAG: &str = "Cons";
/// Tag of the empty list.
pub const EMPTY_TAG: &str = "Empty";

/// Host types that know their abstract value.
pub trait Convertible: Any {
    fn to_abstract(&self) -> InferResult<AbstractValue>;
}

pub type Converter = fn(&ExternalValue) -> InferResult<AbstractValue>;

static CONVERTERS: Lazy<RwLock<HashMap<TypeId, Converter>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn convert_with<T: Convertible>(value: &ExternalValue) -> InferResult<AbstractValue> {
    match value.downcast_ref::<T>() {
        Some(v) => v.to_abstract(),
        None => Err(InferenceError::internal(format!(
            "converter for {} received {}",
            std::any::type_name::<T>(),
            value.type_name()
        ))),
    }
}

/// Register `T`'s converter process-wide. Engines built afterwards see it.
pub fn register_converter<T: Convertible>() {
    let mut table = CONVERTERS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    table.insert(TypeId::of::<T>(), convert_with::<T> as Converter);
}

/// Immutable copy of the registered converters.
#[derive(Debug, Clone, Default)]
pub struct ConverterTable {
    table: HashMap<TypeId, Converter>,
}

impl ConverterTable {
    pub fn snapshot() -> Self {
        let table = CONVERTERS
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            table: table.clone(),
        }
    }

    pub fn convert(&self, value: &ExternalValue) -> Option<InferResult<AbstractValue>> {
        self.table
            .get(&value.value_type_id())
            .map(|converter| converter(value))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Source of pending dtypes for numeric literals.
pub trait LiteralTypes {
    /// A pending dtype over the number types defaulting to `natural`.
    fn literal_dtype(&self, natural: DType, priority: i32) -> DTypeTrack;
}

/// Everything a conversion may need besides the value.
pub struct ConvertCx<'a> {
    /// Context captured by graph constants (already filtered to the graph's parent).
    pub context: Context,
    /// The constant node, recorded as the tracking id of callees.
    pub node: Option<NodeId>,
    /// When absent, literals get their natural dtype directly.
    pub literals: Option<&'a dyn LiteralTypes>,
    pub binder: &'a dyn DTypeBinder,
    pub converters: &'a ConverterTable,
}

impl std::fmt::Debug for ConvertCx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertCx")
            .field("context", &self.context)
            .field("node", &self.node)
            .field("literals", &self.literals.is_some())
            .finish()
    }
}

impl ConvertCx<'_> {
    fn number(&self, value: ScalarValue, natural: DType, priority: i32) -> AbstractValue {
        let dtype = match self.literals {
            Some(lit) => lit.literal_dtype(natural, priority),
            None => DTypeTrack::Known(natural),
        };
        AbstractValue::Scalar {
            value: Track::Known(value),
            dtype,
        }
    }
}

/// Abstract value of a constant.
pub fn to_abstract(value: &Constant, cx: &ConvertCx<'_>) -> InferResult<AbstractValue> {
    Ok(match value {
        Constant::Int(v) => cx.number(ScalarValue::Int(*v), DType::INT64, 0),
        Constant::Float(v) => cx.number(ScalarValue::Float(*v), DType::FLOAT64, 1),
        Constant::Bool(v) => AbstractValue::constant(ScalarValue::Bool(*v), DType::Bool),
        Constant::None => AbstractValue::constant(ScalarValue::Nil, DType::Nil),
        Constant::Str(s) => AbstractValue::constant(ScalarValue::Str(s.clone()), DType::Str),
        Constant::Tuple(items) => AbstractValue::Tuple(
            items
                .iter()
                .map(|item| to_abstract(item, cx))
                .collect::<InferResult<_>>()?,
        ),
        Constant::List(items) => list_to_abstract(items, cx)?,
        Constant::Dict(entries) => {
            let mut converted = entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), to_abstract(v, cx)?)))
                .collect::<InferResult<Vec<_>>>()?;
            converted.sort_by(|a, b| a.0.cmp(&b.0));
            AbstractValue::Dict(converted)
        }
        Constant::Array { shape, dtype } => AbstractValue::array(*dtype, shape),
        Constant::Record(record) => record_to_abstract(record, cx)?,
        Constant::Type(t) => AbstractValue::Type(Box::new(t.clone())),
        Constant::Graph(graph) => AbstractValue::function(FunctionVariant::Graph {
            graph: *graph,
            context: cx.context.clone(),
            tracking: cx.node,
        }),
        Constant::MetaGraph(metagraph) => AbstractValue::function(FunctionVariant::MetaGraph {
            metagraph: *metagraph,
            tracking: cx.node,
        }),
        Constant::Macro(id) => AbstractValue::function(FunctionVariant::Macro(*id)),
        Constant::Primitive(prim) => AbstractValue::function(FunctionVariant::Primitive {
            prim: *prim,
            tracking: cx.node,
        }),
        Constant::External(ext) => match cx.converters.convert(ext) {
            Some(result) => result?,
            None => AbstractValue::External {
                type_name: ext.type_name().to_string(),
            },
        },
    })
}

fn list_to_abstract(items: &[Constant], cx: &ConvertCx<'_>) -> InferResult<AbstractValue> {
    let mut elements = items.iter().map(|item| to_abstract(item, cx));
    let first = match elements.next() {
        None => return Ok(empty_list()),
        Some(first) => first?,
    };
    let joined = elements.try_fold(first, |acc, next| {
        acc.merge(&next?, cx.binder, MergeMode::Widen)
    })?;
    Ok(listof(joined.broaden()))
}

fn record_to_abstract(record: &RecordValue, cx: &ConvertCx<'_>) -> InferResult<AbstractValue> {
    let fields = record
        .fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), to_abstract(v, cx)?)))
        .collect::<InferResult<Vec<_>>>()?;
    let class = ClassLike {
        tag: record.tag.clone(),
        fields,
        methods: record.methods.clone(),
    };
    Ok(if record.adt {
        normalize_adt(AbstractValue::Adt(class))
    } else {
        AbstractValue::Class(class)
    })
}

/// List of `element`: a cons cell whose tail refers back to the list type.
pub fn listof(element: AbstractValue) -> AbstractValue {
    AbstractValue::Adt(ClassLike::new(
        CONS_TAG,
        vec![
            ("head".to_string(), element),
            ("tail".to_string(), AbstractValue::AdtRef(CONS_TAG.to_string())),
        ],
    ))
}

pub fn empty_list() -> AbstractValue {
    AbstractValue::Adt(ClassLike::new(EMPTY_TAG, Vec::new()))
}

/// Replace nested occurrences of an ADT's own tag with [`AbstractValue::AdtRef`].
pub fn normalize_adt(value: AbstractValue) -> AbstractValue {
    match value {
        AbstractValue::Adt(class) => {
            let tag = class.tag.clone();
            AbstractValue::Adt(ClassLike {
                fields: class
                    .fields
                    .into_iter()
                    .map(|(k, v)| (k, alias_tag(v, &tag)))
                    .collect(),
                ..class
            })
        }
        other => other,
    }
}

fn alias_tag(value: AbstractValue, tag: &str) -> AbstractValue {
    match value {
        AbstractValue::Adt(class) if class.tag == tag => AbstractValue::AdtRef(tag.to_string()),
        AbstractValue::Adt(class) => normalize_adt(AbstractValue::Adt(class)),
        AbstractValue::Tuple(xs) => {
            AbstractValue::Tuple(xs.into_iter().map(|x| alias_tag(x, tag)).collect())
        }
        AbstractValue::Class(class) => AbstractValue::Class(ClassLike {
            fields: class
                .fields
                .into_iter()
                .map(|(k, v)| (k, alias_tag(v, tag)))
                .collect(),
            ..class
        }),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphId, Primitive};
    use crate::lattice::ops::NoPending;
    use pretty_assertions::assert_eq;

    fn plain<'a>(converters: &'a ConverterTable) -> ConvertCx<'a> {
        ConvertCx {
            context: Context::empty(),
            node: Some(NodeId(9)),
            literals: None,
            binder: &NoPending,
            converters,
        }
    }

    #[test]
    fn test_scalars() {
        let table = ConverterTable::default();
        let cx = plain(&table);
        assert_eq!(
            to_abstract(&Constant::Int(5), &cx).unwrap(),
            AbstractValue::constant(ScalarValue::Int(5), DType::INT64)
        );
        assert_eq!(
            to_abstract(&Constant::Bool(true), &cx).unwrap(),
            AbstractValue::constant(ScalarValue::Bool(true), DType::Bool)
        );
        assert_eq!(
            to_abstract(&Constant::None, &cx).unwrap(),
            AbstractValue::constant(ScalarValue::Nil, DType::Nil)
        );
    }

    #[test]
    fn test_list_is_broadened_cons() {
        let table = ConverterTable::default();
        let cx = plain(&table);
        let list = Constant::List(vec![Constant::Int(1), Constant::Int(2)]);
        assert_eq!(to_abstract(&list, &cx).unwrap(), listof(AbstractValue::int64()));
        assert_eq!(
            to_abstract(&Constant::List(vec![]), &cx).unwrap(),
            empty_list()
        );
        let mixed = Constant::List(vec![Constant::Int(1), Constant::Float(2.0)]);
        assert!(to_abstract(&mixed, &cx).is_err());
    }

    #[test]
    fn test_array_and_dict() {
        let table = ConverterTable::default();
        let cx = plain(&table);
        let arr = Constant::Array {
            shape: vec![2, 3],
            dtype: DType::FLOAT32,
        };
        assert_eq!(
            to_abstract(&arr, &cx).unwrap(),
            AbstractValue::array(DType::FLOAT32, &[2, 3])
        );
        let dict = Constant::Dict(vec![
            ("b".to_string(), Constant::Bool(false)),
            ("a".to_string(), Constant::Int(1)),
        ]);
        match to_abstract(&dict, &cx).unwrap() {
            AbstractValue::Dict(entries) => {
                let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "b"]);
            }
            other => panic!("expected dict, got {}", other),
        }
    }

    #[test]
    fn test_callables_carry_tracking() {
        let table = ConverterTable::default();
        let cx = plain(&table);
        assert_eq!(
            to_abstract(&Constant::Primitive(Primitive::ScalarAdd), &cx).unwrap(),
            AbstractValue::function(FunctionVariant::Primitive {
                prim: Primitive::ScalarAdd,
                tracking: Some(NodeId(9)),
            })
        );
        assert_eq!(
            to_abstract(&Constant::Graph(GraphId(2)), &cx).unwrap(),
            AbstractValue::function(FunctionVariant::Graph {
                graph: GraphId(2),
                context: Context::empty(),
                tracking: Some(NodeId(9)),
            })
        );
    }

    #[test]
    fn test_adt_self_reference_is_aliased() {
        let table = ConverterTable::default();
        let cx = plain(&table);
        let leaf = RecordValue::new("Tree", vec![("value".into(), Constant::Int(1))]).as_adt();
        let node = RecordValue::new(
            "Tree",
            vec![
                ("value".into(), Constant::Int(2)),
                ("child".into(), Constant::Record(leaf)),
            ],
        )
        .as_adt();
        let converted = to_abstract(&Constant::Record(node), &cx).unwrap();
        match converted {
            AbstractValue::Adt(class) => {
                assert_eq!(
                    class.field("child"),
                    Some(&AbstractValue::AdtRef("Tree".to_string()))
                );
            }
            other => panic!("expected adt, got {}", other),
        }
    }

    #[derive(Debug)]
    struct Meters(f64);

    impl Convertible for Meters {
        fn to_abstract(&self) -> InferResult<AbstractValue> {
            Ok(AbstractValue::constant(ScalarValue::Float(self.0), DType::FLOAT64))
        }
    }

    #[derive(Debug)]
    struct Unregistered;

    #[test]
    fn test_converter_registry_snapshot() {
        let before = ConverterTable::snapshot();
        register_converter::<Meters>();
        let after = ConverterTable::snapshot();

        let value = ExternalValue::new(Meters(2.0));
        assert!(before.convert(&value).is_none());
        assert_eq!(
            to_abstract(&Constant::External(value), &plain(&after)).unwrap(),
            AbstractValue::constant(ScalarValue::Float(2.0), DType::FLOAT64)
        );

        let opaque = ExternalValue::new(Unregistered);
        match to_abstract(&Constant::External(opaque), &plain(&after)).unwrap() {
            AbstractValue::External { type_name } => assert!(type_name.ends_with("Unregistered")),
            other => panic!("expected external, got {}", other),
        }
    }
}
