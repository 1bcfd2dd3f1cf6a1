//! Concrete values carried by constant nodes.

use super::core::{GraphId, MacroId, MetaGraphId};
use super::prim::Primitive;
use crate::lattice::{AbstractValue, DType};
use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Value of a constant node.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Str(String),
    Tuple(Vec<Constant>),
    List(Vec<Constant>),
    Dict(Vec<(String, Constant)>),
    /// An n-dimensional array, described by shape and element dtype only.
    Array { shape: Vec<u64>, dtype: DType },
    Record(RecordValue),
    /// A type used as a value (e.g. a class used as its own constructor).
    Type(AbstractValue),
    Graph(GraphId),
    MetaGraph(MetaGraphId),
    Macro(MacroId),
    Primitive(Primitive),
    External(ExternalValue),
}

impl Constant {
    /// Whether a numeric literal appears anywhere in this constant.
    pub fn holds_number(&self) -> bool {
        match self {
            Constant::Int(_) | Constant::Float(_) => true,
            Constant::Tuple(items) | Constant::List(items) => {
                items.iter().any(Constant::holds_number)
            }
            Constant::Dict(entries) => entries.iter().any(|(_, c)| c.holds_number()),
            Constant::Record(record) => record.fields.iter().any(|(_, c)| c.holds_number()),
            _ => false,
        }
    }
}

/// Instance of a user-defined record class.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordValue {
    pub tag: String,
    pub fields: Vec<(String, Constant)>,
    pub methods: BTreeMap<String, GraphId>,
    /// Recursive algebraic data type (lists, trees) rather than a plain class.
    pub adt: bool,
}

impl RecordValue {
    pub fn new(tag: impl Into<String>, fields: Vec<(String, Constant)>) -> Self {
        Self {
            tag: tag.into(),
            fields,
            methods: BTreeMap::new(),
            adt: false,
        }
    }

    pub fn with_method(mut self, name: impl Into<String>, graph: GraphId) -> Self {
        self.methods.insert(name.into(), graph);
        self
    }

    pub fn as_adt(mut self) -> Self {
        self.adt = true;
        self
    }
}

/// Opaque host value handed to the engine by a frontend.
///
/// Converted through the registry in [`crate::lattice::convert`]; equality
/// is identity.
#[derive(Clone)]
pub struct ExternalValue {
    value: Rc<dyn Any>,
    type_name: &'static str,
}

impl ExternalValue {
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            value: Rc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn value_type_id(&self) -> TypeId {
        Any::type_id(&*self.value)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for ExternalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalValue({})", self.type_name)
    }
}

impl PartialEq for ExternalValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }
}
