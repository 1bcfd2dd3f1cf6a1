//! Abstract value types.
//!
//! An abstract value approximates every runtime value a node may take. Each
//! value is built from independent tracks (VALUE, TYPE, SHAPE) that join
//! separately:
//!
//! ```text
//!              ANYTHING          (top of a track)
//!          /     |      \
//!      Known(a) Known(b) ...     (incomparable concrete values)
//! ```
//!
//! The TYPE track of a scalar may also hold a pending type variable, created
//! for numeric literals whose precision is decided by how they are used.

use crate::abstract_interp::reference::Context;
use crate::ir::{GraphId, MacroId, MetaGraphId, NodeId, Primitive};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// One track: a concrete value or the absorbing top.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Track<T> {
    Known(T),
    Anything,
}

impl<T> Track<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Track::Known(v) => Some(v),
            Track::Anything => None,
        }
    }

    pub fn is_anything(&self) -> bool {
        matches!(self, Track::Anything)
    }
}

/// Element types of scalars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DType {
    Bool,
    Int(u8),
    UInt(u8),
    Float(u8),
    Nil,
    Str,
    /// Environment type of sensitivities (gradients of functions).
    Env,
}

impl DType {
    pub const INT64: DType = DType::Int(64);
    pub const FLOAT64: DType = DType::Float(64);
    pub const FLOAT32: DType = DType::Float(32);

    pub fn is_number(&self) -> bool {
        matches!(self, DType::Int(_) | DType::UInt(_) | DType::Float(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DType::Int(_) | DType::UInt(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float(_))
    }
}

/// Candidate dtypes for numeric literals, in preference order.
pub const NUMBER_TYPES: [DType; 11] = [
    DType::Int(8),
    DType::Int(16),
    DType::Int(32),
    DType::Int(64),
    DType::UInt(8),
    DType::UInt(16),
    DType::UInt(32),
    DType::UInt(64),
    DType::Float(16),
    DType::Float(32),
    DType::Float(64),
];

/// Identifier of a pending dtype held by the inference loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVarId(pub usize);

/// The TYPE track of a scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DTypeTrack {
    Known(DType),
    Anything,
    Pending(TypeVarId),
}

/// Concrete scalar values.
#[derive(Clone, Debug)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Str(String),
}

// f64 compared and hashed by bit pattern
impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScalarValue::Int(a), ScalarValue::Int(b)) => a == b,
            (ScalarValue::Float(a), ScalarValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => a == b,
            (ScalarValue::Nil, ScalarValue::Nil) => true,
            (ScalarValue::Str(a), ScalarValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ScalarValue::Int(v) => v.hash(state),
            ScalarValue::Float(v) => v.to_bits().hash(state),
            ScalarValue::Bool(v) => v.hash(state),
            ScalarValue::Nil => {}
            ScalarValue::Str(v) => v.hash(state),
        }
    }
}

/// Tagged record with ordered fields and a method table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassLike {
    pub tag: String,
    pub fields: Vec<(String, AbstractValue)>,
    pub methods: BTreeMap<String, GraphId>,
}

impl ClassLike {
    pub fn new(tag: impl Into<String>, fields: Vec<(String, AbstractValue)>) -> Self {
        Self {
            tag: tag.into(),
            fields,
            methods: BTreeMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&AbstractValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// One possible callee.
///
/// `tracking` is the constant node the function came from, so that uses of a
/// generic callee at different call sites can be told apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FunctionVariant {
    Primitive {
        prim: Primitive,
        tracking: Option<NodeId>,
    },
    Graph {
        graph: GraphId,
        context: Context,
        tracking: Option<NodeId>,
    },
    MetaGraph {
        metagraph: MetaGraphId,
        tracking: Option<NodeId>,
    },
    Partial {
        func: Box<FunctionVariant>,
        args: Vec<AbstractValue>,
    },
    JTransformed(Box<FunctionVariant>),
    Macro(MacroId),
    /// Externally-typed callee with one fixed signature.
    Virtual {
        args: Vec<AbstractValue>,
        output: Box<AbstractValue>,
    },
    Dummy,
}

impl FunctionVariant {
    pub fn primitive(prim: Primitive) -> Self {
        FunctionVariant::Primitive {
            prim,
            tracking: None,
        }
    }

    pub fn tracking(&self) -> Option<NodeId> {
        match self {
            FunctionVariant::Primitive { tracking, .. }
            | FunctionVariant::Graph { tracking, .. }
            | FunctionVariant::MetaGraph { tracking, .. } => *tracking,
            _ => None,
        }
    }

    /// The same callee with its tracking id cleared.
    pub fn untracked(&self) -> Self {
        let mut generic = self.clone();
        match &mut generic {
            FunctionVariant::Primitive { tracking, .. }
            | FunctionVariant::Graph { tracking, .. }
            | FunctionVariant::MetaGraph { tracking, .. } => *tracking = None,
            _ => {}
        }
        generic
    }
}

/// A set of callees. Equality and hashing ignore order.
#[derive(Clone, Debug)]
pub struct FunctionSet(Vec<FunctionVariant>);

impl FunctionSet {
    pub fn new(variants: impl IntoIterator<Item = FunctionVariant>) -> Self {
        let mut set = FunctionSet(Vec::new());
        for v in variants {
            set.insert(v);
        }
        set
    }

    pub fn single(variant: FunctionVariant) -> Self {
        FunctionSet(vec![variant])
    }

    pub fn insert(&mut self, variant: FunctionVariant) {
        if !self.0.contains(&variant) {
            self.0.push(variant);
        }
    }

    pub fn union(&self, other: &FunctionSet) -> FunctionSet {
        let mut out = self.clone();
        for v in &other.0 {
            out.insert(v.clone());
        }
        out
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FunctionVariant> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn map(&self, f: impl FnMut(&FunctionVariant) -> FunctionVariant) -> FunctionSet {
        FunctionSet::new(self.0.iter().map(f))
    }
}

impl PartialEq for FunctionSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|v| other.0.contains(v))
    }
}

impl Eq for FunctionSet {}

impl Hash for FunctionSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let combined = self.0.iter().fold(0u64, |acc, v| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            acc.wrapping_add(h.finish())
        });
        self.0.len().hash(state);
        combined.hash(state);
    }
}

impl<'a> IntoIterator for &'a FunctionSet {
    type Item = &'a FunctionVariant;
    type IntoIter = std::slice::Iter<'a, FunctionVariant>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Compile-time approximation of a runtime value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AbstractValue {
    Scalar {
        value: Track<ScalarValue>,
        dtype: DTypeTrack,
    },
    Tuple(Vec<AbstractValue>),
    Array {
        element: Box<AbstractValue>,
        shape: Track<Vec<Track<u64>>>,
    },
    Class(ClassLike),
    /// Recursive class; self-references are replaced by [`AbstractValue::AdtRef`].
    Adt(ClassLike),
    AdtRef(String),
    /// Entries sorted by key.
    Dict(Vec<(String, AbstractValue)>),
    Function(FunctionSet),
    /// A type used as a value.
    Type(Box<AbstractValue>),
    KeywordArgument {
        name: String,
        value: Box<AbstractValue>,
    },
    /// Value tagged by the J transform.
    JTagged(Box<AbstractValue>),
    /// Host value with no registered converter.
    External {
        type_name: String,
    },
    Error {
        reason: String,
    },
}

impl AbstractValue {
    pub fn scalar(dtype: DType) -> Self {
        AbstractValue::Scalar {
            value: Track::Anything,
            dtype: DTypeTrack::Known(dtype),
        }
    }

    pub fn constant(value: ScalarValue, dtype: DType) -> Self {
        AbstractValue::Scalar {
            value: Track::Known(value),
            dtype: DTypeTrack::Known(dtype),
        }
    }

    pub fn int64() -> Self {
        Self::scalar(DType::INT64)
    }

    pub fn float64() -> Self {
        Self::scalar(DType::FLOAT64)
    }

    pub fn float32() -> Self {
        Self::scalar(DType::FLOAT32)
    }

    pub fn bool() -> Self {
        Self::scalar(DType::Bool)
    }

    pub fn array(element: DType, shape: &[u64]) -> Self {
        AbstractValue::Array {
            element: Box::new(Self::scalar(element)),
            shape: Track::Known(shape.iter().map(|d| Track::Known(*d)).collect()),
        }
    }

    pub fn function(variant: FunctionVariant) -> Self {
        AbstractValue::Function(FunctionSet::single(variant))
    }

    pub fn keyword(name: impl Into<String>, value: AbstractValue) -> Self {
        AbstractValue::KeywordArgument {
            name: name.into(),
            value: Box::new(value),
        }
    }

    /// The TYPE track, for scalars.
    pub fn dtype(&self) -> Option<DTypeTrack> {
        match self {
            AbstractValue::Scalar { dtype, .. } => Some(*dtype),
            _ => None,
        }
    }

    /// The VALUE track, for scalars.
    pub fn scalar_value(&self) -> Option<&Track<ScalarValue>> {
        match self {
            AbstractValue::Scalar { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_functions(&self) -> Option<&FunctionSet> {
        match self {
            AbstractValue::Function(set) => Some(set),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            AbstractValue::Scalar { .. } => "scalar",
            AbstractValue::Tuple(_) => "tuple",
            AbstractValue::Array { .. } => "array",
            AbstractValue::Class(_) => "class",
            AbstractValue::Adt(_) => "adt",
            AbstractValue::AdtRef(_) => "adt reference",
            AbstractValue::Dict(_) => "dict",
            AbstractValue::Function(_) => "function",
            AbstractValue::Type(_) => "type",
            AbstractValue::KeywordArgument { .. } => "keyword argument",
            AbstractValue::JTagged(_) => "J-tagged value",
            AbstractValue::External { .. } => "external value",
            AbstractValue::Error { .. } => "error",
        }
    }
}
