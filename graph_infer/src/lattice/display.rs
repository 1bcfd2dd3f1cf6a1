use super::types::{
    AbstractValue, ClassLike, DType, DTypeTrack, FunctionSet, FunctionVariant, ScalarValue, Track,
};
use std::fmt;

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Bool => write!(f, "Bool"),
            DType::Int(bits) => write!(f, "Int{}", bits),
            DType::UInt(bits) => write!(f, "UInt{}", bits),
            DType::Float(bits) => write!(f, "Float{}", bits),
            DType::Nil => write!(f, "Nil"),
            DType::Str => write!(f, "String"),
            DType::Env => write!(f, "EnvType"),
        }
    }
}

impl fmt::Display for DTypeTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DTypeTrack::Known(d) => write!(f, "{}", d),
            DTypeTrack::Anything => write!(f, "?"),
            DTypeTrack::Pending(id) => write!(f, "'T{}", id.0),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Int(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{:?}", v),
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::Nil => write!(f, "nothing"),
            ScalarValue::Str(v) => write!(f, "{:?}", v),
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[(String, AbstractValue)]) -> fmt::Result {
    for (i, (name, value)) in fields.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", name, value)?;
    }
    Ok(())
}

fn write_class(f: &mut fmt::Formatter<'_>, class: &ClassLike) -> fmt::Result {
    write!(f, "{}{{", class.tag)?;
    write_fields(f, &class.fields)?;
    write!(f, "}}")
}

impl fmt::Display for FunctionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionVariant::Primitive { prim, .. } => write!(f, "{}", prim),
            FunctionVariant::Graph { graph, .. } => write!(f, "graph#{}", graph.0),
            FunctionVariant::MetaGraph { metagraph, .. } => {
                write!(f, "metagraph#{}", metagraph.0)
            }
            FunctionVariant::Partial { func, args } => {
                write!(f, "partial({}", func)?;
                for a in args {
                    write!(f, ", {}", a)?;
                }
                write!(f, ")")
            }
            FunctionVariant::JTransformed(inner) => write!(f, "J({})", inner),
            FunctionVariant::Macro(id) => write!(f, "macro#{}", id.0),
            FunctionVariant::Virtual { args, output } => {
                write!(f, "(")?;
                write_list(f, args)?;
                write!(f, ") -> {}", output)
            }
            FunctionVariant::Dummy => write!(f, "dummy"),
        }
    }
}

impl fmt::Display for FunctionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<_> = self.iter().collect();
        write_list(f, &items)
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractValue::Scalar { value, dtype } => match value {
                Track::Anything => write!(f, "{}", dtype),
                Track::Known(v) => write!(f, "{}({})", dtype, v),
            },
            AbstractValue::Tuple(xs) => {
                write!(f, "Tuple[")?;
                write_list(f, xs)?;
                write!(f, "]")
            }
            AbstractValue::Array { element, shape } => {
                write!(f, "Array[{}; ", element)?;
                match shape {
                    Track::Anything => write!(f, "?")?,
                    Track::Known(dims) => {
                        for (i, d) in dims.iter().enumerate() {
                            if i > 0 {
                                write!(f, "x")?;
                            }
                            match d {
                                Track::Known(n) => write!(f, "{}", n)?,
                                Track::Anything => write!(f, "?")?,
                            }
                        }
                    }
                }
                write!(f, "]")
            }
            AbstractValue::Class(c) | AbstractValue::Adt(c) => write_class(f, c),
            AbstractValue::AdtRef(tag) => write!(f, "&{}", tag),
            AbstractValue::Dict(entries) => {
                write!(f, "Dict{{")?;
                write_fields(f, entries)?;
                write!(f, "}}")
            }
            AbstractValue::Function(set) => write!(f, "Function{{{}}}", set),
            AbstractValue::Type(inner) => write!(f, "Type[{}]", inner),
            AbstractValue::KeywordArgument { name, value } => write!(f, "{}={}", name, value),
            AbstractValue::JTagged(inner) => write!(f, "J[{}]", inner),
            AbstractValue::External { type_name } => write!(f, "External[{}]", type_name),
            AbstractValue::Error { reason } => write!(f, "Error[{}]", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Primitive;

    #[test]
    fn test_display_values() {
        assert_eq!(AbstractValue::int64().to_string(), "Int64");
        assert_eq!(
            AbstractValue::constant(ScalarValue::Int(5), DType::INT64).to_string(),
            "Int64(5)"
        );
        assert_eq!(
            AbstractValue::Tuple(vec![AbstractValue::bool(), AbstractValue::float32()])
                .to_string(),
            "Tuple[Bool, Float32]"
        );
        assert_eq!(
            AbstractValue::array(DType::FLOAT64, &[2, 3]).to_string(),
            "Array[Float64; 2x3]"
        );
        assert_eq!(
            AbstractValue::function(FunctionVariant::primitive(Primitive::ScalarAdd)).to_string(),
            "Function{scalar_add}"
        );
    }
}
