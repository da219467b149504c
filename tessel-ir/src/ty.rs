#![forbid(unsafe_code)]

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int32,
    Int64,
    Float16,
    Float32,
    Float64,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Bool => "bool",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float16 => "float16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        };
        f.write_str(s)
    }
}

/// Checked type of an expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// Opaque runtime object.
    Object,
    /// A shape value whose rank and extents are fully dynamic.
    Shape,
    /// A tensor; `None` fields are unknown.
    DynTensor {
        rank: Option<usize>,
        dtype: Option<DataType>,
    },
    Tuple(Vec<Type>),
    Func {
        params: Vec<Type>,
        ret: Box<Type>,
    },
}

impl Type {
    pub fn tensor(rank: usize, dtype: DataType) -> Self {
        Type::DynTensor {
            rank: Some(rank),
            dtype: Some(dtype),
        }
    }

    /// The empty tuple, used as the result type of side-effecting operators.
    pub fn void() -> Self {
        Type::Tuple(Vec::new())
    }

    pub fn is_shape(&self) -> bool {
        matches!(self, Type::Shape)
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, Type::DynTensor { .. })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Object => f.write_str("Object"),
            Type::Shape => f.write_str("Shape"),
            Type::DynTensor { rank, dtype } => {
                let rank_s = rank.map(|r| r.to_string()).unwrap_or_else(|| "?".to_string());
                let dtype_s = dtype.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string());
                write!(f, "Tensor[ndim={rank_s}, {dtype_s}]")
            }
            Type::Tuple(fields) => {
                let fields_s = fields
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({fields_s})")
            }
            Type::Func { params, ret } => {
                let params_s = params
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "fn({params_s}) -> {ret}")
            }
        }
    }
}
