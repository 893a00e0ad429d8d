//! Scalar extraction from the dynamic value model.

use std::sync::Arc;

use thiserror::Error;

use super::Value;

/// A dynamic value did not hold the requested scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct TypeError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl Value {
    /// The name of this value's variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Composite(store) => match store.kind() {
                super::StoreKind::Object => "object",
                super::StoreKind::Array => "array",
                super::StoreKind::Map => "map",
                super::StoreKind::Set => "set",
            },
            Value::Ref(_) => "ref",
            Value::Observed(_) => "observed",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric read: ints widen to float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_ref()),
            _ => None,
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or(TypeError {
            expected: "bool",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for i64 {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_i64().ok_or(TypeError {
            expected: "int",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for f64 {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_f64().ok_or(TypeError {
            expected: "float",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for String {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) => Ok(s.as_ref().to_owned()),
            other => Err(TypeError {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for Arc<str> {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(TypeError {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }
}
