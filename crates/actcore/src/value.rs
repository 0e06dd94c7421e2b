use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dynamic value carried by activity parameters and configuration properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
    Json(serde_json::Value),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Coerce this value to the variant of `template`.
    ///
    /// Used when a caller reconfigures a composite through parameters: the
    /// declared property fixes the type, the incoming value is converted to
    /// it. Returns `None` when no sensible conversion exists.
    pub fn coerce_like(&self, template: &Value) -> Option<Value> {
        match template {
            Value::String(_) => Some(Value::String(match self {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            })),
            Value::Number(_) => match self {
                Value::Number(n) => Some(Value::Number(*n)),
                Value::String(s) => s.trim().parse::<f64>().ok().map(Value::Number),
                Value::Bool(b) => Some(Value::Number(if *b { 1.0 } else { 0.0 })),
                _ => None,
            },
            Value::Bool(_) => match self {
                Value::Bool(b) => Some(Value::Bool(*b)),
                Value::String(s) => s.trim().parse::<bool>().ok().map(Value::Bool),
                Value::Number(n) => Some(Value::Bool(*n != 0.0)),
                _ => None,
            },
            // Structured properties take the incoming value as-is.
            _ => Some(self.clone()),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::Json(j)
    }
}
