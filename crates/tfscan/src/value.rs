//! value representation
//!
//! Resolved values use the following data types
//! - null
//! - unknown (an expression that could not be resolved yet)
//! - boolean (true/false)
//! - number (kept as [hcl::Number] so integers stay integers)
//! - string (utf-8)
//! - list (also used for sets and tuples)
//! - object (order-preserving map, where the key is of type string)
//!
//! Equality is structural. Object comparison ignores key order, which is what the
//! fixpoint loop in [crate::evaluator] relies on to detect convergence.
//!
//! `unknown` never reaches [hcl::eval]: [Value::to_hcl] drops it, so any expression
//! that depends on it fails to evaluate and becomes unknown itself.
use indexmap::IndexMap;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

pub type Object = IndexMap<String, Value>;

/// All possible value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Unknown,
    Bool(bool),
    Number(hcl::Number),
    String(String),
    List(Vec<Value>),
    Object(Object),
}

impl Value {
    pub fn object() -> Self {
        Value::Object(Default::default())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `false` if this value or any nested value is unknown
    pub fn is_known(&self) -> bool {
        match self {
            Value::Unknown => false,
            Value::List(list) => list.iter().all(Value::is_known),
            Value::Object(object) => object.values().all(Value::is_known),
            _ => true,
        }
    }

    pub fn is_iterable(&self) -> bool {
        matches!(self, Value::List(_) | Value::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(num) => num.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Walk into nested objects
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };

        self.as_object()?.get(first.as_ref())?.get(rest)
    }

    /// Set a value at `path`, creating intermediate objects as needed
    ///
    /// A non-object found on the way is replaced by an empty object.
    pub fn set<S: AsRef<str>>(&mut self, path: &[S], value: Value) {
        let Some((first, rest)) = path.split_first() else {
            *self = value;
            return;
        };

        if !matches!(self, Value::Object(_)) {
            *self = Value::object();
        }
        let Value::Object(object) = self else {
            unreachable!("replaced with an object above");
        };

        object
            .entry(first.as_ref().to_string())
            .or_insert(Value::Null)
            .set(rest, value);
    }

    /// Merge `other` into `self`; objects are merged key by key, everything else is replaced
    pub fn merge(&mut self, other: &Value) {
        match (self, other) {
            (Value::Object(target), Value::Object(source)) => {
                for (key, value) in source {
                    match target.get_mut(key) {
                        Some(existing) => existing.merge(value),
                        None => {
                            target.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            (target, source) => *target = source.clone(),
        }
    }

    /// Key/value pairs for `for_each`
    ///
    /// Objects yield their entries, lists are treated as sets where key and value are the
    /// element itself. Anything else yields nothing.
    pub fn pairs(&self) -> Vec<(Value, Value)> {
        match self {
            Value::Object(object) => object
                .iter()
                .map(|(key, value)| (Value::String(key.clone()), value.clone()))
                .collect(),
            Value::List(list) => list
                .iter()
                .map(|element| (element.clone(), element.clone()))
                .collect(),
            _ => vec![],
        }
    }

    /// Convert into an [hcl::Value] for evaluation
    ///
    /// Unknown object fields are dropped, a list containing an unknown element is unknown.
    pub fn to_hcl(&self) -> Option<hcl::Value> {
        Some(match self {
            Value::Unknown => return None,
            Value::Null => hcl::Value::Null,
            Value::Bool(b) => hcl::Value::Bool(*b),
            Value::Number(num) => hcl::Value::Number(num.clone()),
            Value::String(s) => hcl::Value::String(s.clone()),
            Value::List(list) => hcl::Value::Array(
                list.iter()
                    .map(Value::to_hcl)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Value::Object(object) => hcl::Value::Object(
                object
                    .iter()
                    .filter_map(|(key, value)| Some((key.clone(), value.to_hcl()?)))
                    .collect(),
            ),
        })
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Unknown => f.write_str("(unknown)"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(num) => write!(f, "{num}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(_) | Value::Object(_) => {
                let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Number((value as u64).into())
    }
}

impl From<hcl::Number> for Value {
    fn from(value: hcl::Number) -> Self {
        Value::Number(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl<K: ToString, V: Into<Value>> From<IndexMap<K, V>> for Value {
    fn from(value: IndexMap<K, V>) -> Self {
        Value::Object(
            value
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }
}

impl From<hcl::Value> for Value {
    fn from(value: hcl::Value) -> Value {
        match value {
            hcl::Value::Null => Value::Null,
            hcl::Value::Bool(b) => b.into(),
            hcl::Value::Number(n) => n.into(),
            hcl::Value::String(s) => s.into(),
            hcl::Value::Array(a) => a.into(),
            hcl::Value::Object(o) => Value::Object(
                o.into_iter()
                    .map(|(k, v)| (k.to_string(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null | Value::Unknown => serializer.serialize_none(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Number(value) => {
                if let Some(int) = value.as_i64() {
                    serializer.serialize_i64(int)
                } else if let Some(uint) = value.as_u64() {
                    serializer.serialize_u64(uint)
                } else {
                    serializer.serialize_f64(value.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(value) => serializer.serialize_str(value),
            Value::List(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}
