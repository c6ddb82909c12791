//! Property values and their canonical text form.
//!
//! A candidate node arrives as a bag of [`Properties`]. Each value is a
//! [`PropertyValue`], a closed sum over the value kinds the identity engine
//! understands. [`PropertyValue::canonical_text`] maps every kind to a stable
//! textual form; it is the only input to hashing besides the node type, so
//! the rules here are part of the identifier format:
//!
//! | Kind | Canonical text |
//! |---|---|
//! | null | `null` |
//! | string | trimmed, lowercased |
//! | integer (any width) | base-10 decimal |
//! | float | fixed six decimal places |
//! | boolean | `true` / `false` |
//! | composite | JSON with object keys sorted |

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// A single property value of a candidate node.
///
/// Signed and unsigned integers keep separate variants so that `u64` values
/// above `i64::MAX` survive unchanged; both render as plain decimal, so a
/// value's width never affects its canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum PropertyValue {
    Null,
    String(String),
    Int(i64),
    UInt(u64),
    /// 32-bit floats are widened to `f64` on conversion.
    Float(f64),
    Bool(bool),
    /// Arrays and objects. Never holds a JSON scalar when built via `From<Value>`.
    Composite(Value),
}

/// A value that has no canonical text form.
#[derive(Debug, Error)]
pub enum CanonicalValueError {
    #[error("non-finite float {0} has no fixed-point form")]
    NonFiniteFloat(f64),

    #[error("composite value is not serializable: {0}")]
    Composite(#[from] serde_json::Error),
}

impl PropertyValue {
    /// Returns true if the value counts as absent for identity purposes:
    /// null, or a string that is empty after trimming.
    pub fn is_missing(&self) -> bool {
        match self {
            PropertyValue::Null => true,
            PropertyValue::String(s) => s.trim().is_empty(),
            PropertyValue::Composite(Value::Null) => true,
            PropertyValue::Composite(Value::String(s)) => s.trim().is_empty(),
            PropertyValue::Int(_)
            | PropertyValue::UInt(_)
            | PropertyValue::Float(_)
            | PropertyValue::Bool(_)
            | PropertyValue::Composite(_) => false,
        }
    }

    /// Produces the canonical text used in the identity string.
    pub fn canonical_text(&self) -> Result<String, CanonicalValueError> {
        match self {
            PropertyValue::Null => Ok("null".to_string()),
            PropertyValue::String(s) => Ok(fold_case(s.trim())),
            PropertyValue::Int(i) => Ok(i.to_string()),
            PropertyValue::UInt(u) => Ok(u.to_string()),
            PropertyValue::Float(f) => {
                if f.is_finite() {
                    Ok(format!("{:.6}", f))
                } else {
                    Err(CanonicalValueError::NonFiniteFloat(*f))
                }
            }
            PropertyValue::Bool(b) => Ok(b.to_string()),
            PropertyValue::Composite(v) => Ok(canonical_json(v)?),
        }
    }

    /// Short name of the value kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::String(_) => "string",
            PropertyValue::Int(_) | PropertyValue::UInt(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::Bool(_) => "boolean",
            PropertyValue::Composite(Value::Array(_)) => "array",
            PropertyValue::Composite(Value::Object(_)) => "object",
            PropertyValue::Composite(_) => "composite",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; unsigned values above `i64::MAX` return `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Numeric view accepting integers and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Int(i) => Some(*i as f64),
            PropertyValue::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    /// Converts back to a JSON value. Non-finite floats become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Null => Value::Null,
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::Int(i) => Value::from(*i),
            PropertyValue::UInt(u) => Value::from(*u),
            PropertyValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number)
            }
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Composite(v) => v.clone(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// Conversions from Rust scalars.

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for PropertyValue {
            fn from(v: $t) -> Self {
                PropertyValue::Int(v as i64)
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for PropertyValue {
            fn from(v: $t) -> Self {
                PropertyValue::UInt(v as u64)
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64, isize);
impl_from_unsigned!(u8, u16, u32, u64, usize);

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(f64::from(v))
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(PropertyValue::Null, Into::into)
    }
}

impl From<Value> for PropertyValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(b),
            Value::String(s) => PropertyValue::String(s),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PropertyValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    PropertyValue::UInt(u)
                } else {
                    PropertyValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            composite @ (Value::Array(_) | Value::Object(_)) => PropertyValue::Composite(composite),
        }
    }
}

impl From<PropertyValue> for Value {
    fn from(v: PropertyValue) -> Self {
        v.to_json()
    }
}

/// Lowercases one character at a time with the simple Unicode mapping.
///
/// No context-sensitive rules apply: a word-final `Σ` folds to `σ`, and `İ`
/// folds to a plain `i` rather than `i` plus a combining dot.
fn fold_case(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '\u{130}' => 'i'.to_lowercase(),
            c => c.to_lowercase(),
        })
        .collect()
}

/// Serializes a JSON value with object keys in sorted order, independent of
/// whether `serde_json` was built with `preserve_order`.
pub fn canonical_json(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&SortedKeys(value))
}

struct SortedKeys<'a>(&'a Value);

impl Serialize for SortedKeys<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&SortedKeys(item))?;
                }
                seq.end()
            }
            Value::Object(entries) => {
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                let mut map = serializer.serialize_map(Some(keys.len()))?;
                for key in keys {
                    map.serialize_entry(key, &SortedKeys(&entries[key.as_str()]))?;
                }
                map.end()
            }
            scalar => scalar.serialize(serializer),
        }
    }
}

/// The property bag of a candidate node, in caller insertion order.
///
/// Insertion order is kept for display only; identity never depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(IndexMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Properties(IndexMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a value, returning the previous one for that name.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    /// True when the property is absent, null, or blank.
    pub fn is_missing(&self, name: &str) -> bool {
        self.0.get(name).map_or(true, PropertyValue::is_missing)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// Builds a property bag from a decoded JSON value, which must be an object.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(map.into()),
            _ => None,
        }
    }
}

impl From<serde_json::Map<String, Value>> for Properties {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().map(|(k, v)| (k, PropertyValue::from(v))).collect()
    }
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Properties(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = (&'a String, &'a PropertyValue);
    type IntoIter = indexmap::map::Iter<'a, String, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
