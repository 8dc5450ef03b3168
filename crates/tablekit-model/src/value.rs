//! Tagged `Value` type with custom serialization.
//!
//! `Value` is a tagged union where exactly one variant is present. The JSON
//! wire format uses single-key objects like `{"S": "hello"}`, which keeps
//! fixtures readable and round-trips through text without type loss.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A primitive or composite value a backend natively stores.
///
/// Numbers are always string-encoded to preserve arbitrary precision.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String value.
    Str(String),
    /// Number value (string-encoded for arbitrary precision).
    Num(String),
    /// Binary value (base64-encoded in JSON).
    Bin(bytes::Bytes),
    /// Boolean value.
    Bool(bool),
    /// Null value.
    Null,
    /// List of values.
    List(Vec<Value>),
    /// Nested map of values.
    Map(HashMap<String, Value>),
}

impl Value {
    /// Returns `true` if this is a string value.
    #[must_use]
    pub fn is_str(&self) -> bool {
        matches!(self, Self::Str(_))
    }

    /// Returns `true` if this is a number value.
    #[must_use]
    pub fn is_num(&self) -> bool {
        matches!(self, Self::Num(_))
    }

    /// Returns `true` if this is a null value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string if this is a `Str` variant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number string if this is a `Num` variant.
    #[must_use]
    pub fn as_num(&self) -> Option<&str> {
        match self {
            Self::Num(n) => Some(n),
            _ => None,
        }
    }

    /// Parses the number as `f64` if this is a `Num` variant.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(n) => n.parse().ok(),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Bool` variant.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the list if this is a `List` variant.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the map if this is a `Map` variant.
    #[must_use]
    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the type descriptor string (e.g., "S", "N", "BOOL").
    #[must_use]
    pub fn type_descriptor(&self) -> &'static str {
        match self {
            Self::Str(_) => "S",
            Self::Num(_) => "N",
            Self::Bin(_) => "B",
            Self::Bool(_) => "BOOL",
            Self::Null => "NULL",
            Self::List(_) => "L",
            Self::Map(_) => "M",
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Str(s) => s.hash(state),
            Self::Num(n) => n.hash(state),
            Self::Bin(b) => b.hash(state),
            Self::Bool(b) => b.hash(state),
            Self::Null => {}
            Self::List(v) => v.hash(state),
            Self::Map(m) => {
                // Deterministic hash for maps: sort keys.
                let mut pairs: Vec<_> = m.iter().collect();
                pairs.sort_by_key(|(k, _)| *k);
                for (k, v) in pairs {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{{S: {s}}}"),
            Self::Num(n) => write!(f, "{{N: {n}}}"),
            Self::Bin(b) => write!(f, "{{B: {} bytes}}", b.len()),
            Self::Bool(b) => write!(f, "{{BOOL: {b}}}"),
            Self::Null => write!(f, "{{NULL}}"),
            Self::List(v) => write!(f, "{{L: {} items}}", v.len()),
            Self::Map(m) => write!(f, "{{M: {} keys}}", m.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Num(n.to_string())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Num(n.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Num(n.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Str(s) => map.serialize_entry("S", s)?,
            Self::Num(n) => map.serialize_entry("N", n)?,
            Self::Bin(b) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(b);
                map.serialize_entry("B", &encoded)?;
            }
            Self::Bool(b) => map.serialize_entry("BOOL", b)?,
            Self::Null => map.serialize_entry("NULL", &true)?,
            Self::List(list) => map.serialize_entry("L", list)?,
            Self::Map(m) => map.serialize_entry("M", m)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a tagged value object with exactly one type key")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
        let Some(key) = map.next_key::<String>()? else {
            return Err(de::Error::custom("value must have exactly one key"));
        };

        let value = match key.as_str() {
            "S" => Value::Str(map.next_value()?),
            "N" => Value::Num(map.next_value()?),
            "B" => {
                use base64::Engine;
                let encoded: String = map.next_value()?;
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(&encoded)
                    .map_err(de::Error::custom)?;
                Value::Bin(bytes::Bytes::from(decoded))
            }
            "BOOL" => Value::Bool(map.next_value()?),
            "NULL" => {
                let _: bool = map.next_value()?;
                Value::Null
            }
            "L" => Value::List(map.next_value()?),
            "M" => Value::Map(map.next_value()?),
            other => {
                return Err(de::Error::unknown_field(
                    other,
                    &["S", "N", "B", "BOOL", "NULL", "L", "M"],
                ));
            }
        };

        Ok(value)
    }
}
