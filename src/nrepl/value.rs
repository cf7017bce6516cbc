//! Message values as seen by callers, converted to and from the bencode wire type.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_bencode::value::Value as Bencode;

use crate::error::{Result, SessionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Bytes(s.into().into_bytes())
    }

    /// Text view of a byte string, `None` for other variants or invalid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}

// Byte strings serialize as text when they are valid UTF-8.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => serializer.serialize_str(s),
                Err(_) => b.serialize(serializer),
            },
            Value::List(items) => items.serialize(serializer),
            Value::Dict(map) => map.serialize(serializer),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(s.into_bytes())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Value> for Bencode {
    fn from(value: Value) -> Self {
        match value {
            Value::Int(i) => Bencode::Int(i),
            Value::Bytes(b) => Bencode::Bytes(b),
            Value::List(items) => Bencode::List(items.into_iter().map(Bencode::from).collect()),
            Value::Dict(map) => Bencode::Dict(
                map.into_iter()
                    .map(|(k, v)| (k.into_bytes(), Bencode::from(v)))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<Bencode> for Value {
    type Error = SessionError;

    fn try_from(value: Bencode) -> Result<Self> {
        Ok(match value {
            Bencode::Int(i) => Value::Int(i),
            Bencode::Bytes(b) => Value::Bytes(b),
            Bencode::List(items) => Value::List(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Bencode::Dict(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    let key = String::from_utf8(k)
                        .map_err(|_| SessionError::Protocol("non-utf8 dict key".into()))?;
                    out.insert(key, Value::try_from(v)?);
                }
                Value::Dict(out)
            }
        })
    }
}
