//! Typed view of an nREPL eval response.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Result, SessionError};
use crate::nrepl::Value;
use crate::nrepl::Message;

/// One decoded eval response.
///
/// `session`, `ns` and `value` are lifted out of the message; anything else
/// the server sent (`out`, `status`, `id`, ...) is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvalResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EvalResult {
    pub fn from_message(mut msg: Message) -> Self {
        let mut take = |key: &str| match msg.remove(key) {
            Some(Value::Bytes(b)) => Some(String::from_utf8_lossy(&b).into_owned()),
            Some(other) => {
                msg.insert(key.to_string(), other);
                None
            }
            None => None,
        };
        let session = take("session");
        let ns = take("ns");
        let value = take("value");
        Self {
            session,
            ns,
            value,
            extra: msg,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.session.is_some() && self.ns.is_some() && self.value.is_some()
    }

    /// Fail on the first recognized key that is missing.
    pub fn require_complete(self) -> Result<Self> {
        if self.session.is_none() {
            return Err(SessionError::ProtocolShapeMismatch("session"));
        }
        if self.ns.is_none() {
            return Err(SessionError::ProtocolShapeMismatch("ns"));
        }
        if self.value.is_none() {
            return Err(SessionError::ProtocolShapeMismatch("value"));
        }
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(pairs: &[(&str, Value)]) -> Message {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_from_message_lifts_known_keys() {
        let r = EvalResult::from_message(message(&[
            ("session", "abc".into()),
            ("ns", "user".into()),
            ("value", "3".into()),
            ("id", Value::Int(4)),
        ]));
        assert_eq!(r.session.as_deref(), Some("abc"));
        assert_eq!(r.ns.as_deref(), Some("user"));
        assert_eq!(r.value.as_deref(), Some("3"));
        assert_eq!(r.get("id"), Some(&Value::Int(4)));
        assert!(r.is_complete());
    }

    #[test]
    fn test_missing_value_passes_through() {
        let r = EvalResult::from_message(message(&[
            ("session", "abc".into()),
            ("out", "hello\n".into()),
        ]));
        assert!(!r.is_complete());
        assert_eq!(r.get("out").and_then(Value::as_str), Some("hello\n"));
        assert!(matches!(
            r.require_complete(),
            Err(SessionError::ProtocolShapeMismatch("ns"))
        ));
    }

    #[test]
    fn test_non_string_known_key_stays_in_extra() {
        let r = EvalResult::from_message(message(&[("value", Value::Int(3))]));
        assert_eq!(r.value, None);
        assert_eq!(r.get("value"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_serializes_flat_json() {
        let r = EvalResult::from_message(message(&[
            ("ns", "user".into()),
            ("value", "3".into()),
            ("status", Value::List(vec!["done".into()])),
        ]));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ns": "user", "value": "3", "status": ["done"]})
        );
    }
}
