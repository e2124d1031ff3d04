//! Subject identifiers.
//!
//! Callers may identify the resource owner by a string or an integer. Both
//! are stored as their canonical string form.

use crate::errors::GrantorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Str(String),
    Int(i64),
}

impl Identity {
    /// Canonical string form used for storage and lookups.
    pub fn canonical(&self) -> String {
        match self {
            Identity::Str(s) => s.clone(),
            Identity::Int(n) => n.to_string(),
        }
    }

    /// Canonical form, rejecting blank string identifiers.
    pub fn normalize(&self) -> Result<String, GrantorError> {
        let canonical = self.canonical();
        if canonical.trim().is_empty() {
            return Err(GrantorError::InvalidArgument(
                "Identity must not be blank".to_string(),
            ));
        }
        Ok(canonical)
    }

    /// Accepts an untyped JSON value from an adapter. Only strings and
    /// integers identify a subject.
    pub fn from_json(value: &Value) -> Result<Self, GrantorError> {
        match value {
            Value::String(s) => Ok(Identity::Str(s.clone())),
            Value::Number(n) => n.as_i64().map(Identity::Int).ok_or_else(|| {
                GrantorError::InvalidArgument(format!(
                    "Identity must be a string or an integer, got {n}"
                ))
            }),
            other => Err(GrantorError::InvalidArgument(format!(
                "Identity must be a string or an integer, got {}",
                json_kind(other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Str(s) => f.write_str(s),
            Identity::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::Str(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity::Str(value)
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Identity::Int(value)
    }
}

impl From<i32> for Identity {
    fn from(value: i32) -> Self {
        Identity::Int(value.into())
    }
}

impl From<u32> for Identity {
    fn from(value: u32) -> Self {
        Identity::Int(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_forms() {
        assert_eq!(Identity::from("user-1").canonical(), "user-1");
        assert_eq!(Identity::from(42i64).canonical(), "42");
        assert_eq!(Identity::from(-7i32).to_string(), "-7");
    }

    #[test]
    fn test_normalize_rejects_blank() {
        assert!(matches!(
            Identity::from("  ").normalize(),
            Err(GrantorError::InvalidArgument(_))
        ));
        assert_eq!(Identity::from(0i64).normalize().unwrap(), "0");
    }

    #[test]
    fn test_from_json_accepts_strings_and_integers() {
        assert_eq!(
            Identity::from_json(&json!("alice")).unwrap(),
            Identity::Str("alice".into())
        );
        assert_eq!(Identity::from_json(&json!(1001)).unwrap(), Identity::Int(1001));
    }

    #[test]
    fn test_from_json_rejects_other_values() {
        for value in [json!(null), json!(true), json!(1.5), json!(["a"]), json!({"id": 1})] {
            let err = Identity::from_json(&value).unwrap_err();
            assert!(matches!(err, GrantorError::InvalidArgument(_)), "{value}");
        }
    }

    #[test]
    fn test_deserialize_untagged() {
        let id: Identity = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(id, Identity::Str("bob".into()));
        let id: Identity = serde_json::from_str("12").unwrap();
        assert_eq!(id, Identity::Int(12));
    }
}
