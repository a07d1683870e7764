//! Canonical values: the tree shape every fingerprint is computed over.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::CoreError;

/// Maximum nesting depth accepted by conversion and serialization.
///
/// Rust ownership makes true reference cycles unrepresentable in this tree
/// type; the depth guard rejects the degenerate inputs that would otherwise
/// recurse without bound.
pub const MAX_DEPTH: usize = 128;

/// A canonical value: null, bool, number, string, array, or object.
///
/// Object keys are lexicographically sorted at every nesting level by
/// construction (`BTreeMap`); arrays preserve their original order. The
/// structure is always a finite tree.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<CanonicalValue>),
    Object(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Construct a number, rejecting NaN and infinities.
    pub fn number(n: f64) -> Result<Self, CoreError> {
        if !n.is_finite() {
            return Err(CoreError::InvalidValue(format!(
                "non-finite number: {n}"
            )));
        }
        Ok(Self::Number(n))
    }

    /// Convert from a `serde_json::Value`.
    ///
    /// Fails with `InvalidValue` on non-finite numbers and `CyclicStructure`
    /// when the input exceeds [`MAX_DEPTH`].
    pub fn from_json(value: &JsonValue) -> Result<Self, CoreError> {
        Self::from_json_at(value, 0)
    }

    fn from_json_at(value: &JsonValue, depth: usize) -> Result<Self, CoreError> {
        if depth > MAX_DEPTH {
            return Err(CoreError::CyclicStructure { depth });
        }

        match value {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Bool(b) => Ok(Self::Bool(*b)),
            JsonValue::Number(n) => {
                let f = n.as_f64().ok_or_else(|| {
                    CoreError::InvalidValue(format!("unrepresentable number: {n}"))
                })?;
                Self::number(f)
            }
            JsonValue::String(s) => Ok(Self::String(s.clone())),
            JsonValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Self::from_json_at(item, depth + 1)?);
                }
                Ok(Self::Array(out))
            }
            JsonValue::Object(entries) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    out.insert(k.clone(), Self::from_json_at(v, depth + 1)?);
                }
                Ok(Self::Object(out))
            }
        }
    }

    /// Convert back to a `serde_json::Value`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(items) => {
                JsonValue::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Object(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// The kind of this value, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Get an object field by key.
    pub fn get(&self, key: &str) -> Option<&CanonicalValue> {
        match self {
            Self::Object(entries) => entries.get(key),
            _ => None,
        }
    }

    /// View as a string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// View as an object map, if this is one.
    pub fn as_object(&self) -> Option<&BTreeMap<String, CanonicalValue>> {
        match self {
            Self::Object(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<bool> for CanonicalValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for CanonicalValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for CanonicalValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for CanonicalValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_roundtrip() {
        let json = json!({"z": 1, "a": [true, null, "x"], "m": {"k": 2}});
        let value = CanonicalValue::from_json(&json).unwrap();
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_object_keys_sorted() {
        let json = json!({"z": 1, "a": 2, "m": 3});
        let value = CanonicalValue::from_json(&json).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(matches!(
            CanonicalValue::number(f64::NAN),
            Err(CoreError::InvalidValue(_))
        ));
        assert!(matches!(
            CanonicalValue::number(f64::INFINITY),
            Err(CoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_depth_guard() {
        let mut json = json!(1);
        for _ in 0..(MAX_DEPTH + 2) {
            json = json!([json]);
        }
        assert!(matches!(
            CanonicalValue::from_json(&json),
            Err(CoreError::CyclicStructure { .. })
        ));
    }

    #[test]
    fn test_get_and_accessors() {
        let value =
            CanonicalValue::from_json(&json!({"name": "run", "n": 4})).unwrap();
        assert_eq!(value.get("name").and_then(|v| v.as_str()), Some("run"));
        assert_eq!(value.get("missing"), None);
        assert_eq!(value.kind(), "object");
    }
}
