//! Canonical serialization: structurally equal values, identical bytes.
//!
//! The canonical form is compact JSON with:
//! - Object keys sorted by byte-wise lexical order at every nesting level
//! - Numbers normalized to one fixed rounding rule (1e-9 precision)
//! - No insignificant whitespace
//! - Strings escaped minimally and consistently
//!
//! The canonical bytes are the pre-image for every fingerprint in the system,
//! so any divergence here invalidates replay verification end to end.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::value::{CanonicalValue, MAX_DEPTH};

/// Normalize a value into its canonical form.
///
/// Numbers are rounded to 1e-9 precision with negative zero folded to zero;
/// object keys are already sorted by construction. The input is never
/// mutated. Idempotent: `canonicalize(canonicalize(v)) == canonicalize(v)`.
pub fn canonicalize(value: &CanonicalValue) -> Result<CanonicalValue, CoreError> {
    canonicalize_at(value, 0)
}

fn canonicalize_at(value: &CanonicalValue, depth: usize) -> Result<CanonicalValue, CoreError> {
    if depth > MAX_DEPTH {
        return Err(CoreError::CyclicStructure { depth });
    }

    match value {
        CanonicalValue::Null => Ok(CanonicalValue::Null),
        CanonicalValue::Bool(b) => Ok(CanonicalValue::Bool(*b)),
        CanonicalValue::Number(n) => Ok(CanonicalValue::Number(normalize_number(*n)?)),
        CanonicalValue::String(s) => Ok(CanonicalValue::String(s.clone())),
        CanonicalValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(canonicalize_at(item, depth + 1)?);
            }
            Ok(CanonicalValue::Array(out))
        }
        CanonicalValue::Object(entries) => {
            let mut out = BTreeMap::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonicalize_at(v, depth + 1)?);
            }
            Ok(CanonicalValue::Object(out))
        }
    }
}

/// Serialize a value to its canonical byte representation.
///
/// Normalization is applied while writing, so callers do not need to
/// `canonicalize` first. Equal logical values always produce identical bytes.
pub fn serialize(value: &CanonicalValue) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    write_value(&mut buf, value, 0)?;
    Ok(buf)
}

/// Compare two values after canonicalization.
pub fn equal(a: &CanonicalValue, b: &CanonicalValue) -> Result<bool, CoreError> {
    Ok(serialize(a)? == serialize(b)?)
}

fn write_value(buf: &mut Vec<u8>, value: &CanonicalValue, depth: usize) -> Result<(), CoreError> {
    if depth > MAX_DEPTH {
        return Err(CoreError::CyclicStructure { depth });
    }

    match value {
        CanonicalValue::Null => buf.extend_from_slice(b"null"),
        CanonicalValue::Bool(true) => buf.extend_from_slice(b"true"),
        CanonicalValue::Bool(false) => buf.extend_from_slice(b"false"),
        CanonicalValue::Number(n) => {
            let normalized = normalize_number(*n)?;
            buf.extend_from_slice(format_number(normalized).as_bytes());
        }
        CanonicalValue::String(s) => write_string(buf, s),
        CanonicalValue::Array(items) => {
            buf.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_value(buf, item, depth + 1)?;
            }
            buf.push(b']');
        }
        CanonicalValue::Object(entries) => {
            buf.push(b'{');
            for (i, (k, v)) in entries.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_string(buf, k);
                buf.push(b':');
                write_value(buf, v, depth + 1)?;
            }
            buf.push(b'}');
        }
    }
    Ok(())
}

/// Round to 1e-9 precision and fold negative zero.
///
/// At magnitudes where the scaling would overflow, rounding at the ninth
/// decimal is a no-op and the value passes through unchanged.
fn normalize_number(n: f64) -> Result<f64, CoreError> {
    if !n.is_finite() {
        return Err(CoreError::InvalidValue(format!("non-finite number: {n}")));
    }
    let scaled = n * 1e9;
    let rounded = if scaled.is_finite() {
        scaled.round() / 1e9
    } else {
        n
    };
    if rounded == 0.0 {
        return Ok(0.0);
    }
    Ok(rounded)
}

/// Format a normalized number.
///
/// Integral values within the exact-integer range of f64 print without a
/// fractional part; everything else prints with up to nine fractional
/// digits, trailing zeros trimmed.
fn format_number(n: f64) -> String {
    const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0; // 2^53

    if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INT {
        return format!("{}", n as i64);
    }
    let fixed = format!("{n:.9}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for c in s.chars() {
        match c {
            '"' => buf.extend_from_slice(b"\\\""),
            '\\' => buf.extend_from_slice(b"\\\\"),
            '\n' => buf.extend_from_slice(b"\\n"),
            '\r' => buf.extend_from_slice(b"\\r"),
            '\t' => buf.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                buf.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut utf8 = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
        }
    }
    buf.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canon(json: serde_json::Value) -> String {
        let value = CanonicalValue::from_json(&json).unwrap();
        String::from_utf8(serialize(&value).unwrap()).unwrap()
    }

    #[test]
    fn test_object_keys_sorted_in_output() {
        assert_eq!(canon(json!({"z": 1, "a": 2, "m": 3})), r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_insertion_order_irrelevant() {
        let a = canon(json!({"z": 1, "a": 2, "m": 3}));
        let b = canon(json!({"a": 2, "m": 3, "z": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_nested_sorting() {
        assert_eq!(
            canon(json!({"b": {"y": 1, "x": 2}, "a": [3, {"q": 4, "p": 5}]})),
            r#"{"a":[3,{"p":5,"q":4}],"b":{"x":2,"y":1}}"#
        );
    }

    #[test]
    fn test_canonicalize_idempotent() {
        let value = CanonicalValue::from_json(
            &json!({"n": 0.1234567891234, "arr": [1.0, -0.0], "s": "x"}),
        )
        .unwrap();
        let once = canonicalize(&value).unwrap();
        let twice = canonicalize(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(serialize(&once).unwrap(), serialize(&twice).unwrap());
    }

    #[test]
    fn test_number_rounding_rule() {
        // Ninth decimal is kept, tenth is rounded away.
        assert_eq!(canon(json!(0.123456789)), "0.123456789");
        assert_eq!(canon(json!(0.1234567894)), "0.123456789");
        assert_eq!(canon(json!(0.1234567896)), "0.12345679");
    }

    #[test]
    fn test_integral_numbers_have_no_fraction() {
        assert_eq!(canon(json!(5.0)), "5");
        assert_eq!(canon(json!(-3.0)), "-3");
        assert_eq!(canon(json!(0)), "0");
    }

    #[test]
    fn test_negative_zero_folds() {
        assert_eq!(canon(json!(-0.0)), "0");
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(canon(json!("a\"b\\c\nd")), r#""a\"b\\c\nd""#);
        assert_eq!(canon(json!("\u{0001}")), "\"\\u0001\"");
    }

    #[test]
    fn test_equal_across_insertion_orders() {
        let a = CanonicalValue::from_json(&json!({"x": 1, "y": [2, 3]})).unwrap();
        let b = CanonicalValue::from_json(&json!({"y": [2, 3], "x": 1})).unwrap();
        assert!(equal(&a, &b).unwrap());

        let c = CanonicalValue::from_json(&json!({"x": 1, "y": [3, 2]})).unwrap();
        assert!(!equal(&a, &c).unwrap());
    }

    #[test]
    fn test_array_order_preserved() {
        assert_eq!(canon(json!([3, 1, 2])), "[3,1,2]");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_value() -> impl Strategy<Value = CanonicalValue> {
            let leaf = prop_oneof![
                Just(CanonicalValue::Null),
                any::<bool>().prop_map(CanonicalValue::Bool),
                (-1.0e6..1.0e6f64).prop_map(CanonicalValue::Number),
                "[a-z]{0,8}".prop_map(CanonicalValue::String),
            ];
            leaf.prop_recursive(4, 32, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4)
                        .prop_map(CanonicalValue::Array),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                        .prop_map(CanonicalValue::Object),
                ]
            })
        }

        proptest! {
            #[test]
            fn canonicalize_is_idempotent(value in arb_value()) {
                let once = canonicalize(&value).unwrap();
                let twice = canonicalize(&once).unwrap();
                prop_assert_eq!(
                    serialize(&once).unwrap(),
                    serialize(&twice).unwrap()
                );
            }

            #[test]
            fn serialize_is_stable(value in arb_value()) {
                prop_assert_eq!(serialize(&value).unwrap(), serialize(&value).unwrap());
            }
        }
    }
}
