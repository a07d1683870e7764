//! Golden vectors for canonical serialization and fingerprints.
//!
//! Every implementation of the Weft determinism contract, in any language,
//! must produce these exact canonical bytes for these inputs. The
//! fingerprint column pins the BLAKE3 digest once recorded from a trusted
//! build; an empty expectation means "report, don't assert".

use weft_core::{serialize, CanonicalValue, Fingerprint};

/// One golden vector: input spellings, expected canonical output.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name.
    pub name: &'static str,
    /// JSON spellings of the same logical value. Every spelling must
    /// canonicalize to the same bytes.
    pub spellings: &'static [&'static str],
    /// Expected canonical text.
    pub expected_canonical: &'static str,
    /// Expected fingerprint (empty = not yet pinned).
    pub expected_fingerprint: &'static str,
}

/// All golden vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "key order is irrelevant",
            spellings: &[
                r#"{"z":1,"a":2,"m":3}"#,
                r#"{"a":2,"m":3,"z":1}"#,
                r#"{"m":3,"z":1,"a":2}"#,
            ],
            expected_canonical: r#"{"a":2,"m":3,"z":1}"#,
            expected_fingerprint: "",
        },
        GoldenVector {
            name: "nested objects sort at every level",
            spellings: &[r#"{"b":{"y":1,"x":2},"a":[3,{"q":4,"p":5}]}"#],
            expected_canonical: r#"{"a":[3,{"p":5,"q":4}],"b":{"x":2,"y":1}}"#,
            expected_fingerprint: "",
        },
        GoldenVector {
            name: "integral floats print as integers",
            spellings: &[r#"{"n":5.0}"#, r#"{"n":5}"#],
            expected_canonical: r#"{"n":5}"#,
            expected_fingerprint: "",
        },
        GoldenVector {
            name: "ninth decimal survives, tenth rounds",
            spellings: &[r#"{"n":0.1234567894}"#],
            expected_canonical: r#"{"n":0.123456789}"#,
            expected_fingerprint: "",
        },
        GoldenVector {
            name: "negative zero folds to zero",
            spellings: &[r#"{"n":-0.0}"#, r#"{"n":0}"#],
            expected_canonical: r#"{"n":0}"#,
            expected_fingerprint: "",
        },
        GoldenVector {
            name: "arrays keep their order",
            spellings: &[r#"[3,1,2,null,true,"x"]"#],
            expected_canonical: r#"[3,1,2,null,true,"x"]"#,
            expected_fingerprint: "",
        },
        GoldenVector {
            name: "string escapes",
            spellings: &["{\"s\":\"a\\\"b\\\\c\\nd\"}"],
            expected_canonical: "{\"s\":\"a\\\"b\\\\c\\nd\"}",
            expected_fingerprint: "",
        },
        GoldenVector {
            name: "empty containers",
            spellings: &[r#"{"arr":[],"obj":{}}"#, r#"{"obj":{},"arr":[]}"#],
            expected_canonical: r#"{"arr":[],"obj":{}}"#,
            expected_fingerprint: "",
        },
    ]
}

/// Canonicalize one spelling.
fn canonical_text(spelling: &str) -> (String, Fingerprint) {
    let json: serde_json::Value = serde_json::from_str(spelling).expect("vector JSON parses");
    let value = CanonicalValue::from_json(&json).expect("vector converts");
    let bytes = serialize(&value).expect("vector serializes");
    let fingerprint = Fingerprint::of_value(&value).expect("vector fingerprints");
    (String::from_utf8(bytes).expect("canonical text is UTF-8"), fingerprint)
}

/// Verify all vectors. Returns `(name, passed, fingerprint)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|vector| {
            let mut passed = true;
            let mut fingerprint_hex = String::new();

            for spelling in vector.spellings {
                let (canonical, fingerprint) = canonical_text(spelling);
                if canonical != vector.expected_canonical {
                    passed = false;
                }
                if !vector.expected_fingerprint.is_empty()
                    && fingerprint.as_str() != vector.expected_fingerprint
                {
                    passed = false;
                }
                fingerprint_hex = fingerprint.as_str().to_string();
            }

            (vector.name.to_string(), passed, fingerprint_hex)
        })
        .collect()
}
