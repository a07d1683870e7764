//! Proptest strategies for canonical value trees.

use proptest::prelude::*;
use std::collections::BTreeMap;

use weft_core::CanonicalValue;

/// Arbitrary canonical value trees, bounded in depth and width.
///
/// Numbers are drawn from a range where the 1e-9 rounding rule is exact, so
/// generated values survive canonicalization unchanged.
pub fn arb_canonical_value() -> impl Strategy<Value = CanonicalValue> {
    let leaf = prop_oneof![
        Just(CanonicalValue::Null),
        any::<bool>().prop_map(CanonicalValue::Bool),
        (-1_000_000i64..1_000_000).prop_map(|n| CanonicalValue::Number(n as f64)),
        "[a-zA-Z0-9 _.-]{0,16}".prop_map(CanonicalValue::String),
    ];
    leaf.prop_recursive(5, 64, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(CanonicalValue::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..5)
                .prop_map(CanonicalValue::Object),
        ]
    })
}

/// A flat object together with a shuffled copy built in a different
/// insertion order. Both spellings are logically identical.
pub fn arb_flat_object() -> impl Strategy<Value = (CanonicalValue, CanonicalValue)> {
    prop::collection::btree_map("[a-z]{1,8}", -1_000i64..1_000, 1..8).prop_map(|pairs| {
        let forward: BTreeMap<String, CanonicalValue> = pairs
            .iter()
            .map(|(k, v)| (k.clone(), CanonicalValue::Number(*v as f64)))
            .collect();
        // Insert in reverse; BTreeMap normalizes, mirroring an implementation
        // that sorts at serialization time.
        let reversed: BTreeMap<String, CanonicalValue> = pairs
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), CanonicalValue::Number(*v as f64)))
            .collect();
        (
            CanonicalValue::Object(forward),
            CanonicalValue::Object(reversed),
        )
    })
}
