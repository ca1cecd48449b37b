//! Tests for canonical serialization and content hashing

use detplan::internal::kernel::hashing::{
    attach_hash, canonical_json, hash_object, hash_value, sha256_hex, HashError,
};
use proptest::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

#[test]
fn test_empty_object_digest() {
    assert_eq!(
        hash_value(&json!({})),
        "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
    );
    assert_eq!(sha256_hex("{}"), hash_value(&json!({})));
}

#[test]
fn test_struct_and_map_hash_identically() {
    #[derive(Serialize)]
    struct Step {
        id: &'static str,
        action: &'static str,
        cost_hint: Option<f64>,
    }

    let from_struct = hash_object(&Step {
        id: "step-1",
        action: "scan_repo_tree",
        cost_hint: Some(0.2),
    })
    .unwrap();
    let from_value = hash_value(&json!({
        "cost_hint": 0.2,
        "action": "scan_repo_tree",
        "id": "step-1",
    }));
    assert_eq!(from_struct, from_value);
}

#[test]
fn test_canonical_json_nested_ordering() {
    let value = json!({"z": {"b": 1, "a": [3, {"d": 4, "c": 5}]}, "a": -7});
    assert_eq!(
        canonical_json(&value).unwrap(),
        r#"{"a":-7,"z":{"a":[3,{"c":5,"d":4}],"b":1}}"#
    );
}

#[test]
fn test_array_order_is_significant() {
    assert_ne!(hash_value(&json!([1, 2])), hash_value(&json!([2, 1])));
}

#[test]
fn test_non_string_keys_are_reported() {
    let mut map = HashMap::new();
    map.insert(vec![1u8], "value");
    assert!(matches!(hash_object(&map), Err(HashError::Unserializable(_))));
}

#[test]
fn test_non_finite_floats_are_reported() {
    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        assert!(matches!(hash_object(&value), Err(HashError::NonFiniteFloat(_))));
    }
    assert!(matches!(hash_object(&f32::NAN), Err(HashError::NonFiniteFloat(_))));
    assert_ne!(hash_object(&()).ok(), hash_object(&f64::NAN).ok());

    #[derive(Serialize)]
    struct Step {
        cost_hint: Option<f64>,
    }
    assert!(matches!(
        canonical_json(&Step { cost_hint: Some(f64::INFINITY) }),
        Err(HashError::NonFiniteFloat(_))
    ));
    assert!(canonical_json(&Step { cost_hint: Some(0.5) }).is_ok());
}

#[test]
fn test_attach_hash_matches_hash_of_body() {
    let body = json!({"type": "Proposal", "version": "1"});
    let sealed = attach_hash(body.clone()).unwrap();
    assert_eq!(sealed["hash"], Value::String(hash_value(&body)));
}

proptest! {
    #[test]
    fn prop_hash_ignores_construction_order(entries in proptest::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..16)) {
        let ordered: BTreeMap<String, i64> = entries.iter().cloned().collect();
        let hashed: HashMap<String, i64> = entries.iter().cloned().collect();
        let mut rebuilt = serde_json::Map::new();
        for (key, value) in ordered.iter().rev() {
            rebuilt.insert(key.clone(), json!(value));
        }

        let expected = hash_object(&ordered).unwrap();
        prop_assert_eq!(hash_object(&hashed).unwrap(), expected.clone());
        prop_assert_eq!(hash_value(&Value::Object(rebuilt)), expected);
    }

    #[test]
    fn prop_canonical_json_round_trips(entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..12)) {
        let value = json!(entries);
        let text = canonical_json(&value).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(parsed, value);
    }
}
