//! Document-level properties exercised through the public API only.

use pretty_assertions::assert_eq;
use serde_json::json;
use whistle_json::{
    format_path, get_field, merge, segment_path, set_field, unordered_equal, Segment, Value,
};

fn doc(v: serde_json::Value) -> Value {
    Value::from(v)
}

// ──────────────────────────────────────────────
// Copies
// ──────────────────────────────────────────────

#[test]
fn deep_copy_survives_mutation_through_paths() {
    let original = doc(json!({"a": [{"b": {"c": [1, 2]}}], "d": "e"}));
    let mut copy = original.deep_copy();
    assert_eq!(copy, original);

    set_field(doc(json!(99)), "a[0].b.c[5]", &mut copy, true, false).unwrap();
    set_field(doc(json!("z")), "d", &mut copy, true, false).unwrap();

    assert_eq!(original, doc(json!({"a": [{"b": {"c": [1, 2]}}], "d": "e"})));
    assert_eq!(get_field(&copy, "a[0].b.c[5]").unwrap(), doc(json!(99)));
}

// ──────────────────────────────────────────────
// Paths against documents
// ──────────────────────────────────────────────

#[test]
fn formatted_paths_address_the_same_field() {
    let mut d = Value::Null;
    let segments = vec![
        Segment::Field("we.ird".into()),
        Segment::Index(1),
        Segment::Field("k[0]".into()),
    ];
    let path = format_path(&segments);
    assert_eq!(segment_path(&path).unwrap(), segments);

    set_field(doc(json!(true)), &path, &mut d, false, false).unwrap();
    assert_eq!(d, doc(json!({"we.ird": [null, {"k[0]": true}]})));
    assert_eq!(get_field(&d, &path).unwrap(), doc(json!(true)));
}

#[test]
fn write_then_wildcard_read() {
    let mut d = Value::Null;
    set_field(doc(json!([3, 4, 5])), "rows[].n", &mut d, false, true).unwrap();
    assert_eq!(get_field(&d, "rows[*].n").unwrap(), doc(json!([3, 4, 5])));
}

// ──────────────────────────────────────────────
// Merge and equality
// ──────────────────────────────────────────────

#[test]
fn merged_documents_compare_unordered() {
    let mut left = doc(json!({"tags": ["a"]}));
    merge(doc(json!({"tags": ["b"], "n": 1})), &mut left, true, false).unwrap();
    let right = doc(json!({"n": 1, "tags": ["b", "a"]}));
    assert_ne!(left, right);
    assert!(unordered_equal(&left, &right));
}

#[test]
fn json_text_round_trips() {
    let text = r#"{"a":[1,-2.5,1e100,"s\"q",true,false,null],"b":{"c":{}}}"#;
    let v = Value::from_json_str(text).unwrap();
    let again = Value::from_json_str(&v.to_json_string().unwrap()).unwrap();
    assert_eq!(again, v);
}
