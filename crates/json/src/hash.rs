//! Structural digests of documents.

use sha2::{Digest as _, Sha256};

use crate::value::Value;

/// A document digest.
pub type Digest = [u8; 32];

/// Digest of `value`.
///
/// Container key order never matters. Array order matters unless
/// `array_order_insignificant` is set, in which case element digests are
/// XOR-combined so every permutation hashes the same.
pub fn hash(value: &Value, array_order_insignificant: bool) -> Digest {
    let mut hasher = Sha256::new();
    write_value(&mut hasher, value, array_order_insignificant);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Lower-case hex rendering of [`hash`].
pub fn hash_hex(value: &Value, array_order_insignificant: bool) -> String {
    hash(value, array_order_insignificant)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Deep equality that ignores array order at every depth.
pub fn unordered_equal(a: &Value, b: &Value) -> bool {
    hash(a, true) == hash(b, true)
}

fn write_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_be_bytes());
}

fn write_value(hasher: &mut Sha256, value: &Value, unordered: bool) {
    match value {
        Value::Str(s) => {
            hasher.update(b"str");
            write_len(hasher, s.len());
            hasher.update(s.as_bytes());
        }
        Value::Num(n) => {
            hasher.update(b"num");
            hasher.update(n.to_bits().to_be_bytes());
        }
        Value::Bool(b) => {
            hasher.update(b"bool");
            hasher.update([if *b { 1u8 } else { 2u8 }]);
        }
        Value::Null => hasher.update(b"nil"),
        Value::Container(fields) => {
            hasher.update(b"obj");
            write_len(hasher, fields.len());
            // BTreeMap iterates in key order.
            for (key, field) in fields {
                hasher.update(b"key");
                write_len(hasher, key.len());
                hasher.update(key.as_bytes());
                write_value(hasher, field, unordered);
            }
        }
        Value::Array(items) if unordered => {
            let mut combined = [0u8; 32];
            for item in items {
                for (acc, byte) in combined.iter_mut().zip(hash(item, true)) {
                    *acc ^= byte;
                }
            }
            hasher.update(b"arr");
            write_len(hasher, items.len());
            hasher.update(combined);
        }
        Value::Array(items) => {
            hasher.update(b"arr");
            write_len(hasher, items.len());
            for item in items {
                write_value(hasher, item, unordered);
            }
        }
    }
}
