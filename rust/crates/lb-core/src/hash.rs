//! Canonical-JSON SHA-256 hashing used for command/inputs/params fingerprints.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hashes `value` as canonical JSON (sorted object keys, stable scalar formatting) and returns
/// the lowercase hex digest.
///
/// `serde_json::Map` preserves insertion order in this workspace (the `preserve_order` feature is
/// enabled, so merged `PARAMETERS` render as shell flags in the order they were defined) — so the
/// digest is stable across re-orderings of the source configuration only because `canonicalize`
/// below explicitly re-sorts every object's keys before serializing, rather than relying on the
/// map's backing order.
pub fn canonical_sha256_hex<T: Serialize>(value: &T) -> String {
    let value = serde_json::to_value(value).expect("value must be JSON-serializable");
    let canonical = canonicalize(&value);
    let bytes = serde_json::to_vec(&canonical).expect("canonical value must be JSON-serializable");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
