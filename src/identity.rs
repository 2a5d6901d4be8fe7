//! Canonical message identity (spec §4.1).
//!
//! `message_id = sha256(tenant_id ":" identifier ":" payload_version ":" canonical_json)[:32 hex]`
//! Volatile fields (`trace_id`, `timestamp`, `ts`) never participate.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

const VOLATILE_KEYS: [&str; 3] = ["trace_id", "timestamp", "ts"];

/// Canonicalize a JSON object: strip volatile keys, sort keys recursively,
/// serialize with minimal separators. Key order in the input never affects
/// the output.
pub fn canonical_json(payload: &Value) -> String {
    let cleaned = strip_volatile(payload);
    serde_json::to_string(&sort_value(&cleaned)).unwrap_or_else(|_| "{}".to_string())
}

fn strip_volatile(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if VOLATILE_KEYS.contains(&k.as_str()) {
                    continue;
                }
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Recursively sort object keys so that serialization is independent of
/// insertion order. Uses a `BTreeMap` for the sort, then re-serializes as a
/// regular (insertion-ordered) `Map` in sorted order.
fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = Default::default();
            for (k, v) in map {
                sorted.insert(k.clone(), sort_value(v));
            }
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `identifier = event_id` if non-empty, else `user_id:ts`, else a content
/// hash of the canonical payload.
pub fn identifier(event_id: Option<&str>, user_id: Option<&str>, ts: &str, canonical: &str) -> String {
    if let Some(id) = event_id.filter(|s| !s.is_empty()) {
        return id.to_string();
    }
    if let Some(uid) = user_id.filter(|s| !s.is_empty()) {
        return format!("{uid}:{ts}");
    }
    sha256_hex(canonical)[..16].to_string()
}

/// Compute the canonical `message_id` (= `log_id`).
pub fn message_id(
    tenant_id: &str,
    event_id: Option<&str>,
    user_id: Option<&str>,
    ts: &str,
    payload_version: i64,
    payload: &Value,
) -> String {
    let canonical = canonical_json(payload);
    let ident = identifier(event_id, user_id, ts, &canonical);
    let input = format!("{tenant_id}:{ident}:{payload_version}:{canonical}");
    sha256_hex(&input)[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_ignores_key_order() {
        let a = json!({"text": "help me", "x": 1});
        let b = json!({"x": 1, "text": "help me"});
        let id_a = message_id("t1", None, Some("u1"), "2025-09-20T10:20:30Z", 1, &a);
        let id_b = message_id("t1", None, Some("u1"), "2025-09-20T10:20:30Z", 1, &b);
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn id_ignores_volatile_fields() {
        let a = json!({"text": "help"});
        let b = json!({"text": "help", "trace_id": "abc", "timestamp": "now", "ts": "later"});
        let id_a = message_id("t1", None, Some("u1"), "2025-09-20T10:20:30Z", 1, &a);
        let id_b = message_id("t1", None, Some("u1"), "2025-09-20T10:20:30Z", 1, &b);
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn id_sensitive_to_tenant_and_payload() {
        let a = json!({"text": "help"});
        let id1 = message_id("t1", None, Some("u1"), "2025-09-20T10:20:30Z", 1, &a);
        let id2 = message_id("t2", None, Some("u1"), "2025-09-20T10:20:30Z", 1, &a);
        assert_ne!(id1, id2);

        let b = json!({"text": "assist"});
        let id3 = message_id("t1", None, Some("u1"), "2025-09-20T10:20:30Z", 1, &b);
        assert_ne!(id1, id3);

        let id4 = message_id("t1", None, Some("u1"), "2025-09-20T10:20:30Z", 2, &a);
        assert_ne!(id1, id4);
    }

    #[test]
    fn event_id_wins_over_user_id() {
        let a = json!({"text": "help"});
        let id1 = message_id("t1", Some("ev1"), Some("u1"), "ts", 1, &a);
        let id2 = message_id("t1", Some("ev1"), Some("u2"), "ts", 1, &a);
        assert_eq!(id1, id2);
    }

    #[test]
    fn length_is_32_hex() {
        let id = message_id("t1", None, Some("u1"), "ts", 1, &json!({}));
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
