//! Deterministic keyword classifier (spec §4.2).
//!
//! Not NLP — a fixed keyword bag scored per `kind`, ties broken by a fixed
//! priority order. Pure and synchronous; no I/O.

use serde_json::Value;

pub const KIND_EMERGENCY: &str = "emergency";
pub const KIND_POLICY: &str = "policy";
pub const KIND_ASSIST: &str = "assist";
pub const KIND_UNKNOWN: &str = "unknown";

/// Priority order used to break score ties, highest first.
const PRIORITY: [&str; 3] = [KIND_EMERGENCY, KIND_POLICY, KIND_ASSIST];

fn keywords(kind: &str) -> &'static [&'static str] {
    match kind {
        KIND_EMERGENCY => &["urgent", "911", "crisis", "panic", "immediately"],
        KIND_POLICY => &["policy", "compliance", "consent", "hipaa", "gdpr"],
        KIND_ASSIST => &["help", "assist", "question", "explain", "clarify"],
        _ => &[],
    }
}

/// Serialize the whole payload to a case-insensitive string for scanning.
pub fn classify_serialize(payload: &Value) -> String {
    serde_json::to_string(payload).unwrap_or_default().to_lowercase()
}

/// `(kind, confidence)`. `confidence` is `min(raw + 0.5, 0.99)` where
/// `raw = 3 * matches / (3 * |keywords|)`, or `(unknown, 0.5)` if nothing
/// scores.
pub fn classify(payload: &Value) -> (String, f64) {
    let haystack = classify_serialize(payload);
    classify_text(&haystack)
}

/// Score an already-lowercased serialized payload. Exposed separately so the
/// replay worker's simplified classification (spec §4.11 / §9) can reuse the
/// exact same scoring without re-serializing.
pub fn classify_text(haystack: &str) -> (String, f64) {
    let mut best: Option<(&str, f64)> = None;

    for kind in PRIORITY {
        let kws = keywords(kind);
        let matches = kws.iter().filter(|k| haystack.contains(*k)).count();
        if matches == 0 {
            continue;
        }
        let raw = (3 * matches) as f64 / (3 * kws.len()) as f64;
        if raw <= 0.0 {
            continue;
        }
        let score = (raw + 0.5).min(0.99);
        match best {
            Some((_, best_score)) if best_score >= score => {}
            _ => best = Some((kind, score)),
        }
    }

    match best {
        Some((kind, score)) => (kind.to_string(), score),
        None => (KIND_UNKNOWN.to_string(), 0.5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assist_keyword() {
        let (kind, _) = classify(&json!({"text": "help me understand"}));
        assert_eq!(kind, KIND_ASSIST);
    }

    #[test]
    fn emergency_beats_assist_on_tie_priority() {
        // "crisis" (emergency) and "help" (assist) both present; emergency wins.
        let (kind, _) = classify(&json!({"text": "urgent crisis, please help"}));
        assert_eq!(kind, KIND_EMERGENCY);
    }

    #[test]
    fn unknown_when_no_keywords() {
        let (kind, score) = classify(&json!({"text": "lorem ipsum"}));
        assert_eq!(kind, KIND_UNKNOWN);
        assert_eq!(score, 0.5);
    }

    #[test]
    fn classify_idempotent_on_serialized_form() {
        let payload = json!({"text": "need help with a question"});
        let (kind1, score1) = classify(&payload);
        let serialized = classify_serialize(&payload);
        let (kind2, score2) = classify_text(&serialized);
        assert_eq!(kind1, kind2);
        assert_eq!(score1, score2);
    }
}
