//! Secret masking for logged and audited values
//!
//! Anything that leaves the process through logs or the audit trail passes
//! through [`redact_text`] or [`redact_json`] first. Masking is pattern
//! based: known secret-bearing key names and bearer-token shapes.

use regex::Regex;
use std::sync::OnceLock;

const MASK: &str = "[redacted]";

/// Key names whose values are always masked, compared case-insensitively.
const SENSITIVE_KEYS: &[&str] = &[
    "api_key",
    "apikey",
    "authorization",
    "password",
    "secret",
    "token",
    "access_token",
    "refresh_token",
];

fn bearer_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)bearer\s+[A-Za-z0-9._\-]+").unwrap())
}

fn key_value_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)(api[_-]?key|authorization|password|secret|token)(["']?\s*[:=]\s*["']?)[^\s"',}]+"#,
        )
        .unwrap()
    })
}

/// Returns true if the key name is considered secret-bearing
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|k| lower.contains(k))
}

/// Mask secrets embedded in free-form text
pub fn redact_text(input: &str) -> String {
    let masked = bearer_pattern().replace_all(input, MASK);
    key_value_pattern()
        .replace_all(&masked, |caps: &regex::Captures<'_>| {
            format!("{}{}{}", &caps[1], &caps[2], MASK)
        })
        .into_owned()
}

/// Mask secrets in a JSON value, recursing through objects and arrays
pub fn redact_json(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), serde_json::Value::String(MASK.to_string()));
                } else {
                    out.insert(key.clone(), redact_json(val));
                }
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(redact_json).collect())
        }
        serde_json::Value::String(s) => serde_json::Value::String(redact_text(s)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_bearer_tokens() {
        let input = "header Authorization: Bearer abc123.def";
        let output = redact_text(input);
        assert!(!output.contains("abc123"));
        assert!(output.contains("[redacted]"));
    }

    #[test]
    fn masks_key_value_pairs() {
        let output = redact_text("api_key=sk-verysecret temperature=0.7");
        assert!(!output.contains("sk-verysecret"));
        assert!(output.contains("temperature=0.7"));
    }

    #[test]
    fn masks_sensitive_json_keys() {
        let value = json!({
            "provider": "openai",
            "api_key": "sk-123",
            "nested": {"access_token": "tok", "model": "gpt"}
        });
        let masked = redact_json(&value);
        assert_eq!(masked["api_key"], "[redacted]");
        assert_eq!(masked["nested"]["access_token"], "[redacted]");
        assert_eq!(masked["nested"]["model"], "gpt");
        assert_eq!(masked["provider"], "openai");
    }
}
