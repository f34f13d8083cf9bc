//! Environment lookups where a blank value counts as unset.
//!
//! `.env` templates ship keys like `STT_API_KEY=`; those must not select a backend.

/// Trimmed value of `key`, or None when missing or blank.
pub fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First non-blank value among `keys`.
pub fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| env_value(k))
}

pub fn env_or(key: &str, default: &str) -> String {
    env_value(key).unwrap_or_else(|| default.to_string())
}
