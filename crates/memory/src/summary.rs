//! Bounded summaries of tool payloads.
//!
//! Tool results go into memory, and memory goes into every later prompt,
//! so payloads are compacted and truncated before they are stored.

/// Summarize `payload` into at most `limit` characters (plus an elision
/// marker). JSON payloads are re-serialized compactly first.
pub fn summarize(payload: &str, limit: usize) -> String {
    let trimmed = payload.trim();
    let compact = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
            serde_json::to_string(&value).unwrap_or_else(|_| trimmed.to_string())
        }
        _ => collapse_whitespace(trimmed),
    };

    let total = compact.chars().count();
    if total <= limit {
        return compact;
    }

    let kept: String = compact.chars().take(limit).collect();
    format!("{kept}… [truncated {} chars]", total - limit)
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out
}
