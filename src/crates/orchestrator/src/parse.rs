//! Tolerant extraction of JSON objects from LLM responses.
//!
//! Models wrap JSON in markdown fences or prose more often than not. The
//! parse path is: raw parse, then the first fenced block, then the first
//! brace-balanced object in the text.

use serde::de::DeserializeOwned;
use tracing::debug;

/// Extract the most plausible JSON object from an LLM response.
pub fn extract_json(response: &str) -> Option<String> {
    let trimmed = response.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed.to_string());
    }

    // Fenced block: ```json ... ``` or plain ``` ... ```.
    if let Some(open) = trimmed.find("```") {
        let after = &trimmed[open + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(close) = after.find("```") {
            let inner = after[..close].trim();
            if inner.starts_with('{') {
                return Some(inner.to_string());
            }
        }
    }

    // First brace-balanced object, ignoring braces inside string literals.
    let bytes = trimmed.as_bytes();
    let start = trimmed.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(trimmed[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a typed value out of an LLM response: one raw attempt, one
/// re-parse over the extracted object.
pub fn parse_llm_json<T: DeserializeOwned>(response: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<T>(response) {
        return Some(value);
    }
    let extracted = extract_json(response)?;
    match serde_json::from_str::<T>(&extracted) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(error = %e, "extracted JSON did not match the expected schema");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Probe {
        answer: String,
    }

    #[test]
    fn raw_json_parses() {
        let parsed: Probe = parse_llm_json(r#"{"answer": "yes"}"#).unwrap();
        assert_eq!(parsed.answer, "yes");
    }

    #[test]
    fn fenced_json_parses() {
        let response = "Here you go:\n```json\n{\"answer\": \"yes\"}\n```\nDone.";
        let parsed: Probe = parse_llm_json(response).unwrap();
        assert_eq!(parsed.answer, "yes");
    }

    #[test]
    fn embedded_object_parses() {
        let response = "The result is {\"answer\": \"yes\"} as requested.";
        let parsed: Probe = parse_llm_json(response).unwrap();
        assert_eq!(parsed.answer, "yes");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let response = "prefix {\"answer\": \"curly } brace\"} suffix";
        let parsed: Probe = parse_llm_json(response).unwrap();
        assert_eq!(parsed.answer, "curly } brace");
    }

    #[test]
    fn garbage_yields_none() {
        assert!(parse_llm_json::<Probe>("no json here").is_none());
        assert!(parse_llm_json::<Probe>("{\"wrong\": 1}").is_none());
    }
}
