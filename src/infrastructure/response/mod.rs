//! Post-processing for raw model output.

use once_cell::sync::Lazy;
use regex::Regex;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<reasoning>[\s\S]*?</reasoning>").unwrap());

static CODE_FENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*\n?(.*?)\n?\s*```").unwrap());

/// Remove reasoning tags and surrounding whitespace.
pub fn clean_llm_response(response: &str) -> String {
    let cleaned = THINK_TAG_PATTERN.replace_all(response, "");
    let cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

/// Body of the first fenced block, or the input when there is none.
pub fn strip_code_fences(response: &str) -> String {
    match CODE_FENCE_PATTERN.captures(response) {
        Some(caps) => caps[1].trim().to_string(),
        None => response.trim().to_string(),
    }
}

/// The first balanced `{...}` object in `text`, string literals respected.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Clean, unfence and isolate the JSON object in a model reply.
pub fn json_payload(response: &str) -> Option<String> {
    let cleaned = clean_llm_response(response);
    let unfenced = strip_code_fences(&cleaned);
    extract_json_object(&unfenced).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_think_tags() {
        let input = "<think>Some reasoning here</think>The actual response";
        assert_eq!(clean_llm_response(input), "The actual response");
    }

    #[test]
    fn test_clean_self_closing_think() {
        assert_eq!(clean_llm_response("<think />123456"), "123456");
    }

    #[test]
    fn test_strip_fences() {
        let input = "```json\n{\"should_proceed\": true}\n```";
        assert_eq!(strip_code_fences(input), "{\"should_proceed\": true}");
        assert_eq!(strip_code_fences("  plain "), "plain");
    }

    #[test]
    fn test_extract_object_with_braces_in_strings() {
        let input = r#"Sure! {"reason": "uses {braces}", "ok": true} trailing"#;
        assert_eq!(
            extract_json_object(input),
            Some(r#"{"reason": "uses {braces}", "ok": true}"#)
        );
        assert_eq!(extract_json_object("no json"), None);
        assert_eq!(extract_json_object("{unclosed"), None);
    }

    #[test]
    fn test_json_payload_combined() {
        let input = "<think>hmm</think>\n```json\n{\"should_proceed\": false, \"reason\": \"wrong entity\"}\n```";
        let payload = json_payload(input).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["reason"], "wrong entity");
    }
}
