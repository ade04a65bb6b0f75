//! JSON Repair Mechanism
//!
//! JSON extraction for model responses that are supposed to be JSON but
//! frequently are not quite:
//! - Markdown code fence wrapping (```json ... ```)
//! - Trailing commas
//! - Missing closing braces/brackets
//! - JSON embedded in explanatory text

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{CaseError, ErrorCategory, ModelError, Result};

/// Extract and parse JSON from a model response
pub fn extract_json_from_response(content: &str) -> Result<Value> {
    JsonRepairer::new().parse_or_repair(content)
}

/// JSON repair strategies
#[derive(Debug, Default)]
pub struct JsonRepairer;

impl JsonRepairer {
    pub fn new() -> Self {
        Self
    }

    /// Parse JSON, attempting repair if the initial parse fails
    pub fn parse_or_repair(&self, raw: &str) -> Result<Value> {
        let cleaned = self.preprocess(raw);

        if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
            return Ok(value);
        }

        debug!("Initial JSON parse failed, attempting repair");

        let repaired = self.balance_brackets(&self.fix_trailing_commas(&cleaned));
        if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
            warn!("JSON repaired (trailing commas / unbalanced brackets)");
            return Ok(value);
        }

        if let Some(extracted) = self.extract_json_from_mixed(&cleaned) {
            let extracted = self.fix_trailing_commas(&extracted);
            if let Ok(value) = serde_json::from_str::<Value>(&extracted) {
                warn!("JSON extracted from mixed content");
                return Ok(value);
            }
        }

        Err(CaseError::Model(ModelError::new(
            ErrorCategory::ParseError,
            format!(
                "Failed to parse or repair JSON. Content preview: {}...",
                cleaned.chars().take(200).collect::<String>()
            ),
        )))
    }

    fn preprocess(&self, raw: &str) -> String {
        let s = raw.trim().trim_start_matches('\u{feff}');
        self.strip_code_fences(s).trim().to_string()
    }

    /// Strip markdown code fences
    fn strip_code_fences(&self, s: &str) -> String {
        let mut result = s.to_string();

        if result.starts_with("```")
            && let Some(first_newline) = result.find('\n')
        {
            result = result[first_newline + 1..].to_string();
        }

        if result.ends_with("```") {
            result = result[..result.len() - 3].trim_end().to_string();
        }

        result
    }

    /// Remove commas directly before `]` or `}`
    fn fix_trailing_commas(&self, s: &str) -> String {
        let chars: Vec<char> = s.chars().collect();
        let mut result = String::with_capacity(s.len());
        let mut in_string = false;
        let mut escape = false;

        for (i, &ch) in chars.iter().enumerate() {
            if escape {
                escape = false;
                result.push(ch);
                continue;
            }
            match ch {
                '\\' if in_string => escape = true,
                '"' => in_string = !in_string,
                ',' if !in_string => {
                    let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                    if matches!(next, Some(']') | Some('}')) {
                        continue;
                    }
                }
                _ => {}
            }
            result.push(ch);
        }

        result
    }

    /// Balance brackets by adding missing closers
    fn balance_brackets(&self, s: &str) -> String {
        let mut result = s.to_string();
        let mut stack = Vec::new();
        let mut in_string = false;
        let mut escape = false;

        for ch in s.chars() {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' if in_string => escape = true,
                '"' => in_string = !in_string,
                '{' if !in_string => stack.push('}'),
                '[' if !in_string => stack.push(']'),
                '}' | ']' if !in_string => {
                    stack.pop();
                }
                _ => {}
            }
        }

        if in_string {
            result.push('"');
        }
        while let Some(closer) = stack.pop() {
            result.push(closer);
        }

        result
    }

    /// Extract the outermost JSON object or array from surrounding prose
    fn extract_json_from_mixed(&self, s: &str) -> Option<String> {
        let start = s.find(['{', '['])?;
        let open = s[start..].chars().next()?;
        let close = if open == '{' { '}' } else { ']' };
        let end = s.rfind(close)?;
        (end > start).then(|| s[start..=end].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code_fenced_json() {
        let raw = "```json\n{\"references\": []}\n```";
        let value = extract_json_from_response(raw).unwrap();
        assert!(value["references"].is_array());
    }

    #[test]
    fn test_repair_trailing_comma_and_missing_brace() {
        let raw = r#"{"references": [{"label": "1", "journal": "NEJM",}]"#;
        let value = extract_json_from_response(raw).unwrap();
        assert_eq!(value["references"][0]["journal"], "NEJM");
    }

    #[test]
    fn test_extract_from_mixed_content() {
        let raw = "Here is the metadata you asked for:\n{\"references\": [{\"label\": \"2\"}]}\nHope it helps.";
        let value = extract_json_from_response(raw).unwrap();
        assert_eq!(value["references"][0]["label"], "2");
    }

    #[test]
    fn test_comma_inside_string_preserved() {
        let raw = r#"{"title": "Heart failure, acute"}"#;
        let value = extract_json_from_response(raw).unwrap();
        assert_eq!(value["title"], "Heart failure, acute");
    }

    #[test]
    fn test_unparseable_is_parse_error() {
        let err = extract_json_from_response("no json here").unwrap_err();
        assert!(matches!(
            err,
            CaseError::Model(ModelError {
                category: ErrorCategory::ParseError,
                ..
            })
        ));
    }
}
