//! Repair and validation of free-text generative output.
//!
//! Generative backends are asked for a JSON object but may wrap it in
//! markdown fences or commentary, or put raw line breaks inside string
//! literals. Parsing runs in stages:
//!
//! 1. [`strip_code_fence`] - keep the body of a fenced block, if any
//! 2. [`extract_json_object`] - slice from the first `{` to the last `}`
//! 3. [`escape_control_in_strings`] - escape `\n`, `\r`, `\t` inside strings
//! 4. [`parse_analysis`] - field-level validation, dropping invalid values

use crate::core::{AdditiveInfo, NutriGrade, RiskLevel, SemanticAnalysis};

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;

const MAX_PRODUCT_NAME_CHARS: usize = 200;
const MAX_RECIPE_CHARS: usize = 2000;
const MAX_ADDITIVES: usize = 50;

/// Product name used when the response carries none.
pub const UNKNOWN_PRODUCT: &str = "Unknown Product";

/// Why a generative response could not be used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResponseError {
    /// No `{ ... }` span was found.
    #[error("no JSON object in response")]
    NoJsonObject,

    /// The extracted span is not valid JSON.
    #[error("malformed JSON: {0}")]
    Malformed(String),

    /// The JSON value is not an object.
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("fence regex compiles"))
}

/// Returns the contents of the first fenced code block, or the trimmed input.
pub fn strip_code_fence(text: &str) -> &str {
    fence_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| text.trim())
}

/// Returns the span from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Result<&str, ResponseError> {
    let start = text.find('{').ok_or(ResponseError::NoJsonObject)?;
    let end = text.rfind('}').ok_or(ResponseError::NoJsonObject)?;
    if end < start {
        return Err(ResponseError::NoJsonObject);
    }
    Ok(&text[start..=end])
}

/// Escapes raw newline, carriage-return and tab characters that occur inside
/// JSON string literals. Characters outside strings are left alone.
pub fn escape_control_in_strings(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in json.chars() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => {
                out.push(c);
                escaped = true;
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => out.push_str("\\r"),
            '\t' if in_string => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_additive(value: &Value) -> Option<AdditiveInfo> {
    let object = value.as_object()?;
    let name = string_field(object, "name")?;
    let function = string_field(object, "function")?;
    let risk = RiskLevel::parse(object.get("risk")?.as_str()?.trim())?;
    let explanation = object
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(AdditiveInfo::new(name, function, risk, explanation.trim()))
}

/// Parses a generative response into a [`SemanticAnalysis`].
///
/// Fields outside their expected shape or enumeration are dropped: an
/// additive with an unknown risk tier is removed, an invalid letter grade
/// becomes `None`.
pub fn parse_analysis(text: &str) -> Result<SemanticAnalysis, ResponseError> {
    let body = extract_json_object(strip_code_fence(text))?;
    let repaired = escape_control_in_strings(body);
    let value: Value =
        serde_json::from_str(&repaired).map_err(|e| ResponseError::Malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ResponseError::NotAnObject(kind_of(&value)))?;

    let product_name = string_field(object, "productName")
        .map(|name| truncate_chars(name, MAX_PRODUCT_NAME_CHARS))
        .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string());

    let additives = object
        .get("additives")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(parse_additive)
                .take(MAX_ADDITIVES)
                .collect()
        })
        .unwrap_or_default();

    let nutri_grade = object
        .get("nutriScore")
        .and_then(Value::as_str)
        .and_then(NutriGrade::parse);

    let clean_recipe = string_field(object, "cleanRecipe")
        .map(|recipe| truncate_chars(recipe, MAX_RECIPE_CHARS))
        .unwrap_or_default();

    let functional_categories = object
        .get("functionalCategories")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let estimated_shelf_life = string_field(object, "estimatedShelfLife").map(str::to_string);

    Ok(SemanticAnalysis {
        product_name,
        additives,
        nutri_grade,
        clean_recipe,
        functional_categories,
        estimated_shelf_life,
        is_fallback: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(
            extract_json_object("Sure! Here you go: {\"a\": {\"b\": 2}} Hope it helps."),
            Ok("{\"a\": {\"b\": 2}}")
        );
        assert_eq!(extract_json_object("no json"), Err(ResponseError::NoJsonObject));
        assert_eq!(extract_json_object("} backwards {"), Err(ResponseError::NoJsonObject));
    }

    #[test]
    fn test_escape_control_only_inside_strings() {
        let raw = "{\n\t\"recipe\": \"line one\nline\ttwo\",\r\n\"ok\": \"a\\\"b\"\n}";
        let repaired = escape_control_in_strings(raw);
        assert!(repaired.contains("\"line one\\nline\\ttwo\""));
        assert!(repaired.starts_with("{\n\t\""));
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["recipe"], "line one\nline\ttwo");
        assert_eq!(value["ok"], "a\"b");
    }

    #[test]
    fn test_parse_full_response() {
        let text = r#"Here is the analysis:
```json
{
  "productName": "Chocolate Spread",
  "additives": [
    {"name": "Soy Lecithin", "function": "Emulsifier", "risk": "Low", "explanation": "Binds fat."},
    {"name": "Vanillin", "function": "Flavouring", "risk": "Severe", "explanation": "?"},
    {"name": 42, "function": "Colour", "risk": "High"}
  ],
  "nutriScore": "E",
  "cleanRecipe": "Blend roasted hazelnuts
with cocoa and honey.",
  "functionalCategories": ["Emulsifiers", 7, " "],
  "estimatedShelfLife": "12 months"
}
```"#;
        let analysis = parse_analysis(text).unwrap();
        assert_eq!(analysis.product_name, "Chocolate Spread");
        assert_eq!(analysis.additives.len(), 1);
        assert_eq!(analysis.additives[0].risk, RiskLevel::Low);
        assert_eq!(analysis.nutri_grade, Some(NutriGrade::E));
        assert_eq!(
            analysis.clean_recipe,
            "Blend roasted hazelnuts\nwith cocoa and honey."
        );
        assert_eq!(analysis.functional_categories, vec!["Emulsifiers"]);
        assert_eq!(analysis.estimated_shelf_life.as_deref(), Some("12 months"));
        assert!(!analysis.is_fallback);
    }

    #[test]
    fn test_invalid_enums_are_dropped() {
        let analysis =
            parse_analysis(r#"{"nutriScore": "F", "additives": [{"name":"x","function":"y","risk":"low"}]}"#)
                .unwrap();
        assert_eq!(analysis.nutri_grade, None);
        assert!(analysis.additives.is_empty());
        assert_eq!(analysis.product_name, UNKNOWN_PRODUCT);
        assert_eq!(analysis.estimated_shelf_life, None);
    }

    #[test]
    fn test_caps_lengths() {
        let long_name = "n".repeat(500);
        let additives: Vec<String> = (0..80)
            .map(|i| format!(r#"{{"name":"e{}","function":"f","risk":"Unknown"}}"#, 100 + i))
            .collect();
        let text = format!(
            r#"{{"productName":"{}","additives":[{}]}}"#,
            long_name,
            additives.join(",")
        );
        let analysis = parse_analysis(&text).unwrap();
        assert_eq!(analysis.product_name.chars().count(), 200);
        assert_eq!(analysis.additives.len(), 50);
    }

    #[test]
    fn test_rejects_non_json() {
        assert_eq!(parse_analysis("I cannot help with that."), Err(ResponseError::NoJsonObject));
        assert!(matches!(parse_analysis("{not json}"), Err(ResponseError::Malformed(_))));
    }
}
