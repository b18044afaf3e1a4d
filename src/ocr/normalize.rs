//! Post-processing of raw OCR output.

use regex::Regex;
use std::sync::OnceLock;

fn noise_regex() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| Regex::new(r"[|_\\/<>]").expect("noise regex compiles"))
}

fn repeated_comma_regex() -> &'static Regex {
    static COMMAS: OnceLock<Regex> = OnceLock::new();
    COMMAS.get_or_init(|| Regex::new(r",(?:\s*,)+").expect("comma regex compiles"))
}

fn whitespace_regex() -> &'static Regex {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    SPACES.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex compiles"))
}

/// Cleans raw OCR text into a single lower-cased line of at most `max_chars`.
///
/// Control characters and line breaks become spaces, scanning noise
/// (`| _ \ / < >`) is removed, runs of whitespace and empty comma-separated
/// slots collapse, and the result is truncated on a character boundary.
/// Applying it to its own output is a no-op.
pub fn normalize_ocr_text(raw: &str, max_chars: usize) -> String {
    let lowered: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .to_lowercase();

    let denoised = noise_regex().replace_all(&lowered, " ");
    let collapsed = whitespace_regex().replace_all(&denoised, " ");
    let commas = repeated_comma_regex().replace_all(&collapsed, ",");

    let trimmed = commas.trim();
    let capped: String = trimmed.chars().take(max_chars).collect();
    capped.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_noise_and_whitespace() {
        let raw = "INGREDIENTS:\n\tWheat Flour | Sugar,,  , Palm_Oil\r\n<E471>";
        assert_eq!(
            normalize_ocr_text(raw, 5000),
            "ingredients: wheat flour sugar, palm oil e471"
        );
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Water,  ,Salt\n\nSUGAR",
            "  | a / b \\ c ,, d  ",
            "Milk , , , Eggs\u{0007}Butter",
            "ÉPICES, SEL",
        ];
        for raw in samples {
            let once = normalize_ocr_text(raw, 5000);
            let twice = normalize_ocr_text(&once, 5000);
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_respects_cap_without_line_breaks() {
        let raw = "flour, sugar\n".repeat(1000);
        let out = normalize_ocr_text(&raw, 50);
        assert!(out.chars().count() <= 50);
        assert!(!out.contains('\n'));
        assert!(!out.contains('\t'));
        assert_eq!(normalize_ocr_text(&out, 50), out);
    }

    #[test]
    fn test_multibyte_truncation() {
        let out = normalize_ocr_text("ééééé", 3);
        assert_eq!(out, "ééé");
    }
}
