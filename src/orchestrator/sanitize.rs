//! Normalization of a scan before it is written.

use crate::cache::EnrichmentBundle;
use crate::core::{round2, NewScanRecord};
use crate::gateway::UNKNOWN_PRODUCT;
use crate::orchestrator::allergen::AllergenCheck;

const MAX_PRODUCT_NAME_CHARS: usize = 100;
const NO_RECIPE: &str = "No recipe available.";
const UNKNOWN_SHELF_LIFE: &str = "Unknown";

/// Upper-cases the first word character of each whitespace-separated word
/// and lower-cases the rest of it. Leading punctuation is kept as is.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;

    for c in text.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else if at_word_start {
            out.push(c);
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Everything that goes into one record.
#[derive(Debug)]
pub struct RecordParts<'a> {
    /// Owner of the scan.
    pub user_id: &'a str,
    /// Name supplied with the request.
    pub requested_name: Option<&'a str>,
    /// OCR, classification and analysis output.
    pub enrichment: &'a EnrichmentBundle,
    /// Allergy check against the user's profile.
    pub allergens: &'a AllergenCheck,
    /// URL of the uploaded photo.
    pub image_url: Option<String>,
}

/// Builds the record to persist.
pub fn build_record(parts: RecordParts<'_>) -> NewScanRecord {
    let EnrichmentBundle {
        extracted,
        classification,
        analysis,
    } = parts.enrichment;

    let name = non_blank(parts.requested_name)
        .or_else(|| non_blank(Some(&analysis.product_name)))
        .unwrap_or(UNKNOWN_PRODUCT);
    let product_name: String = title_case(name).chars().take(MAX_PRODUCT_NAME_CHARS).collect();

    NewScanRecord {
        user_id: parts.user_id.to_string(),
        product_name,
        raw_text: extracted.text.trim().to_string(),
        processing_group: classification.group,
        nutri_grade: analysis.nutri_grade,
        allergens: classification.detected_allergens().to_vec(),
        additives: analysis.additives.clone(),
        clean_recipe: non_blank(Some(&analysis.clean_recipe))
            .unwrap_or(NO_RECIPE)
            .to_string(),
        functional_categories: analysis
            .functional_categories
            .iter()
            .filter_map(|c| non_blank(Some(c)))
            .map(title_case)
            .collect(),
        estimated_shelf_life: non_blank(analysis.estimated_shelf_life.as_deref())
            .unwrap_or(UNKNOWN_SHELF_LIFE)
            .to_string(),
        ocr_confidence: round2(extracted.confidence),
        classification_confidence: round2(classification.confidence),
        is_safe: parts.allergens.is_safe(),
        allergen_alert: parts.allergens.alert(),
        image_url: parts.image_url,
    }
}
