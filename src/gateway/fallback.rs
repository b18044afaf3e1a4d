//! Deterministic local substitutes for the remote classifier and analyzer.
//!
//! Everything here is pure: the same normalized text always yields the same
//! result, with no I/O and no clock.

use crate::core::{
    AdditiveInfo, ClassificationResult, ProcessingGroup, Provenance, RiskLevel, SemanticAnalysis,
};

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Confidence reported for rule-based classifications.
pub const FALLBACK_CONFIDENCE: f32 = 0.3;

/// Product name used when no analysis is available.
pub const FALLBACK_PRODUCT_NAME: &str = "Scanned Product";

const MAX_ADDITIVES: usize = 50;

/// Tokens typical of industrial formulation.
pub const ULTRA_PROCESSED_MARKERS: &[&str] = &[
    "maltodextrin",
    "hydrogenated",
    "high fructose",
    "monosodium glutamate",
    "carrageenan",
    "xanthan gum",
    "aspartame",
    "sucralose",
    "acesulfame",
    "red 40",
    "yellow 5",
    "yellow 6",
    "blue 1",
    "artificial flavor",
    "sodium nitrite",
];

/// Tokens typical of home-kitchen ingredients.
pub const WHOLE_FOOD_TOKENS: &[&str] = &[
    "water", "salt", "sugar", "flour", "eggs", "milk", "yeast", "butter", "oil",
];

const ALLERGEN_FAMILIES: &[(&str, &[&str])] = &[
    (
        "Gluten",
        &["wheat", "barley", "rye", "malt", "flour", "semolina", "spelt"],
    ),
    (
        "Dairy",
        &[
            "milk", "cream", "cheese", "whey", "casein", "lactose", "butter", "yogurt",
        ],
    ),
    ("Soy", &["soy", "soya", "tofu", "edamame", "lecithin", "miso", "tempeh"]),
    (
        "Nuts",
        &[
            "almond",
            "walnut",
            "cashew",
            "pecan",
            "hazelnut",
            "pistachio",
            "macadamia",
            "tree nut",
        ],
    ),
    ("Peanuts", &["peanut", "groundnut"]),
    ("Eggs", &["egg", "albumin", "mayonnaise"]),
    ("Fish", &["fish", "tuna", "salmon", "cod", "anchovy"]),
    (
        "Shellfish",
        &["shrimp", "crab", "lobster", "prawn", "clam", "mussel", "oyster"],
    ),
];

/// A set of keywords matched on word boundaries, tolerating plural suffixes.
struct KeywordSet {
    regex: Regex,
}

impl KeywordSet {
    fn new(keywords: &[&str]) -> Self {
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(r"(?i)\b({})(?:s|es)?\b", alternation);
        Self {
            regex: Regex::new(&pattern).expect("keyword regex compiles"),
        }
    }

    /// Distinct keywords present in `text`.
    fn matches(&self, text: &str) -> BTreeSet<String> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
            .collect()
    }
}

fn markers() -> &'static KeywordSet {
    static SET: OnceLock<KeywordSet> = OnceLock::new();
    SET.get_or_init(|| KeywordSet::new(ULTRA_PROCESSED_MARKERS))
}

fn whole_foods() -> &'static KeywordSet {
    static SET: OnceLock<KeywordSet> = OnceLock::new();
    SET.get_or_init(|| KeywordSet::new(WHOLE_FOOD_TOKENS))
}

fn allergen_sets() -> &'static [(&'static str, KeywordSet)] {
    static SETS: OnceLock<Vec<(&'static str, KeywordSet)>> = OnceLock::new();
    SETS.get_or_init(|| {
        ALLERGEN_FAMILIES
            .iter()
            .map(|(label, keywords)| (*label, KeywordSet::new(keywords)))
            .collect()
    })
}

/// Groups an ingredient list by counting marker and whole-food tokens.
///
/// - 3 or more markers: group 4
/// - 1 or 2 markers: group 3
/// - no markers and 3 or more whole-food tokens: group 1
/// - otherwise: group 2
pub fn fallback_group(text: &str) -> ProcessingGroup {
    let marker_count = markers().matches(text).len();
    let whole_food_count = whole_foods().matches(text).len();
    group_for_counts(marker_count, whole_food_count)
}

fn group_for_counts(marker_count: usize, whole_food_count: usize) -> ProcessingGroup {
    if marker_count >= 3 {
        ProcessingGroup::UltraProcessed
    } else if marker_count >= 1 {
        ProcessingGroup::Processed
    } else if whole_food_count >= 3 {
        ProcessingGroup::Unprocessed
    } else {
        ProcessingGroup::CulinaryIngredient
    }
}

/// Allergen families mentioned in the text, in a stable order.
pub fn detect_allergens(text: &str) -> Vec<String> {
    allergen_sets()
        .iter()
        .filter(|(_, set)| !set.matches(text).is_empty())
        .map(|(label, _)| (*label).to_string())
        .collect()
}

/// Rule-based classification used when the remote classifier is unavailable.
pub fn fallback_classification(text: &str) -> ClassificationResult {
    let found_markers = markers().matches(text);
    let found_whole = whole_foods().matches(text);
    let group = group_for_counts(found_markers.len(), found_whole.len());

    let (contributing, reason) = if found_markers.is_empty() {
        (
            found_whole.into_iter().collect::<Vec<_>>(),
            "no industrial markers found".to_string(),
        )
    } else {
        let list: Vec<String> = found_markers.into_iter().collect();
        let reason = format!("industrial markers: {}", list.join(", "));
        (list, reason)
    };

    ClassificationResult {
        group,
        confidence: FALLBACK_CONFIDENCE,
        contributing_ingredients: Some(contributing),
        allergens: Some(detect_allergens(text)),
        reasons: Some(vec![reason]),
        provenance: Provenance::Fallback,
    }
}

struct AdditivePattern {
    regex: Regex,
    function: &'static str,
    category: &'static str,
    risk: RiskLevel,
    explanation: &'static str,
}

fn additive_patterns() -> &'static [AdditivePattern] {
    static PATTERNS: OnceLock<Vec<AdditivePattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table: [(&str, &str, &str, RiskLevel, &str); 6] = [
            (
                r"\b(?:xanthan|guar|gellan|locust bean) gum\b|\bcarrageenan\b",
                "Thickener",
                "Thickeners",
                RiskLevel::Low,
                "Used to thicken and stabilize texture.",
            ),
            (
                r"\b(?:tbhq|bht|bha|(?:sodium |potassium |calcium )?(?:benzoate|sorbate|nitrite))\b",
                "Preservative",
                "Preservatives",
                RiskLevel::Medium,
                "Extends shelf life by slowing spoilage.",
            ),
            (
                r"\b(?:red|yellow|blue|green) \d{1,2}\b",
                "Colorant",
                "Colouring Agents",
                RiskLevel::Medium,
                "Synthetic dye added for appearance.",
            ),
            (
                r"\b(?:aspartame|sucralose|saccharin|acesulfame(?: k| potassium)?)\b",
                "Sweetener",
                "Sweeteners",
                RiskLevel::Medium,
                "Non-nutritive sweetener.",
            ),
            (
                r"\b(?:soy lecithin|sunflower lecithin|lecithin|mono- and diglycerides|polysorbate \d{2})\b",
                "Emulsifier",
                "Emulsifiers",
                RiskLevel::Low,
                "Keeps oil and water phases mixed.",
            ),
            (
                r"\be\d{3,4}[a-f]?\b",
                "Additive",
                "Additives",
                RiskLevel::Unknown,
                "Coded food additive; function not identified.",
            ),
        ];

        table
            .into_iter()
            .map(|(pattern, function, category, risk, explanation)| AdditivePattern {
                regex: Regex::new(&format!("(?i){}", pattern)).expect("additive regex compiles"),
                function,
                category,
                risk,
                explanation,
            })
            .collect()
    })
}

/// Additives recognized by pattern, deduplicated by name, in order of category.
pub fn extract_additives(text: &str) -> Vec<AdditiveInfo> {
    let mut seen = BTreeSet::new();
    let mut additives = Vec::new();

    for pattern in additive_patterns() {
        for m in pattern.regex.find_iter(text) {
            let name = m.as_str().to_lowercase();
            if seen.insert(name.clone()) {
                additives.push(AdditiveInfo::new(
                    name,
                    pattern.function,
                    pattern.risk,
                    pattern.explanation,
                ));
            }
            if additives.len() >= MAX_ADDITIVES {
                return additives;
            }
        }
    }
    additives
}

fn categories_for(additives: &[AdditiveInfo]) -> Vec<String> {
    let mut categories = Vec::new();
    for pattern in additive_patterns() {
        let present = additives.iter().any(|a| a.function == pattern.function);
        if present && !categories.iter().any(|c| c == pattern.category) {
            categories.push(pattern.category.to_string());
        }
    }
    categories
}

/// Canned alternative-recipe text keyed on processing level.
pub fn canned_recipe(group: ProcessingGroup) -> &'static str {
    if group.is_highly_processed() {
        "This product contains industrial additives. Try making a version with whole ingredients like flour, sugar, and butter."
    } else {
        "This product is minimally processed. You can recreate it using similar fresh ingredients."
    }
}

/// Heuristic enrichment used when the analyzer is unavailable.
pub fn fallback_analysis(text: &str, group: ProcessingGroup) -> SemanticAnalysis {
    let additives = extract_additives(text);
    let functional_categories = categories_for(&additives);
    SemanticAnalysis {
        product_name: FALLBACK_PRODUCT_NAME.to_string(),
        additives,
        nutri_grade: None,
        clean_recipe: canned_recipe(group).to_string(),
        functional_categories,
        estimated_shelf_life: None,
        is_fallback: true,
    }
}
