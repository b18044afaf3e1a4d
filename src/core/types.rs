//! Core types used throughout the pipeline.
//!
//! This module defines the processing-level classification, the semantic
//! enrichment produced by the analyzer, and the persisted scan record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Ordinal classification of food processing intensity.
///
/// Serialized as its numeric level (1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ProcessingGroup {
    /// Unprocessed or minimally processed food.
    Unprocessed = 1,
    /// Processed culinary ingredient.
    CulinaryIngredient = 2,
    /// Processed food.
    Processed = 3,
    /// Ultra-processed food.
    UltraProcessed = 4,
}

impl ProcessingGroup {
    /// Returns the numeric level (1-4).
    pub fn level(&self) -> u8 {
        *self as u8
    }

    /// Creates a group from a numeric level, if it is in range.
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(Self::Unprocessed),
            2 => Some(Self::CulinaryIngredient),
            3 => Some(Self::Processed),
            4 => Some(Self::UltraProcessed),
            _ => None,
        }
    }

    /// Returns a human-readable description of the group.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unprocessed => "Unprocessed",
            Self::CulinaryIngredient => "Culinary Ingredient",
            Self::Processed => "Processed",
            Self::UltraProcessed => "Ultra-Processed",
        }
    }

    /// Returns `true` for groups 3 and 4.
    pub fn is_highly_processed(&self) -> bool {
        *self >= Self::Processed
    }
}

impl TryFrom<u8> for ProcessingGroup {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_level(i64::from(level))
            .ok_or_else(|| format!("processing group must be 1-4, got {}", level))
    }
}

impl From<ProcessingGroup> for u8 {
    fn from(group: ProcessingGroup) -> Self {
        group.level()
    }
}

impl fmt::Display for ProcessingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.level(), self.description())
    }
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Fully produced by the remote classifier.
    Remote,
    /// Remote fields with the group replaced by the rule-based group.
    Hybrid,
    /// Produced locally by the rule-based fallback.
    Fallback,
}

impl Provenance {
    /// Returns the name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Hybrid => "hybrid",
            Self::Fallback => "fallback",
        }
    }
}

/// Raw OCR output after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    /// Normalized, lower-cased text.
    pub text: String,
    /// Engine confidence in [0, 1].
    pub confidence: f32,
}

/// Rounds a confidence to the two decimals it is stored with.
pub fn round2(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

/// Processing-level classification of an ingredient list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Processing-level group.
    pub group: ProcessingGroup,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Ingredients that drove the classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributing_ingredients: Option<Vec<String>>,
    /// Allergens detected in the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergens: Option<Vec<String>>,
    /// Human-readable reasons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
    /// Where this result came from.
    pub provenance: Provenance,
}

impl ClassificationResult {
    /// Returns the detected allergens, or an empty slice.
    pub fn detected_allergens(&self) -> &[String] {
        self.allergens.as_deref().unwrap_or(&[])
    }

    /// Returns `true` if the result did not come purely from the remote classifier.
    pub fn is_degraded(&self) -> bool {
        self.provenance != Provenance::Remote
    }
}

/// Risk tier of a food additive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
    /// Unknown risk.
    Unknown,
}

impl RiskLevel {
    /// Parses the exact tier names used on the wire.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            "Unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Estimated nutrition letter grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NutriGrade {
    /// Best grade.
    A,
    /// Grade B.
    B,
    /// Grade C.
    C,
    /// Grade D.
    D,
    /// Worst grade.
    E,
}

impl NutriGrade {
    /// Parses a single-letter grade.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "E" => Some(Self::E),
            _ => None,
        }
    }
}

/// An additive found in the ingredient list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveInfo {
    /// Name as it appears in the text.
    pub name: String,
    /// Technological function (e.g. "Thickener").
    pub function: String,
    /// Risk tier.
    pub risk: RiskLevel,
    /// Short explanation.
    pub explanation: String,
}

impl AdditiveInfo {
    /// Creates a new additive entry.
    pub fn new(
        name: impl Into<String>,
        function: impl Into<String>,
        risk: RiskLevel,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            function: function.into(),
            risk,
            explanation: explanation.into(),
        }
    }
}

/// Semantic enrichment of an ingredient list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticAnalysis {
    /// Guessed product name.
    pub product_name: String,
    /// Additives found.
    pub additives: Vec<AdditiveInfo>,
    /// Estimated letter grade, if one was given.
    pub nutri_grade: Option<NutriGrade>,
    /// Alternative home recipe.
    pub clean_recipe: String,
    /// Functional categories present (e.g. "Emulsifiers").
    pub functional_categories: Vec<String>,
    /// Estimated shelf life, if one was given.
    pub estimated_shelf_life: Option<String>,
    /// `true` when produced by the local heuristic rather than the backend.
    #[serde(default)]
    pub is_fallback: bool,
}

/// Unique identifier for a persisted scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanId(pub String);

impl ScanId {
    /// Creates a new random scan id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ScanId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ScanId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A scan record before the repository assigns identity and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScanRecord {
    /// Owner of the scan.
    pub user_id: String,
    /// Display name of the product.
    pub product_name: String,
    /// Normalized OCR text.
    pub raw_text: String,
    /// Processing-level group.
    pub processing_group: ProcessingGroup,
    /// Estimated letter grade.
    pub nutri_grade: Option<NutriGrade>,
    /// Allergens detected in the label.
    pub allergens: Vec<String>,
    /// Additives found.
    pub additives: Vec<AdditiveInfo>,
    /// Alternative home recipe.
    pub clean_recipe: String,
    /// Functional categories present.
    pub functional_categories: Vec<String>,
    /// Estimated shelf life.
    pub estimated_shelf_life: String,
    /// OCR confidence in [0, 1].
    pub ocr_confidence: f32,
    /// Classification confidence in [0, 1].
    pub classification_confidence: f32,
    /// `false` iff a user allergy was detected.
    pub is_safe: bool,
    /// Alert naming the offending allergens.
    pub allergen_alert: Option<String>,
    /// URL of the uploaded label photo.
    pub image_url: Option<String>,
}

/// A persisted scan. Immutable except for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    /// Unique identifier.
    pub id: ScanId,
    /// Owner of the scan.
    pub user_id: String,
    /// Display name of the product.
    pub product_name: String,
    /// Normalized OCR text.
    pub raw_text: String,
    /// Processing-level group.
    pub processing_group: ProcessingGroup,
    /// Estimated letter grade.
    pub nutri_grade: Option<NutriGrade>,
    /// Allergens detected in the label.
    pub allergens: Vec<String>,
    /// Additives found.
    pub additives: Vec<AdditiveInfo>,
    /// Alternative home recipe.
    pub clean_recipe: String,
    /// Functional categories present.
    pub functional_categories: Vec<String>,
    /// Estimated shelf life.
    pub estimated_shelf_life: String,
    /// OCR confidence in [0, 1].
    pub ocr_confidence: f32,
    /// Classification confidence in [0, 1].
    pub classification_confidence: f32,
    /// `false` iff a user allergy was detected.
    pub is_safe: bool,
    /// Alert naming the offending allergens.
    pub allergen_alert: Option<String>,
    /// URL of the uploaded label photo.
    pub image_url: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl ScanRecord {
    /// Materializes a draft with a fresh id and timestamps.
    pub fn from_new(draft: NewScanRecord) -> Self {
        let now = Utc::now();
        Self {
            id: ScanId::new(),
            user_id: draft.user_id,
            product_name: draft.product_name,
            raw_text: draft.raw_text,
            processing_group: draft.processing_group,
            nutri_grade: draft.nutri_grade,
            allergens: draft.allergens,
            additives: draft.additives,
            clean_recipe: draft.clean_recipe,
            functional_categories: draft.functional_categories,
            estimated_shelf_life: draft.estimated_shelf_life,
            ocr_confidence: draft.ocr_confidence,
            classification_confidence: draft.classification_confidence,
            is_safe: draft.is_safe,
            allergen_alert: draft.allergen_alert,
            image_url: draft.image_url,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the list-view projection of this record.
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            id: self.id.clone(),
            product_name: self.product_name.clone(),
            processing_group: self.processing_group,
            image_url: self.image_url.clone(),
            created_at: self.created_at,
        }
    }
}

/// List-view projection of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    /// Unique identifier.
    pub id: ScanId,
    /// Display name of the product.
    pub product_name: String,
    /// Processing-level group.
    pub processing_group: ProcessingGroup,
    /// URL of the uploaded label photo.
    pub image_url: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// A page of a user's scan history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPage {
    /// Scans on this page, newest first.
    pub data: Vec<ScanSummary>,
    /// Total number of scans owned by the user.
    pub total: u64,
    /// 1-based page number.
    pub page: u64,
    /// Page size.
    pub limit: u64,
}

/// Payload of the `scan.created` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCreatedEvent {
    /// Owner of the scan.
    pub user_id: String,
    /// Id of the persisted scan.
    pub scan_id: ScanId,
    /// Whether the product is safe for the user.
    pub is_safe: bool,
}

impl ScanCreatedEvent {
    /// Topic the event is published on.
    pub const TOPIC: &'static str = "scan.created";

    /// Builds the event for a persisted record.
    pub fn for_record(record: &ScanRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            scan_id: record.id.clone(),
            is_safe: record.is_safe,
        }
    }
}
