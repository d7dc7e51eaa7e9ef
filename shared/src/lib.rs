use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Body region of the uploaded radiograph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum XrayType {
    #[default]
    Chest,
    Bone,
    Dental,
    Spine,
    Skull,
    Abdomen,
    Pelvis,
    Extremities,
    General,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlags {
    #[serde(default)]
    pub smoking: bool,
    #[serde(default)]
    pub diabetes: bool,
    #[serde(default)]
    pub hypertension: bool,
}

/// Structured patient context attached to an analysis request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientContext {
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub medical_history: String,
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub risk_flags: RiskFlags,
}

/// Coarse abnormality class derived from brightness/contrast statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AbnormalityClass {
    Consolidation,
    Effusion,
    Hyperinflation,
    Infiltrate,
    Normal,
    Unknown,
}

/// Per-request image statistics, computed once and read-only afterward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImageStatistics {
    pub width: u32,
    pub height: u32,
    /// Mean channel intensity in [0, 255].
    pub avg_brightness: f32,
    /// Normalized intensity range (max - min) / 255 in [0, 1].
    pub contrast: f32,
    pub abnormality_detected: bool,
    pub abnormality_class: AbnormalityClass,
}

/// Diagnostic usability grading of the uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Normal,
    Minor,
    Moderate,
    Severe,
}

/// One candidate diagnosis with a confidence score in [0, 100].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub condition: String,
    pub confidence: f32,
    pub description: String,
    pub severity: Severity,
}

/// Ranked diagnosis produced by one backend or by the ensemble of both.
///
/// `findings` is ordered by descending confidence and never contains two
/// entries with the same `condition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub findings: Vec<Finding>,
    pub overall_confidence: f32,
    pub source_model: String,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
    /// Alternative conditions to weigh against the primary finding.
    #[serde(default)]
    pub differential_diagnoses: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratedBy {
    #[serde(rename = "external-llm")]
    ExternalLlm,
    #[serde(rename = "fallback-template")]
    FallbackTemplate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalReport {
    pub text: String,
    pub generated_by: GeneratedBy,
    pub generated_at: DateTime<Utc>,
}

/// Wire response of the analysis endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub diagnosis: DiagnosisResult,
    pub report: Option<MedicalReport>,
    pub xray_type: XrayType,
    pub image_stats: ImageStatistics,
    pub image_quality: ImageQuality,
    pub analyzed_at: DateTime<Utc>,
}
