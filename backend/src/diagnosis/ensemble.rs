//! Confidence-weighted combination of the model-based and heuristic
//! diagnoses. The weighting favors the model signal while letting the
//! deterministic heuristic anchor plausibility.

use log::error;
use shared::{DiagnosisResult, Finding, Severity};

use super::{dedupe_preserving_order, differentials_for};

pub const MODEL_WEIGHT: f32 = 0.6;
pub const HEURISTIC_WEIGHT: f32 = 0.4;

const FALLBACK_CONFIDENCE: f32 = 60.0;
pub const FALLBACK_SOURCE: &str = "fallback";

/// Merges whatever diagnosis sources succeeded into one result.
///
/// One-sided input passes through unchanged; two-sided input is merged;
/// no input at all yields the last-line-of-defense fallback result. This
/// function never fails.
pub fn combine(
    primary: Option<DiagnosisResult>,
    heuristic: Option<DiagnosisResult>,
) -> DiagnosisResult {
    match (primary, heuristic) {
        (Some(primary), Some(heuristic)) => merge(primary, heuristic),
        (Some(primary), None) => primary,
        (None, Some(heuristic)) => heuristic,
        (None, None) => {
            error!("all diagnosis sources failed; returning fallback analysis");
            fallback_result()
        }
    }
}

fn merge(primary: DiagnosisResult, heuristic: DiagnosisResult) -> DiagnosisResult {
    let mut findings: Vec<Finding> = Vec::new();
    for finding in primary
        .findings
        .into_iter()
        .chain(heuristic.findings.into_iter())
    {
        match findings
            .iter_mut()
            .find(|f| f.condition == finding.condition)
        {
            Some(existing) => {
                if finding.confidence > existing.confidence {
                    *existing = finding;
                }
            }
            None => findings.push(finding),
        }
    }
    findings.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let overall_confidence = primary.overall_confidence * MODEL_WEIGHT
        + heuristic.overall_confidence * HEURISTIC_WEIGHT;

    let mut risk_factors = primary.risk_factors;
    risk_factors.extend(heuristic.risk_factors);
    let mut recommendations = primary.recommendations;
    recommendations.extend(heuristic.recommendations);

    // Re-key the differentials on the merged primary finding; the merge
    // may have promoted a different condition to the top.
    let differential_diagnoses = findings
        .first()
        .map(|f| differentials_for(&f.condition))
        .unwrap_or_default();

    DiagnosisResult {
        findings,
        overall_confidence,
        source_model: format!("{}+{}", primary.source_model, heuristic.source_model),
        risk_factors: dedupe_preserving_order(risk_factors),
        recommendations: dedupe_preserving_order(recommendations),
        differential_diagnoses,
    }
}

/// Degraded-but-successful result used when both diagnosers failed.
pub fn fallback_result() -> DiagnosisResult {
    DiagnosisResult {
        findings: vec![Finding {
            condition: "Basic Analysis".to_string(),
            confidence: FALLBACK_CONFIDENCE,
            description: "Automated analysis was unavailable; only a basic assessment \
                          could be performed."
                .to_string(),
            severity: Severity::Minor,
        }],
        overall_confidence: FALLBACK_CONFIDENCE,
        source_model: FALLBACK_SOURCE.to_string(),
        risk_factors: Vec::new(),
        recommendations: vec![
            "Seek clinical evaluation for a definitive diagnosis".to_string(),
        ],
        differential_diagnoses: differentials_for("Basic Analysis"),
    }
}
