//! Deterministic rule-based diagnoser.
//!
//! Pure function over the image statistics and patient context. Each rule
//! emits a fixed confidence (the midpoint of its clinically documented
//! range) so repeated runs over the same input produce the same output.

use shared::{
    AbnormalityClass, DiagnosisResult, Finding, ImageStatistics, PatientContext, Severity,
    XrayType,
};

use super::{dedupe_preserving_order, differentials_for};

pub const SOURCE_NAME: &str = "heuristic-rules";

const TUBERCULOSIS_CONFIDENCE: f32 = 87.0;
const CAVITATION_CONFIDENCE: f32 = 69.5;
const CONSOLIDATION_CONFIDENCE: f32 = 84.5;
const EFFUSION_CONFIDENCE: f32 = 87.0;
const INFILTRATE_CONFIDENCE: f32 = 82.0;
const ALTERATION_CONFIDENCE: f32 = 79.5;
const NORMAL_CONFIDENCE: f32 = 92.0;

const SPECIFIC_CONFIDENCE_BOOST: f32 = 10.0;
const CONFIDENCE_CAP: f32 = 95.0;

const TB_SYMPTOM_KEYWORDS: &[&str] =
    &["cough", "fever", "night sweat", "weight loss", "hemoptysis"];
const TB_HISTORY_KEYWORDS: &[&str] = &["hiv", "diabetes", "immunosuppress"];

/// Conditions specific enough to justify a confidence boost.
const SPECIFIC_CONDITIONS: &[&str] = &["tuberculosis", "pneumonia", "effusion"];

/// Full heuristic assessment: ranked findings plus derived risk factors,
/// recommendations, differentials and the aggregated confidence.
pub fn assess(
    stats: &ImageStatistics,
    patient: &PatientContext,
    xray_type: XrayType,
) -> DiagnosisResult {
    let findings = diagnose(stats, patient);
    let overall_confidence = overall_confidence(&findings);
    let risk_factors = risk_factors(patient);
    let recommendations = recommendations(&findings, patient, xray_type, overall_confidence);
    let differential_diagnoses = findings
        .first()
        .map(|f| differentials_for(&f.condition))
        .unwrap_or_default();

    DiagnosisResult {
        findings,
        overall_confidence,
        source_model: SOURCE_NAME.to_string(),
        risk_factors,
        recommendations,
        differential_diagnoses,
    }
}

/// Rule cascade. First match wins; the tuberculosis rule additionally
/// emits a secondary cavitation finding.
pub fn diagnose(stats: &ImageStatistics, patient: &PatientContext) -> Vec<Finding> {
    if tuberculosis_signals(stats, patient) >= 2 {
        return vec![
            Finding {
                condition: "Pulmonary Tuberculosis".to_string(),
                confidence: TUBERCULOSIS_CONFIDENCE,
                description: "Image pattern, symptoms and risk profile jointly suggest \
                              active pulmonary tuberculosis."
                    .to_string(),
                severity: Severity::Severe,
            },
            Finding {
                condition: "Pulmonary Cavitation".to_string(),
                confidence: CAVITATION_CONFIDENCE,
                description: "Possible cavitary lesions in the upper lung fields, \
                              compatible with post-primary tuberculosis."
                    .to_string(),
                severity: Severity::Moderate,
            },
        ];
    }

    if stats.abnormality_detected {
        return vec![classify_abnormality(stats.abnormality_class)];
    }

    vec![Finding {
        condition: "Normal Chest X-ray".to_string(),
        confidence: NORMAL_CONFIDENCE,
        description: "Lung fields, cardiac silhouette and bony structures within \
                      normal limits."
            .to_string(),
        severity: Severity::Normal,
    }]
}

/// Counts how many of the three independent tuberculosis signals hold.
fn tuberculosis_signals(stats: &ImageStatistics, patient: &PatientContext) -> u32 {
    let image_signal =
        stats.avg_brightness < 60.0 && stats.contrast > 0.4 && stats.abnormality_detected;

    let symptoms = normalize(&patient.symptoms);
    let symptom_signal = TB_SYMPTOM_KEYWORDS.iter().any(|kw| symptoms.contains(kw));

    let history = normalize(&patient.medical_history);
    let risk_signal =
        patient.age > 50 || TB_HISTORY_KEYWORDS.iter().any(|kw| history.contains(kw));

    u32::from(image_signal) + u32::from(symptom_signal) + u32::from(risk_signal)
}

fn classify_abnormality(class: AbnormalityClass) -> Finding {
    let (condition, confidence, description) = match class {
        AbnormalityClass::Consolidation => (
            "Pulmonary Consolidation",
            CONSOLIDATION_CONFIDENCE,
            "Dense opacification consistent with alveolar consolidation.",
        ),
        AbnormalityClass::Effusion => (
            "Pleural Effusion",
            EFFUSION_CONFIDENCE,
            "Homogeneous low-contrast opacity suggesting pleural fluid.",
        ),
        AbnormalityClass::Infiltrate => (
            "Pulmonary Infiltrate",
            INFILTRATE_CONFIDENCE,
            "Patchy high-contrast opacities compatible with an infiltrative process.",
        ),
        AbnormalityClass::Hyperinflation
        | AbnormalityClass::Unknown
        | AbnormalityClass::Normal => (
            "Pulmonary Alteration",
            ALTERATION_CONFIDENCE,
            "Nonspecific radiographic alteration; further characterization advised.",
        ),
    };

    Finding {
        condition: condition.to_string(),
        confidence,
        description: description.to_string(),
        severity: Severity::Moderate,
    }
}

fn risk_factors(patient: &PatientContext) -> Vec<String> {
    let mut factors = Vec::new();
    if patient.age > 65 {
        factors.push("Advanced age: increased risk of degenerative and infectious disease".to_string());
    }
    if patient.risk_flags.smoking {
        factors.push("Smoking history".to_string());
    }
    if patient.risk_flags.diabetes {
        factors.push("Diabetes mellitus: elevated infection and complication risk".to_string());
    }
    if patient.risk_flags.hypertension {
        factors.push("Hypertension".to_string());
    }
    let history = normalize(&patient.medical_history);
    if history.contains("hiv") || history.contains("immunosuppress") {
        factors.push("Immunocompromised status".to_string());
    }
    dedupe_preserving_order(factors)
}

/// Recommendation table keyed by condition, examined body region and the
/// aggregated confidence tier.
fn recommendations(
    findings: &[Finding],
    patient: &PatientContext,
    xray_type: XrayType,
    overall_confidence: f32,
) -> Vec<String> {
    let mut recs = Vec::new();

    for finding in findings {
        match finding.condition.as_str() {
            "Pulmonary Tuberculosis" => {
                recs.push("Sputum smear and culture for acid-fast bacilli".to_string());
                recs.push("Respiratory isolation until tuberculosis is excluded".to_string());
                recs.push("Infectious disease referral".to_string());
            }
            "Pulmonary Cavitation" => {
                recs.push("Chest CT to characterize cavitary lesions".to_string());
            }
            "Pulmonary Consolidation" => {
                recs.push(
                    "Antibiotic workup: complete blood count, CRP and sputum culture".to_string(),
                );
                recs.push("Clinical correlation with respiratory symptoms".to_string());
            }
            "Pleural Effusion" => {
                recs.push("Thoracic ultrasound to quantify the effusion".to_string());
                recs.push("Consider diagnostic thoracentesis".to_string());
            }
            "Pulmonary Infiltrate" => {
                recs.push("Follow-up imaging in 4-6 weeks".to_string());
                recs.push("Correlate with laboratory findings".to_string());
            }
            "Pulmonary Alteration" => {
                recs.push("Complementary imaging (chest CT) recommended".to_string());
            }
            "Normal Chest X-ray" => {
                recs.push("Routine follow-up as clinically indicated".to_string());
            }
            _ => {}
        }
    }

    if overall_confidence > 80.0 {
        recs.push("High diagnostic confidence: proceed per the findings above".to_string());
    } else if overall_confidence > 60.0 {
        recs.push("Moderate diagnostic confidence: correlate with clinical symptoms".to_string());
    } else {
        recs.push("Low diagnostic confidence: consider complementary examinations".to_string());
    }

    match xray_type {
        XrayType::Chest => {
            recs.push("Monitor respiratory symptoms".to_string());
            recs.push("Baseline labs: complete blood count and CRP".to_string());
        }
        XrayType::Bone | XrayType::Extremities => {
            recs.push("Assess mobility and pain level".to_string());
            recs.push("Immobilize until fracture is excluded".to_string());
            recs.push("Orthopedic follow-up".to_string());
        }
        XrayType::Dental => {
            recs.push("Dental specialist referral".to_string());
        }
        _ => {}
    }

    let symptoms = normalize(&patient.symptoms);
    if TB_SYMPTOM_KEYWORDS.iter().any(|kw| symptoms.contains(kw)) {
        recs.push("Correlate findings with reported respiratory symptoms".to_string());
    }
    recs.push("Compare with prior imaging if available".to_string());

    dedupe_preserving_order(recs)
}

/// Mean finding confidence, boosted when a clinically specific condition
/// is present, capped at 95.
fn overall_confidence(findings: &[Finding]) -> f32 {
    if findings.is_empty() {
        return 0.0;
    }
    let mean = findings.iter().map(|f| f.confidence).sum::<f32>() / findings.len() as f32;
    let specific = findings.iter().any(|f| {
        let condition = f.condition.to_lowercase();
        SPECIFIC_CONDITIONS.iter().any(|s| condition.contains(s))
    });
    if specific {
        (mean + SPECIFIC_CONFIDENCE_BOOST).min(CONFIDENCE_CAP)
    } else {
        mean
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase().replace('-', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(
        avg_brightness: f32,
        contrast: f32,
        abnormality_detected: bool,
        abnormality_class: AbnormalityClass,
    ) -> ImageStatistics {
        ImageStatistics {
            width: 512,
            height: 512,
            avg_brightness,
            contrast,
            abnormality_detected,
            abnormality_class,
        }
    }

    #[test]
    fn tuberculosis_rule_fires_on_image_and_symptom_signals() {
        let s = stats(55.0, 0.5, true, AbnormalityClass::Infiltrate);
        let patient = PatientContext {
            symptoms: "persistent fever and productive cough".to_string(),
            ..Default::default()
        };

        let findings = diagnose(&s, &patient);
        assert_eq!(findings[0].condition, "Pulmonary Tuberculosis");
        assert_eq!(findings[0].severity, Severity::Severe);
        assert_eq!(findings[1].condition, "Pulmonary Cavitation");
        assert!(findings[1].confidence < findings[0].confidence);
    }

    #[test]
    fn tuberculosis_rule_fires_on_symptom_and_risk_signals() {
        // Image signal absent (normal stats), but symptoms + age qualify.
        let s = stats(150.0, 0.5, false, AbnormalityClass::Normal);
        let patient = PatientContext {
            age: 67,
            symptoms: "night-sweats and weight-loss".to_string(),
            ..Default::default()
        };

        let findings = diagnose(&s, &patient);
        assert_eq!(findings[0].condition, "Pulmonary Tuberculosis");
    }

    #[test]
    fn single_signal_does_not_trigger_tuberculosis() {
        let s = stats(55.0, 0.5, true, AbnormalityClass::Infiltrate);
        let patient = PatientContext::default();

        let findings = diagnose(&s, &patient);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].condition, "Pulmonary Infiltrate");
    }

    #[test]
    fn normal_stats_emit_single_normal_finding() {
        let s = stats(180.0, 0.5, false, AbnormalityClass::Normal);
        let findings = diagnose(&s, &PatientContext::default());

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].condition, "Normal Chest X-ray");
        assert_eq!(findings[0].severity, Severity::Normal);
    }

    #[test]
    fn abnormality_classes_map_to_expected_conditions() {
        let cases = [
            (AbnormalityClass::Consolidation, "Pulmonary Consolidation"),
            (AbnormalityClass::Effusion, "Pleural Effusion"),
            (AbnormalityClass::Infiltrate, "Pulmonary Infiltrate"),
            (AbnormalityClass::Hyperinflation, "Pulmonary Alteration"),
            (AbnormalityClass::Unknown, "Pulmonary Alteration"),
        ];
        for (class, expected) in cases {
            let s = stats(150.0, 0.5, true, class);
            let findings = diagnose(&s, &PatientContext::default());
            assert_eq!(findings[0].condition, expected);
            assert_eq!(findings[0].severity, Severity::Moderate);
        }
    }

    #[test]
    fn diagnosis_is_deterministic() {
        let s = stats(55.0, 0.5, true, AbnormalityClass::Consolidation);
        let patient = PatientContext {
            age: 70,
            symptoms: "hemoptysis".to_string(),
            ..Default::default()
        };
        let a = assess(&s, &patient, XrayType::Chest);
        let b = assess(&s, &patient, XrayType::Chest);
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn consolidation_carries_antibiotic_workup_recommendation() {
        let s = stats(40.0, 0.1, true, AbnormalityClass::Consolidation);
        let result = assess(&s, &PatientContext::default(), XrayType::Chest);

        assert!(
            result
                .recommendations
                .iter()
                .any(|r| r.to_lowercase().contains("antibiotic workup"))
        );
    }

    #[test]
    fn recommendations_are_deduplicated_in_order() {
        let s = stats(55.0, 0.5, true, AbnormalityClass::Infiltrate);
        let patient = PatientContext {
            age: 80,
            symptoms: "fever, cough, fever".to_string(),
            ..Default::default()
        };
        let result = assess(&s, &patient, XrayType::Chest);

        let mut seen = std::collections::HashSet::new();
        for rec in &result.recommendations {
            assert!(seen.insert(rec.clone()), "duplicate recommendation: {rec}");
        }
    }

    #[test]
    fn risk_factor_table_reflects_flags_and_history() {
        let patient = PatientContext {
            age: 70,
            medical_history: "type 2 diabetes, immunosuppressive therapy".to_string(),
            risk_flags: shared::RiskFlags {
                smoking: true,
                diabetes: true,
                hypertension: false,
            },
            ..Default::default()
        };
        let factors = risk_factors(&patient);

        assert!(factors.iter().any(|f| f.contains("Advanced age")));
        assert!(factors.iter().any(|f| f.contains("Smoking")));
        assert!(factors.iter().any(|f| f.contains("Diabetes")));
        assert!(factors.iter().any(|f| f.contains("Immunocompromised")));
        assert!(!factors.iter().any(|f| f.contains("Hypertension")));
    }

    #[test]
    fn assessment_carries_differentials_for_primary_finding() {
        let s = stats(55.0, 0.5, true, AbnormalityClass::Infiltrate);
        let patient = PatientContext {
            age: 70,
            symptoms: "hemoptysis and fever".to_string(),
            ..Default::default()
        };
        let result = assess(&s, &patient, XrayType::Chest);

        assert_eq!(result.findings[0].condition, "Pulmonary Tuberculosis");
        assert!(
            result
                .differential_diagnoses
                .iter()
                .any(|d| d == "Sarcoidosis")
        );
    }

    #[test]
    fn recommendations_carry_confidence_tier_line() {
        let s = stats(40.0, 0.1, true, AbnormalityClass::Consolidation);
        let high = assess(&s, &PatientContext::default(), XrayType::Chest);
        assert!(high.overall_confidence > 80.0);
        assert!(
            high.recommendations
                .iter()
                .any(|r| r.starts_with("High diagnostic confidence"))
        );

        let alteration = stats(150.0, 0.5, true, AbnormalityClass::Unknown);
        let moderate = assess(&alteration, &PatientContext::default(), XrayType::Chest);
        assert!(moderate.overall_confidence > 60.0 && moderate.overall_confidence <= 80.0);
        assert!(
            moderate
                .recommendations
                .iter()
                .any(|r| r.starts_with("Moderate diagnostic confidence"))
        );
    }

    #[test]
    fn low_confidence_tier_suggests_complementary_exams() {
        let findings = vec![Finding {
            condition: "Pulmonary Alteration".to_string(),
            confidence: 40.0,
            description: String::new(),
            severity: Severity::Minor,
        }];
        let recs = recommendations(&findings, &PatientContext::default(), XrayType::Chest, 40.0);
        assert!(
            recs.iter()
                .any(|r| r.starts_with("Low diagnostic confidence"))
        );
    }

    #[test]
    fn recommendations_are_keyed_by_xray_type() {
        let s = stats(150.0, 0.5, false, AbnormalityClass::Normal);
        let patient = PatientContext::default();

        let chest = assess(&s, &patient, XrayType::Chest);
        assert!(
            chest
                .recommendations
                .iter()
                .any(|r| r.contains("respiratory symptoms"))
        );

        let bone = assess(&s, &patient, XrayType::Bone);
        assert!(
            bone.recommendations
                .iter()
                .any(|r| r.contains("Orthopedic follow-up"))
        );
        assert!(
            !bone
                .recommendations
                .iter()
                .any(|r| r.contains("respiratory"))
        );

        let dental = assess(&s, &patient, XrayType::Dental);
        assert!(
            dental
                .recommendations
                .iter()
                .any(|r| r.contains("Dental specialist referral"))
        );
    }

    #[test]
    fn specific_condition_boost_is_capped_at_95() {
        let findings = vec![Finding {
            condition: "Pleural Effusion".to_string(),
            confidence: 92.0,
            description: String::new(),
            severity: Severity::Moderate,
        }];
        assert_eq!(overall_confidence(&findings), 95.0);
    }

    #[test]
    fn nonspecific_findings_get_plain_mean() {
        let findings = vec![
            Finding {
                condition: "Pulmonary Alteration".to_string(),
                confidence: 80.0,
                description: String::new(),
                severity: Severity::Moderate,
            },
            Finding {
                condition: "Normal Chest X-ray".to_string(),
                confidence: 90.0,
                description: String::new(),
                severity: Severity::Normal,
            },
        ];
        assert_eq!(overall_confidence(&findings), 85.0);
    }
}
