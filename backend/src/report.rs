//! Narrative report generation.
//!
//! The external text-completion call is the single long-latency operation
//! in the pipeline. Disabled, timed out and errored calls all resolve to a
//! deterministic template populated from the diagnosis, so the generator
//! never fails and never exceeds its configured deadline.

use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use shared::{DiagnosisResult, GeneratedBy, MedicalReport, PatientContext, XrayType};

use crate::config::PipelineConfig;

pub struct ReportGenerator {
    enabled: bool,
    api_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
enum ReportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("no completion choices returned")]
    EmptyResponse,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl ReportGenerator {
    pub fn new(config: &PipelineConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.report_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            enabled: config.use_external_report_generator,
            api_url: config.report_api_url.clone(),
            api_key: config.report_api_key.clone(),
            model: config.report_model.clone(),
            timeout: config.report_timeout,
            client,
        })
    }

    /// Produces a report for the ensembled diagnosis. Performs no network
    /// call when disabled or unconfigured.
    pub async fn generate(
        &self,
        diagnosis: &DiagnosisResult,
        patient: &PatientContext,
        xray_type: XrayType,
    ) -> MedicalReport {
        if !self.enabled {
            debug!("external report generator disabled; using template");
            return fallback_report(diagnosis, xray_type);
        }
        let Some(api_key) = &self.api_key else {
            warn!("external report generator enabled but no credential configured; using template");
            return fallback_report(diagnosis, xray_type);
        };

        let call = self.request_report(api_key, diagnosis, patient, xray_type);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => MedicalReport {
                text,
                generated_by: GeneratedBy::ExternalLlm,
                generated_at: Utc::now(),
            },
            Ok(Err(e)) => {
                warn!("report generation failed ({e}); using template fallback");
                fallback_report(diagnosis, xray_type)
            }
            Err(_) => {
                warn!(
                    "report generation exceeded {:?}; using template fallback",
                    self.timeout
                );
                fallback_report(diagnosis, xray_type)
            }
        }
    }

    async fn request_report(
        &self,
        api_key: &str,
        diagnosis: &DiagnosisResult,
        patient: &PatientContext,
        xray_type: XrayType,
    ) -> Result<String, ReportError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are an experienced radiologist. Write precise, \
                              professional medical reports."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(diagnosis, patient, xray_type),
                },
            ],
            max_tokens: 1000,
            temperature: 0.3,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ReportError::Status(response.status().as_u16()));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ReportError::EmptyResponse)
    }
}

fn build_prompt(
    diagnosis: &DiagnosisResult,
    patient: &PatientContext,
    xray_type: XrayType,
) -> String {
    let findings = diagnosis
        .findings
        .iter()
        .map(|f| format!("- {} ({:.0}% confidence, {}): {}", f.condition, f.confidence, f.severity, f.description))
        .collect::<Vec<_>>()
        .join("\n");
    let patient_json = serde_json::to_string_pretty(patient).unwrap_or_default();
    let differentials = diagnosis.differential_diagnoses.join(", ");

    format!(
        "As a specialist radiologist, review the following AI findings and write a \
         professional medical report.\n\n\
         EXAM TYPE: {exam} X-ray\n\n\
         AI FINDINGS:\n{findings}\n\
         Overall confidence: {confidence:.1}%\n\
         Differential considerations: {differentials}\n\n\
         PATIENT CONTEXT:\n{patient_json}\n\n\
         Structure the report with these sections:\n\
         1. FINDINGS: detailed description of the radiological findings\n\
         2. IMPRESSION: primary diagnosis and differentials\n\
         3. RECOMMENDATIONS: specific clinical guidance\n\
         4. FOLLOW-UP: monitoring plan\n\n\
         Use professional medical language and be specific in the recommendations.",
        exam = xray_type.to_string().to_uppercase(),
        confidence = diagnosis.overall_confidence,
    )
}

/// Deterministic templated report used on every fallback transition.
fn fallback_report(diagnosis: &DiagnosisResult, xray_type: XrayType) -> MedicalReport {
    let primary = diagnosis
        .findings
        .first()
        .map(|f| f.condition.as_str())
        .unwrap_or("Inconclusive");
    let findings = diagnosis
        .findings
        .iter()
        .map(|f| format!("- {} ({:.0}% confidence): {}", f.condition, f.confidence, f.description))
        .collect::<Vec<_>>()
        .join("\n");
    let recommendations = diagnosis
        .recommendations
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}", i + 1, r))
        .collect::<Vec<_>>()
        .join("\n");
    let impression = if diagnosis.differential_diagnoses.is_empty() {
        format!("{primary}.")
    } else {
        format!(
            "{primary}.\nDifferential considerations: {}.",
            diagnosis.differential_diagnoses.join(", ")
        )
    };

    let text = format!(
        "{exam} X-RAY - MEDICAL REPORT\n\n\
         FINDINGS:\nAutomated analysis completed with {confidence:.1}% overall confidence.\n\
         {findings}\n\n\
         IMPRESSION:\n{impression}\n\n\
         RECOMMENDATIONS:\n{recommendations}\n\n\
         NOTE:\nThis report was generated by an automated system and must be \
         interpreted by a qualified physician.",
        exam = xray_type.to_string().to_uppercase(),
        confidence = diagnosis.overall_confidence,
    );

    MedicalReport {
        text,
        generated_by: GeneratedBy::FallbackTemplate,
        generated_at: Utc::now(),
    }
}
