//! Invocation of the primary analysis backend.
//!
//! The backend is an opaque external collaborator: a process given
//! `(image_path, xray_type, patient_json)` that prints one JSON verdict on
//! stdout, or exits non-zero on failure. The invoker enforces a hard
//! deadline; a backend that overruns it is killed, never awaited past the
//! bound.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use shared::{DiagnosisResult, Finding, PatientContext, Severity, XrayType};
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("analysis backend exceeded its deadline")]
    Timeout,
    #[error("analysis backend failure: {0}")]
    Backend(String),
}

/// Strategy seam for the primary analyzer. The coordinator is agnostic to
/// whether the diagnosis comes from a subprocess, a remote service, or an
/// in-process stub (tests use the latter).
pub trait ModelBackend {
    async fn invoke(
        &self,
        image_path: &Path,
        xray_type: XrayType,
        patient: &PatientContext,
        timeout: Duration,
    ) -> Result<DiagnosisResult, InvokeError>;
}

/// Out-of-process backend: spawns the configured command once per request.
#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    program: String,
    base_args: Vec<String>,
}

/// Verdict shape emitted by the analysis backend on stdout: the primary
/// condition plus the full condition -> probability mapping.
#[derive(Debug, Deserialize)]
struct BackendVerdict {
    primary_diagnosis: String,
    #[serde(default)]
    confidence_scores: HashMap<String, f32>,
    overall_confidence: f32,
    #[serde(default)]
    model: Option<String>,
}

impl SubprocessBackend {
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// Splits a configured argv into program + base arguments.
    pub fn from_argv(mut argv: Vec<String>) -> Option<Self> {
        if argv.is_empty() {
            return None;
        }
        let program = argv.remove(0);
        Some(Self::new(program, argv))
    }
}

impl ModelBackend for SubprocessBackend {
    async fn invoke(
        &self,
        image_path: &Path,
        xray_type: XrayType,
        patient: &PatientContext,
        timeout: Duration,
    ) -> Result<DiagnosisResult, InvokeError> {
        let patient_json = serde_json::to_string(patient)
            .map_err(|e| InvokeError::Backend(format!("patient context encoding: {e}")))?;

        debug!(
            "invoking analysis backend {} (deadline {:?})",
            self.program, timeout
        );

        let child = Command::new(&self.program)
            .args(&self.base_args)
            .arg(image_path)
            .arg(xray_type.to_string())
            .arg(patient_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InvokeError::Backend(format!("spawn {}: {e}", self.program)))?;

        // kill_on_drop terminates the child when the timeout drops the
        // wait future, so the deadline also bounds the process lifetime.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(InvokeError::Backend(format!("wait: {e}"))),
            Err(_) => return Err(InvokeError::Timeout),
        };

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InvokeError::Backend(format!(
                "{}: {} {}",
                output.status,
                stdout.trim(),
                stderr.trim()
            )));
        }

        let verdict: BackendVerdict = serde_json::from_slice(&output.stdout)
            .map_err(|e| InvokeError::Backend(format!("malformed backend output: {e}")))?;
        Ok(verdict.into_diagnosis())
    }
}

impl BackendVerdict {
    /// Converts the probability mapping into a ranked finding list. The
    /// highest-probability entry leads; the full mapping is retained for
    /// presentation.
    fn into_diagnosis(self) -> DiagnosisResult {
        let mut findings: Vec<Finding> = self
            .confidence_scores
            .iter()
            .map(|(condition, probability)| Finding {
                condition: condition.clone(),
                confidence: (probability * 100.0).clamp(0.0, 100.0),
                description: format!("Model-assigned probability {probability:.2}"),
                severity: if condition.eq_ignore_ascii_case("normal") {
                    Severity::Normal
                } else {
                    Severity::Moderate
                },
            })
            .collect();
        findings.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if findings.is_empty() {
            findings.push(Finding {
                condition: self.primary_diagnosis.clone(),
                confidence: (self.overall_confidence * 100.0).clamp(0.0, 100.0),
                description: "Primary model diagnosis".to_string(),
                severity: Severity::Moderate,
            });
        }

        let differential_diagnoses = findings
            .first()
            .map(|f| crate::diagnosis::differentials_for(&f.condition))
            .unwrap_or_default();

        DiagnosisResult {
            findings,
            overall_confidence: (self.overall_confidence * 100.0).clamp(0.0, 100.0),
            source_model: self
                .model
                .unwrap_or_else(|| "external-model".to_string()),
            risk_factors: Vec::new(),
            recommendations: Vec::new(),
            differential_diagnoses,
        }
    }
}
