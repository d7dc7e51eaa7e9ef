//! Top-level request lifecycle: statistics, both diagnosers, ensemble,
//! report, response. Every internal failure is absorbed into a degraded
//! but successful response; only input validation (in the routes layer)
//! can reject a request.

use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::Utc;
use futures::FutureExt;
use log::{error, info, warn};
use shared::{AnalysisResponse, DiagnosisResult, PatientContext, XrayType};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::diagnosis::{ensemble, heuristic};
use crate::imaging;
use crate::inference::{InvokeError, ModelBackend};
use crate::report::ReportGenerator;

/// One pipeline run owns its request exclusively; it is constructed per
/// HTTP call and discarded with the response.
pub struct AnalysisRequest {
    pub image: Vec<u8>,
    pub xray_type: XrayType,
    pub patient: PatientContext,
}

pub struct PipelineCoordinator<B: ModelBackend> {
    config: PipelineConfig,
    backend: B,
    reporter: ReportGenerator,
}

impl<B: ModelBackend> PipelineCoordinator<B> {
    pub fn new(config: PipelineConfig, backend: B, reporter: ReportGenerator) -> Self {
        Self {
            config,
            backend,
            reporter,
        }
    }

    pub async fn run(&self, request: AnalysisRequest) -> AnalysisResponse {
        let request_id = Uuid::new_v4();
        info!(
            "[{request_id}] analyzing {} radiograph ({} bytes)",
            request.xray_type,
            request.image.len()
        );

        // Stage panics must not break the always-respond contract, so each
        // in-process stage is unwound into its degraded substitute.
        let stats = catch_unwind(AssertUnwindSafe(|| imaging::analyze(&request.image)))
            .unwrap_or_else(|_| {
                error!("[{request_id}] image analysis panicked; using sentinel statistics");
                imaging::sentinel()
            });
        let image_quality = imaging::quality(&stats);

        // The heuristic is a pure in-memory computation; the subprocess is
        // the only stage worth awaiting.
        let heuristic_result = catch_unwind(AssertUnwindSafe(|| {
            heuristic::assess(&stats, &request.patient, request.xray_type)
        }))
        .map_err(|_| error!("[{request_id}] heuristic diagnoser panicked"))
        .ok();
        let model_result = self.invoke_model(request_id, &request).await;

        let diagnosis = ensemble::combine(model_result, heuristic_result);
        info!(
            "[{request_id}] diagnosis from {}: {} finding(s), {:.1}% confidence",
            diagnosis.source_model,
            diagnosis.findings.len(),
            diagnosis.overall_confidence
        );

        let report = self
            .reporter
            .generate(&diagnosis, &request.patient, request.xray_type)
            .await;

        AnalysisResponse {
            diagnosis,
            report: Some(report),
            xray_type: request.xray_type,
            image_stats: stats,
            image_quality,
            analyzed_at: Utc::now(),
        }
    }

    /// Runs the external backend against a scoped temp copy of the image.
    /// The temp file is removed on every exit path, including timeout,
    /// when the `NamedTempFile` drops.
    async fn invoke_model(
        &self,
        request_id: Uuid,
        request: &AnalysisRequest,
    ) -> Option<DiagnosisResult> {
        let mut image_file = match NamedTempFile::new() {
            Ok(file) => file,
            Err(e) => {
                error!("[{request_id}] could not stage image for the backend: {e}");
                return None;
            }
        };
        if let Err(e) = image_file.write_all(&request.image) {
            error!("[{request_id}] could not stage image for the backend: {e}");
            return None;
        }

        let invocation = self.backend.invoke(
            image_file.path(),
            request.xray_type,
            &request.patient,
            self.config.model_timeout,
        );
        match AssertUnwindSafe(invocation).catch_unwind().await {
            Err(_) => {
                error!("[{request_id}] analysis backend panicked");
                None
            }
            Ok(Ok(diagnosis)) => {
                info!(
                    "[{request_id}] analysis backend answered ({})",
                    diagnosis.source_model
                );
                Some(diagnosis)
            }
            Ok(Err(InvokeError::Timeout)) => {
                warn!(
                    "[{request_id}] analysis backend exceeded {:?}; continuing with heuristic only",
                    self.config.model_timeout
                );
                None
            }
            Ok(Err(InvokeError::Backend(detail))) => {
                // Recovered locally, but loud enough for operators to alert
                // on backend health.
                error!("[{request_id}] analysis backend failed: {detail}");
                None
            }
        }
    }
}
