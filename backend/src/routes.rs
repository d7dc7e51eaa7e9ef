use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::info;
use serde::Serialize;
use serde_json::json;
use shared::{PatientContext, XrayType};
use std::str::FromStr;

use crate::inference::SubprocessBackend;
use crate::pipeline::{AnalysisRequest, PipelineCoordinator};

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/analyze").route(web::post().to(handle_analyze)))
        .service(web::resource("/api/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Accepts multipart form data: an `image` file field, an optional
/// `patient` JSON field and an optional `xray_type` field. Only input
/// validation can produce an error status; the pipeline itself always
/// answers with a diagnosis.
async fn handle_analyze(
    coordinator: web::Data<PipelineCoordinator<SubprocessBackend>>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut image: Vec<u8> = Vec::new();
    let mut patient = PatientContext::default();
    let mut xray_type = XrayType::default();

    while let Ok(Some(mut field)) = payload.try_next().await {
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .unwrap_or_default()
            .to_string();

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            data.extend_from_slice(&chunk?);
        }

        match name.as_str() {
            "image" => image = data,
            "patient" => match serde_json::from_slice(&data) {
                Ok(ctx) => patient = ctx,
                Err(e) => {
                    return Ok(bad_request(format!("invalid patient context: {e}")));
                }
            },
            "xray_type" => {
                let raw = String::from_utf8_lossy(&data).into_owned();
                match XrayType::from_str(raw.trim()) {
                    Ok(parsed) => xray_type = parsed,
                    Err(_) => {
                        return Ok(bad_request(format!("unsupported x-ray type: {raw}")));
                    }
                }
            }
            other => {
                info!("ignoring unknown multipart field: {other}");
            }
        }
    }

    if image.is_empty() {
        return Ok(bad_request("missing image field".to_string()));
    }

    let response = coordinator
        .run(AnalysisRequest {
            image,
            xray_type,
            patient,
        })
        .await;

    Ok(HttpResponse::Ok().json(response))
}

fn bad_request(error: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse { error })
}
