mod config;
mod diagnosis;
mod imaging;
mod inference;
mod pipeline;
mod report;
mod routes;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use config::PipelineConfig;
use inference::SubprocessBackend;
use pipeline::PipelineCoordinator;
use report::ReportGenerator;
use routes::configure_routes;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let pipeline_config = PipelineConfig::from_env().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("configuration error: {e}"),
        )
    })?;

    if pipeline_config.use_external_report_generator && pipeline_config.report_api_key.is_none() {
        log::warn!(
            "external report generator enabled without REPORT_API_KEY; reports will use the template fallback"
        );
    }
    log::info!(
        "analysis backend: {} (deadline {:?})",
        pipeline_config.model_command.join(" "),
        pipeline_config.model_timeout
    );

    let backend = SubprocessBackend::from_argv(pipeline_config.model_command.clone())
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "empty analysis backend command")
        })?;
    let reporter = ReportGenerator::new(&pipeline_config).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("report client setup failed: {e}"),
        )
    })?;
    let coordinator = web::Data::new(PipelineCoordinator::new(
        pipeline_config,
        backend,
        reporter,
    ));

    let port = env::var("PORT").unwrap_or_else(|_| "8081".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(coordinator.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
