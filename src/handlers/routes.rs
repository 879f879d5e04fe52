// API route handlers for the dubbing API
//
// Thin HTTP layer over the run manager. Every handler records its latency and
// response status in the metrics, including error responses.

use crate::config::{self, HandlerConfig, PipelineConfig};
use crate::error::HandlerError;
use crate::metrics::Metrics;
use crate::models::{DubbingRequestBody, DubbingResponse, ServiceStatus, StatusResponse};
use crate::run_manager::RunManager;
use actix_web::{delete, get, options, post, web, HttpRequest, HttpResponse, ResponseError};
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Record the request in the metrics and pass the result through
async fn observed(
    metrics: &Metrics,
    method: &str,
    endpoint: &str,
    start_time: Instant,
    result: Result<HttpResponse, HandlerError>,
) -> Result<HttpResponse, HandlerError> {
    let status = match &result {
        Ok(response) => response.status(),
        Err(e) => e.status_code(),
    };
    metrics
        .record_http_request(
            method,
            endpoint,
            status.as_str(),
            start_time.elapsed().as_secs_f64(),
        )
        .await;
    result
}

/// Handler for dubbing requests
///
/// Validates the request, queues a run and answers 202 with the URL to poll.
#[post("/dubbing")]
pub async fn submit_dubbing(
    body: web::Json<DubbingRequestBody>,
    run_manager: web::Data<Arc<RunManager>>,
    pipeline_config: web::Data<Arc<PipelineConfig>>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, HandlerError> {
    let start_time = Instant::now();
    let request = body.into_inner().into_request(&pipeline_config);

    let result = match run_manager.submit(request).await {
        Ok(handle) => {
            let status_url = format!("/dubbing/{}", handle.run_id);
            info!("Run {} accepted", handle.run_id);
            Ok(HttpResponse::Accepted().json(DubbingResponse {
                run_id: handle.run_id,
                status_url,
                queue_position: handle.queue_position,
            }))
        }
        Err(e) => {
            error!("Failed to queue dubbing request: {}", e);
            Err(HandlerError::from(e))
        }
    };

    observed(&metrics, "POST", "/dubbing", start_time, result).await
}

/// Handler for run status requests
///
/// Returns the state, latest progress sample and queue position of a run,
/// plus the transcript and error details once known.
#[get("/dubbing/{run_id}")]
pub async fn dubbing_status(
    run_id: web::Path<String>,
    run_manager: web::Data<Arc<RunManager>>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, HandlerError> {
    let start_time = Instant::now();
    let result = run_manager
        .status(&run_id)
        .map(|run| HttpResponse::Ok().json(StatusResponse { run }))
        .map_err(HandlerError::from);

    observed(&metrics, "GET", "/dubbing/{run_id}", start_time, result).await
}

/// Handler for final results
///
/// Delivers the terminal record of a run and discards it; 409 while the run
/// is still going.
#[get("/dubbing/{run_id}/result")]
pub async fn dubbing_result(
    run_id: web::Path<String>,
    run_manager: web::Data<Arc<RunManager>>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, HandlerError> {
    let start_time = Instant::now();
    let result = run_manager
        .take_result(&run_id)
        .map(|run| HttpResponse::Ok().json(StatusResponse { run }))
        .map_err(HandlerError::from);

    observed(&metrics, "GET", "/dubbing/{run_id}/result", start_time, result).await
}

/// Handler for cancelling a run
#[delete("/dubbing/{run_id}")]
pub async fn cancel_dubbing(
    run_id: web::Path<String>,
    run_manager: web::Data<Arc<RunManager>>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, HandlerError> {
    let start_time = Instant::now();
    let result = match run_manager.cancel(&run_id).await {
        Ok(run) => {
            info!("Cancellation accepted for run {}", run_id);
            Ok(HttpResponse::Ok().json(StatusResponse { run }))
        }
        Err(e) => Err(HandlerError::from(e)),
    };

    observed(&metrics, "DELETE", "/dubbing/{run_id}", start_time, result).await
}

/// Handler for OPTIONS requests to the dubbing endpoint
#[options("/dubbing")]
pub async fn dubbing_options(_req: HttpRequest) -> HttpResponse {
    let allowed_methods = "OPTIONS, POST, GET, DELETE";

    HttpResponse::Ok()
        .append_header(("Allow", allowed_methods))
        .append_header(("Access-Control-Allow-Methods", allowed_methods))
        .append_header((
            "Access-Control-Allow-Headers",
            "Authorization, Content-Type",
        ))
        .append_header(("Access-Control-Max-Age", "86400"))
        .finish()
}

/// API status endpoint
///
/// Server settings and the current queue state.
#[get("/status")]
pub async fn api_status(
    run_manager: web::Data<Arc<RunManager>>,
    handler_config: web::Data<HandlerConfig>,
) -> HttpResponse {
    #[derive(Serialize)]
    struct ApiStatusResponse {
        #[serde(flatten)]
        service: ServiceStatus,
        host: String,
        port: String,
        workers: usize,
        run_retention_hours: u64,
    }

    let (queued_runs, processing) = run_manager.load();
    HttpResponse::Ok().json(ApiStatusResponse {
        service: ServiceStatus {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            queued_runs,
            processing,
            authentication: config::authorization_enabled(),
        },
        host: handler_config.host.clone(),
        port: handler_config.port.clone(),
        workers: handler_config.workers(),
        run_retention_hours: handler_config.run_retention.as_secs() / 3600,
    })
}

/// Metrics endpoint handler
pub async fn metrics_handler(metrics: web::Data<Metrics>) -> HttpResponse {
    match metrics.export().await {
        Ok(data) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(data),
        Err(e) => HttpResponse::InternalServerError()
            .json(format!("Failed to export metrics: {}", e)),
    }
}
