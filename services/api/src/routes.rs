use crate::infra::{AppState, Backend, InMemoryRecalculationJob};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use fuel_rewards::commission::commission_router;
use fuel_rewards::commission::router::success_response;
use fuel_rewards::config::RecalculationConfig;
use fuel_rewards::error::AppError;
use fuel_rewards::recalculation::CancellationFlag;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub(crate) fn with_commission_routes(
    backend: &Backend,
    recalculation: RecalculationConfig,
) -> axum::Router {
    let job = Arc::new(backend.recalculation_job(recalculation));

    commission_router(Arc::clone(&backend.service))
        .route(
            "/api/v1/commission/recalculate",
            axum::routing::post(recalculate_endpoint),
        )
        .layer(Extension(job))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Run a full recalculation over the stored sales and return the summary.
pub(crate) async fn recalculate_endpoint(
    Extension(job): Extension<Arc<InMemoryRecalculationJob>>,
) -> Result<Response, AppError> {
    info!("recalculation requested over HTTP");
    let summary = job.run(&CancellationFlag::new()).await?;
    Ok(success_response(StatusCode::OK, summary))
}
