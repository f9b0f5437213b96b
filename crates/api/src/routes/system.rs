//! Operational endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use common::AggregateKind;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: Vec<&'static str>,
}

/// GET /health
pub async fn health(State(hosted): State<Vec<AggregateKind>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        services: hosted.iter().map(AggregateKind::service_name).collect(),
    })
}

/// GET /metrics in the Prometheus text format.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
