/// Health, readiness, stats and metrics endpoints
use super::AppState;
use crate::error::ApiError;
use crate::metrics;
use actix_web::{web, HttpResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime: String,
    pub messages_processed: u64,
    pub broker_connected: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_seconds: f64,
    pub messages_processed: u64,
    pub broker_connected: bool,
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let connected = state.stats.broker_connected();

    HttpResponse::Ok().json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" },
        uptime: format!("{:.3?}", state.stats.uptime()),
        messages_processed: state.stats.messages_processed(),
        broker_connected: connected,
    })
}

pub async fn ready(state: web::Data<AppState>) -> HttpResponse {
    if state.stats.broker_connected() {
        HttpResponse::Ok().json(ReadyResponse {
            status: "ready",
            reason: None,
        })
    } else {
        HttpResponse::ServiceUnavailable().json(ReadyResponse {
            status: "not_ready",
            reason: Some("broker_disconnected"),
        })
    }
}

pub async fn stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(StatsResponse {
        uptime_seconds: state.stats.uptime().as_secs_f64(),
        messages_processed: state.stats.messages_processed(),
        broker_connected: state.stats.broker_connected(),
    })
}

pub async fn prometheus_metrics() -> Result<HttpResponse, ApiError> {
    let (content_type, body) = metrics::render().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok().content_type(content_type).body(body))
}
