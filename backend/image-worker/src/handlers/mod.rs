//! HTTP boundary
//!
//! Operational endpoints plus `POST /send` for publishing commands.

pub mod commands;
pub mod health;

use crate::error::ApiError;
use crate::kafka::CommandSender;
use crate::stats::ServiceStats;
use actix_web::web;
use std::sync::Arc;
use std::time::Duration;

pub use commands::{send_command, SendCommandRequest, SendCommandResponse};

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub stats: Arc<ServiceStats>,
    pub sender: Option<Arc<dyn CommandSender>>,
    pub send_timeout: Duration,
}

impl AppState {
    pub fn new(
        stats: Arc<ServiceStats>,
        sender: Option<Arc<dyn CommandSender>>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            stats,
            sender,
            send_timeout,
        }
    }
}

/// Malformed bodies get the standard error envelope instead of actix's plain text.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid request body: {}", err)).into()
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health::health))
        .route("/ready", web::get().to(health::ready))
        .route("/stats", web::get().to(health::stats))
        .route("/metrics", web::get().to(health::prometheus_metrics))
        .route("/send", web::post().to(commands::send_command));
}
