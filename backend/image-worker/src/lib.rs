//! Image Worker
//!
//! Consumes image commands from Kafka (JSON or protobuf), applies the
//! requested operation and stores the result as PNG. Also exposes health,
//! stats and metrics over HTTP along with an endpoint for publishing commands.

pub mod config;
pub mod error;
pub mod handlers;
pub mod kafka;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;
pub mod shutdown;
pub mod stats;

// Public re-exports
pub use config::Config;
pub use error::ApiError;
pub use models::{Command, CommandType, Operation, ProcessingResult};
pub use stats::ServiceStats;
