/// Command submission endpoint
use super::AppState;
use crate::error::ApiError;
use crate::metrics;
use crate::models::{Command, CommandType};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Validate)]
pub struct SendCommandRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "id is required"))]
    pub id: String,

    #[serde(default)]
    #[validate(custom(function = "validate_command_name"))]
    pub command: String,

    #[serde(default)]
    #[validate(url(message = "image_url must be a valid URL"))]
    pub image_url: String,

    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendCommandResponse {
    pub success: bool,
    pub message: String,
    pub id: String,
}

fn validate_command_name(command: &str) -> Result<(), ValidationError> {
    let known = CommandType::ALL
        .iter()
        .any(|command_type| command_type.wire_name() == command);

    if known {
        Ok(())
    } else {
        let mut error = ValidationError::new("oneof");
        error.message = Some(
            format!(
                "command must be one of: {}",
                CommandType::ALL.map(|t| t.wire_name()).join(", ")
            )
            .into(),
        );
        Err(error)
    }
}

/// POST /send
pub async fn send_command(
    state: web::Data<AppState>,
    body: web::Json<SendCommandRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    request.validate()?;

    let sender = state.sender.as_ref().ok_or(ApiError::Unavailable)?;

    let command = Command::from_loose_parts(
        request.id,
        &request.command,
        request.image_url,
        request.parameters.as_ref(),
    );

    info!(
        command_id = %command.id,
        command_type = %command.command_type(),
        has_parameters = command.operation.has_parameters(),
        "Sending command"
    );

    match tokio::time::timeout(state.send_timeout, sender.send(&command)).await {
        Ok(Ok(())) => {
            metrics::record_command_sent("success");
            Ok(HttpResponse::Created().json(SendCommandResponse {
                success: true,
                message: "Message sent successfully".to_string(),
                id: command.id,
            }))
        }
        Ok(Err(e)) => {
            metrics::record_command_sent("error");
            warn!(command_id = %command.id, error = %e, "Failed to send command");
            Err(ApiError::Broker(format!("Failed to send message: {}", e)))
        }
        Err(_) => {
            metrics::record_command_sent("timeout");
            warn!(command_id = %command.id, "Timed out sending command");
            Err(ApiError::BrokerTimeout)
        }
    }
}
