use serde::{Deserialize, Serialize};

/// Outcome record emitted once per processed command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub command_id: String,
    pub success: bool,
    /// Storage-reported address of the artifact; empty when nothing was stored
    pub output_location: String,
    /// Empty on success
    pub error_message: String,
    pub processing_time_ms: i64,
}

impl ProcessingResult {
    pub fn succeeded(command_id: impl Into<String>, output_location: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            success: true,
            output_location: output_location.into(),
            ..Default::default()
        }
    }

    pub fn failed(command_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            success: false,
            error_message: error_message.into(),
            ..Default::default()
        }
    }

    pub fn with_elapsed(mut self, elapsed: std::time::Duration) -> Self {
        self.processing_time_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        self
    }
}
