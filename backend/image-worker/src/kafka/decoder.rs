//! Dual-format command decoder
//!
//! Payloads are tried against an ordered list of formats built from the
//! preferred one. Decoding has no side effects, so falling back is always safe.

use super::proto::ImageCommand;
use crate::models::Command;
use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Serialization format of command payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Json,
    Protobuf,
}

impl MessageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFormat::Json => "json",
            MessageFormat::Protobuf => "protobuf",
        }
    }

    fn other(&self) -> MessageFormat {
        match self {
            MessageFormat::Json => MessageFormat::Protobuf,
            MessageFormat::Protobuf => MessageFormat::Json,
        }
    }

    fn decode(&self, payload: &[u8]) -> Result<Command, FormatError> {
        match self {
            MessageFormat::Json => decode_json(payload),
            MessageFormat::Protobuf => decode_protobuf(payload),
        }
    }
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(MessageFormat::Json),
            "protobuf" | "proto" => Ok(MessageFormat::Protobuf),
            other => Err(format!("unsupported message format: {}", other)),
        }
    }
}

/// Failure of a single format attempt
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode message: neither format matched ({})", describe(.0))]
    NoFormatMatched(Vec<FormatError>),
}

fn describe(attempts: &[FormatError]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Decoder that tries the preferred format first and the other one second
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    candidates: Vec<MessageFormat>,
}

impl MessageDecoder {
    pub fn new(preferred: MessageFormat) -> Self {
        Self {
            candidates: vec![preferred, preferred.other()],
        }
    }

    pub fn preferred(&self) -> MessageFormat {
        self.candidates[0]
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Command, DecodeError> {
        let mut attempts = Vec::with_capacity(self.candidates.len());

        for format in &self.candidates {
            match format.decode(payload) {
                Ok(command) => return Ok(command),
                Err(e) => attempts.push(e),
            }
        }

        Err(DecodeError::NoFormatMatched(attempts))
    }
}

/// Serialize a command for the producer side
pub fn encode(command: &Command, format: MessageFormat) -> serde_json::Result<Vec<u8>> {
    match format {
        MessageFormat::Json => serde_json::to_vec(&command.to_json()),
        MessageFormat::Protobuf => Ok(ImageCommand::from(command).encode_to_vec()),
    }
}

#[derive(Debug, Deserialize)]
struct LooseCommand {
    #[serde(default)]
    id: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    parameters: Option<Map<String, Value>>,
}

fn decode_json(payload: &[u8]) -> Result<Command, FormatError> {
    let loose: LooseCommand = serde_json::from_slice(payload)?;
    Ok(Command::from_loose_parts(
        loose.id,
        &loose.command,
        loose.image_url,
        loose.parameters.as_ref(),
    ))
}

fn decode_protobuf(payload: &[u8]) -> Result<Command, FormatError> {
    let message = ImageCommand::decode(payload)?;
    Ok(Command::from(message))
}
