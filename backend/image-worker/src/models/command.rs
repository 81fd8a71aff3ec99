//! Typed image-processing commands
//!
//! A [`Command`] pairs a correlation id and a source URL with an [`Operation`].
//! Each operation variant owns its own optional parameter set, so the command
//! type and the active parameters can never disagree.

use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of processing requested by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    Resize,
    Filter,
    Transform,
    Analyze,
    Crop,
    RemoveBackground,
    Unspecified,
}

impl CommandType {
    pub const ALL: [CommandType; 6] = [
        CommandType::Resize,
        CommandType::Filter,
        CommandType::Transform,
        CommandType::Analyze,
        CommandType::Crop,
        CommandType::RemoveBackground,
    ];

    /// Name used in JSON payloads and HTTP requests
    pub fn wire_name(&self) -> &'static str {
        match self {
            CommandType::Resize => "resize",
            CommandType::Filter => "filter",
            CommandType::Transform => "transform",
            CommandType::Analyze => "analyze",
            CommandType::Crop => "crop",
            CommandType::RemoveBackground => "remove_background",
            CommandType::Unspecified => "unspecified",
        }
    }

    /// Label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            CommandType::Resize => "COMMAND_TYPE_RESIZE",
            CommandType::Filter => "COMMAND_TYPE_FILTER",
            CommandType::Transform => "COMMAND_TYPE_TRANSFORM",
            CommandType::Analyze => "COMMAND_TYPE_ANALYZE",
            CommandType::Crop => "COMMAND_TYPE_CROP",
            CommandType::RemoveBackground => "COMMAND_TYPE_REMOVE_BACKGROUND",
            CommandType::Unspecified => "COMMAND_TYPE_UNSPECIFIED",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CommandType {
    type Err = std::convert::Infallible;

    /// Unrecognized names map to `Unspecified`; that is not a parse failure.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "resize" => CommandType::Resize,
            "filter" => CommandType::Filter,
            "transform" => CommandType::Transform,
            "analyze" => CommandType::Analyze,
            "crop" => CommandType::Crop,
            "remove_background" => CommandType::RemoveBackground,
            _ => CommandType::Unspecified,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizeParams {
    pub width: i32,
    pub height: i32,
    pub maintain_aspect_ratio: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterParams {
    /// One of blur, sharpen, grayscale, invert, brightness, contrast, saturation.
    /// Kept as received; unknown names are rejected at dispatch.
    pub filter_type: String,
    pub intensity: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformParams {
    pub rotation_degrees: f64,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CropParams {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeParams {
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveBackgroundParams {
    pub output_format: String,
    pub high_quality: bool,
}

/// Requested operation together with its (possibly absent) parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Resize(Option<ResizeParams>),
    Filter(Option<FilterParams>),
    Transform(Option<TransformParams>),
    Analyze(Option<AnalyzeParams>),
    Crop(Option<CropParams>),
    RemoveBackground(Option<RemoveBackgroundParams>),
    Unspecified,
}

impl Operation {
    pub fn command_type(&self) -> CommandType {
        match self {
            Operation::Resize(_) => CommandType::Resize,
            Operation::Filter(_) => CommandType::Filter,
            Operation::Transform(_) => CommandType::Transform,
            Operation::Analyze(_) => CommandType::Analyze,
            Operation::Crop(_) => CommandType::Crop,
            Operation::RemoveBackground(_) => CommandType::RemoveBackground,
            Operation::Unspecified => CommandType::Unspecified,
        }
    }

    pub fn has_parameters(&self) -> bool {
        match self {
            Operation::Resize(p) => p.is_some(),
            Operation::Filter(p) => p.is_some(),
            Operation::Transform(p) => p.is_some(),
            Operation::Analyze(p) => p.is_some(),
            Operation::Crop(p) => p.is_some(),
            Operation::RemoveBackground(p) => p.is_some(),
            Operation::Unspecified => false,
        }
    }
}

/// A decoded image-processing instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: String,
    pub image_url: String,
    pub operation: Operation,
}

impl Command {
    pub fn new(id: impl Into<String>, image_url: impl Into<String>, operation: Operation) -> Self {
        Self {
            id: id.into(),
            image_url: image_url.into(),
            operation,
        }
    }

    pub fn command_type(&self) -> CommandType {
        self.operation.command_type()
    }

    /// Build a command from a loosely-typed payload.
    ///
    /// Each command branch reads only the keys relevant to its parameter set.
    /// Missing or wrong-typed keys are treated as not provided. When
    /// `parameters` is absent the operation carries no parameters at all.
    pub fn from_loose_parts(
        id: impl Into<String>,
        command: &str,
        image_url: impl Into<String>,
        parameters: Option<&Map<String, Value>>,
    ) -> Self {
        let command_type = command.parse().unwrap_or(CommandType::Unspecified);
        let operation = match command_type {
            CommandType::Resize => Operation::Resize(parameters.map(|p| ResizeParams {
                width: int_param(p, "width").unwrap_or_default(),
                height: int_param(p, "height").unwrap_or_default(),
                maintain_aspect_ratio: bool_param(p, "maintain_aspect_ratio").unwrap_or_default(),
            })),
            CommandType::Filter => Operation::Filter(parameters.map(|p| FilterParams {
                filter_type: str_param(p, "filter_type").unwrap_or_default(),
                intensity: float_param(p, "intensity").unwrap_or_default(),
            })),
            CommandType::Transform => Operation::Transform(parameters.map(|p| TransformParams {
                rotation_degrees: float_param(p, "rotation_degrees").unwrap_or_default(),
                flip_horizontal: bool_param(p, "flip_horizontal").unwrap_or_default(),
                flip_vertical: bool_param(p, "flip_vertical").unwrap_or_default(),
            })),
            CommandType::Analyze => Operation::Analyze(parameters.map(|p| AnalyzeParams {
                models: p
                    .get("models")
                    .and_then(Value::as_array)
                    .map(|models| {
                        models
                            .iter()
                            .filter_map(|m| m.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
            })),
            CommandType::Crop => Operation::Crop(parameters.map(|p| CropParams {
                x: int_param(p, "x").unwrap_or_default(),
                y: int_param(p, "y").unwrap_or_default(),
                width: int_param(p, "width").unwrap_or_default(),
                height: int_param(p, "height").unwrap_or_default(),
            })),
            CommandType::RemoveBackground => {
                Operation::RemoveBackground(parameters.map(|p| RemoveBackgroundParams {
                    output_format: str_param(p, "output_format").unwrap_or_default(),
                    high_quality: bool_param(p, "high_quality").unwrap_or_default(),
                }))
            }
            CommandType::Unspecified => Operation::Unspecified,
        };

        Self {
            id: id.into(),
            image_url: image_url.into(),
            operation,
        }
    }

    /// JSON form read back by [`Command::from_loose_parts`]
    pub fn to_json(&self) -> Value {
        let parameters = match &self.operation {
            Operation::Resize(Some(p)) => Some(json!({
                "width": p.width,
                "height": p.height,
                "maintain_aspect_ratio": p.maintain_aspect_ratio,
            })),
            Operation::Filter(Some(p)) => Some(json!({
                "filter_type": p.filter_type,
                "intensity": p.intensity,
            })),
            Operation::Transform(Some(p)) => Some(json!({
                "rotation_degrees": p.rotation_degrees,
                "flip_horizontal": p.flip_horizontal,
                "flip_vertical": p.flip_vertical,
            })),
            Operation::Analyze(Some(p)) => Some(json!({ "models": p.models })),
            Operation::Crop(Some(p)) => Some(json!({
                "x": p.x,
                "y": p.y,
                "width": p.width,
                "height": p.height,
            })),
            Operation::RemoveBackground(Some(p)) => Some(json!({
                "output_format": p.output_format,
                "high_quality": p.high_quality,
            })),
            _ => None,
        };

        let mut payload = json!({
            "id": self.id,
            "command": self.command_type().wire_name(),
            "image_url": self.image_url,
        });
        if let (Some(parameters), Some(object)) = (parameters, payload.as_object_mut()) {
            object.insert("parameters".to_string(), parameters);
        }
        payload
    }
}

// JSON numbers arrive as floats; integer fields truncate toward zero and
// saturate at the i32 range.
fn int_param(params: &Map<String, Value>, key: &str) -> Option<i32> {
    params.get(key).and_then(Value::as_f64).map(|v| v as i32)
}

fn float_param(params: &Map<String, Value>, key: &str) -> Option<f64> {
    params.get(key).and_then(Value::as_f64)
}

fn bool_param(params: &Map<String, Value>, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}

fn str_param(params: &Map<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(str::to_string)
}
