//! Binary wire schema for image commands
//!
//! Message definitions are maintained by hand with `prost` derives; field tags
//! must stay stable because producers in other services encode against them.

use crate::models::{
    AnalyzeParams, Command, CommandType, CropParams, FilterParams, Operation,
    RemoveBackgroundParams, ResizeParams, TransformParams,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProtoCommandType {
    Unspecified = 0,
    Resize = 1,
    Filter = 2,
    Transform = 3,
    Analyze = 4,
    Crop = 5,
    RemoveBackground = 6,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImageCommand {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(enumeration = "ProtoCommandType", tag = "2")]
    pub command: i32,
    #[prost(string, tag = "3")]
    pub image_url: String,
    #[prost(oneof = "image_command::Parameters", tags = "4, 5, 6, 7, 8, 9")]
    pub parameters: Option<image_command::Parameters>,
}

pub mod image_command {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Parameters {
        #[prost(message, tag = "4")]
        Resize(super::ResizeParameters),
        #[prost(message, tag = "5")]
        Filter(super::FilterParameters),
        #[prost(message, tag = "6")]
        Transform(super::TransformParameters),
        #[prost(message, tag = "7")]
        Analyze(super::AnalyzeParameters),
        #[prost(message, tag = "8")]
        Crop(super::CropParameters),
        #[prost(message, tag = "9")]
        RemoveBackground(super::RemoveBackgroundParameters),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResizeParameters {
    #[prost(int32, tag = "1")]
    pub width: i32,
    #[prost(int32, tag = "2")]
    pub height: i32,
    #[prost(bool, tag = "3")]
    pub maintain_aspect_ratio: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FilterParameters {
    #[prost(string, tag = "1")]
    pub filter_type: String,
    #[prost(double, tag = "2")]
    pub intensity: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransformParameters {
    #[prost(double, tag = "1")]
    pub rotation_degrees: f64,
    #[prost(bool, tag = "2")]
    pub flip_horizontal: bool,
    #[prost(bool, tag = "3")]
    pub flip_vertical: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AnalyzeParameters {
    #[prost(string, repeated, tag = "1")]
    pub models: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CropParameters {
    #[prost(int32, tag = "1")]
    pub x: i32,
    #[prost(int32, tag = "2")]
    pub y: i32,
    #[prost(int32, tag = "3")]
    pub width: i32,
    #[prost(int32, tag = "4")]
    pub height: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoveBackgroundParameters {
    #[prost(string, tag = "1")]
    pub output_format: String,
    #[prost(bool, tag = "2")]
    pub high_quality: bool,
}

impl From<ProtoCommandType> for CommandType {
    fn from(value: ProtoCommandType) -> Self {
        match value {
            ProtoCommandType::Unspecified => CommandType::Unspecified,
            ProtoCommandType::Resize => CommandType::Resize,
            ProtoCommandType::Filter => CommandType::Filter,
            ProtoCommandType::Transform => CommandType::Transform,
            ProtoCommandType::Analyze => CommandType::Analyze,
            ProtoCommandType::Crop => CommandType::Crop,
            ProtoCommandType::RemoveBackground => CommandType::RemoveBackground,
        }
    }
}

impl From<CommandType> for ProtoCommandType {
    fn from(value: CommandType) -> Self {
        match value {
            CommandType::Unspecified => ProtoCommandType::Unspecified,
            CommandType::Resize => ProtoCommandType::Resize,
            CommandType::Filter => ProtoCommandType::Filter,
            CommandType::Transform => ProtoCommandType::Transform,
            CommandType::Analyze => ProtoCommandType::Analyze,
            CommandType::Crop => ProtoCommandType::Crop,
            CommandType::RemoveBackground => ProtoCommandType::RemoveBackground,
        }
    }
}

impl From<ImageCommand> for Command {
    /// A oneof variant that disagrees with the declared command type is
    /// dropped, leaving the operation without parameters.
    fn from(message: ImageCommand) -> Self {
        use image_command::Parameters as P;

        let command_type: CommandType = ProtoCommandType::try_from(message.command)
            .unwrap_or(ProtoCommandType::Unspecified)
            .into();

        let operation = match (command_type, message.parameters) {
            (CommandType::Resize, Some(P::Resize(p))) => Operation::Resize(Some(ResizeParams {
                width: p.width,
                height: p.height,
                maintain_aspect_ratio: p.maintain_aspect_ratio,
            })),
            (CommandType::Resize, _) => Operation::Resize(None),
            (CommandType::Filter, Some(P::Filter(p))) => Operation::Filter(Some(FilterParams {
                filter_type: p.filter_type,
                intensity: p.intensity,
            })),
            (CommandType::Filter, _) => Operation::Filter(None),
            (CommandType::Transform, Some(P::Transform(p))) => {
                Operation::Transform(Some(TransformParams {
                    rotation_degrees: p.rotation_degrees,
                    flip_horizontal: p.flip_horizontal,
                    flip_vertical: p.flip_vertical,
                }))
            }
            (CommandType::Transform, _) => Operation::Transform(None),
            (CommandType::Analyze, Some(P::Analyze(p))) => {
                Operation::Analyze(Some(AnalyzeParams { models: p.models }))
            }
            (CommandType::Analyze, _) => Operation::Analyze(None),
            (CommandType::Crop, Some(P::Crop(p))) => Operation::Crop(Some(CropParams {
                x: p.x,
                y: p.y,
                width: p.width,
                height: p.height,
            })),
            (CommandType::Crop, _) => Operation::Crop(None),
            (CommandType::RemoveBackground, Some(P::RemoveBackground(p))) => {
                Operation::RemoveBackground(Some(RemoveBackgroundParams {
                    output_format: p.output_format,
                    high_quality: p.high_quality,
                }))
            }
            (CommandType::RemoveBackground, _) => Operation::RemoveBackground(None),
            (CommandType::Unspecified, _) => Operation::Unspecified,
        };

        Command {
            id: message.id,
            image_url: message.image_url,
            operation,
        }
    }
}

impl From<&Command> for ImageCommand {
    fn from(command: &Command) -> Self {
        use image_command::Parameters as P;

        let parameters = match &command.operation {
            Operation::Resize(Some(p)) => Some(P::Resize(ResizeParameters {
                width: p.width,
                height: p.height,
                maintain_aspect_ratio: p.maintain_aspect_ratio,
            })),
            Operation::Filter(Some(p)) => Some(P::Filter(FilterParameters {
                filter_type: p.filter_type.clone(),
                intensity: p.intensity,
            })),
            Operation::Transform(Some(p)) => Some(P::Transform(TransformParameters {
                rotation_degrees: p.rotation_degrees,
                flip_horizontal: p.flip_horizontal,
                flip_vertical: p.flip_vertical,
            })),
            Operation::Analyze(Some(p)) => Some(P::Analyze(AnalyzeParameters {
                models: p.models.clone(),
            })),
            Operation::Crop(Some(p)) => Some(P::Crop(CropParameters {
                x: p.x,
                y: p.y,
                width: p.width,
                height: p.height,
            })),
            Operation::RemoveBackground(Some(p)) => {
                Some(P::RemoveBackground(RemoveBackgroundParameters {
                    output_format: p.output_format.clone(),
                    high_quality: p.high_quality,
                }))
            }
            _ => None,
        };

        ImageCommand {
            id: command.id.clone(),
            command: ProtoCommandType::from(command.command_type()) as i32,
            image_url: command.image_url.clone(),
            parameters,
        }
    }
}
