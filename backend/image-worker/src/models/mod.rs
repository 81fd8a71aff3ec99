//! Command model shared by the decoder, the processor and the HTTP boundary

mod command;
mod result;

pub use command::{
    AnalyzeParams, Command, CommandType, CropParams, FilterParams, Operation,
    RemoveBackgroundParams, ResizeParams, TransformParams,
};
pub use result::ProcessingResult;
