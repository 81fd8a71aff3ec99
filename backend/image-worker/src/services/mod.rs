//! Image fetching, operations and command dispatch

pub mod fetcher;
pub mod geometry;
pub mod operations;
pub mod processor;

pub use fetcher::{FetchError, HttpImageFetcher, ImageFetcher};
pub use operations::{OperationError, OperationOutput};
pub use processor::{
    CommandProcessor, DryRunProcessor, ErrorKind, ImageCommandProcessor, ProcessError,
    ProcessingContext, ProcessingFailure,
};
