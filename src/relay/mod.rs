//! Request orchestration for image generation

pub mod pipeline;

pub use pipeline::{GenerationPipeline, GenerationRequest, PipelineError};
