//! Configuration types and validation.

pub mod errors;
pub mod model;
pub mod onnx;
pub mod parallel;

pub use errors::{ConfigError, ConfigValidator};
pub use model::{CoordinateFormat, ModelConfig, ModelSource, validate_unique_model_ids};
pub use onnx::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
pub use parallel::ParallelPolicy;
