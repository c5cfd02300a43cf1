//! Core building blocks shared by every stage: configuration, errors,
//! cancellation and call deadlines.

pub mod cancel;
pub mod config;
pub mod errors;
pub mod timeout;

pub use cancel::CancellationToken;
pub use config::{ConfigError, ConfigValidator, ModelConfig, ParallelPolicy};
pub use errors::{
    LayoutError, LayoutResult, LayoutWarning, NodeError, ProcessingStage, TranscriptionError,
    WarningKind,
};
pub use timeout::{Deadline, run_with_timeout};
