//! Error handling for the layout pipeline.

pub mod diagnostics;
pub mod types;

pub use diagnostics::{LayoutWarning, NodeError, WarningKind};
pub use types::{LayoutError, LayoutResult, ProcessingStage, TranscriptionError};
