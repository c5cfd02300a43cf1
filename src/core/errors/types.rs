//! Core error types for the layout pipeline.
//!
//! This module defines the error taxonomy shared by every pipeline stage:
//! the main [`LayoutError`] enum, the per-node [`TranscriptionError`] and the
//! [`ProcessingStage`] marker used to attribute failures to a stage.

use thiserror::Error;

/// Enum representing the stages of the layout pipeline.
///
/// Used to identify which stage an error or per-node failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Input decoding and validation.
    Input,
    /// Detection model inference and output normalization.
    Detection,
    /// Region clustering and overlap resolution.
    Merge,
    /// Column detection and reading-order assignment.
    ReadingOrder,
    /// Document tree construction.
    Structure,
    /// OCR of leaf nodes.
    TextAttachment,
    /// Figure description.
    FigureDescription,
    /// Page scheduling and document assembly.
    Pipeline,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Input => write!(f, "input validation"),
            ProcessingStage::Detection => write!(f, "detection"),
            ProcessingStage::Merge => write!(f, "region merge"),
            ProcessingStage::ReadingOrder => write!(f, "reading order"),
            ProcessingStage::Structure => write!(f, "structure building"),
            ProcessingStage::TextAttachment => write!(f, "text attachment"),
            ProcessingStage::FigureDescription => write!(f, "figure description"),
            ProcessingStage::Pipeline => write!(f, "pipeline execution"),
        }
    }
}

/// Failure of a single OCR (or figure description) call.
///
/// Never fatal: the text attachment stage records it on the affected node.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranscriptionError {
    /// The call did not finish within the configured deadline.
    #[error("timed out after {after_ms} ms")]
    Timeout {
        /// The deadline that was exceeded.
        after_ms: u64,
    },

    /// The node's crop is empty once clipped to the page.
    #[error("empty crop ({width}x{height})")]
    EmptyCrop {
        /// Crop width in pixels.
        width: u32,
        /// Crop height in pixels.
        height: u32,
    },

    /// The engine reported a failure.
    #[error("engine failure: {reason}")]
    Engine {
        /// Reason reported by the engine.
        reason: String,
    },
}

impl TranscriptionError {
    /// Creates an engine failure from any displayable reason.
    pub fn engine(reason: impl Into<String>) -> Self {
        Self::Engine {
            reason: reason.into(),
        }
    }
}

/// Enum representing the errors that can occur in the layout pipeline.
///
/// Stage-local recoverable conditions are recorded on the smallest affected
/// entity instead of being returned; the variants that do propagate are the
/// page-level (`MalformedInput`, `NoUsableDetections`) and run-level
/// (`ConfigError`, `Cancelled`) conditions.
#[derive(Error, Debug)]
pub enum LayoutError {
    /// A configured detection model could not be loaded or queried.
    #[error("model '{model_id}' unavailable: {reason}")]
    ModelUnavailable {
        /// Identifier of the model from the configuration.
        model_id: String,
        /// Short reason string.
        reason: String,
        /// Underlying source error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An OCR call failed on a node.
    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    /// The page image failed decoding or shape validation.
    #[error("malformed input: {message}")]
    MalformedInput {
        /// A message describing the problem.
        message: String,
    },

    /// Every configured model failed for a page, leaving nothing to work with.
    #[error("page {page_index} has no usable detections: {}", failures.join("; "))]
    NoUsableDetections {
        /// Index of the affected page.
        page_index: usize,
        /// One entry per failed model.
        failures: Vec<String>,
    },

    /// The run was cancelled before this unit of work started.
    #[error("cancelled")]
    Cancelled,

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error occurred while decoding or encoding an image.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor construction.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json")]
    Json(#[from] serde_json::Error),
}

impl From<image::ImageError> for LayoutError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl From<crate::core::config::ConfigError> for LayoutError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::ConfigError {
            message: error.to_string(),
        }
    }
}

impl LayoutError {
    /// Creates a configuration error with context and details.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use oar_layout::core::errors::LayoutError;
    /// let err = LayoutError::config_error_detailed(
    ///     "pipeline builder",
    ///     "no detection model configured",
    /// );
    /// assert!(matches!(err, LayoutError::ConfigError { .. }));
    /// ```
    pub fn config_error_detailed(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigError {
            message: format!("{}: {}", context.into(), details.into()),
        }
    }

    /// Creates a configuration error for a missing required field.
    pub fn missing_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ConfigError {
            message: format!(
                "missing required field '{}' in {}",
                field.into(),
                context.into()
            ),
        }
    }

    /// Creates a configuration error for an invalid field value.
    pub fn invalid_field(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ConfigError {
            message: format!(
                "invalid value for '{}': expected {}, got {}",
                field.into(),
                expected.into(),
                actual.into()
            ),
        }
    }

    /// Creates a model-unavailable error without a source.
    pub fn model_unavailable(model_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            model_id: model_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Creates a model-unavailable error wrapping the underlying failure.
    pub fn model_unavailable_with_source(
        model_id: impl Into<String>,
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ModelUnavailable {
            model_id: model_id.into(),
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a malformed-input error.
    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    /// Wraps an error that occurred inside a pipeline stage.
    pub fn processing_error(
        kind: ProcessingStage,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Returns true when this error only affects a single page.
    pub fn is_page_local(&self) -> bool {
        matches!(
            self,
            Self::MalformedInput { .. }
                | Self::NoUsableDetections { .. }
                | Self::ModelUnavailable { .. }
                | Self::ImageLoad(_)
                | Self::Transcription(_)
        )
    }
}

/// Convenient result alias for the layout pipeline.
pub type LayoutResult<T> = Result<T, LayoutError>;
