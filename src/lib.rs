//! # OAR Layout
//!
//! Structure-aware document layout reconstruction. Turns the raw output of one
//! or more layout detection models into an ordered, hierarchical document tree
//! with OCR text attached, ready for downstream OCR or RAG ingestion.
//!
//! ## Stages
//!
//! Each page runs through five stages, strictly in order:
//!
//! 1. **Detection** ([`detection`]): run the configured models and normalize
//!    their labels and boxes into canonical detections.
//! 2. **Merge** ([`merge`]): cluster overlapping detections and resolve
//!    residual overlaps by label priority.
//! 3. **Reading order** ([`ordering`]): split the page into bands and columns,
//!    nest captions, list items and table cells under their parents.
//! 4. **Structure** ([`structure`]): build the page tree, table grids and
//!    heading levels.
//! 5. **Text attachment** ([`attach`]): OCR every leaf, optionally describe
//!    and embed figures.
//!
//! Pages run in parallel on a dedicated worker pool ([`pipeline`]).
//!
//! ## Modules
//!
//! * [`core`] - Errors, configuration, cancellation and call deadlines
//! * [`domain`] - Detections, regions, the document tree and its exports
//! * [`processors`] - Geometry, union-find, projections and clustering
//! * [`utils`] - Image loading, crops, visualisation and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oar_layout::prelude::*;
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let layout = ModelConfig::picodet_layout_1x("models/picodet_layout_1x.onnx");
//! let config = PipelineConfig::default().with_model(layout);
//!
//! let pipeline = LayoutPipelineBuilder::from_config(config)?
//!     .with_ocr_engine(Arc::new(HttpOcrEngine::new(
//!         "http://localhost:8001/ocr",
//!         Duration::from_secs(30),
//!     )?))
//!     .build()?;
//!
//! let page = load_image(Path::new("page.png"))?;
//! let document = pipeline.process_document("page.png", vec![page])?;
//! println!("{}", document.to_markdown());
//! # Ok(())
//! # }
//! ```

pub mod attach;
pub mod core;
pub mod detection;
pub mod domain;
pub mod merge;
pub mod ordering;
pub mod pipeline;
pub mod processors;
pub mod structure;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use oar_layout::prelude::*;
/// ```
///
/// Covers building and running a pipeline and reading its output. Stage
/// internals (merger, resolver, builders) are imported from their modules.
pub mod prelude {
    pub use crate::attach::{
        AttachConfig, FigureDescriber, HttpFigureDescriber, HttpOcrEngine, OcrEngine,
    };
    pub use crate::core::config::{CoordinateFormat, ModelConfig, ModelSource};
    pub use crate::core::{
        CancellationToken, LayoutError, LayoutResult, LayoutWarning, TranscriptionError,
    };
    pub use crate::detection::{DetectionModel, RawDetection};
    pub use crate::domain::{ClassLabel, Document, DocumentNode, NodeKind};
    pub use crate::pipeline::{LayoutPipeline, LayoutPipelineBuilder, PageResult, PipelineConfig};
    pub use crate::utils::load_image;
}
