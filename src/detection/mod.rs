//! Detection adapter.
//!
//! Wraps one or more detection models behind the [`DetectionModel`] trait and
//! normalizes their native output (class vocabularies, coordinate conventions,
//! score ranges) into canonical [`Detection`] records in page pixels.
//!
//! Models run in parallel. A model that fails or exceeds its deadline is
//! reported as a [`WarningKind::ModelFailed`] warning and the page is flagged
//! incomplete; only when every model fails does the page fail with
//! [`LayoutError::NoUsableDetections`].

mod http;
mod onnx;

pub use http::HttpDetectionModel;
pub use onnx::OnnxLayoutModel;

use crate::core::config::{ConfigError, ConfigValidator, CoordinateFormat, ModelConfig};
use crate::core::{Deadline, LayoutError, LayoutWarning, WarningKind, run_with_timeout};
use crate::domain::{Detection, RegionId};
use crate::processors::BoundingBox;
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A box as emitted by a model, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Native label.
    pub label: String,
    /// Native score; clamped to `[0, 1]` during normalization.
    pub score: f32,
    /// Coordinates in the model's [`CoordinateFormat`].
    pub coords: [f32; 4],
}

impl RawDetection {
    pub fn new(label: impl Into<String>, score: f32, coords: [f32; 4]) -> Self {
        Self {
            label: label.into(),
            score,
            coords,
        }
    }
}

/// A detection model collaborator.
///
/// Implementations return boxes in their native convention; the adapter owns
/// all normalization.
pub trait DetectionModel: Send + Sync {
    /// Identifier used in logs and error messages.
    fn model_id(&self) -> &str;

    /// Runs the model on one page image.
    fn infer(&self, image: &RgbImage) -> Result<Vec<RawDetection>, LayoutError>;
}

/// Configuration of the detection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Deadline per model call in milliseconds; `None` disables it.
    /// Default: Some(30000)
    #[serde(default = "DetectionConfig::default_timeout_ms")]
    pub timeout_ms: Option<u64>,
}

impl DetectionConfig {
    fn default_timeout_ms() -> Option<u64> {
        Some(30_000)
    }

    /// Sets the per-call deadline.
    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl ConfigValidator for DetectionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ValidationFailed {
                message: "detection timeout_ms must be positive".to_string(),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Detections of one page plus what went wrong producing them.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    /// Canonical detections, grouped by model in configuration order.
    pub detections: Vec<Detection>,
    pub warnings: Vec<LayoutWarning>,
    /// Ids of models that failed on this page.
    pub failed_models: Vec<String>,
    /// False when at least one model failed.
    pub complete: bool,
}

struct ModelSlot {
    model: Arc<dyn DetectionModel>,
    config: ModelConfig,
}

/// Runs the configured models and normalizes their output.
pub struct DetectionAdapter {
    models: Vec<ModelSlot>,
    config: DetectionConfig,
}

impl std::fmt::Debug for DetectionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionAdapter")
            .field(
                "models",
                &self
                    .models
                    .iter()
                    .map(|m| m.config.model_id.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}

impl DetectionAdapter {
    /// Creates an adapter over `(model, config)` pairs.
    ///
    /// Fails with a configuration error if no model is given.
    pub fn new(
        models: Vec<(Arc<dyn DetectionModel>, ModelConfig)>,
        config: DetectionConfig,
    ) -> Result<Self, LayoutError> {
        if models.is_empty() {
            return Err(LayoutError::config_error_detailed(
                "detection adapter",
                "no detection model configured",
            ));
        }
        Ok(Self {
            models: models
                .into_iter()
                .map(|(model, config)| ModelSlot { model, config })
                .collect(),
            config,
        })
    }

    /// Number of configured models.
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Detects regions on one page.
    pub fn detect(
        &self,
        image: &Arc<RgbImage>,
        page_index: usize,
    ) -> Result<DetectionOutcome, LayoutError> {
        let timeout = self.config.timeout_ms.map(Duration::from_millis);

        let results: Vec<Result<Vec<RawDetection>, String>> = self
            .models
            .par_iter()
            .map(|slot| call_model(slot, image, timeout))
            .collect();

        let mut outcome = DetectionOutcome {
            complete: true,
            ..Default::default()
        };
        let mut failures = Vec::new();

        for (slot, result) in self.models.iter().zip(results) {
            let model_id = slot.config.model_id.as_str();
            match result {
                Ok(raw) => {
                    debug!(
                        target: "layout",
                        page_index,
                        model_id,
                        raw = raw.len(),
                        "model returned detections"
                    );
                    normalize(
                        &slot.config,
                        raw,
                        image.width(),
                        image.height(),
                        page_index,
                        &mut outcome,
                    );
                }
                Err(reason) => {
                    outcome.warnings.push(LayoutWarning::new(
                        WarningKind::ModelFailed,
                        page_index,
                        format!("model '{model_id}' failed: {reason}"),
                    ));
                    outcome.failed_models.push(model_id.to_string());
                    outcome.complete = false;
                    failures.push(format!("{model_id}: {reason}"));
                }
            }
        }

        if failures.len() == self.models.len() {
            return Err(LayoutError::NoUsableDetections {
                page_index,
                failures,
            });
        }
        Ok(outcome)
    }
}

fn call_model(
    slot: &ModelSlot,
    image: &Arc<RgbImage>,
    timeout: Option<Duration>,
) -> Result<Vec<RawDetection>, String> {
    let model = Arc::clone(&slot.model);
    let image = Arc::clone(image);
    match run_with_timeout(timeout, move || model.infer(&image).map_err(|e| e.to_string())) {
        Deadline::Completed(result) => result,
        Deadline::TimedOut => Err(format!(
            "timed out after {} ms",
            timeout.map(|t| t.as_millis()).unwrap_or_default()
        )),
        Deadline::Panicked => Err("model call panicked".to_string()),
    }
}

/// Converts native coordinates to a pixel-space `(x0, y0, x1, y1)` box.
fn to_pixel_box(
    coords: [f32; 4],
    format: CoordinateFormat,
    normalized: bool,
    width: u32,
    height: u32,
) -> BoundingBox {
    let [a, b, c, d] = if normalized {
        let (w, h) = (width as f32, height as f32);
        [
            coords[0] * w,
            coords[1] * h,
            coords[2] * w,
            coords[3] * h,
        ]
    } else {
        coords
    };
    let bbox = match format {
        CoordinateFormat::Xyxy => BoundingBox::from_coords(a, b, c, d),
        CoordinateFormat::Xywh => BoundingBox::from_xywh(a, b, c, d),
        CoordinateFormat::Cxcywh => BoundingBox::from_xywh(a - c / 2.0, b - d / 2.0, c, d),
    };
    bbox.clamp_to(width as f32, height as f32)
}

fn normalize(
    config: &ModelConfig,
    raw: Vec<RawDetection>,
    width: u32,
    height: u32,
    page_index: usize,
    outcome: &mut DetectionOutcome,
) {
    let model_id = config.model_id.as_str();
    let mut n = 0;

    for det in raw {
        let score = if det.score.is_finite() {
            det.score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if score < config.confidence_floor {
            continue;
        }

        let Some(label) = config.map_label(&det.label) else {
            outcome.warnings.push(LayoutWarning::new(
                WarningKind::UnmappedLabel,
                page_index,
                format!("model '{model_id}' emitted unmapped label '{}'", det.label),
            ));
            continue;
        };

        if det.coords.iter().any(|v| !v.is_finite()) {
            outcome.warnings.push(LayoutWarning::new(
                WarningKind::InvalidBox,
                page_index,
                format!("model '{model_id}' emitted non-finite box {:?}", det.coords),
            ));
            continue;
        }

        let bbox = to_pixel_box(det.coords, config.coordinates, config.normalized, width, height);
        if !bbox.is_valid() {
            outcome.warnings.push(LayoutWarning::new(
                WarningKind::InvalidBox,
                page_index,
                format!(
                    "model '{model_id}' emitted box {:?} with no area inside the page",
                    det.coords
                ),
            ));
            continue;
        }

        outcome.detections.push(Detection::new(
            RegionId::for_detection(page_index, model_id, n),
            bbox,
            label,
            score,
            model_id,
            page_index,
        ));
        n += 1;
    }

    if n == 0 {
        warn!(target: "layout", page_index, model_id, "model produced no usable detections");
    }
}
