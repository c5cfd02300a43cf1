//! Scale-aware ONNX layout detector.
//!
//! Runs PicoDet / PP-DocLayout style exports that take the resized image plus
//! `scale_factor` and `im_shape` auxiliary inputs and emit rows of
//! `[class_id, score, x1, y1, x2, y2]` already scaled back to the original
//! image.

use super::{DetectionModel, RawDetection};
use crate::core::LayoutError;
use crate::core::config::{ModelConfig, ModelSource, OrtSessionConfig};
use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::{Array2, Array4};
use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// ImageNet statistics in RGB order.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Default `(height, width)` when the configuration has none.
const DEFAULT_INPUT_SIZE: (u32, u32) = (800, 608);

/// A layout detector backed by an ONNX Runtime session.
pub struct OnnxLayoutModel {
    model_id: String,
    session: Mutex<Session>,
    input_names: Vec<String>,
    input_size: (u32, u32),
    class_names: Vec<String>,
}

impl std::fmt::Debug for OnnxLayoutModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxLayoutModel")
            .field("model_id", &self.model_id)
            .field("input_names", &self.input_names)
            .field("input_size", &self.input_size)
            .field("classes", &self.class_names.len())
            .finish()
    }
}

impl OnnxLayoutModel {
    /// Loads the model described by an ONNX [`ModelConfig`].
    pub fn from_config(config: &ModelConfig) -> Result<Self, LayoutError> {
        let ModelSource::Onnx {
            path,
            input_size,
            session,
        } = &config.source
        else {
            return Err(LayoutError::config_error_detailed(
                format!("model '{}'", config.model_id),
                "not an ONNX model source",
            ));
        };
        Self::load(
            &config.model_id,
            path,
            input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            config.class_names.clone(),
            session,
        )
    }

    /// Loads a model file.
    pub fn load(
        model_id: &str,
        path: &Path,
        input_size: (u32, u32),
        class_names: Vec<String>,
        session_config: &OrtSessionConfig,
    ) -> Result<Self, LayoutError> {
        if !path.exists() {
            return Err(LayoutError::model_unavailable(
                model_id,
                format!("model file not found: {}", path.display()),
            ));
        }
        let unavailable =
            |e: ort::Error| LayoutError::model_unavailable_with_source(model_id, "session", e);

        let builder = Session::builder()
            .and_then(|b| b.with_log_level(LogLevel::Error))
            .map_err(unavailable)?;
        let session = session_config
            .apply(builder)
            .and_then(|b| b.commit_from_file(path))
            .map_err(unavailable)?;

        let input_names = session
            .inputs
            .iter()
            .map(|input| input.name.clone())
            .collect::<Vec<_>>();
        debug!(model_id, ?input_names, "loaded ONNX layout model");

        Ok(Self {
            model_id: model_id.to_string(),
            session: Mutex::new(session),
            input_names,
            input_size,
            class_names,
        })
    }

    /// Resizes and normalizes a page into a `[1, 3, H, W]` BGR tensor.
    fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let (h, w) = self.input_size;
        let resized = imageops::resize(image, w, h, FilterType::Triangle);
        let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            // Paddle exports expect BGR planes.
            for (plane, channel) in [2usize, 1, 0].into_iter().enumerate() {
                let value = pixel[channel] as f32 / 255.0;
                tensor[[0, plane, y as usize, x as usize]] =
                    (value - MEAN[channel]) / STD[channel];
            }
        }
        tensor
    }

    fn decode(&self, shape: &[i64], data: &[f32]) -> Result<Vec<RawDetection>, LayoutError> {
        let width = shape.last().copied().unwrap_or(0);
        if width < 6 {
            return Err(LayoutError::model_unavailable(
                &self.model_id,
                format!("unexpected output shape {shape:?}"),
            ));
        }
        let width = width as usize;
        let detections = data
            .chunks_exact(width)
            .filter(|row| row[0] >= 0.0)
            .filter_map(|row| {
                let label = self.class_names.get(row[0] as usize)?;
                Some(RawDetection::new(
                    label.clone(),
                    row[1],
                    [row[2], row[3], row[4], row[5]],
                ))
            })
            .collect();
        Ok(detections)
    }
}

impl DetectionModel for OnnxLayoutModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn infer(&self, image: &RgbImage) -> Result<Vec<RawDetection>, LayoutError> {
        let (h, w) = self.input_size;
        let tensor = self.preprocess(image);
        let scale_factor = Array2::from_shape_vec(
            (1, 2),
            vec![
                h as f32 / image.height().max(1) as f32,
                w as f32 / image.width().max(1) as f32,
            ],
        )?;
        let im_shape = Array2::from_shape_vec((1, 2), vec![h as f32, w as f32])?;

        let mut inputs = Vec::with_capacity(self.input_names.len());
        for name in &self.input_names {
            let value = match name.as_str() {
                "scale_factor" => TensorRef::from_array_view(scale_factor.view())?,
                "im_shape" => TensorRef::from_array_view(im_shape.view())?,
                _ => TensorRef::from_array_view(tensor.view())?,
            };
            inputs.push((name.as_str(), value));
        }

        let mut session = self.session.lock().map_err(|_| {
            LayoutError::model_unavailable(&self.model_id, "session lock poisoned")
        })?;
        let outputs = session.run(inputs)?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        self.decode(&shape[..], data)
    }
}
