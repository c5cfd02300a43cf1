//! Remote detection model reached over JSON/HTTP.
//!
//! Request: `{"image_base64": "<png>"}`.
//! Response: `{"detections": [{"label": "...", "score": 0.9, "bbox": [x0, y0, x1, y1]}]}`
//! with boxes in the convention declared by the model's configuration.

use super::{DetectionModel, RawDetection};
use crate::core::LayoutError;
use crate::core::config::{ModelConfig, ModelSource};
use crate::utils::encode_png_base64;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Serialize)]
struct DetectRequest<'a> {
    image_base64: &'a str,
}

#[derive(Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<RemoteDetection>,
}

#[derive(Deserialize)]
struct RemoteDetection {
    label: String,
    score: f32,
    bbox: [f32; 4],
}

/// A detection model served behind an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpDetectionModel {
    model_id: String,
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpDetectionModel {
    /// Creates a client for `endpoint` with a per-request timeout.
    pub fn new(
        model_id: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LayoutError> {
        let model_id = model_id.into();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LayoutError::model_unavailable_with_source(&model_id, "http client", e))?;
        Ok(Self {
            model_id,
            endpoint: endpoint.into(),
            client,
        })
    }

    /// Creates the client described by an HTTP [`ModelConfig`].
    pub fn from_config(config: &ModelConfig) -> Result<Self, LayoutError> {
        let ModelSource::Http {
            endpoint,
            timeout_ms,
        } = &config.source
        else {
            return Err(LayoutError::config_error_detailed(
                format!("model '{}'", config.model_id),
                "not an HTTP model source",
            ));
        };
        Self::new(
            config.model_id.clone(),
            endpoint.clone(),
            Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
        )
    }

    /// Endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl DetectionModel for HttpDetectionModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn infer(&self, image: &RgbImage) -> Result<Vec<RawDetection>, LayoutError> {
        let encoded = encode_png_base64(image)?;
        let unavailable =
            |e: reqwest::Error| LayoutError::model_unavailable_with_source(&self.model_id, "request", e);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&DetectRequest {
                image_base64: &encoded,
            })
            .send()
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(LayoutError::model_unavailable(
                &self.model_id,
                format!("HTTP error: {}", response.status()),
            ));
        }

        let body: DetectResponse = response.json().map_err(unavailable)?;
        Ok(body
            .detections
            .into_iter()
            .map(|d| RawDetection::new(d.label, d.score, d.bbox))
            .collect())
    }
}
