//! OCR and figure description services reached over JSON/HTTP.
//!
//! Both speak the same protocol: `{"image_base64": "<png>", "task_prompt": "..."}`
//! in, `{"text": "..."}` out.

use super::{FigureDescriber, OcrEngine};
use crate::core::TranscriptionError;
use crate::utils::encode_png_base64;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prompt sent to vision-language describers for figures.
pub const DETAILED_CAPTION_PROMPT: &str = "<MORE_DETAILED_CAPTION>";
/// Prompt sent to OCR services.
pub const OCR_PROMPT: &str = "<OCR>";

#[derive(Serialize)]
struct ImageRequest<'a> {
    image_base64: &'a str,
    task_prompt: &'a str,
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Debug, Clone)]
struct ImageTextClient {
    endpoint: String,
    task_prompt: String,
    client: reqwest::blocking::Client,
}

impl ImageTextClient {
    fn new(
        endpoint: String,
        task_prompt: String,
        timeout: Duration,
    ) -> Result<Self, TranscriptionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranscriptionError::engine(format!("http client: {e}")))?;
        Ok(Self {
            endpoint,
            task_prompt,
            client,
        })
    }

    fn post(&self, image: &RgbImage) -> Result<String, TranscriptionError> {
        let encoded =
            encode_png_base64(image).map_err(|e| TranscriptionError::engine(e.to_string()))?;
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ImageRequest {
                image_base64: &encoded,
                task_prompt: &self.task_prompt,
            })
            .send()
            .map_err(|e| TranscriptionError::engine(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(TranscriptionError::engine(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body: TextResponse = response
            .json()
            .map_err(|e| TranscriptionError::engine(format!("invalid response: {e}")))?;
        Ok(body.text)
    }
}

/// OCR engine backed by an HTTP service.
#[derive(Debug, Clone)]
pub struct HttpOcrEngine {
    inner: ImageTextClient,
}

impl HttpOcrEngine {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TranscriptionError> {
        Ok(Self {
            inner: ImageTextClient::new(endpoint.into(), OCR_PROMPT.to_string(), timeout)?,
        })
    }

    /// Overrides the task prompt sent with each crop.
    pub fn with_task_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.inner.task_prompt = prompt.into();
        self
    }
}

impl OcrEngine for HttpOcrEngine {
    fn recognize(&self, image: &RgbImage) -> Result<String, TranscriptionError> {
        self.inner.post(image)
    }
}

/// Figure describer backed by an HTTP vision-language service.
#[derive(Debug, Clone)]
pub struct HttpFigureDescriber {
    inner: ImageTextClient,
}

impl HttpFigureDescriber {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TranscriptionError> {
        Ok(Self {
            inner: ImageTextClient::new(
                endpoint.into(),
                DETAILED_CAPTION_PROMPT.to_string(),
                timeout,
            )?,
        })
    }

    pub fn with_task_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.inner.task_prompt = prompt.into();
        self
    }
}

impl FigureDescriber for HttpFigureDescriber {
    fn describe(&self, image: &RgbImage) -> Result<String, TranscriptionError> {
        self.inner.post(image)
    }
}
