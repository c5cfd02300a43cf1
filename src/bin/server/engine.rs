//! Layout pipeline setup and the response types shared between CLI and server modes.

use crate::config::PipelineOptions;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use oar_layout::domain::Chunk;
use oar_layout::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Model used when no configuration file is given.
pub const DEFAULT_MODEL_PATH: &str = "models/picodet_layout_1x.onnx";

/// Characters per RAG chunk in responses.
pub const DEFAULT_CHUNK_CHARS: usize = 1000;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to download input: {0}")]
    Download(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Body of `POST /api/v1/parse`: exactly one of `url` and `image_base64`.
#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub url: Option<String>,
    pub image_base64: Option<String>,
}

/// Successful parse: the document tree plus its RAG-friendly renderings.
#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub success: bool,
    pub request_id: String,
    pub complete: bool,
    /// Markdown rendering of the whole document.
    pub text: String,
    pub chunks: Vec<Chunk>,
    pub document: Document,
    pub processing_time_ms: f64,
}

impl ParseResponse {
    pub fn new(request_id: String, document: Document, processing_time_ms: f64) -> Self {
        Self {
            success: true,
            request_id,
            complete: document.is_complete(),
            text: document.to_markdown(),
            chunks: document.to_chunks(DEFAULT_CHUNK_CHARS),
            document,
            processing_time_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub request_id: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(request_id: String, error: impl ToString) -> Self {
        Self {
            success: false,
            request_id,
            error: error.to_string(),
        }
    }
}

/// Builds the pipeline from a configuration file, or from the default
/// layout model when none is given.
pub fn build_pipeline(options: &PipelineOptions) -> Result<LayoutPipeline, LayoutError> {
    let mut config = match &options.config_path {
        Some(path) => {
            info!("Loading pipeline configuration from {}", path.display());
            PipelineConfig::from_json_file(path)?
        }
        None => {
            info!("No configuration given, using {}", DEFAULT_MODEL_PATH);
            PipelineConfig::default().with_model(ModelConfig::picodet_layout_1x(DEFAULT_MODEL_PATH))
        }
    };
    if let Some(device) = &options.device {
        config = config.with_device(device)?;
    }
    if options.workers.is_some() {
        config.parallel.max_workers = options.workers;
    }

    let timeout = Duration::from_millis(config.attach.ocr_timeout_ms.unwrap_or(30_000));
    let mut builder = LayoutPipelineBuilder::from_config(config)?;

    if let Some(endpoint) = &options.ocr_endpoint {
        let engine = HttpOcrEngine::new(endpoint.as_str(), timeout)
            .map_err(|e| LayoutError::config_error_detailed("OCR engine", e.to_string()))?;
        builder = builder.with_ocr_engine(Arc::new(engine));
        info!("OCR engine: {}", endpoint);
    }
    if let Some(endpoint) = &options.describe_endpoint {
        let describer = HttpFigureDescriber::new(endpoint.as_str(), timeout)
            .map_err(|e| LayoutError::config_error_detailed("figure describer", e.to_string()))?;
        builder = builder.with_figure_describer(Arc::new(describer));
        info!("Figure describer: {}", endpoint);
    }

    builder.build()
}

/// Download bytes from a URL
pub async fn download_bytes(url: &str) -> Result<Vec<u8>, ServerError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| ServerError::Download(format!("Failed to fetch URL: {}", e)))?;

    if !response.status().is_success() {
        return Err(ServerError::Download(format!(
            "HTTP error: {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ServerError::Download(format!("Failed to read response body: {}", e)))?;

    Ok(bytes.to_vec())
}

/// Resolves a parse request to encoded image bytes.
pub async fn request_bytes(request: ParseRequest) -> Result<Vec<u8>, ServerError> {
    match (request.url, request.image_base64) {
        (Some(url), None) => download_bytes(&url).await,
        (None, Some(encoded)) => STANDARD
            .decode(encoded.trim())
            .map_err(|e| ServerError::BadRequest(format!("image_base64: {}", e))),
        _ => Err(ServerError::BadRequest(
            "exactly one of 'url' and 'image_base64' is required".to_string(),
        )),
    }
}
