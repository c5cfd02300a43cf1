//! Configuration types for the layout server and CLI.

use std::path::PathBuf;

/// Where the pipeline and its collaborators come from
#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    /// JSON pipeline configuration; the default layout model when absent.
    pub config_path: Option<PathBuf>,
    pub ocr_endpoint: Option<String>,
    pub describe_endpoint: Option<String>,
    /// Device for ONNX models (cpu, cuda, cuda:N); the configuration's own
    /// session settings when absent.
    pub device: Option<String>,
    /// Overrides `parallel.max_workers` from the configuration.
    pub workers: Option<usize>,
}

/// Configuration for the HTTP server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub pipeline: PipelineOptions,
    pub host: String,
    pub port: u16,
}
