//! ONNX Runtime session settings for locally executed detection models.
//!
//! Carried inside [`ModelSource::Onnx`](super::ModelSource::Onnx), so each
//! model can pick its own device and threading.

use super::errors::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OrtGraphOptimizationLevel {
    DisableAll,
    #[default]
    Level1,
    Level2,
    Level3,
}

/// Execution providers for ONNX Runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum OrtExecutionProvider {
    /// CPU execution provider (always available)
    #[default]
    CPU,
    /// NVIDIA CUDA execution provider; requires the `cuda` feature.
    CUDA {
        /// CUDA device ID (default: 0)
        device_id: Option<i32>,
        /// Memory limit in bytes
        gpu_mem_limit: Option<usize>,
    },
}

/// Session settings of one ONNX layout model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrtSessionConfig {
    /// Intra-op threads; ONNX Runtime decides when unset.
    #[serde(default)]
    pub intra_threads: Option<usize>,
    /// Graph optimization level
    #[serde(default)]
    pub optimization_level: Option<OrtGraphOptimizationLevel>,
    /// Execution providers in order of preference.
    #[serde(default)]
    pub execution_providers: Option<Vec<OrtExecutionProvider>>,
}

impl OrtSessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session settings for a device string: `cpu`, `cuda` or `cuda:N`.
    ///
    /// CUDA devices keep CPU as a fallback provider. Requesting CUDA without
    /// the `cuda` feature fails when the session is created.
    pub fn for_device(device: &str) -> Result<Self, ConfigError> {
        let device = device.trim().to_lowercase();
        if device == "cpu" {
            return Ok(Self::default());
        }
        let device_id = match device.as_str() {
            "cuda" => 0,
            other => other
                .strip_prefix("cuda:")
                .and_then(|id| id.parse::<i32>().ok())
                .ok_or_else(|| ConfigError::InvalidConfig {
                    message: format!("unsupported device '{device}', expected cpu, cuda or cuda:N"),
                })?,
        };
        Ok(Self::default()
            .add_execution_provider(OrtExecutionProvider::CUDA {
                device_id: Some(device_id),
                gpu_mem_limit: None,
            })
            .add_execution_provider(OrtExecutionProvider::CPU))
    }

    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }

    pub fn with_optimization_level(mut self, level: OrtGraphOptimizationLevel) -> Self {
        self.optimization_level = Some(level);
        self
    }

    /// Appends an execution provider; earlier providers take precedence.
    pub fn add_execution_provider(mut self, provider: OrtExecutionProvider) -> Self {
        self.execution_providers
            .get_or_insert_with(Vec::new)
            .push(provider);
        self
    }

    /// Providers in order of preference, CPU when none were set.
    pub fn get_execution_providers(&self) -> Vec<OrtExecutionProvider> {
        self.execution_providers
            .clone()
            .unwrap_or_else(|| vec![OrtExecutionProvider::CPU])
    }

    /// Applies these settings to an ONNX Runtime session builder.
    pub fn apply(
        &self,
        mut builder: ort::session::builder::SessionBuilder,
    ) -> Result<ort::session::builder::SessionBuilder, ort::Error> {
        use ort::session::builder::GraphOptimizationLevel as GOL;

        if let Some(intra) = self.intra_threads {
            builder = builder.with_intra_threads(intra)?;
        }
        if let Some(level) = self.optimization_level {
            let mapped = match level {
                OrtGraphOptimizationLevel::DisableAll => GOL::Disable,
                OrtGraphOptimizationLevel::Level1 => GOL::Level1,
                OrtGraphOptimizationLevel::Level2 => GOL::Level2,
                OrtGraphOptimizationLevel::Level3 => GOL::Level3,
            };
            builder = builder.with_optimization_level(mapped)?;
        }
        if let Some(eps) = &self.execution_providers {
            let providers = build_execution_providers(eps)?;
            if !providers.is_empty() {
                builder = builder.with_execution_providers(providers)?;
            }
        }
        Ok(builder)
    }
}

fn build_execution_providers(
    eps: &[OrtExecutionProvider],
) -> Result<Vec<ort::execution_providers::ExecutionProviderDispatch>, ort::Error> {
    let mut providers = Vec::new();
    for ep in eps {
        match ep {
            OrtExecutionProvider::CPU => {
                providers.push(ort::execution_providers::CPUExecutionProvider::default().build());
            }
            #[cfg(feature = "cuda")]
            OrtExecutionProvider::CUDA {
                device_id,
                gpu_mem_limit,
            } => {
                let mut cuda_provider = ort::execution_providers::CUDAExecutionProvider::default();
                if let Some(id) = device_id {
                    cuda_provider = cuda_provider.with_device_id(*id);
                }
                if let Some(limit) = gpu_mem_limit {
                    cuda_provider = cuda_provider.with_memory_limit(*limit);
                }
                providers.push(cuda_provider.build());
            }
            #[cfg(not(feature = "cuda"))]
            OrtExecutionProvider::CUDA { .. } => {
                return Err(ort::Error::new(
                    "CUDA execution provider requested but cuda feature is not enabled",
                ));
            }
        }
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_provider_is_cpu() {
        let config: OrtSessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.get_execution_providers(), vec![OrtExecutionProvider::CPU]);
        assert_eq!(OrtSessionConfig::for_device("CPU").unwrap(), config);
    }

    #[test]
    fn test_cuda_device_keeps_cpu_fallback() {
        let config = OrtSessionConfig::for_device("cuda:1")
            .unwrap()
            .with_intra_threads(2);
        assert_eq!(
            config.get_execution_providers(),
            vec![
                OrtExecutionProvider::CUDA {
                    device_id: Some(1),
                    gpu_mem_limit: None,
                },
                OrtExecutionProvider::CPU,
            ]
        );
        assert_eq!(config.intra_threads, Some(2));
        assert!(matches!(
            OrtSessionConfig::for_device("cuda").unwrap().get_execution_providers()[0],
            OrtExecutionProvider::CUDA { device_id: Some(0), .. }
        ));
    }

    #[test]
    fn test_unknown_device_rejected() {
        assert!(OrtSessionConfig::for_device("tpu").is_err());
        assert!(OrtSessionConfig::for_device("cuda:x").is_err());
    }
}
