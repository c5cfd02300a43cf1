//! Whole-pipeline configuration.

use crate::attach::AttachConfig;
use crate::core::config::{
    ConfigError, ConfigValidator, ModelConfig, ModelSource, OrtSessionConfig, ParallelPolicy,
    validate_unique_model_ids,
};
use crate::core::LayoutError;
use crate::detection::DetectionConfig;
use crate::merge::MergeConfig;
use crate::ordering::OrderingConfig;
use crate::structure::StructureConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of every stage plus the detection models to run.
///
/// Every field except `models` falls back to its default when omitted from a
/// configuration file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub ordering: OrderingConfig,
    #[serde(default)]
    pub structure: StructureConfig,
    #[serde(default)]
    pub attach: AttachConfig,
    #[serde(default)]
    pub parallel: ParallelPolicy,
}

impl PipelineConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LayoutError::config_error_detailed(
                format!("reading '{}'", path.display()),
                e.to_string(),
            )
        })?;
        serde_json::from_str(&content).map_err(|e| {
            LayoutError::config_error_detailed(
                format!("parsing '{}'", path.display()),
                e.to_string(),
            )
        })
    }

    /// Writes the configuration as pretty JSON.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), LayoutError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.models.push(model);
        self
    }

    pub fn with_detection(mut self, config: DetectionConfig) -> Self {
        self.detection = config;
        self
    }

    pub fn with_merge(mut self, config: MergeConfig) -> Self {
        self.merge = config;
        self
    }

    pub fn with_ordering(mut self, config: OrderingConfig) -> Self {
        self.ordering = config;
        self
    }

    pub fn with_structure(mut self, config: StructureConfig) -> Self {
        self.structure = config;
        self
    }

    pub fn with_attach(mut self, config: AttachConfig) -> Self {
        self.attach = config;
        self
    }

    pub fn with_parallel(mut self, policy: ParallelPolicy) -> Self {
        self.parallel = policy;
        self
    }

    /// Runs every ONNX model on `device` (`cpu`, `cuda` or `cuda:N`).
    ///
    /// Replaces the models' execution providers; thread and optimization
    /// settings are kept.
    pub fn with_device(mut self, device: &str) -> Result<Self, ConfigError> {
        let providers = OrtSessionConfig::for_device(device)?.execution_providers;
        for model in &mut self.models {
            if let ModelSource::Onnx { session, .. } = &mut model.source {
                session.execution_providers = providers.clone();
            }
        }
        Ok(self)
    }

    /// Validates every stage configuration except the models themselves.
    pub(crate) fn validate_stages(&self) -> Result<(), ConfigError> {
        validate_unique_model_ids(&self.models)?;
        self.detection.validate()?;
        self.merge.validate()?;
        self.ordering.validate()?;
        self.structure.validate()?;
        self.attach.validate()?;
        if self.parallel.max_workers == Some(0) {
            return Err(ConfigError::ValidationFailed {
                message: "parallel.max_workers must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl ConfigValidator for PipelineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "no detection model configured".to_string(),
            });
        }
        for model in &self.models {
            model.validate()?;
        }
        self.validate_stages()
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::OrtExecutionProvider;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{
                "models": [{
                    "model_id": "remote",
                    "source": {"type": "http", "endpoint": "http://localhost:9000/detect"},
                    "label_map": {"text": "paragraph", "table": "table"}
                }],
                "merge": {"iou_threshold": 0.6}
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.models.len(), 1);
        assert!(matches!(config.models[0].source, ModelSource::Http { .. }));
        assert!((config.merge.iou_threshold - 0.6).abs() < 1e-6);
        assert_eq!(config.merge.overlap_tolerance, MergeConfig::default().overlap_tolerance);
        assert_eq!(config.detection.timeout_ms, Some(30_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let config = PipelineConfig::default()
            .with_model(ModelConfig::http("remote", "http://localhost:9000/detect"))
            .with_attach(AttachConfig::default().with_embed_figures(true));
        config.to_json_file(&path).unwrap();
        assert_eq!(PipelineConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(PipelineConfig::default().validate().is_err());

        let model = ModelConfig::http("remote", "http://localhost:9000/detect");
        let config = PipelineConfig::default()
            .with_model(model.clone())
            .with_model(model.clone());
        assert!(config.validate().is_err());

        let config = PipelineConfig::default()
            .with_model(model)
            .with_merge(MergeConfig::default().with_iou_threshold(1.5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_applies_to_onnx_models_only() {
        let config = PipelineConfig::default()
            .with_model(ModelConfig::picodet_layout_1x("models/layout.onnx"))
            .with_model(ModelConfig::http("remote", "http://localhost:9000/detect"))
            .with_device("cuda:0")
            .unwrap();
        let ModelSource::Onnx { session, .. } = &config.models[0].source else {
            panic!("expected an ONNX source");
        };
        assert_eq!(session.get_execution_providers().len(), 2);
        assert!(matches!(
            session.get_execution_providers()[0],
            OrtExecutionProvider::CUDA { device_id: Some(0), .. }
        ));
        assert!(matches!(config.models[1].source, ModelSource::Http { .. }));
        assert!(PipelineConfig::default().with_device("gpu").is_err());
    }

    #[test]
    fn test_unreadable_file_is_config_error() {
        let err = PipelineConfig::from_json_file("/no/such/pipeline.json").unwrap_err();
        assert!(matches!(err, LayoutError::ConfigError { .. }));
    }
}
