//! Detection model configuration.
//!
//! A [`ModelConfig`] describes how one detection model is reached and how its
//! native output is interpreted: which class id means which native label, how
//! native labels map onto [`ClassLabel`], which coordinate convention the
//! boxes use, and the confidence floor below which detections are dropped.

use super::errors::{ConfigError, ConfigValidator};
use super::onnx::OrtSessionConfig;
use crate::domain::ClassLabel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Box convention of a model's raw output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateFormat {
    /// `[x_min, y_min, x_max, y_max]`
    #[default]
    Xyxy,
    /// `[x_min, y_min, width, height]`
    Xywh,
    /// `[center_x, center_y, width, height]`
    Cxcywh,
}

/// Where a detection model runs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSource {
    /// Supplied programmatically; cannot be instantiated from a config file.
    #[default]
    InMemory,
    /// Local ONNX model executed with ONNX Runtime.
    Onnx {
        path: PathBuf,
        /// Fixed `(height, width)` input size.
        #[serde(default)]
        input_size: Option<(u32, u32)>,
        #[serde(default)]
        session: OrtSessionConfig,
    },
    /// Remote model behind a JSON endpoint.
    Http {
        endpoint: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

/// Configuration of a single detection model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Unique model id; part of every region id the model produces.
    pub model_id: String,
    #[serde(default)]
    pub source: ModelSource,
    /// Native label per class index, for models that output class ids.
    #[serde(default)]
    pub class_names: Vec<String>,
    /// Native label to canonical label. Unmapped labels are dropped with a warning.
    pub label_map: BTreeMap<String, ClassLabel>,
    /// Detections scoring below this are discarded.
    /// Default: 0.3
    #[serde(default = "ModelConfig::default_confidence_floor")]
    pub confidence_floor: f32,
    #[serde(default)]
    pub coordinates: CoordinateFormat,
    /// Whether coordinates are fractions of the image size rather than pixels.
    #[serde(default)]
    pub normalized: bool,
}

fn label_map(pairs: &[(&str, ClassLabel)]) -> BTreeMap<String, ClassLabel> {
    pairs
        .iter()
        .map(|(name, label)| (name.to_string(), *label))
        .collect()
}

fn class_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl ModelConfig {
    /// Creates a configuration for a programmatically supplied model.
    pub fn new(model_id: impl Into<String>, label_map: BTreeMap<String, ClassLabel>) -> Self {
        Self {
            model_id: model_id.into(),
            source: ModelSource::InMemory,
            class_names: Vec::new(),
            label_map,
            confidence_floor: Self::default_confidence_floor(),
            coordinates: CoordinateFormat::Xyxy,
            normalized: false,
        }
    }

    /// Identity label map over every canonical label name.
    pub fn canonical_label_map() -> BTreeMap<String, ClassLabel> {
        ClassLabel::ALL
            .into_iter()
            .map(|l| (l.as_str().to_string(), l))
            .collect()
    }

    /// PicoDet layout 1x (5 classes: text, title, list, table, figure).
    pub fn picodet_layout_1x(path: impl Into<PathBuf>) -> Self {
        Self {
            source: ModelSource::Onnx {
                path: path.into(),
                input_size: Some((800, 608)),
                session: OrtSessionConfig::default(),
            },
            class_names: class_names(&["text", "title", "list", "table", "figure"]),
            ..Self::new(
                "picodet_layout_1x",
                label_map(&[
                    ("text", ClassLabel::Paragraph),
                    ("title", ClassLabel::Title),
                    ("list", ClassLabel::ListItem),
                    ("table", ClassLabel::Table),
                    ("figure", ClassLabel::Figure),
                ]),
            )
        }
    }

    /// PP-DocLayout style 17-class layout model.
    ///
    /// `number`, `formula` and `seal` have no canonical counterpart and are
    /// left unmapped.
    pub fn pp_doclayout_17cls(path: impl Into<PathBuf>) -> Self {
        Self {
            source: ModelSource::Onnx {
                path: path.into(),
                input_size: Some((640, 640)),
                session: OrtSessionConfig::default(),
            },
            class_names: class_names(&[
                "paragraph_title",
                "image",
                "text",
                "number",
                "abstract",
                "content",
                "figure_title",
                "formula",
                "table",
                "table_title",
                "reference",
                "doc_title",
                "footnote",
                "header",
                "algorithm",
                "footer",
                "seal",
            ]),
            ..Self::new(
                "pp_doclayout_17cls",
                label_map(&[
                    ("paragraph_title", ClassLabel::Title),
                    ("doc_title", ClassLabel::Title),
                    ("image", ClassLabel::Figure),
                    ("text", ClassLabel::Paragraph),
                    ("abstract", ClassLabel::Paragraph),
                    ("content", ClassLabel::Paragraph),
                    ("reference", ClassLabel::Paragraph),
                    ("footnote", ClassLabel::Paragraph),
                    ("algorithm", ClassLabel::Paragraph),
                    ("figure_title", ClassLabel::Caption),
                    ("table_title", ClassLabel::Caption),
                    ("table", ClassLabel::Table),
                    ("header", ClassLabel::Header),
                    ("footer", ClassLabel::Footer),
                ]),
            )
        }
    }

    /// Single-class table cell detector.
    pub fn table_cells(path: impl Into<PathBuf>) -> Self {
        Self {
            source: ModelSource::Onnx {
                path: path.into(),
                input_size: Some((640, 640)),
                session: OrtSessionConfig::default(),
            },
            class_names: class_names(&["cell"]),
            ..Self::new(
                "table_cells",
                label_map(&[("cell", ClassLabel::TableCell)]),
            )
        }
    }

    /// Remote detector speaking canonical label names.
    pub fn http(model_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            source: ModelSource::Http {
                endpoint: endpoint.into(),
                timeout_ms: None,
            },
            ..Self::new(model_id, Self::canonical_label_map())
        }
    }

    /// Sets the confidence floor.
    pub fn with_confidence_floor(mut self, floor: f32) -> Self {
        self.confidence_floor = floor;
        self
    }

    /// Sets the coordinate convention.
    pub fn with_coordinates(mut self, coordinates: CoordinateFormat, normalized: bool) -> Self {
        self.coordinates = coordinates;
        self.normalized = normalized;
        self
    }

    /// Native label of a class index.
    pub fn class_name(&self, class_id: usize) -> Option<&str> {
        self.class_names.get(class_id).map(String::as_str)
    }

    /// Maps a native label to its canonical label.
    pub fn map_label(&self, native: &str) -> Option<ClassLabel> {
        self.label_map.get(native).copied()
    }

    fn default_confidence_floor() -> f32 {
        0.3
    }
}

impl ConfigValidator for ModelConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model_id.trim().is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "model_id must not be empty".to_string(),
            });
        }
        if self.label_map.is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: format!("model '{}' has an empty label_map", self.model_id),
            });
        }
        self.validate_unit_interval("confidence_floor", self.confidence_floor)?;
        match &self.source {
            ModelSource::InMemory => {}
            ModelSource::Onnx {
                path, input_size, ..
            } => {
                if self.class_names.is_empty() {
                    return Err(ConfigError::InvalidConfig {
                        message: format!(
                            "ONNX model '{}' needs class_names to decode class ids",
                            self.model_id
                        ),
                    });
                }
                if let Some((h, w)) = input_size {
                    if *h == 0 || *w == 0 {
                        return Err(ConfigError::ValidationFailed {
                            message: format!("input_size must be positive, got {h}x{w}"),
                        });
                    }
                }
                self.validate_model_path(path)?;
            }
            ModelSource::Http { endpoint, .. } => {
                if endpoint.trim().is_empty() {
                    return Err(ConfigError::InvalidConfig {
                        message: format!("model '{}' has an empty endpoint", self.model_id),
                    });
                }
            }
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::new("default", Self::canonical_label_map())
    }
}

/// Fails if two models share an id.
pub fn validate_unique_model_ids(models: &[ModelConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for model in models {
        if !seen.insert(model.model_id.as_str()) {
            return Err(ConfigError::InvalidConfig {
                message: format!("duplicate model_id '{}'", model.model_id),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_map_native_labels() {
        let config = ModelConfig::picodet_layout_1x("layout.onnx");
        assert_eq!(config.class_name(2), Some("list"));
        assert_eq!(config.map_label("list"), Some(ClassLabel::ListItem));

        let config = ModelConfig::pp_doclayout_17cls("layout.onnx");
        assert_eq!(config.class_names.len(), 17);
        assert_eq!(config.map_label("figure_title"), Some(ClassLabel::Caption));
        assert_eq!(config.map_label("seal"), None);
    }

    #[test]
    fn test_validation() {
        let config = ModelConfig::new("m", ModelConfig::canonical_label_map());
        assert!(config.validate().is_ok());

        let config = ModelConfig::new("m", BTreeMap::new());
        assert!(config.validate().is_err());

        let config = ModelConfig::new("m", ModelConfig::canonical_label_map())
            .with_confidence_floor(1.5);
        assert!(config.validate().is_err());

        let config = ModelConfig::picodet_layout_1x("/definitely/missing.onnx");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ModelPathNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let a = ModelConfig::new("m", ModelConfig::canonical_label_map());
        let b = a.clone();
        assert!(validate_unique_model_ids(&[a.clone()]).is_ok());
        assert!(validate_unique_model_ids(&[a, b]).is_err());
    }

    #[test]
    fn test_deserialize_http_source() {
        let json = r#"{
            "model_id": "remote",
            "source": {"type": "http", "endpoint": "http://localhost:9000/detect"},
            "label_map": {"text": "paragraph"}
        }"#;
        let config: ModelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.confidence_floor, 0.3);
        assert!(matches!(config.source, ModelSource::Http { .. }));
        assert_eq!(config.map_label("text"), Some(ClassLabel::Paragraph));
    }
}
