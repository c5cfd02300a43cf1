//! Text attachment.
//!
//! Crops every leaf of a page tree out of the page image, hands the crop to
//! an [`OcrEngine`] and binds the result to the node. A failing call only
//! affects its own node: `text` stays `None`, the reason is stored under
//! `attributes.ocr_error` and a [`NodeError`] is reported.
//!
//! An optional [`FigureDescriber`] adds `attributes.description` to figure
//! nodes, and figure crops can be embedded in the output as base64 PNG.

mod http;

pub use http::{HttpFigureDescriber, HttpOcrEngine};

use crate::core::config::{ConfigError, ConfigValidator};
use crate::core::{
    Deadline, NodeError, ProcessingStage, TranscriptionError, run_with_timeout,
};
use crate::domain::{Document, DocumentNode, FigureImage, NodeKind, attr};
use crate::processors::BoundingBox;
use crate::utils::{BBoxCrop, encode_png_base64};
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Text recognition collaborator.
pub trait OcrEngine: Send + Sync {
    /// Recognizes the text in a cropped region.
    fn recognize(&self, image: &RgbImage) -> Result<String, TranscriptionError>;
}

/// Figure description collaborator.
pub trait FigureDescriber: Send + Sync {
    /// Describes the content of a figure crop.
    fn describe(&self, image: &RgbImage) -> Result<String, TranscriptionError>;
}

/// Configuration of the text attachment stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachConfig {
    /// Deadline per OCR / description call in milliseconds; `None` disables it.
    /// Default: Some(30000)
    #[serde(default = "AttachConfig::default_ocr_timeout_ms")]
    pub ocr_timeout_ms: Option<u64>,
    /// Pixels added around each crop.
    /// Default: 0
    #[serde(default)]
    pub crop_padding: u32,
    /// Whether figures are sent to the describer, when one is configured.
    /// Default: true
    #[serde(default = "AttachConfig::default_describe_figures")]
    pub describe_figures: bool,
    /// Whether figure crops are embedded in the document.
    /// Default: false
    #[serde(default)]
    pub embed_figures: bool,
}

impl AttachConfig {
    fn default_ocr_timeout_ms() -> Option<u64> {
        Some(30_000)
    }

    fn default_describe_figures() -> bool {
        true
    }

    pub fn with_ocr_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.ocr_timeout_ms = timeout_ms;
        self
    }

    pub fn with_crop_padding(mut self, padding: u32) -> Self {
        self.crop_padding = padding;
        self
    }

    pub fn with_describe_figures(mut self, describe: bool) -> Self {
        self.describe_figures = describe;
        self
    }

    pub fn with_embed_figures(mut self, embed: bool) -> Self {
        self.embed_figures = embed;
        self
    }
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            ocr_timeout_ms: Self::default_ocr_timeout_ms(),
            crop_padding: 0,
            describe_figures: Self::default_describe_figures(),
            embed_figures: false,
        }
    }
}

impl ConfigValidator for AttachConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ocr_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationFailed {
                message: "ocr_timeout_ms must be positive".to_string(),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Per-node failures and embedded figures of one page.
#[derive(Debug, Clone, Default)]
pub struct AttachOutcome {
    pub errors: Vec<NodeError>,
    pub images: Vec<FigureImage>,
}

struct Job {
    node_id: String,
    bbox: BoundingBox,
}

/// Binds OCR text (and figure descriptions) onto a page tree.
#[derive(Clone)]
pub struct TextAttacher {
    engine: Arc<dyn OcrEngine>,
    describer: Option<Arc<dyn FigureDescriber>>,
    config: AttachConfig,
}

impl std::fmt::Debug for TextAttacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextAttacher")
            .field("describer", &self.describer.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl TextAttacher {
    pub fn new(engine: Arc<dyn OcrEngine>, config: AttachConfig) -> Self {
        Self {
            engine,
            describer: None,
            config,
        }
    }

    /// Adds a figure describer.
    pub fn with_figure_describer(mut self, describer: Arc<dyn FigureDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    pub fn config(&self) -> &AttachConfig {
        &self.config
    }

    /// Attaches text to every page of `document`.
    ///
    /// `pages[i]` is the image of the page whose `page_index` is `i`; pages
    /// without an image are left untouched.
    pub fn attach_document(&self, mut document: Document, pages: &[Arc<RgbImage>]) -> Document {
        for root in &mut document.pages {
            let Some(image) = pages.get(root.page_index) else {
                continue;
            };
            let outcome = self.attach(root, image);
            document.errors.extend(outcome.errors);
            document.images.extend(outcome.images);
        }
        document.refresh_completeness();
        document
    }

    /// Attaches text to one page tree.
    pub fn attach(&self, root: &mut DocumentNode, page: &Arc<RgbImage>) -> AttachOutcome {
        let mut outcome = AttachOutcome::default();
        let page_index = root.page_index;

        let jobs = collect_leaves(root);
        let results: Vec<Result<String, TranscriptionError>> = jobs
            .par_iter()
            .map(|job| {
                let engine = Arc::clone(&self.engine);
                self.run_on_crop(page, &job.bbox, move |crop| engine.recognize(crop))
            })
            .collect();

        let mut by_id: HashMap<String, Result<String, TranscriptionError>> = jobs
            .into_iter()
            .map(|job| job.node_id)
            .zip(results)
            .collect();
        root.for_each_leaf_mut(&mut |node| {
            let Some(result) = by_id.remove(&node.node_id) else {
                return;
            };
            match result {
                Ok(text) => node.text = Some(text.trim().to_string()),
                Err(e) => {
                    warn!(
                        target: "layout",
                        page_index,
                        node_id = %node.node_id,
                        error = %e,
                        "OCR failed"
                    );
                    node.text = None;
                    node.set_attribute(attr::OCR_ERROR, e.to_string());
                    outcome.errors.push(NodeError {
                        node_id: node.node_id.clone(),
                        page_index,
                        stage: ProcessingStage::TextAttachment,
                        message: e.to_string(),
                    });
                }
            }
        });

        self.process_figures(root, page, &mut outcome);
        debug!(
            target: "layout",
            page_index,
            failures = outcome.errors.len(),
            "text attached"
        );
        outcome
    }

    fn process_figures(
        &self,
        root: &mut DocumentNode,
        page: &Arc<RgbImage>,
        outcome: &mut AttachOutcome,
    ) {
        let describer = self
            .describer
            .as_ref()
            .filter(|_| self.config.describe_figures);
        if describer.is_none() && !self.config.embed_figures {
            return;
        }
        let page_index = root.page_index;

        root.for_each_mut(&mut |node| {
            if node.kind != NodeKind::Figure {
                return;
            }

            if let Some(describer) = describer {
                let describer = Arc::clone(describer);
                match self.run_on_crop(page, &node.bbox, move |crop| describer.describe(crop)) {
                    Ok(description) => {
                        node.set_attribute(attr::DESCRIPTION, description.trim());
                    }
                    Err(e) => {
                        warn!(
                            target: "layout",
                            page_index,
                            node_id = %node.node_id,
                            error = %e,
                            "figure description failed"
                        );
                        node.set_attribute(attr::DESCRIBE_ERROR, e.to_string());
                        outcome.errors.push(NodeError {
                            node_id: node.node_id.clone(),
                            page_index,
                            stage: ProcessingStage::FigureDescription,
                            message: e.to_string(),
                        });
                    }
                }
            }

            if self.config.embed_figures {
                if let Some(image) = embed_figure(node, page, self.config.crop_padding) {
                    outcome.images.push(image);
                }
            }
        });
    }

    /// Crops `bbox` and runs `call` on the crop under the configured deadline.
    fn run_on_crop<F>(
        &self,
        page: &RgbImage,
        bbox: &BoundingBox,
        call: F,
    ) -> Result<String, TranscriptionError>
    where
        F: FnOnce(&RgbImage) -> Result<String, TranscriptionError> + Send + 'static,
    {
        let crop = BBoxCrop::crop_bounding_box(page, bbox, self.config.crop_padding)?;
        let timeout = self.config.ocr_timeout_ms.map(Duration::from_millis);
        match run_with_timeout(timeout, move || call(&crop)) {
            Deadline::Completed(result) => result,
            Deadline::TimedOut => Err(TranscriptionError::Timeout {
                after_ms: self.config.ocr_timeout_ms.unwrap_or_default(),
            }),
            Deadline::Panicked => Err(TranscriptionError::engine("call panicked")),
        }
    }
}

/// Leaves that need text: everything but page roots and synthetic empty cells.
fn collect_leaves(root: &DocumentNode) -> Vec<Job> {
    root.iter()
        .filter(|n| n.is_leaf() && n.kind != NodeKind::Page)
        .filter(|n| n.attribute(attr::EMPTY).and_then(|v| v.as_bool()) != Some(true))
        .map(|n| Job {
            node_id: n.node_id.clone(),
            bbox: n.bbox,
        })
        .collect()
}

fn embed_figure(node: &DocumentNode, page: &RgbImage, padding: u32) -> Option<FigureImage> {
    let crop = BBoxCrop::crop_bounding_box(page, &node.bbox, padding).ok()?;
    match encode_png_base64(&crop) {
        Ok(data) => Some(FigureImage {
            node_id: node.node_id.clone(),
            page_index: node.page_index,
            name: format!("{}.png", node.node_id),
            width: crop.width(),
            height: crop.height(),
            data,
        }),
        Err(e) => {
            warn!(target: "layout", node_id = %node.node_id, error = %e, "figure embedding failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::Mutex;

    /// Reads back the red channel of the crop's top-left pixel as text.
    struct PixelOcr {
        fail_on: Option<u8>,
        calls: Mutex<usize>,
    }

    impl OcrEngine for PixelOcr {
        fn recognize(&self, image: &RgbImage) -> Result<String, TranscriptionError> {
            *self.calls.lock().unwrap() += 1;
            let red = image.get_pixel(0, 0)[0];
            if Some(red) == self.fail_on {
                return Err(TranscriptionError::engine("unreadable"));
            }
            Ok(format!(" text-{red} "))
        }
    }

    struct FixedDescriber(Result<String, TranscriptionError>);

    impl FigureDescriber for FixedDescriber {
        fn describe(&self, _image: &RgbImage) -> Result<String, TranscriptionError> {
            self.0.clone()
        }
    }

    /// Page whose red channel encodes `x / 10`.
    fn page() -> Arc<RgbImage> {
        Arc::new(RgbImage::from_fn(100, 100, |x, _| Rgb([(x / 10) as u8, 0, 0])))
    }

    fn node(id: &str, kind: NodeKind, x0: f32, x1: f32) -> DocumentNode {
        DocumentNode::new(id, kind, BoundingBox::from_coords(x0, 10.0, x1, 30.0), 0)
    }

    fn tree() -> DocumentNode {
        let mut root = DocumentNode::page_root(0, 100, 100);
        root.children.push(node("a", NodeKind::Paragraph, 0.0, 20.0));
        root.children.push(node("b", NodeKind::Paragraph, 30.0, 50.0));
        let mut figure = node("f", NodeKind::Figure, 60.0, 90.0);
        figure.children.push(node("c", NodeKind::Caption, 70.0, 80.0));
        root.children.push(figure);
        root
    }

    fn engine(fail_on: Option<u8>) -> Arc<PixelOcr> {
        Arc::new(PixelOcr {
            fail_on,
            calls: Mutex::new(0),
        })
    }

    #[test]
    fn test_every_leaf_gets_text_once() {
        let ocr = engine(None);
        let attacher = TextAttacher::new(ocr.clone(), AttachConfig::default());
        let mut root = tree();
        let outcome = attacher.attach(&mut root, &page());

        assert!(outcome.errors.is_empty());
        assert_eq!(*ocr.calls.lock().unwrap(), 3);
        assert_eq!(root.find("a").unwrap().text.as_deref(), Some("text-0"));
        assert_eq!(root.find("b").unwrap().text.as_deref(), Some("text-3"));
        assert_eq!(root.find("c").unwrap().text.as_deref(), Some("text-7"));
        assert_eq!(root.find("f").unwrap().text, None);
    }

    #[test]
    fn test_single_failure_is_recorded_on_its_node() {
        let attacher = TextAttacher::new(engine(Some(3)), AttachConfig::default());
        let mut root = tree();
        let outcome = attacher.attach(&mut root, &page());

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].node_id, "b");
        assert_eq!(outcome.errors[0].stage, ProcessingStage::TextAttachment);
        let b = root.find("b").unwrap();
        assert_eq!(b.text, None);
        assert!(b.attribute_str(attr::OCR_ERROR).unwrap().contains("unreadable"));
        assert_eq!(root.find("a").unwrap().text.as_deref(), Some("text-0"));
        assert_eq!(root.find("c").unwrap().text.as_deref(), Some("text-7"));
    }

    #[test]
    fn test_empty_crop_is_a_node_error() {
        let attacher = TextAttacher::new(engine(None), AttachConfig::default());
        let mut root = DocumentNode::page_root(0, 100, 100);
        root.children
            .push(node("outside", NodeKind::Paragraph, 150.0, 180.0));
        let outcome = attacher.attach(&mut root, &page());
        assert_eq!(outcome.errors.len(), 1);
        assert!(
            root.children[0]
                .attribute_str(attr::OCR_ERROR)
                .unwrap()
                .starts_with("empty crop")
        );
    }

    #[test]
    fn test_synthetic_cells_and_empty_page_skipped() {
        let ocr = engine(None);
        let attacher = TextAttacher::new(ocr.clone(), AttachConfig::default());
        let mut root = DocumentNode::page_root(0, 100, 100);
        let outcome = attacher.attach(&mut root, &page());
        assert!(outcome.errors.is_empty());
        assert_eq!(root.text, None);

        root.children.push(
            node("t-r0c0", NodeKind::TableCell, 0.0, 20.0).with_attribute(attr::EMPTY, true),
        );
        attacher.attach(&mut root, &page());
        assert_eq!(*ocr.calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_figure_description_and_embedding() {
        let attacher = TextAttacher::new(
            engine(None),
            AttachConfig::default().with_embed_figures(true),
        )
        .with_figure_describer(Arc::new(FixedDescriber(Ok("a bar chart ".to_string()))));
        let mut root = tree();
        let outcome = attacher.attach(&mut root, &page());

        let figure = root.find("f").unwrap();
        assert_eq!(figure.attribute_str(attr::DESCRIPTION), Some("a bar chart"));
        assert_eq!(outcome.images.len(), 1);
        assert_eq!(outcome.images[0].name, "f.png");
        assert_eq!((outcome.images[0].width, outcome.images[0].height), (30, 20));
    }

    #[test]
    fn test_describer_failure_marks_node() {
        let attacher = TextAttacher::new(engine(None), AttachConfig::default())
            .with_figure_describer(Arc::new(FixedDescriber(Err(TranscriptionError::Timeout {
                after_ms: 5,
            }))));
        let mut root = tree();
        let outcome = attacher.attach(&mut root, &page());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].stage, ProcessingStage::FigureDescription);
        assert!(root.find("f").unwrap().attribute(attr::DESCRIBE_ERROR).is_some());
    }

    #[test]
    fn test_attach_document_sets_completeness() {
        let attacher = TextAttacher::new(engine(Some(3)), AttachConfig::default());
        let document = Document::new("doc.png", vec![tree()]);
        assert!(document.is_complete());
        let document = attacher.attach_document(document, &[page()]);
        assert!(!document.is_complete());
        assert_eq!(document.errors().len(), 1);
    }
}
