//! The layout pipeline.
//!
//! Runs detection, merging, reading order, structure building and text
//! attachment strictly in that order for each page. Pages are independent and
//! run on a dedicated worker pool; each worker writes its result into its own
//! pre-sized slot, so assembling the document needs no locking.

mod config;

pub use config::PipelineConfig;

use crate::attach::{FigureDescriber, OcrEngine, TextAttacher};
use crate::core::config::{ConfigValidator, ModelConfig, ModelSource};
use crate::core::{
    CancellationToken, LayoutError, LayoutWarning, NodeError, ProcessingStage,
};
use crate::detection::{DetectionAdapter, DetectionModel, HttpDetectionModel, OnnxLayoutModel};
use crate::domain::{Document, DocumentNode, FigureImage, OrderedRegion, attr};
use crate::merge::RegionMerger;
use crate::ordering::ReadingOrderResolver;
use crate::structure::StructureBuilder;
use crate::utils::{load_image_from_bytes, validate_page_size};
use image::RgbImage;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything produced for one page.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub page_index: usize,
    /// Page tree with text attached.
    pub root: DocumentNode,
    /// Ordered regions the tree was built from.
    pub regions: Vec<OrderedRegion>,
    pub warnings: Vec<LayoutWarning>,
    pub errors: Vec<NodeError>,
    pub images: Vec<FigureImage>,
    /// False when a model or an OCR call failed on this page.
    pub complete: bool,
}

type PageSlot = Option<Result<PageResult, LayoutError>>;

/// Builder for [`LayoutPipeline`].
#[derive(Default)]
pub struct LayoutPipelineBuilder {
    models: Vec<(Arc<dyn DetectionModel>, ModelConfig)>,
    ocr_engine: Option<Arc<dyn OcrEngine>>,
    figure_describer: Option<Arc<dyn FigureDescriber>>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl LayoutPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a configuration, instantiating its ONNX and HTTP models.
    ///
    /// In-memory model entries cannot be instantiated from configuration and
    /// are rejected.
    pub fn from_config(config: PipelineConfig) -> Result<Self, LayoutError> {
        let mut builder = Self::new();
        for model_config in &config.models {
            model_config.validate()?;
            let model: Arc<dyn DetectionModel> = match &model_config.source {
                ModelSource::Onnx { .. } => Arc::new(OnnxLayoutModel::from_config(model_config)?),
                ModelSource::Http { .. } => {
                    Arc::new(HttpDetectionModel::from_config(model_config)?)
                }
                ModelSource::InMemory => {
                    return Err(LayoutError::config_error_detailed(
                        format!("model '{}'", model_config.model_id),
                        "in-memory models must be added with with_model",
                    ));
                }
            };
            builder = builder.with_model(model, model_config.clone());
        }
        Ok(builder.with_config(config))
    }

    /// Adds a detection model and the configuration used to interpret it.
    pub fn with_model(mut self, model: Arc<dyn DetectionModel>, config: ModelConfig) -> Self {
        self.models.push((model, config));
        self
    }

    pub fn with_ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr_engine = Some(engine);
        self
    }

    pub fn with_figure_describer(mut self, describer: Arc<dyn FigureDescriber>) -> Self {
        self.figure_describer = Some(describer);
        self
    }

    /// Sets the stage configurations.
    ///
    /// `config.models` is replaced by the models added to this builder.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a cancellation token with the caller.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn build(self) -> Result<LayoutPipeline, LayoutError> {
        if self.models.is_empty() {
            return Err(LayoutError::config_error_detailed(
                "layout pipeline",
                "no detection model configured",
            ));
        }

        let mut config = self.config;
        config.models = self.models.iter().map(|(_, c)| c.clone()).collect();
        for (model, model_config) in &self.models {
            model_config.validate()?;
            if model.model_id() != model_config.model_id {
                debug!(
                    target: "layout",
                    backend = model.model_id(),
                    model_id = %model_config.model_id,
                    "model registered under a different id"
                );
            }
        }
        config.validate_stages()?;

        let pool = config.parallel.build_pool().map_err(|e| {
            LayoutError::config_error_detailed("page worker pool", e.to_string())
        })?;

        let detector = DetectionAdapter::new(self.models, config.detection.clone())?;
        let merger = RegionMerger::new(config.merge.clone());
        let resolver = ReadingOrderResolver::new(config.ordering.clone())
            .with_cell_cluster_ratio(config.structure.cell_cluster_ratio);
        let structure = StructureBuilder::new(config.structure.clone());
        let attacher = self.ocr_engine.map(|engine| {
            let attacher = TextAttacher::new(engine, config.attach.clone());
            match self.figure_describer {
                Some(describer) => attacher.with_figure_describer(describer),
                None => attacher,
            }
        });
        if attacher.is_none() {
            warn!(target: "layout", "no OCR engine configured; nodes will carry no text");
        }

        Ok(LayoutPipeline {
            detector,
            merger,
            resolver,
            structure,
            attacher,
            config,
            cancel: self.cancel,
            pool,
        })
    }
}

/// A configured layout pipeline.
pub struct LayoutPipeline {
    detector: DetectionAdapter,
    merger: RegionMerger,
    resolver: ReadingOrderResolver,
    structure: StructureBuilder,
    attacher: Option<TextAttacher>,
    config: PipelineConfig,
    cancel: CancellationToken,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for LayoutPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutPipeline")
            .field("detector", &self.detector)
            .field("attacher", &self.attacher)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

impl LayoutPipeline {
    pub fn builder() -> LayoutPipelineBuilder {
        LayoutPipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that cancels runs of this pipeline.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs every stage on one page.
    ///
    /// Fails with `MalformedInput` for unusable images, `NoUsableDetections`
    /// when every model failed and `Cancelled` when the token fired before or
    /// between stages. Everything else is recorded on the result.
    pub fn process_page(
        &self,
        image: Arc<RgbImage>,
        page_index: usize,
    ) -> Result<PageResult, LayoutError> {
        let start = Instant::now();
        self.cancel.check()?;
        validate_page_size(&image)?;
        let (width, height) = image.dimensions();

        let detection = self.detector.detect(&image, page_index)?;
        let mut warnings = detection.warnings;
        let mut errors: Vec<NodeError> = detection
            .failed_models
            .iter()
            .map(|model_id| NodeError {
                node_id: format!("p{page_index}"),
                page_index,
                stage: ProcessingStage::Detection,
                message: format!("model '{model_id}' failed"),
            })
            .collect();
        let detection_count = detection.detections.len();

        self.cancel.check()?;
        let merged = self.merger.merge(&detection.detections);
        warnings.extend(merged.warnings);
        let region_count = merged.regions.len();

        self.cancel.check()?;
        let ordering = self.resolver.order(merged.regions, width, height);
        warnings.extend(ordering.warnings);

        self.cancel.check()?;
        let built = self
            .structure
            .build(&ordering.ordered, page_index, width, height);
        warnings.extend(built.warnings);
        let mut root = built.root;

        self.cancel.check()?;
        let mut images = Vec::new();
        if let Some(attacher) = &self.attacher {
            let attached = attacher.attach(&mut root, &image);
            errors.extend(attached.errors);
            images = attached.images;
        }

        info!(
            target: "layout",
            page_index,
            detections = detection_count,
            regions = region_count,
            nodes = root.node_count(),
            warnings = warnings.len(),
            errors = errors.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "page processed"
        );

        Ok(PageResult {
            page_index,
            root,
            regions: ordering.ordered,
            warnings,
            complete: errors.is_empty(),
            errors,
            images,
        })
    }

    /// Processes every page of a document.
    ///
    /// Page failures do not fail the run: the page is represented by an empty
    /// root carrying `attributes.page_error`. After cancellation, pages that
    /// had not finished are left out and the document is marked cancelled.
    pub fn process_document(
        &self,
        source_id: impl Into<String>,
        pages: Vec<RgbImage>,
    ) -> Result<Document, LayoutError> {
        let source_id = source_id.into();
        self.cancel.check()?;
        let start = Instant::now();
        let page_count = pages.len();

        let dimensions: Vec<(u32, u32)> = pages.iter().map(|p| p.dimensions()).collect();
        let mut slots: Vec<PageSlot> = (0..page_count).map(|_| None).collect();

        let run = |(page_index, (slot, image)): (usize, (&mut PageSlot, RgbImage))| {
            *slot = Some(self.process_page(Arc::new(image), page_index));
        };
        if page_count <= self.config.parallel.sequential_threshold {
            slots
                .iter_mut()
                .zip(pages)
                .enumerate()
                .for_each(run);
        } else {
            self.pool.install(|| {
                slots
                    .par_iter_mut()
                    .zip(pages.into_par_iter())
                    .enumerate()
                    .for_each(run);
            });
        }

        let mut roots = Vec::with_capacity(page_count);
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        let mut images = Vec::new();
        let mut cancelled = false;

        for (page_index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(page)) => {
                    roots.push(page.root);
                    warnings.extend(page.warnings);
                    errors.extend(page.errors);
                    images.extend(page.images);
                }
                Some(Err(LayoutError::Cancelled)) | None => cancelled = true,
                Some(Err(e)) => {
                    warn!(target: "layout", page_index, error = %e, "page failed");
                    let (width, height) = dimensions[page_index];
                    let root = DocumentNode::page_root(page_index, width, height)
                        .with_attribute(attr::PAGE_ERROR, e.to_string());
                    errors.push(NodeError {
                        node_id: root.node_id.clone(),
                        page_index,
                        stage: failure_stage(&e),
                        message: e.to_string(),
                    });
                    roots.push(root);
                }
            }
        }

        let mut document = Document::new(source_id, roots);
        document.warnings = warnings;
        document.errors = errors;
        document.images = images;
        document.cancelled = cancelled;
        document.set_metadata("page_count", page_count);
        document.set_metadata("processed_pages", document.pages.len());
        document.set_metadata(
            "models",
            self.config
                .models
                .iter()
                .map(|m| m.model_id.clone())
                .collect::<Vec<_>>(),
        );
        document.refresh_completeness();

        info!(
            target: "layout",
            source_id = %document.source_id,
            pages = page_count,
            complete = document.is_complete(),
            cancelled,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "document processed"
        );
        Ok(document)
    }

    /// Parses a single encoded image.
    ///
    /// Unlike [`process_document`](Self::process_document), a page-level
    /// failure fails the call, since the page is the whole input.
    pub fn process_bytes(
        &self,
        source_id: impl Into<String>,
        bytes: &[u8],
    ) -> Result<Document, LayoutError> {
        let image = load_image_from_bytes(bytes)?;
        self.process_image(source_id, image)
    }

    /// Parses a single decoded image; page failures fail the call.
    pub fn process_image(
        &self,
        source_id: impl Into<String>,
        image: RgbImage,
    ) -> Result<Document, LayoutError> {
        let page = self.process_page(Arc::new(image), 0)?;
        Ok(page.into_document(source_id))
    }
}

impl PageResult {
    /// Wraps this page as a single-page document.
    pub fn into_document(self, source_id: impl Into<String>) -> Document {
        let mut document = Document::new(source_id, vec![self.root]);
        document.warnings = self.warnings;
        document.errors = self.errors;
        document.images = self.images;
        document.set_metadata("page_count", 1);
        document.set_metadata("processed_pages", 1);
        document.refresh_completeness();
        document
    }
}

fn failure_stage(error: &LayoutError) -> ProcessingStage {
    match error {
        LayoutError::MalformedInput { .. } | LayoutError::ImageLoad(_) => ProcessingStage::Input,
        LayoutError::NoUsableDetections { .. } | LayoutError::ModelUnavailable { .. } => {
            ProcessingStage::Detection
        }
        LayoutError::Processing { kind, .. } => *kind,
        _ => ProcessingStage::Pipeline,
    }
}
