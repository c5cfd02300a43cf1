//! CLI mode for layout parsing.

use crate::config::PipelineOptions;
use crate::engine::{DEFAULT_CHUNK_CHARS, ParseResponse, build_pipeline, download_bytes};
use oar_layout::domain::{Document, DocumentNode};
use oar_layout::pipeline::LayoutPipeline;
use oar_layout::utils::{draw_regions, load_image, load_image_from_bytes};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Process an image downloaded from a URL
pub async fn process_url(
    url: &str,
    options: &PipelineOptions,
    output_format: &str,
    visualize: Option<&Path>,
) -> CliResult {
    let start = Instant::now();

    info!("Downloading content from URL...");
    let bytes = download_bytes(url).await?;
    info!(
        "Downloaded {} bytes in {:.2}ms",
        bytes.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    let image = load_image_from_bytes(&bytes)?;

    run_blocking(url.to_string(), image, options, output_format, visualize).await
}

/// Process a local image file
pub async fn process_file(
    path: &Path,
    options: &PipelineOptions,
    output_format: &str,
    visualize: Option<&Path>,
) -> CliResult {
    let start = Instant::now();

    info!("Loading image from file...");
    let image = load_image(path)?;
    info!("Loaded in {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);

    run_blocking(path.display().to_string(), image, options, output_format, visualize).await
}

/// Builds the pipeline and parses the image on a blocking thread; the HTTP
/// collaborators use blocking clients that must stay off the runtime.
async fn run_blocking(
    source_id: String,
    image: image::RgbImage,
    options: &PipelineOptions,
    output_format: &str,
    visualize: Option<&Path>,
) -> CliResult {
    let options = options.clone();
    let output_format = output_format.to_string();
    let visualize = visualize.map(Path::to_path_buf);
    tokio::task::spawn_blocking(move || {
        info!("Initializing layout pipeline...");
        let pipeline = build_pipeline(&options)?;
        run(&pipeline, &source_id, image, &output_format, visualize.as_deref())
    })
    .await?
}

fn run(
    pipeline: &LayoutPipeline,
    source_id: &str,
    image: image::RgbImage,
    output_format: &str,
    visualize: Option<&Path>,
) -> CliResult {
    info!("Processing image ({}x{})...", image.width(), image.height());
    let image = Arc::new(image);
    let parse_start = Instant::now();
    let page = pipeline.process_page(Arc::clone(&image), 0)?;
    let processing_time = parse_start.elapsed();
    info!(
        "Layout parsed in {:.2}ms",
        processing_time.as_secs_f64() * 1000.0
    );

    if let Some(out) = visualize {
        draw_regions(&image, &page.regions).save(out)?;
        info!("Visualization written to {}", out.display());
    }

    let document = page.into_document(source_id);
    output_result(&document, output_format, processing_time.as_secs_f64() * 1000.0)
}

/// Output the document in the specified format
fn output_result(document: &Document, format: &str, processing_time_ms: f64) -> CliResult {
    match format {
        "json" => {
            let response = ParseResponse::new(
                uuid::Uuid::new_v4().to_string(),
                document.clone(),
                processing_time_ms,
            );
            println!("{}", serde_json::to_string(&response)?);
        }
        "markdown" => println!("{}", document.to_markdown()),
        "html" => println!("{}", document.to_html()),
        _ => print_pretty(document, processing_time_ms),
    }
    Ok(())
}

fn print_pretty(document: &Document, processing_time_ms: f64) {
    println!("\n=== Layout Results ===");
    println!("Source: {}", document.source_id());
    println!("Processing time: {:.2}ms", processing_time_ms);
    println!("Complete: {}", document.is_complete());
    println!();

    for page in document.pages() {
        println!(
            "--- Page {} ({} nodes) ---",
            page.page_index + 1,
            page.node_count()
        );
        for block in &page.children {
            print_node(block, 0);
        }
        println!();
    }

    if !document.warnings().is_empty() {
        println!("--- Warnings ---");
        for warning in document.warnings() {
            println!("[page {}] {:?}: {}", warning.page_index, warning.kind, warning.message);
        }
        println!();
    }
    if !document.errors().is_empty() {
        println!("--- Errors ---");
        for error in document.errors() {
            println!("[{}] {}: {}", error.node_id, error.stage, error.message);
        }
        println!();
    }

    let chunks = document.to_chunks(DEFAULT_CHUNK_CHARS);
    println!("--- Chunks: {} ---", chunks.len());
}

fn print_node(node: &DocumentNode, depth: usize) {
    let text = node.text.as_deref().unwrap_or("");
    let preview: String = text.chars().take(60).collect();
    println!(
        "{}{} [{:.0}, {:.0}, {:.0}, {:.0}] {}",
        "  ".repeat(depth),
        node.kind.as_str(),
        node.bbox.x0,
        node.bbox.y0,
        node.bbox.x1,
        node.bbox.y1,
        preview
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
