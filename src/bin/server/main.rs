//! OAR-Layout Server and CLI
//!
//! A cross-platform binary for document layout parsing via CLI or HTTP server.
//!
//! # Usage
//!
//! ## CLI Mode
//! ```bash
//! oar-layout-server parse --file page.png --config pipeline.json --output markdown
//! oar-layout-server parse --url "https://example.com/page.jpg" --ocr-endpoint http://localhost:8001/ocr
//! oar-layout-server parse --file page.png --visualize layout.png
//! ```
//!
//! ## Server Mode
//! ```bash
//! oar-layout-server serve --config pipeline.json --port 8080
//! ```

mod cli;
mod config;
mod engine;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "oar-layout-server")]
#[command(author = "OAR-OCR Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Document layout parsing via CLI or HTTP server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a single page image via CLI
    Parse {
        /// URL of the image to process
        #[arg(long, conflicts_with = "file")]
        url: Option<String>,

        /// Local file path of the image to process
        #[arg(long, conflicts_with = "url")]
        file: Option<PathBuf>,

        /// Pipeline configuration (JSON)
        #[arg(long, env = "OAR_LAYOUT_CONFIG")]
        config: Option<PathBuf>,

        /// OCR service attached to every leaf node
        #[arg(long = "ocr-endpoint", env = "OAR_OCR_ENDPOINT")]
        ocr_endpoint: Option<String>,

        /// Figure description service
        #[arg(long = "describe-endpoint", env = "OAR_DESCRIBE_ENDPOINT")]
        describe_endpoint: Option<String>,

        /// Device for ONNX models (cpu, cuda, cuda:0, etc.)
        #[arg(long, env = "OAR_DEVICE")]
        device: Option<String>,

        /// Output format (json, markdown, html, pretty)
        #[arg(long, default_value = "pretty")]
        output: String,

        /// Write the page with region boxes and reading order to this file
        #[arg(long)]
        visualize: Option<PathBuf>,
    },
    /// Start the HTTP server
    Serve {
        /// Pipeline configuration (JSON)
        #[arg(long, env = "OAR_LAYOUT_CONFIG")]
        config: Option<PathBuf>,

        /// OCR service attached to every leaf node
        #[arg(long = "ocr-endpoint", env = "OAR_OCR_ENDPOINT")]
        ocr_endpoint: Option<String>,

        /// Figure description service
        #[arg(long = "describe-endpoint", env = "OAR_DESCRIBE_ENDPOINT")]
        describe_endpoint: Option<String>,

        /// Device for ONNX models (cpu, cuda, cuda:0, etc.)
        #[arg(long, env = "OAR_DEVICE")]
        device: Option<String>,

        /// Port to listen on
        #[arg(long, short, default_value = "8080", env = "OAR_PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "OAR_HOST")]
        host: String,

        /// Number of page worker threads (defaults to number of CPUs)
        #[arg(long, env = "OAR_WORKERS")]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    oar_layout::utils::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            url,
            file,
            config,
            ocr_endpoint,
            describe_endpoint,
            device,
            output,
            visualize,
        } => {
            let options = config::PipelineOptions {
                config_path: config,
                ocr_endpoint,
                describe_endpoint,
                device,
                workers: None,
            };

            if let Some(url) = url {
                info!("Processing URL: {}", url);
                cli::process_url(&url, &options, &output, visualize.as_deref()).await?;
            } else if let Some(file) = file {
                info!("Processing file: {}", file.display());
                cli::process_file(&file, &options, &output, visualize.as_deref()).await?;
            } else {
                eprintln!("Error: Either --url or --file must be provided");
                std::process::exit(1);
            }
        }
        Commands::Serve {
            config,
            ocr_endpoint,
            describe_endpoint,
            device,
            port,
            host,
            workers,
        } => {
            let config = config::ServerConfig {
                pipeline: config::PipelineOptions {
                    config_path: config,
                    ocr_endpoint,
                    describe_endpoint,
                    device,
                    workers,
                },
                host,
                port,
            };

            info!("Starting server on {}:{}", config.host, config.port);
            server::run_server(config).await?;
        }
    }

    Ok(())
}
