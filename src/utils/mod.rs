//! Utility functions for the layout pipeline.
//!
//! Image loading and encoding, bounding-box crops, region visualisation and
//! logging setup.

pub mod bbox_crop;
pub mod image;
pub mod visualize;

pub use self::image::{
    MIN_PAGE_SIZE, encode_png, encode_png_base64, load_image, load_image_from_bytes,
    validate_page_size,
};
pub use bbox_crop::BBoxCrop;
pub use visualize::draw_regions;

/// Initializes the tracing subscriber for logging.
///
/// The log level is controlled by `RUST_LOG`. Call once, before any pipeline
/// work; a second call panics because the global subscriber is already set.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
