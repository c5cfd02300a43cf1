//! Domain types flowing between pipeline stages and the document output.

pub mod chunk;
pub mod detection;
pub mod document;
pub mod export;
pub mod region;

pub use chunk::{Chunk, ChunkMetadata};
pub use detection::{CELL_CONTAINMENT, ClassLabel, Detection, RegionId};
pub use document::{Document, DocumentNode, FigureImage, NodeIter, NodeKind, attr};
pub use export::numbered_heading_level;
pub use region::{OrderedRegion, Region};
