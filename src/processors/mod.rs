//! Geometry and clustering primitives shared by the pipeline stages.

pub mod clustering;
pub mod geometry;
pub mod grid;
pub mod projection;
pub mod union_find;

pub use clustering::{cluster_1d, cluster_assignments};
pub use geometry::{BoundingBox, Point};
pub use grid::{GridAssignment, assign_grid};
pub use projection::{Axis, Segment, projection_by_bboxes, split_projection_profile};
pub use union_find::UnionFind;
