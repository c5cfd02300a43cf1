//! Non-fatal diagnostics carried on pipeline output.
//!
//! Warnings describe conditions the pipeline recovered from with a documented
//! fallback; node errors describe work that failed on a single entity.

use super::types::ProcessingStage;
use serde::{Deserialize, Serialize};

/// Category of a recoverable layout condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A region collapsed to (near) zero area and was folded into another.
    DegenerateRegion,
    /// Side-by-side regions were found but no column gap qualified; single-column order used.
    NoColumnSplit,
    /// A model emitted a label missing from its label map; the detection was dropped.
    UnmappedLabel,
    /// A model emitted a box with non-positive area after normalization.
    InvalidBox,
    /// Two table cells resolved to the same grid slot.
    TableGridConflict,
    /// A detection model failed while others succeeded.
    ModelFailed,
}

impl WarningKind {
    /// Returns true for the ambiguous-layout diagnostics produced by merging and ordering.
    pub fn is_ambiguous_layout(&self) -> bool {
        matches!(
            self,
            WarningKind::DegenerateRegion | WarningKind::NoColumnSplit
        )
    }
}

/// A recoverable condition recorded while processing a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutWarning {
    /// What happened.
    pub kind: WarningKind,
    /// Page the warning belongs to.
    pub page_index: usize,
    /// Human-readable detail.
    pub message: String,
}

impl LayoutWarning {
    /// Creates a warning and logs it.
    pub fn new(kind: WarningKind, page_index: usize, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(target: "layout", page_index, kind = ?kind, "{}", message);
        Self {
            kind,
            page_index,
            message,
        }
    }
}

/// A failure recorded against a single node (or a whole page root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeError {
    /// Id of the affected node.
    pub node_id: String,
    /// Page of the affected node.
    pub page_index: usize,
    /// Stage that failed.
    pub stage: ProcessingStage,
    /// Failure reason.
    pub message: String,
}
