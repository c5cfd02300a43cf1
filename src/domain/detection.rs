//! Canonical detection records.
//!
//! Every detection model's native output is normalized into [`Detection`]
//! before any downstream stage sees it; [`ClassLabel`] is the only label
//! vocabulary the merger, resolver and builder understand.

use crate::processors::BoundingBox;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum fraction of a cell's area inside a table for the cell to count as
/// nested in it.
pub const CELL_CONTAINMENT: f32 = 0.5;

/// Canonical layout class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassLabel {
    /// Document or section title.
    Title,
    /// Body text block.
    Paragraph,
    /// Table (container of table cells).
    Table,
    /// Figure, chart or image.
    Figure,
    /// Caption of a figure or table.
    Caption,
    /// Item of a bulleted or numbered list.
    ListItem,
    /// Running page header.
    Header,
    /// Running page footer.
    Footer,
    /// Cell of a table.
    TableCell,
}

impl ClassLabel {
    /// All labels, in declaration order.
    pub const ALL: [ClassLabel; 9] = [
        ClassLabel::Title,
        ClassLabel::Paragraph,
        ClassLabel::Table,
        ClassLabel::Figure,
        ClassLabel::Caption,
        ClassLabel::ListItem,
        ClassLabel::Header,
        ClassLabel::Footer,
        ClassLabel::TableCell,
    ];

    /// Returns the snake_case name of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLabel::Title => "title",
            ClassLabel::Paragraph => "paragraph",
            ClassLabel::Table => "table",
            ClassLabel::Figure => "figure",
            ClassLabel::Caption => "caption",
            ClassLabel::ListItem => "list_item",
            ClassLabel::Header => "header",
            ClassLabel::Footer => "footer",
            ClassLabel::TableCell => "table_cell",
        }
    }

    /// Rank used to resolve residual overlaps between regions; higher wins.
    pub fn merge_priority(&self) -> u8 {
        match self {
            ClassLabel::Table => 8,
            ClassLabel::Figure => 7,
            ClassLabel::Title => 6,
            ClassLabel::Paragraph => 5,
            ClassLabel::ListItem => 4,
            ClassLabel::Caption => 3,
            ClassLabel::Header => 2,
            ClassLabel::Footer => 1,
            ClassLabel::TableCell => 0,
        }
    }

    /// Whether regions of this label are nested under another region when possible.
    pub fn is_dependent(&self) -> bool {
        !self.parent_candidates().is_empty()
    }

    /// Labels a dependent region may be reparented under.
    pub fn parent_candidates(&self) -> &'static [ClassLabel] {
        match self {
            ClassLabel::Caption => &[ClassLabel::Figure, ClassLabel::Table],
            ClassLabel::ListItem => &[ClassLabel::Paragraph, ClassLabel::Title],
            ClassLabel::TableCell => &[ClassLabel::Table],
            _ => &[],
        }
    }

    /// Whether the region's pixels are expected to carry text for OCR.
    pub fn is_text_bearing(&self) -> bool {
        !matches!(self, ClassLabel::Table | ClassLabel::Figure)
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier of a detection, and of the region it represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// Creates an id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id for the `n`-th detection a model produced on a page.
    pub fn for_detection(page_index: usize, model_id: &str, n: usize) -> Self {
        Self(format!("p{page_index}-{model_id}-{n}"))
    }

    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RegionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A labeled box produced by a detection model, in page-pixel coordinates.
///
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Unique id.
    pub region_id: RegionId,
    /// Box in page pixels, `x0 < x1`, `y0 < y1`.
    pub bbox: BoundingBox,
    /// Canonical label.
    pub class_label: ClassLabel,
    /// Score in `[0, 1]`.
    pub confidence: f32,
    /// Id of the model that produced it.
    pub source_model: String,
    /// Page the detection belongs to.
    pub page_index: usize,
}

impl Detection {
    /// Creates a detection, clamping the confidence to `[0, 1]`.
    pub fn new(
        region_id: impl Into<RegionId>,
        bbox: BoundingBox,
        class_label: ClassLabel,
        confidence: f32,
        source_model: impl Into<String>,
        page_index: usize,
    ) -> Self {
        Self {
            region_id: region_id.into(),
            bbox,
            class_label,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            source_model: source_model.into(),
            page_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_serializes_as_its_name() {
        for label in ClassLabel::ALL {
            let json = serde_json::to_string(&label).unwrap();
            assert_eq!(json, format!("\"{}\"", label.as_str()));
            assert_eq!(serde_json::from_str::<ClassLabel>(&json).unwrap(), label);
        }
        assert!(serde_json::from_str::<ClassLabel>("\"text\"").is_err());
    }

    #[test]
    fn test_dependent_labels() {
        assert!(ClassLabel::Caption.is_dependent());
        assert!(ClassLabel::ListItem.is_dependent());
        assert!(ClassLabel::TableCell.is_dependent());
        assert!(!ClassLabel::Paragraph.is_dependent());
        assert!(!ClassLabel::Table.is_dependent());
    }

    #[test]
    fn test_priority_order() {
        assert!(ClassLabel::Table.merge_priority() > ClassLabel::Figure.merge_priority());
        assert!(ClassLabel::Figure.merge_priority() > ClassLabel::Paragraph.merge_priority());
        assert!(ClassLabel::Paragraph.merge_priority() > ClassLabel::Caption.merge_priority());
    }

    #[test]
    fn test_confidence_clamped() {
        let d = Detection::new(
            "a",
            BoundingBox::from_coords(0.0, 0.0, 1.0, 1.0),
            ClassLabel::Paragraph,
            1.7,
            "m",
            0,
        );
        assert_eq!(d.confidence, 1.0);
    }
}
