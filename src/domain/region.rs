//! Reconciled regions and their reading order.

use super::detection::{ClassLabel, Detection, RegionId};
use crate::processors::BoundingBox;
use serde::{Deserialize, Serialize};

/// One authoritative box and label per spatial cluster of detections.
///
/// Carries the cluster's highest-confidence detection plus the ids of every
/// other detection it supersedes, so each region is traceable to its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Id of the region (the id of its primary detection).
    pub region_id: RegionId,
    /// Page the region belongs to.
    pub page_index: usize,
    /// Authoritative box.
    pub bbox: BoundingBox,
    /// Authoritative label.
    pub class_label: ClassLabel,
    /// Confidence of the primary detection.
    pub confidence: f32,
    /// Highest-confidence contributing detection.
    pub primary: Detection,
    /// Ids of the other contributing detections.
    pub superseded_ids: Vec<RegionId>,
}

impl Region {
    /// Wraps a single detection as a region.
    pub fn from_detection(detection: Detection) -> Self {
        Self {
            region_id: detection.region_id.clone(),
            page_index: detection.page_index,
            bbox: detection.bbox,
            class_label: detection.class_label,
            confidence: detection.confidence,
            primary: detection,
            superseded_ids: Vec::new(),
        }
    }

    /// Ids of every detection that contributed to this region, primary first.
    pub fn contributing_ids(&self) -> impl Iterator<Item = &RegionId> {
        std::iter::once(&self.primary.region_id).chain(self.superseded_ids.iter())
    }

    /// Takes over the contributing ids of a region that was folded into this one.
    pub fn absorb(&mut self, other: Region) {
        self.superseded_ids.push(other.primary.region_id);
        self.superseded_ids.extend(other.superseded_ids);
    }
}

/// A region with its position in the page's reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedRegion {
    /// The region.
    pub region: Region,
    /// Position in reading order; unique per page, contiguous from 0.
    pub reading_order: usize,
    /// Region this one is nested under, if any.
    pub parent_id: Option<RegionId>,
    /// Column within its horizontal band, for regions that were column-sorted.
    pub column_index: Option<usize>,
}

impl OrderedRegion {
    /// Id of the underlying region.
    pub fn id(&self) -> &RegionId {
        &self.region.region_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(id: &str) -> Detection {
        Detection::new(
            id,
            BoundingBox::from_coords(0.0, 0.0, 10.0, 10.0),
            ClassLabel::Paragraph,
            0.5,
            "m",
            0,
        )
    }

    #[test]
    fn test_absorb_keeps_all_ids() {
        let mut a = Region::from_detection(det("a"));
        let mut b = Region::from_detection(det("b"));
        b.superseded_ids.push(RegionId::new("c"));
        a.absorb(b);
        let ids: Vec<&str> = a.contributing_ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
