//! Region merging.
//!
//! Detections from every configured model are reconciled per page in two
//! passes:
//!
//! 1. **Clustering.** Detections whose pairwise IoU reaches the merge
//!    threshold are grouped transitively with a union-find, so chains of
//!    overlapping boxes end up in one cluster even when the chain's ends do
//!    not overlap each other. Each cluster becomes one [`Region`].
//! 2. **Overlap resolution.** Regions still overlapping beyond the tolerance
//!    are resolved by rank (label priority, then confidence, then input
//!    order): the lower-ranked box is shrunk to the largest part outside the
//!    higher-ranked one, or discarded into it when too little remains.
//!
//! Every input detection id stays reachable from exactly one output region,
//! either as its primary detection or in its superseded list.

use crate::core::config::{ConfigError, ConfigValidator};
use crate::core::errors::{LayoutWarning, WarningKind};
use crate::domain::{CELL_CONTAINMENT, ClassLabel, Detection, Region};
use crate::processors::UnionFind;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// How the box of a multi-detection cluster is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxPolicy {
    /// Smallest box enclosing every member.
    #[default]
    Union,
    /// Box of the highest-confidence member.
    HighestConfidence,
}

/// Configuration for [`RegionMerger`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Minimum IoU for two detections to join the same cluster.
    /// Default: 0.5
    #[serde(default = "MergeConfig::default_iou_threshold")]
    pub iou_threshold: f32,
    /// Maximum tolerated overlap between output regions, as intersection over
    /// the smaller box's area.
    /// Default: 0.05
    #[serde(default = "MergeConfig::default_overlap_tolerance")]
    pub overlap_tolerance: f32,
    #[serde(default)]
    pub box_policy: BoxPolicy,
    /// A shrunk region keeping less than this fraction of its area is discarded.
    /// Default: 0.1
    #[serde(default = "MergeConfig::default_min_area_fraction")]
    pub min_area_fraction: f32,
}

impl MergeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    pub fn with_overlap_tolerance(mut self, tolerance: f32) -> Self {
        self.overlap_tolerance = tolerance;
        self
    }

    pub fn with_box_policy(mut self, policy: BoxPolicy) -> Self {
        self.box_policy = policy;
        self
    }

    fn default_iou_threshold() -> f32 {
        0.5
    }

    fn default_overlap_tolerance() -> f32 {
        0.05
    }

    fn default_min_area_fraction() -> f32 {
        0.1
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            iou_threshold: Self::default_iou_threshold(),
            overlap_tolerance: Self::default_overlap_tolerance(),
            box_policy: BoxPolicy::default(),
            min_area_fraction: Self::default_min_area_fraction(),
        }
    }
}

impl ConfigValidator for MergeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_unit_interval("merge.iou_threshold", self.iou_threshold)?;
        self.validate_positive("merge.iou_threshold", self.iou_threshold)?;
        self.validate_unit_interval("merge.overlap_tolerance", self.overlap_tolerance)?;
        self.validate_unit_interval("merge.min_area_fraction", self.min_area_fraction)?;
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Result of merging one page (or a whole detection set).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub regions: Vec<Region>,
    pub warnings: Vec<LayoutWarning>,
}

/// Reconciles overlapping detections into non-overlapping regions.
#[derive(Debug, Clone, Default)]
pub struct RegionMerger {
    config: MergeConfig,
}

impl RegionMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merges detections, page by page.
    ///
    /// Regions are returned grouped by ascending page index; within a page
    /// they follow the input order of their earliest member.
    pub fn merge(&self, detections: &[Detection]) -> MergeOutcome {
        let mut pages: BTreeMap<usize, Vec<Region>> = BTreeMap::new();
        for detection in detections {
            pages
                .entry(detection.page_index)
                .or_default()
                .push(Region::from_detection(detection.clone()));
        }

        let mut outcome = MergeOutcome::default();
        for (_, regions) in pages {
            let page = self.merge_regions(regions);
            outcome.regions.extend(page.regions);
            outcome.warnings.extend(page.warnings);
        }
        outcome
    }

    /// Merges regions that all belong to one page.
    ///
    /// Running this on its own output returns the same regions unchanged.
    pub fn merge_regions(&self, regions: Vec<Region>) -> MergeOutcome {
        if regions.is_empty() {
            return MergeOutcome::default();
        }
        let input_count = regions.len();
        let clustered = self.cluster(regions);
        let cluster_count = clustered.len();
        let outcome = self.resolve_overlaps(clustered);
        debug!(
            target: "layout",
            input_count,
            cluster_count,
            region_count = outcome.regions.len(),
            "merged regions"
        );
        outcome
    }

    fn cluster(&self, regions: Vec<Region>) -> Vec<Region> {
        let mut uf = UnionFind::new(regions.len());
        for (i, j) in (0..regions.len()).tuple_combinations() {
            if nested_cell(&regions[i], &regions[j]) {
                continue;
            }
            if regions[i].bbox.iou(&regions[j].bbox) >= self.config.iou_threshold {
                uf.union(i, j);
            }
        }

        let groups = uf.groups();
        let mut slots: Vec<Option<Region>> = regions.into_iter().map(Some).collect();
        groups
            .into_iter()
            .filter_map(|group| {
                let members: Vec<Region> =
                    group.iter().filter_map(|&i| slots[i].take()).collect();
                self.combine(members)
            })
            .collect()
    }

    /// Collapses one cluster into a single region.
    fn combine(&self, members: Vec<Region>) -> Option<Region> {
        if members.len() <= 1 {
            return members.into_iter().next();
        }

        // Highest confidence wins; ties keep the earliest member.
        let rep_idx = members
            .iter()
            .enumerate()
            .fold(0, |best, (i, r)| {
                if r.confidence > members[best].confidence {
                    i
                } else {
                    best
                }
            });

        let label = choose_label(&members, members[rep_idx].class_label);
        let bbox = match self.config.box_policy {
            BoxPolicy::Union => members
                .iter()
                .skip(1)
                .fold(members[0].bbox, |acc, r| acc.union(&r.bbox)),
            BoxPolicy::HighestConfidence => members[rep_idx].bbox,
        };

        let mut members = members;
        let mut merged = members.remove(rep_idx);
        for other in members {
            merged.absorb(other);
        }
        merged.bbox = bbox;
        merged.class_label = label;
        Some(merged)
    }

    fn resolve_overlaps(&self, regions: Vec<Region>) -> MergeOutcome {
        let mut rank: Vec<usize> = (0..regions.len()).collect();
        rank.sort_by(|&a, &b| {
            let (ra, rb) = (&regions[a], &regions[b]);
            rb.class_label
                .merge_priority()
                .cmp(&ra.class_label.merge_priority())
                .then(rb.confidence.total_cmp(&ra.confidence))
                .then(a.cmp(&b))
        });

        let mut slots: Vec<Option<Region>> = regions.into_iter().map(Some).collect();
        // (input index, region), in rank order.
        let mut accepted: Vec<(usize, Region)> = Vec::with_capacity(slots.len());
        let mut warnings = Vec::new();

        for idx in rank {
            let Some(mut region) = slots[idx].take() else {
                continue;
            };
            let original_area = region.bbox.area();
            let mut absorbed_by = None;

            while let Some(pos) = accepted.iter().position(|(_, winner)| {
                !nested_cell(&region, winner)
                    && region.bbox.overlap_ratio(&winner.bbox) > self.config.overlap_tolerance
            }) {
                let winner = &accepted[pos].1;
                match region.bbox.subtract(&winner.bbox) {
                    Some(rest)
                        if rest.area() >= self.config.min_area_fraction * original_area =>
                    {
                        debug!(
                            target: "layout",
                            region_id = %region.region_id,
                            winner_id = %winner.region_id,
                            "shrunk overlapping region"
                        );
                        region.bbox = rest;
                    }
                    _ => {
                        absorbed_by = Some(pos);
                        break;
                    }
                }
            }

            match absorbed_by {
                Some(pos) => {
                    let winner = &mut accepted[pos].1;
                    warnings.push(LayoutWarning::new(
                        WarningKind::DegenerateRegion,
                        region.page_index,
                        format!(
                            "{} region {} collapsed under {} region {} and was folded into it",
                            region.class_label,
                            region.region_id,
                            winner.class_label,
                            winner.region_id
                        ),
                    ));
                    winner.absorb(region);
                }
                None => accepted.push((idx, region)),
            }
        }

        accepted.sort_by_key(|(idx, _)| *idx);
        MergeOutcome {
            regions: accepted.into_iter().map(|(_, r)| r).collect(),
            warnings,
        }
    }
}

/// Label with the highest summed confidence; ties prefer `fallback`, then the
/// lexicographically smallest name.
fn choose_label(members: &[Region], fallback: ClassLabel) -> ClassLabel {
    let mut totals: BTreeMap<ClassLabel, f32> = BTreeMap::new();
    for member in members {
        *totals.entry(member.class_label).or_insert(0.0) += member.confidence;
    }
    let best = totals.values().copied().fold(f32::MIN, f32::max);
    let mut tied: Vec<ClassLabel> = totals
        .into_iter()
        .filter(|(_, total)| (best - total).abs() <= f32::EPSILON * best.abs().max(1.0))
        .map(|(label, _)| label)
        .collect();
    if tied.contains(&fallback) {
        return fallback;
    }
    tied.sort_by_key(|l| l.as_str());
    tied.first().copied().unwrap_or(fallback)
}

/// A cell lying mostly inside a table is a containment relation, not a
/// conflict: the pair is neither clustered nor resolved against each other.
fn nested_cell(region: &Region, other: &Region) -> bool {
    let (cell, table) = match (region.class_label, other.class_label) {
        (ClassLabel::TableCell, ClassLabel::Table) => (region, other),
        (ClassLabel::Table, ClassLabel::TableCell) => (other, region),
        _ => return false,
    };
    cell.bbox.ioa(&table.bbox) >= CELL_CONTAINMENT
}

/// Returns true when no two regions overlap beyond `tolerance`, ignoring
/// cells nested in tables.
pub fn is_non_overlapping(regions: &[Region], tolerance: f32) -> bool {
    regions.iter().enumerate().all(|(i, a)| {
        regions[i + 1..].iter().all(|b| {
            a.page_index != b.page_index
                || nested_cell(a, b)
                || a.bbox.overlap_ratio(&b.bbox) <= tolerance
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RegionId;
    use crate::processors::BoundingBox;
    use std::collections::BTreeSet;

    fn det(id: &str, label: ClassLabel, b: (f32, f32, f32, f32), conf: f32) -> Detection {
        Detection::new(
            id,
            BoundingBox::from_coords(b.0, b.1, b.2, b.3),
            label,
            conf,
            "test",
            0,
        )
    }

    fn ids(region: &Region) -> BTreeSet<String> {
        region.contributing_ids().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_paragraph_pair_and_figure() {
        let detections = vec![
            det("A", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 50.0), 0.9),
            det("B", ClassLabel::Paragraph, (10.0, 5.0, 110.0, 55.0), 0.6),
            det("C", ClassLabel::Figure, (200.0, 0.0, 300.0, 100.0), 0.8),
        ];
        let outcome = RegionMerger::default().merge(&detections);
        assert_eq!(outcome.regions.len(), 2);

        let paragraph = &outcome.regions[0];
        assert_eq!(paragraph.class_label, ClassLabel::Paragraph);
        assert_eq!(paragraph.region_id, RegionId::new("A"));
        assert_eq!(paragraph.bbox, BoundingBox::from_coords(0.0, 0.0, 110.0, 55.0));
        assert_eq!(ids(paragraph), ["A", "B"].map(String::from).into());

        let figure = &outcome.regions[1];
        assert_eq!(figure.class_label, ClassLabel::Figure);
        assert_eq!(ids(figure), ["C"].map(String::from).into());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_transitive_chain_forms_one_cluster() {
        // A~B and B~C overlap strongly; A and C barely touch.
        let detections = vec![
            det("A", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 100.0), 0.7),
            det("B", ClassLabel::Paragraph, (20.0, 0.0, 120.0, 100.0), 0.8),
            det("C", ClassLabel::Paragraph, (40.0, 0.0, 140.0, 100.0), 0.6),
        ];
        assert!(detections[0].bbox.iou(&detections[2].bbox) < 0.5);
        let outcome = RegionMerger::default().merge(&detections);
        assert_eq!(outcome.regions.len(), 1);
        assert_eq!(outcome.regions[0].region_id, RegionId::new("B"));
        assert_eq!(outcome.regions[0].superseded_ids.len(), 2);
    }

    #[test]
    fn test_label_by_aggregate_confidence() {
        let detections = vec![
            det("A", ClassLabel::Title, (0.0, 0.0, 100.0, 20.0), 0.9),
            det("B", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 21.0), 0.6),
            det("C", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 22.0), 0.5),
        ];
        let outcome = RegionMerger::default().merge(&detections);
        assert_eq!(outcome.regions.len(), 1);
        assert_eq!(outcome.regions[0].class_label, ClassLabel::Paragraph);
        // The representative is still the strongest single detection.
        assert_eq!(outcome.regions[0].region_id, RegionId::new("A"));
    }

    #[test]
    fn test_label_tie_prefers_representative() {
        let detections = vec![
            det("A", ClassLabel::Title, (0.0, 0.0, 100.0, 20.0), 0.5),
            det("B", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 20.0), 0.5),
        ];
        let outcome = RegionMerger::default().merge(&detections);
        assert_eq!(outcome.regions[0].class_label, ClassLabel::Title);
    }

    #[test]
    fn test_highest_confidence_box_policy() {
        let merger =
            RegionMerger::new(MergeConfig::new().with_box_policy(BoxPolicy::HighestConfidence));
        let detections = vec![
            det("A", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 50.0), 0.9),
            det("B", ClassLabel::Paragraph, (10.0, 5.0, 110.0, 55.0), 0.6),
        ];
        let outcome = merger.merge(&detections);
        assert_eq!(outcome.regions[0].bbox, detections[0].bbox);
    }

    #[test]
    fn test_residual_overlap_shrinks_lower_priority() {
        let detections = vec![
            det("P", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 100.0), 0.9),
            det("T", ClassLabel::Table, (0.0, 60.0, 100.0, 200.0), 0.8),
        ];
        let outcome = RegionMerger::default().merge(&detections);
        assert_eq!(outcome.regions.len(), 2);
        let paragraph = &outcome.regions[0];
        assert_eq!(paragraph.bbox, BoundingBox::from_coords(0.0, 0.0, 100.0, 60.0));
        assert!(is_non_overlapping(&outcome.regions, 0.05));
    }

    #[test]
    fn test_swallowed_region_is_folded_with_warning() {
        let detections = vec![
            det("F", ClassLabel::Figure, (0.0, 0.0, 200.0, 200.0), 0.9),
            det("P", ClassLabel::Paragraph, (50.0, 50.0, 80.0, 80.0), 0.7),
        ];
        let outcome = RegionMerger::default().merge(&detections);
        assert_eq!(outcome.regions.len(), 1);
        assert_eq!(ids(&outcome.regions[0]), ["F", "P"].map(String::from).into());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::DegenerateRegion);
    }

    #[test]
    fn test_cells_inside_table_survive() {
        let detections = vec![
            det("T", ClassLabel::Table, (0.0, 0.0, 200.0, 100.0), 0.9),
            det("c1", ClassLabel::TableCell, (0.0, 0.0, 100.0, 50.0), 0.8),
            det("c2", ClassLabel::TableCell, (100.0, 0.0, 200.0, 50.0), 0.8),
        ];
        let outcome = RegionMerger::default().merge(&detections);
        assert_eq!(outcome.regions.len(), 3);
        assert_eq!(outcome.regions[1].bbox, detections[1].bbox);
        assert!(is_non_overlapping(&outcome.regions, 0.05));
    }

    #[test]
    fn test_two_cell_table_is_not_clustered_with_its_cells() {
        let detections = vec![
            det("T", ClassLabel::Table, (0.0, 0.0, 200.0, 100.0), 0.9),
            det("c1", ClassLabel::TableCell, (0.0, 0.0, 200.0, 50.0), 0.8),
            det("c2", ClassLabel::TableCell, (0.0, 50.0, 200.0, 100.0), 0.8),
        ];
        assert!(detections[0].bbox.iou(&detections[1].bbox) >= 0.5);
        let outcome = RegionMerger::default().merge(&detections);

        let labels: Vec<(&str, ClassLabel)> = outcome
            .regions
            .iter()
            .map(|r| (r.region_id.as_str(), r.class_label))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("T", ClassLabel::Table),
                ("c1", ClassLabel::TableCell),
                ("c2", ClassLabel::TableCell)
            ]
        );
        assert_eq!(outcome.regions[0].bbox, detections[0].bbox);
        assert!(outcome.regions.iter().all(|r| r.superseded_ids.is_empty()));
    }

    #[test]
    fn test_cell_straddling_table_edge_is_resolved() {
        let detections = vec![
            det("T", ClassLabel::Table, (0.0, 0.0, 100.0, 100.0), 0.9),
            det("c", ClassLabel::TableCell, (80.0, 0.0, 180.0, 40.0), 0.8),
        ];
        let outcome = RegionMerger::default().merge(&detections);
        assert_eq!(outcome.regions.len(), 2);
        assert_eq!(outcome.regions[0].bbox, detections[0].bbox);
        assert_eq!(
            outcome.regions[1].bbox,
            BoundingBox::from_coords(100.0, 0.0, 180.0, 40.0)
        );
        assert!(is_non_overlapping(&outcome.regions, 0.05));
    }

    #[test]
    fn test_no_detection_lost_and_idempotent() {
        let detections = vec![
            det("a", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 40.0), 0.9),
            det("b", ClassLabel::Paragraph, (5.0, 2.0, 102.0, 41.0), 0.7),
            det("c", ClassLabel::Title, (0.0, 30.0, 100.0, 60.0), 0.6),
            det("d", ClassLabel::Figure, (20.0, 50.0, 90.0, 150.0), 0.8),
            det("e", ClassLabel::Caption, (20.0, 148.0, 90.0, 160.0), 0.5),
            det("f", ClassLabel::Paragraph, (30.0, 60.0, 60.0, 90.0), 0.4),
        ];
        let merger = RegionMerger::default();
        let outcome = merger.merge(&detections);

        let input: BTreeSet<String> = detections.iter().map(|d| d.region_id.to_string()).collect();
        let mut output = BTreeSet::new();
        for region in &outcome.regions {
            for id in region.contributing_ids() {
                assert!(output.insert(id.to_string()), "duplicate id {id}");
            }
        }
        assert_eq!(input, output);
        assert!(is_non_overlapping(&outcome.regions, 0.05));

        let again = merger.merge_regions(outcome.regions.clone());
        assert_eq!(again.regions, outcome.regions);
        assert!(again.warnings.is_empty());
    }

    #[test]
    fn test_pages_are_merged_separately() {
        let mut d0 = det("a", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 50.0), 0.9);
        let mut d1 = det("b", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 50.0), 0.9);
        d0.page_index = 1;
        d1.page_index = 0;
        let outcome = RegionMerger::default().merge(&[d0, d1]);
        assert_eq!(outcome.regions.len(), 2);
        assert_eq!(outcome.regions[0].page_index, 0);
    }

    #[test]
    fn test_empty_input() {
        let outcome = RegionMerger::default().merge(&[]);
        assert!(outcome.regions.is_empty());
    }
}
