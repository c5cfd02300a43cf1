//! Reading-order resolution.
//!
//! Regions of one page are ordered the way a reader would follow them:
//!
//! - running headers first and running footers last, each top to bottom;
//! - full-width regions (titles, wide tables) split the page into bands that
//!   are read top to bottom;
//! - each band is split into columns at vertical gaps no region crosses, and
//!   columns are read left to right, each top to bottom;
//! - dependent regions (captions, list items, table cells) are nested under
//!   a nearby parent and follow it directly instead of taking their own slot.
//!   Captions and list items only nest under a region read before them,
//!   except that a caption sitting above a table or figure nests under it.

mod columns;

use crate::core::config::{ConfigError, ConfigValidator};
use crate::core::errors::{LayoutWarning, WarningKind};
use crate::domain::{CELL_CONTAINMENT, ClassLabel, OrderedRegion, Region};
use crate::processors::{BoundingBox, assign_grid};
use columns::{layout_columns, sort_top_down};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for [`ReadingOrderResolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingConfig {
    /// Minimum width of a column gap, as a fraction of the page width.
    /// Default: 0.02
    #[serde(default = "OrderingConfig::default_column_gap_ratio")]
    pub column_gap_ratio: f32,
    /// Regions at least this fraction of the page width wide act as band separators.
    /// Default: 0.6
    #[serde(default = "OrderingConfig::default_full_width_fraction")]
    pub full_width_fraction: f32,
    /// Maximum centre distance between a caption or list item and its parent,
    /// as a fraction of the page diagonal.
    /// Default: 0.25
    #[serde(default = "OrderingConfig::default_max_attach_distance_ratio")]
    pub max_attach_distance_ratio: f32,
    /// Emit headers before and footers after the page body.
    /// Default: true
    #[serde(default = "OrderingConfig::default_separate_headers")]
    pub separate_headers: bool,
}

impl OrderingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column_gap_ratio(mut self, ratio: f32) -> Self {
        self.column_gap_ratio = ratio;
        self
    }

    pub fn with_full_width_fraction(mut self, fraction: f32) -> Self {
        self.full_width_fraction = fraction;
        self
    }

    pub fn with_max_attach_distance_ratio(mut self, ratio: f32) -> Self {
        self.max_attach_distance_ratio = ratio;
        self
    }

    pub fn with_separate_headers(mut self, separate: bool) -> Self {
        self.separate_headers = separate;
        self
    }

    fn default_column_gap_ratio() -> f32 {
        0.02
    }

    fn default_full_width_fraction() -> f32 {
        0.6
    }

    fn default_max_attach_distance_ratio() -> f32 {
        0.25
    }

    fn default_separate_headers() -> bool {
        true
    }
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            column_gap_ratio: Self::default_column_gap_ratio(),
            full_width_fraction: Self::default_full_width_fraction(),
            max_attach_distance_ratio: Self::default_max_attach_distance_ratio(),
            separate_headers: Self::default_separate_headers(),
        }
    }
}

impl ConfigValidator for OrderingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_unit_interval("ordering.column_gap_ratio", self.column_gap_ratio)?;
        self.validate_unit_interval("ordering.full_width_fraction", self.full_width_fraction)?;
        self.validate_positive("ordering.full_width_fraction", self.full_width_fraction)?;
        self.validate_unit_interval(
            "ordering.max_attach_distance_ratio",
            self.max_attach_distance_ratio,
        )?;
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Ordered regions of one page plus the diagnostics produced on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderingOutcome {
    pub ordered: Vec<OrderedRegion>,
    pub warnings: Vec<LayoutWarning>,
}

/// Orders a page's regions into reading order.
#[derive(Debug, Clone)]
pub struct ReadingOrderResolver {
    config: OrderingConfig,
    cell_cluster_ratio: f32,
}

impl Default for ReadingOrderResolver {
    fn default() -> Self {
        Self::new(OrderingConfig::default())
    }
}

impl ReadingOrderResolver {
    pub fn new(config: OrderingConfig) -> Self {
        Self {
            config,
            cell_cluster_ratio: 0.5,
        }
    }

    /// Sets the tolerance used to order table cells row by row; should match
    /// the one the table grid is built with.
    pub fn with_cell_cluster_ratio(mut self, ratio: f32) -> Self {
        self.cell_cluster_ratio = ratio;
        self
    }

    pub fn config(&self) -> &OrderingConfig {
        &self.config
    }

    /// Orders the regions of one page.
    ///
    /// `reading_order` of the result is contiguous from 0 and every region
    /// appears exactly once. An empty input yields an empty result.
    pub fn order(&self, regions: Vec<Region>, page_width: u32, page_height: u32) -> OrderingOutcome {
        if regions.is_empty() {
            return OrderingOutcome::default();
        }
        let page_index = regions[0].page_index;
        let boxes: Vec<BoundingBox> = regions.iter().map(|r| r.bbox).collect();
        let labels: Vec<ClassLabel> = regions.iter().map(|r| r.class_label).collect();

        let (mut independents, dependents): (Vec<usize>, Vec<usize>) =
            (0..regions.len()).partition(|&i| !labels[i].is_dependent());

        // Parents are chosen against a provisional order that also places the
        // captions and list items, so "read before" is defined for them.
        let provisional = self.order_independents(&boxes, &labels, &independents, page_width);
        let rank = if dependents.iter().all(|&d| labels[d] == ClassLabel::TableCell) {
            rank_of(regions.len(), provisional.0.iter().map(|p| p.index))
        } else {
            let positioned: Vec<usize> = (0..regions.len())
                .filter(|&i| labels[i] != ClassLabel::TableCell)
                .collect();
            let (placements, _) =
                self.order_independents(&boxes, &labels, &positioned, page_width);
            rank_of(regions.len(), placements.iter().map(|p| p.index))
        };
        let diagonal = (page_width as f32).hypot(page_height as f32);
        let max_distance = self.config.max_attach_distance_ratio * diagonal;

        let mut parent_of: Vec<Option<usize>> = vec![None; regions.len()];
        for &d in &dependents {
            parent_of[d] = find_parent(d, &boxes, &labels, &independents, &rank, max_distance);
            if parent_of[d].is_none() {
                independents.push(d);
            }
        }

        let mut warnings = Vec::new();
        let (placements, unsplit_bands) = if independents.len() == provisional.0.len() {
            provisional
        } else {
            independents.sort_unstable();
            self.order_independents(&boxes, &labels, &independents, page_width)
        };
        if unsplit_bands > 0 {
            warnings.push(LayoutWarning::new(
                WarningKind::NoColumnSplit,
                page_index,
                format!(
                    "{unsplit_bands} band(s) hold side-by-side regions but no column gap; using single-column order"
                ),
            ));
        }

        // Emit each independent followed by its dependents.
        let mut sequence: Vec<(usize, Option<usize>, Option<usize>)> = Vec::with_capacity(regions.len());
        for placement in &placements {
            let parent = placement.index;
            sequence.push((parent, None, placement.column));
            let children: Vec<usize> = dependents
                .iter()
                .copied()
                .filter(|&d| parent_of[d] == Some(parent))
                .collect();
            for child in self.order_children(parent, &children, &boxes, &labels) {
                sequence.push((child, Some(parent), placement.column));
            }
        }

        let mut slots: Vec<Option<Region>> = regions.into_iter().map(Some).collect();
        let parent_ids: Vec<_> = slots
            .iter()
            .map(|r| r.as_ref().map(|r| r.region_id.clone()))
            .collect();
        let ordered: Vec<OrderedRegion> = sequence
            .into_iter()
            .filter_map(|(i, parent, column)| {
                slots[i].take().map(|region| (region, parent, column))
            })
            .enumerate()
            .map(|(reading_order, (region, parent, column))| OrderedRegion {
                region,
                reading_order,
                parent_id: parent.and_then(|p| parent_ids[p].clone()),
                column_index: column,
            })
            .collect();

        debug!(
            target: "layout",
            page_index,
            regions = ordered.len(),
            nested = ordered.iter().filter(|o| o.parent_id.is_some()).count(),
            "resolved reading order"
        );
        OrderingOutcome { ordered, warnings }
    }

    fn split_furniture(
        &self,
        labels: &[ClassLabel],
        indices: &[usize],
    ) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
        if !self.config.separate_headers {
            return (Vec::new(), indices.to_vec(), Vec::new());
        }
        let mut headers = Vec::new();
        let mut body = Vec::new();
        let mut footers = Vec::new();
        for &i in indices {
            match labels[i] {
                ClassLabel::Header => headers.push(i),
                ClassLabel::Footer => footers.push(i),
                _ => body.push(i),
            }
        }
        (headers, body, footers)
    }

    /// Orders independent regions; also returns the number of bands that
    /// needed the single-column fallback.
    fn order_independents(
        &self,
        boxes: &[BoundingBox],
        labels: &[ClassLabel],
        indices: &[usize],
        page_width: u32,
    ) -> (Vec<columns::Placement>, usize) {
        let (mut headers, body, mut footers) = self.split_furniture(labels, indices);
        sort_top_down(boxes, &mut headers);
        sort_top_down(boxes, &mut footers);

        let layout = layout_columns(
            boxes,
            &body,
            page_width as f32,
            self.config.full_width_fraction,
            self.config.column_gap_ratio * page_width as f32,
        );

        let furniture = |index| columns::Placement {
            index,
            column: None,
        };
        let placements = headers
            .into_iter()
            .map(furniture)
            .chain(layout.placements)
            .chain(footers.into_iter().map(furniture))
            .collect();
        (placements, layout.unsplit_bands)
    }

    /// Captions above the parent first, then table cells row-major, then the
    /// remaining children top to bottom.
    fn order_children(
        &self,
        parent: usize,
        children: &[usize],
        boxes: &[BoundingBox],
        labels: &[ClassLabel],
    ) -> Vec<usize> {
        let parent_cy = boxes[parent].center().y;
        let mut above = Vec::new();
        let mut cells = Vec::new();
        let mut rest = Vec::new();
        for &c in children {
            match labels[c] {
                ClassLabel::Caption if boxes[c].center().y < parent_cy => above.push(c),
                ClassLabel::TableCell => cells.push(c),
                _ => rest.push(c),
            }
        }
        sort_top_down(boxes, &mut above);
        sort_top_down(boxes, &mut rest);

        let cell_boxes: Vec<BoundingBox> = cells.iter().map(|&c| boxes[c]).collect();
        let grid = assign_grid(&cell_boxes, self.cell_cluster_ratio);
        let cells = grid.row_major().into_iter().map(|i| cells[i]);

        above.into_iter().chain(cells).chain(rest).collect()
    }
}

fn rank_of(n: usize, order: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut rank = vec![usize::MAX; n];
    for (position, index) in order.enumerate() {
        rank[index] = position;
    }
    rank
}

/// Picks the parent of dependent region `d` among `candidates`.
///
/// Table cells go to the table holding most of their area. Captions and
/// list items go to the closest allowed candidate by centre distance within
/// `max_distance` among those read before them (plus, for captions, the
/// tables and figures below them); ties prefer the earlier candidate.
fn find_parent(
    d: usize,
    boxes: &[BoundingBox],
    labels: &[ClassLabel],
    candidates: &[usize],
    rank: &[usize],
    max_distance: f32,
) -> Option<usize> {
    let allowed = labels[d].parent_candidates();
    let eligible = candidates
        .iter()
        .copied()
        .filter(|&c| c != d && allowed.contains(&labels[c]));

    if labels[d] == ClassLabel::TableCell {
        return eligible
            .map(|c| (c, boxes[d].ioa(&boxes[c])))
            .filter(|(_, ioa)| *ioa >= CELL_CONTAINMENT)
            .min_by(|a, b| b.1.total_cmp(&a.1).then(rank[a.0].cmp(&rank[b.0])))
            .map(|(c, _)| c);
    }

    let centre = boxes[d].center();
    eligible
        .filter(|&c| {
            rank[c] < rank[d] || (labels[d] == ClassLabel::Caption && centre.y < boxes[c].y0)
        })
        .map(|c| (c, centre.distance(&boxes[c].center())))
        .filter(|(_, dist)| *dist <= max_distance)
        .min_by(|a, b| a.1.total_cmp(&b.1).then(rank[a.0].cmp(&rank[b.0])))
        .map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Detection, RegionId};

    fn region(id: &str, label: ClassLabel, b: (f32, f32, f32, f32)) -> Region {
        Region::from_detection(Detection::new(
            id,
            BoundingBox::from_coords(b.0, b.1, b.2, b.3),
            label,
            0.9,
            "test",
            0,
        ))
    }

    fn ids(outcome: &OrderingOutcome) -> Vec<&str> {
        outcome.ordered.iter().map(|o| o.id().as_str()).collect()
    }

    fn assert_contiguous(outcome: &OrderingOutcome) {
        for (i, o) in outcome.ordered.iter().enumerate() {
            assert_eq!(o.reading_order, i);
        }
    }

    #[test]
    fn test_empty_page() {
        let outcome = ReadingOrderResolver::default().order(Vec::new(), 100, 100);
        assert!(outcome.ordered.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_paragraph_before_figure() {
        let regions = vec![
            region("fig", ClassLabel::Figure, (200.0, 0.0, 300.0, 100.0)),
            region("para", ClassLabel::Paragraph, (0.0, 0.0, 110.0, 55.0)),
        ];
        let outcome = ReadingOrderResolver::default().order(regions, 400, 400);
        assert_eq!(ids(&outcome), vec!["para", "fig"]);
        assert_contiguous(&outcome);
    }

    #[test]
    fn test_two_columns_left_column_first() {
        let regions = vec![
            region("r1", ClassLabel::Paragraph, (55.0, 0.0, 100.0, 30.0)),
            region("l2", ClassLabel::Paragraph, (0.0, 40.0, 45.0, 70.0)),
            region("r2", ClassLabel::Paragraph, (55.0, 40.0, 100.0, 70.0)),
            region("l1", ClassLabel::Paragraph, (0.0, 0.0, 45.0, 30.0)),
        ];
        let outcome = ReadingOrderResolver::default().order(regions, 100, 100);
        assert_eq!(ids(&outcome), vec!["l1", "l2", "r1", "r2"]);
        assert_eq!(outcome.ordered[2].column_index, Some(1));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_headers_first_footers_last() {
        let regions = vec![
            region("foot", ClassLabel::Footer, (0.0, 950.0, 100.0, 990.0)),
            region("body", ClassLabel::Paragraph, (0.0, 100.0, 100.0, 400.0)),
            region("head", ClassLabel::Header, (0.0, 0.0, 100.0, 30.0)),
        ];
        let outcome = ReadingOrderResolver::default().order(regions, 1000, 1000);
        assert_eq!(ids(&outcome), vec!["head", "body", "foot"]);
    }

    #[test]
    fn test_caption_nested_under_nearest_figure() {
        let regions = vec![
            region("fig", ClassLabel::Figure, (0.0, 0.0, 100.0, 100.0)),
            region("para", ClassLabel::Paragraph, (0.0, 300.0, 100.0, 400.0)),
            region("cap", ClassLabel::Caption, (0.0, 105.0, 100.0, 120.0)),
        ];
        let outcome = ReadingOrderResolver::default().order(regions, 1000, 1000);
        assert_eq!(ids(&outcome), vec!["fig", "cap", "para"]);
        assert_eq!(outcome.ordered[1].parent_id, Some(RegionId::new("fig")));
        assert_eq!(outcome.ordered[2].parent_id, None);
    }

    #[test]
    fn test_list_item_nests_under_preceding_paragraph() {
        let regions = vec![
            region("A", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 300.0)),
            region("li", ClassLabel::ListItem, (0.0, 310.0, 100.0, 330.0)),
            region("B", ClassLabel::Paragraph, (0.0, 335.0, 100.0, 360.0)),
        ];
        let outcome = ReadingOrderResolver::default().order(regions, 1000, 1000);
        assert_eq!(ids(&outcome), vec!["A", "li", "B"]);
        assert_eq!(outcome.ordered[1].parent_id, Some(RegionId::new("A")));
        assert_eq!(outcome.ordered[2].parent_id, None);
        assert_contiguous(&outcome);
    }

    #[test]
    fn test_list_item_without_preceding_parent_stays_in_place() {
        let regions = vec![
            region("li", ClassLabel::ListItem, (0.0, 0.0, 100.0, 20.0)),
            region("B", ClassLabel::Paragraph, (0.0, 25.0, 100.0, 60.0)),
        ];
        let outcome = ReadingOrderResolver::default().order(regions, 1000, 1000);
        assert_eq!(ids(&outcome), vec!["li", "B"]);
        assert!(outcome.ordered.iter().all(|o| o.parent_id.is_none()));
    }

    #[test]
    fn test_far_caption_stays_independent() {
        let regions = vec![
            region("fig", ClassLabel::Figure, (0.0, 0.0, 100.0, 100.0)),
            region("cap", ClassLabel::Caption, (0.0, 900.0, 100.0, 920.0)),
        ];
        let resolver =
            ReadingOrderResolver::new(OrderingConfig::new().with_max_attach_distance_ratio(0.1));
        let outcome = resolver.order(regions, 1000, 1000);
        assert_eq!(ids(&outcome), vec!["fig", "cap"]);
        assert!(outcome.ordered.iter().all(|o| o.parent_id.is_none()));
    }

    #[test]
    fn test_caption_above_table_precedes_cells() {
        let regions = vec![
            region("c11", ClassLabel::TableCell, (100.0, 120.0, 200.0, 140.0)),
            region("table", ClassLabel::Table, (0.0, 100.0, 200.0, 140.0)),
            region("c00", ClassLabel::TableCell, (0.0, 100.0, 100.0, 120.0)),
            region("cap", ClassLabel::Caption, (0.0, 80.0, 200.0, 95.0)),
            region("c01", ClassLabel::TableCell, (100.0, 100.0, 200.0, 120.0)),
            region("c10", ClassLabel::TableCell, (0.0, 120.0, 100.0, 140.0)),
        ];
        let outcome = ReadingOrderResolver::default().order(regions, 1000, 1000);
        assert_eq!(
            ids(&outcome),
            vec!["table", "cap", "c00", "c01", "c10", "c11"]
        );
        assert!(
            outcome.ordered[1..]
                .iter()
                .all(|o| o.parent_id == Some(RegionId::new("table")))
        );
        assert_contiguous(&outcome);
    }

    #[test]
    fn test_full_width_title_between_columns() {
        let regions = vec![
            region("l1", ClassLabel::Paragraph, (0.0, 0.0, 45.0, 30.0)),
            region("r1", ClassLabel::Paragraph, (55.0, 0.0, 100.0, 30.0)),
            region("title", ClassLabel::Title, (0.0, 40.0, 100.0, 50.0)),
            region("l2", ClassLabel::Paragraph, (0.0, 60.0, 45.0, 90.0)),
            region("r2", ClassLabel::Paragraph, (55.0, 60.0, 100.0, 90.0)),
        ];
        let outcome = ReadingOrderResolver::default().order(regions, 100, 100);
        assert_eq!(ids(&outcome), vec!["l1", "r1", "title", "l2", "r2"]);
    }

    #[test]
    fn test_no_column_split_warning() {
        let regions = vec![
            region("a", ClassLabel::Paragraph, (0.0, 0.0, 50.0, 20.0)),
            region("b", ClassLabel::Paragraph, (50.5, 0.0, 100.0, 20.0)),
        ];
        let outcome = ReadingOrderResolver::default().order(regions, 1000, 1000);
        assert_eq!(ids(&outcome), vec!["a", "b"]);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::NoColumnSplit);
    }
}
