//! Document tree construction.
//!
//! Turns a page's ordered regions into a page root [`DocumentNode`]:
//! independent regions become children of the root in reading order and
//! dependent regions become children of their parent. Tables get their cells
//! arranged into a row/column grid; titles and headers get a heading level.

mod heading;
mod table;

pub use heading::assign_heading_levels;

use crate::core::config::{ConfigError, ConfigValidator};
use crate::core::errors::LayoutWarning;
use crate::domain::{ClassLabel, DocumentNode, NodeKind, OrderedRegion, RegionId, attr};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Configuration for [`StructureBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureConfig {
    /// Deepest heading level assigned from box heights.
    /// Default: 3
    #[serde(default = "StructureConfig::default_max_heading_level")]
    pub max_heading_level: u8,
    /// Tolerance for grouping cell centres into rows and columns, as a
    /// fraction of the median cell height (rows) or width (columns).
    /// Default: 0.5
    #[serde(default = "StructureConfig::default_cell_cluster_ratio")]
    pub cell_cluster_ratio: f32,
}

impl StructureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_heading_level(mut self, level: u8) -> Self {
        self.max_heading_level = level;
        self
    }

    pub fn with_cell_cluster_ratio(mut self, ratio: f32) -> Self {
        self.cell_cluster_ratio = ratio;
        self
    }

    fn default_max_heading_level() -> u8 {
        3
    }

    fn default_cell_cluster_ratio() -> f32 {
        0.5
    }
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            max_heading_level: Self::default_max_heading_level(),
            cell_cluster_ratio: Self::default_cell_cluster_ratio(),
        }
    }
}

impl ConfigValidator for StructureConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=6).contains(&self.max_heading_level) {
            return Err(ConfigError::ValidationFailed {
                message: format!(
                    "structure.max_heading_level must be in 1..=6, got {}",
                    self.max_heading_level
                ),
            });
        }
        self.validate_positive("structure.cell_cluster_ratio", self.cell_cluster_ratio)?;
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// A page tree plus the diagnostics produced while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureOutcome {
    pub root: DocumentNode,
    pub warnings: Vec<LayoutWarning>,
}

/// Builds page trees from ordered regions.
#[derive(Debug, Clone, Default)]
pub struct StructureBuilder {
    config: StructureConfig,
}

impl StructureBuilder {
    pub fn new(config: StructureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StructureConfig {
        &self.config
    }

    /// Builds the (text-less) tree of one page.
    ///
    /// `ordered` must be in reading order with parents preceding their
    /// children, as produced by the reading-order resolver.
    pub fn build(
        &self,
        ordered: &[OrderedRegion],
        page_index: usize,
        page_width: u32,
        page_height: u32,
    ) -> StructureOutcome {
        let mut root = DocumentNode::page_root(page_index, page_width, page_height);
        let levels = assign_heading_levels(ordered, self.config.max_heading_level);

        let known: HashMap<&RegionId, usize> =
            ordered.iter().enumerate().map(|(i, o)| (o.id(), i)).collect();
        let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut top_level: Vec<usize> = Vec::new();
        let mut nodes: Vec<Option<DocumentNode>> = Vec::with_capacity(ordered.len());

        for (i, o) in ordered.iter().enumerate() {
            nodes.push(Some(region_node(o, levels.get(o.id()).copied())));
            match o.parent_id.as_ref().and_then(|p| known.get(p)) {
                Some(&parent) => children.entry(parent).or_default().push(i),
                None => top_level.push(i),
            }
        }
        let mut child_nodes: HashMap<usize, Vec<DocumentNode>> = children
            .into_iter()
            .map(|(parent, kids)| {
                let kids = kids.into_iter().filter_map(|i| nodes[i].take()).collect();
                (parent, kids)
            })
            .collect();

        let mut warnings = Vec::new();
        for i in top_level {
            let Some(mut node) = nodes[i].take() else {
                continue;
            };
            if let Some(kids) = child_nodes.remove(&i) {
                self.adopt(&mut node, kids, ordered[i].region.class_label, &mut warnings);
            }
            root.children.push(node);
        }

        debug!(
            target: "layout",
            page_index,
            nodes = root.node_count(),
            "built page tree"
        );
        StructureOutcome { root, warnings }
    }

    /// Attaches dependent nodes to their parent node.
    ///
    /// A parent whose own pixels still need transcribing gets a leading body
    /// leaf, so its text is read exactly once: text-bearing parents always,
    /// tables only when no cells were detected for them.
    fn adopt(
        &self,
        parent: &mut DocumentNode,
        kids: Vec<DocumentNode>,
        label: ClassLabel,
        warnings: &mut Vec<LayoutWarning>,
    ) {
        if parent.kind != NodeKind::Table {
            if label.is_text_bearing() {
                parent.children.push(body_leaf(parent));
            }
            parent.children.extend(kids);
            return;
        }

        let (cells, others): (Vec<DocumentNode>, Vec<DocumentNode>) =
            kids.into_iter().partition(|k| k.kind == NodeKind::TableCell);

        // Captions above the table come first, the body next, the rest after.
        let (before, after): (Vec<DocumentNode>, Vec<DocumentNode>) = others
            .into_iter()
            .partition(|k| k.bbox.center().y < parent.bbox.center().y);
        parent.children.extend(before);
        if cells.is_empty() {
            let body = body_leaf(parent);
            parent.children.push(body);
        } else {
            let grid = table::build_grid(parent, cells, self.config.cell_cluster_ratio);
            parent.set_attribute(attr::ROWS, grid.n_rows);
            parent.set_attribute(attr::COLS, grid.n_cols);
            warnings.extend(grid.warnings);
            parent.children.extend(grid.rows);
        }
        parent.children.extend(after);
    }
}

/// Leaf standing for the parent's own content once it has children.
fn body_leaf(parent: &DocumentNode) -> DocumentNode {
    let mut body = DocumentNode::new(
        format!("{}-body", parent.node_id),
        parent.kind,
        parent.bbox,
        parent.page_index,
    )
    .with_attribute(attr::ROLE, "body");
    if let Some(level) = parent.attribute(attr::HEADING_LEVEL).cloned() {
        body.set_attribute(attr::HEADING_LEVEL, level);
    }
    body
}

fn region_node(o: &OrderedRegion, heading_level: Option<u8>) -> DocumentNode {
    let region = &o.region;
    let mut node = DocumentNode::new(
        region.region_id.as_str(),
        NodeKind::from(region.class_label),
        region.bbox,
        region.page_index,
    )
    .with_attribute(attr::READING_ORDER, o.reading_order)
    .with_attribute(attr::REGION_ID, region.region_id.as_str())
    .with_attribute(attr::CONFIDENCE, region.confidence);

    if !region.superseded_ids.is_empty() {
        let ids: Vec<String> = region.superseded_ids.iter().map(|id| id.to_string()).collect();
        node.set_attribute(attr::SUPERSEDED_IDS, ids);
    }
    if let Some(column) = o.column_index {
        node.set_attribute(attr::COLUMN_INDEX, column);
    }
    if let Some(level) = heading_level {
        node.set_attribute(attr::HEADING_LEVEL, level);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Detection, Region};
    use crate::processors::BoundingBox;

    fn ordered(
        id: &str,
        label: ClassLabel,
        b: (f32, f32, f32, f32),
        reading_order: usize,
        parent: Option<&str>,
    ) -> OrderedRegion {
        OrderedRegion {
            region: Region::from_detection(Detection::new(
                id,
                BoundingBox::from_coords(b.0, b.1, b.2, b.3),
                label,
                0.9,
                "m",
                0,
            )),
            reading_order,
            parent_id: parent.map(RegionId::new),
            column_index: Some(0),
        }
    }

    #[test]
    fn test_empty_page_has_no_children() {
        let outcome = StructureBuilder::default().build(&[], 0, 100, 200);
        assert!(outcome.root.children.is_empty());
        assert_eq!(outcome.root.kind, NodeKind::Page);
        assert_eq!(outcome.root.attribute_u64(attr::HEIGHT), Some(200));
    }

    #[test]
    fn test_dependents_nest_under_parent() {
        let regions = vec![
            ordered("t", ClassLabel::Title, (0.0, 0.0, 100.0, 30.0), 0, None),
            ordered("f", ClassLabel::Figure, (0.0, 40.0, 100.0, 140.0), 1, None),
            ordered("c", ClassLabel::Caption, (0.0, 145.0, 100.0, 160.0), 2, Some("f")),
            ordered("p", ClassLabel::Paragraph, (0.0, 170.0, 100.0, 200.0), 3, None),
        ];
        let outcome = StructureBuilder::default().build(&regions, 0, 100, 200);
        let root = &outcome.root;
        let kinds: Vec<NodeKind> = root.children.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NodeKind::Title, NodeKind::Figure, NodeKind::Paragraph]);
        assert_eq!(root.children[1].children[0].node_id, "c");
        assert_eq!(root.children[0].attribute_u64(attr::HEADING_LEVEL), Some(1));
        assert_eq!(root.children[2].attribute_u64(attr::READING_ORDER), Some(3));

        let order: Vec<&str> = root.iter().skip(1).map(|n| n.node_id.as_str()).collect();
        assert_eq!(order, vec!["t", "f", "c", "p"]);
    }

    #[test]
    fn test_text_parent_gets_body_leaf() {
        let regions = vec![
            ordered("p", ClassLabel::Paragraph, (0.0, 0.0, 100.0, 50.0), 0, None),
            ordered("li", ClassLabel::ListItem, (0.0, 55.0, 100.0, 65.0), 1, Some("p")),
        ];
        let outcome = StructureBuilder::default().build(&regions, 0, 100, 100);
        let paragraph = &outcome.root.children[0];
        assert_eq!(paragraph.children.len(), 2);
        assert!(paragraph.children[0].is_body());
        assert_eq!(paragraph.children[0].kind, NodeKind::Paragraph);
        assert_eq!(paragraph.children[1].kind, NodeKind::ListItem);
    }

    #[test]
    fn test_table_grid_with_caption() {
        let regions = vec![
            ordered("tb", ClassLabel::Table, (0.0, 20.0, 100.0, 60.0), 0, None),
            ordered("cap", ClassLabel::Caption, (0.0, 0.0, 100.0, 15.0), 1, Some("tb")),
            ordered("a", ClassLabel::TableCell, (0.0, 20.0, 50.0, 40.0), 2, Some("tb")),
            ordered("b", ClassLabel::TableCell, (50.0, 20.0, 100.0, 40.0), 3, Some("tb")),
            ordered("c", ClassLabel::TableCell, (0.0, 40.0, 50.0, 60.0), 4, Some("tb")),
        ];
        let outcome = StructureBuilder::default().build(&regions, 0, 100, 100);
        let table = &outcome.root.children[0];
        assert_eq!(table.attribute_u64(attr::ROWS), Some(2));
        assert_eq!(table.attribute_u64(attr::COLS), Some(2));
        let kinds: Vec<NodeKind> = table.children.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NodeKind::Caption, NodeKind::TableRow, NodeKind::TableRow]);
        assert_eq!(table.children[2].children.len(), 2);
        assert!(table.children[2].children[1].attribute(attr::EMPTY).is_some());
    }

    #[test]
    fn test_captioned_table_without_cells_keeps_body_leaf() {
        let regions = vec![
            ordered("tb", ClassLabel::Table, (0.0, 20.0, 100.0, 60.0), 0, None),
            ordered("cap", ClassLabel::Caption, (0.0, 0.0, 100.0, 15.0), 1, Some("tb")),
        ];
        let outcome = StructureBuilder::default().build(&regions, 0, 100, 100);
        let table = &outcome.root.children[0];
        let ids: Vec<&str> = table.children.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["cap", "tb-body"]);
        assert!(table.children[1].is_body());
        assert!(table.children[1].is_leaf());
        assert_eq!(table.children[1].kind, NodeKind::Table);
        assert!(table.attribute(attr::ROWS).is_none());
    }

    #[test]
    fn test_superseded_ids_recorded() {
        let mut o = ordered("a", ClassLabel::Paragraph, (0.0, 0.0, 10.0, 10.0), 0, None);
        o.region.superseded_ids.push(RegionId::new("b"));
        let outcome = StructureBuilder::default().build(&[o], 0, 10, 10);
        assert_eq!(
            outcome.root.children[0].attribute(attr::SUPERSEDED_IDS),
            Some(&serde_json::json!(["b"]))
        );
    }
}
