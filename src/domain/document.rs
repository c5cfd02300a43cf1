//! Document tree types.
//!
//! A [`Document`] owns one root [`DocumentNode`] per page. Parents own their
//! children by value; there are no back-references, so the tree cannot form
//! cycles. Pre-order traversal of a page root yields its nodes in reading order.

use super::detection::ClassLabel;
use crate::core::errors::{LayoutWarning, NodeError};
use crate::processors::BoundingBox;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Attribute keys written by the pipeline.
pub mod attr {
    /// Heading level of titles and headers (1 = most prominent).
    pub const HEADING_LEVEL: &str = "heading_level";
    /// Column within the node's horizontal band.
    pub const COLUMN_INDEX: &str = "column_index";
    /// Position of the source region in page reading order.
    pub const READING_ORDER: &str = "reading_order";
    /// Confidence of the source region.
    pub const CONFIDENCE: &str = "confidence";
    /// Id of the source region.
    pub const REGION_ID: &str = "region_id";
    /// Ids of detections merged into the source region.
    pub const SUPERSEDED_IDS: &str = "superseded_ids";
    /// `"body"` on the leaf that carries a container region's own text.
    pub const ROLE: &str = "role";
    /// Grid row of a table row or cell.
    pub const ROW: &str = "row";
    /// Grid column of a table cell.
    pub const COL: &str = "col";
    /// Number of grid rows of a table.
    pub const ROWS: &str = "rows";
    /// Number of grid columns of a table.
    pub const COLS: &str = "cols";
    /// Set on synthetic table cells that fill a missing grid slot.
    pub const EMPTY: &str = "empty";
    /// Set on table cells that collided with another cell's grid slot.
    pub const GRID_CONFLICT: &str = "grid_conflict";
    /// OCR failure reason.
    pub const OCR_ERROR: &str = "ocr_error";
    /// Figure description produced by the describer collaborator.
    pub const DESCRIPTION: &str = "description";
    /// Figure description failure reason.
    pub const DESCRIBE_ERROR: &str = "describe_error";
    /// Page-level failure reason, set on page roots.
    pub const PAGE_ERROR: &str = "page_error";
    /// Page image width, set on page roots.
    pub const WIDTH: &str = "width";
    /// Page image height, set on page roots.
    pub const HEIGHT: &str = "height";
}

/// Kind of a document tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Page root.
    Page,
    /// Title or section heading.
    Title,
    /// Text block.
    Paragraph,
    /// List item.
    ListItem,
    /// Table container.
    Table,
    /// Row of a reconstructed table grid.
    TableRow,
    /// Cell of a reconstructed table grid.
    TableCell,
    /// Figure.
    Figure,
    /// Caption.
    Caption,
    /// Running header.
    Header,
    /// Running footer.
    Footer,
}

impl From<ClassLabel> for NodeKind {
    fn from(label: ClassLabel) -> Self {
        match label {
            ClassLabel::Title => NodeKind::Title,
            ClassLabel::Paragraph => NodeKind::Paragraph,
            ClassLabel::Table => NodeKind::Table,
            ClassLabel::Figure => NodeKind::Figure,
            ClassLabel::Caption => NodeKind::Caption,
            ClassLabel::ListItem => NodeKind::ListItem,
            ClassLabel::Header => NodeKind::Header,
            ClassLabel::Footer => NodeKind::Footer,
            ClassLabel::TableCell => NodeKind::TableCell,
        }
    }
}

impl NodeKind {
    /// Returns the snake_case name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Page => "page",
            NodeKind::Title => "title",
            NodeKind::Paragraph => "paragraph",
            NodeKind::ListItem => "list_item",
            NodeKind::Table => "table",
            NodeKind::TableRow => "table_row",
            NodeKind::TableCell => "table_cell",
            NodeKind::Figure => "figure",
            NodeKind::Caption => "caption",
            NodeKind::Header => "header",
            NodeKind::Footer => "footer",
        }
    }

    /// Whether the node is a running header or footer.
    pub fn is_page_furniture(&self) -> bool {
        matches!(self, NodeKind::Header | NodeKind::Footer)
    }
}

/// Hierarchical unit of a parsed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    /// Unique id within the document.
    pub node_id: String,
    /// What the node represents.
    pub kind: NodeKind,
    /// Box in page pixels.
    pub bbox: BoundingBox,
    /// Page the node belongs to.
    pub page_index: usize,
    /// Children in reading order.
    pub children: Vec<DocumentNode>,
    /// Recognized text; `None` until attached, or when recognition failed.
    pub text: Option<String>,
    /// Free-form attributes (see [`attr`]).
    pub attributes: BTreeMap<String, Value>,
}

impl DocumentNode {
    /// Creates a childless node without text.
    pub fn new(
        node_id: impl Into<String>,
        kind: NodeKind,
        bbox: BoundingBox,
        page_index: usize,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            bbox,
            page_index,
            children: Vec::new(),
            text: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Creates an empty page root covering a `width` x `height` page.
    pub fn page_root(page_index: usize, width: u32, height: u32) -> Self {
        Self::new(
            format!("p{page_index}"),
            NodeKind::Page,
            BoundingBox::page(width, height),
            page_index,
        )
        .with_attribute(attr::WIDTH, width)
        .with_attribute(attr::HEIGHT, height)
    }

    /// Sets an attribute, builder style.
    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Sets an attribute.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    /// Reads an attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Reads an unsigned integer attribute.
    pub fn attribute_u64(&self, key: &str) -> Option<u64> {
        self.attribute(key).and_then(Value::as_u64)
    }

    /// Reads a string attribute.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attribute(key).and_then(Value::as_str)
    }

    /// Returns true if the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns true for the leaf holding a container region's own text.
    pub fn is_body(&self) -> bool {
        self.attribute_str(attr::ROLE) == Some("body")
    }

    /// Iterates over this node and its descendants in pre-order (reading order).
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter { stack: vec![self] }
    }

    /// Number of nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    /// Visits every leaf of this subtree mutably, in reading order.
    pub fn for_each_leaf_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut DocumentNode),
    {
        if self.children.is_empty() {
            f(self);
        } else {
            for child in &mut self.children {
                child.for_each_leaf_mut(f);
            }
        }
    }

    /// Visits every node of this subtree mutably, in pre-order.
    pub fn for_each_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut DocumentNode),
    {
        f(self);
        for child in &mut self.children {
            child.for_each_mut(f);
        }
    }

    /// Finds a node by id.
    pub fn find(&self, node_id: &str) -> Option<&DocumentNode> {
        self.iter().find(|n| n.node_id == node_id)
    }

    /// Concatenates the text of all leaves, separated by `sep`.
    pub fn collect_text(&self, sep: &str) -> String {
        self.iter()
            .filter(|n| n.is_leaf())
            .filter_map(|n| n.text.as_deref())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(sep)
    }
}

/// Pre-order iterator over a node subtree.
pub struct NodeIter<'a> {
    stack: Vec<&'a DocumentNode>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a DocumentNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// A figure crop embedded in the output as base64 PNG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureImage {
    /// Id of the figure node.
    pub node_id: String,
    /// Page of the figure.
    pub page_index: usize,
    /// File-style name, `<node_id>.png`.
    pub name: String,
    /// Crop width in pixels.
    pub width: u32,
    /// Crop height in pixels.
    pub height: u32,
    /// Base64-encoded PNG bytes.
    pub data: String,
}

/// A parsed document: one root node per page plus run diagnostics.
///
/// Frozen once produced: fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub(crate) source_id: String,
    pub(crate) pages: Vec<DocumentNode>,
    pub(crate) metadata: BTreeMap<String, Value>,
    pub(crate) complete: bool,
    #[serde(default)]
    pub(crate) cancelled: bool,
    #[serde(default)]
    pub(crate) errors: Vec<NodeError>,
    #[serde(default)]
    pub(crate) warnings: Vec<LayoutWarning>,
    #[serde(default)]
    pub(crate) images: Vec<FigureImage>,
}

impl Document {
    /// Wraps page roots into a document without any recorded errors.
    ///
    /// Pages are sorted by `page_index`. The document is complete unless a
    /// node already carries an `ocr_error` or `page_error` attribute.
    pub fn new(source_id: impl Into<String>, mut pages: Vec<DocumentNode>) -> Self {
        pages.sort_by_key(|p| p.page_index);
        let mut document = Self {
            source_id: source_id.into(),
            pages,
            metadata: BTreeMap::new(),
            complete: true,
            cancelled: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            images: Vec::new(),
        };
        document.refresh_completeness();
        document
    }

    /// Id of the input this document was parsed from.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Page roots ordered by page index.
    pub fn pages(&self) -> &[DocumentNode] {
        &self.pages
    }

    /// Run metadata (page counts, timings).
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// True when every page was processed and no node recorded an error.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// True when the run was cancelled before every page was processed.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Per-node and per-page errors.
    pub fn errors(&self) -> &[NodeError] {
        &self.errors
    }

    /// Recoverable layout diagnostics.
    pub fn warnings(&self) -> &[LayoutWarning] {
        &self.warnings
    }

    /// Embedded figure crops.
    pub fn images(&self) -> &[FigureImage] {
        &self.images
    }

    /// Iterates over every node of every page in reading order.
    pub fn nodes(&self) -> impl Iterator<Item = &DocumentNode> {
        self.pages.iter().flat_map(|p| p.iter())
    }

    /// Finds a node by id across pages.
    pub fn find(&self, node_id: &str) -> Option<&DocumentNode> {
        self.nodes().find(|n| n.node_id == node_id)
    }

    /// Plain text of the whole document, one block per line, pages separated by a blank line.
    pub fn plain_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.collect_text("\n"))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub(crate) fn set_metadata(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Recomputes `complete` from errors, error attributes and cancellation.
    pub(crate) fn refresh_completeness(&mut self) {
        let node_failed = self.nodes().any(|n| {
            n.attributes.contains_key(attr::OCR_ERROR)
                || n.attributes.contains_key(attr::DESCRIBE_ERROR)
                || n.attributes.contains_key(attr::PAGE_ERROR)
        });
        self.complete = !self.cancelled && self.errors.is_empty() && !node_failed;
    }

    /// Converts the document to a JSON value.
    pub fn to_json_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Serializes the document as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Saves the document to `output_dir`.
    ///
    /// Writes `<stem>.json`, `<stem>.md` and `<stem>.html` as requested, where
    /// `stem` is the file stem of the source id.
    pub fn save_results(
        &self,
        output_dir: impl AsRef<Path>,
        to_json: bool,
        to_markdown: bool,
        to_html: bool,
    ) -> std::io::Result<()> {
        let output_dir = output_dir.as_ref();
        if !output_dir.exists() {
            std::fs::create_dir_all(output_dir)?;
        }

        let stem = Path::new(&self.source_id)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("result");

        if to_json {
            let json_file = std::fs::File::create(output_dir.join(format!("{stem}.json")))?;
            serde_json::to_writer_pretty(json_file, self)?;
        }
        if to_markdown {
            std::fs::write(output_dir.join(format!("{stem}.md")), self.to_markdown())?;
        }
        if to_html {
            std::fs::write(output_dir.join(format!("{stem}.html")), self.to_html())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str, kind: NodeKind, text: Option<&str>) -> DocumentNode {
        let mut n = DocumentNode::new(id, kind, BoundingBox::from_coords(0.0, 0.0, 1.0, 1.0), 0);
        n.text = text.map(str::to_string);
        n
    }

    #[test]
    fn test_preorder_traversal() {
        let mut root = DocumentNode::page_root(0, 100, 100);
        let mut figure = leaf("f", NodeKind::Figure, None);
        figure.children.push(leaf("c", NodeKind::Caption, Some("Fig. 1")));
        root.children.push(leaf("t", NodeKind::Title, Some("Intro")));
        root.children.push(figure);
        root.children.push(leaf("p", NodeKind::Paragraph, Some("Body")));

        let ids: Vec<&str> = root.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["p0", "t", "f", "c", "p"]);
        assert_eq!(root.collect_text(" | "), "Intro | Fig. 1 | Body");
    }

    #[test]
    fn test_empty_page_serializes_children() {
        let root = DocumentNode::page_root(3, 10, 20);
        let value = serde_json::to_value(&root).unwrap();
        assert_eq!(value["kind"], "page");
        assert_eq!(value["children"], serde_json::json!([]));
        assert_eq!(value["text"], Value::Null);
        assert_eq!(value["bbox"], serde_json::json!([0.0, 0.0, 10.0, 20.0]));
    }

    #[test]
    fn test_completeness_tracks_ocr_errors() {
        let mut root = DocumentNode::page_root(0, 10, 10);
        root.children.push(leaf("a", NodeKind::Paragraph, Some("ok")));
        let doc = Document::new("doc", vec![root.clone()]);
        assert!(doc.is_complete());

        root.children[0].set_attribute(attr::OCR_ERROR, "boom");
        let doc = Document::new("doc", vec![root]);
        assert!(!doc.is_complete());
    }

    #[test]
    fn test_pages_sorted_by_index() {
        let doc = Document::new(
            "doc",
            vec![
                DocumentNode::page_root(1, 10, 10),
                DocumentNode::page_root(0, 10, 10),
            ],
        );
        let order: Vec<usize> = doc.pages().iter().map(|p| p.page_index).collect();
        assert_eq!(order, vec![0, 1]);
    }
}
