//! Retrieval chunks built from the document tree.

use super::document::{Document, DocumentNode, NodeKind, attr};
use super::export::{numbered_heading_level, render_markdown};
use serde::{Deserialize, Serialize};

/// A run of consecutive blocks rendered as Markdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Position of the chunk in the document.
    pub position: usize,
    /// Page the chunk starts on.
    pub page_index: usize,
    pub char_count: usize,
    /// Enclosing headings as `(level, text)`, outermost first.
    pub heading_path: Vec<(usize, String)>,
}

struct ChunkBuilder {
    max_chars: usize,
    chunks: Vec<Chunk>,
    current: String,
    current_page: usize,
    current_path: Vec<(usize, String)>,
    heading_path: Vec<(usize, String)>,
}

impl ChunkBuilder {
    fn flush(&mut self) {
        let content = self.current.trim();
        if !content.is_empty() {
            let position = self.chunks.len();
            self.chunks.push(Chunk {
                content: content.to_string(),
                metadata: ChunkMetadata {
                    position,
                    page_index: self.current_page,
                    char_count: content.chars().count(),
                    heading_path: self.current_path.clone(),
                },
            });
        }
        self.current.clear();
    }

    fn push_block(&mut self, block: &str, page_index: usize) {
        if block.trim().is_empty() {
            return;
        }
        let len = block.chars().count();
        if !self.current.is_empty() && self.current.chars().count() + len > self.max_chars {
            self.flush();
        }
        if self.current.is_empty() {
            self.current_page = page_index;
            self.current_path = self.heading_path.clone();
        }
        self.current.push_str(block);
    }

    fn enter_heading(&mut self, level: usize, text: &str) {
        // A heading always opens a new chunk.
        self.flush();
        self.heading_path.retain(|(l, _)| *l < level);
        self.heading_path.push((level, text.to_string()));
    }
}

impl Document {
    /// Splits the document into retrieval chunks of roughly `max_chars`
    /// characters.
    ///
    /// Chunks hold whole top-level blocks: a table (with its rows and
    /// captions) is never split even when it alone exceeds `max_chars`.
    /// Headers and footers are skipped. Each title starts a new chunk and
    /// updates the heading path carried by the chunks that follow it.
    pub fn to_chunks(&self, max_chars: usize) -> Vec<Chunk> {
        let mut builder = ChunkBuilder {
            max_chars: max_chars.max(1),
            chunks: Vec::new(),
            current: String::new(),
            current_page: 0,
            current_path: Vec::new(),
            heading_path: Vec::new(),
        };

        for page in &self.pages {
            for block in &page.children {
                if block.kind.is_page_furniture() {
                    continue;
                }
                if block.kind == NodeKind::Title {
                    if let Some(text) = block_title(block) {
                        let level = numbered_heading_level(&text)
                            .or_else(|| block.attribute_u64(attr::HEADING_LEVEL).map(|l| l as usize))
                            .unwrap_or(2);
                        builder.enter_heading(level, &text);
                    }
                }
                let mut rendered = String::new();
                render_markdown(block, &mut rendered);
                builder.push_block(&rendered, page.page_index);
            }
        }
        builder.flush();
        builder.chunks
    }
}

fn block_title(block: &DocumentNode) -> Option<String> {
    block
        .text
        .clone()
        .or_else(|| block.children.iter().find(|c| c.is_body()).and_then(|c| c.text.clone()))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::BoundingBox;

    fn node(id: &str, kind: NodeKind, text: &str) -> DocumentNode {
        let mut n = DocumentNode::new(id, kind, BoundingBox::from_coords(0.0, 0.0, 1.0, 1.0), 0);
        n.text = Some(text.to_string());
        n
    }

    #[test]
    fn test_chunks_follow_headings() {
        let mut root = DocumentNode::page_root(0, 100, 100);
        root.children.push(node("h", NodeKind::Header, "Journal of Things"));
        root.children.push(node("t1", NodeKind::Title, "1 Introduction"));
        root.children.push(node("p1", NodeKind::Paragraph, "First paragraph."));
        root.children.push(node("t2", NodeKind::Title, "1.1 Background"));
        root.children.push(node("p2", NodeKind::Paragraph, "Second paragraph."));
        let doc = Document::new("doc", vec![root]);

        let chunks = doc.to_chunks(1000);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.contains("First paragraph."));
        assert!(!chunks[0].content.contains("Journal"));
        assert_eq!(chunks[0].metadata.heading_path, vec![(1, "1 Introduction".to_string())]);
        assert_eq!(
            chunks[1].metadata.heading_path,
            vec![
                (1, "1 Introduction".to_string()),
                (2, "1.1 Background".to_string())
            ]
        );
        assert_eq!(chunks[1].metadata.position, 1);
    }

    #[test]
    fn test_small_budget_splits_blocks_but_not_tables() {
        let mut root = DocumentNode::page_root(0, 100, 100);
        root.children.push(node("a", NodeKind::Paragraph, "aaaaaaaaaa"));
        root.children.push(node("b", NodeKind::Paragraph, "bbbbbbbbbb"));
        let mut table = DocumentNode::new("tb", NodeKind::Table, BoundingBox::from_coords(0.0, 0.0, 1.0, 1.0), 0);
        let mut row = DocumentNode::new("r", NodeKind::TableRow, BoundingBox::from_coords(0.0, 0.0, 1.0, 1.0), 0);
        row.children.push(node("c0", NodeKind::TableCell, "long cell text"));
        row.children.push(node("c1", NodeKind::TableCell, "another long cell"));
        table.children.push(row);
        root.children.push(table);
        let doc = Document::new("doc", vec![root]);

        let chunks = doc.to_chunks(12);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[2].content.starts_with("<table"));
        assert!(chunks[2].content.contains("another long cell"));
        assert!(chunks[2].metadata.char_count > 12);
    }
}
