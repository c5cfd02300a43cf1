//! Markdown and HTML renderings of a [`Document`].

use super::document::{Document, DocumentNode, NodeKind, attr};
use once_cell::sync::Lazy;
use regex::Regex;

/// Section numbering at the start of a heading: `1`, `1.2.3`, `(2)`, `一、`, `IV.`.
static TITLE_NUMBERING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        (
            [1-9][0-9]*(?:\.[1-9][0-9]*)*[\.、]?
            |
            [(（][1-9][0-9]*(?:\.[1-9][0-9]*)*[)）]
            |
            [一二三四五六七八九十百千零][、.]?
            |
            [(（][一二三四五六七八九十百千零]+[)）]
            |
            (?:I|II|III|IV|V|VI|VII|VIII|IX|X)(?:\.|\b)
        )
        \s+
        \S
    ",
    )
    .expect("title numbering regex is valid")
});

/// Heading level implied by a title's section numbering (`1.2 Methods` -> 2).
///
/// Returns `None` when the title is not numbered.
pub fn numbered_heading_level(title: &str) -> Option<usize> {
    let captures = TITLE_NUMBERING_REGEX.captures(title)?;
    let numbering = captures.get(1)?.as_str().trim().trim_end_matches(['.', '、']);
    let level = if numbering.contains('.') {
        numbering.matches('.').count() + 1
    } else {
        1
    };
    Some(level.clamp(1, 6))
}

fn clean_line_breaks(text: &str) -> String {
    text.replace("-\n", "").replace('\n', " ")
}

fn heading_level(node: &DocumentNode, text: &str) -> usize {
    numbered_heading_level(text)
        .or_else(|| node.attribute_u64(attr::HEADING_LEVEL).map(|l| l as usize))
        .unwrap_or(2)
        .clamp(1, 6)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Rows of a table node as `(row nodes, other children before, other children after)`.
fn split_table_children(table: &DocumentNode) -> (Vec<&DocumentNode>, Vec<&DocumentNode>, Vec<&DocumentNode>) {
    let mut before = Vec::new();
    let mut rows = Vec::new();
    let mut after = Vec::new();
    for child in &table.children {
        if child.kind == NodeKind::TableRow {
            rows.push(child);
        } else if rows.is_empty() {
            before.push(child);
        } else {
            after.push(child);
        }
    }
    (rows, before, after)
}

fn table_html(rows: &[&DocumentNode], border: &str) -> String {
    let mut html = format!("<table{border}>");
    for row in rows {
        html.push_str("<tr>");
        for cell in &row.children {
            html.push_str("<td>");
            if let Some(text) = cell.text.as_deref().or_else(|| {
                cell.children
                    .first()
                    .and_then(|c| c.text.as_deref())
            }) {
                html.push_str(&escape_html(text));
            }
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}

impl Document {
    /// Renders the document as Markdown.
    ///
    /// Headers and footers are omitted; tables are embedded as HTML; figures
    /// render their description when one was produced.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        for page in &self.pages {
            for child in &page.children {
                render_markdown(child, &mut md);
            }
        }
        md.trim().to_string()
    }

    /// Renders the document as a standalone HTML page.
    pub fn to_html(&self) -> String {
        let mut html = String::from(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n</head>\n<body>\n",
        );
        for page in &self.pages {
            html.push_str(&format!(
                "<section class=\"page\" data-page=\"{}\">\n",
                page.page_index
            ));
            for child in &page.children {
                render_html(child, &mut html);
            }
            html.push_str("</section>\n");
        }
        html.push_str("</body>\n</html>\n");
        html
    }
}

pub(crate) fn render_markdown(node: &DocumentNode, md: &mut String) {
    match node.kind {
        NodeKind::Header | NodeKind::Footer | NodeKind::Page => {}
        NodeKind::Title => {
            if let Some(text) = &node.text {
                let text = clean_line_breaks(text);
                md.push('\n');
                md.push_str(&"#".repeat(heading_level(node, &text)));
                md.push(' ');
                md.push_str(&text);
                md.push_str("\n\n");
            }
        }
        NodeKind::Paragraph => {
            if let Some(text) = &node.text {
                md.push_str(&clean_line_breaks(text));
                md.push_str("\n\n");
            }
        }
        NodeKind::ListItem => {
            if let Some(text) = &node.text {
                md.push_str("- ");
                md.push_str(&clean_line_breaks(text));
                md.push('\n');
            }
        }
        NodeKind::Caption => {
            if let Some(text) = &node.text {
                md.push('*');
                md.push_str(&clean_line_breaks(text));
                md.push_str("*\n\n");
            }
        }
        NodeKind::Figure => {
            if node.is_leaf() || node.children.iter().all(|c| c.kind == NodeKind::Caption) {
                match node.attribute_str(attr::DESCRIPTION) {
                    Some(description) => {
                        md.push_str("> ");
                        md.push_str(&clean_line_breaks(description));
                        md.push_str("\n\n");
                    }
                    None => md.push_str(&format!("![figure]({}.png)\n\n", node.node_id)),
                }
            }
        }
        NodeKind::Table => {
            let (rows, before, after) = split_table_children(node);
            for child in before {
                render_markdown(child, md);
            }
            if rows.is_empty() {
                match &node.text {
                    Some(text) => {
                        md.push_str(&clean_line_breaks(text));
                        md.push_str("\n\n");
                    }
                    // The body leaf renders the table's own text.
                    None if node.children.iter().any(|c| c.is_body()) => {}
                    None => md.push_str("[table]\n\n"),
                }
            } else {
                md.push_str(&table_html(&rows, " border=\"1\""));
                md.push_str("\n\n");
            }
            for child in after {
                render_markdown(child, md);
            }
            return;
        }
        NodeKind::TableRow | NodeKind::TableCell => {
            if let Some(text) = &node.text {
                md.push_str(&clean_line_breaks(text));
                md.push_str("\n\n");
            }
        }
    }

    for child in &node.children {
        render_markdown(child, md);
    }
    if node.kind == NodeKind::ListItem || node.children.iter().any(|c| c.kind == NodeKind::ListItem) {
        md.push('\n');
    }
}

fn render_html(node: &DocumentNode, html: &mut String) {
    let text = node.text.as_deref().map(escape_html);
    match node.kind {
        NodeKind::Page => {}
        NodeKind::Title => {
            if let Some(text) = text {
                let level = heading_level(node, &text);
                html.push_str(&format!("<h{level}>{text}</h{level}>\n"));
            }
        }
        NodeKind::Paragraph | NodeKind::TableRow | NodeKind::TableCell => {
            if let Some(text) = text {
                html.push_str(&format!("<p>{text}</p>\n"));
            }
        }
        NodeKind::ListItem => {
            if let Some(text) = text {
                html.push_str(&format!("<ul><li>{text}</li></ul>\n"));
            }
        }
        NodeKind::Caption => {
            if let Some(text) = text {
                html.push_str(&format!("<figcaption>{text}</figcaption>\n"));
            }
        }
        NodeKind::Header => {
            if let Some(text) = text {
                html.push_str(&format!("<header>{text}</header>\n"));
            }
        }
        NodeKind::Footer => {
            if let Some(text) = text {
                html.push_str(&format!("<footer>{text}</footer>\n"));
            }
        }
        NodeKind::Figure => {
            let alt = node
                .attribute_str(attr::DESCRIPTION)
                .map(escape_html)
                .unwrap_or_else(|| "Figure".to_string());
            html.push_str(&format!("<figure>\n<img alt=\"{alt}\" />\n"));
            for child in &node.children {
                render_html(child, html);
            }
            html.push_str("</figure>\n");
            return;
        }
        NodeKind::Table => {
            let (rows, before, after) = split_table_children(node);
            for child in before {
                render_html(child, html);
            }
            if !rows.is_empty() {
                html.push_str(&table_html(
                    &rows,
                    " border=\"1\" style=\"border-collapse: collapse;\"",
                ));
                html.push('\n');
            } else if let Some(text) = text {
                html.push_str(&format!("<div class=\"table\">{text}</div>\n"));
            }
            for child in after {
                render_html(child, html);
            }
            return;
        }
    }
    for child in &node.children {
        render_html(child, html);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::BoundingBox;

    fn node(id: &str, kind: NodeKind, text: Option<&str>) -> DocumentNode {
        let mut n = DocumentNode::new(id, kind, BoundingBox::from_coords(0.0, 0.0, 1.0, 1.0), 0);
        n.text = text.map(str::to_string);
        n
    }

    #[test]
    fn test_numbered_heading_level() {
        assert_eq!(numbered_heading_level("1 Introduction"), Some(1));
        assert_eq!(numbered_heading_level("1.2 Methods"), Some(2));
        assert_eq!(numbered_heading_level("1.2.3 Details"), Some(3));
        assert_eq!(numbered_heading_level("(2) Scope"), Some(1));
        assert_eq!(numbered_heading_level("Abstract"), None);
    }

    #[test]
    fn test_markdown_rendering() {
        let mut root = DocumentNode::page_root(0, 100, 100);
        root.children.push(
            node("t", NodeKind::Title, Some("Results")).with_attribute(attr::HEADING_LEVEL, 1),
        );
        root.children.push(node("h", NodeKind::Header, Some("Running head")));
        root.children.push(node("p", NodeKind::Paragraph, Some("Some <b> text")));

        let mut table = node("tb", NodeKind::Table, None);
        let mut row = node("r0", NodeKind::TableRow, None);
        row.children.push(node("c00", NodeKind::TableCell, Some("a")));
        row.children.push(node("c01", NodeKind::TableCell, None));
        table.children.push(row);
        table.children.push(node("cap", NodeKind::Caption, Some("Table 1")));
        root.children.push(table);

        let doc = Document::new("doc.png", vec![root]);
        let md = doc.to_markdown();
        assert!(md.starts_with("# Results"), "{md}");
        assert!(!md.contains("Running head"), "{md}");
        assert!(md.contains("<table border=\"1\"><tr><td>a</td><td></td></tr></table>"), "{md}");
        assert!(md.contains("*Table 1*"), "{md}");

        let html = doc.to_html();
        assert!(html.contains("<h1>Results</h1>"), "{html}");
        assert!(html.contains("<p>Some &lt;b&gt; text</p>"), "{html}");
        assert!(html.contains("<header>Running head</header>"), "{html}");
    }

    #[test]
    fn test_transcribed_table_without_grid_keeps_text() {
        let mut root = DocumentNode::page_root(0, 100, 100);
        root.children
            .push(node("tb", NodeKind::Table, Some("Revenue 2023 42")));
        let mut captioned = node("tc", NodeKind::Table, None);
        captioned
            .children
            .push(node("cap", NodeKind::Caption, Some("Table 2")));
        captioned.children.push(
            node("tc-body", NodeKind::Table, Some("Costs 2023 7")).with_attribute(attr::ROLE, "body"),
        );
        root.children.push(captioned);
        let doc = Document::new("doc", vec![root]);

        assert_eq!(
            doc.to_markdown(),
            "Revenue 2023 42\n\n*Table 2*\n\nCosts 2023 7"
        );
        let html = doc.to_html();
        assert!(html.contains("<div class=\"table\">Revenue 2023 42</div>"), "{html}");
        assert!(html.contains("<div class=\"table\">Costs 2023 7</div>"), "{html}");
        assert!(!html.contains("<table"), "{html}");
    }

    #[test]
    fn test_numbering_overrides_attribute_level() {
        let mut root = DocumentNode::page_root(0, 100, 100);
        root.children.push(
            node("t", NodeKind::Title, Some("2.1 Setup")).with_attribute(attr::HEADING_LEVEL, 1),
        );
        let doc = Document::new("doc", vec![root]);
        assert_eq!(doc.to_markdown(), "## 2.1 Setup");
    }

    #[test]
    fn test_figure_description_replaces_image() {
        let mut root = DocumentNode::page_root(0, 100, 100);
        root.children.push(
            node("f", NodeKind::Figure, None).with_attribute(attr::DESCRIPTION, "A bar chart"),
        );
        root.children.push(node("g", NodeKind::Figure, None));
        let md = Document::new("doc", vec![root]).to_markdown();
        assert!(md.contains("> A bar chart"), "{md}");
        assert!(md.contains("![figure](g.png)"), "{md}");
    }
}
