//! Table grid reconstruction.

use crate::core::errors::{LayoutWarning, WarningKind};
use crate::domain::{DocumentNode, NodeKind, attr};
use crate::processors::{BoundingBox, assign_grid};

/// Grid rows built for one table.
pub(crate) struct TableGrid {
    pub rows: Vec<DocumentNode>,
    pub n_rows: usize,
    pub n_cols: usize,
    pub warnings: Vec<LayoutWarning>,
}

/// Arranges cell nodes into `table_row` nodes.
///
/// Every `(row, col)` slot of the rectangular grid is present: slots no cell
/// landed in get a synthetic cell marked `empty`. When two cells land in the
/// same slot the first (in reading order) keeps it and the other is appended
/// to the row marked `grid_conflict`.
pub(crate) fn build_grid(table: &DocumentNode, cells: Vec<DocumentNode>, ratio: f32) -> TableGrid {
    let boxes: Vec<BoundingBox> = cells.iter().map(|c| c.bbox).collect();
    let grid = assign_grid(&boxes, ratio);
    let (n_rows, n_cols) = (grid.n_rows, grid.n_cols);

    let mut row_extent: Vec<Option<BoundingBox>> = vec![None; n_rows];
    let mut col_extent: Vec<Option<BoundingBox>> = vec![None; n_cols];
    for (i, b) in boxes.iter().enumerate() {
        let (r, c) = (grid.rows[i], grid.cols[i]);
        row_extent[r] = Some(row_extent[r].map_or(*b, |e| e.union(b)));
        col_extent[c] = Some(col_extent[c].map_or(*b, |e| e.union(b)));
    }

    let mut slots: Vec<Vec<Option<DocumentNode>>> = vec![vec![None; n_cols]; n_rows];
    let mut conflicts: Vec<Vec<DocumentNode>> = vec![Vec::new(); n_rows];
    let mut warnings = Vec::new();

    for (i, mut cell) in cells.into_iter().enumerate() {
        let (r, c) = (grid.rows[i], grid.cols[i]);
        cell.set_attribute(attr::ROW, r);
        cell.set_attribute(attr::COL, c);
        if slots[r][c].is_none() {
            slots[r][c] = Some(cell);
        } else {
            warnings.push(LayoutWarning::new(
                WarningKind::TableGridConflict,
                table.page_index,
                format!(
                    "cell {} shares slot ({r}, {c}) of table {}",
                    cell.node_id, table.node_id
                ),
            ));
            cell.set_attribute(attr::GRID_CONFLICT, true);
            conflicts[r].push(cell);
        }
    }

    let rows = slots
        .into_iter()
        .zip(conflicts)
        .enumerate()
        .map(|(r, (row_slots, extra))| {
            let row_box = row_extent[r].unwrap_or(table.bbox);
            let mut row = DocumentNode::new(
                format!("{}-r{r}", table.node_id),
                NodeKind::TableRow,
                BoundingBox::from_coords(table.bbox.x0, row_box.y0, table.bbox.x1, row_box.y1),
                table.page_index,
            )
            .with_attribute(attr::ROW, r);

            for (c, slot) in row_slots.into_iter().enumerate() {
                let cell = slot.unwrap_or_else(|| {
                    let col_box = col_extent[c].unwrap_or(table.bbox);
                    DocumentNode::new(
                        format!("{}-r{r}c{c}", table.node_id),
                        NodeKind::TableCell,
                        BoundingBox::from_coords(col_box.x0, row_box.y0, col_box.x1, row_box.y1),
                        table.page_index,
                    )
                    .with_attribute(attr::ROW, r)
                    .with_attribute(attr::COL, c)
                    .with_attribute(attr::EMPTY, true)
                });
                row.children.push(cell);
            }
            row.children.extend(extra);
            row
        })
        .collect();

    TableGrid {
        rows,
        n_rows,
        n_cols,
        warnings,
    }
}
