//! Row/column assignment for table cells.

use super::clustering::cluster_assignments;
use super::geometry::BoundingBox;

/// Grid slot of every cell box, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridAssignment {
    /// Row of each box.
    pub rows: Vec<usize>,
    /// Column of each box.
    pub cols: Vec<usize>,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl GridAssignment {
    /// Box indices in row-major order; boxes sharing a slot keep input order.
    pub fn row_major(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by_key(|&i| (self.rows[i], self.cols[i], i));
        order
    }
}

fn median(mut values: Vec<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Bins cell boxes into rows by their y-centres and columns by their x-centres.
///
/// Centres within `ratio` times the median cell height (rows) or width
/// (columns) of each other, transitively, share a row or column.
pub fn assign_grid(cells: &[BoundingBox], ratio: f32) -> GridAssignment {
    if cells.is_empty() {
        return GridAssignment::default();
    }
    let row_tol = ratio * median(cells.iter().map(|c| c.height()).collect());
    let col_tol = ratio * median(cells.iter().map(|c| c.width()).collect());

    let y_centres: Vec<f32> = cells.iter().map(|c| c.center().y).collect();
    let x_centres: Vec<f32> = cells.iter().map(|c| c.center().x).collect();
    let (rows, n_rows) = cluster_assignments(&y_centres, row_tol);
    let (cols, n_cols) = cluster_assignments(&x_centres, col_tol);
    GridAssignment {
        rows,
        cols,
        n_rows,
        n_cols,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(x0: f32, y0: f32) -> BoundingBox {
        BoundingBox::from_coords(x0, y0, x0 + 50.0, y0 + 20.0)
    }

    #[test]
    fn test_full_grid() {
        // 2x2 grid, listed column-major with jitter.
        let cells = [
            cell(0.0, 0.0),
            cell(1.0, 21.0),
            cell(51.0, 1.0),
            cell(50.0, 20.0),
        ];
        let grid = assign_grid(&cells, 0.5);
        assert_eq!((grid.n_rows, grid.n_cols), (2, 2));
        assert_eq!(grid.rows, vec![0, 1, 0, 1]);
        assert_eq!(grid.cols, vec![0, 0, 1, 1]);
        assert_eq!(grid.row_major(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_ragged_grid_keeps_all_columns() {
        // Second row is missing its right cell.
        let cells = [cell(0.0, 0.0), cell(50.0, 0.0), cell(0.0, 20.0)];
        let grid = assign_grid(&cells, 0.5);
        assert_eq!((grid.n_rows, grid.n_cols), (2, 2));
        assert_eq!(grid.rows, vec![0, 0, 1]);
    }

    #[test]
    fn test_empty() {
        assert_eq!(assign_grid(&[], 0.5), GridAssignment::default());
    }
}
