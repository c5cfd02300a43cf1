//! One-dimensional clustering of box centres.
//!
//! Table rows and columns are recovered by grouping cell centres that lie
//! within a tolerance of each other, transitively, via [`UnionFind`].

use super::union_find::UnionFind;

/// Groups `values` whose neighbours lie within `tolerance` of each other.
///
/// Returns index groups ordered by ascending mean value; indices inside a
/// group are ascending. Non-finite values each form their own group at the end.
pub fn cluster_1d(values: &[f32], tolerance: f32) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));

    let mut uf = UnionFind::new(values.len());
    for pair in order.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if values[a].is_finite() && values[b].is_finite() && values[b] - values[a] <= tolerance {
            uf.union(a, b);
        }
    }

    let mut groups = uf.groups();
    let mean = |g: &Vec<usize>| g.iter().map(|&i| values[i]).sum::<f32>() / g.len() as f32;
    groups.sort_by(|a, b| mean(a).total_cmp(&mean(b)).then(a[0].cmp(&b[0])));
    groups
}

/// Maps every value index to the position of its group in [`cluster_1d`] order.
pub fn cluster_assignments(values: &[f32], tolerance: f32) -> (Vec<usize>, usize) {
    let groups = cluster_1d(values, tolerance);
    let mut assignment = vec![0; values.len()];
    for (group_idx, group) in groups.iter().enumerate() {
        for &i in group {
            assignment[i] = group_idx;
        }
    }
    (assignment, groups.len())
}
