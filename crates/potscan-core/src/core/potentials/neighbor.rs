use crate::core::models::cell::Cell;
use nalgebra::{Point3, Vector3};

/// A neighbor of a central atom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the neighboring atom.
    pub index: usize,
    /// Minimum-image displacement from the central atom to the neighbor.
    pub displacement: Vector3<f64>,
    /// Length of `displacement`.
    pub distance: f64,
}

/// Builds full (both directions) neighbor lists with a brute-force pair search.
///
/// Displacements follow the minimum image convention when a cell is given.
/// Callers must ensure `cutoff` is below half of [`Cell::min_height`].
pub fn build_neighbor_lists(
    positions: &[Point3<f64>],
    cell: Option<&Cell>,
    cutoff: f64,
) -> Vec<Vec<Neighbor>> {
    let n = positions.len();
    let cutoff_sq = cutoff * cutoff;
    let mut lists = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            let mut dr = positions[j] - positions[i];
            if let Some(cell) = cell {
                dr = cell.minimum_image(dr);
            }
            let d_sq = dr.norm_squared();
            if d_sq >= cutoff_sq {
                continue;
            }
            let distance = d_sq.sqrt();
            lists[i].push(Neighbor {
                index: j,
                displacement: dr,
                distance,
            });
            lists[j].push(Neighbor {
                index: i,
                displacement: -dr,
                distance,
            });
        }
    }
    lists
}

/// Whether the minimum image convention is valid for `cutoff` in `cell`.
pub fn cutoff_fits(cell: Option<&Cell>, cutoff: f64) -> bool {
    cell.is_none_or(|c| 2.0 * cutoff < c.min_height())
}
