use nalgebra::{Matrix3, Vector3};

/// A periodic simulation cell, stored as three lattice vectors in nm.
///
/// The vectors are the columns of the cell matrix, so that a fractional
/// coordinate `s` maps to the Cartesian position `h * s`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Cell {
    /// Builds a cell from its lattice vectors `a`, `b` and `c`.
    ///
    /// Returns `None` when the vectors are linearly dependent.
    pub fn from_vectors(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Option<Self> {
        let matrix = Matrix3::from_columns(&[a, b, c]);
        let inverse = matrix.try_inverse()?;
        Some(Self { matrix, inverse })
    }

    /// Builds a cell from lengths (nm) and angles (degrees), using the usual
    /// crystallographic convention with `a` along x and `b` in the xy plane.
    pub fn from_lengths_angles(lengths: [f64; 3], angles: [f64; 3]) -> Option<Self> {
        let [a, b, c] = lengths;
        let [alpha, beta, gamma] = angles.map(f64::to_radians);

        let (cos_a, cos_b, cos_g) = (alpha.cos(), beta.cos(), gamma.cos());
        let sin_g = gamma.sin();
        if sin_g.abs() < 1e-12 {
            return None;
        }

        let va = Vector3::new(a, 0.0, 0.0);
        let vb = Vector3::new(b * cos_g, b * sin_g, 0.0);
        let cx = c * cos_b;
        let cy = c * (cos_a - cos_b * cos_g) / sin_g;
        let cz_sq = c * c - cx * cx - cy * cy;
        if cz_sq <= 0.0 {
            return None;
        }
        let vc = Vector3::new(cx, cy, cz_sq.sqrt());
        Self::from_vectors(va, vb, vc)
    }

    /// A rectangular box with the given edge lengths in nm.
    pub fn orthorhombic(lengths: [f64; 3]) -> Option<Self> {
        Self::from_lengths_angles(lengths, [90.0; 3])
    }

    #[inline]
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// The lattice vector `i` (0 = a, 1 = b, 2 = c).
    pub fn vector(&self, i: usize) -> Vector3<f64> {
        self.matrix.column(i).into_owned()
    }

    pub fn lengths(&self) -> [f64; 3] {
        [0, 1, 2].map(|i| self.vector(i).norm())
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    pub fn is_orthorhombic(&self) -> bool {
        let m = &self.matrix;
        m.iter()
            .enumerate()
            .all(|(k, v)| k % 4 == 0 || v.abs() < 1e-12)
    }

    /// Applies the minimum image convention to a displacement vector.
    ///
    /// Exact for orthorhombic cells; for skewed cells it folds the fractional
    /// displacement into `[-0.5, 0.5)`, which is exact as long as the cutoff
    /// in use stays below half the shortest cell height.
    pub fn minimum_image(&self, dr: Vector3<f64>) -> Vector3<f64> {
        let mut frac = self.inverse * dr;
        frac.apply(|s| *s -= (*s).round());
        self.matrix * frac
    }

    /// The shortest perpendicular distance between opposite cell faces.
    pub fn min_height(&self) -> f64 {
        let (a, b, c) = (self.vector(0), self.vector(1), self.vector(2));
        let volume = self.volume();
        [b.cross(&c).norm(), c.cross(&a).norm(), a.cross(&b).norm()]
            .into_iter()
            .map(|area| volume / area)
            .fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn orthorhombic_cell_has_diagonal_matrix() {
        let cell = Cell::orthorhombic([1.0, 2.0, 3.0]).unwrap();
        assert!(cell.is_orthorhombic());
        assert!((cell.volume() - 6.0).abs() < TOLERANCE);
        let lengths = cell.lengths();
        assert!((lengths[1] - 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn triclinic_cell_reproduces_lengths_and_is_not_orthorhombic() {
        let cell = Cell::from_lengths_angles([1.0, 1.2, 1.5], [80.0, 95.0, 110.0]).unwrap();
        assert!(!cell.is_orthorhombic());
        let lengths = cell.lengths();
        assert!((lengths[0] - 1.0).abs() < TOLERANCE);
        assert!((lengths[1] - 1.2).abs() < TOLERANCE);
        assert!((lengths[2] - 1.5).abs() < TOLERANCE);
    }

    #[test]
    fn degenerate_cell_is_rejected() {
        assert!(Cell::from_lengths_angles([1.0, 1.0, 1.0], [90.0, 90.0, 0.0]).is_none());
        assert!(
            Cell::from_vectors(Vector3::x(), Vector3::x(), Vector3::z()).is_none()
        );
    }

    #[test]
    fn minimum_image_wraps_displacements_into_the_nearest_image() {
        let cell = Cell::orthorhombic([2.0, 2.0, 2.0]).unwrap();
        let wrapped = cell.minimum_image(Vector3::new(1.8, -1.5, 0.3));
        assert!((wrapped - Vector3::new(-0.2, 0.5, 0.3)).norm() < TOLERANCE);
    }

    #[test]
    fn min_height_of_cube_is_edge_length() {
        let cell = Cell::orthorhombic([3.0, 3.0, 3.0]).unwrap();
        assert!((cell.min_height() - 3.0).abs() < TOLERANCE);
    }
}
