//! Monkhorst--Pack style k-point grids in fractional reciprocal coordinates.

use std::fmt;

use anyhow::{self, ensure};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::auxiliary::geometry::{fold, match_point, periodic_distance};


/// Default tolerance for matching k-points under the periodic metric.
pub const MATCHING_TOLERANCE: f64 = 1e-6;

/// A structure describing a regular $`n_1 \times n_2 \times n_3`$ grid of k-points in fractional
/// reciprocal coordinates, folded into the canonical cell $`[-0.5, 0.5)^3`$.
///
/// The point $`(i, j, k)`$ has the linear index $`k + j n_3 + i n_2 n_3`$ and the coordinates
/// $`(i/n_1, j/n_2, k/n_3)`$ folded into the canonical cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KGrid {
    dims: [usize; 3],
    points: Vec<Vector3<f64>>,
}

impl KGrid {
    /// Constructs the full grid of the given dimensions.
    ///
    /// # Errors
    ///
    /// Errors if any dimension is zero.
    pub fn new(dims: [usize; 3]) -> Result<Self, anyhow::Error> {
        ensure!(
            dims.iter().all(|&n| n > 0),
            "Grid dimensions must be positive, but {dims:?} was given."
        );
        let [n1, n2, n3] = dims;
        let mut points = Vec::with_capacity(n1 * n2 * n3);
        for i in 0..n1 {
            for j in 0..n2 {
                for k in 0..n3 {
                    let coords = Vector3::new(
                        i as f64 / n1 as f64,
                        j as f64 / n2 as f64,
                        k as f64 / n3 as f64,
                    )
                    .map(|x| if x >= 0.5 { x - 1.0 } else { x });
                    points.push(coords);
                }
            }
        }
        Ok(Self { dims, points })
    }

    /// The grid dimensions $`(n_1, n_2, n_3)`$.
    #[must_use]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// The grid points, in linear-index order.
    #[must_use]
    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    /// The total number of grid points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the grid has no points. This never happens for a constructed grid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the linear index of the point $`(i, j, k)`$.
    #[must_use]
    pub fn linear_index(&self, ijk: [usize; 3]) -> usize {
        let [_, n2, n3] = self.dims;
        ijk[2] + ijk[1] * n3 + ijk[0] * n2 * n3
    }

    /// Returns the triple $`(i, j, k)`$ of a linear index.
    #[must_use]
    pub fn triple_index(&self, n: usize) -> [usize; 3] {
        let [_, n2, n3] = self.dims;
        [n / (n2 * n3), (n / n3) % n2, n % n3]
    }

    /// Returns the linear index of the point $`-\mathbf{k}`$ for the point with linear index
    /// `n`, *i.e.* of $`((n_1 - i) \bmod n_1, (n_2 - j) \bmod n_2, (n_3 - k) \bmod n_3)`$.
    #[must_use]
    pub fn inverse_index(&self, n: usize) -> usize {
        let [i, j, k] = self.triple_index(n);
        let [n1, n2, n3] = self.dims;
        self.linear_index([(n1 - i) % n1, (n2 - j) % n2, (n3 - k) % n3])
    }

    /// Locates a fractional k-point on the grid in constant time.
    ///
    /// The point is scaled by the grid dimensions, rounded to the nearest grid node and wrapped
    /// periodically. The match is accepted only if the node lies within `tol` of the point under
    /// the periodic metric.
    ///
    /// # Returns
    ///
    /// The linear index of the matched grid point, or `None` if `k` is not on the grid.
    #[must_use]
    pub fn locate(&self, k: &Vector3<f64>, tol: f64) -> Option<usize> {
        let mut ijk = [0usize; 3];
        for (axis, slot) in ijk.iter_mut().enumerate() {
            let n = self.dims[axis] as f64;
            let node = (k[axis] * n).round();
            if !node.is_finite() {
                return None;
            }
            *slot = (node.rem_euclid(n)) as usize % self.dims[axis];
        }
        let idx = self.linear_index(ijk);
        (periodic_distance(k, &self.points[idx]) <= tol).then_some(idx)
    }

    /// Locates a fractional k-point on the grid by exhaustive search over all grid points.
    ///
    /// This gives the same result as [`Self::locate`] and is used to cross-check it.
    #[must_use]
    pub fn search(&self, k: &Vector3<f64>, tol: f64) -> Option<usize> {
        match_point(&fold(k), &self.points, tol)
    }
}

impl fmt::Display for KGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [n1, n2, n3] = self.dims;
        write!(f, "{n1} × {n2} × {n3} grid ({} points)", self.len())
    }
}
