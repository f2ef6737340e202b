//! Geometrical manipulations in fractional and Cartesian coordinates.

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};
use num_complex::Complex;

#[cfg(test)]
#[path = "geometry_tests.rs"]
mod geometry_tests;

/// Default absolute tolerance for round-off snapping.
pub const ROUNDOFF_ATOL: f64 = 1e-8;

/// Default relative tolerance for round-off snapping.
pub const ROUNDOFF_RTOL: f64 = 1e-5;

// =================
// Utility functions
// =================

/// Checks if `a` is close to the reference value `b`, *i.e.*
/// $`\lvert a - b \rvert \le a_{\mathrm{tol}} + r_{\mathrm{tol}} \lvert b \rvert`$.
///
/// This comparison is asymmetric in `a` and `b`: the relative tolerance scales with the
/// reference value only.
#[must_use]
pub fn isclose(a: f64, b: f64, atol: f64, rtol: f64) -> bool {
    (a - b).abs() <= atol + rtol * b.abs()
}

/// Checks if every element of `a` is close to the corresponding element of `b`.
///
/// See [`isclose`] for the element-wise comparison.
#[must_use]
pub fn isclose_matrix(a: &Matrix3<f64>, b: &Matrix3<f64>, atol: f64, rtol: f64) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(&x, &y)| isclose(x, y, atol, rtol))
}

/// Snaps a value to exactly $`0`$, $`1`$, or $`-1`$ if it lies within the given tolerances of
/// one of them.
///
/// # Arguments
///
/// * `x` - The value to correct.
/// * `atol` - The absolute tolerance.
/// * `rtol` - The relative tolerance with respect to the snapping target.
///
/// # Returns
///
/// The corrected value.
#[must_use]
pub fn correct_roundoff_with(x: f64, atol: f64, rtol: f64) -> f64 {
    if isclose(x, 0.0, atol, rtol) {
        0.0
    } else if isclose(x, 1.0, atol, rtol) {
        1.0
    } else if isclose(x, -1.0, atol, rtol) {
        -1.0
    } else {
        x
    }
}

/// Snaps a value to exactly $`0`$, $`1`$, or $`-1`$ using the default tolerances
/// [`ROUNDOFF_ATOL`] and [`ROUNDOFF_RTOL`].
#[must_use]
pub fn correct_roundoff(x: f64) -> f64 {
    correct_roundoff_with(x, ROUNDOFF_ATOL, ROUNDOFF_RTOL)
}

/// Snaps every component of a vector. See [`correct_roundoff`].
#[must_use]
pub fn correct_roundoff_vector(v: &Vector3<f64>) -> Vector3<f64> {
    v.map(correct_roundoff)
}

/// Snaps every element of a matrix. See [`correct_roundoff`].
#[must_use]
pub fn correct_roundoff_matrix(m: &Matrix3<f64>) -> Matrix3<f64> {
    m.map(correct_roundoff)
}

/// Snaps a complex value to exactly $`0`$, $`1`$ or $`-1`$ if the complex distance to one of them
/// lies within the default tolerances.
#[must_use]
pub fn correct_roundoff_complex(z: Complex<f64>) -> Complex<f64> {
    let targets = [0.0, 1.0, -1.0];
    targets
        .iter()
        .find(|&&t| (z - t).norm() <= ROUNDOFF_ATOL + ROUNDOFF_RTOL * f64::abs(t))
        .map(|&t| Complex::from(t))
        .unwrap_or(z)
}

/// Folds a fractional coordinate into the canonical half-open interval $`[-0.5, 0.5)`$.
///
/// The coordinate is first reduced modulo $`1`$ and then shifted. The result is snapped with
/// [`correct_roundoff`] and any value that is numerically at the upper boundary $`0.5`$ is mapped
/// to $`-0.5`$, so that each periodic class has exactly one representative.
#[must_use]
pub fn fold_coordinate(x: f64) -> f64 {
    let folded = correct_roundoff((x.rem_euclid(1.0) + 0.5).rem_euclid(1.0) - 0.5);
    if isclose(folded, 0.5, ROUNDOFF_ATOL, ROUNDOFF_RTOL) {
        -0.5
    } else if isclose(folded, 1.0, ROUNDOFF_ATOL, ROUNDOFF_RTOL)
        || isclose(folded, -1.0, ROUNDOFF_ATOL, ROUNDOFF_RTOL)
    {
        0.0
    } else {
        folded
    }
}

/// Folds every component of a fractional vector. See [`fold_coordinate`].
#[must_use]
pub fn fold(k: &Vector3<f64>) -> Vector3<f64> {
    k.map(fold_coordinate)
}

/// Returns the distance between two fractional vectors under the periodic metric, *i.e.* the
/// Euclidean length of their difference after removing the nearest lattice translation.
#[must_use]
pub fn periodic_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a - b).map(|d| d - d.round()).norm()
}

/// Finds the candidate closest to `k` under the periodic metric, provided that it lies within
/// `tol` of `k`.
///
/// # Arguments
///
/// * `k` - The point to be matched.
/// * `candidates` - The candidate points.
/// * `tol` - The matching tolerance.
///
/// # Returns
///
/// The index of the matched candidate, or `None` if no candidate lies within `tol`.
#[must_use]
pub fn match_point(k: &Vector3<f64>, candidates: &[Vector3<f64>], tol: f64) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, periodic_distance(k, c)))
        .filter(|(_, d)| *d <= tol)
        .min_by(|(_, d1), (_, d2)| d1.total_cmp(d2))
        .map(|(i, _)| i)
}

// ============
// Euler angles
// ============

/// Returns the rotation matrix for the Euler angles $`(\alpha, \beta, \gamma)`$ in the $`zyz`$
/// convention, *i.e.* $`R_z(\alpha) R_y(\beta) R_z(\gamma)`$.
#[must_use]
pub fn rotation_from_euler(euler_angles: (f64, f64, f64)) -> Matrix3<f64> {
    let (alpha, beta, gamma) = euler_angles;
    let (s1, c1) = alpha.sin_cos();
    let (s2, c2) = beta.sin_cos();
    let (s3, c3) = gamma.sin_cos();
    Matrix3::new(
        c1 * c2 * c3 - s1 * s3,
        -c1 * c2 * s3 - c3 * s1,
        c1 * s2,
        c2 * c3 * s1 + c1 * s3,
        -c2 * s1 * s3 + c1 * c3,
        s1 * s2,
        -c3 * s2,
        s2 * s3,
        c2,
    )
}

/// Extracts the Euler angles $`(\alpha, \beta, \gamma)`$ in the $`zyz`$ convention from a matrix
/// assumed to be a proper rotation.
///
/// In the gimbal-locked cases $`\beta = 0`$ and $`\beta = \pi`$, the whole in-plane rotation is
/// attributed to $`\alpha`$ and $`\gamma`$ is set to zero.
#[must_use]
pub fn euler_from_rotation(rmat: &Matrix3<f64>) -> (f64, f64, f64) {
    let r22 = rmat[(2, 2)];
    if r22 < 1.0 {
        if r22 > -1.0 {
            let alpha = rmat[(1, 2)].atan2(rmat[(0, 2)]);
            let beta = r22.clamp(-1.0, 1.0).acos();
            let gamma = rmat[(2, 1)].atan2(-rmat[(2, 0)]);
            (alpha, beta, gamma)
        } else {
            (-rmat[(1, 0)].atan2(rmat[(1, 1)]), PI, 0.0)
        }
    } else {
        (rmat[(1, 0)].atan2(rmat[(1, 1)]), 0.0, 0.0)
    }
}

/// A structure containing the decomposition of a point-group operation into a proper rotation
/// and an optional inversion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EulerDecomposition {
    /// The Euler angles $`(\alpha, \beta, \gamma)`$ of the proper part.
    pub euler_angles: (f64, f64, f64),

    /// Boolean indicating if the operation contains an inversion, *i.e.* if the Euler angles
    /// describe $`-\mathbf{R}`$ rather than $`\mathbf{R}`$.
    pub improper: bool,
}

/// Decomposes a Cartesian point-group matrix into Euler angles, detecting a possible inversion.
///
/// The Euler angles of $`\mathbf{R}`$ are extracted and the rotation is reconstructed. If the
/// reconstruction does not reproduce $`\mathbf{R}`$ within tolerance, the procedure is repeated on
/// $`-\mathbf{R}`$ and the decomposition is marked as improper.
///
/// # Arguments
///
/// * `rmat` - The Cartesian matrix of the operation.
/// * `atol` - The absolute tolerance of the reconstruction check.
/// * `rtol` - The relative tolerance of the reconstruction check.
/// * `snap` - If `true`, the reconstructed matrix is passed through [`correct_roundoff`] before
/// the comparison.
///
/// # Returns
///
/// The decomposition, or `None` if neither $`\mathbf{R}`$ nor $`-\mathbf{R}`$ is reproduced.
#[must_use]
pub fn decompose_rotation(
    rmat: &Matrix3<f64>,
    atol: f64,
    rtol: f64,
    snap: bool,
) -> Option<EulerDecomposition> {
    let reproduces = |target: &Matrix3<f64>, euler_angles: (f64, f64, f64)| {
        let recon = rotation_from_euler(euler_angles);
        let recon = if snap {
            correct_roundoff_matrix(&recon)
        } else {
            recon
        };
        isclose_matrix(&recon, target, atol, rtol)
    };

    let euler_angles = euler_from_rotation(rmat);
    if reproduces(rmat, euler_angles) {
        return Some(EulerDecomposition {
            euler_angles,
            improper: false,
        });
    }
    let neg = -rmat;
    let euler_angles = euler_from_rotation(&neg);
    if reproduces(&neg, euler_angles) {
        Some(EulerDecomposition {
            euler_angles,
            improper: true,
        })
    } else {
        None
    }
}
