//! Conversion between complex spherical harmonics and the real orbitals used by projected
//! tight-binding Hamiltonians.
//!
//! Real orbitals within a shell of angular momentum $`l`$ are arranged in the *chemistry order*:
//! the $`m = 0`$ function first, followed by the cosine-like and sine-like pair for each
//! $`\lvert m \rvert = 1, \ldots, l`$, *e.g.* $`p_z, p_x, p_y`$ for $`l = 1`$.

use ndarray::Array2;
use num::Complex;

#[cfg(test)]
#[path = "sh_conversion_tests.rs"]
mod sh_conversion_tests;

/// Labels of real orbitals in chemistry order, indexed by $`l`$.
pub static CHEMISTRY_ORBITAL_LABELS: [&[&str]; 4] = [
    &["s"],
    &["pz", "px", "py"],
    &["dz2", "dxz", "dyz", "dx2-y2", "dxy"],
    &[
        "fz3", "fxz2", "fyz2", "fz(x2-y2)", "fxyz", "fx(x2-3y2)", "fy(3x2-y2)",
    ],
];

/// Returns the matrix $`\mathbf{T}^{(l)}`$ converting complex spherical harmonics in
/// increasing-$`m`$ order to real orbitals in chemistry order.
///
/// Row $`0`$ selects $`m = 0`$. For each $`\lvert m \rvert`$, row $`2\lvert m \rvert - 1`$ holds
/// $`\tfrac{1}{\sqrt{2}}\left((-1)^{\lvert m \rvert}, 1\right)`$ and row $`2\lvert m \rvert`$
/// holds $`\tfrac{i}{\sqrt{2}}\left((-1)^{\lvert m \rvert + 1}, 1\right)`$ at columns
/// $`(-\lvert m \rvert, +\lvert m \rvert)`$.
///
/// # Arguments
///
/// * `l` - The angular momentum of the shell.
///
/// # Returns
///
/// The unitary $`(2l+1) \times (2l+1)`$ matrix $`\mathbf{T}^{(l)}`$.
#[must_use]
pub fn sh_c2chem_mat(l: u32) -> Array2<Complex<f64>> {
    let lusize = l as usize;
    let dim = 2 * lusize + 1;
    let rsh = Complex::<f64>::new(1.0 / 2.0f64.sqrt(), 0.0);
    let ish = Complex::<f64>::new(0.0, 1.0 / 2.0f64.sqrt());
    let mut tmat = Array2::<Complex<f64>>::zeros((dim, dim));
    tmat[(0, lusize)] = Complex::from(1.0);
    for absm in 1..=lusize {
        let sign = if absm % 2 == 0 { 1.0 } else { -1.0 };
        // Rows 2|m| - 1 and 2|m| hold the cosine-like and sine-like combinations of m = ±|m|.
        tmat[(2 * absm - 1, lusize - absm)] = rsh * sign;
        tmat[(2 * absm - 1, lusize + absm)] = rsh;
        tmat[(2 * absm, lusize - absm)] = -ish * sign;
        tmat[(2 * absm, lusize + absm)] = ish;
    }
    tmat
}

/// Transforms a Wigner rotation matrix for integral $`l`$ from the increasing-$`m`$ complex
/// basis to the real chemistry basis, *i.e.* computes
/// $`\mathbf{T}^{(l)} \mathbf{D}^{(l)} \mathbf{T}^{(l)\dagger}`$.
///
/// # Panics
///
/// Panics if `dmat` is not of dimensions $`(2l+1) \times (2l+1)`$.
#[must_use]
pub fn dmat_to_chemistry(dmat: &Array2<Complex<f64>>, l: u32) -> Array2<Complex<f64>> {
    let tmat = sh_c2chem_mat(l);
    assert_eq!(
        dmat.dim(),
        tmat.dim(),
        "Mismatched dimensions between the rotation matrix and l = {l}."
    );
    let tmat_dag = tmat.t().map(Complex::conj);
    tmat.dot(dmat).dot(&tmat_dag)
}
