//! Restoration of Hermiticity and time-reversal symmetry on full-grid Hamiltonians.

use ndarray::Array2;
use num_complex::Complex;

use crate::kpoints::KGrid;
use crate::representation::Representation;

#[cfg(test)]
#[path = "enforcement_tests.rs"]
mod enforcement_tests;

type C128 = Complex<f64>;

/// Returns the Hermitian part $`(\mathbf{H} + \mathbf{H}^\dagger)/2`$ of a matrix.
#[must_use]
pub fn hermitian_part(hmat: &Array2<C128>) -> Array2<C128> {
    let hdag = hmat.t().map(|z| z.conj());
    (hmat + &hdag).mapv(|z| z * 0.5)
}

/// Replaces every Hamiltonian by its Hermitian part.
#[must_use]
pub fn enforce_hermiticity(hamiltonians: &[Array2<C128>]) -> Vec<Array2<C128>> {
    hamiltonians.iter().map(hermitian_part).collect()
}

/// Averages every Hamiltonian on the full grid with the time-reversed Hamiltonian of its
/// partner point,
///
/// ```math
/// H(\mathbf{k}) \leftarrow \tfrac{1}{2}\left(
///     H(\mathbf{k}) + \overline{\mathcal{T}(H(-\mathbf{k}))}
/// \right),
/// ```
///
/// where $`-\mathbf{k}`$ is located through the grid indices and $`\mathcal{T}`$ is given by
/// [`Representation::time_reversal_map`]. All averages are taken over the input snapshot.
///
/// # Panics
///
/// Panics if the number of Hamiltonians differs from the number of grid points.
#[must_use]
pub fn enforce_time_reversal(
    hamiltonians: &[Array2<C128>],
    grid: &KGrid,
    representation: &Representation,
) -> Vec<Array2<C128>> {
    assert_eq!(
        hamiltonians.len(),
        grid.len(),
        "The number of Hamiltonians does not match the grid."
    );
    (0..grid.len())
        .map(|n| {
            let partner = representation
                .time_reversal_map(&hamiltonians[grid.inverse_index(n)])
                .mapv(|z| z.conj());
            (&hamiltonians[n] + &partner).mapv(|z| z * 0.5)
        })
        .collect()
}
