//! Density of states with adaptive broadening.

use anyhow::{self, ensure};
use log;
use ndarray::{Array1, ArrayView2};

use crate::parallel::{load_balance, Communicator};

use super::Smearing;

#[cfg(test)]
#[path = "dos_tests.rs"]
mod dos_tests;

/// The number of points on the energy grid of the density of states.
pub const DOS_ENERGY_POINTS: usize = 1001;

/// A structure containing a density of states sampled on an energy grid.
#[derive(Clone, Debug)]
pub struct DensityOfStates {
    /// The energy grid.
    pub energies: Array1<f64>,

    /// The density of states at each energy.
    pub dos: Array1<f64>,
}

/// Computes the density of states with a broadening width for every level.
///
/// The energy grid has [`DOS_ENERGY_POINTS`] points spaced by $`(E_{\max} - E_{\min})/1001`$
/// starting at $`E_{\min}`$. Each worker sums the broadened levels of its contiguous block of
/// k-points, and the partial sums are added on the coordinator. The sum is scaled by
/// $`n_{\mathrm{awf}}/n_{\mathrm{etot}}`$.
///
/// # Arguments
///
/// * `comm` - The communication context of this worker.
/// * `eigenvalues` - The levels, with dimensions $`n_k \times n_{\mathrm{bnd}}`$, identical on
/// every worker.
/// * `widths` - The broadening width of each level, with the same dimensions.
/// * `emin` - The lower bound of the energy grid.
/// * `emax` - The upper bound of the energy grid.
/// * `nawf` - The number of basis functions.
/// * `netot` - The total number of electronic states used for normalisation.
/// * `smearing` - The broadening kernel.
///
/// # Returns
///
/// The density of states on the coordinator, `None` elsewhere.
///
/// # Errors
///
/// Errors if the arrays have different shapes, if the energy window is empty, or if `netot` is
/// zero.
#[allow(clippy::too_many_arguments)]
pub fn dos_adaptive<C: Communicator>(
    comm: &C,
    eigenvalues: ArrayView2<f64>,
    widths: ArrayView2<f64>,
    emin: f64,
    emax: f64,
    nawf: usize,
    netot: usize,
    smearing: Smearing,
) -> Result<Option<DensityOfStates>, anyhow::Error> {
    ensure!(
        eigenvalues.dim() == widths.dim(),
        "Mismatched shapes of eigenvalues {:?} and widths {:?}.",
        eigenvalues.dim(),
        widths.dim()
    );
    ensure!(emax > emin, "Empty energy window [{emin}, {emax}).");
    ensure!(netot > 0, "The number of states for normalisation must be positive.");

    let de = (emax - emin) / DOS_ENERGY_POINTS as f64;
    let energies = Array1::from_shape_fn(DOS_ENERGY_POINTS, |i| emin + i as f64 * de);

    comm.barrier();
    let block = load_balance(eigenvalues.nrows(), comm.size(), comm.rank());
    log::debug!(
        "Worker {} sums the levels of k-points {}..{}.",
        comm.rank(),
        block.start,
        block.end
    );
    let local_eig = eigenvalues.slice(ndarray::s![block.clone(), ..]);
    let local_widths = widths.slice(ndarray::s![block, ..]);
    let partial = energies.map(|&energy| {
        local_eig
            .iter()
            .zip(local_widths.iter())
            .map(|(&level, &width)| smearing.delta(energy, level, width))
            .sum::<f64>()
    });

    let scale = nawf as f64 / netot as f64;
    Ok(comm.reduce_sum(partial)?.map(|dos| DensityOfStates {
        energies,
        dos: dos * scale,
    }))
}
