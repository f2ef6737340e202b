//! Optical Berry and spin Hall conductivities $`\sigma_{xy}(\omega)`$.

use anyhow::{self, ensure};
use ndarray::{Array1, Array2, ArrayView2};
use num_complex::Complex;

use crate::parallel::{load_balance, Communicator};

use super::{fermi_dirac, Smearing};

#[cfg(test)]
#[path = "conductivity_tests.rs"]
mod conductivity_tests;

type C128 = Complex<f64>;

/// The number of frequencies at which conductivities are evaluated.
pub const CONDUCTIVITY_ENERGY_POINTS: usize = 500;

/// Regulariser added to every resonant denominator.
const DENOMINATOR_EPSILON: f64 = 1.0e-16;

/// An enumerated type for the ways occupations and transition broadenings are obtained.
#[derive(Clone, Debug)]
pub enum Broadening<'a> {
    /// Fermi--Dirac occupations at a temperature and one broadening for all transitions.
    Fixed {
        /// The temperature, in energy units.
        temperature: f64,

        /// The broadening of every transition.
        delta: f64,
    },

    /// Smeared occupations with adaptive widths.
    Adaptive {
        /// The smearing kernel for the occupations.
        smearing: Smearing,

        /// The width of each level, with dimensions $`n_k \times n_{\mathrm{bnd}}`$.
        level_widths: ArrayView2<'a, f64>,

        /// The broadening of each transition, one $`n_{\mathrm{bnd}} \times n_{\mathrm{bnd}}`$
        /// matrix per k-point.
        transition_widths: &'a [Array2<f64>],
    },
}

/// A structure containing a conductivity spectrum.
#[derive(Clone, Debug)]
pub struct Conductivity {
    /// The frequencies.
    pub energies: Array1<f64>,

    /// The complex conductivity at each frequency.
    pub sigma: Array1<C128>,
}

fn occupations(
    eigenvalues: ArrayView2<f64>,
    k: usize,
    fermi_energy: f64,
    broadening: &Broadening,
) -> Vec<f64> {
    match broadening {
        Broadening::Fixed { temperature, .. } => eigenvalues
            .row(k)
            .iter()
            .map(|&level| fermi_dirac(level, fermi_energy, *temperature))
            .collect(),
        Broadening::Adaptive {
            smearing,
            level_widths,
            ..
        } => eigenvalues
            .row(k)
            .iter()
            .zip(level_widths.row(k).iter())
            .map(|(&level, &width)| smearing.occupation(level, fermi_energy, width))
            .collect(),
    }
}

/// Computes $`\sigma_{xy}(\omega)`$ from two sets of matrix elements.
///
/// ```math
/// \sigma(\omega) = \frac{1}{n_k} \sum_{\mathbf{k}} \sum_{n \neq m}
///     \frac{(f_n - f_m) \operatorname{Im}(J_{nm} P_{mn})}
///     {(E_n - E_m)^2 - (\omega + i\delta_{nm})^2 + \epsilon}
/// ```
///
/// over [`CONDUCTIVITY_ENERGY_POINTS`] frequencies in $`[0, \omega_{\max})`$. Each worker sums
/// its contiguous block of k-points, and the partial sums are added on the coordinator.
/// Non-finite terms are dropped.
///
/// # Arguments
///
/// * `comm` - The communication context of this worker.
/// * `eigenvalues` - The band energies, with dimensions $`n_k \times n_{\mathrm{bnd}}`$.
/// * `current` - The matrix elements $`J`$, one per k-point.
/// * `momentum` - The matrix elements $`P`$, one per k-point.
/// * `shift` - The upper bound $`\omega_{\max}`$ of the frequencies.
/// * `fermi_energy` - The Fermi energy.
/// * `broadening` - The occupations and transition broadenings.
///
/// # Returns
///
/// The conductivity on the coordinator, `None` elsewhere.
///
/// # Errors
///
/// Errors if the inputs have inconsistent dimensions or if `shift` is not positive.
fn sigma_xy<C: Communicator>(
    comm: &C,
    eigenvalues: ArrayView2<f64>,
    current: &[Array2<C128>],
    momentum: &[Array2<C128>],
    shift: f64,
    fermi_energy: f64,
    broadening: &Broadening,
) -> Result<Option<Conductivity>, anyhow::Error> {
    let (nk, nbnd) = eigenvalues.dim();
    ensure!(
        current.len() == nk && momentum.len() == nk,
        "Matrix elements are given for {} and {} k-points, but eigenvalues for {nk}.",
        current.len(),
        momentum.len()
    );
    ensure!(
        current
            .iter()
            .chain(momentum.iter())
            .all(|mat| mat.dim() == (nbnd, nbnd)),
        "Every matrix element block must be {nbnd} × {nbnd}."
    );
    match broadening {
        Broadening::Fixed { temperature, .. } => ensure!(
            *temperature > 0.0,
            "The temperature must be positive without smearing."
        ),
        Broadening::Adaptive {
            level_widths,
            transition_widths,
            ..
        } => ensure!(
            level_widths.dim() == (nk, nbnd)
                && transition_widths.len() == nk
                && transition_widths.iter().all(|w| w.dim() == (nbnd, nbnd)),
            "Adaptive widths do not match {nk} k-points with {nbnd} bands."
        ),
    }
    ensure!(shift > 0.0, "The frequency range must be positive.");

    let de = shift / CONDUCTIVITY_ENERGY_POINTS as f64;
    let energies = Array1::from_shape_fn(CONDUCTIVITY_ENERGY_POINTS, |i| i as f64 * de);

    comm.barrier();
    let block = load_balance(nk, comm.size(), comm.rank());
    let mut partial = Array1::<C128>::zeros(CONDUCTIVITY_ENERGY_POINTS);
    for k in block {
        let fk = occupations(eigenvalues, k, fermi_energy, broadening);
        for n in 0..nbnd {
            for m in (0..nbnd).filter(|&m| m != n) {
                let ediff2 = (eigenvalues[(k, n)] - eigenvalues[(k, m)]).powi(2);
                let weight = (fk[n] - fk[m]) * (current[k][(n, m)] * momentum[k][(m, n)]).im;
                let delta = match broadening {
                    Broadening::Fixed { delta, .. } => *delta,
                    Broadening::Adaptive {
                        transition_widths, ..
                    } => transition_widths[k][(n, m)],
                };
                partial.zip_mut_with(&energies, |sigma, &omega| {
                    let freq = C128::new(omega, delta);
                    let term = weight / (ediff2 - freq * freq + DENOMINATOR_EPSILON);
                    if term.is_finite() {
                        *sigma += term;
                    }
                });
            }
        }
    }

    Ok(comm.reduce_sum(partial)?.map(|sigma| Conductivity {
        energies,
        sigma: sigma.mapv(|z| z / nk as f64),
    }))
}

/// Computes the optical Berry conductivity from the momentum matrix elements along the two
/// polarisations.
///
/// See [`spin_hall_conductivity`] for the arguments, with `momentum_j` in place of the spin
/// current.
///
/// # Errors
///
/// Errors if the inputs have inconsistent dimensions or if `shift` is not positive.
pub fn berry_conductivity<C: Communicator>(
    comm: &C,
    eigenvalues: ArrayView2<f64>,
    momentum_i: &[Array2<C128>],
    momentum_j: &[Array2<C128>],
    shift: f64,
    fermi_energy: f64,
    broadening: &Broadening,
) -> Result<Option<Conductivity>, anyhow::Error> {
    sigma_xy(
        comm,
        eigenvalues,
        momentum_j,
        momentum_i,
        shift,
        fermi_energy,
        broadening,
    )
}

/// Computes the optical spin Hall conductivity.
///
/// # Arguments
///
/// * `comm` - The communication context of this worker.
/// * `eigenvalues` - The band energies, with dimensions $`n_k \times n_{\mathrm{bnd}}`$,
/// identical on every worker.
/// * `spin_current` - The spin-current matrix elements along the second polarisation, one
/// $`n_{\mathrm{bnd}} \times n_{\mathrm{bnd}}`$ matrix per k-point.
/// * `momentum_i` - The momentum matrix elements along the first polarisation.
/// * `shift` - The upper bound of the frequencies.
/// * `fermi_energy` - The Fermi energy.
/// * `broadening` - The occupations and transition broadenings.
///
/// # Returns
///
/// The conductivity on the coordinator, `None` elsewhere.
///
/// # Errors
///
/// Errors if the inputs have inconsistent dimensions or if `shift` is not positive.
pub fn spin_hall_conductivity<C: Communicator>(
    comm: &C,
    eigenvalues: ArrayView2<f64>,
    spin_current: &[Array2<C128>],
    momentum_i: &[Array2<C128>],
    shift: f64,
    fermi_energy: f64,
    broadening: &Broadening,
) -> Result<Option<Conductivity>, anyhow::Error> {
    sigma_xy(
        comm,
        eigenvalues,
        spin_current,
        momentum_i,
        shift,
        fermi_energy,
        broadening,
    )
}
