//! Iterative symmetrisation of full-grid Hamiltonians across cooperating workers.

use std::fmt;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use log;
use ndarray::Array2;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::enforcement::{enforce_hermiticity, enforce_time_reversal};
use crate::error::HkSymError;
use crate::expansion::preimages_of;
use crate::io::format::{hksym_output, nice_bool};
use crate::kpoints::{KGrid, MATCHING_TOLERANCE};
use crate::parallel::Communicator;
use crate::representation::Representation;
use crate::structure::SymmetryOperation;


type C128 = Complex<f64>;

// ==========
// Parameters
// ==========

/// A structure containing control parameters for the iterative symmetrisation.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SymmetrisationParams {
    /// The number of symmetrisation rounds to run at most.
    #[builder(default = "16")]
    pub max_rounds: usize,

    /// Optional residual below which the rounds stop early. If `None`, all rounds are run.
    #[builder(default = "None")]
    pub convergence_threshold: Option<f64>,

    /// Boolean indicating if time-reversal symmetry is restored after every round.
    #[builder(default = "true")]
    pub time_reversal: bool,

    /// The tolerance for locating transformed k-points on the grid.
    #[builder(default = "MATCHING_TOLERANCE")]
    pub matching_tolerance: f64,
}

impl SymmetrisationParams {
    /// Returns a builder to construct a [`SymmetrisationParams`] structure.
    pub fn builder() -> SymmetrisationParamsBuilder {
        SymmetrisationParamsBuilder::default()
    }
}

impl Default for SymmetrisationParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `SymmetrisationParams`.")
    }
}

impl fmt::Display for SymmetrisationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Maximum symmetrisation rounds: {}", self.max_rounds)?;
        writeln!(
            f,
            "Convergence threshold: {}",
            self.convergence_threshold
                .map(|thresh| format!("{thresh:.3e}"))
                .unwrap_or_else(|| "none".to_string())
        )?;
        writeln!(
            f,
            "Restore time reversal every round: {}",
            nice_bool(self.time_reversal)
        )?;
        writeln!(f, "Matching tolerance: {:.3e}", self.matching_tolerance)?;
        Ok(())
    }
}

// =======
// Outcome
// =======

/// A structure containing the symmetrised grid and the history of its residuals.
#[derive(Clone, Debug)]
pub struct SymmetrisationOutcome {
    /// The symmetrised Hamiltonians, ordered like the grid.
    pub hamiltonians: Vec<Array2<C128>>,

    /// The maximum residual over the grid in each round, measured before the round's averaging.
    pub residuals: Vec<f64>,

    /// Whether the convergence threshold was reached, or `None` if no threshold was set.
    pub converged: Option<bool>,
}

impl SymmetrisationOutcome {
    /// The residual of the last round run.
    #[must_use]
    pub fn final_residual(&self) -> Option<f64> {
        self.residuals.last().copied()
    }
}

impl fmt::Display for SymmetrisationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rounds run: {}", self.residuals.len())?;
        if let Some(residual) = self.final_residual() {
            writeln!(f, "Final residual: {residual:.6e}")?;
        }
        if let Some(converged) = self.converged {
            writeln!(f, "Converged: {}", nice_bool(converged))?;
        }
        Ok(())
    }
}

// =========
// Functions
// =========

/// Computes the symmetry average of a grid point and its residual.
///
/// Every pre-image $`\mathbf{q}`$ of the point is transformed by its operation, with the operator
/// phase-shifted at $`\mathbf{q}`$. The residual is the largest element-wise deviation of the
/// transformed matrices from the first one.
fn average_point(
    preimages: &[(usize, usize)],
    snapshot: &[Array2<C128>],
    grid: &KGrid,
    representation: &Representation,
) -> Result<(Array2<C128>, f64), anyhow::Error> {
    let images = preimages
        .iter()
        .map(|&(q, isym)| representation.transform(isym, &grid.points()[q], &snapshot[q]))
        .collect::<Vec<_>>();
    let first = images
        .first()
        .ok_or_else(|| format_err!("A grid point has no symmetry images."))?;
    let residual = images
        .iter()
        .skip(1)
        .flat_map(|image| {
            image
                .iter()
                .zip(first.iter())
                .map(|(a, b)| (a - b).norm())
                .collect::<Vec<_>>()
        })
        .fold(0.0, f64::max);
    let mut average = Array2::<C128>::zeros(first.raw_dim());
    for image in images.iter() {
        average += image;
    }
    let nimages = images.len() as f64;
    average.mapv_inplace(|z| z / nimages);
    Ok((average, residual))
}

/// Symmetrises the Hamiltonians of a full grid by repeated group averaging.
///
/// The grid points are split into contiguous blocks, one per worker. In each round every worker
/// replaces each of its points by the average of the transformed Hamiltonians of all its
/// pre-images, read from the snapshot of the previous round. The coordinator then gathers the
/// blocks, restores Hermiticity (and time reversal if requested), and broadcasts the refreshed
/// grid. The round's residual is the maximum over all workers.
///
/// # Arguments
///
/// * `comm` - The communication context of this worker.
/// * `hamiltonians` - The initial grid. Only the coordinator's grid is used.
/// * `grid` - The full k-point grid.
/// * `operations` - The symmetry operations.
/// * `representation` - The representation of the operations.
/// * `params` - The control parameters.
///
/// # Returns
///
/// The symmetrised grid and the residual history, identical on every worker.
///
/// # Errors
///
/// Errors on every worker if the coordinator has no grid, if the grid has the wrong size, or if
/// any pre-image of any grid point is not on the grid.
pub fn symmetrise_grid<C: Communicator>(
    comm: &C,
    hamiltonians: Option<Vec<Array2<C128>>>,
    grid: &KGrid,
    operations: &[SymmetryOperation],
    representation: &Representation,
    params: &SymmetrisationParams,
) -> Result<SymmetrisationOutcome, anyhow::Error> {
    let mut snapshot = comm.broadcast(hamiltonians)?;
    ensure!(
        snapshot.len() == grid.len(),
        HkSymError::InconsistentInput(format!(
            "{} Hamiltonians are given for a grid of {} points.",
            snapshot.len(),
            grid.len()
        ))
    );

    let local_points = comm.scatter(comm.is_root().then(|| (0..grid.len()).collect()))?;
    log::debug!(
        "Worker {} symmetrises {} grid point(s).",
        comm.rank(),
        local_points.len()
    );
    let preimages = local_points
        .iter()
        .map(|&p| preimages_of(p, operations, grid, params.matching_tolerance))
        .collect::<Result<Vec<_>, _>>();
    // All workers must agree on failure before leaving the collectives.
    let failed = comm.all_reduce_any(preimages.is_err())?;
    let preimages = match (preimages, failed) {
        (Err(err), _) => return Err(err),
        (Ok(_), true) => {
            return Err(format_err!(
                "Another worker failed to locate the symmetry images of its grid points."
            ))
        }
        (Ok(preimages), false) => preimages,
    };

    if comm.is_root() {
        hksym_output!("{}", "┈".repeat(28));
        hksym_output!("{:>6} {:>20}", "Round", "Max. residual");
        hksym_output!("{}", "┈".repeat(28));
    }

    let mut residuals = Vec::with_capacity(params.max_rounds);
    let mut converged = params.convergence_threshold.map(|_| false);
    for round in 1..=params.max_rounds {
        let averaged = preimages
            .iter()
            .map(|point_preimages| average_point(point_preimages, &snapshot, grid, representation))
            .collect::<Result<Vec<_>, _>>();
        let failed = comm.all_reduce_any(averaged.is_err())?;
        let (local_h, local_residuals): (Vec<_>, Vec<_>) = match (averaged, failed) {
            (Err(err), _) => return Err(err),
            (Ok(_), true) => {
                return Err(format_err!(
                    "Another worker failed to average its grid points in round {round}."
                ))
            }
            (Ok(averaged), false) => averaged.into_iter().unzip(),
        };
        let local_residual = local_residuals.into_iter().fold(0.0, f64::max);

        let refreshed = comm.gather(local_h)?.map(|blocks| {
            let full = enforce_hermiticity(&blocks.into_iter().flatten().collect::<Vec<_>>());
            if params.time_reversal {
                enforce_time_reversal(&full, grid, representation)
            } else {
                full
            }
        });
        snapshot = comm.broadcast(refreshed)?;

        let residual = comm.all_reduce_max(local_residual)?;
        residuals.push(residual);
        if comm.is_root() {
            hksym_output!("{round:>6} {residual:>20.6e}");
        }
        if let Some(thresh) = params.convergence_threshold {
            if residual < thresh {
                converged = Some(true);
                break;
            }
        }
    }
    if comm.is_root() {
        hksym_output!("{}", "┈".repeat(28));
        hksym_output!("");
        if converged == Some(false) {
            log::warn!(
                "The symmetrisation residual has not fallen below the threshold after {} rounds.",
                params.max_rounds
            );
        }
    }

    Ok(SymmetrisationOutcome {
        hamiltonians: snapshot,
        residuals,
        converged,
    })
}
