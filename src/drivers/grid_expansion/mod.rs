//! Driver for expanding wedge Hamiltonians onto the full k-point grid.

use std::fmt;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use log;
use ndarray::{s, Array2, Array4};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::drivers::HkSymDriver;
use crate::enforcement::{enforce_hermiticity, enforce_time_reversal};
use crate::expansion::{complete_with_time_reversal, expand, find_correspondence, Correspondence};
use crate::io::format::{
    hksym_output, hksym_warn, log_subtitle, log_title, nice_bool, HkSymOutput,
};
use crate::io::{read_hksym_binary, write_hksym_binary, HkSymFileType};
use crate::kpoints::{KGrid, MATCHING_TOLERANCE};
use crate::parallel::Communicator;
use crate::representation::Representation;
use crate::structure::{prepare_system, PreparedSystem, WedgeSystem};
use crate::symmetrisation::{symmetrise_grid, SymmetrisationParams};

#[cfg(test)]
#[path = "grid_expansion_tests.rs"]
mod grid_expansion_tests;

type C128 = Complex<f64>;

/// The default tolerance for classifying symmetry operations in a verification.
pub const VERIFICATION_TOLERANCE: f64 = 1e-4;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// A structure containing control parameters for the expansion of wedge Hamiltonians onto the
/// full grid.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct GridExpansionParams {
    /// The maximum number of symmetrisation rounds.
    #[builder(default = "16")]
    pub max_rounds: usize,

    /// Optional residual below which the symmetrisation stops early.
    #[builder(default = "None")]
    pub convergence_threshold: Option<f64>,

    /// The number of workers cooperating on the symmetrisation.
    #[builder(default = "1")]
    pub workers: usize,

    /// The tolerance for matching transformed k-points to grid points.
    #[builder(default = "MATCHING_TOLERANCE")]
    pub matching_tolerance: f64,

    /// Boolean indicating if the expanded grid is iteratively symmetrised.
    #[builder(default = "true")]
    pub symmetrise: bool,

    /// Boolean indicating if time-reversal symmetry is used to complete the wedge and restored
    /// on the grid. It is never used for magnetic spin-orbit calculations.
    #[builder(default = "true")]
    pub enforce_time_reversal: bool,

    /// Boolean indicating if the expanded grid is checked operation by operation against a
    /// reference grid.
    #[builder(default = "false")]
    pub verify: bool,

    /// Optional name of a binary file of type [`HkSymFileType::Ham`] holding the reference grid
    /// for the verification. If `None`, the final grid is the reference.
    #[builder(default = "None")]
    pub verification_reference: Option<String>,

    /// The tolerance for classifying symmetry operations in the verification.
    #[builder(default = "VERIFICATION_TOLERANCE")]
    pub verification_tolerance: f64,

    /// Optional name for saving the full-grid Hamiltonian as a binary file of type
    /// [`HkSymFileType::Ham`]. If `None`, the Hamiltonian will not be saved.
    #[builder(default = "None")]
    pub result_save_name: Option<String>,
}

impl GridExpansionParamsBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("At least one worker is required.".to_string());
        }
        if let Some(tol) = self.matching_tolerance {
            if tol <= 0.0 {
                return Err(format!("Invalid matching tolerance: {tol}."));
            }
        }
        if let Some(Some(thresh)) = self.convergence_threshold {
            if thresh <= 0.0 {
                return Err(format!("Invalid convergence threshold: {thresh}."));
            }
        }
        Ok(())
    }
}

impl GridExpansionParams {
    /// Returns a builder to construct a [`GridExpansionParams`] structure.
    pub fn builder() -> GridExpansionParamsBuilder {
        GridExpansionParamsBuilder::default()
    }

    fn symmetrisation_params(
        &self,
        time_reversal: bool,
    ) -> Result<SymmetrisationParams, anyhow::Error> {
        Ok(SymmetrisationParams::builder()
            .max_rounds(self.max_rounds)
            .convergence_threshold(self.convergence_threshold)
            .time_reversal(time_reversal)
            .matching_tolerance(self.matching_tolerance)
            .build()?)
    }
}

impl Default for GridExpansionParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Unable to construct a default `GridExpansionParams`.")
    }
}

impl fmt::Display for GridExpansionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Matching tolerance: {:.3e}", self.matching_tolerance)?;
        writeln!(
            f,
            "Use time reversal: {}",
            nice_bool(self.enforce_time_reversal)
        )?;
        writeln!(f, "Symmetrise expanded grid: {}", nice_bool(self.symmetrise))?;
        if self.symmetrise {
            writeln!(f, "Maximum symmetrisation rounds: {}", self.max_rounds)?;
            if let Some(thresh) = self.convergence_threshold {
                writeln!(f, "Convergence threshold: {thresh:.3e}")?;
            }
            writeln!(f, "Workers: {}", self.workers)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Verify expanded grid: {}",
            if self.verify {
                format!(
                    "against {} at {:.3e}",
                    self.verification_reference
                        .as_ref()
                        .map(|name| format!("{name}.{}", HkSymFileType::Ham.ext()))
                        .unwrap_or_else(|| "final grid".to_string()),
                    self.verification_tolerance
                )
            } else {
                nice_bool(false)
            }
        )?;
        writeln!(
            f,
            "Save full-grid Hamiltonian to file: {}",
            if let Some(name) = self.result_save_name.as_ref() {
                format!("{name}.{}", HkSymFileType::Ham.ext())
            } else {
                nice_bool(false)
            }
        )?;
        writeln!(f)?;

        Ok(())
    }
}

// ------------
// Verification
// ------------

/// A structure classifying the symmetry operations used in an expansion by how well the grid
/// points they generate agree with a reference grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// The tolerance on the largest element-wise deviation.
    pub tolerance: f64,

    /// The number of grid points generated by each operation.
    pub points: Vec<usize>,

    /// The largest element-wise deviation over the points generated by each operation, or
    /// `None` if the operation generates no points.
    pub max_deviations: Vec<Option<f64>>,
}

impl VerificationReport {
    /// The operations whose generated points all agree with the reference.
    #[must_use]
    pub fn good_operations(&self) -> Vec<usize> {
        self.max_deviations
            .iter()
            .enumerate()
            .filter_map(|(isym, dev)| dev.filter(|&d| d <= self.tolerance).map(|_| isym))
            .collect()
    }

    /// The operations generating at least one point that disagrees with the reference.
    #[must_use]
    pub fn bad_operations(&self) -> Vec<usize> {
        self.max_deviations
            .iter()
            .enumerate()
            .filter_map(|(isym, dev)| dev.filter(|&d| d > self.tolerance).map(|_| isym))
            .collect()
    }

    /// Returns `true` if no operation is bad.
    #[must_use]
    pub fn is_good(&self) -> bool {
        self.bad_operations().is_empty()
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "┈".repeat(40))?;
        writeln!(f, "{:>4} {:>8} {:>16} {:>8}", "Op", "Points", "Max. deviation", "Status")?;
        writeln!(f, "{}", "┈".repeat(40))?;
        for (isym, (points, dev)) in self
            .points
            .iter()
            .zip(self.max_deviations.iter())
            .enumerate()
        {
            match dev {
                Some(dev) => writeln!(
                    f,
                    "{isym:>4} {points:>8} {dev:>16.6e} {:>8}",
                    if *dev <= self.tolerance { "good" } else { "bad" }
                )?,
                None => writeln!(f, "{isym:>4} {points:>8} {:>16} {:>8}", "--", "unused")?,
            }
        }
        writeln!(f, "{}", "┈".repeat(40))?;
        Ok(())
    }
}

/// Compares a generated grid with a reference grid, operation by operation.
///
/// Each grid point is attributed to the operation generating it in `correspondence`, and every
/// operation is classified as good if all its points agree with the reference within `tol`.
///
/// # Errors
///
/// Errors if the grids and the correspondence do not have matching sizes.
pub fn verify_grid(
    generated: &[Array2<C128>],
    reference: &[Array2<C128>],
    correspondence: &Correspondence,
    noperations: usize,
    tol: f64,
) -> Result<VerificationReport, anyhow::Error> {
    ensure!(
        generated.len() == reference.len() && generated.len() == correspondence.entries().len(),
        "Mismatched sizes: {} generated points, {} reference points and {} correspondence \
        entries.",
        generated.len(),
        reference.len(),
        correspondence.entries().len()
    );
    let mut points = vec![0; noperations];
    let mut max_deviations: Vec<Option<f64>> = vec![None; noperations];
    for entry in correspondence.entries() {
        ensure!(
            entry.operation < noperations,
            "Grid point {} is generated by unknown operation {}.",
            entry.target,
            entry.operation
        );
        let (gen, refr) = (&generated[entry.target], &reference[entry.target]);
        ensure!(
            gen.dim() == refr.dim(),
            "Mismatched matrix shapes at grid point {}.",
            entry.target
        );
        let dev = gen
            .iter()
            .zip(refr.iter())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max);
        points[entry.operation] += 1;
        let slot = &mut max_deviations[entry.operation];
        *slot = Some(slot.map_or(dev, |d| d.max(dev)));
    }
    Ok(VerificationReport {
        tolerance: tol,
        points,
        max_deviations,
    })
}

// ------
// Result
// ------

/// A structure containing the Hamiltonian on every point of the full grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FullGridHamiltonian {
    /// The dimensions of the grid.
    pub grid: [usize; 3],

    /// The grid points in fractional crystal coordinates, in grid order.
    pub kpoints: Vec<[f64; 3]>,

    /// The Hamiltonian tensor, with dimensions
    /// $`n_{\mathrm{awf}} \times n_{\mathrm{awf}} \times n_k \times n_{\mathrm{spin}}`$.
    pub hamiltonian: Array4<C128>,
}

impl FullGridHamiltonian {
    /// The number of spin channels.
    #[must_use]
    pub fn nspin(&self) -> usize {
        self.hamiltonian.dim().3
    }

    /// The Hamiltonians of one spin channel, in grid order.
    #[must_use]
    pub fn channel(&self, ispin: usize) -> Vec<Array2<C128>> {
        (0..self.hamiltonian.dim().2)
            .map(|k| self.hamiltonian.slice(s![.., .., k, ispin]).to_owned())
            .collect()
    }
}

/// A structure summarising the expansion of one spin channel.
#[derive(Clone, Debug)]
pub struct SpinChannelSummary {
    /// The number of wedge points after time-reversal completion.
    pub wedge_points: usize,

    /// The number of grid points generated by each symmetry operation.
    pub operation_counts: Vec<usize>,

    /// The symmetrisation residual of each round.
    pub residuals: Vec<f64>,

    /// Whether the symmetrisation reached its convergence threshold, or `None` if no threshold
    /// was set or no symmetrisation was run.
    pub converged: Option<bool>,

    /// The verification of the expanded grid, if requested.
    pub verification: Option<VerificationReport>,
}

/// A structure to contain grid expansion results.
#[derive(Clone, Builder, Debug)]
pub struct GridExpansionResult<'a> {
    /// The control parameters used to obtain this set of results.
    parameters: &'a GridExpansionParams,

    /// The Hamiltonian on the full grid.
    pub full_grid: FullGridHamiltonian,

    /// The summaries of the spin channels.
    pub channels: Vec<SpinChannelSummary>,
}

impl<'a> GridExpansionResult<'a> {
    fn builder() -> GridExpansionResultBuilder<'a> {
        GridExpansionResultBuilder::default()
    }

    /// The control parameters used to obtain this set of results.
    pub fn parameters(&self) -> &GridExpansionParams {
        self.parameters
    }
}

impl<'a> fmt::Display for GridExpansionResult<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [n1, n2, n3] = self.full_grid.grid;
        writeln!(f, "Full grid: {n1} × {n2} × {n3}")?;
        for (ispin, channel) in self.channels.iter().enumerate() {
            writeln!(f, "Spin channel {ispin}:")?;
            writeln!(f, "  Wedge points: {}", channel.wedge_points)?;
            if let Some(residual) = channel.residuals.last() {
                writeln!(
                    f,
                    "  Final residual after {} round(s): {residual:.6e}",
                    channel.residuals.len()
                )?;
            }
            if let Some(converged) = channel.converged {
                writeln!(f, "  Converged: {}", nice_bool(converged))?;
            }
            if let Some(report) = channel.verification.as_ref() {
                writeln!(
                    f,
                    "  Verification: {} good, {} bad",
                    report.good_operations().len(),
                    report.bad_operations().len()
                )?;
            }
        }
        Ok(())
    }
}

// ------
// Driver
// ------

/// A driver for the expansion of wedge Hamiltonians onto the full grid.
///
/// Every spin channel is expanded independently: the wedge is completed with time-reversed
/// partners, mapped onto the grid through the symmetry operations, made Hermitian and
/// time-reversal symmetric, and then symmetrised iteratively by all workers of the
/// communicator. Each worker runs its own driver; logging and saving happen on the
/// coordinator only.
#[derive(Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct GridExpansionDriver<'a, C: Communicator> {
    /// The control parameters for the grid expansion.
    parameters: &'a GridExpansionParams,

    /// The wedge system to be expanded.
    system: &'a WedgeSystem,

    /// The communication context of this worker.
    communicator: &'a C,

    /// The result of the grid expansion.
    #[builder(setter(skip), default = "None")]
    result: Option<GridExpansionResult<'a>>,
}

impl<'a, C: Communicator> GridExpansionDriverBuilder<'a, C> {
    fn validate(&self) -> Result<(), String> {
        let params = self
            .parameters
            .ok_or("No grid expansion parameters found.".to_string())?;
        let _ = self
            .system
            .ok_or("No wedge system found.".to_string())?;
        let comm = self
            .communicator
            .ok_or("No communicator found.".to_string())?;
        if params.verify && !params.symmetrise && params.verification_reference.is_none() {
            Err(
                "Verification against the final grid requires symmetrisation. Consider setting \
                `verification_reference` instead."
                    .to_string(),
            )
        } else {
            if comm.size() != params.workers && comm.is_root() {
                log::warn!(
                    "{} worker(s) requested, but the communicator has {}.",
                    params.workers,
                    comm.size()
                );
            }
            Ok(())
        }
    }
}

impl<'a, C: Communicator> GridExpansionDriver<'a, C> {
    /// Returns a builder to construct a [`GridExpansionDriver`] structure.
    pub fn builder() -> GridExpansionDriverBuilder<'a, C> {
        GridExpansionDriverBuilder::default()
    }

    /// Expands one spin channel of the wedge Hamiltonian.
    fn expand_spin_channel(
        &self,
        ispin: usize,
        prepared: &PreparedSystem,
        representation: &Representation,
        grid: &KGrid,
        reference: Option<&FullGridHamiltonian>,
    ) -> Result<(Vec<Array2<C128>>, SpinChannelSummary), anyhow::Error> {
        let params = self.parameters;
        let comm = self.communicator;
        let root = comm.is_root();
        let tol = params.matching_tolerance;
        let noperations = prepared.operations.len();

        if root {
            log_subtitle(&format!("Spin channel {ispin}"));
            hksym_output!("");
        }

        let nk = self.system.hamiltonian.dim().2;
        let wedge_h = (0..nk)
            .map(|k| {
                self.system
                    .hamiltonian
                    .slice(s![.., .., k, ispin])
                    .to_owned()
            })
            .collect::<Vec<_>>();
        let time_reversal = params.enforce_time_reversal && prepared.has_time_reversal_symmetry();
        let (wedge_k, wedge_h) = if time_reversal {
            complete_with_time_reversal(&prepared.kpoints, &wedge_h, representation, tol)
        } else {
            (prepared.kpoints.clone(), wedge_h)
        };

        let correspondence = find_correspondence(&wedge_k, &prepared.operations, grid, tol)?;
        let operation_counts = correspondence.operation_counts(noperations);
        if root {
            hksym_output!(
                "{} wedge point(s) generate all {} grid points.",
                wedge_k.len(),
                grid.len()
            );
            hksym_output!("{}", "┈".repeat(22));
            hksym_output!("{:>4} {:>8} {:>8}", "Op", "TR", "Points");
            hksym_output!("{}", "┈".repeat(22));
            for (op, count) in prepared.operations.iter().zip(operation_counts.iter()) {
                hksym_output!(
                    "{:>4} {:>8} {count:>8}",
                    op.index,
                    nice_bool(op.time_reversal)
                );
            }
            hksym_output!("{}", "┈".repeat(22));
            hksym_output!("");
        }

        let expanded = enforce_hermiticity(&expand(
            &wedge_h,
            &wedge_k,
            representation,
            &correspondence,
        )?);
        let expanded = if time_reversal {
            enforce_time_reversal(&expanded, grid, representation)
        } else {
            expanded
        };

        let (hamiltonians, residuals, converged) = if params.symmetrise {
            if root {
                hksym_output!("Iterative symmetrisation:");
            }
            let outcome = symmetrise_grid(
                comm,
                root.then(|| expanded.clone()),
                grid,
                &prepared.operations,
                representation,
                &params.symmetrisation_params(time_reversal)?,
            )?;
            (outcome.hamiltonians, outcome.residuals, outcome.converged)
        } else {
            (expanded.clone(), vec![], None)
        };

        let verification = if params.verify {
            let reference_h = match reference {
                Some(full) => full.channel(ispin),
                None => hamiltonians.clone(),
            };
            let report = verify_grid(
                &expanded,
                &reference_h,
                &correspondence,
                noperations,
                params.verification_tolerance,
            )?;
            if root {
                hksym_output!("Verification of the expanded grid:");
                report.log_output_display();
                if !report.is_good() {
                    hksym_warn!(
                        "Symmetry operations {:?} generate grid points deviating from the \
                        reference by more than {:.3e}.",
                        report.bad_operations(),
                        report.tolerance
                    );
                }
                hksym_output!("");
            }
            Some(report)
        } else {
            None
        };

        Ok((
            hamiltonians,
            SpinChannelSummary {
                wedge_points: wedge_k.len(),
                operation_counts,
                residuals,
                converged,
                verification,
            },
        ))
    }

    /// Executes the grid expansion.
    fn expand_grid(&mut self) -> Result<(), anyhow::Error> {
        let params = self.parameters;
        let comm = self.communicator;
        let root = comm.is_root();
        if root {
            log_title("Wedge-to-Grid Expansion");
            hksym_output!("");
            params.log_output_display();
        }

        let prepared = prepare_system(self.system)?;
        let grid = KGrid::new(prepared.grid)?;
        let representation = Representation::build(&prepared)?;
        if root {
            prepared.log_output_display();
            hksym_output!("Full grid: {grid}");
            hksym_output!("");
            for op in prepared.operations.iter() {
                log::debug!("{op}");
            }
        }

        let reference = if params.verify {
            params
                .verification_reference
                .as_ref()
                .map(|name| read_hksym_binary::<FullGridHamiltonian, _>(name, HkSymFileType::Ham))
                .transpose()?
        } else {
            None
        };
        if let Some(full) = reference.as_ref() {
            ensure!(
                full.grid == prepared.grid
                    && full.nspin() == self.system.hamiltonian.dim().3
                    && full.hamiltonian.dim().0 == prepared.basis.dim(),
                "The reference grid does not match the system to be expanded."
            );
        }

        let nspin = self.system.hamiltonian.dim().3;
        let (channel_h, channels): (Vec<_>, Vec<_>) = (0..nspin)
            .map(|ispin| {
                self.expand_spin_channel(
                    ispin,
                    &prepared,
                    &representation,
                    &grid,
                    reference.as_ref(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unzip();

        let nawf = prepared.basis.dim();
        let hamiltonian = Array4::from_shape_fn((nawf, nawf, grid.len(), nspin), |(a, b, k, s)| {
            channel_h[s][k][(a, b)]
        });
        let full_grid = FullGridHamiltonian {
            grid: prepared.grid,
            kpoints: grid.points().iter().map(|k| (*k).into()).collect(),
            hamiltonian,
        };

        let result = GridExpansionResult::builder()
            .parameters(params)
            .full_grid(full_grid)
            .channels(channels)
            .build()?;
        if root {
            result.log_output_display();
            hksym_output!("");
            if let Some(name) = params.result_save_name.as_ref() {
                write_hksym_binary(name, HkSymFileType::Ham, &result.full_grid)?;
                hksym_output!(
                    "Full-grid Hamiltonian saved as {name}.{}.",
                    HkSymFileType::Ham.ext()
                );
                hksym_output!("");
            }
        }
        self.result = Some(result);
        Ok(())
    }
}

impl<'a, C: Communicator> HkSymDriver for GridExpansionDriver<'a, C> {
    type Params = GridExpansionParams;

    type Outcome = GridExpansionResult<'a>;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No grid expansion results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.expand_grid()
    }
}
