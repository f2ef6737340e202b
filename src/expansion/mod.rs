//! Expansion of wedge Hamiltonians onto the full k-point grid.

use std::fmt;

use anyhow::{self, ensure};
use log;
use nalgebra::Vector3;
use ndarray::Array2;
use num_complex::Complex;

use crate::auxiliary::geometry::match_point;
use crate::error::HkSymError;
use crate::kpoints::KGrid;
use crate::representation::Representation;
use crate::structure::SymmetryOperation;


type C128 = Complex<f64>;

// ===============
// Correspondences
// ===============

/// A structure recording how one grid point is generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorrespondenceEntry {
    /// The index of the generated point in the full grid.
    pub target: usize,

    /// The index of the source point in the wedge.
    pub source: usize,

    /// The index of the symmetry operation mapping the source onto the target.
    pub operation: usize,
}

/// A structure recording, for every point of the full grid, the unique wedge point and symmetry
/// operation from which it is generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Correspondence {
    entries: Vec<CorrespondenceEntry>,
}

impl Correspondence {
    /// The entries, ordered by target grid point.
    #[must_use]
    pub fn entries(&self) -> &[CorrespondenceEntry] {
        &self.entries
    }

    /// The entry generating a given grid point.
    #[must_use]
    pub fn entry(&self, target: usize) -> Option<&CorrespondenceEntry> {
        self.entries.get(target)
    }

    /// The number of grid points generated by each symmetry operation.
    #[must_use]
    pub fn operation_counts(&self, noperations: usize) -> Vec<usize> {
        let mut counts = vec![0; noperations];
        for entry in self.entries.iter() {
            if let Some(count) = counts.get_mut(entry.operation) {
                *count += 1;
            }
        }
        counts
    }
}

impl fmt::Display for Correspondence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>8} {:>8} {:>6}", "Target", "Source", "Op")?;
        for entry in self.entries.iter() {
            writeln!(
                f,
                "{:>8} {:>8} {:>6}",
                entry.target, entry.source, entry.operation
            )?;
        }
        Ok(())
    }
}

/// Maps a wedge point onto the grid under a symmetry operation.
///
/// # Errors
///
/// Errors with [`HkSymError::UnmatchedPoint`] if the image is not on the grid.
pub fn image_of(
    k: &Vector3<f64>,
    operation: &SymmetryOperation,
    grid: &KGrid,
    tol: f64,
) -> Result<usize, anyhow::Error> {
    let kdash = operation.act_on_k(k);
    grid.locate(&kdash, tol).ok_or_else(|| {
        HkSymError::UnmatchedPoint {
            point: kdash.into(),
            operation: operation.index,
        }
        .into()
    })
}

/// Builds the correspondence between the full grid and the wedge.
///
/// Operations are taken in order and, for each operation, the wedge points in order. Every grid
/// point keeps the first (wedge point, operation) pair reaching it.
///
/// # Arguments
///
/// * `wedge_k` - The wedge points in fractional crystal coordinates.
/// * `operations` - The symmetry operations.
/// * `grid` - The full grid.
/// * `tol` - The matching tolerance.
///
/// # Errors
///
/// Errors with [`HkSymError::UnmatchedPoint`] if an image of a wedge point is not on the grid,
/// and with [`HkSymError::IncompleteCoverage`] if some grid points are not reached.
pub fn find_correspondence(
    wedge_k: &[Vector3<f64>],
    operations: &[SymmetryOperation],
    grid: &KGrid,
    tol: f64,
) -> Result<Correspondence, anyhow::Error> {
    let mut assigned: Vec<Option<CorrespondenceEntry>> = vec![None; grid.len()];
    for (isym, operation) in operations.iter().enumerate() {
        for (source, k) in wedge_k.iter().enumerate() {
            let target = image_of(k, operation, grid, tol)?;
            if assigned[target].is_none() {
                assigned[target] = Some(CorrespondenceEntry {
                    target,
                    source,
                    operation: isym,
                });
            }
        }
    }

    let missing = assigned
        .iter()
        .enumerate()
        .filter_map(|(n, entry)| entry.is_none().then(|| grid.points()[n].into()))
        .collect::<Vec<[f64; 3]>>();
    if !missing.is_empty() {
        return Err(HkSymError::IncompleteCoverage {
            covered: grid.len() - missing.len(),
            total: grid.len(),
            missing,
        }
        .into());
    }
    Ok(Correspondence {
        entries: assigned.into_iter().flatten().collect(),
    })
}

/// Finds, for a grid point $`\mathbf{p}`$, the grid point $`\mathbf{q}`$ with
/// $`\mathbf{p} = \pm\mathbf{R}\mathbf{q}`$ for every symmetry operation.
///
/// # Returns
///
/// The pairs $`(\mathbf{q}, \textrm{operation})`$, one per operation, in operation order. The
/// identity gives $`\mathbf{p}`$ itself, and several operations may share the same
/// $`\mathbf{q}`$.
///
/// # Errors
///
/// Errors with [`HkSymError::UnmatchedPoint`] if some pre-image is not on the grid.
pub fn preimages_of(
    p: usize,
    operations: &[SymmetryOperation],
    grid: &KGrid,
    tol: f64,
) -> Result<Vec<(usize, usize)>, anyhow::Error> {
    let kp = grid.points()[p];
    operations
        .iter()
        .enumerate()
        .map(|(isym, operation)| {
            let q = operation.act_inverse_on_k(&kp);
            grid.locate(&q, tol)
                .map(|qi| (qi, isym))
                .ok_or_else(|| {
                    HkSymError::UnmatchedPoint {
                        point: q.into(),
                        operation: operation.index,
                    }
                    .into()
                })
        })
        .collect()
}

// =========
// Expansion
// =========

/// Expands wedge Hamiltonians onto the full grid.
///
/// Every grid point receives the Hamiltonian of its wedge source, transformed by its
/// operation with the operator phase-shifted at the wedge point (see
/// [`Representation::transform`]).
///
/// # Errors
///
/// Errors if the number of wedge Hamiltonians does not match the wedge.
pub fn expand(
    wedge_h: &[Array2<C128>],
    wedge_k: &[Vector3<f64>],
    representation: &Representation,
    correspondence: &Correspondence,
) -> Result<Vec<Array2<C128>>, anyhow::Error> {
    ensure!(
        wedge_h.len() == wedge_k.len(),
        HkSymError::InconsistentInput(format!(
            "{} wedge Hamiltonians are given for {} wedge k-points.",
            wedge_h.len(),
            wedge_k.len()
        ))
    );
    Ok(correspondence
        .entries()
        .iter()
        .map(|entry| {
            representation.transform(
                entry.operation,
                &wedge_k[entry.source],
                &wedge_h[entry.source],
            )
        })
        .collect())
}

/// Completes the wedge with time-reversed partners.
///
/// For every wedge point $`\mathbf{k}`$ whose partner $`-\mathbf{k}`$ is not already present,
/// $`-\mathbf{k}`$ is appended with $`H(-\mathbf{k}) = \overline{\mathcal{T}(H(\mathbf{k}))}`$.
///
/// # Returns
///
/// The completed wedge points and Hamiltonians, the original ones first.
#[must_use]
pub fn complete_with_time_reversal(
    wedge_k: &[Vector3<f64>],
    wedge_h: &[Array2<C128>],
    representation: &Representation,
    tol: f64,
) -> (Vec<Vector3<f64>>, Vec<Array2<C128>>) {
    let mut kpoints = wedge_k.to_vec();
    let mut hamiltonians = wedge_h.to_vec();
    for (k, hmat) in wedge_k.iter().zip(wedge_h.iter()) {
        let minus_k = -k;
        if match_point(&minus_k, wedge_k, tol).is_none() {
            kpoints.push(minus_k);
            hamiltonians.push(representation.time_reversal_map(hmat).mapv(|z| z.conj()));
        }
    }
    log::debug!(
        "Time reversal added {} k-points to the wedge.",
        kpoints.len() - wedge_k.len()
    );
    (kpoints, hamiltonians)
}

/// Reduces a full grid and its Hamiltonians to an irreducible wedge.
///
/// Grid points are visited in order, and each point not yet reached by the symmetry images of
/// an earlier representative becomes the representative of its orbit.
///
/// # Arguments
///
/// * `grid` - The full grid.
/// * `hamiltonians` - The Hamiltonians at the grid points, in grid order.
/// * `operations` - The symmetry operations.
/// * `tol` - The matching tolerance.
///
/// # Returns
///
/// The k-points of the representatives and their Hamiltonians, in grid order.
///
/// # Errors
///
/// Errors if the number of Hamiltonians does not match the grid, or with
/// [`HkSymError::UnmatchedPoint`] if an image of a grid point is not on the grid.
pub fn reduce_to_wedge(
    grid: &KGrid,
    hamiltonians: &[Array2<C128>],
    operations: &[SymmetryOperation],
    tol: f64,
) -> Result<(Vec<Vector3<f64>>, Vec<Array2<C128>>), anyhow::Error> {
    ensure!(
        hamiltonians.len() == grid.len(),
        HkSymError::InconsistentInput(format!(
            "{} Hamiltonians are given for a grid of {} points.",
            hamiltonians.len(),
            grid.len()
        ))
    );
    let mut reached = vec![false; grid.len()];
    let mut kpoints = vec![];
    let mut wedge_h = vec![];
    for ((n, k), hmat) in grid.points().iter().enumerate().zip(hamiltonians.iter()) {
        if reached[n] {
            continue;
        }
        kpoints.push(*k);
        wedge_h.push(hmat.clone());
        for operation in operations.iter() {
            reached[image_of(k, operation, grid, tol)?] = true;
        }
    }
    log::debug!(
        "The {} grid points reduce to {} irreducible points.",
        grid.len(),
        kpoints.len()
    );
    Ok((kpoints, wedge_h))
}
