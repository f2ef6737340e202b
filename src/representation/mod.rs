//! Matrix representations of symmetry operations on the orbital basis.
//!
//! For every symmetry operation, the transformation operator $`\mathbf{U}`$ is assembled from
//! Wigner rotation matrices of the proper part of the operation, one block per angular-momentum
//! channel. Orbitals are then moved onto their symmetry-equivalent atoms, and time-reversed
//! operations are combined with the time-reversal operator. Together with the inversion parity
//! and the per-atom phase shifts, these give
//!
//! ```math
//! H(\mathbf{k}') = \mathbf{U}_{\mathbf{k}} H(\mathbf{k}) \mathbf{U}_{\mathbf{k}}^{\dagger}
//! ```
//!
//! up to the inversion and conjugation modifiers of [`Representation::transform`].

use std::collections::HashMap;

use anyhow::{self, ensure};
use itertools::Itertools;
use log;
use nalgebra::Vector3;
use ndarray::{s, Array2};
use num_complex::Complex;
use rayon::prelude::*;

use crate::angmom::sh_conversion::dmat_to_chemistry;
use crate::angmom::spinor_rotation_3d::dmat_euler_gen;
use crate::auxiliary::geometry::correct_roundoff_complex;
use crate::error::HkSymError;
use crate::permutation::Permutation;
use crate::structure::{
    inconsistent_input, AngularShell, OrbitalBasis, PreparedSystem, SymmetryOperation,
};

#[cfg(test)]
#[path = "representation_tests.rs"]
mod representation_tests;

type C128 = Complex<f64>;

// ======
// Blocks
// ======

/// Computes the Wigner rotation matrix of every distinct channel of a basis for one operation.
///
/// Orbital channels are transformed into the real chemistry basis; spin-orbit channels remain in
/// the increasing-$`m_j`$ basis.
///
/// # Returns
///
/// A map from $`2j`$ to the corresponding rotation matrix.
#[must_use]
pub fn wigner_matrices(
    operation: &SymmetryOperation,
    basis: &OrbitalBasis,
) -> HashMap<u32, Array2<C128>> {
    basis
        .channels
        .iter()
        .map(|shell| shell.twoj)
        .unique()
        .map(|twoj| {
            let dmat = dmat_euler_gen(twoj, operation.decomposition.euler_angles, true);
            let dmat = if basis.spin_orbit {
                dmat
            } else {
                dmat_to_chemistry(&dmat, twoj / 2)
            };
            (twoj, dmat)
        })
        .collect()
}

/// Assembles a block-diagonal operator from per-channel blocks.
///
/// # Arguments
///
/// * `blocks` - A map from $`2j`$ to the block of every channel with that angular momentum.
/// * `channels` - The channels in basis order.
/// * `dim` - The dimension of the basis.
///
/// # Errors
///
/// Errors if a channel has no block of the right size.
pub fn build_block_operator(
    blocks: &HashMap<u32, Array2<C128>>,
    channels: &[AngularShell],
    dim: usize,
) -> Result<Array2<C128>, anyhow::Error> {
    let mut umat = Array2::<C128>::zeros((dim, dim));
    for shell in channels.iter() {
        let block = blocks.get(&shell.twoj).ok_or_else(|| {
            inconsistent_input(format!("No block is available for 2j = {}.", shell.twoj))
        })?;
        let (start, end) = (shell.offset, shell.offset + shell.dim());
        ensure!(
            block.dim() == (shell.dim(), shell.dim()) && end <= dim,
            "The block for 2j = {} does not fit at offset {} in a basis of dimension {dim}.",
            shell.twoj,
            shell.offset
        );
        umat.slice_mut(s![start..end, start..end]).assign(block);
    }
    Ok(umat)
}

/// Constructs the matrix moving orbitals between symmetry-equivalent atoms.
///
/// The $`j`$-th orbital of atom $`i`$ is paired with the $`j`$-th orbital of atom
/// $`\sigma(i)`$, and $`P_{ab} = 1`$ for every such pair $`(a, b)`$.
///
/// # Errors
///
/// Errors if the permutation has the wrong rank or pairs atoms carrying different numbers of
/// orbitals.
pub fn equivalent_atom_permutation_matrix(
    basis: &OrbitalBasis,
    equivalent_atoms: &Permutation,
) -> Result<Array2<C128>, anyhow::Error> {
    let natoms = basis.natoms();
    ensure!(
        equivalent_atoms.rank() == natoms,
        HkSymError::InconsistentInput(format!(
            "An equivalence map of rank {} cannot act on {natoms} atoms.",
            equivalent_atoms.rank()
        ))
    );
    let dim = basis.dim();
    let mut pmat = Array2::<C128>::zeros((dim, dim));
    for atom in 0..natoms {
        let image = equivalent_atoms.image_of(atom)?;
        let first = basis.orbitals_of_atom(atom);
        let second = basis.orbitals_of_atom(image);
        ensure!(
            first.len() == second.len(),
            HkSymError::InconsistentInput(format!(
                "Atoms {atom} and {image} are mapped onto each other but carry {} and {} orbitals.",
                first.len(),
                second.len()
            ))
        );
        for (&fi, &si) in first.iter().zip(second.iter()) {
            pmat[(fi, si)] = C128::from(1.0);
        }
    }
    Ok(pmat)
}

/// Constructs the unitary part of the time-reversal operator.
///
/// For spin-orbit bases, this is block-diagonal over the $`j`$ channels with blocks
/// $`T_{m', m} = (-1)^{j - m'} \delta_{m', -m}`$ in increasing-$`m`$ order. For spinless bases
/// in the real chemistry basis, time reversal reduces to complex conjugation and this is the
/// identity.
///
/// # Errors
///
/// Errors if the blocks cannot be placed on the basis.
pub fn time_reversal_operator(basis: &OrbitalBasis) -> Result<Array2<C128>, anyhow::Error> {
    let dim = basis.dim();
    if !basis.spin_orbit {
        return Ok(Array2::<C128>::eye(dim));
    }
    let blocks = basis
        .channels
        .iter()
        .map(|shell| shell.twoj)
        .unique()
        .map(|twoj| {
            let n = twoj as usize + 1;
            let mut block = Array2::<C128>::zeros((n, n));
            for r in 0..n {
                // j - m' = twoj - r for m' = r - j.
                let sign = if (twoj as usize - r) % 2 == 0 { 1.0 } else { -1.0 };
                block[(r, n - 1 - r)] = C128::from(sign);
            }
            (twoj, block)
        })
        .collect::<HashMap<_, _>>();
    build_block_operator(&blocks, &basis.channels, dim)
}

/// Constructs the inversion parity matrix $`P_{ab} = (-1)^{l_a + l_b}`$, applied element-wise.
#[must_use]
pub fn inversion_parity(basis: &OrbitalBasis) -> Array2<f64> {
    let signs = basis
        .orbital_l
        .iter()
        .map(|&l| if l % 2 == 0 { 1.0 } else { -1.0 })
        .collect::<Vec<f64>>();
    let n = signs.len();
    Array2::from_shape_fn((n, n), |(a, b)| signs[a] * signs[b])
}

// ==============
// Representation
// ==============

/// A structure containing the representation of every symmetry operation of a system on its
/// orbital basis, together with the operators needed to complete each transformation.
#[derive(Clone, Debug)]
pub struct Representation {
    /// The transformation operator $`\mathbf{U}`$ of each symmetry operation, without phase
    /// shifts.
    pub operators: Vec<Array2<C128>>,

    /// The element-wise inversion parity matrix.
    pub parity: Array2<f64>,

    /// The unitary part of the time-reversal operator.
    pub time_reversal: Array2<C128>,

    /// The atom carrying each basis function.
    pub atom_of_orbital: Vec<usize>,

    /// Boolean indicating if the basis is a spin-orbit basis.
    pub spin_orbit: bool,

    improper: Vec<bool>,
    time_reversed: Vec<bool>,
    identity: Vec<bool>,
    translations: Vec<Vec<Vector3<f64>>>,
}

impl Representation {
    /// Builds the representation of all symmetry operations of a prepared system.
    ///
    /// Each operator is $`\mathbf{P}_\sigma (\mathbf{T}) \mathbf{D}`$, where $`\mathbf{D}`$ is
    /// the block-diagonal rotation operator, $`\mathbf{T}`$ the time-reversal operator (only for
    /// time-reversed operations) and $`\mathbf{P}_\sigma`$ the equivalent-atom permutation
    /// matrix. The result is round-off corrected.
    ///
    /// # Errors
    ///
    /// Errors if any operator cannot be assembled.
    pub fn build(system: &PreparedSystem) -> Result<Self, anyhow::Error> {
        let basis = &system.basis;
        let dim = basis.dim();
        let time_reversal = time_reversal_operator(basis)?;
        let operators = system
            .operations
            .par_iter()
            .map(|op| {
                let wigner = wigner_matrices(op, basis);
                let dmat = build_block_operator(&wigner, &basis.channels, dim)?;
                let dmat = if op.time_reversal {
                    time_reversal.dot(&dmat)
                } else {
                    dmat
                };
                let pmat = equivalent_atom_permutation_matrix(basis, &op.equivalent_atoms)?;
                Ok(pmat.dot(&dmat).map(|&z| correct_roundoff_complex(z)))
            })
            .collect::<Result<Vec<_>, anyhow::Error>>()?;
        log::debug!(
            "Built {} transformation operators of dimension {dim}.",
            operators.len()
        );
        Ok(Self {
            operators,
            parity: inversion_parity(basis),
            time_reversal,
            atom_of_orbital: basis.atom_of_orbital.clone(),
            spin_orbit: basis.spin_orbit,
            improper: system.operations.iter().map(SymmetryOperation::is_improper).collect(),
            time_reversed: system.operations.iter().map(|op| op.time_reversal).collect(),
            identity: system.operations.iter().map(SymmetryOperation::is_identity).collect(),
            translations: system
                .operations
                .iter()
                .map(|op| op.translations.clone())
                .collect(),
        })
    }

    /// The number of represented operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Returns `true` if no operations are represented.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Returns `true` if operation `isym` is the identity without time reversal.
    #[must_use]
    pub fn is_identity(&self, isym: usize) -> bool {
        self.identity[isym]
    }

    /// Applies the phase shift of operation `isym` at the source k-point `k`, giving
    /// $`U_{\mathbf{k}, ab} = U_{ab} \exp(2\pi i \boldsymbol{\tau}_{\mathrm{atom}(b)} \cdot
    /// \mathbf{k})`$.
    #[must_use]
    pub fn apply_phase_shift(&self, isym: usize, k: &Vector3<f64>) -> Array2<C128> {
        let phases = self
            .atom_of_orbital
            .iter()
            .map(|&atom| {
                let arg = 2.0 * std::f64::consts::PI * self.translations[isym][atom].dot(k);
                C128::new(0.0, arg).exp()
            })
            .collect::<Vec<_>>();
        let mut umat = self.operators[isym].clone();
        for (mut col, phase) in umat.columns_mut().into_iter().zip(phases.iter()) {
            col.mapv_inplace(|z| z * phase);
        }
        umat
    }

    /// Applies the time-reversal map $`\mathcal{T}(\mathbf{X})`$ without the complex
    /// conjugation, *i.e.* $`\mathbf{P} \circ (\mathbf{T} \mathbf{X} \mathbf{T}^\dagger)`$ for
    /// spin-orbit bases and the identity for spinless bases.
    #[must_use]
    pub fn time_reversal_map(&self, hmat: &Array2<C128>) -> Array2<C128> {
        if self.spin_orbit {
            let tdag = self.time_reversal.t().map(|z| z.conj());
            let mut out = self.time_reversal.dot(hmat).dot(&tdag);
            out.zip_mut_with(&self.parity, |z, &p| *z *= p);
            out
        } else {
            hmat.clone()
        }
    }

    /// Transforms a Hamiltonian at the source k-point `k` by operation `isym`.
    ///
    /// The identity copies the matrix. Otherwise, the phase-shifted operator gives
    /// $`\mathbf{H}' = \mathbf{U}_{\mathbf{k}} \mathbf{H} \mathbf{U}_{\mathbf{k}}^\dagger`$.
    /// Operations containing an inversion multiply $`\mathbf{H}'`$ element-wise by the parity
    /// matrix. Time-reversed operations, whose unitary part is already in
    /// $`\mathbf{U}`$, complete the antiunitary map with the parity signs of spin-orbit bases and
    /// complex conjugation.
    #[must_use]
    pub fn transform(&self, isym: usize, k: &Vector3<f64>, hmat: &Array2<C128>) -> Array2<C128> {
        if self.identity[isym] {
            return hmat.clone();
        }
        let uk = self.apply_phase_shift(isym, k);
        let ukdag = uk.t().map(|z| z.conj());
        let mut out = uk.dot(hmat).dot(&ukdag);
        if self.improper[isym] {
            out.zip_mut_with(&self.parity, |z, &p| *z *= p);
        }
        if self.time_reversed[isym] {
            if self.spin_orbit {
                out.zip_mut_with(&self.parity, |z, &p| *z *= p);
            }
            out.mapv_inplace(|z| z.conj());
        }
        out
    }
}
