//! Crystal structures, orbital bases and symmetry operations of a wedge system.

use std::collections::HashMap;
use std::fmt;

use anyhow::{self, ensure};
use log;
use nalgebra::{Matrix3, Vector3};
use ndarray::Array4;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::angmom::{ANGMOM_LABELS, MAX_L, MAX_TWOJ};
use crate::auxiliary::geometry::{
    correct_roundoff, correct_roundoff_matrix, correct_roundoff_vector, decompose_rotation, fold,
    EulerDecomposition, ROUNDOFF_ATOL, ROUNDOFF_RTOL,
};
use crate::error::HkSymError;
use crate::io::format::nice_bool;
use crate::permutation::Permutation;

#[cfg(test)]
#[path = "structure_tests.rs"]
mod structure_tests;

type C128 = Complex<f64>;

/// Absolute tolerance of the Euler reconstruction check for spin-orbit channels.
pub const SPIN_ORBIT_DECOMPOSITION_ATOL: f64 = 1e-3;

/// Relative tolerance of the Euler reconstruction check for spin-orbit channels.
pub const SPIN_ORBIT_DECOMPOSITION_RTOL: f64 = 1e-2;

// ==================
// Struct definitions
// ==================

/// A structure describing the projected shells carried by one atomic species.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Species {
    /// The label of the species, referenced by [`WedgeSystem::atoms`].
    pub label: String,

    /// The orbital angular momenta $`l`$ of the shells, in basis order. In spin-orbit
    /// calculations, a shell appears once for every $`j`$ channel it is split into.
    pub shells: Vec<u32>,

    /// The total angular momenta $`j`$ of the spin-orbit channels, in basis order. Only used for
    /// spin-orbit calculations.
    #[serde(default)]
    pub jchi: Vec<f64>,
}

/// A structure containing everything needed to expand a wedge Hamiltonian onto the full grid.
///
/// Lattice vectors are stored as rows. Real-space quantities are in units of `alat`, and
/// reciprocal-space quantities in units of $`2\pi/\mathrm{alat}`$.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WedgeSystem {
    /// The lattice parameter.
    pub alat: f64,

    /// The real-space lattice vectors (rows) in units of `alat`.
    pub a_vectors: [[f64; 3]; 3],

    /// The reciprocal lattice vectors (rows) in units of $`2\pi/\mathrm{alat}`$.
    pub b_vectors: [[f64; 3]; 3],

    /// The Cartesian atomic positions in units of `alat`.
    pub positions: Vec<[f64; 3]>,

    /// The species label of each atom.
    pub atoms: Vec<String>,

    /// The species present in the system.
    pub species: Vec<Species>,

    /// The point-group parts of the symmetry operations in the crystal basis.
    pub symmetry_rotations: Vec<[[f64; 3]; 3]>,

    /// The time-reversal flag of each symmetry operation.
    pub time_reversal: Vec<bool>,

    /// For each symmetry operation, the atom onto which each atom is mapped.
    pub equivalent_atoms: Vec<Vec<usize>>,

    /// The wedge k-points in Cartesian coordinates, in units of $`2\pi/\mathrm{alat}`$.
    pub kpoints: Vec<[f64; 3]>,

    /// The dimensions of the full grid.
    pub grid: [usize; 3],

    /// Boolean indicating if the calculation includes spin-orbit coupling.
    pub spin_orbit: bool,

    /// Boolean indicating if the calculation is magnetic.
    pub magnetic: bool,

    /// The wedge Hamiltonian with axes (orbital, orbital, k-point, spin).
    pub hamiltonian: Array4<C128>,
}

/// A structure describing one angular-momentum channel of the orbital basis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AngularShell {
    /// The index of the atom carrying the channel.
    pub atom: usize,

    /// Two times the angular momentum of the channel. This is $`2l`$ for orbital channels and
    /// $`2j`$ for spin-orbit channels.
    pub twoj: u32,

    /// The position of the first function of the channel in the basis.
    pub offset: usize,
}

impl AngularShell {
    /// The number of functions in the channel.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.twoj as usize + 1
    }
}

/// A structure describing the ordering of the orbital basis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitalBasis {
    /// The angular-momentum channels on which rotation matrices act, block-diagonally.
    pub channels: Vec<AngularShell>,

    /// The orbital angular momentum $`l`$ of each basis function, determining its parity.
    pub orbital_l: Vec<u32>,

    /// The atom carrying each basis function.
    pub atom_of_orbital: Vec<usize>,

    /// Boolean indicating if the channels are spin-orbit $`j`$ channels.
    pub spin_orbit: bool,
}

impl OrbitalBasis {
    /// Constructs the orbital basis of a system.
    ///
    /// Atoms are laid out block by block in the order of `atoms`. Within each atom, orbital
    /// channels follow the species shells. For spin-orbit calculations, each $`s`$ shell
    /// contributes two functions of $`l = 0`$, and the rotation channels follow the $`j`$ values
    /// of the species, whose total dimension must equal that of the doubled shells.
    ///
    /// # Errors
    ///
    /// Errors if a species is missing, an angular momentum is unsupported, or the spin-orbit
    /// channels do not span the same space as the shells.
    pub fn new(
        atoms: &[String],
        species: &[Species],
        spin_orbit: bool,
    ) -> Result<Self, anyhow::Error> {
        let species_map = species
            .iter()
            .map(|sp| (sp.label.as_str(), sp))
            .collect::<HashMap<_, _>>();
        let mut channels = vec![];
        let mut orbital_l = vec![];
        let mut atom_of_orbital = vec![];
        let mut offset = 0;
        for (atom, label) in atoms.iter().enumerate() {
            let sp = species_map.get(label.as_str()).ok_or_else(|| {
                HkSymError::InconsistentInput(format!(
                    "Atom {atom} refers to an unknown species `{label}`."
                ))
            })?;
            if let Some(&l) = sp.shells.iter().find(|&&l| l > MAX_L) {
                return Err(HkSymError::InconsistentInput(format!(
                    "Species `{label}` has a shell with l = {l}, but only l ≤ {MAX_L} is supported."
                ))
                .into());
            }

            // Orbital parity labels. In spin-orbit bases, s shells carry two functions.
            let atom_ls = sp
                .shells
                .iter()
                .flat_map(|&l| {
                    let copies = if spin_orbit && l == 0 { 2 } else { 1 };
                    std::iter::repeat(l).take(copies)
                })
                .flat_map(|l| std::iter::repeat(l).take(2 * l as usize + 1))
                .collect::<Vec<_>>();

            let atom_twojs = if spin_orbit {
                sp.jchi
                    .iter()
                    .map(|&j| twoj_from_j(j, label))
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                sp.shells.iter().map(|&l| 2 * l).collect::<Vec<_>>()
            };
            let atom_dim = atom_twojs.iter().map(|&twoj| twoj as usize + 1).sum::<usize>();
            ensure!(
                atom_dim == atom_ls.len(),
                HkSymError::InconsistentInput(format!(
                    "Species `{label}` spans {} functions by its shells but {atom_dim} functions \
                    by its angular-momentum channels.",
                    atom_ls.len()
                ))
            );

            for twoj in atom_twojs {
                channels.push(AngularShell {
                    atom,
                    twoj,
                    offset,
                });
                offset += twoj as usize + 1;
            }
            atom_of_orbital.extend(std::iter::repeat(atom).take(atom_dim));
            orbital_l.extend(atom_ls);
        }
        Ok(Self {
            channels,
            orbital_l,
            atom_of_orbital,
            spin_orbit,
        })
    }

    /// The number of basis functions.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.orbital_l.len()
    }

    /// The number of atoms carrying basis functions.
    #[must_use]
    pub fn natoms(&self) -> usize {
        self.atom_of_orbital.iter().max().map_or(0, |&a| a + 1)
    }

    /// The indices of the basis functions carried by an atom, in basis order.
    #[must_use]
    pub fn orbitals_of_atom(&self, atom: usize) -> Vec<usize> {
        self.atom_of_orbital
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| (a == atom).then_some(i))
            .collect()
    }
}

/// Converts a half-integral $`j`$ value into $`2j`$.
fn twoj_from_j(j: f64, label: &str) -> Result<u32, anyhow::Error> {
    let twoj = (2.0 * j).round();
    let supported = (1.0..=f64::from(MAX_TWOJ)).contains(&twoj) && twoj % 2.0 == 1.0;
    ensure!(
        (2.0 * j - twoj).abs() < 1e-6 && supported,
        HkSymError::InconsistentInput(format!(
            "Species `{label}` has a spin-orbit channel with j = {j}, but only j = 1/2, …, \
            {MAX_TWOJ}/2 is supported."
        ))
    );
    Ok(twoj as u32)
}

/// A structure describing one symmetry operation of the crystal.
#[derive(Clone, Debug, PartialEq)]
pub struct SymmetryOperation {
    /// The position of this operation in the input list.
    pub index: usize,

    /// The point-group matrix in the crystal basis.
    pub crystal: Matrix3<f64>,

    /// The inverse of [`Self::crystal`].
    pub crystal_inverse: Matrix3<f64>,

    /// The point-group matrix in the Cartesian basis.
    pub cartesian: Matrix3<f64>,

    /// Boolean indicating if the operation is combined with time reversal.
    pub time_reversal: bool,

    /// The Euler decomposition of the proper part of [`Self::cartesian`], including the derived
    /// inversion flag.
    pub decomposition: EulerDecomposition,

    /// The mapping of atoms onto their images.
    pub equivalent_atoms: Permutation,

    /// The fractional translation $`\boldsymbol{\tau}`$ of each image atom, indexed by the image.
    pub translations: Vec<Vector3<f64>>,
}

impl SymmetryOperation {
    /// Returns `true` if this operation is the identity without time reversal.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        !self.time_reversal && self.crystal == Matrix3::identity()
    }

    /// Returns `true` if this operation contains an inversion.
    #[must_use]
    pub fn is_improper(&self) -> bool {
        self.decomposition.improper
    }

    /// Maps a fractional k-point onto its image $`\pm \mathbf{R} \mathbf{k}`$, folded into the
    /// canonical cell. The negative sign applies to time-reversed operations.
    #[must_use]
    pub fn act_on_k(&self, k: &Vector3<f64>) -> Vector3<f64> {
        let sign = if self.time_reversal { -1.0 } else { 1.0 };
        fold(&(sign * self.crystal * k.map(|x| x.rem_euclid(1.0))))
    }

    /// Maps a fractional k-point onto its pre-image $`\pm \mathbf{R}^{-1} \mathbf{k}`$, folded
    /// into the canonical cell.
    #[must_use]
    pub fn act_inverse_on_k(&self, k: &Vector3<f64>) -> Vector3<f64> {
        let sign = if self.time_reversal { -1.0 } else { 1.0 };
        fold(&(sign * self.crystal_inverse * k.map(|x| x.rem_euclid(1.0))))
    }
}

impl fmt::Display for SymmetryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (alpha, beta, gamma) = self.decomposition.euler_angles;
        write!(
            f,
            "{:>4}  TR: {:<3}  inv: {:<3}  Euler: ({alpha:>+8.4}, {beta:>+8.4}, {gamma:>+8.4})  atoms: {}",
            self.index,
            nice_bool(self.time_reversal),
            nice_bool(self.is_improper()),
            self.equivalent_atoms
        )
    }
}

/// A structure containing a wedge system converted to crystal coordinates, together with its
/// orbital basis and fully characterised symmetry operations.
#[derive(Clone, Debug)]
pub struct PreparedSystem {
    /// The real-space lattice vectors (rows), round-off corrected.
    pub a_vectors: Matrix3<f64>,

    /// The reciprocal lattice vectors (rows), round-off corrected.
    pub b_vectors: Matrix3<f64>,

    /// The atomic positions in fractional crystal coordinates.
    pub positions: Vec<Vector3<f64>>,

    /// The orbital basis.
    pub basis: OrbitalBasis,

    /// The symmetry operations.
    pub operations: Vec<SymmetryOperation>,

    /// The wedge k-points in fractional crystal coordinates.
    pub kpoints: Vec<Vector3<f64>>,

    /// The dimensions of the full grid.
    pub grid: [usize; 3],

    /// Boolean indicating if the calculation includes spin-orbit coupling.
    pub spin_orbit: bool,

    /// Boolean indicating if the calculation is magnetic.
    pub magnetic: bool,
}

impl PreparedSystem {
    /// Returns `true` if time-reversal symmetry relates $`H(\mathbf{k})`$ and
    /// $`H(-\mathbf{k})`$, which is the case unless the calculation is both spin-orbit and
    /// magnetic.
    #[must_use]
    pub fn has_time_reversal_symmetry(&self) -> bool {
        !(self.spin_orbit && self.magnetic)
    }

    /// Returns the index of the identity operation.
    ///
    /// # Errors
    ///
    /// Errors if no operation is the identity.
    pub fn identity_index(&self) -> Result<usize, anyhow::Error> {
        self.operations
            .iter()
            .position(SymmetryOperation::is_identity)
            .ok_or_else(|| {
                HkSymError::InconsistentInput(
                    "The symmetry operations do not contain the identity.".to_string(),
                )
                .into()
            })
    }
}

// =========
// Functions
// =========

fn matrix_from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| rows[i][j])
}

/// Converts a Cartesian row vector into fractional coordinates with respect to the rows of
/// `basis`, *i.e.* computes $`\mathbf{v} \mathbf{B}^{-1}`$ for the row vector $`\mathbf{v}`$.
fn to_fractional(v: &Vector3<f64>, basis_inverse: &Matrix3<f64>) -> Vector3<f64> {
    basis_inverse.transpose() * v
}

/// Rounds a value to 8 decimal places.
fn round8(x: f64) -> f64 {
    (x * 1e8).round() / 1e8
}

/// Computes the fractional translations of the image atoms of a symmetry operation,
/// $`\boldsymbol{\tau}_{p'} = \mathbf{R}^{\mathsf{T}} \mathbf{x}_p - \mathbf{x}_{p'}`$ with
/// $`p' = \sigma(p)`$.
pub fn image_translations(
    crystal: &Matrix3<f64>,
    positions: &[Vector3<f64>],
    equivalent_atoms: &Permutation,
) -> Result<Vec<Vector3<f64>>, anyhow::Error> {
    let mut translations = vec![Vector3::zeros(); positions.len()];
    for (p, pos) in positions.iter().enumerate() {
        let p1 = equivalent_atoms.image_of(p)?;
        translations[p1] = correct_roundoff_vector(&(crystal.transpose() * pos - positions[p1]));
    }
    Ok(translations)
}

/// Validates a wedge system and converts it into a [`PreparedSystem`].
///
/// Positions and k-points are converted to fractional crystal coordinates, symmetry matrices are
/// transformed into the Cartesian basis via $`\mathbf{A}^{-1} \mathbf{R} \mathbf{A}`$, and every
/// operation is decomposed into Euler angles with its inversion flag. All derived quantities are
/// round-off corrected.
///
/// # Errors
///
/// Errors with [`HkSymError::InconsistentInput`] if the shapes of the input arrays disagree, if
/// an equivalence map is not a bijection on the atoms, or if the identity is missing, and with
/// [`HkSymError::Decomposition`] if an operation has no Euler decomposition.
pub fn prepare_system(system: &WedgeSystem) -> Result<PreparedSystem, anyhow::Error> {
    let natoms = system.atoms.len();
    let nsym = system.symmetry_rotations.len();

    if system.positions.len() != natoms {
        return Err(inconsistent_input(format!(
            "{} atomic positions are given for {natoms} atoms.",
            system.positions.len()
        )));
    }
    if system.time_reversal.len() != nsym || system.equivalent_atoms.len() != nsym {
        return Err(inconsistent_input(format!(
            "{nsym} symmetry operations are given with {} time-reversal flags and {} \
            equivalence maps.",
            system.time_reversal.len(),
            system.equivalent_atoms.len()
        )));
    }
    if system.kpoints.is_empty() {
        return Err(inconsistent_input("No wedge k-points are given.".to_string()));
    }

    let basis = OrbitalBasis::new(&system.atoms, &system.species, system.spin_orbit)?;
    let (nawf0, nawf1, nk, nspin) = system.hamiltonian.dim();
    if nawf0 != basis.dim() || nawf1 != basis.dim() || nk != system.kpoints.len() || nspin == 0 {
        return Err(inconsistent_input(format!(
            "The wedge Hamiltonian has shape ({nawf0}, {nawf1}, {nk}, {nspin}), but the basis \
            has {} functions and the wedge has {} k-points.",
            basis.dim(),
            system.kpoints.len()
        )));
    }

    let a_vectors = correct_roundoff_matrix(&matrix_from_rows(&system.a_vectors));
    let b_vectors = correct_roundoff_matrix(&matrix_from_rows(&system.b_vectors));
    let a_inverse = a_vectors
        .try_inverse()
        .ok_or_else(|| inconsistent_input("The lattice vectors are linearly dependent.".to_string()))?;
    let b_inverse = correct_roundoff_matrix(&b_vectors.try_inverse().ok_or_else(|| {
        inconsistent_input("The reciprocal lattice vectors are linearly dependent.".to_string())
    })?);

    let positions = system
        .positions
        .iter()
        .map(|p| correct_roundoff_vector(&to_fractional(&Vector3::from(*p), &a_inverse)))
        .collect::<Vec<_>>();
    let kpoints = system
        .kpoints
        .iter()
        .map(|k| {
            to_fractional(&Vector3::from(*k), &b_inverse).map(|x| round8(correct_roundoff(x)))
        })
        .collect::<Vec<_>>();

    let (atol, rtol, snap) = if system.spin_orbit {
        (SPIN_ORBIT_DECOMPOSITION_ATOL, SPIN_ORBIT_DECOMPOSITION_RTOL, true)
    } else {
        (ROUNDOFF_ATOL, ROUNDOFF_RTOL, false)
    };

    let operations = system
        .symmetry_rotations
        .iter()
        .zip(system.time_reversal.iter())
        .zip(system.equivalent_atoms.iter())
        .enumerate()
        .map(|(index, ((rows, &time_reversal), equiv))| {
            let crystal = correct_roundoff_matrix(&matrix_from_rows(rows));
            let crystal_inverse = crystal.try_inverse().ok_or_else(|| {
                inconsistent_input(format!("Symmetry operation {index} is singular."))
            })?;
            let cartesian = correct_roundoff_matrix(&(a_inverse * crystal * a_vectors));
            let decomposition =
                decompose_rotation(&cartesian, atol, rtol, snap).ok_or_else(|| {
                    anyhow::Error::from(HkSymError::Decomposition {
                        index,
                        matrix: cartesian.transpose().into(),
                    })
                })?;
            if equiv.len() != natoms {
                return Err(inconsistent_input(format!(
                    "The equivalence map of symmetry operation {index} has {} entries for \
                    {natoms} atoms.",
                    equiv.len()
                )));
            }
            let equivalent_atoms = Permutation::from_image(equiv).map_err(|err| {
                inconsistent_input(format!(
                    "The equivalence map of symmetry operation {index} is invalid: {err}"
                ))
            })?;
            let translations = image_translations(&crystal, &positions, &equivalent_atoms)?;
            log::debug!("Symmetry operation {index}: {decomposition:?}");
            Ok(SymmetryOperation {
                index,
                crystal,
                crystal_inverse: correct_roundoff_matrix(&crystal_inverse),
                cartesian,
                time_reversal,
                decomposition,
                equivalent_atoms,
                translations,
            })
        })
        .collect::<Result<Vec<_>, anyhow::Error>>()?;

    let prepared = PreparedSystem {
        a_vectors,
        b_vectors,
        positions,
        basis,
        operations,
        kpoints,
        grid: system.grid,
        spin_orbit: system.spin_orbit,
        magnetic: system.magnetic,
    };
    let identity = prepared.identity_index()?;
    if !prepared.operations[identity].equivalent_atoms.is_identity() {
        return Err(inconsistent_input(
            "The identity operation does not map every atom onto itself.".to_string(),
        ));
    }
    Ok(prepared)
}

/// Returns the label of an orbital channel, *e.g.* `P` or `j=3/2`.
#[must_use]
pub fn channel_label(shell: &AngularShell, spin_orbit: bool) -> String {
    if spin_orbit {
        format!("j={}/2", shell.twoj)
    } else {
        ANGMOM_LABELS
            .get(shell.twoj as usize / 2)
            .map_or_else(|| format!("l={}", shell.twoj / 2), |s| (*s).to_string())
    }
}

impl fmt::Display for PreparedSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of atoms: {}", self.positions.len())?;
        writeln!(f, "Number of basis functions: {}", self.basis.dim())?;
        writeln!(
            f,
            "Channels: {}",
            self.basis
                .channels
                .iter()
                .map(|shell| format!("{}@{}", channel_label(shell, self.spin_orbit), shell.atom))
                .collect::<Vec<_>>()
                .join(" ")
        )?;
        writeln!(f, "Number of symmetry operations: {}", self.operations.len())?;
        writeln!(f, "Number of wedge k-points: {}", self.kpoints.len())?;
        writeln!(f, "Spin-orbit coupling: {}", nice_bool(self.spin_orbit))?;
        writeln!(f, "Magnetic: {}", nice_bool(self.magnetic))?;
        Ok(())
    }
}

/// Wraps a message into an [`anyhow::Error`] carrying an [`HkSymError::InconsistentInput`].
pub(crate) fn inconsistent_input(msg: impl Into<String>) -> anyhow::Error {
    HkSymError::InconsistentInput(msg.into()).into()
}
