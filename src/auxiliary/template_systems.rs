//! Small tight-binding systems with known symmetric Hamiltonians.
//!
//! All templates live on a simple cubic lattice with unit lattice parameter, so that crystal and
//! Cartesian coordinates coincide. Their Hamiltonians are nearest-neighbour models written in the
//! lattice gauge, $`|a, \mathbf{k}\rangle = \sum_{\mathbf{R}} e^{2\pi i \mathbf{k} \cdot
//! \mathbf{R}} \phi_a(\mathbf{r} - \mathbf{R} - \mathbf{x}_a)`$.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use anyhow;
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use ndarray::{array, s, Array2, Array4};
use num_complex::Complex;

use crate::expansion::reduce_to_wedge;
use crate::kpoints::{KGrid, MATCHING_TOLERANCE};
use crate::structure::{prepare_system, Species, WedgeSystem};

type C128 = Complex<f64>;

/// An enumerated type for the template models.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateModel {
    /// One atom with an $`s`$ orbital at the origin.
    CubicS,

    /// One atom with $`s`$ and $`p`$ orbitals at the origin.
    CubicSp,

    /// Two atoms with $`s`$ orbitals on the two sublattices of a body-centred cubic structure.
    CubicPair,

    /// Two atoms with $`s`$ orbitals at $`\pm(\tfrac{1}{8}, \tfrac{1}{8}, \tfrac{1}{8})`$,
    /// swapped by inversion.
    InversionPair,

    /// One atom with an $`s`$ shell coupled to spin, giving a single $`j = 1/2`$ channel.
    CubicSpinS,

    /// One atom with an $`s`$ shell coupled to spin, with the spin locked to
    /// $`\sin(2\pi\mathbf{k})`$ by the term $`\lambda \sum_a \sin(2\pi k_a) \sigma_a`$.
    ///
    /// The model is symmetric under proper rotations and time reversal, but not under
    /// inversion.
    CubicSpinTexture,

    /// One atom with $`s`$ and $`p`$ orbitals and on-site spin–orbit coupling, in the channels
    /// $`s_{1/2}`$, $`p_{1/2}`$, and $`p_{3/2}`$.
    CubicSpinOrbitSp,
}

impl TemplateModel {
    fn positions(&self) -> Vec<[f64; 3]> {
        match self {
            TemplateModel::CubicS
            | TemplateModel::CubicSp
            | TemplateModel::CubicSpinS
            | TemplateModel::CubicSpinTexture
            | TemplateModel::CubicSpinOrbitSp => vec![[0.0, 0.0, 0.0]],
            TemplateModel::CubicPair => vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
            TemplateModel::InversionPair => vec![[0.125, 0.125, 0.125], [-0.125, -0.125, -0.125]],
        }
    }

    fn species(&self) -> Species {
        let (shells, jchi) = match self {
            TemplateModel::CubicSp => (vec![0, 1], vec![]),
            TemplateModel::CubicSpinS | TemplateModel::CubicSpinTexture => (vec![0], vec![0.5]),
            TemplateModel::CubicSpinOrbitSp => (vec![0, 1, 1], vec![0.5, 0.5, 1.5]),
            _ => (vec![0], vec![]),
        };
        Species {
            label: "X".to_string(),
            shells,
            jchi,
        }
    }

    fn spin_orbit(&self) -> bool {
        matches!(
            self,
            TemplateModel::CubicSpinS
                | TemplateModel::CubicSpinTexture
                | TemplateModel::CubicSpinOrbitSp
        )
    }

    /// Evaluates the model Hamiltonian at a fractional k-point.
    #[must_use]
    pub fn hamiltonian(&self, k: &Vector3<f64>) -> Array2<C128> {
        let c = k.map(|x| (2.0 * PI * x).cos());
        let sn = k.map(|x| (2.0 * PI * x).sin());
        let band = |onsite: f64, hop: f64| C128::from(onsite + 2.0 * hop * c.sum());
        match self {
            TemplateModel::CubicS => array![[band(-1.0, 0.25)]],
            TemplateModel::CubicSpinS => {
                let e = band(0.5, -0.3);
                array![[e, C128::from(0.0)], [C128::from(0.0), e]]
            }
            TemplateModel::CubicPair => {
                let e = band(0.2, 0.1);
                let h12 = (0..3)
                    .map(|a| C128::from(1.0) + C128::new(0.0, -2.0 * PI * k[a]).exp())
                    .product::<C128>()
                    * 0.4;
                array![[e, h12], [h12.conj(), e]]
            }
            TemplateModel::InversionPair => {
                let e = band(-0.3, 0.2);
                let h12 = C128::from(0.7) + C128::new(0.0, -2.0 * PI * k[0]).exp() * 0.3;
                array![[e, h12], [h12.conj(), e]]
            }
            TemplateModel::CubicSpinTexture => {
                let e = band(0.5, -0.3);
                let (sx, sy, sz) = (0.2 * sn[0], 0.2 * sn[1], 0.2 * sn[2]);
                // Spin states ordered as m = -1/2, +1/2.
                array![[e - sz, C128::new(sx, sy)], [C128::new(sx, -sy), e + sz]]
            }
            TemplateModel::CubicSp => {
                // Chemistry orbitals (s, pz, px, py) are proportional to (s, z, -x, -y).
                let mmat = array![
                    [1.0, 0.0, 0.0, 0.0],
                    [0.0, 0.0, 0.0, 1.0],
                    [0.0, -1.0, 0.0, 0.0],
                    [0.0, 0.0, -1.0, 0.0],
                ]
                .mapv(C128::from);
                mmat.dot(&cartesian_sp(k)).dot(&mmat.t())
            }
            TemplateModel::CubicSpinOrbitSp => {
                let hcart = cartesian_sp(k);
                let spinful = Array2::from_shape_fn((8, 8), |(i, j)| {
                    if i % 2 == j % 2 {
                        hcart[(i / 2, j / 2)]
                    } else {
                        C128::from(0.0)
                    }
                });
                let cmat = sp_spinor_states();
                let cdag = cmat.t().map(|z| z.conj());
                let mut hmat = cdag.dot(&spinful).dot(&cmat);
                // L·S is -1 on p_{1/2} and 1/2 on p_{3/2}.
                let ls = [0.0, 0.0, -1.0, -1.0, 0.5, 0.5, 0.5, 0.5];
                for (i, x) in ls.iter().enumerate() {
                    hmat[(i, i)] += 0.3 * x;
                }
                hmat
            }
        }
    }
}

/// The $`sp`$ nearest-neighbour model in the Cartesian orbitals $`(s, x, y, z)`$.
fn cartesian_sp(k: &Vector3<f64>) -> Array2<C128> {
    let c = k.map(|x| (2.0 * PI * x).cos());
    let sn = k.map(|x| (2.0 * PI * x).sin());
    let (vss, vsp, vpps, vppp) = (-0.4, 0.35, 0.6, -0.15);
    let (es, ep) = (-2.0, 1.5);
    let mut hcart = Array2::<C128>::zeros((4, 4));
    hcart[(0, 0)] = C128::from(es + 2.0 * vss * c.sum());
    for a in 0..3 {
        let hsp = C128::new(0.0, 2.0 * vsp * sn[a]);
        hcart[(0, a + 1)] = hsp;
        hcart[(a + 1, 0)] = hsp.conj();
        hcart[(a + 1, a + 1)] =
            C128::from(ep + 2.0 * vpps * c[a] + 2.0 * vppp * (c.sum() - c[a]));
    }
    hcart
}

/// Expands the spin–orbit states $`|l, j, m\rangle`$ of an $`sp`$ atom, in the channel order
/// $`s_{1/2}, p_{1/2}, p_{3/2}`$ with increasing $`m`$, over the products of the Cartesian
/// orbitals $`(s, x, y, z)`$ with the spin states $`m_s = -1/2, +1/2`$.
fn sp_spinor_states() -> Array2<C128> {
    let r = FRAC_1_SQRT_2;
    let zero = C128::from(0.0);
    // Spherical harmonics with the Condon–Shortley phase.
    let ylm = |l: i32, twoml: i32| -> [C128; 4] {
        match (l, twoml) {
            (0, 0) => [C128::from(1.0), zero, zero, zero],
            (1, 2) => [zero, C128::from(-r), C128::new(0.0, -r), zero],
            (1, 0) => [zero, zero, zero, C128::from(1.0)],
            (1, -2) => [zero, C128::from(r), C128::new(0.0, -r), zero],
            _ => [zero; 4],
        }
    };
    // Clebsch–Gordan coefficients <l, m - ms; 1/2, ms | j, m>, with doubled projections.
    let cg = |l: i32, twoj: i32, twom: i32, twoms: i32| -> f64 {
        let denom = f64::from(2 * (2 * l + 1));
        let plus = (f64::from(2 * l + twom + 1) / denom).sqrt();
        let minus = (f64::from(2 * l - twom + 1) / denom).sqrt();
        match (twoj == 2 * l + 1, twoms > 0) {
            (true, true) => plus,
            (true, false) => minus,
            (false, true) => -minus,
            (false, false) => plus,
        }
    };
    let mut cmat = Array2::<C128>::zeros((8, 8));
    let mut col = 0;
    for (l, twoj) in [(0, 1), (1, 1), (1, 3)] {
        for twom in (-twoj..=twoj).step_by(2) {
            for (spin, twoms) in [-1, 1].into_iter().enumerate() {
                let twoml: i32 = twom - twoms;
                if twoml.abs() > 2 * l {
                    continue;
                }
                let coeff = cg(l, twoj, twom, twoms);
                for (orb, y) in ylm(l, twoml).into_iter().enumerate() {
                    cmat[(2 * orb + spin, col)] += y * coeff;
                }
            }
            col += 1;
        }
    }
    cmat
}

/// Returns the 48 signed permutation matrices of the full cubic group, or its 24 proper
/// rotations, with the identity first.
#[must_use]
pub fn cubic_rotations(include_improper: bool) -> Vec<[[f64; 3]; 3]> {
    (0..3)
        .permutations(3)
        .cartesian_product(
            [1.0, -1.0]
                .into_iter()
                .cartesian_product([1.0, -1.0])
                .cartesian_product([1.0, -1.0])
                .map(|((a, b), c)| [a, b, c])
                .collect::<Vec<_>>(),
        )
        .map(|(perm, signs)| {
            let mut rows = [[0.0; 3]; 3];
            for i in 0..3 {
                rows[i][perm[i]] = signs[i];
            }
            rows
        })
        .filter(|rows| include_improper || Matrix3::from_fn(|i, j| rows[i][j]).determinant() > 0.0)
        .collect()
}

/// Returns the identity and the inversion.
#[must_use]
pub fn inversion_rotations() -> Vec<[[f64; 3]; 3]> {
    let e = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let i = [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]];
    vec![e, i]
}

/// Determines which atom each atom is sent to by a rotation, pairing $`p`$ with the atom
/// $`\sigma(p)`$ for which $`\mathbf{R}^{\mathsf{T}} \mathbf{x}_p - \mathbf{x}_{\sigma(p)}`$ is a
/// lattice vector.
fn equivalent_atoms(rows: &[[f64; 3]; 3], positions: &[[f64; 3]]) -> Vec<usize> {
    let rmat = Matrix3::from_fn(|i, j| rows[i][j]);
    positions
        .iter()
        .map(|p| {
            let image = rmat.transpose() * Vector3::from(*p);
            positions
                .iter()
                .position(|q| {
                    (image - Vector3::from(*q))
                        .iter()
                        .all(|d| (d - d.round()).abs() < 1e-8)
                })
                .unwrap_or(usize::MAX)
        })
        .collect()
}

/// Builds a template system whose k-points are the whole grid.
///
/// # Arguments
///
/// * `model` - The template model.
/// * `grid` - The grid dimensions.
/// * `rotations` - The point-group matrices of the symmetry operations, identity first.
/// * `time_reversal` - The time-reversal flag of each operation.
///
/// # Errors
///
/// Errors if the grid dimensions are invalid.
pub fn template_full_system(
    model: TemplateModel,
    grid: [usize; 3],
    rotations: &[[[f64; 3]; 3]],
    time_reversal: &[bool],
) -> Result<WedgeSystem, anyhow::Error> {
    let positions = model.positions();
    let kgrid = KGrid::new(grid)?;
    let hks = kgrid
        .points()
        .iter()
        .map(|k| model.hamiltonian(k))
        .collect::<Vec<_>>();
    let nawf = hks[0].nrows();
    let hamiltonian = Array4::from_shape_fn((nawf, nawf, kgrid.len(), 1), |(a, b, k, _)| {
        hks[k][(a, b)]
    });
    let eye = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    Ok(WedgeSystem {
        alat: 1.0,
        a_vectors: eye,
        b_vectors: eye,
        atoms: vec!["X".to_string(); positions.len()],
        species: vec![model.species()],
        equivalent_atoms: rotations
            .iter()
            .map(|rows| equivalent_atoms(rows, &positions))
            .collect(),
        positions,
        symmetry_rotations: rotations.to_vec(),
        time_reversal: time_reversal.to_vec(),
        kpoints: kgrid.points().iter().map(|k| (*k).into()).collect(),
        grid,
        spin_orbit: model.spin_orbit(),
        magnetic: false,
        hamiltonian,
    })
}

/// Builds a template system restricted to an irreducible wedge of the grid.
///
/// # Errors
///
/// Errors if the template is inconsistent with the rotations.
pub fn template_wedge_system(
    model: TemplateModel,
    grid: [usize; 3],
    rotations: &[[[f64; 3]; 3]],
    time_reversal: &[bool],
) -> Result<WedgeSystem, anyhow::Error> {
    let full = template_full_system(model, grid, rotations, time_reversal)?;
    let prepared = prepare_system(&full)?;
    let kgrid = KGrid::new(grid)?;
    let hks = (0..kgrid.len())
        .map(|k| full.hamiltonian.slice(s![.., .., k, 0]).to_owned())
        .collect::<Vec<_>>();
    let (wedge_k, wedge_h) =
        reduce_to_wedge(&kgrid, &hks, &prepared.operations, MATCHING_TOLERANCE)?;
    let nawf = full.hamiltonian.dim().0;
    let hamiltonian = Array4::from_shape_fn((nawf, nawf, wedge_h.len(), 1), |(a, b, k, _)| {
        wedge_h[k][(a, b)]
    });
    Ok(WedgeSystem {
        kpoints: wedge_k.iter().map(|k| (*k).into()).collect(),
        hamiltonian,
        ..full
    })
}
