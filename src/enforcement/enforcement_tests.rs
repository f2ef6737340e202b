use approx::assert_relative_eq;
use ndarray::Array2;
use num_complex::Complex;
use rand::Rng;

use crate::auxiliary::template_systems::{inversion_rotations, template_full_system, TemplateModel};
use crate::enforcement::{enforce_hermiticity, enforce_time_reversal};
use crate::kpoints::KGrid;
use crate::representation::Representation;
use crate::structure::{prepare_system, Species, WedgeSystem};

type C128 = Complex<f64>;

fn frobenius(mat: &Array2<C128>) -> f64 {
    mat.map(|x| x.norm_sqr()).sum().sqrt()
}

fn random_matrices(n: usize, nk: usize) -> Vec<Array2<C128>> {
    let mut rng = rand::thread_rng();
    (0..nk)
        .map(|_| {
            Array2::from_shape_simple_fn((n, n), || {
                C128::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
            })
        })
        .collect()
}

fn representation(system: &WedgeSystem) -> Representation {
    Representation::build(&prepare_system(system).unwrap()).unwrap()
}

fn spin_orbit_system(grid: [usize; 3]) -> WedgeSystem {
    let mut system =
        template_full_system(TemplateModel::CubicSpinS, grid, &inversion_rotations(), &[
            false, false,
        ])
        .unwrap();
    system.species = vec![Species {
        label: "X".to_string(),
        shells: vec![0, 1, 1],
        jchi: vec![0.5, 0.5, 1.5],
    }];
    let nk = system.kpoints.len();
    system.hamiltonian = ndarray::Array4::zeros((8, 8, nk, 1));
    system
}

#[test]
fn test_enforcement_hermiticity_idempotent() {
    let hks = random_matrices(5, 4);
    let once = enforce_hermiticity(&hks);
    let twice = enforce_hermiticity(&once);
    for (a, b) in once.iter().zip(twice.iter()) {
        assert_relative_eq!(frobenius(&(a - b)), 0.0, epsilon = 1e-14);
        let adag = a.t().map(|z| z.conj());
        assert_relative_eq!(frobenius(&(a - &adag)), 0.0, epsilon = 1e-14);
    }
}

#[test]
fn test_enforcement_time_reversal_spinless() {
    let grid = KGrid::new([3, 4, 2]).unwrap();
    let system =
        template_full_system(TemplateModel::CubicSp, [3, 4, 2], &inversion_rotations(), &[
            false, false,
        ])
        .unwrap();
    let rep = representation(&system);
    let hks = random_matrices(4, grid.len());
    let once = enforce_time_reversal(&hks, &grid, &rep);
    for n in 0..grid.len() {
        let partner = once[grid.inverse_index(n)].mapv(|z| z.conj());
        assert_relative_eq!(frobenius(&(&once[n] - &partner)), 0.0, epsilon = 1e-14);
    }
    let twice = enforce_time_reversal(&once, &grid, &rep);
    for (a, b) in once.iter().zip(twice.iter()) {
        assert_relative_eq!(frobenius(&(a - b)), 0.0, epsilon = 1e-14);
    }
}

#[test]
fn test_enforcement_time_reversal_spin_orbit_idempotent() {
    let grid = KGrid::new([2, 3, 2]).unwrap();
    let rep = representation(&spin_orbit_system([2, 3, 2]));
    let hks = enforce_hermiticity(&random_matrices(8, grid.len()));
    let once = enforce_time_reversal(&hks, &grid, &rep);
    let twice = enforce_time_reversal(&once, &grid, &rep);
    for (a, b) in once.iter().zip(twice.iter()) {
        assert_relative_eq!(frobenius(&(a - b)), 0.0, epsilon = 1e-13);
    }
    // Kramers pairs: the time-reversed partner of H(-k) reproduces H(k).
    for n in 0..grid.len() {
        let partner = rep
            .time_reversal_map(&once[grid.inverse_index(n)])
            .mapv(|z| z.conj());
        assert_relative_eq!(frobenius(&(&once[n] - &partner)), 0.0, epsilon = 1e-13);
    }
}

#[test]
fn test_enforcement_time_reversal_keeps_spin_orbit_model() {
    let grid = KGrid::new([3, 4, 2]).unwrap();
    for model in [TemplateModel::CubicSpinTexture, TemplateModel::CubicSpinOrbitSp] {
        let system = template_full_system(model, [3, 4, 2], &[inversion_rotations()[0]], &[false])
            .unwrap();
        let rep = representation(&system);
        let hks = grid
            .points()
            .iter()
            .map(|k| model.hamiltonian(k))
            .collect::<Vec<_>>();
        let enforced = enforce_time_reversal(&hks, &grid, &rep);
        for (a, b) in enforced.iter().zip(hks.iter()) {
            assert_relative_eq!(frobenius(&(a - b)), 0.0, epsilon = 1e-12);
        }
    }
}
