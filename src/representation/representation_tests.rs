use approx::assert_relative_eq;
use nalgebra::Vector3;
use ndarray::Array2;
use num_complex::Complex;

use crate::auxiliary::template_systems::{
    cubic_rotations, inversion_rotations, template_full_system, TemplateModel,
};
use crate::representation::{inversion_parity, time_reversal_operator, Representation};
use crate::structure::{prepare_system, OrbitalBasis, PreparedSystem, Species};

type C128 = Complex<f64>;

fn frobenius(mat: &Array2<C128>) -> f64 {
    mat.map(|x| x.norm_sqr()).sum().sqrt()
}

fn prepared(model: TemplateModel, rotations: &[[[f64; 3]; 3]], tr: &[bool]) -> PreparedSystem {
    let system = template_full_system(model, [2, 2, 2], rotations, tr).unwrap();
    prepare_system(&system).unwrap()
}

fn sample_kpoints() -> Vec<Vector3<f64>> {
    vec![
        Vector3::new(0.1, 0.23, -0.37),
        Vector3::new(-0.5, 0.25, 0.0),
        Vector3::new(0.31, -0.08, 0.44),
    ]
}

/// Checks that transforming H(k) by every operation gives H at the image of k.
fn check_transformation_law(model: TemplateModel, rotations: &[[[f64; 3]; 3]], tr: &[bool]) {
    let system = prepared(model, rotations, tr);
    let rep = Representation::build(&system).unwrap();
    for (isym, op) in system.operations.iter().enumerate() {
        for k in sample_kpoints() {
            let transformed = rep.transform(isym, &k, &model.hamiltonian(&k));
            let expected = model.hamiltonian(&op.act_on_k(&k));
            assert_relative_eq!(frobenius(&(transformed - expected)), 0.0, epsilon = 1e-10);
        }
    }
}

#[test]
fn test_representation_identity_and_unitarity() {
    let rotations = cubic_rotations(true);
    let system = prepared(TemplateModel::CubicSp, &rotations, &vec![false; rotations.len()]);
    let rep = Representation::build(&system).unwrap();
    assert_eq!(rep.len(), 48);
    assert!(rep.is_identity(0));
    assert!(!rep.is_identity(1));
    let eye = Array2::<C128>::eye(4);
    assert_relative_eq!(frobenius(&(&rep.operators[0] - &eye)), 0.0, epsilon = 1e-14);
    for umat in rep.operators.iter() {
        let udag = umat.t().map(|z| z.conj());
        assert_relative_eq!(frobenius(&(umat.dot(&udag) - &eye)), 0.0, epsilon = 1e-12);
    }
}

#[test]
fn test_representation_cubic_sp_transformation_law() {
    let rotations = cubic_rotations(true);
    check_transformation_law(
        TemplateModel::CubicSp,
        &rotations,
        &vec![false; rotations.len()],
    );
}

#[test]
fn test_representation_phase_shift_transformation_law() {
    let rotations = cubic_rotations(true);
    check_transformation_law(
        TemplateModel::CubicPair,
        &rotations,
        &vec![false; rotations.len()],
    );
}

#[test]
fn test_representation_atom_swap_transformation_law() {
    check_transformation_law(
        TemplateModel::InversionPair,
        &inversion_rotations(),
        &[false, false],
    );
}

#[test]
fn test_representation_time_reversed_operations() {
    let rotations = cubic_rotations(false);
    let mut doubled = rotations.clone();
    doubled.extend(rotations.iter().copied());
    let tr = (0..doubled.len())
        .map(|i| i >= rotations.len())
        .collect::<Vec<_>>();
    // The spinless sp model mixes parities, so a parity sign on its time-reversed operators
    // would show here.
    check_transformation_law(TemplateModel::CubicSp, &doubled, &tr);
    check_transformation_law(TemplateModel::CubicSpinS, &doubled, &tr);
    check_transformation_law(TemplateModel::CubicSpinTexture, &doubled, &tr);
    check_transformation_law(TemplateModel::CubicSpinOrbitSp, &doubled, &tr);
}

#[test]
fn test_representation_spin_orbit_sp_full_group() {
    let rotations = cubic_rotations(true);
    let mut doubled = rotations.clone();
    doubled.extend(rotations.iter().copied());
    let tr = (0..doubled.len())
        .map(|i| i >= rotations.len())
        .collect::<Vec<_>>();
    check_transformation_law(TemplateModel::CubicSpinOrbitSp, &doubled, &tr);
}

#[test]
fn test_representation_spin_texture_breaks_inversion() {
    let system = prepared(
        TemplateModel::CubicSpinTexture,
        &inversion_rotations(),
        &[false, false],
    );
    let rep = Representation::build(&system).unwrap();
    let model = TemplateModel::CubicSpinTexture;
    let k = sample_kpoints()[0];
    let transformed = rep.transform(1, &k, &model.hamiltonian(&k));
    let expected = model.hamiltonian(&system.operations[1].act_on_k(&k));
    assert!(frobenius(&(transformed - expected)) > 0.1);
}

#[test]
fn test_representation_spin_orbit_time_reversal_map() {
    let rotations = cubic_rotations(false);
    let system = prepared(
        TemplateModel::CubicSpinOrbitSp,
        &rotations,
        &vec![false; rotations.len()],
    );
    let rep = Representation::build(&system).unwrap();
    let model = TemplateModel::CubicSpinOrbitSp;
    for k in sample_kpoints() {
        let partner = rep
            .time_reversal_map(&model.hamiltonian(&k))
            .mapv(|z| z.conj());
        let diff = partner - model.hamiltonian(&(-k));
        assert_relative_eq!(frobenius(&diff), 0.0, epsilon = 1e-10);
    }
}

#[test]
fn test_representation_time_reversal_operator() {
    let atoms = vec!["A".to_string()];
    let species = vec![Species {
        label: "A".to_string(),
        shells: vec![0, 1, 1],
        jchi: vec![0.5, 0.5, 1.5],
    }];
    let basis = OrbitalBasis::new(&atoms, &species, true).unwrap();
    let utr = time_reversal_operator(&basis).unwrap();
    assert_eq!(utr[(0, 1)], C128::from(-1.0));
    assert_eq!(utr[(1, 0)], C128::from(1.0));
    // The antiunitary time-reversal operator squares to -1 on half-integral spins.
    let square = utr.dot(&utr.map(|z| z.conj()));
    let minus_eye = -Array2::<C128>::eye(8);
    assert_relative_eq!(frobenius(&(square - minus_eye)), 0.0, epsilon = 1e-14);

    let spinless = OrbitalBasis::new(&atoms, &[Species { jchi: vec![], ..species[0].clone() }], false)
        .unwrap();
    let utr = time_reversal_operator(&spinless).unwrap();
    assert_eq!(utr, Array2::<C128>::eye(7));
}

#[test]
fn test_representation_inversion_parity() {
    let atoms = vec!["A".to_string()];
    let species = vec![Species {
        label: "A".to_string(),
        shells: vec![0, 1],
        jchi: vec![],
    }];
    let basis = OrbitalBasis::new(&atoms, &species, false).unwrap();
    let parity = inversion_parity(&basis);
    assert_eq!(parity[(0, 0)], 1.0);
    assert_eq!(parity[(0, 2)], -1.0);
    assert_eq!(parity[(2, 3)], 1.0);
}
