use approx::assert_relative_eq;
use nalgebra::Vector3;

use crate::auxiliary::template_systems::{
    cubic_rotations, inversion_rotations, template_full_system, TemplateModel,
};
use crate::error::HkSymError;
use crate::structure::{channel_label, prepare_system, OrbitalBasis, Species};

fn species(shells: Vec<u32>, jchi: Vec<f64>) -> Vec<Species> {
    vec![Species {
        label: "A".to_string(),
        shells,
        jchi,
    }]
}

#[test]
fn test_structure_orbital_basis_spinless() {
    let atoms = vec!["A".to_string(), "A".to_string()];
    let basis = OrbitalBasis::new(&atoms, &species(vec![0, 1, 2], vec![]), false).unwrap();
    assert_eq!(basis.dim(), 18);
    assert_eq!(basis.natoms(), 2);
    assert_eq!(basis.channels.len(), 6);
    assert_eq!(
        basis.channels.iter().map(|s| s.offset).collect::<Vec<_>>(),
        vec![0, 1, 4, 9, 10, 13]
    );
    assert_eq!(&basis.orbital_l[..9], &[0, 1, 1, 1, 2, 2, 2, 2, 2]);
    assert_eq!(basis.orbitals_of_atom(1), (9..18).collect::<Vec<_>>());
    assert_eq!(channel_label(&basis.channels[2], false), "D");
}

#[test]
fn test_structure_orbital_basis_spin_orbit() {
    let atoms = vec!["A".to_string()];
    let basis =
        OrbitalBasis::new(&atoms, &species(vec![0, 1, 1], vec![0.5, 0.5, 1.5]), true).unwrap();
    assert_eq!(basis.dim(), 8);
    assert_eq!(basis.orbital_l, vec![0, 0, 1, 1, 1, 1, 1, 1]);
    assert_eq!(
        basis.channels.iter().map(|s| (s.twoj, s.offset)).collect::<Vec<_>>(),
        vec![(1, 0), (1, 2), (3, 4)]
    );
    assert_eq!(channel_label(&basis.channels[2], true), "j=3/2");
}

#[test]
fn test_structure_orbital_basis_errors() {
    let atoms = vec!["A".to_string()];
    let err = OrbitalBasis::new(&atoms, &species(vec![0, 1], vec![0.5, 1.5]), true).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HkSymError>(),
        Some(HkSymError::InconsistentInput(_))
    ));

    let err = OrbitalBasis::new(&atoms, &species(vec![0], vec![1.0]), true).unwrap_err();
    assert!(err.downcast_ref::<HkSymError>().is_some());

    let err = OrbitalBasis::new(&atoms, &species(vec![4], vec![]), false).unwrap_err();
    assert!(err.downcast_ref::<HkSymError>().is_some());

    let others = vec!["B".to_string()];
    assert!(OrbitalBasis::new(&others, &species(vec![0], vec![]), false).is_err());
}

#[test]
fn test_structure_prepare_cubic_pair() {
    let rotations = cubic_rotations(true);
    let tr = vec![false; rotations.len()];
    let system = template_full_system(TemplateModel::CubicPair, [2, 2, 2], &rotations, &tr).unwrap();
    let prepared = prepare_system(&system).unwrap();
    assert_eq!(prepared.operations.len(), 48);
    assert_eq!(prepared.identity_index().unwrap(), 0);
    assert_eq!(
        prepared.operations.iter().filter(|op| op.is_improper()).count(),
        24
    );
    assert!(prepared.has_time_reversal_symmetry());

    let inversion = prepared
        .operations
        .iter()
        .find(|op| op.crystal == -nalgebra::Matrix3::identity())
        .unwrap();
    assert!(inversion.is_improper());
    assert!(inversion.equivalent_atoms.is_identity());
    assert_relative_eq!(inversion.translations[0], Vector3::<f64>::zeros());
    assert_relative_eq!(inversion.translations[1], Vector3::new(-1.0, -1.0, -1.0));
    assert_relative_eq!(
        inversion.act_on_k(&Vector3::new(0.25, 0.5, 0.0)),
        Vector3::new(-0.25, -0.5, 0.0)
    );
    assert_relative_eq!(
        inversion.act_inverse_on_k(&Vector3::new(0.25, -0.25, 0.0)),
        Vector3::new(-0.25, 0.25, 0.0)
    );
}

#[test]
fn test_structure_prepare_swapped_atoms() {
    let rotations = inversion_rotations();
    let system = template_full_system(
        TemplateModel::InversionPair,
        [2, 2, 2],
        &rotations,
        &[false, false],
    )
    .unwrap();
    let prepared = prepare_system(&system).unwrap();
    assert_eq!(prepared.operations[1].equivalent_atoms.image(), &vec![1, 0]);
    assert_relative_eq!(prepared.operations[1].translations[0], Vector3::<f64>::zeros());
}

#[test]
fn test_structure_prepare_conversions() {
    let rotations = inversion_rotations();
    let mut system =
        template_full_system(TemplateModel::CubicS, [2, 1, 1], &rotations, &[false, false])
            .unwrap();
    system.a_vectors = [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]];
    system.b_vectors = [[0.5, 0.0, 0.0], [0.0, 0.5, 0.0], [0.0, 0.0, 0.5]];
    system.positions = vec![[1.0, 0.5, 0.0]];
    system.kpoints = vec![[0.0, 0.0, 0.0], [-0.25, 0.1 / 3.0, 0.0]];
    let prepared = prepare_system(&system).unwrap();
    assert_relative_eq!(prepared.positions[0], Vector3::new(0.5, 0.25, 0.0));
    assert_relative_eq!(prepared.kpoints[1], Vector3::new(-0.5, 0.06666667, 0.0));
    assert_relative_eq!(
        prepared.operations[1].cartesian,
        -nalgebra::Matrix3::<f64>::identity()
    );
}

#[test]
fn test_structure_prepare_errors() {
    let rotations = inversion_rotations();
    let base =
        template_full_system(TemplateModel::CubicS, [2, 2, 2], &rotations, &[false, false])
            .unwrap();

    let mut shear = base.clone();
    shear.symmetry_rotations[1] = [[1.0, 0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let err = prepare_system(&shear).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HkSymError>(),
        Some(HkSymError::Decomposition { index: 1, .. })
    ));

    let mut no_identity = base.clone();
    no_identity.symmetry_rotations = vec![rotations[1]];
    no_identity.time_reversal = vec![false];
    no_identity.equivalent_atoms = vec![vec![0]];
    let err = prepare_system(&no_identity).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HkSymError>(),
        Some(HkSymError::InconsistentInput(_))
    ));

    let mut bad_map = base.clone();
    bad_map.equivalent_atoms[1] = vec![1];
    assert!(prepare_system(&bad_map).is_err());

    let mut bad_flags = base;
    bad_flags.time_reversal.pop();
    assert!(prepare_system(&bad_flags).is_err());
}
