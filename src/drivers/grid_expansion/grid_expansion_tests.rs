use std::env;

use approx::assert_relative_eq;
use ndarray::{Array2, Array4, Axis};
use num_complex::Complex;

use crate::auxiliary::template_systems::{
    cubic_rotations, inversion_rotations, template_full_system, template_wedge_system,
    TemplateModel,
};
use crate::drivers::grid_expansion::{
    FullGridHamiltonian, GridExpansionDriver, GridExpansionParams, VERIFICATION_TOLERANCE,
};
use crate::drivers::HkSymDriver;
use crate::error::HkSymError;
use crate::io::{read_hksym_binary, write_hksym_binary, HkSymFileType};
use crate::kpoints::KGrid;
use crate::parallel::{SerialCommunicator, ThreadCommunicator};
use crate::structure::WedgeSystem;

type C128 = Complex<f64>;

fn frobenius(mat: &Array2<C128>) -> f64 {
    mat.map(|x| x.norm_sqr()).sum().sqrt()
}

fn assert_matches_model(
    full: &FullGridHamiltonian,
    model: TemplateModel,
    ispin: usize,
    scale: f64,
) {
    let grid = KGrid::new(full.grid).unwrap();
    for (hmat, k) in full.channel(ispin).iter().zip(grid.points().iter()) {
        let expected = model.hamiltonian(k).mapv(|z| z * scale);
        assert_relative_eq!(frobenius(&(hmat - &expected)), 0.0, epsilon = 1e-10);
    }
}

fn cubic_wedge(model: TemplateModel) -> WedgeSystem {
    let rotations = cubic_rotations(true);
    template_wedge_system(model, [4, 4, 4], &rotations, &vec![false; rotations.len()]).unwrap()
}

/// A system with the identity as its only operation, and the wedge of the inversion group.
fn identity_only_half_grid() -> WedgeSystem {
    let identity = vec![inversion_rotations()[0]];
    let full =
        template_full_system(TemplateModel::InversionPair, [4, 4, 4], &identity, &[false])
            .unwrap();
    let wedge = template_wedge_system(
        TemplateModel::InversionPair,
        [4, 4, 4],
        &inversion_rotations(),
        &[false, false],
    )
    .unwrap();
    WedgeSystem {
        kpoints: wedge.kpoints,
        hamiltonian: wedge.hamiltonian,
        ..full
    }
}

fn temp_name(stem: &str) -> String {
    env::temp_dir()
        .join(format!("hksym_{stem}_{}", std::process::id()))
        .to_string_lossy()
        .into_owned()
}

#[test]
fn test_grid_expansion_params_defaults() {
    let params = GridExpansionParams::default();
    assert_eq!(params.max_rounds, 16);
    assert!(params.convergence_threshold.is_none());
    assert_eq!(params.workers, 1);
    assert_relative_eq!(params.matching_tolerance, 1e-6);
    assert!(params.symmetrise);
    assert!(params.enforce_time_reversal);
    assert!(!params.verify);
    assert_relative_eq!(params.verification_tolerance, VERIFICATION_TOLERANCE);
    assert!(params.result_save_name.is_none());

    assert!(GridExpansionParams::builder().workers(0).build().is_err());
    assert!(GridExpansionParams::builder()
        .matching_tolerance(-1.0)
        .build()
        .is_err());

    let parsed: GridExpansionParams =
        serde_yaml::from_str("max_rounds: 4\nworkers: 2\n").unwrap();
    assert_eq!(parsed.max_rounds, 4);
    assert_eq!(parsed.workers, 2);
    assert!(parsed.symmetrise);
}

#[test]
fn test_grid_expansion_cubic_models() {
    for model in [TemplateModel::CubicSp, TemplateModel::CubicPair] {
        let system = cubic_wedge(model);
        let params = GridExpansionParams::builder()
            .max_rounds(2)
            .verify(true)
            .build()
            .unwrap();
        let mut driver = GridExpansionDriver::builder()
            .parameters(&params)
            .system(&system)
            .communicator(&SerialCommunicator)
            .build()
            .unwrap();
        assert!(driver.result().is_err());
        assert!(driver.run().is_ok());
        let result = driver.result().unwrap();

        assert_eq!(result.full_grid.grid, [4, 4, 4]);
        assert_eq!(result.full_grid.kpoints.len(), 64);
        assert_matches_model(&result.full_grid, model, 0, 1.0);

        let channel = &result.channels[0];
        assert!(channel.wedge_points >= system.kpoints.len());
        assert_eq!(channel.operation_counts.iter().sum::<usize>(), 64);
        assert_eq!(channel.residuals.len(), 2);
        assert!(channel.residuals.iter().all(|&r| r < 1e-10));
        let report = channel.verification.as_ref().unwrap();
        assert!(report.is_good());
        assert!(report.good_operations().contains(&0));
    }
}

#[test]
fn test_grid_expansion_time_reversal_completion() {
    let system = identity_only_half_grid();
    assert_eq!(system.kpoints.len(), 36);

    let params = GridExpansionParams::builder().max_rounds(1).build().unwrap();
    let mut driver = GridExpansionDriver::builder()
        .parameters(&params)
        .system(&system)
        .communicator(&SerialCommunicator)
        .build()
        .unwrap();
    driver.run().unwrap();
    let result = driver.result().unwrap();
    assert_eq!(result.channels[0].wedge_points, 64);
    assert_matches_model(&result.full_grid, TemplateModel::InversionPair, 0, 1.0);

    let params = GridExpansionParams::builder()
        .enforce_time_reversal(false)
        .build()
        .unwrap();
    let mut driver = GridExpansionDriver::builder()
        .parameters(&params)
        .system(&system)
        .communicator(&SerialCommunicator)
        .build()
        .unwrap();
    let err = driver.run().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HkSymError>(),
        Some(HkSymError::IncompleteCoverage {
            covered: 36,
            total: 64,
            ..
        })
    ));
}

#[test]
fn test_grid_expansion_spin_channels_are_independent() {
    let model = TemplateModel::CubicSp;
    let mut system = cubic_wedge(model);
    let doubled = system.hamiltonian.mapv(|z| z * 2.0);
    let stacked =
        ndarray::concatenate(Axis(3), &[system.hamiltonian.view(), doubled.view()]).unwrap();
    system.hamiltonian = stacked;
    let params = GridExpansionParams::builder()
        .symmetrise(false)
        .build()
        .unwrap();
    let mut driver = GridExpansionDriver::builder()
        .parameters(&params)
        .system(&system)
        .communicator(&SerialCommunicator)
        .build()
        .unwrap();
    driver.run().unwrap();
    let result = driver.result().unwrap();
    assert_eq!(result.full_grid.nspin(), 2);
    assert_eq!(result.channels.len(), 2);
    assert!(result.channels.iter().all(|channel| channel.residuals.is_empty()));
    assert_matches_model(&result.full_grid, model, 0, 1.0);
    assert_matches_model(&result.full_grid, model, 1, 2.0);
}

#[test]
fn test_grid_expansion_save_and_verify_against_reference() {
    let model = TemplateModel::CubicSp;
    let system = cubic_wedge(model);
    let saved = temp_name("saved_grid");
    let params = GridExpansionParams::builder()
        .max_rounds(1)
        .result_save_name(Some(saved.clone()))
        .build()
        .unwrap();
    let mut driver = GridExpansionDriver::builder()
        .parameters(&params)
        .system(&system)
        .communicator(&SerialCommunicator)
        .build()
        .unwrap();
    driver.run().unwrap();
    let full = driver.result().unwrap().full_grid.clone();
    let read: FullGridHamiltonian = read_hksym_binary(&saved, HkSymFileType::Ham).unwrap();
    assert_eq!(read, full);

    // Spoil one grid point of the reference.
    let grid = KGrid::new([4, 4, 4]).unwrap();
    let target = grid.linear_index([1, 2, 3]);
    let mut spoiled = full.clone();
    spoiled
        .hamiltonian
        .slice_mut(ndarray::s![.., .., target, 0])
        .mapv_inplace(|z| z + 1.0);
    let reference = temp_name("reference_grid");
    write_hksym_binary(&reference, HkSymFileType::Ham, &spoiled).unwrap();

    let params = GridExpansionParams::builder()
        .symmetrise(false)
        .verify(true)
        .verification_reference(Some(reference))
        .build()
        .unwrap();
    let mut driver = GridExpansionDriver::builder()
        .parameters(&params)
        .system(&system)
        .communicator(&SerialCommunicator)
        .build()
        .unwrap();
    driver.run().unwrap();
    let report = driver.result().unwrap().channels[0]
        .verification
        .clone()
        .unwrap();
    assert!(!report.is_good());
    assert_eq!(report.bad_operations().len(), 1);
    let bad = report.bad_operations()[0];
    assert!(report.max_deviations[bad].unwrap() > 0.99);
    assert!(report.good_operations().iter().all(|&isym| isym != bad));
}

#[test]
fn test_grid_expansion_verification_needs_a_reference() {
    let system = cubic_wedge(TemplateModel::CubicS);
    let params = GridExpansionParams::builder()
        .symmetrise(false)
        .verify(true)
        .build()
        .unwrap();
    assert!(GridExpansionDriver::builder()
        .parameters(&params)
        .system(&system)
        .communicator(&SerialCommunicator)
        .build()
        .is_err());
}

#[test]
fn test_grid_expansion_threaded_matches_serial() {
    let model = TemplateModel::CubicPair;
    let system = cubic_wedge(model);
    let params = GridExpansionParams::builder()
        .max_rounds(2)
        .workers(3)
        .build()
        .unwrap();
    let mut serial = GridExpansionDriver::builder()
        .parameters(&params)
        .system(&system)
        .communicator(&SerialCommunicator)
        .build()
        .unwrap();
    serial.run().unwrap();
    let serial_grid = serial.result().unwrap().full_grid.hamiltonian.clone();

    let threaded = ThreadCommunicator::run(3, |comm| {
        let mut driver = GridExpansionDriver::builder()
            .parameters(&params)
            .system(&system)
            .communicator(comm)
            .build()
            .unwrap();
        driver.run().unwrap();
        driver.result().unwrap().full_grid.hamiltonian.clone()
    })
    .unwrap();
    for grid in threaded.iter() {
        let diff: Array4<C128> = grid - &serial_grid;
        assert!(diff.iter().all(|z| z.norm() < 1e-12));
    }
}
