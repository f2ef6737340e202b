use std::f64::consts::PI;

use approx::assert_relative_eq;
use nalgebra::{Matrix3, Vector3};
use num_complex::Complex;

use crate::auxiliary::geometry::{
    correct_roundoff, correct_roundoff_complex, decompose_rotation, euler_from_rotation, fold,
    fold_coordinate, isclose, match_point, periodic_distance, rotation_from_euler,
    ROUNDOFF_ATOL, ROUNDOFF_RTOL,
};

#[test]
fn test_geometry_isclose() {
    assert!(isclose(1.0 + 1e-9, 1.0, 1e-8, 1e-5));
    assert!(isclose(100.0 + 5e-4, 100.0, 1e-8, 1e-5));
    assert!(!isclose(1e-6, 0.0, 1e-8, 1e-5));
}

#[test]
fn test_geometry_correct_roundoff() {
    assert_eq!(correct_roundoff(3e-9), 0.0);
    assert_eq!(correct_roundoff(1.0 - 3e-6), 1.0);
    assert_eq!(correct_roundoff(-1.0 + 3e-6), -1.0);
    assert_eq!(correct_roundoff(0.25), 0.25);
    assert_eq!(correct_roundoff(1e-4), 1e-4);

    let z = correct_roundoff_complex(Complex::new(1e-10, -1e-10));
    assert_eq!(z, Complex::new(0.0, 0.0));
    let z = correct_roundoff_complex(Complex::new(-1.0, 1e-9));
    assert_eq!(z, Complex::new(-1.0, 0.0));
    let z = correct_roundoff_complex(Complex::new(0.5, 0.5));
    assert_eq!(z, Complex::new(0.5, 0.5));
}

#[test]
fn test_geometry_fold_boundaries() {
    assert_eq!(fold_coordinate(0.5), -0.5);
    assert_eq!(fold_coordinate(-0.5), -0.5);
    assert_eq!(fold_coordinate(1.0), 0.0);
    assert_eq!(fold_coordinate(-1.0), 0.0);
    assert_eq!(fold_coordinate(0.0), 0.0);
    assert_relative_eq!(fold_coordinate(0.75), -0.25, epsilon = 1e-12);
    assert_relative_eq!(fold_coordinate(-0.75), 0.25, epsilon = 1e-12);
    assert_relative_eq!(fold_coordinate(2.25), 0.25, epsilon = 1e-12);
    assert_eq!(fold_coordinate(0.5 - 1e-10), -0.5);

    let k = fold(&Vector3::new(0.5, 1.25, -0.125));
    assert_relative_eq!(k, Vector3::new(-0.5, 0.25, -0.125), epsilon = 1e-12);
}

#[test]
fn test_geometry_fold_is_idempotent() {
    for i in -20..=20 {
        let x = f64::from(i) * 0.0625;
        let once = fold_coordinate(x);
        assert!((-0.5..0.5).contains(&once));
        assert_eq!(fold_coordinate(once), once);
    }
}

#[test]
fn test_geometry_periodic_matching() {
    let a = Vector3::new(0.49999999, 0.0, 0.0);
    let b = Vector3::new(-0.5, 0.0, 0.0);
    assert!(periodic_distance(&a, &b) < 1e-6);

    let candidates = vec![
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(-0.5, 0.0, 0.0),
        Vector3::new(0.0, -0.5, 0.0),
    ];
    assert_eq!(match_point(&a, &candidates, 1e-6), Some(1));
    assert_eq!(
        match_point(&Vector3::new(0.0, 0.5, 1.0), &candidates, 1e-6),
        Some(2)
    );
    assert_eq!(
        match_point(&Vector3::new(0.25, 0.0, 0.0), &candidates, 1e-6),
        None
    );
}

#[test]
fn test_geometry_euler_round_trip() {
    let angles = [
        (0.3, 1.1, -0.7),
        (PI / 2.0, PI / 3.0, PI / 4.0),
        (-2.0, 2.5, 1.0),
        (0.0, 0.0, 0.0),
        (0.4, PI, 0.0),
    ];
    for &euler in angles.iter() {
        let rmat = rotation_from_euler(euler);
        let recovered = euler_from_rotation(&rmat);
        let rmat_recon = rotation_from_euler(recovered);
        assert_relative_eq!(rmat, rmat_recon, epsilon = 1e-10);
    }
}

#[test]
fn test_geometry_euler_gimbal_lock() {
    // Pure z rotation: all of the angle goes into alpha.
    let rmat = rotation_from_euler((0.3, 0.0, 0.4));
    let (alpha, beta, gamma) = euler_from_rotation(&rmat);
    assert_relative_eq!(alpha, 0.7, epsilon = 1e-12);
    assert_eq!(beta, 0.0);
    assert_eq!(gamma, 0.0);
}

#[test]
fn test_geometry_decompose_proper_and_improper() {
    let rmat = rotation_from_euler((0.2, 0.9, 1.3));
    let decomp =
        decompose_rotation(&rmat, ROUNDOFF_ATOL, ROUNDOFF_RTOL, false).expect("proper rotation");
    assert!(!decomp.improper);
    assert_relative_eq!(
        rotation_from_euler(decomp.euler_angles),
        rmat,
        epsilon = 1e-10
    );

    let inversion = -Matrix3::<f64>::identity();
    let decomp = decompose_rotation(&inversion, ROUNDOFF_ATOL, ROUNDOFF_RTOL, false)
        .expect("inversion");
    assert!(decomp.improper);
    assert_relative_eq!(
        rotation_from_euler(decomp.euler_angles),
        Matrix3::identity(),
        epsilon = 1e-10
    );

    // Mirror plane perpendicular to z.
    let sigma_h = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0);
    let decomp =
        decompose_rotation(&sigma_h, ROUNDOFF_ATOL, ROUNDOFF_RTOL, true).expect("mirror plane");
    assert!(decomp.improper);
    assert_relative_eq!(
        -rotation_from_euler(decomp.euler_angles),
        sigma_h,
        epsilon = 1e-10
    );
}

#[test]
fn test_geometry_decompose_rejects_non_orthogonal() {
    let shear = Matrix3::new(1.0, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
    assert!(decompose_rotation(&shear, ROUNDOFF_ATOL, ROUNDOFF_RTOL, false).is_none());
}
