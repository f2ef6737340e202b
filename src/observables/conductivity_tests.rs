use approx::assert_relative_eq;
use ndarray::{array, Array2};
use num_complex::Complex;

use crate::observables::conductivity::{
    berry_conductivity, spin_hall_conductivity, Broadening, CONDUCTIVITY_ENERGY_POINTS,
};
use crate::observables::Smearing;
use crate::parallel::{SerialCommunicator, ThreadCommunicator};

type C128 = Complex<f64>;

fn two_band_elements() -> (Array2<C128>, Array2<C128>) {
    let one = C128::new(1.0, 0.0);
    let i = C128::new(0.0, 1.0);
    let zero = C128::new(0.0, 0.0);
    (array![[zero, one], [one, zero]], array![[zero, i], [-i, zero]])
}

#[test]
fn test_two_band_spin_hall_closed_form() {
    let eig = array![[-1.0, 1.0]];
    let (j, p) = two_band_elements();
    let delta = 0.05;
    let broadening = Broadening::Fixed {
        temperature: 0.01,
        delta,
    };
    let cond = spin_hall_conductivity(
        &SerialCommunicator,
        eig.view(),
        &[j],
        &[p],
        2.0,
        0.0,
        &broadening,
    )
    .unwrap()
    .unwrap();
    assert_eq!(cond.energies.len(), CONDUCTIVITY_ENERGY_POINTS);
    assert_relative_eq!(cond.energies[1], 2.0 / 500.0);
    for (omega, sigma) in cond.energies.iter().zip(cond.sigma.iter()) {
        let freq = C128::new(*omega, delta);
        let expected = -2.0 / (4.0 - freq * freq + 1e-16);
        assert_relative_eq!(sigma.re, expected.re, epsilon = 1e-10);
        assert_relative_eq!(sigma.im, expected.im, epsilon = 1e-10);
    }
}

#[test]
fn test_berry_conductivity_swaps_polarisations() {
    let eig = array![[-1.0, 1.0]];
    let (j, p) = two_band_elements();
    let broadening = Broadening::Fixed {
        temperature: 0.01,
        delta: 0.05,
    };
    let spin_hall = spin_hall_conductivity(
        &SerialCommunicator,
        eig.view(),
        &[j.clone()],
        &[p.clone()],
        1.0,
        0.0,
        &broadening,
    )
    .unwrap()
    .unwrap();
    let berry = berry_conductivity(
        &SerialCommunicator,
        eig.view(),
        &[p],
        &[j],
        1.0,
        0.0,
        &broadening,
    )
    .unwrap()
    .unwrap();
    for (a, b) in berry.sigma.iter().zip(spin_hall.sigma.iter()) {
        assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-14);
    }
}

#[test]
fn test_adaptive_occupations_match_fixed_at_low_width() {
    let eig = array![[-1.0, 1.0]];
    let (j, p) = two_band_elements();
    let fixed = spin_hall_conductivity(
        &SerialCommunicator,
        eig.view(),
        &[j.clone()],
        &[p.clone()],
        1.0,
        0.0,
        &Broadening::Fixed {
            temperature: 0.01,
            delta: 0.1,
        },
    )
    .unwrap()
    .unwrap();
    let widths = array![[0.01, 0.01]];
    let transition_widths = vec![Array2::from_elem((2, 2), 0.1)];
    let adaptive = spin_hall_conductivity(
        &SerialCommunicator,
        eig.view(),
        &[j],
        &[p],
        1.0,
        0.0,
        &Broadening::Adaptive {
            smearing: Smearing::Gaussian,
            level_widths: widths.view(),
            transition_widths: &transition_widths,
        },
    )
    .unwrap()
    .unwrap();
    for (a, b) in adaptive.sigma.iter().zip(fixed.sigma.iter()) {
        assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-10);
    }
}

#[test]
fn test_conductivity_threaded_matches_serial() {
    let nk = 5;
    let eig = Array2::from_shape_fn((nk, 3), |(k, n)| -1.0 + 0.7 * n as f64 + 0.05 * k as f64);
    let elements = |phase: f64| {
        (0..nk)
            .map(|k| {
                Array2::from_shape_fn((3, 3), |(n, m)| {
                    C128::from_polar(1.0 + 0.1 * (n + m) as f64, phase * (n as f64 - m as f64) + 0.2 * k as f64)
                })
            })
            .collect::<Vec<_>>()
    };
    let current = elements(0.3);
    let momentum = elements(-0.8);
    let broadening = Broadening::Fixed {
        temperature: 0.05,
        delta: 0.05,
    };
    let serial = spin_hall_conductivity(
        &SerialCommunicator,
        eig.view(),
        &current,
        &momentum,
        3.0,
        0.0,
        &broadening,
    )
    .unwrap()
    .unwrap();
    let threaded = ThreadCommunicator::run(2, |comm| {
        spin_hall_conductivity(
            comm,
            eig.view(),
            &current,
            &momentum,
            3.0,
            0.0,
            &broadening,
        )
        .unwrap()
    })
    .unwrap();
    let root = threaded[0].as_ref().unwrap();
    assert!(threaded[1].is_none());
    for (a, b) in root.sigma.iter().zip(serial.sigma.iter()) {
        assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-10);
    }
}

#[test]
fn test_conductivity_bad_input() {
    let eig = array![[-1.0, 1.0]];
    let (j, p) = two_band_elements();
    assert!(spin_hall_conductivity(
        &SerialCommunicator,
        eig.view(),
        &[j.clone()],
        &[],
        1.0,
        0.0,
        &Broadening::Fixed {
            temperature: 0.01,
            delta: 0.05,
        },
    )
    .is_err());
    assert!(spin_hall_conductivity(
        &SerialCommunicator,
        eig.view(),
        &[j],
        &[p],
        1.0,
        0.0,
        &Broadening::Fixed {
            temperature: 0.0,
            delta: 0.05,
        },
    )
    .is_err());
}
