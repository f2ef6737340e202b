//! Observables derived from the eigenvalues and matrix elements of full-grid Hamiltonians.

use std::f64::consts::PI;
use std::fmt;

use libm::erfc;
use serde::{Deserialize, Serialize};

pub mod conductivity;
pub mod dos;


/// An enumerated type for the broadening kernels of discrete levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Smearing {
    /// Gaussian broadening.
    Gaussian,

    /// First-order Methfessel--Paxton broadening.
    MethfesselPaxton,
}

impl Smearing {
    /// Evaluates the broadening kernel of a level at `level` with width `width`, at energy
    /// `energy`.
    ///
    /// With $`x = (E - \epsilon)/w`$, the Gaussian kernel is
    /// $`e^{-x^2}/(w\sqrt{\pi})`$ and the first-order Methfessel--Paxton kernel is
    /// $`e^{-x^2}(3/2 - x^2)/(w\sqrt{\pi})`$. Both integrate to one.
    #[must_use]
    pub fn delta(&self, energy: f64, level: f64, width: f64) -> f64 {
        let x = (energy - level) / width;
        let gaussian = (-x * x).exp() / (width * PI.sqrt());
        match self {
            Self::Gaussian => gaussian,
            Self::MethfesselPaxton => gaussian * (1.5 - x * x),
        }
    }

    /// Evaluates the occupation of a level at `level` with width `width`, for a Fermi energy
    /// `fermi_energy`.
    ///
    /// This is the integral of [`Self::delta`] over energies below the Fermi energy. With
    /// $`x = (\epsilon - E_{\mathrm{F}})/w`$, the Gaussian occupation is
    /// $`\operatorname{erfc}(x)/2`$, and the Methfessel--Paxton occupation adds
    /// $`-x e^{-x^2}/(2\sqrt{\pi})`$.
    #[must_use]
    pub fn occupation(&self, level: f64, fermi_energy: f64, width: f64) -> f64 {
        let x = (level - fermi_energy) / width;
        let step = 0.5 * erfc(x);
        match self {
            Self::Gaussian => step,
            Self::MethfesselPaxton => step - x * (-x * x).exp() / (2.0 * PI.sqrt()),
        }
    }
}

impl fmt::Display for Smearing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gaussian => write!(f, "Gaussian"),
            Self::MethfesselPaxton => write!(f, "Methfessel--Paxton (first order)"),
        }
    }
}

/// Evaluates the Fermi--Dirac occupation of a level at temperature `temperature` (in energy
/// units).
#[must_use]
pub fn fermi_dirac(level: f64, fermi_energy: f64, temperature: f64) -> f64 {
    1.0 / (((level - fermi_energy) / temperature).exp() + 1.0)
}
