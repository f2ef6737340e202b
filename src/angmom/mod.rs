//! Angular momentum conversion and transformation.

pub mod sh_conversion;
pub mod spinor_rotation_3d;

/// Alphabetical labels of orbital angular momenta supported by projected bases.
pub static ANGMOM_LABELS: [&str; 4] = ["S", "P", "D", "F"];

/// Largest orbital angular momentum supported.
pub const MAX_L: u32 = 3;

/// Largest value of $`2j`$ supported for spin-orbit channels.
pub const MAX_TWOJ: u32 = 7;
