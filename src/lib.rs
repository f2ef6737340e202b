//! # HkSym: Symmetry Expansion of Tight-Binding Hamiltonians
//!
//! HkSym takes a projected tight-binding Hamiltonian $`H(\mathbf{k})`$ known only at the
//! k-points of the irreducible wedge of a Monkhorst–Pack grid, together with the space-group
//! operations of the crystal, and reconstructs $`H(\mathbf{k})`$ on every point of the full
//! grid. Its capabilities are:
//! - construction of the orbital-space representation of every space-group operation,
//!   including spin rotations for spin–orbit bases and antiunitary time reversal,
//! - matching of full-grid points to wedge preimages modulo reciprocal lattice vectors,
//! - enforcement of Hermiticity and time-reversal symmetry,
//! - iterative symmetrisation of the expanded grid by group averaging, optionally distributed
//!   over several workers, and
//! - adaptive-smearing densities of states and Kubo conductivities on the expanded grid.
//!
//! This documentation details the public API of the `hksym` crate.
//!
//! ## Examples and usage
//!
//! For most items (structs, enums, functions, and traits), their usages are illustrated in test
//! functions. The `hksym` binary reads a YAML input file; see
//! [`interfaces::input::Input`] for its layout.
//!
//! ## License
//!
//! GNU Lesser General Public License v3.0.

pub mod angmom;
pub mod auxiliary;
pub mod drivers;
pub mod enforcement;
pub mod error;
pub mod expansion;
pub mod interfaces;
pub mod io;
pub mod kpoints;
pub mod observables;
pub mod parallel;
pub mod permutation;
pub mod representation;
pub mod structure;
pub mod symmetrisation;
