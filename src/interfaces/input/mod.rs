//! YAML input specification of an HkSym run.

use std::path::PathBuf;

use anyhow::{self, ensure, format_err, Context};
use ndarray::{Array4, ShapeBuilder};
use serde::{Deserialize, Serialize};

use crate::drivers::grid_expansion::{GridExpansionDriver, GridExpansionParams};
use crate::drivers::HkSymDriver;
use crate::interfaces::InputHandle;
use crate::io::format::{hksym_error, hksym_output, log_subtitle};
use crate::io::numeric::{read_complex_values, MatrixOrder, NumericByteOrder};
use crate::io::{read_hksym_binary, HkSymFileType};
use crate::parallel::{Communicator, SerialCommunicator, ThreadCommunicator};
use crate::structure::{OrbitalBasis, Species, WedgeSystem};

#[cfg(test)]
#[path = "input_tests.rs"]
mod input_tests;

fn expand_grid<C: Communicator>(
    params: &GridExpansionParams,
    system: &WedgeSystem,
    comm: &C,
) -> Result<(), anyhow::Error> {
    let mut driver = GridExpansionDriver::builder()
        .parameters(params)
        .system(system)
        .communicator(comm)
        .build()?;
    driver.run()
}

/// Runs the expansion on the processes of an MPI job, if there are several of them. The
/// number of workers in the parameters is then ignored.
#[cfg(feature = "mpi")]
fn expand_on_mpi_processes(
    params: &GridExpansionParams,
    system: &WedgeSystem,
) -> Option<Result<(), anyhow::Error>> {
    crate::parallel::MpiCommunicator::world()
        .filter(|comm| comm.size() > 1)
        .map(|comm| expand_grid(params, system, &comm))
}

#[cfg(not(feature = "mpi"))]
fn expand_on_mpi_processes(
    _: &GridExpansionParams,
    _: &WedgeSystem,
) -> Option<Result<(), anyhow::Error>> {
    None
}

fn default_nspin() -> usize {
    1
}

/// A structure locating a wedge Hamiltonian stored as raw complex doubles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HamiltonianSource {
    /// The path to the raw binary file.
    pub path: PathBuf,

    /// The byte order of the stored values.
    #[serde(default)]
    pub byte_order: NumericByteOrder,

    /// The order in which the $`n_{\mathrm{awf}} \times n_{\mathrm{awf}} \times n_k \times
    /// n_{\mathrm{spin}}`$ tensor is packed.
    #[serde(default)]
    pub matrix_order: MatrixOrder,

    /// The number of spin channels.
    #[serde(default = "default_nspin")]
    pub nspin: usize,
}

/// A structure specifying a wedge system in YAML, with the wedge Hamiltonian in a separate raw
/// binary file.
///
/// See [`WedgeSystem`] for the meaning and units of the fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WedgeSystemSpec {
    /// The lattice parameter.
    pub alat: f64,

    /// The real-space lattice vectors, as rows.
    pub a_vectors: [[f64; 3]; 3],

    /// The reciprocal lattice vectors, as rows.
    pub b_vectors: [[f64; 3]; 3],

    /// The Cartesian atomic positions.
    pub positions: Vec<[f64; 3]>,

    /// The species label of each atom.
    pub atoms: Vec<String>,

    /// The species.
    pub species: Vec<Species>,

    /// The symmetry matrices in the crystal basis.
    pub symmetry_rotations: Vec<[[f64; 3]; 3]>,

    /// The time-reversal flag of each symmetry operation. If absent, no operation is
    /// time-reversed.
    #[serde(default)]
    pub time_reversal: Vec<bool>,

    /// The equivalent-atom map of each symmetry operation.
    pub equivalent_atoms: Vec<Vec<usize>>,

    /// The Cartesian wedge k-points.
    pub kpoints: Vec<[f64; 3]>,

    /// The dimensions of the full grid.
    pub grid: [usize; 3],

    /// Boolean indicating if the calculation includes spin-orbit coupling.
    #[serde(default)]
    pub spin_orbit: bool,

    /// Boolean indicating if the calculation is magnetic.
    #[serde(default)]
    pub magnetic: bool,

    /// The wedge Hamiltonian.
    pub hamiltonian: HamiltonianSource,
}

impl WedgeSystemSpec {
    /// Reads the wedge Hamiltonian and assembles the wedge system.
    ///
    /// # Errors
    ///
    /// Errors if the basis is invalid or if the Hamiltonian file cannot be read or holds the
    /// wrong number of values.
    pub fn to_wedge_system(&self) -> Result<WedgeSystem, anyhow::Error> {
        let nawf = OrbitalBasis::new(&self.atoms, &self.species, self.spin_orbit)?.dim();
        let nk = self.kpoints.len();
        let nspin = self.hamiltonian.nspin;
        let values = read_complex_values(&self.hamiltonian.path, self.hamiltonian.byte_order)
            .with_context(|| {
                format!(
                    "Unable to read the wedge Hamiltonian from {}.",
                    self.hamiltonian.path.display()
                )
            })?;
        ensure!(
            values.len() == nawf * nawf * nk * nspin,
            "{} holds {} values, but {nawf} × {nawf} × {nk} × {nspin} are expected.",
            self.hamiltonian.path.display(),
            values.len()
        );
        let shape = (nawf, nawf, nk, nspin);
        let hamiltonian = match self.hamiltonian.matrix_order {
            MatrixOrder::RowMajor => Array4::from_shape_vec(shape, values),
            MatrixOrder::ColMajor => Array4::from_shape_vec(shape.f(), values),
        }
        .map_err(|err| format_err!(err))?;
        let time_reversal = if self.time_reversal.is_empty() {
            vec![false; self.symmetry_rotations.len()]
        } else {
            self.time_reversal.clone()
        };
        Ok(WedgeSystem {
            alat: self.alat,
            a_vectors: self.a_vectors,
            b_vectors: self.b_vectors,
            positions: self.positions.clone(),
            atoms: self.atoms.clone(),
            species: self.species.clone(),
            symmetry_rotations: self.symmetry_rotations.clone(),
            time_reversal,
            equivalent_atoms: self.equivalent_atoms.clone(),
            kpoints: self.kpoints.clone(),
            grid: self.grid,
            spin_orbit: self.spin_orbit,
            magnetic: self.magnetic,
            hamiltonian,
        })
    }
}

/// An enumerated type representing possible sources of the wedge system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SystemSource {
    /// Variant indicating that the wedge system is specified in the input file.
    Specification(Box<WedgeSystemSpec>),

    /// Variant indicating that the wedge system will be read in from an HkSym
    /// [`HkSymFileType::Sys`] binary file. The associated string gives the name of the file
    /// without its `.hksym.sys` extension.
    FromFile(String),
}

impl SystemSource {
    /// Obtains the wedge system from this source.
    ///
    /// # Errors
    ///
    /// Errors if the system cannot be read.
    pub fn load(&self) -> Result<WedgeSystem, anyhow::Error> {
        match self {
            SystemSource::Specification(spec) => spec.to_wedge_system(),
            SystemSource::FromFile(name) => {
                read_hksym_binary::<WedgeSystem, _>(name, HkSymFileType::Sys).with_context(|| {
                    format!(
                        "Unable to read the wedge system from {name}.{}.",
                        HkSymFileType::Sys.ext()
                    )
                })
            }
        }
    }
}

/// A structure containing HkSym input parameters which can be serialised into and deserialised
/// from a YAML input file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Input {
    /// Specification of the wedge system.
    pub system: SystemSource,

    /// Parameters for the grid expansion.
    ///
    /// # Default
    ///
    /// If not specified, the default parameters are used.
    #[serde(default)]
    pub expansion: GridExpansionParams,
}

impl InputHandle for Input {
    fn handle(&self) -> Result<(), anyhow::Error> {
        log_subtitle("Input system");
        hksym_output!("");
        let system = self.system.load()?;
        hksym_output!(
            "{} atom(s), {} symmetry operation(s), {} wedge k-point(s).",
            system.atoms.len(),
            system.symmetry_rotations.len(),
            system.kpoints.len()
        );
        hksym_output!("");

        let params = &self.expansion;
        let outcome = if let Some(outcome) = expand_on_mpi_processes(params, &system) {
            outcome
        } else if params.workers <= 1 {
            expand_grid(params, &system, &SerialCommunicator)
        } else {
            ThreadCommunicator::run(params.workers, |comm| expand_grid(params, &system, comm))?
                .into_iter()
                .collect()
        };
        outcome.map_err(|err| {
            hksym_error!("Grid expansion has failed with error:");
            hksym_error!("  {err:#}");
            err
        })
    }
}
