use num_complex::Complex;

use crate::auxiliary::template_systems::{inversion_rotations, template_full_system, TemplateModel};
use crate::interfaces::InputHandle;
use crate::io::numeric::{write_complex_values, MatrixOrder, NumericByteOrder};
use crate::io::{read_hksym_yaml, write_hksym_binary, write_hksym_yaml, HkSymFileType};

use super::{Input, SystemSource};

type C128 = Complex<f64>;

fn scratch_name(stem: &str) -> String {
    std::env::temp_dir()
        .join(format!("hksym_input_{}_{stem}", std::process::id()))
        .to_string_lossy()
        .into_owned()
}

fn inline_input(path: &str, order: &str, kpoints: &str, nspin: usize) -> String {
    format!(
        "\
system: !Specification
  alat: 1.0
  a_vectors: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
  b_vectors: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
  positions: [[0.0, 0.0, 0.0]]
  atoms: [X]
  species:
    - label: X
      shells: [0]
  symmetry_rotations:
    - [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
    - [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]]
  equivalent_atoms: [[0], [0]]
  kpoints: {kpoints}
  grid: [2, 2, 2]
  hamiltonian:
    path: {path}
    byte_order: BigEndian
    matrix_order: {order}
    nspin: {nspin}
expansion:
  max_rounds: 3
  matching_tolerance: 1.0e-7
"
    )
}

#[test]
fn test_interfaces_input_fromfile() {
    let inp: Input = serde_yaml::from_str(
        "\
system: !FromFile wedge_system
expansion:
  symmetrise: false
  verify: true
  verification_reference: reference_grid
  result_save_name: full_grid
",
    )
    .unwrap();
    assert_eq!(inp.system, SystemSource::FromFile("wedge_system".to_string()));
    assert!(!inp.expansion.symmetrise);
    assert!(inp.expansion.verify);
    assert_eq!(
        inp.expansion.verification_reference.as_deref(),
        Some("reference_grid")
    );
    assert_eq!(inp.expansion.result_save_name.as_deref(), Some("full_grid"));
    assert_eq!(inp.expansion.max_rounds, 16);
    assert_eq!(inp.expansion.workers, 1);
}

#[test]
fn test_interfaces_input_default_expansion() {
    let inp: Input = serde_yaml::from_str("system: !FromFile wedge_system\n").unwrap();
    assert_eq!(inp.expansion.max_rounds, 16);
    assert!(inp.expansion.symmetrise);
    assert!(inp.expansion.enforce_time_reversal);
}

#[test]
fn test_interfaces_input_yaml_file_round_trip() {
    let mut input: Input = serde_yaml::from_str("system: !FromFile wedge\n").unwrap();
    input.expansion.max_rounds = 5;
    input.expansion.result_save_name = Some("grid".to_string());
    let name = scratch_name("round_trip");
    write_hksym_yaml(&name, &input).unwrap();
    let read: Input = read_hksym_yaml(format!("{name}.yml")).unwrap();
    assert_eq!(read.system, input.system);
    assert_eq!(read.expansion.max_rounds, 5);
    assert_eq!(read.expansion.result_save_name.as_deref(), Some("grid"));
}

#[test]
fn test_interfaces_input_specification_row_major() {
    let path = scratch_name("cubic_s_ham");
    let values = vec![C128::new(5.0, 0.0); 8];
    write_complex_values(&path, values.iter(), NumericByteOrder::BigEndian).unwrap();
    let kpoints = "[[0.0, 0.0, 0.0], [0.0, 0.0, -0.5], [0.0, -0.5, 0.0], [0.0, -0.5, -0.5], \
        [-0.5, 0.0, 0.0], [-0.5, 0.0, -0.5], [-0.5, -0.5, 0.0], [-0.5, -0.5, -0.5]]";
    let inp: Input =
        serde_yaml::from_str(&inline_input(&path, "RowMajor", kpoints, 1)).unwrap();
    assert_eq!(inp.expansion.max_rounds, 3);

    let system = inp.system.load().unwrap();
    assert_eq!(system.hamiltonian.dim(), (1, 1, 8, 1));
    assert_eq!(system.time_reversal, vec![false, false]);
    assert!(system.hamiltonian.iter().all(|&z| z == C128::new(5.0, 0.0)));

    assert!(inp.handle().is_ok());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_interfaces_input_specification_col_major() {
    let path = scratch_name("col_major_ham");
    let values = (0..4).map(|i| C128::new(f64::from(i), 0.0)).collect::<Vec<_>>();
    write_complex_values(&path, values.iter(), NumericByteOrder::BigEndian).unwrap();
    let kpoints = "[[0.0, 0.0, 0.0], [-0.5, -0.5, -0.5]]";

    let inp: Input = serde_yaml::from_str(&inline_input(&path, "ColMajor", kpoints, 2)).unwrap();
    let system = inp.system.load().unwrap();
    assert_eq!(system.hamiltonian.dim(), (1, 1, 2, 2));
    assert_eq!(system.hamiltonian[(0, 0, 1, 0)], C128::new(1.0, 0.0));
    assert_eq!(system.hamiltonian[(0, 0, 0, 1)], C128::new(2.0, 0.0));

    let inp: Input = serde_yaml::from_str(&inline_input(&path, "RowMajor", kpoints, 2)).unwrap();
    let system = inp.system.load().unwrap();
    assert_eq!(system.hamiltonian[(0, 0, 1, 0)], C128::new(2.0, 0.0));
    assert_eq!(system.hamiltonian[(0, 0, 0, 1)], C128::new(1.0, 0.0));

    // Three spin channels need more values than the file holds.
    let inp: Input = serde_yaml::from_str(&inline_input(&path, "RowMajor", kpoints, 3)).unwrap();
    assert!(inp.system.load().is_err());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_interfaces_input_system_binary() {
    let system = template_full_system(TemplateModel::CubicSp, [2, 2, 2], &inversion_rotations(), &[
        false, false,
    ])
    .unwrap();
    let name = scratch_name("cubic_sp_system");
    write_hksym_binary(&name, HkSymFileType::Sys, &system).unwrap();
    let loaded = SystemSource::FromFile(name).load().unwrap();
    assert_eq!(loaded, system);
    assert!(SystemSource::FromFile(scratch_name("missing")).load().is_err());
}

#[test]
fn test_interfaces_input_enum_spellings() {
    let order: MatrixOrder = serde_yaml::from_str("ColMajor").unwrap();
    assert_eq!(order, MatrixOrder::ColMajor);
    let byte_order: NumericByteOrder = serde_yaml::from_str("LittleEndian").unwrap();
    assert_eq!(byte_order, NumericByteOrder::LittleEndian);
}
