//! Reading and writing HkSym files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{self, format_err};
use bincode;
use serde::{de::DeserializeOwned, Serialize};
use serde_yaml;

pub(crate) mod format;
pub mod numeric;

/// An enumerated type for HkSym file types.
pub enum HkSymFileType {
    /// Variant for binary files containing a wedge system (structure, symmetry and wedge
    /// Hamiltonian).
    Sys,

    /// Variant for binary files containing an expanded full-grid Hamiltonian.
    Ham,
}

impl HkSymFileType {
    /// Returns the extension of the file type.
    pub fn ext(&self) -> String {
        match self {
            HkSymFileType::Sys => "hksym.sys".to_string(),
            HkSymFileType::Ham => "hksym.ham".to_string(),
        }
    }
}

/// Reads an HkSym binary file and deserialises it into an appropriate structure.
///
/// # Arguments
///
/// * `name` - The name of the file to be read in (without HkSym-specific extensions).
/// * `file_type` - The type of the HkSym file to be read in.
///
/// # Returns
///
/// A `Result` containing the structure deserialised from the read-in file.
pub fn read_hksym_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: HkSymFileType,
) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let mut path = name.as_ref().to_path_buf();
    path.set_extension(file_type.ext());
    let mut reader = BufReader::new(File::open(path).map_err(|err| format_err!(err))?);
    bincode::deserialize_from(&mut reader).map_err(|err| format_err!(err))
}

/// Serialises a structure and writes into an HkSym binary file.
///
/// # Arguments
///
/// * `name` - The name of the file to be written (without HkSym-specific extensions).
/// * `file_type` - The type of the HkSym file to be written.
///
/// # Returns
///
/// A `Result` indicating if the serialisation and writing processes have been successful.
pub fn write_hksym_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: HkSymFileType,
    value: &T,
) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let mut path = name.as_ref().to_path_buf();
    path.set_extension(file_type.ext());
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, value).map_err(|err| format_err!(err))
}

/// Reads an HkSym configuration YAML file and deserialises it into an appropriate structure.
///
/// # Arguments
///
/// * `name` - The name of the file to be read in (with its `.yml` or `.yaml` extension).
///
/// # Returns
///
/// A `Result` containing the structure deserialised from the read-in file.
pub fn read_hksym_yaml<T, P: AsRef<Path>>(name: P) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let mut reader = BufReader::new(File::open(name).map_err(|err| format_err!(err))?);
    serde_yaml::from_reader(&mut reader).map_err(|err| format_err!(err))
}

/// Serialises a structure and writes into an HkSym configuration YAML file.
///
/// # Arguments
///
/// * `name` - The name of the YAML file to be written (without extensions). The resulting file
/// will have the `.yml` extension.
pub fn write_hksym_yaml<T, P: AsRef<Path>>(name: P, value: &T) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let mut path = name.as_ref().to_path_buf();
    path.set_extension("yml");
    let mut writer = BufWriter::new(File::create(path)?);
    serde_yaml::to_writer(&mut writer, value).map_err(|err| format_err!(err))
}
