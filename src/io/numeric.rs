//! Numeric reader and writer for raw binary files.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

use anyhow;
use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "numeric_tests.rs"]
mod numeric_tests;

/// An enumerated type specifying the byte order of numerical values in raw binary files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericByteOrder {
    /// Variant for little-endian byte order.
    #[default]
    LittleEndian,

    /// Variant for big-endian byte order.
    BigEndian,
}

/// An enumerated type specifying the order in which matrix elements are packed in raw binary
/// files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixOrder {
    /// Variant for row-major order (last index fastest).
    #[default]
    RowMajor,

    /// Variant for column-major order (first index fastest).
    ColMajor,
}

/// Iterable structure for reading numeric binary files.
pub struct NumericReader<R: BufRead, B: ByteOrder, T> {
    /// The inner file reader.
    inner: R,

    /// The byte order of the numeric values to be read.
    byte_order: PhantomData<B>,

    /// The type of the numeric values to be read.
    numeric_type: PhantomData<T>,
}

impl<R: BufRead, B: ByteOrder, T> NumericReader<R, B, T> {
    /// Constructs a new numeric binary reader wrapping around a standard reader.
    ///
    /// # Arguments
    ///
    /// * `inner` - The underlying reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            byte_order: PhantomData,
            numeric_type: PhantomData,
        }
    }
}

impl<B: ByteOrder, T> NumericReader<BufReader<File>, B, T> {
    /// Constructs a new numeric binary reader wrapping around a buffered file reader from a
    /// filename.
    ///
    /// # Arguments
    ///
    /// * `filename` - The path to the file to be read.
    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Self, anyhow::Error> {
        let f = File::open(&filename)?;
        Ok(Self::new(BufReader::new(f)))
    }
}

macro_rules! impl_iterator_numeric_reader {
    ($($t:ty),+) => {$(
        impl<R: BufRead> Iterator for NumericReader<R, LittleEndian, $t> {
            type Item = $t;

            fn next(&mut self) -> Option<Self::Item> {
                let mut buff: [u8; std::mem::size_of::<$t>()] = [0_u8; std::mem::size_of::<$t>()];
                self.inner.read_exact(&mut buff).ok()?;
                Some(<$t>::from_le_bytes(buff))
            }
        }

        impl<R: BufRead> Iterator for NumericReader<R, BigEndian, $t> {
            type Item = $t;

            fn next(&mut self) -> Option<Self::Item> {
                let mut buff: [u8; std::mem::size_of::<$t>()] = [0_u8; std::mem::size_of::<$t>()];
                self.inner.read_exact(&mut buff).ok()?;
                Some(<$t>::from_be_bytes(buff))
            }
        }

        impl<R: BufRead> Iterator for NumericReader<R, LittleEndian, Complex<$t>> {
            type Item = Complex<$t>;

            fn next(&mut self) -> Option<Self::Item> {
                let mut buff: [u8; std::mem::size_of::<$t>()] = [0_u8; std::mem::size_of::<$t>()];
                self.inner.read_exact(&mut buff).ok()?;
                let re = <$t>::from_le_bytes(buff);
                self.inner.read_exact(&mut buff).ok()?;
                let im = <$t>::from_le_bytes(buff);
                Some(Complex::<$t> { re, im })
            }
        }

        impl<R: BufRead> Iterator for NumericReader<R, BigEndian, Complex<$t>> {
            type Item = Complex<$t>;

            fn next(&mut self) -> Option<Self::Item> {
                let mut buff: [u8; std::mem::size_of::<$t>()] = [0_u8; std::mem::size_of::<$t>()];
                self.inner.read_exact(&mut buff).ok()?;
                let re = <$t>::from_be_bytes(buff);
                self.inner.read_exact(&mut buff).ok()?;
                let im = <$t>::from_be_bytes(buff);
                Some(Complex::<$t> { re, im })
            }
        }
    )+}
}

impl_iterator_numeric_reader!(f32, f64);

/// Reads all complex double-precision values from a raw binary file.
///
/// # Arguments
///
/// * `path` - The path to the binary file.
/// * `byte_order` - The byte order of the stored values.
///
/// # Returns
///
/// The values in file order, each complex number stored as a real part followed by an imaginary
/// part.
pub fn read_complex_values<P: AsRef<Path>>(
    path: P,
    byte_order: NumericByteOrder,
) -> Result<Vec<Complex<f64>>, anyhow::Error> {
    let values = match byte_order {
        NumericByteOrder::LittleEndian => {
            NumericReader::<_, LittleEndian, Complex<f64>>::from_file(path)?.collect::<Vec<_>>()
        }
        NumericByteOrder::BigEndian => {
            NumericReader::<_, BigEndian, Complex<f64>>::from_file(path)?.collect::<Vec<_>>()
        }
    };
    Ok(values)
}

/// Writes complex double-precision values into a raw binary file, each as a real part followed by
/// an imaginary part.
///
/// # Arguments
///
/// * `path` - The path to the binary file to be created.
/// * `values` - The values to be written, in file order.
/// * `byte_order` - The byte order to use.
pub fn write_complex_values<'a, P, I>(
    path: P,
    values: I,
    byte_order: NumericByteOrder,
) -> Result<(), anyhow::Error>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a Complex<f64>>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    for value in values {
        match byte_order {
            NumericByteOrder::LittleEndian => {
                writer.write_f64::<LittleEndian>(value.re)?;
                writer.write_f64::<LittleEndian>(value.im)?;
            }
            NumericByteOrder::BigEndian => {
                writer.write_f64::<BigEndian>(value.re)?;
                writer.write_f64::<BigEndian>(value.im)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
