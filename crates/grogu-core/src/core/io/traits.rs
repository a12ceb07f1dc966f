use super::magnopy::ExchangeFile;
use crate::core::hamiltonian::Hamiltonian;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A file format a [`Hamiltonian`] can be loaded from.
pub trait HamiltonianSource {
    type Error: Error + From<io::Error>;

    /// Reads a Hamiltonian description from `reader`.
    ///
    /// Files referenced by the description are resolved against `base_dir`.
    fn read_from(reader: &mut impl BufRead, base_dir: &Path) -> Result<Hamiltonian, Self::Error>;

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Hamiltonian, Self::Error> {
        let path = path.as_ref();
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader, base_dir)
    }
}

/// A text format for exchange parameters.
pub trait ExchangeFormat {
    /// Formatting knobs for writing.
    type Options: Default;

    type Error: Error + From<io::Error>;

    fn read_from(reader: &mut impl BufRead) -> Result<ExchangeFile, Self::Error>;

    fn write_to(
        file: &ExchangeFile,
        options: &Self::Options,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<ExchangeFile, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    fn write_to_path<P: AsRef<Path>>(
        file: &ExchangeFile,
        options: &Self::Options,
        path: P,
    ) -> Result<(), Self::Error> {
        let out = File::create(path)?;
        let mut writer = BufWriter::new(out);
        Self::write_to(file, options, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
