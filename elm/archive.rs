//! Named-matrix archive on disk.
//!
//! The archive is a TOML document mapping names (e.g. `data/acc_signal`) to
//! 2-D arrays in ndarray's serde layout. Measurement files store one column
//! per sample, so `load_raw` transposes them into samples-as-rows form.

use crate::data::RawData;
use crate::error::ElmError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const DEFAULT_SIGNAL_KEY: &str = "data/acc_signal";
pub const DEFAULT_THICKNESS_KEY: &str = "data/thickness";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixArchive {
    pub arrays: BTreeMap<String, Array2<f64>>,
}

impl MatrixArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, array: Array2<f64>) {
        self.arrays.insert(key.into(), array);
    }

    pub fn get(&self, key: &str) -> Result<&Array2<f64>, ElmError> {
        self.arrays
            .get(key)
            .ok_or_else(|| ElmError::MissingArray(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.arrays.contains_key(key)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ElmError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ElmError> {
        let toml_string = fs::read_to_string(path)?;
        let archive = toml::from_str(&toml_string)?;
        Ok(archive)
    }
}

/// Reads the signal and thickness arrays and transposes both to samples-as-rows.
pub fn load_raw(
    path: impl AsRef<Path>,
    signal_key: &str,
    thickness_key: &str,
) -> Result<RawData, ElmError> {
    let archive = MatrixArchive::load(path)?;
    let signal = archive.get(signal_key)?.t().to_owned();
    let thickness = archive.get(thickness_key)?.t().to_owned();
    log::info!(
        "Loaded '{}' as {}x{} and '{}' as {}x{}",
        signal_key,
        signal.nrows(),
        signal.ncols(),
        thickness_key,
        thickness.nrows(),
        thickness.ncols()
    );
    Ok(RawData { signal, thickness })
}

/// Reads only the signal, for inference on unlabeled data. The thickness is
/// returned too when the archive carries it.
pub fn load_signal(
    path: impl AsRef<Path>,
    signal_key: &str,
    thickness_key: &str,
) -> Result<(Array2<f64>, Option<Array2<f64>>), ElmError> {
    let archive = MatrixArchive::load(path)?;
    let signal = archive.get(signal_key)?.t().to_owned();
    let thickness = if archive.contains(thickness_key) {
        Some(archive.get(thickness_key)?.t().to_owned())
    } else {
        None
    };
    Ok((signal, thickness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::NamedTempFile;

    #[test]
    fn load_raw_transposes_feature_major_arrays() {
        let mut archive = MatrixArchive::new();
        // 2 features x 3 samples
        archive.insert(DEFAULT_SIGNAL_KEY, array![[1.0, 3.0, 5.0], [2.0, 4.0, 6.0]]);
        archive.insert(DEFAULT_THICKNESS_KEY, array![[0.1, 0.2, 0.3]]);

        let file = NamedTempFile::new().unwrap();
        archive.save(file.path()).unwrap();

        let raw = load_raw(file.path(), DEFAULT_SIGNAL_KEY, DEFAULT_THICKNESS_KEY).unwrap();
        assert_eq!(raw.signal, array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        assert_eq!(raw.thickness, array![[0.1], [0.2], [0.3]]);
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let mut archive = MatrixArchive::new();
        archive.insert("data/other", array![[1.0]]);
        let file = NamedTempFile::new().unwrap();
        archive.save(file.path()).unwrap();

        match load_raw(file.path(), DEFAULT_SIGNAL_KEY, DEFAULT_THICKNESS_KEY) {
            Err(ElmError::MissingArray(key)) => assert_eq!(key, DEFAULT_SIGNAL_KEY),
            other => panic!("Expected MissingArray, got {:?}", other),
        }
    }

    #[test]
    fn load_signal_tolerates_missing_thickness() {
        let mut archive = MatrixArchive::new();
        archive.insert(DEFAULT_SIGNAL_KEY, array![[1.0, 2.0]]);
        let file = NamedTempFile::new().unwrap();
        archive.save(file.path()).unwrap();

        let (signal, thickness) =
            load_signal(file.path(), DEFAULT_SIGNAL_KEY, DEFAULT_THICKNESS_KEY).unwrap();
        assert_eq!(signal, array![[1.0], [2.0]]);
        assert!(thickness.is_none());
    }
}
