//! Stereo calibration file I/O.
//!
//! Two on-disk formats are supported:
//! - JSON v2 (`*.json`), the current format
//! - binary v1 (anything else), kept for older calibration files
//!
//! [`load`] and [`save`] pick the codec from the file name.

pub mod calib_v1;
pub mod calib_v2;
pub mod matrix;

pub use calib_v1::{read_stereo_calibration_v1, write_stereo_calibration_v1};
pub use calib_v2::{stereo_calibration_from_json_v2, stereo_calibration_to_json_v2, SCHEMA_URL};
pub use matrix::{read_matrix, write_matrix, BinaryMatrix, ElementType, MAX_MATRIX_DIM};

pub use cv_core::{Error, Result};

use cv_core::{calib_error, calib_info, calib_warn, CalibConfig, StereoCameraCalibration};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const JSON_EXTENSION: &str = ".json";

/// On-disk calibration format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationFormat {
    BinaryV1,
    JsonV2,
}

impl CalibrationFormat {
    pub fn from_path(path: &Path) -> Self {
        if has_json_extension(path) {
            CalibrationFormat::JsonV2
        } else {
            CalibrationFormat::BinaryV1
        }
    }
}

/// True if the path ends in exactly `.json` and is longer than the
/// extension itself. The comparison is case sensitive, so `CALIB.JSON`
/// selects the binary codec.
pub fn has_json_extension(path: &Path) -> bool {
    let name = path.as_os_str().to_string_lossy();
    name.len() > JSON_EXTENSION.len() && name.ends_with(JSON_EXTENSION)
}

/// Load a calibration with the default [`CalibConfig`].
pub fn load(path: impl AsRef<Path>) -> Result<StereoCameraCalibration> {
    load_with(path, &CalibConfig::default())
}

pub fn load_with(path: impl AsRef<Path>, config: &CalibConfig) -> Result<StereoCameraCalibration> {
    let path = path.as_ref();
    match CalibrationFormat::from_path(path) {
        CalibrationFormat::JsonV2 => load_stereo_calibration_json_v2(path, config),
        CalibrationFormat::BinaryV1 => load_stereo_calibration_v1(path, config),
    }
}

/// Save a calibration with the default [`CalibConfig`].
pub fn save(path: impl AsRef<Path>, data: &StereoCameraCalibration) -> Result<()> {
    save_with(path, data, &CalibConfig::default())
}

pub fn save_with(
    path: impl AsRef<Path>,
    data: &StereoCameraCalibration,
    config: &CalibConfig,
) -> Result<()> {
    let path = path.as_ref();
    match CalibrationFormat::from_path(path) {
        CalibrationFormat::JsonV2 => save_stereo_calibration_json_v2(path, data, config),
        CalibrationFormat::BinaryV1 => save_stereo_calibration_v1(path, data, config),
    }
}

fn open_failed(path: &Path, e: std::io::Error, config: &CalibConfig) -> Error {
    calib_error!(config, "Unable to open calibration file: '{}'", path.display());
    Error::open_file(path, e)
}

/// Load a binary v1 file.
pub fn load_stereo_calibration_v1(
    path: &Path,
    config: &CalibConfig,
) -> Result<StereoCameraCalibration> {
    calib_warn!(
        config,
        "Deprecated function: loading binary v1 calibration '{}'",
        path.display()
    );
    let file = File::open(path).map_err(|e| open_failed(path, e, config))?;
    read_stereo_calibration_v1(&mut BufReader::new(file), config)
}

/// Save a binary v1 file. Nothing is created if `data` can't be encoded.
pub fn save_stereo_calibration_v1(
    path: &Path,
    data: &StereoCameraCalibration,
    config: &CalibConfig,
) -> Result<()> {
    calib_warn!(
        config,
        "Deprecated function: saving binary v1 calibration '{}'",
        path.display()
    );
    calib_v1::v1_model(data, config)?;

    let file = File::create(path).map_err(|e| open_failed(path, e, config))?;
    let mut writer = BufWriter::new(file);
    write_stereo_calibration_v1(&mut writer, data, config)?;
    writer.flush()?;
    Ok(())
}

/// Load a JSON v2 file.
pub fn load_stereo_calibration_json_v2(
    path: &Path,
    config: &CalibConfig,
) -> Result<StereoCameraCalibration> {
    let file = File::open(path).map_err(|e| open_failed(path, e, config))?;
    let json: Value = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        calib_error!(config, "Unable to parse calibration file: '{}'", path.display());
        Error::Parse(format!("{}: {e}", path.display()))
    })?;
    stereo_calibration_from_json_v2(&json, config)
}

/// Save a JSON v2 file. Nothing is created if `data` can't be encoded.
pub fn save_stereo_calibration_json_v2(
    path: &Path,
    data: &StereoCameraCalibration,
    config: &CalibConfig,
) -> Result<()> {
    let json = stereo_calibration_to_json_v2(data, config)?;
    let text = serde_json::to_string_pretty(&json).map_err(|e| Error::Parse(e.to_string()))?;

    calib_info!(config, "Saving calibration file: '{}'", path.display());
    let file = File::create(path).map_err(|e| open_failed(path, e, config))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(text.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_extension_rules() {
        assert!(has_json_extension(Path::new("calib.json")));
        assert!(has_json_extension(Path::new("/tmp/a/b.json")));
        assert!(has_json_extension(Path::new("x.json")));
        assert!(!has_json_extension(Path::new(".json")));
        assert!(!has_json_extension(Path::new("calib.JSON")));
        assert!(!has_json_extension(Path::new("calib.json.bak")));
        assert!(!has_json_extension(Path::new("calib.bin")));
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            CalibrationFormat::from_path(Path::new("a.json")),
            CalibrationFormat::JsonV2
        );
        assert_eq!(
            CalibrationFormat::from_path(Path::new("a.Json")),
            CalibrationFormat::BinaryV1
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load("/nonexistent/dir/calib.json").unwrap_err();
        match err {
            Error::OpenFile { path, .. } => assert!(path.ends_with("calib.json")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
