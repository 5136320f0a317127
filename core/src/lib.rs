//! Core types for stereo camera calibration.
//!
//! This crate holds the pieces every other member of the workspace shares:
//! - the calibration data model (per-camera and stereo-pair records),
//! - distortion models as a closed tagged union,
//! - the explicit logging/configuration handle passed into codecs and
//!   rectification entry points,
//! - the workspace-wide error type.

pub mod calibration;
pub mod config;
pub mod geometry;
pub mod runtime;

pub use calibration::*;
pub use config::*;
pub use geometry::*;
pub use runtime::{current_cpu_threads, init_global_thread_pool};

#[doc(hidden)]
pub use tracing as __tracing;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to open calibration file '{}': {source}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),
}

impl Error {
    pub fn open_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OpenFile {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
