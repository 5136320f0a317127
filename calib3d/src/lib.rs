//! Stereo rectification for calibrated camera pairs.
//!
//! - [`distortion`]: per-model undistort/rectify remap tables
//! - [`stereo`]: rectifying rotations and projections (Bouguet)
//! - [`rectification`]: the per-pair engine tying both together
//! - [`essential_fundamental`]: epipolar matrices from extrinsics

pub type CalibError = cv_core::Error;
pub type Result<T> = cv_core::Result<T>;

pub mod distortion;
pub use distortion::{
    fisheye_init_undistort_rectify_map, init_undistort_rectify_map, OUT_OF_FRAME_SENTINEL,
};

pub mod stereo;
pub use stereo::{stereo_rectify, StereoRectifyFlags, StereoRectifyMatrices};

pub mod essential_fundamental;
pub use essential_fundamental::{
    essential_from_extrinsics, fundamental_from_essential, update_epipolar_matrices,
};

pub mod rectification;
pub use rectification::{
    compute_undistort_map, RectifiedView, RemapPair, StereoRectificationMaps,
};
