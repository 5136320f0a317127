pub use cv_calib3d as calib3d;
pub use cv_core as core;
pub use cv_io as io;

pub use cv_calib3d::{compute_undistort_map, RemapPair, StereoRectificationMaps};
pub use cv_core::{CalibConfig, CameraCalibration, Error, Result, StereoCameraCalibration};
pub use cv_io::{load, load_with, save, save_with};

/// Initialize the global Rayon pool used for remap table generation.
///
/// Call once at startup, before building any [`StereoRectificationMaps`].
/// Repeated calls return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `RUSTCV_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<usize> {
    cv_core::init_global_thread_pool(num_threads)
}
