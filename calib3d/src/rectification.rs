//! Rectification engine: per-view remap tables for a calibrated stereo pair.

use crate::distortion::{fisheye_init_undistort_rectify_map, init_undistort_rectify_map};
use crate::stereo::{stereo_rectify, StereoRectifyFlags, StereoRectifyMatrices};
use crate::Result;
use cv_core::{
    calib_debug, calib_trace, CalibConfig, CameraCalibration, Distortion, ImageSize,
    StereoCameraCalibration,
};
use nalgebra::{Matrix3, Matrix3x4, Matrix4};

/// Per-pixel source coordinates for one view, row-major at `image_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapPair {
    pub remap_x: Vec<f32>,
    pub remap_y: Vec<f32>,
    pub image_size: ImageSize,
}

impl RemapPair {
    /// Source coordinate sampled by output pixel `(x, y)`.
    pub fn at(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        if x >= self.image_size.width || y >= self.image_size.height {
            return None;
        }
        let i = y as usize * self.image_size.width as usize + x as usize;
        Some((self.remap_x[i], self.remap_y[i]))
    }
}

/// Remap tables for `camera`.
///
/// `rectification` defaults to identity and `new_intrinsics` to the
/// camera's own intrinsics. The tables cover the calibrated resolution.
pub fn compute_undistort_map(
    camera: &CameraCalibration,
    rectification: Option<&Matrix3<f64>>,
    new_intrinsics: Option<&Matrix3<f64>>,
) -> Result<RemapPair> {
    let identity = Matrix3::identity();
    let rectification = rectification.unwrap_or(&identity);
    let new_intrinsics = new_intrinsics.unwrap_or(&camera.intrinsics);
    let size = camera.image_size_pixels;

    let (remap_x, remap_y) = match &camera.distortion {
        Distortion::RadTan5(d) => {
            init_undistort_rectify_map(size, &camera.intrinsics, d, rectification, new_intrinsics)?
        }
        Distortion::FisheyeKb4(d) => fisheye_init_undistort_rectify_map(
            size,
            &camera.intrinsics,
            d,
            rectification,
            new_intrinsics,
        )?,
    };

    Ok(RemapPair {
        remap_x,
        remap_y,
        image_size: size,
    })
}

/// Rectifying transform and remap tables for one side of the pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RectifiedView {
    pub rotation: Matrix3<f64>,
    pub projection: Matrix3x4<f64>,
    pub rectify: RemapPair,
}

/// Rectification results for a stereo pair. Recompute from scratch if the
/// source calibration changes.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoRectificationMaps {
    pub view: [RectifiedView; 2],
    pub disparity_to_depth: Matrix4<f64>,
}

impl StereoRectificationMaps {
    /// Build rectification tables for `data`.
    ///
    /// # Panics
    ///
    /// If the two views differ in resolution or distortion model. A validated
    /// record never does.
    pub fn new(data: &StereoCameraCalibration, config: &CalibConfig) -> Result<Self> {
        let [left, right] = &data.view;
        assert!(
            left.image_size_pixels == right.image_size_pixels,
            "stereo views must share a resolution"
        );
        assert!(
            left.distortion_model() == right.distortion_model(),
            "stereo views must share a distortion model"
        );

        let size = left.image_size_pixels;
        calib_debug!(
            config,
            "Computing rectification maps: {}x{} '{}'",
            size.width,
            size.height,
            left.distortion_model()
        );

        let StereoRectifyMatrices { r1, r2, p1, p2, q } = match left.distortion {
            // Fisheye pairs are rectified as if undistorted; the per-view maps
            // still apply the real fisheye model.
            Distortion::FisheyeKb4(_) => stereo_rectify(
                &left.intrinsics,
                None,
                &right.intrinsics,
                None,
                size,
                &data.camera_rotation,
                &data.camera_translation,
                StereoRectifyFlags::ZERO_DISPARITY,
                -1.0,
            )?,
            Distortion::RadTan5(_) => stereo_rectify(
                &left.intrinsics,
                Some(&left.distortion),
                &right.intrinsics,
                Some(&right.distortion),
                size,
                &data.camera_rotation,
                &data.camera_translation,
                StereoRectifyFlags::ZERO_DISPARITY,
                1.0,
            )?,
        };
        calib_trace!(config, "P1 = {}", p1);
        calib_trace!(config, "P2 = {}", p2);
        calib_trace!(config, "Q = {}", q);

        let build = |camera: &CameraCalibration, rotation: Matrix3<f64>, projection: Matrix3x4<f64>| {
            let new_intrinsics: Matrix3<f64> = projection.fixed_view::<3, 3>(0, 0).into_owned();
            compute_undistort_map(camera, Some(&rotation), Some(&new_intrinsics)).map(|rectify| {
                RectifiedView {
                    rotation,
                    projection,
                    rectify,
                }
            })
        };

        Ok(Self {
            view: [build(left, r1, p1)?, build(right, r2, p2)?],
            disparity_to_depth: q,
        })
    }
}
