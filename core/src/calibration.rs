//! Calibration records for a single camera and a stereo pair, plus
//! borrowed views that expose them as typed matrices.

use nalgebra::{DVector, Matrix3, Vector3};

use crate::geometry::{intrinsics_matrix, Distortion, DistortionModel, ImageSize};
use crate::{Error, Result};

/// Intrinsic description of one physical camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCalibration {
    /// Pinhole projection matrix, `[2][2] == 1`.
    pub intrinsics: Matrix3<f64>,
    pub distortion: Distortion,
    /// Resolution the intrinsics were computed for.
    pub image_size_pixels: ImageSize,
}

impl CameraCalibration {
    /// Zeroed record for `model`; only `intrinsics[2][2]` is set.
    pub fn new(model: DistortionModel) -> Self {
        let mut intrinsics = Matrix3::zeros();
        intrinsics[(2, 2)] = 1.0;
        Self {
            intrinsics,
            distortion: Distortion::zeros(model),
            image_size_pixels: ImageSize::default(),
        }
    }

    pub fn from_parts(
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        distortion: Distortion,
        image_size_pixels: ImageSize,
    ) -> Self {
        Self {
            intrinsics: intrinsics_matrix(fx, fy, cx, cy),
            distortion,
            image_size_pixels,
        }
    }

    pub fn distortion_model(&self) -> DistortionModel {
        self.distortion.model()
    }

    pub fn fx(&self) -> f64 {
        self.intrinsics[(0, 0)]
    }

    pub fn fy(&self) -> f64 {
        self.intrinsics[(1, 1)]
    }

    pub fn cx(&self) -> f64 {
        self.intrinsics[(0, 2)]
    }

    pub fn cy(&self) -> f64 {
        self.intrinsics[(1, 2)]
    }

    fn validate(&self, label: &str) -> Result<()> {
        let k = &self.intrinsics;
        if k.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidCalibration(format!(
                "{label}: intrinsics contain non-finite values"
            )));
        }
        if k[(2, 2)] != 1.0 {
            return Err(Error::InvalidCalibration(format!(
                "{label}: intrinsics[2][2] is {} instead of 1",
                k[(2, 2)]
            )));
        }
        let off_diagonal = [k[(0, 1)], k[(1, 0)], k[(2, 0)], k[(2, 1)]];
        if off_diagonal.iter().any(|&v| v != 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "{label}: intrinsics have non-zero skew or bottom-row terms"
            )));
        }
        if self.distortion.coefficients().iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidCalibration(format!(
                "{label}: distortion contains non-finite values"
            )));
        }
        if self.image_size_pixels.is_empty() {
            return Err(Error::InvalidCalibration(format!(
                "{label}: image size {}x{} is empty",
                self.image_size_pixels.width, self.image_size_pixels.height
            )));
        }
        Ok(())
    }
}

/// A calibrated stereo pair. `view[1]` is expressed relative to `view[0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoCameraCalibration {
    pub view: [CameraCalibration; 2],
    pub camera_rotation: Matrix3<f64>,
    pub camera_translation: Vector3<f64>,
    pub camera_essential: Matrix3<f64>,
    pub camera_fundamental: Matrix3<f64>,
}

impl StereoCameraCalibration {
    /// Zeroed pair whose views share `model`.
    pub fn new(model: DistortionModel) -> Self {
        Self {
            view: [CameraCalibration::new(model), CameraCalibration::new(model)],
            camera_rotation: Matrix3::zeros(),
            camera_translation: Vector3::zeros(),
            camera_essential: Matrix3::zeros(),
            camera_fundamental: Matrix3::zeros(),
        }
    }

    /// Model shared by both views, if they agree.
    pub fn shared_model(&self) -> Option<DistortionModel> {
        let model = self.view[0].distortion_model();
        (model == self.view[1].distortion_model()).then_some(model)
    }

    pub fn wrap(&self) -> StereoCameraCalibrationWrapper<'_> {
        StereoCameraCalibrationWrapper::new(self)
    }

    /// Storage-validity check. Must pass before a record leaves a codec and
    /// again after any in-place mutation.
    pub fn validate(&self) -> Result<()> {
        let [v0, v1] = &self.view;
        if v0.distortion_model() != v1.distortion_model() {
            return Err(Error::InvalidCalibration(format!(
                "views have different distortion models: '{}' vs '{}'",
                v0.distortion_model(),
                v1.distortion_model()
            )));
        }
        if v0.image_size_pixels != v1.image_size_pixels {
            return Err(Error::InvalidCalibration(format!(
                "views have different resolutions: {}x{} vs {}x{}",
                v0.image_size_pixels.width,
                v0.image_size_pixels.height,
                v1.image_size_pixels.width,
                v1.image_size_pixels.height
            )));
        }
        v0.validate("view[0]")?;
        v1.validate("view[1]")?;

        let mut extrinsics = self
            .camera_rotation
            .iter()
            .chain(self.camera_translation.iter())
            .chain(self.camera_essential.iter())
            .chain(self.camera_fundamental.iter());
        if extrinsics.any(|v| !v.is_finite()) {
            return Err(Error::InvalidCalibration(
                "stereo matrices contain non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_data_storage_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Borrowed matrix view of a [`CameraCalibration`].
#[derive(Debug, Clone, Copy)]
pub struct CameraCalibrationWrapper<'a> {
    base: &'a CameraCalibration,
}

impl<'a> CameraCalibrationWrapper<'a> {
    pub fn new(base: &'a CameraCalibration) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &'a CameraCalibration {
        self.base
    }

    pub fn intrinsics_mat(&self) -> &'a Matrix3<f64> {
        &self.base.intrinsics
    }

    /// Active coefficients as an `n x 1` column (5 for radtan, 4 for fisheye).
    pub fn distortion_mat(&self) -> DVector<f64> {
        DVector::from_vec(self.base.distortion.coefficients())
    }

    pub fn distortion_model(&self) -> DistortionModel {
        self.base.distortion_model()
    }

    pub fn image_size(&self) -> ImageSize {
        self.base.image_size_pixels
    }
}

/// Borrowed matrix view of a [`StereoCameraCalibration`].
#[derive(Debug, Clone, Copy)]
pub struct StereoCameraCalibrationWrapper<'a> {
    base: &'a StereoCameraCalibration,
    pub view: [CameraCalibrationWrapper<'a>; 2],
}

impl<'a> StereoCameraCalibrationWrapper<'a> {
    pub fn new(base: &'a StereoCameraCalibration) -> Self {
        Self {
            base,
            view: [
                CameraCalibrationWrapper::new(&base.view[0]),
                CameraCalibrationWrapper::new(&base.view[1]),
            ],
        }
    }

    pub fn base(&self) -> &'a StereoCameraCalibration {
        self.base
    }

    pub fn camera_rotation_mat(&self) -> &'a Matrix3<f64> {
        &self.base.camera_rotation
    }

    pub fn camera_translation_mat(&self) -> &'a Vector3<f64> {
        &self.base.camera_translation
    }

    pub fn camera_essential_mat(&self) -> &'a Matrix3<f64> {
        &self.base.camera_essential
    }

    pub fn camera_fundamental_mat(&self) -> &'a Matrix3<f64> {
        &self.base.camera_fundamental
    }

    pub fn is_data_storage_valid(&self) -> bool {
        self.base.is_data_storage_valid()
    }
}
