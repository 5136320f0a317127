//! Binary v1 calibration format.
//!
//! A v1 file is a fixed sequence of [`matrix`](crate::matrix) records. The
//! first fourteen are mandatory; the rest were appended by later writers and
//! fall back to zero when absent. Both radtan and fisheye distortion slots are
//! always present, and a trailing `use_fisheye` flag selects which one is
//! live.

use cv_core::{
    calib_error, calib_warn, CalibConfig, Distortion, DistortionModel, Error, ImageSize, Result,
    StereoCameraCalibration,
};
use std::io::{Read, Write};

use crate::matrix::{read_matrix, write_matrix, BinaryMatrix, ElementType};

/// Rectification products older writers stored after the distortion slots.
/// They are recomputed on demand and skipped when reading.
const SCRATCH_FIELDS: [&str; 7] = [
    "l_rotation",
    "r_rotation",
    "l_translation",
    "r_translation",
    "l_projection",
    "r_projection",
    "disparity_to_depth",
];

struct V1Fields {
    l_intrinsics: BinaryMatrix,
    r_intrinsics: BinaryMatrix,
    l_distortion: BinaryMatrix,
    r_distortion: BinaryMatrix,
    l_distortion_fisheye: BinaryMatrix,
    r_distortion_fisheye: BinaryMatrix,
    image_size: BinaryMatrix,
    new_image_size: BinaryMatrix,
    translation: BinaryMatrix,
    rotation: BinaryMatrix,
    essential: BinaryMatrix,
    fundamental: BinaryMatrix,
    use_fisheye: BinaryMatrix,
}

impl V1Fields {
    fn new() -> Self {
        let f64_mat = |rows, cols| BinaryMatrix::zeros(ElementType::F64, rows, cols);
        Self {
            l_intrinsics: f64_mat(3, 3),
            r_intrinsics: f64_mat(3, 3),
            l_distortion: f64_mat(5, 1),
            r_distortion: f64_mat(5, 1),
            l_distortion_fisheye: f64_mat(4, 1),
            r_distortion_fisheye: f64_mat(4, 1),
            image_size: BinaryMatrix::zeros(ElementType::F32, 1, 2),
            new_image_size: BinaryMatrix::zeros(ElementType::F32, 1, 2),
            translation: f64_mat(3, 1),
            rotation: f64_mat(3, 3),
            essential: f64_mat(3, 3),
            fundamental: f64_mat(3, 3),
            use_fisheye: BinaryMatrix::zeros(ElementType::F32, 1, 1),
        }
    }

    fn read_mandatory<R: Read>(&mut self, reader: &mut R, config: &CalibConfig) -> Result<()> {
        read_matrix(reader, &mut self.l_intrinsics, "l_intrinsics", config)?;
        read_matrix(reader, &mut self.r_intrinsics, "r_intrinsics", config)?;
        read_matrix(reader, &mut self.l_distortion, "l_distortion", config)?;
        read_matrix(reader, &mut self.r_distortion, "r_distortion", config)?;
        read_matrix(reader, &mut self.l_distortion_fisheye, "l_distortion_fisheye", config)?;
        read_matrix(reader, &mut self.r_distortion_fisheye, "r_distortion_fisheye", config)?;
        for name in SCRATCH_FIELDS {
            let mut scratch = BinaryMatrix::empty(ElementType::F64);
            read_matrix(reader, &mut scratch, name, config)?;
        }
        read_matrix(reader, &mut self.image_size, "mat_image_size", config)
    }

    fn read_optional<R: Read>(&mut self, reader: &mut R, config: &CalibConfig) {
        let optional = [
            (&mut self.new_image_size, "mat_new_image_size"),
            (&mut self.translation, "translation"),
            (&mut self.rotation, "rotation"),
            (&mut self.essential, "essential"),
            (&mut self.fundamental, "fundamental"),
        ];
        for (m, name) in optional {
            if read_matrix(reader, m, name, config).is_err() {
                calib_warn!(config, "Re-run calibration! ('{}' missing)", name);
            }
        }
        if read_matrix(reader, &mut self.use_fisheye, "use_fisheye", config).is_err() {
            calib_warn!(config, "Re-run calibration! (Assuming not fisheye)");
        }
    }

    fn into_calibration(self) -> Result<StereoCameraCalibration> {
        let fisheye = self.use_fisheye.data[(0, 0)] != 0.0;
        let (model, l_dist, r_dist) = if fisheye {
            (
                DistortionModel::FisheyeKb4,
                &self.l_distortion_fisheye,
                &self.r_distortion_fisheye,
            )
        } else {
            (DistortionModel::RadTan5, &self.l_distortion, &self.r_distortion)
        };

        let size = ImageSize::new(
            self.image_size.data[(0, 0)] as u32,
            self.image_size.data[(0, 1)] as u32,
        );

        let mut data = StereoCameraCalibration::new(model);
        for (view, (intrinsics, dist)) in data.view.iter_mut().zip([
            (&self.l_intrinsics, l_dist),
            (&self.r_intrinsics, r_dist),
        ]) {
            view.intrinsics = fixed(intrinsics, "intrinsics")?;
            view.distortion = Distortion::from_coefficients(model, dist.data.as_slice())?;
            view.image_size_pixels = size;
        }

        data.camera_translation = fixed(&self.translation, "translation")?;
        data.camera_rotation = fixed(&self.rotation, "rotation")?;
        data.camera_essential = fixed(&self.essential, "essential")?;
        data.camera_fundamental = fixed(&self.fundamental, "fundamental")?;
        Ok(data)
    }
}

fn fixed<const R: usize, const C: usize>(
    m: &BinaryMatrix,
    name: &str,
) -> Result<nalgebra::SMatrix<f64, R, C>> {
    m.to_fixed().ok_or_else(|| {
        Error::DimensionMismatch(format!(
            "'{name}' is {}x{}, expected {R}x{C}",
            m.rows(),
            m.cols()
        ))
    })
}

/// Decode a v1 stream. The result has passed [`StereoCameraCalibration::validate`].
pub fn read_stereo_calibration_v1<R: Read>(
    reader: &mut R,
    config: &CalibConfig,
) -> Result<StereoCameraCalibration> {
    let mut fields = V1Fields::new();
    if let Err(e) = fields.read_mandatory(reader, config) {
        calib_warn!(config, "Re-run calibration!");
        return Err(e);
    }
    fields.read_optional(reader, config);

    let data = fields.into_calibration()?;
    if let Err(e) = data.validate() {
        calib_error!(config, "Loaded v1 calibration is not valid: {}", e);
        return Err(e);
    }
    Ok(data)
}

/// Model to store in the `use_fisheye` flag; fails if the views disagree.
pub(crate) fn v1_model(data: &StereoCameraCalibration, config: &CalibConfig) -> Result<DistortionModel> {
    data.shared_model().ok_or_else(|| {
        calib_error!(config, "v1 calibrations can't deal with differing distortion models");
        Error::UnsupportedFormat(format!(
            "v1 calibrations can't deal with differing distortion models ('{}' and '{}')",
            data.view[0].distortion_model(),
            data.view[1].distortion_model()
        ))
    })
}

/// Encode `data` as a v1 stream.
pub fn write_stereo_calibration_v1<W: Write>(
    writer: &mut W,
    data: &StereoCameraCalibration,
    config: &CalibConfig,
) -> Result<()> {
    let model = v1_model(data, config)?;
    let wrapped = data.wrap();
    let [left, right] = wrapped.view;

    write_matrix(writer, &BinaryMatrix::from_fixed(left.intrinsics_mat()))?;
    write_matrix(writer, &BinaryMatrix::from_fixed(right.intrinsics_mat()))?;

    let radtan_placeholder = BinaryMatrix::zeros(ElementType::F64, 5, 1);
    let fisheye_placeholder = BinaryMatrix::zeros(ElementType::F64, 4, 1);
    let left_dist = BinaryMatrix::column(left.distortion_mat().as_slice());
    let right_dist = BinaryMatrix::column(right.distortion_mat().as_slice());
    match model {
        DistortionModel::RadTan5 => {
            write_matrix(writer, &left_dist)?;
            write_matrix(writer, &right_dist)?;
            write_matrix(writer, &fisheye_placeholder)?;
            write_matrix(writer, &fisheye_placeholder)?;
        }
        DistortionModel::FisheyeKb4 => {
            write_matrix(writer, &radtan_placeholder)?;
            write_matrix(writer, &radtan_placeholder)?;
            write_matrix(writer, &left_dist)?;
            write_matrix(writer, &right_dist)?;
        }
    }

    let scratch = BinaryMatrix::empty(ElementType::F64);
    for _ in SCRATCH_FIELDS {
        write_matrix(writer, &scratch)?;
    }

    // Written twice: once as the calibrated size, once as the new size.
    let size = left.image_size();
    let size_mat = BinaryMatrix::from_row_slice(
        ElementType::F32,
        1,
        2,
        &[size.width as f64, size.height as f64],
    );
    write_matrix(writer, &size_mat)?;
    write_matrix(writer, &size_mat)?;

    write_matrix(writer, &BinaryMatrix::from_fixed(wrapped.camera_translation_mat()))?;
    write_matrix(writer, &BinaryMatrix::from_fixed(wrapped.camera_rotation_mat()))?;
    write_matrix(writer, &BinaryMatrix::from_fixed(wrapped.camera_essential_mat()))?;
    write_matrix(writer, &BinaryMatrix::from_fixed(wrapped.camera_fundamental_mat()))?;

    let flag = match model {
        DistortionModel::FisheyeKb4 => 1.0,
        DistortionModel::RadTan5 => 0.0,
    };
    write_matrix(
        writer,
        &BinaryMatrix::from_row_slice(ElementType::F32, 1, 1, &[flag]),
    )?;
    Ok(())
}
