//! JSON v2 calibration format.

use cv_core::{
    calib_error, calib_warn, CalibConfig, CameraCalibration, Distortion, DistortionModel, Error,
    ImageSize, Result, StereoCameraCalibration,
};
use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value written to the `$schema` key.
pub const SCHEMA_URL: &str =
    "https://monado.pages.freedesktop.org/monado/calibration_v2.schema.json";

pub const SUPPORTED_VERSION: i64 = 2;

#[derive(Debug, Serialize)]
struct CalibrationFileV2 {
    #[serde(rename = "$schema")]
    schema: &'static str,
    metadata: MetadataV2,
    cameras: Vec<CameraV2>,
    opencv_stereo_calibrate: StereoV2,
}

#[derive(Debug, Serialize)]
struct MetadataV2 {
    version: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CameraV2 {
    model: String,
    intrinsics: IntrinsicsV2,
    distortion: Map<String, Value>,
    resolution: ResolutionV2,
}

#[derive(Debug, Serialize, Deserialize)]
struct IntrinsicsV2 {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResolutionV2 {
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize)]
struct StereoV2 {
    rotation: Vec<f64>,
    translation: Vec<f64>,
    essential: Vec<f64>,
    fundamental: Vec<f64>,
}

fn camera_from_json_v2(json: &Value) -> Result<CameraCalibration> {
    let camera = CameraV2::deserialize(json).map_err(|e| Error::Parse(e.to_string()))?;
    let model: DistortionModel = camera.model.parse()?;

    let given = camera.distortion.len();
    if given != model.num_coefficients() {
        return Err(Error::InvalidParameters(format!(
            "{} != {} distortion params for model '{}'",
            given,
            model.num_coefficients(),
            model
        )));
    }
    let coeffs = model
        .coefficient_names()
        .iter()
        .map(|name| {
            camera
                .distortion
                .get(*name)
                .and_then(Value::as_f64)
                .ok_or_else(|| {
                    Error::Parse(format!("distortion coefficient '{name}' missing or not a number"))
                })
        })
        .collect::<Result<Vec<f64>>>()?;

    let IntrinsicsV2 { fx, fy, cx, cy } = camera.intrinsics;
    Ok(CameraCalibration::from_parts(
        fx,
        fy,
        cx,
        cy,
        Distortion::from_coefficients(model, &coeffs)?,
        ImageSize::new(camera.resolution.width, camera.resolution.height),
    ))
}

fn camera_to_json_v2(view: &CameraCalibration) -> CameraV2 {
    let model = view.distortion_model();
    let distortion = model
        .coefficient_names()
        .iter()
        .zip(view.distortion.coefficients())
        .map(|(name, v)| (name.to_string(), Value::from(v)))
        .collect();
    CameraV2 {
        model: model.as_str().to_string(),
        intrinsics: IntrinsicsV2 {
            fx: view.fx(),
            fy: view.fy(),
            cx: view.cx(),
            cy: view.cy(),
        },
        distortion,
        resolution: ResolutionV2 {
            width: view.image_size_pixels.width,
            height: view.image_size_pixels.height,
        },
    }
}

/// Read a flat row-major array of exactly `R * C` numbers.
fn matrix_field<const R: usize, const C: usize>(
    stereo: &Value,
    name: &str,
    config: &CalibConfig,
) -> Option<SMatrix<f64, R, C>> {
    let values = stereo
        .get(name)
        .and_then(Value::as_array)
        .filter(|a| a.len() == R * C)
        .and_then(|a| a.iter().map(Value::as_f64).collect::<Option<Vec<f64>>>());
    match values {
        Some(v) => Some(SMatrix::from_row_slice(&v)),
        None => {
            calib_error!(config, "Invalid '{}' matrix field", name);
            None
        }
    }
}

/// Integer value of `v`, also accepting floats with no fractional part.
fn integral_value(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| {
        v.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn row_major<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> Vec<f64> {
    m.transpose().iter().copied().collect()
}

/// Decode a parsed v2 document. The result has passed
/// [`StereoCameraCalibration::validate`].
pub fn stereo_calibration_from_json_v2(
    json: &Value,
    config: &CalibConfig,
) -> Result<StereoCameraCalibration> {
    let version = match json.get("metadata").and_then(|m| m.get("version")) {
        None => {
            calib_warn!(
                config,
                "'metadata.version' not found, will assume version={}",
                SUPPORTED_VERSION
            );
            SUPPORTED_VERSION
        }
        Some(v) => integral_value(v).ok_or_else(|| {
            calib_error!(config, "'metadata.version' is not an integer: {}", v);
            Error::Parse(format!("'metadata.version' is not an integer: {v}"))
        })?,
    };
    if version != SUPPORTED_VERSION {
        calib_error!(
            config,
            "Calibration json version ({}) != {}",
            version,
            SUPPORTED_VERSION
        );
        return Err(Error::UnsupportedFormat(format!(
            "calibration json version {version}, only {SUPPORTED_VERSION} is supported"
        )));
    }

    let cameras = json
        .get("cameras")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            calib_error!(config, "'cameras' array missing");
            Error::Parse("'cameras' array missing".to_string())
        })?;
    if cameras.len() != 2 {
        calib_error!(config, "Two cameras must be specified, {} given", cameras.len());
        return Err(Error::InvalidParameters(format!(
            "two cameras must be specified, {} given",
            cameras.len()
        )));
    }

    let mut views = Vec::with_capacity(2);
    for (i, camera) in cameras.iter().enumerate() {
        let view = camera_from_json_v2(camera).map_err(|e| {
            calib_error!(config, "Unable to load camera calibration: cameras[{}]: {}", i, e);
            e
        })?;
        views.push(view);
    }
    let [left, right]: [CameraCalibration; 2] = views
        .try_into()
        .map_err(|_| Error::InvalidParameters("expected two cameras".to_string()))?;

    if left.distortion_model() != right.distortion_model() {
        calib_error!(
            config,
            "Heterogeneous camera models are not supported: '{}' and '{}'",
            left.distortion_model(),
            right.distortion_model()
        );
        return Err(Error::UnsupportedFormat(format!(
            "cameras use different models: '{}' and '{}'",
            left.distortion_model(),
            right.distortion_model()
        )));
    }

    let null = Value::Null;
    let stereo = json.get("opencv_stereo_calibrate").unwrap_or(&null);
    let rotation = matrix_field::<3, 3>(stereo, "rotation", config);
    let translation = matrix_field::<3, 1>(stereo, "translation", config);
    let essential = matrix_field::<3, 3>(stereo, "essential", config);
    let fundamental = matrix_field::<3, 3>(stereo, "fundamental", config);
    let (Some(rotation), Some(translation), Some(essential), Some(fundamental)) =
        (rotation, translation, essential, fundamental)
    else {
        calib_error!(config, "One or more calibration matrices couldn't be loaded");
        return Err(Error::Parse(
            "'opencv_stereo_calibrate' has missing or malformed matrices".to_string(),
        ));
    };

    let data = StereoCameraCalibration {
        view: [left, right],
        camera_rotation: rotation,
        camera_translation: translation,
        camera_essential: essential,
        camera_fundamental: fundamental,
    };
    if let Err(e) = data.validate() {
        calib_error!(config, "Loaded v2 calibration is not valid: {}", e);
        return Err(e);
    }
    Ok(data)
}

/// Encode `data` as a v2 document with keys in schema order.
pub fn stereo_calibration_to_json_v2(
    data: &StereoCameraCalibration,
    config: &CalibConfig,
) -> Result<Value> {
    if data.shared_model().is_none() {
        calib_error!(config, "Can't save calibration with heterogeneous camera models");
        return Err(Error::UnsupportedFormat(format!(
            "cameras use different models: '{}' and '{}'",
            data.view[0].distortion_model(),
            data.view[1].distortion_model()
        )));
    }

    let wrapped = data.wrap();
    let file = CalibrationFileV2 {
        schema: SCHEMA_URL,
        metadata: MetadataV2 {
            version: SUPPORTED_VERSION,
        },
        cameras: wrapped.view.iter().map(|v| camera_to_json_v2(v.base())).collect(),
        opencv_stereo_calibrate: StereoV2 {
            rotation: row_major(wrapped.camera_rotation_mat()),
            translation: row_major(wrapped.camera_translation_mat()),
            essential: row_major(wrapped.camera_essential_mat()),
            fundamental: row_major(wrapped.camera_fundamental_mat()),
        },
    };
    serde_json::to_value(&file).map_err(|e| Error::Parse(e.to_string()))
}
