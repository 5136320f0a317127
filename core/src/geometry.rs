//! Lens distortion models and image geometry primitives.

use nalgebra::Matrix3;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Iterations used when inverting the radial-tangential model.
const RADTAN_UNDISTORT_ITERATIONS: usize = 10;

/// Newton steps used when inverting the fisheye polynomial.
const FISHEYE_UNDISTORT_ITERATIONS: usize = 10;

/// The closed set of supported distortion models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistortionModel {
    /// OpenCV-style 5 parameter radial-tangential model (k1, k2, p1, p2, k3).
    RadTan5,
    /// Kannala-Brandt equidistant fisheye model with 4 parameters (k1..k4).
    FisheyeKb4,
}

impl DistortionModel {
    pub const ALL: [DistortionModel; 2] = [DistortionModel::RadTan5, DistortionModel::FisheyeKb4];

    /// Stable identifier used by the JSON calibration schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            DistortionModel::RadTan5 => "pinhole_radtan5",
            DistortionModel::FisheyeKb4 => "fisheye_equidistant4",
        }
    }

    pub fn num_coefficients(&self) -> usize {
        self.coefficient_names().len()
    }

    /// Coefficient names in canonical storage order.
    pub fn coefficient_names(&self) -> &'static [&'static str] {
        match self {
            DistortionModel::RadTan5 => &["k1", "k2", "p1", "p2", "k3"],
            DistortionModel::FisheyeKb4 => &["k1", "k2", "k3", "k4"],
        }
    }
}

impl fmt::Display for DistortionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistortionModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DistortionModel::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::UnsupportedFormat(format!("Invalid camera model: '{}'", s)))
    }
}

/// Radial-tangential distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RadTan5 {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl RadTan5 {
    pub fn new(k1: f64, k2: f64, p1: f64, p2: f64, k3: f64) -> Self {
        Self { k1, k2, p1, p2, k3 }
    }

    /// Map undistorted normalized coordinates to distorted ones.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (x * radial + dx, y * radial + dy)
    }

    /// Invert [`RadTan5::distort`] by fixed-point iteration.
    pub fn undistort(&self, xd: f64, yd: f64) -> (f64, f64) {
        let mut x = xd;
        let mut y = yd;
        for _ in 0..RADTAN_UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
            if radial.abs() < 1e-12 {
                break;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (xd - dx) / radial;
            y = (yd - dy) / radial;
        }
        (x, y)
    }
}

/// Equidistant fisheye coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FisheyeKb4 {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
}

impl FisheyeKb4 {
    pub fn new(k1: f64, k2: f64, k3: f64, k4: f64) -> Self {
        Self { k1, k2, k3, k4 }
    }

    /// Map a point on the normalized plane (z = 1) to distorted coordinates.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let r = (x * x + y * y).sqrt();
        let theta = r.atan();
        let theta2 = theta * theta;
        let theta4 = theta2 * theta2;
        let theta6 = theta4 * theta2;
        let theta8 = theta4 * theta4;
        let theta_d =
            theta * (1.0 + self.k1 * theta2 + self.k2 * theta4 + self.k3 * theta6 + self.k4 * theta8);
        let scale = if r == 0.0 { 1.0 } else { theta_d / r };
        (x * scale, y * scale)
    }

    /// Invert [`FisheyeKb4::distort`] by solving for theta with Newton steps.
    pub fn undistort(&self, xd: f64, yd: f64) -> (f64, f64) {
        let theta_d = (xd * xd + yd * yd).sqrt();
        if theta_d < 1e-12 {
            return (xd, yd);
        }
        let theta_d = theta_d.min(std::f64::consts::FRAC_PI_2);

        let mut theta = theta_d;
        for _ in 0..FISHEYE_UNDISTORT_ITERATIONS {
            let t2 = theta * theta;
            let t4 = t2 * t2;
            let t6 = t4 * t2;
            let t8 = t4 * t4;
            let f = theta * (1.0 + self.k1 * t2 + self.k2 * t4 + self.k3 * t6 + self.k4 * t8)
                - theta_d;
            let df = 1.0 + 3.0 * self.k1 * t2 + 5.0 * self.k2 * t4 + 7.0 * self.k3 * t6
                + 9.0 * self.k4 * t8;
            if df.abs() < 1e-12 {
                break;
            }
            let step = f / df;
            theta -= step;
            if step.abs() < 1e-14 {
                break;
            }
        }

        let r = (xd * xd + yd * yd).sqrt();
        let scale = theta.tan() / r;
        (xd * scale, yd * scale)
    }
}

/// Distortion parameters tagged by model. Only the active model's
/// coefficients exist, so there is no way to read the wrong set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distortion {
    RadTan5(RadTan5),
    FisheyeKb4(FisheyeKb4),
}

impl Distortion {
    /// All-zero coefficients for `model`.
    pub fn zeros(model: DistortionModel) -> Self {
        match model {
            DistortionModel::RadTan5 => Distortion::RadTan5(RadTan5::default()),
            DistortionModel::FisheyeKb4 => Distortion::FisheyeKb4(FisheyeKb4::default()),
        }
    }

    pub fn model(&self) -> DistortionModel {
        match self {
            Distortion::RadTan5(_) => DistortionModel::RadTan5,
            Distortion::FisheyeKb4(_) => DistortionModel::FisheyeKb4,
        }
    }

    /// Coefficients in the canonical order of [`DistortionModel::coefficient_names`].
    pub fn coefficients(&self) -> Vec<f64> {
        match self {
            Distortion::RadTan5(d) => vec![d.k1, d.k2, d.p1, d.p2, d.k3],
            Distortion::FisheyeKb4(d) => vec![d.k1, d.k2, d.k3, d.k4],
        }
    }

    /// Apply the forward model to normalized coordinates.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Distortion::RadTan5(d) => d.distort(x, y),
            Distortion::FisheyeKb4(d) => d.distort(x, y),
        }
    }

    pub fn undistort(&self, xd: f64, yd: f64) -> (f64, f64) {
        match self {
            Distortion::RadTan5(d) => d.undistort(xd, yd),
            Distortion::FisheyeKb4(d) => d.undistort(xd, yd),
        }
    }

    /// Build from canonical-order coefficients; the count must match `model`.
    pub fn from_coefficients(model: DistortionModel, coeffs: &[f64]) -> Result<Self> {
        if coeffs.len() != model.num_coefficients() {
            return Err(Error::InvalidParameters(format!(
                "{} != {} distortion params for model '{}'",
                coeffs.len(),
                model.num_coefficients(),
                model
            )));
        }
        Ok(match model {
            DistortionModel::RadTan5 => Distortion::RadTan5(RadTan5::new(
                coeffs[0], coeffs[1], coeffs[2], coeffs[3], coeffs[4],
            )),
            DistortionModel::FisheyeKb4 => Distortion::FisheyeKb4(FisheyeKb4::new(
                coeffs[0], coeffs[1], coeffs[2], coeffs[3],
            )),
        })
    }
}

/// Image resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pinhole projection matrix from focal lengths and principal point.
pub fn intrinsics_matrix(fx: f64, fy: f64, cx: f64, cy: f64) -> Matrix3<f64> {
    Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0)
}

/// Cross-product matrix `[v]x`.
pub fn skew_symmetric(v: &nalgebra::Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v[2], v[1], v[2], 0.0, -v[0], -v[1], v[0], 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_round_trip() {
        for model in DistortionModel::ALL {
            assert_eq!(model.as_str().parse::<DistortionModel>().unwrap(), model);
        }
        assert!("pinhole_radtan8".parse::<DistortionModel>().is_err());
    }

    #[test]
    fn coefficient_count_is_checked() {
        assert!(Distortion::from_coefficients(DistortionModel::RadTan5, &[0.0; 4]).is_err());
        assert!(Distortion::from_coefficients(DistortionModel::FisheyeKb4, &[0.0; 5]).is_err());

        let d = Distortion::from_coefficients(DistortionModel::RadTan5, &[1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        assert_eq!(d.model(), DistortionModel::RadTan5);
        assert_eq!(d.coefficients(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn radtan_undistort_inverts_distort() {
        let d = RadTan5::new(-0.28, 0.07, 0.0002, -0.0001, 0.0);
        let (xd, yd) = d.distort(0.2, -0.15);
        let (x, y) = d.undistort(xd, yd);
        assert!((x - 0.2).abs() < 1e-6);
        assert!((y + 0.15).abs() < 1e-6);
    }

    #[test]
    fn fisheye_zero_coefficients_is_equidistant() {
        let d = FisheyeKb4::default();
        let (xd, yd) = d.distort(1.0, 0.0);
        // theta = atan(1) for a point at 45 degrees.
        assert!((xd - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert_eq!(yd, 0.0);

        let (x0, y0) = d.distort(0.0, 0.0);
        assert_eq!((x0, y0), (0.0, 0.0));
    }

    #[test]
    fn fisheye_undistort_inverts_distort() {
        let d = Distortion::FisheyeKb4(FisheyeKb4::new(0.031, -0.012, 0.002, -0.0004));
        for &(x, y) in &[(0.3, -0.2), (0.9, 0.4), (-1.2, 0.05), (0.0, 0.0)] {
            let (xd, yd) = d.distort(x, y);
            let (xu, yu) = d.undistort(xd, yd);
            assert!((xu - x).abs() < 1e-9, "x: {xu} vs {x}");
            assert!((yu - y).abs() < 1e-9, "y: {yu} vs {y}");
        }
    }
}
