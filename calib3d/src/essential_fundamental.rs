//! Epipolar matrices derived from a calibrated stereo pair.

use crate::Result;
use cv_core::{skew_symmetric, Error, StereoCameraCalibration};
use nalgebra::{Matrix3, Vector3};

/// Essential matrix `E = [t]x R` for the transform taking points from the
/// first camera frame to the second.
pub fn essential_from_extrinsics(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix3<f64> {
    skew_symmetric(translation) * rotation
}

/// Fundamental matrix `F = K2^-T E K1^-1`, scaled so `F[2][2] == 1` when
/// that entry is non-zero.
pub fn fundamental_from_essential(
    essential: &Matrix3<f64>,
    intrinsics1: &Matrix3<f64>,
    intrinsics2: &Matrix3<f64>,
) -> Result<Matrix3<f64>> {
    let k1_inv = intrinsics1.try_inverse().ok_or_else(|| {
        Error::InvalidParameters("first camera intrinsics are singular".to_string())
    })?;
    let k2_inv = intrinsics2.try_inverse().ok_or_else(|| {
        Error::InvalidParameters("second camera intrinsics are singular".to_string())
    })?;
    let f = k2_inv.transpose() * essential * k1_inv;
    let scale = f[(2, 2)];
    Ok(if scale.abs() > 1e-12 { f / scale } else { f })
}

/// Recompute `camera_essential` and `camera_fundamental` from the pair's
/// extrinsics and intrinsics.
pub fn update_epipolar_matrices(data: &mut StereoCameraCalibration) -> Result<()> {
    let essential = essential_from_extrinsics(&data.camera_rotation, &data.camera_translation);
    let fundamental = fundamental_from_essential(
        &essential,
        &data.view[0].intrinsics,
        &data.view[1].intrinsics,
    )?;
    data.camera_essential = essential;
    data.camera_fundamental = fundamental;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::intrinsics_matrix;
    use nalgebra::{Point3, Rotation3};

    #[test]
    fn epipolar_constraint_holds() {
        let r = Rotation3::from_euler_angles(0.02, -0.01, 0.03).into_inner();
        let t = Vector3::new(-0.07, 0.002, 0.001);
        let e = essential_from_extrinsics(&r, &t);

        let k1 = intrinsics_matrix(410.0, 412.0, 320.0, 240.0);
        let k2 = intrinsics_matrix(405.0, 406.0, 318.0, 243.0);
        let f = fundamental_from_essential(&e, &k1, &k2).unwrap();
        assert!((f[(2, 2)] - 1.0).abs() < 1e-12);

        for p in [
            Point3::new(0.1, -0.2, 2.0),
            Point3::new(-0.5, 0.3, 4.5),
            Point3::new(0.0, 0.0, 1.0),
        ] {
            let x1 = p.coords;
            let x2 = r * x1 + t;
            let n1 = x1 / x1.z;
            let n2 = x2 / x2.z;
            assert!((n2.transpose() * e * n1)[(0, 0)].abs() < 1e-12);

            let u1 = k1 * n1;
            let u2 = k2 * n2;
            assert!((u2.transpose() * f * u1)[(0, 0)].abs() < 1e-9);
        }
    }

    #[test]
    fn singular_intrinsics_rejected() {
        let e = Matrix3::identity();
        assert!(fundamental_from_essential(&e, &Matrix3::zeros(), &Matrix3::identity()).is_err());
    }
}
