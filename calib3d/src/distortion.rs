//! Undistort/rectify lookup tables.
//!
//! For every pixel of the output image the tables hold the source pixel it
//! samples from. A ray is formed with `(K_new * R)^-1`, bent by the lens
//! model, and projected with the source intrinsics.

use crate::Result;
use cv_core::{Error, FisheyeKb4, ImageSize, RadTan5};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

/// Table value for output pixels whose ray never reaches the source image.
pub const OUT_OF_FRAME_SENTINEL: f32 = -1.0e6;

/// Remap tables for a radial-tangential camera.
pub fn init_undistort_rectify_map(
    image_size: ImageSize,
    intrinsics: &Matrix3<f64>,
    distortion: &RadTan5,
    rectification: &Matrix3<f64>,
    new_intrinsics: &Matrix3<f64>,
) -> Result<(Vec<f32>, Vec<f32>)> {
    build_map(
        image_size,
        intrinsics,
        rectification,
        new_intrinsics,
        |ray| {
            if ray[2].abs() <= 1e-12 {
                return None;
            }
            Some(distortion.distort(ray[0] / ray[2], ray[1] / ray[2]))
        },
    )
}

/// Remap tables for an equidistant fisheye camera.
pub fn fisheye_init_undistort_rectify_map(
    image_size: ImageSize,
    intrinsics: &Matrix3<f64>,
    distortion: &FisheyeKb4,
    rectification: &Matrix3<f64>,
    new_intrinsics: &Matrix3<f64>,
) -> Result<(Vec<f32>, Vec<f32>)> {
    build_map(
        image_size,
        intrinsics,
        rectification,
        new_intrinsics,
        |ray| {
            // Rays at or behind the image plane have no fisheye projection.
            if ray[2] <= 0.0 {
                return None;
            }
            Some(distortion.distort(ray[0] / ray[2], ray[1] / ray[2]))
        },
    )
}

fn build_map<F>(
    image_size: ImageSize,
    intrinsics: &Matrix3<f64>,
    rectification: &Matrix3<f64>,
    new_intrinsics: &Matrix3<f64>,
    distort: F,
) -> Result<(Vec<f32>, Vec<f32>)>
where
    F: Fn(&Vector3<f64>) -> Option<(f64, f64)> + Sync,
{
    if image_size.is_empty() {
        return Err(Error::InvalidParameters(
            "init_undistort_rectify_map requires non-zero image size".to_string(),
        ));
    }
    let inv = (new_intrinsics * rectification).try_inverse().ok_or_else(|| {
        Error::InvalidParameters(
            "new intrinsics times rectification rotation is singular".to_string(),
        )
    })?;

    let width = image_size.width as usize;
    let mut map_x = vec![0.0f32; image_size.area()];
    let mut map_y = vec![0.0f32; image_size.area()];
    let k = intrinsics;

    map_x
        .par_chunks_mut(width)
        .zip(map_y.par_chunks_mut(width))
        .enumerate()
        .for_each(|(y, (row_x, row_y))| {
            for x in 0..width {
                let ray = inv * Vector3::new(x as f64, y as f64, 1.0);
                match distort(&ray) {
                    Some((xd, yd)) => {
                        row_x[x] = (k[(0, 0)] * xd + k[(0, 1)] * yd + k[(0, 2)]) as f32;
                        row_y[x] = (k[(1, 1)] * yd + k[(1, 2)]) as f32;
                    }
                    None => {
                        row_x[x] = OUT_OF_FRAME_SENTINEL;
                        row_y[x] = OUT_OF_FRAME_SENTINEL;
                    }
                }
            }
        });

    Ok((map_x, map_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::intrinsics_matrix;
    use nalgebra::Rotation3;

    #[test]
    fn identity_map_without_distortion() {
        let k = intrinsics_matrix(300.0, 300.0, 15.5, 11.5);
        let size = ImageSize::new(32, 24);
        let (mx, my) =
            init_undistort_rectify_map(size, &k, &RadTan5::default(), &Matrix3::identity(), &k)
                .unwrap();
        assert_eq!(mx.len(), 32 * 24);
        for y in 0..24 {
            for x in 0..32 {
                let i = y * 32 + x;
                assert!((mx[i] - x as f32).abs() < 1e-3);
                assert!((my[i] - y as f32).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn principal_point_is_fixed_under_distortion() {
        let k = intrinsics_matrix(300.0, 300.0, 16.0, 12.0);
        let size = ImageSize::new(33, 25);
        let d = RadTan5::new(-0.3, 0.1, 0.0, 0.0, 0.0);
        let (mx, my) = init_undistort_rectify_map(size, &k, &d, &Matrix3::identity(), &k).unwrap();
        let i = 12 * 33 + 16;
        assert!((mx[i] - 16.0).abs() < 1e-4);
        assert!((my[i] - 12.0).abs() < 1e-4);

        // Barrel distortion pulls the corners towards the center.
        assert!(mx[0] > 0.0);
        assert!(my[0] > 0.0);
    }

    #[test]
    fn fisheye_rays_behind_camera_use_sentinel() {
        let k = intrinsics_matrix(200.0, 200.0, 20.0, 15.0);
        let size = ImageSize::new(40, 30);
        let r = Rotation3::from_axis_angle(&Vector3::y_axis(), 120f64.to_radians()).into_inner();
        let (mx, my) =
            fisheye_init_undistort_rectify_map(size, &k, &FisheyeKb4::default(), &r, &k).unwrap();
        let center = 15 * 40 + 20;
        assert_eq!(mx[center], OUT_OF_FRAME_SENTINEL);
        assert_eq!(my[center], OUT_OF_FRAME_SENTINEL);
    }

    #[test]
    fn singular_target_rejected() {
        let k = intrinsics_matrix(200.0, 200.0, 20.0, 15.0);
        let result = init_undistort_rectify_map(
            ImageSize::new(4, 4),
            &k,
            &RadTan5::default(),
            &Matrix3::identity(),
            &Matrix3::zeros(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_size_rejected() {
        let k = intrinsics_matrix(200.0, 200.0, 20.0, 15.0);
        let result = fisheye_init_undistort_rectify_map(
            ImageSize::new(0, 4),
            &k,
            &FisheyeKb4::default(),
            &Matrix3::identity(),
            &k,
        );
        assert!(result.is_err());
    }
}
