//! Stereo rectification (Bouguet).
//!
//! Splits the relative rotation between the two views in half, then rotates
//! both so the baseline lies along the image x (or y) axis. The shared
//! rectified focal length and principal points are chosen from the image
//! borders, and `alpha` trades cropping against keeping every source pixel.

use crate::Result;
use cv_core::{Distortion, Error, ImageSize};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Rotation3, Vector2, Vector3};

/// Samples per side of the border grid used to find valid rectangles.
const BORDER_GRID: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct StereoRectifyMatrices {
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    pub p1: Matrix3x4<f64>,
    pub p2: Matrix3x4<f64>,
    pub q: Matrix4<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StereoRectifyFlags {
    /// Give both rectified views the same principal point.
    pub zero_disparity: bool,
}

impl StereoRectifyFlags {
    pub const ZERO_DISPARITY: StereoRectifyFlags = StereoRectifyFlags {
        zero_disparity: true,
    };
}

/// Axis aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// One side of the rig as seen by the rectifier.
struct ViewInput<'a> {
    intrinsics: &'a Matrix3<f64>,
    distortion: Option<&'a Distortion>,
}

impl ViewInput<'_> {
    /// Pixel to undistorted normalized coordinates.
    fn normalize(&self, p: &Point2<f64>) -> Vector2<f64> {
        let k = self.intrinsics;
        let yd = (p.y - k[(1, 2)]) / k[(1, 1)];
        let xd = (p.x - k[(0, 2)] - k[(0, 1)] * yd) / k[(0, 0)];
        match self.distortion {
            Some(d) => {
                let (x, y) = d.undistort(xd, yd);
                Vector2::new(x, y)
            }
            None => Vector2::new(xd, yd),
        }
    }

    /// Undistort `p`, rotate it by `rotation` and project it with the
    /// pinhole part of `projection`.
    fn rectify_point(
        &self,
        p: &Point2<f64>,
        rotation: &Matrix3<f64>,
        projection: &Matrix3x4<f64>,
    ) -> Point2<f64> {
        let n = self.normalize(p);
        let ray = rotation * Vector3::new(n.x, n.y, 1.0);
        let (x, y) = (ray.x / ray.z, ray.y / ray.z);
        Point2::new(
            projection[(0, 0)] * x + projection[(0, 1)] * y + projection[(0, 2)],
            projection[(1, 1)] * y + projection[(1, 2)],
        )
    }

    /// Inner (fully valid) and outer (bounding) rectangles of the rectified
    /// image border.
    fn rectangles(
        &self,
        rotation: &Matrix3<f64>,
        projection: &Matrix3x4<f64>,
        size: ImageSize,
    ) -> (Rect, Rect) {
        let n = BORDER_GRID;
        let step_x = size.width as f64 / (n - 1) as f64;
        let step_y = size.height as f64 / (n - 1) as f64;

        let (mut ix0, mut ix1, mut iy0, mut iy1) =
            (f64::MIN, f64::MAX, f64::MIN, f64::MAX);
        let (mut ox0, mut ox1, mut oy0, mut oy1) =
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN);

        for gy in 0..n {
            for gx in 0..n {
                let src = Point2::new(gx as f64 * step_x, gy as f64 * step_y);
                let p = self.rectify_point(&src, rotation, projection);
                ox0 = ox0.min(p.x);
                ox1 = ox1.max(p.x);
                oy0 = oy0.min(p.y);
                oy1 = oy1.max(p.y);
                if gx == 0 {
                    ix0 = ix0.max(p.x);
                }
                if gx == n - 1 {
                    ix1 = ix1.min(p.x);
                }
                if gy == 0 {
                    iy0 = iy0.max(p.y);
                }
                if gy == n - 1 {
                    iy1 = iy1.min(p.y);
                }
            }
        }

        let inner = Rect {
            x: ix0,
            y: iy0,
            width: ix1 - ix0,
            height: iy1 - iy0,
        };
        let outer = Rect {
            x: ox0,
            y: oy0,
            width: ox1 - ox0,
            height: oy1 - oy0,
        };
        (inner, outer)
    }
}

/// Compute rectifying rotations, projections and the disparity-to-depth
/// matrix for a stereo pair.
///
/// `rotation` and `translation` take points from the first camera frame to
/// the second. A `None` distortion is treated as an ideal pinhole. `alpha`
/// below zero keeps the default scale; `0` crops to valid pixels only and
/// `1` keeps every source pixel.
#[allow(clippy::too_many_arguments)]
pub fn stereo_rectify(
    intrinsics1: &Matrix3<f64>,
    distortion1: Option<&Distortion>,
    intrinsics2: &Matrix3<f64>,
    distortion2: Option<&Distortion>,
    image_size: ImageSize,
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    flags: StereoRectifyFlags,
    alpha: f64,
) -> Result<StereoRectifyMatrices> {
    if image_size.is_empty() {
        return Err(Error::InvalidParameters(
            "stereo_rectify requires non-zero image size".to_string(),
        ));
    }
    if translation.norm() <= 1e-12 {
        return Err(Error::InvalidParameters(
            "stereo_rectify requires non-zero baseline".to_string(),
        ));
    }

    // Half of the relative rotation, applied to each side.
    let om = Rotation3::from_matrix(rotation).scaled_axis();
    let r_r = Rotation3::new(om * -0.5).into_inner();
    let t = r_r * translation;

    // Rotate the baseline onto the dominant image axis.
    let idx = if t.x.abs() > t.y.abs() { 0 } else { 1 };
    let c = t[idx];
    let mut uu = Vector3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };
    let mut ww = t.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / t.norm()).acos() / nw;
    }
    let w_r = Rotation3::new(ww).into_inner();

    let r1 = w_r * r_r.transpose();
    let r2 = w_r * r_r;
    let t = r2 * translation;

    let views = [
        ViewInput {
            intrinsics: intrinsics1,
            distortion: distortion1,
        },
        ViewInput {
            intrinsics: intrinsics2,
            distortion: distortion2,
        },
    ];
    let rotations = [r1, r2];

    let (nx, ny) = (image_size.width as f64, image_size.height as f64);
    let other = idx ^ 1;

    // Smaller of the two focal lengths across the baseline, shrunk for barrel
    // distortion.
    let mut fc_new = f64::MAX;
    for view in &views {
        let mut fc = view.intrinsics[(other, other)];
        if let Some(Distortion::RadTan5(d)) = view.distortion {
            if d.k1 < 0.0 {
                fc *= 1.0 + d.k1 * (nx * nx + ny * ny) / (4.0 * fc * fc);
            }
        }
        fc_new = fc_new.min(fc);
    }

    // Principal points that center the rectified image corners.
    let corners = [
        Point2::new(0.0, 0.0),
        Point2::new(nx - 1.0, 0.0),
        Point2::new(0.0, ny - 1.0),
        Point2::new(nx - 1.0, ny - 1.0),
    ];
    let mut cc_new = [Vector2::zeros(); 2];
    for (k, view) in views.iter().enumerate() {
        let mut avg = Vector2::zeros();
        for corner in &corners {
            let n = view.normalize(corner);
            let ray = rotations[k] * Vector3::new(n.x, n.y, 1.0);
            avg += Vector2::new(fc_new * ray.x / ray.z, fc_new * ray.y / ray.z);
        }
        avg /= corners.len() as f64;
        cc_new[k] = Vector2::new((nx - 1.0) / 2.0 - avg.x, (ny - 1.0) / 2.0 - avg.y);
    }

    if flags.zero_disparity {
        let mean = (cc_new[0] + cc_new[1]) * 0.5;
        cc_new = [mean, mean];
    } else {
        // Only the coordinate across the baseline is shared.
        let mean = (cc_new[0][other] + cc_new[1][other]) * 0.5;
        cc_new[0][other] = mean;
        cc_new[1][other] = mean;
    }

    let projection = |fc: f64, cc: &Vector2<f64>| {
        Matrix3x4::new(
            fc, 0.0, cc.x, 0.0, //
            0.0, fc, cc.y, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        )
    };
    let mut p1 = projection(fc_new, &cc_new[0]);
    let mut p2 = projection(fc_new, &cc_new[1]);
    p2[(idx, 3)] = t[idx] * fc_new;

    if alpha >= 0.0 {
        let (inner1, outer1) = views[0].rectangles(&r1, &p1, image_size);
        let (inner2, outer2) = views[1].rectangles(&r2, &p2, image_size);

        let s0 = inner_scale(&cc_new[0], &inner1, nx, ny).max(inner_scale(&cc_new[1], &inner2, nx, ny));
        let s1 = outer_scale(&cc_new[0], &outer1, nx, ny).min(outer_scale(&cc_new[1], &outer2, nx, ny));
        let s = s0 * (1.0 - alpha) + s1 * alpha;

        fc_new *= s;
        let tx = p2[(idx, 3)] * s;
        p1 = projection(fc_new, &cc_new[0]);
        p2 = projection(fc_new, &cc_new[1]);
        p2[(idx, 3)] = tx;
    }

    let mut q = Matrix4::<f64>::zeros();
    q[(0, 0)] = 1.0;
    q[(0, 3)] = -cc_new[0].x;
    q[(1, 1)] = 1.0;
    q[(1, 3)] = -cc_new[0].y;
    q[(2, 3)] = fc_new;
    q[(3, 2)] = -1.0 / t[idx];
    q[(3, 3)] = (cc_new[0][idx] - cc_new[1][idx]) / t[idx];

    Ok(StereoRectifyMatrices { r1, r2, p1, p2, q })
}

/// Scale at which `inner` fills the whole image.
fn inner_scale(cc: &Vector2<f64>, inner: &Rect, nx: f64, ny: f64) -> f64 {
    (cc.x / (cc.x - inner.x))
        .max(cc.y / (cc.y - inner.y))
        .max((nx - cc.x) / (inner.x + inner.width - cc.x))
        .max((ny - cc.y) / (inner.y + inner.height - cc.y))
}

/// Scale at which `outer` just fits inside the image.
fn outer_scale(cc: &Vector2<f64>, outer: &Rect, nx: f64, ny: f64) -> f64 {
    (cc.x / (cc.x - outer.x))
        .min(cc.y / (cc.y - outer.y))
        .min((nx - cc.x) / (outer.x + outer.width - cc.x))
        .min((ny - cc.y) / (outer.y + outer.height - cc.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::{intrinsics_matrix, RadTan5};

    #[test]
    fn aligned_pair_keeps_geometry() {
        let k = intrinsics_matrix(400.0, 400.0, 319.5, 239.5);
        let t = Vector3::new(-0.1, 0.0, 0.0);
        let m = stereo_rectify(
            &k,
            None,
            &k,
            None,
            ImageSize::new(640, 480),
            &Matrix3::identity(),
            &t,
            StereoRectifyFlags::ZERO_DISPARITY,
            -1.0,
        )
        .unwrap();

        assert!((m.r1 - Matrix3::identity()).norm() < 1e-12);
        assert!((m.r2 - Matrix3::identity()).norm() < 1e-12);
        assert!((m.p1[(0, 0)] - 400.0).abs() < 1e-9);
        assert!((m.p1[(0, 2)] - 319.5).abs() < 1e-9);
        assert!((m.p1[(1, 2)] - 239.5).abs() < 1e-9);
        assert!((m.p2[(0, 3)] - (-40.0)).abs() < 1e-9);
        assert!((m.q[(2, 3)] - 400.0).abs() < 1e-9);
        assert!((m.q[(3, 2)] - 10.0).abs() < 1e-9);
        assert!(m.q[(3, 3)].abs() < 1e-12);
    }

    #[test]
    fn zero_baseline_rejected() {
        let k = intrinsics_matrix(400.0, 400.0, 319.5, 239.5);
        let err = stereo_rectify(
            &k,
            None,
            &k,
            None,
            ImageSize::new(640, 480),
            &Matrix3::identity(),
            &Vector3::zeros(),
            StereoRectifyFlags::default(),
            -1.0,
        );
        assert!(matches!(err, Err(Error::InvalidParameters(_))));
    }

    #[test]
    fn vertical_rig_uses_y_axis() {
        let k = intrinsics_matrix(400.0, 400.0, 319.5, 239.5);
        let t = Vector3::new(0.001, 0.08, 0.0);
        let m = stereo_rectify(
            &k,
            None,
            &k,
            None,
            ImageSize::new(640, 480),
            &Matrix3::identity(),
            &t,
            StereoRectifyFlags::ZERO_DISPARITY,
            -1.0,
        )
        .unwrap();
        assert_eq!(m.p2[(0, 3)], 0.0);
        assert!(m.p2[(1, 3)] > 0.0);
    }

    #[test]
    fn alpha_one_keeps_more_field_than_alpha_zero() {
        let k = intrinsics_matrix(420.0, 420.0, 320.0, 240.0);
        let d = Distortion::RadTan5(RadTan5::new(-0.25, 0.05, 0.0, 0.0, 0.0));
        let r = Rotation3::from_euler_angles(0.01, -0.02, 0.005).into_inner();
        let t = Vector3::new(-0.06, 0.001, 0.0);
        let size = ImageSize::new(640, 480);

        let crop = stereo_rectify(&k, Some(&d), &k, Some(&d), size, &r, &t, StereoRectifyFlags::ZERO_DISPARITY, 0.0)
            .unwrap();
        let full = stereo_rectify(&k, Some(&d), &k, Some(&d), size, &r, &t, StereoRectifyFlags::ZERO_DISPARITY, 1.0)
            .unwrap();
        // Keeping every source pixel needs a shorter rectified focal length.
        assert!(full.p1[(0, 0)] < crop.p1[(0, 0)]);
        assert_eq!(full.p1[(0, 2)], full.p2[(0, 2)]);
    }
}
