use nalgebra::{Rotation3, Vector3};
use std::sync::Arc;
use stereo_calib::calib3d::update_epipolar_matrices;
use stereo_calib::core::{Distortion, DistortionModel, FisheyeKb4, ImageSize};
use stereo_calib::{
    init_thread_pool, load, save, CalibConfig, CameraCalibration, StereoCameraCalibration,
    StereoRectificationMaps,
};
use tempfile::tempdir;

fn headset_rig() -> StereoCameraCalibration {
    let d = Distortion::FisheyeKb4(FisheyeKb4::new(0.0295, -0.0088, 0.0012, -0.0002));
    let size = ImageSize::new(96, 72);
    let mut s = StereoCameraCalibration::new(DistortionModel::FisheyeKb4);
    s.view = [
        CameraCalibration::from_parts(70.2, 70.4, 47.8, 35.1, d, size),
        CameraCalibration::from_parts(69.9, 70.1, 48.3, 36.0, d, size),
    ];
    s.camera_rotation = Rotation3::from_euler_angles(-0.002, 0.015, 0.001).into_inner();
    s.camera_translation = Vector3::new(-0.0635, 0.0002, 0.0009);
    update_epipolar_matrices(&mut s).unwrap();
    s
}

#[test]
fn test_migrate_v1_to_v2_and_rectify() {
    init_thread_pool(Some(2)).unwrap();

    let dir = tempdir().unwrap();
    let legacy = dir.path().join("calibration.bin");
    let current = dir.path().join("calibration.json");
    let rig = headset_rig();

    save(&legacy, &rig).unwrap();
    let from_v1 = load(&legacy).unwrap();
    save(&current, &from_v1).unwrap();
    let from_v2 = Arc::new(load(&current).unwrap());
    assert_eq!(*from_v2, rig);

    let config = CalibConfig::default();
    let a = StereoRectificationMaps::new(&from_v2, &config).unwrap();
    let b = StereoRectificationMaps::new(&rig, &config).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.view[0].rectify.remap_x.len(), 96 * 72);
}

#[test]
fn test_json_document_is_readable_by_generic_tools() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("calibration.json");
    save(&path, &headset_rig()).unwrap();

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["metadata"]["version"], 2);
    assert_eq!(doc["cameras"].as_array().unwrap().len(), 2);
    assert_eq!(doc["cameras"][1]["model"], "fisheye_equidistant4");
    assert_eq!(doc["cameras"][1]["resolution"]["width"], 96);
    assert_eq!(
        doc["opencv_stereo_calibrate"]["translation"]
            .as_array()
            .unwrap()
            .len(),
        3
    );
}
