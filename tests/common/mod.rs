#![allow(dead_code)]

use std::collections::BTreeMap;

use glam::DVec2;
use nalgebra as na;
use sfm_data_association::camera::Camera;
use sfm_data_association::keypoints::Keypoints;
use sfm_data_association::track::{SfmMeasurement, SfmTrack2d};

pub const FOCAL: f64 = 500.0;
pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

/// Pinhole camera at `(x, y, z)`, looking down +z.
pub fn camera_at(x: f64, y: f64, z: f64) -> Camera {
    Camera::pinhole(
        FOCAL,
        WIDTH as f64 / 2.0,
        HEIGHT as f64 / 2.0,
        WIDTH,
        HEIGHT,
        na::Isometry3::translation(x, y, z),
    )
}

/// Three cameras on a horizontal baseline.
pub fn three_cameras() -> BTreeMap<usize, Camera> {
    BTreeMap::from([
        (0, camera_at(-1.0, 0.0, 0.0)),
        (1, camera_at(0.0, 0.0, 0.0)),
        (2, camera_at(1.0, 0.5, 0.0)),
    ])
}

/// [`three_cameras`] plus one below the baseline.
pub fn four_cameras() -> BTreeMap<usize, Camera> {
    let mut cameras = three_cameras();
    cameras.insert(3, camera_at(0.5, -0.5, 0.0));
    cameras
}

/// Pinhole projection that ignores which side of the camera the point is on.
pub fn project_unchecked(camera: &Camera, p_w: &na::Point3<f64>) -> DVec2 {
    let p_c = camera.camera_from_world().transform_point(p_w);
    DVec2::new(
        FOCAL * p_c.x / p_c.z + WIDTH as f64 / 2.0,
        FOCAL * p_c.y / p_c.z + HEIGHT as f64 / 2.0,
    )
}

pub fn track_of(cameras: &BTreeMap<usize, Camera>, p_w: &na::Point3<f64>) -> SfmTrack2d {
    SfmTrack2d::new(
        cameras
            .iter()
            .map(|(&image, camera)| SfmMeasurement {
                image,
                keypoint: 0,
                uv: project_unchecked(camera, p_w),
            })
            .collect(),
    )
}

pub fn synthetic_points() -> Vec<na::Point3<f64>> {
    vec![
        na::Point3::new(0.2, -0.1, 6.0),
        na::Point3::new(-0.5, 0.3, 8.0),
        na::Point3::new(0.7, 0.4, 7.5),
        na::Point3::new(-0.2, -0.6, 5.0),
        na::Point3::new(0.0, 0.0, 10.0),
    ]
}

/// Keypoints where keypoint `j` of every image observes `points[j]`.
pub fn keypoints_for(
    cameras: &BTreeMap<usize, Camera>,
    points: &[na::Point3<f64>],
) -> Vec<Keypoints> {
    cameras
        .values()
        .map(|camera| {
            Keypoints::new(
                points
                    .iter()
                    .map(|p| project_unchecked(camera, p))
                    .collect(),
            )
        })
        .collect()
}
