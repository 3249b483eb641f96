mod common;

use std::collections::BTreeMap;

use common::*;
use glam::DVec2;
use nalgebra as na;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sfm_data_association::DataAssociationError;
use sfm_data_association::camera::Camera;
use sfm_data_association::track::{SfmMeasurement, SfmTrack2d};
use sfm_data_association::triangulation::{
    LandmarkInitializer, SamplingMode, TriangulationExitCode, TriangulationMode,
    TriangulationOptions, reprojection_error, sample_view_pairs, triangulate_dlt,
};

fn direct_options(reproj_error_thresh: f64) -> TriangulationOptions {
    TriangulationOptions {
        mode: TriangulationMode::Direct,
        reproj_error_thresh,
        num_ransac_hypotheses: None,
        sampling_mode: SamplingMode::Uniform,
    }
}

fn ransac_options(num_hypotheses: usize, sampling_mode: SamplingMode) -> TriangulationOptions {
    TriangulationOptions {
        mode: TriangulationMode::Ransac,
        reproj_error_thresh: 5.0,
        num_ransac_hypotheses: Some(num_hypotheses),
        sampling_mode,
    }
}

/// Track of `p_w` whose measurement in `image` is shifted by `offset` pixels.
fn track_with_outlier(
    cameras: &BTreeMap<usize, Camera>,
    p_w: &na::Point3<f64>,
    image: usize,
    offset: DVec2,
) -> SfmTrack2d {
    let measurements = track_of(cameras, p_w)
        .measurements()
        .iter()
        .map(|m| {
            let mut m = *m;
            if m.image == image {
                m.uv += offset;
            }
            m
        })
        .collect();
    SfmTrack2d::new(measurements)
}

fn assert_point_near(a: &na::Point3<f64>, b: &na::Point3<f64>, tol: f64) {
    assert!((a - b).norm() < tol, "{:?} != {:?}", a, b);
}

#[test]
fn test_dlt_recovers_point() {
    let cameras = three_cameras();
    for p_w in synthetic_points() {
        let views: Vec<(&Camera, na::Vector2<f64>)> = cameras
            .values()
            .map(|c| {
                let uv = project_unchecked(c, &p_w);
                (c, na::Vector2::new(uv.x, uv.y))
            })
            .collect();
        let point = triangulate_dlt(&views).unwrap();
        assert_point_near(&point, &p_w, 1e-6);
    }
}

#[test]
fn test_dlt_needs_two_views() {
    let camera = camera_at(0.0, 0.0, 0.0);
    let uv = na::Vector2::new(320.0, 240.0);
    assert!(triangulate_dlt(&[]).is_none());
    assert!(triangulate_dlt(&[(&camera, uv)]).is_none());
}

#[test]
fn test_direct_triangulation() {
    let cameras = three_cameras();
    let initializer = LandmarkInitializer::new(&cameras, direct_options(1.0)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let p_w = synthetic_points()[1];

    let result = initializer.triangulate(&track_of(&cameras, &p_w), &mut rng);
    assert_eq!(result.exit_code, TriangulationExitCode::Success);
    assert!(!result.cheirality_failure);
    assert!(result.avg_reprojection_error < 1e-6);
    let track = result.track.unwrap();
    assert_eq!(track.number_measurements(), 3);
    assert_point_near(track.point3(), &p_w, 1e-6);
    for m in track.measurements() {
        let uv = na::Vector2::new(m.uv.x, m.uv.y);
        assert!(reprojection_error(&cameras[&m.image], track.point3(), &uv) < 1e-6);
    }
}

#[test]
fn test_direct_drops_measurements_over_threshold() {
    let cameras = four_cameras();
    let initializer = LandmarkInitializer::new(&cameras, direct_options(1e-3)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let p_w = synthetic_points()[0];
    let track = track_with_outlier(&cameras, &p_w, 2, DVec2::new(40.0, 0.0));

    let result = initializer.triangulate(&track, &mut rng);
    assert_eq!(result.exit_code, TriangulationExitCode::Success);
    // every view absorbs part of the outlier, so the tight threshold keeps none
    let landmark = result.track.unwrap();
    assert!(landmark.number_measurements() < 4);
    assert!(result.avg_reprojection_error > 1e-3);
}

#[test]
fn test_cheirality_failure() {
    let mut cameras = three_cameras();
    cameras.insert(3, camera_at(0.0, 0.0, 12.0));
    let initializer = LandmarkInitializer::new(&cameras, direct_options(5.0)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let p_w = synthetic_points()[0];

    let result = initializer.triangulate(&track_of(&cameras, &p_w), &mut rng);
    assert!(result.track.is_none());
    assert!(result.cheirality_failure);
    assert_eq!(result.exit_code, TriangulationExitCode::CheiralityFailure);
}

#[test]
fn test_missing_camera() {
    let cameras = three_cameras();
    let initializer = LandmarkInitializer::new(&cameras, direct_options(5.0)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let mut measurements = track_of(&cameras, &synthetic_points()[0])
        .measurements()
        .to_vec();
    measurements.push(SfmMeasurement {
        image: 7,
        keypoint: 0,
        uv: DVec2::new(320.0, 240.0),
    });

    let result = initializer.triangulate(&SfmTrack2d::new(measurements), &mut rng);
    assert!(result.track.is_none());
    assert!(!result.cheirality_failure);
    assert_eq!(result.exit_code, TriangulationExitCode::MissingCamera);
}

#[test]
fn test_single_measurement() {
    let cameras = three_cameras();
    let initializer = LandmarkInitializer::new(&cameras, direct_options(5.0)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let track = SfmTrack2d::new(vec![SfmMeasurement {
        image: 0,
        keypoint: 0,
        uv: DVec2::new(320.0, 240.0),
    }]);

    let result = initializer.triangulate(&track, &mut rng);
    assert!(result.track.is_none());
    assert!(result.avg_reprojection_error.is_nan());
    assert_eq!(result.exit_code, TriangulationExitCode::PosesUnderconstrained);
}

#[test]
fn test_coincident_centers_are_degenerate() {
    let cameras = BTreeMap::from([(0, camera_at(0.0, 0.0, 0.0)), (1, camera_at(0.0, 0.0, 0.0))]);
    let initializer = LandmarkInitializer::new(&cameras, direct_options(5.0)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let m = |image| SfmMeasurement {
        image,
        keypoint: 0,
        uv: DVec2::new(350.0, 200.0),
    };

    let result = initializer.triangulate(&SfmTrack2d::new(vec![m(0), m(1)]), &mut rng);
    assert!(result.track.is_none());
    assert!(!result.cheirality_failure);
    assert_eq!(result.exit_code, TriangulationExitCode::Degenerate);
}

#[test]
fn test_ransac_requires_hypotheses() {
    let cameras = three_cameras();
    let mut options = ransac_options(1, SamplingMode::Uniform);
    options.num_ransac_hypotheses = None;
    assert!(matches!(
        LandmarkInitializer::new(&cameras, options),
        Err(DataAssociationError::MissingRansacHypotheses)
    ));
    options.num_ransac_hypotheses = Some(0);
    assert!(matches!(
        LandmarkInitializer::new(&cameras, options),
        Err(DataAssociationError::ZeroRansacHypotheses)
    ));
}

#[test]
fn test_ransac_rejects_outlier() {
    let cameras = four_cameras();
    let initializer =
        LandmarkInitializer::new(&cameras, ransac_options(6, SamplingMode::Uniform)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let p_w = synthetic_points()[0];
    let track = track_with_outlier(&cameras, &p_w, 1, DVec2::new(50.0, -30.0));

    let result = initializer.triangulate(&track, &mut rng);
    assert_eq!(result.exit_code, TriangulationExitCode::Success);
    let landmark = result.track.unwrap();
    let images: Vec<usize> = landmark.measurements().iter().map(|m| m.image).collect();
    assert_eq!(images, vec![0, 2, 3]);
    assert_point_near(landmark.point3(), &p_w, 1e-6);
    assert!(result.avg_reprojection_error < 1e-6);
}

#[test]
fn test_ransac_is_deterministic_for_a_seed() {
    let cameras = four_cameras();
    let initializer =
        LandmarkInitializer::new(&cameras, ransac_options(2, SamplingMode::Uniform)).unwrap();
    let p_w = synthetic_points()[2];
    let track = track_with_outlier(&cameras, &p_w, 3, DVec2::new(-25.0, 10.0));

    let a = initializer.triangulate(&track, &mut ChaCha8Rng::seed_from_u64(7));
    let b = initializer.triangulate(&track, &mut ChaCha8Rng::seed_from_u64(7));
    assert_eq!(a.exit_code, b.exit_code);
    assert_eq!(a.track, b.track);
}

#[test]
fn test_ransac_baseline_sampling() {
    let cameras = four_cameras();
    let p_w = synthetic_points()[3];
    let track = track_of(&cameras, &p_w);
    for sampling_mode in [SamplingMode::BaselineWeighted, SamplingMode::TopKBaselines] {
        let initializer =
            LandmarkInitializer::new(&cameras, ransac_options(3, sampling_mode)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = initializer.triangulate(&track, &mut rng);
        assert_eq!(result.exit_code, TriangulationExitCode::Success);
        let landmark = result.track.unwrap();
        assert_eq!(landmark.number_measurements(), 4);
        assert_point_near(landmark.point3(), &p_w, 1e-6);
    }
}

#[test]
fn test_ransac_without_consensus() {
    // two views that disagree by far more than the threshold
    let cameras = BTreeMap::from([(0, camera_at(-1.0, 0.0, 0.0)), (1, camera_at(1.0, 0.0, 0.0))]);
    let initializer =
        LandmarkInitializer::new(&cameras, ransac_options(1, SamplingMode::Uniform)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let p_w = na::Point3::new(0.0, 0.0, 5.0);
    let track = track_with_outlier(&cameras, &p_w, 1, DVec2::new(0.0, 80.0));

    let result = initializer.triangulate(&track, &mut rng);
    assert!(result.track.is_none());
    assert_eq!(result.exit_code, TriangulationExitCode::InliersUnderconstrained);
}

#[test]
fn test_keypoint_on_image_border() {
    let cameras = BTreeMap::from([(0, camera_at(-1.0, 0.0, 0.0)), (1, camera_at(1.0, 0.0, 0.0))]);
    let initializer = LandmarkInitializer::new(&cameras, direct_options(1.0)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    // lands inside the last pixel column of image 0
    let p_w = na::Point3::new(2.194, 0.0, 5.0);
    let track = track_of(&cameras, &p_w);
    assert!((track.measurements()[0].uv.x - 639.4).abs() < 1e-9);
    assert!((track.measurements()[1].uv.x - 439.4).abs() < 1e-9);

    let result = initializer.triangulate(&track, &mut rng);
    assert_eq!(result.exit_code, TriangulationExitCode::Success);
    let landmark = result.track.unwrap();
    assert_eq!(landmark.number_measurements(), 2);
    assert_point_near(landmark.point3(), &p_w, 1e-6);
}

#[test]
fn test_bearing_outside_image() {
    let camera = camera_at(0.0, 0.0, 0.0);
    for uv in [na::Vector2::new(-0.3, 240.0), na::Vector2::new(320.0, 479.8)] {
        let b = camera.bearing(&uv).unwrap();
        assert!((b.norm() - 1.0).abs() < 1e-12);
        assert!(b.z > 0.0);
    }
}

#[test]
fn test_weighted_sampling_with_zero_baselines() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for baselines in [vec![0.0; 3], vec![0.0, 1.5, 0.0]] {
        let mut idxs = sample_view_pairs(SamplingMode::BaselineWeighted, &baselines, 2, &mut rng);
        assert_eq!(idxs.len(), 2);
        idxs.sort();
        idxs.dedup();
        assert_eq!(idxs.len(), 2);
        assert!(idxs.iter().all(|&i| i < 3));
    }
}

#[test]
fn test_top_k_sampling_order() {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let idxs = sample_view_pairs(SamplingMode::TopKBaselines, &[0.5, 2.0, 1.0, 0.1], 2, &mut rng);
    assert_eq!(idxs, vec![1, 2]);
}
