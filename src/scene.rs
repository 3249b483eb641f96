use std::collections::BTreeMap;

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, CameraRecord};
use crate::error::{DataAssociationError, Result};
use crate::track::SfmMeasurement;
use crate::triangulation::reprojection_error;

/// A landmark: fitted 3D point plus the measurements that support it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SfmTrack {
    point: na::Point3<f64>,
    measurements: Vec<SfmMeasurement>,
}

impl SfmTrack {
    pub fn new(point: na::Point3<f64>, measurements: Vec<SfmMeasurement>) -> SfmTrack {
        SfmTrack {
            point,
            measurements,
        }
    }

    pub fn point3(&self) -> &na::Point3<f64> {
        &self.point
    }

    pub fn measurements(&self) -> &[SfmMeasurement] {
        &self.measurements
    }

    pub fn number_measurements(&self) -> usize {
        self.measurements.len()
    }
}

/// Cameras and landmarks handed to bundle adjustment.
///
/// `cameras()[i]` is the camera of image `i`.
pub struct Scene {
    cameras: Vec<Camera>,
    tracks: Vec<SfmTrack>,
}

/// Packs cameras and accepted tracks into a [`Scene`].
///
/// Camera indices must be exactly `0..N`. A gap means a camera was dropped
/// upstream and is reported, never patched.
pub fn assemble(cameras: BTreeMap<usize, Camera>, accepted_tracks: Vec<SfmTrack>) -> Result<Scene> {
    check_camera_indices(&cameras)?;
    Ok(Scene {
        cameras: cameras.into_values().collect(),
        tracks: accepted_tracks,
    })
}

/// Fails unless the keys are exactly `0..cameras.len()`.
pub fn check_camera_indices<T>(cameras: &BTreeMap<usize, T>) -> Result<()> {
    for (expected, &found) in cameras.keys().enumerate() {
        if found != expected {
            return Err(DataAssociationError::NonContiguousCameras { expected, found });
        }
    }
    Ok(())
}

impl Scene {
    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    pub fn camera(&self, idx: usize) -> Option<&Camera> {
        self.cameras.get(idx)
    }

    pub fn tracks(&self) -> &[SfmTrack] {
        &self.tracks
    }

    pub fn number_cameras(&self) -> usize {
        self.cameras.len()
    }

    pub fn number_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn track_lengths(&self) -> Vec<usize> {
        self.tracks.iter().map(|t| t.number_measurements()).collect()
    }

    /// `(mean, median, lengths)` of the track lengths, NaN for an empty scene.
    pub fn track_length_statistics(&self) -> (f64, f64, Vec<usize>) {
        let lengths = self.track_lengths();
        (mean_length(&lengths), median_length(&lengths), lengths)
    }

    /// Mean reprojection error over every measurement of every track.
    pub fn average_reprojection_error(&self) -> f64 {
        let errors: Vec<f64> = self
            .tracks
            .iter()
            .flat_map(|t| {
                t.measurements().iter().filter_map(move |m| {
                    let camera = self.cameras.get(m.image)?;
                    Some(reprojection_error(
                        camera,
                        t.point3(),
                        &na::Vector2::new(m.uv.x, m.uv.y),
                    ))
                })
            })
            .collect();
        if errors.is_empty() {
            return f64::NAN;
        }
        errors.iter().sum::<f64>() / errors.len() as f64
    }

    pub fn to_record(&self) -> Result<SceneRecord> {
        Ok(SceneRecord {
            cameras: self
                .cameras
                .iter()
                .map(Camera::to_record)
                .collect::<Result<Vec<_>>>()?,
            tracks: self.tracks.clone(),
        })
    }
}

pub(crate) fn mean_length(lengths: &[usize]) -> f64 {
    if lengths.is_empty() {
        return f64::NAN;
    }
    lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
}

fn median_length(lengths: &[usize]) -> f64 {
    if lengths.is_empty() {
        return f64::NAN;
    }
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    }
}

/// Serialized scene, cameras in index order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneRecord {
    pub cameras: Vec<CameraRecord>,
    pub tracks: Vec<SfmTrack>,
}
