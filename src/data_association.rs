//! Data association: tracks from correspondences, landmarks from tracks.
//!
//! 1. Forms feature tracks from pairwise correspondences.
//! 2. Triangulates a landmark per track against the posed cameras.
//! 3. Keeps landmarks with enough supporting views and collects metrics.

use std::collections::BTreeMap;
use std::time::Instant;

use indicatif::ParallelProgressIterator;
use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::error::{DataAssociationError, Result};
use crate::keypoints::Keypoints;
use crate::scene::{self, Scene, SfmTrack, mean_length};
use crate::track::{CorrespondenceMap, generate_tracks_with_diagnostics};
use crate::triangulation::{
    LandmarkInitializer, SamplingMode, TriangulationExitCode, TriangulationMode,
    TriangulationOptions, TriangulationResult,
};

/// Track lengths reported individually in the metrics.
pub const HISTOGRAM_TRACK_LENGTHS: std::ops::RangeInclusive<usize> = 2..=10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataAssociationConfig {
    /// Maximum reprojection error, in pixels, of a supporting measurement.
    pub reproj_error_thresh: f64,
    /// Minimum number of supporting views of an accepted landmark.
    pub min_track_len: usize,
    pub mode: TriangulationMode,
    /// Required when `mode` is `ransac`.
    #[serde(default)]
    pub num_ransac_hypotheses: Option<usize>,
    #[serde(default)]
    pub sampling_mode: SamplingMode,
    /// Seed of the per-track random generators.
    #[serde(default)]
    pub seed: u64,
}

impl DataAssociationConfig {
    pub fn direct(reproj_error_thresh: f64, min_track_len: usize) -> DataAssociationConfig {
        DataAssociationConfig {
            reproj_error_thresh,
            min_track_len,
            mode: TriangulationMode::Direct,
            num_ransac_hypotheses: None,
            sampling_mode: SamplingMode::Uniform,
            seed: 0,
        }
    }

    pub fn ransac(
        reproj_error_thresh: f64,
        min_track_len: usize,
        num_ransac_hypotheses: usize,
    ) -> DataAssociationConfig {
        DataAssociationConfig {
            mode: TriangulationMode::Ransac,
            num_ransac_hypotheses: Some(num_ransac_hypotheses),
            ..DataAssociationConfig::direct(reproj_error_thresh, min_track_len)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.reproj_error_thresh.is_finite() && self.reproj_error_thresh > 0.0) {
            return Err(DataAssociationError::InvalidReprojectionThreshold(
                self.reproj_error_thresh,
            ));
        }
        if self.min_track_len < 2 {
            return Err(DataAssociationError::MinTrackLengthTooSmall(
                self.min_track_len,
            ));
        }
        if self.mode == TriangulationMode::Ransac {
            match self.num_ransac_hypotheses {
                None => return Err(DataAssociationError::MissingRansacHypotheses),
                Some(0) => return Err(DataAssociationError::ZeroRansacHypotheses),
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn triangulation_options(&self) -> TriangulationOptions {
        TriangulationOptions {
            mode: self.mode,
            reproj_error_thresh: self.reproj_error_thresh,
            num_ransac_hypotheses: self.num_ransac_hypotheses,
            sampling_mode: self.sampling_mode,
        }
    }
}

/// Flat metrics record of one data association run.
///
/// Ratios and means are NaN (JSON `null`) when there are no input tracks.
#[derive(Debug, Clone, Serialize)]
pub struct DataAssociationMetrics {
    pub num_input_tracks: usize,
    pub num_inconsistent_tracks: usize,
    pub mean_2d_track_length: f64,
    pub accepted_tracks_ratio: f64,
    pub track_cheirality_failure_ratio: f64,
    pub num_accepted_tracks: usize,
    pub num_rejected_tracks: usize,
    pub num_cheirality_failures: usize,
    pub mean_3d_track_length: f64,
    pub median_3d_track_length: f64,
    /// `num_len_{k}_tracks` for every k in [`HISTOGRAM_TRACK_LENGTHS`].
    #[serde(flatten)]
    pub track_length_histogram: BTreeMap<String, usize>,
    pub per_rejected_track_avg_errors: Vec<f64>,
    pub per_accepted_track_avg_errors: Vec<f64>,
    pub points_3d: Vec<[f64; 3]>,
    pub exit_code_counts: BTreeMap<TriangulationExitCode, usize>,
}

impl DataAssociationMetrics {
    pub fn histogram_key(track_len: usize) -> String {
        format!("num_len_{}_tracks", track_len)
    }

    /// Number of accepted tracks with exactly `track_len` measurements.
    pub fn num_tracks_of_length(&self, track_len: usize) -> Option<usize> {
        self.track_length_histogram
            .get(&Self::histogram_key(track_len))
            .copied()
    }
}

/// Partial result of a worker, merged with [`TrackAggregate::merge`].
#[derive(Default)]
struct TrackAggregate {
    accepted: Vec<SfmTrack>,
    per_accepted_track_avg_errors: Vec<f64>,
    per_rejected_track_avg_errors: Vec<f64>,
    num_cheirality_failures: usize,
    exit_code_counts: BTreeMap<TriangulationExitCode, usize>,
}

impl TrackAggregate {
    fn push(mut self, result: TriangulationResult, min_track_len: usize) -> TrackAggregate {
        if result.cheirality_failure {
            self.num_cheirality_failures += 1;
        }
        let exit_code = match result.track {
            Some(track) if track.number_measurements() >= min_track_len => {
                self.accepted.push(track);
                self.per_accepted_track_avg_errors
                    .push(result.avg_reprojection_error);
                result.exit_code
            }
            Some(_) => {
                self.per_rejected_track_avg_errors
                    .push(result.avg_reprojection_error);
                TriangulationExitCode::InsufficientSupport
            }
            None => {
                self.per_rejected_track_avg_errors
                    .push(result.avg_reprojection_error);
                result.exit_code
            }
        };
        *self.exit_code_counts.entry(exit_code).or_insert(0) += 1;
        self
    }

    fn merge(mut self, other: TrackAggregate) -> TrackAggregate {
        self.accepted.extend(other.accepted);
        self.per_accepted_track_avg_errors
            .extend(other.per_accepted_track_avg_errors);
        self.per_rejected_track_avg_errors
            .extend(other.per_rejected_track_avg_errors);
        self.num_cheirality_failures += other.num_cheirality_failures;
        for (code, count) in other.exit_code_counts {
            *self.exit_code_counts.entry(code).or_insert(0) += count;
        }
        self
    }
}

/// Random generator of one track, independent of how tracks are scheduled.
fn track_rng(seed: u64, track_idx: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(track_idx as u64);
    rng
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        f64::NAN
    } else {
        count as f64 / total as f64
    }
}

pub struct DataAssociation {
    config: DataAssociationConfig,
}

impl DataAssociation {
    pub fn new(config: DataAssociationConfig) -> Result<DataAssociation> {
        config.validate()?;
        Ok(DataAssociation { config })
    }

    pub fn config(&self) -> &DataAssociationConfig {
        &self.config
    }

    /// Runs data association and assembles the scene.
    ///
    /// Fails on non-contiguous camera indices or malformed correspondences.
    /// Tracks that cannot be triangulated are only counted.
    pub fn run(
        &self,
        cameras: BTreeMap<usize, Camera>,
        corr_idxs_by_pair: &CorrespondenceMap,
        keypoints_by_image: &[Keypoints],
    ) -> Result<(Scene, DataAssociationMetrics)> {
        let now = Instant::now();
        scene::check_camera_indices(&cameras)?;

        let generation = generate_tracks_with_diagnostics(corr_idxs_by_pair, keypoints_by_image)?;
        let tracks_2d = generation.tracks;
        let num_input_tracks = tracks_2d.len();
        let lengths_2d: Vec<usize> = tracks_2d.iter().map(|t| t.number_measurements()).collect();
        let mean_2d_track_length = mean_length(&lengths_2d);
        debug!("[data association] input number of tracks: {}", num_input_tracks);
        debug!("[data association] input avg. track length: {}", mean_2d_track_length);

        let initializer =
            LandmarkInitializer::new(&cameras, self.config.triangulation_options())?;
        let seed = self.config.seed;
        let min_track_len = self.config.min_track_len;
        let aggregate = tracks_2d
            .par_iter()
            .enumerate()
            .progress_count(num_input_tracks as u64)
            .fold(TrackAggregate::default, |acc, (idx, track)| {
                let mut rng = track_rng(seed, idx);
                acc.push(initializer.triangulate(track, &mut rng), min_track_len)
            })
            .reduce(TrackAggregate::default, TrackAggregate::merge);

        let num_accepted_tracks = aggregate.accepted.len();
        let points_3d = aggregate
            .accepted
            .iter()
            .map(|t| [t.point3().x, t.point3().y, t.point3().z])
            .collect();
        let scene = scene::assemble(cameras, aggregate.accepted)?;
        let (mean_3d_track_length, median_3d_track_length, lengths_3d) =
            scene.track_length_statistics();
        let track_length_histogram = HISTOGRAM_TRACK_LENGTHS
            .map(|len| {
                (
                    DataAssociationMetrics::histogram_key(len),
                    lengths_3d.iter().filter(|&&l| l == len).count(),
                )
            })
            .collect();

        debug!("[data association] output number of tracks: {}", num_accepted_tracks);
        debug!("[data association] output avg. track length: {}", mean_3d_track_length);
        debug!(
            "[data association] took {:.6} sec",
            now.elapsed().as_secs_f64()
        );

        let metrics = DataAssociationMetrics {
            num_input_tracks,
            num_inconsistent_tracks: generation.num_inconsistent,
            mean_2d_track_length,
            accepted_tracks_ratio: ratio(num_accepted_tracks, num_input_tracks),
            track_cheirality_failure_ratio: ratio(
                aggregate.num_cheirality_failures,
                num_input_tracks,
            ),
            num_accepted_tracks,
            num_rejected_tracks: num_input_tracks - num_accepted_tracks,
            num_cheirality_failures: aggregate.num_cheirality_failures,
            mean_3d_track_length,
            median_3d_track_length,
            track_length_histogram,
            per_rejected_track_avg_errors: aggregate.per_rejected_track_avg_errors,
            per_accepted_track_avg_errors: aggregate.per_accepted_track_avg_errors,
            points_3d,
            exit_code_counts: aggregate.exit_code_counts,
        };
        Ok((scene, metrics))
    }
}
