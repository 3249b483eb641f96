//! Landmark initialization: a 3D point for each 2D track.
//!
//! Two modes are available. `Direct` solves one linear DLT over all
//! measurements. `Ransac` scores two-view hypotheses by inlier count and
//! re-solves over the winning inlier set.
//!
//! References: R. Hartley and P. Sturm, "Triangulation", CVIU 68(2), 1997.

use std::collections::BTreeMap;

use itertools::Itertools;
use log::trace;
use nalgebra as na;
use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::error::{DataAssociationError, Result};
use crate::scene::SfmTrack;
use crate::track::SfmTrack2d;

/// Relative singular value below which the DLT system is treated as rank deficient.
const RANK_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriangulationMode {
    Direct,
    Ransac,
}

/// How two-view hypotheses are drawn in `Ransac` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Every measurement pair is equally likely.
    #[default]
    Uniform,
    /// Pairs are drawn with probability proportional to their camera baseline.
    BaselineWeighted,
    /// The pairs with the largest baselines, no randomness.
    TopKBaselines,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriangulationExitCode {
    Success,
    CheiralityFailure,
    /// Fewer than two measurements.
    PosesUnderconstrained,
    /// The best hypothesis is supported by fewer than two measurements.
    InliersUnderconstrained,
    /// Near-parallel rays or a non-finite solution.
    Degenerate,
    /// A measurement refers to an image without a camera.
    MissingCamera,
    /// Triangulated, but fewer supporting measurements than `min_track_len`.
    InsufficientSupport,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriangulationOptions {
    pub mode: TriangulationMode,
    pub reproj_error_thresh: f64,
    pub num_ransac_hypotheses: Option<usize>,
    pub sampling_mode: SamplingMode,
}

#[derive(Debug, Clone)]
pub struct TriangulationResult {
    /// Fitted landmark, `None` when triangulation was rejected.
    pub track: Option<SfmTrack>,
    /// Mean pixel error over the measurements used in the final solve.
    /// NaN when no point could be computed.
    pub avg_reprojection_error: f64,
    pub cheirality_failure: bool,
    pub exit_code: TriangulationExitCode,
}

impl TriangulationResult {
    fn rejected(exit_code: TriangulationExitCode) -> TriangulationResult {
        TriangulationResult {
            track: None,
            avg_reprojection_error: f64::NAN,
            cheirality_failure: false,
            exit_code,
        }
    }
}

/// Linear triangulation from bearings of calibrated, posed cameras.
///
/// Each view contributes the two rows of `b x (P X) = 0`, where `b` is the
/// undistorted bearing and `P = [R | t]` maps world to camera. Returns `None`
/// for rank-deficient systems, points at infinity and unprojectable pixels.
pub fn triangulate_dlt(views: &[(&Camera, na::Vector2<f64>)]) -> Option<na::Point3<f64>> {
    if views.len() < 2 {
        return None;
    }
    let mut a = na::DMatrix::<f64>::zeros(2 * views.len(), 4);
    for (i, (camera, uv)) in views.iter().enumerate() {
        let b = camera.bearing(uv)?;
        let p = camera.camera_from_world().to_homogeneous();
        let row0 = p.row(0);
        let row1 = p.row(1);
        let row2 = p.row(2);
        a.row_mut(2 * i).copy_from(&(row2 * b.x - row0 * b.z));
        a.row_mut(2 * i + 1).copy_from(&(row2 * b.y - row1 * b.z));
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let singular_values: Vec<f64> = svd
        .singular_values
        .iter()
        .copied()
        .sorted_by(|a, b| b.total_cmp(a))
        .collect();
    if singular_values[0] <= 0.0 || singular_values[2] / singular_values[0] < RANK_TOLERANCE {
        trace!("rank deficient dlt system {:?}", singular_values);
        return None;
    }
    let x_h = v_t.row(svd.singular_values.imin());
    let w = x_h[3];
    if w.abs() <= f64::EPSILON * x_h.norm() {
        return None;
    }
    let point = na::Point3::new(x_h[0] / w, x_h[1] / w, x_h[2] / w);
    point.coords.iter().all(|v| v.is_finite()).then_some(point)
}

/// Pixel distance between the projection of `p_w` and `uv`.
///
/// Points behind the camera are projected anyway so diagnostics stay
/// available. Non-finite projections give `f64::INFINITY`.
pub fn reprojection_error(camera: &Camera, p_w: &na::Point3<f64>, uv: &na::Vector2<f64>) -> f64 {
    let err = (camera.project_unchecked(p_w) - uv).norm();
    if err.is_finite() { err } else { f64::INFINITY }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

type View<'c> = (&'c Camera, na::Vector2<f64>);

/// Computes a landmark for each 2D track against a fixed set of cameras.
pub struct LandmarkInitializer<'a> {
    cameras: &'a BTreeMap<usize, Camera>,
    options: TriangulationOptions,
}

impl<'a> LandmarkInitializer<'a> {
    pub fn new(
        cameras: &'a BTreeMap<usize, Camera>,
        options: TriangulationOptions,
    ) -> Result<LandmarkInitializer<'a>> {
        if options.mode == TriangulationMode::Ransac {
            match options.num_ransac_hypotheses {
                None => return Err(DataAssociationError::MissingRansacHypotheses),
                Some(0) => return Err(DataAssociationError::ZeroRansacHypotheses),
                Some(_) => {}
            }
        }
        Ok(LandmarkInitializer { cameras, options })
    }

    pub fn options(&self) -> &TriangulationOptions {
        &self.options
    }

    /// Triangulates one track.
    ///
    /// `rng` is only used in `Ransac` mode with random sampling.
    pub fn triangulate<R: Rng + ?Sized>(
        &self,
        track: &SfmTrack2d,
        rng: &mut R,
    ) -> TriangulationResult {
        let views: Option<Vec<View>> = track
            .measurements()
            .iter()
            .map(|m| {
                self.cameras
                    .get(&m.image)
                    .map(|c| (c, na::Vector2::new(m.uv.x, m.uv.y)))
            })
            .collect();
        let Some(views) = views else {
            log::warn!("track refers to an image without a camera, skipping");
            return TriangulationResult::rejected(TriangulationExitCode::MissingCamera);
        };
        if views.len() < 2 {
            return TriangulationResult::rejected(TriangulationExitCode::PosesUnderconstrained);
        }

        let inlier_mask = match self.options.mode {
            TriangulationMode::Direct => vec![true; views.len()],
            TriangulationMode::Ransac => match self.ransac_inlier_mask(&views, rng) {
                Some(mask) => mask,
                None => {
                    return TriangulationResult::rejected(
                        TriangulationExitCode::InliersUnderconstrained,
                    );
                }
            },
        };
        let inlier_track = track.select_subset(&inlier_mask);
        let inlier_views: Vec<View> = views
            .iter()
            .zip(&inlier_mask)
            .filter(|(_, keep)| **keep)
            .map(|(v, _)| *v)
            .collect();
        if inlier_views.len() < 2 {
            return TriangulationResult::rejected(TriangulationExitCode::InliersUnderconstrained);
        }

        let Some(point) = triangulate_dlt(&inlier_views) else {
            return TriangulationResult::rejected(TriangulationExitCode::Degenerate);
        };

        let errors: Vec<f64> = inlier_views
            .iter()
            .map(|(camera, uv)| reprojection_error(camera, &point, uv))
            .collect();
        let avg_reprojection_error = mean(&errors);

        if inlier_views.iter().any(|(camera, _)| camera.depth(&point) <= 0.0) {
            trace!("cheirality failure at {:?}", point);
            return TriangulationResult {
                track: None,
                avg_reprojection_error,
                cheirality_failure: true,
                exit_code: TriangulationExitCode::CheiralityFailure,
            };
        }

        let supporting = inlier_track.select_subset(
            &errors
                .iter()
                .map(|e| *e < self.options.reproj_error_thresh)
                .collect::<Vec<_>>(),
        );
        TriangulationResult {
            track: Some(SfmTrack::new(point, supporting.measurements().to_vec())),
            avg_reprojection_error,
            cheirality_failure: false,
            exit_code: TriangulationExitCode::Success,
        }
    }

    /// Picks the two-view hypothesis with the most inliers, ties broken by the
    /// lower mean inlier error. `None` if no hypothesis has two inliers.
    fn ransac_inlier_mask<R: Rng + ?Sized>(
        &self,
        views: &[View],
        rng: &mut R,
    ) -> Option<Vec<bool>> {
        let pairs: Vec<(usize, usize)> = (0..views.len()).tuple_combinations().collect();
        let num_hypotheses = self
            .options
            .num_ransac_hypotheses
            .unwrap_or(1)
            .min(pairs.len());
        let baselines: Vec<f64> = pairs
            .iter()
            .map(|&(k1, k2)| (views[k1].0.center() - views[k2].0.center()).norm())
            .collect();
        let sample_idxs =
            sample_view_pairs(self.options.sampling_mode, &baselines, num_hypotheses, rng);

        let mut best_votes = 0;
        let mut best_error = f64::INFINITY;
        let mut best_mask = None;
        for idx in sample_idxs {
            let (k1, k2) = pairs[idx];
            let Some(point) = triangulate_dlt(&[views[k1], views[k2]]) else {
                continue;
            };
            if views[k1].0.depth(&point) <= 0.0 || views[k2].0.depth(&point) <= 0.0 {
                continue;
            }
            let errors: Vec<f64> = views
                .iter()
                .map(|(camera, uv)| {
                    if camera.depth(&point) <= 0.0 {
                        f64::INFINITY
                    } else {
                        reprojection_error(camera, &point, uv)
                    }
                })
                .collect();
            let mask: Vec<bool> = errors
                .iter()
                .map(|e| *e < self.options.reproj_error_thresh)
                .collect();
            let inlier_errors: Vec<f64> = errors
                .iter()
                .zip(&mask)
                .filter(|(_, inlier)| **inlier)
                .map(|(e, _)| *e)
                .collect();
            let votes = inlier_errors.len();
            let error = mean(&inlier_errors);
            if votes > best_votes || (votes == best_votes && error < best_error) {
                best_votes = votes;
                best_error = error;
                best_mask = Some(mask);
            }
        }
        if best_votes < 2 {
            return None;
        }
        best_mask
    }
}

/// Picks `amount` distinct pair indices given the baseline of each pair.
///
/// `BaselineWeighted` falls back to uniform sampling when fewer than `amount`
/// pairs have a positive baseline.
pub fn sample_view_pairs<R: Rng + ?Sized>(
    sampling_mode: SamplingMode,
    baselines: &[f64],
    amount: usize,
    rng: &mut R,
) -> Vec<usize> {
    let amount = amount.min(baselines.len());
    match sampling_mode {
        SamplingMode::Uniform => index::sample(rng, baselines.len(), amount).into_vec(),
        SamplingMode::BaselineWeighted => {
            match index::sample_weighted(rng, baselines.len(), |i| baselines[i], amount) {
                Ok(idxs) if idxs.len() == amount => idxs.into_vec(),
                Ok(idxs) => {
                    trace!(
                        "only {} of {} pairs have a baseline, using uniform",
                        idxs.len(),
                        amount
                    );
                    index::sample(rng, baselines.len(), amount).into_vec()
                }
                Err(e) => {
                    trace!("baseline weighted sampling failed ({}), using uniform", e);
                    index::sample(rng, baselines.len(), amount).into_vec()
                }
            }
        }
        SamplingMode::TopKBaselines => (0..baselines.len())
            .sorted_by(|&a, &b| baselines[b].total_cmp(&baselines[a]))
            .take(amount)
            .collect(),
    }
}
