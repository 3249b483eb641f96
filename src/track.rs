//! Track generation from pairwise correspondences.
//!
//! Every `(image, keypoint)` observation is a node in an arena. Each
//! correspondence joins two nodes, and every connected component becomes one
//! candidate track.

use std::collections::{BTreeMap, HashMap};

use disjoint_sets::UnionFind;
use glam::DVec2;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{DataAssociationError, Result};
use crate::keypoints::Keypoints;

/// Matches per image pair `(i1, i2)` with `i1 < i2`. Each entry `(k1, k2)` says
/// keypoint `k1` of `i1` matches keypoint `k2` of `i2`.
pub type CorrespondenceMap = BTreeMap<(usize, usize), Vec<(usize, usize)>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SfmMeasurement {
    pub image: usize,
    pub keypoint: usize,
    pub uv: DVec2,
}

/// Observations of a single physical point across images.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SfmTrack2d {
    measurements: Vec<SfmMeasurement>,
}

impl SfmTrack2d {
    pub fn new(measurements: Vec<SfmMeasurement>) -> SfmTrack2d {
        SfmTrack2d { measurements }
    }

    pub fn measurements(&self) -> &[SfmMeasurement] {
        &self.measurements
    }

    pub fn number_measurements(&self) -> usize {
        self.measurements.len()
    }

    /// A track is valid when no image contributes more than one measurement.
    pub fn is_valid(&self) -> bool {
        self.measurements.iter().map(|m| m.image).all_unique()
    }

    /// Keeps the measurements whose mask entry is `true`.
    pub fn select_subset(&self, mask: &[bool]) -> SfmTrack2d {
        SfmTrack2d {
            measurements: self
                .measurements
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(m, _)| *m)
                .collect(),
        }
    }
}

pub struct TrackGeneration {
    pub tracks: Vec<SfmTrack2d>,
    /// Components dropped because two of their nodes came from the same image.
    pub num_inconsistent: usize,
}

#[derive(Default)]
struct NodeArena {
    keys: Vec<(usize, usize)>,
    ids: HashMap<(usize, usize), usize>,
}

impl NodeArena {
    fn node(&mut self, image: usize, keypoint: usize) -> usize {
        *self.ids.entry((image, keypoint)).or_insert_with(|| {
            self.keys.push((image, keypoint));
            self.keys.len() - 1
        })
    }
}

fn check_keypoint(keypoints: &[Keypoints], image: usize, keypoint: usize) -> Result<()> {
    let num_keypoints = keypoints[image].len();
    if keypoint >= num_keypoints {
        return Err(DataAssociationError::KeypointIndexOutOfRange {
            image,
            keypoint,
            num_keypoints,
        });
    }
    Ok(())
}

/// Builds tracks and reports how many components were inconsistent.
///
/// Output order follows the first node of each component, where nodes are
/// numbered in the order they are met while walking pairs in ascending order.
pub fn generate_tracks_with_diagnostics(
    corr_idxs_by_pair: &CorrespondenceMap,
    keypoints_by_image: &[Keypoints],
) -> Result<TrackGeneration> {
    let num_images = keypoints_by_image.len();
    let mut arena = NodeArena::default();
    let mut edges = Vec::new();

    for (&(i1, i2), corr_idxs) in corr_idxs_by_pair {
        if i1 >= i2 {
            return Err(DataAssociationError::UnorderedImagePair { i1, i2 });
        }
        if i2 >= num_images {
            return Err(DataAssociationError::ImageIndexOutOfRange {
                image: i2,
                num_images,
            });
        }
        for &(k1, k2) in corr_idxs {
            check_keypoint(keypoints_by_image, i1, k1)?;
            check_keypoint(keypoints_by_image, i2, k2)?;
            edges.push((arena.node(i1, k1), arena.node(i2, k2)));
        }
    }

    let mut uf = UnionFind::new(arena.keys.len());
    for (n1, n2) in edges {
        uf.union(n1, n2);
    }

    let mut component_of_root: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<usize>> = Vec::new();
    for node in 0..arena.keys.len() {
        let root = uf.find(node);
        let c = *component_of_root.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[c].push(node);
    }

    let mut tracks = Vec::with_capacity(components.len());
    let mut num_inconsistent = 0;
    for nodes in components {
        let measurements: Vec<SfmMeasurement> = nodes
            .iter()
            .map(|&n| arena.keys[n])
            .sorted()
            .map(|(image, keypoint)| SfmMeasurement {
                image,
                keypoint,
                uv: keypoints_by_image[image].coordinates()[keypoint],
            })
            .collect();
        let track = SfmTrack2d::new(measurements);
        if track.is_valid() {
            tracks.push(track);
        } else {
            log::trace!(
                "dropping inconsistent track with {} measurements",
                track.number_measurements()
            );
            num_inconsistent += 1;
        }
    }

    log::debug!(
        "generated {} tracks from {} nodes, dropped {} inconsistent",
        tracks.len(),
        arena.keys.len(),
        num_inconsistent
    );
    Ok(TrackGeneration {
        tracks,
        num_inconsistent,
    })
}

/// Merges pairwise correspondences into 2D tracks.
pub fn generate_tracks(
    corr_idxs_by_pair: &CorrespondenceMap,
    keypoints_by_image: &[Keypoints],
) -> Result<Vec<SfmTrack2d>> {
    generate_tracks_with_diagnostics(corr_idxs_by_pair, keypoints_by_image).map(|g| g.tracks)
}
