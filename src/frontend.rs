//! Front-end capability interface.
//!
//! Feature detection and description happen upstream of data association. This
//! module only fixes the shape of that collaborator: one required operation on
//! the trait, and free helpers that work on its output.

use image::{DynamicImage, GrayImage};
use nalgebra as na;

use crate::keypoints::Keypoints;

/// `N x D` descriptor matrix, one row per keypoint.
pub type Descriptors = na::DMatrix<f32>;

pub trait DetectorDescriptor: Sync {
    /// Upper bound on the number of keypoints returned per image.
    fn max_keypoints(&self) -> usize;

    /// Detects keypoints and computes one descriptor row per keypoint.
    fn detect_and_describe(&self, image: &DynamicImage) -> (Keypoints, Descriptors);
}

/// Keeps the `max_keypoints` strongest keypoints, sorted by descending response.
///
/// Inputs without responses are returned unchanged.
pub fn filter_by_response(
    keypoints: &Keypoints,
    descriptors: &Descriptors,
    max_keypoints: usize,
) -> (Keypoints, Descriptors) {
    let Some(responses) = keypoints.responses() else {
        return (keypoints.clone(), descriptors.clone());
    };
    let mut sort_idxs: Vec<usize> = (0..responses.len()).collect();
    sort_idxs.sort_by(|&a, &b| responses[b].total_cmp(&responses[a]));
    sort_idxs.truncate(max_keypoints);

    (
        keypoints.extract_indices(&sort_idxs),
        descriptors.select_rows(sort_idxs.iter()),
    )
}

/// Keeps keypoints whose rounded coordinate lands on a non-zero mask pixel.
pub fn filter_by_mask(
    mask: &GrayImage,
    keypoints: &Keypoints,
    descriptors: &Descriptors,
) -> (Keypoints, Descriptors) {
    let valid_idxs: Vec<usize> = keypoints
        .coordinates()
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            if !p.is_finite() {
                return None;
            }
            let (x, y) = (p.x.round(), p.y.round());
            if x < 0.0 || y < 0.0 || x >= mask.width() as f64 || y >= mask.height() as f64 {
                return None;
            }
            (mask.get_pixel(x as u32, y as u32)[0] != 0).then_some(i)
        })
        .collect();

    (
        keypoints.extract_indices(&valid_idxs),
        descriptors.select_rows(valid_idxs.iter()),
    )
}

/// Runs a detector and applies the response filter with its own budget.
pub fn detect_and_filter<D: DetectorDescriptor + ?Sized>(
    detector: &D,
    image: &DynamicImage,
) -> (Keypoints, Descriptors) {
    let (keypoints, descriptors) = detector.detect_and_describe(image);
    log::trace!("detected {} keypoints", keypoints.len());
    filter_by_response(&keypoints, &descriptors, detector.max_keypoints())
}
