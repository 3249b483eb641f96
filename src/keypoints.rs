use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Detected keypoints of one image.
///
/// Coordinates are pixel positions `(x, y)`. Optional per-keypoint scales and
/// responses always have the same length as the coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoints {
    coordinates: Vec<DVec2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scales: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    responses: Option<Vec<f64>>,
}

impl Keypoints {
    pub fn new(coordinates: Vec<DVec2>) -> Keypoints {
        Keypoints {
            coordinates,
            scales: None,
            responses: None,
        }
    }

    /// Attaches responses. Returns `None` if the length does not match.
    pub fn with_responses(self, responses: Vec<f64>) -> Option<Keypoints> {
        if responses.len() != self.coordinates.len() {
            return None;
        }
        Some(Keypoints {
            responses: Some(responses),
            ..self
        })
    }

    /// Attaches scales. Returns `None` if the length does not match.
    pub fn with_scales(self, scales: Vec<f64>) -> Option<Keypoints> {
        if scales.len() != self.coordinates.len() {
            return None;
        }
        Some(Keypoints {
            scales: Some(scales),
            ..self
        })
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    pub fn coordinates(&self) -> &[DVec2] {
        &self.coordinates
    }

    pub fn coordinate(&self, idx: usize) -> Option<DVec2> {
        self.coordinates.get(idx).copied()
    }

    pub fn scales(&self) -> Option<&[f64]> {
        self.scales.as_deref()
    }

    pub fn responses(&self) -> Option<&[f64]> {
        self.responses.as_deref()
    }

    /// Keeps the keypoints at `indices`, in the order given.
    ///
    /// # Panics
    /// Panics if an index is out of range.
    pub fn extract_indices(&self, indices: &[usize]) -> Keypoints {
        let pick = |v: &Vec<f64>| indices.iter().map(|&i| v[i]).collect::<Vec<_>>();
        Keypoints {
            coordinates: indices.iter().map(|&i| self.coordinates[i]).collect(),
            scales: self.scales.as_ref().map(pick),
            responses: self.responses.as_ref().map(pick),
        }
    }
}
