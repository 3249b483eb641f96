use thiserror::Error;

/// Fatal errors of the data association stage.
///
/// These indicate an upstream contract violation. Failures of a single track
/// (degenerate geometry, cheirality, too few inliers) are never reported here,
/// they are counted through [`crate::triangulation::TriangulationExitCode`].
#[derive(Debug, Error)]
pub enum DataAssociationError {
    #[error("camera indices are not contiguous: expected index {expected}, found {found}")]
    NonContiguousCameras { expected: usize, found: usize },
    #[error("ransac triangulation requires num_ransac_hypotheses")]
    MissingRansacHypotheses,
    #[error("num_ransac_hypotheses must be positive")]
    ZeroRansacHypotheses,
    #[error("min_track_len must be at least 2, got {0}")]
    MinTrackLengthTooSmall(usize),
    #[error("reprojection error threshold must be positive and finite, got {0}")]
    InvalidReprojectionThreshold(f64),
    #[error("image pair ({i1}, {i2}) is not ordered with i1 < i2")]
    UnorderedImagePair { i1: usize, i2: usize },
    #[error("image index {image} out of range, only {num_images} keypoint sets given")]
    ImageIndexOutOfRange { image: usize, num_images: usize },
    #[error("keypoint index {keypoint} out of range for image {image} with {num_keypoints} keypoints")]
    KeypointIndexOutOfRange {
        image: usize,
        keypoint: usize,
        num_keypoints: usize,
    },
    #[error("unknown camera model type '{0}'")]
    UnknownCameraModel(String),
    #[error("camera model '{model}' expects {expected} parameters, got {found}")]
    CameraParamCount {
        model: String,
        expected: usize,
        found: usize,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DataAssociationError>;
