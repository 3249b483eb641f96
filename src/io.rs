use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::camera::{Camera, CameraRecord};
use crate::data_association::{DataAssociationMetrics, HISTOGRAM_TRACK_LENGTHS};
use crate::error::Result;
use crate::keypoints::Keypoints;
use crate::scene::Scene;
use crate::track::CorrespondenceMap;

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize, P: AsRef<Path>>(output_path: P, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned, P: AsRef<Path>>(file_path: P) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairCorrespondences {
    pub i1: usize,
    pub i2: usize,
    pub idxs: Vec<[usize; 2]>,
}

/// Outputs of the matching and pose estimation stages, as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataAssociationInput {
    /// Camera of each image, keyed by image index.
    pub cameras: BTreeMap<usize, CameraRecord>,
    pub keypoints: Vec<Keypoints>,
    pub correspondences: Vec<PairCorrespondences>,
}

impl DataAssociationInput {
    pub fn cameras(&self) -> Result<BTreeMap<usize, Camera>> {
        self.cameras
            .iter()
            .map(|(&i, record)| Ok((i, Camera::from_record(record)?)))
            .collect()
    }

    /// Correspondences keyed by image pair. Repeated pairs are concatenated.
    pub fn correspondence_map(&self) -> CorrespondenceMap {
        let mut map = CorrespondenceMap::new();
        for pair in &self.correspondences {
            map.entry((pair.i1, pair.i2))
                .or_insert_with(Vec::new)
                .extend(pair.idxs.iter().map(|[k1, k2]| (*k1, *k2)));
        }
        map
    }
}

pub fn write_scene<P: AsRef<Path>>(output_path: P, scene: &Scene) -> Result<()> {
    object_to_json(output_path, &scene.to_record()?)
}

/// Writes a human readable summary of a data association run.
pub fn write_report<P: AsRef<Path>>(
    output_path: P,
    scene: &Scene,
    metrics: &DataAssociationMetrics,
) -> Result<()> {
    let timestamp = time::OffsetDateTime::now_local()
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let mut s = String::new();
    s += format!("Data association report ({})\n\n", timestamp).as_str();
    s += format!("cameras: {}\n", scene.number_cameras()).as_str();
    s += format!("input tracks: {}\n", metrics.num_input_tracks).as_str();
    s += format!("inconsistent tracks dropped: {}\n", metrics.num_inconsistent_tracks).as_str();
    s += format!("accepted tracks: {}\n", metrics.num_accepted_tracks).as_str();
    s += format!("    accepted ratio: {:.3}\n", metrics.accepted_tracks_ratio).as_str();
    s += format!(
        "    cheirality failure ratio: {:.3}\n",
        metrics.track_cheirality_failure_ratio
    )
    .as_str();
    s += format!("    mean 2d track length: {:.3}\n", metrics.mean_2d_track_length).as_str();
    s += format!("    mean 3d track length: {:.3}\n", metrics.mean_3d_track_length).as_str();
    s += format!("    median 3d track length: {:.1}\n", metrics.median_3d_track_length).as_str();
    s += format!(
        "    average reprojection error: {:.5} px\n\n",
        scene.average_reprojection_error()
    )
    .as_str();
    s += "track lengths:\n";
    for len in HISTOGRAM_TRACK_LENGTHS {
        let count = metrics.num_tracks_of_length(len).unwrap_or(0);
        s += format!("    {:>2}: {}\n", len, count).as_str();
    }
    s += "\nexit codes:\n";
    for (code, count) in &metrics.exit_code_counts {
        s += format!("    {:?}: {}\n", code, count).as_str();
    }
    std::fs::write(output_path, s)?;
    Ok(())
}
