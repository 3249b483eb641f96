pub mod camera;
pub mod data_association;
pub mod error;
pub mod frontend;
pub mod io;
pub mod keypoints;
pub mod scene;
pub mod track;
pub mod triangulation;
pub mod types;

pub use data_association::{DataAssociation, DataAssociationConfig, DataAssociationMetrics};
pub use error::{DataAssociationError, Result};
