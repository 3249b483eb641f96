use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Pose stored as a rotation vector (axis * angle) and a translation.
///
/// Used as the on-disk form of `wTc`, the camera-to-world transform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RvecTvec {
    pub rvec: [f64; 3],
    pub tvec: [f64; 3],
}

impl RvecTvec {
    pub fn new(rvec: &na::Vector3<f64>, tvec: &na::Vector3<f64>) -> RvecTvec {
        RvecTvec {
            rvec: [rvec.x, rvec.y, rvec.z],
            tvec: [tvec.x, tvec.y, tvec.z],
        }
    }
    pub fn na_rvec(&self) -> na::Vector3<f64> {
        na::Vector3::from(self.rvec)
    }
    pub fn na_tvec(&self) -> na::Vector3<f64> {
        na::Vector3::from(self.tvec)
    }
    pub fn to_na_isometry3(&self) -> na::Isometry3<f64> {
        na::Isometry3::new(self.na_tvec(), self.na_rvec())
    }
}

pub trait ToRvecTvec {
    fn to_rvec_tvec(&self) -> RvecTvec;
}

impl ToRvecTvec for na::Isometry3<f64> {
    fn to_rvec_tvec(&self) -> RvecTvec {
        RvecTvec::new(&self.rotation.scaled_axis(), &self.translation.vector)
    }
}
