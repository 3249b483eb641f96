use camera_intrinsic_model::*;
use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{DataAssociationError, Result};
use crate::types::{RvecTvec, ToRvecTvec};

/// A calibrated camera with an absolute pose.
///
/// The pose is `wTc`, mapping points from the camera frame to the world frame.
/// The camera looks down its positive z axis.
pub struct Camera {
    intrinsics: GenericModel<f64>,
    w_t_c: na::Isometry3<f64>,
}

impl Camera {
    pub fn new(intrinsics: GenericModel<f64>, w_t_c: na::Isometry3<f64>) -> Camera {
        Camera { intrinsics, w_t_c }
    }

    /// Pinhole camera without distortion, `fx = fy = focal`.
    pub fn pinhole(
        focal: f64,
        cx: f64,
        cy: f64,
        width: u32,
        height: u32,
        w_t_c: na::Isometry3<f64>,
    ) -> Camera {
        let params = na::dvector![focal, focal, cx, cy, 0.0];
        Camera::new(GenericModel::UCM(UCM::new(&params, width, height)), w_t_c)
    }

    pub fn intrinsics(&self) -> &GenericModel<f64> {
        &self.intrinsics
    }

    pub fn pose(&self) -> &na::Isometry3<f64> {
        &self.w_t_c
    }

    pub fn camera_from_world(&self) -> na::Isometry3<f64> {
        self.w_t_c.inverse()
    }

    /// Camera center in the world frame.
    pub fn center(&self) -> na::Point3<f64> {
        na::Point3::from(self.w_t_c.translation.vector)
    }

    /// Depth of a world point along the optical axis.
    pub fn depth(&self, p_w: &na::Point3<f64>) -> f64 {
        self.w_t_c.inverse_transform_point(p_w).z
    }

    /// Projects a world point to pixels, `None` if it is not in front of the camera.
    pub fn project(&self, p_w: &na::Point3<f64>) -> Option<na::Vector2<f64>> {
        if self.depth(p_w) <= 0.0 {
            return None;
        }
        let uv = self.project_unchecked(p_w);
        (uv[0].is_finite() && uv[1].is_finite()).then_some(uv)
    }

    /// Projection without the depth check.
    pub fn project_unchecked(&self, p_w: &na::Point3<f64>) -> na::Vector2<f64> {
        let p_c = self.w_t_c.inverse_transform_point(p_w);
        self.intrinsics.project_one(&p_c.coords)
    }

    /// Unit bearing of a pixel in the camera frame, with lens distortion removed.
    ///
    /// Pixels outside the image bounds still get a bearing; only rays the lens
    /// model cannot invert are `None`.
    pub fn bearing(&self, uv: &na::Vector2<f64>) -> Option<na::Vector3<f64>> {
        let ray = self.intrinsics.unproject_one(uv);
        let norm = ray.norm();
        if !norm.is_finite() || norm <= f64::EPSILON {
            return None;
        }
        Some(ray / norm)
    }

    pub fn to_record(&self) -> Result<CameraRecord> {
        Ok(CameraRecord {
            intrinsics: IntrinsicsRecord::from_model(&self.intrinsics)?,
            pose: self.w_t_c.to_rvec_tvec(),
        })
    }

    pub fn from_record(record: &CameraRecord) -> Result<Camera> {
        Ok(Camera::new(
            record.intrinsics.to_model()?,
            record.pose.to_na_isometry3(),
        ))
    }
}

/// Serialized camera: intrinsics plus `wTc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub intrinsics: IntrinsicsRecord,
    #[serde(flatten)]
    pub pose: RvecTvec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsRecord {
    #[serde(rename = "type")]
    pub model: String,
    pub params: Vec<f64>,
    pub width: u32,
    pub height: u32,
}

impl IntrinsicsRecord {
    fn expected_params(model: &str) -> Option<usize> {
        match model {
            "ucm" => Some(5),
            "eucm" => Some(6),
            "kb4" => Some(8),
            "opencv5" => Some(9),
            _ => None,
        }
    }

    pub fn to_model(&self) -> Result<GenericModel<f64>> {
        let expected = Self::expected_params(&self.model)
            .ok_or_else(|| DataAssociationError::UnknownCameraModel(self.model.clone()))?;
        if self.params.len() != expected {
            return Err(DataAssociationError::CameraParamCount {
                model: self.model.clone(),
                expected,
                found: self.params.len(),
            });
        }
        let params = na::DVector::from_column_slice(&self.params);
        let (w, h) = (self.width, self.height);
        Ok(match self.model.as_str() {
            "ucm" => GenericModel::UCM(UCM::new(&params, w, h)),
            "eucm" => GenericModel::EUCM(EUCM::new(&params, w, h)),
            "kb4" => GenericModel::KannalaBrandt4(KannalaBrandt4::new(&params, w, h)),
            _ => GenericModel::OpenCVModel5(OpenCVModel5::new(&params, w, h)),
        })
    }

    pub fn from_model(model: &GenericModel<f64>) -> Result<IntrinsicsRecord> {
        #[allow(unreachable_patterns)]
        let name = match model {
            GenericModel::UCM(_) => "ucm",
            GenericModel::EUCM(_) => "eucm",
            GenericModel::KannalaBrandt4(_) => "kb4",
            GenericModel::OpenCVModel5(_) => "opencv5",
            _ => return Err(DataAssociationError::UnknownCameraModel("unsupported".into())),
        };
        Ok(IntrinsicsRecord {
            model: name.to_string(),
            params: model.params().iter().cloned().collect(),
            width: model.width().round() as u32,
            height: model.height().round() as u32,
        })
    }
}
