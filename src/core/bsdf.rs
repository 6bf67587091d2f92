// Copyright @yucwang 2023

use crate::math::constants::{ Float, Vector2f, Vector3f };

// Directions are in world space and point away from the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BSDFSample {
    pub wo: Vector3f,
    /// BSDF times the cosine foreshortening, not divided by `pdf`.
    pub value: Float,
    pub pdf: Float,
    pub is_delta: bool,
}

pub trait BSDF: Send + Sync {
    fn sample(&self, wi: &Vector3f, u: Vector2f) -> Option<BSDFSample>;
    fn eval(&self, wi: &Vector3f, wo: &Vector3f) -> Float;
    fn pdf(&self, wi: &Vector3f, wo: &Vector3f) -> Float;
    /// True when every lobe is a delta distribution.
    fn is_delta(&self) -> bool {
        false
    }
}

impl Default for BSDFSample {
    fn default() -> Self {
        Self {
            wo: Vector3f::zeros(),
            value: 0.0,
            pdf: 0.0,
            is_delta: false,
        }
    }
}
