// Copyright @yucwang 2026

use crate::core::bsdf::{ BSDFSample, BSDF };
use crate::math::constants::{ Float, Vector2f, Vector3f };

/// Index-matched boundary: light passes straight through.
pub struct NullBSDF;

impl BSDF for NullBSDF {
    fn is_delta(&self) -> bool {
        true
    }

    fn sample(&self, wi: &Vector3f, _u: Vector2f) -> Option<BSDFSample> {
        Some(BSDFSample {
            wo: -*wi,
            value: 1.0,
            pdf: 1.0,
            is_delta: true,
        })
    }

    fn eval(&self, _wi: &Vector3f, _wo: &Vector3f) -> Float {
        0.0
    }

    fn pdf(&self, _wi: &Vector3f, _wo: &Vector3f) -> Float {
        0.0
    }
}
