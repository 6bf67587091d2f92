// Copyright @yucwang 2023

use crate::core::bsdf::{ BSDFSample, BSDF };
use crate::math::constants::{ Float, INV_PI, Vector2f, Vector3f };
use crate::math::frame::Frame;
use crate::math::warp::{ sample_cosine_hemisphere, sample_cosine_hemisphere_pdf };

/// One-sided diffuse reflector around a fixed world-space normal.
pub struct LambertianDiffuseBSDF {
    albedo: Float,
    frame: Frame,
}

impl BSDF for LambertianDiffuseBSDF {
    fn sample(&self, _wi: &Vector3f, u: Vector2f) -> Option<BSDFSample> {
        let local = sample_cosine_hemisphere(&u);
        let pdf = sample_cosine_hemisphere_pdf(local.z);
        if !(pdf > 0.0) {
            return None;
        }

        Some(BSDFSample {
            wo: self.frame.from_local(&local),
            value: self.albedo * INV_PI * local.z,
            pdf,
            is_delta: false,
        })
    }

    fn eval(&self, _wi: &Vector3f, wo: &Vector3f) -> Float {
        let cos_theta = wo.dot(&self.frame.normal());
        if cos_theta <= 0.0 {
            return 0.0;
        }
        self.albedo * INV_PI * cos_theta
    }

    fn pdf(&self, _wi: &Vector3f, wo: &Vector3f) -> Float {
        sample_cosine_hemisphere_pdf(wo.dot(&self.frame.normal()))
    }
}

impl LambertianDiffuseBSDF {
    pub fn new(albedo: Float, normal: Vector3f) -> Self {
        Self {
            albedo,
            frame: Frame::from_normal(&normal),
        }
    }
}
