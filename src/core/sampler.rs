// Copyright @yucwang 2026

use crate::math::constants::{Float, Vector2f};

/// Source of uniform variates in `[0, 1)`.
pub trait Sampler {
    fn get_1d(&mut self) -> Float;

    fn get_2d(&mut self) -> Vector2f {
        let u = self.get_1d();
        let v = self.get_1d();
        Vector2f::new(u, v)
    }
}
