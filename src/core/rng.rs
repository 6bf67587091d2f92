// Copyright @yucwang 2026

use crate::core::sampler::Sampler;
use crate::math::constants::Float;

pub struct LcgRng {
    state: u64,
}

impl LcgRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.state >> 32) as u32
    }

    /// Uniform in `[0, 1)`; the top 24 bits keep the result below one.
    pub fn next_f32(&mut self) -> Float {
        (self.next_u32() >> 8) as Float * (1.0 / 16777216.0)
    }
}

impl Sampler for LcgRng {
    fn get_1d(&mut self) -> Float {
        self.next_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::LcgRng;
    use crate::core::sampler::Sampler;

    #[test]
    fn test_lcg_range_and_mean() {
        let mut rng = LcgRng::new(7);
        let mut sum = 0.0f64;
        let n = 100000;
        for _ in 0..n {
            let u = rng.get_1d();
            assert!(u >= 0.0 && u < 1.0);
            sum += u as f64;
        }
        assert!((sum / n as f64 - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_lcg_is_deterministic() {
        let mut a = LcgRng::new(42);
        let mut b = LcgRng::new(42);
        for _ in 0..16 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
        let u = a.get_2d();
        assert!(u.x < 1.0 && u.y < 1.0);
    }
}
