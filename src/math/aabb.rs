// Copyright 2020 @TwoCookingMice

use super::constants::{ Float, Vector3f,
                       FLOAT_MIN, FLOAT_MAX };

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AABB {
    pub p_min: Vector3f,
    pub p_max: Vector3f
}

impl Default for AABB {
    fn default() -> Self {
        Self { p_min: Vector3f::new(FLOAT_MAX, FLOAT_MAX, FLOAT_MAX),
               p_max: Vector3f::new(FLOAT_MIN, FLOAT_MIN, FLOAT_MIN) }
    }
}

impl AABB {
    pub fn new(p_min: Vector3f, p_max: Vector3f) -> Self {
        let mut min = Vector3f::new(0.0, 0.0, 0.0);
        let mut max = Vector3f::new(0.0, 0.0, 0.0);
        for idx in 0..3 {
            min[idx] = p_min[idx].min(p_max[idx]);
            max[idx] = p_max[idx].max(p_min[idx]);
        }
        Self { p_min: min, p_max: max }
    }

    /// Smallest cube sharing `p_min` with this box and enclosing it.
    pub fn bounding_cube(&self) -> AABB {
        let extent = self.diagonal().max();
        AABB { p_min: self.p_min,
               p_max: self.p_min + Vector3f::new(extent, extent, extent) }
    }

    pub fn center(&self) -> Vector3f {
        0.5f32 * self.p_min + 0.5f32 * self.p_max
    }

    pub fn expand_by_point(&mut self, p: &Vector3f) {
        for idx in 0..3 {
            self.p_min[idx] = self.p_min[idx].min(p[idx]);
            self.p_max[idx] = self.p_max[idx].max(p[idx]);
        }
    }

    pub fn contains(&self, p: &Vector3f) -> bool {
        (0..3).all(|idx| p[idx] >= self.p_min[idx] && p[idx] <= self.p_max[idx])
    }

    pub fn clip(&self, p: &Vector3f) -> Vector3f {
        let mut result = *p;
        for idx in 0..3 {
            result[idx] = result[idx].max(self.p_min[idx]).min(self.p_max[idx]);
        }
        result
    }

    /// Volume of the intersection of two boxes, zero when they are disjoint.
    pub fn overlap_volume(&self, other: &AABB) -> Float {
        let mut volume = 1.0;
        for idx in 0..3 {
            let length = self.p_max[idx].min(other.p_max[idx])
                - self.p_min[idx].max(other.p_min[idx]);
            volume *= length.max(0.0);
        }
        volume
    }

    pub fn volume(&self) -> Float {
        let a = self.p_max[0] - self.p_min[0];
        let b = self.p_max[1] - self.p_min[1];
        let c = self.p_max[2] - self.p_min[2];

        a * b * c
    }

    pub fn diagonal(&self) -> Vector3f {
        self.p_max - self.p_min
    }

    pub fn is_valid(&self) -> bool {
        let mut result = true;
        for idx in 0..3 {
            if self.p_min[idx] > self.p_max[idx] {
                result = false;
                break;
            }
        }

        result
    }
}

/* Test for AABB */
#[cfg(test)]
mod tests {
    use super::AABB;
    use super::Vector3f;

    #[test]
    fn test_aabb_geometry() {
        let min = Vector3f::new(1.0, 7.0, 3.0);
        let max = Vector3f::new(4.0, 4.0, 4.0);
        let mut bbox: AABB = AABB::new(min, max);

        let center = bbox.center();
        assert!((center[0] - 2.5f32).abs() < 1e-6);
        assert!((center[1] - 5.5f32).abs() < 1e-6);
        assert!((center[2] - 3.5f32).abs() < 1e-6);
        assert!((bbox.volume() - 9.0f32).abs() < 1e-6);

        bbox.expand_by_point(&Vector3f::new(-1.0, 5.0, 6.0));
        assert!((bbox.p_min[0] + 1.0f32).abs() < 1e-6);
        assert!((bbox.p_max[2] - 6.0f32).abs() < 1e-6);
        assert!(bbox.contains(&Vector3f::new(0.0, 5.0, 5.0)));
        assert!(!bbox.contains(&Vector3f::new(0.0, 8.0, 5.0)));

        let mut bbox1: AABB = AABB::default();
        assert!(!bbox1.is_valid());
        bbox1.expand_by_point(&Vector3f::new(0.0, 0.0, 0.0));
        assert!(bbox1.is_valid());
    }

    #[test]
    fn test_aabb_bounding_cube() {
        let bbox = AABB::new(Vector3f::new(0.0, 1.0, 2.0), Vector3f::new(1.0, 5.0, 3.0));
        let cube = bbox.bounding_cube();
        assert_eq!(cube.p_min, bbox.p_min);
        assert!((cube.diagonal() - Vector3f::new(4.0, 4.0, 4.0)).norm() < 1e-6);
        assert!(cube.contains(&bbox.p_max));
    }

    #[test]
    fn test_aabb_overlap_and_clip() {
        let a = AABB::new(Vector3f::new(0.0, 0.0, 0.0), Vector3f::new(2.0, 2.0, 2.0));
        let b = AABB::new(Vector3f::new(1.0, 1.0, 1.0), Vector3f::new(3.0, 3.0, 3.0));
        let c = AABB::new(Vector3f::new(5.0, 5.0, 5.0), Vector3f::new(6.0, 6.0, 6.0));
        assert!((a.overlap_volume(&b) - 1.0).abs() < 1e-6);
        assert_eq!(a.overlap_volume(&c), 0.0);

        let clipped = a.clip(&Vector3f::new(-1.0, 1.0, 4.0));
        assert_eq!(clipped, Vector3f::new(0.0, 1.0, 2.0));
    }
}
