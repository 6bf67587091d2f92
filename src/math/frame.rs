// Copyright @yucwang 2023

use crate::math::constants::{ Vector3f };

/// Orthonormal basis with `z` along a surface normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    x: Vector3f,
    y: Vector3f,
    z: Vector3f
}

impl Default for Frame {
    fn default() -> Self {
        Frame {
            x: Vector3f::new(1.0, 0.0, 0.0),
            y: Vector3f::new(0.0, 1.0, 0.0),
            z: Vector3f::new(0.0, 0.0, 1.0)
        }
    }
}

impl Frame {
    pub fn from_normal(n: &Vector3f) -> Frame {
        let z = n.normalize();
        let up = if z.z.abs() < 0.999 {
            Vector3f::new(0.0, 0.0, 1.0)
        } else {
            Vector3f::new(1.0, 0.0, 0.0)
        };
        let x = z.cross(&up).normalize();
        let y = z.cross(&x).normalize();

        Frame { x, y, z }
    }

    pub fn normal(&self) -> Vector3f {
        self.z
    }

    pub fn to_local(&self, v: &Vector3f) -> Vector3f {
        Vector3f::new(v.dot(&self.x), v.dot(&self.y), v.dot(&self.z))
    }

    pub fn from_local(&self, v: &Vector3f) -> Vector3f {
        v.x * self.x + v.y * self.y + v.z * self.z
    }
}

#[cfg(test)]
mod tests {
    use super::Frame;
    use crate::math::constants::Vector3f;

    #[test]
    fn test_frame_round_trip() {
        for n in [Vector3f::new(0.0, 0.0, 1.0),
                  Vector3f::new(1.0, 2.0, -0.5),
                  Vector3f::new(0.0, 0.0, -3.0)].iter() {
            let frame = Frame::from_normal(n);
            let v = Vector3f::new(0.3, -0.4, 0.8);
            let back = frame.to_local(&frame.from_local(&v));
            assert!((back - v).norm() < 1e-5);
            assert!((frame.from_local(&Vector3f::new(0.0, 0.0, 1.0)) - n.normalize()).norm() < 1e-5);
        }
    }
}
