// Copyright @yucwang 2023

use super::constants::{ INV_PI, PI, Float, Vector2f, Vector3f };

/// Maps the unit square onto the sphere of directions.
///
/// `x` drives `cos(theta)` linearly and `y` the azimuth, which makes the
/// mapping area preserving: a density over the square divided by `4 * PI`
/// is a density per steradian.
pub fn canonical_to_dir(p: &Vector2f) -> Vector3f {
    let cos_theta: Float = 2.0 * p.x - 1.0;
    let phi: Float = 2.0 * PI * p.y;
    let sin_theta: Float = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let (sin_phi, cos_phi) = phi.sin_cos();

    Vector3f::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
}

/// Inverse of `canonical_to_dir`. Non-finite directions map to the origin.
pub fn dir_to_canonical(d: &Vector3f) -> Vector2f {
    if !d.x.is_finite() || !d.y.is_finite() || !d.z.is_finite() {
        return Vector2f::new(0.0, 0.0);
    }

    let cos_theta = d.z.max(-1.0).min(1.0);
    let mut phi = d.y.atan2(d.x);
    while phi < 0.0 {
        phi += 2.0 * PI;
    }

    Vector2f::new((cos_theta + 1.0) / 2.0, phi / (2.0 * PI))
}

fn sample_uniform_disk_concentric(u: &Vector2f) -> Vector2f {
    let r1: Float = 2.0 * u.x - 1.0;
    let r2: Float = 2.0 * u.y - 1.0;

    let phi: Float;
    let r:   Float;

    if r1 == 0. && r2 == 0. {
        r = 0.0;
        phi = 0.0;
    } else if r1 * r1 > r2 * r2 {
        r = r1;
        phi = (PI / 4.0) * (r2 / r1);
    } else {
        r = r2;
        phi = (PI / 2.0) - (r1 / r2) * (PI / 4.0);
    }

    let (sin_phi, cos_phi) = phi.sin_cos();

    return Vector2f::new(r * cos_phi, r * sin_phi)
}

pub fn sample_cosine_hemisphere(u: &Vector2f) -> Vector3f {
    let p = sample_uniform_disk_concentric(&u);
    let z = (1. - p.x * p.x - p.y * p.y).max(0.0).sqrt();

    return Vector3f::new(p.x, p.y, z)
}

pub fn sample_cosine_hemisphere_pdf(cos_theta: Float) -> Float {
    return cos_theta.max(0.0) * INV_PI;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_mapping_poles() {
        let up = canonical_to_dir(&Vector2f::new(1.0, 0.0));
        assert!((up - Vector3f::new(0.0, 0.0, 1.0)).norm() < 1e-5);
        let down = canonical_to_dir(&Vector2f::new(0.0, 0.3));
        assert!((down - Vector3f::new(0.0, 0.0, -1.0)).norm() < 1e-5);

        let p = dir_to_canonical(&Vector3f::new(0.0, 0.0, 1.0));
        assert!((p.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_canonical_mapping_inverts() {
        for i in 0..16 {
            for j in 0..16 {
                let p = Vector2f::new((i as Float + 0.5) / 16.0, (j as Float + 0.5) / 16.0);
                let d = canonical_to_dir(&p);
                assert!((d.norm() - 1.0).abs() < 1e-5);
                let q = dir_to_canonical(&d);
                assert!((p - q).norm() < 1e-4, "{:?} vs {:?}", p, q);
            }
        }
    }

    #[test]
    fn test_cosine_hemisphere_stays_above() {
        for i in 0..8 {
            for j in 0..8 {
                let u = Vector2f::new((i as Float + 0.5) / 8.0, (j as Float + 0.5) / 8.0);
                let d = sample_cosine_hemisphere(&u);
                assert!(d.z >= 0.0);
                assert!((d.norm() - 1.0).abs() < 1e-5);
                assert!(sample_cosine_hemisphere_pdf(d.z) > 0.0);
            }
        }
    }

    #[test]
    fn test_canonical_mapping_rejects_nan() {
        let p = dir_to_canonical(&Vector3f::new(Float::NAN, 0.0, 1.0));
        assert_eq!(p, Vector2f::new(0.0, 0.0));
    }
}
