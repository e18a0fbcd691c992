use glam::Vec3;
use rand::Rng;

/// Axis-aligned simulation volume centered on the origin.
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub half: Vec3,
}

impl Bounds {
    pub fn new(half: Vec3) -> Self {
        Self {
            half: half.max(Vec3::splat(0.1)),
        }
    }

    pub fn clamp_point(&self, p: Vec3) -> Vec3 {
        p.clamp(-self.half, self.half)
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.abs().cmple(self.half).all()
    }

    /// Uniform random point strictly inside, keeping `margin` off every face.
    pub fn random_point<R: Rng>(&self, rng: &mut R, margin: f32) -> Vec3 {
        let h = (self.half - Vec3::splat(margin)).max(Vec3::splat(0.05));
        Vec3::new(
            rng.random_range(-h.x..h.x),
            rng.random_range(-h.y..h.y),
            rng.random_range(-h.z..h.z),
        )
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(Vec3::new(5.0, 4.0, 4.0))
    }
}

/// Uniform random unit vector.
pub fn random_unit<R: Rng>(rng: &mut R) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.random_range(-1.0..1.0f32),
            rng.random_range(-1.0..1.0f32),
            rng.random_range(-1.0..1.0f32),
        );
        let len2 = v.length_squared();
        if len2 > 1e-4 && len2 <= 1.0 {
            return v / len2.sqrt();
        }
    }
}

/// Clamp a vector's magnitude without changing its direction.
pub fn clamp_length(v: Vec3, max_len: f32) -> Vec3 {
    let len2 = v.length_squared();
    if len2 > max_len * max_len && len2 > 0.0 {
        v * (max_len / len2.sqrt())
    } else {
        v
    }
}

/// True when every component is a normal number (no NaN/Inf).
pub fn is_finite(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn clamp_length_preserves_direction() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        let c = clamp_length(v, 1.0);
        assert!((c.length() - 1.0).abs() < 1e-6);
        assert!((c.normalize() - v.normalize()).length() < 1e-6);
    }

    #[test]
    fn clamp_length_leaves_short_vectors() {
        let v = Vec3::new(0.1, 0.0, 0.0);
        assert_eq!(clamp_length(v, 1.0), v);
    }

    #[test]
    fn random_unit_is_unit() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            let v = random_unit(&mut rng);
            assert!((v.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn bounds_clamp_and_contain() {
        let b = Bounds::new(Vec3::new(2.0, 2.0, 2.0));
        let p = b.clamp_point(Vec3::new(5.0, -9.0, 0.0));
        assert!(b.contains(p));
    }
}
