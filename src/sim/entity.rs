use glam::Vec3;

use super::deform::DeformState;

/// Number of ring vertices in an entity's deformable outline.
pub const SHAPE_VERTS: usize = 8;

pub type EntityId = u64;

/// Weak handle into the external audio-source bank. The bank may invalidate
/// a slot at any time; `generation` detects stale handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRef {
    pub slot: usize,
    pub generation: u64,
}

/// Event-horizon capture bookkeeping. The entity is removed only after the
/// grace window elapses, and un-marked if it escapes first.
#[derive(Debug, Clone, Copy)]
pub struct Capture {
    pub entered_at: f32,
    pub grace_sec: f32,
}

/// Impact-counter overlay that can rarely "lightning jump" to a neighbor.
#[derive(Debug, Clone, Copy)]
pub struct DigitOverlay {
    pub count: u32,
    pub ttl_sec: f32,
}

/// A soft deformable body in the simulation volume.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub pos: Vec3,
    pub vel: Vec3,
    /// Must stay > 0 while alive; crossing 0 removes it the same frame.
    pub radius: f32,
    /// ±1.
    pub charge: f32,
    /// Independent phase driving the ambient ring wobble.
    pub wobble_phase: f32,
    pub deform: DeformState,
    pub source: Option<SourceRef>,
    pub spawned_at: f32,
    pub capture: Option<Capture>,
    pub overlay: Option<DigitOverlay>,
}

impl Entity {
    pub fn blank() -> Self {
        Self {
            id: 0,
            pos: Vec3::ZERO,
            vel: Vec3::ZERO,
            radius: 0.0,
            charge: 1.0,
            wobble_phase: 0.0,
            deform: DeformState::default(),
            source: None,
            spawned_at: 0.0,
            capture: None,
            overlay: None,
        }
    }

    /// Clear every transient and optional field so a pooled slot carries
    /// nothing over into its next life.
    pub fn reset(&mut self) {
        *self = Self::blank();
    }

    pub fn age(&self, now: f32) -> f32 {
        (now - self.spawned_at).max(0.0)
    }

    /// Ring outline radius at vertex `k`, combining the impact spring offset
    /// with the ambient wobble.
    pub fn shape_radius(&self, k: usize) -> f32 {
        let k = k % SHAPE_VERTS;
        let ambient =
            0.02 * (self.wobble_phase + k as f32 * std::f32::consts::TAU / SHAPE_VERTS as f32).sin();
        self.radius * (1.0 + self.deform.vertex_offsets[k] + ambient)
    }
}

/// Transient debris particle.
#[derive(Debug, Clone, Copy)]
pub struct Particle {
    pub pos: Vec3,
    pub vel: Vec3,
    /// 1 at birth, released as soon as it reaches 0.
    pub life: f32,
    pub color: [f32; 3],
    pub size: f32,
}

impl Particle {
    pub fn blank() -> Self {
        Self {
            pos: Vec3::ZERO,
            vel: Vec3::ZERO,
            life: 0.0,
            color: [1.0; 3],
            size: 0.02,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::blank();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_optional_state() {
        let mut e = Entity::blank();
        e.source = Some(SourceRef {
            slot: 3,
            generation: 9,
        });
        e.overlay = Some(DigitOverlay {
            count: 4,
            ttl_sec: 1.0,
        });
        e.capture = Some(Capture {
            entered_at: 1.0,
            grace_sec: 1.5,
        });
        e.reset();
        assert!(e.source.is_none());
        assert!(e.overlay.is_none());
        assert!(e.capture.is_none());
        assert_eq!(e.radius, 0.0);
    }

    #[test]
    fn shape_radius_tracks_base_radius() {
        let mut e = Entity::blank();
        e.radius = 0.5;
        for k in 0..SHAPE_VERTS {
            let r = e.shape_radius(k);
            assert!((r - 0.5).abs() < 0.02, "vertex {k}: {r}");
        }
    }
}
