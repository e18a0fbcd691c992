use glam::Vec3;

use super::entity::SHAPE_VERTS;

/// Body spring scale clamp.
const SCALE_MIN: f32 = 0.7;
const SCALE_MAX: f32 = 1.3;
/// Per-vertex radial offset clamp.
const VERT_MAX: f32 = 0.35;

/// Natural frequency of the body squash spring (rad/s). Damping is kept at
/// 2·omega, the critical value, so impacts settle without ringing forever.
const BODY_OMEGA: f32 = 9.0;
const VERT_OMEGA: f32 = 14.0;

/// Squash-and-stretch spring state. Two coupled pieces: a 2-axis scale +
/// rotation spring for the whole body, and an independent radial spring per
/// ring vertex for the surface wobble.
#[derive(Debug, Clone)]
pub struct DeformState {
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation: f32,
    vel_x: f32,
    vel_y: f32,
    vel_rot: f32,
    pub vertex_offsets: [f32; SHAPE_VERTS],
    vertex_vels: [f32; SHAPE_VERTS],
}

impl Default for DeformState {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            vel_x: 0.0,
            vel_y: 0.0,
            vel_rot: 0.0,
            vertex_offsets: [0.0; SHAPE_VERTS],
            vertex_vels: [0.0; SHAPE_VERTS],
        }
    }
}

impl DeformState {
    /// Instantaneous impact kick. The body squashes along the contact normal
    /// and stretches across it; the ring vertex nearest the contact direction
    /// takes the largest radial hit.
    pub fn kick(&mut self, normal: Vec3, impulse: f32) {
        let strength = impulse.abs().min(4.0);
        if strength <= 0.0 || !normal.is_finite() {
            return;
        }
        self.vel_x -= strength * 0.9;
        self.vel_y += strength * 0.9;
        self.vel_rot += strength * 0.3 * normal.x.signum();

        let contact = normal.y.atan2(normal.x);
        for (k, vel) in self.vertex_vels.iter_mut().enumerate() {
            let vert_angle = k as f32 * std::f32::consts::TAU / SHAPE_VERTS as f32;
            let align = (vert_angle - contact).cos().max(0.0);
            *vel -= strength * 0.6 * align;
        }
    }

    /// Radial stretch toward the singularity: scale up along the pull axis.
    pub fn tidal_stretch(&mut self, amount: f32) {
        let a = amount.clamp(0.0, 1.0);
        self.scale_x = (self.scale_x + a * 0.4).clamp(SCALE_MIN, SCALE_MAX);
        self.scale_y = (self.scale_y - a * 0.25).clamp(SCALE_MIN, SCALE_MAX);
    }

    /// Critically-damped relaxation toward rest. Pure state evolution, run
    /// every frame even while the simulation is paused.
    pub fn relax(&mut self, dt_scaled: f32) {
        let dt = dt_scaled.clamp(0.0, 0.1);
        if dt <= 0.0 {
            return;
        }

        spring_step(&mut self.scale_x, &mut self.vel_x, 1.0, BODY_OMEGA, dt);
        spring_step(&mut self.scale_y, &mut self.vel_y, 1.0, BODY_OMEGA, dt);
        spring_step(&mut self.rotation, &mut self.vel_rot, 0.0, BODY_OMEGA, dt);
        self.scale_x = self.scale_x.clamp(SCALE_MIN, SCALE_MAX);
        self.scale_y = self.scale_y.clamp(SCALE_MIN, SCALE_MAX);

        for k in 0..SHAPE_VERTS {
            spring_step(
                &mut self.vertex_offsets[k],
                &mut self.vertex_vels[k],
                0.0,
                VERT_OMEGA,
                dt,
            );
            self.vertex_offsets[k] = self.vertex_offsets[k].clamp(-VERT_MAX, VERT_MAX);
        }
    }

    /// Largest absolute displacement from rest, for tests and stats.
    pub fn excursion(&self) -> f32 {
        let body = (self.scale_x - 1.0)
            .abs()
            .max((self.scale_y - 1.0).abs())
            .max(self.rotation.abs());
        let verts = self
            .vertex_offsets
            .iter()
            .fold(0.0f32, |m, &v| m.max(v.abs()));
        body.max(verts)
    }
}

fn spring_step(pos: &mut f32, vel: &mut f32, rest: f32, omega: f32, dt: f32) {
    let accel = -omega * omega * (*pos - rest) - 2.0 * omega * *vel;
    *vel += accel * dt;
    *pos += *vel * dt;
    if !pos.is_finite() || !vel.is_finite() {
        *pos = rest;
        *vel = 0.0;
    }
}
