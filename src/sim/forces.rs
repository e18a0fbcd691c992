use glam::Vec3;
use rand::Rng;

use crate::core::math::{Bounds, clamp_length, is_finite, random_unit};

use super::entity::{Capture, Entity};
use super::params::ForceParams;

/// Speed and acceleration ceilings. Empirically tuned feel constants; the
/// relative magnitudes matter, the exact literals do not.
pub const MAX_SPEED: f32 = 6.0;
pub const MAX_ACCEL: f32 = 40.0;

const VISCOSITY_K: f32 = 2.4;
const GRAVITY_K: f32 = 9.0;
const WIND_K: f32 = 5.0;

const VOID_PULL: f32 = 18.0;
const VOID_SWIRL: f32 = 7.0;
const VOID_DRAG: f32 = 1.8;
const VOID_SOFTEN: f32 = 0.25;
const TIDAL_RANGE: f32 = 1.8;

const MAGNETO_GAIN: f32 = 2.2;
const MAGNETO_CAP: f32 = 14.0;
const MAGNETO_SAME_FACTOR: f32 = 0.35;
const MAGNETO_MIN_DIST2: f32 = 0.01;
const MAGNETO_MAX_DIST2: f32 = 36.0;

const FLOCK_EPSILON: f32 = 1e-3;
const NEIGHBOR_RADIUS: f32 = 1.8;
const SEPARATION_RADIUS: f32 = 0.7;
const ALIGN_GAIN: f32 = 1.4;
const COHESION_GAIN: f32 = 0.8;
const SEPARATION_GAIN: f32 = 3.2;

const SWAY_AMP: f32 = 0.12;

/// Effective velocity ceiling for the current tempo.
pub fn speed_cap(tempo: f32) -> f32 {
    MAX_SPEED * tempo.max(0.2)
}

/// Projected event-horizon radius for a given void strength.
pub fn horizon_radius(void: f32) -> f32 {
    0.25 + 0.95 * void.clamp(0.0, 1.0)
}

/// Flocking pass: alignment, cohesion, and short-range separation blended by
/// the wave weight, accumulated over all pairs into `accel` (one slot per
/// entity). Active only above a small epsilon; the blend weight itself goes
/// to zero there, so the cutoff is a cost optimization and the field stays
/// approximately continuous.
pub fn accumulate_flocking(entities: &[Entity], p: &ForceParams, accel: &mut Vec<Vec3>) {
    accel.clear();
    accel.resize(entities.len(), Vec3::ZERO);
    if p.wave <= FLOCK_EPSILON || entities.len() < 2 {
        return;
    }

    for (i, e) in entities.iter().enumerate() {
        let mut avg_vel = Vec3::ZERO;
        let mut avg_pos = Vec3::ZERO;
        let mut push = Vec3::ZERO;
        let mut neighbors = 0u32;

        for (j, other) in entities.iter().enumerate() {
            if i == j {
                continue;
            }
            let delta = other.pos - e.pos;
            let d = delta.length();
            if d <= 0.0 || d >= NEIGHBOR_RADIUS {
                continue;
            }
            avg_vel += other.vel;
            avg_pos += other.pos;
            neighbors += 1;
            if d < SEPARATION_RADIUS {
                push -= delta / (d * d.max(0.05));
            }
        }

        if neighbors > 0 {
            let n = neighbors as f32;
            let align = (avg_vel / n - e.vel) * ALIGN_GAIN;
            let cohere = (avg_pos / n - e.pos) * COHESION_GAIN;
            accel[i] = (align + cohere + push * SEPARATION_GAIN) * p.wave;
        }
    }
}

/// Magneto pass: pairwise charge force, symmetric by construction (each pair
/// visited once, equal and opposite velocity impulses). Active only inside
/// the distance annulus.
pub fn apply_magneto(entities: &mut [Entity], p: &ForceParams, dt: f32) {
    // 0.5 is neutral; the sign of the excursion selects attract vs repel.
    let polarity = (p.magneto - 0.5) * 2.0;
    if polarity.abs() < 1e-3 {
        return;
    }
    let strength = polarity.abs();
    let dt_scaled = p.scaled_dt(dt);
    let cap = MAGNETO_CAP * p.tempo.max(0.2) * (0.5 + strength);

    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            let delta = entities[j].pos - entities[i].pos;
            let d2 = delta.length_squared();
            if d2 <= MAGNETO_MIN_DIST2 || d2 >= MAGNETO_MAX_DIST2 {
                continue;
            }
            let opposite = entities[i].charge * entities[j].charge < 0.0;
            // Attract mode: opposite charges pull hard, same charges push a
            // little. Repel mode inverts both roles.
            let base = if opposite { 1.0 } else { -MAGNETO_SAME_FACTOR };
            let accel_mag = (base * polarity * MAGNETO_GAIN / d2).clamp(-cap, cap);
            let dir = delta / d2.sqrt();
            let dv = dir * accel_mag * dt_scaled;
            entities[i].vel += dv;
            entities[j].vel -= dv;
        }
    }
}

/// Per-entity force step, in fixed order: viscosity damping, then exactly one
/// of singularity or plain gravity, then wind jitter, then integration.
/// Returns true when the entity's capture grace window has expired and it
/// should be removed this frame.
pub fn step_entity<R: Rng>(
    e: &mut Entity,
    flock_accel: Vec3,
    p: &ForceParams,
    bounds: &Bounds,
    dt: f32,
    now: f32,
    rng: &mut R,
) -> bool {
    let dt_scaled = p.scaled_dt(dt);

    // Numeric corruption is repaired, never propagated.
    if !is_finite(e.pos) || !is_finite(e.vel) {
        e.pos = bounds.clamp_point(if is_finite(e.pos) { e.pos } else { Vec3::ZERO });
        e.vel = Vec3::ZERO;
    }

    let damp = (1.0 - p.freeze * VISCOSITY_K * dt_scaled).clamp(0.0, 1.0);
    e.vel *= damp;

    let mut accel = flock_accel;
    let mut expired = false;

    if p.void > 1e-3 {
        expired = apply_singularity(e, p, dt_scaled, now, rng, &mut accel);
    } else {
        e.capture = None;
        accel.y -= p.gravity * GRAVITY_K;
    }

    // Ambient sway, independent of neighbors.
    e.wobble_phase = (e.wobble_phase + dt_scaled * 2.1).rem_euclid(std::f32::consts::TAU);
    accel.x += SWAY_AMP * (e.wobble_phase * 0.5).sin();
    accel.z += SWAY_AMP * (e.wobble_phase * 0.5 + 1.3).cos();

    accel = clamp_length(accel, MAX_ACCEL * p.tempo.max(0.2));
    e.vel += accel * dt_scaled;

    if p.wind > 1e-3 {
        e.vel += random_unit(rng) * p.wind * WIND_K * dt_scaled;
    }

    e.vel = clamp_length(e.vel, speed_cap(p.tempo));
    e.pos += e.vel * dt_scaled;

    expired
}

/// Singularity field: softened inverse-square pull, tangential swirl,
/// accretion drag on the tangential velocity, tidal stretch near the horizon,
/// and capture bookkeeping. Returns true when the grace window has expired.
fn apply_singularity<R: Rng>(
    e: &mut Entity,
    p: &ForceParams,
    dt_scaled: f32,
    now: f32,
    rng: &mut R,
    accel: &mut Vec3,
) -> bool {
    let to_center = -e.pos;
    let d = to_center.length();
    if d <= 1e-5 {
        return e
            .capture
            .is_some_and(|c| now - c.entered_at >= c.grace_sec);
    }
    let r_hat = to_center / d;
    let d2_soft = d * d + VOID_SOFTEN;

    *accel += r_hat * (VOID_PULL * p.void / d2_soft);

    // Swirl around the vertical axis turns radial infall into a spiral.
    let swirl_dir = Vec3::Y.cross(r_hat);
    if swirl_dir.length_squared() > 1e-6 {
        *accel += swirl_dir.normalize() * (VOID_SWIRL * p.void / d2_soft.sqrt());
    }

    // Accretion drag bleeds tangential velocity so orbits decay into capture
    // instead of persisting.
    let v_radial = r_hat * e.vel.dot(r_hat);
    let v_tangent = e.vel - v_radial;
    e.vel -= v_tangent * (VOID_DRAG * p.void * dt_scaled).clamp(0.0, 1.0);

    let horizon = horizon_radius(p.void);
    if d < horizon * TIDAL_RANGE {
        let near = 1.0 - (d / (horizon * TIDAL_RANGE)).clamp(0.0, 1.0);
        e.deform.tidal_stretch(near * p.void * dt_scaled * 8.0);
    }

    if d < horizon {
        match e.capture {
            Some(c) => {
                if now - c.entered_at >= c.grace_sec {
                    return true;
                }
            }
            None => {
                e.capture = Some(Capture {
                    entered_at: now,
                    grace_sec: rng.random_range(1.0..2.0),
                });
            }
        }
    } else {
        e.capture = None;
    }
    false
}
