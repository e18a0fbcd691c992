use glam::Vec3;
use rand::Rng;

use crate::core::math::Bounds;

use super::entity::{DigitOverlay, Entity, EntityId};
use super::params::ForceParams;
use super::pool::EntityPool;
use super::step::SimEvent;

const RESTITUTION: f32 = 0.85;
const WALL_RESTITUTION: f32 = 0.9;
/// Floor restitution under full gravity; settling is inelastic.
const FLOOR_RESTITUTION_HEAVY: f32 = 0.55;
/// Wall hits stop producing audio once the singularity dominates the field.
const VOID_DOMINANT: f32 = 0.75;
/// Minimum wall-impact speed worth a deformation kick and an audio event.
const WALL_IMPACT_MIN: f32 = 0.15;

const OVERLAY_SPAWN_PROB: f32 = 0.02;
const OVERLAY_TTL_SEC: f32 = 6.0;

/// The three closest pairs this frame, by center distance. Presentation
/// only, never fed back into behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosePairs {
    pairs: [Option<(EntityId, EntityId, f32)>; 3],
}

impl ClosePairs {
    fn offer(&mut self, a: EntityId, b: EntityId, dist: f32) {
        let mut candidate = Some((a, b, dist));
        for slot in self.pairs.iter_mut() {
            match (*slot, candidate) {
                (None, Some(c)) => {
                    *slot = Some(c);
                    candidate = None;
                }
                (Some(held), Some(c)) if c.2 < held.2 => {
                    *slot = Some(c);
                    candidate = Some(held);
                }
                _ => {}
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, EntityId, f32)> + '_ {
        self.pairs.iter().flatten().copied()
    }
}

/// All-pairs contact pass. O(n²); the governor keeps n small enough that a
/// broad-phase structure would be overhead, not savings.
pub fn resolve_pairs<R: Rng>(
    pool: &mut EntityPool,
    p: &ForceParams,
    rng: &mut R,
    events: &mut Vec<SimEvent>,
) -> ClosePairs {
    let mut close = ClosePairs::default();
    let entities = pool.entities_mut();

    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            let (left, right) = entities.split_at_mut(j);
            let a = &mut left[i];
            let b = &mut right[0];
            if a.radius <= 0.0 || b.radius <= 0.0 {
                continue;
            }

            let delta = a.pos - b.pos;
            let d = delta.length();
            let contact_dist = a.radius + b.radius;
            if d >= 3.0 * contact_dist {
                continue;
            }
            close.offer(a.id, b.id, d);
            if d >= contact_dist {
                continue;
            }

            if rng.random::<f32>() < p.merge {
                merge_pair(a, b, events);
            } else {
                bounce_pair(a, b, delta, d, contact_dist, rng, events);
            }
        }
    }

    close
}

/// Volume-conserving merge: the larger body absorbs the smaller. The loser's
/// radius goes to 0 and the removal sweep releases it this frame.
fn merge_pair(a: &mut Entity, b: &mut Entity, events: &mut Vec<SimEvent>) {
    let (winner, loser) = if a.radius >= b.radius { (a, b) } else { (b, a) };
    let wm = winner.radius.powi(3);
    let lm = loser.radius.powi(3);
    let total = wm + lm;
    winner.vel = (winner.vel * wm + loser.vel * lm) / total;
    winner.radius = total.cbrt();
    loser.radius = 0.0;
    events.push(SimEvent::Merge {
        survivor: winner.id,
        pos: winner.pos,
        vel: winner.vel,
        radius: winner.radius,
    });
}

/// Impulse-based elastic response with inverse-mass 1/radius, applied only
/// when the pair is approaching along the contact normal, then a positional
/// de-overlap split by inverse mass and a deformation kick to both.
fn bounce_pair<R: Rng>(
    a: &mut Entity,
    b: &mut Entity,
    delta: Vec3,
    d: f32,
    contact_dist: f32,
    rng: &mut R,
    events: &mut Vec<SimEvent>,
) {
    let normal = if d > 1e-5 {
        delta / d
    } else {
        Vec3::new(1.0, 0.0, 0.0)
    };
    let inv_a = 1.0 / a.radius;
    let inv_b = 1.0 / b.radius;

    let rel_normal_vel = (a.vel - b.vel).dot(normal);
    let mut impulse = 0.0;
    if rel_normal_vel < 0.0 {
        impulse = -(1.0 + RESTITUTION) * rel_normal_vel / (inv_a + inv_b);
        a.vel += normal * impulse * inv_a;
        b.vel -= normal * impulse * inv_b;
    }

    let overlap = contact_dist - d;
    if overlap > 0.0 {
        let total_inv = inv_a + inv_b;
        a.pos += normal * overlap * (inv_a / total_inv);
        b.pos -= normal * overlap * (inv_b / total_inv);
    }

    let kick = impulse.abs() * 2.0;
    a.deform.kick(normal, kick);
    b.deform.kick(-normal, kick);
    bump_overlay(a, rng);
    bump_overlay(b, rng);

    if impulse.abs() > 0.0 {
        events.push(SimEvent::Contact {
            a: a.id,
            b: b.id,
            pos: (a.pos + b.pos) * 0.5,
            vel: (a.vel + b.vel) * 0.5,
            radius: a.radius.max(b.radius),
            impulse: impulse.abs(),
        });
    }
}

fn bump_overlay<R: Rng>(e: &mut Entity, rng: &mut R) {
    match e.overlay.as_mut() {
        Some(overlay) => {
            overlay.count = overlay.count.saturating_add(1);
            overlay.ttl_sec = OVERLAY_TTL_SEC;
        }
        None => {
            if rng.random::<f32>() < OVERLAY_SPAWN_PROB {
                e.overlay = Some(DigitOverlay {
                    count: 1,
                    ttl_sec: OVERLAY_TTL_SEC,
                });
            }
        }
    }
}

/// Reflect every entity off the volume walls. The floor turns inelastic as
/// gravity rises, so bodies settle instead of bouncing forever.
pub fn reflect_walls(
    pool: &mut EntityPool,
    p: &ForceParams,
    bounds: &Bounds,
    events: &mut Vec<SimEvent>,
) {
    let floor_rest = crate::core::math::lerp(WALL_RESTITUTION, FLOOR_RESTITUTION_HEAVY, p.gravity);
    let audible = p.void < VOID_DOMINANT;

    for e in pool.entities_mut() {
        if e.radius <= 0.0 {
            continue;
        }
        let mut impact = 0.0f32;
        let mut impact_normal = Vec3::ZERO;

        for axis in 0..3 {
            let half = bounds.half[axis];
            let r = e.radius.min(half * 0.5);
            let (lo, hi) = (-half + r, half - r);
            let pos = e.pos[axis];
            let rest = if axis == 1 && pos < lo {
                floor_rest
            } else {
                WALL_RESTITUTION
            };

            if pos < lo {
                e.pos[axis] = lo;
                if e.vel[axis] < 0.0 {
                    impact = impact.max(-e.vel[axis]);
                    impact_normal[axis] = 1.0;
                    e.vel[axis] = -e.vel[axis] * rest;
                }
            } else if pos > hi {
                e.pos[axis] = hi;
                if e.vel[axis] > 0.0 {
                    impact = impact.max(e.vel[axis]);
                    impact_normal[axis] = -1.0;
                    e.vel[axis] = -e.vel[axis] * rest;
                }
            }
        }

        if impact > WALL_IMPACT_MIN {
            e.deform.kick(impact_normal.normalize_or_zero(), impact);
            if audible {
                events.push(SimEvent::Wall {
                    id: e.id,
                    pos: e.pos,
                    vel: e.vel,
                    radius: e.radius,
                    impulse: impact,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn pool_with(positions: &[(Vec3, f32)]) -> EntityPool {
        let mut pool = EntityPool::with_capacity(positions.len(), 0);
        for &(pos, radius) in positions {
            let i = pool.acquire();
            let e = &mut pool.entities_mut()[i];
            e.pos = pos;
            e.radius = radius;
        }
        pool
    }

    #[test]
    fn approaching_pair_receives_impulse() {
        let mut pool = pool_with(&[
            (Vec3::new(-0.2, 0.0, 0.0), 0.3),
            (Vec3::new(0.2, 0.0, 0.0), 0.3),
        ]);
        pool.entities_mut()[0].vel = Vec3::new(1.0, 0.0, 0.0);
        pool.entities_mut()[1].vel = Vec3::new(-1.0, 0.0, 0.0);
        let p = ForceParams {
            merge: 0.0,
            ..ForceParams::default()
        };
        let mut rng = SmallRng::seed_from_u64(1);
        let mut events = Vec::new();
        resolve_pairs(&mut pool, &p, &mut rng, &mut events);
        assert!(pool.entities()[0].vel.x < 0.0);
        assert!(pool.entities()[1].vel.x > 0.0);
        assert!(matches!(events[0], SimEvent::Contact { .. }));
    }

    #[test]
    fn separating_pair_receives_no_impulse() {
        let mut pool = pool_with(&[
            (Vec3::new(-0.2, 0.0, 0.0), 0.3),
            (Vec3::new(0.2, 0.0, 0.0), 0.3),
        ]);
        pool.entities_mut()[0].vel = Vec3::new(-1.0, 0.0, 0.0);
        pool.entities_mut()[1].vel = Vec3::new(1.0, 0.0, 0.0);
        let p = ForceParams {
            merge: 0.0,
            ..ForceParams::default()
        };
        let mut rng = SmallRng::seed_from_u64(1);
        let mut events = Vec::new();
        resolve_pairs(&mut pool, &p, &mut rng, &mut events);
        // De-overlap may move positions; velocities must be untouched.
        assert_eq!(pool.entities()[0].vel, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(pool.entities()[1].vel, Vec3::new(1.0, 0.0, 0.0));
        assert!(events.is_empty());
    }

    #[test]
    fn merge_conserves_volume() {
        let mut pool = pool_with(&[
            (Vec3::new(-0.1, 0.0, 0.0), 0.3),
            (Vec3::new(0.1, 0.0, 0.0), 0.2),
        ]);
        let p = ForceParams {
            merge: 1.0,
            ..ForceParams::default()
        };
        let mut rng = SmallRng::seed_from_u64(1);
        let mut events = Vec::new();
        resolve_pairs(&mut pool, &p, &mut rng, &mut events);
        let expected = (0.3f32.powi(3) + 0.2f32.powi(3)).cbrt();
        let survivor = pool
            .entities()
            .iter()
            .find(|e| e.radius > 0.0)
            .expect("one survivor");
        assert!((survivor.radius - expected).abs() < 1e-6);
        let loser = pool.entities().iter().find(|e| e.radius <= 0.0);
        assert!(loser.is_some(), "loser keeps a zero radius until the sweep");
    }

    #[test]
    fn wall_reflects_and_emits_event() {
        let bounds = Bounds::new(Vec3::new(1.0, 1.0, 1.0));
        let mut pool = pool_with(&[(Vec3::new(2.0, 0.0, 0.0), 0.2)]);
        pool.entities_mut()[0].vel = Vec3::new(3.0, 0.0, 0.0);
        let p = ForceParams::default();
        let mut events = Vec::new();
        reflect_walls(&mut pool, &p, &bounds, &mut events);
        let e = &pool.entities()[0];
        assert!(e.vel.x < 0.0, "velocity should reflect");
        assert!(e.pos.x <= bounds.half.x);
        assert!(matches!(events[0], SimEvent::Wall { .. }));
    }

    #[test]
    fn void_dominant_walls_are_silent() {
        let bounds = Bounds::new(Vec3::new(1.0, 1.0, 1.0));
        let mut pool = pool_with(&[(Vec3::new(2.0, 0.0, 0.0), 0.2)]);
        pool.entities_mut()[0].vel = Vec3::new(3.0, 0.0, 0.0);
        let p = ForceParams {
            void: 0.9,
            ..ForceParams::default()
        };
        let mut events = Vec::new();
        reflect_walls(&mut pool, &p, &bounds, &mut events);
        assert!(events.is_empty());
        assert!(pool.entities()[0].vel.x < 0.0, "reflection still happens");
    }

    #[test]
    fn close_pairs_keeps_three_smallest() {
        let mut close = ClosePairs::default();
        close.offer(1, 2, 5.0);
        close.offer(3, 4, 1.0);
        close.offer(5, 6, 3.0);
        close.offer(7, 8, 2.0);
        let dists: Vec<f32> = close.iter().map(|(_, _, d)| d).collect();
        assert_eq!(dists.len(), 3);
        assert!(dists.contains(&1.0) && dists.contains(&2.0) && dists.contains(&3.0));
    }
}
