use glam::Vec3;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, info};

use crate::core::math::{Bounds, clamp_length, is_finite};

use super::collision::{self, ClosePairs};
use super::entity::{EntityId, SourceRef};
use super::forces;
use super::governor::{Governor, GovernorConfig};
use super::params::ForceParams;
use super::pool::EntityPool;

/// Simulation results that can produce sound, drained by the event bridge
/// after every tick. Payloads carry everything the spatial mapper needs so
/// the bridge never reaches back into the pool.
#[derive(Debug, Clone, Copy)]
pub enum SimEvent {
    Wall {
        id: EntityId,
        pos: Vec3,
        vel: Vec3,
        radius: f32,
        impulse: f32,
    },
    Contact {
        a: EntityId,
        b: EntityId,
        pos: Vec3,
        vel: Vec3,
        radius: f32,
        impulse: f32,
    },
    Merge {
        survivor: EntityId,
        pos: Vec3,
        vel: Vec3,
        radius: f32,
    },
}

impl SimEvent {
    pub fn primary_id(&self) -> EntityId {
        match self {
            SimEvent::Wall { id, .. } => *id,
            SimEvent::Contact { a, .. } => *a,
            SimEvent::Merge { survivor, .. } => *survivor,
        }
    }
}

/// External audio-source bank, seen from the simulation as a weak directory:
/// handles can be requested and can go stale at any time.
pub trait SourceDirectory {
    fn assign(&self) -> Option<SourceRef>;
    fn validate(&self, r: SourceRef) -> bool;
}

/// Directory with nothing to hand out; every entity falls back to synthesis.
pub struct NoSources;

impl SourceDirectory for NoSources {
    fn assign(&self) -> Option<SourceRef> {
        None
    }
    fn validate(&self, _r: SourceRef) -> bool {
        false
    }
}

const MIN_RADIUS: f32 = 0.02;
const SPAWN_RADIUS_LO: f32 = 0.18;
const SPAWN_RADIUS_HI: f32 = 0.42;
const BUD_RATE: f32 = 0.25;
const BUD_MIN_RADIUS: f32 = 0.2;
const FRAG_RATE: f32 = 0.12;
const FRAG_MIN_RADIUS: f32 = 0.24;
const OVERLAY_JUMP_PROB: f32 = 0.08;
const OVERLAY_JUMP_RADIUS: f32 = 2.0;
const BURST_PARTICLES: usize = 6;
const PARTICLE_FADE_RATE: f32 = 1.4;

/// One tick of the coupled physics loop. Owns the pool and the governor;
/// reads a parameter snapshot each frame and emits sound events.
pub struct Simulation {
    pool: EntityPool,
    governor: Governor,
    bounds: Bounds,
    rng: SmallRng,
    time_sec: f32,
    paused: bool,
    events: Vec<SimEvent>,
    close_pairs: ClosePairs,
    flock_scratch: Vec<Vec3>,
    remove_scratch: Vec<EntityId>,
}

impl Simulation {
    pub fn new(bounds: Bounds, governor: GovernorConfig) -> Self {
        Self {
            pool: EntityPool::with_capacity(64, 256),
            governor: Governor::new(governor),
            bounds,
            rng: SmallRng::from_os_rng(),
            time_sec: 0.0,
            paused: false,
            events: Vec::new(),
            close_pairs: ClosePairs::default(),
            flock_scratch: Vec::new(),
            remove_scratch: Vec::new(),
        }
    }

    pub fn pool(&self) -> &EntityPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut EntityPool {
        &mut self.pool
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn time_sec(&self) -> f32 {
        self.time_sec
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn close_pairs(&self) -> &ClosePairs {
        &self.close_pairs
    }

    /// Spawn a new entity at `pos` with randomized radius, charge, and drift,
    /// requesting an audio source from the directory.
    pub fn spawn_at(&mut self, pos: Vec3, sources: &dyn SourceDirectory) -> EntityId {
        let radius = self.rng.random_range(SPAWN_RADIUS_LO..SPAWN_RADIUS_HI);
        let charge = if self.rng.random::<bool>() { 1.0 } else { -1.0 };
        let drift = crate::core::math::random_unit(&mut self.rng) * self.rng.random_range(0.0..0.4);
        let phase = self.rng.random_range(0.0..std::f32::consts::TAU);
        let now = self.time_sec;

        let i = self.pool.acquire();
        let e = &mut self.pool.entities_mut()[i];
        e.pos = self.bounds.clamp_point(pos);
        e.vel = drift;
        e.radius = radius;
        e.charge = charge;
        e.wobble_phase = phase;
        e.spawned_at = now;
        e.source = sources.assign();
        e.id
    }

    /// Spawn with an explicit velocity (grab-and-throw hand-off).
    pub fn spawn_thrown(
        &mut self,
        pos: Vec3,
        vel: Vec3,
        sources: &dyn SourceDirectory,
    ) -> EntityId {
        let id = self.spawn_at(pos, sources);
        if let Some(e) = self.pool.get_by_id_mut(id) {
            e.vel = if is_finite(vel) { vel } else { Vec3::ZERO };
        }
        id
    }

    /// Release everything and zero governor/spatial state. The audio graph
    /// is persistent and untouched by design.
    pub fn reset(&mut self) {
        info!(entities = self.pool.len(), "simulation reset");
        self.pool.clear();
        self.governor.reset();
        self.events.clear();
        self.close_pairs = ClosePairs::default();
        self.time_sec = 0.0;
    }

    /// Advance one frame. `raw_dt` is the measured wall delta; the tempo
    /// knob scales motion inside, never the governor's clock. Returns the
    /// sound events produced this tick.
    pub fn update(
        &mut self,
        raw_dt: f32,
        params: &ForceParams,
        sources: &dyn SourceDirectory,
    ) -> &[SimEvent] {
        let raw_dt = if raw_dt.is_finite() { raw_dt.clamp(0.0, 0.5) } else { 0.0 };
        let p = params.sanitized();
        self.events.clear();

        self.governor.observe(raw_dt, self.time_sec);
        self.time_sec += raw_dt;
        let now = self.time_sec;

        // Deformation relaxes every frame, paused or not.
        let relax_dt = p.scaled_dt(raw_dt);
        for e in self.pool.entities_mut() {
            e.deform.relax(relax_dt);
        }
        self.pool.update_particles(raw_dt, PARTICLE_FADE_RATE);

        if self.paused {
            for e in self.pool.entities_mut() {
                e.wobble_phase =
                    (e.wobble_phase + relax_dt * 2.1).rem_euclid(std::f32::consts::TAU);
            }
            return &self.events;
        }

        forces::accumulate_flocking(self.pool.entities(), &p, &mut self.flock_scratch);
        forces::apply_magneto(self.pool.entities_mut(), &p, raw_dt);

        self.remove_scratch.clear();
        for (i, e) in self.pool.entities_mut().iter_mut().enumerate() {
            let flock = self
                .flock_scratch
                .get(i)
                .copied()
                .unwrap_or(Vec3::ZERO);
            let expired = forces::step_entity(
                e,
                flock,
                &p,
                &self.bounds,
                raw_dt,
                now,
                &mut self.rng,
            );
            if expired {
                self.remove_scratch.push(e.id);
            }
        }

        self.close_pairs = collision::resolve_pairs(&mut self.pool, &p, &mut self.rng, &mut self.events);
        collision::reflect_walls(&mut self.pool, &p, &self.bounds, &mut self.events);

        self.sweep_dead();
        self.split_and_bud(&p, raw_dt);

        // Collisions and splits add velocity after the force clamp; re-apply
        // the ceiling so the bound holds at tick exit.
        let cap = forces::speed_cap(p.tempo);
        for e in self.pool.entities_mut() {
            if !is_finite(e.vel) {
                e.vel = Vec3::ZERO;
                e.pos = self.bounds.clamp_point(e.pos);
            }
            e.vel = clamp_length(e.vel, cap);
        }

        self.tick_overlays(raw_dt);
        self.validate_sources(sources);
        self.shed_for_governor();

        &self.events
    }

    /// Remove capture-expired and collapsed entities, each with a debris
    /// burst. Radius ≤ 0 never survives past this frame.
    fn sweep_dead(&mut self) {
        for k in 0..self.remove_scratch.len() {
            let id = self.remove_scratch[k];
            if let Some(e) = self.pool.get_by_id(id) {
                let (pos, radius) = (e.pos, e.radius.max(0.1));
                self.burst(pos, radius);
                self.pool.remove_by_id(id);
            }
        }
        self.remove_scratch.clear();

        let mut i = 0;
        while i < self.pool.len() {
            if self.pool.entities()[i].radius <= MIN_RADIUS {
                let pos = self.pool.entities()[i].pos;
                self.burst(pos, 0.15);
                self.pool.remove_at(i);
            } else {
                i += 1;
            }
        }
    }

    /// Random fragmentation and budding driven by their knobs. Budding is
    /// suppressed while the governor is degraded.
    fn split_and_bud(&mut self, p: &ForceParams, dt: f32) {
        let budding_allowed = self.governor.budding_allowed();
        let frag_p = p.fragmentation * FRAG_RATE * dt;
        let bud_p = p.budding * BUD_RATE * dt;
        if frag_p <= 0.0 && bud_p <= 0.0 {
            return;
        }

        let mut splits: Vec<(Vec3, Vec3, f32, f32)> = Vec::new();
        for e in self.pool.entities_mut() {
            if e.radius > FRAG_MIN_RADIUS && self.rng.random::<f32>() < frag_p {
                // Break into two equal halves, volume conserved.
                let child_r = e.radius / 2f32.cbrt();
                let away = crate::core::math::random_unit(&mut self.rng);
                e.radius = child_r;
                e.vel += away * 0.6;
                splits.push((e.pos - away * child_r, e.vel - away * 1.2, child_r, e.charge));
            } else if budding_allowed && e.radius > BUD_MIN_RADIUS && self.rng.random::<f32>() < bud_p
            {
                // A small child pinches off; the parent shrinks to conserve
                // volume.
                let child_r = e.radius * 0.55;
                let parent_r = (e.radius.powi(3) - child_r.powi(3)).max(0.0).cbrt();
                let away = crate::core::math::random_unit(&mut self.rng);
                e.radius = parent_r.max(MIN_RADIUS * 2.0);
                splits.push((e.pos + away * (parent_r + child_r), e.vel + away * 0.4, child_r, -e.charge));
            }
        }

        for (pos, vel, radius, charge) in splits {
            let now = self.time_sec;
            let phase = self.rng.random_range(0.0..std::f32::consts::TAU);
            let i = self.pool.acquire();
            let e = &mut self.pool.entities_mut()[i];
            e.pos = self.bounds.clamp_point(pos);
            e.vel = vel;
            e.radius = radius;
            e.charge = charge;
            e.wobble_phase = phase;
            e.spawned_at = now;
        }
    }

    /// Overlay countdown plus the rare lightning jump to the nearest
    /// overlay-free neighbor. Jumps are applied after the sweep so a
    /// relocated overlay is ticked and rolled at most once per frame.
    fn tick_overlays(&mut self, dt: f32) {
        let entities = self.pool.entities_mut();
        let mut jumps: Vec<(usize, usize)> = Vec::new();
        for i in 0..entities.len() {
            let Some(mut overlay) = entities[i].overlay else {
                continue;
            };
            overlay.ttl_sec -= dt;
            if overlay.ttl_sec <= 0.0 {
                entities[i].overlay = None;
                continue;
            }
            entities[i].overlay = Some(overlay);

            if self.rng.random::<f32>() < OVERLAY_JUMP_PROB * dt {
                let from = entities[i].pos;
                let mut best: Option<(usize, f32)> = None;
                for (j, other) in entities.iter().enumerate() {
                    if j == i || other.overlay.is_some() {
                        continue;
                    }
                    let d = other.pos.distance(from);
                    if d < OVERLAY_JUMP_RADIUS && best.is_none_or(|(_, bd)| d < bd) {
                        best = Some((j, d));
                    }
                }
                if let Some((j, _)) = best {
                    jumps.push((i, j));
                }
            }
        }

        for (i, j) in jumps {
            // Two overlays may have picked the same target; first one wins.
            if entities[j].overlay.is_none()
                && let Some(overlay) = entities[i].overlay.take()
            {
                entities[j].overlay = Some(overlay);
                debug!(from = entities[i].id, to = entities[j].id, "overlay jump");
            }
        }
    }

    /// Drop source references the bank has invalidated; the entity keeps
    /// sounding through the default synthesis path.
    fn validate_sources(&mut self, sources: &dyn SourceDirectory) {
        for e in self.pool.entities_mut() {
            if let Some(r) = e.source
                && !sources.validate(r)
            {
                e.source = None;
            }
        }
    }

    /// Governor-driven load shedding: remove the oldest eligible entities,
    /// never below the floor, each with a debris burst.
    fn shed_for_governor(&mut self) {
        let want = self
            .governor
            .shed_request(self.pool.len(), self.pool.assigned_source_count());
        if want == 0 {
            return;
        }
        let grace = self.governor.config().grace_age_sec;
        let now = self.time_sec;

        let mut eligible: Vec<(EntityId, f32)> = self
            .pool
            .entities()
            .iter()
            .filter(|e| e.age(now) > grace)
            .map(|e| (e.id, e.spawned_at))
            .collect();
        eligible.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut shed = 0;
        for (id, _) in eligible.into_iter().take(want) {
            if let Some(e) = self.pool.get_by_id(id) {
                let (pos, radius) = (e.pos, e.radius);
                self.burst(pos, radius);
                self.pool.remove_by_id(id);
                shed += 1;
            }
        }
        if shed > 0 {
            debug!(shed, live = self.pool.len(), fps = self.governor.fps(), "governor shed");
        }
    }

    fn burst(&mut self, pos: Vec3, radius: f32) {
        for _ in 0..BURST_PARTICLES {
            let dir = crate::core::math::random_unit(&mut self.rng);
            let speed = self.rng.random_range(0.3..1.2);
            let size = self.rng.random_range(0.01..0.05) * (1.0 + radius);
            let p = self.pool.spawn_particle();
            p.pos = pos;
            p.vel = dir * speed;
            p.size = size;
            p.color = [0.8, 0.85, 1.0];
        }
    }
}
