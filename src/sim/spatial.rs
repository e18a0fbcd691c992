use std::collections::HashMap;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::core::math::Bounds;
use crate::synth::engine::{Trigger, VoiceEngine};
use crate::synth::scale::MusicContext;

use super::entity::EntityId;
use super::params::ForceParams;
use super::step::SimEvent;

/// Radius that maps to size factor 1.0.
const REF_RADIUS: f32 = 0.3;
/// Impulse that maps to full trigger volume.
const REF_IMPULSE: f32 = 1.2;
const DISTANCE_ATTEN: f32 = 0.22;
/// Per-entity re-trigger cooldown; a body resting against a wall under
/// gravity contacts every frame and must not flood the voice engine.
const COOLDOWN_SEC: f32 = 0.07;
const COOLDOWN_TABLE_MAX: usize = 256;

/// Converts an entity's 3D state into voice-trigger parameters.
#[derive(Debug, Clone, Copy)]
pub struct SpatialMapper {
    bounds: Bounds,
}

impl SpatialMapper {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn map<R: Rng>(&self, ev: &SimEvent, p: &ForceParams, rng: &mut R) -> Trigger {
        let (pos, vel, radius, impulse) = match *ev {
            SimEvent::Wall {
                pos, vel, radius, impulse, ..
            } => (pos, vel, radius, impulse),
            SimEvent::Contact {
                pos, vel, radius, impulse, ..
            } => (pos, vel, radius, impulse),
            SimEvent::Merge {
                pos, vel, radius, ..
            } => (pos, vel, radius, REF_IMPULSE),
        };

        let pan = (pos.x / self.bounds.half.x).clamp(-1.0, 1.0);
        let depth = ((pos.z + self.bounds.half.z) / (2.0 * self.bounds.half.z)).clamp(0.0, 1.0);
        let size = (radius / REF_RADIUS).clamp(0.1, 4.0);

        let dist = pos.length();
        let atten = 1.0 / (1.0 + dist * DISTANCE_ATTEN);
        let strength = (impulse / REF_IMPULSE).clamp(0.15, 1.0);
        let volume = (size.min(1.5) * atten * strength).clamp(0.0, 1.0);

        Trigger {
            size,
            pan,
            depth,
            z_vel: vel.z,
            doppler: p.doppler,
            reverse: rng.random::<f32>() < p.reverse,
            volume,
            // Source identity rides on the entity, not the event payload;
            // the bridge fills it in before dispatch.
            source: None,
        }
    }
}

/// The only path from simulation results to the voice engine. Applies the
/// per-entity cooldown and forwards everything else untouched.
pub struct EventBridge {
    last_trigger: HashMap<EntityId, f32>,
    rng: SmallRng,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBridge {
    pub fn new() -> Self {
        Self {
            last_trigger: HashMap::new(),
            rng: SmallRng::from_os_rng(),
        }
    }

    pub fn dispatch(
        &mut self,
        events: &[SimEvent],
        sources: &[(EntityId, crate::sim::entity::SourceRef)],
        now: f32,
        mapper: &SpatialMapper,
        params: &ForceParams,
        music: &MusicContext,
        engine: &mut VoiceEngine,
    ) {
        for ev in events {
            let id = ev.primary_id();
            if let Some(&last) = self.last_trigger.get(&id)
                && now - last < COOLDOWN_SEC
            {
                continue;
            }
            self.last_trigger.insert(id, now);

            let mut trigger = mapper.map(ev, params, &mut self.rng);
            trigger.source = sources
                .iter()
                .find(|(eid, _)| *eid == id)
                .map(|(_, r)| *r);
            engine.trigger(trigger, music);
        }
        self.prune(now);
    }

    /// Whether an event for `id` would currently pass the cooldown.
    pub fn would_pass(&self, id: EntityId, now: f32) -> bool {
        self.last_trigger
            .get(&id)
            .is_none_or(|&last| now - last >= COOLDOWN_SEC)
    }

    fn prune(&mut self, now: f32) {
        if self.last_trigger.len() > COOLDOWN_TABLE_MAX {
            self.last_trigger
                .retain(|_, &mut last| now - last < COOLDOWN_SEC * 4.0);
        }
    }

    pub fn reset(&mut self) {
        self.last_trigger.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn wall_event(id: EntityId, pos: Vec3) -> SimEvent {
        SimEvent::Wall {
            id,
            pos,
            vel: Vec3::new(0.0, 0.0, 0.5),
            radius: 0.3,
            impulse: 1.0,
        }
    }

    #[test]
    fn pan_and_depth_are_normalized() {
        let bounds = Bounds::new(Vec3::new(2.0, 2.0, 2.0));
        let mapper = SpatialMapper::new(bounds);
        let mut rng = SmallRng::seed_from_u64(1);
        let p = ForceParams::default();

        let left = mapper.map(&wall_event(1, Vec3::new(-2.0, 0.0, -2.0)), &p, &mut rng);
        assert_eq!(left.pan, -1.0);
        assert_eq!(left.depth, 0.0);

        let right = mapper.map(&wall_event(1, Vec3::new(9.0, 0.0, 9.0)), &p, &mut rng);
        assert_eq!(right.pan, 1.0);
        assert_eq!(right.depth, 1.0);
    }

    #[test]
    fn nearby_events_are_louder() {
        let mapper = SpatialMapper::new(Bounds::default());
        let mut rng = SmallRng::seed_from_u64(2);
        let p = ForceParams::default();
        let near = mapper.map(&wall_event(1, Vec3::ZERO), &p, &mut rng);
        let far = mapper.map(&wall_event(1, Vec3::new(4.0, 3.0, 3.0)), &p, &mut rng);
        assert!(near.volume > far.volume);
    }

    #[test]
    fn cooldown_blocks_rapid_retrigger() {
        let mut bridge = EventBridge::new();
        assert!(bridge.would_pass(7, 0.0));
        bridge.last_trigger.insert(7, 0.0);
        assert!(!bridge.would_pass(7, 0.01));
        assert!(bridge.would_pass(7, 0.5));
    }
}
