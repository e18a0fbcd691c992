use std::collections::VecDeque;

use glam::Vec3;

use crate::core::math::{clamp_length, is_finite};

use super::entity::EntityId;
use super::step::{Simulation, SourceDirectory};

/// Recent pointer samples kept for throw-velocity estimation.
const HISTORY_WINDOW_SEC: f32 = 0.12;
const HISTORY_MAX: usize = 32;
/// Minimum spacing between drag-painted spawns.
const PAINT_SPACING: f32 = 0.5;
/// Pick-up distance around an entity center, scaled by its radius.
const GRAB_FACTOR: f32 = 1.4;
const THROW_SPEED_MAX: f32 = 8.0;

/// Pointer/touch interface: click to spawn, drag to paint a trail of spawns,
/// or grab an existing entity and throw it. Thrown velocity comes from the
/// recent pointer motion and is handed to physics like any other velocity.
#[derive(Debug, Default)]
pub struct PointerTracker {
    history: VecDeque<(f32, Vec3)>,
    grabbed: Option<EntityId>,
    last_paint: Option<Vec3>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grabbed(&self) -> Option<EntityId> {
        self.grabbed
    }

    pub fn press(
        &mut self,
        pos: Vec3,
        now: f32,
        sim: &mut Simulation,
        sources: &dyn SourceDirectory,
    ) {
        self.history.clear();
        self.push_sample(now, pos);

        let hit = sim
            .pool()
            .entities()
            .iter()
            .find(|e| e.pos.distance(pos) <= e.radius * GRAB_FACTOR)
            .map(|e| e.id);

        match hit {
            Some(id) => {
                self.grabbed = Some(id);
                self.last_paint = None;
            }
            None => {
                sim.spawn_at(pos, sources);
                self.grabbed = None;
                self.last_paint = Some(pos);
            }
        }
    }

    pub fn drag(
        &mut self,
        pos: Vec3,
        now: f32,
        sim: &mut Simulation,
        sources: &dyn SourceDirectory,
    ) {
        if !is_finite(pos) {
            return;
        }
        self.push_sample(now, pos);

        if let Some(id) = self.grabbed {
            if let Some(e) = sim.pool_mut().get_by_id_mut(id) {
                e.pos = pos;
                e.vel = Vec3::ZERO;
            } else {
                // The grabbed entity was merged or shed out from under us.
                self.grabbed = None;
            }
            return;
        }

        let spaced = self
            .last_paint
            .is_none_or(|last| last.distance(pos) >= PAINT_SPACING);
        if spaced {
            sim.spawn_at(pos, sources);
            self.last_paint = Some(pos);
        }
    }

    pub fn release(&mut self, sim: &mut Simulation) {
        if let Some(id) = self.grabbed.take()
            && let Some(e) = sim.pool_mut().get_by_id_mut(id)
        {
            e.vel = self.throw_velocity();
        }
        self.history.clear();
        self.last_paint = None;
    }

    /// Velocity over the recent history window, zero when the pointer was
    /// effectively still.
    fn throw_velocity(&self) -> Vec3 {
        let (Some(&(t_new, p_new)), Some(&(t_old, p_old))) =
            (self.history.back(), self.history.front())
        else {
            return Vec3::ZERO;
        };
        let span = t_new - t_old;
        if span <= 1e-4 {
            return Vec3::ZERO;
        }
        let v = (p_new - p_old) / span;
        if is_finite(v) {
            clamp_length(v, THROW_SPEED_MAX)
        } else {
            Vec3::ZERO
        }
    }

    fn push_sample(&mut self, now: f32, pos: Vec3) {
        self.history.push_back((now, pos));
        while self.history.len() > HISTORY_MAX {
            self.history.pop_front();
        }
        while let Some(&(t, _)) = self.history.front() {
            if now - t > HISTORY_WINDOW_SEC && self.history.len() > 2 {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.grabbed = None;
        self.last_paint = None;
    }
}
