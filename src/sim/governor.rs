use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::math::lerp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovState {
    Nominal,
    Degrading,
    Shedding,
    Recovering,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Below this fps the governor starts degrading.
    #[serde(default = "GovernorConfig::default_low_fps")]
    pub low_fps: f32,
    /// Above this fps recovery begins.
    #[serde(default = "GovernorConfig::default_mid_fps")]
    pub mid_fps: f32,
    /// Delay between entering Degrading and arming Shedding, letting
    /// transient stutters pass.
    #[serde(default = "GovernorConfig::default_arm_delay")]
    pub arm_delay_sec: f32,
    /// Sustained time above mid_fps before returning to Nominal.
    #[serde(default = "GovernorConfig::default_hold")]
    pub hold_sec: f32,
    /// Entities younger than this are never shed.
    #[serde(default = "GovernorConfig::default_grace_age")]
    pub grace_age_sec: f32,
    /// Absolute shedding floor (raised by the assigned-source count).
    #[serde(default = "GovernorConfig::default_floor")]
    pub floor_min: usize,
    /// A frame delta above this is a throttled/hidden frame, not a real
    /// degraded sample; it resets the counters.
    #[serde(default = "GovernorConfig::default_spike")]
    pub spike_dt_sec: f32,
}

impl GovernorConfig {
    fn default_low_fps() -> f32 {
        30.0
    }
    fn default_mid_fps() -> f32 {
        45.0
    }
    fn default_arm_delay() -> f32 {
        1.5
    }
    fn default_hold() -> f32 {
        0.8
    }
    fn default_grace_age() -> f32 {
        2.0
    }
    fn default_floor() -> usize {
        6
    }
    fn default_spike() -> f32 {
        0.25
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            low_fps: Self::default_low_fps(),
            mid_fps: Self::default_mid_fps(),
            arm_delay_sec: Self::default_arm_delay(),
            hold_sec: Self::default_hold(),
            grace_age_sec: Self::default_grace_age(),
            floor_min: Self::default_floor(),
            spike_dt_sec: Self::default_spike(),
        }
    }
}

const SHED_FRAC_MIN: f32 = 0.01;
const SHED_FRAC_MAX: f32 = 0.06;
const FPS_EMA_ALPHA: f32 = 0.1;

/// Adaptive load shedding with hysteresis: Nominal → Degrading → Shedding →
/// Recovering → Nominal. Sheds a small fraction of old entities per frame
/// while in Shedding, never below the floor.
#[derive(Debug)]
pub struct Governor {
    cfg: GovernorConfig,
    state: GovState,
    fps: f32,
    degrade_since: Option<f32>,
    above_since: Option<f32>,
}

impl Governor {
    pub fn new(cfg: GovernorConfig) -> Self {
        Self {
            cfg,
            state: GovState::Nominal,
            fps: 60.0,
            degrade_since: None,
            above_since: None,
        }
    }

    pub fn state(&self) -> GovState {
        self.state
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.cfg
    }

    /// Feed one measured frame delta and advance the state machine.
    pub fn observe(&mut self, raw_dt: f32, now: f32) {
        if !raw_dt.is_finite() || raw_dt <= 0.0 {
            return;
        }
        if raw_dt > self.cfg.spike_dt_sec {
            // Backgrounded tab / scheduler stall: forget, don't punish.
            self.degrade_since = None;
            self.above_since = None;
            return;
        }

        let instant = 1.0 / raw_dt;
        self.fps += FPS_EMA_ALPHA * (instant - self.fps);

        match self.state {
            GovState::Nominal => {
                if self.fps < self.cfg.low_fps {
                    debug!(fps = self.fps, "governor: degrading");
                    self.state = GovState::Degrading;
                    self.degrade_since = Some(now);
                }
            }
            GovState::Degrading => {
                if self.fps > self.cfg.mid_fps {
                    self.enter_recovering(now);
                } else if self
                    .degrade_since
                    .is_none_or(|since| now - since >= self.cfg.arm_delay_sec)
                {
                    debug!(fps = self.fps, "governor: shedding armed");
                    self.state = GovState::Shedding;
                }
            }
            GovState::Shedding => {
                if self.fps > self.cfg.mid_fps {
                    self.enter_recovering(now);
                }
            }
            GovState::Recovering => {
                if self.fps < self.cfg.low_fps {
                    self.state = GovState::Degrading;
                    self.degrade_since = Some(now);
                    self.above_since = None;
                } else if self
                    .above_since
                    .is_some_and(|since| now - since >= self.cfg.hold_sec)
                {
                    debug!(fps = self.fps, "governor: nominal");
                    self.state = GovState::Nominal;
                    self.above_since = None;
                }
            }
        }
    }

    fn enter_recovering(&mut self, now: f32) {
        self.state = GovState::Recovering;
        self.degrade_since = None;
        self.above_since = Some(now);
    }

    /// How many entities to shed this frame: a fraction of the live count
    /// scaled by how far below the low threshold we are, bounded by the
    /// floor. Zero outside the Shedding state.
    pub fn shed_request(&self, live: usize, assigned_sources: usize) -> usize {
        if self.state != GovState::Shedding {
            return 0;
        }
        let floor = self.cfg.floor_min.max(assigned_sources);
        if live <= floor {
            return 0;
        }
        let severity = ((self.cfg.low_fps - self.fps) / self.cfg.low_fps).clamp(0.0, 1.0);
        let frac = lerp(SHED_FRAC_MIN, SHED_FRAC_MAX, severity);
        let want = ((live as f32 * frac).ceil() as usize).max(1);
        want.min(live - floor)
    }

    /// Budding worsens load; suppressed whenever degraded.
    pub fn budding_allowed(&self) -> bool {
        matches!(self.state, GovState::Nominal | GovState::Recovering)
    }

    pub fn reset(&mut self) {
        self.state = GovState::Nominal;
        self.fps = 60.0;
        self.degrade_since = None;
        self.above_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(gov: &mut Governor, fps: f32, frames: usize, t0: f32) -> f32 {
        let dt = 1.0 / fps;
        let mut now = t0;
        for _ in 0..frames {
            now += dt;
            gov.observe(dt, now);
        }
        now
    }

    #[test]
    fn sustained_low_fps_arms_shedding() {
        let mut gov = Governor::new(GovernorConfig::default());
        let now = feed(&mut gov, 15.0, 120, 0.0);
        assert_eq!(gov.state(), GovState::Shedding);
        assert!(now > gov.cfg.arm_delay_sec);
        assert!(gov.shed_request(100, 0) > 0);
    }

    #[test]
    fn single_dip_does_not_shed() {
        let mut gov = Governor::new(GovernorConfig::default());
        let mut now = feed(&mut gov, 65.0, 30, 0.0);
        now += 1.0 / 20.0;
        gov.observe(1.0 / 20.0, now);
        assert_ne!(gov.state(), GovState::Shedding);
        feed(&mut gov, 65.0, 120, now);
        assert_ne!(gov.state(), GovState::Shedding);
        assert_eq!(gov.shed_request(50, 0), 0);
    }

    #[test]
    fn recovery_requires_hold_duration() {
        let mut gov = Governor::new(GovernorConfig::default());
        let now = feed(&mut gov, 15.0, 120, 0.0);
        assert_eq!(gov.state(), GovState::Shedding);
        // A few fast frames flip to Recovering but not yet Nominal.
        let now = feed(&mut gov, 120.0, 30, now);
        assert_eq!(gov.state(), GovState::Recovering);
        feed(&mut gov, 120.0, 200, now);
        // 200 frames at 120 fps is well past the 800 ms hold.
        assert_eq!(gov.state(), GovState::Nominal);
    }

    #[test]
    fn spike_frames_reset_counters() {
        let mut gov = Governor::new(GovernorConfig::default());
        feed(&mut gov, 15.0, 30, 0.0);
        let fps_before = gov.fps();
        gov.observe(1.0, 100.0);
        assert_eq!(gov.fps(), fps_before, "spike must not count as a sample");
    }

    #[test]
    fn shed_respects_floor() {
        let mut gov = Governor::new(GovernorConfig::default());
        feed(&mut gov, 10.0, 200, 0.0);
        assert_eq!(gov.state(), GovState::Shedding);
        assert_eq!(gov.shed_request(6, 0), 0);
        assert_eq!(gov.shed_request(5, 0), 0);
        assert_eq!(gov.shed_request(7, 0), 1);
        // Assigned sources raise the floor.
        assert_eq!(gov.shed_request(10, 10), 0);
    }

    #[test]
    fn budding_suppressed_while_degraded() {
        let mut gov = Governor::new(GovernorConfig::default());
        assert!(gov.budding_allowed());
        feed(&mut gov, 15.0, 200, 0.0);
        assert!(!gov.budding_allowed());
    }
}
