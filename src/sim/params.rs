use serde::{Deserialize, Serialize};

/// Read-only snapshot of the global knob values, supplied once per frame by
/// the control surface. The simulation reads it and never mutates it.
///
/// Knobs are nominally 0..1 (`tempo` is a multiplier around 1.0). Values are
/// never rejected; formulas clamp defensively instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForceParams {
    /// Global time-scale multiplier applied to motion and decay.
    #[serde(default = "ForceParams::default_tempo")]
    pub tempo: f32,
    #[serde(default = "ForceParams::default_gravity")]
    pub gravity: f32,
    #[serde(default)]
    pub wind: f32,
    /// Viscosity damping ("freeze").
    #[serde(default)]
    pub freeze: f32,
    /// Central singularity field strength.
    #[serde(default)]
    pub void: f32,
    /// Pairwise charge force. 0.5 is neutral; above attracts, below repels.
    #[serde(default = "ForceParams::default_magneto")]
    pub magneto: f32,
    /// Flocking blend weight.
    #[serde(default)]
    pub wave: f32,
    #[serde(default)]
    pub fragmentation: f32,
    #[serde(default)]
    pub budding: f32,
    /// Probability that a contacting pair merges instead of bouncing.
    #[serde(default = "ForceParams::default_merge")]
    pub merge: f32,
    /// Probability that a sample-backed trigger plays time-reversed.
    #[serde(default)]
    pub reverse: f32,
    #[serde(default = "ForceParams::default_doppler")]
    pub doppler: f32,
}

impl ForceParams {
    fn default_tempo() -> f32 {
        1.0
    }
    fn default_gravity() -> f32 {
        0.3
    }
    fn default_magneto() -> f32 {
        0.5
    }
    fn default_merge() -> f32 {
        0.15
    }
    fn default_doppler() -> f32 {
        0.5
    }

    /// Replace non-finite knobs with their defaults and clamp the rest into
    /// their working ranges. Called once per frame on the incoming snapshot.
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        let fix = |v: &mut f32, fallback: f32, lo: f32, hi: f32| {
            if !v.is_finite() {
                *v = fallback;
            }
            *v = v.clamp(lo, hi);
        };
        fix(&mut self.tempo, d.tempo, 0.0, 3.0);
        fix(&mut self.gravity, d.gravity, 0.0, 1.0);
        fix(&mut self.wind, d.wind, 0.0, 1.0);
        fix(&mut self.freeze, d.freeze, 0.0, 1.0);
        fix(&mut self.void, d.void, 0.0, 1.0);
        fix(&mut self.magneto, d.magneto, 0.0, 1.0);
        fix(&mut self.wave, d.wave, 0.0, 1.0);
        fix(&mut self.fragmentation, d.fragmentation, 0.0, 1.0);
        fix(&mut self.budding, d.budding, 0.0, 1.0);
        fix(&mut self.merge, d.merge, 0.0, 1.0);
        fix(&mut self.reverse, d.reverse, 0.0, 1.0);
        fix(&mut self.doppler, d.doppler, 0.0, 1.0);
        self
    }

    /// Effective time step: wall dt scaled by tempo.
    pub fn scaled_dt(&self, dt: f32) -> f32 {
        dt * self.tempo
    }
}

impl Default for ForceParams {
    fn default() -> Self {
        Self {
            tempo: Self::default_tempo(),
            gravity: Self::default_gravity(),
            wind: 0.0,
            freeze: 0.0,
            void: 0.0,
            magneto: Self::default_magneto(),
            wave: 0.0,
            fragmentation: 0.0,
            budding: 0.0,
            merge: Self::default_merge(),
            reverse: 0.0,
            doppler: Self::default_doppler(),
        }
    }
}
