use rand::Rng;
use rand::seq::IndexedRandom;

/// Audible clamp for every triggered frequency.
pub const FREQ_MIN_HZ: f32 = 40.0;
pub const FREQ_MAX_HZ: f32 = 8_000.0;

/// Current root and scale, resolved by the external music-theory collaborator
/// and consumed here as plain data. Intervals are semitone offsets within one
/// octave.
#[derive(Debug, Clone)]
pub struct MusicContext {
    pub root_hz: f32,
    pub intervals: Vec<i16>,
}

impl Default for MusicContext {
    fn default() -> Self {
        // Minor pentatonic on A3; any scale the collaborator resolves slots
        // in the same way.
        Self {
            root_hz: 220.0,
            intervals: vec![0, 3, 5, 7, 10],
        }
    }
}

impl MusicContext {
    /// Snap a trigger to the scale: random degree over the root.
    pub fn pick_degree<R: Rng>(&self, rng: &mut R) -> f32 {
        let root = if self.root_hz.is_finite() && self.root_hz > 0.0 {
            self.root_hz
        } else {
            220.0
        };
        let semis = self.intervals.choose(rng).copied().unwrap_or(0);
        root * semitone_ratio(semis as f32)
    }
}

pub fn semitone_ratio(semis: f32) -> f32 {
    (2.0f32).powf(semis / 12.0)
}

/// Octave shift from body size: large bodies speak low, small ones high.
pub fn octave_shift(size: f32) -> i32 {
    let size = size.clamp(0.1, 4.0);
    (-size.log2()).round().clamp(-2.0, 2.0) as i32
}

/// Doppler pitch multiplier from velocity toward the listener, scaled by the
/// doppler knob.
pub fn doppler_ratio(z_vel: f32, intensity: f32) -> f32 {
    let z = if z_vel.is_finite() { z_vel } else { 0.0 };
    1.0 + (z * intensity.clamp(0.0, 1.0) * 0.06).clamp(-0.35, 0.35)
}

pub fn clamp_audible(freq: f32) -> f32 {
    if freq.is_finite() {
        freq.clamp(FREQ_MIN_HZ, FREQ_MAX_HZ)
    } else {
        440.0
    }
}
