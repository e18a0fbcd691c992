use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::trace;

use crate::sim::entity::SourceRef;

use super::bank::SampleBank;
use super::scale::{self, MusicContext};
use super::voice::{Voice, sample_source, synth_source};

/// Depth-filter cutoff range. Depth 0 is close and bright, depth 1 is far
/// and muffled; interpolation is exponential, matching perceived distance.
const CUTOFF_NEAR_HZ: f32 = 12_000.0;
const CUTOFF_FAR_HZ: f32 = 500.0;
/// Frequency above which a synth trigger gets the brief FM burst.
const FM_THRESHOLD_HZ: f32 = 900.0;

/// One trigger request from the event bridge.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    /// Body size factor, 1.0 at the reference radius.
    pub size: f32,
    pub pan: f32,
    pub depth: f32,
    pub z_vel: f32,
    pub doppler: f32,
    pub reverse: bool,
    pub volume: f32,
    pub source: Option<SourceRef>,
}

/// Bounded-polyphony, fire-and-forget voice allocator. Owns the sample bank
/// and every live voice; finished voices are drained from the registry each
/// rendered block.
pub struct VoiceEngine {
    fs: f32,
    voices: Vec<Voice>,
    max_voices: usize,
    bank: SampleBank,
    rng: SmallRng,
    rejected: u64,
}

impl VoiceEngine {
    pub fn new(fs: f32, max_voices: usize, bank: SampleBank) -> Self {
        Self {
            fs: fs.max(1.0),
            voices: Vec::with_capacity(max_voices),
            max_voices: max_voices.max(1),
            bank,
            rng: SmallRng::from_os_rng(),
            rejected: 0,
        }
    }

    pub fn bank(&self) -> &SampleBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut SampleBank {
        &mut self.bank
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Triggers dropped at the polyphony ceiling since startup.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Start one voice. Silently dropped at the polyphony ceiling; that is
    /// the contract, not an error.
    pub fn trigger(&mut self, t: Trigger, music: &MusicContext) {
        if self.voices.len() >= self.max_voices {
            self.rejected += 1;
            return;
        }
        if !t.volume.is_finite() || t.volume <= 0.0 {
            return;
        }

        // Harmonic quantization, then size octave, then doppler.
        let degree = music.pick_degree(&mut self.rng);
        let shifted = degree * scale::semitone_ratio(12.0 * scale::octave_shift(t.size) as f32);
        let freq = scale::clamp_audible(shifted * scale::doppler_ratio(t.z_vel, t.doppler));

        let cutoff =
            CUTOFF_NEAR_HZ * (CUTOFF_FAR_HZ / CUTOFF_NEAR_HZ).powf(t.depth.clamp(0.0, 1.0));
        let decay_tau = 0.12 + 0.22 * t.size.clamp(0.1, 4.0);

        let source = match t.source.and_then(|r| self.bank.resolve(r)) {
            Some(buffer) => {
                let root = if music.root_hz > 0.0 { music.root_hz } else { 220.0 };
                sample_source(buffer, freq / root, t.reverse)
            }
            // Stale or absent source handle: default synthesis path.
            None => {
                let fm = if freq > FM_THRESHOLD_HZ { 1.6 } else { 0.0 };
                synth_source(fm)
            }
        };

        trace!(freq, vol = t.volume, pan = t.pan, "voice start");
        self.voices.push(Voice::new(
            source,
            freq,
            t.volume,
            t.pan,
            cutoff,
            decay_tau,
            self.fs,
        ));
    }

    /// Render all active voices additively into a zeroed stereo block, then
    /// drain the finished ones.
    pub fn render_block(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        for voice in self.voices.iter_mut() {
            voice.render_add(out, self.fs);
        }
        self.voices.retain(|v| !v.is_done());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(max: usize) -> VoiceEngine {
        VoiceEngine::new(48_000.0, max, SampleBank::with_slots(4))
    }

    fn basic_trigger() -> Trigger {
        Trigger {
            size: 1.0,
            pan: 0.0,
            depth: 0.0,
            z_vel: 0.0,
            doppler: 0.5,
            reverse: false,
            volume: 0.8,
            source: None,
        }
    }

    #[test]
    fn polyphony_ceiling_drops_silently() {
        let mut eng = engine(4);
        let music = MusicContext::default();
        for _ in 0..10 {
            eng.trigger(basic_trigger(), &music);
        }
        assert_eq!(eng.active_voices(), 4);
        assert_eq!(eng.rejected(), 6);
    }

    #[test]
    fn finished_voices_are_drained() {
        let mut eng = engine(8);
        let music = MusicContext::default();
        let mut t = basic_trigger();
        t.size = 0.1; // short decay
        eng.trigger(t, &music);
        assert_eq!(eng.active_voices(), 1);
        let mut buf = vec![0.0f32; 1024];
        for _ in 0..200 {
            eng.render_block(&mut buf);
        }
        assert_eq!(eng.active_voices(), 0);
    }

    #[test]
    fn stale_source_falls_back_to_synth() {
        let mut eng = engine(8);
        let music = MusicContext::default();
        let r = eng
            .bank_mut()
            .load(0, (0..64).map(|_| 0.1f32).collect())
            .unwrap();
        eng.bank_mut().invalidate(0);
        let mut t = basic_trigger();
        t.source = Some(r);
        eng.trigger(t, &music);
        assert_eq!(eng.active_voices(), 1, "stale handle must still sound");
        let mut buf = vec![0.0f32; 2048];
        eng.render_block(&mut buf);
        assert!(buf.iter().any(|s| s.abs() > 1e-4));
    }

    #[test]
    fn zero_volume_trigger_is_ignored() {
        let mut eng = engine(8);
        let music = MusicContext::default();
        let mut t = basic_trigger();
        t.volume = 0.0;
        eng.trigger(t, &music);
        assert_eq!(eng.active_voices(), 0);
    }

    #[test]
    fn render_output_stays_finite() {
        let mut eng = engine(24);
        let music = MusicContext::default();
        for i in 0..24 {
            let mut t = basic_trigger();
            t.pan = (i as f32 / 12.0) - 1.0;
            eng.trigger(t, &music);
        }
        let mut buf = vec![0.0f32; 1024];
        for _ in 0..50 {
            eng.render_block(&mut buf);
            assert!(buf.iter().all(|s| s.is_finite()));
        }
    }
}
