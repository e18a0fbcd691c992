use serde::{Deserialize, Serialize};

use std::sync::Arc;

use crate::core::smoothing::Smoothed;

use super::delay::PingPongDelay;
use super::eq::ThreeBandEq;
use super::limiter::{Limiter, LimiterMeter, LimiterParams};
use super::reverb::ConvolutionReverb;

/// Externally-set mix knobs, 0..1. EQ knobs map 0.5 to flat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioParams {
    #[serde(default = "AudioParams::default_volume")]
    pub volume: f32,
    #[serde(default = "AudioParams::default_half")]
    pub eq_low: f32,
    #[serde(default = "AudioParams::default_half")]
    pub eq_mid: f32,
    #[serde(default = "AudioParams::default_half")]
    pub eq_high: f32,
    #[serde(default = "AudioParams::default_reverb")]
    pub reverb_mix: f32,
    #[serde(default = "AudioParams::default_delay")]
    pub delay_mix: f32,
}

impl AudioParams {
    fn default_volume() -> f32 {
        0.8
    }
    fn default_half() -> f32 {
        0.5
    }
    fn default_reverb() -> f32 {
        0.25
    }
    fn default_delay() -> f32 {
        0.15
    }
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            volume: Self::default_volume(),
            eq_low: Self::default_half(),
            eq_mid: Self::default_half(),
            eq_high: Self::default_half(),
            reverb_mix: Self::default_reverb(),
            delay_mix: Self::default_delay(),
        }
    }
}

/// EQ knob range in dB on each side of flat.
const EQ_RANGE_DB: f32 = 12.0;
const MASTER_TAU_SEC: f32 = 0.02;
const REVERB_TAIL_SEC: f32 = 1.3;
const DELAY_L_SEC: f32 = 0.31;
const DELAY_R_SEC: f32 = 0.43;

/// Peak/RMS readings taken after the limiter, for stats and display.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisFrame {
    pub peak: [f32; 2],
    pub rms: [f32; 2],
}

/// The persistent master chain, built once per process: voices → reverb and
/// ping-pong delay in parallel with the dry path → 3-band EQ → master gain →
/// limiter → analysis tap. Every knob lands on a smoothing ramp, never on
/// the signal directly.
pub struct EffectsGraph {
    fs: f32,
    reverb: ConvolutionReverb,
    delay: PingPongDelay,
    eq: ThreeBandEq,
    master: Smoothed,
    limiter: Limiter,
    meter: Arc<LimiterMeter>,
    analysis: AnalysisFrame,
}

impl EffectsGraph {
    pub fn new(fs: f32, block_frames: usize) -> Self {
        let fs = fs.max(1.0);
        let mut master = Smoothed::new(0.0, 1.0 / fs, MASTER_TAU_SEC);
        master.snap(AudioParams::default_volume());
        let meter = Arc::new(LimiterMeter::default());
        Self {
            fs,
            reverb: ConvolutionReverb::new(fs, block_frames, REVERB_TAIL_SEC),
            delay: PingPongDelay::new(fs, DELAY_L_SEC, DELAY_R_SEC),
            eq: ThreeBandEq::new(fs, block_frames),
            master,
            limiter: Limiter::new(LimiterParams::default(), fs).with_meter(meter.clone()),
            meter,
            analysis: AnalysisFrame::default(),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.fs
    }

    /// Apply a knob snapshot. Targets move; the ramps do the rest.
    pub fn set_params(&mut self, p: &AudioParams) {
        let knob = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.5 };
        self.master.set_target(knob(p.volume));
        self.eq.set_gains_db(
            (knob(p.eq_low) - 0.5) * 2.0 * EQ_RANGE_DB,
            (knob(p.eq_mid) - 0.5) * 2.0 * EQ_RANGE_DB,
            (knob(p.eq_high) - 0.5) * 2.0 * EQ_RANGE_DB,
        );
        self.reverb.set_mix(knob(p.reverb_mix));
        self.delay.set_mix(knob(p.delay_mix));
    }

    /// Run one stereo interleaved block through the chain in place.
    pub fn process_block(&mut self, frames: &mut [f32]) {
        self.reverb.process_stereo(frames);
        self.delay.process_stereo(frames);
        self.eq.process_stereo(frames);

        for frame in frames.chunks_exact_mut(2) {
            let g = self.master.next();
            frame[0] *= g;
            frame[1] *= g;
        }

        self.limiter.process_stereo(frames);
        self.analysis = analyze(frames);
    }

    pub fn analysis(&self) -> AnalysisFrame {
        self.analysis
    }

    pub fn limiter_stats(&self) -> super::limiter::LimiterStats {
        self.limiter.stats()
    }

    /// Lock-free engagement meter, shared with the stats path.
    pub fn limiter_meter(&self) -> Arc<LimiterMeter> {
        self.meter.clone()
    }
}

fn analyze(frames: &[f32]) -> AnalysisFrame {
    let mut out = AnalysisFrame::default();
    let n = (frames.len() / 2).max(1) as f32;
    for frame in frames.chunks_exact(2) {
        for ch in 0..2 {
            let s = frame[ch];
            out.peak[ch] = out.peak[ch].max(s.abs());
            out.rms[ch] += s * s;
        }
    }
    out.rms[0] = (out.rms[0] / n).sqrt();
    out.rms[1] = (out.rms[1] / n).sqrt();
    out
}
