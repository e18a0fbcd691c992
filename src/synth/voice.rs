use std::sync::Arc;

/// Hard cap on any voice's life. Stopping playback leaves in-flight voices
/// to finish their envelopes; this bounds how long that can take.
pub const MAX_LIFETIME_SEC: f32 = 2.0;

const ATTACK_SEC: f32 = 0.004;
/// FM burst window for small/high-pitched triggers.
const FM_BURST_SEC: f32 = 0.08;
const FM_RATIO: f32 = 2.7;
const ENV_FLOOR: f32 = 1e-3;

/// What the voice plays: a plain oscillator or a loaded sample buffer,
/// optionally time-reversed.
pub enum VoiceSource {
    Synth {
        phase: f32,
        fm_phase: f32,
        fm_amount: f32,
    },
    Sample {
        buffer: Arc<[f32]>,
        pos: f64,
        step: f64,
    },
}

/// One fire-and-forget sound instance. Owns its DSP state (oscillator or
/// buffer cursor, envelope, pan, depth filter); the engine's registry drains
/// it once `is_done` reports true.
pub struct Voice {
    source: VoiceSource,
    freq_hz: f32,
    gain: f32,
    pan_l: f32,
    pan_r: f32,
    lp_coeff: f32,
    lp_state: f32,
    age_sec: f32,
    decay_tau: f32,
    lifetime_sec: f32,
    done: bool,
}

impl Voice {
    pub fn new(
        source: VoiceSource,
        freq_hz: f32,
        gain: f32,
        pan: f32,
        depth_cutoff_hz: f32,
        decay_tau: f32,
        fs: f32,
    ) -> Self {
        // Equal-power pan.
        let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
        let lp_coeff = 1.0
            - (-std::f32::consts::TAU * depth_cutoff_hz.max(20.0) / fs.max(1.0)).exp();
        let decay_tau = decay_tau.clamp(0.03, 0.8);
        Self {
            source,
            freq_hz,
            gain: gain.clamp(0.0, 1.0),
            pan_l: angle.cos(),
            pan_r: angle.sin(),
            lp_coeff: lp_coeff.clamp(0.0, 1.0),
            lp_state: 0.0,
            age_sec: 0.0,
            decay_tau,
            lifetime_sec: (ATTACK_SEC + decay_tau * 6.0).min(MAX_LIFETIME_SEC),
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn freq_hz(&self) -> f32 {
        self.freq_hz
    }

    /// Render and add into a stereo interleaved block.
    pub fn render_add(&mut self, out: &mut [f32], fs: f32) {
        if self.done || fs <= 0.0 {
            return;
        }
        let dt = 1.0 / fs;
        let frames = out.len() / 2;

        for frame in 0..frames {
            let env = self.envelope();
            if self.done {
                break;
            }
            let raw = match &mut self.source {
                VoiceSource::Synth {
                    phase,
                    fm_phase,
                    fm_amount,
                } => {
                    let fm_env = if *fm_amount > 0.0 && self.age_sec < FM_BURST_SEC {
                        1.0 - self.age_sec / FM_BURST_SEC
                    } else {
                        0.0
                    };
                    let s = (*phase + *fm_amount * fm_env * fm_phase.sin()).sin();
                    *phase = (*phase + std::f32::consts::TAU * self.freq_hz * dt)
                        .rem_euclid(std::f32::consts::TAU);
                    *fm_phase = (*fm_phase
                        + std::f32::consts::TAU * self.freq_hz * FM_RATIO * dt)
                        .rem_euclid(std::f32::consts::TAU);
                    s
                }
                VoiceSource::Sample { buffer, pos, step } => {
                    let idx = *pos;
                    if idx < 0.0 || idx >= (buffer.len().saturating_sub(1)) as f64 {
                        self.done = true;
                        break;
                    }
                    let i = idx as usize;
                    let frac = (idx - i as f64) as f32;
                    let s = buffer[i] * (1.0 - frac) + buffer[i + 1] * frac;
                    *pos += *step;
                    s
                }
            };

            // Depth muffling: one-pole lowpass before the pan split.
            self.lp_state += self.lp_coeff * (raw - self.lp_state);
            let s = self.lp_state * env * self.gain;

            out[frame * 2] += s * self.pan_l;
            out[frame * 2 + 1] += s * self.pan_r;
            self.age_sec += dt;
        }
    }

    /// Linear attack into exponential decay. Marks the voice done when the
    /// tail falls below the floor or the lifetime cap is hit.
    fn envelope(&mut self) -> f32 {
        if self.age_sec >= self.lifetime_sec {
            self.done = true;
            return 0.0;
        }
        if self.age_sec < ATTACK_SEC {
            return self.age_sec / ATTACK_SEC;
        }
        let env = (-(self.age_sec - ATTACK_SEC) / self.decay_tau).exp();
        if env < ENV_FLOOR {
            self.done = true;
            return 0.0;
        }
        env
    }
}

/// Build a sample cursor for the requested direction: reversed playback
/// starts at the tail and walks backwards at the same rate.
pub fn sample_source(buffer: Arc<[f32]>, pitch_ratio: f32, reverse: bool) -> VoiceSource {
    let step = pitch_ratio.clamp(0.05, 8.0) as f64;
    let (pos, step) = if reverse {
        ((buffer.len().saturating_sub(2)) as f64, -step)
    } else {
        (0.0, step)
    };
    VoiceSource::Sample { buffer, pos, step }
}

/// Oscillator source; `fm_amount` above zero adds the brief FM burst used
/// for small/high-pitched triggers.
pub fn synth_source(fm_amount: f32) -> VoiceSource {
    VoiceSource::Synth {
        phase: 0.0,
        fm_phase: 0.0,
        fm_amount: fm_amount.clamp(0.0, 3.0),
    }
}
