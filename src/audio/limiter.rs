use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Stereo-linked peak limiter at the end of the master bus: fixed low
/// ceiling, fast attack, moderate release.
#[derive(Clone, Copy, Debug)]
pub struct LimiterParams {
    pub ceiling: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            ceiling: 0.95,
            attack_ms: 0.5,
            release_ms: 60.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LimiterStats {
    pub max_abs_in: f32,
    pub max_abs_out: f32,
    pub num_over: u64,
}

/// Lock-free engagement counter readable from the stats path.
#[derive(Debug, Default)]
pub struct LimiterMeter {
    engaged_count: AtomicU64,
    over_count: AtomicU64,
    max_abs_in_bits: AtomicU32,
}

impl LimiterMeter {
    pub fn record(&self, stats: &LimiterStats) {
        if stats.num_over == 0 {
            return;
        }
        self.engaged_count.fetch_add(1, Ordering::Relaxed);
        self.over_count.fetch_add(stats.num_over, Ordering::Relaxed);
        self.max_abs_in_bits
            .store(stats.max_abs_in.to_bits(), Ordering::Relaxed);
    }

    /// Drain and return the snapshot, or None when nothing engaged.
    pub fn take_snapshot(&self) -> Option<LimiterStats> {
        let engaged = self.engaged_count.swap(0, Ordering::Relaxed);
        if engaged == 0 {
            return None;
        }
        let over = self.over_count.swap(0, Ordering::Relaxed);
        let max_abs_in = f32::from_bits(self.max_abs_in_bits.swap(0, Ordering::Relaxed));
        Some(LimiterStats {
            max_abs_in,
            max_abs_out: 0.0,
            num_over: over,
        })
    }
}

#[derive(Debug)]
pub struct Limiter {
    params: LimiterParams,
    gain: f32,
    attack_coeff: f32,
    release_coeff: f32,
    stats: LimiterStats,
    meter: Option<Arc<LimiterMeter>>,
}

impl Limiter {
    pub fn new(params: LimiterParams, sample_rate: f32) -> Self {
        let sample_rate = sample_rate.max(1.0);
        Self {
            params,
            gain: 1.0,
            attack_coeff: time_to_coeff(params.attack_ms, sample_rate),
            release_coeff: time_to_coeff(params.release_ms, sample_rate),
            stats: LimiterStats::default(),
            meter: None,
        }
    }

    pub fn with_meter(mut self, meter: Arc<LimiterMeter>) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Limit a stereo interleaved block in place. Channels share one gain so
    /// the image never wanders under reduction.
    pub fn process_stereo(&mut self, frames: &mut [f32]) {
        if frames.is_empty() {
            return;
        }
        let ceiling = self.params.ceiling.abs().max(1e-6);
        self.stats = LimiterStats::default();

        for frame in frames.chunks_exact_mut(2) {
            let mut peak = 0.0f32;
            for s in frame.iter() {
                let x = if s.is_finite() { s.abs() } else { 0.0 };
                peak = peak.max(x);
            }
            let target_gain = if peak > ceiling { ceiling / peak } else { 1.0 };
            self.gain = smooth_gain(self.gain, target_gain, self.attack_coeff, self.release_coeff);

            for s in frame.iter_mut() {
                let x = if s.is_finite() { *s } else { 0.0 };
                let abs_in = x.abs();
                if abs_in > self.stats.max_abs_in {
                    self.stats.max_abs_in = abs_in;
                }
                if abs_in > ceiling {
                    self.stats.num_over += 1;
                }
                let y = (x * self.gain).clamp(-ceiling, ceiling);
                let abs_out = y.abs();
                if abs_out > self.stats.max_abs_out {
                    self.stats.max_abs_out = abs_out;
                }
                *s = y;
            }
        }

        if let Some(meter) = self.meter.as_ref() {
            meter.record(&self.stats);
        }
    }

    pub fn stats(&self) -> LimiterStats {
        self.stats
    }
}

fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let time_s = time_ms.max(0.0) * 0.001;
    if time_s <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_s * sample_rate)).exp()
    }
}

fn smooth_gain(current: f32, target: f32, attack_coeff: f32, release_coeff: f32) -> f32 {
    if target < current {
        attack_coeff * current + (1.0 - attack_coeff) * target
    } else {
        release_coeff * current + (1.0 - release_coeff) * target
    }
}
