use crate::core::smoothing::Smoothed;

/// RBJ biquad, direct form 1, one channel.
#[derive(Debug, Clone, Copy, Default)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = if y.is_finite() { y } else { 0.0 };
        self.y1
    }

    fn set_low_shelf(&mut self, fs: f32, freq: f32, gain_db: f32) {
        let a = db_to_shelf_amp(gain_db);
        let (w0, alpha) = shelf_prelude(fs, freq, a);
        let (cos_w0, sqrt_a) = (w0.cos(), a.sqrt());
        let ap1 = a + 1.0;
        let am1 = a - 1.0;
        self.assign(
            a * (ap1 - am1 * cos_w0 + 2.0 * sqrt_a * alpha),
            2.0 * a * (am1 - ap1 * cos_w0),
            a * (ap1 - am1 * cos_w0 - 2.0 * sqrt_a * alpha),
            ap1 + am1 * cos_w0 + 2.0 * sqrt_a * alpha,
            -2.0 * (am1 + ap1 * cos_w0),
            ap1 + am1 * cos_w0 - 2.0 * sqrt_a * alpha,
        );
    }

    fn set_high_shelf(&mut self, fs: f32, freq: f32, gain_db: f32) {
        let a = db_to_shelf_amp(gain_db);
        let (w0, alpha) = shelf_prelude(fs, freq, a);
        let (cos_w0, sqrt_a) = (w0.cos(), a.sqrt());
        let ap1 = a + 1.0;
        let am1 = a - 1.0;
        self.assign(
            a * (ap1 + am1 * cos_w0 + 2.0 * sqrt_a * alpha),
            -2.0 * a * (am1 + ap1 * cos_w0),
            a * (ap1 + am1 * cos_w0 - 2.0 * sqrt_a * alpha),
            ap1 - am1 * cos_w0 + 2.0 * sqrt_a * alpha,
            2.0 * (am1 - ap1 * cos_w0),
            ap1 - am1 * cos_w0 - 2.0 * sqrt_a * alpha,
        );
    }

    fn set_peaking(&mut self, fs: f32, freq: f32, q: f32, gain_db: f32) {
        let a = db_to_shelf_amp(gain_db);
        let w0 = std::f32::consts::TAU * (freq / fs).clamp(1e-4, 0.49);
        let alpha = w0.sin() / (2.0 * q.max(0.1));
        let cos_w0 = w0.cos();
        self.assign(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        );
    }

    fn assign(&mut self, b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) {
        let inv = 1.0 / a0;
        self.b0 = b0 * inv;
        self.b1 = b1 * inv;
        self.b2 = b2 * inv;
        self.a1 = a1 * inv;
        self.a2 = a2 * inv;
    }
}

const SHELF_SLOPE: f32 = 1.0;

fn shelf_prelude(fs: f32, freq: f32, a: f32) -> (f32, f32) {
    let w0 = std::f32::consts::TAU * (freq / fs).clamp(1e-4, 0.49);
    let alpha =
        w0.sin() / 2.0 * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt();
    (w0, alpha)
}

fn db_to_shelf_amp(gain_db: f32) -> f32 {
    10f32.powf(gain_db.clamp(-24.0, 24.0) / 40.0)
}

const LOW_SHELF_HZ: f32 = 250.0;
const PEAK_HZ: f32 = 1_200.0;
const PEAK_Q: f32 = 0.8;
const HIGH_SHELF_HZ: f32 = 4_500.0;
/// Gain smoothing time constant, stepped once per block.
const GAIN_TAU_SEC: f32 = 0.05;

/// 3-band master EQ: low shelf, mid peak, high shelf, stereo. Band gains
/// ramp toward targets; coefficients are rebuilt at block rate from the
/// smoothed values, so knob changes stay click-free.
#[derive(Debug)]
pub struct ThreeBandEq {
    fs: f32,
    low: [Biquad; 2],
    mid: [Biquad; 2],
    high: [Biquad; 2],
    low_db: Smoothed,
    mid_db: Smoothed,
    high_db: Smoothed,
}

impl ThreeBandEq {
    pub fn new(fs: f32, block_frames: usize) -> Self {
        let fs = fs.max(1.0);
        let block_dt = block_frames.max(1) as f32 / fs;
        let mut eq = Self {
            fs,
            low: [Biquad::default(); 2],
            mid: [Biquad::default(); 2],
            high: [Biquad::default(); 2],
            low_db: Smoothed::new(0.0, block_dt, GAIN_TAU_SEC),
            mid_db: Smoothed::new(0.0, block_dt, GAIN_TAU_SEC),
            high_db: Smoothed::new(0.0, block_dt, GAIN_TAU_SEC),
        };
        eq.rebuild();
        eq
    }

    pub fn set_gains_db(&mut self, low: f32, mid: f32, high: f32) {
        self.low_db.set_target(low.clamp(-24.0, 24.0));
        self.mid_db.set_target(mid.clamp(-24.0, 24.0));
        self.high_db.set_target(high.clamp(-24.0, 24.0));
    }

    /// Process one stereo interleaved block in place.
    pub fn process_stereo(&mut self, frames: &mut [f32]) {
        self.low_db.next();
        self.mid_db.next();
        self.high_db.next();
        self.rebuild();

        for frame in frames.chunks_exact_mut(2) {
            for (ch, s) in frame.iter_mut().enumerate() {
                let x = if s.is_finite() { *s } else { 0.0 };
                let y = self.low[ch].process(x);
                let y = self.mid[ch].process(y);
                let y = self.high[ch].process(y);
                *s = y;
            }
        }
    }

    fn rebuild(&mut self) {
        for ch in 0..2 {
            self.low[ch].set_low_shelf(self.fs, LOW_SHELF_HZ, self.low_db.value());
            self.mid[ch].set_peaking(self.fs, PEAK_HZ, PEAK_Q, self.mid_db.value());
            self.high[ch].set_high_shelf(self.fs, HIGH_SHELF_HZ, self.high_db.value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(buf: &[f32]) -> f32 {
        (buf.iter().map(|s| s * s).sum::<f32>() / buf.len() as f32).sqrt()
    }

    fn tone(freq: f32, fs: f32, frames: usize) -> Vec<f32> {
        let mut buf = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let s = (std::f32::consts::TAU * freq * i as f32 / fs).sin() * 0.5;
            buf.push(s);
            buf.push(s);
        }
        buf
    }

    #[test]
    fn flat_eq_is_transparent() {
        let fs = 48_000.0;
        let mut eq = ThreeBandEq::new(fs, 512);
        let mut buf = tone(440.0, fs, 4096);
        let before = rms(&buf);
        eq.process_stereo(&mut buf);
        let after = rms(&buf);
        assert!((before - after).abs() / before < 0.05, "{before} vs {after}");
    }

    #[test]
    fn low_cut_attenuates_bass() {
        let fs = 48_000.0;
        let mut eq = ThreeBandEq::new(fs, 512);
        eq.set_gains_db(-18.0, 0.0, 0.0);
        // Let the smoothed gain settle across several blocks first.
        for _ in 0..60 {
            let mut chunk = tone(80.0, fs, 512);
            eq.process_stereo(&mut chunk);
        }
        let mut bass = tone(80.0, fs, 4096);
        let before = rms(&bass);
        eq.process_stereo(&mut bass);
        let after = rms(&bass);
        assert!(after < before * 0.6, "bass not attenuated: {before} -> {after}");
    }

    #[test]
    fn high_boost_raises_treble() {
        let fs = 48_000.0;
        let mut eq = ThreeBandEq::new(fs, 512);
        eq.set_gains_db(0.0, 0.0, 12.0);
        for _ in 0..60 {
            let mut chunk = tone(8_000.0, fs, 512);
            eq.process_stereo(&mut chunk);
        }
        let mut treble = tone(8_000.0, fs, 4096);
        let before = rms(&treble);
        eq.process_stereo(&mut treble);
        let after = rms(&treble);
        assert!(after > before * 1.5, "treble not boosted: {before} -> {after}");
    }

    #[test]
    fn output_is_finite_for_hostile_input() {
        let fs = 48_000.0;
        let mut eq = ThreeBandEq::new(fs, 512);
        eq.set_gains_db(24.0, 24.0, 24.0);
        let mut buf = vec![f32::NAN; 256];
        eq.process_stereo(&mut buf);
        assert!(buf.iter().all(|s| s.is_finite()));
    }
}
