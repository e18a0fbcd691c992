use crate::core::smoothing::Smoothed;

/// Wet-mix smoothing time constant.
const MIX_TAU_SEC: f32 = 0.03;

/// Ping-pong stereo delay: two cross-feeding lines with independent delay
/// times and feedback gains. The left tail feeds the right line and vice
/// versa, so echoes bounce across the image.
#[derive(Debug)]
pub struct PingPongDelay {
    line_l: Vec<f32>,
    line_r: Vec<f32>,
    write: usize,
    delay_l: usize,
    delay_r: usize,
    feedback_l: f32,
    feedback_r: f32,
    mix: Smoothed,
}

impl PingPongDelay {
    pub fn new(fs: f32, delay_l_sec: f32, delay_r_sec: f32) -> Self {
        let fs = fs.max(1.0);
        let delay_l = ((delay_l_sec.clamp(0.01, 2.0) * fs) as usize).max(1);
        let delay_r = ((delay_r_sec.clamp(0.01, 2.0) * fs) as usize).max(1);
        let len = delay_l.max(delay_r) + 1;
        Self {
            line_l: vec![0.0; len],
            line_r: vec![0.0; len],
            write: 0,
            delay_l,
            delay_r,
            feedback_l: 0.42,
            feedback_r: 0.36,
            mix: Smoothed::new(0.0, 1.0 / fs, MIX_TAU_SEC),
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix.set_target(mix.clamp(0.0, 1.0));
    }

    pub fn set_feedback(&mut self, left: f32, right: f32) {
        // Kept below unity so the tail always decays.
        self.feedback_l = left.clamp(0.0, 0.95);
        self.feedback_r = right.clamp(0.0, 0.95);
    }

    /// Read the dry stereo block, add the wet signal in place.
    pub fn process_stereo(&mut self, frames: &mut [f32]) {
        let len = self.line_l.len();
        for frame in frames.chunks_exact_mut(2) {
            let mix = self.mix.next();
            let dry_l = if frame[0].is_finite() { frame[0] } else { 0.0 };
            let dry_r = if frame[1].is_finite() { frame[1] } else { 0.0 };

            let read_l = (self.write + len - self.delay_l) % len;
            let read_r = (self.write + len - self.delay_r) % len;
            let tap_l = self.line_l[read_l];
            let tap_r = self.line_r[read_r];

            // Cross-feed: each line is fed by its input plus the other
            // line's tap.
            self.line_l[self.write] = dry_l + tap_r * self.feedback_r;
            self.line_r[self.write] = dry_r + tap_l * self.feedback_l;
            self.write = (self.write + 1) % len;

            frame[0] = dry_l + tap_l * mix;
            frame[1] = dry_r + tap_r * mix;
        }
    }
}
