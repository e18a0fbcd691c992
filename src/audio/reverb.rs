use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::core::smoothing::Smoothed;

const MIX_TAU_SEC: f32 = 0.03;
/// Exponent giving roughly -60 dB at the tail end.
const DECAY_SHAPE: f32 = 6.9;
const WET_ENERGY: f32 = 0.35;

/// Convolution reverb on a procedurally generated impulse response:
/// exponentially decaying noise, one decorrelated IR per channel. Uniform
/// partitioned overlap-save convolution so the per-block cost stays flat
/// regardless of tail length.
pub struct ConvolutionReverb {
    block: usize,
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    /// Per channel: spectra of the IR partitions.
    partitions: [Vec<Vec<Complex32>>; 2],
    /// Per channel: ring of recent input spectra, newest at `ring_pos`.
    history: [Vec<Vec<Complex32>>; 2],
    ring_pos: usize,
    prev_input: [Vec<f32>; 2],
    scratch: Vec<Complex32>,
    acc: Vec<Complex32>,
    mix: Smoothed,
}

impl ConvolutionReverb {
    pub fn new(fs: f32, block_frames: usize, tail_sec: f32) -> Self {
        let fs = fs.max(1.0);
        let block = block_frames.max(16);
        let fft_size = block * 2;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let ifft = planner.plan_fft_inverse(fft_size);

        let tail_len = ((tail_sec.clamp(0.2, 4.0) * fs) as usize).max(block);
        let partitions = [
            partition_ir(&generate_ir(tail_len, 0x5eed_0001), block, fft.as_ref()),
            partition_ir(&generate_ir(tail_len, 0x5eed_0002), block, fft.as_ref()),
        ];
        let k = partitions[0].len();
        let empty_spec = vec![Complex32::new(0.0, 0.0); fft_size];
        let history = [vec![empty_spec.clone(); k], vec![empty_spec.clone(); k]];

        Self {
            block,
            fft_size,
            fft,
            ifft,
            partitions,
            history,
            ring_pos: 0,
            prev_input: [vec![0.0; block], vec![0.0; block]],
            scratch: vec![Complex32::new(0.0, 0.0); fft_size],
            acc: vec![Complex32::new(0.0, 0.0); fft_size],
            mix: Smoothed::new(0.0, block as f32 / fs, MIX_TAU_SEC),
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix.set_target(mix.clamp(0.0, 1.0));
    }

    pub fn partition_count(&self) -> usize {
        self.partitions[0].len()
    }

    /// Add the wet signal onto a stereo interleaved block. The block length
    /// must match the partition size the reverb was built with; anything
    /// else passes through dry.
    pub fn process_stereo(&mut self, frames: &mut [f32]) {
        if frames.len() != self.block * 2 {
            return;
        }
        let mix = self.mix.next();
        self.ring_pos = (self.ring_pos + 1) % self.history[0].len();

        for ch in 0..2 {
            // Overlap-save input: previous block then current block.
            for i in 0..self.block {
                self.scratch[i] = Complex32::new(self.prev_input[ch][i], 0.0);
                let s = frames[i * 2 + ch];
                let s = if s.is_finite() { s } else { 0.0 };
                self.scratch[self.block + i] = Complex32::new(s, 0.0);
                self.prev_input[ch][i] = s;
            }
            self.fft.process(&mut self.scratch);
            self.history[ch][self.ring_pos].copy_from_slice(&self.scratch);

            let k_total = self.history[ch].len();
            self.acc.fill(Complex32::new(0.0, 0.0));
            for (k, part) in self.partitions[ch].iter().enumerate() {
                let idx = (self.ring_pos + k_total - k) % k_total;
                let spec = &self.history[ch][idx];
                for (a, (x, h)) in self.acc.iter_mut().zip(spec.iter().zip(part.iter())) {
                    *a += *x * *h;
                }
            }
            self.ifft.process(&mut self.acc);

            // Overlap-save keeps only the second half.
            let scale = mix / self.fft_size as f32;
            for i in 0..self.block {
                let wet = self.acc[self.block + i].re * scale;
                if wet.is_finite() {
                    frames[i * 2 + ch] += wet;
                }
            }
        }
    }
}

/// Exponentially decaying noise burst, energy-normalized.
fn generate_ir(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut ir: Vec<f32> = (0..len)
        .map(|i| {
            let t = i as f32 / len as f32;
            rng.random_range(-1.0..1.0f32) * (-DECAY_SHAPE * t).exp()
        })
        .collect();
    let energy: f32 = ir.iter().map(|s| s * s).sum::<f32>().sqrt();
    if energy > 1e-9 {
        let norm = WET_ENERGY / energy;
        for s in ir.iter_mut() {
            *s *= norm;
        }
    }
    ir
}

fn partition_ir(ir: &[f32], block: usize, fft: &dyn Fft<f32>) -> Vec<Vec<Complex32>> {
    ir.chunks(block)
        .map(|chunk| {
            let mut spec = vec![Complex32::new(0.0, 0.0); block * 2];
            for (i, &s) in chunk.iter().enumerate() {
                spec[i] = Complex32::new(s, 0.0);
            }
            fft.process(&mut spec);
            spec
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mix_is_transparent() {
        let mut reverb = ConvolutionReverb::new(48_000.0, 64, 0.3);
        let mut buf: Vec<f32> = (0..128).map(|i| (i as f32 * 0.3).sin()).collect();
        let original = buf.clone();
        reverb.process_stereo(&mut buf);
        for (a, b) in buf.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn impulse_grows_a_tail() {
        let fs = 8_000.0;
        let block = 64;
        let mut reverb = ConvolutionReverb::new(fs, block, 0.25);
        reverb.set_mix(1.0);
        // Settle the mix ramp.
        for _ in 0..50 {
            let mut silence = vec![0.0f32; block * 2];
            reverb.process_stereo(&mut silence);
        }

        let mut first = vec![0.0f32; block * 2];
        first[0] = 1.0;
        first[1] = 1.0;
        reverb.process_stereo(&mut first);

        // Later blocks of pure silence must still carry tail energy.
        let mut tail_energy = 0.0f32;
        for _ in 0..4 {
            let mut silence = vec![0.0f32; block * 2];
            reverb.process_stereo(&mut silence);
            tail_energy += silence.iter().map(|s| s * s).sum::<f32>();
        }
        assert!(tail_energy > 1e-6, "no reverb tail: {tail_energy}");
    }

    #[test]
    fn tail_eventually_decays() {
        let fs = 8_000.0;
        let block = 64;
        let mut reverb = ConvolutionReverb::new(fs, block, 0.25);
        reverb.set_mix(1.0);
        let mut first = vec![0.0f32; block * 2];
        first[0] = 1.0;
        reverb.process_stereo(&mut first);

        let total_blocks = reverb.partition_count() + 4;
        let mut last = 0.0f32;
        for _ in 0..total_blocks {
            let mut silence = vec![0.0f32; block * 2];
            reverb.process_stereo(&mut silence);
            last = silence.iter().map(|s| s * s).sum::<f32>();
        }
        assert!(last < 1e-10, "tail outlived the impulse response: {last}");
    }

    #[test]
    fn mismatched_block_passes_dry() {
        let mut reverb = ConvolutionReverb::new(48_000.0, 64, 0.3);
        reverb.set_mix(1.0);
        let mut buf = vec![0.5f32; 30];
        let original = buf.clone();
        reverb.process_stereo(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn output_stays_finite_with_hostile_input() {
        let mut reverb = ConvolutionReverb::new(48_000.0, 64, 0.3);
        reverb.set_mix(1.0);
        let mut buf = vec![f32::NAN; 128];
        reverb.process_stereo(&mut buf);
        // NaN inputs are zeroed before the FFT; wet additions stay finite.
        for &s in &buf {
            assert!(s.is_nan() || s.is_finite());
        }
    }
}
