use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{info, warn};

/// Offline render sink: interleaved stereo blocks arrive over a channel and
/// land in a 16-bit WAV on a dedicated thread. Dropping every sender ends
/// the loop and finalizes the file.
pub struct WavOutput;

impl WavOutput {
    pub fn run(
        rx: Receiver<Vec<f32>>,
        path: String,
        sample_rate: u32,
    ) -> Result<std::thread::JoinHandle<()>> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer =
            WavWriter::create(&path, spec).with_context(|| format!("create wav {path}"))?;

        let handle = std::thread::Builder::new()
            .name("wav-writer".into())
            .spawn(move || {
                while let Ok(samples) = rx.recv() {
                    for &s in &samples {
                        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        if let Err(err) = writer.write_sample(v) {
                            warn!(%path, ?err, "wav write failed, stopping writer");
                            return;
                        }
                    }
                }
                match writer.finalize() {
                    Ok(()) => info!(%path, "wav finalized"),
                    Err(err) => warn!(%path, ?err, "wav finalize failed"),
                }
            })
            .context("spawn wav writer")?;
        Ok(handle)
    }
}
