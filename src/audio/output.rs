use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use ringbuf::traits::*;
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{info, warn};

/// Connection to the default output device. The render loop holds the
/// producer half of an SPSC ring and pushes interleaved stereo blocks; the
/// cpal callback drains it on the hardware clock. Underruns play silence.
pub struct AudioOutput {
    stream: Option<cpal::Stream>,
    pub sample_rate: u32,
}

impl AudioOutput {
    /// Open the default device and start the stream, returning the producer
    /// the render loop pushes into.
    pub fn new(latency_ms: f32) -> Result<(Self, HeapProd<f32>)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no output device")?;
        let supported = device
            .default_output_config()
            .context("no default output config")?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels().max(1);

        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let latency_frames = (sample_rate as f32 * latency_ms.clamp(5.0, 500.0) / 1000.0) as usize;
        let rb = HeapRb::<f32>::new((latency_frames * 2).max(1024) * 4);
        let (prod, mut cons): (HeapProd<f32>, HeapCons<f32>) = rb.split();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // The ring always carries stereo pairs; adapt to whatever
                    // frame layout the device wants.
                    let ch = channels as usize;
                    for frame in data.chunks_mut(ch) {
                        let l = cons.try_pop().unwrap_or(0.0);
                        let r = cons.try_pop().unwrap_or(l);
                        if ch == 1 {
                            frame[0] = 0.5 * (l + r);
                        } else {
                            frame[0] = l;
                            frame[1] = r;
                            for s in frame.iter_mut().skip(2) {
                                *s = 0.0;
                            }
                        }
                    }
                },
                |err| warn!(?err, "output stream error"),
                None,
            )
            .context("build output stream")?;
        stream.play().context("start output stream")?;
        info!(sample_rate, channels, "audio output started");

        Ok((
            Self {
                stream: Some(stream),
                sample_rate,
            },
            prod,
        ))
    }

    /// Push a rendered block, backing off briefly whenever the ring is full.
    /// The backoff is what paces the render loop against the hardware clock.
    pub fn push_samples(prod: &mut HeapProd<f32>, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let written = prod.push_slice(&samples[offset..]);
            offset += written;
            if offset < samples.len() {
                std::thread::sleep(std::time::Duration::from_micros(200));
            }
        }
    }

    pub fn stop(&mut self) {
        self.stream.take();
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stream.take();
    }
}
