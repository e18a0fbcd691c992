use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, bounded};
use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{info, warn};

use crate::audio::graph::EffectsGraph;
use crate::audio::output::AudioOutput;
use crate::audio::writer::WavOutput;
use crate::cli::Args;
use crate::config::AppConfig;
use crate::core::math::Bounds;
use crate::sim::governor::GovState;
use crate::sim::spatial::{EventBridge, SpatialMapper};
use crate::sim::step::{SimEvent, Simulation};
use crate::synth::bank::SampleBank;
use crate::synth::engine::VoiceEngine;
use crate::synth::scale::MusicContext;

/// Periodic snapshot published by the worker for logging and any attached
/// display surface.
#[derive(Debug, Clone)]
pub struct StatsFrame {
    pub time_sec: f32,
    pub entities: usize,
    pub particles: usize,
    pub voices: usize,
    pub rejected_triggers: u64,
    pub fps: f32,
    pub governor: GovState,
    pub peak: [f32; 2],
    pub rms: [f32; 2],
    /// Samples the limiter pulled down since the last snapshot.
    pub limiter_over: u64,
}

/// Run the coupled physics/audio loop until the stop flag is raised or the
/// requested duration elapses. The simulation ticks once per rendered block
/// on a worker thread; this thread drains and logs the stats channel.
pub fn run(args: &Args, cfg: &AppConfig, stop: Arc<AtomicBool>) -> Result<()> {
    let (mut audio_out, audio_prod) = match args.play {
        true => {
            let (out, prod) = AudioOutput::new(cfg.audio.latency_ms)?;
            (Some(out), Some(prod))
        }
        false => (None, None),
    };
    let fs = audio_out
        .as_ref()
        .map(|o| o.sample_rate as f32)
        .unwrap_or(cfg.audio.sample_rate as f32);

    let (wav_tx, wav_handle) = match &args.wav {
        Some(path) => {
            let (tx, rx) = bounded::<Vec<f32>>(16);
            let handle = WavOutput::run(rx, path.clone(), fs as u32)?;
            (Some(tx), Some(handle))
        }
        None => (None, None),
    };

    let (stats_tx, stats_rx) = bounded::<StatsFrame>(8);

    let worker = Worker {
        cfg: cfg.clone(),
        fs,
        seed_count: args.seed_count,
        duration_sec: args.duration,
        // Live playback paces against the hardware clock; a pure wav render
        // runs as fast as it can.
        paced: args.play,
        audio_prod,
        wav_tx,
        stats_tx,
        stop: stop.clone(),
    };
    let worker_handle = thread::Builder::new()
        .name("worker".into())
        .spawn(move || worker.run())
        .context("spawn worker")?;

    for s in stats_rx.iter() {
        info!(
            t = s.time_sec,
            entities = s.entities,
            particles = s.particles,
            voices = s.voices,
            rejected = s.rejected_triggers,
            fps = s.fps,
            state = ?s.governor,
            peak = s.peak[0].max(s.peak[1]),
            limited = s.limiter_over,
            "stats"
        );
    }

    if worker_handle.join().is_err() {
        warn!("worker thread panicked");
    }
    if let Some(handle) = wav_handle
        && handle.join().is_err()
    {
        warn!("wav writer thread panicked");
    }
    if let Some(out) = audio_out.as_mut() {
        out.stop();
    }
    Ok(())
}

struct Worker {
    cfg: AppConfig,
    fs: f32,
    seed_count: usize,
    duration_sec: Option<f32>,
    paced: bool,
    audio_prod: Option<ringbuf::HeapProd<f32>>,
    wav_tx: Option<Sender<Vec<f32>>>,
    stats_tx: Sender<StatsFrame>,
    stop: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self) {
        let block_frames = self.cfg.audio.block_frames.clamp(64, 4096);
        let block_dt = block_frames as f32 / self.fs;

        let bounds = Bounds::new(Vec3::from_array(self.cfg.sim.bounds_half));
        let mut sim = Simulation::new(bounds, self.cfg.governor);
        let bank = SampleBank::with_slots(self.cfg.audio.sample_slots);
        let mut engine = VoiceEngine::new(self.fs, self.cfg.audio.max_voices, bank);
        let mut graph = EffectsGraph::new(self.fs, block_frames);
        graph.set_params(&self.cfg.mix);
        let mapper = SpatialMapper::new(bounds);
        let mut bridge = EventBridge::new();
        let music = MusicContext::default();
        let params = self.cfg.forces;

        let mut rng = SmallRng::from_os_rng();
        for _ in 0..self.seed_count {
            let pos = bounds.random_point(&mut rng, 0.5);
            sim.spawn_at(pos, engine.bank());
        }
        info!(
            entities = sim.pool().len(),
            fs = self.fs,
            block_frames,
            "worker started"
        );

        let stats_every = ((1.0 / block_dt) as u64).max(1);
        let mut block = vec![0.0f32; block_frames * 2];
        let mut events: Vec<SimEvent> = Vec::new();
        let mut sources = Vec::new();
        let mut rendered_sec = 0.0f32;
        let mut blocks: u64 = 0;
        let mut last = Instant::now();
        let mut next_deadline = Instant::now();

        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("stop requested");
                break;
            }
            if let Some(limit) = self.duration_sec
                && rendered_sec >= limit
            {
                info!(rendered_sec, "duration reached");
                break;
            }

            let now = Instant::now();
            let raw_dt = if self.paced {
                (now - last).as_secs_f32()
            } else {
                block_dt
            };
            last = now;

            events.clear();
            events.extend_from_slice(sim.update(raw_dt, &params, engine.bank()));
            sources.clear();
            sources.extend(
                sim.pool()
                    .entities()
                    .iter()
                    .filter_map(|e| e.source.map(|r| (e.id, r))),
            );
            bridge.dispatch(
                &events,
                &sources,
                sim.time_sec(),
                &mapper,
                &params,
                &music,
                &mut engine,
            );

            engine.render_block(&mut block);
            graph.process_block(&mut block);
            rendered_sec += block_dt;
            blocks += 1;

            if let Some(prod) = self.audio_prod.as_mut() {
                AudioOutput::push_samples(prod, &block);
            }
            if let Some(tx) = &self.wav_tx {
                if self.paced {
                    // Never stall the realtime path on a slow writer.
                    let _ = tx.try_send(block.clone());
                } else {
                    let _ = tx.send(block.clone());
                }
            }

            if blocks % stats_every == 0 {
                let a = graph.analysis();
                let over = graph
                    .limiter_meter()
                    .take_snapshot()
                    .map_or(0, |s| s.num_over);
                let _ = self.stats_tx.try_send(StatsFrame {
                    time_sec: sim.time_sec(),
                    entities: sim.pool().len(),
                    particles: sim.pool().particles().len(),
                    voices: engine.active_voices(),
                    rejected_triggers: engine.rejected(),
                    fps: sim.governor().fps(),
                    governor: sim.governor().state(),
                    peak: a.peak,
                    rms: a.rms,
                    limiter_over: over,
                });
            }

            if self.paced {
                next_deadline += Duration::from_secs_f32(block_dt);
                let now = Instant::now();
                if now < next_deadline {
                    thread::sleep(next_deadline - now);
                } else {
                    next_deadline = now;
                }
            }
        }

        info!(
            rendered_sec,
            entities = sim.pool().len(),
            rejected = engine.rejected(),
            "worker finished"
        );
    }
}
