use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::graph::AudioParams;
use crate::sim::governor::GovernorConfig;
use crate::sim::params::ForceParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "AudioConfig::default_latency_ms")]
    pub latency_ms: f32,
    /// Used for the offline render path; live playback follows the device.
    #[serde(default = "AudioConfig::default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "AudioConfig::default_block_frames")]
    pub block_frames: usize,
    /// Polyphony ceiling. Triggers beyond it are dropped silently.
    #[serde(default = "AudioConfig::default_max_voices")]
    pub max_voices: usize,
    #[serde(default = "AudioConfig::default_sample_slots")]
    pub sample_slots: usize,
}

impl AudioConfig {
    fn default_latency_ms() -> f32 {
        50.0
    }
    fn default_sample_rate() -> u32 {
        48_000
    }
    fn default_block_frames() -> usize {
        512
    }
    fn default_max_voices() -> usize {
        24
    }
    fn default_sample_slots() -> usize {
        8
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            latency_ms: Self::default_latency_ms(),
            sample_rate: Self::default_sample_rate(),
            block_frames: Self::default_block_frames(),
            max_voices: Self::default_max_voices(),
            sample_slots: Self::default_sample_slots(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Half extents of the simulation volume, centered on the origin.
    #[serde(default = "SimConfig::default_bounds_half")]
    pub bounds_half: [f32; 3],
}

impl SimConfig {
    fn default_bounds_half() -> [f32; 3] {
        [5.0, 4.0, 4.0]
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            bounds_half: Self::default_bounds_half(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    /// Startup knob values; a control surface overwrites these per frame.
    #[serde(default)]
    pub forces: ForceParams,
    #[serde(default)]
    pub mix: AudioParams,
}

impl AppConfig {
    fn round_f32(x: f32) -> f32 {
        (x * 1_000_000.0).round() / 1_000_000.0
    }

    fn format_f32_compact(x: f32) -> String {
        let mut s = format!("{:.6}", x);
        while s.contains('.') && s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        if s.is_empty() { "0".to_string() } else { s }
    }

    fn rounded(mut self) -> Self {
        self.audio.latency_ms = Self::round_f32(self.audio.latency_ms);
        self.governor.arm_delay_sec = Self::round_f32(self.governor.arm_delay_sec);
        self.governor.hold_sec = Self::round_f32(self.governor.hold_sec);
        self.governor.grace_age_sec = Self::round_f32(self.governor.grace_age_sec);
        self
    }

    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match fs::read_to_string(path_obj) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(cfg) => return cfg,
                    Err(err) => {
                        eprintln!("Failed to parse config {path}: {err}. Using defaults.");
                    }
                },
                Err(err) => {
                    eprintln!("Failed to read config {path}: {err}. Using defaults.");
                }
            }
            return Self::default();
        }

        // File does not exist: write commented defaults and return them.
        let default_cfg = Self::default().rounded();
        if let Ok(text) = toml::to_string_pretty(&default_cfg) {
            let mut commented = String::new();
            for line in text.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    commented.push('\n');
                } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                    commented.push_str(line);
                    commented.push('\n');
                } else {
                    let mut out_line = line.to_string();
                    if let Some((lhs, rhs)) = line.split_once('=') {
                        let rhs_trim = rhs.trim();
                        let has_decimal = rhs_trim.contains('.');
                        if (has_decimal || rhs_trim.contains('e') || rhs_trim.contains('E'))
                            && !rhs_trim.contains('"')
                            && rhs_trim != "true"
                            && rhs_trim != "false"
                        {
                            if let Ok(val) = rhs_trim.parse::<f32>() {
                                let mut formatted = Self::format_f32_compact(val);
                                if has_decimal && !formatted.contains('.') {
                                    formatted.push_str(".0");
                                }
                                out_line = format!("{} = {}", lhs.trim(), formatted);
                            }
                        }
                    }
                    commented.push_str("# ");
                    commented.push_str(&out_line);
                    commented.push('\n');
                }
            }
            if let Err(err) = fs::write(path_obj, commented) {
                eprintln!("Failed to write default config to {path}: {err}");
            }
        } else {
            eprintln!("Failed to serialize default config; continuing with defaults");
        }
        default_cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn unique_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "sonobox_config_test_{}_{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        p
    }

    #[test]
    fn load_or_default_writes_defaults_cleanly() {
        let path = unique_path("defaults.toml");
        let path_str = path.to_string_lossy().to_string();
        let _ = fs::remove_file(&path);

        let cfg = AppConfig::load_or_default(&path_str);
        assert!(path.exists(), "config file should be created");
        assert_eq!(cfg.audio.latency_ms, 50.0);
        assert_eq!(cfg.audio.sample_rate, 48_000);
        assert_eq!(cfg.audio.max_voices, 24);
        assert_eq!(cfg.sim.bounds_half, [5.0, 4.0, 4.0]);
        assert_eq!(cfg.governor.low_fps, 30.0);
        assert_eq!(cfg.forces.tempo, 1.0);

        let contents = fs::read_to_string(&path).expect("read written config");
        assert!(
            contents.contains("# latency_ms = 50.0"),
            "should write commented latency_ms"
        );
        assert!(
            contents.contains("# low_fps = 30.0"),
            "should write commented low_fps"
        );
        assert!(
            contents.contains("# tempo = 1.0"),
            "should write commented tempo"
        );

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_or_default_reads_existing() {
        let path = unique_path("custom.toml");
        let path_str = path.to_string_lossy().to_string();
        let custom = AppConfig {
            audio: AudioConfig {
                latency_ms: 75.0,
                sample_rate: 44_100,
                block_frames: 256,
                max_voices: 12,
                sample_slots: 4,
            },
            sim: SimConfig {
                bounds_half: [3.0, 3.0, 3.0],
            },
            governor: GovernorConfig {
                low_fps: 25.0,
                ..GovernorConfig::default()
            },
            forces: ForceParams {
                gravity: 0.7,
                ..ForceParams::default()
            },
            mix: AudioParams {
                volume: 0.5,
                ..AudioParams::default()
            },
        };
        let text = toml::to_string_pretty(&custom).unwrap();
        fs::write(&path, text).unwrap();

        let cfg = AppConfig::load_or_default(&path_str);
        assert_eq!(cfg.audio.latency_ms, 75.0);
        assert_eq!(cfg.audio.sample_rate, 44_100);
        assert_eq!(cfg.audio.block_frames, 256);
        assert_eq!(cfg.audio.max_voices, 12);
        assert_eq!(cfg.sim.bounds_half, [3.0, 3.0, 3.0]);
        assert_eq!(cfg.governor.low_fps, 25.0);
        assert_eq!(cfg.forces.gravity, 0.7);
        assert_eq!(cfg.mix.volume, 0.5);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn partial_config_fills_missing_sections() {
        let path = unique_path("partial.toml");
        let path_str = path.to_string_lossy().to_string();
        fs::write(&path, "[audio]\nlatency_ms = 20.0\n").unwrap();

        let cfg = AppConfig::load_or_default(&path_str);
        assert_eq!(cfg.audio.latency_ms, 20.0);
        assert_eq!(cfg.audio.sample_rate, 48_000, "defaults fill the rest");
        assert_eq!(cfg.governor.mid_fps, 45.0);

        let _ = fs::remove_file(&path);
    }
}
