use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{BeatlightError, Result};

/// Top-level configuration structure for the application.
///
/// Constructed once at session start, validated, and passed by reference to
/// every component; nothing reads ambient or global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub analysis: AnalysisConfig,
    pub lights: LightConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            analysis: AnalysisConfig::default(),
            lights: LightConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|err| BeatlightError::config(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects out-of-range tunables. Values are never silently clamped.
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.analysis.validate()?;
        self.lights.validate()
    }
}

/// Configuration for the frame stream shared by playback and analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Expected sample rate of input assets, in Hz.
    pub sample_rate: u32,
    /// Samples per frame. Smaller frames lower the actuation latency.
    pub chunk_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            chunk_size: 1024,
        }
    }
}

impl AudioConfig {
    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(BeatlightError::config("sample_rate must be positive"));
        }
        if self.chunk_size < 2 {
            return Err(BeatlightError::config(
                "chunk_size must be at least two samples",
            ));
        }
        Ok(())
    }

    /// Duration of one frame in seconds at the given rate.
    pub fn chunk_duration(&self, sample_rate: u32) -> f32 {
        self.chunk_size as f32 / sample_rate as f32
    }
}

/// Tunables for energy estimation and beat detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Exponential smoothing factor for the baseline glow. Higher is
    /// smoother but slower to respond.
    pub smoothing_factor: f32,
    /// A beat fires when frame energy exceeds the rolling baseline times
    /// this multiplier.
    pub beat_threshold: f32,
    /// Per-frame multiplier applied to the flash contribution after a beat.
    pub beat_decay: f32,
    /// Minimum seconds between beats (refractory window).
    pub min_beat_interval: f32,
    /// Number of energy samples retained for the rolling baseline.
    pub history_capacity: usize,
    /// RMS level treated as full-scale energy. The original hardware was
    /// tuned to ~0.15 of 16-bit full scale.
    pub reference_level: f32,
    /// What happens to detector and envelope state at a loop seam.
    pub loop_restart: LoopRestart,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.7,
            beat_threshold: 1.5,
            beat_decay: 0.95,
            min_beat_interval: 0.3,
            history_capacity: 50,
            reference_level: 0.15,
            loop_restart: LoopRestart::Preserve,
        }
    }
}

impl AnalysisConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.smoothing_factor) {
            return Err(BeatlightError::config(
                "smoothing_factor must be within [0, 1)",
            ));
        }
        if !self.beat_threshold.is_finite() || self.beat_threshold <= 0.0 {
            return Err(BeatlightError::config("beat_threshold must be positive"));
        }
        if !(0.0..1.0).contains(&self.beat_decay) {
            return Err(BeatlightError::config("beat_decay must be within [0, 1)"));
        }
        if !self.min_beat_interval.is_finite() || self.min_beat_interval <= 0.0 {
            return Err(BeatlightError::config(
                "min_beat_interval must be positive",
            ));
        }
        if self.history_capacity == 0 {
            return Err(BeatlightError::config(
                "history_capacity must be at least one",
            ));
        }
        if !self.reference_level.is_finite() || self.reference_level <= 0.0 {
            return Err(BeatlightError::config("reference_level must be positive"));
        }
        Ok(())
    }

    /// Refractory window converted to a whole number of frames, rounded up
    /// so the seconds bound is never undercut.
    pub fn beat_interval_frames(&self, sample_rate: u32, chunk_size: usize) -> u64 {
        let chunk_duration = chunk_size as f32 / sample_rate as f32;
        (self.min_beat_interval / chunk_duration).ceil().max(1.0) as u64
    }
}

/// Tunables for the actuation side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// Hard duty-cycle cap, a voltage safety limit independent of audio
    /// content. No sink ever commands a level above it.
    pub max_brightness: f32,
    /// Fraction of full brightness the continuous glow path may reach.
    pub glow_gain: f32,
    /// PWM carrier frequency in Hz. Must stay above the audible range.
    pub pwm_frequency_hz: u32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            max_brightness: 0.83,
            glow_gain: 0.3,
            pwm_frequency_hz: 10_000,
        }
    }
}

impl LightConfig {
    fn validate(&self) -> Result<()> {
        if !self.max_brightness.is_finite()
            || self.max_brightness <= 0.0
            || self.max_brightness > 1.0
        {
            return Err(BeatlightError::config(
                "max_brightness must be within (0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.glow_gain) {
            return Err(BeatlightError::config("glow_gain must be within [0, 1]"));
        }
        if self.pwm_frequency_hz == 0 {
            return Err(BeatlightError::config("pwm_frequency_hz must be positive"));
        }
        Ok(())
    }
}

/// Policy applied to detector and envelope state when a looped source
/// restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopRestart {
    /// Carry state across the seam. Avoids a spurious beat at frame zero of
    /// the next pass; a stale tail baseline ages out within one history
    /// window.
    Preserve,
    /// Restore stream-start state at every seam.
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_tunables() {
        let mut config = Config::default();
        config.analysis.beat_threshold = -1.5;
        assert!(matches!(
            config.validate(),
            Err(BeatlightError::Configuration(_))
        ));

        let mut config = Config::default();
        config.analysis.smoothing_factor = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.lights.max_brightness = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audio.chunk_size = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn refractory_window_rounds_up_to_whole_frames() {
        let analysis = AnalysisConfig::default();
        // 0.3 s at 1024 samples / 44.1 kHz (~23.2 ms per frame) spans 12.9
        // frames, so the enforced gap is 13.
        assert_eq!(analysis.beat_interval_frames(44_100, 1024), 13);
        // Never less than one frame, even for tiny intervals.
        let quick = AnalysisConfig {
            min_beat_interval: 0.001,
            ..AnalysisConfig::default()
        };
        assert_eq!(quick.beat_interval_frames(44_100, 1024), 1);
    }

    #[test]
    fn loads_partial_config_from_json() {
        let raw = r#"{ "analysis": { "beat_threshold": 2.0, "loop_restart": "reset" } }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.analysis.beat_threshold, 2.0);
        assert_eq!(config.analysis.loop_restart, LoopRestart::Reset);
        // Unspecified sections keep their defaults.
        assert_eq!(config.audio.chunk_size, 1024);
        assert_eq!(config.lights.max_brightness, 0.83);
    }
}
