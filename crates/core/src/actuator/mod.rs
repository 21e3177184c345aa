use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use tracing::debug;

use crate::{config::LightConfig, BeatlightError, Result};

/// Identifies one of the two driven light channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightChannel {
    One,
    Two,
}

impl LightChannel {
    pub const ALL: [LightChannel; 2] = [LightChannel::One, LightChannel::Two];

    pub fn index(self) -> usize {
        match self {
            LightChannel::One => 0,
            LightChannel::Two => 1,
        }
    }
}

/// Capability interface over a pair of PWM-driven light channels.
///
/// Implementations clamp every commanded level into `[0, max_brightness]`;
/// the cap holds on every path, including errors and teardown.
pub trait ActuationSink {
    /// Applies `fraction` of full duty to `channel`.
    fn set_duty_cycle(&mut self, channel: LightChannel, fraction: f32) -> Result<()>;

    /// Forces every channel dark. Called during teardown on every exit path.
    fn all_off(&mut self) -> Result<()> {
        for channel in LightChannel::ALL {
            self.set_duty_cycle(channel, 0.0)?;
        }
        Ok(())
    }
}

impl<T: ActuationSink + ?Sized> ActuationSink for Box<T> {
    fn set_duty_cycle(&mut self, channel: LightChannel, fraction: f32) -> Result<()> {
        (**self).set_duty_cycle(channel, fraction)
    }

    fn all_off(&mut self) -> Result<()> {
        (**self).all_off()
    }
}

/// Saturating duty clamp. Non-finite commands collapse to dark rather than
/// full on.
fn capped(fraction: f32, cap: f32) -> f32 {
    if fraction.is_finite() {
        fraction.clamp(0.0, cap)
    } else {
        0.0
    }
}

/// Test sink recording the full actuation history behind a shared handle,
/// so it stays inspectable after the session consumes the sink.
#[derive(Debug, Clone)]
pub struct MemorySink {
    cap: f32,
    state: Arc<Mutex<MemorySinkState>>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    levels: [f32; 2],
    history: Vec<(usize, f32)>,
}

impl MemorySink {
    pub fn new(lights: &LightConfig) -> Self {
        Self {
            cap: lights.max_brightness,
            state: Arc::new(Mutex::new(MemorySinkState::default())),
        }
    }

    /// Latest level per channel.
    pub fn levels(&self) -> [f32; 2] {
        self.state.lock().expect("memory sink poisoned").levels
    }

    /// Every `(channel index, level)` command in order.
    pub fn history(&self) -> Vec<(usize, f32)> {
        self.state
            .lock()
            .expect("memory sink poisoned")
            .history
            .clone()
    }

    /// Highest level ever commanded across both channels.
    pub fn max_commanded(&self) -> f32 {
        self.state
            .lock()
            .expect("memory sink poisoned")
            .history
            .iter()
            .map(|&(_, level)| level)
            .fold(0.0, f32::max)
    }
}

impl ActuationSink for MemorySink {
    fn set_duty_cycle(&mut self, channel: LightChannel, fraction: f32) -> Result<()> {
        let level = capped(fraction, self.cap);
        let mut state = self
            .state
            .lock()
            .map_err(|_| BeatlightError::device("memory sink poisoned"))?;
        state.levels[channel.index()] = level;
        state.history.push((channel.index(), level));
        Ok(())
    }
}

/// Dry-run sink that only logs commanded duty cycles.
#[derive(Debug)]
pub struct ConsoleSink {
    cap: f32,
}

impl ConsoleSink {
    pub fn new(lights: &LightConfig) -> Self {
        Self {
            cap: lights.max_brightness,
        }
    }
}

impl ActuationSink for ConsoleSink {
    fn set_duty_cycle(&mut self, channel: LightChannel, fraction: f32) -> Result<()> {
        let level = capped(fraction, self.cap);
        debug!(channel = channel.index(), level, "duty cycle");
        Ok(())
    }
}

/// Hardware sink driving a Linux sysfs PWM chip
/// (`/sys/class/pwm/pwmchip<N>`), channels 0 and 1.
///
/// Opening fails before any playback begins if the chip or either channel
/// is unavailable.
#[derive(Debug)]
pub struct SysfsPwmSink {
    chip: PathBuf,
    cap: f32,
    period_ns: u64,
}

impl SysfsPwmSink {
    pub fn open(chip_index: u32, lights: &LightConfig) -> Result<Self> {
        let chip = PathBuf::from(format!("/sys/class/pwm/pwmchip{chip_index}"));
        if !chip.is_dir() {
            return Err(BeatlightError::device(format!(
                "PWM chip {} not present",
                chip.display()
            )));
        }

        let period_ns = 1_000_000_000 / u64::from(lights.pwm_frequency_hz);
        let mut sink = Self {
            chip,
            cap: lights.max_brightness,
            period_ns,
        };

        for channel in LightChannel::ALL {
            sink.export(channel)?;
            sink.write_attr(channel, "period", period_ns)?;
            sink.write_attr(channel, "duty_cycle", 0)?;
            sink.write_attr(channel, "enable", 1)?;
        }
        Ok(sink)
    }

    fn channel_dir(&self, channel: LightChannel) -> PathBuf {
        self.chip.join(format!("pwm{}", channel.index()))
    }

    fn export(&self, channel: LightChannel) -> Result<()> {
        if self.channel_dir(channel).is_dir() {
            return Ok(());
        }
        fs::write(self.chip.join("export"), channel.index().to_string()).map_err(|err| {
            BeatlightError::device(format!(
                "cannot export PWM channel {}: {err}",
                channel.index()
            ))
        })
    }

    fn write_attr(&self, channel: LightChannel, name: &str, value: u64) -> Result<()> {
        let path = self.channel_dir(channel).join(name);
        fs::write(&path, value.to_string()).map_err(|err| {
            BeatlightError::device(format!("cannot write {}: {err}", path.display()))
        })
    }
}

impl ActuationSink for SysfsPwmSink {
    fn set_duty_cycle(&mut self, channel: LightChannel, fraction: f32) -> Result<()> {
        let level = capped(fraction, self.cap);
        let duty_ns = (self.period_ns as f32 * level) as u64;
        self.write_attr(channel, "duty_cycle", duty_ns)
    }
}

impl Drop for SysfsPwmSink {
    fn drop(&mut self) {
        // Best effort: leave the hardware dark and disabled.
        for channel in LightChannel::ALL {
            let _ = self.write_attr(channel, "duty_cycle", 0);
            let _ = self.write_attr(channel, "enable", 0);
        }
    }
}
