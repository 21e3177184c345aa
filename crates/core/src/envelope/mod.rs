use crate::{config::Config, detector::BeatEvent, energy::EnergySample};

/// Number of driven light channels.
pub const CHANNELS: usize = 2;

/// Flash contributions below this floor collapse to zero and leave only the
/// glow path.
const FLASH_FLOOR: f32 = 0.01;

/// Per-channel brightness for one frame, each value within
/// `[0, max_brightness]`. Written once per frame by the envelope stage and
/// read by the actuation sink.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BrightnessState {
    pub channels: [f32; CHANNELS],
}

impl BrightnessState {
    pub fn is_dark(&self) -> bool {
        self.channels.iter().all(|&level| level == 0.0)
    }
}

/// Smoothing state for one light channel: a continuous low-range glow that
/// tracks energy, and a flash that jumps on beats and decays exponentially.
#[derive(Debug, Clone, Copy, Default)]
struct ChannelEnvelope {
    smoothed: f32,
    flash: f32,
}

impl ChannelEnvelope {
    fn advance(&mut self, level: f32, beat: bool, params: &EnvelopeParams) -> f32 {
        self.smoothed =
            params.smoothing_factor * self.smoothed + (1.0 - params.smoothing_factor) * level;

        if beat {
            self.flash = params.max_brightness;
        } else {
            self.flash *= params.beat_decay;
            if self.flash < FLASH_FLOOR {
                self.flash = 0.0;
            }
        }

        let glow = self.smoothed * params.glow_gain;
        (glow + self.flash).clamp(0.0, params.max_brightness)
    }
}

#[derive(Debug, Clone, Copy)]
struct EnvelopeParams {
    smoothing_factor: f32,
    beat_decay: f32,
    glow_gain: f32,
    max_brightness: f32,
}

/// Converts the energy/beat stream into smoothed per-channel brightness.
///
/// Both channels are currently fed the same mono signal, but each owns its
/// own state, so driving them from independent detectors requires no
/// structural change.
#[derive(Debug, Clone)]
pub struct EnvelopeGenerator {
    params: EnvelopeParams,
    channels: [ChannelEnvelope; CHANNELS],
}

impl EnvelopeGenerator {
    pub fn new(config: &Config) -> Self {
        Self {
            params: EnvelopeParams {
                smoothing_factor: config.analysis.smoothing_factor,
                beat_decay: config.analysis.beat_decay,
                glow_gain: config.lights.glow_gain,
                max_brightness: config.lights.max_brightness,
            },
            channels: [ChannelEnvelope::default(); CHANNELS],
        }
    }

    /// Advances every channel by one frame and returns the new brightness.
    pub fn advance(&mut self, sample: &EnergySample, beat: Option<&BeatEvent>) -> BrightnessState {
        let mut state = BrightnessState::default();
        for (channel, slot) in self.channels.iter_mut().zip(state.channels.iter_mut()) {
            *slot = channel.advance(sample.level, beat.is_some(), &self.params);
        }
        state
    }

    /// Restores stream-start state. Used at loop seams under the `Reset`
    /// policy.
    pub fn reset(&mut self) {
        self.channels = [ChannelEnvelope::default(); CHANNELS];
    }
}
