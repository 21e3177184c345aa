use std::collections::VecDeque;

use tracing::debug;

use crate::{config::Config, energy::EnergySample};

/// Rolling window of the most recent energy samples, oldest evicted on
/// overflow. The baseline mean is recomputed from the live buffer so it is
/// never stale and never accumulates float drift over long sessions.
#[derive(Debug, Clone)]
pub struct EnergyHistory {
    samples: VecDeque<EnergySample>,
    capacity: usize,
}

impl EnergyHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: EnergySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Mean level over whatever samples exist; zero when empty.
    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.level).sum::<f32>() / self.samples.len() as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Marks a detected transient at a frame index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatEvent {
    pub frame_index: u64,
}

/// Firing phase of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    /// May fire on the next qualifying sample.
    Armed,
    /// Counting down the refractory window; cannot fire.
    Refractory,
}

/// Emits discrete beat events from the energy stream using a dynamic
/// threshold over a rolling baseline, with refractory suppression.
#[derive(Debug, Clone)]
pub struct AdaptiveBeatDetector {
    history: EnergyHistory,
    threshold: f32,
    interval_frames: u64,
    last_beat: Option<u64>,
    phase: DetectorPhase,
}

impl AdaptiveBeatDetector {
    /// The refractory window is converted to whole frames using the actual
    /// stream rate, which may differ from the configured default.
    pub fn new(config: &Config, sample_rate: u32) -> Self {
        Self {
            history: EnergyHistory::new(config.analysis.history_capacity),
            threshold: config.analysis.beat_threshold,
            interval_frames: config
                .analysis
                .beat_interval_frames(sample_rate, config.audio.chunk_size),
            last_beat: None,
            phase: DetectorPhase::Armed,
        }
    }

    /// Feeds one sample and reports whether it fired a beat.
    ///
    /// The sample joins the history before the baseline is computed, and a
    /// partial history at stream start is baseline enough — firing never
    /// waits for the window to fill.
    pub fn observe(&mut self, sample: EnergySample) -> Option<BeatEvent> {
        self.history.push(sample);
        let baseline = self.history.mean();

        if let (DetectorPhase::Refractory, Some(last)) = (self.phase, self.last_beat) {
            if sample.frame_index.saturating_sub(last) >= self.interval_frames {
                self.phase = DetectorPhase::Armed;
            }
        }

        let fires = self.phase == DetectorPhase::Armed
            && sample.level > baseline * self.threshold
            && sample.level > f32::EPSILON;

        if !fires {
            return None;
        }

        self.last_beat = Some(sample.frame_index);
        self.phase = DetectorPhase::Refractory;
        debug!(
            frame = sample.frame_index,
            level = sample.level,
            baseline,
            "beat"
        );
        Some(BeatEvent {
            frame_index: sample.frame_index,
        })
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    pub fn baseline(&self) -> f32 {
        self.history.mean()
    }

    pub fn history(&self) -> &EnergyHistory {
        &self.history
    }

    /// Restores stream-start state. Used at loop seams under the `Reset`
    /// policy.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_beat = None;
        self.phase = DetectorPhase::Armed;
    }
}
