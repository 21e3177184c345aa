use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    actuator::{ActuationSink, LightChannel},
    config::{Config, LoopRestart},
    detector::AdaptiveBeatDetector,
    energy::EnergyEstimator,
    envelope::{BrightnessState, EnvelopeGenerator},
    output::AudioEmitter,
    source::{Frame, FrameSource},
    BeatlightError, Result,
};

/// Shared stop flag. Written once by the controlling context (signal
/// handler or explicit stop); observed by the session between frames, so
/// cancellation takes effect within one frame period.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// How a session ended. A user-requested stop is a normal termination, not
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The stream ran out in non-loop mode.
    Completed,
    /// The cancel token was observed.
    Stopped,
}

/// Diagnostics counters accumulated over one playback session.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub beats_fired: u64,
    /// Times the source was restarted in loop mode.
    pub loops_completed: u64,
    /// Malformed frames skipped while holding the previous brightness.
    pub frames_skipped: u64,
    /// Frames whose analysis overran the chunk duration. Reported, never
    /// silently dropped.
    pub starved_frames: u64,
}

/// Summary returned when a session finishes without a fatal error.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub stats: SessionStats,
}

/// Runs one audio asset end to end: frames are handed to the audio emitter
/// (whose device clock paces the loop) and then analyzed and actuated, so
/// the two activities never drift apart by more than one chunk.
pub struct PlaybackSession<'a, S, E, A>
where
    S: FrameSource,
    E: AudioEmitter,
    A: ActuationSink,
{
    config: &'a Config,
    source: S,
    emitter: E,
    sink: A,
    estimator: EnergyEstimator,
    detector: AdaptiveBeatDetector,
    envelope: EnvelopeGenerator,
    brightness: BrightnessState,
    cancel: CancelToken,
    looping: bool,
    frame_budget: Duration,
    stats: SessionStats,
}

impl<'a, S, E, A> PlaybackSession<'a, S, E, A>
where
    S: FrameSource,
    E: AudioEmitter,
    A: ActuationSink,
{
    pub fn new(
        config: &'a Config,
        source: S,
        emitter: E,
        sink: A,
        looping: bool,
        cancel: CancelToken,
    ) -> Result<Self> {
        config.validate()?;

        let sample_rate = source.sample_rate();
        if sample_rate != config.audio.sample_rate {
            warn!(
                asset = sample_rate,
                configured = config.audio.sample_rate,
                "asset sample rate differs from configuration; pacing by the asset"
            );
        }

        Ok(Self {
            estimator: EnergyEstimator::new(config),
            detector: AdaptiveBeatDetector::new(config, sample_rate),
            envelope: EnvelopeGenerator::new(config),
            brightness: BrightnessState::default(),
            frame_budget: Duration::from_secs_f32(config.audio.chunk_duration(sample_rate)),
            config,
            source,
            emitter,
            sink,
            cancel,
            looping,
            stats: SessionStats::default(),
        })
    }

    /// A clone of the session's cancel token, for handing to a signal
    /// handler or another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Drives the session to completion, stop, or error. Both light
    /// channels are forced to zero before this returns, on every path.
    pub fn run(mut self) -> Result<SessionReport> {
        let outcome = self.play();

        self.brightness = BrightnessState::default();
        match (outcome, self.sink.all_off()) {
            (Ok(outcome), Ok(())) => {
                info!(
                    frames = self.stats.frames_processed,
                    beats = self.stats.beats_fired,
                    loops = self.stats.loops_completed,
                    ?outcome,
                    "session finished"
                );
                Ok(SessionReport {
                    outcome,
                    stats: self.stats,
                })
            }
            (Ok(_), Err(teardown)) => Err(teardown),
            (Err(err), teardown) => {
                // The original failure wins; a teardown failure on top of
                // it is only logged.
                if let Err(teardown) = teardown {
                    warn!(%teardown, "teardown failed after session error");
                }
                Err(err)
            }
        }
    }

    fn play(&mut self) -> Result<SessionOutcome> {
        loop {
            if self.cancel.is_cancelled() {
                debug!("cancellation observed");
                return Ok(SessionOutcome::Stopped);
            }

            let frame = match self.source.next_frame()? {
                Some(frame) => frame,
                None => {
                    if self.looping {
                        self.restart_source()?;
                        continue;
                    }
                    self.emitter.finish()?;
                    return Ok(SessionOutcome::Completed);
                }
            };

            // The emitter queues the frame for the device and applies its
            // backpressure; analysis then runs inside the frame's time
            // budget while the previous chunk is audible.
            self.emitter.emit(&frame)?;

            let started = Instant::now();
            self.analyze(frame)?;

            let spent = started.elapsed();
            if spent > self.frame_budget {
                self.stats.starved_frames += 1;
                warn!(
                    spent_us = spent.as_micros() as u64,
                    budget_us = self.frame_budget.as_micros() as u64,
                    "analysis overran the frame budget"
                );
            }
        }
    }

    fn analyze(&mut self, frame: Frame) -> Result<()> {
        let sample = match self.estimator.estimate(&frame) {
            Ok(sample) => sample,
            Err(err @ BeatlightError::InvalidFrame { .. }) => {
                // Recoverable: skip the frame, hold the previous
                // brightness.
                warn!(%err, frame = frame.index, "skipping malformed frame");
                self.stats.frames_skipped += 1;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let beat = self.detector.observe(sample);
        if beat.is_some() {
            self.stats.beats_fired += 1;
        }

        self.brightness = self.envelope.advance(&sample, beat.as_ref());
        self.apply_brightness()?;
        self.stats.frames_processed += 1;
        Ok(())
    }

    fn apply_brightness(&mut self) -> Result<()> {
        for channel in LightChannel::ALL {
            self.sink
                .set_duty_cycle(channel, self.brightness.channels[channel.index()])?;
        }
        Ok(())
    }

    fn restart_source(&mut self) -> Result<()> {
        self.source.restart()?;
        self.stats.loops_completed += 1;
        if self.config.analysis.loop_restart == LoopRestart::Reset {
            self.detector.reset();
            self.envelope.reset();
        }
        debug!(loops = self.stats.loops_completed, "source restarted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actuator::MemorySink, output::NullEmitter, source::SliceSource};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.audio.sample_rate = 8_000;
        config.audio.chunk_size = 64;
        config
    }

    fn session_over(
        samples: Vec<f32>,
        looping: bool,
        cancel: CancelToken,
        config: &Config,
    ) -> (PlaybackSession<'_, SliceSource, NullEmitter, MemorySink>, MemorySink) {
        let source = SliceSource::new(samples, config.audio.sample_rate, config.audio.chunk_size);
        let sink = MemorySink::new(&config.lights);
        let handle = sink.clone();
        let session =
            PlaybackSession::new(config, source, NullEmitter::new(), sink, looping, cancel)
                .unwrap();
        (session, handle)
    }

    #[test]
    fn completed_session_ends_dark() {
        let config = test_config();
        let (session, sink) = session_over(vec![0.5; 64 * 10], false, CancelToken::new(), &config);
        let report = session.run().unwrap();

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.stats.frames_processed, 10);
        assert_eq!(sink.levels(), [0.0, 0.0]);
    }

    #[test]
    fn pre_cancelled_session_stops_before_any_frame() {
        let config = test_config();
        let cancel = CancelToken::new();
        cancel.cancel();
        let (session, sink) = session_over(vec![0.5; 64 * 10], true, cancel, &config);
        let report = session.run().unwrap();

        assert_eq!(report.outcome, SessionOutcome::Stopped);
        assert_eq!(report.stats.frames_processed, 0);
        assert_eq!(sink.levels(), [0.0, 0.0]);
    }

    #[test]
    fn invalid_config_is_rejected_before_playback() {
        let mut config = test_config();
        config.analysis.beat_threshold = 0.0;
        let source = SliceSource::new(vec![0.0; 128], 8_000, 64);
        let sink = MemorySink::new(&config.lights);
        let err = PlaybackSession::new(
            &config,
            source,
            NullEmitter::new(),
            sink,
            false,
            CancelToken::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, BeatlightError::Configuration(_)));
    }

    /// Sink that loses the device partway through the session.
    #[derive(Clone)]
    struct FlakySink {
        inner: MemorySink,
        fail_after: std::sync::Arc<std::sync::atomic::AtomicU64>,
    }

    impl ActuationSink for FlakySink {
        fn set_duty_cycle(&mut self, channel: LightChannel, fraction: f32) -> Result<()> {
            if self.fail_after.fetch_sub(1, Ordering::SeqCst) == 0 {
                return Err(BeatlightError::device("actuator lost"));
            }
            self.inner.set_duty_cycle(channel, fraction)
        }
    }

    #[test]
    fn device_loss_surfaces_after_best_effort_teardown() {
        let config = test_config();
        let source = SliceSource::new(vec![0.5; 64 * 20], config.audio.sample_rate, 64);
        let inner = MemorySink::new(&config.lights);
        let sink = FlakySink {
            inner: inner.clone(),
            fail_after: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(7)),
        };
        let session = PlaybackSession::new(
            &config,
            source,
            NullEmitter::new(),
            sink,
            false,
            CancelToken::new(),
        )
        .unwrap();

        let err = session.run().err().unwrap();
        assert!(matches!(err, BeatlightError::Device(_)));
    }
}
