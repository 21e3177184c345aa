//! End-to-end pipeline tests over in-memory sources and sinks.

use beatlight_core::{
    CancelToken, Config, Frame, FrameSource, MemorySink, NullEmitter, PlaybackSession, Result,
    SessionOutcome, SliceSource,
};

const SAMPLE_RATE: u32 = 8_000;
const CHUNK: usize = 64;

fn test_config() -> Config {
    let mut config = Config::default();
    config.audio.sample_rate = SAMPLE_RATE;
    config.audio.chunk_size = CHUNK;
    config
}

/// A quiet floor with loud chunks at the given frame positions, so the
/// detector has real beats to find.
fn pulse_train(frames: usize, spikes: &[usize]) -> Vec<f32> {
    let mut samples = vec![0.015_f32; frames * CHUNK];
    for &spike in spikes {
        for sample in &mut samples[spike * CHUNK..(spike + 1) * CHUNK] {
            *sample = 0.15;
        }
    }
    samples
}

fn run_session(
    samples: Vec<f32>,
    looping: bool,
    cancel: CancelToken,
    config: &Config,
) -> (beatlight_core::SessionReport, MemorySink) {
    let source = SliceSource::new(samples, SAMPLE_RATE, CHUNK);
    let sink = MemorySink::new(&config.lights);
    let handle = sink.clone();
    let report = PlaybackSession::new(config, source, NullEmitter::new(), sink, looping, cancel)
        .unwrap()
        .run()
        .unwrap();
    (report, handle)
}

#[test]
fn replaying_a_stream_is_deterministic() {
    let config = test_config();
    let samples = pulse_train(120, &[30, 60, 90]);

    let (first_report, first_sink) = run_session(samples.clone(), false, CancelToken::new(), &config);
    let (second_report, second_sink) = run_session(samples, false, CancelToken::new(), &config);

    assert!(first_report.stats.beats_fired > 0);
    assert_eq!(
        first_report.stats.beats_fired,
        second_report.stats.beats_fired
    );
    assert_eq!(first_sink.history(), second_sink.history());
}

#[test]
fn beats_fire_and_brightness_stays_capped() {
    let config = test_config();
    let (report, sink) = run_session(pulse_train(80, &[40]), false, CancelToken::new(), &config);

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.stats.frames_processed, 80);
    assert_eq!(report.stats.beats_fired, 1);
    // The beat flashes to the cap, and nothing ever exceeds it.
    assert_eq!(sink.max_commanded(), 0.83);
    assert_eq!(sink.levels(), [0.0, 0.0]);
}

#[test]
fn sustained_maximum_energy_never_exceeds_the_cap() {
    let config = test_config();
    let (report, sink) = run_session(vec![1.0; 200 * CHUNK], false, CancelToken::new(), &config);

    assert_eq!(report.stats.frames_processed, 200);
    assert!(sink.max_commanded() <= 0.83);
}

/// Delegating source that trips the cancel token after a fixed number of
/// frames, simulating a stop request mid-session.
struct CancelAfter {
    inner: SliceSource,
    remaining: u64,
    cancel: CancelToken,
}

impl FrameSource for CancelAfter {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.remaining == 0 {
            self.cancel.cancel();
        } else {
            self.remaining -= 1;
        }
        self.inner.next_frame()
    }

    fn restart(&mut self) -> Result<()> {
        self.inner.restart()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }
}

#[test]
fn cancellation_darkens_within_one_frame_and_ends_normally() {
    let config = test_config();
    let cancel = CancelToken::new();
    let source = CancelAfter {
        inner: SliceSource::new(pulse_train(100, &[10]), SAMPLE_RATE, CHUNK),
        remaining: 25,
        cancel: cancel.clone(),
    };
    let sink = MemorySink::new(&config.lights);
    let handle = sink.clone();

    let report = PlaybackSession::new(&config, source, NullEmitter::new(), sink, false, cancel)
        .unwrap()
        .run()
        .unwrap();

    // Normal (non-error) termination, at most one frame after the flag.
    assert_eq!(report.outcome, SessionOutcome::Stopped);
    assert!(report.stats.frames_processed <= 26);
    assert_eq!(handle.levels(), [0.0, 0.0]);
}

#[test]
fn looped_playback_is_bounded_and_counts_passes() {
    let config = test_config();
    let cancel = CancelToken::new();
    // Eight frames per pass, cancelled after enough frames for five passes.
    let source = CancelAfter {
        inner: SliceSource::new(pulse_train(8, &[]), SAMPLE_RATE, CHUNK),
        remaining: 8 * 5 + 4,
        cancel: cancel.clone(),
    };
    let sink = MemorySink::new(&config.lights);
    let handle = sink.clone();

    let report = PlaybackSession::new(&config, source, NullEmitter::new(), sink, true, cancel)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.outcome, SessionOutcome::Stopped);
    assert!(report.stats.loops_completed >= 5);
    assert!(report.stats.frames_processed >= 8 * 5);
    assert_eq!(handle.levels(), [0.0, 0.0]);
}

/// Delegating source that emits one truncated frame mid-stream.
struct Corrupting {
    inner: SliceSource,
    corrupt_at: u64,
    produced: u64,
}

impl FrameSource for Corrupting {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.inner.next_frame()?;
        let frame = frame.map(|mut frame| {
            if self.produced == self.corrupt_at {
                frame.samples.truncate(CHUNK / 2);
            }
            frame
        });
        self.produced += 1;
        Ok(frame)
    }

    fn restart(&mut self) -> Result<()> {
        self.inner.restart()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }
}

#[test]
fn malformed_frames_are_skipped_and_playback_continues() {
    let config = test_config();
    let source = Corrupting {
        inner: SliceSource::new(pulse_train(40, &[]), SAMPLE_RATE, CHUNK),
        corrupt_at: 12,
        produced: 0,
    };
    let sink = MemorySink::new(&config.lights);

    let report = PlaybackSession::new(
        &config,
        source,
        NullEmitter::new(),
        sink,
        false,
        CancelToken::new(),
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.stats.frames_skipped, 1);
    assert_eq!(report.stats.frames_processed, 39);
}
