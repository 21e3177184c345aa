//! Core library for the Beatlight audio-reactive light controller.
//!
//! The crate implements the streaming analysis-and-actuation pipeline: a
//! restartable frame source feeds per-frame RMS energy estimation, adaptive
//! beat detection with refractory suppression, and envelope shaping, whose
//! per-channel brightness is applied to a PWM actuation sink while the same
//! frames play on the audio output device. Each module owns one pipeline
//! stage; the playback module ties them together under a shared clock and a
//! single cancellation flag.

pub mod actuator;
pub mod config;
pub mod detector;
pub mod energy;
pub mod envelope;
pub mod error;
pub mod output;
pub mod pattern;
pub mod playback;
pub mod source;

pub use actuator::{ActuationSink, ConsoleSink, LightChannel, MemorySink, SysfsPwmSink};
pub use config::{AnalysisConfig, AudioConfig, Config, LightConfig, LoopRestart};
pub use detector::{AdaptiveBeatDetector, BeatEvent, DetectorPhase, EnergyHistory};
pub use energy::{EnergyEstimator, EnergySample};
pub use envelope::{BrightnessState, EnvelopeGenerator, CHANNELS};
pub use error::{BeatlightError, Result};
pub use output::{AudioEmitter, CpalEmitter, NullEmitter};
pub use pattern::hardware_check;
pub use playback::{CancelToken, PlaybackSession, SessionOutcome, SessionReport, SessionStats};
pub use source::{Frame, FrameSource, SliceSource, WavFrameSource};
