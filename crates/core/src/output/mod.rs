use std::{
    collections::VecDeque,
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::warn;

use crate::{source::Frame, BeatlightError, Result};

/// Hands frames to the audio device in real time.
///
/// `emit` blocks until the frame has been queued for output, so the device's
/// own clock paces the caller. The queue holds at most one frame, which
/// bounds audio/analysis drift to a single chunk.
pub trait AudioEmitter {
    fn emit(&mut self, frame: &Frame) -> Result<()>;

    /// Blocks until queued audio has drained. Called at normal end of
    /// stream so the tail is not cut off.
    fn finish(&mut self) -> Result<()>;
}

const QUEUE_FRAMES: usize = 1;
const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Emitter backed by the default cpal output device. Mono frames are
/// duplicated onto both output channels; an underrun plays silence rather
/// than stalling the device.
pub struct CpalEmitter {
    sender: Sender<Vec<f32>>,
    _stream: cpal::Stream,
    chunk_duration: Duration,
}

impl CpalEmitter {
    pub fn open(sample_rate: u32, chunk_size: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BeatlightError::device("no audio output device found"))?;

        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sender, receiver) = bounded::<Vec<f32>>(QUEUE_FRAMES);
        let mut pending = PendingSamples::default();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    pending.fill_stereo(data, &receiver);
                },
                |err| warn!(%err, "audio stream error"),
                None,
            )
            .map_err(|err| BeatlightError::device(format!("cannot open audio stream: {err}")))?;

        stream
            .play()
            .map_err(|err| BeatlightError::device(format!("cannot start audio stream: {err}")))?;

        Ok(Self {
            sender,
            _stream: stream,
            chunk_duration: Duration::from_secs_f32(chunk_size as f32 / sample_rate as f32),
        })
    }
}

impl AudioEmitter for CpalEmitter {
    fn emit(&mut self, frame: &Frame) -> Result<()> {
        self.sender
            .send(frame.samples.clone())
            .map_err(|_| BeatlightError::device("audio stream closed mid-session"))
    }

    fn finish(&mut self) -> Result<()> {
        while !self.sender.is_empty() {
            thread::sleep(DRAIN_POLL);
        }
        // The callback may still hold up to one chunk.
        thread::sleep(self.chunk_duration);
        Ok(())
    }
}

/// Carry-over between output callbacks: the device rarely asks for exactly
/// one frame's worth of samples.
#[derive(Default)]
struct PendingSamples {
    samples: VecDeque<f32>,
}

impl PendingSamples {
    fn fill_stereo(&mut self, data: &mut [f32], receiver: &Receiver<Vec<f32>>) {
        for out in data.chunks_exact_mut(2) {
            if self.samples.is_empty() {
                if let Ok(frame) = receiver.try_recv() {
                    self.samples.extend(frame);
                }
            }
            let sample = self.samples.pop_front().unwrap_or(0.0);
            out[0] = sample;
            out[1] = sample;
        }
    }
}

/// Emitter that accepts frames without a device, used by tests and
/// headless runs. Applies no pacing.
#[derive(Debug, Default)]
pub struct NullEmitter {
    frames_emitted: u64,
}

impl NullEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }
}

impl AudioEmitter for NullEmitter {
    fn emit(&mut self, _frame: &Frame) -> Result<()> {
        self.frames_emitted += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
