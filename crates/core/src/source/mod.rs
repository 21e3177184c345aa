use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::{config::AudioConfig, BeatlightError, Result};

/// Fixed-size block of consecutive mono samples processed as one unit.
///
/// Immutable once produced; the synchronizer hands a copy of the sample data
/// to the audio device and then moves the frame into the analysis stage,
/// where it is consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position of this frame in the playback session. Strictly increasing,
    /// including across loop restarts.
    pub index: u64,
    /// Samples in [-1, 1].
    pub samples: Vec<f32>,
}

impl Frame {
    /// Duration of the frame in seconds at the given sample rate.
    pub fn duration(&self, sample_rate: u32) -> f32 {
        self.samples.len() as f32 / sample_rate as f32
    }
}

/// Restartable sequence of fixed-size mono frames decoded from an audio
/// asset.
pub trait FrameSource {
    /// Produces the next frame, or `None` once the stream is exhausted.
    /// Trailing samples that do not fill a whole frame are dropped.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Rewinds to the beginning of the stream for looped playback. Frame
    /// indices are not rewound: they keep increasing so refractory
    /// arithmetic stays valid across the seam.
    fn restart(&mut self) -> Result<()>;

    /// Native sample rate of the decoded stream.
    fn sample_rate(&self) -> u32;
}

/// Frame source backed by a WAV file, decoded eagerly to normalized mono.
#[derive(Debug)]
pub struct WavFrameSource {
    samples: Vec<f32>,
    sample_rate: u32,
    chunk_size: usize,
    cursor: usize,
    next_index: u64,
}

impl WavFrameSource {
    /// Opens and decodes `path`. Multi-channel audio is downmixed by
    /// averaging; 16/24/32-bit integer and 32-bit float encodings are
    /// accepted.
    pub fn open(path: &Path, audio: &AudioConfig) -> Result<Self> {
        let reader = WavReader::open(path)
            .map_err(|err| BeatlightError::asset(format!("{}: {err}", path.display())))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            (SampleFormat::Int, 16) => reader
                .into_samples::<i16>()
                .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
                .collect::<std::result::Result<_, _>>()?,
            (SampleFormat::Int, 24) => reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / 8_388_607.0))
                .collect::<std::result::Result<_, _>>()?,
            (SampleFormat::Int, 32) => reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / i32::MAX as f32))
                .collect::<std::result::Result<_, _>>()?,
            (_, bits) => {
                return Err(BeatlightError::asset(format!(
                    "{}: unsupported bit depth {bits}",
                    path.display()
                )))
            }
        };

        let samples = downmix(&interleaved, channels);
        if samples.len() < audio.chunk_size {
            return Err(BeatlightError::asset(format!(
                "{}: shorter than one frame",
                path.display()
            )));
        }

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            chunk_size: audio.chunk_size,
            cursor: 0,
            next_index: 0,
        })
    }

    /// Total number of whole frames in one pass of the asset.
    pub fn frames_per_pass(&self) -> u64 {
        (self.samples.len() / self.chunk_size) as u64
    }
}

impl FrameSource for WavFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.cursor + self.chunk_size > self.samples.len() {
            return Ok(None);
        }
        let samples = self.samples[self.cursor..self.cursor + self.chunk_size].to_vec();
        self.cursor += self.chunk_size;
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame { index, samples }))
    }

    fn restart(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// In-memory frame source used by tests and offline runs.
#[derive(Debug, Clone)]
pub struct SliceSource {
    samples: Vec<f32>,
    sample_rate: u32,
    chunk_size: usize,
    cursor: usize,
    next_index: u64,
}

impl SliceSource {
    pub fn new(samples: Vec<f32>, sample_rate: u32, chunk_size: usize) -> Self {
        Self {
            samples,
            sample_rate,
            chunk_size,
            cursor: 0,
            next_index: 0,
        }
    }
}

impl FrameSource for SliceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.cursor + self.chunk_size > self.samples.len() {
            return Ok(None);
        }
        let samples = self.samples[self.cursor..self.cursor + self.chunk_size].to_vec();
        self.cursor += self.chunk_size;
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame { index, samples }))
    }

    fn restart(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
