//! Voice audio: playback queue, capture chunking and device streams

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::protocol::INPUT_SAMPLE_RATE;

/// Capture chunk length in milliseconds
pub const CHUNK_MS: u32 = 100;

#[derive(Debug)]
pub enum AudioError {
    NoDevice,
    DeviceError(String),
    StreamError(String),
    Disabled,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoDevice => write!(f, "No audio device found"),
            AudioError::DeviceError(e) => write!(f, "Audio device error: {}", e),
            AudioError::StreamError(e) => write!(f, "Audio stream error: {}", e),
            AudioError::Disabled => write!(f, "Audio I/O not enabled. Build with --features audio-io"),
        }
    }
}

impl std::error::Error for AudioError {}

/// Root mean square of a block, 0.0..=1.0 for normalized input
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt().min(1.0)
}

/// Linear-interpolating sample rate conversion
pub fn resample(input: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || input.is_empty() {
        return input.to_vec();
    }
    let out_len = ((input.len() as u64 * to as u64) / from as u64) as usize;
    let step = from as f64 / to as f64;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = input[idx.min(input.len() - 1)];
            let b = input[(idx + 1).min(input.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Linear resampler for a continuous stream delivered in blocks.
///
/// The fractional read position and the last input sample carry over between
/// calls, so splitting a stream anywhere yields the same output as converting
/// it in one piece.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    from: u32,
    to: u32,
    pos: f64,
    last: Option<f32>,
}

impl StreamResampler {
    pub fn new(from: u32, to: u32) -> Self {
        Self { from, to, pos: 0.0, last: None }
    }

    pub fn source_rate(&self) -> u32 {
        self.from
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.from == self.to || input.is_empty() {
            return input.to_vec();
        }
        let step = self.from as f64 / self.to as f64;
        // previous block's final sample sits at index 0
        let carried = self.last;
        let offset = usize::from(carried.is_some());
        let len = input.len() + offset;
        let sample = |i: usize| match (i, carried) {
            (0, Some(last)) => last,
            _ => input[i - offset],
        };

        let end = (len - 1) as f64;
        let mut out = Vec::with_capacity((input.len() as f64 / step) as usize + 1);
        while self.pos < end {
            let idx = self.pos as usize;
            let frac = (self.pos - idx as f64) as f32;
            let a = sample(idx);
            let b = sample(idx + 1);
            out.push(a + (b - a) * frac);
            self.pos += step;
        }
        self.pos -= end;
        self.last = Some(sample(len - 1));
        out
    }
}

struct QueueInner {
    samples: VecDeque<f32>,
    level: f32,
    resampler: Option<StreamResampler>,
}

/// Mono samples waiting for the output device, at the device rate
///
/// Consecutive pushes play back to back; `flush` drops everything queued.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Mutex<QueueInner>>,
    sample_rate: u32,
}

impl PlaybackQueue {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner { samples: VecDeque::new(), level: 0.0, resampler: None })),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queue mono audio recorded at `rate`; pushes at the same rate form one stream
    pub fn push(&self, samples: &[f32], rate: u32) {
        let mut inner = self.inner.lock();
        let resampler = match inner.resampler.take() {
            Some(r) if r.source_rate() == rate => r,
            _ => StreamResampler::new(rate, self.sample_rate),
        };
        let resampler = inner.resampler.insert(resampler);
        let converted = resampler.process(samples);
        inner.samples.extend(converted);
    }

    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.samples.clear();
        inner.level = 0.0;
        inner.resampler = None;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Level of the most recently played block
    pub fn level(&self) -> f32 {
        self.inner.lock().level
    }

    /// Fill an interleaved output buffer; silence once the queue runs dry
    pub fn fill(&self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut inner = self.inner.lock();
        let mut played = Vec::with_capacity(data.len() / channels);
        for frame in data.chunks_mut(channels) {
            let sample = inner.samples.pop_front().unwrap_or(0.0);
            played.push(sample);
            frame.fill(sample);
        }
        inner.level = rms(&played);
    }
}

/// Downmixes device input and cuts it into fixed 16 kHz chunks
pub struct CaptureChunker {
    source_rate: u32,
    channels: usize,
    pending: Vec<f32>,
}

impl CaptureChunker {
    pub fn new(source_rate: u32, channels: usize) -> Self {
        Self { source_rate, channels: channels.max(1), pending: Vec::new() }
    }

    fn source_chunk_len(&self) -> usize {
        (self.source_rate * CHUNK_MS / 1000).max(1) as usize
    }

    /// Feed interleaved device samples; returns any completed chunks
    pub fn push(&mut self, interleaved: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend(
            interleaved
                .chunks(self.channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
        );

        let chunk_len = self.source_chunk_len();
        let mut chunks = Vec::new();
        while self.pending.len() >= chunk_len {
            let block: Vec<f32> = self.pending.drain(..chunk_len).collect();
            chunks.push(resample(&block, self.source_rate, INPUT_SAMPLE_RATE));
        }
        chunks
    }
}

/// A completed microphone chunk and its level
pub struct CaptureChunk {
    pub pcm: Vec<i16>,
    pub level: f32,
}

#[cfg(feature = "audio-io")]
mod devices {
    use std::sync::mpsc::Sender;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::Stream;

    use super::{AudioError, CaptureChunk, CaptureChunker, PlaybackQueue};
    use crate::voice::protocol::f32_to_i16;

    /// Open microphone stream; dropping it releases the device
    pub struct Microphone {
        _stream: Stream,
    }

    impl Microphone {
        pub fn start(chunks: Sender<CaptureChunk>) -> Result<Self, AudioError> {
            let host = cpal::default_host();
            let device = host.default_input_device().ok_or(AudioError::NoDevice)?;
            let config = device
                .default_input_config()
                .map_err(|e| AudioError::DeviceError(e.to_string()))?;
            tracing::info!(
                "Microphone: {} ({} Hz, {} ch)",
                device.name().unwrap_or_default(),
                config.sample_rate().0,
                config.channels()
            );

            if config.sample_format() != cpal::SampleFormat::F32 {
                return Err(AudioError::DeviceError(format!(
                    "Unsupported input sample format {:?}",
                    config.sample_format()
                )));
            }

            let mut chunker = CaptureChunker::new(config.sample_rate().0, config.channels() as usize);
            let stream = device
                .build_input_stream(
                    &config.into(),
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        for chunk in chunker.push(data) {
                            let level = super::rms(&chunk);
                            let _ = chunks.send(CaptureChunk { pcm: f32_to_i16(&chunk), level });
                        }
                    },
                    |err| tracing::error!("Microphone stream error: {}", err),
                    None,
                )
                .map_err(|e| AudioError::StreamError(e.to_string()))?;
            stream.play().map_err(|e| AudioError::StreamError(e.to_string()))?;

            Ok(Self { _stream: stream })
        }
    }

    /// Open output stream fed from a `PlaybackQueue`
    pub struct Speaker {
        _stream: Stream,
        queue: PlaybackQueue,
    }

    impl Speaker {
        pub fn start() -> Result<Self, AudioError> {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
            let config = device
                .default_output_config()
                .map_err(|e| AudioError::DeviceError(e.to_string()))?;
            tracing::info!("Audio device: {}", device.name().unwrap_or_default());

            if config.sample_format() != cpal::SampleFormat::F32 {
                return Err(AudioError::DeviceError(format!(
                    "Unsupported output sample format {:?}",
                    config.sample_format()
                )));
            }

            let channels = config.channels() as usize;
            let queue = PlaybackQueue::new(config.sample_rate().0);
            let consumer = queue.clone();
            let stream = device
                .build_output_stream(
                    &config.into(),
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| consumer.fill(data, channels),
                    |err| tracing::error!("Audio stream error: {}", err),
                    None,
                )
                .map_err(|e| AudioError::StreamError(e.to_string()))?;
            stream.play().map_err(|e| AudioError::StreamError(e.to_string()))?;

            Ok(Self { _stream: stream, queue })
        }

        pub fn queue(&self) -> &PlaybackQueue {
            &self.queue
        }
    }
}

// Stub implementation when audio-io feature is disabled
#[cfg(not(feature = "audio-io"))]
mod devices {
    use std::sync::mpsc::Sender;

    use super::{AudioError, CaptureChunk, PlaybackQueue};

    pub struct Microphone;

    impl Microphone {
        pub fn start(_chunks: Sender<CaptureChunk>) -> Result<Self, AudioError> {
            Err(AudioError::Disabled)
        }
    }

    pub struct Speaker {
        queue: PlaybackQueue,
    }

    impl Speaker {
        pub fn start() -> Result<Self, AudioError> {
            Err(AudioError::Disabled)
        }

        pub fn queue(&self) -> &PlaybackQueue {
            &self.queue
        }
    }
}

pub use devices::{Microphone, Speaker};
