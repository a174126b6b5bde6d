use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use parking_lot::Mutex;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use thiserror::Error;

use media_pipeline::{AudioOutput, AudioWriteError, EpochToken, WriteStatus};
use media_types::AudioFormat;

use super::convert::Converter;

/// Audio buffered between the pipeline and the device callback.
const RING_LATENCY: Duration = Duration::from_millis(100);

/// How long a blocked write sleeps before checking the ring again.
const FULL_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("failed to query device config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("failed to start output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("unsupported device sample format: {0:?}")]
    UnsupportedSampleFormat(cpal::SampleFormat),
}

/**
    The default output device, kept open for the life of the player.

    The cpal stream is not `Send`, so this lives on the main thread; the
    pipeline gets the shareable [`CpalOutput`] half through [`output`](Self::output).
*/
pub struct AudioDevice {
    _stream: cpal::Stream,
    output: Arc<CpalOutput>,
}

impl AudioDevice {
    pub fn open_default() -> Result<Self, OutputError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let rate = config.sample_rate.0;
        let channels = config.channels;
        let capacity =
            (rate as usize * channels as usize * RING_LATENCY.as_millis() as usize / 1000).max(1024);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let shared = Arc::new(Shared {
            playing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            fault: Mutex::new(None),
        });

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, &shared)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, &shared)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, &shared)?,
            other => return Err(OutputError::UnsupportedSampleFormat(other)),
        };
        stream.play()?;

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            rate,
            channels,
            ?sample_format,
            capacity,
            "audio device opened"
        );

        Ok(Self {
            _stream: stream,
            output: Arc::new(CpalOutput {
                ring: Mutex::new(RingWriter {
                    producer,
                    converter: None,
                    scratch: Vec::new(),
                }),
                shared,
                rate,
                channels,
            }),
        })
    }

    pub fn output(&self) -> Arc<CpalOutput> {
        Arc::clone(&self.output)
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.output.shared.closed.store(true, Ordering::Release);
    }
}

/// State shared with the device callback.
struct Shared {
    playing: AtomicBool,
    closed: AtomicBool,
    fault: Mutex<Option<String>>,
}

struct RingWriter {
    producer: HeapProd<f32>,
    converter: Option<Converter>,
    scratch: Vec<f32>,
}

/**
    The pipeline's view of the audio device.

    Writes are converted to the device format and pushed into a ring the
    device callback drains. While paused the callback plays silence and
    leaves the ring alone, so writes block once it fills up.
*/
pub struct CpalOutput {
    ring: Mutex<RingWriter>,
    shared: Arc<Shared>,
    rate: u32,
    channels: u16,
}

impl AudioOutput for CpalOutput {
    fn write(
        &self,
        data: &[u8],
        format: AudioFormat,
        token: &EpochToken,
    ) -> Result<WriteStatus, AudioWriteError> {
        let bytes_per_frame = format.bytes_per_frame();
        if bytes_per_frame == 0 || data.len() < bytes_per_frame {
            // Nothing playable; consume it so the clock stays in step
            return Ok(WriteStatus::Written(data.len()));
        }

        loop {
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(AudioWriteError::Closed);
            }
            if let Some(message) = self.shared.fault.lock().take() {
                return Err(AudioWriteError::Device(message));
            }
            if !token.is_live() {
                return Ok(WriteStatus::Cancelled);
            }

            let mut ring = self.ring.lock();
            let RingWriter {
                producer,
                converter,
                scratch,
            } = &mut *ring;

            if converter.as_ref().is_none_or(|c| c.input() != format) {
                tracing::debug!(
                    ?format,
                    rate = self.rate,
                    channels = self.channels,
                    "audio converter reset"
                );
                *converter = Some(Converter::new(format, self.rate, self.channels));
            }
            let Some(converter) = converter.as_mut() else {
                return Err(AudioWriteError::Closed);
            };

            let frames = converter
                .max_input_frames(producer.vacant_len())
                .min(data.len() / bytes_per_frame);
            if frames == 0 {
                drop(ring);
                if !token.wait_timeout(FULL_POLL) {
                    return Ok(WriteStatus::Cancelled);
                }
                continue;
            }

            scratch.clear();
            let consumed = converter.process(&data[..frames * bytes_per_frame], scratch);
            let pushed = producer.push_slice(scratch);
            if pushed < scratch.len() {
                tracing::warn!(pushed, converted = scratch.len(), "audio ring overflow");
            }
            return Ok(WriteStatus::Written(consumed));
        }
    }

    fn pause(&self) {
        self.shared.playing.store(false, Ordering::Release);
    }

    fn resume(&self) {
        self.shared.playing.store(true, Ordering::Release);
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
    shared: &Arc<Shared>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let data_shared = Arc::clone(shared);
    let error_shared = Arc::clone(shared);

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let playing = data_shared.playing.load(Ordering::Acquire);
            for sample in data.iter_mut() {
                let value = if playing {
                    consumer.try_pop().unwrap_or(0.0)
                } else {
                    0.0
                };
                *sample = T::from_sample(value);
            }
        },
        move |err| {
            tracing::warn!(%err, "audio stream error");
            *error_shared.fault.lock() = Some(err.to_string());
        },
        Some(Duration::from_millis(200)),
    )
}
