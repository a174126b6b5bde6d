/*!
    Decoded frame types.
*/

use std::time::Duration;

use crate::{PooledBuffer, SampleFormat};

/**
    Kind of elementary stream a frame belongs to.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Audio stream
    Audio,
    /// Video stream
    Video,
}

/**
    A decoded video frame.

    Pixels are packed RGBA, 4 bytes per pixel. Rows may be padded, so
    each row starts `stride` bytes after the previous one.
*/
#[derive(Debug)]
pub struct VideoFrame {
    /// Raw pixel rows, `stride * height` bytes.
    pub data: PooledBuffer,
    /// Presentation time since stream start.
    pub start_time: Duration,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub stride: usize,
}

impl VideoFrame {
    /**
        Create a new video frame.
    */
    pub fn new(
        data: PooledBuffer,
        start_time: Duration,
        width: u32,
        height: u32,
        stride: usize,
    ) -> Self {
        Self {
            data,
            start_time,
            width,
            height,
            stride,
        }
    }

    /**
        Returns the pixel bytes of row `y` without padding.
    */
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * 4]
    }
}

/**
    A decoded audio frame.

    Samples are interleaved: for stereo the layout is `[L0, R0, L1, R1, ...]`.
*/
#[derive(Debug)]
pub struct AudioFrame {
    /// Interleaved sample bytes.
    pub data: PooledBuffer,
    /// Presentation time since stream start.
    pub start_time: Duration,
    /// Number of channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of samples per channel.
    pub samples: usize,
    /// Sample format.
    pub format: SampleFormat,
}

impl AudioFrame {
    /**
        Create a new audio frame.
    */
    pub fn new(
        data: PooledBuffer,
        start_time: Duration,
        channels: u16,
        sample_rate: u32,
        samples: usize,
        format: SampleFormat,
    ) -> Self {
        Self {
            data,
            start_time,
            channels,
            sample_rate,
            samples,
            format,
        }
    }

    /**
        Returns the playback duration of this frame.
    */
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        nanos_of(self.samples as u128, self.sample_rate as u128)
    }

    /**
        Returns the presentation time of the sample right after this frame.
    */
    pub fn end_time(&self) -> Duration {
        self.start_time + self.duration()
    }

    /**
        Returns the number of bytes that make up one second of this audio.
    */
    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * self.format.bytes_per_sample() as u64
    }

    /**
        Convert a byte count of this frame's audio into a playback duration.
    */
    pub fn bytes_to_duration(&self, bytes: usize) -> Duration {
        let per_second = self.bytes_per_second();
        if per_second == 0 {
            return Duration::ZERO;
        }
        nanos_of(bytes as u128, per_second as u128)
    }

    /**
        Returns the expected data length in bytes.
    */
    pub fn expected_data_len(&self) -> usize {
        self.samples * self.channels as usize * self.format.bytes_per_sample()
    }
}

fn nanos_of(units: u128, per_second: u128) -> Duration {
    let nanos = units * 1_000_000_000 / per_second;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/**
    One decoded, presentable unit pulled from a media source.

    A frame owns its pooled buffer. Frames are deliberately not `Clone`:
    ownership moves hop by hop and the last holder returns the buffer by
    dropping the frame.
*/
#[derive(Debug)]
pub enum Frame {
    Audio(AudioFrame),
    Video(VideoFrame),
}

impl Frame {
    /**
        Presentation time since stream start.
    */
    pub fn start_time(&self) -> Duration {
        match self {
            Self::Audio(frame) => frame.start_time,
            Self::Video(frame) => frame.start_time,
        }
    }

    /**
        Stream this frame belongs to.
    */
    pub fn kind(&self) -> StreamKind {
        match self {
            Self::Audio(_) => StreamKind::Audio,
            Self::Video(_) => StreamKind::Video,
        }
    }
}

impl From<AudioFrame> for Frame {
    fn from(frame: AudioFrame) -> Self {
        Self::Audio(frame)
    }
}

impl From<VideoFrame> for Frame {
    fn from(frame: VideoFrame) -> Self {
        Self::Video(frame)
    }
}

static_assertions::assert_impl_all!(Frame: Send, Sync);
static_assertions::assert_not_impl_any!(Frame: Clone);
static_assertions::assert_not_impl_any!(AudioFrame: Clone);
static_assertions::assert_not_impl_any!(VideoFrame: Clone);
