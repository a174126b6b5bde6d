/*!
    Stream descriptors reported by a media source when it is opened.
*/

use std::time::Duration;

use crate::{Rational, SampleFormat};

/**
    Format of the audio stream, as delivered in [`AudioFrame`](crate::AudioFrame)s.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /**
        Bytes per interleaved sample frame (one sample for every channel).
    */
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }
}

/**
    Format of the video stream, as delivered in [`VideoFrame`](crate::VideoFrame)s.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate, if the container declares one.
    pub frame_rate: Option<Rational>,
}

/**
    Everything the pipeline needs to know about an opened source.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaInfo {
    pub audio: Option<AudioFormat>,
    pub video: Option<VideoFormat>,
    /// Total duration, if known.
    pub duration: Option<Duration>,
}

impl MediaInfo {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }
}
