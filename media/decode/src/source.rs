/*!
    FFmpeg-backed [`FrameSource`].
*/

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{ffi, format, media};

use media_pipeline::{FrameSource, SourceError};
use media_types::{BufferPool, Error, Frame, MediaInfo, Rational, Result, VideoFormat};

use crate::audio::AudioDecoder;
use crate::video::VideoDecoder;

/**
    Which streams to decode.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceOptions {
    pub audio: bool,
    pub video: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/**
    Demuxes a media file and decodes its best audio and video streams.

    Frames come out in demux order, which interleaves the two streams
    roughly by timestamp. Timestamps are relative to the container's start
    time, so playback begins at zero even for streams that do not.
*/
pub struct FfmpegSource {
    input: Option<format::context::Input>,
    audio: Option<AudioDecoder>,
    video: Option<VideoDecoder>,
    info: MediaInfo,
    origin_us: i64,
    pending: VecDeque<Frame>,
    drained: bool,
}

impl FfmpegSource {
    /**
        Report which kinds of stream `path` contains, without setting up
        any decoders.
    */
    pub fn probe(path: impl AsRef<Path>) -> Result<SourceOptions> {
        let input = open_input(path.as_ref())?;
        Ok(SourceOptions {
            audio: input.streams().best(media::Type::Audio).is_some(),
            video: input.streams().best(media::Type::Video).is_some(),
        })
    }

    /**
        Open `path` and set up decoders for the requested streams.

        Fails if a requested kind of stream is missing from the file, or if
        the selected audio stream uses a sample format outside the
        supported set.
    */
    pub fn open(path: impl AsRef<Path>, options: SourceOptions, pool: BufferPool) -> Result<Self> {
        let path = path.as_ref();
        let input = open_input(path)?;
        check_requested(
            options,
            SourceOptions {
                audio: input.streams().best(media::Type::Audio).is_some(),
                video: input.streams().best(media::Type::Video).is_some(),
            },
        )?;

        // SAFETY: the context is open and owned by `input`
        let start_time = unsafe { (*input.as_ptr()).start_time };
        let origin_us = if start_time == ffi::AV_NOPTS_VALUE {
            0
        } else {
            start_time.max(0)
        };
        let origin = Duration::from_micros(origin_us as u64);

        let audio = match input.streams().best(media::Type::Audio).filter(|_| options.audio) {
            Some(stream) => Some(AudioDecoder::new(
                stream.parameters(),
                stream.index(),
                rational(stream.time_base()),
                origin,
                pool.clone(),
            )?),
            None => None,
        };

        let mut video_format = None;
        let video = match input.streams().best(media::Type::Video).filter(|_| options.video) {
            Some(stream) => {
                let decoder = VideoDecoder::new(
                    stream.parameters(),
                    stream.index(),
                    rational(stream.time_base()),
                    origin,
                    pool.clone(),
                )?;
                let rate = stream.avg_frame_rate();
                video_format = Some(VideoFormat {
                    width: decoder.width(),
                    height: decoder.height(),
                    frame_rate: Rational::checked(rate.numerator(), rate.denominator())
                        .filter(|r| r.is_positive()),
                });
                Some(decoder)
            }
            None => None,
        };

        let audio_format = audio.as_ref().map(AudioDecoder::format).transpose()?;

        let duration = (input.duration() > 0)
            .then(|| Duration::from_micros(input.duration() as u64));

        let info = MediaInfo {
            audio: audio_format,
            video: video_format,
            duration,
        };
        tracing::info!(
            path = %path.display(),
            audio = ?info.audio,
            video = ?info.video,
            duration = ?info.duration,
            "opened media source"
        );

        Ok(Self {
            input: Some(input),
            audio,
            video,
            info,
            origin_us,
            pending: VecDeque::new(),
            drained: false,
        })
    }

    /**
        Read one packet and decode it. Returns false once the container is
        exhausted and both decoders have been drained.
    */
    fn pump(&mut self) -> Result<bool> {
        let Some(input) = self.input.as_mut() else {
            return Ok(false);
        };
        if self.drained {
            return Ok(false);
        }

        let mut packet = ffmpeg_next::Packet::empty();
        match packet.read(input) {
            Ok(()) => {
                let index = packet.stream();
                if let Some(audio) = self.audio.as_mut().filter(|a| a.stream_index() == index) {
                    audio.send_packet(&packet)?;
                    audio.receive_into(&mut self.pending)?;
                } else if let Some(video) =
                    self.video.as_mut().filter(|v| v.stream_index() == index)
                {
                    video.send_packet(&packet)?;
                    video.receive_into(&mut self.pending)?;
                }
                Ok(true)
            }
            Err(ffmpeg_next::Error::Eof) => {
                tracing::debug!("container exhausted, draining decoders");
                if let Some(audio) = self.audio.as_mut() {
                    audio.send_eof()?;
                    audio.receive_into(&mut self.pending)?;
                }
                if let Some(video) = self.video.as_mut() {
                    video.send_eof()?;
                    video.receive_into(&mut self.pending)?;
                }
                self.drained = true;
                Ok(true)
            }
            Err(e) => Err(Error::codec(format!("failed to read packet: {e}"))),
        }
    }
}

// SAFETY: the FFmpeg contexts (demuxer, decoders, scaler) are owned
// exclusively by this value and are never shared. The pipeline only
// reaches the source through its session lock, so at most one thread
// touches them at a time; moving them between threads is sound.
unsafe impl Send for FfmpegSource {}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if !self.pump()? {
                return Ok(None);
            }
        }
    }

    fn seek(&mut self, target: Duration) -> Result<(), SourceError> {
        let Some(input) = self.input.as_mut() else {
            return Ok(());
        };
        let micros = i64::try_from(target.as_micros()).unwrap_or(i64::MAX);
        let timestamp = self.origin_us.saturating_add(micros);

        // Capping the range at `timestamp` lands on the keyframe at or before it
        input
            .seek(timestamp, ..timestamp)
            .map_err(|e| Error::codec(format!("seek to {target:?} failed: {e}")))?;

        if let Some(audio) = self.audio.as_mut() {
            audio.reset();
        }
        if let Some(video) = self.video.as_mut() {
            video.reset();
        }
        self.pending.clear();
        self.drained = false;
        tracing::debug!(?target, timestamp, "source repositioned");
        Ok(())
    }

    fn close(&mut self) {
        if self.input.take().is_some() {
            self.pending.clear();
            self.audio = None;
            self.video = None;
            tracing::debug!("media source closed");
        }
    }
}

fn open_input(path: &Path) -> Result<format::context::Input> {
    std::fs::metadata(path)?;
    ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;
    format::input(&path).map_err(|e| Error::codec(format!("failed to open {}: {e}", path.display())))
}

/**
    Fail if `requested` asks for a kind of stream `available` lacks.
*/
fn check_requested(requested: SourceOptions, available: SourceOptions) -> Result<()> {
    if requested.audio && !available.audio {
        return Err(Error::invalid_data("no audio stream in media"));
    }
    if requested.video && !available.video {
        return Err(Error::invalid_data("no video stream in media"));
    }
    Ok(())
}

fn rational(value: ffmpeg_next::Rational) -> Rational {
    Rational::checked(value.numerator(), value.denominator()).unwrap_or(Rational::new(1, 1_000_000))
}

impl std::fmt::Debug for FfmpegSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegSource")
            .field("info", &self.info)
            .field("audio", &self.audio)
            .field("video", &self.video)
            .field("pending", &self.pending.len())
            .field("closed", &self.input.is_none())
            .finish_non_exhaustive()
    }
}
