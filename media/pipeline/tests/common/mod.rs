#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use media_pipeline::{
    AudioOutput, AudioWriteError, EpochToken, FrameSource, PipelineEvent, RenderError, Renderer,
    SourceError, WriteStatus,
};
use media_types::{
    AudioFormat, AudioFrame, BufferPool, Frame, MediaInfo, Rational, SampleFormat, VideoFormat,
    VideoFrame,
};

/// Mono 16-bit audio at 8 kHz in 20ms frames.
pub const AUDIO_RATE: u32 = 8000;
pub const AUDIO_FRAME: Duration = Duration::from_millis(20);
pub const AUDIO_SAMPLES: usize = 160;
/// 25 fps video.
pub const VIDEO_FRAME: Duration = Duration::from_millis(40);

/// What a [`FakeSource`] did, shared with the test after the source is moved.
#[derive(Default, Debug)]
pub struct SourceLog {
    pub audio_produced: u64,
    pub video_produced: u64,
    pub seeks: Vec<Duration>,
    pub closed: bool,
}

/**
    Synthetic source with a fixed timeline. Seeks land on the keyframe at or
    before the target, like a real demuxer.
*/
pub struct FakeSource {
    info: MediaInfo,
    pool: BufferPool,
    next_audio: Duration,
    next_video: Duration,
    keyframe_interval: Duration,
    fail_after: Option<u64>,
    fail_seek: bool,
    pub log: Arc<Mutex<SourceLog>>,
}

impl FakeSource {
    pub fn new(duration: Duration, audio: bool, video: bool) -> Self {
        Self {
            info: MediaInfo {
                audio: audio.then_some(AudioFormat {
                    sample_rate: AUDIO_RATE,
                    channels: 1,
                    sample_format: SampleFormat::S16,
                }),
                video: video.then_some(VideoFormat {
                    width: 2,
                    height: 2,
                    frame_rate: Some(Rational::new(25, 1)),
                }),
                duration: Some(duration),
            },
            pool: BufferPool::new(),
            next_audio: Duration::ZERO,
            next_video: Duration::ZERO,
            keyframe_interval: Duration::from_secs(1),
            fail_after: None,
            fail_seek: false,
            log: Arc::new(Mutex::new(SourceLog::default())),
        }
    }

    /// Fail decoding after `frames` frames.
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn failing_seeks(mut self) -> Self {
        self.fail_seek = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<SourceLog>> {
        Arc::clone(&self.log)
    }

    fn end(&self) -> Duration {
        self.info.duration.unwrap_or_default()
    }
}

impl FrameSource for FakeSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut log = self.log.lock();
        if let Some(limit) = self.fail_after {
            if log.audio_produced + log.video_produced >= limit {
                return Err(media_types::Error::codec("corrupt packet"));
            }
        }

        let end = self.end();
        let audio_due = self.info.has_audio() && self.next_audio < end;
        let video_due = self.info.has_video() && self.next_video < end;
        let pick_audio = match (audio_due, video_due) {
            (false, false) => return Ok(None),
            (true, false) => true,
            (false, true) => false,
            (true, true) => self.next_audio <= self.next_video,
        };

        if pick_audio {
            let start = self.next_audio;
            self.next_audio += AUDIO_FRAME;
            log.audio_produced += 1;
            let data = self.pool.acquire(AUDIO_SAMPLES * 2);
            Ok(Some(
                AudioFrame::new(data, start, 1, AUDIO_RATE, AUDIO_SAMPLES, SampleFormat::S16).into(),
            ))
        } else {
            let start = self.next_video;
            self.next_video += VIDEO_FRAME;
            log.video_produced += 1;
            let data = self.pool.acquire(2 * 2 * 4);
            Ok(Some(VideoFrame::new(data, start, 2, 2, 8).into()))
        }
    }

    fn seek(&mut self, target: Duration) -> Result<(), SourceError> {
        self.log.lock().seeks.push(target);
        if self.fail_seek {
            return Err(media_types::Error::invalid_data("index missing"));
        }
        let keyframes = target.as_nanos() / self.keyframe_interval.as_nanos();
        let keyframe = self.keyframe_interval * keyframes as u32;
        self.next_audio = keyframe;
        self.next_video = keyframe;
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().closed = true;
    }
}

/**
    Audio output that consumes data in real time, in 10ms slices, and
    accepts nothing while paused.
*/
pub struct FakeOutput {
    playing: AtomicBool,
    fail_with: Mutex<Option<fn() -> AudioWriteError>>,
    pub written: Mutex<u64>,
}

impl FakeOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            playing: AtomicBool::new(false),
            fail_with: Mutex::new(None),
            written: Mutex::new(0),
        })
    }

    pub fn failing(make: fn() -> AudioWriteError) -> Arc<Self> {
        let output = Self::new();
        *output.fail_with.lock() = Some(make);
        output
    }
}

impl AudioOutput for FakeOutput {
    fn write(
        &self,
        data: &[u8],
        format: AudioFormat,
        token: &EpochToken,
    ) -> Result<WriteStatus, AudioWriteError> {
        if let Some(make) = *self.fail_with.lock() {
            return Err(make());
        }
        while !self.playing.load(Ordering::Acquire) {
            if !token.wait_timeout(Duration::from_millis(2)) {
                return Ok(WriteStatus::Cancelled);
            }
        }
        let slice_bytes = format.bytes_per_frame() * (format.sample_rate as usize / 100);
        let n = data.len().min(slice_bytes);
        let slice = Duration::from_secs_f64(n as f64 / (format.bytes_per_frame() as f64 * format.sample_rate as f64));
        if !token.wait_timeout(slice) {
            return Ok(WriteStatus::Cancelled);
        }
        *self.written.lock() += n as u64;
        Ok(WriteStatus::Written(n))
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::Release);
    }

    fn resume(&self) {
        self.playing.store(true, Ordering::Release);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Rendered {
    pub start: Duration,
    pub position: Duration,
    pub at: Instant,
}

/// Renderer that records every frame it is given.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    pub frames: Arc<Mutex<Vec<Rendered>>>,
    pub fail: bool,
}

impl RecordingRenderer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn rendered(&self) -> Vec<Rendered> {
        self.frames.lock().clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, frame: &VideoFrame, position: Duration) -> Result<(), RenderError> {
        if self.fail {
            return Err(RenderError::Other("display detached".into()));
        }
        assert_eq!(frame.data.len(), frame.stride * frame.height as usize);
        self.frames.lock().push(Rendered {
            start: frame.start_time,
            position,
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Wait for the next pipeline event, panicking after `timeout`.
pub fn next_event(
    events: &crossbeam_channel::Receiver<PipelineEvent>,
    timeout: Duration,
) -> PipelineEvent {
    events
        .recv_timeout(timeout)
        .unwrap_or_else(|_| panic!("no pipeline event within {timeout:?}"))
}
