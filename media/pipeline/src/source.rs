/*!
    The decoding engine seam and the session lock around it.
*/

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use media_types::{Frame, MediaInfo};

use crate::SourceError;

/**
    A demuxer/decoder that yields decoded frames in decode order.

    Implementations are opened by their own constructor and then handed to
    the pipeline, which serializes every call through a [`Session`]. They do
    not need to be `Sync`.
*/
pub trait FrameSource: Send {
    /**
        Stream layout and duration discovered when the source was opened.
    */
    fn info(&self) -> &MediaInfo;

    /**
        Decode the next frame of either kind.

        Returns `Ok(None)` at end of stream. Calling again after a seek
        resumes decoding from the new position.
    */
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /**
        Reposition both streams to the nearest keyframe at or before `target`
        and discard decoder state.
    */
    fn seek(&mut self, target: Duration) -> Result<(), SourceError>;

    /**
        Release the underlying resources. Calling it more than once is a no-op.
    */
    fn close(&mut self);
}

struct SessionState {
    source: Box<dyn FrameSource>,
    resume_floor: Option<Duration>,
    closed: bool,
}

/**
    Exclusive owner of the [`FrameSource`].

    Pulling a frame and repositioning the source both happen while holding
    the session lock, so a seek can never interleave with a half-finished
    decode step.
*/
pub struct Session {
    state: Mutex<SessionState>,
    info: MediaInfo,
}

impl Session {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        let info = source.info().clone();
        Self {
            state: Mutex::new(SessionState {
                source,
                resume_floor: None,
                closed: false,
            }),
            info,
        }
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    /**
        Acquire the session lock.
    */
    pub fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            state: self.state.lock(),
        }
    }

    /**
        Close the source. Later pulls report end of stream.
    */
    pub fn close(&self) {
        self.lock().close();
    }
}

/**
    Proof of holding the session lock.
*/
pub struct SessionGuard<'a> {
    state: MutexGuard<'a, SessionState>,
}

impl SessionGuard<'_> {
    pub fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.state.closed {
            return Ok(None);
        }
        self.state.source.next_frame()
    }

    pub fn seek(&mut self, target: Duration) -> Result<(), SourceError> {
        if self.state.closed {
            return Ok(());
        }
        self.state.source.seek(target)
    }

    /**
        Position before which decoded frames are discarded, set by the last seek.

        Seeking lands on a keyframe at or before the target; frames between
        that keyframe and the target must not be presented.
    */
    pub fn resume_floor(&self) -> Option<Duration> {
        self.state.resume_floor
    }

    pub fn set_resume_floor(&mut self, floor: Option<Duration>) {
        self.state.resume_floor = floor;
    }

    pub fn close(&mut self) {
        if !self.state.closed {
            self.state.closed = true;
            self.state.source.close();
        }
    }
}

/**
    Returns true if `frame` ends before `floor` and must not be presented.

    Audio is kept while any of its samples lie at or after the floor; video
    is kept only if it starts at or after the floor.
*/
pub fn is_before_floor(frame: &Frame, floor: Duration) -> bool {
    match frame {
        Frame::Audio(audio) => audio.end_time() <= floor,
        Frame::Video(video) => video.start_time < floor,
    }
}

static_assertions::assert_impl_all!(Session: Send, Sync);
static_assertions::assert_obj_safe!(FrameSource);

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::{AudioFrame, BufferPool, SampleFormat, VideoFrame};

    struct Counting {
        info: MediaInfo,
        closes: usize,
    }

    impl FrameSource for Counting {
        fn info(&self) -> &MediaInfo {
            &self.info
        }
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            Ok(None)
        }
        fn seek(&mut self, _target: Duration) -> Result<(), SourceError> {
            Ok(())
        }
        fn close(&mut self) {
            self.closes += 1;
            assert_eq!(self.closes, 1, "source closed twice");
        }
    }

    #[test]
    fn close_is_idempotent() {
        let session = Session::new(Box::new(Counting {
            info: MediaInfo::default(),
            closes: 0,
        }));
        session.close();
        session.close();
        assert!(session.lock().next_frame().unwrap().is_none());
    }

    #[test]
    fn floor_keeps_audio_that_straddles_it() {
        let pool = BufferPool::new();
        // 480 stereo f32 samples at 48 kHz = 10ms
        let audio = |start_ms: u64| {
            Frame::Audio(AudioFrame::new(
                pool.acquire(480 * 2 * 4),
                Duration::from_millis(start_ms),
                2,
                48_000,
                480,
                SampleFormat::F32,
            ))
        };
        let floor = Duration::from_millis(100);
        assert!(is_before_floor(&audio(80), floor));
        assert!(is_before_floor(&audio(90), floor));
        assert!(!is_before_floor(&audio(95), floor));
        assert!(!is_before_floor(&audio(100), floor));

        let video = |start_ms: u64| {
            Frame::Video(VideoFrame::new(
                pool.acquire(4),
                Duration::from_millis(start_ms),
                1,
                1,
                4,
            ))
        };
        assert!(is_before_floor(&video(99), floor));
        assert!(!is_before_floor(&video(100), floor));
    }
}
