/*!
    Seek and pause coordination.
*/

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use media_types::{AudioFrame, VideoFrame};

use crate::supervisor::{Counters, Supervisor};
use crate::{Epoch, FrameQueue, PipelineError, Session, Transport};

/// Distance kept from the end of media when clamping a seek target.
pub const SEEK_END_MARGIN: Duration = Duration::from_millis(1);

/**
    Clamp a requested position (seconds, possibly negative) into the media.

    Targets before the start land on zero. With a known duration, targets at
    or past the end land just before it.
*/
pub fn clamp_seek_target(target_secs: f64, duration: Option<Duration>) -> Duration {
    if !(target_secs > 0.0) {
        return Duration::ZERO;
    }
    let target = Duration::try_from_secs_f64(target_secs).unwrap_or(Duration::MAX);
    match duration {
        Some(duration) if !duration.is_zero() => {
            target.min(duration.saturating_sub(SEEK_END_MARGIN))
        }
        _ => target,
    }
}

struct Control {
    paused: bool,
}

/**
    Repositions the whole pipeline.

    A seek runs entirely under the session lock: the output is paused, the
    epoch advanced, both queues flushed, the source repositioned and the
    clock reset, in that order. The dispatcher therefore never sees a
    half-seeked source, and anything it pulled before the seek is refused by
    the flushed queues.

    Pause state lives here too, so a seek never resumes playback the user
    paused.

    The presentation gate is shared with the video pacer, which holds it
    from its last epoch check through the render. Taking it once after the
    epoch advances means no frame from before the seek is drawn once the
    seek has returned.
*/
pub(crate) struct SeekCoordinator {
    pub session: Arc<Session>,
    pub epoch: Epoch,
    pub audio: Option<Arc<FrameQueue<AudioFrame>>>,
    pub video: Option<Arc<FrameQueue<VideoFrame>>>,
    pub transport: Transport,
    pub supervisor: Arc<Supervisor>,
    present: Arc<Mutex<()>>,
    control: Mutex<Control>,
}

impl SeekCoordinator {
    /**
        Create a coordinator. Playback starts out paused.
    */
    pub fn new(
        session: Arc<Session>,
        epoch: Epoch,
        audio: Option<Arc<FrameQueue<AudioFrame>>>,
        video: Option<Arc<FrameQueue<VideoFrame>>>,
        transport: Transport,
        supervisor: Arc<Supervisor>,
        present: Arc<Mutex<()>>,
    ) -> Self {
        transport.pause();
        Self {
            session,
            epoch,
            audio,
            video,
            transport,
            supervisor,
            present,
            control: Mutex::new(Control { paused: true }),
        }
    }

    /**
        Seek by `offset_secs` relative to the current clock position.
    */
    pub fn seek_relative(&self, offset_secs: f64) -> Result<Duration, PipelineError> {
        self.seek_with(|position| position.as_secs_f64() + offset_secs)
    }

    /**
        Seek to an absolute position in seconds.
    */
    pub fn seek_to(&self, target_secs: f64) -> Result<Duration, PipelineError> {
        self.seek_with(|_| target_secs)
    }

    fn seek_with(&self, target: impl FnOnce(Duration) -> f64) -> Result<Duration, PipelineError> {
        if self.supervisor.is_stopping() {
            return Err(PipelineError::Stopped);
        }
        let control = self.control.lock();
        let mut session = self.session.lock();

        self.transport.pause();
        let epoch = self.epoch.advance();
        // Wait out a render that passed its epoch check before the advance
        drop(self.present.lock());
        let flushed_audio = self.audio.as_ref().map_or(0, |q| q.flush(epoch));
        let flushed_video = self.video.as_ref().map_or(0, |q| q.flush(epoch));

        let from = self.transport.position();
        let target = clamp_seek_target(target(from), self.session.info().duration);
        tracing::info!(?from, ?target, epoch, flushed_audio, flushed_video, "seeking");

        if let Err(err) = session.seek(target) {
            drop(session);
            self.supervisor.fail(err.into());
            return Err(PipelineError::Stopped);
        }
        session.set_resume_floor(Some(target));
        self.transport.reset_to(target, epoch);
        Counters::bump(&self.supervisor.counters.seeks);
        drop(session);

        if !control.paused {
            self.transport.resume();
        }
        Ok(target)
    }

    /**
        Flip between playing and paused. Returns true if now paused.
    */
    pub fn toggle_pause(&self) -> bool {
        let mut control = self.control.lock();
        let paused = !control.paused;
        self.apply_paused(&mut control, paused);
        paused
    }

    pub fn set_paused(&self, paused: bool) {
        let mut control = self.control.lock();
        self.apply_paused(&mut control, paused);
    }

    fn apply_paused(&self, control: &mut Control, paused: bool) {
        if control.paused == paused {
            return;
        }
        control.paused = paused;
        if paused {
            self.transport.pause();
        } else {
            self.transport.resume();
        }
        tracing::info!(paused, position = ?self.transport.position(), "playback state changed");
    }

    pub fn is_paused(&self) -> bool {
        self.control.lock().paused
    }
}
