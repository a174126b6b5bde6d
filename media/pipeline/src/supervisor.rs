/*!
    Shared run state: stop signal, failure reporting, end-of-playback
    tracking, and counters.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use media_types::{AudioFrame, StreamKind, VideoFrame};

use crate::{Epoch, FrameQueue, PipelineError};

/**
    Notifications from a running pipeline.
*/
#[derive(Debug)]
pub enum PipelineEvent {
    /// Every stream reached end of media and was fully presented.
    Finished,
    /// Playback stopped on an unrecoverable error. Sent at most once.
    Failed(PipelineError),
}

/**
    Snapshot of pipeline counters.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub audio_frames_routed: u64,
    pub video_frames_routed: u64,
    /// Frames decoded before the resume floor of the last seek.
    pub frames_below_floor: u64,
    /// Frames refused because a seek happened between pull and push.
    pub frames_stale: u64,
    pub frames_rendered: u64,
    pub frames_dropped_late: u64,
    pub frames_skipped_early: u64,
    pub seeks: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub audio_frames_routed: AtomicU64,
    pub video_frames_routed: AtomicU64,
    pub frames_below_floor: AtomicU64,
    pub frames_stale: AtomicU64,
    pub frames_rendered: AtomicU64,
    pub frames_dropped_late: AtomicU64,
    pub frames_skipped_early: AtomicU64,
    pub seeks: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            audio_frames_routed: get(&self.audio_frames_routed),
            video_frames_routed: get(&self.video_frames_routed),
            frames_below_floor: get(&self.frames_below_floor),
            frames_stale: get(&self.frames_stale),
            frames_rendered: get(&self.frames_rendered),
            frames_dropped_late: get(&self.frames_dropped_late),
            frames_skipped_early: get(&self.frames_skipped_early),
            seeks: get(&self.seeks),
        }
    }
}

struct Drained {
    epoch: u64,
    audio: bool,
    video: bool,
    announced: bool,
}

/**
    Coordinates how the pipeline threads stop.

    The first failure wins: it is reported, and everything is halted. Later
    failures (usually fallout of the halt itself) are only logged.
*/
pub(crate) struct Supervisor {
    epoch: Epoch,
    audio: Option<Arc<FrameQueue<AudioFrame>>>,
    video: Option<Arc<FrameQueue<VideoFrame>>>,
    stopping: AtomicBool,
    failed: AtomicBool,
    events: Sender<PipelineEvent>,
    drained: Mutex<Drained>,
    pub counters: Counters,
}

impl Supervisor {
    pub fn new(
        epoch: Epoch,
        audio: Option<Arc<FrameQueue<AudioFrame>>>,
        video: Option<Arc<FrameQueue<VideoFrame>>>,
        events: Sender<PipelineEvent>,
    ) -> Self {
        Self {
            epoch,
            audio,
            video,
            stopping: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            events,
            drained: Mutex::new(Drained {
                epoch: 0,
                audio: false,
                video: false,
                announced: false,
            }),
            counters: Counters::default(),
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /**
        Stop every pipeline thread: set the stop flag, cancel outstanding
        waits, and close the queues.
    */
    pub fn halt(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        self.epoch.advance();
        if let Some(queue) = &self.audio {
            queue.close();
        }
        if let Some(queue) = &self.video {
            queue.close();
        }
    }

    /**
        Report a terminal error and halt the pipeline.
    */
    pub fn fail(&self, err: PipelineError) {
        if self.failed.swap(true, Ordering::AcqRel) || self.is_stopping() {
            tracing::debug!(error = %err, "ignoring error after pipeline stop");
            return;
        }
        tracing::error!(error = %err, "playback failed");
        let _ = self.events.send(PipelineEvent::Failed(err));
        self.halt();
    }

    /**
        Record that the consumer for `kind` presented everything up to end
        of stream in `epoch`. Emits [`PipelineEvent::Finished`] once every
        active consumer has done so in the current epoch.
    */
    pub fn report_drained(&self, kind: StreamKind, epoch: u64) {
        if self.is_stopping() || epoch != self.epoch.current() {
            return;
        }
        let mut drained = self.drained.lock();
        if drained.epoch != epoch {
            *drained = Drained {
                epoch,
                audio: false,
                video: false,
                announced: false,
            };
        }
        match kind {
            StreamKind::Audio => drained.audio = true,
            StreamKind::Video => drained.video = true,
        }
        tracing::debug!(?kind, epoch, "stream drained");

        let audio_done = self.audio.is_none() || drained.audio;
        let video_done = self.video.is_none() || drained.video;
        if audio_done && video_done && !drained.announced {
            drained.announced = true;
            tracing::info!("playback reached end of media");
            let _ = self.events.send(PipelineEvent::Finished);
        }
    }
}
