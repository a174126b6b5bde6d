/*!
    The video consumer: holds each frame until the presentation clock
    reaches it, then renders it, or drops it if it is hopelessly off.
*/

use std::sync::Arc;
use std::time::Duration;

use media_types::{StreamKind, VideoFrame};
use parking_lot::Mutex;

use crate::config::PacingThresholds;
use crate::supervisor::{Counters, Supervisor};
use crate::{Epoch, FrameQueue, PipelineError, Popped, Renderer, Transport};

/**
    What to do with a frame, given how far it is from the clock.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacingDecision {
    /// Present now.
    Render,
    /// Sleep this long, then present.
    Wait(Duration),
    /// Discard: so far ahead that the clock is probably about to jump.
    Skip,
    /// Discard: too far behind to be worth showing.
    Drop,
}

/**
    Decide how to pace a frame starting at `frame_start` against the clock
    at `position`.

    With `drift = frame_start - position`:

    - `drift > interval`: wait for `drift`, unless it is more than
      `early_skip_factor` intervals, in which case skip the frame.
    - `drift < 0` and more than `late_drop_factor` intervals late: drop.
    - otherwise render immediately.
*/
pub fn decide(
    frame_start: Duration,
    position: Duration,
    interval: Duration,
    thresholds: PacingThresholds,
) -> PacingDecision {
    if frame_start > position {
        let drift = frame_start - position;
        if drift > interval {
            if drift > interval.mul_f64(thresholds.early_skip_factor) {
                return PacingDecision::Skip;
            }
            return PacingDecision::Wait(drift);
        }
        PacingDecision::Render
    } else {
        let lag = position - frame_start;
        if lag > interval.mul_f64(thresholds.late_drop_factor) {
            PacingDecision::Drop
        } else {
            PacingDecision::Render
        }
    }
}

pub(crate) struct VideoPacer {
    pub queue: Arc<FrameQueue<VideoFrame>>,
    pub transport: Transport,
    pub epoch: Epoch,
    pub supervisor: Arc<Supervisor>,
    pub renderer: Box<dyn Renderer>,
    /// Held from the final epoch check through the render; see `SeekCoordinator`.
    pub present: Arc<Mutex<()>>,
    pub frame_interval: Duration,
    pub thresholds: PacingThresholds,
    pub poll_interval: Duration,
}

impl VideoPacer {
    pub fn run(mut self) {
        tracing::debug!(interval = ?self.frame_interval, "video pacer started");
        while let Some(item) = self.queue.pop() {
            match item {
                Popped::Frame { epoch, frame } => {
                    if let Err(err) = self.present(epoch, frame) {
                        self.supervisor.fail(err);
                        break;
                    }
                }
                Popped::EndOfStream { epoch } => {
                    self.supervisor.report_drained(StreamKind::Video, epoch);
                }
            }
        }
        tracing::debug!("video pacer stopped");
    }

    fn present(&mut self, epoch: u64, frame: VideoFrame) -> Result<(), PipelineError> {
        let token = self.epoch.token();
        if token.generation() != epoch {
            return Ok(());
        }

        while !self.transport.is_running() {
            if !token.wait_timeout(self.poll_interval) {
                return Ok(());
            }
        }

        let counters = &self.supervisor.counters;
        let position = self.transport.position();
        match decide(frame.start_time, position, self.frame_interval, self.thresholds) {
            PacingDecision::Render => {}
            PacingDecision::Wait(delay) => {
                if !token.wait_timeout(delay) {
                    return Ok(());
                }
            }
            PacingDecision::Skip => {
                tracing::trace!(start = ?frame.start_time, ?position, "skipping early frame");
                Counters::bump(&counters.frames_skipped_early);
                return Ok(());
            }
            PacingDecision::Drop => {
                tracing::trace!(start = ?frame.start_time, ?position, "dropping late frame");
                Counters::bump(&counters.frames_dropped_late);
                return Ok(());
            }
        }

        let _present = self.present.lock();
        if !token.is_live() {
            return Ok(());
        }
        self.renderer.render(&frame, self.transport.position())?;
        Counters::bump(&counters.frames_rendered);
        Ok(())
    }
}
