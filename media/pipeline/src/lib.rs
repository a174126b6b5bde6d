/*!
    Audio-clocked playback pipeline.

    A single dispatcher thread pulls decoded frames from a [`FrameSource`]
    and routes them into two queues. The audio sink drains its queue into an
    [`AudioOutput`] and advances the playback clock by exactly what the
    device accepted; the video pacer drains the other queue and presents each
    frame to a [`Renderer`] when the clock reaches it.

    The video queue is small and bounded, so decoding never runs more than a
    few frames ahead of presentation. Seeks advance a shared [`Epoch`],
    which flushes both queues and cancels every in-flight wait, write, and
    stale push.
*/

mod audio_sink;
mod config;
mod dispatcher;
mod epoch;
mod error;
mod output;
mod pacer;
mod pipeline;
mod queue;
mod seek;
mod source;
mod supervisor;
mod transport;

pub use self::config::{
    DEFAULT_AUDIO_QUEUE_CAPACITY, DEFAULT_VIDEO_QUEUE_CAPACITY, PacingThresholds, PipelineConfig,
    RetryPolicy,
};
pub use self::epoch::{Epoch, EpochToken};
pub use self::error::{AudioWriteError, PipelineError, RenderError, SourceError};
pub use self::output::{AudioOutput, Renderer, WriteStatus};
pub use self::pacer::{PacingDecision, decide as decide_pacing};
pub use self::pipeline::Pipeline;
pub use self::queue::{FrameQueue, Popped, PushError};
pub use self::seek::{SEEK_END_MARGIN, clamp_seek_target};
pub use self::source::{FrameSource, Session, SessionGuard, is_before_floor};
pub use self::supervisor::{PipelineEvent, PipelineStats};
pub use self::transport::Transport;
