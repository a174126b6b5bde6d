/*!
    Output device seams: the audio device and the display sink.
*/

use std::time::Duration;

use media_types::{AudioFormat, VideoFrame};

use crate::{AudioWriteError, EpochToken, RenderError};

/**
    Outcome of a single [`AudioOutput::write`] call.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    /// This many bytes from the front of the slice were accepted.
    Written(usize),
    /// The token was invalidated before anything (more) could be accepted.
    Cancelled,
}

/**
    An audio device that accepts interleaved PCM.

    `write` may block while the device buffer is full (including while the
    device is paused) but must return [`WriteStatus::Cancelled`] promptly once
    `token` is invalidated. The same handle is shared between the audio sink
    thread and the control side, hence `Sync`.
*/
pub trait AudioOutput: Send + Sync {
    /**
        Write some prefix of `data`, which is laid out as described by `format`.
    */
    fn write(
        &self,
        data: &[u8],
        format: AudioFormat,
        token: &EpochToken,
    ) -> Result<WriteStatus, AudioWriteError>;

    /// Stop consuming audio. Idempotent.
    fn pause(&self);

    /// Start or continue consuming audio. Idempotent.
    fn resume(&self);

    /// Returns true while the device is consuming audio.
    fn is_playing(&self) -> bool;
}

/**
    Something that can show a decoded RGBA picture.
*/
pub trait Renderer: Send {
    /**
        Draw `frame`. `position` is the presentation clock at the time of the
        call, for status display.
    */
    fn render(&mut self, frame: &VideoFrame, position: Duration) -> Result<(), RenderError>;
}

static_assertions::assert_obj_safe!(AudioOutput, Renderer);
