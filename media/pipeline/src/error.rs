/*!
    Error types for the playback pipeline.
*/

use thiserror::Error;

/**
    Errors raised by a [`FrameSource`](crate::FrameSource).

    Sources report failures with the shared media error type; the pipeline
    treats every one of them as fatal for the session.
*/
pub type SourceError = media_types::Error;

/**
    Failure writing to the audio output device.
*/
#[derive(Debug, Error)]
pub enum AudioWriteError {
    /// The device reported a (possibly transient) failure.
    #[error("audio device error: {0}")]
    Device(String),
    /// The output was shut down and will never accept data again.
    #[error("audio output closed")]
    Closed,
}

impl AudioWriteError {
    /**
        Returns true if retrying the write may succeed.
    */
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

/**
    Failure drawing a frame on the display sink.
*/
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("display I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/**
    Terminal failures of a playback session.

    Any of these stops all pipeline threads and is reported exactly once
    through [`PipelineEvent::Failed`](crate::PipelineEvent::Failed).
*/
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The decoding engine failed to open, decode, or reposition.
    #[error("source error: {0}")]
    Source(#[source] SourceError),
    /// A stream uses a sample or pixel format outside the supported set.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// The audio device kept failing after all retries.
    #[error("audio write failed after {attempts} attempt(s): {source}")]
    AudioWrite {
        attempts: u32,
        #[source]
        source: AudioWriteError,
    },
    /// The display sink failed.
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    /// Nothing to play: no audio stream and no video stream.
    #[error("source has no playable audio or video stream")]
    NoStreams,
    /// Rejected configuration value.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
    /// A pipeline thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    /// A pipeline thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
    /// The pipeline was shut down or has already failed.
    #[error("pipeline is stopped")]
    Stopped,
}

impl From<SourceError> for PipelineError {
    fn from(err: SourceError) -> Self {
        match err {
            media_types::Error::UnsupportedFormat { message } => Self::UnsupportedFormat(message),
            other => Self::Source(other),
        }
    }
}
