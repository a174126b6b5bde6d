/*!
    Shared types for the termplay media pipeline.

    This crate is the vocabulary that crosses crate boundaries: the decoder
    produces these types, the pipeline moves them between threads, and the
    player front end consumes them. It has no dependency on FFmpeg.

    # Frames and Buffers

    - [`Frame`], [`AudioFrame`] and [`VideoFrame`] - Decoded, presentable units
    - [`BufferPool`] and [`PooledBuffer`] - Recycled byte storage owned by frames

    # Formats and Timing

    - [`SampleFormat`] - Supported interleaved audio sample formats
    - [`AudioFormat`], [`VideoFormat`] and [`MediaInfo`] - Stream descriptors
    - [`Rational`] and [`Pts`] - Time bases, frame rates and raw timestamps

    # Clocks

    - [`Clock`] - Trait for playback clocks
    - [`PlaybackClock`] - Audio-driven clock, advanced by bytes sent to the device
    - [`WallClock`] - Pausable wall-time clock for media without audio

    # Error Handling

    - [`Error`] and [`Result`] - Common error types
*/

mod clock;
mod error;
mod format;
mod frame;
mod pool;
mod rational;
mod stream;
mod timestamp;

pub use clock::{Clock, PlaybackClock, WallClock};
pub use error::{Error, Result};
pub use format::SampleFormat;
pub use frame::{AudioFrame, Frame, StreamKind, VideoFrame};
pub use pool::{BufferPool, PooledBuffer};
pub use rational::Rational;
pub use stream::{AudioFormat, MediaInfo, VideoFormat};
pub use timestamp::Pts;
