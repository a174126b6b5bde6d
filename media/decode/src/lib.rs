/*!
    FFmpeg-backed media source for the termplay pipeline.

    [`FfmpegSource`] opens a file, picks the best audio and video streams,
    and implements [`media_pipeline::FrameSource`]:

    - Audio comes out interleaved as `f32`, `i16`, or `i32`; any other
      sample format is rejected as unsupported.
    - Video comes out as tightly packed RGBA at the stream's native size.
    - Seeking lands on the keyframe at or before the target and flushes
      both decoders.

    Decoding is software only.
*/

mod audio;
mod source;
mod video;

pub use source::{FfmpegSource, SourceOptions};
