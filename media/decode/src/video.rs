/*!
    Video stream decoding and RGBA conversion.
*/

use std::collections::VecDeque;
use std::time::Duration;

use ffmpeg_next::{
    codec::{self, decoder::Video as VideoDecoderFFmpeg},
    ffi,
    format::Pixel,
    software::scaling,
    util::frame::video::Video as VideoFrameFFmpeg,
};

use media_types::{BufferPool, Error, Frame, Pts, Rational, Result, VideoFrame};

/**
    Decoder for the selected video stream.

    Every decoded picture is converted to tightly packed RGBA at its native
    size. The scaler is rebuilt whenever the stream changes size or format.
*/
pub(crate) struct VideoDecoder {
    decoder: VideoDecoderFFmpeg,
    stream_index: usize,
    time_base: Rational,
    origin: Duration,
    pool: BufferPool,
    scaler: Option<scaling::Context>,
    decoded: VideoFrameFFmpeg,
    rgba: VideoFrameFFmpeg,
}

impl VideoDecoder {
    pub fn new(
        parameters: codec::Parameters,
        stream_index: usize,
        time_base: Rational,
        origin: Duration,
        pool: BufferPool,
    ) -> Result<Self> {
        let decoder = codec::context::Context::from_parameters(parameters)
            .map_err(|e| Error::codec(e.to_string()))?
            .decoder()
            .video()
            .map_err(|e| Error::codec(e.to_string()))?;

        Ok(Self {
            decoder,
            stream_index,
            time_base,
            origin,
            pool,
            scaler: None,
            decoded: VideoFrameFFmpeg::empty(),
            rgba: VideoFrameFFmpeg::empty(),
        })
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    pub fn send_packet(&mut self, packet: &ffmpeg_next::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg_next::Error::InvalidData) => {
                tracing::debug!("skipping undecodable video packet");
                Ok(())
            }
            Err(e) => Err(Error::codec(e.to_string())),
        }
    }

    pub fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => Ok(()),
            Err(e) => Err(Error::codec(e.to_string())),
        }
    }

    pub fn reset(&mut self) {
        self.decoder.flush();
    }

    /**
        Move every picture the decoder has ready into `out`.
    */
    pub fn receive_into(&mut self, out: &mut VecDeque<Frame>) -> Result<()> {
        loop {
            match self.decoder.receive_frame(&mut self.decoded) {
                Ok(()) => {
                    let frame = self.convert()?;
                    out.push_back(frame.into());
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::AVERROR(ffi::EAGAIN) => {
                    return Ok(());
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(()),
                Err(e) => return Err(Error::codec(e.to_string())),
            }
        }
    }

    fn convert(&mut self) -> Result<VideoFrame> {
        let width = self.decoded.width();
        let height = self.decoded.height();
        let format = self.decoded.format();
        if width == 0 || height == 0 || format == Pixel::None {
            return Err(Error::invalid_data("decoded picture has no size or format"));
        }

        let needs_scaler = self.scaler.as_ref().is_none_or(|s| {
            let input = s.input();
            input.format != format || input.width != width || input.height != height
        });
        if needs_scaler {
            tracing::debug!(width, height, ?format, "creating RGBA scaler");
            let scaler = scaling::Context::get(
                format,
                width,
                height,
                Pixel::RGBA,
                width,
                height,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| Error::unsupported_format(format!("pixel format {format:?}: {e}")))?;
            self.scaler = Some(scaler);
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(Error::codec("scaler unavailable"));
        };
        scaler
            .run(&self.decoded, &mut self.rgba)
            .map_err(|e| Error::codec(e.to_string()))?;

        let start_time = self
            .decoded
            .timestamp()
            .or_else(|| self.decoded.pts())
            .map(|ts| Pts(ts).to_duration(self.time_base).saturating_sub(self.origin))
            .unwrap_or_default();

        let row_bytes = width as usize * 4;
        let mut data = self.pool.acquire(row_bytes * height as usize);
        copy_rows(
            self.rgba.data(0),
            self.rgba.stride(0),
            row_bytes,
            height as usize,
            &mut data,
        )?;

        Ok(VideoFrame::new(data, start_time, width, height, row_bytes))
    }
}

/**
    Copy `height` rows of `row_bytes` each from a strided source into a
    tightly packed destination.
*/
pub(crate) fn copy_rows(
    src: &[u8],
    src_stride: usize,
    row_bytes: usize,
    height: usize,
    dst: &mut [u8],
) -> Result<()> {
    if src_stride < row_bytes || dst.len() < row_bytes * height {
        return Err(Error::invalid_data("picture rows do not fit"));
    }
    if height > 0 && src.len() < src_stride * (height - 1) + row_bytes {
        return Err(Error::invalid_data("picture shorter than its height"));
    }
    for (y, out) in dst.chunks_exact_mut(row_bytes).take(height).enumerate() {
        let start = y * src_stride;
        out.copy_from_slice(&src[start..start + row_bytes]);
    }
    Ok(())
}

impl std::fmt::Debug for VideoDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoDecoder")
            .field("stream_index", &self.stream_index)
            .field("time_base", &self.time_base)
            .field("width", &self.decoder.width())
            .field("height", &self.decoder.height())
            .finish_non_exhaustive()
    }
}
