/*!
    Audio stream decoding.
*/

use std::collections::VecDeque;
use std::time::Duration;

use ffmpeg_next::{
    codec::{self, decoder::Audio as AudioDecoderFFmpeg},
    ffi,
    util::frame::audio::Audio as AudioFrameFFmpeg,
};

use media_types::{
    AudioFormat, AudioFrame, BufferPool, Error, Frame, PooledBuffer, Pts, Rational, Result,
    SampleFormat,
};

/**
    Decoder for the selected audio stream.

    Decoded frames are converted to interleaved samples in one of the
    supported formats and queued until the source hands them out.
*/
pub(crate) struct AudioDecoder {
    decoder: AudioDecoderFFmpeg,
    stream_index: usize,
    time_base: Rational,
    origin: Duration,
    pool: BufferPool,
    scratch: AudioFrameFFmpeg,
}

impl AudioDecoder {
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
            .audio()
            .map_err(|e| Error::codec(e.to_string()))?;

        Ok(Self {
            decoder,
            stream_index,
            time_base,
            origin,
            pool,
            scratch: AudioFrameFFmpeg::empty(),
        })
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /**
        Output format, as far as the decoder knows it before the first frame.
    */
    pub fn format(&self) -> Result<AudioFormat> {
        let sample_format = sample_format_from_ffmpeg(self.decoder.format()).ok_or_else(|| {
            Error::unsupported_format(format!(
                "audio sample format {:?}",
                self.decoder.format()
            ))
        })?;
        Ok(AudioFormat {
            sample_rate: self.decoder.rate(),
            channels: self.decoder.channels() as u16,
            sample_format,
        })
    }

    pub fn send_packet(&mut self, packet: &ffmpeg_next::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            // Corrupt packets are common in the wild; the decoder recovers on the next one
            Err(ffmpeg_next::Error::InvalidData) => {
                tracing::debug!("skipping undecodable audio packet");
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

    /**
        Discard decoder state after a seek.
    */
    pub fn reset(&mut self) {
        self.decoder.flush();
    }

    /**
        Move every frame the decoder has ready into `out`.
    */
    pub fn receive_into(&mut self, out: &mut VecDeque<Frame>) -> Result<()> {
        loop {
            match self.decoder.receive_frame(&mut self.scratch) {
                Ok(()) => {
                    if let Some(frame) = self.convert()? {
                        out.push_back(frame.into());
                    }
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::AVERROR(ffi::EAGAIN) => {
                    return Ok(());
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(()),
                Err(e) => return Err(Error::codec(e.to_string())),
            }
        }
    }

    fn convert(&self) -> Result<Option<AudioFrame>> {
        let frame = &self.scratch;
        let samples = frame.samples();
        if samples == 0 {
            return Ok(None);
        }

        let ffmpeg_format = frame.format();
        let format = sample_format_from_ffmpeg(ffmpeg_format).ok_or_else(|| {
            Error::unsupported_format(format!("audio sample format {ffmpeg_format:?}"))
        })?;
        let channels = frame.channels() as u16;

        let start_time = frame
            .timestamp()
            .or_else(|| frame.pts())
            .map(|ts| Pts(ts).to_duration(self.time_base).saturating_sub(self.origin))
            .unwrap_or_default();

        let data = self.copy_samples(frame, format, samples, channels)?;
        Ok(Some(AudioFrame::new(
            data,
            start_time,
            channels,
            frame.rate(),
            samples,
            format,
        )))
    }

    fn copy_samples(
        &self,
        frame: &AudioFrameFFmpeg,
        format: SampleFormat,
        samples: usize,
        channels: u16,
    ) -> Result<PooledBuffer> {
        let bytes_per_sample = format.bytes_per_sample();
        let total = samples * channels as usize * bytes_per_sample;
        let mut output = self.pool.acquire(total);

        if frame.is_planar() {
            let planes: Vec<&[u8]> = (0..channels as usize).map(|ch| frame.data(ch)).collect();
            interleave_planes(&planes, bytes_per_sample, samples, &mut output)?;
        } else {
            let packed = frame.data(0);
            if packed.len() < total {
                return Err(Error::invalid_data("audio frame shorter than its sample count"));
            }
            output.copy_from_slice(&packed[..total]);
        }
        Ok(output)
    }
}

/**
    Interleave one plane per channel into `output`: `[L0, R0, L1, R1, ...]`.
*/
pub(crate) fn interleave_planes(
    planes: &[&[u8]],
    bytes_per_sample: usize,
    samples: usize,
    output: &mut [u8],
) -> Result<()> {
    let channels = planes.len();
    if output.len() < samples * channels * bytes_per_sample {
        return Err(Error::invalid_data("interleave output too small"));
    }
    for (ch, plane) in planes.iter().enumerate() {
        if plane.len() < samples * bytes_per_sample {
            return Err(Error::invalid_data("audio plane shorter than its sample count"));
        }
        for s in 0..samples {
            let src = s * bytes_per_sample;
            let dst = (s * channels + ch) * bytes_per_sample;
            output[dst..dst + bytes_per_sample].copy_from_slice(&plane[src..src + bytes_per_sample]);
        }
    }
    Ok(())
}

/**
    Map an FFmpeg sample format onto the supported set.

    Packed and planar layouts both map; planar data is interleaved on copy.
*/
pub(crate) fn sample_format_from_ffmpeg(format: ffmpeg_next::format::Sample) -> Option<SampleFormat> {
    use ffmpeg_next::format::Sample;

    match format {
        Sample::F32(_) => Some(SampleFormat::F32),
        Sample::I16(_) => Some(SampleFormat::S16),
        Sample::I32(_) => Some(SampleFormat::S32),
        _ => None,
    }
}

impl std::fmt::Debug for AudioDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDecoder")
            .field("stream_index", &self.stream_index)
            .field("time_base", &self.time_base)
            .field("sample_rate", &self.decoder.rate())
            .field("channels", &self.decoder.channels())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_next::format::{Sample, sample::Type};

    #[test]
    fn supported_sample_formats() {
        assert_eq!(sample_format_from_ffmpeg(Sample::F32(Type::Planar)), Some(SampleFormat::F32));
        assert_eq!(sample_format_from_ffmpeg(Sample::F32(Type::Packed)), Some(SampleFormat::F32));
        assert_eq!(sample_format_from_ffmpeg(Sample::I16(Type::Packed)), Some(SampleFormat::S16));
        assert_eq!(sample_format_from_ffmpeg(Sample::I32(Type::Planar)), Some(SampleFormat::S32));
    }

    #[test]
    fn unsupported_sample_formats() {
        assert_eq!(sample_format_from_ffmpeg(Sample::F64(Type::Packed)), None);
        assert_eq!(sample_format_from_ffmpeg(Sample::U8(Type::Packed)), None);
        assert_eq!(sample_format_from_ffmpeg(Sample::None), None);
    }

    #[test]
    fn interleaves_stereo_s16() {
        let left = [1u8, 0, 2, 0, 3, 0];
        let right = [10u8, 0, 20, 0, 30, 0];
        let mut out = [0u8; 12];
        interleave_planes(&[&left, &right], 2, 3, &mut out).unwrap();
        assert_eq!(out, [1, 0, 10, 0, 2, 0, 20, 0, 3, 0, 30, 0]);
    }

    #[test]
    fn short_plane_is_rejected() {
        let left = [0u8; 4];
        let right = [0u8; 2];
        let mut out = [0u8; 8];
        assert!(interleave_planes(&[&left, &right], 2, 2, &mut out).is_err());
    }
}
