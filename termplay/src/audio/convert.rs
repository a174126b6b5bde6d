use media_types::{AudioFormat, SampleFormat};

/**
    Adapts interleaved PCM from the decoder's format to the device's.

    Samples are decoded to `f32`, remapped to the device channel count,
    and linearly resampled when the rates differ. The resampler carries
    its phase and the previous input frame across calls, so a stream fed
    in arbitrary chunks comes out the same as if fed all at once.
*/
#[derive(Debug)]
pub struct Converter {
    input: AudioFormat,
    out_rate: u32,
    out_channels: usize,
    /// Input frames advanced per output frame.
    step: f64,
    /// Position of the next output frame, in input frames relative to the next chunk.
    phase: f64,
    /// Last input frame of the previous chunk, already channel mapped.
    prev: Vec<f32>,
    /// Decoded and channel mapped input frames.
    mapped: Vec<f32>,
    frame: Vec<f32>,
}

impl Converter {
    pub fn new(input: AudioFormat, out_rate: u32, out_channels: u16) -> Self {
        let out_channels = usize::from(out_channels.max(1));
        let step = if out_rate == 0 {
            1.0
        } else {
            f64::from(input.sample_rate) / f64::from(out_rate)
        };
        Self {
            input,
            out_rate,
            out_channels,
            step,
            phase: 0.0,
            prev: vec![0.0; out_channels],
            mapped: Vec::new(),
            frame: Vec::new(),
        }
    }

    pub fn input(&self) -> AudioFormat {
        self.input
    }

    fn passthrough_rate(&self) -> bool {
        self.input.sample_rate == self.out_rate
    }

    /**
        Largest number of whole input frames whose output is guaranteed to
        fit in `vacant` output samples.
    */
    pub fn max_input_frames(&self, vacant: usize) -> usize {
        let out_frames = vacant / self.out_channels;
        if self.passthrough_rate() {
            return out_frames;
        }
        // A chunk of k frames yields at most floor(k / step) + 1 output frames
        let Some(budget) = out_frames.checked_sub(1) else {
            return 0;
        };
        (budget as f64 * self.step).floor() as usize
    }

    /**
        Convert every whole frame in `data`, appending device samples to
        `out`. Returns the number of input bytes consumed; a trailing
        partial frame is left for the caller.
    */
    pub fn process(&mut self, data: &[u8], out: &mut Vec<f32>) -> usize {
        let bytes_per_frame = self.input.bytes_per_frame();
        if bytes_per_frame == 0 {
            return 0;
        }
        let frames = data.len() / bytes_per_frame;
        if frames == 0 {
            return 0;
        }
        let consumed = frames * bytes_per_frame;
        self.map(&data[..consumed], frames);

        if self.passthrough_rate() {
            out.extend_from_slice(&self.mapped);
            return consumed;
        }

        let channels = self.out_channels;
        let limit = frames as f64 - 1.0;
        while self.phase < limit {
            let base = self.phase.floor();
            let frac = (self.phase - base) as f32;
            let index = base as isize;
            for ch in 0..channels {
                let a = self.sample_at(index, ch);
                let b = self.sample_at(index + 1, ch);
                out.push(a + (b - a) * frac);
            }
            self.phase += self.step;
        }
        self.phase -= frames as f64;

        let last = (frames - 1) * channels;
        self.prev.copy_from_slice(&self.mapped[last..last + channels]);
        consumed
    }

    fn sample_at(&self, index: isize, ch: usize) -> f32 {
        if index < 0 {
            self.prev[ch]
        } else {
            self.mapped[index as usize * self.out_channels + ch]
        }
    }

    fn map(&mut self, data: &[u8], frames: usize) {
        let in_channels = usize::from(self.input.channels);
        let format = self.input.sample_format;

        self.mapped.clear();
        self.mapped.reserve(frames * self.out_channels);
        self.frame.resize(in_channels, 0.0);

        let floats = match format {
            SampleFormat::F32 => bytemuck::try_cast_slice::<u8, f32>(data).ok(),
            _ => None,
        };

        for i in 0..frames {
            match floats {
                Some(floats) => {
                    self.frame
                        .copy_from_slice(&floats[i * in_channels..(i + 1) * in_channels]);
                }
                None => {
                    let size = format.bytes_per_sample();
                    let start = i * in_channels * size;
                    for (ch, sample) in self.frame.iter_mut().enumerate() {
                        let at = start + ch * size;
                        *sample = format.sample_to_f32(&data[at..at + size]);
                    }
                }
            }
            remix(&self.frame, self.out_channels, &mut self.mapped);
        }
    }
}

/**
    Append one frame remixed to `out_channels`.

    Mono is spread to every output channel, anything is averaged down to
    mono, and other mismatches keep the leading channels and pad with
    silence.
*/
fn remix(frame: &[f32], out_channels: usize, out: &mut Vec<f32>) {
    let in_channels = frame.len();
    if in_channels == out_channels {
        out.extend_from_slice(frame);
    } else if in_channels == 1 {
        out.extend(std::iter::repeat_n(frame[0], out_channels));
    } else if out_channels == 1 {
        out.push(frame.iter().sum::<f32>() / in_channels as f32);
    } else {
        out.extend((0..out_channels).map(|ch| frame.get(ch).copied().unwrap_or(0.0)));
    }
}
