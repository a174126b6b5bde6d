/*!
    Audio sample format types.
*/

/**
    Interleaved audio sample formats accepted by the pipeline.

    Decoders deliver planar audio interleaved, so a single variant covers
    both the packed and planar layouts of the same sample type. Anything
    outside this set is rejected when the source is opened.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// 32-bit floating point, range [-1.0, 1.0]
    F32,
    /// Signed 16-bit integer
    S16,
    /// Signed 32-bit integer
    S32,
}

impl SampleFormat {
    /**
        Returns the number of bytes per sample.
    */
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
        }
    }

    /**
        Decode one sample from its native-endian bytes into an f32 in
        the range [-1.0, 1.0].

        `bytes` must be exactly [`bytes_per_sample`](Self::bytes_per_sample) long.
    */
    pub fn sample_to_f32(self, bytes: &[u8]) -> f32 {
        match self {
            Self::F32 => f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::S16 => i16::from_ne_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
            Self::S32 => {
                i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0
            }
        }
    }
}
