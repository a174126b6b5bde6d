/*!
    Raw stream timestamps.
*/

use std::time::Duration;

use crate::Rational;

/**
    A timestamp in stream time base units, as carried by decoded frames.

    The pipeline itself works in [`Duration`]s; decoders convert once
    with [`Pts::to_duration`].
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pts(pub i64);

impl Pts {
    /**
        Time since stream start. Timestamps before the start (negative
        values, as some containers use for pre-roll) map to zero.
    */
    #[inline]
    pub fn to_duration(self, time_base: Rational) -> Duration {
        time_base.scale_to_duration(self.0)
    }
}
