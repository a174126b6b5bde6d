/*!
    Exact fractions for stream time bases and frame rates.
*/

use std::fmt;
use std::time::Duration;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/**
    A fraction as reported by a container, such as a `1/90000` time base
    or a `24000/1001` frame rate.
*/
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /**
        # Panics

        Panics if `den` is zero. Values read from a container should use
        [`checked`](Self::checked) instead.
    */
    #[inline]
    pub const fn new(num: i32, den: i32) -> Self {
        assert!(den != 0, "zero denominator");
        Self { num, den }
    }

    /**
        Returns `None` for a zero denominator, which is how demuxers
        report an unknown rate.
    */
    #[inline]
    pub const fn checked(num: i32, den: i32) -> Option<Self> {
        if den == 0 { None } else { Some(Self { num, den }) }
    }

    #[inline]
    pub const fn is_positive(self) -> bool {
        (self.num > 0 && self.den > 0) || (self.num < 0 && self.den < 0)
    }

    /**
        Scale `units` by this fraction and express the result in
        nanoseconds, rounding toward zero. Negative results clamp to zero.
    */
    pub(crate) fn scale_to_duration(self, units: i64) -> Duration {
        let nanos = i128::from(units) * i128::from(self.num) * NANOS_PER_SEC / i128::from(self.den);
        if nanos <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }

    /**
        Treat this value as a frame rate and return the duration of one
        frame, or `None` if the rate is not positive.
    */
    pub fn frame_interval(self) -> Option<Duration> {
        if !self.is_positive() {
            return None;
        }
        Some(Self::new(self.den, self.num).scale_to_duration(1))
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
