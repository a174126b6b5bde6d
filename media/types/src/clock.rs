/*!
    Clock and synchronization types.
*/

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/**
    Trait for playback clocks.

    A clock provides the current playback position, which the video pacer
    compares against frame timestamps. Clocks are reset on every seek; the
    `epoch` passed to [`reset_to`](Clock::reset_to) identifies the seek that
    performed the reset, so writers that started under an older epoch can be
    refused.
*/
pub trait Clock: Send + Sync {
    /// Get the current playback position.
    fn position(&self) -> Duration;

    /// Reset the clock to a specific position at the start of `epoch`.
    fn reset_to(&self, position: Duration, epoch: u64);
}

/**
    Mutable clock state. Only touched by writers, never by `position()`
    on the common path.
*/
struct PlaybackWriter {
    epoch: u64,
    finished_at: Option<Instant>,
}

/**
    Audio-driven clock: "how much audio has already been sent to the device".

    The audio sink calls [`advance`](PlaybackClock::advance) after every
    successful write with the duration-equivalent of the bytes written. The
    position is published with release ordering and read with acquire
    ordering, so `position()` always returns the latest committed write.

    Advances carry the epoch the write started under and are ignored once a
    seek has reset the clock to a newer epoch. Between seeks the position
    never decreases.

    When audio runs out at end of stream the clock switches to wall-time
    extrapolation so trailing video frames keep advancing.
*/
pub struct PlaybackClock {
    position_nanos: AtomicU64,
    finished: AtomicBool,
    writer: Mutex<PlaybackWriter>,
}

impl PlaybackClock {
    /**
        Create a clock at position zero in epoch zero.
    */
    pub fn new() -> Self {
        Self {
            position_nanos: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            writer: Mutex::new(PlaybackWriter {
                epoch: 0,
                finished_at: None,
            }),
        }
    }

    /**
        Advance the clock by `by`, if `epoch` is still the clock's epoch.

        Returns false (and leaves the clock untouched) when a newer reset
        has happened since the write began.
    */
    pub fn advance(&self, epoch: u64, by: Duration) -> bool {
        let writer = self.writer.lock();
        if writer.epoch != epoch {
            return false;
        }
        let nanos = by.as_nanos().min(u64::MAX as u128) as u64;
        self.position_nanos.fetch_add(nanos, Ordering::AcqRel);
        true
    }

    /**
        Mark the audio stream as drained for `epoch`.

        After this, `position()` extrapolates with wall time from the point
        where audio ended, until the next reset.
    */
    pub fn mark_finished(&self, epoch: u64) {
        let mut writer = self.writer.lock();
        if writer.epoch != epoch || writer.finished_at.is_some() {
            return;
        }
        writer.finished_at = Some(Instant::now());
        self.finished.store(true, Ordering::Release);
    }

    /**
        Returns true if the clock is extrapolating past the end of audio.
    */
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /**
        Epoch of the most recent reset.
    */
    pub fn epoch(&self) -> u64 {
        self.writer.lock().epoch
    }

    fn committed(&self) -> Duration {
        Duration::from_nanos(self.position_nanos.load(Ordering::Acquire))
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for PlaybackClock {
    fn position(&self) -> Duration {
        if self.finished.load(Ordering::Acquire) {
            let writer = self.writer.lock();
            if let Some(finished_at) = writer.finished_at {
                return self.committed() + finished_at.elapsed();
            }
        }
        self.committed()
    }

    fn reset_to(&self, position: Duration, epoch: u64) {
        let mut writer = self.writer.lock();
        writer.epoch = epoch;
        writer.finished_at = None;
        self.finished.store(false, Ordering::Release);
        let nanos = position.as_nanos().min(u64::MAX as u128) as u64;
        self.position_nanos.store(nanos, Ordering::Release);
    }
}

static_assertions::assert_impl_all!(PlaybackClock: Send, Sync, Clock);

struct WallState {
    /// When playback started (or was last reset).
    started: Instant,
    /// Position at `started`.
    offset: Duration,
    /// When pause started (None if not paused).
    paused_at: Option<Instant>,
    /// Total time spent paused since `started`.
    paused_total: Duration,
}

/**
    Wall-time clock for media without audio.

    Uses wall time to track playback position. Supports pause and resume.
*/
pub struct WallClock {
    state: Mutex<WallState>,
}

impl WallClock {
    /**
        Create a new running wall clock at position zero.
    */
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WallState {
                started: Instant::now(),
                offset: Duration::ZERO,
                paused_at: None,
                paused_total: Duration::ZERO,
            }),
        }
    }

    /**
        Create a wall clock at position zero that starts out paused.
    */
    pub fn paused() -> Self {
        let started = Instant::now();
        Self {
            state: Mutex::new(WallState {
                started,
                offset: Duration::ZERO,
                paused_at: Some(started),
                paused_total: Duration::ZERO,
            }),
        }
    }

    /**
        Pause the clock. While paused, `position()` returns the same value.
    */
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if state.paused_at.is_none() {
            state.paused_at = Some(Instant::now());
        }
    }

    /**
        Resume the clock after being paused.
    */
    pub fn resume(&self) {
        let mut state = self.state.lock();
        if let Some(pause_start) = state.paused_at.take() {
            state.paused_total += pause_start.elapsed();
        }
    }

    /**
        Check if the clock is paused.
    */
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused_at.is_some()
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn position(&self) -> Duration {
        let state = self.state.lock();
        let until = state.paused_at.unwrap_or_else(Instant::now);
        let elapsed = until.saturating_duration_since(state.started);
        (state.offset + elapsed).saturating_sub(state.paused_total)
    }

    fn reset_to(&self, position: Duration, _epoch: u64) {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.started = now;
        state.offset = position;
        state.paused_total = Duration::ZERO;
        if state.paused_at.is_some() {
            state.paused_at = Some(now);
        }
    }
}

static_assertions::assert_impl_all!(WallClock: Send, Sync, Clock);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_clock_initial_position() {
        let clock = PlaybackClock::new();
        assert_eq!(clock.position(), Duration::ZERO);
        assert_eq!(clock.epoch(), 0);
    }

    #[test]
    fn playback_clock_advances_within_epoch() {
        let clock = PlaybackClock::new();
        assert!(clock.advance(0, Duration::from_millis(300)));
        assert!(clock.advance(0, Duration::from_millis(200)));
        assert_eq!(clock.position(), Duration::from_millis(500));
    }

    #[test]
    fn playback_clock_refuses_stale_epoch() {
        let clock = PlaybackClock::new();
        clock.advance(0, Duration::from_secs(1));
        clock.reset_to(Duration::from_secs(5), 1);

        assert!(!clock.advance(0, Duration::from_secs(1)));
        assert_eq!(clock.position(), Duration::from_secs(5));

        assert!(clock.advance(1, Duration::from_millis(250)));
        assert_eq!(clock.position(), Duration::from_millis(5250));
    }

    #[test]
    fn playback_clock_mark_finished_extrapolates() {
        let clock = PlaybackClock::new();
        clock.advance(0, Duration::from_secs(1));
        clock.mark_finished(0);
        assert!(clock.is_finished());

        std::thread::sleep(Duration::from_millis(20));
        assert!(clock.position() >= Duration::from_millis(1020));
    }

    #[test]
    fn wall_clock_paused_holds_zero() {
        let clock = WallClock::paused();
        assert!(clock.is_paused());
        assert_eq!(clock.position(), Duration::ZERO);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.position(), Duration::ZERO);

        clock.resume();
        std::thread::sleep(Duration::from_millis(20));
        let position = clock.position();
        assert!(position >= Duration::from_millis(20), "position {position:?}");
        assert!(position < Duration::from_millis(200), "position {position:?}");
    }

    #[test]
    fn playback_clock_mark_finished_ignores_stale_epoch() {
        let clock = PlaybackClock::new();
        clock.reset_to(Duration::from_secs(2), 3);
        clock.mark_finished(2);
        assert!(!clock.is_finished());
    }

    #[test]
    fn playback_clock_reset_clears_finished() {
        let clock = PlaybackClock::new();
        clock.advance(0, Duration::from_secs(1));
        clock.mark_finished(0);

        clock.reset_to(Duration::ZERO, 1);
        assert!(!clock.is_finished());

        clock.advance(1, Duration::from_millis(500));
        assert_eq!(clock.position(), Duration::from_millis(500));
    }

    #[test]
    fn wall_clock_advances() {
        let clock = WallClock::new();
        std::thread::sleep(Duration::from_millis(50));

        let pos = clock.position();
        assert!(pos >= Duration::from_millis(30));
        assert!(pos < Duration::from_millis(500));
    }

    #[test]
    fn wall_clock_pause_stops_advancement() {
        let clock = WallClock::new();
        std::thread::sleep(Duration::from_millis(20));

        clock.pause();
        let at_pause = clock.position();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(clock.position(), at_pause);

        clock.resume();
        std::thread::sleep(Duration::from_millis(30));
        let advanced = clock.position() - at_pause;
        assert!(advanced >= Duration::from_millis(20));
        assert!(advanced < Duration::from_millis(300));
    }

    #[test]
    fn wall_clock_reset_while_paused_stays_paused() {
        let clock = WallClock::paused();
        clock.reset_to(Duration::from_secs(10), 1);
        std::thread::sleep(Duration::from_millis(20));

        assert!(clock.is_paused());
        assert_eq!(clock.position(), Duration::from_secs(10));
    }

    #[test]
    fn wall_clock_reset_to() {
        let clock = WallClock::new();
        clock.reset_to(Duration::from_secs(10), 1);

        let pos = clock.position();
        assert!(pos >= Duration::from_secs(10));
        assert!(pos < Duration::from_millis(10_300));
    }
}
