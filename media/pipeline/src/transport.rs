/*!
    Presentation clock and play/pause control, unified over the two timing
    modes: audio-driven, or wall time for media without audio.
*/

use std::sync::Arc;
use std::time::Duration;

use media_types::{Clock, PlaybackClock, WallClock};

use crate::AudioOutput;

/**
    The clock video is presented against, plus the switch that starts and
    stops it.
*/
#[derive(Clone)]
pub enum Transport {
    /// Position is the audio written to `output`; paused by pausing the device.
    Audio {
        clock: Arc<PlaybackClock>,
        output: Arc<dyn AudioOutput>,
    },
    /// Position is wall time; paused by freezing the clock.
    Wall(Arc<WallClock>),
}

impl Transport {
    pub fn audio(output: Arc<dyn AudioOutput>) -> Self {
        Self::Audio {
            clock: Arc::new(PlaybackClock::new()),
            output,
        }
    }

    /**
        A wall-time transport that starts out paused.
    */
    pub fn wall() -> Self {
        Self::Wall(Arc::new(WallClock::paused()))
    }

    pub fn position(&self) -> Duration {
        self.clock().position()
    }

    pub fn clock(&self) -> &dyn Clock {
        match self {
            Self::Audio { clock, .. } => clock.as_ref(),
            Self::Wall(clock) => clock.as_ref(),
        }
    }

    pub fn reset_to(&self, position: Duration, epoch: u64) {
        self.clock().reset_to(position, epoch);
    }

    pub fn pause(&self) {
        match self {
            Self::Audio { output, .. } => output.pause(),
            Self::Wall(clock) => clock.pause(),
        }
    }

    pub fn resume(&self) {
        match self {
            Self::Audio { output, .. } => output.resume(),
            Self::Wall(clock) => clock.resume(),
        }
    }

    /**
        Returns true while the presentation clock is running.
    */
    pub fn is_running(&self) -> bool {
        match self {
            Self::Audio { output, .. } => output.is_playing(),
            Self::Wall(clock) => !clock.is_paused(),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Audio { .. } => "Audio",
            Self::Wall(_) => "Wall",
        };
        f.debug_struct("Transport")
            .field("kind", &kind)
            .field("position", &self.position())
            .field("running", &self.is_running())
            .finish()
    }
}

static_assertions::assert_impl_all!(Transport: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_transport_starts_paused() {
        let transport = Transport::wall();
        assert!(!transport.is_running());
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(transport.position(), Duration::ZERO);

        transport.resume();
        assert!(transport.is_running());
    }

    #[test]
    fn wall_transport_reset_moves_position() {
        let transport = Transport::wall();
        transport.reset_to(Duration::from_secs(42), 1);
        assert_eq!(transport.position(), Duration::from_secs(42));
    }
}
