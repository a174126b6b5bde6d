/*!
    Pipeline configuration.
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Capacity of the video queue, the pipeline's flow-control valve.
pub const DEFAULT_VIDEO_QUEUE_CAPACITY: usize = 5;

/// Audio queue bound in frames (roughly five seconds of typical 1024-sample frames).
pub const DEFAULT_AUDIO_QUEUE_CAPACITY: usize = 256;

/// Accepted values for `fallback_frame_rate`, in frames per second.
pub const FALLBACK_FRAME_RATE_RANGE: std::ops::RangeInclusive<f64> = 1.0..=1000.0;

/**
    Thresholds of the video pacing policy, as multiples of the frame interval.
*/
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingThresholds {
    /// Frames further ahead of the clock than this are skipped without sleeping.
    pub early_skip_factor: f64,
    /// Frames further behind the clock than this are dropped.
    pub late_drop_factor: f64,
}

impl Default for PacingThresholds {
    fn default() -> Self {
        Self {
            early_skip_factor: 10.0,
            late_drop_factor: 2.0,
        }
    }
}

/**
    Bounded backoff for transient audio write failures.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per write before the failure becomes fatal.
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubling delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /**
        Delay to wait after the `attempt`-th consecutive failure (1-based).
    */
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 10,
            max_backoff_ms: 200,
        }
    }
}

/**
    Tunables for a playback session.

    Every field has a default, so a partial JSON object deserializes into a
    complete configuration.
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames the video queue holds before the dispatcher blocks.
    pub video_queue_capacity: usize,
    /// Frames the audio queue holds before the dispatcher blocks; `None` leaves it unbounded.
    pub audio_queue_capacity: Option<usize>,
    pub pacing: PacingThresholds,
    /// How often the pacer re-checks whether the output has started, in milliseconds.
    pub playing_poll_interval_ms: u64,
    pub audio_write_retry: RetryPolicy,
    /// Frame rate assumed when the source declares none.
    pub fallback_frame_rate: f64,
}

impl PipelineConfig {
    pub fn playing_poll_interval(&self) -> Duration {
        Duration::from_millis(self.playing_poll_interval_ms.max(1))
    }

    /**
        Reject values that would stall or disable the pipeline.
    */
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.video_queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "video_queue_capacity must be at least 1".into(),
            ));
        }
        if self.audio_queue_capacity == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "audio_queue_capacity must be at least 1 when bounded".into(),
            ));
        }
        if !(self.pacing.late_drop_factor > 0.0) {
            return Err(PipelineError::InvalidConfig(
                "pacing.late_drop_factor must be positive".into(),
            ));
        }
        if !(self.pacing.early_skip_factor >= 1.0) {
            return Err(PipelineError::InvalidConfig(
                "pacing.early_skip_factor must be at least 1".into(),
            ));
        }
        if self.audio_write_retry.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "audio_write_retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(FALLBACK_FRAME_RATE_RANGE.contains(&self.fallback_frame_rate)) {
            return Err(PipelineError::InvalidConfig(format!(
                "fallback_frame_rate must be between {} and {}",
                FALLBACK_FRAME_RATE_RANGE.start(),
                FALLBACK_FRAME_RATE_RANGE.end()
            )));
        }
        self.fallback_frame_interval()?;
        Ok(())
    }

    /**
        Frame interval implied by `fallback_frame_rate`.
    */
    pub fn fallback_frame_interval(&self) -> Result<Duration, PipelineError> {
        Duration::try_from_secs_f64(1.0 / self.fallback_frame_rate)
            .ok()
            .filter(|interval| !interval.is_zero())
            .ok_or_else(|| {
                PipelineError::InvalidConfig(format!(
                    "fallback_frame_rate {} has no usable frame interval",
                    self.fallback_frame_rate
                ))
            })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_queue_capacity: DEFAULT_VIDEO_QUEUE_CAPACITY,
            audio_queue_capacity: Some(DEFAULT_AUDIO_QUEUE_CAPACITY),
            pacing: PacingThresholds::default(),
            playing_poll_interval_ms: 10,
            audio_write_retry: RetryPolicy::default(),
            fallback_frame_rate: 30.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.video_queue_capacity, 5);
        assert_eq!(config.pacing.early_skip_factor, 10.0);
        assert_eq!(config.pacing.late_drop_factor, 2.0);
        assert_eq!(config.playing_poll_interval(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "audio_queue_capacity": null, "pacing": { "late_drop_factor": 3.0 } }"#)
                .unwrap();
        assert_eq!(config.audio_queue_capacity, None);
        assert_eq!(config.pacing.late_drop_factor, 3.0);
        assert_eq!(config.pacing.early_skip_factor, 10.0);
        assert_eq!(config.video_queue_capacity, 5);
    }

    #[test]
    fn validate_rejects_zero_video_capacity() {
        let config = PipelineConfig {
            video_queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_bounds_fallback_frame_rate() {
        for rate in [0.0, -30.0, 1e-300, 0.5, f64::NAN, f64::INFINITY, 1e6] {
            let config = PipelineConfig {
                fallback_frame_rate: rate,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(PipelineError::InvalidConfig(_))),
                "rate {rate} accepted"
            );
        }

        let config = PipelineConfig {
            fallback_frame_rate: 1e-300,
            ..Default::default()
        };
        assert!(config.fallback_frame_interval().is_err());

        let config = PipelineConfig {
            fallback_frame_rate: 4.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.fallback_frame_interval().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn validate_rejects_nan_thresholds() {
        let mut config = PipelineConfig::default();
        config.pacing.early_skip_factor = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(4), Duration::from_millis(80));
        assert_eq!(policy.backoff(6), Duration::from_millis(200));
        assert_eq!(policy.backoff(40), Duration::from_millis(200));
    }
}
