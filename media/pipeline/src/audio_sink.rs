/*!
    The audio consumer: writes decoded audio to the output device and
    drives the playback clock with exactly what the device accepted.
*/

use std::sync::Arc;
use std::time::Duration;

use media_types::{AudioFormat, AudioFrame, PlaybackClock, StreamKind};

use crate::config::RetryPolicy;
use crate::supervisor::Supervisor;
use crate::{AudioOutput, Epoch, FrameQueue, PipelineError, Popped, WriteStatus};

/// Pause before re-offering data to an output that accepted nothing.
const STALL_BACKOFF: Duration = Duration::from_millis(1);

pub(crate) struct AudioSink {
    pub queue: Arc<FrameQueue<AudioFrame>>,
    pub output: Arc<dyn AudioOutput>,
    pub clock: Arc<PlaybackClock>,
    pub epoch: Epoch,
    pub supervisor: Arc<Supervisor>,
    pub retry: RetryPolicy,
}

impl AudioSink {
    pub fn run(self) {
        tracing::debug!("audio sink started");
        while let Some(item) = self.queue.pop() {
            match item {
                Popped::Frame { epoch, frame } => {
                    if let Err(err) = self.play(epoch, &frame) {
                        self.supervisor.fail(err);
                        break;
                    }
                }
                Popped::EndOfStream { epoch } => {
                    self.clock.mark_finished(epoch);
                    self.supervisor.report_drained(StreamKind::Audio, epoch);
                }
            }
        }
        tracing::debug!("audio sink stopped");
    }

    /**
        Write one frame in full, retrying transient device errors.

        A seek during the write abandons the rest of the frame; that is not
        an error.
    */
    fn play(&self, epoch: u64, frame: &AudioFrame) -> Result<(), PipelineError> {
        let token = self.epoch.token();
        if token.generation() != epoch {
            return Ok(());
        }
        let format = AudioFormat {
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            sample_format: frame.format,
        };

        let data: &[u8] = &frame.data;
        let mut offset = 0;
        let mut failures = 0;
        while offset < data.len() {
            match self.output.write(&data[offset..], format, &token) {
                Ok(WriteStatus::Written(0)) => {
                    if !token.wait_timeout(STALL_BACKOFF) {
                        return Ok(());
                    }
                }
                Ok(WriteStatus::Written(written)) => {
                    let written = written.min(data.len() - offset);
                    offset += written;
                    failures = 0;
                    if !self
                        .clock
                        .advance(epoch, frame.bytes_to_duration(written))
                    {
                        return Ok(());
                    }
                }
                Ok(WriteStatus::Cancelled) => return Ok(()),
                Err(err) => {
                    failures += 1;
                    if !err.is_transient() || failures >= self.retry.max_attempts {
                        return Err(PipelineError::AudioWrite {
                            attempts: failures,
                            source: err,
                        });
                    }
                    let delay = self.retry.backoff(failures);
                    tracing::warn!(error = %err, attempt = failures, ?delay, "audio write failed, retrying");
                    if !token.wait_timeout(delay) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AudioWriteError, EpochToken, PipelineEvent};
    use media_types::{BufferPool, Clock, SampleFormat};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Output that replays scripted results and records accepted byte counts.
    struct Scripted {
        results: Mutex<VecDeque<Result<usize, AudioWriteError>>>,
        accepted: Mutex<usize>,
    }

    impl Scripted {
        fn new(results: Vec<Result<usize, AudioWriteError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                accepted: Mutex::new(0),
            })
        }
    }

    impl AudioOutput for Scripted {
        fn write(
            &self,
            data: &[u8],
            _format: AudioFormat,
            _token: &EpochToken,
        ) -> Result<WriteStatus, AudioWriteError> {
            let next = self.results.lock().pop_front().unwrap_or(Ok(usize::MAX));
            let n = next?.min(data.len());
            *self.accepted.lock() += n;
            Ok(WriteStatus::Written(n))
        }
        fn pause(&self) {}
        fn resume(&self) {}
        fn is_playing(&self) -> bool {
            true
        }
    }

    fn sink(output: Arc<Scripted>) -> (AudioSink, crossbeam_channel::Receiver<PipelineEvent>) {
        let epoch = Epoch::new();
        let queue = Arc::new(FrameQueue::unbounded());
        let (tx, rx) = crossbeam_channel::unbounded();
        let supervisor = Arc::new(Supervisor::new(epoch.clone(), Some(Arc::clone(&queue)), None, tx));
        let sink = AudioSink {
            queue,
            output,
            clock: Arc::new(PlaybackClock::new()),
            epoch,
            supervisor,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        };
        (sink, rx)
    }

    /// 100ms of mono 16-bit audio at 8 kHz: 800 samples, 1600 bytes.
    fn frame(pool: &BufferPool) -> AudioFrame {
        AudioFrame::new(pool.acquire(1600), Duration::ZERO, 1, 8000, 800, SampleFormat::S16)
    }

    #[test]
    fn partial_writes_advance_clock_by_bytes_accepted() {
        let output = Scripted::new(vec![Ok(400), Ok(400), Ok(800)]);
        let (sink, _rx) = sink(Arc::clone(&output));
        let pool = BufferPool::new();

        sink.play(0, &frame(&pool)).unwrap();
        assert_eq!(*output.accepted.lock(), 1600);
        assert_eq!(sink.clock.position(), Duration::from_millis(100));
    }

    #[test]
    fn transient_failures_are_retried() {
        let output = Scripted::new(vec![
            Err(AudioWriteError::Device("underrun".into())),
            Err(AudioWriteError::Device("underrun".into())),
            Ok(1600),
        ]);
        let (sink, _rx) = sink(Arc::clone(&output));
        let pool = BufferPool::new();

        sink.play(0, &frame(&pool)).unwrap();
        assert_eq!(sink.clock.position(), Duration::from_millis(100));
    }

    #[test]
    fn persistent_failure_becomes_fatal() {
        let output = Scripted::new(
            (0..5)
                .map(|_| Err(AudioWriteError::Device("gone".into())))
                .collect(),
        );
        let (sink, _rx) = sink(output);
        let pool = BufferPool::new();

        let err = sink.play(0, &frame(&pool)).unwrap_err();
        assert!(matches!(err, PipelineError::AudioWrite { attempts: 3, .. }));
        assert_eq!(sink.clock.position(), Duration::ZERO);
    }

    #[test]
    fn closed_output_fails_without_retry() {
        let output = Scripted::new(vec![Err(AudioWriteError::Closed)]);
        let (sink, _rx) = sink(output);
        let pool = BufferPool::new();

        let err = sink.play(0, &frame(&pool)).unwrap_err();
        assert!(matches!(err, PipelineError::AudioWrite { attempts: 1, .. }));
    }

    #[test]
    fn frame_from_old_epoch_is_not_written() {
        let output = Scripted::new(vec![]);
        let (sink, _rx) = sink(Arc::clone(&output));
        sink.epoch.advance();
        let pool = BufferPool::new();

        sink.play(0, &frame(&pool)).unwrap();
        assert_eq!(*output.accepted.lock(), 0);
    }

    #[test]
    fn end_of_stream_finishes_clock_and_reports() {
        let output = Scripted::new(vec![]);
        let (sink, rx) = sink(output);
        let pool = BufferPool::new();
        sink.queue.push(frame(&pool), 0).unwrap();
        sink.queue.mark_end_of_stream(0);

        let queue = Arc::clone(&sink.queue);
        let clock = Arc::clone(&sink.clock);
        let handle = std::thread::spawn(move || sink.run());

        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(PipelineEvent::Finished)
        ));
        assert!(clock.is_finished());
        queue.close();
        handle.join().unwrap();
    }
}
