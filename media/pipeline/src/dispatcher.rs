/*!
    The dispatcher thread: pulls frames from the source and routes each one
    to exactly one consumer queue.
*/

use std::sync::Arc;
use std::time::Duration;

use media_types::{AudioFrame, Frame, VideoFrame};

use crate::supervisor::{Counters, Supervisor};
use crate::{Epoch, FrameQueue, PushError, Session, source::is_before_floor};

/// How long a parked dispatcher sleeps between stop-flag checks.
const PARK_INTERVAL: Duration = Duration::from_millis(250);

pub(crate) struct Dispatcher {
    pub session: Arc<Session>,
    pub epoch: Epoch,
    pub audio: Option<Arc<FrameQueue<AudioFrame>>>,
    pub video: Option<Arc<FrameQueue<VideoFrame>>>,
    pub supervisor: Arc<Supervisor>,
}

enum Pulled {
    Frame(Frame),
    BelowFloor,
    EndOfStream,
}

impl Dispatcher {
    pub fn run(self) {
        tracing::debug!("dispatcher started");
        while !self.supervisor.is_stopping() {
            // The epoch is read under the session lock, so it always names
            // the seek that positioned the source this frame came from.
            let (epoch, pulled) = {
                let mut session = self.session.lock();
                let epoch = self.epoch.current();
                let pulled = match session.next_frame() {
                    Ok(Some(frame)) => match session.resume_floor() {
                        Some(floor) if is_before_floor(&frame, floor) => Pulled::BelowFloor,
                        _ => Pulled::Frame(frame),
                    },
                    Ok(None) => Pulled::EndOfStream,
                    Err(err) => {
                        drop(session);
                        self.supervisor.fail(err.into());
                        break;
                    }
                };
                (epoch, pulled)
            };

            match pulled {
                Pulled::Frame(frame) => {
                    if !self.route(frame, epoch) {
                        break;
                    }
                }
                Pulled::BelowFloor => {
                    Counters::bump(&self.supervisor.counters.frames_below_floor);
                }
                Pulled::EndOfStream => {
                    tracing::debug!(epoch, "source reached end of stream");
                    if let Some(queue) = &self.audio {
                        queue.mark_end_of_stream(epoch);
                    }
                    if let Some(queue) = &self.video {
                        queue.mark_end_of_stream(epoch);
                    }
                    self.park(epoch);
                }
            }
        }
        tracing::debug!("dispatcher stopped");
    }

    /**
        Hand `frame` to its consumer. Returns false if the pipeline is closing.
    */
    fn route(&self, frame: Frame, epoch: u64) -> bool {
        let counters = &self.supervisor.counters;
        let result = match frame {
            Frame::Audio(frame) => match &self.audio {
                Some(queue) => queue
                    .push(frame, epoch)
                    .map(|()| Counters::bump(&counters.audio_frames_routed))
                    .map_err(PushError::discard),
                None => Ok(()),
            },
            Frame::Video(frame) => match &self.video {
                Some(queue) => queue
                    .push(frame, epoch)
                    .map(|()| Counters::bump(&counters.video_frames_routed))
                    .map_err(PushError::discard),
                None => Ok(()),
            },
        };
        match result {
            Ok(()) => true,
            Err(Refused::Stale) => {
                tracing::trace!(epoch, "dropping frame pulled before seek");
                Counters::bump(&counters.frames_stale);
                true
            }
            Err(Refused::Closed) => false,
        }
    }

    /**
        Wait at end of stream until a seek repositions the source or the
        pipeline stops.
    */
    fn park(&self, epoch: u64) {
        while !self.supervisor.is_stopping() {
            if self.epoch.wait_for_change(epoch, PARK_INTERVAL) {
                return;
            }
        }
    }
}

enum Refused {
    Stale,
    Closed,
}

impl<T> PushError<T> {
    fn discard(self) -> Refused {
        match self {
            Self::Stale(_) => Refused::Stale,
            Self::Closed(_) => Refused::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameSource, PipelineEvent, SourceError};
    use media_types::{BufferPool, MediaInfo, SampleFormat};
    use std::collections::VecDeque;
    use std::thread;

    struct Script {
        info: MediaInfo,
        frames: VecDeque<Frame>,
    }

    impl FrameSource for Script {
        fn info(&self) -> &MediaInfo {
            &self.info
        }
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            Ok(self.frames.pop_front())
        }
        fn seek(&mut self, _target: Duration) -> Result<(), SourceError> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    fn interleaved(pool: &BufferPool, count: u64) -> VecDeque<Frame> {
        (0..count)
            .map(|i| {
                let start = Duration::from_millis(i * 10);
                if i % 2 == 0 {
                    AudioFrame::new(pool.acquire(8), start, 1, 100, 1, SampleFormat::F32).into()
                } else {
                    VideoFrame::new(pool.acquire(4), start, 1, 1, 4).into()
                }
            })
            .collect()
    }

    #[test]
    fn routes_each_frame_to_its_queue_and_marks_end() {
        let pool = BufferPool::new();
        let session = Arc::new(Session::new(Box::new(Script {
            info: MediaInfo::default(),
            frames: interleaved(&pool, 10),
        })));
        let epoch = Epoch::new();
        let audio = Arc::new(FrameQueue::unbounded());
        let video = Arc::new(FrameQueue::bounded(16));
        let (tx, rx) = crossbeam_channel::unbounded();
        let supervisor = Arc::new(Supervisor::new(
            epoch.clone(),
            Some(Arc::clone(&audio)),
            Some(Arc::clone(&video)),
            tx,
        ));

        let dispatcher = Dispatcher {
            session,
            epoch: epoch.clone(),
            audio: Some(Arc::clone(&audio)),
            video: Some(Arc::clone(&video)),
            supervisor: Arc::clone(&supervisor),
        };
        let handle = thread::spawn(move || dispatcher.run());

        let mut audio_seen = 0;
        while let Some(item) = audio.pop() {
            match item {
                crate::Popped::Frame { frame, .. } => {
                    assert_eq!(frame.start_time.as_millis() % 20, 0);
                    audio_seen += 1;
                }
                crate::Popped::EndOfStream { .. } => break,
            }
        }
        let mut video_seen = 0;
        while let Some(item) = video.pop() {
            match item {
                crate::Popped::Frame { .. } => video_seen += 1,
                crate::Popped::EndOfStream { .. } => break,
            }
        }
        assert_eq!((audio_seen, video_seen), (5, 5));

        supervisor.halt();
        handle.join().unwrap();
        assert!(rx.try_recv().is_err());

        let stats = supervisor.counters.snapshot();
        assert_eq!(stats.audio_frames_routed, 5);
        assert_eq!(stats.video_frames_routed, 5);
    }

    #[test]
    fn source_error_fails_pipeline() {
        struct Broken(MediaInfo);
        impl FrameSource for Broken {
            fn info(&self) -> &MediaInfo {
                &self.0
            }
            fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
                Err(media_types::Error::codec("corrupt packet"))
            }
            fn seek(&mut self, _target: Duration) -> Result<(), SourceError> {
                Ok(())
            }
            fn close(&mut self) {}
        }

        let epoch = Epoch::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let supervisor = Arc::new(Supervisor::new(epoch.clone(), None, None, tx));
        Dispatcher {
            session: Arc::new(Session::new(Box::new(Broken(MediaInfo::default())))),
            epoch,
            audio: None,
            video: None,
            supervisor: Arc::clone(&supervisor),
        }
        .run();

        assert!(matches!(
            rx.try_recv(),
            Ok(PipelineEvent::Failed(crate::PipelineError::Source(_)))
        ));
        assert!(supervisor.is_stopping());
    }
}
