/*!
    The playback pipeline handle.
*/

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use media_types::MediaInfo;

use crate::audio_sink::AudioSink;
use crate::dispatcher::Dispatcher;
use crate::pacer::VideoPacer;
use crate::seek::SeekCoordinator;
use crate::supervisor::Supervisor;
use crate::{
    AudioOutput, Epoch, FrameQueue, FrameSource, PipelineConfig, PipelineError, PipelineEvent,
    PipelineStats, Renderer, Session, Transport,
};

/**
    A running playback session.

    Owns three threads: the dispatcher pulling from the source, the audio
    sink feeding the output device, and the video pacer feeding the
    renderer. A stream without a matching output (or without a stream in the
    source) gets no thread. Without audio, video is paced against wall time.

    The pipeline starts paused so the queues can fill; call
    [`play`](Pipeline::play) to start presentation.

    Dropping the pipeline shuts it down.
*/
pub struct Pipeline {
    info: MediaInfo,
    session: Arc<Session>,
    supervisor: Arc<Supervisor>,
    coordinator: SeekCoordinator,
    transport: Transport,
    events: Receiver<PipelineEvent>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
}

impl Pipeline {
    /**
        Validate the configuration and streams, then start the pipeline threads.

        Fails with [`PipelineError::NoStreams`] if there is neither an audio
        stream with an output nor a video stream with a renderer.
    */
    pub fn start(
        mut source: Box<dyn FrameSource>,
        output: Option<Arc<dyn AudioOutput>>,
        renderer: Option<Box<dyn Renderer>>,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let fallback_interval = match config
            .validate()
            .and_then(|()| config.fallback_frame_interval())
        {
            Ok(interval) => interval,
            Err(err) => {
                source.close();
                return Err(err);
            }
        };

        let info = source.info().clone();
        let output = output.filter(|_| info.has_audio());
        let renderer = renderer.filter(|_| info.has_video());
        if output.is_none() && renderer.is_none() {
            source.close();
            return Err(PipelineError::NoStreams);
        }

        let frame_interval = info
            .video
            .and_then(|video| video.frame_rate)
            .and_then(|rate| rate.frame_interval())
            .unwrap_or(fallback_interval);

        tracing::info!(
            audio = ?info.audio,
            video = ?info.video,
            duration = ?info.duration,
            audio_output = output.is_some(),
            video_output = renderer.is_some(),
            "starting pipeline"
        );

        let epoch = Epoch::new();
        let audio_queue = output
            .is_some()
            .then(|| Arc::new(FrameQueue::with_capacity(config.audio_queue_capacity)));
        let video_queue = renderer
            .is_some()
            .then(|| Arc::new(FrameQueue::bounded(config.video_queue_capacity)));

        let transport = match &output {
            Some(output) => Transport::audio(Arc::clone(output)),
            None => Transport::wall(),
        };

        let (events_tx, events) = crossbeam_channel::unbounded();
        let supervisor = Arc::new(Supervisor::new(
            epoch.clone(),
            audio_queue.clone(),
            video_queue.clone(),
            events_tx,
        ));
        let session = Arc::new(Session::new(source));
        let present = Arc::new(Mutex::new(()));
        let coordinator = SeekCoordinator::new(
            Arc::clone(&session),
            epoch.clone(),
            audio_queue.clone(),
            video_queue.clone(),
            transport.clone(),
            Arc::clone(&supervisor),
            Arc::clone(&present),
        );

        let mut pipeline = Self {
            info,
            session: Arc::clone(&session),
            supervisor: Arc::clone(&supervisor),
            coordinator,
            transport: transport.clone(),
            events,
            threads: Vec::with_capacity(3),
        };

        let dispatcher = Dispatcher {
            session,
            epoch: epoch.clone(),
            audio: audio_queue.clone(),
            video: video_queue.clone(),
            supervisor: Arc::clone(&supervisor),
        };
        pipeline.spawn("dispatcher", move || dispatcher.run())?;

        if let (Some(queue), Some(output), Transport::Audio { clock, .. }) =
            (audio_queue, output, &transport)
        {
            let sink = AudioSink {
                queue,
                output,
                clock: Arc::clone(clock),
                epoch: epoch.clone(),
                supervisor: Arc::clone(&supervisor),
                retry: config.audio_write_retry,
            };
            pipeline.spawn("audio", move || sink.run())?;
        }

        if let (Some(queue), Some(renderer)) = (video_queue, renderer) {
            let pacer = VideoPacer {
                queue,
                transport,
                epoch,
                supervisor,
                renderer,
                present,
                frame_interval,
                thresholds: config.pacing,
                poll_interval: config.playing_poll_interval(),
            };
            pipeline.spawn("video", move || pacer.run())?;
        }

        Ok(pipeline)
    }

    /**
        Spawn a named pipeline thread. A panic inside it fails the pipeline.

        On error the pipeline is dropped by the caller, which stops the
        threads already running.
    */
    fn spawn(
        &mut self,
        name: &'static str,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<(), PipelineError> {
        let supervisor = Arc::clone(&self.supervisor);
        let handle = thread::Builder::new()
            .name(format!("media-{name}"))
            .spawn(move || {
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    supervisor.fail(PipelineError::ThreadPanicked(name));
                }
            })
            .map_err(|source| PipelineError::Spawn { name, source })?;
        self.threads.push((name, handle));
        Ok(())
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    /**
        Start (or continue) presentation.
    */
    pub fn play(&self) {
        self.coordinator.set_paused(false);
    }

    pub fn pause(&self) {
        self.coordinator.set_paused(true);
    }

    /**
        Flip between playing and paused. Returns true if now paused.
    */
    pub fn toggle_pause(&self) -> bool {
        self.coordinator.toggle_pause()
    }

    pub fn is_paused(&self) -> bool {
        self.coordinator.is_paused()
    }

    /**
        Seek relative to the current position. Returns the clamped target.
    */
    pub fn seek_relative(&self, offset_secs: f64) -> Result<Duration, PipelineError> {
        self.coordinator.seek_relative(offset_secs)
    }

    /**
        Seek to an absolute position in seconds. Returns the clamped target.
    */
    pub fn seek_to(&self, target_secs: f64) -> Result<Duration, PipelineError> {
        self.coordinator.seek_to(target_secs)
    }

    /**
        Current presentation clock position.
    */
    pub fn position(&self) -> Duration {
        self.transport.position()
    }

    /**
        Receiver for [`PipelineEvent`]s. At most one `Failed` is ever sent.
    */
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    pub fn stats(&self) -> PipelineStats {
        self.supervisor.counters.snapshot()
    }

    /**
        Returns true once the pipeline has stopped on a terminal error.
    */
    pub fn has_failed(&self) -> bool {
        self.supervisor.has_failed()
    }

    /**
        Stop all threads, wait for them, and close the source.

        Returns an error naming the first thread found to have panicked.
    */
    pub fn shutdown(mut self) -> Result<(), PipelineError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        self.supervisor.halt();
        let mut result = Ok(());
        for (name, handle) in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!(thread = name, "pipeline thread panicked");
                if result.is_ok() {
                    result = Err(PipelineError::ThreadPanicked(name));
                }
            }
        }
        self.session.close();
        result
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            let _ = self.stop();
        }
    }
}
