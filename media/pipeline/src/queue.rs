/*!
    Bounded, epoch-tagged frame queues.

    One queue sits between the dispatcher and each consumer. The queue
    carries the epoch generation it is currently accepting; a seek flushes it
    into a new generation, after which pushes still tagged with the old one
    are refused. That closes the window where the dispatcher pulled a frame
    just before a seek and pushes it just after.
*/

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/**
    Result of a blocking [`FrameQueue::pop`].
*/
#[derive(Debug)]
pub enum Popped<T> {
    /// A frame accepted under `epoch`.
    Frame { epoch: u64, frame: T },
    /// The source ran dry under `epoch` and every frame before it was taken.
    EndOfStream { epoch: u64 },
}

/**
    Why a push was refused. The frame is handed back to the caller.
*/
#[derive(Debug)]
pub enum PushError<T> {
    /// The queue has moved on to a newer epoch.
    Stale(T),
    /// The queue was closed for shutdown.
    Closed(T),
}

struct QueueState<T> {
    frames: VecDeque<T>,
    epoch: u64,
    end_of_stream: bool,
    end_delivered: bool,
    closed: bool,
    high_water: usize,
}

/**
    FIFO of decoded frames with blocking push and pop.

    With a capacity, `push` blocks while the queue is full; that back-pressure
    is what keeps decoding only a few frames ahead of presentation.
*/
pub struct FrameQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: Option<usize>,
    frame_available: Condvar,
    space_available: Condvar,
}

impl<T> FrameQueue<T> {
    /**
        Create a queue that holds at most `capacity` frames.
    */
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    /**
        Create a queue that never blocks producers.
    */
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity.unwrap_or(16)),
                epoch: 0,
                end_of_stream: false,
                end_delivered: false,
                closed: false,
                high_water: 0,
            }),
            capacity,
            frame_available: Condvar::new(),
            space_available: Condvar::new(),
        }
    }

    /**
        Append a frame produced under `epoch`, blocking while the queue is full.

        Refuses the frame if the queue's epoch differs from `epoch` (before or
        after waiting for space) or if the queue is closed.
    */
    pub fn push(&self, frame: T, epoch: u64) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(PushError::Closed(frame));
            }
            if state.epoch != epoch {
                return Err(PushError::Stale(frame));
            }
            match self.capacity {
                Some(capacity) if state.frames.len() >= capacity => {
                    self.space_available.wait(&mut state);
                }
                _ => break,
            }
        }

        state.frames.push_back(frame);
        state.high_water = state.high_water.max(state.frames.len());
        self.frame_available.notify_one();
        Ok(())
    }

    /**
        Take the next item, blocking until one is available.

        Returns `None` once the queue is closed. End of stream is reported
        exactly once per epoch, after the last frame.
    */
    pub fn pop(&self) -> Option<Popped<T>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state.frames.pop_front() {
                self.space_available.notify_one();
                return Some(Popped::Frame {
                    epoch: state.epoch,
                    frame,
                });
            }
            if state.end_of_stream && !state.end_delivered {
                state.end_delivered = true;
                return Some(Popped::EndOfStream { epoch: state.epoch });
            }
            self.frame_available.wait(&mut state);
        }
    }

    /**
        Discard every queued frame and start accepting frames for `epoch`.

        Wakes producers blocked on a full queue so they can notice the new
        epoch. Returns the number of frames discarded.
    */
    pub fn flush(&self, epoch: u64) -> usize {
        let mut state = self.state.lock();
        let dropped = state.frames.len();
        state.frames.clear();
        state.epoch = epoch;
        state.end_of_stream = false;
        state.end_delivered = false;
        self.space_available.notify_all();
        self.frame_available.notify_all();
        if dropped > 0 {
            tracing::debug!(dropped, epoch, "flushed frame queue");
        }
        dropped
    }

    /**
        Record that the source is exhausted for `epoch`.

        Ignored (returning false) when the queue has already moved on.
    */
    pub fn mark_end_of_stream(&self, epoch: u64) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.epoch != epoch {
            return false;
        }
        state.end_of_stream = true;
        self.frame_available.notify_all();
        true
    }

    /**
        Close the queue: drop its frames and release every blocked thread.
    */
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.frames.clear();
        self.space_available.notify_all();
        self.frame_available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /**
        Epoch the queue currently accepts.
    */
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /**
        Largest number of frames the queue has held at once.
    */
    pub fn high_water(&self) -> usize {
        self.state.lock().high_water
    }
}

static_assertions::assert_impl_all!(FrameQueue<media_types::VideoFrame>: Send, Sync);
static_assertions::assert_impl_all!(FrameQueue<media_types::AudioFrame>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order() {
        let queue = FrameQueue::bounded(4);
        for i in 0..3 {
            queue.push(i, 0).unwrap();
        }
        for i in 0..3 {
            assert!(matches!(queue.pop(), Some(Popped::Frame { epoch: 0, frame }) if frame == i));
        }
    }

    #[test]
    fn push_blocks_when_full_until_pop() {
        let queue = Arc::new(FrameQueue::bounded(2));
        queue.push(1, 0).unwrap();
        queue.push(2, 0).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(3, 0).is_ok())
        };

        thread::sleep(Duration::from_millis(30));
        assert_eq!(queue.len(), 2);

        assert!(matches!(queue.pop(), Some(Popped::Frame { frame: 1, .. })));
        assert!(producer.join().unwrap());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.high_water(), 2);
    }

    #[test]
    fn stale_push_is_refused() {
        let queue = FrameQueue::bounded(2);
        queue.flush(1);
        assert!(matches!(queue.push(7, 0), Err(PushError::Stale(7))));
        assert!(queue.is_empty());
        queue.push(8, 1).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn flush_wakes_blocked_producer_with_stale_frame() {
        let queue = Arc::new(FrameQueue::bounded(1));
        queue.push(1, 0).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2, 0))
        };

        thread::sleep(Duration::from_millis(30));
        assert_eq!(queue.flush(1), 1);

        let result = producer.join().unwrap();
        assert!(matches!(result, Err(PushError::Stale(2))));
        assert!(queue.is_empty());
    }

    #[test]
    fn end_of_stream_delivered_once_after_frames() {
        let queue = FrameQueue::unbounded();
        queue.push("a", 0).unwrap();
        assert!(queue.mark_end_of_stream(0));

        assert!(matches!(queue.pop(), Some(Popped::Frame { frame: "a", .. })));
        assert!(matches!(queue.pop(), Some(Popped::EndOfStream { epoch: 0 })));

        queue.close();
        assert!(queue.pop().is_none());
    }

    #[test]
    fn end_of_stream_for_old_epoch_is_ignored() {
        let queue: FrameQueue<u8> = FrameQueue::unbounded();
        queue.flush(2);
        assert!(!queue.mark_end_of_stream(1));
        assert!(queue.mark_end_of_stream(2));
    }

    #[test]
    fn flush_resets_end_of_stream() {
        let queue = Arc::new(FrameQueue::unbounded());
        queue.mark_end_of_stream(0);
        assert!(matches!(queue.pop(), Some(Popped::EndOfStream { .. })));

        queue.flush(1);
        queue.push(5u8, 1).unwrap();
        assert!(matches!(queue.pop(), Some(Popped::Frame { epoch: 1, frame: 5 })));
    }

    #[test]
    fn close_releases_blocked_consumer() {
        let queue: Arc<FrameQueue<u8>> = Arc::new(FrameQueue::bounded(5));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop().is_none())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(consumer.join().unwrap());
        assert!(matches!(queue.push(1, 0), Err(PushError::Closed(1))));
    }
}
