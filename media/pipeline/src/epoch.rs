/*!
    Seek epochs and cancellation tokens.

    Every seek (and shutdown) advances the shared [`Epoch`]. Work started
    under an older generation holds an [`EpochToken`] that reports itself
    invalid from then on, and any timed wait on the token wakes immediately.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct EpochInner {
    generation: AtomicU64,
    lock: Mutex<()>,
    changed: Condvar,
}

/**
    Monotonic generation counter shared by every pipeline thread.
*/
#[derive(Clone)]
pub struct Epoch {
    inner: Arc<EpochInner>,
}

impl Epoch {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EpochInner {
                generation: AtomicU64::new(0),
                lock: Mutex::new(()),
                changed: Condvar::new(),
            }),
        }
    }

    /**
        The current generation.
    */
    pub fn current(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /**
        Capture a token bound to the current generation.
    */
    pub fn token(&self) -> EpochToken {
        EpochToken {
            generation: self.current(),
            inner: Arc::clone(&self.inner),
        }
    }

    /**
        Start a new generation, invalidating all outstanding tokens and
        waking everything waiting on them. Returns the new generation.
    */
    pub fn advance(&self) -> u64 {
        let _guard = self.inner.lock.lock();
        let next = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.changed.notify_all();
        next
    }

    /**
        Block until the generation differs from `generation`, or `timeout`
        elapses. Returns true if the generation changed.
    */
    pub fn wait_for_change(&self, generation: u64, timeout: Duration) -> bool {
        let token = EpochToken {
            generation,
            inner: Arc::clone(&self.inner),
        };
        !token.wait_timeout(timeout)
    }
}

impl Default for Epoch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Epoch").field(&self.current()).finish()
    }
}

/**
    Cancellation token for work started under one epoch generation.
*/
pub struct EpochToken {
    generation: u64,
    inner: Arc<EpochInner>,
}

impl EpochToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /**
        Returns true while no seek or shutdown has happened since the token
        was captured.
    */
    pub fn is_live(&self) -> bool {
        self.inner.generation.load(Ordering::Acquire) == self.generation
    }

    /**
        Sleep for up to `timeout`, waking early if the token is invalidated.

        Returns true if the token is still live after the wait.
    */
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait_forever();
        };
        let mut guard = self.inner.lock.lock();
        while self.is_live() {
            if self
                .inner
                .changed
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                break;
            }
        }
        self.is_live()
    }

    fn wait_forever(&self) -> bool {
        let mut guard = self.inner.lock.lock();
        while self.is_live() {
            self.inner.changed.wait(&mut guard);
        }
        false
    }
}

impl std::fmt::Debug for EpochToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochToken")
            .field("generation", &self.generation)
            .field("live", &self.is_live())
            .finish()
    }
}

static_assertions::assert_impl_all!(Epoch: Send, Sync, Clone);
static_assertions::assert_impl_all!(EpochToken: Send, Sync);
