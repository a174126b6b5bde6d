/*!
    Recycled byte buffers for decoded frames.
*/

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Number of idle buffers kept for reuse before extra ones are freed.
const DEFAULT_RETAINED: usize = 32;

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    outstanding: AtomicUsize,
    retained: usize,
}

/**
    A shared pool of byte buffers.

    Decoders rent a [`PooledBuffer`] for every frame they produce. The buffer
    travels with its frame through the pipeline and goes back to the pool
    when whoever holds it last drops it, so a buffer is returned exactly once
    and can never be touched after it was returned.

    Cloning the pool is cheap and yields a handle to the same storage.
*/
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /**
        Create a pool that keeps up to 32 idle buffers around.
    */
    pub fn new() -> Self {
        Self::with_retained(DEFAULT_RETAINED)
    }

    /**
        Create a pool that keeps up to `retained` idle buffers around.
    */
    pub fn with_retained(retained: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                outstanding: AtomicUsize::new(0),
                retained,
            }),
        }
    }

    /**
        Rent a zero-filled buffer of exactly `len` bytes.

        An idle buffer with enough capacity is reused when one exists,
        otherwise a new allocation is made.
    */
    pub fn acquire(&self, len: usize) -> PooledBuffer {
        let reused = {
            let mut free = self.inner.free.lock();
            free.iter()
                .rposition(|buf| buf.capacity() >= len)
                .map(|index| free.swap_remove(index))
        };

        let mut data = reused.unwrap_or_else(|| Vec::with_capacity(len));
        data.clear();
        data.resize(len, 0);

        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        PooledBuffer {
            data,
            pool: Arc::clone(&self.inner),
        }
    }

    /**
        Rent a buffer holding a copy of `bytes`.
    */
    pub fn acquire_from(&self, bytes: &[u8]) -> PooledBuffer {
        let mut buffer = self.acquire(bytes.len());
        buffer.copy_from_slice(bytes);
        buffer
    }

    /**
        Number of buffers currently rented out and not yet returned.
    */
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /**
        Number of idle buffers waiting to be reused.
    */
    pub fn idle(&self) -> usize {
        self.inner.free.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("outstanding", &self.outstanding())
            .field("idle", &self.idle())
            .finish()
    }
}

/**
    A byte buffer rented from a [`BufferPool`].

    Dereferences to the frame bytes. Dropping it hands the allocation back
    to the pool.
*/
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /**
        Number of valid bytes in the buffer.
    */
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /**
        Returns true if the buffer holds no bytes.
    */
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.outstanding.fetch_sub(1, Ordering::AcqRel);

        let mut free = self.pool.free.lock();
        if free.len() < self.pool.retained && data.capacity() > 0 {
            free.push(data);
        }
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(BufferPool: Send, Sync, Clone);
static_assertions::assert_impl_all!(PooledBuffer: Send, Sync);
static_assertions::assert_not_impl_any!(PooledBuffer: Clone, Copy);
