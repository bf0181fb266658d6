use std::ops::{Deref, DerefMut};

use crossbeam::queue::ArrayQueue;

use crate::render::stack::State;
use crate::Value;

/// Buffers that grew beyond this are not kept.
const MAX_BUFFER_CAPACITY: usize = 64 * 1024;

/// A bounded pool of reusable interpreter states and output buffers.
///
/// Acquiring never blocks, if the pool is empty a fresh object is allocated.
/// Releasing drops the object if the pool is full. A pool with capacity
/// zero keeps nothing.
///
/// ```
/// use stencil::Pool;
///
/// let pool = Pool::new(4);
/// assert_eq!(pool.capacity(), 4);
/// assert_eq!(Pool::disabled().capacity(), 0);
/// ```
#[derive(Debug)]
pub struct Pool {
    inner: Option<Inner>,
}

#[derive(Debug)]
struct Inner {
    states: ArrayQueue<State>,
    buffers: ArrayQueue<Vec<u8>>,
}

/// A state on loan from a [`Pool`], returned reset when dropped.
pub(crate) struct PooledState<'a> {
    pool: &'a Pool,
    state: State,
}

impl Pool {
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            return Self::disabled();
        }
        Self {
            inner: Some(Inner {
                states: ArrayQueue::new(capacity),
                buffers: ArrayQueue::new(capacity),
            }),
        }
    }

    /// A pool that never keeps anything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// The maximum number of idle states, and separately buffers, kept.
    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| i.states.capacity())
    }

    /// The number of idle states currently held.
    pub fn idle_states(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| i.states.len())
    }

    /// The number of idle buffers currently held.
    pub fn idle_buffers(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| i.buffers.len())
    }

    pub(crate) fn acquire_state(&self, data: Value) -> PooledState<'_> {
        let mut state = match self.inner.as_ref().and_then(|i| i.states.pop()) {
            Some(state) => state,
            None => {
                log::trace!("state pool miss");
                State::default()
            }
        };
        state.init(data);
        PooledState { pool: self, state }
    }

    fn release_state(&self, mut state: State) {
        if let Some(inner) = &self.inner {
            state.reset();
            // Dropped if the pool is full.
            let _ = inner.states.push(state);
        }
    }

    pub(crate) fn acquire_buffer(&self) -> Vec<u8> {
        match self.inner.as_ref().and_then(|i| i.buffers.pop()) {
            Some(buf) => buf,
            None => {
                log::trace!("buffer pool miss");
                Vec::new()
            }
        }
    }

    pub(crate) fn release_buffer(&self, mut buf: Vec<u8>) {
        if let Some(inner) = &self.inner {
            if buf.capacity() > MAX_BUFFER_CAPACITY {
                return;
            }
            buf.clear();
            let _ = inner.buffers.push(buf);
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Deref for PooledState<'_> {
    type Target = State;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl DerefMut for PooledState<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl Drop for PooledState<'_> {
    fn drop(&mut self) {
        let state = std::mem::take(&mut self.state);
        self.pool.release_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reuses_states() {
        let pool = Pool::new(2);
        {
            let mut a = pool.acquire_state(Value::Integer(1));
            a.push(Value::None);
            let _b = pool.acquire_state(Value::None);
            let _c = pool.acquire_state(Value::None);
        }
        assert_eq!(pool.idle_states(), 2);
        let s = pool.acquire_state(Value::None);
        assert!(s.is_balanced());
        assert_eq!(pool.idle_states(), 1);
    }

    #[test]
    fn pool_disabled() {
        let pool = Pool::new(0);
        drop(pool.acquire_state(Value::None));
        pool.release_buffer(Vec::with_capacity(8));
        assert_eq!(pool.idle_states(), 0);
        assert_eq!(pool.idle_buffers(), 0);
    }

    #[test]
    fn pool_drops_large_buffers() {
        let pool = Pool::new(2);
        pool.release_buffer(Vec::with_capacity(MAX_BUFFER_CAPACITY + 1));
        assert_eq!(pool.idle_buffers(), 0);
        let mut buf = pool.acquire_buffer();
        buf.extend_from_slice(b"abc");
        pool.release_buffer(buf);
        assert_eq!(pool.idle_buffers(), 1);
        assert!(pool.acquire_buffer().is_empty());
    }

    #[test]
    fn pool_releases_on_panic() {
        let pool = Pool::new(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut s = pool.acquire_state(Value::None);
            s.pop();
            s.pop();
        }));
        assert!(result.is_err());
        assert_eq!(pool.idle_states(), 1);
    }
}
