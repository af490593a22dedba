//! Context and buffer pools shared by every connection task.
//!
//! `acquire` hands out an object by value and `release` takes it back, so a
//! pooled object has exactly one owner at any time. Released objects are
//! reset, and any buffer that grew past the retention ceiling is replaced by
//! a fresh allocation so one large request cannot inflate steady-state
//! memory.

use std::sync::Mutex;

use bytes::BytesMut;

use crate::config::PoolConfig;
use crate::http::context::Context;

pub struct ContextPool {
    idle: Mutex<Vec<Context>>,
    max_idle: usize,
    retention: usize,
}

impl ContextPool {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle: config.max_idle_contexts,
            retention: config.buffer_retention,
        }
    }

    /// Takes an empty context out of the pool, creating one if none is idle.
    pub fn acquire(&self) -> Context {
        let reused = self.lock().pop();
        match reused {
            Some(ctx) => ctx,
            None => {
                tracing::trace!("Allocating new context");
                Context::new()
            }
        }
    }

    /// Returns a context to the pool. It must not be used afterwards; the
    /// move enforces that.
    pub fn release(&self, mut ctx: Context) {
        ctx.recycle(self.retention);
        let mut idle = self.lock();
        if idle.len() < self.max_idle {
            idle.push(ctx);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Context>> {
        // the guarded Vec stays consistent even if a holder panicked
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Pool of read buffers of a fixed working size.
pub struct BufferPool {
    idle: Mutex<Vec<BytesMut>>,
    buffer_size: usize,
    max_idle: usize,
    retention: usize,
}

impl BufferPool {
    pub fn new(buffer_size: usize, config: &PoolConfig) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            buffer_size,
            max_idle: config.max_idle_contexts,
            retention: config.buffer_retention.max(buffer_size),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Takes an empty buffer with at least `buffer_size` capacity.
    pub fn acquire(&self) -> BytesMut {
        let reused = self.lock().pop();
        let mut buf = reused.unwrap_or_default();
        buf.reserve(self.buffer_size);
        buf
    }

    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        if buf.capacity() > self.retention {
            return;
        }
        let mut idle = self.lock();
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BytesMut>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig {
            max_idle_contexts: 2,
            buffer_retention: 1024,
        }
    }

    #[test]
    fn pool_caps_idle_contexts() {
        let pool = ContextPool::new(&config());
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn oversized_buffers_are_not_retained() {
        let pool = BufferPool::new(256, &config());
        let mut big = pool.acquire();
        big.reserve(64 * 1024);
        pool.release(big);
        assert_eq!(pool.idle_count(), 0);

        let small = pool.acquire();
        assert!(small.capacity() >= 256);
        pool.release(small);
        assert_eq!(pool.idle_count(), 1);
    }
}
