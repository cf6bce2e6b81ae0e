// CLASSIFICATION: COMMUNITY
// Filename: pool.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Fixed-capacity frame pool shared by all channels.
//!
//! Frames are allocated up front and recycled through a free list, so the
//! number of nested scopes across the whole system is bounded by the pool
//! capacity. Channels hold their frames by value while live and hand them
//! back on pop.

extern crate alloc;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, error};
use once_cell::sync::Lazy;
use spin::Mutex;
use thiserror::Error;

use super::ExecutionFrame;

/// Capacity of the process-wide pool.
pub const DEFAULT_POOL_CAPACITY: usize = 16;

/// Errors returned by [`FramePool`] operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("frame pool exhausted (capacity {capacity})")]
    Exhausted { capacity: usize },
}

/// Pool handle shared between channels.
pub type SharedFramePool = Arc<Mutex<FramePool>>;

static GLOBAL_POOL: Lazy<SharedFramePool> =
    Lazy::new(|| FramePool::shared(DEFAULT_POOL_CAPACITY));

/// Recycling allocator for [`ExecutionFrame`]s.
#[derive(Debug)]
pub struct FramePool {
    free: Vec<ExecutionFrame>,
    in_use: usize,
    capacity: usize,
}

impl FramePool {
    /// Create a pool holding `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let mut free = Vec::with_capacity(capacity);
        free.resize_with(capacity, ExecutionFrame::default);
        Self {
            free,
            in_use: 0,
            capacity,
        }
    }

    /// Create a pool wrapped for sharing.
    pub fn shared(capacity: usize) -> SharedFramePool {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// The process-wide pool used by channels built without an explicit one.
    pub fn global() -> SharedFramePool {
        GLOBAL_POOL.clone()
    }

    /// Take a cleared frame from the pool.
    pub fn acquire(&mut self) -> Result<ExecutionFrame, PoolError> {
        match self.free.pop() {
            Some(frame) => {
                self.in_use += 1;
                Ok(frame)
            }
            None => {
                error!("frame pool exhausted: {} frames in use", self.in_use);
                Err(PoolError::Exhausted {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Hand a frame back. Its file binding is closed and its state cleared.
    pub fn release(&mut self, mut frame: ExecutionFrame) {
        frame.clear();
        if self.free.len() < self.capacity {
            self.free.push(frame);
        }
        self.in_use = self.in_use.saturating_sub(1);
        debug!("frame released, {} in use", self.in_use);
    }

    /// Total frames the pool manages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames currently handed out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Frames ready to be handed out.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ModeFlags;

    #[test]
    fn exhausts_at_capacity() {
        let mut pool = FramePool::new(2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(
            pool.acquire().unwrap_err(),
            PoolError::Exhausted { capacity: 2 }
        );
        pool.release(a);
        assert_eq!(pool.available(), 1);
        pool.release(b);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn released_frames_come_back_clean() {
        let mut pool = FramePool::new(1);
        let mut frame = pool.acquire().unwrap();
        frame.modes = ModeFlags::USING_INCHES;
        frame.line_number = 9;
        pool.release(frame);
        let frame = pool.acquire().unwrap();
        assert!(frame.modes.is_empty());
        assert_eq!(frame.line_number, 0);
    }
}
