// CLASSIFICATION: COMMUNITY
// Filename: stack.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Scope stack protocol: push, pop, abort and message acknowledgement.
//!
//! The root frame lives in the channel itself and is never handed to the
//! pool. Nested frames come from the shared [`FramePool`](crate::frame::FramePool)
//! and go back to it, top first, when popped.

use log::{debug, info, warn};
use thiserror::Error;

use super::Channel;
use crate::frame::{ExecutionFrame, PoolError};

/// Frames a channel may hold, counting the root.
pub const DEFAULT_MAX_STACK_DEPTH: usize = 8;

/// Reasons a push is refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    #[error("too many nested macros (max depth {max})")]
    DepthExceeded { max: usize },
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl Channel {
    /// Frames on the stack, counting the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.nested.len() + 1
    }

    /// Largest depth a push may reach.
    #[must_use]
    pub fn max_stack_depth(&self) -> usize {
        self.max_depth
    }

    /// Innermost scope.
    #[must_use]
    pub fn top_frame(&self) -> &ExecutionFrame {
        self.nested.last().unwrap_or(&self.root)
    }

    pub fn top_frame_mut(&mut self) -> &mut ExecutionFrame {
        self.nested.last_mut().unwrap_or(&mut self.root)
    }

    /// Outermost scope, which identifies the top-level file.
    #[must_use]
    pub fn original_frame(&self) -> &ExecutionFrame {
        &self.root
    }

    /// All frames from the root up.
    pub fn frames(&self) -> impl Iterator<Item = &ExecutionFrame> + '_ {
        core::iter::once(&self.root).chain(self.nested.iter())
    }

    fn frames_mut(&mut self) -> impl Iterator<Item = &mut ExecutionFrame> + '_ {
        core::iter::once(&mut self.root).chain(self.nested.iter_mut())
    }

    /// Open a nested scope inheriting the current one.
    ///
    /// Fails without touching the stack when the depth limit is reached or
    /// the pool is empty.
    pub fn push_frame(&mut self, preserve_line_number: bool) -> Result<(), StackError> {
        if self.depth() >= self.max_depth {
            warn!(
                "{}: push refused at depth {} (max {})",
                self.identity.id,
                self.depth(),
                self.max_depth
            );
            return Err(StackError::DepthExceeded {
                max: self.max_depth,
            });
        }
        let mut frame = self.pool.lock().acquire()?;
        frame.inherit_from(self.top_frame(), preserve_line_number);
        self.nested.push(frame);
        debug!("{}: pushed frame, depth {}", self.identity.id, self.depth());
        Ok(())
    }

    /// Close the innermost scope and hand its frame back to the pool.
    ///
    /// At the root nothing is popped and false is returned, but the root's
    /// acknowledgement state is cleared so a caller retrying the pop cannot
    /// stay stuck behind a message nobody will answer.
    pub fn pop_frame(&mut self, preserve_line_number: bool) -> bool {
        let Some(frame) = self.nested.pop() else {
            self.root.clear_acknowledgement();
            debug!("{}: pop at root absorbed", self.identity.id);
            return false;
        };
        if preserve_line_number {
            self.top_frame_mut().line_number = frame.line_number;
        }
        self.pool.lock().release(frame);
        if let Some(link) = self.host_link.as_mut() {
            link.flag_stack_event();
        }
        debug!("{}: popped frame, depth {}", self.identity.id, self.depth());
        true
    }

    /// Close and pop file-driven scopes until the top scope is not reading a
    /// file. Does nothing when no file is being read. With a host link,
    /// `request_abort` is published for the host.
    pub fn abort_file(&mut self, request_abort: bool) {
        let mut unwound = 0usize;
        while self.top_frame().doing_file() {
            let top = self.nested.last_mut().unwrap_or(&mut self.root);
            if let (Some(input), Some(cursor)) = (self.file_input.as_mut(), top.file()) {
                input.reset(cursor);
            }
            top.close_file();
            unwound += 1;
            if !self.pop_frame(false) {
                break;
            }
        }
        if unwound > 0 {
            info!("{}: aborted {unwound} file scope(s)", self.identity.id);
        }
        if let Some(link) = self.host_link.as_mut() {
            link.set_abort_requested(request_abort);
        }
    }

    /// Answer every scope waiting on a message, wherever it sits in the
    /// stack. Returns whether any scope was waiting.
    pub fn acknowledge_message(&mut self, cancelled: bool) -> bool {
        let mut answered = false;
        for frame in self.frames_mut() {
            answered |= frame.acknowledge(cancelled);
        }
        answered
    }
}
