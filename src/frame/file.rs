// CLASSIFICATION: COMMUNITY
// Filename: file.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! File bindings for file-driven scopes.

extern crate alloc;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

static NEXT_FILE_ID: AtomicU32 = AtomicU32::new(1);

/// Byte offset within a command file.
pub type FilePosition = u32;

/// Identity of a top-level file, used by the host link to tell which frames
/// came from the same print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileId(u32);

impl FileId {
    /// No file.
    pub const NONE: FileId = FileId(0);

    /// Wrap a raw identifier.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw identifier.
    #[must_use]
    pub const fn into_raw(self) -> u32 {
        self.0
    }

    /// The identifier names a file.
    #[must_use]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Fresh identifier, unique across channels until the counter wraps.
    pub fn allocate() -> Self {
        loop {
            let raw = NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed);
            if raw != 0 {
                return Self(raw);
            }
        }
    }
}

/// Readable file behind a file-driven scope.
pub trait ByteSource: Send {
    /// Rewind to the start and drop any buffered state.
    fn reset(&mut self);
    /// Move the read position. Returns false if the position is out of range.
    fn seek(&mut self, position: FilePosition) -> bool;
    /// Current read position.
    fn position(&self) -> FilePosition;
    /// Release the underlying handle.
    fn close(&mut self);
}

/// Shared handle to a byte source. Hosts may keep their own clone to read
/// from; only frame bindings count towards closing it.
pub type SharedSource = Arc<Mutex<dyn ByteSource>>;

/// Wrap a concrete source into a [`SharedSource`].
pub fn share<S: ByteSource + 'static>(source: S) -> SharedSource {
    Arc::new(Mutex::new(source))
}

/// Buffered reader feeding a channel from its current file. Resetting it
/// drops read-ahead that belongs to a cursor being abandoned.
pub trait FileInput: Send {
    /// Discard any bytes buffered ahead of `cursor`.
    fn reset(&mut self, cursor: &FileCursor);
}

/// One frame binding of a local source. Clones share the binding count, so
/// the source is closed when the last frame lets go of it, whatever other
/// handles to the source are still alive.
#[derive(Clone)]
pub struct LocalFile {
    source: SharedSource,
    bindings: Arc<()>,
}

impl LocalFile {
    /// The bound source.
    #[must_use]
    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    /// Frames currently bound to this source.
    #[must_use]
    pub fn bindings(&self) -> usize {
        Arc::strong_count(&self.bindings)
    }
}

/// How a scope is bound to its file.
#[derive(Clone)]
pub enum FileCursor {
    /// File read locally through a byte source.
    Local(LocalFile),
    /// File streamed by an attached host; only its identity is known here.
    Remote(FileId),
}

impl core::fmt::Debug for FileCursor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Local(file) => write!(
                f,
                "Local(@{}, {} bindings)",
                file.source.lock().position(),
                file.bindings()
            ),
            Self::Remote(id) => write!(f, "Remote({})", id.into_raw()),
        }
    }
}

impl FileCursor {
    /// Bind a local source.
    #[must_use]
    pub fn local(source: SharedSource) -> Self {
        Self::Local(LocalFile {
            source,
            bindings: Arc::new(()),
        })
    }

    /// Read position, if the file is local.
    #[must_use]
    pub fn position(&self) -> Option<FilePosition> {
        match self {
            Self::Local(file) => Some(file.source.lock().position()),
            Self::Remote(_) => None,
        }
    }

    /// Rewind and seek a local file. Returns false for remote files or
    /// out-of-range positions.
    pub fn restart_at(&self, position: FilePosition) -> bool {
        match self {
            Self::Local(file) => {
                let mut guard = file.source.lock();
                guard.reset();
                guard.seek(position)
            }
            Self::Remote(_) => false,
        }
    }

    /// Drop this binding, closing the source if no other frame holds it.
    pub fn close(self) {
        if let Self::Local(file) = self {
            if file.bindings() == 1 {
                file.source.lock().close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    struct Counting {
        pos: FilePosition,
        closes: Arc<AtomicU32>,
    }

    impl ByteSource for Counting {
        fn reset(&mut self) {
            self.pos = 0;
        }
        fn seek(&mut self, position: FilePosition) -> bool {
            self.pos = position;
            true
        }
        fn position(&self) -> FilePosition {
            self.pos
        }
        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn last_binding_closes_source() {
        let closes = Arc::new(AtomicU32::new(0));
        let source = share(Counting {
            pos: 0,
            closes: closes.clone(),
        });
        let a = FileCursor::local(source);
        let b = a.clone();
        a.close();
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        assert!(b.restart_at(17));
        assert_eq!(b.position(), Some(17));
        b.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn outside_handles_do_not_keep_the_source_open() {
        let closes = Arc::new(AtomicU32::new(0));
        let source = share(Counting {
            pos: 0,
            closes: closes.clone(),
        });
        let held = source.clone();
        let cursor = FileCursor::local(source);
        cursor.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(held.lock().position(), 0);
    }

    #[test]
    fn remote_cursor_has_no_position() {
        let cursor = FileCursor::Remote(FileId::from_raw(4));
        assert_eq!(cursor.position(), None);
        assert!(!cursor.restart_at(0));
    }
}
