// CLASSIFICATION: COMMUNITY
// Filename: host_link.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Host-link extension.
//!
//! When a channel is driven by an attached host that owns the file system,
//! the channel cannot open macro files itself. It posts the request here and
//! the host polls, streams the file back through [`Channel::put`] and ends
//! the macro with a pop or an abort. The host also watches for stack
//! changes and abort requests.

extern crate alloc;
use alloc::string::String;

use log::info;

use super::Channel;
use crate::frame::{FileCursor, FileId};

/// Flags and requests exchanged with an attached host.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostLink {
    requested_macro: Option<String>,
    report_missing: bool,
    abort_requested: bool,
    stack_event: bool,
}

impl HostLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending macro request and whether a missing file should be reported.
    pub fn requested_macro_file(&self) -> Option<(&str, bool)> {
        self.requested_macro
            .as_deref()
            .map(|name| (name, self.report_missing))
    }

    /// Remove the pending macro request.
    pub fn take_macro_request(&mut self) -> Option<(String, bool)> {
        let report_missing = self.report_missing;
        self.report_missing = false;
        self.requested_macro.take().map(|name| (name, report_missing))
    }

    #[must_use]
    pub fn is_abort_requested(&self) -> bool {
        self.abort_requested
    }

    pub fn acknowledge_abort(&mut self) {
        self.abort_requested = false;
    }

    /// The stack shape changed since the host last looked.
    #[must_use]
    pub fn is_stack_event_flagged(&self) -> bool {
        self.stack_event
    }

    pub fn acknowledge_stack_event(&mut self) {
        self.stack_event = false;
    }

    pub(crate) fn flag_stack_event(&mut self) {
        self.stack_event = true;
    }

    pub(crate) fn set_abort_requested(&mut self, requested: bool) {
        self.abort_requested = requested;
    }
}

impl Channel {
    /// Ask the host to run macro `name` in the current scope.
    ///
    /// The top frame becomes file-driven under a fresh [`FileId`] and any
    /// pending abort is withdrawn. Returns false when the channel has no
    /// host link.
    pub fn request_macro_file(&mut self, name: &str, report_missing: bool) -> bool {
        let Some(link) = self.host_link.as_mut() else {
            return false;
        };
        link.requested_macro = Some(String::from(name));
        link.report_missing = report_missing;
        link.abort_requested = false;

        let id = FileId::allocate();
        let top = self.nested.last_mut().unwrap_or(&mut self.root);
        top.open_file(FileCursor::Remote(id));
        top.file_id = id;
        top.file_finished = false;
        info!(
            "{}: requested macro {name} as file {}",
            self.identity.id,
            id.into_raw()
        );
        true
    }

    /// Mark every scope reading the top-level file as finished.
    pub fn set_print_finished(&mut self) {
        let id = self.root.file_id;
        for frame in core::iter::once(&mut self.root).chain(self.nested.iter_mut()) {
            if frame.file_id == id {
                frame.set_file_finished();
            }
        }
    }

    /// The file behind the current scope has ended.
    #[must_use]
    pub fn is_file_finished(&self) -> bool {
        self.top_frame().file_finished
    }
}
