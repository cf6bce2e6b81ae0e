// CLASSIFICATION: COMMUNITY
// Filename: reply.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Reply routing for channel responses.

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;
use log::{error, info, warn};
use spin::Mutex;

bitflags! {
    /// Destinations and markers attached to an outgoing message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageType: u32 {
        const USB = 1 << 0;
        const AUX = 1 << 1;
        const HTTP = 1 << 2;
        const TELNET = 1 << 3;
        const LCD = 1 << 4;
        const LOG = 1 << 5;
        /// The message reports an error.
        const ERROR = 1 << 8;
        /// The message is a warning.
        const WARNING = 1 << 9;
        /// The reply answers a binary-transport command.
        const BINARY_CODE_REPLY = 1 << 10;
    }
}

impl MessageType {
    /// All destination bits.
    pub const DESTINATIONS: MessageType = MessageType::USB
        .union(MessageType::AUX)
        .union(MessageType::HTTP)
        .union(MessageType::TELNET)
        .union(MessageType::LCD)
        .union(MessageType::LOG);

    /// Destination named in configuration (`"usb"`, `"aux"`, ...).
    /// `"none"` maps to the empty route.
    pub fn from_route_name(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "none" => Self::empty(),
            "usb" => Self::USB,
            "aux" => Self::AUX,
            "http" => Self::HTTP,
            "telnet" => Self::TELNET,
            "lcd" => Self::LCD,
            "log" => Self::LOG,
            _ => return None,
        })
    }

    /// Destination bits only.
    #[must_use]
    pub fn destinations(self) -> Self {
        self.intersection(Self::DESTINATIONS)
    }
}

/// Receiver of channel replies.
pub trait ReplySink: Send + Sync {
    /// Deliver `message` to the destinations in `kind`.
    fn send(&self, kind: MessageType, message: &str);
}

/// Sink that forwards replies to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReplySink for LogSink {
    fn send(&self, kind: MessageType, message: &str) {
        if kind.contains(MessageType::ERROR) {
            error!("[{:?}] {message}", kind.destinations());
        } else if kind.contains(MessageType::WARNING) {
            warn!("[{:?}] {message}", kind.destinations());
        } else {
            info!("[{:?}] {message}", kind.destinations());
        }
    }
}

/// Sink that records replies for later inspection.
#[derive(Debug, Default)]
pub struct CaptureSink {
    messages: Mutex<Vec<(MessageType, String)>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far.
    pub fn messages(&self) -> Vec<(MessageType, String)> {
        self.messages.lock().clone()
    }

    /// Remove and return everything received so far.
    pub fn take(&self) -> Vec<(MessageType, String)> {
        core::mem::take(&mut *self.messages.lock())
    }
}

impl ReplySink for CaptureSink {
    fn send(&self, kind: MessageType, message: &str) {
        self.messages.lock().push((kind, String::from(message)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_names() {
        assert_eq!(MessageType::from_route_name("USB"), Some(MessageType::USB));
        assert_eq!(MessageType::from_route_name("none"), Some(MessageType::empty()));
        assert_eq!(MessageType::from_route_name("serial9"), None);
    }

    #[test]
    fn destinations_drop_markers() {
        let kind = MessageType::AUX | MessageType::ERROR | MessageType::BINARY_CODE_REPLY;
        assert_eq!(kind.destinations(), MessageType::AUX);
    }

    #[test]
    fn capture_sink_takes_messages() {
        let sink = CaptureSink::new();
        sink.send(MessageType::HTTP, "ok");
        assert_eq!(sink.take(), vec![(MessageType::HTTP, String::from("ok"))]);
        assert!(sink.messages().is_empty());
    }
}
