// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.1
// Date Modified: 2026-10-16
// Author: Lukas Bower

//! Command intake for motion-control firmware.
//!
//! Each input channel (serial console, file player, host link) owns a
//! [`channel::Channel`]: a bounded stack of execution frames plus a text and
//! a binary parser behind one query surface.

/// Execution frames, file bindings and the shared frame pool
pub mod frame;

/// Parser capability contract and the reference text/binary backends
pub mod parser;

/// Channel command source and its stack protocol
pub mod channel;

/// Reply routing
pub mod reply;

/// Millisecond clocks and the dwell timer
pub mod timer;

/// TOML configuration
pub mod config;

pub use channel::{Channel, ChannelIdentity, StackError};
pub use config::{ConfigError, IntakeConfig};
pub use frame::ExecutionFrame;
pub use parser::{GCodeParser, ParseError, TextParser, Transport};
