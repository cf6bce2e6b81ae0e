// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Parser capability contract shared by the text and binary transports.
//!
//! A [`Channel`](crate::channel::Channel) owns one backend per transport and
//! routes every query to whichever produced the command currently loaded.
//! Handlers therefore see the same answers whether a command arrived as a
//! line of text or as a binary record.

pub mod binary;
pub mod number;
pub mod string;

extern crate alloc;
use alloc::string::String;
use core::fmt;
use core::net::Ipv4Addr;

use thiserror::Error;

use crate::frame::FilePosition;

pub use binary::{BinaryCode, BinaryParser, ParamKind};
pub use string::{FileStore, FileWriteError, StringParser};

/// Wire encoding a command arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Human-readable G-code lines.
    #[default]
    Text,
    /// Compact binary records from a host link.
    Binary,
}

/// Life cycle of the command held by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    /// Nothing buffered.
    #[default]
    Idle,
    /// Part of a command has been received.
    Receiving,
    /// A complete command is waiting to be decoded.
    Ready,
    /// The command has been decoded and is being executed.
    Executing,
}

/// Six-byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Errors surfaced while extracting values from a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no command is being executed")]
    NotExecuting,
    #[error("value requested without a preceding parameter letter")]
    MissingParameter,
    #[error("invalid number after '{0}'")]
    BadNumber(char),
    #[error("invalid IP address")]
    BadIpAddress,
    #[error("invalid MAC address")]
    BadMacAddress,
    #[error("expected a quoted string")]
    ExpectedQuotedString,
    #[error("unterminated quoted string")]
    UnterminatedString,
    #[error("checksum mismatch")]
    BadChecksum,
    #[error("checksum required")]
    MissingChecksum,
    #[error("binary record truncated")]
    Truncated,
    #[error("unknown binary parameter type {0}")]
    UnknownParameterType(u8),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("command line too long")]
    LineTooLong,
    #[error("{0} is not supported on this transport")]
    Unsupported(&'static str),
    #[error("wrong number of values after '{letter}', expected {expected}")]
    Arity { letter: char, expected: usize },
}

/// Operations every transport backend provides.
///
/// Value getters read the parameter selected by the last successful
/// [`seen`](GCodeParser::seen) call and consume that selection.
pub trait GCodeParser: Send {
    /// Drop the current command and return to [`ParserState::Idle`].
    fn init(&mut self);

    /// Replace the current command with `data`. The command becomes
    /// [`ParserState::Ready`] when `data` holds a complete command.
    fn put(&mut self, data: &[u8]);

    /// Move a ready command into execution, decoding its header.
    fn decode_command(&mut self) -> Result<(), ParseError>;

    /// Current life-cycle state.
    fn state(&self) -> ParserState;

    /// Command letter (`G`, `M`, `T`), if a command is executing.
    fn command_letter(&self) -> Option<char>;
    /// Whether the command letter was followed by a number.
    fn has_command_number(&self) -> bool;
    /// Command number, e.g. `28` for `G28`.
    fn command_number(&self) -> Option<i32>;
    /// Sub-number after the dot, e.g. `1` for `M98.1`.
    fn command_fraction(&self) -> Option<i8>;

    /// Look for parameter `letter` and select it for the next getter.
    fn seen(&mut self, letter: char) -> bool;

    /// Float after the selected letter.
    fn get_float(&mut self) -> Result<f32, ParseError>;
    /// Signed integer after the selected letter.
    fn get_int(&mut self) -> Result<i32, ParseError>;
    /// Unsigned integer after the selected letter.
    fn get_uint(&mut self) -> Result<u32, ParseError>;
    /// Dotted IPv4 address after the selected letter.
    fn get_ip_address(&mut self) -> Result<Ipv4Addr, ParseError>;
    /// Hardware address after the selected letter.
    fn get_mac_address(&mut self) -> Result<MacAddress, ParseError>;

    /// Quoted string after the selected letter.
    fn get_quoted_string(&mut self) -> Result<String, ParseError>;
    /// String after the command number with no parameter letter.
    fn get_unquoted_string(&mut self) -> Result<String, ParseError>;
    /// String after the selected letter, quoted or not.
    fn get_possibly_quoted_string(&mut self) -> Result<String, ParseError>;
    /// Quoted string lower-cased with spaces, `_` and `-` removed.
    fn get_reduced_string(&mut self) -> Result<String, ParseError>;

    /// Colon-separated floats after the selected letter.
    ///
    /// Writes up to `out.len()` values and returns how many were supplied,
    /// which may exceed `out.len()`. With `pad` set and fewer values than
    /// `out.len()`, the last value is repeated and `out.len()` returned.
    fn get_float_array(&mut self, out: &mut [f32], pad: bool) -> Result<usize, ParseError>;
    /// Colon-separated integers; see [`get_float_array`](GCodeParser::get_float_array).
    fn get_int_array(&mut self, out: &mut [i32], pad: bool) -> Result<usize, ParseError>;
    /// Colon-separated unsigned integers; see [`get_float_array`](GCodeParser::get_float_array).
    fn get_uint_array(&mut self, out: &mut [u32], pad: bool) -> Result<usize, ParseError>;

    /// Nothing ready or executing.
    fn is_idle(&self) -> bool {
        !matches!(self.state(), ParserState::Ready | ParserState::Executing)
    }
    /// Nothing buffered at all.
    fn is_completely_idle(&self) -> bool {
        self.state() == ParserState::Idle
    }
    /// A complete command waits to be decoded.
    fn is_ready(&self) -> bool {
        self.state() == ParserState::Ready
    }
    /// A command is executing.
    fn is_executing(&self) -> bool {
        self.state() == ParserState::Executing
    }

    /// Finish the executing command (`true`) or rewind it so it is executed
    /// again on the next pass (`false`).
    fn set_finished(&mut self, finished: bool);

    /// File offset the current command was read from, if known.
    fn file_position(&self) -> Option<FilePosition>;

    /// Raw bytes of the current command.
    fn data(&self) -> &[u8];

    /// Short form of the command, e.g. `G1` or `M98.1`.
    fn print_command(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Full reconstruction of the command for logs.
    fn append_full_command(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Internal state dump.
    fn diagnostics(&self, out: &mut dyn fmt::Write) -> fmt::Result;
}

/// Operations only the text transport offers.
pub trait TextParser: GCodeParser {
    /// This backend through the shared contract.
    fn as_gcode(&self) -> &dyn GCodeParser;
    /// Mutable form of [`as_gcode`](TextParser::as_gcode).
    fn as_gcode_mut(&mut self) -> &mut dyn GCodeParser;

    /// Append one received character. Returns true when a complete command
    /// is now ready.
    fn put_char(&mut self, c: u8) -> bool;

    /// The file feeding this parser hit end of stream; a trailing line
    /// without terminator becomes a command. A text upload still open is
    /// closed, and a failure to flush it is returned.
    fn file_ended(&mut self) -> Result<(), FileWriteError>;

    /// Serial-line options (checksum requirement and similar).
    fn set_comms_properties(&mut self, properties: u32);

    /// Start diverting received lines into a file.
    fn open_file_to_write(
        &mut self,
        directory: &str,
        file_name: &str,
        size: FilePosition,
        binary: bool,
    ) -> Result<(), FileWriteError>;

    /// Lines are being diverted into a file.
    fn is_writing_file(&self) -> bool;

    /// Write the current line to the open file.
    fn write_to_file(&mut self) -> Result<(), FileWriteError>;

    /// Raw bytes are being diverted into a file.
    fn is_writing_binary(&self) -> bool;

    /// Write one raw byte to the open file.
    fn write_binary_to_file(&mut self, byte: u8) -> Result<(), FileWriteError>;

    /// Close the file opened for raw writing.
    fn finish_writing_binary(&mut self) -> Result<(), FileWriteError>;

    /// Record the file offset of the line being assembled. Cleared when the
    /// command finishes.
    fn set_file_position(&mut self, position: Option<FilePosition>);
}
