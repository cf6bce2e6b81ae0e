// CLASSIFICATION: COMMUNITY
// Filename: string.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Reference text backend.
//!
//! Lines are assembled one byte at a time. Comments (`;` to end of line and
//! `( ... )`) are dropped outside quotes, a leading `N<n>` line number is
//! recorded, and an optional `*<xor>` checksum is verified against the raw
//! bytes the host sent, comments included. Lines are kept as bytes; strings
//! are checked for UTF-8 when extracted. Parameters are located by letter,
//! case-insensitively, outside quotes and braces.

extern crate alloc;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::net::Ipv4Addr;
use std::io::{self, Write};

use log::{debug, error, info, warn};
use thiserror::Error;

use super::number;
use super::{GCodeParser, MacAddress, ParseError, ParserState, TextParser};
use crate::frame::FilePosition;

/// Default longest line accepted, excluding the terminator.
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

/// Comms property bit: every line must carry a checksum.
pub const COMMS_REQUIRE_CHECKSUM: u32 = 0b1;

/// Storage the text backend writes uploaded files into.
pub trait FileStore: Send + Sync {
    /// Create (or truncate) `name` inside `directory`.
    fn create(&self, directory: &str, name: &str) -> io::Result<Box<dyn Write + Send>>;
}

/// Errors from the file-write passthrough.
#[derive(Debug, Error)]
pub enum FileWriteError {
    #[error("no file store attached")]
    NoFileStore,
    #[error("no file is open for writing")]
    NotWriting,
    #[error("file write failed: {0}")]
    Io(#[from] io::Error),
    #[error("file writing is not supported on this transport")]
    Unsupported,
}

struct Upload {
    sink: Box<dyn Write + Send>,
    binary: bool,
    remaining: FilePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comment {
    None,
    ToEndOfLine,
    Parenthesised,
}

/// Text G-code backend.
pub struct StringParser {
    buffer: Vec<u8>,
    max_line_len: usize,
    state: ParserState,
    in_quotes: bool,
    comment: Comment,
    overflowed: bool,
    checksum: u8,
    star: Option<(usize, u8)>,
    line_number: Option<u32>,
    letter: Option<char>,
    number: Option<i32>,
    fraction: Option<i8>,
    params_start: usize,
    params_end: usize,
    read_pointer: Option<usize>,
    file_position: Option<FilePosition>,
    comms_properties: u32,
    file_store: Option<Arc<dyn FileStore>>,
    upload: Option<Upload>,
}

impl Default for StringParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StringParser {
    /// Parser with the default line limit and no file store.
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Parser accepting lines up to `max_line_len` bytes.
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_line_len),
            max_line_len,
            state: ParserState::Idle,
            in_quotes: false,
            comment: Comment::None,
            overflowed: false,
            checksum: 0,
            star: None,
            line_number: None,
            letter: None,
            number: None,
            fraction: None,
            params_start: 0,
            params_end: 0,
            read_pointer: None,
            file_position: None,
            comms_properties: 0,
            file_store: None,
            upload: None,
        }
    }

    /// Attach storage for the file-write passthrough.
    pub fn set_file_store(&mut self, store: Arc<dyn FileStore>) {
        self.file_store = Some(store);
    }

    /// `N` line number of the executing command.
    #[must_use]
    pub fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    /// Serial-line options last set.
    #[must_use]
    pub fn comms_properties(&self) -> u32 {
        self.comms_properties
    }

    fn finish_line(&mut self) -> bool {
        self.in_quotes = false;
        self.comment = Comment::None;
        let trimmed = self.buffer.trim_ascii_end().len();
        self.buffer.truncate(trimmed);
        if self.buffer.trim_ascii_start().is_empty() && !self.overflowed {
            self.buffer.clear();
            self.checksum = 0;
            self.star = None;
            self.state = ParserState::Idle;
            return false;
        }
        self.state = ParserState::Ready;
        true
    }

    fn params(&self) -> &[u8] {
        &self.buffer[self.params_start..self.params_end]
    }

    /// Bytes following the selected letter, consuming the selection.
    fn take_value(&mut self) -> Result<(char, &[u8]), ParseError> {
        if self.state != ParserState::Executing {
            return Err(ParseError::NotExecuting);
        }
        let at = self.read_pointer.take().ok_or(ParseError::MissingParameter)?;
        let letter = self.buffer.get(at).map_or(' ', |&b| char::from(b));
        let value = self.buffer[at + 1..self.params_end].trim_ascii_start();
        Ok((letter, value))
    }

    /// End of the command body, verifying any `*` checksum.
    fn checked_body_end(&self) -> Result<usize, ParseError> {
        match self.star {
            Some((at, sum)) => {
                let expected = text_prefix(&self.buffer[at + 1..])
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| ParseError::BadChecksum)?;
                if sum != expected {
                    return Err(ParseError::BadChecksum);
                }
                Ok(at)
            }
            None if self.comms_properties & COMMS_REQUIRE_CHECKSUM != 0 => {
                Err(ParseError::MissingChecksum)
            }
            None => Ok(self.buffer.len()),
        }
    }

    fn decode_header(&mut self) -> Result<(), ParseError> {
        let body_end = self.checked_body_end()?;
        let line = self.buffer.as_slice();
        let mut pos = line.len() - line.trim_ascii_start().len();

        if pos < body_end && matches!(line[pos], b'N' | b'n') {
            if let Some((n, used)) = number::uint_prefix(text_prefix(&line[pos + 1..body_end])) {
                self.line_number = Some(n);
                pos += 1 + used;
                let rest = &line[pos..body_end];
                pos += rest.len() - rest.trim_ascii_start().len();
            }
        }

        if pos < body_end && line[pos].is_ascii_alphabetic() {
            self.letter = Some(char::from(line[pos].to_ascii_uppercase()));
            pos += 1;
            if let Some((n, used)) = number::int_prefix(text_prefix(&line[pos..body_end])) {
                self.number = Some(n);
                pos += used;
                if line.get(pos) == Some(&b'.') && line.get(pos + 1).is_some_and(u8::is_ascii_digit)
                {
                    let (frac, used) = number::int_prefix(text_prefix(&line[pos + 1..body_end]))
                        .ok_or(ParseError::BadNumber('.'))?;
                    let frac = i8::try_from(frac).map_err(|_| ParseError::BadNumber('.'))?;
                    self.fraction = Some(frac);
                    pos += 1 + used;
                }
            }
        }

        self.params_start = pos;
        self.params_end = body_end;
        Ok(())
    }

    fn close_upload(&mut self) -> Result<(), FileWriteError> {
        match self.upload.take() {
            Some(mut upload) => {
                upload.sink.flush()?;
                info!("file upload closed");
                Ok(())
            }
            None => Err(FileWriteError::NotWriting),
        }
    }

    fn backspace(&mut self) {
        if self.comment != Comment::None || self.overflowed {
            return;
        }
        let Some(b) = self.buffer.pop() else { return };
        match self.star {
            Some((at, sum)) if at == self.buffer.len() => {
                self.star = None;
                self.checksum = sum;
            }
            Some(_) => {}
            None => self.checksum ^= b,
        }
        if b == b'"' {
            self.in_quotes = !self.in_quotes;
        }
    }

    fn array<T: Copy>(
        &mut self,
        out: &mut [T],
        pad: bool,
        parse: fn(&str) -> Option<(T, usize)>,
    ) -> Result<usize, ParseError> {
        let (letter, value) = self.take_value()?;
        let mut rest = text_prefix(value);
        let mut supplied = 0;
        loop {
            let (value, used) = parse(rest.trim_start()).ok_or(ParseError::BadNumber(letter))?;
            if let Some(slot) = out.get_mut(supplied) {
                *slot = value;
            }
            supplied += 1;
            rest = rest.trim_start()[used..].trim_start();
            match rest.strip_prefix(':') {
                Some(next) => rest = next,
                None => break,
            }
        }
        Ok(number::pad_tail(out, supplied, pad))
    }
}

/// Longest UTF-8 prefix of `bytes`, for number parsing.
fn text_prefix(bytes: &[u8]) -> &str {
    match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}

fn owned(bytes: &[u8]) -> Result<String, ParseError> {
    core::str::from_utf8(bytes)
        .map(String::from)
        .map_err(|_| ParseError::InvalidUtf8)
}

/// Content of a quoted string starting at `s`, with `""` as an escaped quote.
fn quoted(s: &[u8]) -> Result<String, ParseError> {
    let body = s.strip_prefix(b"\"").ok_or(ParseError::ExpectedQuotedString)?;
    let mut out = Vec::new();
    let mut i = 0;
    while let Some(&b) = body.get(i) {
        if b == b'"' {
            if body.get(i + 1) == Some(&b'"') {
                out.push(b'"');
                i += 2;
                continue;
            }
            return String::from_utf8(out).map_err(|_| ParseError::InvalidUtf8);
        }
        out.push(b);
        i += 1;
    }
    Err(ParseError::UnterminatedString)
}

/// Offset of `wanted` in `params`, outside quotes and braces.
fn find_parameter(params: &[u8], wanted: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut brace_depth = 0u32;
    for (i, &b) in params.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'{' if !in_quotes => brace_depth += 1,
            b'}' if !in_quotes => brace_depth = brace_depth.saturating_sub(1),
            _ if in_quotes || brace_depth > 0 => {}
            _ if char::from(b.to_ascii_uppercase()) == wanted => {
                // an E straight after a digit is an exponent
                let exponent = wanted == 'E'
                    && i > 0
                    && (params[i - 1].is_ascii_digit() || params[i - 1] == b'.');
                if !exponent {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// First whitespace-delimited word with surrounding quotes removed.
fn token(s: &[u8]) -> Option<&str> {
    let end = s.iter().position(u8::is_ascii_whitespace).unwrap_or(s.len());
    let mut word = &s[..end];
    while let [b'"', rest @ ..] = word {
        word = rest;
    }
    while let [rest @ .., b'"'] = word {
        word = rest;
    }
    core::str::from_utf8(word).ok()
}

impl GCodeParser for StringParser {
    fn init(&mut self) {
        self.buffer.clear();
        self.state = ParserState::Idle;
        self.in_quotes = false;
        self.comment = Comment::None;
        self.overflowed = false;
        self.checksum = 0;
        self.star = None;
        self.line_number = None;
        self.letter = None;
        self.number = None;
        self.fraction = None;
        self.params_start = 0;
        self.params_end = 0;
        self.read_pointer = None;
        self.file_position = None;
    }

    fn put(&mut self, data: &[u8]) {
        self.init();
        for &b in data {
            if b == 0 {
                break;
            }
            if self.put_char(b) {
                return;
            }
        }
        let _ = self.put_char(b'\n');
    }

    fn decode_command(&mut self) -> Result<(), ParseError> {
        if self.state != ParserState::Ready {
            return Err(ParseError::NotExecuting);
        }
        self.state = ParserState::Executing;
        if self.overflowed {
            return Err(ParseError::LineTooLong);
        }
        self.decode_header()
    }

    fn state(&self) -> ParserState {
        self.state
    }

    fn command_letter(&self) -> Option<char> {
        if self.state == ParserState::Executing {
            self.letter
        } else {
            None
        }
    }

    fn has_command_number(&self) -> bool {
        self.command_number().is_some()
    }

    fn command_number(&self) -> Option<i32> {
        self.command_letter().and(self.number)
    }

    fn command_fraction(&self) -> Option<i8> {
        self.command_letter().and(self.fraction)
    }

    fn seen(&mut self, letter: char) -> bool {
        self.read_pointer = None;
        if self.state != ParserState::Executing {
            return false;
        }
        let found = find_parameter(self.params(), letter.to_ascii_uppercase());
        self.read_pointer = found.map(|i| self.params_start + i);
        found.is_some()
    }

    fn get_float(&mut self) -> Result<f32, ParseError> {
        let (letter, value) = self.take_value()?;
        number::float_prefix(text_prefix(value))
            .map(|(v, _)| v)
            .ok_or(ParseError::BadNumber(letter))
    }

    fn get_int(&mut self) -> Result<i32, ParseError> {
        let (letter, value) = self.take_value()?;
        number::int_prefix(text_prefix(value))
            .map(|(v, _)| v)
            .ok_or(ParseError::BadNumber(letter))
    }

    fn get_uint(&mut self) -> Result<u32, ParseError> {
        let (letter, value) = self.take_value()?;
        number::uint_prefix(text_prefix(value))
            .map(|(v, _)| v)
            .ok_or(ParseError::BadNumber(letter))
    }

    fn get_ip_address(&mut self) -> Result<Ipv4Addr, ParseError> {
        let (_, value) = self.take_value()?;
        token(value)
            .and_then(number::ipv4)
            .ok_or(ParseError::BadIpAddress)
    }

    fn get_mac_address(&mut self) -> Result<MacAddress, ParseError> {
        let (_, value) = self.take_value()?;
        token(value)
            .and_then(number::mac)
            .ok_or(ParseError::BadMacAddress)
    }

    fn get_quoted_string(&mut self) -> Result<String, ParseError> {
        let (_, value) = self.take_value()?;
        quoted(value)
    }

    fn get_unquoted_string(&mut self) -> Result<String, ParseError> {
        if self.state != ParserState::Executing {
            return Err(ParseError::NotExecuting);
        }
        self.read_pointer = None;
        let rest = self.params().trim_ascii();
        if rest.is_empty() {
            return Err(ParseError::MissingParameter);
        }
        if rest.starts_with(b"\"") {
            quoted(rest)
        } else {
            owned(rest)
        }
    }

    fn get_possibly_quoted_string(&mut self) -> Result<String, ParseError> {
        let (_, value) = self.take_value()?;
        if value.starts_with(b"\"") {
            quoted(value)
        } else {
            owned(value.trim_ascii_end())
        }
    }

    fn get_reduced_string(&mut self) -> Result<String, ParseError> {
        self.get_quoted_string().map(|s| number::reduce(&s))
    }

    fn get_float_array(&mut self, out: &mut [f32], pad: bool) -> Result<usize, ParseError> {
        self.array(out, pad, number::float_prefix)
    }

    fn get_int_array(&mut self, out: &mut [i32], pad: bool) -> Result<usize, ParseError> {
        self.array(out, pad, number::int_prefix)
    }

    fn get_uint_array(&mut self, out: &mut [u32], pad: bool) -> Result<usize, ParseError> {
        self.array(out, pad, number::uint_prefix)
    }

    fn set_finished(&mut self, finished: bool) {
        if finished {
            self.init();
        } else {
            self.read_pointer = None;
        }
    }

    fn file_position(&self) -> Option<FilePosition> {
        self.file_position
    }

    fn data(&self) -> &[u8] {
        &self.buffer
    }

    fn print_command(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        if let Some(letter) = self.command_letter() {
            out.write_char(letter)?;
            if let Some(n) = self.number {
                write!(out, "{n}")?;
            }
            if let Some(frac) = self.fraction {
                write!(out, ".{frac}")?;
            }
        }
        Ok(())
    }

    fn append_full_command(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        out.write_str(&String::from_utf8_lossy(self.buffer.trim_ascii()))
    }

    fn diagnostics(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "text parser: state {:?}, {} bytes buffered, line {:?}, upload {}",
            self.state,
            self.buffer.len(),
            self.line_number,
            match &self.upload {
                Some(u) if u.binary => "binary",
                Some(_) => "text",
                None => "none",
            }
        )
    }
}

impl TextParser for StringParser {
    fn as_gcode(&self) -> &dyn GCodeParser {
        self
    }

    fn as_gcode_mut(&mut self) -> &mut dyn GCodeParser {
        self
    }

    fn put_char(&mut self, c: u8) -> bool {
        match self.state {
            ParserState::Ready => return true,
            ParserState::Executing => {
                debug!("text parser busy, dropped byte {c:#04x}");
                return false;
            }
            _ => {}
        }
        match c {
            b'\n' | b'\r' | 0 => {
                if self.state == ParserState::Idle && self.buffer.is_empty() && !self.overflowed {
                    self.comment = Comment::None;
                    return false;
                }
                return self.finish_line();
            }
            0x08 | 0x7f => {
                self.backspace();
                return false;
            }
            _ => {}
        }
        self.state = ParserState::Receiving;
        let sum_before = self.checksum;
        if self.star.is_none() {
            self.checksum ^= c;
        }
        match self.comment {
            Comment::ToEndOfLine => return false,
            Comment::Parenthesised => {
                if c == b')' {
                    self.comment = Comment::None;
                }
                return false;
            }
            Comment::None => {}
        }
        if !self.in_quotes {
            match c {
                b';' => {
                    self.comment = Comment::ToEndOfLine;
                    return false;
                }
                b'(' => {
                    self.comment = Comment::Parenthesised;
                    return false;
                }
                _ => {}
            }
        }
        if c == b'"' {
            self.in_quotes = !self.in_quotes;
        }
        if c.is_ascii_control() && c != b'\t' {
            return false;
        }
        if self.buffer.len() >= self.max_line_len {
            if !self.overflowed {
                warn!("command line exceeds {} bytes, discarding", self.max_line_len);
            }
            self.overflowed = true;
            return false;
        }
        if c == b'*' && !self.in_quotes && self.star.is_none() {
            self.star = Some((self.buffer.len(), sum_before));
        }
        self.buffer.push(c);
        false
    }

    fn file_ended(&mut self) -> Result<(), FileWriteError> {
        if self.state == ParserState::Receiving {
            self.finish_line();
        }
        if self.upload.as_ref().is_some_and(|u| !u.binary) {
            warn!("file ended while uploading, closing upload");
            if let Err(e) = self.close_upload() {
                error!("upload lost at end of file: {e}");
                return Err(e);
            }
        }
        Ok(())
    }

    fn set_comms_properties(&mut self, properties: u32) {
        self.comms_properties = properties;
    }

    fn open_file_to_write(
        &mut self,
        directory: &str,
        file_name: &str,
        size: FilePosition,
        binary: bool,
    ) -> Result<(), FileWriteError> {
        let store = self.file_store.as_ref().ok_or(FileWriteError::NoFileStore)?;
        let sink = store.create(directory, file_name)?;
        info!("uploading {directory}/{file_name} ({size} bytes, binary {binary})");
        self.upload = Some(Upload {
            sink,
            binary,
            remaining: size,
        });
        Ok(())
    }

    fn is_writing_file(&self) -> bool {
        self.upload.is_some()
    }

    fn write_to_file(&mut self) -> Result<(), FileWriteError> {
        let line = self.buffer.trim_ascii();
        let is_end = line.len() >= 3
            && line[..3].eq_ignore_ascii_case(b"M29")
            && !line.get(3).is_some_and(u8::is_ascii_digit);
        let result = if is_end {
            self.close_upload()
        } else {
            let upload = self.upload.as_mut().ok_or(FileWriteError::NotWriting)?;
            upload.sink.write_all(line)?;
            upload.sink.write_all(b"\n")?;
            Ok(())
        };
        self.init();
        result
    }

    fn is_writing_binary(&self) -> bool {
        self.upload.as_ref().is_some_and(|u| u.binary)
    }

    fn write_binary_to_file(&mut self, byte: u8) -> Result<(), FileWriteError> {
        let upload = self.upload.as_mut().ok_or(FileWriteError::NotWriting)?;
        upload.sink.write_all(&[byte])?;
        if upload.remaining > 0 {
            upload.remaining -= 1;
            if upload.remaining == 0 {
                return self.finish_writing_binary();
            }
        }
        Ok(())
    }

    fn finish_writing_binary(&mut self) -> Result<(), FileWriteError> {
        self.close_upload()
    }

    fn set_file_position(&mut self, position: Option<FilePosition>) {
        self.file_position = position;
    }
}
