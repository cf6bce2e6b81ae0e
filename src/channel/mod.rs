// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Per-channel command source.
//!
//! A [`Channel`] owns the scope stack of one input (serial console, file
//! player, host link) and the two parser backends. Every value query goes to
//! whichever backend was fed last, so command handlers are written once for
//! both transports.

pub mod host_link;
pub mod stack;

extern crate alloc;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::net::Ipv4Addr;

use log::{debug, error};

use crate::frame::{ExecutionFrame, FileInput, FilePosition, FramePool, SharedFramePool};
use crate::parser::{
    BinaryParser, FileWriteError, GCodeParser, MacAddress, ParseError, ParserState,
    StringParser, TextParser, Transport,
};
use crate::reply::{LogSink, MessageType, ReplySink};
use crate::timer::{Clock, DwellTimer, MonotonicClock};

pub use host_link::HostLink;
pub use stack::{StackError, DEFAULT_MAX_STACK_DEPTH};

/// Millimetres per inch.
pub const INCH_TO_MM: f32 = 25.4;

/// Normalise a PWM value given either as a fraction or on the legacy
/// 0..=255 scale.
#[must_use]
pub fn normalize_pwm(value: f32) -> f32 {
    let value = if value > 1.0 { value / 255.0 } else { value };
    value.clamp(0.0, 1.0)
}

/// Fixed properties of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    /// Name used in logs and replies.
    pub id: String,
    /// Route for replies to text commands.
    pub text_route: MessageType,
    /// Route for replies to binary commands.
    pub binary_route: MessageType,
    /// Commands may be queued for deferred execution.
    pub queue_codes: bool,
    /// Added to every tool number this channel names.
    pub tool_number_adjust: i32,
}

impl ChannelIdentity {
    pub fn new(id: impl Into<String>, text_route: MessageType) -> Self {
        Self {
            id: id.into(),
            text_route,
            binary_route: text_route,
            queue_codes: false,
            tool_number_adjust: 0,
        }
    }
}

/// Command source for one input.
pub struct Channel {
    identity: ChannelIdentity,
    text: Box<dyn TextParser>,
    binary: Box<dyn GCodeParser>,
    transport: Transport,
    root: ExecutionFrame,
    nested: Vec<ExecutionFrame>,
    pool: SharedFramePool,
    max_depth: usize,
    clock: Arc<dyn Clock>,
    dwell: DwellTimer,
    replies: Arc<dyn ReplySink>,
    file_input: Option<Box<dyn FileInput>>,
    host_link: Option<HostLink>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.identity.id)
            .field("transport", &self.transport)
            .field("depth", &self.depth())
            .field("host_link", &self.host_link)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Channel with the reference backends, the process-wide frame pool, the
    /// wall clock and replies sent to the log.
    pub fn new(identity: ChannelIdentity) -> Self {
        Self {
            identity,
            text: Box::new(StringParser::new()),
            binary: Box::new(BinaryParser::new()),
            transport: Transport::Text,
            root: ExecutionFrame::new(),
            nested: Vec::with_capacity(DEFAULT_MAX_STACK_DEPTH - 1),
            pool: FramePool::global(),
            max_depth: DEFAULT_MAX_STACK_DEPTH,
            clock: Arc::new(MonotonicClock::new()),
            dwell: DwellTimer::new(),
            replies: Arc::new(LogSink),
            file_input: None,
            host_link: None,
        }
    }

    /// Replace the text backend.
    pub fn with_text_parser(mut self, parser: Box<dyn TextParser>) -> Self {
        self.text = parser;
        self
    }

    /// Replace the binary backend.
    pub fn with_binary_parser(mut self, parser: Box<dyn GCodeParser>) -> Self {
        self.binary = parser;
        self
    }

    /// Draw frames from `pool` and allow at most `max_depth` frames,
    /// counting the root. A depth of zero is treated as one.
    pub fn with_pool(mut self, pool: SharedFramePool, max_depth: usize) -> Self {
        self.pool = pool;
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reply_sink(mut self, sink: Arc<dyn ReplySink>) -> Self {
        self.replies = sink;
        self
    }

    /// Attach the buffered reader used by file-driven scopes.
    pub fn with_file_input(mut self, input: Box<dyn FileInput>) -> Self {
        self.file_input = Some(input);
        self
    }

    /// Enable the host-link extension.
    pub fn with_host_link(mut self) -> Self {
        self.host_link = Some(HostLink::new());
        self
    }

    pub fn identity(&self) -> &ChannelIdentity {
        &self.identity
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Transport of the command loaded last.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn tool_number_adjust(&self) -> i32 {
        self.identity.tool_number_adjust
    }

    pub fn set_tool_number_adjust(&mut self, adjust: i32) {
        self.identity.tool_number_adjust = adjust;
    }

    pub fn host_link(&self) -> Option<&HostLink> {
        self.host_link.as_ref()
    }

    pub fn host_link_mut(&mut self) -> Option<&mut HostLink> {
        self.host_link.as_mut()
    }

    fn active(&self) -> &dyn GCodeParser {
        match self.transport {
            Transport::Text => self.text.as_gcode(),
            Transport::Binary => self.binary.as_ref(),
        }
    }

    fn active_mut(&mut self) -> &mut dyn GCodeParser {
        match self.transport {
            Transport::Text => self.text.as_gcode_mut(),
            Transport::Binary => self.binary.as_mut(),
        }
    }

    fn text_only(&self, operation: &str) -> bool {
        if self.transport == Transport::Binary {
            debug!("{}: {operation} ignored on binary transport", self.identity.id);
            return false;
        }
        true
    }

    /// Unwind to the root and clear both backends.
    pub fn reset(&mut self) {
        while self.pop_frame(false) {}
        self.text.init();
        self.binary.init();
        self.transport = Transport::Text;
        self.dwell.cancel();
        debug!("{}: reset", self.identity.id);
    }

    /// Load a complete command in either encoding.
    pub fn put(&mut self, data: &[u8], binary: bool) {
        if binary {
            self.transport = Transport::Binary;
            self.binary.put(data);
        } else {
            self.transport = Transport::Text;
            self.text.put(data);
        }
    }

    /// Load a complete text command.
    pub fn put_str(&mut self, line: &str) {
        self.put(line.as_bytes(), false);
    }

    /// Feed one character of text. Returns true when a command is ready.
    pub fn put_char(&mut self, c: u8) -> bool {
        self.transport = Transport::Text;
        self.text.put_char(c)
    }

    /// The file feeding the text backend ended.
    pub fn on_source_file_ended(&mut self) -> Result<(), FileWriteError> {
        if self.transport == Transport::Text {
            self.text.file_ended()?;
        }
        Ok(())
    }

    pub fn decode_command(&mut self) -> Result<(), ParseError> {
        self.active_mut().decode_command()
    }

    pub fn state(&self) -> ParserState {
        self.active().state()
    }

    pub fn is_idle(&self) -> bool {
        self.active().is_idle()
    }

    pub fn is_completely_idle(&self) -> bool {
        self.active().is_completely_idle()
    }

    pub fn is_ready(&self) -> bool {
        self.active().is_ready()
    }

    pub fn is_executing(&self) -> bool {
        self.active().is_executing()
    }

    pub fn set_finished(&mut self, finished: bool) {
        self.active_mut().set_finished(finished);
    }

    pub fn command_letter(&self) -> Option<char> {
        self.active().command_letter()
    }

    pub fn has_command_number(&self) -> bool {
        self.active().has_command_number()
    }

    pub fn command_number(&self) -> Option<i32> {
        self.active().command_number()
    }

    pub fn command_fraction(&self) -> Option<i8> {
        self.active().command_fraction()
    }

    pub fn seen(&mut self, letter: char) -> bool {
        self.active_mut().seen(letter)
    }

    pub fn get_float(&mut self) -> Result<f32, ParseError> {
        self.active_mut().get_float()
    }

    pub fn get_int(&mut self) -> Result<i32, ParseError> {
        self.active_mut().get_int()
    }

    pub fn get_uint(&mut self) -> Result<u32, ParseError> {
        self.active_mut().get_uint()
    }

    pub fn get_ip_address(&mut self) -> Result<Ipv4Addr, ParseError> {
        self.active_mut().get_ip_address()
    }

    pub fn get_mac_address(&mut self) -> Result<MacAddress, ParseError> {
        self.active_mut().get_mac_address()
    }

    pub fn get_quoted_string(&mut self) -> Result<String, ParseError> {
        self.active_mut().get_quoted_string()
    }

    pub fn get_unquoted_string(&mut self) -> Result<String, ParseError> {
        self.active_mut().get_unquoted_string()
    }

    pub fn get_possibly_quoted_string(&mut self) -> Result<String, ParseError> {
        self.active_mut().get_possibly_quoted_string()
    }

    pub fn get_reduced_string(&mut self) -> Result<String, ParseError> {
        self.active_mut().get_reduced_string()
    }

    pub fn get_float_array(&mut self, out: &mut [f32], pad: bool) -> Result<usize, ParseError> {
        self.active_mut().get_float_array(out, pad)
    }

    pub fn get_int_array(&mut self, out: &mut [i32], pad: bool) -> Result<usize, ParseError> {
        self.active_mut().get_int_array(out, pad)
    }

    pub fn get_uint_array(&mut self, out: &mut [u32], pad: bool) -> Result<usize, ParseError> {
        self.active_mut().get_uint_array(out, pad)
    }

    /// If `letter` is present, read it into `value` and set `seen`.
    /// Otherwise leave both untouched.
    pub fn try_get_float(
        &mut self,
        letter: char,
        value: &mut f32,
        seen: &mut bool,
    ) -> Result<(), ParseError> {
        if self.seen(letter) {
            *value = self.get_float()?;
            *seen = true;
        }
        Ok(())
    }

    pub fn try_get_int(
        &mut self,
        letter: char,
        value: &mut i32,
        seen: &mut bool,
    ) -> Result<(), ParseError> {
        if self.seen(letter) {
            *value = self.get_int()?;
            *seen = true;
        }
        Ok(())
    }

    pub fn try_get_uint(
        &mut self,
        letter: char,
        value: &mut u32,
        seen: &mut bool,
    ) -> Result<(), ParseError> {
        if self.seen(letter) {
            *value = self.get_uint()?;
            *seen = true;
        }
        Ok(())
    }

    /// Integer flag: any value above zero is true.
    pub fn try_get_bool(
        &mut self,
        letter: char,
        value: &mut bool,
        seen: &mut bool,
    ) -> Result<(), ParseError> {
        if self.seen(letter) {
            *value = self.get_int()? > 0;
            *seen = true;
        }
        Ok(())
    }

    pub fn try_get_quoted_string(
        &mut self,
        letter: char,
        value: &mut String,
        seen: &mut bool,
    ) -> Result<(), ParseError> {
        if self.seen(letter) {
            *value = self.get_quoted_string()?;
            *seen = true;
        }
        Ok(())
    }

    pub fn try_get_possibly_quoted_string(
        &mut self,
        letter: char,
        value: &mut String,
        seen: &mut bool,
    ) -> Result<(), ParseError> {
        if self.seen(letter) {
            *value = self.get_possibly_quoted_string()?;
            *seen = true;
        }
        Ok(())
    }

    /// If `letter` is present, read exactly `out.len()` floats into `out`.
    ///
    /// With `pad` set a shorter list is extended by repeating its last value.
    /// Any other count is an [`ParseError::Arity`] error and leaves `seen`
    /// untouched.
    pub fn try_get_float_array(
        &mut self,
        letter: char,
        out: &mut [f32],
        seen: &mut bool,
        pad: bool,
    ) -> Result<(), ParseError> {
        if self.seen(letter) {
            let count = self.get_float_array(out, pad)?;
            check_arity(letter, count, out.len())?;
            *seen = true;
        }
        Ok(())
    }

    pub fn try_get_int_array(
        &mut self,
        letter: char,
        out: &mut [i32],
        seen: &mut bool,
        pad: bool,
    ) -> Result<(), ParseError> {
        if self.seen(letter) {
            let count = self.get_int_array(out, pad)?;
            check_arity(letter, count, out.len())?;
            *seen = true;
        }
        Ok(())
    }

    pub fn try_get_uint_array(
        &mut self,
        letter: char,
        out: &mut [u32],
        seen: &mut bool,
        pad: bool,
    ) -> Result<(), ParseError> {
        if self.seen(letter) {
            let count = self.get_uint_array(out, pad)?;
            check_arity(letter, count, out.len())?;
            *seen = true;
        }
        Ok(())
    }

    /// Distance after the selected letter, in millimetres.
    pub fn get_distance(&mut self) -> Result<f32, ParseError> {
        let value = self.get_float()?;
        Ok(self.convert_distance(value))
    }

    /// Convert a distance in the current unit to millimetres.
    #[must_use]
    pub fn convert_distance(&self, distance: f32) -> f32 {
        if self.top_frame().using_inches() {
            distance * INCH_TO_MM
        } else {
            distance
        }
    }

    /// Convert millimetres to the current unit.
    #[must_use]
    pub fn inverse_convert_distance(&self, distance: f32) -> f32 {
        if self.top_frame().using_inches() {
            distance / INCH_TO_MM
        } else {
            distance
        }
    }

    /// PWM frequency after the selected letter, clamped to 1..=65535 Hz.
    pub fn get_pwm_frequency(&mut self) -> Result<u32, ParseError> {
        Ok(self.get_uint()?.clamp(1, 65535))
    }

    /// PWM duty after the selected letter; see [`normalize_pwm`].
    pub fn get_pwm_value(&mut self) -> Result<f32, ParseError> {
        Ok(normalize_pwm(self.get_float()?))
    }

    /// Poll a non-blocking wait of `duration_ms`. The first call starts the
    /// wait; the call that observes it elapsed returns true and rearms.
    pub fn dwell(&mut self, duration_ms: u32) -> bool {
        self.dwell.poll(self.clock.now_millis(), duration_ms)
    }

    /// Commands from this channel may be queued.
    #[must_use]
    pub fn can_queue_commands(&self) -> bool {
        self.identity.queue_codes || self.top_frame().running_macro()
    }

    /// Reply route for the command loaded last.
    #[must_use]
    pub fn response_message_type(&self) -> MessageType {
        match self.transport {
            Transport::Text => self.identity.text_route,
            Transport::Binary => self.identity.binary_route | MessageType::BINARY_CODE_REPLY,
        }
    }

    /// Send an error reply on this channel's route.
    pub fn report_error(&self, text: &str) {
        error!("{}: {text}", self.identity.id);
        self.replies.send(
            self.response_message_type() | MessageType::ERROR,
            &format!("Error: {text}"),
        );
    }

    /// File offset the current command came from.
    pub fn file_position(&self) -> Option<FilePosition> {
        self.active().file_position()
    }

    /// Rewind the current file to `position` and drop the pending command.
    /// Returns false when the top scope has no local file to seek.
    pub fn restart_from(&mut self, position: FilePosition) -> bool {
        let top = self.nested.last().unwrap_or(&self.root);
        let restarted = match top.file() {
            Some(cursor) => {
                if let Some(input) = self.file_input.as_mut() {
                    input.reset(cursor);
                }
                cursor.restart_at(position)
            }
            None => false,
        };
        self.text.init();
        self.binary.init();
        restarted
    }

    /// Raw bytes of the current command.
    pub fn data(&self) -> &[u8] {
        self.active().data()
    }

    pub fn print_command(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.active().print_command(out)
    }

    pub fn append_full_command(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.active().append_full_command(out)
    }

    pub fn diagnostics(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "{}: {:?} transport, depth {}/{}, dwell {}",
            self.identity.id,
            self.transport,
            self.depth(),
            self.max_depth,
            if self.dwell.is_running() { "running" } else { "idle" }
        )?;
        self.active().diagnostics(out)
    }

    pub fn set_comms_properties(&mut self, properties: u32) {
        if self.text_only("set_comms_properties") {
            self.text.set_comms_properties(properties);
        }
    }

    pub fn set_file_position(&mut self, position: Option<FilePosition>) {
        if self.text_only("set_file_position") {
            self.text.set_file_position(position);
        }
    }

    pub fn open_file_to_write(
        &mut self,
        directory: &str,
        file_name: &str,
        size: FilePosition,
        binary: bool,
    ) -> Result<(), FileWriteError> {
        if !self.text_only("open_file_to_write") {
            return Err(FileWriteError::Unsupported);
        }
        self.text.open_file_to_write(directory, file_name, size, binary)
    }

    pub fn is_writing_file(&self) -> bool {
        self.transport == Transport::Text && self.text.is_writing_file()
    }

    pub fn write_to_file(&mut self) -> Result<(), FileWriteError> {
        if !self.text_only("write_to_file") {
            return Err(FileWriteError::Unsupported);
        }
        self.text.write_to_file()
    }

    pub fn is_writing_binary(&self) -> bool {
        self.transport == Transport::Text && self.text.is_writing_binary()
    }

    pub fn write_binary_to_file(&mut self, byte: u8) -> Result<(), FileWriteError> {
        if !self.text_only("write_binary_to_file") {
            return Err(FileWriteError::Unsupported);
        }
        self.text.write_binary_to_file(byte)
    }

    pub fn finish_writing_binary(&mut self) -> Result<(), FileWriteError> {
        if !self.text_only("finish_writing_binary") {
            return Err(FileWriteError::Unsupported);
        }
        self.text.finish_writing_binary()
    }
}

fn check_arity(letter: char, count: usize, expected: usize) -> Result<(), ParseError> {
    if count == expected {
        Ok(())
    } else {
        Err(ParseError::Arity {
            letter: letter.to_ascii_uppercase(),
            expected,
        })
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        while self.pop_frame(false) {}
        self.root.close_file();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pwm_normalisation() {
        assert_eq!(normalize_pwm(0.5), 0.5);
        assert!((normalize_pwm(128.0) - 0.502).abs() < 0.001);
        assert_eq!(normalize_pwm(300.0), 1.0);
        assert_eq!(normalize_pwm(-1.0), 0.0);
    }

    #[test]
    fn arity_message_names_letter_and_count() {
        let err = check_arity('x', 4, 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "wrong number of values after 'X', expected 3"
        );
        assert!(check_arity('X', 3, 3).is_ok());
    }

    #[test]
    fn binary_replies_are_marked() {
        let mut identity = ChannelIdentity::new("aux", MessageType::AUX);
        identity.binary_route = MessageType::HTTP;
        let mut channel = Channel::new(identity).with_pool(FramePool::shared(2), 3);
        assert_eq!(channel.response_message_type(), MessageType::AUX);
        channel.put(&crate::parser::BinaryCode::new('M', 115).encode(), true);
        assert_eq!(
            channel.response_message_type(),
            MessageType::HTTP | MessageType::BINARY_CODE_REPLY
        );
    }
}
