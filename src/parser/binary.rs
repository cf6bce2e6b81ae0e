// CLASSIFICATION: COMMUNITY
// Filename: binary.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Reference binary backend and record encoder.
//!
//! A record is a 12-byte header followed by one 8-byte slot per parameter
//! and then the variable-length data of array and string parameters, each
//! padded to four bytes. All integers are little-endian.
//!
//! ```text
//! header: letter u8 | flags u8 | param_count u8 | fraction i8 | number i32 | file_position u32
//! slot:   letter u8 | kind u8  | count u16     | value [u8; 4]
//! ```
//!
//! `count` is the element count of an array or the byte length of a string
//! and is ignored for scalars. The string that follows a command without a
//! parameter letter is stored under [`UNPRECEDENTED_LETTER`].

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::net::Ipv4Addr;

use bitflags::bitflags;
use log::debug;

use super::number;
use super::{GCodeParser, MacAddress, ParseError, ParserState};
use crate::frame::FilePosition;

/// Header length in bytes.
pub const HEADER_LEN: usize = 12;
/// Parameter slot length in bytes.
pub const SLOT_LEN: usize = 8;
/// Slot letter of a string with no parameter letter.
pub const UNPRECEDENTED_LETTER: u8 = b'@';

bitflags! {
    /// Header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordFlags: u8 {
        const HAS_NUMBER = 0b0000_0001;
        const HAS_FRACTION = 0b0000_0010;
        const HAS_FILE_POSITION = 0b0000_0100;
    }
}

/// Encoding of one parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParamKind {
    Int = 0,
    Uint = 1,
    Float = 2,
    IntArray = 3,
    UintArray = 4,
    FloatArray = 5,
    String = 6,
}

impl TryFrom<u8> for ParamKind {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Int,
            1 => Self::Uint,
            2 => Self::Float,
            3 => Self::IntArray,
            4 => Self::UintArray,
            5 => Self::FloatArray,
            6 => Self::String,
            other => return Err(ParseError::UnknownParameterType(other)),
        })
    }
}

impl ParamKind {
    fn is_scalar(self) -> bool {
        matches!(self, Self::Int | Self::Uint | Self::Float)
    }

    fn data_len(self, count: u16) -> usize {
        match self {
            Self::Int | Self::Uint | Self::Float => 0,
            Self::IntArray | Self::UintArray | Self::FloatArray => usize::from(count) * 4,
            Self::String => usize::from(count),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    letter: u8,
    kind: ParamKind,
    count: u16,
    value: [u8; 4],
    data: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Header {
    letter: Option<char>,
    number: Option<i32>,
    fraction: Option<i8>,
    file_position: Option<FilePosition>,
}

/// Numeric element read from a slot, before conversion.
#[derive(Debug, Clone, Copy)]
enum Element {
    Int(i32),
    Uint(u32),
    Float(f32),
}

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

/// Binary G-code backend.
#[derive(Debug, Default)]
pub struct BinaryParser {
    buffer: Vec<u8>,
    state: ParserState,
    header: Header,
    slots: Vec<Slot>,
    selected: Option<usize>,
}

impl BinaryParser {
    /// Empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_slots(&mut self) -> Result<(), ParseError> {
        let bytes = self.buffer.as_slice();
        if bytes.len() < HEADER_LEN {
            return Err(ParseError::Truncated);
        }
        let flags = RecordFlags::from_bits_truncate(bytes[1]);
        let param_count = usize::from(bytes[2]);
        let letter = bytes[0];
        self.header = Header {
            letter: letter
                .is_ascii_alphabetic()
                .then(|| char::from(letter.to_ascii_uppercase())),
            number: flags
                .contains(RecordFlags::HAS_NUMBER)
                .then(|| le_u32(&bytes[4..8]) as i32),
            fraction: flags
                .contains(RecordFlags::HAS_FRACTION)
                .then(|| bytes[3] as i8),
            file_position: flags
                .contains(RecordFlags::HAS_FILE_POSITION)
                .then(|| le_u32(&bytes[8..12])),
        };

        let table_end = HEADER_LEN + param_count * SLOT_LEN;
        if bytes.len() < table_end {
            return Err(ParseError::Truncated);
        }
        let mut data = table_end;
        let mut slots = Vec::with_capacity(param_count);
        for raw in bytes[HEADER_LEN..table_end].chunks_exact(SLOT_LEN) {
            let kind = ParamKind::try_from(raw[1])?;
            let count = u16::from_le_bytes([raw[2], raw[3]]);
            let mut value = [0u8; 4];
            value.copy_from_slice(&raw[4..8]);
            slots.push(Slot {
                letter: raw[0].to_ascii_uppercase(),
                kind,
                count,
                value,
                data,
            });
            data += pad4(kind.data_len(count));
        }
        let unpadded = slots
            .last()
            .map_or(table_end, |s| s.data + s.kind.data_len(s.count));
        if bytes.len() < unpadded {
            return Err(ParseError::Truncated);
        }
        self.slots = slots;
        Ok(())
    }

    fn take_slot(&mut self) -> Result<Slot, ParseError> {
        if self.state != ParserState::Executing {
            return Err(ParseError::NotExecuting);
        }
        let index = self.selected.take().ok_or(ParseError::MissingParameter)?;
        self.slots
            .get(index)
            .copied()
            .ok_or(ParseError::MissingParameter)
    }

    fn element(&self, slot: &Slot, index: usize) -> Element {
        let raw = if slot.kind.is_scalar() {
            u32::from_le_bytes(slot.value)
        } else {
            le_u32(&self.buffer[slot.data + index * 4..])
        };
        match slot.kind {
            ParamKind::Int | ParamKind::IntArray => Element::Int(raw as i32),
            ParamKind::Uint | ParamKind::UintArray => Element::Uint(raw),
            _ => Element::Float(f32::from_bits(raw)),
        }
    }

    fn elements(&self, slot: &Slot) -> Result<usize, ParseError> {
        match slot.kind {
            ParamKind::String => Err(ParseError::BadNumber(char::from(slot.letter))),
            kind if kind.is_scalar() => Ok(1),
            _ => Ok(usize::from(slot.count)),
        }
    }

    fn string(&self, slot: &Slot) -> Result<String, ParseError> {
        if slot.kind != ParamKind::String {
            return Err(ParseError::ExpectedQuotedString);
        }
        let bytes = &self.buffer[slot.data..slot.data + usize::from(slot.count)];
        core::str::from_utf8(bytes)
            .map(String::from)
            .map_err(|_| ParseError::InvalidUtf8)
    }

    fn array<T: Copy>(
        &mut self,
        out: &mut [T],
        pad: bool,
        convert: fn(Element) -> Option<T>,
    ) -> Result<usize, ParseError> {
        let slot = self.take_slot()?;
        let supplied = self.elements(&slot)?;
        for i in 0..supplied {
            let value = convert(self.element(&slot, i))
                .ok_or(ParseError::BadNumber(char::from(slot.letter)))?;
            if let Some(dst) = out.get_mut(i) {
                *dst = value;
            }
        }
        Ok(number::pad_tail(out, supplied, pad))
    }

    fn scalar<T>(&mut self, convert: fn(Element) -> Option<T>) -> Result<T, ParseError> {
        let slot = self.take_slot()?;
        if !slot.kind.is_scalar() {
            return Err(ParseError::BadNumber(char::from(slot.letter)));
        }
        convert(self.element(&slot, 0)).ok_or(ParseError::BadNumber(char::from(slot.letter)))
    }

    fn write_slot(&self, slot: &Slot, out: &mut dyn fmt::Write) -> fmt::Result {
        if slot.kind == ParamKind::String {
            let text = self.string(slot).unwrap_or_default();
            if slot.letter == UNPRECEDENTED_LETTER {
                return out.write_str(&text);
            }
            out.write_char(char::from(slot.letter))?;
            out.write_char('"')?;
            out.write_str(&text.replace('"', "\"\""))?;
            return out.write_char('"');
        }
        out.write_char(char::from(slot.letter))?;
        let count = self.elements(slot).unwrap_or(0);
        for i in 0..count {
            if i > 0 {
                out.write_char(':')?;
            }
            match self.element(slot, i) {
                Element::Int(v) => write!(out, "{v}")?,
                Element::Uint(v) => write!(out, "{v}")?,
                Element::Float(v) => write!(out, "{v}")?,
            }
        }
        Ok(())
    }
}

fn to_f32(e: Element) -> Option<f32> {
    Some(match e {
        Element::Int(v) => v as f32,
        Element::Uint(v) => v as f32,
        Element::Float(v) => v,
    })
}

// Floats round to the nearest integer; out-of-range and non-finite values fail.
fn to_i32(e: Element) -> Option<i32> {
    match e {
        Element::Int(v) => Some(v),
        Element::Uint(v) => i32::try_from(v).ok(),
        Element::Float(v) => {
            let r = v.round();
            (r >= i32::MIN as f32 && r < -(i32::MIN as f32)).then_some(r as i32)
        }
    }
}

fn to_u32(e: Element) -> Option<u32> {
    match e {
        Element::Int(v) => u32::try_from(v).ok(),
        Element::Uint(v) => Some(v),
        Element::Float(v) => {
            let r = v.round();
            (r >= 0.0 && r < u32::MAX as f32).then_some(r as u32)
        }
    }
}

impl GCodeParser for BinaryParser {
    fn init(&mut self) {
        self.buffer.clear();
        self.state = ParserState::Idle;
        self.header = Header::default();
        self.slots.clear();
        self.selected = None;
    }

    fn put(&mut self, data: &[u8]) {
        self.init();
        if data.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(data);
        self.state = ParserState::Ready;
    }

    fn decode_command(&mut self) -> Result<(), ParseError> {
        if self.state != ParserState::Ready {
            return Err(ParseError::NotExecuting);
        }
        self.state = ParserState::Executing;
        let result = self.decode_slots();
        if let Err(err) = &result {
            debug!("rejecting binary record of {} bytes: {err}", self.buffer.len());
            self.slots.clear();
        }
        result
    }

    fn state(&self) -> ParserState {
        self.state
    }

    fn command_letter(&self) -> Option<char> {
        if self.state == ParserState::Executing {
            self.header.letter
        } else {
            None
        }
    }

    fn has_command_number(&self) -> bool {
        self.command_number().is_some()
    }

    fn command_number(&self) -> Option<i32> {
        self.command_letter().and(self.header.number)
    }

    fn command_fraction(&self) -> Option<i8> {
        self.command_letter().and(self.header.fraction)
    }

    fn seen(&mut self, letter: char) -> bool {
        self.selected = None;
        if self.state != ParserState::Executing || !letter.is_ascii_alphabetic() {
            return false;
        }
        let wanted = letter.to_ascii_uppercase() as u8;
        self.selected = self.slots.iter().position(|s| s.letter == wanted);
        self.selected.is_some()
    }

    fn get_float(&mut self) -> Result<f32, ParseError> {
        self.scalar(to_f32)
    }

    fn get_int(&mut self) -> Result<i32, ParseError> {
        self.scalar(to_i32)
    }

    fn get_uint(&mut self) -> Result<u32, ParseError> {
        self.scalar(to_u32)
    }

    fn get_ip_address(&mut self) -> Result<Ipv4Addr, ParseError> {
        let slot = self.take_slot()?;
        match slot.kind {
            ParamKind::Uint => Ok(Ipv4Addr::from(slot.value)),
            ParamKind::String => {
                number::ipv4(&self.string(&slot)?).ok_or(ParseError::BadIpAddress)
            }
            _ => Err(ParseError::BadIpAddress),
        }
    }

    fn get_mac_address(&mut self) -> Result<MacAddress, ParseError> {
        let slot = self.take_slot()?;
        let text = self.string(&slot).map_err(|_| ParseError::BadMacAddress)?;
        number::mac(&text).ok_or(ParseError::BadMacAddress)
    }

    fn get_quoted_string(&mut self) -> Result<String, ParseError> {
        let slot = self.take_slot()?;
        self.string(&slot)
    }

    fn get_unquoted_string(&mut self) -> Result<String, ParseError> {
        if self.state != ParserState::Executing {
            return Err(ParseError::NotExecuting);
        }
        self.selected = None;
        let slot = self
            .slots
            .iter()
            .find(|s| s.letter == UNPRECEDENTED_LETTER)
            .copied()
            .ok_or(ParseError::MissingParameter)?;
        self.string(&slot)
    }

    fn get_possibly_quoted_string(&mut self) -> Result<String, ParseError> {
        self.get_quoted_string()
    }

    fn get_reduced_string(&mut self) -> Result<String, ParseError> {
        self.get_quoted_string().map(|s| number::reduce(&s))
    }

    fn get_float_array(&mut self, out: &mut [f32], pad: bool) -> Result<usize, ParseError> {
        self.array(out, pad, to_f32)
    }

    fn get_int_array(&mut self, out: &mut [i32], pad: bool) -> Result<usize, ParseError> {
        self.array(out, pad, to_i32)
    }

    fn get_uint_array(&mut self, out: &mut [u32], pad: bool) -> Result<usize, ParseError> {
        self.array(out, pad, to_u32)
    }

    fn set_finished(&mut self, finished: bool) {
        if finished {
            self.init();
        } else {
            self.selected = None;
        }
    }

    fn file_position(&self) -> Option<FilePosition> {
        self.header.file_position
    }

    fn data(&self) -> &[u8] {
        &self.buffer
    }

    fn print_command(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        if let Some(letter) = self.command_letter() {
            out.write_char(letter)?;
            if let Some(n) = self.header.number {
                write!(out, "{n}")?;
            }
            if let Some(frac) = self.header.fraction {
                write!(out, ".{frac}")?;
            }
        }
        Ok(())
    }

    fn append_full_command(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.print_command(out)?;
        for slot in &self.slots {
            out.write_char(' ')?;
            self.write_slot(slot, out)?;
        }
        Ok(())
    }

    fn diagnostics(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "binary parser: state {:?}, {} bytes, {} parameters",
            self.state,
            self.buffer.len(),
            self.slots.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i32),
    Uint(u32),
    Float(f32),
    IntArray(Vec<i32>),
    UintArray(Vec<u32>),
    FloatArray(Vec<f32>),
    Str(String),
}

/// Builder for binary records.
///
/// Parameters beyond 255 and array elements beyond 65535 are dropped.
///
/// ```
/// use gcode_intake::parser::BinaryCode;
///
/// let record = BinaryCode::new('G', 1).float('X', 10.0).float('F', 3000.0).encode();
/// assert_eq!(record.len(), 12 + 2 * 8);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryCode {
    letter: char,
    number: Option<i32>,
    fraction: Option<i8>,
    file_position: Option<FilePosition>,
    params: Vec<(u8, Value)>,
}

impl BinaryCode {
    /// Command `letter` with `number`, e.g. `('G', 1)`.
    pub fn new(letter: char, number: i32) -> Self {
        Self {
            number: Some(number),
            ..Self::bare(letter)
        }
    }

    /// Command letter with no number, e.g. a bare `T`.
    pub fn bare(letter: char) -> Self {
        Self {
            letter,
            number: None,
            fraction: None,
            file_position: None,
            params: Vec::new(),
        }
    }

    pub fn fraction(mut self, fraction: i8) -> Self {
        self.fraction = Some(fraction);
        self
    }

    pub fn file_position(mut self, position: FilePosition) -> Self {
        self.file_position = Some(position);
        self
    }

    fn param(mut self, letter: char, value: Value) -> Self {
        self.params.push((letter.to_ascii_uppercase() as u8, value));
        self
    }

    pub fn int(self, letter: char, value: i32) -> Self {
        self.param(letter, Value::Int(value))
    }

    pub fn uint(self, letter: char, value: u32) -> Self {
        self.param(letter, Value::Uint(value))
    }

    pub fn float(self, letter: char, value: f32) -> Self {
        self.param(letter, Value::Float(value))
    }

    pub fn ints(self, letter: char, values: &[i32]) -> Self {
        self.param(letter, Value::IntArray(values.to_vec()))
    }

    pub fn uints(self, letter: char, values: &[u32]) -> Self {
        self.param(letter, Value::UintArray(values.to_vec()))
    }

    pub fn floats(self, letter: char, values: &[f32]) -> Self {
        self.param(letter, Value::FloatArray(values.to_vec()))
    }

    pub fn string(self, letter: char, value: &str) -> Self {
        self.param(letter, Value::Str(String::from(value)))
    }

    /// IPv4 address stored as a uint holding the octets in order.
    pub fn ip(self, letter: char, addr: Ipv4Addr) -> Self {
        self.param(letter, Value::Uint(u32::from_le_bytes(addr.octets())))
    }

    /// String with no parameter letter, as in `M23 job.gcode`.
    pub fn unprecedented(mut self, value: &str) -> Self {
        self.params
            .push((UNPRECEDENTED_LETTER, Value::Str(String::from(value))));
        self
    }

    /// Serialise the record.
    pub fn encode(&self) -> Vec<u8> {
        let params = &self.params[..self.params.len().min(usize::from(u8::MAX))];
        let mut flags = RecordFlags::empty();
        flags.set(RecordFlags::HAS_NUMBER, self.number.is_some());
        flags.set(RecordFlags::HAS_FRACTION, self.fraction.is_some());
        flags.set(RecordFlags::HAS_FILE_POSITION, self.file_position.is_some());

        let mut out = Vec::with_capacity(HEADER_LEN + params.len() * SLOT_LEN);
        out.push(self.letter.to_ascii_uppercase() as u8);
        out.push(flags.bits());
        out.push(params.len() as u8);
        out.push(self.fraction.unwrap_or(0) as u8);
        out.extend_from_slice(&self.number.unwrap_or(0).to_le_bytes());
        out.extend_from_slice(&self.file_position.unwrap_or(0).to_le_bytes());

        let mut data = Vec::new();
        for (letter, value) in params {
            let (kind, count, scalar) = encode_value(value, &mut data);
            out.push(*letter);
            out.push(kind as u8);
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&scalar.to_le_bytes());
        }
        out.extend_from_slice(&data);
        out
    }
}

fn push_words<T: Copy>(data: &mut Vec<u8>, values: &[T], word: fn(T) -> [u8; 4]) -> u16 {
    let values = &values[..values.len().min(usize::from(u16::MAX))];
    for v in values {
        data.extend_from_slice(&word(*v));
    }
    values.len() as u16
}

fn encode_value(value: &Value, data: &mut Vec<u8>) -> (ParamKind, u16, u32) {
    match value {
        Value::Int(v) => (ParamKind::Int, 0, *v as u32),
        Value::Uint(v) => (ParamKind::Uint, 0, *v),
        Value::Float(v) => (ParamKind::Float, 0, v.to_bits()),
        Value::IntArray(v) => (ParamKind::IntArray, push_words(data, v, i32::to_le_bytes), 0),
        Value::UintArray(v) => (ParamKind::UintArray, push_words(data, v, u32::to_le_bytes), 0),
        Value::FloatArray(v) => (ParamKind::FloatArray, push_words(data, v, f32::to_le_bytes), 0),
        Value::Str(s) => {
            let bytes = &s.as_bytes()[..s.len().min(usize::from(u16::MAX))];
            data.extend_from_slice(bytes);
            data.resize(pad4(data.len()), 0);
            (ParamKind::String, bytes.len() as u16, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executing(code: BinaryCode) -> BinaryParser {
        let mut p = BinaryParser::new();
        p.put(&code.encode());
        p.decode_command().expect("decode");
        p
    }

    #[test]
    fn decodes_header() {
        let p = executing(BinaryCode::new('m', 98).fraction(1).file_position(512));
        assert_eq!(p.command_letter(), Some('M'));
        assert_eq!(p.command_number(), Some(98));
        assert_eq!(p.command_fraction(), Some(1));
        assert_eq!(p.file_position(), Some(512));

        let p = executing(BinaryCode::bare('T'));
        assert_eq!(p.command_letter(), Some('T'));
        assert!(!p.has_command_number());
        assert_eq!(p.file_position(), None);
    }

    #[test]
    fn scalar_conversions() {
        let mut p = executing(
            BinaryCode::new('G', 1)
                .float('X', 10.4)
                .int('Y', -3)
                .uint('S', 0x8000_0000)
                .float('Q', -0.6)
                .float('R', f32::NAN)
                .float('U', 5e9),
        );
        assert!(p.seen('y'));
        assert_eq!(p.get_float().unwrap(), -3.0);
        assert!(p.seen('Y'));
        assert_eq!(p.get_uint(), Err(ParseError::BadNumber('Y')));
        assert!(p.seen('X'));
        assert_eq!(p.get_int().unwrap(), 10);
        assert!(p.seen('X'));
        assert_eq!(p.get_uint().unwrap(), 10);
        assert!(p.seen('Q'));
        assert_eq!(p.get_int().unwrap(), -1);
        assert!(p.seen('Q'));
        assert_eq!(p.get_uint(), Err(ParseError::BadNumber('Q')));
        assert!(p.seen('R'));
        assert_eq!(p.get_int(), Err(ParseError::BadNumber('R')));
        assert!(p.seen('U'));
        assert_eq!(p.get_uint(), Err(ParseError::BadNumber('U')));
        assert!(p.seen('S'));
        assert_eq!(p.get_uint().unwrap(), 0x8000_0000);
        assert!(!p.seen('Z'));
    }

    #[test]
    fn arrays_and_strings() {
        let mut p = executing(
            BinaryCode::new('M', 92)
                .floats('E', &[400.0, 415.0])
                .string('P', "a\"b")
                .unprecedented("job.gcode"),
        );
        assert!(p.seen('E'));
        let mut out = [0.0f32; 3];
        assert_eq!(p.get_float_array(&mut out, true).unwrap(), 3);
        assert_eq!(out, [400.0, 415.0, 415.0]);
        assert!(p.seen('P'));
        assert_eq!(p.get_quoted_string().unwrap(), "a\"b");
        assert_eq!(p.get_unquoted_string().unwrap(), "job.gcode");

        let mut full = String::new();
        p.append_full_command(&mut full).unwrap();
        assert_eq!(full, "M92 E400:415 P\"a\"\"b\" job.gcode");
    }

    #[test]
    fn ip_address_from_uint() {
        let addr = Ipv4Addr::new(192, 168, 1, 10);
        let mut p = executing(BinaryCode::new('M', 552).ip('P', addr));
        assert!(p.seen('P'));
        assert_eq!(p.get_ip_address().unwrap(), addr);
    }

    #[test]
    fn rejects_truncated_and_unknown_kinds() {
        let mut record = BinaryCode::new('M', 587).string('S', "net").encode();
        record.truncate(record.len() - 4);
        let mut p = BinaryParser::new();
        p.put(&record);
        assert_eq!(p.decode_command(), Err(ParseError::Truncated));
        assert!(!p.seen('S'));

        let mut record = BinaryCode::new('G', 1).int('X', 1).encode();
        record[HEADER_LEN + 1] = 42;
        p.put(&record);
        assert_eq!(p.decode_command(), Err(ParseError::UnknownParameterType(42)));
        p.set_finished(true);
        assert!(p.is_completely_idle());
    }
}
