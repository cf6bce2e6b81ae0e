// CLASSIFICATION: COMMUNITY
// Filename: test_channel_values.rs v0.1
// Date Modified: 2026-10-16
// Author: Lukas Bower

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use gcode_intake::channel::{normalize_pwm, Channel, ChannelIdentity, INCH_TO_MM};
use gcode_intake::frame::file::{share, ByteSource, FileCursor, FileInput, FilePosition};
use gcode_intake::frame::FramePool;
use gcode_intake::parser::{BinaryCode, FileStore, FileWriteError, ParseError, StringParser};
use gcode_intake::reply::{CaptureSink, MessageType};
use gcode_intake::timer::ManualClock;

fn channel() -> Channel {
    Channel::new(ChannelIdentity::new("usb", MessageType::USB)).with_pool(FramePool::shared(4), 4)
}

fn executing(line: &str) -> Channel {
    let mut ch = channel();
    ch.put_str(line);
    ch.decode_command().unwrap();
    ch
}

#[test]
fn short_arrays_pad_and_long_arrays_fail() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut ch = executing("M92 X1:2");
    let mut out = [0i32; 3];
    let mut seen = false;
    ch.try_get_int_array('X', &mut out, &mut seen, true).unwrap();
    assert!(seen);
    assert_eq!(out, [1, 2, 2]);

    let mut ch = executing("M92 X1:2:3:4");
    let mut out = [0i32; 3];
    let mut seen = false;
    let err = ch.try_get_int_array('x', &mut out, &mut seen, true).unwrap_err();
    assert_eq!(err, ParseError::Arity { letter: 'X', expected: 3 });
    assert_eq!(err.to_string(), "wrong number of values after 'X', expected 3");
    assert!(!seen);

    let mut ch = executing("M92 X1:2");
    let mut out = [0u32; 3];
    let mut seen = false;
    assert!(ch.try_get_uint_array('X', &mut out, &mut seen, false).is_err());
    assert!(!seen);
}

#[test]
fn absent_letters_leave_values_untouched() {
    let mut ch = executing("M106 P1 S0.5 H-1 C\"fan\"");
    let (mut speed, mut seen) = (7.0f32, false);
    ch.try_get_float('X', &mut speed, &mut seen).unwrap();
    assert_eq!((speed, seen), (7.0, false));
    ch.try_get_float('S', &mut speed, &mut seen).unwrap();
    assert_eq!((speed, seen), (0.5, true));

    let (mut fan, mut heater, mut enabled, mut found) = (9u32, 0i32, false, false);
    ch.try_get_uint('P', &mut fan, &mut found).unwrap();
    ch.try_get_int('H', &mut heater, &mut found).unwrap();
    ch.try_get_bool('P', &mut enabled, &mut found).unwrap();
    assert_eq!((fan, heater, enabled, found), (1, -1, true, true));

    let mut name = String::new();
    let mut found = false;
    ch.try_get_possibly_quoted_string('C', &mut name, &mut found).unwrap();
    assert_eq!((name.as_str(), found), ("fan", true));
}

#[test]
fn bad_values_surface_as_errors() {
    let mut ch = executing("G1 Xabc");
    let mut x = 0.0f32;
    let mut seen = false;
    assert_eq!(
        ch.try_get_float('X', &mut x, &mut seen),
        Err(ParseError::BadNumber('X'))
    );
    assert!(!seen);
    assert_eq!(ch.get_float(), Err(ParseError::MissingParameter));
}

#[test]
fn pwm_values_are_normalised() {
    assert_eq!(normalize_pwm(0.5), 0.5);
    assert_eq!(normalize_pwm(255.0), 1.0);
    assert_eq!(normalize_pwm(-3.0), 0.0);

    let mut ch = executing("M106 S127.5 Q0");
    assert!(ch.seen('S'));
    assert_eq!(ch.get_pwm_value().unwrap(), 0.5);
    assert!(ch.seen('Q'));
    assert_eq!(ch.get_pwm_frequency().unwrap(), 1);

    let mut ch = executing("M106 Q100000");
    assert!(ch.seen('Q'));
    assert_eq!(ch.get_pwm_frequency().unwrap(), 65535);
}

#[test]
fn distances_follow_the_unit_of_the_scope() {
    let mut ch = executing("G1 X1 Y-2");
    assert!(ch.seen('X'));
    assert_eq!(ch.get_distance().unwrap(), 1.0);

    ch.top_frame_mut().set_using_inches(true);
    assert!(ch.seen('Y'));
    assert_eq!(ch.get_distance().unwrap(), -2.0 * INCH_TO_MM);
    for mm in [0.0f32, 12.7, -254.0] {
        let back = ch.convert_distance(ch.inverse_convert_distance(mm));
        assert!((back - mm).abs() < 1e-4);
    }

    ch.push_frame(false).unwrap();
    assert_eq!(ch.convert_distance(1.0), INCH_TO_MM);
    ch.top_frame_mut().set_using_inches(false);
    assert_eq!(ch.convert_distance(1.0), 1.0);
    ch.pop_frame(false);
    assert_eq!(ch.convert_distance(1.0), INCH_TO_MM);
}

#[test]
fn dwell_completes_after_the_duration() {
    let clock = Arc::new(ManualClock::new(u32::MAX - 100));
    let mut ch = channel().with_clock(clock.clone());
    assert!(!ch.dwell(1000));
    clock.advance(400);
    assert!(!ch.dwell(1000));
    clock.advance(599);
    assert!(!ch.dwell(1000));
    clock.advance(1);
    assert!(ch.dwell(1000));
    // a new wait starts on the next poll
    assert!(!ch.dwell(1000));
    ch.reset();
    clock.advance(5000);
    assert!(!ch.dwell(10));
}

#[test]
fn errors_are_reported_on_the_reply_route() {
    let sink = Arc::new(CaptureSink::new());
    let mut identity = ChannelIdentity::new("sbc", MessageType::TELNET);
    identity.binary_route = MessageType::HTTP;
    let mut ch = Channel::new(identity)
        .with_pool(FramePool::shared(2), 2)
        .with_reply_sink(sink.clone());

    ch.put_str("G1 X1");
    ch.report_error("bad move");
    ch.put(&BinaryCode::new('G', 1).encode(), true);
    ch.report_error("bad record");

    assert_eq!(
        sink.take(),
        vec![
            (MessageType::TELNET | MessageType::ERROR, String::from("Error: bad move")),
            (
                MessageType::HTTP | MessageType::BINARY_CODE_REPLY | MessageType::ERROR,
                String::from("Error: bad record")
            ),
        ]
    );
    assert!(sink.messages().is_empty());
}

#[test]
fn messages_are_acknowledged_at_any_depth() {
    let mut ch = channel();
    assert!(!ch.acknowledge_message(false));
    ch.top_frame_mut().wait_for_acknowledgement();
    ch.push_frame(false).unwrap();
    assert!(!ch.top_frame().waiting_for_acknowledgement());
    ch.top_frame_mut().wait_for_acknowledgement();

    assert!(ch.acknowledge_message(true));
    assert!(ch.top_frame().message_cancelled());
    assert!(ch.original_frame().message_cancelled());
    assert!(!ch.acknowledge_message(false));
}

struct Rewinding {
    pos: FilePosition,
    len: FilePosition,
}

impl ByteSource for Rewinding {
    fn reset(&mut self) {
        self.pos = 0;
    }
    fn seek(&mut self, position: FilePosition) -> bool {
        if position > self.len {
            return false;
        }
        self.pos = position;
        true
    }
    fn position(&self) -> FilePosition {
        self.pos
    }
    fn close(&mut self) {}
}

#[derive(Clone, Default)]
struct CountingInput(Arc<AtomicU32>);

impl FileInput for CountingInput {
    fn reset(&mut self, _cursor: &FileCursor) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn restart_rewinds_the_current_file() {
    let input = CountingInput::default();
    let mut ch = channel().with_file_input(Box::new(input.clone()));
    assert!(!ch.restart_from(0));

    ch.top_frame_mut()
        .open_file(FileCursor::local(share(Rewinding { pos: 90, len: 100 })));
    ch.put_str("G1 X1");
    assert!(ch.is_ready());
    assert!(ch.restart_from(42));
    assert!(ch.is_completely_idle());
    assert_eq!(ch.top_frame().file().and_then(|f| f.position()), Some(42));
    assert!(!ch.restart_from(500));
    assert_eq!(input.0.load(Ordering::SeqCst), 2);
}

struct DirStore(PathBuf);

impl FileStore for DirStore {
    fn create(&self, directory: &str, name: &str) -> io::Result<Box<dyn Write + Send>> {
        let dir = self.0.join(directory);
        fs::create_dir_all(&dir)?;
        Ok(Box::new(fs::File::create(dir.join(name))?))
    }
}

#[test]
fn uploads_are_written_through_the_text_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut parser = StringParser::new();
    parser.set_file_store(Arc::new(DirStore(dir.path().to_path_buf())));
    let mut ch = channel().with_text_parser(Box::new(parser));

    ch.open_file_to_write("macros", "park.g", 0, false).unwrap();
    for line in ["G91", "G1 Z5 ; lift", "G90", "M29"] {
        ch.put_str(line);
        assert!(ch.is_writing_file());
        ch.write_to_file().unwrap();
    }
    assert!(!ch.is_writing_file());
    let written = fs::read_to_string(dir.path().join("macros/park.g")).unwrap();
    assert_eq!(written, "G91\nG1 Z5\nG90\n");

    ch.open_file_to_write("sys", "blob.bin", 2, true).unwrap();
    assert!(ch.is_writing_binary());
    ch.write_binary_to_file(0xAB).unwrap();
    ch.write_binary_to_file(0xCD).unwrap();
    assert!(!ch.is_writing_binary());
    assert_eq!(fs::read(dir.path().join("sys/blob.bin")).unwrap(), vec![0xAB, 0xCD]);
}

#[test]
fn text_only_operations_are_refused_on_binary() {
    let mut ch = channel();
    ch.put(&BinaryCode::new('M', 28).encode(), true);
    ch.set_comms_properties(1);
    ch.set_file_position(Some(5));
    assert!(!ch.is_writing_file());
    assert!(!ch.is_writing_binary());
    assert!(matches!(
        ch.open_file_to_write("gcodes", "a.g", 0, false),
        Err(FileWriteError::Unsupported)
    ));
    assert!(matches!(ch.write_to_file(), Err(FileWriteError::Unsupported)));
    assert!(matches!(
        ch.write_binary_to_file(0),
        Err(FileWriteError::Unsupported)
    ));
    assert!(matches!(
        ch.finish_writing_binary(),
        Err(FileWriteError::Unsupported)
    ));

    ch.decode_command().unwrap();
    assert_eq!(ch.file_position(), None);
    let mut text = String::new();
    ch.diagnostics(&mut text).unwrap();
    assert!(text.contains("Binary transport"));
}
