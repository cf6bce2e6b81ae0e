// CLASSIFICATION: COMMUNITY
// Filename: test_frame_stack.rs v0.1
// Date Modified: 2026-10-16
// Author: Lukas Bower

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use gcode_intake::channel::{Channel, ChannelIdentity, StackError};
use gcode_intake::frame::file::{share, ByteSource, FileCursor, FilePosition};
use gcode_intake::frame::{FramePool, MacroState};
use gcode_intake::reply::MessageType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serial_test::serial;

struct CountingFile {
    pos: FilePosition,
    closes: Arc<AtomicU32>,
}

impl ByteSource for CountingFile {
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

fn counting_cursor(closes: &Arc<AtomicU32>) -> FileCursor {
    FileCursor::local(share(CountingFile {
        pos: 0,
        closes: closes.clone(),
    }))
}

fn channel(max_depth: usize) -> Channel {
    Channel::new(ChannelIdentity::new("test", MessageType::USB))
        .with_pool(FramePool::shared(16), max_depth)
}

#[test]
fn random_push_pop_respects_bounds() {
    let _ = env_logger::builder().is_test(true).try_init();
    let pool = FramePool::shared(16);
    let mut ch = Channel::new(ChannelIdentity::new("fuzz", MessageType::USB))
        .with_pool(pool.clone(), 6);
    let mut rng = StdRng::seed_from_u64(0x6C0D_E5EE_u64);
    let mut model = 1usize;

    for _ in 0..2000 {
        if rng.random_bool(0.55) {
            let pushed = ch.push_frame(rng.random_bool(0.5));
            if model < 6 {
                assert!(pushed.is_ok());
                model += 1;
            } else {
                assert_eq!(pushed, Err(StackError::DepthExceeded { max: 6 }));
            }
        } else {
            let popped = ch.pop_frame(rng.random_bool(0.5));
            assert_eq!(popped, model > 1);
            model = (model - 1).max(1);
        }
        assert_eq!(ch.depth(), model);
        assert!((1..=6).contains(&ch.depth()));
        assert_eq!(pool.lock().in_use(), model - 1);
    }

    drop(ch);
    assert_eq!(pool.lock().in_use(), 0);
}

#[test]
fn abort_closes_every_nested_file() {
    let closes = Arc::new(AtomicU32::new(0));
    let mut ch = channel(8);
    for _ in 0..3 {
        ch.push_frame(false).unwrap();
        ch.top_frame_mut().open_file(counting_cursor(&closes));
    }
    assert_eq!(ch.depth(), 4);
    assert_eq!(closes.load(Ordering::SeqCst), 0);

    ch.abort_file(false);
    assert_eq!(closes.load(Ordering::SeqCst), 3);
    assert_eq!(ch.depth(), 1);
    assert!(!ch.top_frame().doing_file());
}

#[test]
fn abort_closes_files_the_host_still_reads() {
    let closes = Arc::new(AtomicU32::new(0));
    let mut ch = channel(8);
    let source = share(CountingFile {
        pos: 0,
        closes: closes.clone(),
    });
    ch.push_frame(false).unwrap();
    ch.top_frame_mut().open_file(FileCursor::local(source.clone()));
    ch.push_frame(true).unwrap();

    ch.abort_file(false);
    assert_eq!(ch.depth(), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(source.lock().position(), 0);

    ch.push_frame(false).unwrap();
    ch.top_frame_mut().open_file(FileCursor::local(source.clone()));
    assert!(ch.pop_frame(false));
    assert_eq!(closes.load(Ordering::SeqCst), 2);
}

#[test]
fn abort_without_files_is_a_no_op() {
    let mut ch = channel(8);
    ch.push_frame(false).unwrap();
    ch.top_frame_mut().line_number = 3;
    ch.abort_file(false);
    assert_eq!(ch.depth(), 2);
    assert_eq!(ch.top_frame().line_number, 3);
}

#[test]
fn abort_stops_at_first_scope_without_a_file() {
    let closes = Arc::new(AtomicU32::new(0));
    let mut ch = channel(8);
    ch.top_frame_mut().open_file(counting_cursor(&closes));
    ch.push_frame(false).unwrap();
    ch.top_frame_mut().close_file();
    ch.push_frame(false).unwrap();
    ch.top_frame_mut().open_file(counting_cursor(&closes));

    ch.abort_file(false);
    assert_eq!(ch.depth(), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(ch.original_frame().doing_file());
}

#[test]
fn root_file_is_closed_without_popping() {
    let closes = Arc::new(AtomicU32::new(0));
    let mut ch = channel(8);
    ch.top_frame_mut().open_file(counting_cursor(&closes));
    ch.abort_file(false);
    assert_eq!(ch.depth(), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn inherited_file_survives_child_pop() {
    let closes = Arc::new(AtomicU32::new(0));
    let mut ch = channel(8);
    ch.top_frame_mut().open_file(counting_cursor(&closes));
    ch.push_frame(true).unwrap();
    assert!(ch.top_frame().doing_file());
    assert!(ch.pop_frame(true));
    assert_eq!(closes.load(Ordering::SeqCst), 0);
    assert!(ch.top_frame().doing_file());
}

#[test]
fn reset_unwinds_to_root() {
    let mut ch = channel(8);
    for _ in 0..4 {
        ch.push_frame(false).unwrap();
    }
    ch.put_str("G1 X1");
    assert!(ch.is_ready());
    ch.reset();
    assert_eq!(ch.depth(), 1);
    assert!(ch.is_completely_idle());
}

#[test]
fn macros_can_always_queue() {
    let mut ch = channel(8);
    assert!(!ch.can_queue_commands());
    ch.push_frame(false).unwrap();
    ch.top_frame_mut().macro_state = MacroState::System;
    assert!(ch.can_queue_commands());
    assert!(ch.top_frame().running_system_macro());
    ch.pop_frame(false);
    assert!(!ch.can_queue_commands());

    let mut identity = ChannelIdentity::new("queued", MessageType::AUX);
    identity.queue_codes = true;
    let queued = Channel::new(identity).with_pool(FramePool::shared(1), 2);
    assert!(queued.can_queue_commands());
}

#[test]
#[serial]
fn channels_share_the_global_pool() {
    let _ = env_logger::builder().is_test(true).try_init();
    let global = FramePool::global();
    let before = global.lock().in_use();
    {
        let mut a = Channel::new(ChannelIdentity::new("a", MessageType::USB));
        let mut b = Channel::new(ChannelIdentity::new("b", MessageType::AUX));
        a.push_frame(false).unwrap();
        b.push_frame(false).unwrap();
        b.push_frame(false).unwrap();
        assert_eq!(global.lock().in_use(), before + 3);
        assert!(b.pop_frame(false));
        assert_eq!(global.lock().in_use(), before + 2);
    }
    assert_eq!(global.lock().in_use(), before);
}
