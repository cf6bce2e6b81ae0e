// CLASSIFICATION: COMMUNITY
// Filename: gcode_trace.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Replay a G-code file through a channel and print what it parsed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gcode_intake::channel::Channel;
use gcode_intake::config::{ChannelConfig, IntakeConfig};
use gcode_intake::frame::file::{ByteSource, FileCursor, FilePosition, SharedSource};
use gcode_intake::frame::{MacroState, ModeFlags};
use log::{debug, info};

#[derive(Parser)]
#[command(
    name = "gcode-trace",
    about = "Trace G-code through a command channel",
    version = "0.1"
)]
struct Cli {
    /// G-code file to replay.
    file: PathBuf,
    /// Intake config; defaults to GCODE_INTAKE_CONFIG or built-in values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Channel id from the config to replay on.
    #[arg(long, default_value = "usb")]
    channel: String,
    /// Honour G4 dwells in real time instead of skipping them.
    #[arg(long)]
    dwell: bool,
}

/// Whole file held in memory.
struct TraceFile {
    data: Vec<u8>,
    pos: FilePosition,
    closed: bool,
}

impl TraceFile {
    fn next_byte(&mut self) -> Option<u8> {
        if self.closed {
            return None;
        }
        let byte = self.data.get(self.pos as usize).copied()?;
        self.pos += 1;
        Some(byte)
    }
}

impl ByteSource for TraceFile {
    fn reset(&mut self) {
        self.pos = 0;
    }

    fn seek(&mut self, position: FilePosition) -> bool {
        if position as usize > self.data.len() {
            return false;
        }
        self.pos = position;
        true
    }

    fn position(&self) -> FilePosition {
        self.pos
    }

    fn close(&mut self) {
        debug!("trace file closed at {}", self.pos);
        self.closed = true;
    }
}

#[derive(Default)]
struct Stats {
    commands: usize,
    errors: usize,
    max_depth: usize,
}

fn execute(channel: &mut Channel, dwell: bool, stats: &mut Stats) {
    if let Err(e) = channel.decode_command() {
        channel.report_error(&e.to_string());
        channel.set_finished(true);
        stats.errors += 1;
        return;
    }
    let mut short = String::new();
    let mut full = String::new();
    let printed = channel
        .print_command(&mut short)
        .and_then(|()| channel.append_full_command(&mut full));
    let position = channel.file_position().unwrap_or(0);

    let command = (channel.command_letter(), channel.command_number());
    let outcome: Result<String, String> = match (printed, command) {
        (Err(e), _) => Err(format!("cannot print command: {e}")),
        (Ok(()), (Some('G'), Some(0 | 1))) => {
            let mut moves = Vec::new();
            for axis in ['X', 'Y', 'Z'] {
                if channel.seen(axis) {
                    let mm = channel.get_distance().map_err(|e| e.to_string());
                    moves.push(mm.map(|v| format!("{axis}={v}mm")));
                }
            }
            moves
                .into_iter()
                .collect::<Result<Vec<_>, _>>()
                .map(|m| m.join(" "))
        }
        (Ok(()), (Some('G'), Some(n @ (20 | 21)))) => {
            channel.top_frame_mut().set_using_inches(n == 20);
            Ok(String::from(if n == 20 { "inches" } else { "mm" }))
        }
        (Ok(()), (Some('G'), Some(n @ (90 | 91)))) => {
            channel.top_frame_mut().modes.set(ModeFlags::AXES_RELATIVE, n == 91);
            Ok(String::new())
        }
        (Ok(()), (Some('M'), Some(n @ (82 | 83)))) => {
            channel.top_frame_mut().modes.set(ModeFlags::DRIVES_RELATIVE, n == 83);
            Ok(String::new())
        }
        (Ok(()), (Some('G'), Some(4))) => {
            let mut millis = 0u32;
            let mut seconds = 0.0f32;
            let mut seen = false;
            let read = channel
                .try_get_uint('P', &mut millis, &mut seen)
                .and_then(|()| channel.try_get_float('S', &mut seconds, &mut seen));
            match read {
                Err(e) => Err(e.to_string()),
                Ok(()) => {
                    let total = millis.saturating_add((seconds * 1000.0) as u32);
                    if dwell {
                        while !channel.dwell(total) {
                            std::thread::sleep(Duration::from_millis(1));
                        }
                    }
                    Ok(format!("dwell {total}ms"))
                }
            }
        }
        (Ok(()), (Some('M'), Some(98))) => {
            let mut name = String::new();
            let mut seen = false;
            match channel.try_get_quoted_string('P', &mut name, &mut seen) {
                Err(e) => Err(format!("P: {e}")),
                Ok(()) if !seen => Err(String::from("no macro file given")),
                Ok(()) => match channel.push_frame(true) {
                    Ok(()) => {
                        channel.top_frame_mut().macro_state = MacroState::User;
                        Ok(format!("enter {name}"))
                    }
                    Err(e) => Err(e.to_string()),
                },
            }
        }
        (Ok(()), (Some('M'), Some(99))) => {
            if channel.pop_frame(true) {
                Ok(String::from("return"))
            } else {
                Err(String::from("M99 outside a macro"))
            }
        }
        _ => Ok(String::new()),
    };

    stats.commands += 1;
    stats.max_depth = stats.max_depth.max(channel.depth());
    match outcome {
        Ok(note) => println!(
            "{position:>7} {short:<7} depth {} {full} {note}",
            channel.depth()
        ),
        Err(e) => {
            stats.errors += 1;
            channel.report_error(&format!("{short}: {e}"));
        }
    }
    channel.set_finished(true);
}

fn run(cli: Cli) -> Result<Stats, Box<dyn std::error::Error>> {
    let cfg = match &cli.config {
        Some(path) => IntakeConfig::load_from_file(path)?,
        None => IntakeConfig::load_active(),
    };
    let channel_cfg = cfg
        .channels
        .iter()
        .find(|c| c.id == cli.channel)
        .cloned()
        .unwrap_or_else(|| ChannelConfig {
            id: cli.channel.clone(),
            ..ChannelConfig::default()
        });
    let pool = cfg.build_pool();
    let mut channel = cfg.build_channel(&channel_cfg, &pool)?;

    let file = Arc::new(spin::Mutex::new(TraceFile {
        data: std::fs::read(&cli.file)?,
        pos: 0,
        closed: false,
    }));
    let source: SharedSource = file.clone();
    channel.top_frame_mut().open_file(FileCursor::local(source));
    info!("replaying {} on channel {}", cli.file.display(), channel.id());

    let mut stats = Stats::default();
    let mut line_start = Some(0);
    loop {
        let mut f = file.lock();
        let Some(byte) = f.next_byte() else { break };
        let pos = f.pos - 1;
        drop(f);
        if line_start.is_none() {
            line_start = Some(pos);
        }
        channel.set_file_position(line_start);
        if matches!(byte, b'\n' | b'\r') {
            line_start = None;
        }
        if channel.put_char(byte) {
            execute(&mut channel, cli.dwell, &mut stats);
        }
    }
    channel.on_source_file_ended()?;
    if channel.is_ready() {
        execute(&mut channel, cli.dwell, &mut stats);
    }
    channel.abort_file(false);
    Ok(stats)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(stats) => println!(
            "{} commands, {} errors, max depth {}",
            stats.commands, stats.errors, stats.max_depth
        ),
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    }
}
