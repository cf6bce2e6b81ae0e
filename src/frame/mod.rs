// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Execution frames: one entry of a channel's scope stack.
//!
//! A frame records the modal state a command sees (units, relative modes,
//! locked resources, feed rate) together with the file that drives the
//! scope, if any. Pushing a frame copies the inherited state forward and
//! clears the per-scope state; see [`ExecutionFrame::inherit_from`].

pub mod file;
pub mod pool;

use bitflags::bitflags;

pub use file::{ByteSource, FileCursor, FileId, FileInput, FilePosition, SharedSource};
pub use pool::{FramePool, PoolError, SharedFramePool};

/// Feed rate a fresh root frame starts with, in mm/min.
pub const DEFAULT_FEED_RATE: f32 = 3000.0;

bitflags! {
    /// Modal flags carried by a frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModeFlags: u16 {
        /// Axis moves are relative (G91).
        const AXES_RELATIVE = 0b0000_0001;
        /// Extruder moves are relative (M83).
        const DRIVES_RELATIVE = 0b0000_0010;
        /// Distances are given in inches (G20).
        const USING_INCHES = 0b0000_0100;
        /// Extrusion amounts are volumetric (M200). Cleared on push.
        const VOLUMETRIC_EXTRUSION = 0b0000_1000;
        /// Coordinates are machine coordinates for this scope (G53). Cleared on push.
        const MACHINE_COORDINATES = 0b0001_0000;
        /// Heater waits do not wait for cooling.
        const SUPPRESS_COOLING_WAIT = 0b0010_0000;
    }
}

impl ModeFlags {
    /// Flags that never survive a push.
    pub const RESET_ON_PUSH: ModeFlags =
        ModeFlags::VOLUMETRIC_EXTRUSION.union(ModeFlags::MACHINE_COORDINATES);
}

bitflags! {
    /// Saved-configuration replays a frame is part of.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConfigReplay: u8 {
        /// Replaying stored overrides (M501).
        const STORED_OVERRIDES = 0b01;
        /// Replaying factory defaults (M502).
        const FACTORY_DEFAULTS = 0b10;
    }
}

/// What kind of macro, if any, the scope is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacroState {
    /// Commands come straight from the channel's input.
    #[default]
    None,
    /// A user macro file.
    User,
    /// A macro the firmware runs on its own behalf (homing, tool change...).
    System,
}

/// Blocking-message state of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckState {
    /// Nothing posted.
    #[default]
    Idle,
    /// A message was posted and the scope waits for the user or host.
    Waiting,
    /// The posted message was answered.
    Acknowledged {
        /// The answer was a cancel rather than an OK.
        cancelled: bool,
    },
}

/// Bitmap of shared resources (movement queue, heaters, file system...)
/// locked by a scope. Resource numbers are assigned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceSet(u32);

impl ResourceSet {
    /// Highest resource number plus one.
    pub const CAPACITY: u8 = 32;

    /// Empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Mark `resource` as held. Out-of-range numbers are ignored.
    pub fn lock(&mut self, resource: u8) {
        if resource < Self::CAPACITY {
            self.0 |= 1 << resource;
        }
    }

    /// Release `resource`.
    pub fn unlock(&mut self, resource: u8) {
        if resource < Self::CAPACITY {
            self.0 &= !(1 << resource);
        }
    }

    /// Whether `resource` is held.
    #[must_use]
    pub fn is_locked(&self, resource: u8) -> bool {
        resource < Self::CAPACITY && self.0 & (1 << resource) != 0
    }

    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Raw bitmap.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// One entry on a channel's execution stack.
#[derive(Debug, Clone)]
pub struct ExecutionFrame {
    /// Current feed rate in mm/min.
    pub feed_rate: f32,
    /// Resources held by this scope.
    pub locked_resources: ResourceSet,
    /// Modal flags.
    pub modes: ModeFlags,
    /// Macro kind being executed.
    pub macro_state: MacroState,
    /// Saved-config replays in progress.
    pub config_replay: ConfigReplay,
    /// Line number of the last command read in this scope.
    pub line_number: u32,
    /// Top-level file this scope ultimately came from.
    pub file_id: FileId,
    /// The originating file reached end of stream.
    pub file_finished: bool,
    ack: AckState,
    file: Option<FileCursor>,
}

impl Default for ExecutionFrame {
    fn default() -> Self {
        Self {
            feed_rate: DEFAULT_FEED_RATE,
            locked_resources: ResourceSet::empty(),
            modes: ModeFlags::empty(),
            macro_state: MacroState::None,
            config_replay: ConfigReplay::empty(),
            line_number: 0,
            file_id: FileId::NONE,
            file_finished: false,
            ack: AckState::Idle,
            file: None,
        }
    }
}

impl ExecutionFrame {
    /// Fresh root frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite this frame with the state a child of `parent` starts with.
    ///
    /// Feed rate, locks, relative modes, units, cooling, macro and replay
    /// state, the file binding and the originating file identity are
    /// inherited. Volumetric extrusion, the machine-coordinate override and
    /// the acknowledgement state always start cleared. The line number is
    /// kept only when `preserve_line_number` is set.
    pub fn inherit_from(&mut self, parent: &ExecutionFrame, preserve_line_number: bool) {
        self.feed_rate = parent.feed_rate;
        self.locked_resources = parent.locked_resources;
        self.modes = parent.modes.difference(ModeFlags::RESET_ON_PUSH);
        self.macro_state = parent.macro_state;
        self.config_replay = parent.config_replay;
        self.line_number = if preserve_line_number {
            parent.line_number
        } else {
            0
        };
        self.file_id = parent.file_id;
        self.file_finished = parent.file_finished;
        self.ack = AckState::Idle;
        self.file = parent.file.clone();
    }

    /// Return the frame to its pristine state, closing any bound file.
    pub fn clear(&mut self) {
        self.close_file();
        *self = Self::default();
    }

    /// Distances are in inches.
    #[must_use]
    pub fn using_inches(&self) -> bool {
        self.modes.contains(ModeFlags::USING_INCHES)
    }

    /// Select inches (`true`) or millimetres.
    pub fn set_using_inches(&mut self, inches: bool) {
        self.modes.set(ModeFlags::USING_INCHES, inches);
    }

    /// Axis moves are relative.
    #[must_use]
    pub fn axes_relative(&self) -> bool {
        self.modes.contains(ModeFlags::AXES_RELATIVE)
    }

    /// Extruder moves are relative.
    #[must_use]
    pub fn drives_relative(&self) -> bool {
        self.modes.contains(ModeFlags::DRIVES_RELATIVE)
    }

    /// Volumetric extrusion is on for this scope.
    #[must_use]
    pub fn volumetric_extrusion(&self) -> bool {
        self.modes.contains(ModeFlags::VOLUMETRIC_EXTRUSION)
    }

    /// G53 machine coordinates are active for this scope.
    #[must_use]
    pub fn machine_coordinates(&self) -> bool {
        self.modes.contains(ModeFlags::MACHINE_COORDINATES)
    }

    /// Running any macro.
    #[must_use]
    pub fn running_macro(&self) -> bool {
        self.macro_state != MacroState::None
    }

    /// Running a firmware-initiated macro.
    #[must_use]
    pub fn running_system_macro(&self) -> bool {
        self.macro_state == MacroState::System
    }

    /// Acknowledgement state.
    #[must_use]
    pub fn ack_state(&self) -> AckState {
        self.ack
    }

    /// Post a blocking message from this scope.
    pub fn wait_for_acknowledgement(&mut self) {
        self.ack = AckState::Waiting;
    }

    /// A posted message is still unanswered.
    #[must_use]
    pub fn waiting_for_acknowledgement(&self) -> bool {
        self.ack == AckState::Waiting
    }

    /// The posted message was answered.
    #[must_use]
    pub fn message_acknowledged(&self) -> bool {
        matches!(self.ack, AckState::Acknowledged { .. })
    }

    /// The posted message was answered with a cancel.
    #[must_use]
    pub fn message_cancelled(&self) -> bool {
        matches!(self.ack, AckState::Acknowledged { cancelled: true })
    }

    /// Answer a waiting message. Returns false when nothing was waiting.
    pub fn acknowledge(&mut self, cancelled: bool) -> bool {
        if self.ack == AckState::Waiting {
            self.ack = AckState::Acknowledged { cancelled };
            true
        } else {
            false
        }
    }

    /// Forget any posted message or answer.
    pub fn clear_acknowledgement(&mut self) {
        self.ack = AckState::Idle;
    }

    /// The scope is driven by a file.
    #[must_use]
    pub fn doing_file(&self) -> bool {
        self.file.is_some()
    }

    /// File binding of this scope.
    #[must_use]
    pub fn file(&self) -> Option<&FileCursor> {
        self.file.as_ref()
    }

    /// Bind `cursor` as this scope's input, closing any previous binding.
    pub fn open_file(&mut self, cursor: FileCursor) {
        self.close_file();
        self.file = Some(cursor);
    }

    /// Release this scope's file binding.
    pub fn close_file(&mut self) {
        if let Some(cursor) = self.file.take() {
            cursor.close();
        }
    }

    /// Mark the originating file as having reached its end.
    pub fn set_file_finished(&mut self) {
        self.file_finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_set_ignores_out_of_range() {
        let mut set = ResourceSet::empty();
        set.lock(3);
        set.lock(40);
        assert!(set.is_locked(3));
        assert!(!set.is_locked(40));
        assert_eq!(set.bits(), 0b1000);
        set.unlock(3);
        assert!(set.is_empty());
    }

    #[test]
    fn inherit_clears_per_scope_state() {
        let mut parent = ExecutionFrame::new();
        parent.modes = ModeFlags::all();
        parent.line_number = 42;
        parent.feed_rate = 1200.0;
        parent.macro_state = MacroState::System;
        parent.config_replay = ConfigReplay::FACTORY_DEFAULTS;
        parent.wait_for_acknowledgement();

        let mut child = ExecutionFrame::new();
        child.inherit_from(&parent, false);
        assert!(child.using_inches());
        assert!(child.axes_relative());
        assert!(child.drives_relative());
        assert!(!child.volumetric_extrusion());
        assert!(!child.machine_coordinates());
        assert!(child.modes.contains(ModeFlags::SUPPRESS_COOLING_WAIT));
        assert!(child.running_system_macro());
        assert_eq!(child.config_replay, ConfigReplay::FACTORY_DEFAULTS);
        assert_eq!(child.ack_state(), AckState::Idle);
        assert_eq!(child.line_number, 0);
        assert_eq!(child.feed_rate, 1200.0);

        child.inherit_from(&parent, true);
        assert_eq!(child.line_number, 42);
    }

    #[test]
    fn acknowledge_only_answers_waiting_frames() {
        let mut frame = ExecutionFrame::new();
        assert!(!frame.acknowledge(false));
        frame.wait_for_acknowledgement();
        assert!(frame.acknowledge(true));
        assert!(frame.message_acknowledged());
        assert!(frame.message_cancelled());
        assert!(!frame.waiting_for_acknowledgement());
    }
}
