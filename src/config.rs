// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Intake configuration loaded from TOML.
//!
//! ```toml
//! max_stack_depth = 8
//! frame_pool_capacity = 16
//!
//! [[channels]]
//! id = "usb"
//! text_route = "usb"
//! queue_codes = true
//! ```

extern crate alloc;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::str::FromStr;
use std::fs;
use std::path::Path;

use log::warn;
use serde::Deserialize;
use thiserror::Error;

use crate::channel::{Channel, ChannelIdentity, DEFAULT_MAX_STACK_DEPTH};
use crate::frame::{pool::DEFAULT_POOL_CAPACITY, FramePool, SharedFramePool};
use crate::parser::string::DEFAULT_MAX_LINE_LEN;
use crate::parser::StringParser;
use crate::reply::MessageType;

/// Environment variable naming the active config file.
pub const CONFIG_PATH_ENV: &str = "GCODE_INTAKE_CONFIG";
/// Environment override for [`IntakeConfig::max_stack_depth`].
pub const MAX_STACK_DEPTH_ENV: &str = "GCODE_MAX_STACK_DEPTH";
/// Environment override for [`IntakeConfig::frame_pool_capacity`].
pub const FRAME_POOL_CAPACITY_ENV: &str = "GCODE_FRAME_POOL_CAPACITY";

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("max_stack_depth must be at least 1")]
    InvalidDepth,
    #[error("frame pool capacity {capacity} is below stack depth {depth}")]
    PoolTooSmall { depth: usize, capacity: usize },
    #[error("unknown reply route '{0}'")]
    UnknownRoute(String),
}

/// One configured input channel.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    pub id: String,
    pub text_route: String,
    /// Defaults to the text route when empty.
    pub binary_route: String,
    pub queue_codes: bool,
    pub tool_number_adjust: i32,
    pub host_link: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            id: "usb".into(),
            text_route: "usb".into(),
            binary_route: String::new(),
            queue_codes: false,
            tool_number_adjust: 0,
            host_link: false,
        }
    }
}

impl ChannelConfig {
    /// Resolve route names into a channel identity.
    pub fn identity(&self) -> Result<ChannelIdentity, ConfigError> {
        let route = |name: &str| {
            MessageType::from_route_name(name)
                .ok_or_else(|| ConfigError::UnknownRoute(name.into()))
        };
        let text_route = route(&self.text_route)?;
        let binary_route = if self.binary_route.is_empty() {
            text_route
        } else {
            route(&self.binary_route)?
        };
        Ok(ChannelIdentity {
            id: self.id.clone(),
            text_route,
            binary_route,
            queue_codes: self.queue_codes,
            tool_number_adjust: self.tool_number_adjust,
        })
    }
}

/// Limits and channel table for the intake layer.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IntakeConfig {
    /// Frames per channel, counting the root.
    pub max_stack_depth: usize,
    /// Frames in the shared pool.
    pub frame_pool_capacity: usize,
    /// Longest text line accepted.
    pub max_line_length: usize,
    pub channels: Vec<ChannelConfig>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            frame_pool_capacity: DEFAULT_POOL_CAPACITY,
            max_line_length: DEFAULT_MAX_LINE_LEN,
            channels: Vec::new(),
        }
    }
}

impl FromStr for IntakeConfig {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let cfg: IntakeConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

impl IntakeConfig {
    /// Read and validate a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        text.parse()
    }

    /// Configuration named by `GCODE_INTAKE_CONFIG` with environment
    /// overrides applied. Falls back to defaults when the file is missing
    /// or invalid.
    pub fn load_active() -> Self {
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => match Self::load_from_file(Path::new(&path)) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!("using default intake config: {path}: {e}");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        let before = cfg.clone();
        cfg.apply_env_overrides();
        if let Err(e) = cfg.validate() {
            warn!("ignoring environment overrides: {e}");
            return before;
        }
        cfg
    }

    /// Apply `GCODE_MAX_STACK_DEPTH` and `GCODE_FRAME_POOL_CAPACITY`.
    pub fn apply_env_overrides(&mut self) {
        if let Some(depth) = env_usize(MAX_STACK_DEPTH_ENV) {
            self.max_stack_depth = depth;
        }
        if let Some(capacity) = env_usize(FRAME_POOL_CAPACITY_ENV) {
            self.frame_pool_capacity = capacity;
        }
    }

    /// Check the limits and every channel's routes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_stack_depth == 0 {
            return Err(ConfigError::InvalidDepth);
        }
        if self.frame_pool_capacity < self.max_stack_depth {
            return Err(ConfigError::PoolTooSmall {
                depth: self.max_stack_depth,
                capacity: self.frame_pool_capacity,
            });
        }
        for channel in &self.channels {
            channel.identity()?;
        }
        Ok(())
    }

    /// Pool sized for this configuration.
    pub fn build_pool(&self) -> SharedFramePool {
        FramePool::shared(self.frame_pool_capacity)
    }

    /// Channel for `channel`, drawing frames from `pool`.
    pub fn build_channel(
        &self,
        channel: &ChannelConfig,
        pool: &SharedFramePool,
    ) -> Result<Channel, ConfigError> {
        let built = Channel::new(channel.identity()?)
            .with_text_parser(Box::new(StringParser::with_max_line_len(self.max_line_length)))
            .with_pool(pool.clone(), self.max_stack_depth);
        Ok(if channel.host_link {
            built.with_host_link()
        } else {
            built
        })
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("{name}={raw} is not a number, ignored");
            None
        }
    }
}
