//! Sample and channel description types shared by every backend.
//!
//! Backends (`backends::windows::*`) emit [`InputKind`] deltas per poll;
//! the [`crate::poller::InputPoller`] assembles them into [`Sample`]s keyed
//! by device id.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Kind of input channel a device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Axis,
    Button,
    Hat,
}

/// Static description of one channel (axis/button/hat) on a device, used
/// for profile-editor UI and diagnostics. Does not change while the device
/// is open.
#[derive(Debug, Clone)]
pub struct ChannelDesc {
    pub kind: ChannelKind,
    pub idx: u16,
    pub name: Option<String>,
    pub logical_min: i32,
    pub logical_max: i32,
    pub usage_page: Option<u16>,
    pub usage: Option<u16>,
}

/// One state-change event produced by a backend's `poll()`.
#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    AxisMoved { axis: u16, value: f32 },
    ButtonPressed { button: u16 },
    ButtonReleased { button: u16 },
    HatChanged { hat: u16, value: i16 },
}

/// Reference to one bit/value in a [`Sample`] (spec §3 "Input Source").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSource {
    pub device_id: String,
    pub kind: ChannelKind,
    pub index: u16,
}

/// Immutable snapshot of one physical device's full state at one instant.
///
/// Axes are normalized to `[-1, 1]`, hats are degrees (`0..360`) or `-1` for
/// centered, per spec §3.
#[derive(Debug, Clone)]
pub struct Sample {
    pub device_id: String,
    pub timestamp: Instant,
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
    pub hats: Vec<i16>,
}

impl Sample {
    pub fn empty(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: Instant::now(),
            axes: Vec::new(),
            buttons: Vec::new(),
            hats: Vec::new(),
        }
    }

    pub fn axis(&self, idx: u16) -> f32 {
        self.axes.get(idx as usize).copied().unwrap_or(0.0)
    }

    pub fn button(&self, idx: u16) -> bool {
        self.buttons.get(idx as usize).copied().unwrap_or(false)
    }

    pub fn hat(&self, idx: u16) -> i16 {
        self.hats.get(idx as usize).copied().unwrap_or(-1)
    }

    /// Apply a single backend delta, growing the backing vectors as needed.
    pub fn apply(&mut self, ev: &InputKind) {
        match *ev {
            InputKind::AxisMoved { axis, value } => {
                let idx = axis as usize;
                if self.axes.len() <= idx {
                    self.axes.resize(idx + 1, 0.0);
                }
                self.axes[idx] = value;
            }
            InputKind::ButtonPressed { button } => {
                let idx = button as usize;
                if self.buttons.len() <= idx {
                    self.buttons.resize(idx + 1, false);
                }
                self.buttons[idx] = true;
            }
            InputKind::ButtonReleased { button } => {
                let idx = button as usize;
                if self.buttons.len() <= idx {
                    self.buttons.resize(idx + 1, false);
                }
                self.buttons[idx] = false;
            }
            InputKind::HatChanged { hat, value } => {
                let idx = hat as usize;
                if self.hats.len() <= idx {
                    self.hats.resize(idx + 1, -1);
                }
                self.hats[idx] = value;
            }
        }
    }

    /// `true` iff every axis differs from `other` by at most `epsilon` and
    /// every button/hat is identical (spec §4.2 change detection).
    pub fn within_jitter(&self, other: &Sample, epsilon: f32) -> bool {
        if self.buttons != other.buttons || self.hats != other.hats {
            return false;
        }
        if self.axes.len() != other.axes.len() {
            return false;
        }
        self.axes
            .iter()
            .zip(other.axes.iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}
