#![cfg_attr(docsrs, feature(doc_cfg))]
//! `asteriq`: Windows HOTAS middleware. Reads physical flight-stick/
//! throttle/pedal hardware at high rate, applies a per-profile curve and
//! mapping pipeline, and drives virtual joystick slots and synthesized
//! keystrokes. A companion pipeline extracts simulator action schemas and
//! exports/imports rebinding files.
//!
//! # Platform support
//! Windows only, by design: HID descriptor polling and XInput via
//! [`backends::windows`], virtual-slot output via the `vjoy` driver
//! family, and keystroke synthesis via `SendInput`.
//!
//! # Modules
//! - [`device`] — device registry, identity, and virtual slot bookkeeping
//! - [`event`] — [`event::Sample`]/[`event::InputKind`] wire types shared by every backend
//! - [`backends`] — platform-specific device polling
//! - [`poller`] — fixed-rate polling worker thread
//! - [`curve`] — axis curve/deadzone math, button mode state machine, merge operators
//! - [`mapping`] — mapping profile data model and the per-sample engine
//! - [`virtual_sink`] — virtual joystick slot output
//! - [`keystroke`] — synthesized key press/release
//! - [`detection`] — "press a button to bind" input-detection service
//! - [`profile_store`] — JSON profile persistence
//! - [`settings`] — application settings persistence
//! - [`binding`] — simulator archive/schema/export pipeline
//! - [`hide_gate`] — device-hiding driver CLI wrapper
//! - [`manager`] — top-level orchestrator
//!
//! # Feature flags
//! - **`hid`** — enables the Windows HID backend (default).
//! - **`xinput`** — enables the Windows XInput backend.
//! - **`virtual-sink`** — enables the `vjoy`-backed virtual device sink (default).
//! - **`debug-log`** — verbose backend connect/disconnect tracing.
//!
//! ## Threading
//! [`Manager`] owns every live device handle and is intended to live on
//! one thread; if multiple threads need to interact, route calls through
//! a message-passing façade on a single thread that owns the `Manager`.

pub mod backends;
pub mod binding;
pub mod curve;
pub mod detection;
pub mod device;
pub mod error;
pub mod event;
pub mod hide_gate;
pub mod keystroke;
pub mod manager;
pub mod mapping;
pub mod metadata;
pub mod poller;
pub mod profile_store;
pub mod settings;
pub mod virtual_sink;

pub use error::{AsteriqError, Result};
pub use manager::Manager;

/// A small prelude for downstreams that just want the common types.
pub mod prelude {
    pub use crate::curve::{AxisCurve, ButtonMode, MergeOp};
    pub use crate::detection::{DetectedInput, DetectionFilter, InputDetectionService};
    pub use crate::device::{DeviceRegistry, PhysicalDevice, VirtualSlot};
    pub use crate::event::{ChannelKind, InputKind, InputSource, Sample};
    pub use crate::manager::{Manager, ManagerEvent};
    pub use crate::mapping::{MappingProfile, OutputTarget};
    pub use crate::profile_store::ProfileStore;
    pub use crate::settings::AppSettings;
}
