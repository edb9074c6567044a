#![cfg(target_os = "windows")]

//! Windows input backends (spec §4.2 "two backends ... independently
//! selectable per run").
//!
//! - **HID** discovery and device polling via `hidapi`, report-parsed by
//!   `hidp_parser` into the crate's standard axis/button/hat events
//! - **XInput** controller support, normalized to the same event shape
//! - **Raw Input** helpers for keyboard/mouse ingestion (WM_INPUT parsing)
//!
//! Most users should go through [`crate::manager::Manager`] or
//! [`probe_for_backend`] rather than these modules directly.

pub mod hid_device;
pub mod hid_discovery;
pub mod hidp_parser;
pub mod raw_input;
pub mod xinput_devices;

pub use hid_discovery::probe_devices;
pub use hid_discovery::probe_devices_with_debug;
pub use hid_discovery::{probe_hid_devices, probe_xinput_devices};

use crate::device::Device;
use crate::poller::InputBackend;
use hidapi::HidApi;

/// Enumerate devices for the backend selection a run was configured with
/// (spec §4.2). `Both` runs HID discovery with XInput-compatible endpoints
/// already filtered out, so a physical gamepad is never opened twice.
pub fn probe_for_backend(api: &HidApi, backend: InputBackend) -> Vec<Box<dyn Device>> {
    match backend {
        InputBackend::Hid => probe_hid_devices(api),
        InputBackend::XInput => probe_xinput_devices(),
        InputBackend::Both => probe_devices(api),
    }
}
