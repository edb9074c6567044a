//! Input backends for Asteriq.
//!
//! Real device access lives under [`windows`] (HID descriptor polling,
//! XInput, and Raw Input ingestion). There is no non-Windows backend: the
//! device layer is Windows-only by design (spec.md "Non-goals").

#[cfg(windows)]
pub mod windows;

#[cfg(windows)]
pub use windows::{probe_devices, probe_for_backend, probe_hid_devices, probe_xinput_devices};
