//! Device Registry (spec §4.1): physical device discovery/identity, and
//! the 16 virtual slot records.

pub mod fingerprint;

pub use fingerprint::DeviceFingerprint;

use crate::event::{ChannelDesc, InputKind};
use crate::metadata::DeviceMeta;
use std::collections::HashMap;
use std::time::Instant;

/// Context passed to a [`ReportParser`] for one raw report.
pub struct ParseCtx<'a> {
    pub report_id: u8,
    pub now: Instant,
    pub meta: &'a DeviceMeta,
    pub fingerprint: &'a DeviceFingerprint,
}

/// Decodes one backend's raw report bytes into [`InputKind`] deltas.
///
/// Implemented once per backend (HIDP, XInput has no raw report and
/// implements [`Device`] directly).
pub trait ReportParser {
    fn input_report_len(&self) -> Option<usize>;
    fn describe(&self) -> Vec<ChannelDesc>;
    fn parse(&mut self, ctx: &ParseCtx<'_>, payload: &[u8], out: &mut Vec<InputKind>);
    fn expects_report_id_prefix(&self) -> bool;
}

/// A live, pollable physical device.
pub trait Device: Send {
    fn poll(&mut self) -> Vec<InputKind>;
    fn name(&self) -> &str;
    fn id(&self) -> &str;
    fn metadata(&self) -> DeviceMeta;
    fn describe(&self) -> Vec<ChannelDesc>;
}

/// Axis-type hint attached out-of-band from the descriptor (spec §3,
/// "Physical Device ... optional axis-type metadata").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisType {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
    Slider,
}

impl AxisType {
    /// Infer from a Generic Desktop (usage page `0x01`) usage code, the
    /// same usage codes `backends::windows::hidp_parser`'s `describe()` and
    /// `backends::windows::xinput_devices`'s `describe()` both attach to
    /// axis [`ChannelDesc`]s. Returns `None` for any other usage page, or
    /// for a usage Generic Desktop doesn't assign to an axis.
    pub fn from_usage(usage_page: Option<u16>, usage: Option<u16>) -> Option<Self> {
        if usage_page != Some(0x01) {
            return None;
        }
        match usage? {
            0x30 => Some(AxisType::X),
            0x31 => Some(AxisType::Y),
            0x32 => Some(AxisType::Z),
            0x33 => Some(AxisType::Rx),
            0x34 => Some(AxisType::Ry),
            0x35 => Some(AxisType::Rz),
            0x36 => Some(AxisType::Slider),
            _ => None,
        }
    }
}

/// Registry record for one physical controller. Retained across
/// disconnect/reconnect (spec §4.1).
pub struct PhysicalDevice {
    pub id: String,
    pub fingerprint: DeviceFingerprint,
    pub display_name: String,
    pub axis_count: usize,
    pub button_count: usize,
    pub hat_count: usize,
    pub axis_types: Vec<Option<AxisType>>,
    pub connected: bool,
    /// Set when this device's left/right pairing with another same-name
    /// device changed since it was last seen (spec §9, open question c).
    pub swapped_since_last_seen: bool,
    pub(crate) handle: Option<Box<dyn Device>>,
}

impl std::fmt::Debug for PhysicalDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDevice")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("connected", &self.connected)
            .finish()
    }
}

/// Acquisition state of a [`VirtualSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAcquisition {
    Own,
    Free,
    Busy,
    Missing,
}

#[derive(Debug, Clone)]
pub struct VirtualSlot {
    pub slot_id: u8,
    pub exists: bool,
    pub acquisition: SlotAcquisition,
    pub axes_present: u8,
    pub button_count: u8,
    pub pov_count: u8,
}

pub const VIRTUAL_SLOT_COUNT: u8 = 16;

/// Tracks physical devices and virtual slot bookkeeping.
///
/// Device `open`/`close` is non-exclusive and background-scope per spec
/// §4.1; this registry only tracks which ids are currently open so the
/// poller can skip closed devices.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, PhysicalDevice>,
    open_ids: std::collections::HashSet<String>,
    slots: HashMap<u8, VirtualSlot>,
    /// enumeration-order index per display name, used for assignment-style
    /// matching of duplicate-named HOTAS pairs.
    name_order: HashMap<String, Vec<String>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let mut slots = HashMap::new();
        for id in 1..=VIRTUAL_SLOT_COUNT {
            slots.insert(
                id,
                VirtualSlot {
                    slot_id: id,
                    exists: false,
                    acquisition: SlotAcquisition::Missing,
                    axes_present: 0,
                    button_count: 0,
                    pov_count: 0,
                },
            );
        }
        Self {
            devices: HashMap::new(),
            open_ids: Default::default(),
            slots,
            name_order: HashMap::new(),
        }
    }

    /// Idempotent: merges freshly discovered devices into the existing
    /// registry using path-first, then assignment-style name matching.
    /// Disconnected entries missing from `found` are marked
    /// `connected = false` and retained.
    pub fn enumerate(&mut self, found: Vec<Box<dyn Device>>) -> Vec<String> {
        let mut seen_ids = std::collections::HashSet::new();
        let mut touched = Vec::new();

        // group freshly discovered handles by display name for assignment matching.
        let mut by_name: HashMap<String, Vec<Box<dyn Device>>> = HashMap::new();
        for dev in found {
            by_name.entry(dev.name().to_string()).or_default().push(dev);
        }

        for (name, mut handles) in by_name {
            let order = self.name_order.entry(name.clone()).or_default();

            // Path-first: if a handle's id already exists as a record, reuse it directly.
            handles.retain(|dev| {
                let id = dev.id().to_string();
                if self.devices.contains_key(&id) {
                    seen_ids.insert(id.clone());
                    touched.push(id.clone());
                    false
                } else {
                    true
                }
            });

            // Remaining handles: assignment-style, first unassigned record with
            // this name consumes the next live handle in enumeration order.
            let mut cursor = 0usize;
            for dev in handles {
                let id = dev.id().to_string();
                let mut reused = None;
                while cursor < order.len() {
                    let candidate = order[cursor].clone();
                    cursor += 1;
                    if !seen_ids.contains(&candidate) {
                        reused = Some(candidate);
                        break;
                    }
                }

                let target_id = reused.unwrap_or_else(|| id.clone());
                let swapped = target_id != id && self.devices.contains_key(&target_id);
                seen_ids.insert(target_id.clone());
                touched.push(target_id.clone());

                let meta = dev.metadata();
                let channels = dev.describe();
                let axis_count = channels
                    .iter()
                    .filter(|c| c.kind == crate::event::ChannelKind::Axis)
                    .count();
                let button_count = channels
                    .iter()
                    .filter(|c| c.kind == crate::event::ChannelKind::Button)
                    .count();
                let hat_count = channels
                    .iter()
                    .filter(|c| c.kind == crate::event::ChannelKind::Hat)
                    .count();
                let axis_types: Vec<Option<AxisType>> = channels
                    .iter()
                    .filter(|c| c.kind == crate::event::ChannelKind::Axis)
                    .map(|c| AxisType::from_usage(c.usage_page, c.usage))
                    .collect();

                let fingerprint = DeviceFingerprint {
                    vendor_id: meta.vid.unwrap_or(0),
                    product_id: meta.pid.unwrap_or(0),
                    serial_number: meta.serial_number.clone(),
                    path: meta.path.clone(),
                };

                self.devices.insert(
                    target_id.clone(),
                    PhysicalDevice {
                        id: target_id.clone(),
                        fingerprint,
                        display_name: name.clone(),
                        axis_count,
                        button_count,
                        hat_count,
                        axis_types,
                        connected: true,
                        swapped_since_last_seen: swapped,
                        handle: Some(dev),
                    },
                );
                if !order.contains(&target_id) {
                    order.push(target_id);
                }
            }
        }

        for (id, rec) in self.devices.iter_mut() {
            if !seen_ids.contains(id) {
                rec.connected = false;
                rec.handle = None;
            }
        }

        touched
    }

    pub fn devices(&self) -> impl Iterator<Item = &PhysicalDevice> {
        self.devices.values()
    }

    pub fn get(&self, id: &str) -> Option<&PhysicalDevice> {
        self.devices.get(id)
    }

    pub fn open(&mut self, device_id: &str) {
        self.open_ids.insert(device_id.to_string());
    }

    pub fn close(&mut self, device_id: &str) {
        self.open_ids.remove(device_id);
    }

    pub fn is_open(&self, device_id: &str) -> bool {
        self.open_ids.contains(device_id)
    }

    pub fn poll_device(&mut self, device_id: &str) -> Vec<InputKind> {
        if let Some(rec) = self.devices.get_mut(device_id) {
            if let Some(handle) = rec.handle.as_mut() {
                return handle.poll();
            }
        }
        Vec::new()
    }

    pub fn open_device_ids(&self) -> Vec<String> {
        self.open_ids.iter().cloned().collect()
    }

    pub fn slots(&self) -> impl Iterator<Item = &VirtualSlot> {
        self.slots.values()
    }

    pub fn set_slot_capability(
        &mut self,
        slot_id: u8,
        axes_present: u8,
        button_count: u8,
        pov_count: u8,
    ) {
        if let Some(slot) = self.slots.get_mut(&slot_id) {
            slot.exists = true;
            slot.axes_present = axes_present;
            slot.button_count = button_count;
            slot.pov_count = pov_count;
            if slot.acquisition == SlotAcquisition::Missing {
                slot.acquisition = SlotAcquisition::Free;
            }
        }
    }

    pub fn acquire(&mut self, slot_id: u8) -> crate::error::Result<()> {
        let slot = self
            .slots
            .get_mut(&slot_id)
            .ok_or(crate::error::AsteriqError::SlotMissing(slot_id))?;
        match slot.acquisition {
            SlotAcquisition::Missing => Err(crate::error::AsteriqError::SlotMissing(slot_id)),
            SlotAcquisition::Busy => Err(crate::error::AsteriqError::SlotBusy(slot_id)),
            SlotAcquisition::Own => Err(crate::error::AsteriqError::SlotAlreadyOwned(slot_id)),
            SlotAcquisition::Free => {
                slot.acquisition = SlotAcquisition::Own;
                Ok(())
            }
        }
    }

    pub fn release(&mut self, slot_id: u8) {
        if let Some(slot) = self.slots.get_mut(&slot_id) {
            if slot.acquisition == SlotAcquisition::Own {
                slot.acquisition = SlotAcquisition::Free;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_type_infers_from_generic_desktop_usages() {
        assert_eq!(AxisType::from_usage(Some(0x01), Some(0x30)), Some(AxisType::X));
        assert_eq!(AxisType::from_usage(Some(0x01), Some(0x34)), Some(AxisType::Ry));
        assert_eq!(AxisType::from_usage(Some(0x01), Some(0x36)), Some(AxisType::Slider));
    }

    #[test]
    fn axis_type_is_none_outside_generic_desktop() {
        assert_eq!(AxisType::from_usage(Some(0x02), Some(0x30)), None);
        assert_eq!(AxisType::from_usage(None, Some(0x30)), None);
        assert_eq!(AxisType::from_usage(Some(0x01), None), None);
        assert_eq!(AxisType::from_usage(Some(0x01), Some(0x90)), None);
    }
}
