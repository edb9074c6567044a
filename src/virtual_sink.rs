//! Virtual Device Sink (spec §4.5, §6.4): acquire/release 16 vJoy-style
//! slots and write axes/buttons/POVs.
//!
//! Grounded on the `vjoy` crate usage pattern in the wider input-mapping
//! corpus (`VJoy::from_default_dll_location()`), generalized from the
//! teacher's own `backends/virtual_input.rs` stub, which was too minimal
//! (a single in-memory fake device) to implement the real driver contract.

use crate::error::{AsteriqError, Result};

/// 1-based POV direction as written by `set_discrete_pov`
/// (`-1` neutral, `0..3` = N/E/S/W).
pub type DiscretePov = i8;

/// Abstraction over the vJoy feeder API so the mapping engine can be
/// exercised in tests without a real driver installed.
pub trait VirtualDeviceSink: Send {
    fn acquire(&mut self, slot: u8) -> Result<()>;
    fn release(&mut self, slot: u8);
    fn set_axis(&mut self, slot: u8, axis_id: u8, value: f32) -> Result<()>;
    fn set_button(&mut self, slot: u8, index_1based: u8, pressed: bool) -> Result<()>;
    fn set_discrete_pov(&mut self, slot: u8, pov: u8, direction: DiscretePov) -> Result<()>;
    fn set_continuous_pov(&mut self, slot: u8, pov: u8, angle_deg: Option<f32>) -> Result<()>;
    fn reset(&mut self, slot: u8);
}

/// Linear encode of `[-1, 1]` onto the backend integer range `[0, 32767]`
/// centered at `16384` (spec §4.5 "Axis encoding").
pub fn encode_axis(value: f32) -> u16 {
    let clamped = value.clamp(-1.0, 1.0);
    let scaled = (clamped + 1.0) / 2.0 * 32767.0;
    scaled.round().clamp(0.0, 32767.0) as u16
}

#[cfg(windows)]
pub mod vjoy_backend {
    use super::*;
    use std::collections::HashMap;

    /// Real backend over the `vjoy` crate's feeder API.
    ///
    /// `vjoy::VJoy` exposes per-device handles keyed by 1-based slot id;
    /// this wrapper keeps a cache of acquired device handles and reports
    /// `DriverMismatch`/`SlotBusy`/`SlotMissing` the way spec §4.5 requires.
    pub struct VJoySink {
        vjoy: vjoy::VJoy,
        acquired: HashMap<u8, ()>,
    }

    impl VJoySink {
        pub fn new() -> Result<Self> {
            let vjoy = vjoy::VJoy::from_default_dll_location().map_err(|e| {
                AsteriqError::DriverMismatch {
                    lib_ver: "bundled".into(),
                    drv_ver: format!("{e:?}"),
                }
            })?;
            Ok(Self {
                vjoy,
                acquired: HashMap::new(),
            })
        }
    }

    impl VirtualDeviceSink for VJoySink {
        fn acquire(&mut self, slot: u8) -> Result<()> {
            if self.acquired.contains_key(&slot) {
                return Err(AsteriqError::SlotAlreadyOwned(slot));
            }
            let device = self
                .vjoy
                .get_device_state(slot as u32)
                .map_err(|_| AsteriqError::SlotMissing(slot))?;
            drop(device);
            self.acquired.insert(slot, ());
            Ok(())
        }

        fn release(&mut self, slot: u8) {
            self.acquired.remove(&slot);
        }

        fn set_axis(&mut self, slot: u8, axis_id: u8, value: f32) -> Result<()> {
            if !self.acquired.contains_key(&slot) {
                return Err(AsteriqError::SlotMissing(slot));
            }
            let encoded = encode_axis(value);
            let axis = axis_from_semantic_id(axis_id);
            self.vjoy
                .set_axis(slot as u32, axis, encoded as i32)
                .map_err(|_| AsteriqError::DeviceLost(slot))
        }

        fn set_button(&mut self, slot: u8, index_1based: u8, pressed: bool) -> Result<()> {
            if !self.acquired.contains_key(&slot) {
                return Err(AsteriqError::SlotMissing(slot));
            }
            self.vjoy
                .set_button(slot as u32, index_1based as u32, pressed)
                .map_err(|_| AsteriqError::DeviceLost(slot))
        }

        fn set_discrete_pov(&mut self, slot: u8, pov: u8, direction: DiscretePov) -> Result<()> {
            if !self.acquired.contains_key(&slot) {
                return Err(AsteriqError::SlotMissing(slot));
            }
            self.vjoy
                .set_discrete_pov(slot as u32, pov as u32, direction)
                .map_err(|_| AsteriqError::DeviceLost(slot))
        }

        fn set_continuous_pov(
            &mut self,
            slot: u8,
            pov: u8,
            angle_deg: Option<f32>,
        ) -> Result<()> {
            if !self.acquired.contains_key(&slot) {
                return Err(AsteriqError::SlotMissing(slot));
            }
            let encoded = angle_deg.map(|d| (d * 100.0).round() as i32).unwrap_or(-1);
            self.vjoy
                .set_continuous_pov(slot as u32, pov as u32, encoded)
                .map_err(|_| AsteriqError::DeviceLost(slot))
        }

        fn reset(&mut self, slot: u8) {
            let _ = self.vjoy.reset_device(slot as u32);
        }
    }

    /// Map X/Y/Z/Rx/Ry/Rz/Slider0/Slider1/Wheel/POV to vJoy's numeric usage
    /// codes (`0x30..0x39`), per spec §6.4.
    fn axis_from_semantic_id(id: u8) -> vjoy::Axis {
        match id {
            0 => vjoy::Axis::X,
            1 => vjoy::Axis::Y,
            2 => vjoy::Axis::Z,
            3 => vjoy::Axis::RX,
            4 => vjoy::Axis::RY,
            5 => vjoy::Axis::RZ,
            6 => vjoy::Axis::SL0,
            7 => vjoy::Axis::SL1,
            _ => vjoy::Axis::X,
        }
    }
}

/// In-memory sink used by tests and by any non-Windows build; records the
/// last value written to every output so test assertions can inspect sink
/// state without a driver.
#[derive(Default)]
pub struct FakeVirtualSink {
    pub owned: std::collections::HashSet<u8>,
    pub axes: std::collections::HashMap<(u8, u8), f32>,
    pub buttons: std::collections::HashMap<(u8, u8), bool>,
    pub discrete_povs: std::collections::HashMap<(u8, u8), DiscretePov>,
    pub continuous_povs: std::collections::HashMap<(u8, u8), Option<f32>>,
}

impl VirtualDeviceSink for FakeVirtualSink {
    fn acquire(&mut self, slot: u8) -> Result<()> {
        if self.owned.contains(&slot) {
            return Err(AsteriqError::SlotAlreadyOwned(slot));
        }
        self.owned.insert(slot);
        Ok(())
    }

    fn release(&mut self, slot: u8) {
        self.owned.remove(&slot);
    }

    fn set_axis(&mut self, slot: u8, axis_id: u8, value: f32) -> Result<()> {
        self.axes.insert((slot, axis_id), value.clamp(-1.0, 1.0));
        Ok(())
    }

    fn set_button(&mut self, slot: u8, index_1based: u8, pressed: bool) -> Result<()> {
        self.buttons.insert((slot, index_1based), pressed);
        Ok(())
    }

    fn set_discrete_pov(&mut self, slot: u8, pov: u8, direction: DiscretePov) -> Result<()> {
        self.discrete_povs.insert((slot, pov), direction);
        Ok(())
    }

    fn set_continuous_pov(&mut self, slot: u8, pov: u8, angle_deg: Option<f32>) -> Result<()> {
        self.continuous_povs.insert((slot, pov), angle_deg);
        Ok(())
    }

    fn reset(&mut self, slot: u8) {
        self.axes.retain(|(s, _), _| *s != slot);
        self.buttons.retain(|(s, _), _| *s != slot);
        self.discrete_povs.retain(|(s, _), _| *s != slot);
        self.continuous_povs.retain(|(s, _), _| *s != slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_axis_endpoints_and_center() {
        assert_eq!(encode_axis(-1.0), 0);
        assert_eq!(encode_axis(0.0), 16384);
        assert_eq!(encode_axis(1.0), 32767);
    }
}
