//! Mapping Profile data model (spec §3): shift layers and the five tagged
//! mapping subtypes, each carrying hidden runtime state reset on
//! `load_profile`/`stop`.
//!
//! Grounded on the teacher's `binding.rs` `BindingRule` tagged enum
//! (`#[serde(tag = "kind", rename_all = "snake_case")]`) and
//! `BindingProfile` shape, extended from 3 variants to the 5 spec.md names
//! and from teacher's 2-parameter deadzone/gain curve to the full
//! [`crate::curve::AxisCurve`].

pub mod engine;

use crate::curve::{AxisCurve, ButtonMode, ButtonModeState, MergeOp};
use crate::event::{ChannelKind, InputSource};
use serde::{Deserialize, Serialize};

/// Where a mapping's resolved value is written (spec §3 "Output Target").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputTarget {
    VirtualAxis { slot: u8, axis: u8 },
    VirtualButton { slot: u8, index: u8 },
    VirtualPov { slot: u8, pov: u8 },
    Key { vk: u16, modifiers: Vec<u16> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingBase {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub sources: Vec<InputSource>,
    pub output: OutputTarget,
    pub merge: MergeOp,
    pub invert: bool,
    pub layer_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisMapping {
    #[serde(flatten)]
    pub base: MappingBase,
    pub curve: AxisCurve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonMapping {
    #[serde(flatten)]
    pub base: MappingBase,
    pub mode: ButtonMode,
    pub pulse_ms: u64,
    pub hold_ms: u64,
    #[serde(skip, default)]
    pub state: ButtonModeState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HatMapping {
    #[serde(flatten)]
    pub base: MappingBase,
    pub continuous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisToButtonMapping {
    #[serde(flatten)]
    pub base: MappingBase,
    pub threshold: f32,
    pub activate_above: bool,
    pub hysteresis: f32,
    #[serde(skip, default)]
    pub activated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonToAxisMapping {
    #[serde(flatten)]
    pub base: MappingBase,
    pub pressed_value: f32,
    pub released_value: f32,
    pub smoothing_ms: u64,
    #[serde(skip, default)]
    pub current_value: f32,
    #[serde(skip, default = "crate::mapping::now_opt_none")]
    pub last_update: Option<std::time::Instant>,
}

pub(crate) fn now_opt_none() -> Option<std::time::Instant> {
    None
}

/// A named set of mappings only evaluated while its activator button is
/// held (spec §3 "Shift Layer").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftLayer {
    pub id: String,
    pub name: String,
    pub activator: InputSource,
    #[serde(skip, default)]
    pub active: bool,
}

/// One physical device's channel assigned to a virtual slot, recorded so
/// the UI can show "this stick drives slot 3" without re-deriving it from
/// the mapping list (spec §3 "list of physical→virtual slot assignments").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub device_id: String,
    pub slot_id: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub modified_at: String,
    pub slot_assignments: Vec<SlotAssignment>,
    pub shift_layers: Vec<ShiftLayer>,
    pub axis_mappings: Vec<AxisMapping>,
    pub button_mappings: Vec<ButtonMapping>,
    pub hat_mappings: Vec<HatMapping>,
    pub axis_to_button_mappings: Vec<AxisToButtonMapping>,
    pub button_to_axis_mappings: Vec<ButtonToAxisMapping>,
}

impl MappingProfile {
    /// Reset every mapping's hidden runtime state and every shift layer's
    /// activation flag (spec §4.3 `load_profile`, §4.4.2 "All runtime state
    /// is reset by `load_profile` and `stop`").
    pub fn reset_runtime_state(&mut self) {
        for l in &mut self.shift_layers {
            l.active = false;
        }
        for m in &mut self.button_mappings {
            m.state = ButtonModeState::default();
        }
        for m in &mut self.axis_to_button_mappings {
            m.activated = false;
        }
        for m in &mut self.button_to_axis_mappings {
            m.current_value = m.released_value;
            m.last_update = None;
        }
    }

    /// Validate the cross-field invariants spec §3 requires of an
    /// `AxisCurve` and that every mapping has at least one input source.
    pub fn validate(&self) -> Result<(), String> {
        for m in &self.axis_mappings {
            validate_curve(&m.curve)?;
            validate_sources(&m.base)?;
        }
        for m in &self.button_mappings {
            validate_sources(&m.base)?;
        }
        for m in &self.hat_mappings {
            validate_sources(&m.base)?;
        }
        for m in &self.axis_to_button_mappings {
            validate_sources(&m.base)?;
            if !(0.0..=0.5).contains(&m.hysteresis) {
                return Err(format!("mapping {}: hysteresis out of range", m.base.id));
            }
        }
        for m in &self.button_to_axis_mappings {
            validate_sources(&m.base)?;
        }
        Ok(())
    }
}

fn validate_sources(base: &MappingBase) -> Result<(), String> {
    if base.sources.is_empty() {
        return Err(format!("mapping {}: needs at least one input source", base.id));
    }
    Ok(())
}

fn validate_curve(c: &AxisCurve) -> Result<(), String> {
    if !(-1.0 <= c.low && c.low < c.center_low && c.center_low <= 0.0 && 0.0 <= c.center_high && c.center_high < c.high && c.high <= 1.0)
    {
        return Err("AxisCurve deadzone edges violate low < center_low <= 0 <= center_high < high".into());
    }
    if matches!(c.curve_kind, crate::curve::CurveKind::Custom) {
        if c.control_points.len() < 2 {
            return Err("Custom curve requires at least 2 control points".into());
        }
        let first = c.control_points.first().unwrap();
        let last = c.control_points.last().unwrap();
        if (first.input, first.output) != (0.0, 0.0) || (last.input, last.output) != (1.0, 1.0) {
            return Err("Custom curve must be anchored at (0,0) and (1,1)".into());
        }
        for w in c.control_points.windows(2) {
            if w[1].input <= w[0].input {
                return Err("Custom curve control points must have strictly increasing input".into());
            }
        }
    }
    Ok(())
}

/// Gather this mapping's merged input value from a set of per-device
/// samples, honoring the `invert` flag where applicable to axis-valued
/// reads.
pub(crate) fn gather_axis_values(
    base: &MappingBase,
    samples: &std::collections::HashMap<String, crate::event::Sample>,
) -> Vec<f32> {
    base.sources
        .iter()
        .filter(|s| s.kind == ChannelKind::Axis)
        .filter_map(|s| samples.get(&s.device_id).map(|sm| sm.axis(s.index)))
        .collect()
}

pub(crate) fn gather_button_values(
    base: &MappingBase,
    samples: &std::collections::HashMap<String, crate::event::Sample>,
) -> Vec<bool> {
    base.sources
        .iter()
        .filter(|s| s.kind == ChannelKind::Button)
        .filter_map(|s| samples.get(&s.device_id).map(|sm| sm.button(s.index)))
        .collect()
}

pub(crate) fn gather_hat_values(
    base: &MappingBase,
    samples: &std::collections::HashMap<String, crate::event::Sample>,
) -> Vec<i16> {
    base.sources
        .iter()
        .filter(|s| s.kind == ChannelKind::Hat)
        .filter_map(|s| samples.get(&s.device_id).map(|sm| sm.hat(s.index)))
        .collect()
}
