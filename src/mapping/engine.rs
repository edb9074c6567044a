//! Mapping Engine (spec §4.3): applies the active [`MappingProfile`] to
//! every [`Sample`] and drives the sinks.
//!
//! Evaluation order within one sample is fixed (spec §5 "Ordering
//! guarantees"): shift layers, then axes, buttons, hats, axis-to-button,
//! button-to-axis. Mappings writing the same output target resolve
//! last-write-wins in that order (spec §9, open question a).

use super::{
    gather_axis_values, gather_button_values, gather_hat_values, MappingProfile, OutputTarget,
};
use crate::curve::quadrant_of;
use crate::event::Sample;
use crate::keystroke::{KeySender, KeystrokeSink};
use crate::virtual_sink::VirtualDeviceSink;
use std::collections::HashMap;
use std::time::Instant;

/// Consecutive virtual-sink write failures on one slot before the engine
/// emits `DeviceLost` and stops writing to it (spec §4.3 "Failure
/// semantics").
const SLOT_FAILURE_BUDGET: u32 = 8;

pub struct MappingEngine<V: VirtualDeviceSink, K: KeySender> {
    profile: MappingProfile,
    sink: V,
    keys: KeystrokeSink<K>,
    acquired_slots: std::collections::HashSet<u8>,
    slot_failures: HashMap<u8, u32>,
    lost_slots: std::collections::HashSet<u8>,
    pub lost_events: Vec<u8>,
}

impl<V: VirtualDeviceSink, K: KeySender> MappingEngine<V, K> {
    pub fn new(profile: MappingProfile, sink: V, key_sender: K) -> Self {
        Self {
            profile,
            sink,
            keys: KeystrokeSink::new(key_sender),
            acquired_slots: Default::default(),
            slot_failures: HashMap::new(),
            lost_slots: Default::default(),
            lost_events: Vec::new(),
        }
    }

    /// The sink driven by this engine's writes, for callers that need to
    /// inspect virtual-device state directly (tests, diagnostics UI).
    pub fn sink(&self) -> &V {
        &self.sink
    }

    /// Validate and install a new profile, resetting all runtime state.
    pub fn load_profile(&mut self, mut profile: MappingProfile) -> Result<(), String> {
        profile.validate()?;
        profile.reset_runtime_state();
        self.profile = profile;
        self.slot_failures.clear();
        self.lost_slots.clear();
        Ok(())
    }

    fn referenced_slots(&self) -> Vec<u8> {
        let mut slots: Vec<u8> = Vec::new();
        let mut push = |t: &OutputTarget| {
            let id = match t {
                OutputTarget::VirtualAxis { slot, .. } => Some(*slot),
                OutputTarget::VirtualButton { slot, .. } => Some(*slot),
                OutputTarget::VirtualPov { slot, .. } => Some(*slot),
                OutputTarget::Key { .. } => None,
            };
            if let Some(s) = id {
                if !slots.contains(&s) {
                    slots.push(s);
                }
            }
        };
        for m in &self.profile.axis_mappings {
            push(&m.base.output);
        }
        for m in &self.profile.button_mappings {
            push(&m.base.output);
        }
        for m in &self.profile.hat_mappings {
            push(&m.base.output);
        }
        for m in &self.profile.axis_to_button_mappings {
            push(&m.base.output);
        }
        for m in &self.profile.button_to_axis_mappings {
            push(&m.base.output);
        }
        slots
    }

    /// Acquire every virtual slot the active profile references. If
    /// `initial_states` is given, write synchronized initial values first
    /// so virtual axes jump to the stick's current position (spec §4.3
    /// `start`).
    pub fn start(
        &mut self,
        initial_states: Option<&HashMap<String, Sample>>,
    ) -> Result<(), String> {
        for slot in self.referenced_slots() {
            if self.acquired_slots.contains(&slot) {
                continue;
            }
            self.sink
                .acquire(slot)
                .map_err(|e| format!("acquire slot {slot}: {e}"))?;
            self.acquired_slots.insert(slot);
        }
        if let Some(samples) = initial_states {
            self.process_samples(samples);
        }
        Ok(())
    }

    /// Release every acquired slot, reset axes to neutral, and release
    /// every pressed key (spec §4.3 `stop`).
    pub fn stop(&mut self) {
        for &slot in self.acquired_slots.clone().iter() {
            self.sink.reset(slot);
            self.sink.release(slot);
        }
        self.acquired_slots.clear();
        self.keys.release_all();
        self.profile.reset_runtime_state();
    }

    /// The hot path: apply the active profile to one `Sample`, updating
    /// the multi-device view and driving the sinks. Never panics on a
    /// single mapping's failure (spec §4.3 "Failure semantics").
    pub fn process_input(&mut self, samples: &mut HashMap<String, Sample>, sample: Sample) {
        samples.insert(sample.device_id.clone(), sample);
        self.process_samples(samples);
    }

    fn process_samples(&mut self, samples: &HashMap<String, Sample>) {
        let now = Instant::now();

        // Step 1: shift layer update.
        for layer in &mut self.profile.shift_layers {
            if let Some(sm) = samples.get(&layer.activator.device_id) {
                layer.active = sm.button(layer.activator.index);
            }
        }
        let active_layers: std::collections::HashSet<String> = self
            .profile
            .shift_layers
            .iter()
            .filter(|l| l.active)
            .map(|l| l.id.clone())
            .collect();
        let layer_active = |layer_id: &Option<String>| match layer_id {
            None => true,
            Some(id) => active_layers.contains(id),
        };

        // Step 2: axis mappings.
        for m in &self.profile.axis_mappings {
            if !m.base.enabled || !layer_active(&m.base.layer_id) {
                continue;
            }
            let values = gather_axis_values(&m.base, samples);
            if values.is_empty() {
                continue;
            }
            let mut merged = m.base.merge.apply(&values);
            if m.base.invert {
                merged = -merged;
            }
            let out = m.curve.apply(merged);
            Self::write_target_static(&mut self.sink, &mut self.keys, &mut self.slot_failures, &mut self.lost_slots, &mut self.lost_events, &m.base.output, TargetValue::Axis(out));
        }

        // Step 3: button mappings.
        for m in &mut self.profile.button_mappings {
            if !m.base.enabled || !layer_active(&m.base.layer_id) {
                continue;
            }
            let values = gather_button_values(&m.base, samples);
            if values.is_empty() {
                continue;
            }
            let merged_f: Vec<f32> = values.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
            let merged = m.base.merge.apply(&merged_f) > 0.5;
            let held = if m.base.invert { !merged } else { merged };
            let out = m.state.step(m.mode, held, m.pulse_ms, m.hold_ms, now);
            Self::write_target_static(&mut self.sink, &mut self.keys, &mut self.slot_failures, &mut self.lost_slots, &mut self.lost_events, &m.base.output, TargetValue::Button(out));
        }

        // Step 4: hat mappings. `base.invert` is not applied here: a hat's
        // value is a clockwise angle or quadrant, not a signed axis, and
        // there is no single inversion that is obviously "the opposite
        // direction" for every possible binding, so inversion is left
        // unsupported for this mapping kind (documented, not silent).
        for m in &self.profile.hat_mappings {
            if !m.base.enabled || !layer_active(&m.base.layer_id) {
                continue;
            }
            let values = gather_hat_values(&m.base, samples);
            let angle = values.into_iter().find(|&v| v >= 0).unwrap_or(-1);
            if m.continuous {
                let a = if angle < 0 { None } else { Some(angle as f32) };
                Self::write_target_static(&mut self.sink, &mut self.keys, &mut self.slot_failures, &mut self.lost_slots, &mut self.lost_events, &m.base.output, TargetValue::ContinuousPov(a));
            } else {
                let dir = match quadrant_of(angle as f32) {
                    Some(crate::curve::Quadrant::North) => 0,
                    Some(crate::curve::Quadrant::East) => 1,
                    Some(crate::curve::Quadrant::South) => 2,
                    Some(crate::curve::Quadrant::West) => 3,
                    None => -1,
                };
                Self::write_target_static(&mut self.sink, &mut self.keys, &mut self.slot_failures, &mut self.lost_slots, &mut self.lost_events, &m.base.output, TargetValue::DiscretePov(dir));
            }
        }

        // Step 5: axis-to-button mappings (threshold + hysteresis).
        for m in &mut self.profile.axis_to_button_mappings {
            if !m.base.enabled || !layer_active(&m.base.layer_id) {
                continue;
            }
            let values = gather_axis_values(&m.base, samples);
            if values.is_empty() {
                continue;
            }
            let mut merged = m.base.merge.apply(&values);
            if m.base.invert {
                merged = -merged;
            }
            let activate_edge = if m.activate_above {
                merged >= m.threshold
            } else {
                merged <= m.threshold
            };
            let deactivate_edge = if m.activate_above {
                merged <= m.threshold - m.hysteresis
            } else {
                merged >= m.threshold + m.hysteresis
            };
            if !m.activated && activate_edge {
                m.activated = true;
            } else if m.activated && deactivate_edge {
                m.activated = false;
            }
            Self::write_target_static(&mut self.sink, &mut self.keys, &mut self.slot_failures, &mut self.lost_slots, &mut self.lost_events, &m.base.output, TargetValue::Button(m.activated));
        }

        // Step 6: button-to-axis mappings (instant jump or time-lerp).
        for m in &mut self.profile.button_to_axis_mappings {
            if !m.base.enabled || !layer_active(&m.base.layer_id) {
                continue;
            }
            let values = gather_button_values(&m.base, samples);
            if values.is_empty() {
                continue;
            }
            let merged_f: Vec<f32> = values.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
            let pressed = m.base.merge.apply(&merged_f) > 0.5;
            let mut target = if pressed {
                m.pressed_value
            } else {
                m.released_value
            };
            if m.base.invert {
                target = -target;
            }
            if m.smoothing_ms == 0 {
                m.current_value = target;
            } else {
                let dt_ms = m
                    .last_update
                    .map(|t0| now.duration_since(t0).as_millis() as f32)
                    .unwrap_or(0.0);
                let step = (dt_ms / m.smoothing_ms as f32).clamp(0.0, 1.0);
                m.current_value += (target - m.current_value) * step;
            }
            m.last_update = Some(now);
            let v = m.current_value;
            Self::write_target_static(&mut self.sink, &mut self.keys, &mut self.slot_failures, &mut self.lost_slots, &mut self.lost_events, &m.base.output, TargetValue::Axis(v));
        }
    }

    /// Helper usable while a mapping list is mutably borrowed: duplicates
    /// `write_target`'s dispatch without needing `&mut self`.
    #[allow(clippy::too_many_arguments)]
    fn write_target_static(
        sink: &mut V,
        keys: &mut KeystrokeSink<K>,
        slot_failures: &mut HashMap<u8, u32>,
        lost_slots: &mut std::collections::HashSet<u8>,
        lost_events: &mut Vec<u8>,
        target: &OutputTarget,
        value: TargetValue,
    ) {
        fn note(
            slot_failures: &mut HashMap<u8, u32>,
            lost_slots: &mut std::collections::HashSet<u8>,
            lost_events: &mut Vec<u8>,
            slot: u8,
            ok: bool,
        ) {
            if lost_slots.contains(&slot) {
                return;
            }
            if ok {
                slot_failures.insert(slot, 0);
            } else {
                let c = slot_failures.entry(slot).or_insert(0);
                *c += 1;
                if *c >= SLOT_FAILURE_BUDGET {
                    lost_slots.insert(slot);
                    lost_events.push(slot);
                }
            }
        }
        match (target, value) {
            (OutputTarget::VirtualAxis { slot, axis }, TargetValue::Axis(v)) => {
                if lost_slots.contains(slot) {
                    return;
                }
                let ok = sink.set_axis(*slot, *axis, v).is_ok();
                note(slot_failures, lost_slots, lost_events, *slot, ok);
            }
            (OutputTarget::VirtualButton { slot, index }, TargetValue::Button(v)) => {
                if lost_slots.contains(slot) {
                    return;
                }
                let ok = sink.set_button(*slot, *index, v).is_ok();
                note(slot_failures, lost_slots, lost_events, *slot, ok);
            }
            (OutputTarget::VirtualPov { slot, pov }, TargetValue::DiscretePov(d)) => {
                if lost_slots.contains(slot) {
                    return;
                }
                let ok = sink.set_discrete_pov(*slot, *pov, d).is_ok();
                note(slot_failures, lost_slots, lost_events, *slot, ok);
            }
            (OutputTarget::VirtualPov { slot, pov }, TargetValue::ContinuousPov(a)) => {
                if lost_slots.contains(slot) {
                    return;
                }
                let ok = sink.set_continuous_pov(*slot, *pov, a).is_ok();
                note(slot_failures, lost_slots, lost_events, *slot, ok);
            }
            (OutputTarget::Key { vk, modifiers }, TargetValue::Button(true)) => {
                for &m in modifiers {
                    keys.press(m);
                }
                keys.press(*vk);
            }
            (OutputTarget::Key { vk, modifiers }, TargetValue::Button(false)) => {
                keys.release(*vk);
                for &m in modifiers.iter().rev() {
                    keys.release(m);
                }
            }
            _ => {}
        }
    }
}

enum TargetValue {
    Axis(f32),
    Button(bool),
    DiscretePov(i8),
    ContinuousPov(Option<f32>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{AxisCurve, ButtonMode, MergeOp};
    use crate::event::{ChannelKind, InputSource};
    use crate::keystroke::KeySender;
    use crate::mapping::{ButtonMapping, MappingBase};
    use crate::virtual_sink::FakeVirtualSink;

    struct NullSender;
    impl KeySender for NullSender {
        fn send_key_down(&mut self, _vk: u16, _extended: bool) {}
        fn send_key_up(&mut self, _vk: u16, _extended: bool) {}
    }

    fn empty_profile() -> MappingProfile {
        MappingProfile {
            id: "p1".into(),
            name: "test".into(),
            description: String::new(),
            created_at: String::new(),
            modified_at: String::new(),
            slot_assignments: Vec::new(),
            shift_layers: Vec::new(),
            axis_mappings: Vec::new(),
            button_mappings: Vec::new(),
            hat_mappings: Vec::new(),
            axis_to_button_mappings: Vec::new(),
            button_to_axis_mappings: Vec::new(),
        }
    }

    #[test]
    fn scenario_e_shift_layer_gating() {
        let mut profile = empty_profile();
        profile.shift_layers.push(crate::mapping::ShiftLayer {
            id: "L".into(),
            name: "shift".into(),
            activator: InputSource {
                device_id: "dev".into(),
                kind: ChannelKind::Button,
                index: 3,
            },
            active: false,
        });
        profile.button_mappings.push(ButtonMapping {
            base: MappingBase {
                id: "m1".into(),
                name: "m1".into(),
                enabled: true,
                sources: vec![InputSource {
                    device_id: "dev".into(),
                    kind: ChannelKind::Button,
                    index: 4,
                }],
                output: OutputTarget::VirtualButton { slot: 1, index: 10 },
                merge: MergeOp::Maximum,
                invert: false,
                layer_id: Some("L".into()),
            },
            mode: ButtonMode::Normal,
            pulse_ms: 0,
            hold_ms: 0,
            state: Default::default(),
        });

        let mut engine = MappingEngine::new(profile, FakeVirtualSink::default(), NullSender);
        engine.start(None).unwrap();

        let mut samples = HashMap::new();
        let mut s1 = Sample::empty("dev");
        s1.buttons = vec![false, false, false, true, true];
        engine.process_input(&mut samples, s1);
        assert_eq!(
            engine.sink.buttons.get(&(1u8, 10u8)).copied(),
            Some(true)
        );

        let mut s2 = Sample::empty("dev");
        s2.buttons = vec![false, false, false, false, true];
        engine.process_input(&mut samples, s2);
        assert_eq!(
            engine.sink.buttons.get(&(1u8, 10u8)).copied(),
            Some(false)
        );
    }

    #[test]
    fn button_to_axis_invert_negates_both_values() {
        let mut profile = empty_profile();
        profile.button_to_axis_mappings.push(crate::mapping::ButtonToAxisMapping {
            base: MappingBase {
                id: "bta".into(),
                name: "bta".into(),
                enabled: true,
                sources: vec![InputSource {
                    device_id: "dev".into(),
                    kind: ChannelKind::Button,
                    index: 0,
                }],
                output: OutputTarget::VirtualAxis { slot: 1, axis: 0 },
                merge: MergeOp::Maximum,
                invert: true,
                layer_id: None,
            },
            pressed_value: 1.0,
            released_value: -1.0,
            smoothing_ms: 0,
            current_value: 0.0,
            last_update: None,
        });
        let mut engine = MappingEngine::new(profile, FakeVirtualSink::default(), NullSender);
        engine.start(None).unwrap();
        let mut samples = HashMap::new();

        let mut released = Sample::empty("dev");
        released.buttons = vec![false];
        engine.process_input(&mut samples, released);
        assert_eq!(engine.sink.axes.get(&(1u8, 0u8)).copied(), Some(1.0));

        let mut pressed = Sample::empty("dev");
        pressed.buttons = vec![true];
        engine.process_input(&mut samples, pressed);
        assert_eq!(engine.sink.axes.get(&(1u8, 0u8)).copied(), Some(-1.0));
    }

    #[test]
    fn invariant_5_disabled_mapping_never_writes() {
        let mut profile = empty_profile();
        profile.axis_mappings.push(crate::mapping::AxisMapping {
            base: MappingBase {
                id: "a1".into(),
                name: "a1".into(),
                enabled: false,
                sources: vec![InputSource {
                    device_id: "dev".into(),
                    kind: ChannelKind::Axis,
                    index: 0,
                }],
                output: OutputTarget::VirtualAxis { slot: 1, axis: 0 },
                merge: MergeOp::Average,
                invert: false,
                layer_id: None,
            },
            curve: AxisCurve::default(),
        });
        let mut engine = MappingEngine::new(profile, FakeVirtualSink::default(), NullSender);
        engine.start(None).unwrap();
        let mut samples = HashMap::new();
        let mut s = Sample::empty("dev");
        s.axes = vec![0.9];
        engine.process_input(&mut samples, s);
        assert!(engine.sink.axes.get(&(1u8, 0u8)).is_none());
    }
}
