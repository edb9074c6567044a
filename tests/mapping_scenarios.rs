//! End-to-end Mapping Engine scenarios that need the public crate surface
//! rather than engine-internal state (scenario D, invariant 10). Invariant
//! 4 (no leaked keys across `stop`) is covered in `keystroke.rs`'s own
//! `#[cfg(test)]` module, which can assert on press/release order directly.

use asteriq::curve::MergeOp;
use asteriq::event::{ChannelKind, InputSource, Sample};
use asteriq::keystroke::KeySender;
use asteriq::mapping::engine::MappingEngine;
use asteriq::mapping::{AxisToButtonMapping, MappingBase, MappingProfile, OutputTarget};
use asteriq::virtual_sink::FakeVirtualSink;
use std::collections::HashMap;

#[derive(Default)]
struct RecordingSender;

impl KeySender for RecordingSender {
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

/// Scenario D: axis->button with hysteresis, threshold 0.5, hysteresis 0.05.
#[test]
fn scenario_d_axis_to_button_hysteresis() {
    let mut profile = empty_profile();
    profile.axis_to_button_mappings.push(AxisToButtonMapping {
        base: MappingBase {
            id: "a2b".into(),
            name: "a2b".into(),
            enabled: true,
            sources: vec![InputSource {
                device_id: "dev".into(),
                kind: ChannelKind::Axis,
                index: 0,
            }],
            output: OutputTarget::VirtualButton { slot: 1, index: 1 },
            merge: MergeOp::Maximum,
            invert: false,
            layer_id: None,
        },
        threshold: 0.5,
        activate_above: true,
        hysteresis: 0.05,
        activated: false,
    });

    let mut engine = MappingEngine::new(profile, FakeVirtualSink::default(), RecordingSender::default());
    engine.start(None).unwrap();
    let mut samples = HashMap::new();

    let trajectory = [0.4, 0.55, 0.48, 0.43, 0.60];
    let expected = [false, true, true, false, true];
    for (v, want) in trajectory.iter().zip(expected.iter()) {
        let mut s = Sample::empty("dev");
        s.axes = vec![*v];
        engine.process_input(&mut samples, s);
        assert_eq!(
            engine.sink().buttons.get(&(1u8, 1u8)).copied(),
            Some(*want),
            "axis value {v} expected button state {want}"
        );
    }
}

/// Invariant 10: replaying the same sample with no intervening state
/// change yields identical sink writes (non-temporal mappings).
#[test]
fn invariant_10_repeated_sample_is_idempotent() {
    let mut profile = empty_profile();
    profile.axis_mappings.push(asteriq::mapping::AxisMapping {
        base: MappingBase {
            id: "ax".into(),
            name: "ax".into(),
            enabled: true,
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
        curve: asteriq::curve::AxisCurve::default(),
    });

    let mut engine = MappingEngine::new(profile, FakeVirtualSink::default(), RecordingSender::default());
    engine.start(None).unwrap();
    let mut samples = HashMap::new();

    let mut s = Sample::empty("dev");
    s.axes = vec![0.3];
    engine.process_input(&mut samples, s.clone());
    let first = engine.sink().axes.get(&(1u8, 0u8)).copied();
    engine.process_input(&mut samples, s);
    let second = engine.sink().axes.get(&(1u8, 0u8)).copied();
    assert_eq!(first, second);
}
