//! Scenario F: export a profile with a joystick axis binding and a
//! keyboard binding, parse the emitted file back, and compare bindings
//! field-for-field.

use asteriq::binding::export::{
    import_xml, ActivationMode, DeviceKind, ExportBinding, ExportProfile,
};
use std::collections::HashMap;

#[test]
fn scenario_f_export_round_trip_with_mixed_device_kinds() {
    let mut slot_instance_map = HashMap::new();
    slot_instance_map.insert(1u8, 1u32);

    let profile = ExportProfile {
        name: "Cockpit".to_string(),
        target_environment: "LIVE".to_string(),
        target_build_id: "900000".to_string(),
        slot_instance_map,
        device_instance_map: HashMap::new(),
        bindings: vec![
            ExportBinding {
                action_map: "spaceship_movement".to_string(),
                action_name: "v_pitch".to_string(),
                device_kind: DeviceKind::Joystick,
                instance: 1,
                input_token: "y".to_string(),
                inverted: true,
                activation_mode: ActivationMode::DoubleTap,
                modifiers: vec![],
            },
            ExportBinding {
                action_map: "spaceship_movement".to_string(),
                action_name: "v_strafe_forward".to_string(),
                device_kind: DeviceKind::Keyboard,
                instance: 1,
                input_token: "w".to_string(),
                inverted: false,
                activation_mode: ActivationMode::Press,
                modifiers: vec![],
            },
        ],
        include_keyboard_defaults: true,
        include_mouse_defaults: false,
    };

    let xml = asteriq::binding::export::export_xml(&profile);
    let result = import_xml(xml.as_bytes(), &[1]).unwrap();

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.bindings.len(), 2);

    let pitch = result
        .bindings
        .iter()
        .find(|b| b.action_name == "v_pitch")
        .expect("pitch binding present");
    assert_eq!(pitch.device_kind, DeviceKind::Joystick);
    assert_eq!(pitch.instance, 1);
    assert_eq!(pitch.input_token, "y");
    assert!(pitch.inverted);
    assert_eq!(pitch.activation_mode, ActivationMode::DoubleTap);

    let strafe = result
        .bindings
        .iter()
        .find(|b| b.action_name == "v_strafe_forward")
        .expect("strafe binding present");
    assert_eq!(strafe.device_kind, DeviceKind::Keyboard);
    assert_eq!(strafe.input_token, "w");
    assert!(!strafe.inverted);
    assert_eq!(strafe.activation_mode, ActivationMode::Press);
}
