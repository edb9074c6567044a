//! Keystroke Sink (spec §4.6): schedule synthesized key press/release with
//! modifier ordering and a strict reverse-release obligation.
//!
//! Grounded on the teacher's `backends/windows/raw_input.rs`
//! (`pack_key_index`'s extended-flag convention, mirrored here for the send
//! direction) and the crate's `windows-sys` dependency for `SendInput`.

use std::time::Duration;

/// Default spacing between synthesized key events in a sequence (spec
/// §4.6 "~25 ms").
pub const DEFAULT_INTER_EVENT_SPACING: Duration = Duration::from_millis(25);

/// Navigation, numpad-non-digit, and right-modifier virtual keys require
/// the extended-key flag when sent via `SendInput`/`keybd_event`.
pub fn needs_extended_flag(vk: u16) -> bool {
    const VK_RIGHT_MENU: u16 = 0xA5;
    const VK_RIGHT_CONTROL: u16 = 0xA3;
    const VK_INSERT: u16 = 0x2D;
    const VK_DELETE: u16 = 0x2E;
    const VK_HOME: u16 = 0x24;
    const VK_END: u16 = 0x23;
    const VK_PRIOR: u16 = 0x21; // Page Up
    const VK_NEXT: u16 = 0x22; // Page Down
    const VK_LEFT: u16 = 0x25;
    const VK_UP: u16 = 0x26;
    const VK_RIGHT: u16 = 0x27;
    const VK_DOWN: u16 = 0x28;
    const VK_NUMLOCK: u16 = 0x90;
    const VK_DIVIDE: u16 = 0x6F; // numpad '/'

    matches!(
        vk,
        VK_RIGHT_MENU
            | VK_RIGHT_CONTROL
            | VK_INSERT
            | VK_DELETE
            | VK_HOME
            | VK_END
            | VK_PRIOR
            | VK_NEXT
            | VK_LEFT
            | VK_UP
            | VK_RIGHT
            | VK_DOWN
            | VK_NUMLOCK
            | VK_DIVIDE
    )
}

/// Abstraction over the platform key-sending API so the engine/tests can
/// run without actually injecting input.
pub trait KeySender: Send {
    fn send_key_down(&mut self, vk: u16, extended: bool);
    fn send_key_up(&mut self, vk: u16, extended: bool);
}

/// Process-wide "currently pressed" set, touched only by the engine thread
/// and flushed on stop (spec §5, §9 "Global state": legitimate process-wide
/// singleton).
pub struct KeystrokeSink<S: KeySender> {
    sender: S,
    /// Press order, most-recent last, so `release_all` can release in
    /// strict reverse order (spec §4.6, invariant 4).
    pressed_order: Vec<u16>,
}

impl<S: KeySender> KeystrokeSink<S> {
    pub fn new(sender: S) -> Self {
        Self {
            sender,
            pressed_order: Vec::new(),
        }
    }

    pub fn press(&mut self, vk: u16) {
        if self.pressed_order.contains(&vk) {
            return;
        }
        self.sender.send_key_down(vk, needs_extended_flag(vk));
        self.pressed_order.push(vk);
    }

    pub fn release(&mut self, vk: u16) {
        if let Some(pos) = self.pressed_order.iter().position(|&k| k == vk) {
            self.sender.send_key_up(vk, needs_extended_flag(vk));
            self.pressed_order.remove(pos);
        }
    }

    /// Release every currently-pressed key in strict reverse-of-press
    /// order (spec §4.6 obligation; §9 "Every `press(key)` must be released
    /// by `release_all` on engine stop").
    pub fn release_all(&mut self) {
        while let Some(vk) = self.pressed_order.pop() {
            self.sender.send_key_up(vk, needs_extended_flag(vk));
        }
    }

    /// Press a composite sequence: modifiers in canonical order, then the
    /// main key. Returns the order actually pressed, so a caller can
    /// release in exactly reversed order later.
    pub fn press_composite(&mut self, modifiers: &[u16], main: u16) -> Vec<u16> {
        let mut order = Vec::with_capacity(modifiers.len() + 1);
        for &m in modifiers {
            self.press(m);
            order.push(m);
        }
        self.press(main);
        order.push(main);
        order
    }

    pub fn is_pressed(&self, vk: u16) -> bool {
        self.pressed_order.contains(&vk)
    }
}

#[cfg(windows)]
pub mod win32_sender {
    use super::KeySender;
    use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_EXTENDEDKEY,
        KEYEVENTF_KEYUP,
    };

    pub struct Win32KeySender;

    impl Win32KeySender {
        fn send(vk: u16, extended: bool, key_up: bool) {
            let mut flags = 0u32;
            if extended {
                flags |= KEYEVENTF_EXTENDEDKEY;
            }
            if key_up {
                flags |= KEYEVENTF_KEYUP;
            }
            let input = INPUT {
                r#type: INPUT_KEYBOARD,
                Anonymous: INPUT_0 {
                    ki: KEYBDINPUT {
                        wVk: vk,
                        wScan: 0,
                        dwFlags: flags,
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            };
            unsafe {
                SendInput(1, &input, std::mem::size_of::<INPUT>() as i32);
            }
        }
    }

    impl KeySender for Win32KeySender {
        fn send_key_down(&mut self, vk: u16, extended: bool) {
            Self::send(vk, extended, false);
        }
        fn send_key_up(&mut self, vk: u16, extended: bool) {
            Self::send(vk, extended, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSender {
        events: Vec<(u16, bool)>, // (vk, is_down)
    }

    impl KeySender for RecordingSender {
        fn send_key_down(&mut self, vk: u16, _extended: bool) {
            self.events.push((vk, true));
        }
        fn send_key_up(&mut self, vk: u16, _extended: bool) {
            self.events.push((vk, false));
        }
    }

    #[test]
    fn invariant_4_no_leaked_keys_across_stop() {
        let mut sink = KeystrokeSink::new(RecordingSender::default());
        sink.press(0x41);
        sink.press(0x42);
        sink.press(0x43);
        sink.release_all();
        assert!(sink.pressed_order.is_empty());
        let downs: Vec<u16> = sink
            .sender
            .events
            .iter()
            .filter(|(_, down)| *down)
            .map(|(vk, _)| *vk)
            .collect();
        let ups: Vec<u16> = sink
            .sender
            .events
            .iter()
            .filter(|(_, down)| !*down)
            .map(|(vk, _)| *vk)
            .collect();
        assert_eq!(downs, vec![0x41, 0x42, 0x43]);
        assert_eq!(ups, vec![0x43, 0x42, 0x41]);
    }

    #[test]
    fn composite_release_reverses_press_order() {
        let mut sink = KeystrokeSink::new(RecordingSender::default());
        let order = sink.press_composite(&[0x11, 0x12], 0x43); // Ctrl, Alt, 'C'
        for &vk in order.iter().rev() {
            sink.release(vk);
        }
        let ups: Vec<u16> = sink
            .sender
            .events
            .iter()
            .filter(|(_, down)| !*down)
            .map(|(vk, _)| *vk)
            .collect();
        assert_eq!(ups, vec![0x43, 0x12, 0x11]);
    }
}
