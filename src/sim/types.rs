use std::fmt;
use std::str::FromStr;
use rdev::Key;

use crate::error::ConfigError;

/// A keyboard key that can be held down while the PTT button is pressed.
///
/// Parsed from the (case-insensitive) names used in the config file, such as `ctrl`, `shift`,
/// `f9` or `space`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyName {
    name: &'static str,
    key: Key,
}

const NAMED_KEYS: &[(&str, Key)] = &[
    ("ctrl", Key::ControlLeft),
    ("control", Key::ControlLeft),
    ("ctrlleft", Key::ControlLeft),
    ("ctrlright", Key::ControlRight),
    ("shift", Key::ShiftLeft),
    ("shiftleft", Key::ShiftLeft),
    ("shiftright", Key::ShiftRight),
    ("alt", Key::Alt),
    ("altleft", Key::Alt),
    ("altright", Key::AltGr),
    ("altgr", Key::AltGr),
    ("win", Key::MetaLeft),
    ("winleft", Key::MetaLeft),
    ("winright", Key::MetaRight),
    ("cmd", Key::MetaLeft),
    ("command", Key::MetaLeft),
    ("meta", Key::MetaLeft),
    ("space", Key::Space),
    ("enter", Key::Return),
    ("return", Key::Return),
    ("tab", Key::Tab),
    ("esc", Key::Escape),
    ("escape", Key::Escape),
    ("capslock", Key::CapsLock),
    ("backspace", Key::Backspace),
    ("delete", Key::Delete),
    ("del", Key::Delete),
    ("insert", Key::Insert),
    ("home", Key::Home),
    ("end", Key::End),
    ("pageup", Key::PageUp),
    ("pagedown", Key::PageDown),
    ("up", Key::UpArrow),
    ("down", Key::DownArrow),
    ("left", Key::LeftArrow),
    ("right", Key::RightArrow),
    ("scrolllock", Key::ScrollLock),
    ("pause", Key::Pause),
    ("printscreen", Key::PrintScreen),
    ("numlock", Key::NumLock),
    ("f1", Key::F1),
    ("f2", Key::F2),
    ("f3", Key::F3),
    ("f4", Key::F4),
    ("f5", Key::F5),
    ("f6", Key::F6),
    ("f7", Key::F7),
    ("f8", Key::F8),
    ("f9", Key::F9),
    ("f10", Key::F10),
    ("f11", Key::F11),
    ("f12", Key::F12),
];

const LETTER_KEYS: &[(&str, Key)] = &[
    ("a", Key::KeyA), ("b", Key::KeyB), ("c", Key::KeyC), ("d", Key::KeyD), ("e", Key::KeyE),
    ("f", Key::KeyF), ("g", Key::KeyG), ("h", Key::KeyH), ("i", Key::KeyI), ("j", Key::KeyJ),
    ("k", Key::KeyK), ("l", Key::KeyL), ("m", Key::KeyM), ("n", Key::KeyN), ("o", Key::KeyO),
    ("p", Key::KeyP), ("q", Key::KeyQ), ("r", Key::KeyR), ("s", Key::KeyS), ("t", Key::KeyT),
    ("u", Key::KeyU), ("v", Key::KeyV), ("w", Key::KeyW), ("x", Key::KeyX), ("y", Key::KeyY),
    ("z", Key::KeyZ),
];

const DIGIT_KEYS: &[(&str, Key)] = &[
    ("0", Key::Num0), ("1", Key::Num1), ("2", Key::Num2), ("3", Key::Num3), ("4", Key::Num4),
    ("5", Key::Num5), ("6", Key::Num6), ("7", Key::Num7), ("8", Key::Num8), ("9", Key::Num9),
];

fn all_keys() -> impl Iterator<Item = &'static (&'static str, Key)> {
    NAMED_KEYS.iter()
        .chain(LETTER_KEYS.iter())
        .chain(DIGIT_KEYS.iter())
}

impl KeyName {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rdev_key(&self) -> Key {
        self.key
    }

    /// All accepted key names, in a stable order.
    pub fn supported_names() -> Vec<&'static str> {
        all_keys().map(|(name, _)| *name).collect()
    }
}

impl Default for KeyName {
    fn default() -> Self {
        KeyName { name: "ctrl", key: Key::ControlLeft }
    }
}

impl FromStr for KeyName {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace(['_', '-', ' '], "");

        all_keys()
            .find(|(name, _)| *name == normalized)
            .map(|(name, key)| KeyName { name: *name, key: *key })
            .ok_or_else(|| ConfigError::UnknownKey { name: value.to_string() })
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
