use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MediaKeyCode, ModifierKeyCode, MouseButton,
};
use keyclack_core::sanitize_duration;
use std::collections::HashMap;
use std::time::Instant;

const VOLUME_STEP: f32 = 0.05;

/// Terminal keys that drive the app instead of producing a sound.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Control {
    Volume(f32),
    Reload,
    Quit,
}

pub fn control_for(event: &KeyEvent) -> Option<Control> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
    match event.code {
        KeyCode::Esc => Some(Control::Quit),
        KeyCode::Char('c') if ctrl => Some(Control::Quit),
        KeyCode::Char('r') if ctrl => Some(Control::Reload),
        KeyCode::Up if ctrl => Some(Control::Volume(VOLUME_STEP)),
        KeyCode::Down if ctrl => Some(Control::Volume(-VOLUME_STEP)),
        _ => None,
    }
}

/// Stable identifier for a key: the lowercase character for printable keys, `Key.<name>`
/// for everything else. `None` for keys with no sound.
pub fn key_id(code: KeyCode) -> Option<String> {
    let name = match code {
        KeyCode::Char(' ') => "space",
        KeyCode::Char(c) => return Some(c.to_lowercase().collect()),
        KeyCode::Enter => "enter",
        KeyCode::Backspace => "backspace",
        KeyCode::Delete => "delete",
        KeyCode::Tab | KeyCode::BackTab => "tab",
        KeyCode::Esc => "escape",
        KeyCode::Insert => "insert",
        KeyCode::Home => "home",
        KeyCode::End => "end",
        KeyCode::PageUp => "page_up",
        KeyCode::PageDown => "page_down",
        KeyCode::Up => "up",
        KeyCode::Down => "down",
        KeyCode::Left => "left",
        KeyCode::Right => "right",
        KeyCode::CapsLock => "caps_lock",
        KeyCode::NumLock => "num_lock",
        KeyCode::ScrollLock => "scroll_lock",
        KeyCode::Pause => "pause",
        KeyCode::PrintScreen => "print_screen",
        KeyCode::Menu => "menu",
        KeyCode::F(n) => return Some(format!("Key.f{n}")),
        KeyCode::Media(MediaKeyCode::PlayPause) => "media_play_pause",
        KeyCode::Media(MediaKeyCode::RaiseVolume) => "media_volume_up",
        KeyCode::Media(MediaKeyCode::LowerVolume) => "media_volume_down",
        KeyCode::Modifier(m) => modifier_name(m),
        _ => return None,
    };
    Some(format!("Key.{name}"))
}

fn modifier_name(code: ModifierKeyCode) -> &'static str {
    match code {
        ModifierKeyCode::LeftShift => "shift_l",
        ModifierKeyCode::RightShift => "shift_r",
        ModifierKeyCode::LeftControl => "ctrl_l",
        ModifierKeyCode::RightControl => "ctrl_r",
        ModifierKeyCode::LeftAlt => "alt_l",
        ModifierKeyCode::RightAlt => "alt_r",
        ModifierKeyCode::IsoLevel3Shift | ModifierKeyCode::IsoLevel5Shift => "alt_gr",
        ModifierKeyCode::LeftSuper | ModifierKeyCode::LeftHyper | ModifierKeyCode::LeftMeta => {
            "cmd"
        }
        ModifierKeyCode::RightSuper
        | ModifierKeyCode::RightHyper
        | ModifierKeyCode::RightMeta => "cmd_r",
    }
}

pub fn button_id(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "Button.left",
        MouseButton::Right => "Button.right",
        MouseButton::Middle => "Button.middle",
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputAction {
    Press {
        key_id: String,
        last_key_id: String,
    },
    Release {
        key_id: String,
        duration_s: f64,
        last_key_id: String,
    },
    Click {
        button_id: String,
        last_key_id: String,
    },
}

/// Held keys and the previous key, turned into engine input.
///
/// Terminals that cannot report releases only ever produce presses; held state is not
/// tracked for them so a key is never stuck.
pub struct KeyTracker {
    reports_releases: bool,
    pressed: HashMap<String, Instant>,
    last_key: String,
}

impl KeyTracker {
    pub fn new(reports_releases: bool) -> Self {
        Self {
            reports_releases,
            pressed: HashMap::new(),
            last_key: String::new(),
        }
    }

    /// `None` for auto-repeat of a key already held.
    pub fn press(&mut self, key_id: &str, at: Instant) -> Option<InputAction> {
        if self.reports_releases {
            if self.pressed.contains_key(key_id) {
                return None;
            }
            self.pressed.insert(key_id.to_string(), at);
        }
        let last_key_id = std::mem::replace(&mut self.last_key, key_id.to_string());
        Some(InputAction::Press {
            key_id: key_id.to_string(),
            last_key_id,
        })
    }

    /// `None` when the key was never seen going down.
    pub fn release(&mut self, key_id: &str, at: Instant) -> Option<InputAction> {
        let pressed_at = self.pressed.remove(key_id)?;
        let held = at.saturating_duration_since(pressed_at).as_secs_f64();
        Some(InputAction::Release {
            key_id: key_id.to_string(),
            duration_s: sanitize_duration(held),
            last_key_id: self.last_key.clone(),
        })
    }

    pub fn click(&mut self, button_id: &str) -> InputAction {
        let last_key_id = std::mem::replace(&mut self.last_key, button_id.to_string());
        InputAction::Click {
            button_id: button_id.to_string(),
            last_key_id,
        }
    }

    pub fn held(&self) -> usize {
        self.pressed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn key_ids_follow_the_heavy_key_names() {
        assert_eq!(key_id(KeyCode::Char('A')).as_deref(), Some("a"));
        assert_eq!(key_id(KeyCode::Char(' ')).as_deref(), Some("Key.space"));
        assert_eq!(key_id(KeyCode::Enter).as_deref(), Some("Key.enter"));
        assert_eq!(key_id(KeyCode::F(5)).as_deref(), Some("Key.f5"));
        assert_eq!(
            key_id(KeyCode::Modifier(ModifierKeyCode::LeftShift)).as_deref(),
            Some("Key.shift_l")
        );
        assert_eq!(key_id(KeyCode::Null), None);
        for code in [KeyCode::Char(' '), KeyCode::Tab, KeyCode::Up, KeyCode::F(12)] {
            let id = key_id(code).unwrap();
            assert!(keyclack_core::is_heavy_key(&id), "{id}");
        }
    }

    #[test]
    fn controls() {
        let ctrl = |code| KeyEvent::new(code, KeyModifiers::CONTROL);
        assert_eq!(control_for(&ctrl(KeyCode::Up)), Some(Control::Volume(VOLUME_STEP)));
        assert_eq!(control_for(&ctrl(KeyCode::Down)), Some(Control::Volume(-VOLUME_STEP)));
        assert_eq!(control_for(&ctrl(KeyCode::Char('r'))), Some(Control::Reload));
        assert_eq!(
            control_for(&KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)),
            Some(Control::Quit)
        );
        assert_eq!(
            control_for(&KeyEvent::new(KeyCode::Up, KeyModifiers::NONE)),
            None
        );
    }

    #[test]
    fn release_carries_hold_time_and_previous_key() {
        let mut keys = KeyTracker::new(true);
        let t0 = Instant::now();
        assert_eq!(
            keys.press("a", t0),
            Some(InputAction::Press {
                key_id: "a".to_string(),
                last_key_id: String::new()
            })
        );
        assert_eq!(keys.press("a", t0 + Duration::from_millis(30)), None);
        keys.press("b", t0 + Duration::from_millis(50));

        match keys.release("a", t0 + Duration::from_millis(120)) {
            Some(InputAction::Release {
                duration_s,
                last_key_id,
                ..
            }) => {
                assert!((duration_s - 0.12).abs() < 1e-9);
                assert_eq!(last_key_id, "b");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(keys.release("a", t0), None);
        assert_eq!(keys.held(), 1);
    }

    #[test]
    fn absurd_hold_times_fall_back() {
        let mut keys = KeyTracker::new(true);
        let t0 = Instant::now();
        keys.press("a", t0);
        match keys.release("a", t0 + Duration::from_secs(30)) {
            Some(InputAction::Release { duration_s, .. }) => assert_eq!(duration_s, 0.08),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn press_only_terminals_never_hold_keys() {
        let mut keys = KeyTracker::new(false);
        let t0 = Instant::now();
        assert!(keys.press("a", t0).is_some());
        assert!(keys.press("a", t0).is_some());
        assert_eq!(keys.held(), 0);
        assert_eq!(
            keys.click(button_id(MouseButton::Middle)),
            InputAction::Click {
                button_id: "Button.middle".to_string(),
                last_key_id: "a".to_string()
            }
        );
    }
}
