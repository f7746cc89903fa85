use crate::sound_bank::PoolSlot;

/// Keys that sound through the heavy pools.
pub const HEAVY_KEYS: &[&str] = &[
    "Key.space",
    "Key.enter",
    "Key.backspace",
    "Key.delete",
    "Key.shift",
    "Key.shift_r",
    "Key.shift_l",
    "Key.ctrl",
    "Key.ctrl_l",
    "Key.ctrl_r",
    "Key.alt",
    "Key.alt_l",
    "Key.alt_r",
    "Key.alt_gr",
    "Key.tab",
    "Key.caps_lock",
    "Key.escape",
    "Key.insert",
    "Key.home",
    "Key.end",
    "Key.page_up",
    "Key.page_down",
    "Key.f1",
    "Key.f2",
    "Key.f3",
    "Key.f4",
    "Key.f5",
    "Key.f6",
    "Key.f7",
    "Key.f8",
    "Key.f9",
    "Key.f10",
    "Key.f11",
    "Key.f12",
    "Key.up",
    "Key.down",
    "Key.left",
    "Key.right",
    "Key.num_lock",
    "Key.scroll_lock",
    "Key.pause",
    "Key.print_screen",
    "Key.menu",
    "Key.cmd",
    "Key.cmd_r",
    "Key.media_play_pause",
    "Key.media_volume_up",
    "Key.media_volume_down",
];

/// Held duration used when the measured one is not in (0, 10) seconds.
pub const FALLBACK_DURATION_S: f64 = 0.08;

pub fn is_heavy_key(key_id: &str) -> bool {
    HEAVY_KEYS.contains(&key_id)
}

pub fn sanitize_duration(duration_s: f64) -> f64 {
    if duration_s > 0.0 && duration_s < 10.0 {
        duration_s
    } else {
        FALLBACK_DURATION_S
    }
}

pub fn mouse_slot(button_id: &str) -> PoolSlot {
    if button_id.to_ascii_lowercase().contains("middle") {
        PoolSlot::MouseMiddle
    } else {
        PoolSlot::MouseLeft
    }
}

pub fn release_slot(key_id: &str) -> PoolSlot {
    if is_heavy_key(key_id) {
        PoolSlot::HeavyRelease
    } else {
        PoolSlot::NormalRelease
    }
}

pub fn press_slot(key_id: &str, fast: bool) -> PoolSlot {
    match (is_heavy_key(key_id), fast) {
        (true, false) => PoolSlot::HeavySlow,
        (true, true) => PoolSlot::HeavyFast,
        (false, false) => PoolSlot::NormalSlow,
        (false, true) => PoolSlot::NormalFast,
    }
}
