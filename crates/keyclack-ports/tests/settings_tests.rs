use keyclack_ports::{DeviceId, EngineSettings, KeyBindings, Volume01, PACK_FOLDER_KEY};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[test]
fn empty_settings_file_yields_defaults() {
    let settings: EngineSettings = serde_json::from_str("{}").unwrap();
    assert_eq!(settings, EngineSettings::default());
    assert_eq!(settings.mixer.sample_rate_hz, 44_100);
    assert_eq!(settings.mixer.buffer_size_frames, Some(512));
    assert_eq!(settings.engine.polyphony, 32);
    assert_eq!(settings.engine.queue_capacity, 128);
    assert_eq!(settings.engine.housekeeping_interval, 40);
    assert_eq!(settings.wpm.window, 15);
    assert_eq!(settings.volume, Volume01::new(0.8));
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let json = r#"{
        "mixer": { "device": "USB DAC", "sample_rate_hz": 48000 },
        "engine": { "polyphony": 16 },
        "sounds": { "dir": "/tmp/clicks", "mouse_middle": "wheel.wav" },
        "volume": 0.5
    }"#;
    let settings: EngineSettings = serde_json::from_str(json).unwrap();

    assert_eq!(settings.mixer.device, Some(DeviceId("USB DAC".into())));
    assert_eq!(settings.mixer.sample_rate_hz, 48_000);
    assert_eq!(settings.mixer.channels, 2);
    assert_eq!(settings.engine.polyphony, 16);
    assert_eq!(settings.engine.batch_max, 32);
    assert_eq!(settings.sounds.key_path(), PathBuf::from("/tmp/clicks/key.wav"));
    assert_eq!(
        settings.sounds.mouse_middle_path(),
        PathBuf::from("/tmp/clicks/wheel.wav")
    );
    assert_eq!(settings.volume.get(), 0.5);
}

#[test]
fn middle_click_falls_back_to_mouse_file() {
    let settings = EngineSettings::default();
    assert_eq!(
        settings.sounds.mouse_middle_path(),
        settings.sounds.mouse_path()
    );
}

#[test]
fn volume_is_clamped() {
    assert_eq!(Volume01::new(1.7).get(), 1.0);
    assert_eq!(Volume01::new(-0.2).get(), 0.0);
}

#[test]
fn bindings_split_pack_folder_sentinel() {
    let json = r#"{ "a": "/s/a.wav", "__pack_folder__": "/packs/cream", "space": "/s/space.wav" }"#;
    let bindings: KeyBindings = serde_json::from_str(json).unwrap();

    assert_eq!(bindings.pack_folder(), Some(Path::new("/packs/cream")));
    assert_eq!(bindings.sound_count(), 2);
    let keys: Vec<&str> = bindings.sounds().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["a", "space"]);
}

#[test]
fn bindings_serialize_back_to_flat_map() {
    let mut bindings = KeyBindings::new();
    bindings.bind_sound("enter", "/s/enter.wav");
    bindings.set_pack_folder(Some(PathBuf::from("/packs/box")));

    let raw: BTreeMap<String, PathBuf> =
        serde_json::from_value(serde_json::to_value(&bindings).unwrap()).unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(raw[PACK_FOLDER_KEY], PathBuf::from("/packs/box"));
    assert_eq!(raw["enter"], PathBuf::from("/s/enter.wav"));
}

#[test]
fn bindings_skip_blank_entries_and_unbind() {
    let json = r#"{ "": "/s/x.wav", "b": "" , "c": "/s/c.wav" }"#;
    let mut bindings: KeyBindings = serde_json::from_str(json).unwrap();
    assert_eq!(bindings.sound_count(), 1);

    assert!(bindings.unbind("c"));
    assert!(!bindings.unbind("c"));
    assert!(bindings.is_empty());
}
