use keyclack_ports::{PresetError, PresetSet};

const PRESETS: &str = include_str!("../../../assets/presets.json");

fn bundled() -> PresetSet {
    serde_json::from_str(PRESETS).unwrap()
}

#[test]
fn bundled_presets_validate() {
    let presets = bundled();
    presets.validate(44_100).unwrap();
    assert!(presets.heavy_key.bass.is_some());
    assert!(presets.mouse_left.release.is_none());
}

#[test]
fn missing_required_field_fails_to_deserialize() {
    let mut value: serde_json::Value = serde_json::from_str(PRESETS).unwrap();
    value["normal_key"]
        .as_object_mut()
        .unwrap()
        .remove("reverb");
    assert!(serde_json::from_value::<PresetSet>(value).is_err());
}

#[test]
fn optional_sections_default_to_none() {
    let presets = bundled();
    assert!(presets.mouse_middle.bass.is_none());
    assert!(presets.mouse_middle.presence.is_none());
    assert!(presets.mouse_middle.random_pitch.is_none());
}

#[test]
fn cutoff_above_nyquist_is_rejected() {
    let mut presets = bundled();
    presets.highpass_fc_hz = 30_000.0;
    assert!(matches!(
        presets.validate(44_100),
        Err(PresetError::Invalid { field: "highpass_fc_hz", .. })
    ));
}

#[test]
fn non_positive_pitch_is_rejected() {
    let mut presets = bundled();
    presets.heavy_key.pitch.min = 0.0;
    let err = presets.validate(44_100).unwrap_err();
    assert_eq!(
        err,
        PresetError::Invalid {
            preset: "heavy_key".into(),
            field: "pitch",
            reason: "must have a positive minimum".into(),
        }
    );
}

#[test]
fn negative_range_is_rejected() {
    let mut presets = bundled();
    presets.mouse_left.reverb.delay_range = -0.01;
    assert!(presets.validate(44_100).is_err());
}
