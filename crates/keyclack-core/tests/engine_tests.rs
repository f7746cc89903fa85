mod common;

use common::*;
use keyclack_core::{
    AudioEngine, ControlCommand, EngineError, EngineEvent, EnginePorts, PoolSlot,
};
use keyclack_ports::audio::PlaybackChannel;
use keyclack_ports::preset::PresetSet;
use keyclack_ports::priority::PriorityPort;
use keyclack_ports::storage::{EngineSettings, KeyBindings, PACK_FOLDER_KEY};
use keyclack_ports::types::Volume01;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn presets() -> PresetSet {
    serde_json::from_str(include_str!("../../../assets/presets.json")).unwrap()
}

fn settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.engine.pool_size = 3;
    settings
}

fn source_with_key_only() -> MockSource {
    MockSource::default()
        .with("sounds/key.wav", click(1200))
        .with("custom/z.wav", click(300))
}

fn full_source() -> MockSource {
    source_with_key_only().with("sounds/mouse.wav", click(800))
}

struct Harness {
    engine: AudioEngine,
    channels: Vec<Arc<MockChannel>>,
    closed: Arc<AtomicBool>,
}

fn harness(source: MockSource, with_packs: bool) -> Harness {
    let channels = mock_channels(8);
    let closed = Arc::new(AtomicBool::new(false));
    let backend = MockBackend {
        channels: channels.clone(),
        closed: closed.clone(),
    };
    let ports = EnginePorts {
        samples: Arc::new(source),
        soundpacks: if with_packs {
            Some(Arc::new(MockPackLoader))
        } else {
            None
        },
        priority: None,
    };
    let engine = AudioEngine::new(settings(), presets(), Box::new(backend), ports).unwrap();
    Harness {
        engine,
        channels,
        closed,
    }
}

#[test]
fn reload_reports_missing_mouse_sound() {
    let mut h = harness(source_with_key_only(), false);
    let report = h.engine.reload(&KeyBindings::new()).unwrap();

    assert_eq!(report.missing_sources, vec![PathBuf::from("sounds/mouse.wav")]);
    assert_eq!(report.pool_size(PoolSlot::NormalSlow), 3);
    assert_eq!(report.pool_size(PoolSlot::HeavyFast), 3);
    assert!(report.pool_size(PoolSlot::NormalRelease) > 0);
    assert_eq!(report.pool_size(PoolSlot::MouseLeft), 0);
    assert_eq!(report.pool_size(PoolSlot::MouseMiddle), 0);
    assert!(!report.soundpack);
    assert_eq!(h.engine.pool_sizes(), report.pool_sizes);
}

#[test]
fn reload_builds_mouse_pools_from_one_file() {
    let mut h = harness(full_source(), false);
    let report = h.engine.reload(&KeyBindings::new()).unwrap();
    assert!(report.missing_sources.is_empty());
    assert_eq!(report.pool_size(PoolSlot::MouseLeft), 3);
    assert_eq!(report.pool_size(PoolSlot::MouseMiddle), 3);
}

#[test]
fn unreadable_bindings_are_skipped() {
    let mut h = harness(full_source(), false);
    let mut bindings = KeyBindings::new();
    bindings.bind_sound("z", "custom/z.wav");
    bindings.bind_sound("y", "custom/missing.wav");
    bindings.bind_sound(PACK_FOLDER_KEY, "/packs/good-pack");

    let report = h.engine.reload(&bindings).unwrap();
    assert_eq!(report.custom_bindings, 1);
    assert!(!report.soundpack);
    let skipped: Vec<(&str, &str)> = report
        .skipped
        .iter()
        .map(|s| (s.key_id.as_str(), s.reason.as_str()))
        .collect();
    assert_eq!(skipped.len(), 2);
    assert_eq!(skipped[0].0, "y");
    assert_eq!(skipped[1], (PACK_FOLDER_KEY, "no soundpack loader"));
}

#[test]
fn soundpack_loads_through_the_loader() {
    let mut h = harness(full_source(), true);
    let mut good = KeyBindings::new();
    good.set_pack_folder(Some(PathBuf::from("/packs/good-pack")));
    let report = h.engine.reload(&good).unwrap();
    assert!(report.soundpack);
    assert!(report.skipped.is_empty());

    let mut bad = KeyBindings::new();
    bad.set_pack_folder(Some(PathBuf::from("/packs/bad-pack")));
    let report = h.engine.reload(&bad).unwrap();
    assert!(!report.soundpack);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].key_id, PACK_FOLDER_KEY);
}

#[test]
fn queued_input_plays_once_started() {
    let mut h = harness(full_source(), false);
    h.engine.reload(&KeyBindings::new()).unwrap();
    for i in 0..10 {
        let key = if i % 2 == 0 { "a" } else { "Key.space" };
        assert!(h.engine.enqueue(key, false, false, 0.0, ""));
    }
    // swapping pools under queued commands must not lose any of them
    h.engine.reload(&KeyBindings::new()).unwrap();
    h.engine.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while h.engine.dispatched() < 10 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(h.engine.dispatched(), 10);
    assert_eq!(total_plays(&h.channels), 10);

    h.engine.stop();
    assert!(!h.engine.is_running());
    assert_eq!(h.engine.active_voices(), 0);
    assert!(h.channels.iter().all(|c| !c.is_busy()));
    assert!(!h.engine.enqueue("a", false, false, 0.0, ""));

    let events = h.engine.drain_events();
    assert!(matches!(events[0], EngineEvent::Reloaded { .. }));
    assert!(matches!(events[1], EngineEvent::Reloaded { .. }));
    assert_eq!(&events[2..], &[EngineEvent::Started, EngineEvent::Stopped]);
}

#[test]
fn reload_during_live_dispatch_loses_nothing() {
    let mut h = harness(full_source(), false);
    h.engine.reload(&KeyBindings::new()).unwrap();
    h.engine.start().unwrap();

    let input = h.engine.input_handle();
    let typist = std::thread::spawn(move || {
        let mut accepted = 0;
        for i in 0..100 {
            let (key, is_mouse) = if i % 4 == 0 { ("Button.left", true) } else { ("a", false) };
            if input.enqueue(key, is_mouse, false, 0.0, "") {
                accepted += 1;
            }
            std::thread::sleep(Duration::from_micros(300));
        }
        accepted
    });
    for _ in 0..5 {
        h.engine.reload(&KeyBindings::new()).unwrap();
    }
    let accepted = typist.join().unwrap();
    assert_eq!(accepted, 100);

    let deadline = Instant::now() + Duration::from_secs(5);
    while h.engine.dispatched() < 100 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(h.engine.dispatched(), 100);
    assert_eq!(total_plays(&h.channels), 100);
    assert_eq!(h.engine.queue_stats().dropped, 0);
    h.engine.stop();
}

#[test]
fn engine_restarts_after_stop() {
    let mut h = harness(full_source(), false);
    h.engine.reload(&KeyBindings::new()).unwrap();
    h.engine.start().unwrap();
    assert!(matches!(h.engine.start(), Err(EngineError::AlreadyRunning)));
    h.engine.stop();
    h.engine.start().unwrap();
    assert!(h.engine.enqueue("Button.left", true, false, 0.0, ""));

    let deadline = Instant::now() + Duration::from_secs(5);
    while h.engine.dispatched() < 1 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(h.engine.dispatched(), 1);
    h.engine.stop();
}

#[test]
fn stop_without_start_is_a_no_op() {
    let mut h = harness(full_source(), false);
    h.engine.stop();
    assert!(h.engine.drain_events().is_empty());
}

#[test]
fn volume_commands_clamp_and_broadcast() {
    let mut h = harness(full_source(), false);
    h.engine.reload(&KeyBindings::new()).unwrap();
    h.engine.drain_events();

    let cmd: ControlCommand =
        serde_json::from_str(r#"{"type":"SetVolume","payload":{"volume":0.3}}"#).unwrap();
    h.engine.handle_command(cmd).unwrap();
    assert_eq!(h.engine.volume(), 0.3);
    assert_eq!(
        h.engine.drain_events(),
        vec![EngineEvent::VolumeChanged {
            volume: Volume01::new(0.3)
        }]
    );

    h.engine.update_volume(1.7);
    assert_eq!(h.engine.volume(), 1.0);
    h.engine.update_volume(-0.5);
    assert_eq!(h.engine.volume(), 0.0);
}

#[test]
fn events_serialize_with_type_tags() {
    let json = serde_json::to_value(EngineEvent::VolumeChanged {
        volume: Volume01::new(0.5),
    })
    .unwrap();
    assert_eq!(
        json,
        serde_json::json!({"type": "VolumeChanged", "payload": {"volume": 0.5}})
    );
    let json = serde_json::to_value(EngineEvent::Started).unwrap();
    assert_eq!(json, serde_json::json!({"type": "Started"}));
}

#[test]
fn reload_command_takes_bindings() {
    let mut h = harness(full_source(), false);
    let cmd: ControlCommand = serde_json::from_str(
        r#"{"type":"Reload","payload":{"bindings":{"z":"custom/z.wav"}}}"#,
    )
    .unwrap();
    h.engine.handle_command(cmd).unwrap();
    match h.engine.drain_events().as_slice() {
        [EngineEvent::Reloaded { report }] => assert_eq!(report.custom_bindings, 1),
        other => panic!("unexpected events {other:?}"),
    }
}

#[test]
fn backend_rate_wins_over_settings() {
    let channels = mock_channels(2);
    let mut settings = settings();
    settings.mixer.sample_rate_hz = 48_000;
    let backend = MockBackend {
        channels,
        closed: Arc::new(AtomicBool::new(false)),
    };
    let ports = EnginePorts {
        samples: Arc::new(full_source()),
        soundpacks: None,
        priority: None,
    };
    let engine = AudioEngine::new(settings, presets(), Box::new(backend), ports).unwrap();
    assert_eq!(engine.settings().mixer.sample_rate_hz, SR);
}

#[test]
fn invalid_presets_are_rejected() {
    let mut bad = presets();
    bad.normal_key.pitch.min = 0.0;
    let backend = MockBackend {
        channels: mock_channels(2),
        closed: Arc::new(AtomicBool::new(false)),
    };
    let ports = EnginePorts {
        samples: Arc::new(full_source()),
        soundpacks: None,
        priority: None,
    };
    let result = AudioEngine::new(settings(), bad, Box::new(backend), ports);
    assert!(matches!(result, Err(EngineError::Preset(_))));
}

#[test]
fn unusable_jitter_window_is_a_config_error() {
    for (min_ms, max_ms) in [(0.5, f64::NAN), (0.5, -2.0), (f64::INFINITY, 1.0), (3.0, 1.0)] {
        let mut bad = settings();
        bad.engine.jitter_min_ms = min_ms;
        bad.engine.jitter_max_ms = max_ms;
        let backend = MockBackend {
            channels: mock_channels(2),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let ports = EnginePorts {
            samples: Arc::new(full_source()),
            soundpacks: None,
            priority: None,
        };
        let result = AudioEngine::new(bad, presets(), Box::new(backend), ports);
        assert!(
            matches!(result, Err(EngineError::Config(_))),
            "{min_ms}..{max_ms} accepted"
        );
    }
}

struct CountingPriority(AtomicUsize);

impl PriorityPort for CountingPriority {
    fn elevate_priority(&self) -> bool {
        self.0.fetch_add(1, Ordering::SeqCst);
        false
    }
}

#[test]
fn scheduling_thread_asks_for_priority_once() {
    let priority = Arc::new(CountingPriority(AtomicUsize::new(0)));
    let backend = MockBackend {
        channels: mock_channels(2),
        closed: Arc::new(AtomicBool::new(false)),
    };
    let ports = EnginePorts {
        samples: Arc::new(full_source()),
        soundpacks: None,
        priority: Some(priority.clone() as Arc<dyn PriorityPort>),
    };
    let mut engine = AudioEngine::new(settings(), presets(), Box::new(backend), ports).unwrap();
    engine.reload(&KeyBindings::new()).unwrap();
    engine.start().unwrap();
    engine.stop();
    assert_eq!(priority.0.load(Ordering::SeqCst), 1);
}

#[test]
fn shutdown_closes_the_output() {
    let mut h = harness(full_source(), false);
    h.engine.reload(&KeyBindings::new()).unwrap();
    h.engine.start().unwrap();
    let closed = h.closed.clone();
    h.engine.shutdown();
    assert!(closed.load(Ordering::SeqCst));
}
