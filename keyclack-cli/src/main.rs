mod input;

use anyhow::Context;
use crossterm::event::{self, Event, KeyEventKind, MouseEventKind};
use crossterm::terminal;
use input::{button_id, control_for, key_id, Control, InputAction, KeyTracker};
use keyclack_core::{AudioEngine, ControlCommand, EngineEvent, EnginePorts};
use keyclack_infra_audio_cpal::CpalAudioOutput;
use keyclack_infra_source_hound::HoundSampleSource;
use keyclack_infra_storage_fs::FsStorage;
use keyclack_ports::audio::AudioOutputPort;
use keyclack_ports::preset::PresetSet;
use keyclack_ports::storage::StoragePort;
use keyclack_ports::types::Volume01;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BUNDLED_PRESETS: &str = include_str!("../../assets/presets.json");
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let mut config_dir = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--list-devices" => return list_devices(&CpalAudioOutput::new()),
            "-h" | "--help" => {
                println!("usage: keyclack [--list-devices] [CONFIG_DIR]");
                return Ok(());
            }
            _ => config_dir = Some(PathBuf::from(arg)),
        }
    }
    let storage = match config_dir {
        Some(dir) => FsStorage::new(dir),
        None => FsStorage::default(),
    };
    log::info!("config dir: {}", storage.base_dir().display());

    let saved = storage.load_settings().context("loading settings")?;
    if !storage.has_presets() {
        let bundled: PresetSet =
            serde_json::from_str(BUNDLED_PRESETS).context("parsing bundled presets")?;
        storage
            .save_presets(&bundled)
            .context("installing bundled presets")?;
        log::info!("installed default presets");
    }
    let presets = storage.load_presets().context("loading presets")?;
    let bindings = storage.load_bindings().context("loading bindings")?;

    let mut settings = saved.clone();
    settings.sounds.dir = storage.resolve(&settings.sounds.dir);

    let output = CpalAudioOutput::new();
    let backend = output
        .open_channels(
            settings.mixer.device.as_ref(),
            settings.mixer.audio_config(),
            settings.engine.polyphony,
        )
        .context("opening audio output")?;
    let ports = EnginePorts {
        samples: Arc::new(HoundSampleSource::new()),
        soundpacks: None,
        priority: None,
    };
    let mut engine =
        AudioEngine::new(settings, presets, backend, ports).context("starting engine")?;
    engine
        .handle_command(ControlCommand::Reload { bindings })
        .context("building sound pools")?;
    engine.handle_command(ControlCommand::Start)?;
    report_events(&mut engine);

    let reports_releases = terminal::supports_keyboard_enhancement().unwrap_or(false);
    terminal::enable_raw_mode()?;
    let _guard = RawModeGuard {
        enhanced: reports_releases,
    };
    if reports_releases {
        crossterm::execute!(
            std::io::stdout(),
            event::PushKeyboardEnhancementFlags(
                event::KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )?;
    } else {
        log::warn!("terminal does not report key releases, playing presses only");
    }
    crossterm::execute!(std::io::stdout(), event::EnableMouseCapture)?;
    log::info!("typing sounds on: Ctrl+Up/Down volume, Ctrl+R reload, Esc quit");

    let mut keys = KeyTracker::new(reports_releases);
    loop {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let action = match event::read()? {
            Event::Key(key) => {
                match control_for(&key) {
                    Some(Control::Quit) => break,
                    Some(Control::Volume(step)) => {
                        let volume = Volume01::new(engine.volume() + step);
                        engine.handle_command(ControlCommand::SetVolume { volume })?;
                        report_events(&mut engine);
                        continue;
                    }
                    Some(Control::Reload) => {
                        let bindings = storage.load_bindings().context("loading bindings")?;
                        if let Err(e) = engine.handle_command(ControlCommand::Reload { bindings }) {
                            log::error!("reload failed: {e}");
                        }
                        report_events(&mut engine);
                        continue;
                    }
                    None => {}
                }
                let Some(id) = key_id(key.code) else {
                    continue;
                };
                match key.kind {
                    KeyEventKind::Press => keys.press(&id, Instant::now()),
                    KeyEventKind::Release => keys.release(&id, Instant::now()),
                    KeyEventKind::Repeat => None,
                }
            }
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::Down(button) => Some(keys.click(button_id(button))),
                _ => None,
            },
            _ => None,
        };
        if let Some(action) = action {
            dispatch(&engine, action);
        }
    }

    let mut saved = saved;
    saved.volume = Volume01::new(engine.volume());
    if let Err(e) = storage.save_settings(&saved) {
        log::warn!("could not save settings: {e}");
    }
    engine.handle_command(ControlCommand::Stop)?;
    report_events(&mut engine);
    engine.shutdown();
    Ok(())
}

/// Prints the names accepted by `mixer.device` in settings.json.
fn list_devices(output: &dyn AudioOutputPort) -> anyhow::Result<()> {
    let devices = output.list_outputs().context("listing output devices")?;
    if devices.is_empty() {
        println!("no output devices found");
    }
    for device in devices {
        println!(
            "{}{} ({} Hz, {} ch)",
            if device.is_default { "* " } else { "  " },
            device.id,
            device.sample_rate_hz,
            device.channels
        );
    }
    Ok(())
}

fn dispatch(engine: &AudioEngine, action: InputAction) {
    match action {
        InputAction::Press {
            key_id,
            last_key_id,
        } => engine.enqueue(&key_id, false, false, 0.0, &last_key_id),
        InputAction::Release {
            key_id,
            duration_s,
            last_key_id,
        } => engine.enqueue(&key_id, false, true, duration_s, &last_key_id),
        InputAction::Click {
            button_id,
            last_key_id,
        } => engine.enqueue(&button_id, true, false, 0.0, &last_key_id),
    };
}

fn report_events(engine: &mut AudioEngine) {
    for event in engine.drain_events() {
        match event {
            EngineEvent::Reloaded { report } => {
                for path in &report.missing_sources {
                    log::warn!("missing sound file {}", path.display());
                }
                for skipped in &report.skipped {
                    log::warn!(
                        "binding {} -> {} skipped: {}",
                        skipped.key_id,
                        skipped.path.display(),
                        skipped.reason
                    );
                }
            }
            EngineEvent::VolumeChanged { volume } => {
                log::info!("volume {:.0}%", volume.get() * 100.0);
            }
            EngineEvent::Started | EngineEvent::Stopped => {}
        }
    }
}

struct RawModeGuard {
    enhanced: bool,
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(std::io::stdout(), event::DisableMouseCapture);
        if self.enhanced {
            let _ = crossterm::execute!(std::io::stdout(), event::PopKeyboardEnhancementFlags);
        }
        let _ = terminal::disable_raw_mode();
    }
}
