use crate::audio_params::AudioParams;
use crate::channel_ring::ChannelRing;
use crate::command::{command_queue, InputHandle, JitterWindow, QueueStats, WakeSignal};
use crate::error::EngineError;
use crate::ipc::{ControlCommand, EngineEvent};
use crate::loader::{build_contents, ReloadReport, SoundSources};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::sound_bank::{SoundBank, POOL_SLOTS};
use keyclack_ports::audio::ChannelBackend;
use keyclack_ports::preset::PresetSet;
use keyclack_ports::priority::PriorityPort;
use keyclack_ports::soundpack::SoundpackLoader;
use keyclack_ports::source::SampleSourcePort;
use keyclack_ports::storage::{EngineSettings, KeyBindings};
use keyclack_ports::types::Volume01;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const SHUTDOWN_FADE_MS: u32 = 150;

/// Collaborators the engine reads sound data through.
#[derive(Clone)]
pub struct EnginePorts {
    pub samples: Arc<dyn SampleSourcePort>,
    pub soundpacks: Option<Arc<dyn SoundpackLoader>>,
    pub priority: Option<Arc<dyn PriorityPort>>,
}

/// Thread-safe front of the playback engine.
///
/// `enqueue`, `update_volume` and the read accessors may be called from any thread.
/// `start`, `stop` and `reload` belong to the thread that owns configuration.
pub struct AudioEngine {
    settings: EngineSettings,
    presets: PresetSet,
    ports: EnginePorts,
    backend: Option<Box<dyn ChannelBackend>>,
    bank: Arc<SoundBank>,
    ring: Arc<ChannelRing>,
    params: Arc<AudioParams>,
    wake: Arc<WakeSignal>,
    input: InputHandle,
    scheduler: Option<Scheduler>,
    thread: Option<JoinHandle<Scheduler>>,
    events: VecDeque<EngineEvent>,
}

impl AudioEngine {
    /// Validates `presets` against the backend rate and wires the loop. No pools are
    /// built until [`AudioEngine::reload`].
    pub fn new(
        mut settings: EngineSettings,
        presets: PresetSet,
        backend: Box<dyn ChannelBackend>,
        ports: EnginePorts,
    ) -> Result<Self, EngineError> {
        let format = backend.format();
        if format.sample_rate_hz != settings.mixer.sample_rate_hz {
            log::info!(
                "output runs at {} Hz, rendering pools at that rate",
                format.sample_rate_hz
            );
            settings.mixer.sample_rate_hz = format.sample_rate_hz;
        }
        presets.validate(format.sample_rate_hz)?;

        let bank = Arc::new(SoundBank::new(settings.volume));
        let ring = Arc::new(ChannelRing::new(backend.channels()));
        let params = Arc::new(AudioParams::new());
        let wake = Arc::new(WakeSignal::default());
        let (input, consumer) = command_queue(
            settings.engine.queue_capacity,
            JitterWindow::new(settings.engine.jitter_min_ms, settings.engine.jitter_max_ms)?,
            wake.clone(),
        );
        let scheduler = Scheduler::new(
            SchedulerConfig::from_tuning(&settings.engine),
            consumer,
            bank.clone(),
            ring.clone(),
            params.clone(),
            &settings.wpm,
        );

        Ok(Self {
            settings,
            presets,
            ports,
            backend: Some(backend),
            bank,
            ring,
            params,
            wake,
            input,
            scheduler: Some(scheduler),
            thread: None,
            events: VecDeque::new(),
        })
    }

    pub fn handle_command(&mut self, cmd: ControlCommand) -> Result<(), EngineError> {
        match cmd {
            ControlCommand::SetVolume { volume } => {
                self.update_volume(volume.get());
                self.events.push_back(EngineEvent::VolumeChanged {
                    volume: self.bank.volume(),
                });
            }
            ControlCommand::Reload { bindings } => {
                self.reload(&bindings)?;
            }
            ControlCommand::Start => self.start()?,
            ControlCommand::Stop => self.stop(),
        }
        Ok(())
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.thread.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        if self.backend.is_none() {
            return Err(EngineError::Closed);
        }
        let Some(scheduler) = self.scheduler.take() else {
            return Err(EngineError::Closed);
        };

        self.params.set_running(true);
        self.input.set_accepting(true);
        let wake = self.wake.clone();
        let priority = self.ports.priority.clone();
        let spawned = thread::Builder::new()
            .name("keyclack-scheduler".to_string())
            .spawn(move || {
                if let Some(priority) = priority {
                    if priority.elevate_priority() {
                        log::info!("scheduling thread priority elevated");
                    } else {
                        log::debug!("scheduling thread priority unchanged");
                    }
                }
                scheduler.run(wake)
            });
        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                log::info!("engine started with {} voices", self.ring.len());
                self.events.push_back(EngineEvent::Started);
                Ok(())
            }
            Err(e) => {
                self.params.set_running(false);
                Err(EngineError::Spawn(e.to_string()))
            }
        }
    }

    /// Stops accepting input, joins the loop, discards whatever was queued and fades every
    /// channel out. The output stays open so the engine can be started again; input is
    /// accepted again from the next [`AudioEngine::start`].
    pub fn stop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        self.input.set_accepting(false);
        self.params.set_running(false);
        self.wake.notify();
        match handle.join() {
            Ok(mut scheduler) => {
                let discarded = scheduler.discard_queued();
                if discarded > 0 {
                    log::debug!("discarded {discarded} queued commands");
                }
                self.scheduler = Some(scheduler);
            }
            Err(_) => log::error!("scheduling thread panicked"),
        }

        if self.ring.active_count() > 0 {
            self.ring.fade_out_all(SHUTDOWN_FADE_MS);
            thread::sleep(Duration::from_millis(SHUTDOWN_FADE_MS as u64));
        }
        self.ring.stop_all();
        self.params.publish_active_voices(0);
        log::info!("engine stopped");
        self.events.push_back(EngineEvent::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Rebuilds every pool and binding off-lock, then swaps them in.
    pub fn reload(&mut self, bindings: &KeyBindings) -> Result<ReloadReport, EngineError> {
        keyclack_dsp::clear_caches();
        let sources = SoundSources {
            samples: self.ports.samples.as_ref(),
            soundpacks: self.ports.soundpacks.as_deref(),
        };
        let (contents, report) = build_contents(
            &self.settings,
            &self.presets,
            bindings,
            sources,
            self.bank.volume(),
        )?;
        self.bank.swap(contents);
        log::info!(
            "reloaded {} clips, {} custom bindings, soundpack: {}, {} skipped",
            report.total_clips(),
            report.custom_bindings,
            report.soundpack,
            report.skipped.len()
        );
        self.events.push_back(EngineEvent::Reloaded {
            report: report.clone(),
        });
        Ok(report)
    }

    pub fn enqueue(
        &self,
        key_id: &str,
        is_mouse: bool,
        is_release: bool,
        duration_s: f64,
        last_key_id: &str,
    ) -> bool {
        self.input
            .enqueue(key_id, is_mouse, is_release, duration_s, last_key_id)
    }

    /// Cloneable enqueue side for input threads.
    pub fn input_handle(&self) -> InputHandle {
        self.input.clone()
    }

    /// Clamps to [0, 1] and applies the level to every live clip.
    pub fn update_volume(&self, volume: f32) {
        self.bank.set_volume(Volume01::new(volume));
    }

    pub fn volume(&self) -> f32 {
        self.bank.volume().get()
    }

    pub fn active_voices(&self) -> usize {
        self.params.active_voices()
    }

    pub fn dispatched(&self) -> u64 {
        self.params.dispatched()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.input.stats()
    }

    pub fn pool_sizes(&self) -> [usize; POOL_SLOTS] {
        self.bank.pool_sizes()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Full shutdown: stop the loop, close the output, release every clip.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.stop();
        self.input.set_accepting(false);
        if let Some(backend) = self.backend.take() {
            backend.close();
            self.bank.clear();
            log::info!("audio output closed");
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.close();
    }
}
