use crate::audio_params::AudioParams;
use crate::channel_ring::ChannelRing;
use crate::command::{PlayCommand, WakeSignal};
use crate::key_class::{mouse_slot, press_slot, release_slot, sanitize_duration};
use crate::micro_variator::MicroVariator;
use crate::sound_bank::{PoolSlot, SoundBank};
use crate::wpm::WpmTracker;
use keyclack_ports::storage::{EngineTuning, WpmSettings};
use keyclack_ports::types::Clip;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use rtrb::Consumer;
use std::sync::Arc;
use std::time::{Duration, Instant};

const EQUAL_POWER_FLOOR: f64 = 0.42;
const RELEASE_GAIN: f64 = 0.80;
const MIN_POOL_FOR_BIAS: usize = 4;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub batch_max: usize,
    pub housekeeping_interval: u32,
    pub loop_timeout: Duration,
}

impl SchedulerConfig {
    pub fn from_tuning(tuning: &EngineTuning) -> Self {
        Self {
            batch_max: tuning.batch_max.max(1),
            housekeeping_interval: tuning.housekeeping_interval.max(1),
            loop_timeout: Duration::from_millis(tuning.loop_timeout_ms.max(1)),
        }
    }
}

/// Where a dispatched sound came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoundSource {
    Soundpack,
    Custom,
    Pool(PoolSlot, usize),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IterationStats {
    pub drained: usize,
    pub dispatched: usize,
    pub deferred: usize,
    pub housekeeping: bool,
}

/// `max(0.42, 1 / sqrt(active + 1))`
pub fn equal_power_scale(active_before: usize) -> f64 {
    (1.0 / ((active_before + 1) as f64).sqrt()).max(EQUAL_POWER_FLOOR)
}

/// Single owner of channel mutation. Runs on the scheduling thread.
pub struct Scheduler {
    config: SchedulerConfig,
    commands: Consumer<PlayCommand>,
    pending: Vec<PlayCommand>,
    bank: Arc<SoundBank>,
    ring: Arc<ChannelRing>,
    params: Arc<AudioParams>,
    micro: MicroVariator,
    wpm: WpmTracker,
    fast_rng: Box<dyn RngCore + Send>,
    iteration: u64,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        commands: Consumer<PlayCommand>,
        bank: Arc<SoundBank>,
        ring: Arc<ChannelRing>,
        params: Arc<AudioParams>,
        wpm: &WpmSettings,
    ) -> Self {
        Self {
            config,
            commands,
            pending: Vec::with_capacity(config.batch_max),
            bank,
            ring,
            params,
            micro: MicroVariator::new(),
            wpm: WpmTracker::new(wpm),
            fast_rng: Box::new(SmallRng::from_entropy()),
            iteration: 0,
        }
    }

    pub fn with_micro_variator(mut self, micro: MicroVariator) -> Self {
        self.micro = micro;
        self
    }

    /// Replaces the generator behind the fast/slow pool draw.
    pub fn with_fast_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.fast_rng = rng;
        self
    }

    pub fn wpm(&self) -> &WpmTracker {
        &self.wpm
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Loops until the running flag drops, sleeping on `wake` between iterations.
    pub fn run(mut self, wake: Arc<WakeSignal>) -> Self {
        while self.params.is_running() {
            self.run_once(Instant::now());
            wake.wait(self.config.loop_timeout);
        }
        self
    }

    /// One loop iteration without the wait.
    pub fn run_once(&mut self, now: Instant) -> IterationStats {
        let mut stats = IterationStats::default();
        while stats.drained < self.config.batch_max {
            match self.commands.pop() {
                Ok(cmd) => {
                    self.pending.push(cmd);
                    stats.drained += 1;
                }
                Err(_) => break,
            }
        }

        let mut pending = std::mem::take(&mut self.pending);
        pending.retain(|cmd| {
            if !cmd.is_due(now) {
                return true;
            }
            if self.dispatch(cmd, now).is_some() {
                stats.dispatched += 1;
            }
            false
        });
        stats.deferred = pending.len();
        self.pending = pending;

        self.iteration += 1;
        if self.iteration % self.config.housekeeping_interval as u64 == 0 {
            self.housekeeping();
            stats.housekeeping = true;
        }
        stats
    }

    pub fn housekeeping(&mut self) {
        let ended = self.ring.drain_end_events();
        let active = self.ring.active_count();
        self.params.publish_active_voices(active);
        if ended > 0 {
            log::trace!("housekeeping: {ended} voices ended, {active} active");
        }
    }

    /// Discards everything queued or pending. Returns the number discarded.
    pub fn discard_queued(&mut self) -> usize {
        let mut discarded = self.pending.len();
        self.pending.clear();
        while self.commands.pop().is_ok() {
            discarded += 1;
        }
        discarded
    }

    /// Resolves, allocates and plays one command. `None` means no sound.
    pub fn dispatch(&mut self, cmd: &PlayCommand, now: Instant) -> Option<SoundSource> {
        let is_key_press = !cmd.is_release && !cmd.is_mouse;
        let mut same_key = false;
        if is_key_press {
            self.wpm.record_at(now);
            self.wpm.burst_wpm();
            same_key = self.micro.observe_key(&cmd.key_id, &cmd.last_key_id);
        }

        let (clip, source) = self.resolve(cmd, same_key)?;
        let (channel, active_before) = self.ring.acquire()?;

        let duration = if cmd.is_release {
            sanitize_duration(cmd.duration_s)
        } else {
            cmd.duration_s
        };
        let micro_scale = self
            .micro
            .vol_scale(cmd.is_release, duration, self.wpm.ema_wpm());
        let mut gain = clip.volume() as f64 * equal_power_scale(active_before) * micro_scale;
        if cmd.is_release {
            gain *= RELEASE_GAIN;
        }
        let fade_ms = self.micro.fade_ms(cmd.is_release, cmd.is_mouse);

        channel.play(clip, gain as f32, fade_ms);
        self.params.count_dispatch();
        Some(source)
    }

    fn resolve(&mut self, cmd: &PlayCommand, same_key: bool) -> Option<(Clip, SoundSource)> {
        if let Some(clip) = self.bank.resolve_soundpack(&cmd.key_id, cmd.is_release) {
            return Some((clip, SoundSource::Soundpack));
        }
        if let Some(clip) = self.bank.custom_clip(&cmd.key_id) {
            if cmd.is_release {
                return None;
            }
            return Some((clip, SoundSource::Custom));
        }

        let slot = if cmd.is_release {
            release_slot(&cmd.key_id)
        } else if cmd.is_mouse {
            mouse_slot(&cmd.key_id)
        } else {
            press_slot(&cmd.key_id, self.wpm.choose_fast(self.fast_rng.as_mut()))
        };

        let mut bias = None;
        if !cmd.is_release && !cmd.is_mouse {
            let len = self.bank.pool_len(slot);
            if len >= MIN_POOL_FOR_BIAS {
                bias = self.micro.fresh_bias(
                    slot,
                    len,
                    self.wpm.ema_wpm(),
                    same_key,
                    self.wpm.burst_factor(),
                );
            }
        }

        let (index, clip) = self.bank.pick(slot, bias)?;
        self.micro.record_selection(slot, index);
        Some((clip, SoundSource::Pool(slot, index)))
    }
}
