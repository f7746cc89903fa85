use keyclack_ports::audio::{AudioRenderCallback, PlaybackChannel};
use keyclack_ports::types::Clip;
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const LIMIT: f32 = 0.98;
const LIMITER_ATTACK: f32 = 0.25;
const LIMITER_RELEASE: f32 = 0.01;
const COMMANDS_PER_VOICE: usize = 4;
const RETIRED_PER_VOICE: usize = COMMANDS_PER_VOICE + 2;

enum VoiceCommand {
    Play {
        voice: usize,
        generation: u32,
        clip: Clip,
        gain: f32,
        fade_in_frames: u32,
    },
    Stop {
        voice: usize,
    },
    FadeOut {
        voice: usize,
        frames: u32,
    },
}

/// State shared between a channel handle and its voice in the callback.
///
/// `playing` holds the generation of the clip the channel was last asked to play, or 0
/// when idle. The callback only clears it if no newer `play` has happened since.
#[derive(Default)]
struct VoiceShared {
    playing: AtomicU32,
    end_events: AtomicU32,
}

struct Commands {
    producer: Producer<VoiceCommand>,
    /// Clips the callback is done with. Dropped here so sample buffers are never freed on
    /// the audio thread.
    retired: Consumer<Clip>,
    next_generation: u32,
}

impl Commands {
    fn collect_retired(&mut self) -> usize {
        let mut freed = 0;
        while self.retired.pop().is_ok() {
            freed += 1;
        }
        freed
    }
}

/// One playback voice of the software mixer.
pub struct MixerChannel {
    voice: usize,
    sample_rate_hz: u32,
    shared: Arc<VoiceShared>,
    commands: Arc<Mutex<Commands>>,
}

impl MixerChannel {
    fn ms_to_frames(&self, ms: u32) -> u32 {
        (self.sample_rate_hz as u64 * ms as u64 / 1000) as u32
    }

    /// Frees clips the callback has released. Runs implicitly on every `play` and
    /// `take_end_events`.
    pub fn collect_retired(&self) -> usize {
        self.commands.lock().collect_retired()
    }

    fn send(&self, cmd: VoiceCommand) -> bool {
        self.commands.lock().producer.push(cmd).is_ok()
    }
}

impl PlaybackChannel for MixerChannel {
    fn play(&self, clip: Clip, gain: f32, fade_in_ms: u32) {
        let fade_in_frames = self.ms_to_frames(fade_in_ms);
        let mut commands = self.commands.lock();
        commands.collect_retired();
        commands.next_generation = commands.next_generation.wrapping_add(1).max(1);
        let generation = commands.next_generation;
        self.shared.playing.store(generation, Ordering::Release);
        let pushed = commands
            .producer
            .push(VoiceCommand::Play {
                voice: self.voice,
                generation,
                clip,
                gain,
                fade_in_frames,
            })
            .is_ok();
        if !pushed {
            let _ = self.shared.playing.compare_exchange(
                generation,
                0,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            log::debug!("voice command queue full, play on voice {} dropped", self.voice);
        }
    }

    fn stop(&self) {
        self.shared.playing.store(0, Ordering::Release);
        if !self.send(VoiceCommand::Stop { voice: self.voice }) {
            log::debug!("voice command queue full, stop on voice {} dropped", self.voice);
        }
    }

    fn fade_out(&self, fade_ms: u32) {
        let frames = self.ms_to_frames(fade_ms).max(1);
        if !self.send(VoiceCommand::FadeOut {
            voice: self.voice,
            frames,
        }) {
            self.stop();
        }
    }

    fn is_busy(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire) != 0
    }

    fn take_end_events(&self) -> u32 {
        self.commands.lock().collect_retired();
        self.shared.end_events.swap(0, Ordering::AcqRel)
    }
}

#[derive(Default)]
struct Voice {
    clip: Option<Clip>,
    generation: u32,
    position: usize,
    gain: f32,
    fade_in_frames: u32,
    fade_out: Option<(u32, u32)>,
}

impl Voice {
    fn envelope(&self) -> f32 {
        let mut env = 1.0;
        if self.fade_in_frames > 0 && self.position < self.fade_in_frames as usize {
            env = (self.position + 1) as f32 / self.fade_in_frames as f32;
        }
        if let Some((remaining, total)) = self.fade_out {
            env *= remaining as f32 / total as f32;
        }
        env
    }
}

/// Audio-callback half of the mixer: sums every active voice and applies a soft limiter.
pub struct VoiceMixer {
    voices: Vec<Voice>,
    shared: Vec<Arc<VoiceShared>>,
    commands: Consumer<VoiceCommand>,
    retired: Producer<Clip>,
    /// Fixed-capacity spill for when `retired` is full; never grows past its capacity.
    retry: Vec<Clip>,
    limiter_gain: f32,
}

/// Builds `polyphony` channels and the callback that renders them.
pub fn mixer(sample_rate_hz: u32, polyphony: usize) -> (Vec<Arc<MixerChannel>>, VoiceMixer) {
    let polyphony = polyphony.max(1);
    let (producer, consumer) = RingBuffer::new(polyphony * COMMANDS_PER_VOICE);
    let (retired_tx, retired_rx) = RingBuffer::new(polyphony * RETIRED_PER_VOICE);
    let commands = Arc::new(Mutex::new(Commands {
        producer,
        retired: retired_rx,
        next_generation: 0,
    }));
    let shared: Vec<Arc<VoiceShared>> = (0..polyphony)
        .map(|_| Arc::new(VoiceShared::default()))
        .collect();
    let channels = shared
        .iter()
        .enumerate()
        .map(|(voice, shared)| {
            Arc::new(MixerChannel {
                voice,
                sample_rate_hz,
                shared: shared.clone(),
                commands: commands.clone(),
            })
        })
        .collect();
    let mixer = VoiceMixer {
        voices: (0..polyphony).map(|_| Voice::default()).collect(),
        shared,
        commands: consumer,
        retired: retired_tx,
        retry: Vec::with_capacity(polyphony * COMMANDS_PER_VOICE),
        limiter_gain: 1.0,
    };
    (channels, mixer)
}

impl VoiceMixer {
    fn retire(&mut self, clip: Clip) {
        if let Err(rtrb::PushError::Full(clip)) = self.retired.push(clip) {
            if self.retry.len() < self.retry.capacity() {
                self.retry.push(clip);
            } else {
                // Both queues are full: the control side has stalled, so freeing here is
                // the only option left.
                drop(clip);
            }
        }
    }

    fn flush_retry(&mut self) {
        while let Some(clip) = self.retry.pop() {
            if let Err(rtrb::PushError::Full(clip)) = self.retired.push(clip) {
                self.retry.push(clip);
                break;
            }
        }
    }

    fn apply_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                VoiceCommand::Play {
                    voice,
                    generation,
                    clip,
                    gain,
                    fade_in_frames,
                } => {
                    let Some(v) = self.voices.get_mut(voice) else {
                        self.retire(clip);
                        continue;
                    };
                    let previous = std::mem::replace(
                        v,
                        Voice {
                            clip: Some(clip),
                            generation,
                            position: 0,
                            gain,
                            fade_in_frames,
                            fade_out: None,
                        },
                    );
                    if let Some(old) = previous.clip {
                        self.retire(old);
                    }
                }
                VoiceCommand::Stop { voice } => {
                    if let Some(old) = self.voices.get_mut(voice).and_then(|v| v.clip.take()) {
                        self.retire(old);
                    }
                }
                VoiceCommand::FadeOut { voice, frames } => {
                    if let Some(v) = self.voices.get_mut(voice) {
                        if v.clip.is_some() {
                            v.fade_out = Some((frames, frames));
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self, voice: usize) {
        let generation = self.voices[voice].generation;
        if let Some(old) = self.voices[voice].clip.take() {
            self.retire(old);
        }
        let shared = &self.shared[voice];
        shared.end_events.fetch_add(1, Ordering::AcqRel);
        let _ = shared
            .playing
            .compare_exchange(generation, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    fn mix_voice(&mut self, index: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = out_l.len().min(out_r.len());
        let mut ended = false;
        {
            let voice = &mut self.voices[index];
            let Some(clip) = voice.clip.as_ref() else {
                return;
            };
            let channels = clip.format().channels.max(1) as usize;
            let samples = clip.samples();
            let total = clip.frames();
            for frame in 0..frames {
                if voice.position >= total || voice.fade_out.is_some_and(|(r, _)| r == 0) {
                    ended = true;
                    break;
                }
                let base = voice.position * channels;
                let l = samples[base] as f32 / 32768.0;
                let r = if channels > 1 {
                    samples[base + 1] as f32 / 32768.0
                } else {
                    l
                };
                let g = voice.gain * voice.envelope();
                out_l[frame] += l * g;
                out_r[frame] += r * g;
                voice.position += 1;
                if let Some((remaining, _)) = voice.fade_out.as_mut() {
                    *remaining = remaining.saturating_sub(1);
                }
            }
            if voice.position >= total || voice.fade_out.is_some_and(|(r, _)| r == 0) {
                ended = true;
            }
        }
        if ended {
            self.finish(index);
        }
    }

    fn limit(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let peak = out_l
            .iter()
            .chain(out_r.iter())
            .fold(0.0_f32, |peak, s| peak.max(s.abs()));
        let target = if peak > LIMIT { LIMIT / peak } else { 1.0 };
        let coeff = if target < self.limiter_gain {
            LIMITER_ATTACK
        } else {
            LIMITER_RELEASE
        };
        self.limiter_gain =
            (self.limiter_gain + coeff * (target - self.limiter_gain)).clamp(0.0, 1.0);
        if self.limiter_gain < 0.999 {
            for s in out_l.iter_mut().chain(out_r.iter_mut()) {
                *s *= self.limiter_gain;
            }
        }
    }

    pub fn limiter_gain(&self) -> f32 {
        self.limiter_gain
    }
}

impl AudioRenderCallback for VoiceMixer {
    fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        out_l.fill(0.0);
        out_r.fill(0.0);
        self.flush_retry();
        self.apply_commands();
        for index in 0..self.voices.len() {
            self.mix_voice(index, out_l, out_r);
        }
        self.limit(out_l, out_r);
    }
}
