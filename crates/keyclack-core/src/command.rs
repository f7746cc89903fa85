use crate::error::EngineError;
use parking_lot::{Condvar, Mutex};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rtrb::{Consumer, Producer, RingBuffer};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One input event on its way to the scheduling thread. Consumed exactly once.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayCommand {
    pub key_id: String,
    pub is_mouse: bool,
    pub is_release: bool,
    pub not_before: Instant,
    pub duration_s: f64,
    pub last_key_id: String,
}

impl PlayCommand {
    pub fn is_due(&self, now: Instant) -> bool {
        self.not_before <= now
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub accepted: u64,
    pub dropped: u64,
}

#[derive(Debug)]
struct QueueCounters {
    accepting: AtomicBool,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

/// Condition signal the scheduling loop sleeps on between iterations.
#[derive(Debug, Default)]
pub struct WakeSignal {
    pending: Mutex<bool>,
    cv: Condvar,
}

impl WakeSignal {
    pub fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cv.notify_one();
    }

    /// Returns once notified or after `timeout`, clearing the pending flag.
    pub fn wait(&self, timeout: Duration) {
        let mut pending = self.pending.lock();
        if !*pending {
            self.cv.wait_for(&mut pending, timeout);
        }
        *pending = false;
    }
}

struct Sender {
    producer: Producer<PlayCommand>,
    rng: SmallRng,
}

/// Press scheduling window in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JitterWindow {
    pub min_ms: f64,
    pub max_ms: f64,
}

impl JitterWindow {
    /// Rejects non-finite or negative bounds and an inverted window.
    pub fn new(min_ms: f64, max_ms: f64) -> Result<Self, EngineError> {
        if !min_ms.is_finite() || !max_ms.is_finite() {
            return Err(EngineError::Config(format!(
                "jitter window must be finite, got {min_ms}..{max_ms} ms"
            )));
        }
        if min_ms < 0.0 || max_ms < min_ms {
            return Err(EngineError::Config(format!(
                "jitter window must satisfy 0 <= min <= max, got {min_ms}..{max_ms} ms"
            )));
        }
        Ok(Self { min_ms, max_ms })
    }
}

/// Cloneable, thread-safe enqueue side of the bounded command queue.
#[derive(Clone)]
pub struct InputHandle {
    sender: Arc<Mutex<Sender>>,
    counters: Arc<QueueCounters>,
    wake: Arc<WakeSignal>,
    jitter: JitterWindow,
}

/// Creates the bounded queue. The consumer belongs to the scheduling loop.
pub fn command_queue(
    capacity: usize,
    jitter: JitterWindow,
    wake: Arc<WakeSignal>,
) -> (InputHandle, Consumer<PlayCommand>) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    let handle = InputHandle {
        sender: Arc::new(Mutex::new(Sender {
            producer,
            rng: SmallRng::from_entropy(),
        })),
        counters: Arc::new(QueueCounters {
            accepting: AtomicBool::new(true),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }),
        wake,
        jitter,
    };
    (handle, consumer)
}

impl InputHandle {
    /// Non-blocking. Returns `false` when the command was dropped because the queue was
    /// full or the engine is shutting down.
    pub fn enqueue(
        &self,
        key_id: &str,
        is_mouse: bool,
        is_release: bool,
        duration_s: f64,
        last_key_id: &str,
    ) -> bool {
        if !self.counters.accepting.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        let pushed = {
            let mut sender = self.sender.lock();
            let not_before = if is_release || is_mouse {
                now
            } else {
                now + self.draw_jitter(&mut sender.rng)
            };
            sender
                .producer
                .push(PlayCommand {
                    key_id: key_id.to_string(),
                    is_mouse,
                    is_release,
                    not_before,
                    duration_s,
                    last_key_id: last_key_id.to_string(),
                })
                .is_ok()
        };
        if pushed {
            self.counters.accepted.fetch_add(1, Ordering::Relaxed);
            self.wake.notify();
        } else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("command queue full, dropped {key_id}");
        }
        pushed
    }

    fn draw_jitter(&self, rng: &mut SmallRng) -> Duration {
        let JitterWindow { min_ms, max_ms } = self.jitter;
        let ms = if max_ms > min_ms && (max_ms - min_ms).is_finite() {
            rng.gen_range(min_ms..max_ms)
        } else {
            min_ms
        };
        Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::ZERO)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.counters.accepting.store(accepting, Ordering::Release);
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}
