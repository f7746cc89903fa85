use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Flags and counters shared between the façade and the scheduling thread.
#[derive(Debug, Default)]
pub struct AudioParams {
    running: AtomicBool,
    active_voices: AtomicU32,
    dispatched: AtomicU64,
}

impl AudioParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn publish_active_voices(&self, count: usize) {
        self.active_voices
            .store(u32::try_from(count).unwrap_or(u32::MAX), Ordering::Relaxed);
    }

    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed) as usize
    }

    pub fn count_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}
