//! Process-wide coefficient and ramp caches.
//!
//! Both caches are filled lazily, bounded by a fixed entry count (a full cache simply stops
//! inserting) and cleared explicitly by [`clear_caches`] at the start of every reload.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::f64::consts::{PI, SQRT_2};
use std::sync::{Arc, OnceLock};

const FILTER_CACHE_CAP: usize = 64;
const FADE_CACHE_CAP: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// One second-order section, `a0` normalized to 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 2],
}

impl Biquad {
    /// Second-order Butterworth section via the bilinear transform with prewarping.
    /// `wn` is the cutoff normalized to Nyquist, in (0, 1).
    pub fn butterworth(kind: FilterKind, wn: f64) -> Self {
        let k = (PI * wn / 2.0).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + SQRT_2 * k + k2);
        let a = [2.0 * (k2 - 1.0) * norm, (1.0 - SQRT_2 * k + k2) * norm];
        let b = match kind {
            FilterKind::Lowpass => {
                let b0 = k2 * norm;
                [b0, 2.0 * b0, b0]
            }
            FilterKind::Highpass => [norm, -2.0 * norm, norm],
        };
        Self { b, a }
    }

    /// Direct form II transposed over one channel of an interleaved buffer, zero initial state.
    pub fn filter_channel(&self, audio: &[f32], channels: usize, ch: usize, out: &mut [f64]) {
        let (mut z1, mut z2) = (0.0f64, 0.0f64);
        for (frame, y) in out.iter_mut().enumerate() {
            let x = audio[frame * channels + ch] as f64;
            let v = self.b[0] * x + z1;
            z1 = self.b[1] * x - self.a[0] * v + z2;
            z2 = self.b[2] * x - self.a[1] * v;
            *y = v;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct FilterKey {
    order: u8,
    wn_e7: i64,
    kind: FilterKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FadeCurve {
    /// `i / len`
    Linear,
    /// `((1 - e^(-5t)) / (1 - e^(-5)))^1.5`
    ExpPow,
}

#[derive(Default)]
struct Caches {
    filters: HashMap<FilterKey, Biquad>,
    fades: HashMap<(FadeCurve, usize), Arc<[f32]>>,
}

static CACHES: OnceLock<Mutex<Caches>> = OnceLock::new();

fn caches() -> &'static Mutex<Caches> {
    CACHES.get_or_init(|| Mutex::new(Caches::default()))
}

/// Cached 2nd-order Butterworth section. The key rounds `wn` to 7 decimals.
pub fn butterworth(kind: FilterKind, wn: f64) -> Biquad {
    let key = FilterKey {
        order: 2,
        wn_e7: (wn * 1e7).round() as i64,
        kind,
    };
    let mut guard = caches().lock();
    if let Some(hit) = guard.filters.get(&key) {
        return *hit;
    }
    let section = Biquad::butterworth(kind, key.wn_e7 as f64 / 1e7);
    if guard.filters.len() < FILTER_CACHE_CAP {
        guard.filters.insert(key, section);
    }
    section
}

/// Cached fade-in ramp of `len` frames rising from 0 toward 1.
pub fn fade_ramp(curve: FadeCurve, len: usize) -> Arc<[f32]> {
    let mut guard = caches().lock();
    if let Some(hit) = guard.fades.get(&(curve, len)) {
        return hit.clone();
    }
    let ramp: Arc<[f32]> = (0..len).map(|i| ramp_at(curve, i, len)).collect();
    if guard.fades.len() < FADE_CACHE_CAP {
        guard.fades.insert((curve, len), ramp.clone());
    }
    ramp
}

fn ramp_at(curve: FadeCurve, i: usize, len: usize) -> f32 {
    let t = i as f64 / len as f64;
    match curve {
        FadeCurve::Linear => t as f32,
        FadeCurve::ExpPow => {
            let shaped = (1.0 - (-5.0 * t).exp()) / (1.0 - (-5.0f64).exp());
            shaped.powf(1.5) as f32
        }
    }
}

pub fn clear_caches() {
    let mut guard = caches().lock();
    guard.filters.clear();
    guard.fades.clear();
}

/// `(filters, fades)` currently cached.
pub fn cache_sizes() -> (usize, usize) {
    let guard = caches().lock();
    (guard.filters.len(), guard.fades.len())
}
