use keyclack_ports::soundpack::SoundpackResolver;
use keyclack_ports::types::{Clip, Volume01};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const PICK_RETRIES: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PoolSlot {
    NormalSlow,
    NormalFast,
    NormalRelease,
    HeavySlow,
    HeavyFast,
    HeavyRelease,
    MouseLeft,
    MouseMiddle,
}

pub const POOL_SLOTS: usize = 8;

impl PoolSlot {
    pub const ALL: [PoolSlot; POOL_SLOTS] = [
        PoolSlot::NormalSlow,
        PoolSlot::NormalFast,
        PoolSlot::NormalRelease,
        PoolSlot::HeavySlow,
        PoolSlot::HeavyFast,
        PoolSlot::HeavyRelease,
        PoolSlot::MouseLeft,
        PoolSlot::MouseMiddle,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn label(self) -> &'static str {
        match self {
            PoolSlot::NormalSlow => "normal",
            PoolSlot::NormalFast => "normal-fast",
            PoolSlot::NormalRelease => "normal-release",
            PoolSlot::HeavySlow => "heavy",
            PoolSlot::HeavyFast => "heavy-fast",
            PoolSlot::HeavyRelease => "heavy-release",
            PoolSlot::MouseLeft => "mouse",
            PoolSlot::MouseMiddle => "mouse-middle",
        }
    }

    pub const fn is_press_pool(self) -> bool {
        matches!(
            self,
            PoolSlot::NormalSlow | PoolSlot::NormalFast | PoolSlot::HeavySlow | PoolSlot::HeavyFast
        )
    }
}

/// Immutable clip sequence, ordered by rendered pitch for press pools.
#[derive(Debug, Default)]
pub struct SoundPool {
    clips: Vec<Clip>,
}

impl SoundPool {
    pub fn new(clips: Vec<Clip>) -> Self {
        Self { clips }
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Clip> {
        self.clips.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter()
    }
}

/// Everything a reload produces, assembled off-lock and handed to [`SoundBank::swap`].
pub struct BankContents {
    pub pools: [Arc<SoundPool>; POOL_SLOTS],
    pub custom: HashMap<String, Clip>,
    pub resolver: Option<Arc<dyn SoundpackResolver>>,
    /// Volume level the clips were created with.
    pub volume: Volume01,
}

impl BankContents {
    pub fn empty() -> Self {
        Self {
            pools: std::array::from_fn(|_| Arc::new(SoundPool::default())),
            custom: HashMap::new(),
            resolver: None,
            volume: Volume01::new(1.0),
        }
    }

    pub fn pool_sizes(&self) -> [usize; POOL_SLOTS] {
        std::array::from_fn(|i| self.pools[i].len())
    }
}

struct BankState {
    pools: [Arc<SoundPool>; POOL_SLOTS],
    custom: Arc<HashMap<String, Clip>>,
    resolver: Option<Arc<dyn SoundpackResolver>>,
    last: [Option<usize>; POOL_SLOTS],
    rng: SmallRng,
}

/// Live pools, custom bindings and soundpack resolver behind one lock.
pub struct SoundBank {
    state: Mutex<BankState>,
    volume: AtomicU32,
}

impl SoundBank {
    pub fn new(volume: Volume01) -> Self {
        Self::with_rng(volume, SmallRng::from_entropy())
    }

    pub fn with_seed(volume: Volume01, seed: u64) -> Self {
        Self::with_rng(volume, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(volume: Volume01, rng: SmallRng) -> Self {
        let empty = BankContents::empty();
        Self {
            state: Mutex::new(BankState {
                pools: empty.pools,
                custom: Arc::new(empty.custom),
                resolver: None,
                last: [None; POOL_SLOTS],
                rng,
            }),
            volume: AtomicU32::new(volume.get().to_bits()),
        }
    }

    /// Replaces every pool, the custom bindings and the resolver in one locked section that
    /// only moves references. The previous contents are dropped after the lock is released.
    pub fn swap(&self, contents: BankContents) {
        let BankContents {
            pools,
            custom,
            resolver,
            volume,
        } = contents;
        let mut pools = pools;
        let mut custom = Arc::new(custom);
        let mut resolver = resolver;
        {
            let mut state = self.state.lock();
            std::mem::swap(&mut state.pools, &mut pools);
            std::mem::swap(&mut state.custom, &mut custom);
            std::mem::swap(&mut state.resolver, &mut resolver);
            state.last = [None; POOL_SLOTS];
        }
        drop((pools, custom, resolver));

        let current = self.volume();
        if current != volume {
            self.set_volume(current);
        }
    }

    /// Drops every clip, binding and resolver.
    pub fn clear(&self) {
        self.swap(BankContents {
            volume: self.volume(),
            ..BankContents::empty()
        });
    }

    /// Chooses a clip from `slot`, avoiding the index played last from that pool.
    ///
    /// `bias` wins when it differs from the last index; otherwise up to 12 uniform draws are
    /// tried before falling back to the first index that differs.
    pub fn pick(&self, slot: PoolSlot, bias: Option<usize>) -> Option<(usize, Clip)> {
        let mut guard = self.state.lock();
        let BankState {
            pools, last, rng, ..
        } = &mut *guard;
        let pool = &pools[slot.index()];
        let last = &mut last[slot.index()];
        let n = pool.len();

        let index = match n {
            0 => return None,
            1 => 0,
            _ => match bias {
                Some(b) if b < n && Some(b) != *last => b,
                _ => {
                    let mut choice = None;
                    for _ in 0..PICK_RETRIES {
                        let candidate = rng.gen_range(0..n);
                        if Some(candidate) != *last {
                            choice = Some(candidate);
                            break;
                        }
                    }
                    choice
                        .or_else(|| (0..n).find(|i| Some(*i) != *last))
                        .unwrap_or(0)
                }
            },
        };
        *last = Some(index);
        pool.get(index).map(|clip| (index, clip.clone()))
    }

    pub fn pool_len(&self, slot: PoolSlot) -> usize {
        self.state.lock().pools[slot.index()].len()
    }

    pub fn pool_sizes(&self) -> [usize; POOL_SLOTS] {
        let state = self.state.lock();
        std::array::from_fn(|i| state.pools[i].len())
    }

    /// Consults the soundpack resolver. The resolver runs outside the bank lock.
    pub fn resolve_soundpack(&self, key_id: &str, is_release: bool) -> Option<Clip> {
        let resolver = self.state.lock().resolver.clone()?;
        resolver.resolve(key_id, is_release)
    }

    pub fn custom_clip(&self, key_id: &str) -> Option<Clip> {
        self.state.lock().custom.get(key_id).cloned()
    }

    /// Broadcasts the level to every live clip and the resolver.
    pub fn set_volume(&self, volume: Volume01) {
        self.volume.store(volume.get().to_bits(), Ordering::Relaxed);
        let state = self.state.lock();
        for pool in state.pools.iter() {
            for clip in pool.iter() {
                clip.set_volume(volume);
            }
        }
        for clip in state.custom.values() {
            clip.set_volume(volume);
        }
        if let Some(resolver) = state.resolver.as_ref() {
            resolver.set_volume(volume);
        }
    }

    pub fn volume(&self) -> Volume01 {
        Volume01(f32::from_bits(self.volume.load(Ordering::Relaxed)))
    }
}
