use crate::variation::{
    build_release_variation, build_variation, DspError, FastModifier, RenderContext, Variation,
};
use keyclack_ports::preset::{KeyPreset, ReleasePreset};
use keyclack_ports::source::DecodedAudio;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// `pool_size` press variants from one generator seeded with `seed_base`, ordered by
/// ascending pitch factor.
pub fn build_pool(
    base: &DecodedAudio,
    preset: &KeyPreset,
    ctx: &RenderContext,
    pool_size: usize,
    seed_base: u64,
    fast: Option<FastModifier>,
    label: &str,
) -> Result<Vec<Variation>, DspError> {
    let mut rng = StdRng::seed_from_u64(seed_base);
    let mut pool = Vec::with_capacity(pool_size);
    for i in 0..pool_size {
        pool.push(build_variation(base, preset, ctx, &mut rng, fast)?);
        log::trace!("[{label}] {}/{pool_size}", i + 1);
    }
    sort_by_pitch(&mut pool);
    log::debug!("built pool {label}: {} clips", pool.len());
    Ok(pool)
}

/// Release counterpart of [`build_pool`]. Empty when the preset has no enabled release.
pub fn build_release_pool(
    base: &DecodedAudio,
    release: Option<&ReleasePreset>,
    ctx: &RenderContext,
    pool_size: usize,
    seed_base: u64,
    label: &str,
) -> Result<Vec<Variation>, DspError> {
    let Some(release) = release.filter(|r| r.enabled) else {
        log::debug!("release pool {label} disabled");
        return Ok(Vec::new());
    };
    let mut rng = StdRng::seed_from_u64(seed_base);
    let mut pool = Vec::with_capacity(pool_size);
    for _ in 0..pool_size {
        if let Some(v) = build_release_variation(base, release, ctx, &mut rng)? {
            pool.push(v);
        }
    }
    sort_by_pitch(&mut pool);
    log::debug!("built release pool {label}: {} clips", pool.len());
    Ok(pool)
}

fn sort_by_pitch(pool: &mut [Variation]) {
    pool.sort_by(|a, b| a.pitch.total_cmp(&b.pitch));
}
