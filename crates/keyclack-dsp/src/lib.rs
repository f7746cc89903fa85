pub mod filter_cache;
pub mod pool;
pub mod primitives;
pub mod resample;
pub mod variation;

pub use filter_cache::{cache_sizes, clear_caches};
pub use pool::{build_pool, build_release_pool};
pub use variation::{
    build_release_variation, build_variation, mono_center, quantize, quantize_stereo,
    render_press, render_release, DspError, FastModifier, ReleaseParams, RenderContext,
    Variation, VariationParams,
};
