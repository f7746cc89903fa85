use crate::error::EngineError;
use crate::sound_bank::{BankContents, PoolSlot, SoundPool, POOL_SLOTS};
use keyclack_dsp::{
    build_pool, build_release_pool, quantize_stereo, FastModifier, RenderContext, Variation,
};
use keyclack_ports::preset::{KeyPreset, PresetSet};
use keyclack_ports::soundpack::{SoundpackLoader, SoundpackResolver};
use keyclack_ports::source::{DecodedAudio, SampleSourcePort};
use keyclack_ports::storage::{EngineSettings, KeyBindings, PACK_FOLDER_KEY};
use keyclack_ports::types::{Clip, PcmClip, PcmFormat, Volume01};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SEED_NORMAL: u64 = 42;
const SEED_HEAVY: u64 = 99;
const SEED_MOUSE_LEFT: u64 = 77;
const SEED_MOUSE_MIDDLE: u64 = 78;
const SEED_FAST_OFFSET: u64 = 100;
const SEED_RELEASE_OFFSET: u64 = 200;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedBinding {
    pub key_id: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one reload.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReloadReport {
    pub pool_sizes: [usize; POOL_SLOTS],
    pub custom_bindings: usize,
    pub soundpack: bool,
    pub missing_sources: Vec<PathBuf>,
    pub skipped: Vec<SkippedBinding>,
}

impl ReloadReport {
    pub fn pool_size(&self, slot: PoolSlot) -> usize {
        self.pool_sizes[slot.index()]
    }

    pub fn total_clips(&self) -> usize {
        self.pool_sizes.iter().sum()
    }
}

/// Collaborators a reload reads sound data through.
#[derive(Clone, Copy)]
pub struct SoundSources<'a> {
    pub samples: &'a dyn SampleSourcePort,
    pub soundpacks: Option<&'a dyn SoundpackLoader>,
}

struct Builder<'a> {
    settings: &'a EngineSettings,
    ctx: RenderContext,
    format: PcmFormat,
    volume: Volume01,
    sources: SoundSources<'a>,
    report: ReloadReport,
}

/// Renders every pool and loads every binding into fresh storage. Touches no live state.
pub fn build_contents(
    settings: &EngineSettings,
    presets: &PresetSet,
    bindings: &KeyBindings,
    sources: SoundSources<'_>,
    volume: Volume01,
) -> Result<(BankContents, ReloadReport), EngineError> {
    let format = settings.mixer.pcm_format();
    presets.validate(format.sample_rate_hz)?;

    let mut builder = Builder {
        settings,
        ctx: RenderContext {
            sample_rate: format.sample_rate_hz,
            highpass_fc_hz: presets.highpass_fc_hz,
            normalize_target: settings.engine.normalize_target,
        },
        format,
        volume,
        sources,
        report: ReloadReport::default(),
    };

    let mut contents = BankContents {
        volume,
        ..BankContents::empty()
    };

    let key_path = settings.sounds.key_path();
    if let Some(base) = builder.load_base(&key_path) {
        for (preset, seed, slots) in [
            (
                &presets.normal_key,
                SEED_NORMAL,
                [
                    PoolSlot::NormalSlow,
                    PoolSlot::NormalFast,
                    PoolSlot::NormalRelease,
                ],
            ),
            (
                &presets.heavy_key,
                SEED_HEAVY,
                [
                    PoolSlot::HeavySlow,
                    PoolSlot::HeavyFast,
                    PoolSlot::HeavyRelease,
                ],
            ),
        ] {
            let [slow, fast, release] = slots;
            contents.pools[slow.index()] = builder.press_pool(&base, preset, seed, None, slow)?;
            contents.pools[fast.index()] = builder.press_pool(
                &base,
                preset,
                seed + SEED_FAST_OFFSET,
                Some(builder.fast_modifier()),
                fast,
            )?;
            contents.pools[release.index()] =
                builder.release_pool(&base, preset, seed + SEED_RELEASE_OFFSET, release)?;
        }
    }

    let mouse_path = settings.sounds.mouse_path();
    let middle_path = settings.sounds.mouse_middle_path();
    let mouse_base = builder.load_base(&mouse_path);
    let middle_base = if middle_path == mouse_path {
        mouse_base.clone()
    } else {
        builder.load_base(&middle_path)
    };
    if let Some(base) = mouse_base {
        contents.pools[PoolSlot::MouseLeft.index()] = builder.press_pool(
            &base,
            &presets.mouse_left,
            SEED_MOUSE_LEFT,
            None,
            PoolSlot::MouseLeft,
        )?;
    }
    if let Some(base) = middle_base {
        contents.pools[PoolSlot::MouseMiddle.index()] = builder.press_pool(
            &base,
            &presets.mouse_middle,
            SEED_MOUSE_MIDDLE,
            None,
            PoolSlot::MouseMiddle,
        )?;
    }

    contents.custom = builder.custom_bindings(bindings);
    if let Some(folder) = bindings.pack_folder() {
        contents.resolver = builder.soundpack(folder);
    }

    let mut report = builder.report;
    report.pool_sizes = contents.pool_sizes();
    report.custom_bindings = contents.custom.len();
    report.soundpack = contents.resolver.is_some();
    Ok((contents, report))
}

impl Builder<'_> {
    fn fast_modifier(&self) -> FastModifier {
        FastModifier {
            pitch_add: self.settings.wpm.fast_pitch_add,
            reverb_scale: self.settings.wpm.fast_reverb_scale,
        }
    }

    fn load_base(&mut self, path: &Path) -> Option<DecodedAudio> {
        match self.sources.samples.load(path, self.format) {
            Ok(decoded) if !decoded.is_empty() => Some(decoded),
            Ok(_) => {
                log::warn!("sound file {} is empty, its pools stay silent", path.display());
                self.report.missing_sources.push(path.to_path_buf());
                None
            }
            Err(e) => {
                log::warn!("sound file {} unavailable ({e}), its pools stay silent", path.display());
                self.report.missing_sources.push(path.to_path_buf());
                None
            }
        }
    }

    fn to_pool(&self, variations: Vec<Variation>) -> Arc<SoundPool> {
        let clips = variations
            .into_iter()
            .map(|v| PcmClip::shared(self.format, v.pcm, self.volume))
            .collect();
        Arc::new(SoundPool::new(clips))
    }

    fn press_pool(
        &self,
        base: &DecodedAudio,
        preset: &KeyPreset,
        seed: u64,
        fast: Option<FastModifier>,
        slot: PoolSlot,
    ) -> Result<Arc<SoundPool>, EngineError> {
        let variations = build_pool(
            base,
            preset,
            &self.ctx,
            self.settings.engine.pool_size,
            seed,
            fast,
            slot.label(),
        )?;
        Ok(self.to_pool(variations))
    }

    fn release_pool(
        &self,
        base: &DecodedAudio,
        preset: &KeyPreset,
        seed: u64,
        slot: PoolSlot,
    ) -> Result<Arc<SoundPool>, EngineError> {
        let variations = build_release_pool(
            base,
            preset.release.as_ref(),
            &self.ctx,
            self.settings.engine.pool_size,
            seed,
            slot.label(),
        )?;
        Ok(self.to_pool(variations))
    }

    fn custom_bindings(&mut self, bindings: &KeyBindings) -> HashMap<String, Clip> {
        let mut custom = HashMap::with_capacity(bindings.sound_count());
        for (key_id, path) in bindings.sounds() {
            let loaded = self
                .sources
                .samples
                .load(path, self.format)
                .map_err(|e| e.to_string())
                .and_then(|decoded| quantize_stereo(&decoded).map_err(|e| e.to_string()));
            match loaded {
                Ok(pcm) => {
                    custom.insert(
                        key_id.to_string(),
                        PcmClip::shared(self.format, pcm, self.volume),
                    );
                }
                Err(reason) => {
                    log::warn!("skipping binding {key_id} -> {}: {reason}", path.display());
                    self.skip(key_id, path, reason);
                }
            }
        }
        custom
    }

    fn soundpack(
        &mut self,
        folder: &Path,
    ) -> Option<Arc<dyn SoundpackResolver>> {
        let Some(loader) = self.sources.soundpacks else {
            log::warn!("soundpack {} bound but no loader configured", folder.display());
            self.skip(PACK_FOLDER_KEY, folder, "no soundpack loader".to_string());
            return None;
        };
        match loader.load_pack(folder, self.format) {
            Ok(resolver) => {
                resolver.set_volume(self.volume);
                Some(resolver)
            }
            Err(e) => {
                log::warn!("skipping soundpack {}: {e}", folder.display());
                self.skip(PACK_FOLDER_KEY, folder, e.to_string());
                None
            }
        }
    }

    fn skip(&mut self, key_id: &str, path: &Path, reason: String) {
        self.report.skipped.push(SkippedBinding {
            key_id: key_id.to_string(),
            path: path.to_path_buf(),
            reason,
        });
    }
}
