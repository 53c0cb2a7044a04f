//! Reference-counted effect cache
//!
//! Effects are keyed by file path. The first `acquire` for a path compiles
//! it; later ones share the compiled programs and bump the count. `release`
//! drops a reference and unloads the programs at zero.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use slotmap::{new_key_type, SlotMap};

use super::descriptor::{EffectDescriptor, ParameterDescriptor, ResolvedTechnique};
use super::EffectError;
use crate::foundation::time::Stopwatch;
use crate::render::api::{GpuDevice, ProgramId, RenderState};

new_key_type! {
    /// Key of a loaded effect in the cache
    pub struct EffectHandle;
}

/// Compiled pass
#[derive(Debug, Clone)]
pub struct Pass {
    /// Linked program
    pub program: ProgramId,
    /// Fixed-function state
    pub state: RenderState,
}

/// Technique whose passes all compiled
#[derive(Debug, Clone)]
pub struct Technique {
    /// Technique name
    pub name: String,
    /// Passes in draw order
    pub passes: Vec<Pass>,
}

/// Effect held by the cache
#[derive(Debug)]
pub struct LoadedEffect {
    /// File the effect was loaded from
    pub path: PathBuf,
    /// Display name
    pub name: String,
    /// Declared parameters
    pub parameters: Vec<ParameterDescriptor>,
    /// Valid techniques, never empty
    pub techniques: Vec<Technique>,
    ref_count: usize,
}

impl LoadedEffect {
    /// Live references
    pub const fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Technique index by name
    pub fn technique_index(&self, name: &str) -> Option<usize> {
        self.techniques.iter().position(|t| t.name == name)
    }

    fn destroy_programs(&self, gpu: &mut dyn GpuDevice) {
        for pass in self.techniques.iter().flat_map(|t| &t.passes) {
            gpu.destroy_program(pass.program);
        }
    }
}

/// Effect cache shared by every effect owner
#[derive(Debug, Default)]
pub struct EffectCache {
    effects: SlotMap<EffectHandle, LoadedEffect>,
    by_path: HashMap<PathBuf, EffectHandle>,
}

impl EffectCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn key_for(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    /// Get a reference to the effect at `path`, loading it on first use
    ///
    /// # Errors
    ///
    /// Missing files, unreadable or malformed effects and effects with no
    /// technique that compiles. The cache is unchanged on error.
    pub fn acquire(&mut self, gpu: &mut dyn GpuDevice, path: impl AsRef<Path>) -> Result<EffectHandle, EffectError> {
        let path = path.as_ref();
        let key = Self::key_for(path);

        if let Some(&handle) = self.by_path.get(&key) {
            if let Some(effect) = self.effects.get_mut(handle) {
                effect.ref_count += 1;
                log::debug!("Effect {} shared (refs: {})", path.display(), effect.ref_count);
                return Ok(handle);
            }
        }

        let stopwatch = Stopwatch::start_new();
        let resolved = EffectDescriptor::load(path).map_err(|e| {
            log::warn!("{e}");
            e
        })?;

        let mut techniques = Vec::with_capacity(resolved.techniques.len());
        for technique in resolved.techniques {
            match compile_technique(gpu, &technique) {
                Ok(compiled) => techniques.push(compiled),
                Err(reason) => {
                    log::warn!(
                        "Technique {} did not validate in effect {}: {reason}",
                        technique.name,
                        path.display()
                    );
                }
            }
        }
        if techniques.is_empty() {
            log::error!("Effect {} has no valid techniques", path.display());
            return Err(EffectError::NoValidTechniques(path.to_path_buf()));
        }

        log::info!(
            "Loaded effect {} ({} technique(s)) from {} in {:.1} ms",
            resolved.name,
            techniques.len(),
            path.display(),
            stopwatch.elapsed_millis()
        );
        let handle = self.effects.insert(LoadedEffect {
            path: key.clone(),
            name: resolved.name,
            parameters: resolved.parameters,
            techniques,
            ref_count: 1,
        });
        self.by_path.insert(key, handle);
        Ok(handle)
    }

    /// Drop one reference; unloads the effect when the count reaches zero
    ///
    /// Returns `false` for a handle the cache does not know.
    pub fn release(&mut self, gpu: &mut dyn GpuDevice, handle: EffectHandle) -> bool {
        let Some(effect) = self.effects.get_mut(handle) else {
            log::warn!("Release of unknown effect handle {handle:?}");
            return false;
        };
        effect.ref_count -= 1;
        if effect.ref_count > 0 {
            log::debug!("Effect {} released (refs: {})", effect.path.display(), effect.ref_count);
            return true;
        }

        if let Some(effect) = self.effects.remove(handle) {
            effect.destroy_programs(gpu);
            self.by_path.remove(&effect.path);
            log::info!("Unloaded effect {}", effect.path.display());
        }
        true
    }

    /// Loaded effect by handle
    pub fn get(&self, handle: EffectHandle) -> Option<&LoadedEffect> {
        self.effects.get(handle)
    }

    /// Reference count of a handle, zero when not loaded
    pub fn ref_count(&self, handle: EffectHandle) -> usize {
        self.effects.get(handle).map_or(0, LoadedEffect::ref_count)
    }

    /// Handle of an already loaded path
    pub fn handle_for_path(&self, path: impl AsRef<Path>) -> Option<EffectHandle> {
        self.by_path.get(&Self::key_for(path.as_ref())).copied()
    }

    /// Number of loaded effects
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether no effects are loaded
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Unload every effect regardless of reference count
    pub fn clear(&mut self, gpu: &mut dyn GpuDevice) {
        for (_, effect) in self.effects.drain() {
            effect.destroy_programs(gpu);
        }
        self.by_path.clear();
    }
}

fn compile_technique(gpu: &mut dyn GpuDevice, technique: &ResolvedTechnique) -> Result<Technique, String> {
    if technique.passes.is_empty() {
        return Err("technique has no passes".to_string());
    }
    let mut passes: Vec<Pass> = Vec::with_capacity(technique.passes.len());
    for (index, pass) in technique.passes.iter().enumerate() {
        match gpu.create_program(&pass.vertex, &pass.fragment) {
            Ok(program) => passes.push(Pass { program, state: pass.state }),
            Err(e) => {
                for compiled in &passes {
                    gpu.destroy_program(compiled.program);
                }
                return Err(format!("pass {index}: {e}"));
            }
        }
    }
    Ok(Technique {
        name: technique.name.clone(),
        passes,
    })
}
