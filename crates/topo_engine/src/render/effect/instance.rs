//! Owner-side handle to a cached effect

use std::cell::Cell;
use std::path::{Path, PathBuf};

use super::cache::{EffectHandle, LoadedEffect};
use super::parameters::ParameterBlock;
use super::EffectError;
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::api::{MeshId, TextureId};
use crate::render::{GraphicsContext, RenderError, RenderResult};

/// A reference into the [`super::EffectCache`] plus this owner's technique
/// choice and parameter values
///
/// Must be handed back with [`Effect::release`].
#[derive(Debug)]
pub struct Effect {
    path: PathBuf,
    handle: Option<EffectHandle>,
    technique: usize,
    technique_name: String,
    params: ParameterBlock,
    warned_unloaded: Cell<bool>,
}

impl Effect {
    /// Acquire the effect at `path` and select its first technique
    pub fn load(ctx: &mut GraphicsContext, path: impl AsRef<Path>) -> Result<Self, EffectError> {
        let path = path.as_ref().to_path_buf();
        let handle = ctx.effects.acquire(ctx.gpu.as_mut(), &path)?;
        let loaded = ctx.effects.get(handle).ok_or_else(|| EffectError::NotLoaded(path.clone()))?;

        let technique_name = loaded.techniques.first().map(|t| t.name.clone()).unwrap_or_default();
        let params = ParameterBlock::from_descriptors(&loaded.parameters);
        Ok(Self {
            path,
            handle: Some(handle),
            technique: 0,
            technique_name,
            params,
            warned_unloaded: Cell::new(false),
        })
    }

    fn loaded<'a>(&self, ctx: &'a GraphicsContext) -> Option<&'a LoadedEffect> {
        self.handle.and_then(|h| ctx.effects.get(h))
    }

    /// Select a technique by name
    ///
    /// Returns `false` and keeps the current technique when the effect has
    /// no valid technique of that name.
    pub fn set_technique(&mut self, ctx: &GraphicsContext, name: &str) -> bool {
        match self.loaded(ctx).and_then(|e| e.technique_index(name)) {
            Some(index) => {
                self.technique = index;
                self.technique_name = name.to_string();
                true
            }
            None => {
                log::warn!("Effect {} has no technique {name}", self.path.display());
                false
            }
        }
    }

    /// Name of the current technique
    pub fn technique_name(&self) -> &str {
        &self.technique_name
    }

    /// Effect file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the effect currently holds a cache reference
    pub const fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// Cache handle, if loaded
    pub const fn handle(&self) -> Option<EffectHandle> {
        self.handle
    }

    /// Parameter values
    pub const fn params(&self) -> &ParameterBlock {
        &self.params
    }

    /// Set a `float` parameter
    pub fn set_float(&mut self, name: &str, value: f32) -> bool {
        self.params.set_float(name, value)
    }

    /// Set a `vec3` parameter
    pub fn set_vec3(&mut self, name: &str, value: &Vec3) -> bool {
        self.params.set_vec3(name, value)
    }

    /// Set a `vec4` parameter
    pub fn set_vec4(&mut self, name: &str, value: &Vec4) -> bool {
        self.params.set_vec4(name, value)
    }

    /// Set a `mat4` parameter
    pub fn set_mat4(&mut self, name: &str, value: &Mat4) -> bool {
        self.params.set_mat4(name, value)
    }

    /// Bind a texture to a sampler parameter
    pub fn set_texture(&mut self, name: &str, texture: TextureId) -> bool {
        self.params.set_texture(name, texture)
    }

    /// Number of passes in the current technique
    pub fn passes(&self, ctx: &GraphicsContext) -> usize {
        self.loaded(ctx)
            .and_then(|e| e.techniques.get(self.technique))
            .map_or(0, |t| t.passes.len())
    }

    /// Make pass `index` current: program, render state and parameters
    pub fn apply_pass(&self, ctx: &mut GraphicsContext, index: usize) -> RenderResult<()> {
        let pass = self
            .loaded(ctx)
            .and_then(|e| e.techniques.get(self.technique))
            .and_then(|t| t.passes.get(index))
            .cloned()
            .ok_or_else(|| {
                RenderError::RenderingFailed(format!(
                    "effect {} has no pass {index} in technique {}",
                    self.path.display(),
                    self.technique_name
                ))
            })?;

        let gpu = ctx.gpu.as_mut();
        gpu.use_program(pass.program);
        gpu.set_render_state(&pass.state);
        self.params.upload(gpu, pass.program);
        Ok(())
    }

    /// Warn once per failed reload that draws are being skipped
    fn warn_if_unloaded(&self) {
        if self.handle.is_none() && !self.warned_unloaded.replace(true) {
            log::warn!("Effect {} is not loaded, skipping draws until it reloads", self.path.display());
        }
    }

    /// Run every pass of the current technique over a clip-space quad
    pub fn draw_fullscreen(&self, ctx: &mut GraphicsContext) -> RenderResult<()> {
        self.warn_if_unloaded();
        for index in 0..self.passes(ctx) {
            self.apply_pass(ctx, index)?;
            ctx.gpu.draw_fullscreen_quad();
        }
        Ok(())
    }

    /// Run every pass of the current technique over a mesh
    pub fn draw_mesh(&self, ctx: &mut GraphicsContext, mesh: MeshId) -> RenderResult<()> {
        self.warn_if_unloaded();
        for index in 0..self.passes(ctx) {
            self.apply_pass(ctx, index)?;
            ctx.gpu.draw_mesh(mesh);
        }
        Ok(())
    }

    /// Release and re-acquire the effect file, keeping technique and parameters
    ///
    /// Another owner still holding the effect keeps it cached, in which case
    /// the shared copy is returned unchanged. On failure the effect is left
    /// unloaded and draws are skipped with a single warning; a later
    /// `reload` retries.
    pub fn reload(&mut self, ctx: &mut GraphicsContext) -> Result<(), EffectError> {
        if let Some(handle) = self.handle.take() {
            ctx.effects.release(ctx.gpu.as_mut(), handle);
        }

        let handle = ctx.effects.acquire(ctx.gpu.as_mut(), &self.path)?;
        self.handle = Some(handle);
        self.warned_unloaded.set(false);

        let Some(loaded) = ctx.effects.get(handle) else {
            return Err(EffectError::NotLoaded(self.path.clone()));
        };
        let mut params = ParameterBlock::from_descriptors(&loaded.parameters);
        params.inherit(&self.params);
        self.params = params;

        if let Some(index) = loaded.technique_index(&self.technique_name) {
            self.technique = index;
        } else {
            let fallback = loaded.techniques.first().map(|t| t.name.clone()).unwrap_or_default();
            log::warn!(
                "Technique {} missing after reloading {}, using {fallback}",
                self.technique_name,
                self.path.display()
            );
            self.technique = 0;
            self.technique_name = fallback;
        }
        log::info!("Reloaded effect {}", self.path.display());
        Ok(())
    }

    /// Hand the cache reference back
    pub fn release(mut self, ctx: &mut GraphicsContext) {
        if let Some(handle) = self.handle.take() {
            ctx.effects.release(ctx.gpu.as_mut(), handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::UniformValue;
    use crate::render::backends::{DrawCommand, HeadlessDevice};

    const EFFECT: &str = r#"EffectDescriptor(
        name: "geometry",
        parameters: [
            (name: "Shininess", kind: Float, default: Some(Float(4.0))),
            (name: "DepthSampler", kind: Sampler),
        ],
        techniques: [
            (name: "NoShading", passes: [
                (vertex: Inline("uniform float Shininess; void main() {}"),
                 fragment: Inline("uniform sampler2D DepthSampler; void main() {}"),
                 state: (colour_write: false)),
            ]),
            (name: "WithShading", passes: [
                (vertex: Inline("void main() {}"), fragment: Inline("uniform float Shininess; void main() {}")),
                (vertex: Inline("void main() {}"), fragment: Inline("void main() {}")),
            ]),
        ],
    )"#;

    fn context() -> GraphicsContext {
        GraphicsContext::new(Box::new(HeadlessDevice::new()))
    }

    fn headless(ctx: &GraphicsContext) -> &HeadlessDevice {
        ctx.device::<HeadlessDevice>().unwrap()
    }

    #[test]
    fn test_technique_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.ron");
        std::fs::write(&path, EFFECT).unwrap();
        let mut ctx = context();

        let mut effect = Effect::load(&mut ctx, &path).unwrap();
        assert_eq!(effect.technique_name(), "NoShading");
        assert_eq!(effect.passes(&ctx), 1);

        assert!(effect.set_technique(&ctx, "WithShading"));
        assert_eq!(effect.passes(&ctx), 2);
        assert!(!effect.set_technique(&ctx, "Missing"));
        assert_eq!(effect.technique_name(), "WithShading");

        effect.release(&mut ctx);
        assert!(ctx.effects.is_empty());
    }

    #[test]
    fn test_two_owners_share_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.ron");
        std::fs::write(&path, EFFECT).unwrap();
        let mut ctx = context();

        let a = Effect::load(&mut ctx, &path).unwrap();
        let b = Effect::load(&mut ctx, &path).unwrap();
        assert_eq!(a.handle(), b.handle());
        let handle = a.handle().unwrap();
        assert_eq!(ctx.effects.ref_count(handle), 2);

        a.release(&mut ctx);
        assert_eq!(ctx.effects.ref_count(handle), 1);
        b.release(&mut ctx);
        assert_eq!(ctx.effects.ref_count(handle), 0);
        assert_eq!(headless(&ctx).live_programs(), 0);
    }

    #[test]
    fn test_draw_runs_every_pass_with_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.ron");
        std::fs::write(&path, EFFECT).unwrap();
        let mut ctx = context();

        let mut effect = Effect::load(&mut ctx, &path).unwrap();
        assert!(effect.set_texture("DepthSampler", TextureId(42)));
        effect.draw_fullscreen(&mut ctx).unwrap();

        let gpu = headless(&ctx);
        let quads: Vec<_> = gpu
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::FullscreenQuad { program, state, .. } => Some((*program, *state)),
                _ => None,
            })
            .collect();
        assert_eq!(quads.len(), 1);
        let (program, state) = quads[0];
        assert!(!state.colour_write);

        let program = gpu.program(program.unwrap()).unwrap();
        assert_eq!(program.uniforms.get("Shininess"), Some(&UniformValue::Float(4.0)));
        assert_eq!(
            program.uniforms.get("DepthSampler"),
            Some(&UniformValue::Sampler { unit: 0, texture: TextureId(42) })
        );

        effect.release(&mut ctx);
    }

    #[test]
    fn test_reload_keeps_technique_and_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.ron");
        std::fs::write(&path, EFFECT).unwrap();
        let mut ctx = context();

        let mut effect = Effect::load(&mut ctx, &path).unwrap();
        effect.set_technique(&ctx, "WithShading");
        effect.set_float("Shininess", 16.0);

        effect.reload(&mut ctx).unwrap();
        assert_eq!(effect.technique_name(), "WithShading");
        assert_eq!(effect.params().get("Shininess"), Some(UniformValue::Float(16.0)));
        assert_eq!(headless(&ctx).programs_created(), 6);
        assert_eq!(ctx.effects.len(), 1);

        effect.release(&mut ctx);
    }

    #[test]
    fn test_failed_reload_leaves_effect_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.ron");
        std::fs::write(&path, EFFECT).unwrap();
        let mut ctx = context();

        let mut effect = Effect::load(&mut ctx, &path).unwrap();
        std::fs::write(&path, "garbage").unwrap();
        assert!(effect.reload(&mut ctx).is_err());
        assert!(!effect.is_loaded());
        assert!(ctx.effects.is_empty());
        assert!(effect.draw_fullscreen(&mut ctx).is_ok());

        std::fs::write(&path, EFFECT).unwrap();
        effect.reload(&mut ctx).unwrap();
        assert!(effect.is_loaded());
        effect.release(&mut ctx);
    }

    #[test]
    fn test_unloaded_draws_skip_and_warn_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.ron");
        std::fs::write(&path, EFFECT).unwrap();
        let mut ctx = context();

        let mut effect = Effect::load(&mut ctx, &path).unwrap();
        effect.draw_fullscreen(&mut ctx).unwrap();
        assert!(!effect.warned_unloaded.get());

        std::fs::write(&path, "garbage").unwrap();
        assert!(effect.reload(&mut ctx).is_err());
        ctx.device_mut::<HeadlessDevice>().unwrap().clear_commands();

        effect.draw_mesh(&mut ctx, MeshId(1)).unwrap();
        effect.draw_fullscreen(&mut ctx).unwrap();
        assert!(effect.warned_unloaded.get());
        assert!(headless(&ctx).commands().is_empty());

        // A successful reload re-arms the warning for the next failure
        std::fs::write(&path, EFFECT).unwrap();
        effect.reload(&mut ctx).unwrap();
        assert!(!effect.warned_unloaded.get());
        effect.draw_fullscreen(&mut ctx).unwrap();
        assert!(!headless(&ctx).commands().is_empty());
        effect.release(&mut ctx);
    }
}
