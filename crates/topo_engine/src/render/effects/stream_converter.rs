//! Sensor stream to render target conversion
//!
//! Raw sensor images arrive in the device's layout (BGRA colour, upside-down
//! rows, raw luminance depth). A converter draws the raw texture through a
//! one-pass effect into a render target that the rest of the renderer samples.

use std::path::Path;

use crate::render::effect::{Effect, EffectError};
use crate::render::render_target::RenderTarget;
use crate::render::texture::Texture2D;
use crate::render::api::ClearMask;
use crate::render::{GraphicsContext, RenderResult};

/// Technique and sampler names of the colour stream converter
pub const COLOUR_CONVERTER: (&str, &str) = ("ColourStreamConverter", "ColourStreamSampler");

/// Technique and sampler names of the depth stream converter
pub const DEPTH_CONVERTER: (&str, &str) = ("DepthStreamConverter", "DepthStreamSampler");

/// Draws a source texture into a render target through an effect
#[derive(Debug)]
pub struct StreamConverter {
    effect: Effect,
    sampler: &'static str,
}

impl StreamConverter {
    /// Load a converter effect and select its technique
    ///
    /// # Errors
    ///
    /// Effect load failures, or [`EffectError::MissingTechnique`] when the
    /// effect has no valid technique of the given name.
    pub fn new(
        ctx: &mut GraphicsContext,
        path: impl AsRef<Path>,
        (technique, sampler): (&'static str, &'static str),
    ) -> Result<Self, EffectError> {
        let mut effect = Effect::load(ctx, path.as_ref())?;
        if !effect.set_technique(ctx, technique) {
            let path = effect.path().to_path_buf();
            effect.release(ctx);
            return Err(EffectError::MissingTechnique { path, name: technique.to_string() });
        }
        Ok(Self { effect, sampler })
    }

    /// Colour stream converter
    pub fn colour(ctx: &mut GraphicsContext, path: impl AsRef<Path>) -> Result<Self, EffectError> {
        Self::new(ctx, path, COLOUR_CONVERTER)
    }

    /// Depth stream converter
    pub fn depth(ctx: &mut GraphicsContext, path: impl AsRef<Path>) -> Result<Self, EffectError> {
        Self::new(ctx, path, DEPTH_CONVERTER)
    }

    /// Render `source` into `target`
    pub fn convert(&mut self, ctx: &mut GraphicsContext, source: &Texture2D, target: &RenderTarget) -> RenderResult<()> {
        self.effect.set_texture(self.sampler, source.id());

        target.bind(ctx.gpu.as_mut());
        ctx.gpu.clear(ClearMask::COLOUR, [0.0, 0.0, 0.0, 0.0]);
        let drawn = self.effect.draw_fullscreen(ctx);
        let unbound = target.unbind(ctx.gpu.as_mut());
        drawn.and(unbound)
    }

    /// Re-read the effect file
    pub fn reload(&mut self, ctx: &mut GraphicsContext) -> Result<(), EffectError> {
        self.effect.reload(ctx)
    }

    /// Release the effect
    pub fn release(self, ctx: &mut GraphicsContext) {
        self.effect.release(ctx);
    }
}
