//! Depth-displaced topography effect
//!
//! Displaces a flat point grid along Z by the converted depth texture and
//! colours it from the converted colour texture. Two techniques: a
//! geometry-only pass that primes the depth buffer and a shaded pass lit by
//! a single point light that follows the tracked hand.

use std::path::Path;

use crate::foundation::math::{inverse_transpose, Mat4, Vec3};
use crate::render::api::{MeshId, TextureId};
use crate::render::effect::{Effect, EffectError};
use crate::render::{GraphicsContext, RenderResult};

/// Technique selection for [`DepthGeometryEffect::draw`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryPass {
    /// Geometry only, no lighting
    DepthOnly,
    /// Point-light shading
    Shaded,
}

impl GeometryPass {
    /// Technique name in the effect file
    pub const fn technique(self) -> &'static str {
        match self {
            Self::DepthOnly => "RenderDepthGeometryNoShading",
            Self::Shaded => "RenderDepthGeometryWithShading",
        }
    }
}

/// Default light attenuation (constant, linear, quadratic)
pub const DEFAULT_ATTENUATION: [f32; 3] = [0.0, 0.01, 0.0];

/// Topography rendering effect
#[derive(Debug)]
pub struct DepthGeometryEffect {
    effect: Effect,
}

impl DepthGeometryEffect {
    /// Load the effect and bind the sensor textures and depth range
    ///
    /// # Errors
    ///
    /// Effect load failures, or a missing technique for either pass.
    pub fn load(
        ctx: &mut GraphicsContext,
        path: impl AsRef<Path>,
        depth: TextureId,
        colour: TextureId,
        near_cm: f32,
        far_cm: f32,
    ) -> Result<Self, EffectError> {
        let effect = Effect::load(ctx, path.as_ref())?;
        let mut geometry = Self { effect };
        if let Err(e) = geometry.check_techniques(ctx) {
            geometry.release(ctx);
            return Err(e);
        }

        geometry.set_textures(depth, colour);
        geometry.set_depth_range(near_cm, far_cm);
        geometry.set_light_attenuation(&Vec3::from(DEFAULT_ATTENUATION));
        Ok(geometry)
    }

    fn check_techniques(&mut self, ctx: &GraphicsContext) -> Result<(), EffectError> {
        for pass in [GeometryPass::Shaded, GeometryPass::DepthOnly] {
            if !self.effect.set_technique(ctx, pass.technique()) {
                return Err(EffectError::MissingTechnique {
                    path: self.effect.path().to_path_buf(),
                    name: pass.technique().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Sampled textures
    pub fn set_textures(&mut self, depth: TextureId, colour: TextureId) {
        self.effect.set_texture("DepthSampler", depth);
        self.effect.set_texture("ColourSampler", colour);
    }

    /// Depth range the depth texture was normalised over, in centimetres
    pub fn set_depth_range(&mut self, near_cm: f32, far_cm: f32) {
        self.effect.set_float("NearDistanceInCm", near_cm);
        self.effect.set_float("DistanceDiffInCm", far_cm - near_cm);
    }

    /// World, view and projection transforms plus the derived matrices
    pub fn set_transforms(&mut self, world: &Mat4, view: &Mat4, projection: &Mat4) {
        let wvp = projection * view * world;
        let view_inverse = view.try_inverse().unwrap_or_else(Mat4::identity);
        self.effect.set_mat4("WvpXf", &wvp);
        self.effect.set_mat4("WorldXf", world);
        self.effect.set_mat4("WorldITXf", &inverse_transpose(world));
        self.effect.set_mat4("ViewIXf", &view_inverse);
    }

    /// Key light position in world space
    pub fn set_light_position(&mut self, position: &Vec3) {
        self.effect.set_vec3("KeyPointLightPos", position);
    }

    /// Key light colour
    pub fn set_light_colour(&mut self, colour: &Vec3) {
        self.effect.set_vec3("KeyPointLightColour", colour);
    }

    /// Key light attenuation (constant, linear, quadratic)
    pub fn set_light_attenuation(&mut self, attenuation: &Vec3) {
        self.effect.set_vec3("KeyPointLightAtten", attenuation);
    }

    /// Specular exponent
    pub fn set_shininess(&mut self, shininess: f32) {
        self.effect.set_float("Shininess", shininess);
    }

    /// Draw the mesh with the technique for `pass`
    pub fn draw(&mut self, ctx: &mut GraphicsContext, mesh: MeshId, pass: GeometryPass) -> RenderResult<()> {
        self.effect.set_technique(ctx, pass.technique());
        self.effect.draw_mesh(ctx, mesh)
    }

    /// Underlying effect
    pub const fn effect(&self) -> &Effect {
        &self.effect
    }

    /// Re-read the effect file
    pub fn reload(&mut self, ctx: &mut GraphicsContext) -> Result<(), EffectError> {
        self.effect.reload(ctx)?;
        self.check_techniques(ctx)
    }

    /// Release the effect
    pub fn release(self, ctx: &mut GraphicsContext) {
        self.effect.release(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{Topology, UniformValue};
    use crate::render::backends::{DrawCommand, HeadlessDevice};
    use approx::assert_relative_eq;

    const EFFECT: &str = r#"EffectDescriptor(
        name: "depth geometry",
        parameters: [
            (name: "WvpXf", kind: Mat4),
            (name: "WorldXf", kind: Mat4),
            (name: "WorldITXf", kind: Mat4),
            (name: "ViewIXf", kind: Mat4),
            (name: "NearDistanceInCm", kind: Float),
            (name: "DistanceDiffInCm", kind: Float),
            (name: "DepthSampler", kind: Sampler),
            (name: "ColourSampler", kind: Sampler),
            (name: "KeyPointLightPos", kind: Vec3),
            (name: "KeyPointLightColour", kind: Vec3, default: Some(Vec3((1.0, 1.0, 1.0)))),
            (name: "KeyPointLightAtten", kind: Vec3),
            (name: "Shininess", kind: Float, default: Some(Float(10.0))),
        ],
        techniques: [
            (name: "RenderDepthGeometryNoShading", passes: [
                (vertex: Inline("uniform mat4 WvpXf; uniform float NearDistanceInCm; uniform float DistanceDiffInCm; uniform sampler2D DepthSampler; void main() {}"),
                 fragment: Inline("void main() {}"),
                 state: (colour_write: false)),
            ]),
            (name: "RenderDepthGeometryWithShading", passes: [
                (vertex: Inline("uniform mat4 WvpXf; void main() {}"),
                 fragment: Inline("uniform vec3 KeyPointLightPos; uniform vec3 KeyPointLightAtten; void main() {}"),
                 state: (depth_write: false, blend: Additive)),
            ]),
        ],
    )"#;

    fn setup() -> (tempfile::TempDir, GraphicsContext, DepthGeometryEffect, MeshId) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.ron");
        std::fs::write(&path, EFFECT).unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let effect = DepthGeometryEffect::load(&mut ctx, &path, TextureId(1), TextureId(2), 80.1, 397.5).unwrap();
        let mesh = ctx.gpu.create_mesh(&[], Topology::Points).unwrap();
        (dir, ctx, effect, mesh)
    }

    #[test]
    fn test_depth_range_and_defaults() {
        let (_dir, mut ctx, effect, _mesh) = setup();
        let params = effect.effect().params();
        assert_eq!(params.get("NearDistanceInCm"), Some(UniformValue::Float(80.1)));
        match params.get("DistanceDiffInCm") {
            Some(UniformValue::Float(diff)) => assert_relative_eq!(diff, 317.4, epsilon = 1e-3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(params.get("KeyPointLightAtten"), Some(UniformValue::Vec3(DEFAULT_ATTENUATION)));
        assert_eq!(effect.effect().technique_name(), GeometryPass::DepthOnly.technique());
        effect.release(&mut ctx);
    }

    #[test]
    fn test_passes_use_their_techniques() {
        let (_dir, mut ctx, mut effect, mesh) = setup();
        effect.set_transforms(&Mat4::identity(), &Mat4::identity(), &Mat4::identity());
        effect.set_light_position(&Vec3::new(1.0, 2.0, -3.0));

        effect.draw(&mut ctx, mesh, GeometryPass::DepthOnly).unwrap();
        effect.draw(&mut ctx, mesh, GeometryPass::Shaded).unwrap();

        let gpu = ctx.device::<HeadlessDevice>().unwrap();
        let states: Vec<_> = gpu
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Mesh { state, program, .. } => Some((*state, program.unwrap())),
                _ => None,
            })
            .collect();
        assert_eq!(states.len(), 2);
        assert!(!states[0].0.colour_write);
        assert!(states[1].0.colour_write);
        assert!(!states[1].0.depth_write);

        let shaded = gpu.program(states[1].1).unwrap();
        assert_eq!(shaded.uniforms.get("KeyPointLightPos"), Some(&UniformValue::Vec3([1.0, 2.0, -3.0])));

        effect.release(&mut ctx);
    }

    #[test]
    fn test_missing_technique_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.ron");
        std::fs::write(&path, EFFECT.replace("RenderDepthGeometryWithShading", "Other")).unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let err = DepthGeometryEffect::load(&mut ctx, &path, TextureId(1), TextureId(2), 80.0, 400.0).unwrap_err();
        assert!(matches!(err, EffectError::MissingTechnique { .. }));
        assert!(ctx.effects.is_empty());
    }
}
