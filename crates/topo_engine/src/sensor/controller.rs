//! Sensor controller
//!
//! Owns the camera and every GPU resource fed from it: the raw colour and
//! depth textures, the converted colour / depth render targets, the skeleton
//! debug target and the two converter effects. Each poll uploads whatever
//! new frames the camera has and redraws the derived targets.

use std::f32::consts::PI;

use crate::config::settings::{EffectPaths, SensorSettings};
use crate::foundation::math::{orthographic, Mat4, Vec2, Vec3};
use crate::render::api::{ClearMask, GpuDevice, RenderState, Topology};
use crate::render::effects::StreamConverter;
use crate::render::geometry::ColorVertex;
use crate::render::render_target::{Attachments, RenderTarget};
use crate::render::texture::{PixelFormat, Texture2D, TextureFilter};
use crate::render::{GraphicsContext, RenderResult};
use crate::sensor::depth::{DepthNormalizer, DepthRange};
use crate::sensor::device::{DepthCamera, Resolution, COLOUR_BYTES_PER_PIXEL};
use crate::sensor::projector::{self, SkeletonProjector};
use crate::sensor::skeleton::{SkeletonData, SkeletonFrame, BONE_CHAINS};
use crate::sensor::smoothing::SkeletonSmoother;
use crate::sensor::SensorError;

/// Joint marker size in pixels
pub const JOINT_POINT_SIZE: f32 = 15.0;

/// Joint marker colour
pub const JOINT_COLOUR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

/// Bone line colour
pub const BONE_COLOUR: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

/// Raw sensor images as uploaded
#[derive(Debug)]
struct SourceTextures {
    colour: Texture2D,
    depth: Texture2D,
}

impl SourceTextures {
    fn create(gpu: &mut dyn GpuDevice, colour: Resolution, depth: Resolution) -> RenderResult<Self> {
        let colour = Texture2D::create_empty(gpu, colour.width, colour.height, TextureFilter::Nearest, PixelFormat::Rgba8)?;
        match Texture2D::create_empty(gpu, depth.width, depth.height, TextureFilter::Nearest, PixelFormat::LuminanceF32) {
            Ok(depth) => Ok(Self { colour, depth }),
            Err(e) => {
                colour.destroy(gpu);
                Err(e)
            }
        }
    }

    fn destroy(self, gpu: &mut dyn GpuDevice) {
        self.depth.destroy(gpu);
        self.colour.destroy(gpu);
    }
}

/// Converted images sampled by the renderer
#[derive(Debug)]
struct Targets {
    colour: RenderTarget,
    depth: RenderTarget,
    skeleton: RenderTarget,
}

impl Targets {
    fn build(gpu: &mut dyn GpuDevice, colour: Resolution, depth: Resolution) -> RenderResult<Self> {
        let colour_target = RenderTarget::build(
            gpu,
            colour.width,
            colour.height,
            Attachments::empty(),
            TextureFilter::Bilinear,
            PixelFormat::Rgba8,
        )?;
        let depth_target = match RenderTarget::build(
            gpu,
            depth.width,
            depth.height,
            Attachments::empty(),
            TextureFilter::Bilinear,
            PixelFormat::Luminance8,
        ) {
            Ok(target) => target,
            Err(e) => {
                colour_target.destroy(gpu);
                return Err(e);
            }
        };
        match RenderTarget::build(
            gpu,
            colour.width,
            colour.height,
            Attachments::DEPTH,
            TextureFilter::Bilinear,
            PixelFormat::Rgba8,
        ) {
            Ok(skeleton) => Ok(Self {
                colour: colour_target,
                depth: depth_target,
                skeleton,
            }),
            Err(e) => {
                depth_target.destroy(gpu);
                colour_target.destroy(gpu);
                Err(e)
            }
        }
    }

    fn destroy(self, gpu: &mut dyn GpuDevice) {
        self.skeleton.destroy(gpu);
        self.depth.destroy(gpu);
        self.colour.destroy(gpu);
    }
}

#[derive(Debug)]
struct Converters {
    colour: StreamConverter,
    depth: StreamConverter,
}

impl Converters {
    fn load(ctx: &mut GraphicsContext, paths: &EffectPaths) -> Result<Self, SensorError> {
        let colour = StreamConverter::colour(ctx, &paths.colour_converter)?;
        match StreamConverter::depth(ctx, &paths.depth_converter) {
            Ok(depth) => Ok(Self { colour, depth }),
            Err(e) => {
                colour.release(ctx);
                Err(e.into())
            }
        }
    }

    fn release(self, ctx: &mut GraphicsContext) {
        self.depth.release(ctx);
        self.colour.release(ctx);
    }
}

/// Camera plus the textures derived from it
pub struct SensorController {
    camera: Box<dyn DepthCamera>,
    sources: SourceTextures,
    targets: Targets,
    converters: Converters,
    normalizer: DepthNormalizer,
    smoother: SkeletonSmoother,
    projector: SkeletonProjector,
    skeleton_frame: SkeletonFrame,
    colour_resolution: Resolution,
    depth_resolution: Resolution,
}

impl SensorController {
    /// Open the camera streams and create every derived resource
    ///
    /// # Errors
    ///
    /// Any stream, texture, render target or effect failure. Whatever was
    /// created before the failure is destroyed and the camera is shut down.
    pub fn build(
        ctx: &mut GraphicsContext,
        mut camera: Box<dyn DepthCamera>,
        settings: &SensorSettings,
        effects: &EffectPaths,
    ) -> Result<Self, SensorError> {
        let range = settings.depth_range()?;

        let (colour_resolution, depth_resolution) = match Self::open_streams(camera.as_mut(), settings) {
            Ok(resolutions) => resolutions,
            Err(e) => {
                camera.shutdown();
                return Err(e);
            }
        };

        let sources = match SourceTextures::create(ctx.gpu.as_mut(), colour_resolution, depth_resolution) {
            Ok(sources) => sources,
            Err(e) => {
                log::error!("Failed to create colour/depth texture: {e}");
                camera.shutdown();
                return Err(e.into());
            }
        };

        let targets = match Targets::build(ctx.gpu.as_mut(), colour_resolution, depth_resolution) {
            Ok(targets) => targets,
            Err(e) => {
                log::error!("Failed to create colour/depth frame buffer objects: {e}");
                sources.destroy(ctx.gpu.as_mut());
                camera.shutdown();
                return Err(e.into());
            }
        };

        let converters = match Converters::load(ctx, effects) {
            Ok(converters) => converters,
            Err(e) => {
                targets.destroy(ctx.gpu.as_mut());
                sources.destroy(ctx.gpu.as_mut());
                camera.shutdown();
                return Err(e);
            }
        };

        log::info!(
            "Sensor '{}' ready: colour {}x{}, depth {}x{}, range {}-{} mm",
            camera.name(),
            colour_resolution.width,
            colour_resolution.height,
            depth_resolution.width,
            depth_resolution.height,
            range.near_mm(),
            range.far_mm()
        );

        Ok(Self {
            camera,
            sources,
            targets,
            converters,
            normalizer: DepthNormalizer::new(range, depth_resolution.pixel_count()),
            smoother: SkeletonSmoother::new(settings.smoothing),
            projector: SkeletonProjector::new(depth_resolution.width, depth_resolution.height),
            skeleton_frame: SkeletonFrame::default(),
            colour_resolution,
            depth_resolution,
        })
    }

    fn open_streams(camera: &mut dyn DepthCamera, settings: &SensorSettings) -> Result<(Resolution, Resolution), SensorError> {
        let colour = camera.open_colour_stream(settings.colour_resolution)?;
        let depth = camera.open_depth_stream(settings.depth_resolution)?;
        camera.enable_skeleton_tracking()?;
        Ok((colour, depth))
    }

    /// Pick up new colour, depth and skeleton frames, in that order
    ///
    /// Missing frames leave the previous contents in place. Failures are
    /// logged and do not stop the other streams.
    pub fn poll(&mut self, ctx: &mut GraphicsContext) {
        if let Err(e) = self.poll_colour(ctx) {
            log::error!("Colour frame dropped: {e}");
        }
        if let Err(e) = self.poll_depth(ctx) {
            log::error!("Depth frame dropped: {e}");
        }
        if let Err(e) = self.poll_skeleton(ctx) {
            log::error!("Skeleton frame dropped: {e}");
        }
    }

    /// Upload and convert the next colour frame; `false` when none was used
    pub fn poll_colour(&mut self, ctx: &mut GraphicsContext) -> Result<bool, SensorError> {
        let Some(frame) = self.camera.next_colour_frame() else {
            return Ok(false);
        };
        if frame.is_bogus() {
            log::warn!("Colour buffer length of received texture is bogus");
            return Ok(false);
        }
        if frame.resolution() != self.colour_resolution {
            return Err(SensorError::MalformedFrame {
                stream: "colour",
                message: format!("{}x{} frame on a {}x{} stream", frame.width, frame.height, self.colour_resolution.width, self.colour_resolution.height),
            });
        }

        // Still BGRA; the converter swizzles
        let pixels = frame.packed_rows(COLOUR_BYTES_PER_PIXEL, "colour")?;
        self.sources.colour.set_buffer(ctx.gpu.as_mut(), PixelFormat::Rgba8, &pixels)?;
        self.converters.colour.convert(ctx, &self.sources.colour, &self.targets.colour)?;
        Ok(true)
    }

    /// Normalise, upload and convert the next depth frame; `false` when none was used
    pub fn poll_depth(&mut self, ctx: &mut GraphicsContext) -> Result<bool, SensorError> {
        let Some(frame) = self.camera.next_depth_frame() else {
            return Ok(false);
        };
        if frame.is_bogus() {
            log::warn!("Depth buffer length of received texture is bogus");
            return Ok(false);
        }

        self.normalizer.normalize_frame(&frame)?;
        self.sources
            .depth
            .set_buffer(ctx.gpu.as_mut(), PixelFormat::LuminanceF32, self.normalizer.as_bytes())?;
        self.converters.depth.convert(ctx, &self.sources.depth, &self.targets.depth)?;
        Ok(true)
    }

    /// Smooth the next skeleton frame and redraw the debug target; `false` when none arrived
    pub fn poll_skeleton(&mut self, ctx: &mut GraphicsContext) -> Result<bool, SensorError> {
        let Some(mut frame) = self.camera.next_skeleton_frame() else {
            return Ok(false);
        };
        self.smoother.apply(&mut frame);
        self.skeleton_frame = frame;
        self.draw_skeleton_debug(ctx.gpu.as_mut())?;
        Ok(true)
    }

    /// Redraw the skeleton target from the current skeleton frame
    ///
    /// Image rows run top-down while the target's origin is bottom-left, so
    /// points are turned half a turn about the target centre.
    #[allow(clippy::cast_precision_loss)]
    pub fn draw_skeleton_debug(&self, gpu: &mut dyn GpuDevice) -> RenderResult<()> {
        let target = &self.targets.skeleton;
        target.bind(gpu);
        gpu.set_render_state(&RenderState {
            point_size: JOINT_POINT_SIZE,
            ..RenderState::default()
        });
        gpu.clear(ClearMask::COLOUR | ClearMask::DEPTH, [0.0, 0.0, 0.0, 0.0]);

        let (width, height) = (target.width() as f32, target.height() as f32);
        let centre = Vec3::new(width / 2.0, height / 2.0, 0.0);
        let flip = Mat4::new_translation(&centre)
            * Mat4::from_axis_angle(&Vec3::z_axis(), PI)
            * Mat4::new_translation(&-centre);
        let transform = orthographic(0.0, width, 0.0, height, -1.0, 1.0) * flip;

        for skeleton in self.skeleton_frame.tracked() {
            self.draw_skeleton(gpu, skeleton, &transform);
        }

        gpu.set_render_state(&RenderState::default());
        target.unbind(gpu)
    }

    fn draw_skeleton(&self, gpu: &mut dyn GpuDevice, skeleton: &SkeletonData, transform: &Mat4) {
        let points = self.projector.project_skeleton(self.camera.as_ref(), skeleton);
        let vertex = |p: &Vec2, colour| ColorVertex::new([p.x, p.y, 0.0], colour);

        let joints: Vec<_> = points.iter().flatten().map(|p| vertex(p, JOINT_COLOUR)).collect();
        if !joints.is_empty() {
            gpu.draw_coloured(Topology::Points, &joints, transform, JOINT_POINT_SIZE);
        }

        // A joint without depth splits its chain
        for chain in BONE_CHAINS {
            let mut strip = Vec::with_capacity(chain.len());
            for joint in chain {
                match &points[joint.index()] {
                    Some(p) => strip.push(vertex(p, BONE_COLOUR)),
                    None => {
                        Self::draw_strip(gpu, &strip, transform);
                        strip.clear();
                    }
                }
            }
            Self::draw_strip(gpu, &strip, transform);
        }
    }

    fn draw_strip(gpu: &mut dyn GpuDevice, strip: &[ColorVertex], transform: &Mat4) {
        if strip.len() >= 2 {
            gpu.draw_coloured(Topology::LineStrip, strip, transform, 1.0);
        }
    }

    /// Right hand of the first tracked body in `scale_x` x `scale_y` space
    ///
    /// `z` is in centimetres. `None` when nobody is tracked or the hand depth
    /// is invalid.
    pub fn hand_position(&self, scale_x: f32, scale_y: f32) -> Option<Vec3> {
        projector::hand_position(self.camera.as_ref(), &self.skeleton_frame, scale_x, scale_y)
    }

    /// Converted colour image
    pub const fn colour_texture(&self) -> &Texture2D {
        self.targets.colour.texture()
    }

    /// Converted normalised depth image
    pub const fn depth_texture(&self) -> &Texture2D {
        self.targets.depth.texture()
    }

    /// Skeleton debug image
    pub const fn skeleton_texture(&self) -> &Texture2D {
        self.targets.skeleton.texture()
    }

    /// Depth window used for normalisation
    pub const fn depth_range(&self) -> DepthRange {
        self.normalizer.range()
    }

    /// Last normalised depth frame
    pub fn depth_values(&self) -> &[f32] {
        self.normalizer.values()
    }

    /// Last normalised depth frame as 8-bit grey
    pub fn depth_luminance8(&self) -> Vec<u8> {
        self.normalizer.to_luminance8()
    }

    /// Depth stream size
    pub const fn depth_resolution(&self) -> Resolution {
        self.depth_resolution
    }

    /// Colour stream size
    pub const fn colour_resolution(&self) -> Resolution {
        self.colour_resolution
    }

    /// Last smoothed skeleton frame
    pub const fn skeleton_frame(&self) -> &SkeletonFrame {
        &self.skeleton_frame
    }

    /// Re-read both converter effects
    pub fn reload_effects(&mut self, ctx: &mut GraphicsContext) -> Result<(), SensorError> {
        self.converters.colour.reload(ctx)?;
        self.converters.depth.reload(ctx)?;
        Ok(())
    }

    /// Free everything in reverse creation order and shut the camera down
    pub fn destroy(mut self, ctx: &mut GraphicsContext) {
        self.converters.release(ctx);
        self.targets.destroy(ctx.gpu.as_mut());
        self.sources.destroy(ctx.gpu.as_mut());
        self.camera.shutdown();
        log::info!("Sensor '{}' shut down", self.camera.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::{DrawCommand, Fault, HeadlessDevice};
    use crate::sensor::device::ImageFrame;
    use crate::sensor::skeleton::{Joint, TrackingState};
    use std::path::Path;

    const COLOUR: &str = r#"EffectDescriptor(
        name: "colour",
        parameters: [(name: "ColourStreamSampler", kind: Sampler)],
        techniques: [(name: "ColourStreamConverter", passes: [
            (vertex: Inline("void main() {}"), fragment: Inline("uniform sampler2D ColourStreamSampler; void main() {}")),
        ])],
    )"#;

    const DEPTH: &str = r#"EffectDescriptor(
        name: "depth",
        parameters: [(name: "DepthStreamSampler", kind: Sampler)],
        techniques: [(name: "DepthStreamConverter", passes: [
            (vertex: Inline("void main() {}"), fragment: Inline("uniform sampler2D DepthStreamSampler; void main() {}")),
        ])],
    )"#;

    /// Camera that replays queued frames
    #[derive(Default)]
    struct ScriptedCamera {
        colour: Vec<ImageFrame>,
        depth: Vec<ImageFrame>,
        skeletons: Vec<SkeletonFrame>,
        fail_depth_stream: bool,
        shutdowns: std::rc::Rc<std::cell::Cell<u32>>,
    }

    impl DepthCamera for ScriptedCamera {
        fn name(&self) -> &str {
            "scripted"
        }

        fn open_colour_stream(&mut self, requested: Resolution) -> Result<Resolution, SensorError> {
            Ok(requested)
        }

        fn open_depth_stream(&mut self, requested: Resolution) -> Result<Resolution, SensorError> {
            if self.fail_depth_stream {
                return Err(SensorError::StreamOpen { stream: "depth", message: "unplugged".to_string() });
            }
            Ok(requested)
        }

        fn enable_skeleton_tracking(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn next_colour_frame(&mut self) -> Option<ImageFrame> {
            self.colour.pop()
        }

        fn next_depth_frame(&mut self) -> Option<ImageFrame> {
            self.depth.pop()
        }

        fn next_skeleton_frame(&mut self) -> Option<SkeletonFrame> {
            self.skeletons.pop()
        }

        fn shutdown(&mut self) {
            self.shutdowns.set(self.shutdowns.get() + 1);
        }
    }

    fn effects(dir: &Path) -> EffectPaths {
        let colour = dir.join("colour.ron");
        let depth = dir.join("depth.ron");
        std::fs::write(&colour, COLOUR).unwrap();
        std::fs::write(&depth, DEPTH).unwrap();
        EffectPaths {
            colour_converter: colour,
            depth_converter: depth,
            depth_geometry: dir.join("unused.ron"),
        }
    }

    fn settings() -> SensorSettings {
        SensorSettings {
            colour_resolution: Resolution::new(8, 6),
            depth_resolution: Resolution::new(4, 3),
            ..SensorSettings::default()
        }
    }

    fn assert_no_gpu_resources(ctx: &GraphicsContext) {
        let gpu = ctx.device::<HeadlessDevice>().unwrap();
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(gpu.live_framebuffers(), 0);
        assert_eq!(gpu.live_renderbuffers(), 0);
        assert_eq!(gpu.live_programs(), 0);
        assert!(ctx.effects.is_empty());
    }

    fn tracked_skeleton(hand: Vec3) -> SkeletonFrame {
        let mut frame = SkeletonFrame::default();
        let body = &mut frame.skeletons[0];
        body.tracking_state = TrackingState::Tracked;
        body.joints = [Vec3::new(0.1, 0.1, 2.0); crate::sensor::skeleton::JOINT_COUNT];
        body.set_joint(Joint::HandRight, hand);
        frame
    }

    #[test]
    fn test_build_creates_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let sensor = SensorController::build(&mut ctx, Box::<ScriptedCamera>::default(), &settings(), &effects(dir.path())).unwrap();

        assert_eq!(sensor.depth_texture().width(), 4);
        assert_eq!(sensor.depth_texture().format(), PixelFormat::Luminance8);
        assert_eq!(sensor.colour_texture().format(), PixelFormat::Rgba8);
        assert_eq!(sensor.skeleton_texture().width(), 8);
        assert!(sensor.targets.skeleton.has_depth_attachment());
        assert!(!sensor.targets.depth.has_depth_attachment());
        assert_eq!(ctx.effects.len(), 2);

        sensor.destroy(&mut ctx);
        assert_no_gpu_resources(&ctx);
    }

    #[test]
    fn test_reload_effects_reacquires_converters() {
        let dir = tempfile::tempdir().unwrap();
        let paths = effects(dir.path());
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let mut sensor = SensorController::build(&mut ctx, Box::<ScriptedCamera>::default(), &settings(), &paths).unwrap();

        sensor.reload_effects(&mut ctx).unwrap();
        assert_eq!(ctx.effects.len(), 2);
        assert_eq!(ctx.device::<HeadlessDevice>().unwrap().live_programs(), 2);

        // A broken depth converter is reported; the colour converter still reloads
        std::fs::write(&paths.depth_converter, "garbage").unwrap();
        assert!(matches!(sensor.reload_effects(&mut ctx), Err(SensorError::Effect(_))));
        assert_eq!(ctx.effects.len(), 1);
        assert_eq!(ctx.device::<HeadlessDevice>().unwrap().live_programs(), 1);

        sensor.destroy(&mut ctx);
        assert_no_gpu_resources(&ctx);
    }

    #[test]
    fn test_stream_failure_shuts_camera_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let camera = ScriptedCamera { fail_depth_stream: true, ..ScriptedCamera::default() };
        let shutdowns = camera.shutdowns.clone();

        let result = SensorController::build(&mut ctx, Box::new(camera), &settings(), &effects(dir.path()));
        assert!(matches!(result, Err(SensorError::StreamOpen { stream: "depth", .. })));
        assert_eq!(shutdowns.get(), 1);
        assert_no_gpu_resources(&ctx);
    }

    #[test]
    fn test_late_failures_free_everything() {
        let dir = tempfile::tempdir().unwrap();
        let paths = effects(dir.path());

        // Third framebuffer (skeleton target) fails
        let mut gpu = HeadlessDevice::new();
        gpu.inject(Fault::RenderbufferCreation);
        let mut ctx = GraphicsContext::new(Box::new(gpu));
        let result = SensorController::build(&mut ctx, Box::<ScriptedCamera>::default(), &settings(), &paths);
        assert!(matches!(result, Err(SensorError::Render(_))));
        assert_no_gpu_resources(&ctx);

        // Depth converter effect missing
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let broken = EffectPaths {
            depth_converter: dir.path().join("missing.ron"),
            ..paths
        };
        let result = SensorController::build(&mut ctx, Box::<ScriptedCamera>::default(), &settings(), &broken);
        assert!(matches!(result, Err(SensorError::Effect(_))));
        assert_no_gpu_resources(&ctx);
    }

    #[test]
    fn test_invalid_range_fails_before_opening() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let settings = SensorSettings { near_mm: 3000, far_mm: 1000, ..settings() };
        let result = SensorController::build(&mut ctx, Box::<ScriptedCamera>::default(), &settings, &effects(dir.path()));
        assert!(matches!(result, Err(SensorError::InvalidDepthRange { .. })));
    }

    #[test]
    fn test_depth_poll_normalizes_and_converts() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let samples: Vec<u8> = [801u16, 3975, 0, 5000].repeat(3).iter().flat_map(|s| s.to_le_bytes()).collect();
        let camera = ScriptedCamera {
            depth: vec![ImageFrame::packed(0, 4, 3, 2, samples)],
            ..ScriptedCamera::default()
        };
        let mut sensor = SensorController::build(&mut ctx, Box::new(camera), &settings(), &effects(dir.path())).unwrap();

        assert!(sensor.poll_depth(&mut ctx).unwrap());
        assert_eq!(&sensor.depth_values()[..4], &[0.0, 1.0, 0.0, 1.0]);

        let gpu = ctx.device::<HeadlessDevice>().unwrap();
        let raw = gpu.texture(sensor.sources.depth.id()).unwrap();
        assert_eq!(raw.data_format, Some(PixelFormat::LuminanceF32));
        assert_eq!(raw.data.len(), 4 * 3 * 4);
        assert!(gpu.commands().iter().any(|c| matches!(
            c,
            DrawCommand::FullscreenQuad { target: Some(fb), .. } if *fb == sensor.targets.depth.framebuffer()
        )));

        // Queue drained: nothing new, previous values kept
        assert!(!sensor.poll_depth(&mut ctx).unwrap());
        assert_eq!(sensor.depth_values()[1], 1.0);
        sensor.destroy(&mut ctx);
    }

    #[test]
    fn test_bogus_frames_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let bogus = |w, h| ImageFrame { frame_number: 0, width: w, height: h, pitch: 0, data: Vec::new() };
        let camera = ScriptedCamera {
            colour: vec![bogus(8, 6)],
            depth: vec![bogus(4, 3)],
            ..ScriptedCamera::default()
        };
        let mut sensor = SensorController::build(&mut ctx, Box::new(camera), &settings(), &effects(dir.path())).unwrap();
        ctx.device_mut::<HeadlessDevice>().unwrap().clear_commands();

        sensor.poll(&mut ctx);
        assert!(ctx.device::<HeadlessDevice>().unwrap().commands().is_empty());
        sensor.destroy(&mut ctx);
    }

    #[test]
    fn test_colour_poll_uploads_raw_bgra() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let camera = ScriptedCamera {
            colour: vec![ImageFrame::packed(0, 8, 6, 4, vec![7; 8 * 6 * 4])],
            ..ScriptedCamera::default()
        };
        let mut sensor = SensorController::build(&mut ctx, Box::new(camera), &settings(), &effects(dir.path())).unwrap();

        assert!(sensor.poll_colour(&mut ctx).unwrap());
        let gpu = ctx.device::<HeadlessDevice>().unwrap();
        assert_eq!(gpu.texture(sensor.sources.colour.id()).unwrap().data, vec![7; 8 * 6 * 4]);
        sensor.destroy(&mut ctx);
    }

    #[test]
    fn test_skeleton_debug_skips_invalid_joints() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let mut frame = tracked_skeleton(Vec3::new(0.2, 0.2, 1.5));
        frame.skeletons[0].set_joint(Joint::ElbowRight, Vec3::new(0.3, 0.3, 0.0));
        let camera = ScriptedCamera { skeletons: vec![frame], ..ScriptedCamera::default() };
        let mut sensor = SensorController::build(&mut ctx, Box::new(camera), &settings(), &effects(dir.path())).unwrap();
        ctx.device_mut::<HeadlessDevice>().unwrap().clear_commands();

        assert!(sensor.poll_skeleton(&mut ctx).unwrap());

        let gpu = ctx.device::<HeadlessDevice>().unwrap();
        let skeleton_fb = sensor.targets.skeleton.framebuffer();
        let mut points = 0;
        let mut strips = Vec::new();
        for command in gpu.commands() {
            match command {
                DrawCommand::Clear { mask, target } => {
                    assert_eq!(*mask, ClearMask::COLOUR | ClearMask::DEPTH);
                    assert_eq!(*target, Some(skeleton_fb));
                }
                DrawCommand::Coloured { topology: Topology::Points, vertices, point_size, .. } => {
                    points += vertices.len();
                    assert_eq!(*point_size, JOINT_POINT_SIZE);
                }
                DrawCommand::Coloured { topology: Topology::LineStrip, vertices, .. } => strips.push(vertices.len()),
                _ => {}
            }
        }
        assert_eq!(points, 19);
        // Right arm chain splits into shoulder-centre/shoulder and wrist/hand
        assert_eq!(strips, vec![4, 5, 2, 2, 5, 5]);
        sensor.destroy(&mut ctx);
    }

    #[test]
    fn test_untracked_bodies_not_drawn() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let mut frame = tracked_skeleton(Vec3::new(0.2, 0.2, 1.5));
        frame.skeletons[0].tracking_state = TrackingState::PositionOnly;
        let camera = ScriptedCamera { skeletons: vec![frame], ..ScriptedCamera::default() };
        let mut sensor = SensorController::build(&mut ctx, Box::new(camera), &settings(), &effects(dir.path())).unwrap();
        ctx.device_mut::<HeadlessDevice>().unwrap().clear_commands();

        sensor.poll(&mut ctx);
        let gpu = ctx.device::<HeadlessDevice>().unwrap();
        assert!(!gpu.commands().iter().any(|c| matches!(c, DrawCommand::Coloured { .. })));
        assert!(sensor.hand_position(100.0, 100.0).is_none());
        sensor.destroy(&mut ctx);
    }

    #[test]
    fn test_hand_position_from_last_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let camera = ScriptedCamera {
            skeletons: vec![tracked_skeleton(Vec3::new(0.0, 0.0, 1.5))],
            ..ScriptedCamera::default()
        };
        let mut sensor = SensorController::build(&mut ctx, Box::new(camera), &settings(), &effects(dir.path())).unwrap();
        assert!(sensor.hand_position(100.0, 100.0).is_none());

        sensor.poll(&mut ctx);
        let hand = sensor.hand_position(200.0, 100.0).unwrap();
        approx::assert_relative_eq!(hand, Vec3::new(100.0, 50.0, 150.0), epsilon = 1e-3);

        // No new frame: the last one is reused
        sensor.poll(&mut ctx);
        assert!(sensor.hand_position(200.0, 100.0).is_some());
        sensor.destroy(&mut ctx);
    }
}
