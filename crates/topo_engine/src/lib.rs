//! # Topo Engine
//!
//! Rendering engine for depth-camera topography reconstruction.
//!
//! ## Features
//!
//! - **Effect Cache**: Reference-counted shader effects shared by file path
//! - **Render Targets**: Off-screen framebuffers with optional depth attachment
//! - **Depth Normalization**: 16-bit sensor depth to luminance textures
//! - **Skeleton Overlay**: Joint projection and debug skeleton rendering
//! - **Pluggable Backends**: OpenGL (via glow) and a headless device for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use topo_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = AppSettings::default();
//!     let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
//!     let camera = Box::new(SyntheticCamera::new(settings.sensor.synthetic.clone()));
//!     let mut sensor = SensorController::build(&mut ctx, camera, &settings.sensor, &settings.effects)?;
//!
//!     sensor.poll(&mut ctx);
//!     if let Some(hand) = sensor.hand_position(1920.0, 1440.0) {
//!         println!("hand at {hand:?}");
//!     }
//!
//!     sensor.destroy(&mut ctx);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod render;
pub mod sensor;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, settings::AppSettings},
        foundation::{
            math::{Vec2, Vec3, Vec4, Mat4, Point3},
            time::{Timer, Stopwatch},
        },
        render::{
            GraphicsContext, RenderError, RenderResult,
            api::GpuDevice,
            backends::HeadlessDevice,
            camera::ViewCamera,
            effect::{Effect, EffectCache, EffectError},
            render_target::{Attachments, RenderTarget},
            texture::{PixelFormat, Texture2D, TextureFilter, WrapMode},
        },
        sensor::{
            SensorController, SensorError,
            depth::{DepthNormalizer, DepthRange},
            device::DepthCamera,
            projector::SkeletonProjector,
            synthetic::SyntheticCamera,
        },
    };
}
