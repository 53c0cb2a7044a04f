//! Rendering system
//!
//! Everything that touches the GPU goes through the [`api::GpuDevice`] seam:
//! textures, off-screen render targets, shader effects and the handful of
//! draw primitives the topography scene needs.
//!
//! # Architecture
//!
//! - **api**: the device trait plus handle and state types
//! - **backends**: OpenGL (`glow`) and headless implementations
//! - **texture / render_target**: owned GPU images and framebuffers
//! - **effect**: reference-counted effect cache and the owner-side wrapper
//! - **effects**: concrete effects (stream converters, depth geometry)
//! - **camera / geometry**: view camera and vertex formats
//! - **window**: glfw window with a current OpenGL context

pub mod api;
pub mod backends;
pub mod camera;
pub mod effect;
pub mod effects;
pub mod geometry;
pub mod render_target;
pub mod texture;
pub mod window;

use thiserror::Error;

use crate::render::api::GpuDevice;
use crate::render::effect::EffectCache;

/// Owns the GPU device and the effect cache shared by every renderer
///
/// Passed by `&mut` to anything that creates, draws or frees GPU resources.
pub struct GraphicsContext {
    /// Active GPU device
    pub gpu: Box<dyn GpuDevice>,
    /// Effects shared by file path
    pub effects: EffectCache,
}

impl GraphicsContext {
    /// Create a context around a device with an empty effect cache
    pub fn new(gpu: Box<dyn GpuDevice>) -> Self {
        Self {
            gpu,
            effects: EffectCache::new(),
        }
    }

    /// Downcast the device to a concrete backend type
    pub fn device<T: GpuDevice + 'static>(&self) -> Option<&T> {
        self.gpu.as_any().downcast_ref::<T>()
    }

    /// Mutable downcast of the device to a concrete backend type
    pub fn device_mut<T: GpuDevice + 'static>(&mut self) -> Option<&mut T> {
        self.gpu.as_any_mut().downcast_mut::<T>()
    }

    /// Release every cached effect and report whether any were still held
    pub fn shutdown(&mut self) {
        let leaked = self.effects.len();
        if leaked > 0 {
            log::warn!("{leaked} effect(s) still referenced at shutdown, unloading");
        }
        self.effects.clear(self.gpu.as_mut());
    }
}

/// Query the device for a pending error and report it
///
/// In debug builds an error trips an assertion; release builds only log.
/// Returns `true` when the device state is clean.
pub fn check_gpu_state(gpu: &mut dyn GpuDevice, context: &str) -> bool {
    match gpu.take_error() {
        None => true,
        Some(error) => {
            log::error!("GPU error after {context}: {error}");
            debug_assert!(false, "GPU error after {context}: {error}");
            false
        }
    }
}

/// Rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation or management failed
    ///
    /// GPU objects (textures, framebuffers, programs) that could not be
    /// allocated or were given invalid data.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Framebuffer failed its completeness check
    #[error("Framebuffer Object error detected: {0}")]
    IncompleteFramebuffer(api::FramebufferStatus),

    /// Shader compilation or program linking failed
    #[error("Shader program failed: {0}")]
    ShaderFailed(String),

    /// Handle does not name a live resource on this device
    #[error("Unknown {kind} handle {id}")]
    UnknownHandle {
        /// Resource kind
        kind: &'static str,
        /// Raw handle value
        id: u64,
    },

    /// Upload data does not match the texture it targets
    #[error("Invalid texture upload: expected {expected} bytes, got {actual}")]
    InvalidUpload {
        /// Bytes required by the texture size and data format
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
