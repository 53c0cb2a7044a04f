//! Off-screen render targets
//!
//! A [`RenderTarget`] is a framebuffer object with a colour texture and, on
//! request, a depth renderbuffer. Construction either returns a complete
//! target or frees everything it allocated.

use bitflags::bitflags;

use crate::render::api::{FramebufferId, GpuDevice, RenderbufferId, Viewport};
use crate::render::texture::{PixelFormat, Texture2D, TextureFilter, WrapMode};
use crate::render::{check_gpu_state, RenderError, RenderResult};

bitflags! {
    /// Extra attachments requested for a render target
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attachments: u32 {
        /// Depth renderbuffer
        const DEPTH = 0b1;
    }
}

/// Framebuffer with an owned colour texture and optional depth buffer
#[derive(Debug)]
pub struct RenderTarget {
    framebuffer: FramebufferId,
    texture: Texture2D,
    depth: Option<RenderbufferId>,
}

impl RenderTarget {
    /// Build a complete render target
    ///
    /// # Errors
    ///
    /// Allocation failures and incomplete framebuffers are returned; in both
    /// cases every object created so far is destroyed first.
    pub fn build(
        gpu: &mut dyn GpuDevice,
        width: u32,
        height: u32,
        attachments: Attachments,
        filter: TextureFilter,
        format: PixelFormat,
    ) -> RenderResult<Self> {
        let framebuffer = gpu.create_framebuffer()?;

        let mut texture = match Texture2D::create_empty(gpu, width, height, filter, format) {
            Ok(texture) => texture,
            Err(e) => {
                gpu.destroy_framebuffer(framebuffer);
                return Err(e);
            }
        };

        if let Err(e) = texture.set_wrap_mode(gpu, WrapMode::ClampToEdge) {
            texture.destroy(gpu);
            gpu.destroy_framebuffer(framebuffer);
            return Err(e);
        }

        let mut target = Self {
            framebuffer,
            texture,
            depth: None,
        };

        if let Err(e) = target.configure(gpu, attachments) {
            target.destroy(gpu);
            return Err(e);
        }

        log::debug!(
            "Built {width}x{height} {format:?} render target {:?} (depth: {})",
            target.framebuffer,
            target.has_depth_attachment()
        );
        Ok(target)
    }

    fn configure(&mut self, gpu: &mut dyn GpuDevice, attachments: Attachments) -> RenderResult<()> {
        gpu.bind_framebuffer(Some(self.framebuffer));

        let result = self.attach(gpu, attachments);
        let status = gpu.framebuffer_status(self.framebuffer);

        gpu.bind_framebuffer(None);
        check_gpu_state(gpu, "render target setup");

        result?;
        if !status.is_complete() {
            log::error!("Framebuffer Object error detected: {status}");
            return Err(RenderError::IncompleteFramebuffer(status));
        }
        Ok(())
    }

    fn attach(&mut self, gpu: &mut dyn GpuDevice, attachments: Attachments) -> RenderResult<()> {
        if attachments.contains(Attachments::DEPTH) {
            let depth = gpu.create_depth_renderbuffer(self.texture.width(), self.texture.height())?;
            self.depth = Some(depth);
            gpu.attach_depth_renderbuffer(self.framebuffer, depth)?;
        }
        gpu.attach_colour_texture(self.framebuffer, self.texture.id())
    }

    /// Make this target the render destination and fit the viewport to it
    pub fn bind(&self, gpu: &mut dyn GpuDevice) {
        gpu.bind_framebuffer(Some(self.framebuffer));
        gpu.set_viewport(self.viewport());
    }

    /// Return rendering to the window, rebuilding mips if the filter needs them
    pub fn unbind(&self, gpu: &mut dyn GpuDevice) -> RenderResult<()> {
        gpu.bind_framebuffer(None);
        self.texture.regenerate_mipmaps(gpu)
    }

    /// Free the framebuffer, depth buffer and colour texture
    pub fn destroy(self, gpu: &mut dyn GpuDevice) {
        gpu.destroy_framebuffer(self.framebuffer);
        if let Some(depth) = self.depth {
            gpu.destroy_renderbuffer(depth);
        }
        self.texture.destroy(gpu);
    }

    /// Whether a depth buffer is attached
    pub const fn has_depth_attachment(&self) -> bool {
        self.depth.is_some()
    }

    /// Colour texture
    pub const fn texture(&self) -> &Texture2D {
        &self.texture
    }

    /// Framebuffer handle
    pub const fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    /// Width in pixels
    pub const fn width(&self) -> u32 {
        self.texture.width()
    }

    /// Height in pixels
    pub const fn height(&self) -> u32 {
        self.texture.height()
    }

    /// Viewport covering the whole target
    pub const fn viewport(&self) -> Viewport {
        Viewport::full(self.width(), self.height())
    }
}
