//! GPU device trait and the plain data types that cross it

use std::any::Any;
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::foundation::math::Mat4;
use crate::render::geometry::{ColorVertex, Vertex};
use crate::render::texture::{PixelFormat, TextureFilter, WrapMode};
use crate::render::RenderResult;

/// Handle to a texture owned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Handle to a framebuffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u64);

/// Handle to a depth renderbuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferId(pub u64);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

/// Handle to an uploaded vertex mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u64);

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Independent points
    Points,
    /// Independent line segments
    Lines,
    /// Connected line strip
    LineStrip,
    /// Independent triangles
    Triangles,
    /// Triangle strip
    TriangleStrip,
}

/// Framebuffer completeness as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    /// Ready to render into
    Complete,
    /// An attachment is not attachment-complete
    IncompleteAttachment,
    /// No image is attached
    MissingAttachment,
    /// Attachments differ in size
    IncompleteDimensions,
    /// Attachment formats are not renderable together
    IncompleteFormats,
    /// Draw buffer names an absent attachment
    IncompleteDrawBuffer,
    /// Read buffer names an absent attachment
    IncompleteReadBuffer,
    /// Sample counts differ between attachments
    IncompleteMultisample,
    /// Layered attachments are inconsistent
    IncompleteLayerTargets,
    /// Combination not supported by the implementation
    Unsupported,
    /// Status code the engine does not recognise
    Unknown(u32),
}

impl FramebufferStatus {
    /// Whether the framebuffer can be rendered into
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("Complete."),
            Self::IncompleteAttachment => f.write_str("Incomplete attachment."),
            Self::MissingAttachment => f.write_str("Incomplete, missing attachment."),
            Self::IncompleteDimensions => f.write_str("Incomplete dimensions."),
            Self::IncompleteFormats => f.write_str("Incomplete formats."),
            Self::IncompleteDrawBuffer => f.write_str("Incomplete draw buffer."),
            Self::IncompleteReadBuffer => f.write_str("Incomplete read buffer."),
            Self::IncompleteMultisample => f.write_str("Incomplete multisample."),
            Self::IncompleteLayerTargets => f.write_str("Incomplete layer targets."),
            Self::Unsupported => f.write_str("Framebuffer unsupported."),
            Self::Unknown(code) => write!(f, "Unknown Error (0x{code:04X})"),
        }
    }
}

/// Colour blending applied by a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Overwrite the destination
    #[default]
    Opaque,
    /// Source-alpha over destination
    Alpha,
    /// Add source to destination
    Additive,
}

/// Fixed-function state for a draw
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderState {
    /// Depth comparison enabled
    pub depth_test: bool,
    /// Depth buffer writes enabled
    pub depth_write: bool,
    /// Colour buffer writes enabled
    pub colour_write: bool,
    /// Blend mode
    pub blend: BlendMode,
    /// Rasterised point size in pixels
    pub point_size: f32,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            colour_write: true,
            blend: BlendMode::Opaque,
            point_size: 1.0,
        }
    }
}

impl RenderState {
    /// State for overlays: no depth test, no depth write
    pub fn overlay() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            ..Self::default()
        }
    }
}

bitflags! {
    /// Buffers affected by a clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearMask: u8 {
        /// Colour buffer
        const COLOUR = 0b01;
        /// Depth buffer
        const DEPTH = 0b10;
    }
}

/// Pixel rectangle, origin bottom-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    /// Left edge
    pub x: i32,
    /// Bottom edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Viewport {
    /// Viewport covering a `width` x `height` surface from the origin
    pub const fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Value uploaded to a named program uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// `float`
    Float(f32),
    /// `int`
    Int(i32),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
    /// `mat4`, column-major
    Mat4([f32; 16]),
    /// `sampler2D` bound to a texture unit
    Sampler {
        /// Texture unit index
        unit: u32,
        /// Texture bound to that unit
        texture: TextureId,
    },
}

impl From<&Mat4> for UniformValue {
    fn from(m: &Mat4) -> Self {
        let mut data = [0.0; 16];
        data.copy_from_slice(m.as_slice());
        Self::Mat4(data)
    }
}

/// GPU device interface
///
/// One implementation per backend. Resource creation returns handles; the
/// caller owns them and must hand them back to the matching `destroy_*`.
pub trait GpuDevice: Any {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Upcast for backend-specific access
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for backend-specific access
    fn as_any_mut(&mut self) -> &mut dyn Any;

    // --- textures ---

    /// Allocate an uninitialised 2D texture
    fn create_texture(&mut self, width: u32, height: u32, format: PixelFormat, filter: TextureFilter) -> RenderResult<TextureId>;

    /// Replace the full contents of a texture; `data` is laid out as `data_format`
    fn upload_texture(&mut self, texture: TextureId, data_format: PixelFormat, data: &[u8]) -> RenderResult<()>;

    /// Set the wrap mode on both axes
    fn set_texture_wrap(&mut self, texture: TextureId, wrap: WrapMode) -> RenderResult<()>;

    /// Rebuild the mip chain from level 0
    fn generate_mipmaps(&mut self, texture: TextureId) -> RenderResult<()>;

    /// Free a texture
    fn destroy_texture(&mut self, texture: TextureId);

    // --- framebuffers ---

    /// Allocate an empty framebuffer object
    fn create_framebuffer(&mut self) -> RenderResult<FramebufferId>;

    /// Make a framebuffer the render destination, `None` for the window
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    /// Attach a texture as colour attachment 0
    fn attach_colour_texture(&mut self, framebuffer: FramebufferId, texture: TextureId) -> RenderResult<()>;

    /// Allocate depth renderbuffer storage
    fn create_depth_renderbuffer(&mut self, width: u32, height: u32) -> RenderResult<RenderbufferId>;

    /// Attach a depth renderbuffer
    fn attach_depth_renderbuffer(&mut self, framebuffer: FramebufferId, renderbuffer: RenderbufferId) -> RenderResult<()>;

    /// Completeness of a framebuffer
    fn framebuffer_status(&mut self, framebuffer: FramebufferId) -> FramebufferStatus;

    /// Free a depth renderbuffer
    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferId);

    /// Free a framebuffer object (attachments are not freed)
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    // --- programs ---

    /// Compile and link a vertex/fragment program
    fn create_program(&mut self, vertex_source: &str, fragment_source: &str) -> RenderResult<ProgramId>;

    /// Make a program current
    fn use_program(&mut self, program: ProgramId);

    /// Set a uniform on a program; returns `false` when the program has no such uniform
    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) -> bool;

    /// Free a program
    fn destroy_program(&mut self, program: ProgramId);

    // --- geometry ---

    /// Upload a static mesh
    fn create_mesh(&mut self, vertices: &[Vertex], topology: Topology) -> RenderResult<MeshId>;

    /// Draw a mesh with the current program
    fn draw_mesh(&mut self, mesh: MeshId);

    /// Free a mesh
    fn destroy_mesh(&mut self, mesh: MeshId);

    /// Draw a clip-space quad covering the viewport with the current program
    fn draw_fullscreen_quad(&mut self);

    /// Draw a texture into a sub-rectangle of the current render destination
    fn draw_textured_quad(&mut self, viewport: Viewport, texture: TextureId);

    /// Draw untextured coloured primitives with the device's debug program
    fn draw_coloured(&mut self, topology: Topology, vertices: &[ColorVertex], transform: &Mat4, point_size: f32);

    // --- state ---

    /// Set the viewport
    fn set_viewport(&mut self, viewport: Viewport);

    /// Current viewport
    fn viewport(&self) -> Viewport;

    /// Clear the selected buffers of the current render destination
    fn clear(&mut self, mask: ClearMask, colour: [f32; 4]);

    /// Apply depth, colour-mask, blend and point-size state
    fn set_render_state(&mut self, state: &RenderState);

    /// Pop the oldest pending device error, if any
    fn take_error(&mut self) -> Option<String>;
}
