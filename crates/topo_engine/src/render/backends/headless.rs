//! Headless GPU device
//!
//! Keeps every resource in memory, applies the same completeness rules a
//! driver would, and records draw calls so renderers can be tested without a
//! window. Faults can be queued to make the next matching call fail.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::foundation::math::Mat4;
use crate::render::api::{
    ClearMask, FramebufferId, FramebufferStatus, GpuDevice, MeshId, ProgramId, RenderState,
    RenderbufferId, TextureId, Topology, UniformValue, Viewport,
};
use crate::render::geometry::{ColorVertex, Vertex};
use crate::render::texture::{PixelFormat, TextureFilter, WrapMode};
use crate::render::{RenderError, RenderResult};

/// Failure to inject into the next matching device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Next `create_texture` fails
    TextureCreation,
    /// Next `create_framebuffer` fails
    FramebufferCreation,
    /// Next `create_depth_renderbuffer` fails
    RenderbufferCreation,
    /// Next `framebuffer_status` reports this status
    FramebufferStatus(FramebufferStatus),
    /// Next `create_program` fails to link
    ProgramLink,
    /// Queue an error for `take_error`
    DeviceError(String),
}

/// Texture state visible to tests
#[derive(Debug, Clone)]
pub struct HeadlessTexture {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Storage format
    pub format: PixelFormat,
    /// Sampling filter
    pub filter: TextureFilter,
    /// Wrap mode
    pub wrap: WrapMode,
    /// Last uploaded bytes
    pub data: Vec<u8>,
    /// Layout of `data`
    pub data_format: Option<PixelFormat>,
    /// Number of mip rebuilds
    pub mip_generations: u32,
}

#[derive(Debug, Default)]
struct HeadlessFramebuffer {
    colour: Option<TextureId>,
    depth: Option<RenderbufferId>,
}

#[derive(Debug)]
struct HeadlessRenderbuffer {
    width: u32,
    height: u32,
}

/// Program state visible to tests
#[derive(Debug, Clone, Default)]
pub struct HeadlessProgram {
    /// Uniform names declared in the sources
    pub declared: HashSet<String>,
    /// Last value set per uniform
    pub uniforms: HashMap<String, UniformValue>,
}

#[derive(Debug)]
struct HeadlessMesh {
    vertex_count: usize,
    topology: Topology,
}

/// A recorded draw or clear
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Buffers cleared
    Clear {
        /// Cleared buffers
        mask: ClearMask,
        /// Destination, `None` for the window
        target: Option<FramebufferId>,
    },
    /// Mesh drawn with an effect program
    Mesh {
        /// Mesh handle
        mesh: MeshId,
        /// Vertices in the mesh
        vertex_count: usize,
        /// Assembly mode
        topology: Topology,
        /// Current program
        program: Option<ProgramId>,
        /// Destination
        target: Option<FramebufferId>,
        /// State at draw time
        state: RenderState,
    },
    /// Clip-space quad drawn with an effect program
    FullscreenQuad {
        /// Current program
        program: Option<ProgramId>,
        /// Destination
        target: Option<FramebufferId>,
        /// State at draw time
        state: RenderState,
    },
    /// Texture blitted into a sub-rectangle
    TexturedQuad {
        /// Rectangle
        viewport: Viewport,
        /// Source texture
        texture: TextureId,
        /// Destination
        target: Option<FramebufferId>,
    },
    /// Debug primitives
    Coloured {
        /// Assembly mode
        topology: Topology,
        /// Vertices as submitted
        vertices: Vec<ColorVertex>,
        /// Transform applied to the vertices
        transform: Mat4,
        /// Point size
        point_size: f32,
        /// Destination
        target: Option<FramebufferId>,
    },
}

/// In-memory GPU device
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: u64,
    textures: HashMap<u64, HeadlessTexture>,
    framebuffers: HashMap<u64, HeadlessFramebuffer>,
    renderbuffers: HashMap<u64, HeadlessRenderbuffer>,
    programs: HashMap<u64, HeadlessProgram>,
    meshes: HashMap<u64, HeadlessMesh>,
    bound_framebuffer: Option<FramebufferId>,
    current_program: Option<ProgramId>,
    viewport: Viewport,
    state: RenderState,
    faults: Vec<Fault>,
    errors: VecDeque<String>,
    commands: Vec<DrawCommand>,
    programs_created: usize,
}

impl HeadlessDevice {
    /// Create an empty device
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fault for the next matching call
    pub fn inject(&mut self, fault: Fault) {
        if let Fault::DeviceError(message) = fault {
            self.errors.push_back(message);
        } else {
            self.faults.push(fault);
        }
    }

    fn take_fault(&mut self, pred: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let index = self.faults.iter().position(pred)?;
        Some(self.faults.remove(index))
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Texture state by handle
    pub fn texture(&self, id: TextureId) -> Option<&HeadlessTexture> {
        self.textures.get(&id.0)
    }

    /// Program state by handle
    pub fn program(&self, id: ProgramId) -> Option<&HeadlessProgram> {
        self.programs.get(&id.0)
    }

    /// Live texture count
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Live framebuffer count
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    /// Live renderbuffer count
    pub fn live_renderbuffers(&self) -> usize {
        self.renderbuffers.len()
    }

    /// Live program count
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Live mesh count
    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    /// Programs linked over the device's lifetime
    pub const fn programs_created(&self) -> usize {
        self.programs_created
    }

    /// Currently bound framebuffer
    pub const fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound_framebuffer
    }

    /// Current render state
    pub const fn render_state(&self) -> RenderState {
        self.state
    }

    /// Recorded commands since the last [`HeadlessDevice::clear_commands`]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Forget recorded commands
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    fn invalid(&mut self, what: &str, id: u64) {
        self.errors.push_back(format!("invalid {what} handle {id}"));
    }

    fn validate_stage(kind: &str, source: &str) -> RenderResult<()> {
        if source.trim().is_empty() {
            return Err(RenderError::ShaderFailed(format!("{kind} shader source is empty")));
        }
        if !source.contains("void main") {
            return Err(RenderError::ShaderFailed(format!("{kind} shader has no entry point `void main`")));
        }
        Ok(())
    }
}

/// Uniform names declared with `uniform <type> <name>;`
fn declared_uniforms(source: &str) -> impl Iterator<Item = String> + '_ {
    source.split(';').filter_map(|statement| {
        let mut tokens = statement.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "uniform" {
                let name = tokens.nth(1)?;
                let name = name.split('[').next().unwrap_or(name);
                return Some(name.to_string());
            }
        }
        None
    })
}

impl GpuDevice for HeadlessDevice {
    fn backend_name(&self) -> &'static str {
        "headless"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn create_texture(&mut self, width: u32, height: u32, format: PixelFormat, filter: TextureFilter) -> RenderResult<TextureId> {
        if self.take_fault(|f| matches!(f, Fault::TextureCreation)).is_some() {
            return Err(RenderError::ResourceCreationFailed("texture allocation failed".to_string()));
        }
        let id = self.allocate_id();
        self.textures.insert(id, HeadlessTexture {
            width,
            height,
            format,
            filter,
            wrap: WrapMode::Repeat,
            data: Vec::new(),
            data_format: None,
            mip_generations: 0,
        });
        Ok(TextureId(id))
    }

    fn upload_texture(&mut self, texture: TextureId, data_format: PixelFormat, data: &[u8]) -> RenderResult<()> {
        let tex = self
            .textures
            .get_mut(&texture.0)
            .ok_or(RenderError::UnknownHandle { kind: "texture", id: texture.0 })?;
        tex.data.clear();
        tex.data.extend_from_slice(data);
        tex.data_format = Some(data_format);
        Ok(())
    }

    fn set_texture_wrap(&mut self, texture: TextureId, wrap: WrapMode) -> RenderResult<()> {
        let tex = self
            .textures
            .get_mut(&texture.0)
            .ok_or(RenderError::UnknownHandle { kind: "texture", id: texture.0 })?;
        tex.wrap = wrap;
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: TextureId) -> RenderResult<()> {
        let tex = self
            .textures
            .get_mut(&texture.0)
            .ok_or(RenderError::UnknownHandle { kind: "texture", id: texture.0 })?;
        tex.mip_generations += 1;
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture.0).is_none() {
            self.invalid("texture", texture.0);
        }
    }

    fn create_framebuffer(&mut self) -> RenderResult<FramebufferId> {
        if self.take_fault(|f| matches!(f, Fault::FramebufferCreation)).is_some() {
            return Err(RenderError::ResourceCreationFailed("framebuffer allocation failed".to_string()));
        }
        let id = self.allocate_id();
        self.framebuffers.insert(id, HeadlessFramebuffer::default());
        Ok(FramebufferId(id))
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        if let Some(fb) = framebuffer {
            if !self.framebuffers.contains_key(&fb.0) {
                self.invalid("framebuffer", fb.0);
                return;
            }
        }
        self.bound_framebuffer = framebuffer;
    }

    fn attach_colour_texture(&mut self, framebuffer: FramebufferId, texture: TextureId) -> RenderResult<()> {
        if !self.textures.contains_key(&texture.0) {
            return Err(RenderError::UnknownHandle { kind: "texture", id: texture.0 });
        }
        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(RenderError::UnknownHandle { kind: "framebuffer", id: framebuffer.0 })?;
        fb.colour = Some(texture);
        Ok(())
    }

    fn create_depth_renderbuffer(&mut self, width: u32, height: u32) -> RenderResult<RenderbufferId> {
        if self.take_fault(|f| matches!(f, Fault::RenderbufferCreation)).is_some() {
            return Err(RenderError::ResourceCreationFailed("renderbuffer allocation failed".to_string()));
        }
        let id = self.allocate_id();
        self.renderbuffers.insert(id, HeadlessRenderbuffer { width, height });
        Ok(RenderbufferId(id))
    }

    fn attach_depth_renderbuffer(&mut self, framebuffer: FramebufferId, renderbuffer: RenderbufferId) -> RenderResult<()> {
        if !self.renderbuffers.contains_key(&renderbuffer.0) {
            return Err(RenderError::UnknownHandle { kind: "renderbuffer", id: renderbuffer.0 });
        }
        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(RenderError::UnknownHandle { kind: "framebuffer", id: framebuffer.0 })?;
        fb.depth = Some(renderbuffer);
        Ok(())
    }

    fn framebuffer_status(&mut self, framebuffer: FramebufferId) -> FramebufferStatus {
        if let Some(Fault::FramebufferStatus(status)) = self.take_fault(|f| matches!(f, Fault::FramebufferStatus(_))) {
            return status;
        }
        let Some(fb) = self.framebuffers.get(&framebuffer.0) else {
            return FramebufferStatus::Unsupported;
        };
        let Some(colour) = fb.colour.and_then(|id| self.textures.get(&id.0)) else {
            return FramebufferStatus::MissingAttachment;
        };
        if !colour.format.is_colour_renderable() {
            return FramebufferStatus::IncompleteAttachment;
        }
        if let Some(depth) = fb.depth {
            match self.renderbuffers.get(&depth.0) {
                None => return FramebufferStatus::IncompleteAttachment,
                Some(rb) if rb.width != colour.width || rb.height != colour.height => {
                    return FramebufferStatus::IncompleteDimensions;
                }
                Some(_) => {}
            }
        }
        FramebufferStatus::Complete
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        if self.renderbuffers.remove(&renderbuffer.0).is_none() {
            self.invalid("renderbuffer", renderbuffer.0);
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(&framebuffer.0).is_none() {
            self.invalid("framebuffer", framebuffer.0);
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn create_program(&mut self, vertex_source: &str, fragment_source: &str) -> RenderResult<ProgramId> {
        Self::validate_stage("vertex", vertex_source)?;
        Self::validate_stage("fragment", fragment_source)?;
        if self.take_fault(|f| matches!(f, Fault::ProgramLink)).is_some() {
            return Err(RenderError::ShaderFailed("program link failed".to_string()));
        }

        let declared = declared_uniforms(vertex_source)
            .chain(declared_uniforms(fragment_source))
            .collect();
        let id = self.allocate_id();
        self.programs.insert(id, HeadlessProgram { declared, uniforms: HashMap::new() });
        self.programs_created += 1;
        Ok(ProgramId(id))
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.contains_key(&program.0) {
            self.current_program = Some(program);
        } else {
            self.invalid("program", program.0);
        }
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) -> bool {
        let Some(prog) = self.programs.get_mut(&program.0) else {
            self.invalid("program", program.0);
            return false;
        };
        if !prog.declared.contains(name) {
            return false;
        }
        prog.uniforms.insert(name.to_string(), value);
        true
    }

    fn destroy_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program.0).is_none() {
            self.invalid("program", program.0);
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn create_mesh(&mut self, vertices: &[Vertex], topology: Topology) -> RenderResult<MeshId> {
        let id = self.allocate_id();
        self.meshes.insert(id, HeadlessMesh { vertex_count: vertices.len(), topology });
        Ok(MeshId(id))
    }

    fn draw_mesh(&mut self, mesh: MeshId) {
        let Some(m) = self.meshes.get(&mesh.0) else {
            self.invalid("mesh", mesh.0);
            return;
        };
        self.commands.push(DrawCommand::Mesh {
            mesh,
            vertex_count: m.vertex_count,
            topology: m.topology,
            program: self.current_program,
            target: self.bound_framebuffer,
            state: self.state,
        });
    }

    fn destroy_mesh(&mut self, mesh: MeshId) {
        if self.meshes.remove(&mesh.0).is_none() {
            self.invalid("mesh", mesh.0);
        }
    }

    fn draw_fullscreen_quad(&mut self) {
        self.commands.push(DrawCommand::FullscreenQuad {
            program: self.current_program,
            target: self.bound_framebuffer,
            state: self.state,
        });
    }

    fn draw_textured_quad(&mut self, viewport: Viewport, texture: TextureId) {
        if !self.textures.contains_key(&texture.0) {
            self.invalid("texture", texture.0);
            return;
        }
        self.commands.push(DrawCommand::TexturedQuad {
            viewport,
            texture,
            target: self.bound_framebuffer,
        });
    }

    fn draw_coloured(&mut self, topology: Topology, vertices: &[ColorVertex], transform: &Mat4, point_size: f32) {
        self.commands.push(DrawCommand::Coloured {
            topology,
            vertices: vertices.to_vec(),
            transform: *transform,
            point_size,
            target: self.bound_framebuffer,
        });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn clear(&mut self, mask: ClearMask, _colour: [f32; 4]) {
        self.commands.push(DrawCommand::Clear {
            mask,
            target: self.bound_framebuffer,
        });
    }

    fn set_render_state(&mut self, state: &RenderState) {
        self.state = *state;
    }

    fn take_error(&mut self) -> Option<String> {
        self.errors.pop_front()
    }
}
