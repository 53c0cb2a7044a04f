//! OpenGL 3.3 core device over `glow`
//!
//! Handles handed out by this device are engine-side ids mapped to the raw
//! GL objects, so a stale or foreign handle is reported instead of being
//! passed to the driver.

use std::any::Any;
use std::collections::{HashMap, VecDeque};

use glow::HasContext;

use crate::foundation::math::Mat4;
use crate::render::api::{
    BlendMode, ClearMask, FramebufferId, FramebufferStatus, GpuDevice, MeshId, ProgramId,
    RenderState, RenderbufferId, TextureId, Topology, UniformValue, Viewport,
};
use crate::render::geometry::{fullscreen_quad, ColorVertex, Vertex};
use crate::render::texture::{PixelFormat, TextureFilter, WrapMode};
use crate::render::{RenderError, RenderResult};

const BLIT_VERTEX: &str = r"#version 330 core
layout(location = 0) in vec3 Position;
layout(location = 2) in vec2 TexCoord;
out vec2 vTexCoord;
void main() {
    vTexCoord = TexCoord;
    gl_Position = vec4(Position, 1.0);
}
";

const BLIT_FRAGMENT: &str = r"#version 330 core
uniform sampler2D Source;
in vec2 vTexCoord;
out vec4 FragColour;
void main() {
    FragColour = texture(Source, vTexCoord);
}
";

const COLOURED_VERTEX: &str = r"#version 330 core
layout(location = 0) in vec3 Position;
layout(location = 1) in vec4 Colour;
uniform mat4 Transform;
uniform float PointSize;
out vec4 vColour;
void main() {
    vColour = Colour;
    gl_PointSize = PointSize;
    gl_Position = Transform * vec4(Position, 1.0);
}
";

const COLOURED_FRAGMENT: &str = r"#version 330 core
in vec4 vColour;
out vec4 FragColour;
void main() {
    FragColour = vColour;
}
";

struct GlTexture {
    raw: glow::NativeTexture,
    format: PixelFormat,
    width: u32,
    height: u32,
}

struct GlProgram {
    raw: glow::NativeProgram,
    locations: HashMap<String, Option<glow::NativeUniformLocation>>,
}

struct GlMesh {
    vao: glow::NativeVertexArray,
    vbo: glow::NativeBuffer,
    count: i32,
    mode: u32,
}

/// OpenGL device; requires the context it was created with to be current
pub struct GlDevice {
    gl: glow::Context,
    next_id: u64,
    textures: HashMap<u64, GlTexture>,
    framebuffers: HashMap<u64, glow::NativeFramebuffer>,
    renderbuffers: HashMap<u64, glow::NativeRenderbuffer>,
    programs: HashMap<u64, GlProgram>,
    meshes: HashMap<u64, GlMesh>,
    quad: GlMesh,
    debug_mesh: GlMesh,
    blit_program: GlProgram,
    coloured_program: GlProgram,
    bound_framebuffer: Option<FramebufferId>,
    current_program: Option<ProgramId>,
    viewport: Viewport,
    point_size: f32,
    pending: VecDeque<String>,
}

const fn topology_mode(topology: Topology) -> u32 {
    match topology {
        Topology::Points => glow::POINTS,
        Topology::Lines => glow::LINES,
        Topology::LineStrip => glow::LINE_STRIP,
        Topology::Triangles => glow::TRIANGLES,
        Topology::TriangleStrip => glow::TRIANGLE_STRIP,
    }
}

/// (min, mag) filter pair for each texture filter
const fn filter_params(filter: TextureFilter) -> (u32, u32) {
    match filter {
        TextureFilter::Nearest => (glow::NEAREST, glow::NEAREST),
        TextureFilter::Linear => (glow::LINEAR, glow::LINEAR),
        TextureFilter::NearestMipmap => (glow::NEAREST_MIPMAP_NEAREST, glow::NEAREST),
        TextureFilter::Bilinear => (glow::LINEAR_MIPMAP_NEAREST, glow::LINEAR),
        TextureFilter::Trilinear => (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR),
    }
}

/// (internal format, upload format, upload type)
const fn format_params(format: PixelFormat) -> (u32, u32, u32) {
    match format {
        PixelFormat::Rgba8 => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        PixelFormat::Luminance8 => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
        PixelFormat::LuminanceF32 => (glow::R32F, glow::RED, glow::FLOAT),
        PixelFormat::Depth => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
    }
}

const fn status_from_gl(code: u32) -> FramebufferStatus {
    match code {
        glow::FRAMEBUFFER_COMPLETE => FramebufferStatus::Complete,
        glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => FramebufferStatus::IncompleteAttachment,
        glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => FramebufferStatus::MissingAttachment,
        glow::FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER => FramebufferStatus::IncompleteDrawBuffer,
        glow::FRAMEBUFFER_INCOMPLETE_READ_BUFFER => FramebufferStatus::IncompleteReadBuffer,
        glow::FRAMEBUFFER_INCOMPLETE_MULTISAMPLE => FramebufferStatus::IncompleteMultisample,
        glow::FRAMEBUFFER_INCOMPLETE_LAYER_TARGETS => FramebufferStatus::IncompleteLayerTargets,
        glow::FRAMEBUFFER_UNSUPPORTED => FramebufferStatus::Unsupported,
        other => FramebufferStatus::Unknown(other),
    }
}

#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
const fn gl_int(value: u32) -> i32 {
    value as i32
}

impl GlDevice {
    /// Wrap a loaded context and create the built-in programs and quads
    pub fn new(gl: glow::Context, width: u32, height: u32) -> RenderResult<Self> {
        // SAFETY: all calls below run on the thread that owns the current context.
        unsafe {
            log::info!(
                "OpenGL {} ({})",
                gl.get_parameter_string(glow::VERSION),
                gl.get_parameter_string(glow::RENDERER)
            );

            let blit_program = GlProgram::new(compile_program(&gl, BLIT_VERTEX, BLIT_FRAGMENT)?);
            let coloured_program = GlProgram::new(compile_program(&gl, COLOURED_VERTEX, COLOURED_FRAGMENT)?);
            let quad = create_vertex_mesh(&gl, &fullscreen_quad(), Topology::TriangleStrip)?;
            let debug_mesh = create_coloured_mesh(&gl)?;

            gl.enable(glow::PROGRAM_POINT_SIZE);
            gl.depth_func(glow::LEQUAL);
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.clear_depth_f32(1.0);

            let mut device = Self {
                gl,
                next_id: 0,
                textures: HashMap::new(),
                framebuffers: HashMap::new(),
                renderbuffers: HashMap::new(),
                programs: HashMap::new(),
                meshes: HashMap::new(),
                quad,
                debug_mesh,
                blit_program,
                coloured_program,
                bound_framebuffer: None,
                current_program: None,
                viewport: Viewport::full(width, height),
                point_size: 1.0,
                pending: VecDeque::new(),
            };
            device.set_viewport(Viewport::full(width, height));
            device.set_render_state(&RenderState::default());
            Ok(device)
        }
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn texture_raw(&self, texture: TextureId) -> RenderResult<&GlTexture> {
        self.textures
            .get(&texture.0)
            .ok_or(RenderError::UnknownHandle { kind: "texture", id: texture.0 })
    }

    fn framebuffer_raw(&self, framebuffer: FramebufferId) -> RenderResult<glow::NativeFramebuffer> {
        self.framebuffers
            .get(&framebuffer.0)
            .copied()
            .ok_or(RenderError::UnknownHandle { kind: "framebuffer", id: framebuffer.0 })
    }

    fn restore_framebuffer_binding(&self) {
        let raw = self.bound_framebuffer.and_then(|fb| self.framebuffers.get(&fb.0).copied());
        // SAFETY: context is current; `raw` is a live framebuffer or the default.
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, raw) };
    }

    fn set_program_point_size(&mut self, program: ProgramId) {
        let point_size = self.point_size;
        if let Some(prog) = self.programs.get_mut(&program.0) {
            if let Some(location) = prog.location(&self.gl, "PointSize") {
                // SAFETY: the program is current.
                unsafe { self.gl.uniform_1_f32(Some(&location), point_size) };
            }
        }
    }

    fn bind_current_program(&mut self) {
        if let Some(program) = self.current_program {
            self.set_program_point_size(program);
        }
    }
}

impl GlProgram {
    fn new(raw: glow::NativeProgram) -> Self {
        Self { raw, locations: HashMap::new() }
    }

    fn location(&mut self, gl: &glow::Context, name: &str) -> Option<glow::NativeUniformLocation> {
        if let Some(cached) = self.locations.get(name) {
            return cached.clone();
        }
        // SAFETY: `raw` is a live, linked program.
        let location = unsafe { gl.get_uniform_location(self.raw, name) };
        self.locations.insert(name.to_string(), location.clone());
        location
    }
}

unsafe fn compile_program(gl: &glow::Context, vertex: &str, fragment: &str) -> RenderResult<glow::NativeProgram> {
    let program = gl.create_program().map_err(RenderError::ShaderFailed)?;
    let mut shaders = Vec::with_capacity(2);

    for (kind, name, source) in [(glow::VERTEX_SHADER, "vertex", vertex), (glow::FRAGMENT_SHADER, "fragment", fragment)] {
        let shader = match gl.create_shader(kind) {
            Ok(shader) => shader,
            Err(e) => {
                delete_shaders(gl, program, &shaders);
                gl.delete_program(program);
                return Err(RenderError::ShaderFailed(e));
            }
        };
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let info = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            delete_shaders(gl, program, &shaders);
            gl.delete_program(program);
            return Err(RenderError::ShaderFailed(format!("{name} shader: {info}")));
        }
        gl.attach_shader(program, shader);
        shaders.push(shader);
    }

    gl.link_program(program);
    let linked = gl.get_program_link_status(program);
    delete_shaders(gl, program, &shaders);
    if !linked {
        let info = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(RenderError::ShaderFailed(format!("link: {info}")));
    }
    Ok(program)
}

unsafe fn delete_shaders(gl: &glow::Context, program: glow::NativeProgram, shaders: &[glow::NativeShader]) {
    for &shader in shaders {
        gl.detach_shader(program, shader);
        gl.delete_shader(shader);
    }
}

unsafe fn create_vertex_mesh(gl: &glow::Context, vertices: &[Vertex], topology: Topology) -> RenderResult<GlMesh> {
    let vao = gl.create_vertex_array().map_err(RenderError::ResourceCreationFailed)?;
    let vbo = match gl.create_buffer() {
        Ok(vbo) => vbo,
        Err(e) => {
            gl.delete_vertex_array(vao);
            return Err(RenderError::ResourceCreationFailed(e));
        }
    };
    gl.bind_vertex_array(Some(vao));
    gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
    gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytemuck::cast_slice(vertices), glow::STATIC_DRAW);

    let stride = gl_int(Vertex::STRIDE as u32);
    gl.enable_vertex_attrib_array(0);
    gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, stride, 0);
    gl.enable_vertex_attrib_array(1);
    gl.vertex_attrib_pointer_f32(1, 3, glow::FLOAT, false, stride, 12);
    gl.enable_vertex_attrib_array(2);
    gl.vertex_attrib_pointer_f32(2, 2, glow::FLOAT, false, stride, 24);

    gl.bind_vertex_array(None);
    gl.bind_buffer(glow::ARRAY_BUFFER, None);

    Ok(GlMesh {
        vao,
        vbo,
        count: i32::try_from(vertices.len())
            .map_err(|_| RenderError::ResourceCreationFailed("mesh has too many vertices".to_string()))?,
        mode: topology_mode(topology),
    })
}

unsafe fn create_coloured_mesh(gl: &glow::Context) -> RenderResult<GlMesh> {
    let vao = gl.create_vertex_array().map_err(RenderError::ResourceCreationFailed)?;
    let vbo = match gl.create_buffer() {
        Ok(vbo) => vbo,
        Err(e) => {
            gl.delete_vertex_array(vao);
            return Err(RenderError::ResourceCreationFailed(e));
        }
    };
    gl.bind_vertex_array(Some(vao));
    gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));

    let stride = gl_int(ColorVertex::STRIDE as u32);
    gl.enable_vertex_attrib_array(0);
    gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, stride, 0);
    gl.enable_vertex_attrib_array(1);
    gl.vertex_attrib_pointer_f32(1, 4, glow::FLOAT, false, stride, 12);

    gl.bind_vertex_array(None);
    gl.bind_buffer(glow::ARRAY_BUFFER, None);
    Ok(GlMesh { vao, vbo, count: 0, mode: glow::POINTS })
}

unsafe fn delete_mesh(gl: &glow::Context, mesh: &GlMesh) {
    gl.delete_vertex_array(mesh.vao);
    gl.delete_buffer(mesh.vbo);
}

impl GpuDevice for GlDevice {
    fn backend_name(&self) -> &'static str {
        "opengl"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn create_texture(&mut self, width: u32, height: u32, format: PixelFormat, filter: TextureFilter) -> RenderResult<TextureId> {
        let (internal, upload_format, upload_type) = format_params(format);
        let (min, mag) = filter_params(filter);
        // SAFETY: context is current; the texture is bound only for setup.
        let raw = unsafe {
            let raw = self.gl.create_texture().map_err(RenderError::ResourceCreationFailed)?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(raw));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                gl_int(internal),
                gl_int(width),
                gl_int(height),
                0,
                upload_format,
                upload_type,
                None,
            );
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, gl_int(min));
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, gl_int(mag));
            if matches!(format, PixelFormat::Luminance8 | PixelFormat::LuminanceF32) {
                // Sample single-channel textures as grey with full alpha
                self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_SWIZZLE_G, gl_int(glow::RED));
                self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_SWIZZLE_B, gl_int(glow::RED));
                self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_SWIZZLE_A, gl_int(glow::ONE));
            }
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            raw
        };
        let id = self.allocate_id();
        self.textures.insert(id, GlTexture { raw, format, width, height });
        Ok(TextureId(id))
    }

    fn upload_texture(&mut self, texture: TextureId, data_format: PixelFormat, data: &[u8]) -> RenderResult<()> {
        let tex = self.texture_raw(texture)?;
        let (internal, _, _) = format_params(tex.format);
        let (_, upload_format, upload_type) = format_params(data_format);
        // SAFETY: context is current; `data` covers width * height texels (checked by Texture2D).
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(tex.raw));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                gl_int(internal),
                gl_int(tex.width),
                gl_int(tex.height),
                0,
                upload_format,
                upload_type,
                Some(data),
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
        Ok(())
    }

    fn set_texture_wrap(&mut self, texture: TextureId, wrap: WrapMode) -> RenderResult<()> {
        let raw = self.texture_raw(texture)?.raw;
        let mode = match wrap {
            WrapMode::Repeat => glow::REPEAT,
            WrapMode::ClampToEdge => glow::CLAMP_TO_EDGE,
        };
        // SAFETY: context is current.
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(raw));
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, gl_int(mode));
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, gl_int(mode));
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: TextureId) -> RenderResult<()> {
        let raw = self.texture_raw(texture)?.raw;
        // SAFETY: context is current.
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(raw));
            self.gl.generate_mipmap(glow::TEXTURE_2D);
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        match self.textures.remove(&texture.0) {
            // SAFETY: context is current; the texture is no longer referenced.
            Some(tex) => unsafe { self.gl.delete_texture(tex.raw) },
            None => self.pending.push_back(format!("destroy of unknown texture {}", texture.0)),
        }
    }

    fn create_framebuffer(&mut self) -> RenderResult<FramebufferId> {
        // SAFETY: context is current.
        let raw = unsafe { self.gl.create_framebuffer() }.map_err(RenderError::ResourceCreationFailed)?;
        let id = self.allocate_id();
        self.framebuffers.insert(id, raw);
        Ok(FramebufferId(id))
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        let raw = match framebuffer {
            None => None,
            Some(fb) => match self.framebuffers.get(&fb.0) {
                Some(raw) => Some(*raw),
                None => {
                    self.pending.push_back(format!("bind of unknown framebuffer {}", fb.0));
                    return;
                }
            },
        };
        // SAFETY: context is current.
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, raw) };
        self.bound_framebuffer = framebuffer;
    }

    fn attach_colour_texture(&mut self, framebuffer: FramebufferId, texture: TextureId) -> RenderResult<()> {
        let fb = self.framebuffer_raw(framebuffer)?;
        let tex = self.texture_raw(texture)?.raw;
        // SAFETY: context is current; binding is restored afterwards.
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fb));
            self.gl.framebuffer_texture_2d(glow::FRAMEBUFFER, glow::COLOR_ATTACHMENT0, glow::TEXTURE_2D, Some(tex), 0);
        }
        self.restore_framebuffer_binding();
        Ok(())
    }

    fn create_depth_renderbuffer(&mut self, width: u32, height: u32) -> RenderResult<RenderbufferId> {
        // SAFETY: context is current.
        let raw = unsafe {
            let raw = self.gl.create_renderbuffer().map_err(RenderError::ResourceCreationFailed)?;
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(raw));
            self.gl.renderbuffer_storage(glow::RENDERBUFFER, glow::DEPTH_COMPONENT24, gl_int(width), gl_int(height));
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            raw
        };
        let id = self.allocate_id();
        self.renderbuffers.insert(id, raw);
        Ok(RenderbufferId(id))
    }

    fn attach_depth_renderbuffer(&mut self, framebuffer: FramebufferId, renderbuffer: RenderbufferId) -> RenderResult<()> {
        let fb = self.framebuffer_raw(framebuffer)?;
        let rb = self
            .renderbuffers
            .get(&renderbuffer.0)
            .copied()
            .ok_or(RenderError::UnknownHandle { kind: "renderbuffer", id: renderbuffer.0 })?;
        // SAFETY: context is current; binding is restored afterwards.
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fb));
            self.gl.framebuffer_renderbuffer(glow::FRAMEBUFFER, glow::DEPTH_ATTACHMENT, glow::RENDERBUFFER, Some(rb));
        }
        self.restore_framebuffer_binding();
        Ok(())
    }

    fn framebuffer_status(&mut self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Ok(fb) = self.framebuffer_raw(framebuffer) else {
            return FramebufferStatus::Unsupported;
        };
        // SAFETY: context is current; binding is restored afterwards.
        let code = unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fb));
            self.gl.check_framebuffer_status(glow::FRAMEBUFFER)
        };
        self.restore_framebuffer_binding();
        status_from_gl(code)
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        match self.renderbuffers.remove(&renderbuffer.0) {
            // SAFETY: context is current.
            Some(raw) => unsafe { self.gl.delete_renderbuffer(raw) },
            None => self.pending.push_back(format!("destroy of unknown renderbuffer {}", renderbuffer.0)),
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        match self.framebuffers.remove(&framebuffer.0) {
            // SAFETY: context is current.
            Some(raw) => unsafe { self.gl.delete_framebuffer(raw) },
            None => self.pending.push_back(format!("destroy of unknown framebuffer {}", framebuffer.0)),
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bind_framebuffer(None);
        }
    }

    fn create_program(&mut self, vertex_source: &str, fragment_source: &str) -> RenderResult<ProgramId> {
        // SAFETY: context is current.
        let raw = unsafe { compile_program(&self.gl, vertex_source, fragment_source)? };
        let id = self.allocate_id();
        self.programs.insert(id, GlProgram::new(raw));
        Ok(ProgramId(id))
    }

    fn use_program(&mut self, program: ProgramId) {
        let Some(prog) = self.programs.get(&program.0) else {
            self.pending.push_back(format!("use of unknown program {}", program.0));
            return;
        };
        // SAFETY: context is current.
        unsafe { self.gl.use_program(Some(prog.raw)) };
        self.current_program = Some(program);
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) -> bool {
        if self.current_program != Some(program) {
            self.use_program(program);
        }
        let Some(prog) = self.programs.get_mut(&program.0) else {
            return false;
        };
        let Some(location) = prog.location(&self.gl, name) else {
            return false;
        };
        let location = Some(&location);
        // SAFETY: context is current and `program` is in use.
        unsafe {
            match value {
                UniformValue::Float(v) => self.gl.uniform_1_f32(location, v),
                UniformValue::Int(v) => self.gl.uniform_1_i32(location, v),
                UniformValue::Vec3([x, y, z]) => self.gl.uniform_3_f32(location, x, y, z),
                UniformValue::Vec4([x, y, z, w]) => self.gl.uniform_4_f32(location, x, y, z, w),
                UniformValue::Mat4(m) => self.gl.uniform_matrix_4_f32_slice(location, false, &m),
                UniformValue::Sampler { unit, texture } => {
                    let Some(tex) = self.textures.get(&texture.0) else {
                        self.pending.push_back(format!("sampler `{name}` bound to unknown texture {}", texture.0));
                        return false;
                    };
                    self.gl.active_texture(glow::TEXTURE0 + unit);
                    self.gl.bind_texture(glow::TEXTURE_2D, Some(tex.raw));
                    self.gl.uniform_1_i32(location, gl_int(unit));
                    self.gl.active_texture(glow::TEXTURE0);
                }
            }
        }
        true
    }

    fn destroy_program(&mut self, program: ProgramId) {
        match self.programs.remove(&program.0) {
            // SAFETY: context is current.
            Some(prog) => unsafe { self.gl.delete_program(prog.raw) },
            None => self.pending.push_back(format!("destroy of unknown program {}", program.0)),
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn create_mesh(&mut self, vertices: &[Vertex], topology: Topology) -> RenderResult<MeshId> {
        // SAFETY: context is current.
        let mesh = unsafe { create_vertex_mesh(&self.gl, vertices, topology)? };
        let id = self.allocate_id();
        self.meshes.insert(id, mesh);
        Ok(MeshId(id))
    }

    fn draw_mesh(&mut self, mesh: MeshId) {
        self.bind_current_program();
        let Some(m) = self.meshes.get(&mesh.0) else {
            self.pending.push_back(format!("draw of unknown mesh {}", mesh.0));
            return;
        };
        // SAFETY: context is current; the VAO describes the mesh's buffer.
        unsafe {
            self.gl.bind_vertex_array(Some(m.vao));
            self.gl.draw_arrays(m.mode, 0, m.count);
            self.gl.bind_vertex_array(None);
        }
    }

    fn destroy_mesh(&mut self, mesh: MeshId) {
        match self.meshes.remove(&mesh.0) {
            // SAFETY: context is current.
            Some(m) => unsafe { delete_mesh(&self.gl, &m) },
            None => self.pending.push_back(format!("destroy of unknown mesh {}", mesh.0)),
        }
    }

    fn draw_fullscreen_quad(&mut self) {
        self.bind_current_program();
        // SAFETY: context is current.
        unsafe {
            self.gl.bind_vertex_array(Some(self.quad.vao));
            self.gl.draw_arrays(self.quad.mode, 0, self.quad.count);
            self.gl.bind_vertex_array(None);
        }
    }

    fn draw_textured_quad(&mut self, viewport: Viewport, texture: TextureId) {
        let Some(tex) = self.textures.get(&texture.0).map(|t| t.raw) else {
            self.pending.push_back(format!("blit of unknown texture {}", texture.0));
            return;
        };
        let previous = self.viewport;
        self.set_viewport(viewport);
        let location = self.blit_program.location(&self.gl, "Source");
        // SAFETY: context is current.
        unsafe {
            self.gl.use_program(Some(self.blit_program.raw));
            self.gl.active_texture(glow::TEXTURE0);
            self.gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            self.gl.uniform_1_i32(location.as_ref(), 0);
            self.gl.bind_vertex_array(Some(self.quad.vao));
            self.gl.draw_arrays(self.quad.mode, 0, self.quad.count);
            self.gl.bind_vertex_array(None);
        }
        self.current_program = None;
        self.set_viewport(previous);
    }

    fn draw_coloured(&mut self, topology: Topology, vertices: &[ColorVertex], transform: &Mat4, point_size: f32) {
        let Ok(count) = i32::try_from(vertices.len()) else {
            self.pending.push_back("too many debug vertices".to_string());
            return;
        };
        let transform_location = self.coloured_program.location(&self.gl, "Transform");
        let point_location = self.coloured_program.location(&self.gl, "PointSize");
        // SAFETY: context is current; the buffer is re-specified before drawing.
        unsafe {
            self.gl.use_program(Some(self.coloured_program.raw));
            self.gl.uniform_matrix_4_f32_slice(transform_location.as_ref(), false, transform.as_slice());
            self.gl.uniform_1_f32(point_location.as_ref(), point_size);
            self.gl.bind_vertex_array(Some(self.debug_mesh.vao));
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.debug_mesh.vbo));
            self.gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytemuck::cast_slice(vertices), glow::STREAM_DRAW);
            self.gl.draw_arrays(topology_mode(topology), 0, count);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
            self.gl.bind_vertex_array(None);
        }
        self.current_program = None;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        // SAFETY: context is current.
        unsafe {
            self.gl.viewport(viewport.x, viewport.y, gl_int(viewport.width), gl_int(viewport.height));
        }
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn clear(&mut self, mask: ClearMask, colour: [f32; 4]) {
        let mut bits = 0;
        if mask.contains(ClearMask::COLOUR) {
            bits |= glow::COLOR_BUFFER_BIT;
        }
        if mask.contains(ClearMask::DEPTH) {
            bits |= glow::DEPTH_BUFFER_BIT;
        }
        let [r, g, b, a] = colour;
        // SAFETY: context is current. Depth writes must be on for a depth clear.
        unsafe {
            self.gl.clear_color(r, g, b, a);
            if mask.contains(ClearMask::DEPTH) {
                self.gl.depth_mask(true);
            }
            self.gl.clear(bits);
        }
    }

    fn set_render_state(&mut self, state: &RenderState) {
        // SAFETY: context is current.
        unsafe {
            if state.depth_test {
                self.gl.enable(glow::DEPTH_TEST);
            } else {
                self.gl.disable(glow::DEPTH_TEST);
            }
            self.gl.depth_mask(state.depth_write);
            let c = state.colour_write;
            self.gl.color_mask(c, c, c, c);
            match state.blend {
                BlendMode::Opaque => self.gl.disable(glow::BLEND),
                BlendMode::Alpha => {
                    self.gl.enable(glow::BLEND);
                    self.gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
                }
                BlendMode::Additive => {
                    self.gl.enable(glow::BLEND);
                    self.gl.blend_func(glow::ONE, glow::ONE);
                }
            }
        }
        self.point_size = state.point_size;
    }

    fn take_error(&mut self) -> Option<String> {
        if let Some(message) = self.pending.pop_front() {
            return Some(message);
        }
        // SAFETY: context is current.
        let code = unsafe { self.gl.get_error() };
        (code != glow::NO_ERROR).then(|| format!("GL error 0x{code:04X}"))
    }
}

impl Drop for GlDevice {
    fn drop(&mut self) {
        let leaked = self.textures.len() + self.framebuffers.len() + self.renderbuffers.len() + self.programs.len() + self.meshes.len();
        if leaked > 0 {
            log::warn!("GL device dropped with {leaked} live resource(s)");
        }
        // SAFETY: the owning window outlives the device, so the context is still current.
        unsafe {
            self.gl.delete_program(self.blit_program.raw);
            self.gl.delete_program(self.coloured_program.raw);
            delete_mesh(&self.gl, &self.quad);
            delete_mesh(&self.gl, &self.debug_mesh);
        }
    }
}
