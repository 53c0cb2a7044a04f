//! Window management using GLFW
//!
//! Opens a window with a current OpenGL 3.3 core context and hands out the
//! [`GlDevice`](crate::render::backends::GlDevice) bound to it.

use std::ffi::c_void;

use glfw::Context as _;
use thiserror::Error;

use crate::render::backends::GlDevice;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not start
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// No window (or no GL 3.3 core context) could be created
    #[error("Window creation failed")]
    CreationFailed,

    /// The GL device failed to initialise on the new context
    #[error("GL device setup failed: {0}")]
    DeviceFailed(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window with a current OpenGL context
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Open a window and make its context current
    pub fn new(title: &str, width: u32, height: u32, vsync: bool) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        glfw.window_hint(glfw::WindowHint::ContextVersion(3, 3));
        glfw.window_hint(glfw::WindowHint::OpenGlProfile(glfw::OpenGlProfileHint::Core));
        glfw.window_hint(glfw::WindowHint::OpenGlForwardCompat(true));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.make_current();
        glfw.set_swap_interval(if vsync {
            glfw::SwapInterval::Sync(1)
        } else {
            glfw::SwapInterval::None
        });

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!("Opened {width}x{height} window \"{title}\" (vsync: {vsync})");
        Ok(Self { glfw, window, events })
    }

    /// Load OpenGL through this window's context and wrap it in a device
    pub fn create_device(&mut self) -> WindowResult<GlDevice> {
        // SAFETY: the context was made current in `new` and stays current on
        // this thread; the loader only resolves function pointers.
        let gl = unsafe {
            glow::Context::from_loader_function(|name| {
                let proc = self.window.get_proc_address(name);
                std::mem::transmute_copy::<_, *const c_void>(&proc)
            })
        };
        let (width, height) = self.framebuffer_size();
        GlDevice::new(gl, width, height).map_err(|e| WindowError::DeviceFailed(e.to_string()))
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request (or cancel) closing
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pump the platform event queue
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Drain events received since the last call
    pub fn flush_events(&self) -> Vec<glfw::WindowEvent> {
        glfw::flush_messages(&self.events).map(|(_, event)| event).collect()
    }

    /// Present the back buffer
    pub fn swap_buffers(&mut self) {
        self.window.swap_buffers();
    }

    /// Framebuffer size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0).unsigned_abs(), height.max(0).unsigned_abs())
    }

    /// Current state of a key
    pub fn key_pressed(&self, key: glfw::Key) -> bool {
        matches!(self.window.get_key(key), glfw::Action::Press | glfw::Action::Repeat)
    }
}
