//! Topography application
//!
//! Owns the window, the graphics context, the sensor pipeline and the
//! topography geometry, and drives them once per frame.

use std::path::PathBuf;

use glfw::{Action, WindowEvent};
use thiserror::Error;
use topo_engine::config::settings::{AppSettings, TopographySettings};
use topo_engine::config::ConfigError;
use topo_engine::foundation::math::{Mat4, Vec3};
use topo_engine::foundation::time::Timer;
use topo_engine::render::api::{ClearMask, MeshId, RenderState, Topology, Viewport};
use topo_engine::render::camera::ViewCamera;
use topo_engine::render::effect::EffectError;
use topo_engine::render::effects::depth_geometry::{DepthGeometryEffect, GeometryPass};
use topo_engine::render::geometry::topography_grid;
use topo_engine::render::window::{Window, WindowError};
use topo_engine::render::{check_gpu_state, GraphicsContext, RenderError};
use topo_engine::sensor::{open_camera, SensorController, SensorError};

use crate::input::{CameraMotion, Command};
use crate::scene::{debug_viewports, save_depth_snapshot, GridLayout};

/// Seconds between frame-rate reports
const FPS_REPORT_INTERVAL: f32 = 5.0;

/// Application errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Settings file could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Window or GL context setup failed
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Camera or sensor pipeline failure
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Geometry effect failure
    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),

    /// Draw failure
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

/// Running topography viewer
pub struct TopographyApp {
    // Dropped before the window so GL objects go while the context is current
    ctx: GraphicsContext,
    window: Window,
    sensor: SensorController,
    geometry: DepthGeometryEffect,
    grid_mesh: MeshId,
    grid: GridLayout,
    camera: ViewCamera,
    topography: TopographySettings,
    timer: Timer,
}

impl TopographyApp {
    /// Open the window and build every GPU resource
    ///
    /// Resources created before a failure are released before returning.
    pub fn new(settings: &AppSettings) -> Result<Self, AppError> {
        let window_settings = &settings.window;
        let mut window = Window::new(
            &window_settings.title,
            window_settings.width,
            window_settings.height,
            window_settings.vsync,
        )?;
        let mut ctx = GraphicsContext::new(Box::new(window.create_device()?));

        let camera = open_camera(&settings.sensor)?;
        log::info!("Using {} camera", camera.name());
        let mut sensor = SensorController::build(&mut ctx, camera, &settings.sensor, &settings.effects)?;

        let range = sensor.depth_range();
        let mut geometry = match DepthGeometryEffect::load(
            &mut ctx,
            &settings.effects.depth_geometry,
            sensor.depth_texture().id(),
            sensor.colour_texture().id(),
            range.near_cm(),
            range.far_cm(),
        ) {
            Ok(geometry) => geometry,
            Err(e) => {
                sensor.destroy(&mut ctx);
                ctx.shutdown();
                return Err(e.into());
            }
        };
        let topography = settings.topography;
        geometry.set_light_colour(&Vec3::from(topography.light_colour));
        geometry.set_shininess(topography.shininess);

        let grid = GridLayout::new(sensor.depth_resolution(), topography.cell_size);
        let vertices = topography_grid(grid.columns, grid.rows, grid.cell_size);
        let grid_mesh = match ctx.gpu.create_mesh(&vertices, Topology::Points) {
            Ok(mesh) => mesh,
            Err(e) => {
                geometry.release(&mut ctx);
                sensor.destroy(&mut ctx);
                ctx.shutdown();
                return Err(e.into());
            }
        };
        log::info!(
            "Topography grid {}x{} ({} points, {:.0}x{:.0} units)",
            grid.columns,
            grid.rows,
            vertices.len(),
            grid.width(),
            grid.height()
        );

        Ok(Self {
            ctx,
            window,
            sensor,
            geometry,
            grid_mesh,
            grid,
            camera: ViewCamera::new(),
            topography,
            timer: Timer::new(),
        })
    }

    /// Frame loop; returns when the window closes or a frame fails
    pub fn run(&mut self) -> Result<(), AppError> {
        while !self.window.should_close() {
            self.window.poll_events();
            self.handle_events();
            self.apply_camera_keys();

            self.render_frame()?;
            self.window.swap_buffers();

            self.timer.update();
            if let Some(fps) = self.timer.take_fps_report(FPS_REPORT_INTERVAL) {
                log::info!("{fps:.1} fps");
            }
        }
        Ok(())
    }

    fn handle_events(&mut self) {
        for event in self.window.flush_events() {
            if let WindowEvent::Key(key, _, Action::Press, _) = event {
                if let Some(command) = Command::for_key(key) {
                    self.execute(command);
                }
            }
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Quit => self.window.set_should_close(true),
            Command::ReloadEffects => {
                if let Err(e) = self.geometry.reload(&mut self.ctx) {
                    log::error!("Geometry effect reload failed: {e}");
                }
                if let Err(e) = self.sensor.reload_effects(&mut self.ctx) {
                    log::error!("Sensor effect reload failed: {e}");
                }
            }
            Command::SaveDepthSnapshot => {
                let path = PathBuf::from(format!("depth_snapshot_{:06}.png", self.timer.frame_count()));
                let pixels = self.sensor.depth_luminance8();
                if let Err(e) = save_depth_snapshot(&path, self.sensor.depth_resolution(), pixels) {
                    log::error!("Could not save {}: {e}", path.display());
                }
            }
        }
    }

    fn apply_camera_keys(&mut self) {
        let motion = CameraMotion::from_keys(|key| self.window.key_pressed(key));
        if motion.is_idle() {
            return;
        }
        self.camera.move_by(&motion.translation);
        if motion.rotation != 0.0 {
            self.camera.rotate(&CameraMotion::axis(), motion.rotation);
        }
    }

    fn render_frame(&mut self) -> Result<(), AppError> {
        self.sensor.poll(&mut self.ctx);

        let (width, height) = self.window.framebuffer_size();
        let screen = Viewport::full(width, height);
        self.ctx.gpu.set_viewport(screen);
        self.ctx.gpu.set_render_state(&RenderState::default());
        self.ctx.gpu.clear(ClearMask::COLOUR | ClearMask::DEPTH, [0.0, 0.0, 0.0, 0.0]);

        let projection = self
            .grid
            .projection(self.sensor.depth_range(), self.topography.depth_padding_cm);
        self.geometry
            .set_transforms(&Mat4::identity(), self.camera.view(), &projection);

        // Prime the depth buffer, then lay the colour image over it
        self.geometry
            .draw(&mut self.ctx, self.grid_mesh, GeometryPass::DepthOnly)?;
        self.ctx.gpu.set_render_state(&RenderState::overlay());
        self.ctx
            .gpu
            .draw_textured_quad(screen, self.sensor.colour_texture().id());

        if let Some(hand) = self.sensor.hand_position(self.grid.width(), self.grid.height()) {
            self.geometry.set_light_position(&self.grid.hand_light(hand));
        }
        self.geometry
            .draw(&mut self.ctx, self.grid_mesh, GeometryPass::Shaded)?;

        self.ctx.gpu.set_render_state(&RenderState::overlay());
        let textures = [
            self.sensor.colour_texture().id(),
            self.sensor.depth_texture().id(),
            self.sensor.skeleton_texture().id(),
        ];
        for (viewport, texture) in debug_viewports(width, height).into_iter().zip(textures) {
            self.ctx.gpu.draw_textured_quad(viewport, texture);
        }

        check_gpu_state(self.ctx.gpu.as_mut(), "topography frame");
        Ok(())
    }

    /// Release GPU resources in reverse order of creation
    pub fn shutdown(mut self) {
        self.ctx.gpu.destroy_mesh(self.grid_mesh);
        self.geometry.release(&mut self.ctx);
        self.sensor.destroy(&mut self.ctx);
        self.ctx.shutdown();
        log::info!("Shut down after {} frames", self.timer.frame_count());
    }
}
