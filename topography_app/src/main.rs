//! Augmented reality gallery topography viewer
//!
//! Renders the depth camera's view as a lit point-cloud topography with the
//! colour image laid over it. The key light follows the tracked right hand.
//!
//! Usage: `topography [settings.toml]`

mod app;
mod input;
mod scene;

use topo_engine::config::settings::AppSettings;
use topo_engine::config::Config;
use topo_engine::foundation::logging;

use app::TopographyApp;

const DEFAULT_SETTINGS: &str = "topography.toml";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    log::info!("Starting topography viewer");

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_SETTINGS.to_string());
    let settings = AppSettings::load_or_default(&path)?;
    log::info!("Settings from {path}: {:?} camera", settings.sensor.source);

    let mut app = match TopographyApp::new(&settings) {
        Ok(app) => app,
        Err(e) => {
            log::error!("Topography viewer failed to start: {e}");
            std::process::exit(1);
        }
    };

    let result = app.run();
    app.shutdown();

    match result {
        Ok(()) => {
            log::info!("Topography viewer closed");
            Ok(())
        }
        Err(e) => {
            log::error!("Topography viewer failed: {e}");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_engine::render::backends::HeadlessDevice;
    use topo_engine::render::effects::depth_geometry::{DepthGeometryEffect, GeometryPass};
    use topo_engine::render::GraphicsContext;
    use topo_engine::sensor::device::Resolution;
    use topo_engine::sensor::synthetic::SyntheticCamera;
    use topo_engine::sensor::SensorController;

    #[test]
    fn test_shipped_settings_parse() {
        let settings = AppSettings::load_from_file(DEFAULT_SETTINGS).unwrap();
        assert_eq!(settings.sensor.depth_resolution, Resolution::new(320, 240));
        assert!(settings.sensor.depth_range().is_ok());
        assert!(settings.effects.depth_geometry.is_file());
    }

    #[test]
    fn test_shipped_effects_load() {
        let mut settings = AppSettings::load_from_file(DEFAULT_SETTINGS).unwrap();
        settings.sensor.colour_resolution = Resolution::new(16, 12);
        settings.sensor.depth_resolution = Resolution::new(16, 12);

        let mut ctx = GraphicsContext::new(Box::new(HeadlessDevice::new()));
        let camera = Box::new(SyntheticCamera::new(settings.sensor.synthetic.clone()));
        let mut sensor = SensorController::build(&mut ctx, camera, &settings.sensor, &settings.effects).unwrap();
        sensor.poll(&mut ctx);

        let range = sensor.depth_range();
        let mut geometry = DepthGeometryEffect::load(
            &mut ctx,
            &settings.effects.depth_geometry,
            sensor.depth_texture().id(),
            sensor.colour_texture().id(),
            range.near_cm(),
            range.far_cm(),
        )
        .unwrap();
        assert_eq!(geometry.effect().passes(&ctx), 1);
        let mesh = ctx
            .gpu
            .create_mesh(&[], topo_engine::render::api::Topology::Points)
            .unwrap();
        geometry.draw(&mut ctx, mesh, GeometryPass::DepthOnly).unwrap();
        geometry.draw(&mut ctx, mesh, GeometryPass::Shaded).unwrap();

        ctx.gpu.destroy_mesh(mesh);
        geometry.release(&mut ctx);
        sensor.destroy(&mut ctx);
        assert!(ctx.effects.is_empty());
        assert_eq!(ctx.device::<HeadlessDevice>().unwrap().live_programs(), 0);
    }
}
