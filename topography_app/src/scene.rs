//! Topography scene layout
//!
//! The point grid covers `depth width x cell` by `depth height x cell` world
//! units. Everything the frame loop places in that space (projection, key
//! light, debug quads) is computed here so it can be checked without a window.

use std::f32::consts::PI;
use std::path::Path;

use image::{GrayImage, ImageError};
use topo_engine::foundation::math::{orthographic, rotate_about_z, Mat4, Vec3};
use topo_engine::render::api::Viewport;
use topo_engine::sensor::depth::DepthRange;
use topo_engine::sensor::device::Resolution;

/// Gap between the debug quads and the window edge, in pixels
pub const DEBUG_QUAD_MARGIN: i32 = 10;

/// World-space extent of the topography grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    /// Grid columns (depth image width)
    pub columns: u32,
    /// Grid rows (depth image height)
    pub rows: u32,
    /// World units between neighbouring points
    pub cell_size: f32,
}

impl GridLayout {
    /// Layout for a depth stream
    pub const fn new(depth: Resolution, cell_size: f32) -> Self {
        Self {
            columns: depth.width,
            rows: depth.height,
            cell_size,
        }
    }

    /// Grid width in world units
    pub fn width(&self) -> f32 {
        self.columns as f32 * self.cell_size
    }

    /// Grid height in world units
    pub fn height(&self) -> f32 {
        self.rows as f32 * self.cell_size
    }

    /// Centre of the grid on the z = 0 plane
    pub fn centre(&self) -> Vec3 {
        Vec3::new(self.width() / 2.0, self.height() / 2.0, 0.0)
    }

    /// Orthographic projection over the grid, deep enough for the depth range
    ///
    /// Near and far are the range in centimetres widened by `padding_cm`.
    pub fn projection(&self, range: DepthRange, padding_cm: f32) -> Mat4 {
        orthographic(
            0.0,
            self.width(),
            0.0,
            self.height(),
            range.near_cm() - padding_cm,
            range.far_cm() + padding_cm,
        )
    }

    /// Key light position for a hand reported in grid coordinates
    ///
    /// The sensor image is upside down relative to the grid, so the hand is
    /// turned half a revolution about the grid centre. Depth in front of the
    /// camera lies along -z.
    pub fn hand_light(&self, hand: Vec3) -> Vec3 {
        let mut light = rotate_about_z(hand, self.centre(), PI);
        light.z = -light.z;
        light
    }
}

/// Debug quads for the colour, depth and skeleton textures
///
/// Each is an eighth of the window, laid out left to right along the bottom.
pub fn debug_viewports(window_width: u32, window_height: u32) -> [Viewport; 3] {
    let width = window_width / 8;
    let height = window_height / 8;
    let step = i32::try_from(width).unwrap_or(i32::MAX).saturating_add(DEBUG_QUAD_MARGIN);
    [0, 1, 2].map(|i| Viewport {
        x: DEBUG_QUAD_MARGIN + i * step,
        y: DEBUG_QUAD_MARGIN,
        width,
        height,
    })
}

/// Write an 8-bit depth image to a PNG file
///
/// # Errors
///
/// `pixels` does not hold exactly one byte per pixel, or the file cannot be
/// written.
pub fn save_depth_snapshot(path: &Path, resolution: Resolution, pixels: Vec<u8>) -> Result<(), ImageError> {
    let image = GrayImage::from_raw(resolution.width, resolution.height, pixels).ok_or_else(|| {
        ImageError::Parameter(image::error::ParameterError::from_kind(
            image::error::ParameterErrorKind::DimensionMismatch,
        ))
    })?;
    image.save(path)?;
    log::info!("Saved depth snapshot to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn layout() -> GridLayout {
        GridLayout::new(Resolution::new(640, 480), 3.0)
    }

    #[test]
    fn test_grid_extent() {
        let grid = layout();
        assert_eq!(grid.width(), 1920.0);
        assert_eq!(grid.height(), 1440.0);
        assert_eq!(grid.centre(), Vec3::new(960.0, 720.0, 0.0));
    }

    #[test]
    fn test_projection_spans_padded_range() {
        let grid = layout();
        let range = DepthRange::new(801, 3975).unwrap();
        let projection = grid.projection(range, 10.0);

        // Points at the padded near and far planes land on the clip bounds
        let near = projection * topo_engine::foundation::math::Vec4::new(0.0, 0.0, -(80.1 - 10.0), 1.0);
        let far = projection * topo_engine::foundation::math::Vec4::new(1920.0, 1440.0, -(397.5 + 10.0), 1.0);
        assert_relative_eq!(near.x, -1.0, epsilon = 1e-4);
        assert_relative_eq!(near.z, -1.0, epsilon = 1e-4);
        assert_relative_eq!(far.x, 1.0, epsilon = 1e-4);
        assert_relative_eq!(far.y, 1.0, epsilon = 1e-4);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_hand_light_turned_about_centre() {
        let grid = layout();
        let light = grid.hand_light(Vec3::new(100.0, 200.0, 150.0));
        assert_relative_eq!(light.x, 1820.0, epsilon = 1e-2);
        assert_relative_eq!(light.y, 1240.0, epsilon = 1e-2);
        assert_relative_eq!(light.z, -150.0);

        let centre = grid.hand_light(Vec3::new(960.0, 720.0, 80.0));
        assert_relative_eq!(centre.x, 960.0, epsilon = 1e-2);
        assert_relative_eq!(centre.y, 720.0, epsilon = 1e-2);
    }

    #[test]
    fn test_debug_viewports_row() {
        let quads = debug_viewports(640, 480);
        assert_eq!(quads[0], Viewport { x: 10, y: 10, width: 80, height: 60 });
        assert_eq!(quads[1].x, 100);
        assert_eq!(quads[2].x, 190);
        assert!(quads.iter().all(|q| q.y == 10 && q.width == 80));
    }

    #[test]
    fn test_tiny_window_still_lays_out() {
        let quads = debug_viewports(4, 4);
        assert!(quads.iter().all(|q| q.width == 0 && q.height == 0));
        assert_eq!(quads[2].x, 30);
    }

    #[test]
    fn test_depth_snapshot_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depth.png");
        save_depth_snapshot(&path, Resolution::new(2, 2), vec![0, 64, 128, 255]).unwrap();

        let image = image::open(&path).unwrap().into_luma8();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 1).0, [255]);
    }

    #[test]
    fn test_depth_snapshot_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depth.png");
        assert!(save_depth_snapshot(&path, Resolution::new(4, 4), vec![0; 3]).is_err());
        assert!(!path.exists());
    }
}
