//! Vertex formats and generated meshes

use bytemuck::{Pod, Zeroable};

/// Lit, textured vertex (attribute locations 0, 1, 2)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Byte stride between vertices
    pub const STRIDE: usize = std::mem::size_of::<Self>();
}

/// Position + colour vertex for debug primitives (attribute locations 0, 1)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    /// Position in the space of the supplied transform
    pub position: [f32; 3],
    /// RGBA colour
    pub colour: [f32; 4],
}

impl ColorVertex {
    /// Byte stride between vertices
    pub const STRIDE: usize = std::mem::size_of::<Self>();

    /// Construct from a position and colour
    pub const fn new(position: [f32; 3], colour: [f32; 4]) -> Self {
        Self { position, colour }
    }
}

/// Clip-space quad as a 4-vertex triangle strip, texture origin bottom-left
pub fn fullscreen_quad() -> [Vertex; 4] {
    let v = |x: f32, y: f32, u: f32, t: f32| Vertex {
        position: [x, y, 0.0],
        normal: [0.0, 0.0, 1.0],
        tex_coord: [u, t],
    };
    [
        v(-1.0, -1.0, 0.0, 0.0),
        v(1.0, -1.0, 1.0, 0.0),
        v(-1.0, 1.0, 0.0, 1.0),
        v(1.0, 1.0, 1.0, 1.0),
    ]
}

/// Point grid sampling a `width` x `height` depth image
///
/// Rows `0..height-1` and columns `0..width` each emit an upper and a lower
/// vertex, `cell_size` apart, facing +Z. The vertex shader displaces each
/// point along Z from the depth texture.
pub fn topography_grid(width: u32, height: u32, cell_size: f32) -> Vec<Vertex> {
    if width < 2 || height < 2 {
        return Vec::new();
    }
    let u_div = (width - 1) as f32;
    let v_div = (height - 1) as f32;

    let mut vertices = Vec::with_capacity(((height - 1) * width * 2) as usize);
    for i in 0..height - 1 {
        let y = i as f32 * cell_size;
        for j in 0..width {
            let x = j as f32 * cell_size;
            let u = j as f32 / u_div;
            vertices.push(Vertex {
                position: [x, y + cell_size, 0.0],
                normal: [0.0, 0.0, 1.0],
                tex_coord: [u, (i + 1) as f32 / v_div],
            });
            vertices.push(Vertex {
                position: [x, y, 0.0],
                normal: [0.0, 0.0, 1.0],
                tex_coord: [u, i as f32 / v_div],
            });
        }
    }
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vertex_strides() {
        assert_eq!(Vertex::STRIDE, 32);
        assert_eq!(ColorVertex::STRIDE, 28);
    }

    #[test]
    fn test_grid_vertex_count_and_layout() {
        let grid = topography_grid(4, 3, 3.0);
        assert_eq!(grid.len(), 2 * 4 * 2);

        // First column of the first row: upper then lower
        assert_eq!(grid[0].position, [0.0, 3.0, 0.0]);
        assert_eq!(grid[1].position, [0.0, 0.0, 0.0]);
        assert_relative_eq!(grid[0].tex_coord[1], 0.5);
        assert_relative_eq!(grid[1].tex_coord[1], 0.0);

        // Last column reaches u = 1
        let last_upper = grid[2 * 3];
        assert_eq!(last_upper.position, [9.0, 3.0, 0.0]);
        assert_relative_eq!(last_upper.tex_coord[0], 1.0);

        // Last row reaches v = 1
        let last = grid[grid.len() - 2];
        assert_relative_eq!(last.tex_coord[1], 1.0);
        assert!(grid.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_degenerate_grid_is_empty() {
        assert!(topography_grid(1, 480, 3.0).is_empty());
        assert!(topography_grid(640, 1, 3.0).is_empty());
    }
}
