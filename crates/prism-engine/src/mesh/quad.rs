use wgpu::util::DeviceExt;

use crate::core::{DrawContext, GpuObject, Renderable};

use super::Vertex;

/// Highest accepted subdivision level (`2^8` segments per side).
pub const MAX_SUBDIVISIONS: u32 = 8;

/// Full-screen quad in normalized device coordinates, optionally subdivided
/// into a regular grid so vertex-deforming effects have geometry to move.
///
/// Texture coordinates follow wgpu texture space: `(0, 0)` is the top-left
/// corner of the quad.
pub struct QuadMesh {
    subdivisions: u32,
    adaptive: bool,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,

    vbo: Option<wgpu::Buffer>,
    ibo: Option<wgpu::Buffer>,
}

impl QuadMesh {
    /// Two-triangle quad.
    pub fn quad() -> Self {
        Self::with_subdivisions(0)
    }

    /// Quad with `2^level` segments per side. `level` is clamped to
    /// [`MAX_SUBDIVISIONS`].
    pub fn with_subdivisions(level: u32) -> Self {
        let subdivisions = level.min(MAX_SUBDIVISIONS);
        let (vertices, indices) = build_grid(subdivisions);
        Self {
            subdivisions,
            adaptive: false,
            vertices,
            indices,
            vbo: None,
            ibo: None,
        }
    }

    /// Quad that re-tessellates itself to the active effect's preferred
    /// level of detail.
    pub fn adaptive() -> Self {
        Self {
            adaptive: true,
            ..Self::quad()
        }
    }

    pub fn subdivisions(&self) -> u32 {
        self.subdivisions
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Rebuilds the grid at a new level; GPU buffers are re-uploaded lazily.
    pub fn set_subdivisions(&mut self, level: u32) {
        let level = level.min(MAX_SUBDIVISIONS);
        if level == self.subdivisions {
            return;
        }
        let (vertices, indices) = build_grid(level);
        self.subdivisions = level;
        self.vertices = vertices;
        self.indices = indices;
        self.teardown_gpu();
    }
}

impl GpuObject for QuadMesh {
    fn setup_gpu(&mut self, device: &wgpu::Device) {
        if self.vbo.is_some() && self.ibo.is_some() {
            return;
        }

        self.vbo = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("prism quad vbo"),
            contents: bytemuck::cast_slice(&self.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }));

        self.ibo = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("prism quad ibo"),
            contents: bytemuck::cast_slice(&self.indices),
            usage: wgpu::BufferUsages::INDEX,
        }));
    }

    fn teardown_gpu(&mut self) {
        self.vbo = None;
        self.ibo = None;
    }
}

impl Renderable for QuadMesh {
    fn render(&mut self, cx: &mut DrawContext<'_, '_>) {
        if self.adaptive {
            self.set_subdivisions(cx.level_of_detail());
        }
        self.setup_gpu(cx.device());

        let (Some(vbo), Some(ibo)) = (self.vbo.as_ref(), self.ibo.as_ref()) else {
            return;
        };

        let pass = cx.pass();
        pass.set_vertex_buffer(0, vbo.slice(..));
        pass.set_index_buffer(ibo.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.indices.len() as u32, 0, 0..1);
    }
}

fn build_grid(level: u32) -> (Vec<Vertex>, Vec<u32>) {
    let segments = 1u32 << level;
    let row = segments + 1;

    let mut vertices = Vec::with_capacity((row * row) as usize);
    for j in 0..row {
        let t = j as f32 / segments as f32;
        for i in 0..row {
            let s = i as f32 / segments as f32;
            vertices.push(Vertex {
                position: [s * 2.0 - 1.0, t * 2.0 - 1.0, 0.0],
                tex_coord: [s, 1.0 - t],
                normal: [0.0, 0.0, 1.0],
            });
        }
    }

    let mut indices = Vec::with_capacity((segments * segments * 6) as usize);
    for j in 0..segments {
        for i in 0..segments {
            let a = j * row + i;
            let b = a + 1;
            let c = a + row;
            let d = c + 1;
            indices.extend_from_slice(&[a, b, d, a, d, c]);
        }
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_quad_has_two_triangles() {
        let quad = QuadMesh::quad();
        assert_eq!(quad.vertices().len(), 4);
        assert_eq!(quad.indices().len(), 6);
    }

    #[test]
    fn subdivision_grows_grid() {
        let quad = QuadMesh::with_subdivisions(3);
        assert_eq!(quad.vertices().len(), 9 * 9);
        assert_eq!(quad.indices().len(), 8 * 8 * 6);
    }

    #[test]
    fn subdivision_is_clamped() {
        assert_eq!(QuadMesh::with_subdivisions(40).subdivisions(), MAX_SUBDIVISIONS);
    }

    #[test]
    fn corners_cover_ndc_and_map_top_left_to_uv_origin() {
        let quad = QuadMesh::quad();
        let top_left = quad
            .vertices()
            .iter()
            .find(|v| v.position[0] == -1.0 && v.position[1] == 1.0)
            .unwrap();
        assert_eq!(top_left.tex_coord, [0.0, 0.0]);

        let bottom_right = quad
            .vertices()
            .iter()
            .find(|v| v.position[0] == 1.0 && v.position[1] == -1.0)
            .unwrap();
        assert_eq!(bottom_right.tex_coord, [1.0, 1.0]);
    }

    #[test]
    fn indices_stay_in_range() {
        let quad = QuadMesh::with_subdivisions(4);
        let n = quad.vertices().len() as u32;
        assert!(quad.indices().iter().all(|&i| i < n));
    }

    #[test]
    fn set_subdivisions_same_level_is_noop() {
        let mut quad = QuadMesh::with_subdivisions(2);
        quad.set_subdivisions(2);
        assert_eq!(quad.vertices().len(), 25);
    }
}
