use bytemuck::{Pod, Zeroable};

/// Standard vertex attribute slots of [`Vertex`].
///
/// Effects map their vertex-shader input names onto these slots with
/// `bind_attribute`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum VertexAttrib {
    Position,
    TexCoord,
    Normal,
}

impl VertexAttrib {
    pub const ALL: [VertexAttrib; 3] = [
        VertexAttrib::Position,
        VertexAttrib::TexCoord,
        VertexAttrib::Normal,
    ];

    /// Byte offset inside [`Vertex`].
    pub const fn offset(self) -> u64 {
        match self {
            VertexAttrib::Position => 0,
            VertexAttrib::TexCoord => 12,
            VertexAttrib::Normal => 20,
        }
    }

    pub const fn format(self) -> wgpu::VertexFormat {
        match self {
            VertexAttrib::Position => wgpu::VertexFormat::Float32x3,
            VertexAttrib::TexCoord => wgpu::VertexFormat::Float32x2,
            VertexAttrib::Normal => wgpu::VertexFormat::Float32x3,
        }
    }

    /// Default vertex-shader input name bound to this slot.
    pub const fn default_name(self) -> &'static str {
        match self {
            VertexAttrib::Position => "position",
            VertexAttrib::TexCoord => "tex_coord",
            VertexAttrib::Normal => "normal",
        }
    }

    pub fn from_default_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.default_name() == name)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex {
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;
}
