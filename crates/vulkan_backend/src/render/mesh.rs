//! Mesh vertex layout description
//!
//! A mesh declares its interleaved vertex layout as an ordered list of
//! [`VertexElement`]s. Each semantic is matched against a shader input by
//! attribute name when a pipeline is built.

use serde::{Deserialize, Serialize};

/// Meaning of one vertex element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexSemantic {
    /// Object-space position
    Position,
    /// Normal vector
    Normal,
    /// Tangent vector
    Tangent,
    /// Vertex color
    Color,
    /// First texture coordinate set
    TexCoord0,
    /// Second texture coordinate set
    TexCoord1,
    /// Skinning weights
    BlendWeights,
    /// Skinning joint indices
    BlendIndices,
}

impl VertexSemantic {
    /// Shader input name bound to this semantic
    pub const fn attribute_name(self) -> &'static str {
        match self {
            Self::Position => "a_Position",
            Self::Normal => "a_Normal",
            Self::Tangent => "a_Tangent",
            Self::Color => "a_Color",
            Self::TexCoord0 => "a_UV",
            Self::TexCoord1 => "a_UV1",
            Self::BlendWeights => "a_Weight",
            Self::BlendIndices => "a_Joint",
        }
    }
}

/// Data format of one vertex element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexFormat {
    /// One 32-bit float
    Float,
    /// Two 32-bit floats
    Float2,
    /// Three 32-bit floats
    Float3,
    /// Four 32-bit floats
    Float4,
    /// Four normalized unsigned bytes
    UByte4Norm,
    /// Four unsigned bytes
    UByte4,
    /// Four 32-bit signed integers
    Int4,
}

impl VertexFormat {
    /// Size of one element in bytes
    pub const fn size(self) -> u32 {
        match self {
            Self::Float | Self::UByte4Norm | Self::UByte4 => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 | Self::Int4 => 16,
        }
    }
}

/// One element of an interleaved vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexElement {
    /// Meaning
    pub semantic: VertexSemantic,
    /// Data format
    pub format: VertexFormat,
}

impl VertexElement {
    /// Create a vertex element
    pub const fn new(semantic: VertexSemantic, format: VertexFormat) -> Self {
        Self { semantic, format }
    }
}

/// Byte stride of one interleaved vertex
pub fn vertex_stride(elements: &[VertexElement]) -> u32 {
    elements.iter().map(|e| e.format.size()).sum()
}

/// Primitive assembly topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Points
    PointList,
    /// Separate lines
    LineList,
    /// Connected lines
    LineStrip,
    /// Separate triangles
    #[default]
    TriangleList,
    /// Connected triangles
    TriangleStrip,
    /// Triangles around the first vertex
    TriangleFan,
}

impl Topology {
    /// Number of triangles drawn for `count` vertices or indices
    pub const fn triangle_count(self, count: u32) -> u32 {
        match self {
            Self::TriangleList => count / 3,
            Self::TriangleStrip | Self::TriangleFan => count.saturating_sub(2),
            Self::PointList | Self::LineList | Self::LineStrip => 0,
        }
    }
}

/// Width of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexFormat {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

impl IndexFormat {
    /// Index format for a byte stride; anything but 4 is treated as 16-bit
    pub const fn from_stride(stride: u32) -> Self {
        if stride == 4 {
            Self::U32
        } else {
            Self::U16
        }
    }

    /// Size of one index in bytes
    pub const fn stride(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}
