//! Shader IR type tags.
//!
//! Leaf enumerations shared by every IR node: constant types, vertex
//! semantics, fine-grained content tags, variability and program stages.

use std::borrow::Cow;

use bitflags::bitflags;

// ─── GpuConstantType ─────────────────────────────────────────────────────────

/// Type of a shader variable.
///
/// Matrix variants are named `MatrixRxC` (rows × columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GpuConstantType {
    Float1,
    Float2,
    Float3,
    Float4,
    Int1,
    Int2,
    Int3,
    Int4,
    UInt1,
    UInt2,
    UInt3,
    UInt4,
    Matrix2x2,
    Matrix2x3,
    Matrix2x4,
    Matrix3x2,
    Matrix3x3,
    Matrix3x4,
    Matrix4x2,
    Matrix4x3,
    Matrix4x4,
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    Sampler2DShadow,
    Sampler2DArray,
    SamplerExternalOes,
}

impl GpuConstantType {
    /// Returns the float vector type with `n` lanes (`n` in 1..=4).
    #[must_use]
    pub fn float_vector(n: u32) -> Self {
        match n {
            1 => Self::Float1,
            2 => Self::Float2,
            3 => Self::Float3,
            _ => Self::Float4,
        }
    }

    /// Number of scalar lanes of a vector type; matrices and samplers return 0.
    #[must_use]
    pub fn lane_count(self) -> u32 {
        match self {
            Self::Float1 | Self::Int1 | Self::UInt1 => 1,
            Self::Float2 | Self::Int2 | Self::UInt2 => 2,
            Self::Float3 | Self::Int3 | Self::UInt3 => 3,
            Self::Float4 | Self::Int4 | Self::UInt4 => 4,
            _ => 0,
        }
    }

    /// `(rows, columns)` of a matrix type.
    #[must_use]
    pub fn matrix_dimensions(self) -> Option<(u32, u32)> {
        match self {
            Self::Matrix2x2 => Some((2, 2)),
            Self::Matrix2x3 => Some((2, 3)),
            Self::Matrix2x4 => Some((2, 4)),
            Self::Matrix3x2 => Some((3, 2)),
            Self::Matrix3x3 => Some((3, 3)),
            Self::Matrix3x4 => Some((3, 4)),
            Self::Matrix4x2 => Some((4, 2)),
            Self::Matrix4x3 => Some((4, 3)),
            Self::Matrix4x4 => Some((4, 4)),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_matrix(self) -> bool {
        self.matrix_dimensions().is_some()
    }

    #[inline]
    #[must_use]
    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            Self::Sampler1D
                | Self::Sampler2D
                | Self::Sampler3D
                | Self::SamplerCube
                | Self::Sampler2DShadow
                | Self::Sampler2DArray
                | Self::SamplerExternalOes
        )
    }

    #[inline]
    #[must_use]
    pub fn is_float_vector(self) -> bool {
        matches!(
            self,
            Self::Float1 | Self::Float2 | Self::Float3 | Self::Float4
        )
    }

    #[inline]
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int1
                | Self::Int2
                | Self::Int3
                | Self::Int4
                | Self::UInt1
                | Self::UInt2
                | Self::UInt3
                | Self::UInt4
        )
    }

    /// Coordinate type used to sample a sampler of this type.
    #[must_use]
    pub fn sample_coordinate_type(self) -> Option<Self> {
        match self {
            Self::Sampler1D => Some(Self::Float1),
            Self::Sampler2D | Self::SamplerExternalOes => Some(Self::Float2),
            Self::Sampler3D | Self::SamplerCube | Self::Sampler2DShadow | Self::Sampler2DArray => {
                Some(Self::Float3)
            }
            _ => None,
        }
    }
}

// ─── Semantic ────────────────────────────────────────────────────────────────

/// Vertex / interpolator semantic of an input or output parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Semantic {
    Unknown,
    Position,
    Normal,
    Color,
    TexCoord,
    BlendWeights,
    BlendIndices,
    Binormal,
    Tangent,
    FrontFacing,
}

impl Semantic {
    /// Semantic name as written by languages that use semantics.
    #[must_use]
    pub fn hlsl_name(self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::Position => "POSITION",
            Self::Normal => "NORMAL",
            Self::Color => "COLOR",
            Self::TexCoord => "TEXCOORD",
            Self::BlendWeights => "BLENDWEIGHT",
            Self::BlendIndices => "BLENDINDICES",
            Self::Binormal => "BINORMAL",
            Self::Tangent => "TANGENT",
            Self::FrontFacing => "VFACE",
        }
    }

    /// Camel-case fragment used in generated parameter names.
    #[must_use]
    pub fn name_fragment(self) -> &'static str {
        match self {
            Self::Unknown => "Param",
            Self::Position => "Position",
            Self::Normal => "Normal",
            Self::Color => "Color",
            Self::TexCoord => "Texcoord",
            Self::BlendWeights => "BlendWeights",
            Self::BlendIndices => "BlendIndices",
            Self::Binormal => "Binormal",
            Self::Tangent => "Tangent",
            Self::FrontFacing => "FrontFacing",
        }
    }
}

// ─── Content ─────────────────────────────────────────────────────────────────

/// Fine-grained functional tag of a parameter.
///
/// Stage linking between a vertex output and a fragment input is decided by
/// content, never by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Content {
    Unknown,
    PositionObjectSpace,
    PositionWorldSpace,
    PositionViewSpace,
    PositionProjectiveSpace,
    NormalObjectSpace,
    NormalWorldSpace,
    NormalViewSpace,
    NormalTangentSpace,
    TangentObjectSpace,
    TangentViewSpace,
    BinormalObjectSpace,
    TextureCoordinate(u8),
    ColorDiffuse,
    ColorSpecular,
    BlendWeights,
    BlendIndices,
    DepthViewSpace,
    FogFactor,
    FrontFacing,
    LightPositionViewSpace(u8),
    LightDirectionViewSpace(u8),
    Custom(u16),
}

impl Content {
    /// Type a parameter of this content gets when none is requested.
    #[must_use]
    pub fn default_type(self) -> GpuConstantType {
        use GpuConstantType as T;
        match self {
            Self::PositionObjectSpace
            | Self::PositionWorldSpace
            | Self::PositionProjectiveSpace
            | Self::TangentObjectSpace
            | Self::ColorDiffuse
            | Self::ColorSpecular
            | Self::BlendWeights
            | Self::BlendIndices
            | Self::LightPositionViewSpace(_)
            | Self::Custom(_)
            | Self::Unknown => T::Float4,
            Self::PositionViewSpace
            | Self::NormalObjectSpace
            | Self::NormalWorldSpace
            | Self::NormalViewSpace
            | Self::NormalTangentSpace
            | Self::TangentViewSpace
            | Self::BinormalObjectSpace
            | Self::LightDirectionViewSpace(_) => T::Float3,
            Self::TextureCoordinate(_) => T::Float2,
            Self::DepthViewSpace | Self::FogFactor | Self::FrontFacing => T::Float1,
        }
    }

    /// Semantic a vertex shader input of this content binds to.
    #[must_use]
    pub fn vertex_input_semantic(self) -> Semantic {
        match self {
            Self::PositionObjectSpace => Semantic::Position,
            Self::NormalObjectSpace => Semantic::Normal,
            Self::TangentObjectSpace => Semantic::Tangent,
            Self::BinormalObjectSpace => Semantic::Binormal,
            Self::ColorDiffuse | Self::ColorSpecular => Semantic::Color,
            Self::BlendWeights => Semantic::BlendWeights,
            Self::BlendIndices => Semantic::BlendIndices,
            _ => Semantic::TexCoord,
        }
    }

    /// Semantic of an interpolated value (vertex output / fragment input).
    #[must_use]
    pub fn varying_semantic(self) -> Semantic {
        match self {
            Self::PositionProjectiveSpace => Semantic::Position,
            Self::ColorDiffuse | Self::ColorSpecular => Semantic::Color,
            Self::FrontFacing => Semantic::FrontFacing,
            _ => Semantic::TexCoord,
        }
    }

    /// Fixed semantic index, where the content implies one.
    #[must_use]
    pub fn fixed_index(self) -> Option<u32> {
        match self {
            Self::ColorDiffuse => Some(0),
            Self::ColorSpecular => Some(1),
            _ => None,
        }
    }

    /// Vertex attribute a vertex input of this content reads.
    #[must_use]
    pub fn vertex_element(self) -> Option<VertexElements> {
        match self {
            Self::PositionObjectSpace => Some(VertexElements::POSITION),
            Self::NormalObjectSpace => Some(VertexElements::NORMAL),
            Self::TangentObjectSpace => Some(VertexElements::TANGENT),
            Self::BinormalObjectSpace => Some(VertexElements::BINORMAL),
            Self::ColorDiffuse => Some(VertexElements::DIFFUSE),
            Self::ColorSpecular => Some(VertexElements::SPECULAR),
            Self::BlendWeights => Some(VertexElements::BLEND_WEIGHTS),
            Self::BlendIndices => Some(VertexElements::BLEND_INDICES),
            Self::TextureCoordinate(set) => VertexElements::texcoord(set),
            _ => None,
        }
    }

    /// Short tag used to build local variable names.
    #[must_use]
    pub fn tag(self) -> Cow<'static, str> {
        match self {
            Self::Unknown => Cow::Borrowed("Param"),
            Self::PositionObjectSpace => Cow::Borrowed("PositionObject"),
            Self::PositionWorldSpace => Cow::Borrowed("PositionWorld"),
            Self::PositionViewSpace => Cow::Borrowed("PositionView"),
            Self::PositionProjectiveSpace => Cow::Borrowed("PositionProj"),
            Self::NormalObjectSpace => Cow::Borrowed("NormalObject"),
            Self::NormalWorldSpace => Cow::Borrowed("NormalWorld"),
            Self::NormalViewSpace => Cow::Borrowed("NormalView"),
            Self::NormalTangentSpace => Cow::Borrowed("NormalTangent"),
            Self::TangentObjectSpace => Cow::Borrowed("TangentObject"),
            Self::TangentViewSpace => Cow::Borrowed("TangentView"),
            Self::BinormalObjectSpace => Cow::Borrowed("BinormalObject"),
            Self::TextureCoordinate(i) => Cow::Owned(format!("TexCoord{i}")),
            Self::ColorDiffuse => Cow::Borrowed("Diffuse"),
            Self::ColorSpecular => Cow::Borrowed("Specular"),
            Self::BlendWeights => Cow::Borrowed("BlendWeights"),
            Self::BlendIndices => Cow::Borrowed("BlendIndices"),
            Self::DepthViewSpace => Cow::Borrowed("DepthView"),
            Self::FogFactor => Cow::Borrowed("FogFactor"),
            Self::FrontFacing => Cow::Borrowed("FrontFacing"),
            Self::LightPositionViewSpace(i) => Cow::Owned(format!("LightPositionView{i}")),
            Self::LightDirectionViewSpace(i) => Cow::Owned(format!("LightDirectionView{i}")),
            Self::Custom(i) => Cow::Owned(format!("Custom{i}")),
        }
    }
}

// ─── Variability ─────────────────────────────────────────────────────────────

bitflags! {
    /// How often the engine has to refresh a uniform.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct Variability: u8 {
        const GLOBAL     = 1 << 0;
        const PER_OBJECT = 1 << 1;
        const LIGHTS     = 1 << 2;
        const PER_PASS   = 1 << 3;
        const ALL        = Self::GLOBAL.bits()
            | Self::PER_OBJECT.bits()
            | Self::LIGHTS.bits()
            | Self::PER_PASS.bits();
    }
}

// ─── VertexElements ──────────────────────────────────────────────────────────

bitflags! {
    /// Vertex attributes available to a pass.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct VertexElements: u32 {
        const POSITION      = 1 << 0;
        const NORMAL        = 1 << 1;
        const DIFFUSE       = 1 << 2;
        const SPECULAR      = 1 << 3;
        const TANGENT       = 1 << 4;
        const BINORMAL      = 1 << 5;
        const BLEND_INDICES = 1 << 6;
        const BLEND_WEIGHTS = 1 << 7;
        const TEXCOORD0     = 1 << 8;
        const TEXCOORD1     = 1 << 9;
        const TEXCOORD2     = 1 << 10;
        const TEXCOORD3     = 1 << 11;
        const TEXCOORD4     = 1 << 12;
        const TEXCOORD5     = 1 << 13;
        const TEXCOORD6     = 1 << 14;
        const TEXCOORD7     = 1 << 15;
    }
}

impl VertexElements {
    /// Flag of texture coordinate set `set` (0..8).
    #[must_use]
    pub fn texcoord(set: u8) -> Option<Self> {
        if set < 8 {
            Self::from_bits(Self::TEXCOORD0.bits() << set)
        } else {
            None
        }
    }
}

// ─── GpuProgramType ──────────────────────────────────────────────────────────

/// Pipeline stage a program runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GpuProgramType {
    Vertex,
    Fragment,
    Geometry,
    Domain,
    Hull,
    Compute,
}

impl GpuProgramType {
    /// Short tag used in generated program names.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Vertex => "VS",
            Self::Fragment => "FS",
            Self::Geometry => "GS",
            Self::Domain => "DS",
            Self::Hull => "HS",
            Self::Compute => "CS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texcoord_flags() {
        assert_eq!(VertexElements::texcoord(0), Some(VertexElements::TEXCOORD0));
        assert_eq!(VertexElements::texcoord(7), Some(VertexElements::TEXCOORD7));
        assert_eq!(VertexElements::texcoord(8), None);
    }

    #[test]
    fn lane_counts() {
        assert_eq!(GpuConstantType::Float3.lane_count(), 3);
        assert_eq!(GpuConstantType::UInt4.lane_count(), 4);
        assert_eq!(GpuConstantType::Matrix3x4.lane_count(), 0);
        assert_eq!(GpuConstantType::Matrix3x4.matrix_dimensions(), Some((3, 4)));
        assert!(GpuConstantType::SamplerCube.is_sampler());
    }

    #[test]
    fn content_semantics() {
        assert_eq!(
            Content::PositionProjectiveSpace.varying_semantic(),
            Semantic::Position
        );
        assert_eq!(Content::NormalViewSpace.varying_semantic(), Semantic::TexCoord);
        assert_eq!(
            Content::BlendIndices.vertex_input_semantic(),
            Semantic::BlendIndices
        );
        assert_eq!(Content::ColorSpecular.fixed_index(), Some(1));
    }
}
