//! Shader parameters.
//!
//! A [`Parameter`] is one shader variable: a vertex input, an interpolated
//! varying, a fragment output, a function-local temporary, a uniform (plain or
//! engine-supplied auto-constant) or an inline literal. Parameters are
//! immutable once created and shared through [`ParameterPtr`]; identity is
//! pointer identity.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;

use super::types::{Content, GpuConstantType, Semantic, Variability};

/// Shared handle to an immutable parameter.
pub type ParameterPtr = Arc<Parameter>;

/// Pointer identity of two parameters.
#[inline]
#[must_use]
pub fn same_parameter(a: &ParameterPtr, b: &ParameterPtr) -> bool {
    Arc::ptr_eq(a, b)
}

// ─── AutoConstantType ────────────────────────────────────────────────────────

/// Engine-supplied uniform values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AutoConstantType {
    WorldMatrix,
    WorldMatrixArray,
    WorldMatrixArray3x4,
    WorldDualQuaternionArray2x4,
    WorldScaleShearMatrixArray3x4,
    ViewMatrix,
    ProjectionMatrix,
    ViewProjMatrix,
    WorldViewMatrix,
    WorldViewProjMatrix,
    InverseTransposeWorldViewMatrix,
    NormalMatrix,
    TextureMatrix,
    LightPositionViewSpace,
    LightDirectionViewSpace,
    LightDiffuseColour,
    LightSpecularColour,
    DerivedLightDiffuseColour,
    DerivedLightSpecularColour,
    LightAttenuation,
    SpotlightParams,
    AmbientLightColour,
    DerivedAmbientLightColour,
    DerivedSceneColour,
    SurfaceAmbientColour,
    SurfaceDiffuseColour,
    SurfaceSpecularColour,
    SurfaceEmissiveColour,
    SurfaceShininess,
    FogColour,
    FogParams,
    ViewportSize,
}

impl AutoConstantType {
    /// Snake-case name, used as the uniform's base name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::WorldMatrix => "world_matrix",
            Self::WorldMatrixArray => "world_matrix_array",
            Self::WorldMatrixArray3x4 => "world_matrix_array_3x4",
            Self::WorldDualQuaternionArray2x4 => "world_dualquaternion_array_2x4",
            Self::WorldScaleShearMatrixArray3x4 => "world_scale_shear_matrix_array_3x4",
            Self::ViewMatrix => "view_matrix",
            Self::ProjectionMatrix => "projection_matrix",
            Self::ViewProjMatrix => "viewproj_matrix",
            Self::WorldViewMatrix => "worldview_matrix",
            Self::WorldViewProjMatrix => "worldviewproj_matrix",
            Self::InverseTransposeWorldViewMatrix => "inverse_transpose_worldview_matrix",
            Self::NormalMatrix => "normal_matrix",
            Self::TextureMatrix => "texture_matrix",
            Self::LightPositionViewSpace => "light_position_view_space",
            Self::LightDirectionViewSpace => "light_direction_view_space",
            Self::LightDiffuseColour => "light_diffuse_colour",
            Self::LightSpecularColour => "light_specular_colour",
            Self::DerivedLightDiffuseColour => "derived_light_diffuse_colour",
            Self::DerivedLightSpecularColour => "derived_light_specular_colour",
            Self::LightAttenuation => "light_attenuation",
            Self::SpotlightParams => "spotlight_params",
            Self::AmbientLightColour => "ambient_light_colour",
            Self::DerivedAmbientLightColour => "derived_ambient_light_colour",
            Self::DerivedSceneColour => "derived_scene_colour",
            Self::SurfaceAmbientColour => "surface_ambient_colour",
            Self::SurfaceDiffuseColour => "surface_diffuse_colour",
            Self::SurfaceSpecularColour => "surface_specular_colour",
            Self::SurfaceEmissiveColour => "surface_emissive_colour",
            Self::SurfaceShininess => "surface_shininess",
            Self::FogColour => "fog_colour",
            Self::FogParams => "fog_params",
            Self::ViewportSize => "viewport_size",
        }
    }

    /// Shader type of one element of this constant.
    #[must_use]
    pub fn element_type(self) -> GpuConstantType {
        use GpuConstantType as T;
        match self {
            Self::WorldMatrix
            | Self::WorldMatrixArray
            | Self::ViewMatrix
            | Self::ProjectionMatrix
            | Self::ViewProjMatrix
            | Self::WorldViewMatrix
            | Self::WorldViewProjMatrix
            | Self::InverseTransposeWorldViewMatrix
            | Self::TextureMatrix => T::Matrix4x4,
            Self::WorldMatrixArray3x4 | Self::WorldScaleShearMatrixArray3x4 => T::Matrix3x4,
            Self::WorldDualQuaternionArray2x4 => T::Matrix2x4,
            Self::NormalMatrix => T::Matrix3x3,
            Self::SurfaceShininess => T::Float1,
            Self::LightAttenuation
            | Self::LightPositionViewSpace
            | Self::LightDirectionViewSpace
            | Self::LightDiffuseColour
            | Self::LightSpecularColour
            | Self::DerivedLightDiffuseColour
            | Self::DerivedLightSpecularColour
            | Self::AmbientLightColour
            | Self::DerivedAmbientLightColour
            | Self::DerivedSceneColour
            | Self::SurfaceAmbientColour
            | Self::SurfaceDiffuseColour
            | Self::SurfaceSpecularColour
            | Self::SurfaceEmissiveColour
            | Self::FogColour
            | Self::FogParams
            | Self::ViewportSize => T::Float4,
            Self::SpotlightParams => T::Float3,
        }
    }

    /// Array constants carry an element count instead of a data index.
    #[must_use]
    pub fn is_array(self) -> bool {
        matches!(
            self,
            Self::WorldMatrixArray
                | Self::WorldMatrixArray3x4
                | Self::WorldDualQuaternionArray2x4
                | Self::WorldScaleShearMatrixArray3x4
        )
    }

    /// Whether the data argument selects an element (light index, texture unit).
    #[must_use]
    pub fn is_indexed(self) -> bool {
        matches!(
            self,
            Self::TextureMatrix
                | Self::LightPositionViewSpace
                | Self::LightDirectionViewSpace
                | Self::LightDiffuseColour
                | Self::LightSpecularColour
                | Self::DerivedLightDiffuseColour
                | Self::DerivedLightSpecularColour
                | Self::LightAttenuation
                | Self::SpotlightParams
        )
    }

    /// Refresh frequency of this constant.
    #[must_use]
    pub fn variability(self) -> Variability {
        match self {
            Self::LightPositionViewSpace
            | Self::LightDirectionViewSpace
            | Self::LightDiffuseColour
            | Self::LightSpecularColour
            | Self::DerivedLightDiffuseColour
            | Self::DerivedLightSpecularColour
            | Self::LightAttenuation
            | Self::SpotlightParams => Variability::LIGHTS,
            Self::AmbientLightColour
            | Self::DerivedAmbientLightColour
            | Self::DerivedSceneColour
            | Self::FogColour
            | Self::FogParams
            | Self::ViewportSize
            | Self::ViewMatrix
            | Self::ProjectionMatrix
            | Self::ViewProjMatrix => Variability::GLOBAL,
            Self::SurfaceAmbientColour
            | Self::SurfaceDiffuseColour
            | Self::SurfaceSpecularColour
            | Self::SurfaceEmissiveColour
            | Self::SurfaceShininess
            | Self::TextureMatrix => Variability::PER_PASS,
            _ => Variability::PER_OBJECT,
        }
    }
}

// ─── AutoConstant ────────────────────────────────────────────────────────────

/// Data argument of an auto-constant.
#[derive(Debug, Clone, Copy)]
pub enum AutoConstantData {
    None,
    Int(u32),
    Real(f32),
}

impl AutoConstantData {
    fn key(self) -> (u8, u32) {
        match self {
            Self::None => (0, 0),
            Self::Int(v) => (1, v),
            Self::Real(v) => (2, v.to_bits()),
        }
    }
}

impl PartialEq for AutoConstantData {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AutoConstantData {}

impl Hash for AutoConstantData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for AutoConstantData {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AutoConstantData {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

/// `(type, data)` pair identifying an auto-constant uniform within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AutoConstant {
    pub kind: AutoConstantType,
    pub data: AutoConstantData,
}

// ─── ConstValue ──────────────────────────────────────────────────────────────

/// Literal value of a constant parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Float(SmallVec<[f32; 4]>),
    Int(i32),
}

impl ConstValue {
    /// Shader type matching the literal.
    #[must_use]
    pub fn constant_type(&self) -> GpuConstantType {
        match self {
            Self::Float(v) => GpuConstantType::float_vector(v.len() as u32),
            Self::Int(_) => GpuConstantType::Int1,
        }
    }
}

// ─── Parameter ───────────────────────────────────────────────────────────────

/// Role of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    Input,
    Output,
    Local,
    Uniform,
    AutoConstant(AutoConstant),
    Constant(ConstValue),
}

/// Direction tag used by the function-level uniqueness invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    Local,
    Global,
}

/// One shader variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub(crate) name: String,
    pub(crate) ty: GpuConstantType,
    pub(crate) array_size: usize,
    pub(crate) semantic: Semantic,
    pub(crate) index: u32,
    pub(crate) content: Content,
    pub(crate) variability: Variability,
    pub(crate) kind: ParameterKind,
}

impl Parameter {
    #[must_use]
    pub fn new(
        kind: ParameterKind,
        name: impl Into<String>,
        ty: GpuConstantType,
        semantic: Semantic,
        index: u32,
        content: Content,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            array_size: 0,
            semantic,
            index,
            content,
            variability: Variability::empty(),
            kind,
        }
    }

    /// Plain (non auto) uniform.
    #[must_use]
    pub fn uniform(
        name: impl Into<String>,
        ty: GpuConstantType,
        variability: Variability,
        array_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            array_size,
            semantic: Semantic::Unknown,
            index: 0,
            content: Content::Unknown,
            variability,
            kind: ParameterKind::Uniform,
        }
    }

    /// Engine-supplied uniform.
    #[must_use]
    pub fn auto_constant(kind: AutoConstantType, data: AutoConstantData) -> Self {
        let (name, array_size) = match data {
            AutoConstantData::Int(n) if kind.is_array() => (kind.name().to_string(), n as usize),
            AutoConstantData::Int(n) if kind.is_indexed() => (format!("{}{n}", kind.name()), 0),
            _ => (kind.name().to_string(), 0),
        };
        Self {
            name,
            ty: kind.element_type(),
            array_size,
            semantic: Semantic::Unknown,
            index: 0,
            content: Content::Unknown,
            variability: kind.variability(),
            kind: ParameterKind::AutoConstant(AutoConstant { kind, data }),
        }
    }

    /// Float literal of 1..=4 lanes.
    #[must_use]
    pub fn constant_float(values: &[f32]) -> Self {
        let value = ConstValue::Float(values.iter().copied().collect());
        Self::constant(value)
    }

    /// Integer literal.
    #[must_use]
    pub fn constant_int(value: i32) -> Self {
        Self::constant(ConstValue::Int(value))
    }

    fn constant(value: ConstValue) -> Self {
        Self {
            name: String::new(),
            ty: value.constant_type(),
            array_size: 0,
            semantic: Semantic::Unknown,
            index: 0,
            content: Content::Unknown,
            variability: Variability::empty(),
            kind: ParameterKind::Constant(value),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn ty(&self) -> GpuConstantType {
        self.ty
    }

    /// Array length; 0 for scalars.
    #[inline]
    #[must_use]
    pub fn array_size(&self) -> usize {
        self.array_size
    }

    #[inline]
    #[must_use]
    pub fn semantic(&self) -> Semantic {
        self.semantic
    }

    #[inline]
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn content(&self) -> Content {
        self.content
    }

    #[inline]
    #[must_use]
    pub fn variability(&self) -> Variability {
        self.variability
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }

    #[must_use]
    pub fn auto_constant_info(&self) -> Option<AutoConstant> {
        match self.kind {
            ParameterKind::AutoConstant(auto) => Some(auto),
            _ => None,
        }
    }

    #[must_use]
    pub fn const_value(&self) -> Option<&ConstValue> {
        match &self.kind {
            ParameterKind::Constant(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_uniform(&self) -> bool {
        matches!(
            self.kind,
            ParameterKind::Uniform | ParameterKind::AutoConstant(_)
        )
    }

    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ParameterKind::Constant(_))
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        match self.kind {
            ParameterKind::Input => Direction::In,
            ParameterKind::Output => Direction::Out,
            ParameterKind::Local => Direction::Local,
            _ => Direction::Global,
        }
    }

    /// Sort key used by writers and fingerprints for uniforms:
    /// `(autoType, data, type, name)`; plain uniforms sort ahead of auto-constants.
    #[must_use]
    pub fn uniform_sort_key(&self) -> (Option<AutoConstant>, GpuConstantType, &str) {
        let auto = self.auto_constant_info();
        (auto, self.ty, self.name.as_str())
    }
}
