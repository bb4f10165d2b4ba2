//! Material Model
//!
//! The shader generator does not own materials; it reads and rewrites the
//! fixed-function description the engine's material system keeps. This module
//! is that description, reduced to what generation consumes:
//!
//! - [`MaterialLibrary`]: materials by name
//! - [`Material`]: one technique per scheme
//! - [`Technique`]: ordered passes
//! - [`Pass`]: fixed-function state, texture units, bound programs
//!
//! # Example
//!
//! ```rust,ignore
//! let mut library = MaterialLibrary::new();
//! let material = library.create("Rock");
//! let pass = material.create_technique(DEFAULT_SCHEME_NAME).create_pass();
//! pass.lighting_enabled = true;
//! pass.create_texture_unit_state("rock_albedo.png");
//! ```

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use glam::Vec4;

use crate::external::ExternalProgramId;
use crate::ir::{GpuConstantType, VertexElements};
use crate::program_manager::ProgramHandle;

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Comparison used by the alpha-reject test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    AlwaysFail,
    #[default]
    AlwaysPass,
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
}

impl CompareFunction {
    /// Integer code passed to `FFP_Alpha_Test`.
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn script_name(self) -> &'static str {
        match self {
            Self::AlwaysFail => "always_fail",
            Self::AlwaysPass => "always_pass",
            Self::Less => "less",
            Self::LessEqual => "less_equal",
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::GreaterEqual => "greater_equal",
            Self::Greater => "greater",
        }
    }
}

/// How a texture unit combines with the running colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayerBlendOperation {
    #[default]
    Modulate,
    Replace,
    Add,
    AddSigned,
    Subtract,
    BlendDiffuseAlpha,
    BlendTextureAlpha,
    BlendCurrentAlpha,
}

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    Tex1D,
    #[default]
    Tex2D,
    Tex3D,
    Cube,
    Tex2DArray,
    ExternalOes,
}

impl TextureType {
    /// Sampler type a unit of this texture type is declared with.
    #[must_use]
    pub fn sampler_type(self) -> GpuConstantType {
        match self {
            Self::Tex1D => GpuConstantType::Sampler1D,
            Self::Tex2D => GpuConstantType::Sampler2D,
            Self::Tex3D => GpuConstantType::Sampler3D,
            Self::Cube => GpuConstantType::SamplerCube,
            Self::Tex2DArray => GpuConstantType::Sampler2DArray,
            Self::ExternalOes => GpuConstantType::SamplerExternalOes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    Point,
    #[default]
    Linear,
    Anisotropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureAddressMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    Border,
}

/// Blend factor of the frame-buffer blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneBlendFactor {
    One,
    Zero,
    DestColour,
    SourceColour,
    OneMinusDestColour,
    OneMinusSourceColour,
    DestAlpha,
    SourceAlpha,
    OneMinusDestAlpha,
    OneMinusSourceAlpha,
}

/// Separate colour / alpha blend factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneBlend {
    pub source: SceneBlendFactor,
    pub dest: SceneBlendFactor,
    pub source_alpha: SceneBlendFactor,
    pub dest_alpha: SceneBlendFactor,
}

impl Default for SceneBlend {
    fn default() -> Self {
        Self {
            source: SceneBlendFactor::One,
            dest: SceneBlendFactor::Zero,
            source_alpha: SceneBlendFactor::One,
            dest_alpha: SceneBlendFactor::Zero,
        }
    }
}

/// Fog falloff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FogMode {
    #[default]
    None,
    Linear,
    Exp,
    Exp2,
}

impl FogMode {
    #[must_use]
    pub fn script_name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Linear => "linear",
            Self::Exp => "exp",
            Self::Exp2 => "exp2",
        }
    }
}

bitflags! {
    /// Surface colours taken from the vertex colour instead of the material.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TrackVertexColour: u8 {
        const AMBIENT  = 1 << 0;
        const DIFFUSE  = 1 << 1;
        const SPECULAR = 1 << 2;
        const EMISSIVE = 1 << 3;
    }
}

// ─── TextureUnitState ────────────────────────────────────────────────────────

/// One texture unit of a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureUnitState {
    pub name: String,
    pub texture_name: String,
    pub texture_type: TextureType,
    pub tex_coord_set: u8,
    pub colour_op: LayerBlendOperation,
    pub filter: TextureFilter,
    pub address_mode: TextureAddressMode,
    /// Whether a texture matrix (scroll / rotate / scale) is applied.
    pub has_transform: bool,
}

impl TextureUnitState {
    #[must_use]
    pub fn new(texture_name: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            texture_name: texture_name.into(),
            texture_type: TextureType::Tex2D,
            tex_coord_set: 0,
            colour_op: LayerBlendOperation::Modulate,
            filter: TextureFilter::Linear,
            address_mode: TextureAddressMode::Wrap,
            has_transform: false,
        }
    }

    fn hash_state<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.texture_name.hash(state);
        self.texture_type.hash(state);
        self.tex_coord_set.hash(state);
        self.colour_op.hash(state);
        self.filter.hash(state);
        self.address_mode.hash(state);
        self.has_transform.hash(state);
    }
}

// ─── Bound programs ──────────────────────────────────────────────────────────

/// A generated program bound to a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundProgram {
    pub handle: ProgramHandle,
    pub name: String,
    pub external: ExternalProgramId,
}

/// Programs bound to a pass's vertex and fragment stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassPrograms {
    pub vertex: Option<BoundProgram>,
    pub fragment: Option<BoundProgram>,
}

// ─── Pass ────────────────────────────────────────────────────────────────────

/// Fixed-function rendering pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub lighting_enabled: bool,
    pub vertex_colour_tracking: TrackVertexColour,
    pub alpha_reject_function: CompareFunction,
    pub alpha_reject_value: u8,
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub emissive: Vec4,
    pub shininess: f32,
    pub fog_mode: FogMode,
    pub scene_blend: SceneBlend,
    pub transparent_sorting: bool,
    /// Vertex attributes the meshes rendered with this pass provide.
    pub vertex_layout: VertexElements,
    pub texture_units: Vec<TextureUnitState>,
    /// Hand-written programs of the source pass (not generated).
    pub has_user_programs: bool,
    /// Programs installed by the shader generator.
    pub programs: PassPrograms,
}

impl Default for Pass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lighting_enabled: true,
            vertex_colour_tracking: TrackVertexColour::empty(),
            alpha_reject_function: CompareFunction::AlwaysPass,
            alpha_reject_value: 0,
            ambient: Vec4::ONE,
            diffuse: Vec4::ONE,
            specular: Vec4::new(0.0, 0.0, 0.0, 1.0),
            emissive: Vec4::new(0.0, 0.0, 0.0, 1.0),
            shininess: 0.0,
            fog_mode: FogMode::None,
            scene_blend: SceneBlend::default(),
            transparent_sorting: true,
            vertex_layout: VertexElements::POSITION
                | VertexElements::NORMAL
                | VertexElements::TEXCOORD0,
            texture_units: Vec::new(),
            has_user_programs: false,
            programs: PassPrograms::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn lighting_enabled(&self) -> bool {
        self.lighting_enabled
    }

    #[inline]
    #[must_use]
    pub fn vertex_colour_tracking(&self) -> TrackVertexColour {
        self.vertex_colour_tracking
    }

    #[inline]
    #[must_use]
    pub fn alpha_reject_function(&self) -> CompareFunction {
        self.alpha_reject_function
    }

    #[inline]
    #[must_use]
    pub fn texture_units(&self) -> &[TextureUnitState] {
        &self.texture_units
    }

    /// Appends a texture unit sampling `texture_name`; returns its index.
    pub fn create_texture_unit_state(&mut self, texture_name: &str) -> usize {
        self.texture_units.push(TextureUnitState::new(texture_name));
        self.texture_units.len() - 1
    }

    /// Sets separate colour and alpha blend factors.
    pub fn set_separate_scene_blending(
        &mut self,
        source: SceneBlendFactor,
        dest: SceneBlendFactor,
        source_alpha: SceneBlendFactor,
        dest_alpha: SceneBlendFactor,
    ) {
        self.scene_blend = SceneBlend {
            source,
            dest,
            source_alpha,
            dest_alpha,
        };
    }

    pub fn set_transparent_sorting_enabled(&mut self, enabled: bool) {
        self.transparent_sorting = enabled;
    }

    /// Whether generated programs are currently bound.
    #[must_use]
    pub fn has_generated_programs(&self) -> bool {
        self.programs.vertex.is_some() || self.programs.fragment.is_some()
    }

    /// Hashes the fixed-function state generation depends on. Bound programs
    /// are excluded.
    pub fn hash_state<H: Hasher>(&self, state: &mut H) {
        self.lighting_enabled.hash(state);
        self.vertex_colour_tracking.hash(state);
        self.alpha_reject_function.hash(state);
        self.alpha_reject_value.hash(state);
        for colour in [self.ambient, self.diffuse, self.specular, self.emissive] {
            for c in colour.to_array() {
                c.to_bits().hash(state);
            }
        }
        self.shininess.to_bits().hash(state);
        self.fog_mode.hash(state);
        self.scene_blend.hash(state);
        self.transparent_sorting.hash(state);
        self.vertex_layout.hash(state);
        self.has_user_programs.hash(state);
        self.texture_units.len().hash(state);
        for unit in &self.texture_units {
            unit.hash_state(state);
        }
    }
}

// ─── Technique / Material ────────────────────────────────────────────────────

/// Ordered passes rendered for one scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct Technique {
    pub scheme: String,
    pub passes: Vec<Pass>,
    /// Cleared when generation failed; the engine then renders the source
    /// technique instead.
    pub supported: bool,
    /// Set on techniques created by the shader generator.
    pub generated: bool,
}

impl Technique {
    #[must_use]
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            passes: Vec::new(),
            supported: true,
            generated: false,
        }
    }

    /// Appends a default pass and returns it.
    pub fn create_pass(&mut self) -> &mut Pass {
        self.passes.push(Pass::new());
        let last = self.passes.len() - 1;
        &mut self.passes[last]
    }
}

/// Named material with one technique per scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub techniques: Vec<Technique>,
}

impl Material {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            techniques: Vec::new(),
        }
    }

    #[must_use]
    pub fn technique(&self, scheme: &str) -> Option<&Technique> {
        self.techniques.iter().find(|t| t.scheme == scheme)
    }

    pub fn technique_mut(&mut self, scheme: &str) -> Option<&mut Technique> {
        self.techniques.iter_mut().find(|t| t.scheme == scheme)
    }

    /// Returns the technique of `scheme`, creating an empty one if needed.
    pub fn create_technique(&mut self, scheme: &str) -> &mut Technique {
        if let Some(pos) = self.techniques.iter().position(|t| t.scheme == scheme) {
            return &mut self.techniques[pos];
        }
        self.techniques.push(Technique::new(scheme));
        let last = self.techniques.len() - 1;
        &mut self.techniques[last]
    }

    /// Removes the technique of `scheme`, returning it.
    pub fn remove_technique(&mut self, scheme: &str) -> Option<Technique> {
        let pos = self.techniques.iter().position(|t| t.scheme == scheme)?;
        Some(self.techniques.remove(pos))
    }
}

/// All materials known to the engine, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    materials: BTreeMap<String, Material>,
}

impl MaterialLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) the material `name` and returns it.
    pub fn create(&mut self, name: &str) -> &mut Material {
        let slot = self
            .materials
            .entry(name.to_string())
            .or_insert_with(|| Material::new(name));
        *slot = Material::new(name);
        slot
    }

    pub fn insert(&mut self, material: Material) {
        self.materials.insert(material.name.clone(), material);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Material> {
        self.materials.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Material> {
        self.materials.remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.materials.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.materials.keys().map(String::as_str)
    }
}
