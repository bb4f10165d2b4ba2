//! Normal-map lighting.

use std::hash::{Hash, Hasher};

use crate::errors::Result;
use crate::ir::{
    Atom, AutoConstantType, Content, GpuConstantType, Operand, ProgramSet, stages,
};
use crate::material::Pass;
use crate::render_state::{
    PreAddContext, SrsTag, SubRenderState, SubRenderStateFactory, execution_order,
    impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::lighting::{LIGHTING_STAGE_PROPERTY, LightingCore};
use super::{forward_texcoord, libs, resolve_view_normal, resolve_view_position, xyz};

/// Space the normal map texels are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NormalMapSpace {
    #[default]
    Tangent,
    Object,
}

impl NormalMapSpace {
    #[must_use]
    pub fn script_name(self) -> &'static str {
        match self {
            Self::Tangent => "tangent_space",
            Self::Object => "object_space",
        }
    }
}

/// Blinn-Phong lighting with the normal fetched from a normal map.
///
/// The map is added to the destination pass as an extra texture unit; its
/// sampler index is whatever slot that unit lands in.
#[derive(Debug, Clone, Default)]
pub struct NormalMapLighting {
    core: LightingCore,
    texture_name: String,
    space: NormalMapSpace,
    tex_coord_index: u8,
    sampler_index: u32,
}

impl NormalMapLighting {
    #[must_use]
    pub fn new(texture_name: &str) -> Self {
        Self {
            texture_name: texture_name.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn texture_name(&self) -> &str {
        &self.texture_name
    }

    pub fn set_texture_name(&mut self, name: &str) {
        self.texture_name = name.to_string();
    }

    #[must_use]
    pub fn space(&self) -> NormalMapSpace {
        self.space
    }

    pub fn set_space(&mut self, space: NormalMapSpace) {
        self.space = space;
    }

    #[must_use]
    pub fn tex_coord_index(&self) -> u8 {
        self.tex_coord_index
    }

    pub fn set_tex_coord_index(&mut self, index: u8) {
        self.tex_coord_index = index;
    }
}

impl SubRenderState for NormalMapLighting {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::NormalMapLighting
    }

    fn execution_order(&self) -> i32 {
        execution_order::LIGHTING
    }

    fn pre_add_to_render_state(
        &mut self,
        ctx: &mut PreAddContext,
        src_pass: &Pass,
        dst_pass: &mut Pass,
    ) -> bool {
        if self.texture_name.is_empty() {
            log::warn!("Normal map lighting without a texture; skipped");
            return false;
        }
        if !self.core.pre_add(ctx, src_pass) {
            return false;
        }
        let unit = dst_pass.create_texture_unit_state(&self.texture_name);
        if let Some(state) = dst_pass.texture_units.get_mut(unit) {
            state.tex_coord_set = self.tex_coord_index;
        }
        self.sampler_index = unit as u32;
        true
    }

    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()> {
        // ── Vertex program ───────────────────────────────────────────────────
        let vs = program_set.vs_mut();
        resolve_view_position(vs)?;
        let uv_out = forward_texcoord(vs, self.tex_coord_index)?;
        if self.space == NormalMapSpace::Tangent {
            resolve_view_normal(vs)?;
            if vs.entry().output_by_content(Content::TangentViewSpace).is_none() {
                let tangent = vs
                    .entry_mut()
                    .resolve_input_parameter(Content::TangentObjectSpace)?;
                let out = vs
                    .entry_mut()
                    .resolve_output_parameter(Content::TangentViewSpace)?;
                let world_view = vs.resolve_auto(AutoConstantType::WorldViewMatrix);
                vs.entry_mut().add_atom(
                    stages::VS_LIGHTING,
                    Atom::invoke(
                        "FFP_TransformNormal",
                        [
                            Operand::input(&world_view),
                            xyz(Operand::input(&tangent)),
                            Operand::output(&out),
                        ],
                    ),
                );
            }
        }

        // ── Fragment program ─────────────────────────────────────────────────
        let fs = program_set.fs_mut();
        fs.add_dependency(libs::SGX_NORMAL_MAP);

        let position = fs
            .entry_mut()
            .resolve_input_parameter(Content::PositionViewSpace)?;
        let uv = fs.entry_mut().resolve_input_parameter_typed(
            Content::TextureCoordinate(self.tex_coord_index),
            uv_out.ty(),
        )?;
        let sampler = fs.resolve_sampler(GpuConstantType::Sampler2D, self.sampler_index)?;
        let texel = fs
            .entry_mut()
            .resolve_local_parameter(Content::NormalTangentSpace, GpuConstantType::Float4);
        let normal = fs
            .entry_mut()
            .resolve_local_parameter(Content::NormalViewSpace, GpuConstantType::Float3);

        fs.entry_mut().add_atom(
            stages::FS_SAMPLING,
            Atom::sample(Operand::input(&sampler), Operand::input(&uv), Operand::output(&texel)),
        );

        let perturb = match self.space {
            NormalMapSpace::Tangent => {
                let interpolated = fs
                    .entry_mut()
                    .resolve_input_parameter(Content::NormalViewSpace)?;
                let tangent = fs
                    .entry_mut()
                    .resolve_input_parameter(Content::TangentViewSpace)?;
                Atom::invoke(
                    "SGX_Generate_Normal",
                    [
                        Operand::input(&interpolated),
                        Operand::input(&tangent),
                        xyz(Operand::input(&texel)),
                        Operand::output(&normal),
                    ],
                )
            }
            NormalMapSpace::Object => {
                let matrix = fs.resolve_auto(AutoConstantType::InverseTransposeWorldViewMatrix);
                Atom::invoke(
                    "SGX_TransformNormalMap",
                    [
                        Operand::input(&matrix),
                        xyz(Operand::input(&texel)),
                        Operand::output(&normal),
                    ],
                )
            }
        };
        fs.entry_mut().add_atom(stages::FS_SAMPLING, perturb);

        self.core.emit_phong_lights(fs, &normal, &position)
    }

    fn write_signature(&self, mut state: &mut dyn Hasher) {
        self.core.write_signature(state);
        self.texture_name.hash(&mut state);
        self.space.hash(&mut state);
        self.tex_coord_index.hash(&mut state);
        self.sampler_index.hash(&mut state);
    }

    impl_srs_boilerplate!();
}

/// Factory of [`NormalMapLighting`].
/// Script: `lighting_stage normal_map <texture> [tangent_space|object_space] [<texcoord>]`.
#[derive(Debug, Default)]
pub struct NormalMapLightingFactory;

impl SubRenderStateFactory for NormalMapLightingFactory {
    fn type_name(&self) -> &str {
        SrsTag::NormalMapLighting.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(NormalMapLighting::default())
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        if node.name != LIGHTING_STAGE_PROPERTY || node.value(0) != Some("normal_map") {
            return None;
        }
        let Some(texture) = node.value(1) else {
            translator.error(node, "normal_map expects a texture name");
            return None;
        };
        let mut srs = NormalMapLighting::new(texture);
        match node.value(2) {
            None | Some("tangent_space") => {}
            Some("object_space") => srs.space = NormalMapSpace::Object,
            Some(other) => {
                translator.error(node, format!("unknown normal map space '{other}'"));
                return None;
            }
        }
        if node.value(3).is_some() {
            let index = translator.parse_u32(node, 3)?;
            srs.tex_coord_index = u8::try_from(index).unwrap_or(u8::MAX).min(7);
        }
        Some(Box::new(srs))
    }

    fn write_instance(
        &self,
        serializer: &mut ScriptSerializer,
        srs: &dyn SubRenderState,
        _src_pass: &Pass,
        _dst_pass: &Pass,
    ) {
        let Some(srs) = srs.downcast_ref::<NormalMapLighting>() else {
            return;
        };
        let index = srs.tex_coord_index.to_string();
        serializer.write_attribute(
            LIGHTING_STAGE_PROPERTY,
            &["normal_map", srs.texture_name.as_str(), srs.space.script_name(), index.as_str()],
        );
    }
}
