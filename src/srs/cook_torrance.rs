//! Physically based lighting (Cook-Torrance BRDF, metal / roughness workflow).

use std::hash::{Hash, Hasher};

use crate::errors::Result;
use crate::ir::{
    ArithOp, Atom, AutoConstantType, Content, GpuConstantType, Operand, OperandMask, ProgramSet,
    stages,
};
use crate::material::{Pass, TrackVertexColour};
use crate::render_state::{
    PreAddContext, SrsTag, SubRenderState, SubRenderStateFactory, execution_order,
    impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::lighting::{LIGHTING_STAGE_PROPERTY, LightingCore, light_types};
use super::{float_literal, forward_texcoord, libs, resolve_normalised_view_normal, xyz};

/// Cook-Torrance lighting.
///
/// Roughness and metalness come from the green and blue channels of an
/// optional texture, or from two constants.
#[derive(Debug, Clone)]
pub struct CookTorranceLighting {
    core: LightingCore,
    metal_roughness_map: Option<String>,
    metalness: f32,
    roughness: f32,
    sampler_index: u32,
}

impl Default for CookTorranceLighting {
    fn default() -> Self {
        Self::new()
    }
}

impl CookTorranceLighting {
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: LightingCore::default(),
            metal_roughness_map: None,
            metalness: 0.0,
            roughness: 1.0,
            sampler_index: 0,
        }
    }

    #[must_use]
    pub fn metal_roughness_map(&self) -> Option<&str> {
        self.metal_roughness_map.as_deref()
    }

    pub fn set_metal_roughness_map(&mut self, texture: Option<&str>) {
        self.metal_roughness_map = texture.map(str::to_string);
    }

    /// `(metalness, roughness)` used when no map is set.
    #[must_use]
    pub fn metal_roughness(&self) -> (f32, f32) {
        (self.metalness, self.roughness)
    }

    pub fn set_metal_roughness(&mut self, metalness: f32, roughness: f32) {
        self.metalness = metalness.clamp(0.0, 1.0);
        self.roughness = roughness.clamp(0.0, 1.0);
    }
}

impl SubRenderState for CookTorranceLighting {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::CookTorranceLighting
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
        if !self.core.pre_add(ctx, src_pass) {
            return false;
        }
        // The BRDF has its own highlight; no separate specular accumulator.
        self.core.specular = false;
        if let Some(map) = &self.metal_roughness_map {
            self.sampler_index = dst_pass.create_texture_unit_state(map) as u32;
        }
        true
    }

    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()> {
        let (position, _) = self.core.resolve_view_space_inputs(program_set)?;
        let uv_out = match self.metal_roughness_map {
            Some(_) => Some(forward_texcoord(program_set.vs_mut(), 0)?),
            None => None,
        };

        let fs = program_set.fs_mut();
        fs.add_dependency(libs::SGX_COOK_TORRANCE);
        let normal = resolve_normalised_view_normal(fs)?;

        // Material parameters, packed as (roughness, metalness).
        let params = fs
            .entry_mut()
            .resolve_local_named("lMetalRoughness", GpuConstantType::Float2);
        match uv_out {
            Some(uv_out) => {
                let uv = fs
                    .entry_mut()
                    .resolve_input_parameter_typed(Content::TextureCoordinate(0), uv_out.ty())?;
                let sampler = fs.resolve_sampler(GpuConstantType::Sampler2D, self.sampler_index)?;
                let texel = fs
                    .entry_mut()
                    .resolve_local_named("lMetalRoughnessTexel", GpuConstantType::Float4);
                fs.entry_mut().add_atom(
                    stages::FS_SAMPLING,
                    Atom::sample(
                        Operand::input(&sampler),
                        Operand::input(&uv),
                        Operand::output(&texel),
                    ),
                );
                fs.entry_mut().add_atom(
                    stages::FS_SAMPLING,
                    Atom::assign(
                        Operand::input(&texel).with_mask(OperandMask::Y | OperandMask::Z),
                        Operand::output(&params),
                    ),
                );
            }
            None => {
                let constant = float_literal(&[self.roughness, self.metalness]);
                fs.entry_mut().add_atom(
                    stages::FS_SAMPLING,
                    Atom::assign(Operand::input(&constant), Operand::output(&params)),
                );
            }
        }

        let base = if self.core.tracking.contains(TrackVertexColour::DIFFUSE) {
            fs.entry_mut()
                .resolve_input_parameter(Content::ColorDiffuse)?
        } else {
            fs.resolve_auto(AutoConstantType::SurfaceDiffuseColour)
        };
        let diffuse = fs
            .entry_mut()
            .resolve_output_parameter(Content::ColorDiffuse)?;
        let ambient = fs.resolve_auto(AutoConstantType::AmbientLightColour);

        let stage = stages::FS_COLOUR_BEGIN + 1;
        fs.entry_mut().add_atom(
            stage,
            Atom::arith(
                ArithOp::Mul,
                xyz(Operand::input(&ambient)),
                xyz(Operand::input(&base)),
                xyz(Operand::output(&diffuse)),
            ),
        );
        fs.entry_mut().add_atom(
            stage,
            Atom::assign(
                Operand::input(&base).with_mask(OperandMask::W),
                Operand::output(&diffuse).with_mask(OperandMask::W),
            ),
        );

        for (i, _) in (0u32..).zip(light_types(self.core.light_count)) {
            let light_position = fs.resolve_auto_indexed(AutoConstantType::LightPositionViewSpace, i);
            let light_direction =
                fs.resolve_auto_indexed(AutoConstantType::LightDirectionViewSpace, i);
            let light_colour = fs.resolve_auto_indexed(AutoConstantType::LightDiffuseColour, i);
            let attenuation = fs.resolve_auto_indexed(AutoConstantType::LightAttenuation, i);
            let spot = fs.resolve_auto_indexed(AutoConstantType::SpotlightParams, i);

            fs.entry_mut().add_atom(
                stage,
                Atom::invoke(
                    "PBR_Light",
                    [
                        Operand::input(&normal),
                        Operand::input(&position),
                        Operand::input(&light_position),
                        xyz(Operand::input(&light_direction)),
                        xyz(Operand::input(&light_colour)),
                        Operand::input(&attenuation),
                        Operand::input(&spot),
                        xyz(Operand::input(&base)),
                        Operand::input(&params),
                        xyz(Operand::inout(&diffuse)),
                    ],
                ),
            );
        }
        Ok(())
    }

    fn write_signature(&self, mut state: &mut dyn Hasher) {
        self.core.write_signature(state);
        self.metal_roughness_map.hash(&mut state);
        self.metalness.to_bits().hash(&mut state);
        self.roughness.to_bits().hash(&mut state);
        self.sampler_index.hash(&mut state);
    }

    impl_srs_boilerplate!();
}

/// Factory of [`CookTorranceLighting`].
/// Script: `lighting_stage metal_roughness [texture <name>] [value <metal> <rough>]`.
#[derive(Debug, Default)]
pub struct CookTorranceLightingFactory;

impl SubRenderStateFactory for CookTorranceLightingFactory {
    fn type_name(&self) -> &str {
        SrsTag::CookTorranceLighting.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(CookTorranceLighting::new())
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        if node.name != LIGHTING_STAGE_PROPERTY || node.value(0) != Some("metal_roughness") {
            return None;
        }
        let mut srs = CookTorranceLighting::new();
        let mut i = 1;
        while let Some(option) = node.value(i) {
            match option {
                "texture" => {
                    let Some(texture) = node.value(i + 1) else {
                        translator.error(node, "metal_roughness texture expects a name");
                        return None;
                    };
                    srs.metal_roughness_map = Some(texture.to_string());
                    i += 2;
                }
                "value" => {
                    let metalness = translator.parse_f32(node, i + 1)?;
                    let roughness = translator.parse_f32(node, i + 2)?;
                    srs.set_metal_roughness(metalness, roughness);
                    i += 3;
                }
                other => {
                    translator.error(node, format!("unknown metal_roughness option '{other}'"));
                    return None;
                }
            }
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
        let Some(srs) = srs.downcast_ref::<CookTorranceLighting>() else {
            return;
        };
        match &srs.metal_roughness_map {
            Some(texture) => serializer.write_attribute(
                LIGHTING_STAGE_PROPERTY,
                &["metal_roughness", "texture", texture.as_str()],
            ),
            None => {
                let metalness = srs.metalness.to_string();
                let roughness = srs.roughness.to_string();
                serializer.write_attribute(
                    LIGHTING_STAGE_PROPERTY,
                    &["metal_roughness", "value", metalness.as_str(), roughness.as_str()],
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(srs: &mut CookTorranceLighting, light_count: [u32; 3]) -> (ProgramSet, Pass) {
        let pass = Pass::new();
        let mut dst = pass.clone();
        assert!(srs.pre_add_to_render_state(&mut PreAddContext::new(light_count), &pass, &mut dst));
        let mut set = ProgramSet::new(pass.vertex_layout);
        srs.create_cpu_sub_programs(&mut set).unwrap();
        (set, dst)
    }

    #[test]
    fn one_pbr_call_per_light() {
        let mut srs = CookTorranceLighting::new();
        let (set, _) = generate(&mut srs, [1, 1, 0]);
        let calls = set
            .fs()
            .entry()
            .stage_atoms(stages::FS_COLOUR_BEGIN + 1)
            .iter()
            .filter(|a| a.function_name() == Some("PBR_Light"))
            .count();
        assert_eq!(calls, 2);
        assert!(set.fs().uniforms().iter().any(|u| u.name() == "light_attenuation1"));
    }

    #[test]
    fn texture_adds_sampler_and_unit() {
        let mut srs = CookTorranceLighting::new();
        srs.set_metal_roughness_map(Some("rock_orm.png"));
        let (set, dst) = generate(&mut srs, [1, 0, 0]);
        assert_eq!(dst.texture_units.len(), 1);
        assert!(set.fs().uniforms().iter().any(|u| u.name() == "gTextureSampler0"));
        assert!(set
            .vs()
            .entry()
            .output_by_content(Content::TextureCoordinate(0))
            .is_some());
    }

    #[test]
    fn parameters_are_clamped() {
        let mut srs = CookTorranceLighting::new();
        srs.set_metal_roughness(2.0, -1.0);
        assert_eq!(srs.metal_roughness(), (1.0, 0.0));
    }
}
