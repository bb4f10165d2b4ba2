//! Fixed-function lighting.
//!
//! All lighting models evaluate per fragment: the vertex program exports the
//! view-space position and normal, and the fragment program issues one
//! library call per light at `FS_COLOUR_BEGIN + 1`, accumulating into the
//! running colour `oColor_0` (and the specular accumulator when the pass has
//! a highlight).
//!
//! Lights are numbered directional first, then point, then spot:
//!
//! | Light type  | Uniforms (per light `i`)                                          |
//! |-------------|-------------------------------------------------------------------|
//! | directional | position, diffuse, (specular)                                     |
//! | point       | position, attenuation, diffuse, (specular)                        |
//! | spot        | position, direction, attenuation, spot params, diffuse, (specular)|

use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::errors::Result;
use crate::ir::{
    ArithOp, Atom, AutoConstantType, Content, GpuConstantType, Operand, ParameterPtr, Program,
    ProgramSet, stages,
};
use crate::material::{Pass, TrackVertexColour};
use crate::render_state::{
    PreAddContext, SrsTag, SubRenderState, SubRenderStateFactory, execution_order,
    impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::colour::{ColourStages, pass_has_specular};
use super::{float_literal, libs, resolve_view_normal, resolve_view_position, xyz};

/// Property name shared by every lighting model.
pub const LIGHTING_STAGE_PROPERTY: &str = "lighting_stage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

/// Expands `[directional, point, spot]` counts into the light order uniforms
/// are indexed by.
#[must_use]
pub fn light_types(light_count: [u32; 3]) -> Vec<LightType> {
    let [directional, point, spot] = light_count;
    std::iter::repeat_n(LightType::Directional, directional as usize)
        .chain(std::iter::repeat_n(LightType::Point, point as usize))
        .chain(std::iter::repeat_n(LightType::Spot, spot as usize))
        .collect()
}

// ─── Shared lighting state ───────────────────────────────────────────────────

/// Pass-derived inputs every lighting model captures in `pre_add`.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct LightingCore {
    pub light_count: [u32; 3],
    pub specular: bool,
    pub tracking: TrackVertexColour,
}

impl LightingCore {
    /// Captures light count and pass state. Unlit passes opt out.
    pub fn pre_add(&mut self, ctx: &mut PreAddContext, src_pass: &Pass) -> bool {
        if !src_pass.lighting_enabled {
            return false;
        }
        self.light_count = ctx.light_count;
        self.specular = pass_has_specular(src_pass);
        self.tracking = src_pass.vertex_colour_tracking;

        ctx.colour_stages |= ColourStages::VS_OUTPUT_DIFFUSE | ColourStages::PS_INPUT_DIFFUSE;
        if self.specular {
            ctx.colour_stages |= ColourStages::PS_SPECULAR;
        }
        if !self.tracking.is_empty() {
            ctx.colour_stages |= ColourStages::VS_INPUT_DIFFUSE;
        }
        true
    }

    pub fn write_signature(&self, mut state: &mut dyn Hasher) {
        self.light_count.hash(&mut state);
        self.specular.hash(&mut state);
        self.tracking.bits().hash(&mut state);
    }

    /// Exports view-space position and normal from the vertex program and
    /// returns the matching fragment inputs `(position, normal)`.
    pub fn resolve_view_space_inputs(
        &self,
        program_set: &mut ProgramSet,
    ) -> Result<(ParameterPtr, ParameterPtr)> {
        let vs = program_set.vs_mut();
        resolve_view_position(vs)?;
        resolve_view_normal(vs)?;

        let fs = program_set.fs_mut().entry_mut();
        let position = fs.resolve_input_parameter(Content::PositionViewSpace)?;
        let normal = fs.resolve_input_parameter(Content::NormalViewSpace)?;
        Ok((position, normal))
    }

    /// Running colour `oColor_0`, seeded with the ambient and emissive terms.
    pub fn seed_colour(&self, fs: &mut Program) -> Result<ParameterPtr> {
        let stage = stages::FS_COLOUR_BEGIN + 1;
        let diffuse = fs
            .entry_mut()
            .resolve_output_parameter(Content::ColorDiffuse)?;

        if self.tracking.contains(TrackVertexColour::AMBIENT) {
            // Colour stage left the vertex colour in oColor_0.
            let ambient = fs.resolve_auto(AutoConstantType::AmbientLightColour);
            fs.entry_mut().add_atom(
                stage,
                Atom::arith(
                    ArithOp::Mul,
                    xyz(Operand::input(&ambient)),
                    xyz(Operand::input(&diffuse)),
                    xyz(Operand::output(&diffuse)),
                ),
            );
            let emissive = fs.resolve_auto(AutoConstantType::SurfaceEmissiveColour);
            fs.entry_mut().add_atom(
                stage,
                Atom::arith(
                    ArithOp::Add,
                    xyz(Operand::input(&diffuse)),
                    xyz(Operand::input(&emissive)),
                    xyz(Operand::output(&diffuse)),
                ),
            );
        } else {
            let scene = fs.resolve_auto(AutoConstantType::DerivedSceneColour);
            fs.entry_mut().add_atom(
                stage,
                Atom::assign(Operand::input(&scene), Operand::output(&diffuse)),
            );
        }
        Ok(diffuse)
    }

    /// Specular accumulator shared with the colour feature.
    pub fn specular_accumulator(&self, fs: &mut Program) -> ParameterPtr {
        let exists = fs
            .entry()
            .local_by_content(Content::ColorSpecular)
            .is_some();
        let specular = fs
            .entry_mut()
            .resolve_local_parameter(Content::ColorSpecular, GpuConstantType::Float4);
        if !exists {
            fs.entry_mut().add_atom(
                stages::FS_COLOUR_BEGIN + 1,
                Atom::assign(
                    Operand::input(&float_literal(&[0.0, 0.0, 0.0, 0.0])),
                    Operand::output(&specular),
                ),
            );
        }
        specular
    }

    /// Diffuse colour of light `i`, modulated by the vertex colour when the
    /// pass tracks it.
    fn light_diffuse(&self, fs: &mut Program, i: u32) -> Result<ParameterPtr> {
        if !self.tracking.contains(TrackVertexColour::DIFFUSE) {
            return Ok(fs.resolve_auto_indexed(AutoConstantType::DerivedLightDiffuseColour, i));
        }
        let light = fs.resolve_auto_indexed(AutoConstantType::LightDiffuseColour, i);
        let vertex = fs
            .entry_mut()
            .resolve_input_parameter(Content::ColorDiffuse)?;
        let local = fs
            .entry_mut()
            .resolve_local_named(&format!("lLightDiffuse{i}"), GpuConstantType::Float4);
        fs.entry_mut().add_atom(
            stages::FS_COLOUR_BEGIN + 1,
            Atom::arith(
                ArithOp::Mul,
                Operand::input(&light),
                Operand::input(&vertex),
                Operand::output(&local),
            ),
        );
        Ok(local)
    }

    /// Inserts one Blinn-Phong library call per light.
    pub fn emit_phong_lights(
        &self,
        fs: &mut Program,
        normal: &ParameterPtr,
        position: &ParameterPtr,
    ) -> Result<()> {
        fs.add_dependency(libs::FFP_LIGHTING);
        let diffuse = self.seed_colour(fs)?;
        let specular = self.specular.then(|| self.specular_accumulator(fs));
        let shininess = self
            .specular
            .then(|| fs.resolve_auto(AutoConstantType::SurfaceShininess));

        for (i, light) in (0u32..).zip(light_types(self.light_count)) {
            let light_position = fs.resolve_auto_indexed(AutoConstantType::LightPositionViewSpace, i);
            let light_diffuse = self.light_diffuse(fs, i)?;

            let mut operands: SmallVec<[Operand; 6]> = SmallVec::new();
            let function = match light {
                LightType::Directional => {
                    operands.push(Operand::input(normal));
                    if specular.is_some() {
                        operands.push(Operand::input(position));
                    }
                    operands.push(xyz(Operand::input(&light_position)));
                    "FFP_Light_Directional"
                }
                LightType::Point => {
                    let attenuation = fs.resolve_auto_indexed(AutoConstantType::LightAttenuation, i);
                    operands.push(Operand::input(position));
                    operands.push(Operand::input(normal));
                    operands.push(xyz(Operand::input(&light_position)));
                    operands.push(Operand::input(&attenuation));
                    "FFP_Light_Point"
                }
                LightType::Spot => {
                    let direction =
                        fs.resolve_auto_indexed(AutoConstantType::LightDirectionViewSpace, i);
                    let attenuation = fs.resolve_auto_indexed(AutoConstantType::LightAttenuation, i);
                    let spot = fs.resolve_auto_indexed(AutoConstantType::SpotlightParams, i);
                    operands.push(Operand::input(position));
                    operands.push(Operand::input(normal));
                    operands.push(xyz(Operand::input(&light_position)));
                    operands.push(xyz(Operand::input(&direction)));
                    operands.push(Operand::input(&attenuation));
                    operands.push(Operand::input(&spot));
                    "FFP_Light_Spot"
                }
            };
            operands.push(xyz(Operand::input(&light_diffuse)));

            let suffix = match (&specular, &shininess) {
                (Some(specular), Some(shininess)) => {
                    let light_specular =
                        fs.resolve_auto_indexed(AutoConstantType::DerivedLightSpecularColour, i);
                    operands.push(xyz(Operand::input(&light_specular)));
                    operands.push(Operand::input(shininess));
                    operands.push(xyz(Operand::inout(&diffuse)));
                    operands.push(xyz(Operand::inout(specular)));
                    "_DiffuseSpecular"
                }
                _ => {
                    operands.push(xyz(Operand::inout(&diffuse)));
                    "_Diffuse"
                }
            };

            fs.entry_mut().add_atom(
                stages::FS_COLOUR_BEGIN + 1,
                Atom::invoke(&format!("{function}{suffix}"), operands),
            );
        }
        Ok(())
    }
}

// ─── FfpLighting ─────────────────────────────────────────────────────────────

/// Blinn-Phong lighting on the interpolated normal.
#[derive(Debug, Clone, Default)]
pub struct FfpLighting {
    core: LightingCore,
}

impl FfpLighting {
    /// `[directional, point, spot]` counts captured from the render state.
    #[must_use]
    pub fn light_count(&self) -> [u32; 3] {
        self.core.light_count
    }
}

impl SubRenderState for FfpLighting {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::FfpLighting
    }

    fn execution_order(&self) -> i32 {
        execution_order::LIGHTING
    }

    fn pre_add_to_render_state(
        &mut self,
        ctx: &mut PreAddContext,
        src_pass: &Pass,
        _dst_pass: &mut Pass,
    ) -> bool {
        self.core.pre_add(ctx, src_pass)
    }

    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()> {
        let (position, normal) = self.core.resolve_view_space_inputs(program_set)?;
        self.core
            .emit_phong_lights(program_set.fs_mut(), &normal, &position)
    }

    fn write_signature(&self, state: &mut dyn Hasher) {
        self.core.write_signature(state);
    }

    impl_srs_boilerplate!();
}

/// Factory of [`FfpLighting`]. Script: `lighting_stage ffp`.
#[derive(Debug, Default)]
pub struct FfpLightingFactory;

impl SubRenderStateFactory for FfpLightingFactory {
    fn type_name(&self) -> &str {
        SrsTag::FfpLighting.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(FfpLighting::default())
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        _translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        (node.name == LIGHTING_STAGE_PROPERTY && node.value(0) == Some("ffp"))
            .then(|| self.create_instance())
    }

    fn write_instance(
        &self,
        serializer: &mut ScriptSerializer,
        _srs: &dyn SubRenderState,
        _src_pass: &Pass,
        _dst_pass: &Pass,
    ) {
        serializer.write_attribute(LIGHTING_STAGE_PROPERTY, &["ffp"]);
    }
}

#[cfg(test)]
pub(crate) fn has_uniform(program: &Program, name: &str) -> bool {
    program.uniforms().iter().any(|u| u.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::VertexElements;

    fn generate(light_count: [u32; 3], pass: &Pass) -> ProgramSet {
        let mut lighting = FfpLighting::default();
        let mut ctx = PreAddContext::new(light_count);
        let mut dst = pass.clone();
        assert!(lighting.pre_add_to_render_state(&mut ctx, pass, &mut dst));
        let mut set = ProgramSet::new(pass.vertex_layout);
        lighting.create_cpu_sub_programs(&mut set).unwrap();
        set
    }

    #[test]
    fn light_order_is_directional_point_spot() {
        assert_eq!(
            light_types([1, 2, 1]),
            [
                LightType::Directional,
                LightType::Point,
                LightType::Point,
                LightType::Spot
            ]
        );
    }

    #[test]
    fn one_directional_light() {
        let set = generate([1, 0, 0], &Pass::new());

        assert!(has_uniform(set.vs(), "worldview_matrix"));
        assert!(has_uniform(set.fs(), "light_position_view_space0"));
        assert!(!has_uniform(set.fs(), "light_attenuation0"));

        let calls: Vec<&str> = set
            .fs()
            .entry()
            .stage_atoms(stages::FS_COLOUR_BEGIN + 1)
            .iter()
            .filter_map(Atom::function_name)
            .collect();
        assert_eq!(calls, ["FFP_Light_Directional_Diffuse"]);
    }

    #[test]
    fn specular_pass_uses_specular_variants() {
        let mut pass = Pass::new();
        pass.shininess = 20.0;
        pass.specular = glam::Vec4::ONE;
        let set = generate([0, 1, 1], &pass);
        let calls: Vec<&str> = set
            .fs()
            .entry()
            .atoms()
            .filter_map(|(_, a)| a.function_name())
            .collect();
        assert_eq!(
            calls,
            ["FFP_Light_Point_DiffuseSpecular", "FFP_Light_Spot_DiffuseSpecular"]
        );
        assert!(has_uniform(set.fs(), "spotlight_params1"));
        assert!(has_uniform(set.fs(), "surface_shininess"));
    }

    #[test]
    fn unlit_pass_opts_out() {
        let mut pass = Pass::new();
        pass.lighting_enabled = false;
        let mut dst = pass.clone();
        let mut lighting = FfpLighting::default();
        assert!(!lighting.pre_add_to_render_state(&mut PreAddContext::default(), &pass, &mut dst));
    }

    #[test]
    fn missing_normal_fails_to_resolve() {
        let mut lighting = FfpLighting::default();
        let mut set = ProgramSet::new(VertexElements::POSITION);
        assert!(lighting
            .create_cpu_sub_programs(&mut set)
            .unwrap_err()
            .is_resolve_failure());
    }

    #[test]
    fn light_count_is_captured() {
        let mut lighting = FfpLighting::default();
        let pass = Pass::new();
        let mut dst = pass.clone();
        lighting.pre_add_to_render_state(&mut PreAddContext::new([2, 1, 0]), &pass, &mut dst);
        assert_eq!(lighting.light_count(), [2, 1, 0]);
    }
}
