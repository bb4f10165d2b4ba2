//! Fixed-function fog.

use std::hash::{Hash, Hasher};

use crate::errors::Result;
use crate::ir::{
    Atom, AutoConstantType, Builtin, Content, Operand, ParameterPtr, Program, ProgramSet, stages,
};
use crate::material::{FogMode, Pass};
use crate::render_state::{
    PreAddContext, SrsTag, SubRenderState, SubRenderStateFactory, execution_order,
    impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::{libs, xyz};

/// Where the fog factor is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FogCalcMode {
    #[default]
    PerVertex,
    PerPixel,
}

impl FogCalcMode {
    #[must_use]
    pub fn script_name(self) -> &'static str {
        match self {
            Self::PerVertex => "per_vertex",
            Self::PerPixel => "per_pixel",
        }
    }
}

/// Blends the running colour towards the fog colour by distance.
#[derive(Debug, Clone, Default)]
pub struct FfpFog {
    calc_mode: FogCalcMode,
    fog_mode: FogMode,
}

impl FfpFog {
    #[must_use]
    pub fn new(calc_mode: FogCalcMode) -> Self {
        Self {
            calc_mode,
            fog_mode: FogMode::None,
        }
    }

    #[must_use]
    pub fn calc_mode(&self) -> FogCalcMode {
        self.calc_mode
    }

    pub fn set_calc_mode(&mut self, mode: FogCalcMode) {
        self.calc_mode = mode;
    }

    /// Falloff captured from the source pass.
    #[must_use]
    pub fn fog_mode(&self) -> FogMode {
        self.fog_mode
    }

    fn falloff_suffix(&self) -> &'static str {
        match self.fog_mode {
            FogMode::Exp => "Exp",
            FogMode::Exp2 => "Exp2",
            FogMode::Linear | FogMode::None => "Linear",
        }
    }

    /// Clip-space matrix and position, honouring a skinned world position.
    fn clip_inputs(vs: &mut Program) -> Result<(ParameterPtr, ParameterPtr)> {
        match vs.entry().local_by_content(Content::PositionWorldSpace).cloned() {
            Some(world) => Ok((vs.resolve_auto(AutoConstantType::ViewProjMatrix), world)),
            None => Ok((
                vs.resolve_auto(AutoConstantType::WorldViewProjMatrix),
                vs.entry_mut()
                    .resolve_input_parameter(Content::PositionObjectSpace)?,
            )),
        }
    }
}

impl SubRenderState for FfpFog {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::FfpFog
    }

    fn execution_order(&self) -> i32 {
        execution_order::FOG
    }

    fn pre_add_to_render_state(
        &mut self,
        _ctx: &mut PreAddContext,
        src_pass: &Pass,
        _dst_pass: &mut Pass,
    ) -> bool {
        self.fog_mode = src_pass.fog_mode;
        self.fog_mode != FogMode::None
    }

    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()> {
        let suffix = self.falloff_suffix();

        let vs = program_set.vs_mut();
        vs.add_dependency(libs::FFP_FOG);
        let (matrix, position) = Self::clip_inputs(vs)?;
        let fog_params = vs.resolve_auto(AutoConstantType::FogParams);

        match self.calc_mode {
            FogCalcMode::PerVertex => {
                let factor = vs.entry_mut().resolve_output_parameter(Content::FogFactor)?;
                vs.entry_mut().add_atom(
                    stages::VS_FOG,
                    Atom::invoke(
                        &format!("FFP_VertexFog_{suffix}"),
                        [
                            Operand::input(&matrix),
                            Operand::input(&position),
                            Operand::input(&fog_params),
                            Operand::output(&factor),
                        ],
                    ),
                );

                let fs = program_set.fs_mut();
                fs.add_dependency(libs::FFP_FOG);
                let factor = fs.entry_mut().resolve_input_parameter(Content::FogFactor)?;
                let fog_colour = fs.resolve_auto(AutoConstantType::FogColour);
                let colour = fs
                    .entry_mut()
                    .resolve_output_parameter(Content::ColorDiffuse)?;
                fs.entry_mut().add_atom(
                    stages::FS_FOG,
                    Atom::builtin(
                        Builtin::Mix,
                        [
                            xyz(Operand::input(&fog_colour)),
                            xyz(Operand::input(&colour)),
                            Operand::input(&factor),
                        ],
                        xyz(Operand::output(&colour)),
                    ),
                );
            }
            FogCalcMode::PerPixel => {
                let depth = vs
                    .entry_mut()
                    .resolve_output_parameter(Content::DepthViewSpace)?;
                vs.entry_mut().add_atom(
                    stages::VS_FOG,
                    Atom::invoke(
                        "FFP_PixelFog_Depth",
                        [
                            Operand::input(&matrix),
                            Operand::input(&position),
                            Operand::output(&depth),
                        ],
                    ),
                );

                let fs = program_set.fs_mut();
                fs.add_dependency(libs::FFP_FOG);
                let depth = fs
                    .entry_mut()
                    .resolve_input_parameter(Content::DepthViewSpace)?;
                let fog_params = fs.resolve_auto(AutoConstantType::FogParams);
                let fog_colour = fs.resolve_auto(AutoConstantType::FogColour);
                let colour = fs
                    .entry_mut()
                    .resolve_output_parameter(Content::ColorDiffuse)?;
                fs.entry_mut().add_atom(
                    stages::FS_FOG,
                    Atom::invoke(
                        &format!("FFP_PixelFog_{suffix}"),
                        [
                            Operand::input(&depth),
                            Operand::input(&fog_params),
                            xyz(Operand::input(&fog_colour)),
                            xyz(Operand::inout(&colour)),
                        ],
                    ),
                );
            }
        }
        Ok(())
    }

    fn write_signature(&self, mut state: &mut dyn Hasher) {
        self.calc_mode.hash(&mut state);
    }

    impl_srs_boilerplate!();
}

/// Factory of [`FfpFog`]. Script: `fog_stage ffp [per_vertex|per_pixel]`.
#[derive(Debug, Default)]
pub struct FfpFogFactory;

impl SubRenderStateFactory for FfpFogFactory {
    fn type_name(&self) -> &str {
        SrsTag::FfpFog.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(FfpFog::default())
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        if node.name != "fog_stage" {
            return None;
        }
        if node.value(0) != Some("ffp") {
            translator.error(node, "fog_stage expects 'ffp'");
            return None;
        }
        let calc_mode = match node.value(1) {
            None | Some("per_vertex") => FogCalcMode::PerVertex,
            Some("per_pixel") => FogCalcMode::PerPixel,
            Some(other) => {
                translator.error(node, format!("unknown fog calculation mode '{other}'"));
                return None;
            }
        };
        Some(Box::new(FfpFog::new(calc_mode)))
    }

    fn write_instance(
        &self,
        serializer: &mut ScriptSerializer,
        srs: &dyn SubRenderState,
        _src_pass: &Pass,
        _dst_pass: &Pass,
    ) {
        let mode = srs
            .downcast_ref::<FfpFog>()
            .map_or(FogCalcMode::PerVertex, FfpFog::calc_mode);
        serializer.write_attribute("fog_stage", &["ffp", mode.script_name()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(mode: FogCalcMode, fog: FogMode) -> Option<ProgramSet> {
        let mut pass = Pass::new();
        pass.fog_mode = fog;
        let mut dst = pass.clone();
        let mut srs = FfpFog::new(mode);
        if !srs.pre_add_to_render_state(&mut PreAddContext::default(), &pass, &mut dst) {
            return None;
        }
        let mut set = ProgramSet::new(pass.vertex_layout);
        srs.create_cpu_sub_programs(&mut set).unwrap();
        Some(set)
    }

    #[test]
    fn disabled_fog_opts_out() {
        assert!(generate(FogCalcMode::PerVertex, FogMode::None).is_none());
    }

    #[test]
    fn per_vertex_fog_passes_a_factor() {
        let set = generate(FogCalcMode::PerVertex, FogMode::Exp2).unwrap();
        let vs_calls: Vec<_> = set
            .vs()
            .entry()
            .atoms()
            .filter_map(|(_, a)| a.function_name())
            .collect();
        assert_eq!(vs_calls, ["FFP_VertexFog_Exp2"]);
        assert!(set.fs().entry().input_by_content(Content::FogFactor).is_some());
        assert_eq!(set.fs().entry().stage_atoms(stages::FS_FOG).len(), 1);
    }

    #[test]
    fn per_pixel_fog_passes_depth() {
        let set = generate(FogCalcMode::PerPixel, FogMode::Linear).unwrap();
        assert!(set
            .vs()
            .entry()
            .output_by_content(Content::DepthViewSpace)
            .is_some());
        assert!(set.fs().uniforms().iter().any(|u| u.name() == "fog_params"));
    }
}
