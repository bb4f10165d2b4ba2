//! Vertex colour forwarding.
//!
//! The colour feature owns the running fragment colour `oColor_0`: it seeds it
//! at `FS_COLOUR_BEGIN + 1` (from the interpolated vertex colour or white) and
//! folds the specular accumulator back in at `FS_COLOUR_END`. Later features
//! request the stages they depend on through
//! [`PreAddContext::colour_stages`](crate::render_state::PreAddContext).

use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use glam::Vec3;

use crate::errors::Result;
use crate::ir::{
    ArithOp, Atom, Content, GpuConstantType, Operand, OperandMask, ProgramSet, VertexElements,
    stages,
};
use crate::material::Pass;
use crate::render_state::{
    PreAddContext, SrsTag, SubRenderState, SubRenderStateFactory, execution_order,
    impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::float_literal;

bitflags! {
    /// Colour values the feature resolves.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ColourStages: u8 {
        const VS_INPUT_DIFFUSE   = 1 << 0;
        const VS_INPUT_SPECULAR  = 1 << 1;
        const VS_OUTPUT_DIFFUSE  = 1 << 2;
        const VS_OUTPUT_SPECULAR = 1 << 3;
        const PS_INPUT_DIFFUSE   = 1 << 4;
        const PS_INPUT_SPECULAR  = 1 << 5;
        /// Keep a specular accumulator and add it at `FS_COLOUR_END`.
        const PS_SPECULAR        = 1 << 6;
    }
}

/// Forwards vertex colour from the VS to the FS output.
#[derive(Debug, Clone, Default)]
pub struct FfpColour {
    resolve_stages: ColourStages,
}

impl FfpColour {
    #[must_use]
    pub fn resolve_stages(&self) -> ColourStages {
        self.resolve_stages
    }

    pub fn set_resolve_stages(&mut self, stages: ColourStages) {
        self.resolve_stages = stages;
    }

    pub fn add_resolve_stages(&mut self, stages: ColourStages) {
        self.resolve_stages |= stages;
    }
}

/// Whether a pass produces a specular highlight.
pub(crate) fn pass_has_specular(pass: &Pass) -> bool {
    pass.lighting_enabled && pass.shininess > 0.0 && pass.specular.truncate() != Vec3::ZERO
}

impl SubRenderState for FfpColour {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::FfpColour
    }

    fn execution_order(&self) -> i32 {
        execution_order::COLOUR
    }

    fn pre_add_to_render_state(
        &mut self,
        _ctx: &mut PreAddContext,
        src_pass: &Pass,
        _dst_pass: &mut Pass,
    ) -> bool {
        let layout = src_pass.vertex_layout;
        let mut stages = ColourStages::VS_OUTPUT_DIFFUSE | ColourStages::PS_INPUT_DIFFUSE;

        let vertex_colour_used =
            !src_pass.lighting_enabled || !src_pass.vertex_colour_tracking.is_empty();
        if vertex_colour_used && layout.contains(VertexElements::DIFFUSE) {
            stages |= ColourStages::VS_INPUT_DIFFUSE;
        }

        if pass_has_specular(src_pass) {
            stages |= ColourStages::PS_SPECULAR;
        }
        if !src_pass.lighting_enabled && layout.contains(VertexElements::SPECULAR) {
            stages |= ColourStages::VS_INPUT_SPECULAR
                | ColourStages::VS_OUTPUT_SPECULAR
                | ColourStages::PS_INPUT_SPECULAR
                | ColourStages::PS_SPECULAR;
        }

        self.resolve_stages = stages;
        true
    }

    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()> {
        let stages_mask = self.resolve_stages;
        let layout = program_set.vertex_layout();
        let white = float_literal(&[1.0, 1.0, 1.0, 1.0]);
        let black = float_literal(&[0.0, 0.0, 0.0, 0.0]);

        // ── Vertex program ───────────────────────────────────────────────────
        let vs = program_set.vs_mut().entry_mut();
        if stages_mask.contains(ColourStages::VS_OUTPUT_DIFFUSE) {
            let out = vs.resolve_output_parameter(Content::ColorDiffuse)?;
            let src = if stages_mask.contains(ColourStages::VS_INPUT_DIFFUSE)
                && layout.contains(VertexElements::DIFFUSE)
            {
                vs.resolve_input_parameter(Content::ColorDiffuse)?
            } else {
                white.clone()
            };
            vs.add_atom(
                stages::VS_COLOUR,
                Atom::assign(Operand::input(&src), Operand::output(&out)),
            );
        }
        if stages_mask.contains(ColourStages::VS_OUTPUT_SPECULAR) {
            let out = vs.resolve_output_parameter(Content::ColorSpecular)?;
            let src = if stages_mask.contains(ColourStages::VS_INPUT_SPECULAR)
                && layout.contains(VertexElements::SPECULAR)
            {
                vs.resolve_input_parameter(Content::ColorSpecular)?
            } else {
                black.clone()
            };
            vs.add_atom(
                stages::VS_COLOUR,
                Atom::assign(Operand::input(&src), Operand::output(&out)),
            );
        }

        // ── Fragment program ─────────────────────────────────────────────────
        let fs = program_set.fs_mut().entry_mut();
        let diffuse = fs.resolve_output_parameter(Content::ColorDiffuse)?;
        let src = if stages_mask.contains(ColourStages::PS_INPUT_DIFFUSE) {
            fs.resolve_input_parameter(Content::ColorDiffuse)?
        } else {
            white
        };
        fs.add_atom(
            stages::FS_COLOUR_BEGIN + 1,
            Atom::assign(Operand::input(&src), Operand::output(&diffuse)),
        );

        if stages_mask.contains(ColourStages::PS_SPECULAR) {
            let specular = fs.resolve_local_parameter(Content::ColorSpecular, GpuConstantType::Float4);
            let src = if stages_mask.contains(ColourStages::PS_INPUT_SPECULAR) {
                fs.resolve_input_parameter(Content::ColorSpecular)?
            } else {
                black
            };
            fs.add_atom(
                stages::FS_COLOUR_BEGIN + 1,
                Atom::assign(Operand::input(&src), Operand::output(&specular)),
            );
            fs.add_atom(
                stages::FS_COLOUR_END,
                Atom::arith(
                    ArithOp::Add,
                    Operand::input(&diffuse).with_mask(OperandMask::XYZ),
                    Operand::input(&specular).with_mask(OperandMask::XYZ),
                    Operand::output(&diffuse).with_mask(OperandMask::XYZ),
                ),
            );
        }
        Ok(())
    }

    fn write_signature(&self, mut state: &mut dyn Hasher) {
        self.resolve_stages.bits().hash(&mut state);
    }

    impl_srs_boilerplate!();
}

/// Factory of [`FfpColour`]. Script: `colour_stage ffp`.
#[derive(Debug, Default)]
pub struct FfpColourFactory;

impl SubRenderStateFactory for FfpColourFactory {
    fn type_name(&self) -> &str {
        SrsTag::FfpColour.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(FfpColour::default())
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        if node.name != "colour_stage" {
            return None;
        }
        match node.value(0) {
            Some("ffp") => Some(self.create_instance()),
            other => {
                translator.error(node, format!("unknown colour_stage mode {other:?}"));
                None
            }
        }
    }

    fn write_instance(
        &self,
        serializer: &mut ScriptSerializer,
        _srs: &dyn SubRenderState,
        _src_pass: &Pass,
        _dst_pass: &Pass,
    ) {
        serializer.write_attribute("colour_stage", &["ffp"]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::TrackVertexColour;

    fn run(pass: &Pass) -> ProgramSet {
        let mut colour = FfpColour::default();
        let mut dst = pass.clone();
        assert!(colour.pre_add_to_render_state(&mut PreAddContext::default(), pass, &mut dst));
        let mut set = ProgramSet::new(pass.vertex_layout);
        colour.create_cpu_sub_programs(&mut set).unwrap();
        set
    }

    #[test]
    fn lit_pass_without_vertex_colour_writes_white() {
        let set = run(&Pass::new());
        assert!(set.vs().entry().inputs().is_empty());
        assert_eq!(set.vs().entry().outputs().len(), 1);
        assert_eq!(set.fs().entry().stage_atoms(stages::FS_COLOUR_BEGIN + 1).len(), 1);
    }

    #[test]
    fn tracked_vertex_colour_is_forwarded() {
        let mut pass = Pass::new();
        pass.vertex_layout |= VertexElements::DIFFUSE;
        pass.vertex_colour_tracking = TrackVertexColour::DIFFUSE;
        let set = run(&pass);
        let input = set.vs().entry().input_by_content(Content::ColorDiffuse);
        assert!(input.is_some());
    }

    #[test]
    fn unavailable_vertex_colour_is_never_requested() {
        let mut pass = Pass::new();
        pass.lighting_enabled = false;
        let set = run(&pass);
        assert!(set.vs().entry().input_by_content(Content::ColorDiffuse).is_none());
    }

    #[test]
    fn specular_is_added_at_colour_end() {
        let mut pass = Pass::new();
        pass.shininess = 32.0;
        pass.specular = glam::Vec4::ONE;
        let set = run(&pass);
        assert_eq!(set.fs().entry().stage_atoms(stages::FS_COLOUR_END).len(), 1);
        assert!(set.fs().entry().local_by_content(Content::ColorSpecular).is_some());
    }
}
