//! Fixed-function vertex transform.

use crate::errors::Result;
use crate::ir::{ArithOp, Atom, AutoConstantType, Content, Operand, ProgramSet, stages};
use crate::material::Pass;
use crate::render_state::{
    SrsTag, SubRenderState, SubRenderStateFactory, execution_order, impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::libs;

/// Writes the clip-space position: `WORLDVIEWPROJ_MATRIX * position`.
///
/// When skinning has already produced a world-space position, the view
/// projection matrix is applied to that instead.
#[derive(Debug, Clone, Default)]
pub struct FfpTransform;

impl SubRenderState for FfpTransform {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::FfpTransform
    }

    fn execution_order(&self) -> i32 {
        execution_order::TRANSFORM
    }

    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()> {
        program_set.fs_mut().add_dependency(libs::FFP_COMMON);

        let vs = program_set.vs_mut();
        vs.add_dependency(libs::FFP_COMMON);
        vs.add_dependency(libs::FFP_TRANSFORM);

        let (matrix, position) =
            match vs.entry().local_by_content(Content::PositionWorldSpace).cloned() {
                Some(world) => (vs.resolve_auto(AutoConstantType::ViewProjMatrix), world),
                None => (
                    vs.resolve_auto(AutoConstantType::WorldViewProjMatrix),
                    vs.entry_mut()
                        .resolve_input_parameter(Content::PositionObjectSpace)?,
                ),
            };
        let clip = vs
            .entry_mut()
            .resolve_output_parameter(Content::PositionProjectiveSpace)?;

        vs.entry_mut().add_atom(
            stages::VS_TRANSFORM,
            Atom::arith(
                ArithOp::Mul,
                Operand::input(&matrix),
                Operand::input(&position),
                Operand::output(&clip),
            ),
        );
        Ok(())
    }

    impl_srs_boilerplate!();
}

/// Factory of [`FfpTransform`]. Script: `transform_stage ffp`.
#[derive(Debug, Default)]
pub struct FfpTransformFactory;

impl SubRenderStateFactory for FfpTransformFactory {
    fn type_name(&self) -> &str {
        SrsTag::FfpTransform.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(FfpTransform)
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        if node.name != "transform_stage" {
            return None;
        }
        match node.value(0) {
            Some("ffp") => Some(self.create_instance()),
            other => {
                translator.error(node, format!("unknown transform_stage mode {other:?}"));
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
        serializer.write_attribute("transform_stage", &["ffp"]);
    }
}
