//! Alpha rejection.

use std::hash::{Hash, Hasher};

use crate::errors::Result;
use crate::ir::{Atom, Content, Operand, ProgramSet, stages};
use crate::material::{CompareFunction, Pass};
use crate::render_state::{
    PreAddContext, SrsTag, SubRenderState, SubRenderStateFactory, execution_order,
    impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::{float_literal, int_literal, libs};

/// Discards fragments whose alpha fails the pass's alpha-reject comparison.
#[derive(Debug, Clone, Default)]
pub struct FfpAlphaTest {
    function: CompareFunction,
    reference: u8,
}

impl FfpAlphaTest {
    #[must_use]
    pub fn function(&self) -> CompareFunction {
        self.function
    }
}

impl SubRenderState for FfpAlphaTest {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::FfpAlphaTest
    }

    fn execution_order(&self) -> i32 {
        execution_order::ALPHA_TEST
    }

    fn pre_add_to_render_state(
        &mut self,
        _ctx: &mut PreAddContext,
        src_pass: &Pass,
        _dst_pass: &mut Pass,
    ) -> bool {
        self.function = src_pass.alpha_reject_function;
        self.reference = src_pass.alpha_reject_value;
        self.function != CompareFunction::AlwaysPass
    }

    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()> {
        let fs = program_set.fs_mut();
        fs.add_dependency(libs::FFP_ALPHA_TEST);
        let colour = fs
            .entry_mut()
            .resolve_output_parameter(Content::ColorDiffuse)?;
        let function = int_literal(self.function.code());
        let reference = float_literal(&[f32::from(self.reference) / 255.0]);

        fs.entry_mut().add_atom(
            stages::FS_ALPHA_TEST,
            Atom::invoke(
                "FFP_Alpha_Test",
                [
                    Operand::input(&function),
                    Operand::input(&reference),
                    Operand::input(&colour),
                ],
            ),
        );
        Ok(())
    }

    fn write_signature(&self, mut state: &mut dyn Hasher) {
        self.function.hash(&mut state);
        self.reference.hash(&mut state);
    }

    impl_srs_boilerplate!();
}

/// Factory of [`FfpAlphaTest`]. Script: `alpha_test_stage ffp`.
#[derive(Debug, Default)]
pub struct FfpAlphaTestFactory;

impl SubRenderStateFactory for FfpAlphaTestFactory {
    fn type_name(&self) -> &str {
        SrsTag::FfpAlphaTest.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(FfpAlphaTest::default())
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        if node.name != "alpha_test_stage" {
            return None;
        }
        match node.value(0) {
            Some("ffp") => Some(self.create_instance()),
            other => {
                translator.error(node, format!("unknown alpha_test_stage mode {other:?}"));
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
        serializer.write_attribute("alpha_test_stage", &["ffp"]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_pass_opts_out() {
        let pass = Pass::new();
        let mut dst = pass.clone();
        let mut srs = FfpAlphaTest::default();
        assert!(!srs.pre_add_to_render_state(&mut PreAddContext::default(), &pass, &mut dst));
    }

    #[test]
    fn reject_function_emits_one_test() {
        let mut pass = Pass::new();
        pass.alpha_reject_function = CompareFunction::Greater;
        pass.alpha_reject_value = 128;
        let mut dst = pass.clone();
        let mut srs = FfpAlphaTest::default();
        assert!(srs.pre_add_to_render_state(&mut PreAddContext::default(), &pass, &mut dst));

        let mut set = ProgramSet::new(pass.vertex_layout);
        srs.create_cpu_sub_programs(&mut set).unwrap();
        let atoms = set.fs().entry().stage_atoms(stages::FS_ALPHA_TEST);
        assert_eq!(atoms.len(), 1);
        assert_eq!(atoms[0].function_name(), Some("FFP_Alpha_Test"));
    }
}
