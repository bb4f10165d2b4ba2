//! Weighted blended order-independent transparency.
//!
//! Writes the weighted colour accumulation to render target 0 and the
//! revealage to render target 1 (`ColorSpecular`), and switches the pass to
//! the additive / revealage blend the resolve pass expects.

use std::hash::{Hash, Hasher};

use crate::errors::Result;
use crate::ir::{Atom, Content, Operand, OperandMask, ProgramSet, stages};
use crate::material::{Pass, SceneBlendFactor};
use crate::render_state::{
    PreAddContext, SrsTag, SubRenderState, SubRenderStateFactory, execution_order,
    impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::{libs, resolve_view_position};

const WBOIT_PROPERTY: &str = "weighted_blended_oit";

#[derive(Debug, Clone)]
pub struct Wboit {
    enabled: bool,
}

impl Default for Wboit {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Wboit {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl SubRenderState for Wboit {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::WeightedBlendedOit
    }

    fn execution_order(&self) -> i32 {
        execution_order::POST_PROCESS
    }

    fn pre_add_to_render_state(
        &mut self,
        _ctx: &mut PreAddContext,
        _src_pass: &Pass,
        dst_pass: &mut Pass,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        dst_pass.set_separate_scene_blending(
            SceneBlendFactor::One,
            SceneBlendFactor::One,
            SceneBlendFactor::Zero,
            SceneBlendFactor::OneMinusSourceAlpha,
        );
        dst_pass.set_transparent_sorting_enabled(false);
        true
    }

    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()> {
        resolve_view_position(program_set.vs_mut())?;

        let fs = program_set.fs_mut();
        fs.add_dependency(libs::SGX_WBOIT);
        let f = fs.entry_mut();
        let position = f.resolve_input_parameter(Content::PositionViewSpace)?;
        let accum = f.resolve_output_parameter(Content::ColorDiffuse)?;
        let revealage = f.resolve_output_parameter(Content::ColorSpecular)?;

        f.add_atom(
            stages::FS_POST_PROCESS,
            Atom::invoke(
                "SGX_WBOIT",
                [
                    Operand::input(&position).with_mask(OperandMask::Z),
                    Operand::inout(&accum),
                    Operand::output(&revealage),
                ],
            ),
        );
        Ok(())
    }

    fn write_signature(&self, mut state: &mut dyn Hasher) {
        self.enabled.hash(&mut state);
    }

    impl_srs_boilerplate!();
}

/// Factory of [`Wboit`]. Script: `weighted_blended_oit true|false`.
#[derive(Debug, Default)]
pub struct WboitFactory;

impl SubRenderStateFactory for WboitFactory {
    fn type_name(&self) -> &str {
        SrsTag::WeightedBlendedOit.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(Wboit::default())
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        if node.name != WBOIT_PROPERTY {
            return None;
        }
        let enabled = translator.parse_bool(node, 0)?;
        Some(Box::new(Wboit::new(enabled)))
    }

    fn write_instance(
        &self,
        serializer: &mut ScriptSerializer,
        srs: &dyn SubRenderState,
        _src_pass: &Pass,
        _dst_pass: &Pass,
    ) {
        let enabled = srs.downcast_ref::<Wboit>().is_some_and(Wboit::is_enabled);
        serializer.write_attribute(WBOIT_PROPERTY, &[if enabled { "true" } else { "false" }]);
    }
}
