//! Per-pixel lighting with renormalised normals.

use std::hash::{Hash, Hasher};

use crate::errors::Result;
use crate::ir::{Atom, Content, Operand, ProgramSet, stages};
use crate::material::Pass;
use crate::render_state::{
    PreAddContext, SrsTag, SubRenderState, SubRenderStateFactory, execution_order,
    impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::lighting::{LIGHTING_STAGE_PROPERTY, LightingCore};
use super::{libs, resolve_normalised_view_normal};

/// Blinn-Phong lighting on the renormalised interpolated normal, optionally
/// lighting back faces with the flipped normal.
#[derive(Debug, Clone, Default)]
pub struct PerPixelLighting {
    core: LightingCore,
    two_sided: bool,
}

impl PerPixelLighting {
    #[must_use]
    pub fn two_sided(&self) -> bool {
        self.two_sided
    }

    pub fn set_two_sided(&mut self, two_sided: bool) {
        self.two_sided = two_sided;
    }
}

impl SubRenderState for PerPixelLighting {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::PerPixelLighting
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
        let (position, _) = self.core.resolve_view_space_inputs(program_set)?;

        let fs = program_set.fs_mut();
        fs.add_dependency(libs::SGX_PER_PIXEL_LIGHTING);
        let normal = resolve_normalised_view_normal(fs)?;

        if self.two_sided {
            let front_facing = fs
                .entry_mut()
                .resolve_input_parameter(Content::FrontFacing)?;
            fs.entry_mut().add_atom(
                stages::FS_PRE_PROCESS,
                Atom::invoke(
                    "SGX_Flip_Backface_Normal",
                    [Operand::input(&front_facing), Operand::inout(&normal)],
                ),
            );
        }

        self.core.emit_phong_lights(fs, &normal, &position)
    }

    fn write_signature(&self, mut state: &mut dyn Hasher) {
        self.core.write_signature(state);
        self.two_sided.hash(&mut state);
    }

    impl_srs_boilerplate!();
}

/// Factory of [`PerPixelLighting`].
/// Script: `lighting_stage per_pixel [two_sided]`.
#[derive(Debug, Default)]
pub struct PerPixelLightingFactory;

impl SubRenderStateFactory for PerPixelLightingFactory {
    fn type_name(&self) -> &str {
        SrsTag::PerPixelLighting.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(PerPixelLighting::default())
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        if node.name != LIGHTING_STAGE_PROPERTY || node.value(0) != Some("per_pixel") {
            return None;
        }
        let mut srs = PerPixelLighting::default();
        match node.value(1) {
            None => {}
            Some("two_sided") => srs.two_sided = true,
            Some(other) => {
                translator.error(node, format!("unknown per_pixel option '{other}'"));
                return None;
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
        let two_sided = srs
            .downcast_ref::<PerPixelLighting>()
            .is_some_and(PerPixelLighting::two_sided);
        if two_sided {
            serializer.write_attribute(LIGHTING_STAGE_PROPERTY, &["per_pixel", "two_sided"]);
        } else {
            serializer.write_attribute(LIGHTING_STAGE_PROPERTY, &["per_pixel"]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Semantic;

    #[test]
    fn two_sided_reads_front_facing() {
        let mut srs = PerPixelLighting::default();
        srs.set_two_sided(true);
        let pass = Pass::new();
        let mut dst = pass.clone();
        assert!(srs.pre_add_to_render_state(&mut PreAddContext::new([0, 1, 0]), &pass, &mut dst));

        let mut set = ProgramSet::new(pass.vertex_layout);
        srs.create_cpu_sub_programs(&mut set).unwrap();

        let fs = set.fs().entry();
        let ff = fs.input_by_content(Content::FrontFacing).unwrap();
        assert_eq!(ff.semantic(), Semantic::FrontFacing);
        let pre: Vec<_> = fs.stage_atoms(stages::FS_PRE_PROCESS).iter().collect();
        assert_eq!(pre.len(), 2);
        assert_eq!(pre[1].function_name(), Some("SGX_Flip_Backface_Normal"));
        assert!(fs.local_by_content(Content::NormalViewSpace).is_some());
    }
}
