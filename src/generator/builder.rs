//! Per-pass generation: effective state, compiler passes, emission.

use crate::errors::Result;
use crate::external::{GpuProgramManager, ResourceLocator};
use crate::ir::ProgramSet;
use crate::material::{Pass, PassPrograms};
use crate::processor::ProgramProcessor;
use crate::program_manager::{ProgramHandle, ProgramManager};
use crate::render_state::{PreAddContext, RenderState, SrsRegistry};
use crate::srs::colour::FfpColour;

/// Features every scheme starts from. Each one opts out on passes that do
/// not use it, so unlit or untextured passes only pay for what they need.
pub const FFP_BASELINE: [&str; 6] = [
    "FFP_Transform",
    "FFP_Colour",
    "FFP_Lighting",
    "FFP_Texturing",
    "FFP_Fog",
    "FFP_AlphaTest",
];

/// Result of generating one pass.
#[derive(Debug)]
pub struct BuiltPass {
    /// Destination pass with the programs bound.
    pub pass: Pass,
    pub vertex: ProgramHandle,
    pub fragment: ProgramHandle,
    /// Feature types removed after failing to resolve.
    pub dropped: Vec<String>,
}

/// Borrowed view of the generator state one pass generation needs.
pub struct PassBuilder<'a> {
    pub registry: &'a SrsRegistry,
    pub processor: &'a ProgramProcessor,
    pub programs: &'a mut ProgramManager,
    pub backend: &'a mut dyn GpuProgramManager,
    pub locator: &'a dyn ResourceLocator,
    pub language: &'a str,
}

impl PassBuilder<'_> {
    /// Baseline, then the scheme template, then the pass overrides.
    pub fn effective_state(
        &self,
        template: &RenderState,
        overrides: Option<&RenderState>,
    ) -> Result<RenderState> {
        let mut baseline = RenderState::new();
        for type_name in FFP_BASELINE {
            if self.registry.contains(type_name) {
                baseline.add_template_sub_render_state(self.registry.create(type_name)?);
            }
        }
        let with_template = RenderState::merge(&baseline, template, self.registry)?;
        match overrides {
            Some(overrides) => RenderState::merge(&with_template, overrides, self.registry),
            None => Ok(with_template),
        }
    }

    /// Generates, compiles and binds the programs of `src_pass`.
    ///
    /// A feature failing to resolve is removed from `state` and generation
    /// restarts from a clean destination pass. Other errors abort.
    pub fn build(&mut self, mut state: RenderState, src_pass: &Pass) -> Result<BuiltPass> {
        let mut dropped = Vec::new();

        loop {
            let mut dst_pass = src_pass.clone();
            dst_pass.programs = PassPrograms::default();

            let mut ctx = PreAddContext::new(state.light_count());
            let mut kept = Vec::with_capacity(state.len());
            for (i, srs) in state.sub_render_states_mut().iter_mut().enumerate() {
                if srs.pre_add_to_render_state(&mut ctx, src_pass, &mut dst_pass) {
                    kept.push(i);
                }
            }
            if let Some(colour) = state.get_as_mut::<FfpColour>() {
                colour.add_resolve_stages(ctx.colour_stages);
            }

            let mut program_set = ProgramSet::new(src_pass.vertex_layout);
            let mut failed = None;
            for &i in &kept {
                let srs = &mut state.sub_render_states_mut()[i];
                if let Err(e) = srs.create_cpu_sub_programs(&mut program_set) {
                    let e = e.attributed_to(srs.type_name());
                    if !e.is_resolve_failure() {
                        return Err(e);
                    }
                    failed = Some((srs.type_name().to_string(), e));
                    break;
                }
            }

            if let Some((type_name, e)) = failed {
                log::info!("{e}; regenerating without {type_name}");
                state.remove_sub_render_state(&type_name);
                dropped.push(type_name);
                continue;
            }

            let stats = self.processor.process(&mut program_set)?;
            if stats.packed_varyings > 0 {
                log::debug!(
                    "Packed {} varyings into {} slots",
                    stats.packed_varyings,
                    stats.varying_slots
                );
            }

            let (vertex, fragment) = self.acquire(&program_set)?;

            dst_pass.programs = PassPrograms {
                vertex: self.programs.bound_program(vertex),
                fragment: self.programs.bound_program(fragment),
            };

            return Ok(BuiltPass {
                pass: dst_pass,
                vertex,
                fragment,
                dropped,
            });
        }
    }

    fn acquire(&mut self, program_set: &ProgramSet) -> Result<(ProgramHandle, ProgramHandle)> {
        let vertex = self.programs.acquire_program(
            program_set.vs(),
            self.language,
            self.backend,
            self.locator,
        )?;
        match self.programs.acquire_program(
            program_set.fs(),
            self.language,
            self.backend,
            self.locator,
        ) {
            Ok(fragment) => Ok((vertex, fragment)),
            Err(e) => {
                self.programs.release_program(vertex, self.backend);
                Err(e)
            }
        }
    }
}

