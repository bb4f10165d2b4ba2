//! Program Processor
//!
//! Post-generation pass over a [`ProgramSet`], run once every sub render
//! state has emitted its atoms.
//!
//! # Passes
//!
//! | Pass         | Effect                                                         |
//! |--------------|----------------------------------------------------------------|
//! | prune        | drops locals and uniforms no atom references                   |
//! | compact      | packs small varyings into shared slots per [`CompactPolicy`]   |
//! | link         | gives every fragment input the slot of its vertex output       |
//! | check        | rejects pipelines that cannot link                             |
//!
//! # Packing
//!
//! Only smooth-interpolated float varyings on `TEXCOORD` slots take part;
//! positions and colours have fixed slots. A varying is left alone when any
//! operand subscripts it or masks a lane beyond its own width, because the
//! shifted swizzle could not be formed. Such conflicts are logged at `debug`.

use std::sync::Arc;

use smallvec::{SmallVec, smallvec};

use crate::errors::{Result, RtssError};
use crate::ir::{
    Content, Function, GpuConstantType, OperandMask, Parameter, ParameterKind, ParameterPtr,
    ProgramSet, Semantic, same_parameter,
};
use crate::settings::CompactPolicy;

/// Content tags of packed varyings start here.
const PACKED_CONTENT_BASE: u16 = 0x200;

/// What one [`ProgramProcessor::process`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub pruned_locals: usize,
    pub pruned_uniforms: usize,
    /// Varyings moved into a shared slot.
    pub packed_varyings: usize,
    /// `TEXCOORD` slots the vertex program writes after processing.
    pub varying_slots: usize,
}

#[derive(Debug)]
struct Candidate {
    vs: ParameterPtr,
    fs: Option<ParameterPtr>,
    lanes: u32,
}

#[derive(Debug)]
struct Slot {
    used: u32,
    /// `(candidate, lane offset)`
    members: SmallVec<[(usize, u32); 4]>,
}

/// Post-processes generated program sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramProcessor {
    policy: CompactPolicy,
}

impl ProgramProcessor {
    #[must_use]
    pub fn new(policy: CompactPolicy) -> Self {
        Self { policy }
    }

    #[inline]
    #[must_use]
    pub fn policy(&self) -> CompactPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: CompactPolicy) {
        self.policy = policy;
    }

    /// Runs every pass over `program_set`.
    ///
    /// Fails with [`RtssError::InvalidProgram`] when the result cannot link.
    pub fn process(&self, program_set: &mut ProgramSet) -> Result<ProcessStats> {
        let mut stats = ProcessStats::default();
        let (vs, fs) = program_set.split_mut();

        for program in [&mut *vs, &mut *fs] {
            stats.pruned_locals += program.entry_mut().prune_unused_locals();
            stats.pruned_uniforms += program.prune_unused_uniforms();
        }

        let (vs_main, fs_main) = (vs.entry_mut(), fs.entry_mut());
        stats.packed_varyings = self.compact_vs_outputs(vs_main, fs_main);
        if stats.packed_varyings > 0 {
            renumber_texcoord_outputs(vs_main);
        }
        link_fragment_inputs(vs_main, fs_main);
        check_linkage(vs_main, fs_main)?;

        stats.varying_slots = vs_main
            .outputs()
            .iter()
            .filter(|p| p.semantic() == Semantic::TexCoord)
            .count();
        Ok(stats)
    }

    /// Packs vertex outputs and their fragment inputs into shared slots.
    ///
    /// Returns how many varyings were moved.
    pub fn compact_vs_outputs(&self, vs_main: &mut Function, fs_main: &mut Function) -> usize {
        if self.policy == CompactPolicy::Low {
            return 0;
        }

        let candidates = collect_candidates(vs_main, fs_main);
        let slots = self.plan(&candidates);

        let mut moved = 0;
        for (n, slot) in slots.iter().enumerate() {
            if slot.members.len() < 2 {
                continue;
            }
            let content = Content::Custom(PACKED_CONTENT_BASE + n as u16);
            let ty = GpuConstantType::float_vector(slot.used);
            let index = slot
                .members
                .iter()
                .map(|(c, _)| candidates[*c].vs.index())
                .min()
                .unwrap_or(0);

            let vs_packed = packed_parameter(ParameterKind::Output, ty, index, content);
            replace_members(vs_main, &vs_packed, slot, &candidates, |c| Some(&c.vs));

            if slot.members.iter().any(|(c, _)| candidates[*c].fs.is_some()) {
                let fs_packed = packed_parameter(ParameterKind::Input, ty, index, content);
                replace_members(fs_main, &fs_packed, slot, &candidates, |c| c.fs.as_ref());
            }

            log::debug!(
                "Packed {} varyings into {:?} slot {index}",
                slot.members.len(),
                ty
            );
            moved += slot.members.len();
        }
        moved
    }

    fn plan(&self, candidates: &[Candidate]) -> Vec<Slot> {
        let mut slots: Vec<Slot> = Vec::new();
        match self.policy {
            CompactPolicy::Low => {}
            CompactPolicy::Medium => {
                // Wide varyings keep a slot each; narrow ones fill their spare lanes.
                for (i, c) in candidates.iter().enumerate().filter(|(_, c)| c.lanes > 2) {
                    slots.push(Slot {
                        used: c.lanes,
                        members: smallvec![(i, 0)],
                    });
                }
                for (i, c) in candidates.iter().enumerate().filter(|(_, c)| c.lanes <= 2) {
                    first_fit(&mut slots, i, c.lanes);
                }
            }
            CompactPolicy::High => {
                let mut order: Vec<usize> = (0..candidates.len()).collect();
                order.sort_by_key(|&i| std::cmp::Reverse(candidates[i].lanes));
                for i in order {
                    first_fit(&mut slots, i, candidates[i].lanes);
                }
            }
        }
        slots
    }
}

fn first_fit(slots: &mut Vec<Slot>, candidate: usize, lanes: u32) {
    if let Some(slot) = slots.iter_mut().find(|s| s.used + lanes <= 4) {
        slot.members.push((candidate, slot.used));
        slot.used += lanes;
    } else {
        slots.push(Slot {
            used: lanes,
            members: smallvec![(candidate, 0)],
        });
    }
}

// ─── Candidates ──────────────────────────────────────────────────────────────

fn collect_candidates(vs_main: &Function, fs_main: &Function) -> Vec<Candidate> {
    let mut outputs: Vec<&ParameterPtr> = vs_main
        .outputs()
        .iter()
        .filter(|p| {
            p.semantic() == Semantic::TexCoord
                && p.ty().is_float_vector()
                && p.ty().lane_count() < 4
                && p.array_size() == 0
        })
        .collect();
    outputs.sort_by_key(|p| p.index());

    let mut candidates = Vec::with_capacity(outputs.len());
    for vs in outputs {
        let fs = fs_main.input_by_content(vs.content()).cloned();
        let packable = is_packable(vs_main, vs)
            && fs
                .as_ref()
                .is_none_or(|f| f.ty() == vs.ty() && is_packable(fs_main, f));
        if !packable {
            log::debug!("{}", RtssError::PackingConflict(vs.name().to_string()));
            continue;
        }
        candidates.push(Candidate {
            vs: Arc::clone(vs),
            fs,
            lanes: vs.ty().lane_count(),
        });
    }
    candidates
}

/// Whether every reference to `param` survives a lane shift.
fn is_packable(function: &Function, param: &ParameterPtr) -> bool {
    let lanes = param.ty().lane_count();
    let mut packable = true;
    for (_, atom) in function.atoms() {
        atom.for_each_operand(|op| {
            if same_parameter(op.parameter(), param)
                && (op.index().is_some() || op.mask().highest_lane().is_some_and(|l| l >= lanes))
            {
                packable = false;
            }
        });
    }
    packable
}

// ─── Rewriting ───────────────────────────────────────────────────────────────

fn packed_parameter(
    kind: ParameterKind,
    ty: GpuConstantType,
    index: u32,
    content: Content,
) -> ParameterPtr {
    let prefix = if matches!(kind, ParameterKind::Input) { 'i' } else { 'o' };
    Arc::new(Parameter::new(
        kind,
        format!("{prefix}{}_{index}", Semantic::TexCoord.name_fragment()),
        ty,
        Semantic::TexCoord,
        index,
        content,
    ))
}

/// Removes the members of `slot` from `function`'s varyings, inserts
/// `packed` in their place and points every reference at the packed lanes.
fn replace_members<'c>(
    function: &mut Function,
    packed: &ParameterPtr,
    slot: &Slot,
    candidates: &'c [Candidate],
    member: impl Fn(&'c Candidate) -> Option<&'c ParameterPtr>,
) {
    let list = match packed.kind() {
        ParameterKind::Input => &mut function.inputs,
        _ => &mut function.outputs,
    };
    let mut inserted = false;
    for (c, _) in &slot.members {
        if let Some(old) = member(&candidates[*c])
            && let Some(pos) = list.iter().position(|p| same_parameter(p, old))
        {
            if inserted {
                list.remove(pos);
            } else {
                list[pos] = Arc::clone(packed);
                inserted = true;
            }
        }
    }

    for (c, offset) in &slot.members {
        let Some(old) = member(&candidates[*c]) else {
            continue;
        };
        let offset = *offset;
        function.rewrite_references(old, packed, move |mask, ty| shifted_mask(mask, ty, offset));
    }
}

fn shifted_mask(mask: OperandMask, ty: GpuConstantType, offset: u32) -> OperandMask {
    let mask = if mask.is_empty() {
        OperandMask::from_lanes(0, ty.lane_count())
    } else {
        mask
    };
    mask.shifted(offset).unwrap_or(mask)
}

/// Renames `param` to the slot `(semantic, index)`.
fn reslotted(param: &Parameter, semantic: Semantic, index: u32) -> ParameterPtr {
    let prefix = if matches!(param.kind(), ParameterKind::Input) { 'i' } else { 'o' };
    let mut moved = param.clone();
    moved.semantic = semantic;
    moved.index = index;
    moved.name = format!("{prefix}{}_{index}", semantic.name_fragment());
    Arc::new(moved)
}

/// Closes gaps left in the `TEXCOORD` slots of the vertex outputs.
fn renumber_texcoord_outputs(vs_main: &mut Function) {
    let mut slots: Vec<(usize, u32)> = vs_main
        .outputs
        .iter()
        .enumerate()
        .filter(|(_, p)| p.semantic() == Semantic::TexCoord)
        .map(|(pos, p)| (pos, p.index()))
        .collect();
    slots.sort_by_key(|&(_, index)| index);

    for (dense, (pos, index)) in slots.into_iter().enumerate() {
        let dense = dense as u32;
        if dense == index {
            continue;
        }
        let old = Arc::clone(&vs_main.outputs[pos]);
        let new = reslotted(&old, Semantic::TexCoord, dense);
        vs_main.outputs[pos] = Arc::clone(&new);
        vs_main.rewrite_references(&old, &new, |mask, _| mask);
    }
}

/// Gives each fragment input the semantic slot of the vertex output with the
/// same content.
fn link_fragment_inputs(vs_main: &Function, fs_main: &mut Function) {
    for pos in 0..fs_main.inputs.len() {
        let input = Arc::clone(&fs_main.inputs[pos]);
        if input.semantic() == Semantic::FrontFacing {
            continue;
        }
        let Some(output) = vs_main.output_by_content(input.content()) else {
            continue;
        };
        if output.semantic() == input.semantic() && output.index() == input.index() {
            continue;
        }
        let linked = reslotted(&input, output.semantic(), output.index());
        fs_main.inputs[pos] = Arc::clone(&linked);
        fs_main.rewrite_references(&input, &linked, |mask, _| mask);
    }
}

// ─── Legality ────────────────────────────────────────────────────────────────

fn check_linkage(vs_main: &Function, fs_main: &Function) -> Result<()> {
    let writes_position = vs_main
        .outputs()
        .iter()
        .any(|p| p.semantic() == Semantic::Position && vs_main.is_written(p));
    if !writes_position {
        return Err(RtssError::InvalidProgram(
            "vertex program does not write a position".into(),
        ));
    }

    let writes_colour = fs_main
        .outputs()
        .iter()
        .any(|p| p.semantic() == Semantic::Color && fs_main.is_written(p));
    if !writes_colour {
        return Err(RtssError::InvalidProgram(
            "fragment program does not write a colour".into(),
        ));
    }

    for input in fs_main.inputs() {
        if input.semantic() == Semantic::FrontFacing {
            continue;
        }
        let linked = vs_main.output_by_content(input.content()).is_some_and(|o| {
            o.semantic() == input.semantic() && o.index() == input.index() && o.ty() == input.ty()
        });
        if !linked {
            return Err(RtssError::InvalidProgram(format!(
                "fragment input '{}' has no matching vertex output",
                input.name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Atom, Operand, VertexElements, stages};

    /// Position plus one pass-through varying per content.
    fn set_with_varyings(contents: &[Content]) -> ProgramSet {
        let mut set = ProgramSet::new(VertexElements::all());
        let (vs, fs) = set.split_mut();

        let vf = vs.entry_mut();
        let pos_in = vf.resolve_input_parameter(Content::PositionObjectSpace).unwrap();
        let pos_out = vf
            .resolve_output_parameter(Content::PositionProjectiveSpace)
            .unwrap();
        vf.add_atom(
            stages::VS_TRANSFORM,
            Atom::assign(Operand::input(&pos_in), Operand::output(&pos_out)),
        );
        let colour = fs
            .entry_mut()
            .resolve_output_parameter(Content::ColorDiffuse)
            .unwrap();

        for &content in contents {
            let out = vf.resolve_output_parameter(content).unwrap();
            vf.add_atom(
                stages::VS_POST_PROCESS,
                Atom::assign(Operand::input(&pos_in).with_mask(
                    OperandMask::from_lanes(0, out.ty().lane_count()),
                ), Operand::output(&out)),
            );
            let input = fs.entry_mut().resolve_input_parameter(content).unwrap();
            fs.entry_mut().add_atom(
                stages::FS_COLOUR_BEGIN,
                Atom::assign(
                    Operand::input(&input),
                    Operand::output(&colour).with_mask(OperandMask::from_lanes(
                        0,
                        input.ty().lane_count(),
                    )),
                ),
            );
        }
        set
    }

    #[test]
    fn low_policy_keeps_every_slot() {
        let mut set = set_with_varyings(&[Content::FogFactor, Content::TextureCoordinate(0)]);
        let stats = ProgramProcessor::new(CompactPolicy::Low)
            .process(&mut set)
            .unwrap();
        assert_eq!(stats.packed_varyings, 0);
        assert_eq!(stats.varying_slots, 2);
    }

    #[test]
    fn medium_folds_scalar_into_vec3() {
        let mut set = set_with_varyings(&[Content::NormalViewSpace, Content::FogFactor]);
        let stats = ProgramProcessor::new(CompactPolicy::Medium)
            .process(&mut set)
            .unwrap();
        assert_eq!(stats.packed_varyings, 2);
        assert_eq!(stats.varying_slots, 1);

        let packed = &set.vs().entry().outputs()[1];
        assert_eq!(packed.ty(), GpuConstantType::Float4);
        assert_eq!(packed.index(), 0);
        assert_eq!(set.fs().entry().inputs()[0].ty(), GpuConstantType::Float4);
    }

    #[test]
    fn medium_leaves_vec2_next_to_vec3() {
        let mut set =
            set_with_varyings(&[Content::NormalViewSpace, Content::TextureCoordinate(0)]);
        let stats = ProgramProcessor::new(CompactPolicy::Medium)
            .process(&mut set)
            .unwrap();
        assert_eq!(stats.packed_varyings, 0);
        assert_eq!(stats.varying_slots, 2);
    }

    #[test]
    fn high_pairs_two_vec2() {
        let mut set = set_with_varyings(&[
            Content::TextureCoordinate(0),
            Content::NormalViewSpace,
            Content::TextureCoordinate(1),
        ]);
        let stats = ProgramProcessor::new(CompactPolicy::High)
            .process(&mut set)
            .unwrap();
        assert_eq!(stats.packed_varyings, 2);
        assert_eq!(stats.varying_slots, 2);
    }

    #[test]
    fn shifted_references_use_upper_lanes() {
        let mut set = set_with_varyings(&[Content::TextureCoordinate(0), Content::TextureCoordinate(1)]);
        ProgramProcessor::new(CompactPolicy::High)
            .process(&mut set)
            .unwrap();
        let masks: Vec<OperandMask> = set
            .vs()
            .entry()
            .stage_atoms(stages::VS_POST_PROCESS)
            .iter()
            .filter_map(|a| match a {
                Atom::Assign { dst, .. } => Some(dst.mask()),
                _ => None,
            })
            .collect();
        assert_eq!(masks, [OperandMask::XY, OperandMask::Z | OperandMask::W]);
    }

    #[test]
    fn subscripted_varyings_are_not_packed() {
        let mut set = set_with_varyings(&[Content::TextureCoordinate(0), Content::FogFactor]);
        let (vs, _) = set.split_mut();
        let tex = Arc::clone(&vs.entry().outputs()[1]);
        let fog = Arc::clone(&vs.entry().outputs()[2]);
        vs.entry_mut().add_atom(
            stages::VS_POST_PROCESS,
            Atom::assign(
                Operand::input(&tex).indexed_by(Operand::input(&fog)),
                Operand::output(&fog),
            ),
        );
        let stats = ProgramProcessor::new(CompactPolicy::High)
            .process(&mut set)
            .unwrap();
        assert_eq!(stats.packed_varyings, 0);
    }

    #[test]
    fn fragment_inputs_follow_vertex_slots() {
        let mut set = ProgramSet::new(VertexElements::all());
        let (vs, fs) = set.split_mut();
        let vf = vs.entry_mut();
        let pos_in = vf.resolve_input_parameter(Content::PositionObjectSpace).unwrap();
        let pos_out = vf
            .resolve_output_parameter(Content::PositionProjectiveSpace)
            .unwrap();
        vf.add_atom(
            stages::VS_TRANSFORM,
            Atom::assign(Operand::input(&pos_in), Operand::output(&pos_out)),
        );
        vf.resolve_output_parameter(Content::TextureCoordinate(0)).unwrap();
        vf.resolve_output_parameter(Content::NormalViewSpace).unwrap();

        // Resolved in the opposite order, so the slots start out swapped.
        let ff = fs.entry_mut();
        let normal = ff.resolve_input_parameter(Content::NormalViewSpace).unwrap();
        assert_eq!(normal.index(), 0);
        let colour = ff.resolve_output_parameter(Content::ColorDiffuse).unwrap();
        ff.add_atom(
            stages::FS_COLOUR_BEGIN,
            Atom::assign(Operand::input(&normal), Operand::output(&colour).with_mask(OperandMask::XYZ)),
        );

        ProgramProcessor::default().process(&mut set).unwrap();
        let linked = set
            .fs()
            .entry()
            .input_by_content(Content::NormalViewSpace)
            .unwrap();
        assert_eq!(linked.index(), 1);
        assert_eq!(linked.name(), "iTexcoord_1");
    }

    #[test]
    fn missing_position_is_invalid() {
        let mut set = ProgramSet::new(VertexElements::all());
        let colour = set
            .fs_mut()
            .entry_mut()
            .resolve_output_parameter(Content::ColorDiffuse)
            .unwrap();
        let white = Arc::new(Parameter::constant_float(&[1.0, 1.0, 1.0, 1.0]));
        set.fs_mut().entry_mut().add_atom(
            stages::FS_COLOUR_BEGIN,
            Atom::assign(Operand::input(&white), Operand::output(&colour)),
        );
        let err = ProgramProcessor::default().process(&mut set).unwrap_err();
        assert!(matches!(err, RtssError::InvalidProgram(_)));
    }

    #[test]
    fn unmatched_fragment_input_is_invalid() {
        let mut set = set_with_varyings(&[]);
        let (_, fs) = set.split_mut();
        let input = fs
            .entry_mut()
            .resolve_input_parameter(Content::TextureCoordinate(2))
            .unwrap();
        let colour = fs.entry().outputs()[0].clone();
        fs.entry_mut().add_atom(
            stages::FS_COLOUR_BEGIN,
            Atom::assign(Operand::input(&input), Operand::output(&colour).with_mask(OperandMask::XY)),
        );
        let err = ProgramProcessor::default().process(&mut set).unwrap_err();
        assert!(err.to_string().contains("iTexcoord_0"));
    }
}
