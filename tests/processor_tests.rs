//! Program Processor Tests
//!
//! Tests for:
//! - Pruning of unreferenced locals and uniforms
//! - Varying packing under each compact policy
//! - Packed slots reaching the emitted source

use std::sync::Arc;

use myth_rtss::ir::{
    Atom, AutoConstantType, Content, GpuConstantType, Operand, OperandMask, Parameter,
    ProgramSet, VertexElements, stages,
};
use myth_rtss::writer::ProgramWriter;
use myth_rtss::{AssumeAllPresent, CompactPolicy, ProgramProcessor, ShaderGeneratorSettings};

/// Position pass-through plus one varying per entry of `vs_only` and `shared`.
/// Only `shared` varyings are read by the fragment program.
fn pipeline(shared: &[Content], vs_only: &[Content]) -> ProgramSet {
    let mut set = ProgramSet::new(VertexElements::all());
    let (vs, fs) = set.split_mut();

    let vf = vs.entry_mut();
    let position = vf
        .resolve_input_parameter(Content::PositionObjectSpace)
        .unwrap();
    let clip = vf
        .resolve_output_parameter(Content::PositionProjectiveSpace)
        .unwrap();
    vf.add_atom(
        stages::VS_TRANSFORM,
        Atom::assign(Operand::input(&position), Operand::output(&clip)),
    );

    let ff = fs.entry_mut();
    let colour = ff.resolve_output_parameter(Content::ColorDiffuse).unwrap();
    let black = Arc::new(Parameter::constant_float(&[0.0, 0.0, 0.0, 1.0]));
    ff.add_atom(
        stages::FS_COLOUR_BEGIN,
        Atom::assign(Operand::input(&black), Operand::output(&colour)),
    );

    for &content in shared.iter().chain(vs_only) {
        let out = vf.resolve_output_parameter(content).unwrap();
        let lanes = out.ty().lane_count();
        vf.add_atom(
            stages::VS_POST_PROCESS,
            Atom::assign(
                Operand::input(&position).with_mask(OperandMask::from_lanes(0, lanes)),
                Operand::output(&out),
            ),
        );
    }
    for &content in shared {
        let input = ff.resolve_input_parameter(content).unwrap();
        let lanes = input.ty().lane_count();
        ff.add_atom(
            stages::FS_COLOUR_END,
            Atom::assign(
                Operand::input(&input),
                Operand::output(&colour).with_mask(OperandMask::from_lanes(0, lanes)),
            ),
        );
    }
    set
}

fn process(policy: CompactPolicy, set: &mut ProgramSet) -> myth_rtss::processor::ProcessStats {
    ProgramProcessor::new(policy).process(set).unwrap()
}

// ============================================================================
// Pruning
// ============================================================================

#[test]
fn unreferenced_locals_and_uniforms_are_pruned() {
    let mut set = pipeline(&[], &[]);
    set.vs_mut().resolve_auto(AutoConstantType::WorldMatrix);
    set.vs_mut()
        .entry_mut()
        .resolve_local_named("scratch", GpuConstantType::Float4);

    let stats = process(CompactPolicy::Low, &mut set);
    assert_eq!(stats.pruned_uniforms, 1);
    assert_eq!(stats.pruned_locals, 1);
    assert!(set.vs().uniforms().is_empty());
    assert!(set.vs().entry().locals().is_empty());
}

// ============================================================================
// Packing
// ============================================================================

#[test]
fn scalars_and_vec2_share_one_slot() {
    let contents = [
        Content::TextureCoordinate(0),
        Content::FogFactor,
        Content::DepthViewSpace,
    ];

    let mut low = pipeline(&contents, &[]);
    let stats = process(CompactPolicy::Low, &mut low);
    assert_eq!((stats.packed_varyings, stats.varying_slots), (0, 3));

    for policy in [CompactPolicy::Medium, CompactPolicy::High] {
        let mut set = pipeline(&contents, &[]);
        let stats = process(policy, &mut set);
        assert_eq!((stats.packed_varyings, stats.varying_slots), (3, 1), "{policy:?}");
        assert_eq!(set.fs().entry().inputs().len(), 1);
        assert_eq!(set.fs().entry().inputs()[0].ty(), GpuConstantType::Float4);
    }
}

#[test]
fn vertex_only_varyings_are_packed_too() {
    let mut set = pipeline(
        &[Content::TextureCoordinate(0)],
        &[Content::TextureCoordinate(1)],
    );
    let stats = process(CompactPolicy::High, &mut set);
    assert_eq!(stats.packed_varyings, 2);
    assert_eq!(stats.varying_slots, 1);

    let input = &set.fs().entry().inputs()[0];
    assert_eq!(input.index(), 0);
    assert_eq!(input.ty(), GpuConstantType::Float4);
}

#[test]
fn packed_slots_reach_the_source() {
    let mut set = pipeline(
        &[Content::TextureCoordinate(0), Content::TextureCoordinate(1)],
        &[],
    );
    process(CompactPolicy::High, &mut set);

    let settings = ShaderGeneratorSettings::default();
    let glsl = ProgramWriter::for_language("glsl", &settings).unwrap();
    let vs = glsl.write_source_code(set.vs(), &AssumeAllPresent).unwrap();
    let fs = glsl.write_source_code(set.fs(), &AssumeAllPresent).unwrap();

    assert!(vs.contains("out vec4 vs_TEXCOORD0;"));
    assert!(!vs.contains("vs_TEXCOORD1"));
    assert!(fs.contains("in vec4 vs_TEXCOORD0;"));
    assert!(fs.contains("vs_TEXCOORD0.zw"));
}
