//! Shader IR Tests
//!
//! Tests for:
//! - Program sets honouring the pass vertex layout
//! - Uniform resolution: auto constants, samplers, array growth
//! - Fingerprints as cache keys

use myth_rtss::RtssError;
use myth_rtss::ir::{
    Atom, AutoConstantType, Content, GpuConstantType, Operand, Program, ProgramSet, Semantic,
    VertexElements, Variability, fingerprint, stages,
};

/// Transforms the object-space position by the world-view-projection matrix.
fn transformed(set: &mut ProgramSet) {
    let vs = set.vs_mut();
    let wvp = vs.resolve_auto(AutoConstantType::WorldViewProjMatrix);
    let main = vs.entry_mut();
    let position = main
        .resolve_input_parameter(Content::PositionObjectSpace)
        .unwrap();
    let clip = main
        .resolve_output_parameter(Content::PositionProjectiveSpace)
        .unwrap();
    main.add_atom(
        stages::VS_TRANSFORM,
        Atom::invoke(
            "FFP_Transform",
            [
                Operand::input(&wvp),
                Operand::input(&position),
                Operand::output(&clip),
            ],
        ),
    );
}

// ============================================================================
// Vertex layout
// ============================================================================

#[test]
fn layout_limits_vertex_attributes() {
    let mut set = ProgramSet::new(VertexElements::POSITION | VertexElements::NORMAL);
    let main = set.vs_mut().entry_mut();

    assert!(main.resolve_input_parameter(Content::NormalObjectSpace).is_ok());
    let err = main
        .resolve_input_parameter(Content::BlendWeights)
        .unwrap_err();
    assert!(err.is_resolve_failure());
    assert!(matches!(err, RtssError::ResolveFailure { .. }));

    // Fragment inputs are varyings and never checked against the layout.
    let fs = set.fs_mut().entry_mut();
    assert!(fs.resolve_input_parameter(Content::BlendWeights).is_ok());
}

#[test]
fn vertex_and_fragment_slots_differ() {
    let mut set = ProgramSet::new(VertexElements::all());
    let input = set
        .vs_mut()
        .entry_mut()
        .resolve_input_parameter(Content::NormalObjectSpace)
        .unwrap();
    let varying = set
        .fs_mut()
        .entry_mut()
        .resolve_input_parameter(Content::NormalViewSpace)
        .unwrap();

    assert_eq!(input.semantic(), Semantic::Normal);
    assert_eq!(varying.semantic(), Semantic::TexCoord);
    assert_eq!(varying.ty(), GpuConstantType::Float3);
}

// ============================================================================
// Uniforms
// ============================================================================

#[test]
fn auto_constants_resolve_once() {
    let mut program = Program::new(myth_rtss::GpuProgramType::Vertex);
    let a = program.resolve_auto_indexed(AutoConstantType::LightPositionViewSpace, 0);
    let b = program.resolve_auto_indexed(AutoConstantType::LightPositionViewSpace, 0);
    let c = program.resolve_auto_indexed(AutoConstantType::LightPositionViewSpace, 1);

    assert!(myth_rtss::ir::same_parameter(&a, &b));
    assert!(!myth_rtss::ir::same_parameter(&a, &c));
    assert_eq!(program.uniforms().len(), 2);
}

#[test]
fn array_constants_grow_to_the_largest_request() {
    let mut program = Program::new(myth_rtss::GpuProgramType::Vertex);
    program.resolve_auto_array(AutoConstantType::WorldMatrixArray3x4, 24);
    let grown = program.resolve_auto_array(AutoConstantType::WorldMatrixArray3x4, 60);
    let kept = program.resolve_auto_array(AutoConstantType::WorldMatrixArray3x4, 32);

    assert_eq!(grown.array_size(), 60);
    assert_eq!(kept.array_size(), 60);
    assert_eq!(program.uniforms().len(), 1);
}

#[test]
fn samplers_are_named_by_unit() {
    let mut program = Program::new(myth_rtss::GpuProgramType::Fragment);
    let sampler = program
        .resolve_sampler(GpuConstantType::Sampler2D, 3)
        .unwrap();
    assert_eq!(sampler.name(), "gTextureSampler3");

    assert!(program.resolve_sampler(GpuConstantType::Float4, 0).is_err());
    assert!(
        program
            .resolve_parameter(
                GpuConstantType::SamplerCube,
                Some(3),
                Variability::GLOBAL,
                "gTextureSampler",
                0
            )
            .is_err()
    );
}

// ============================================================================
// Fingerprints
// ============================================================================

#[test]
fn independently_built_sets_share_fingerprints() {
    let mut a = ProgramSet::new(VertexElements::all());
    let mut b = ProgramSet::new(VertexElements::all());
    transformed(&mut a);
    transformed(&mut b);

    assert_eq!(fingerprint(a.vs()), fingerprint(b.vs()));
    assert_eq!(fingerprint(a.fs()), fingerprint(b.fs()));
    assert_ne!(fingerprint(a.vs()), fingerprint(a.fs()));
}

#[test]
fn includes_and_defines_change_the_fingerprint() {
    let mut set = ProgramSet::new(VertexElements::all());
    transformed(&mut set);
    let before = fingerprint(set.vs());

    set.vs_mut().add_dependency("FFPLib_Transform");
    let with_include = fingerprint(set.vs());
    assert_ne!(before, with_include);

    set.vs_mut().add_dependency("FFPLib_Transform");
    assert_eq!(fingerprint(set.vs()), with_include);

    set.vs_mut().add_preprocessor_define("USE_FOG");
    assert_ne!(fingerprint(set.vs()), with_include);
}
