//! Shader Generator Integration Tests
//!
//! Tests for:
//! - validate_material: generation, binding, cache hits, determinism
//! - Light counts, alpha test opt-out, feature removal on resolve failure
//! - Fallback on compile failure and invalid programs
//! - Invalidation, compact policy, writer and target language changes
//! - Feature order in the emitted source
//! - Technique / scheme removal releasing programs
//! - Validation queue draining in arrival order

mod common;

use std::thread;

use common::{
    DST, MockBackend, SRC, add_material, bound_names, generate, generator, library_with,
    unlit_pass,
};
use myth_rtss::ir::VertexElements;
use myth_rtss::material::{CompareFunction, Pass};
use myth_rtss::srs::skinning::HardwareSkinning;
use myth_rtss::{CompactPolicy, GpuProgramType, ProgramWriter, RtssError};

// ============================================================================
// Generation
// ============================================================================

#[test]
fn unlit_material_gets_one_program_per_stage() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));

    assert_eq!(backend.compile_count(), 2);
    assert_eq!(generator.shader_count(GpuProgramType::Vertex), 1);
    assert_eq!(generator.shader_count(GpuProgramType::Fragment), 1);

    let technique = library.get("Plain").unwrap().technique(DST).unwrap();
    assert!(technique.generated);
    assert!(technique.supported);
    assert!(technique.passes[0].has_generated_programs());

    let (vs_name, fs_name) = bound_names(&library, "Plain", 0);
    assert!(vs_name.starts_with("RTSS_VS_"));
    assert!(fs_name.starts_with("RTSS_FS_"));

    let vs = backend.source_named(&vs_name).unwrap();
    assert!(vs.starts_with("#version 330"));
    assert!(vs.contains("gl_Position"));
    assert!(vs.contains("#include \"FFPLib_Transform.glsl\""));
}

#[test]
fn source_technique_is_left_untouched() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));

    let source = library.get("Plain").unwrap().technique(SRC).unwrap();
    assert!(!source.generated);
    assert!(!source.passes[0].has_generated_programs());
}

#[test]
fn second_validation_is_a_cache_hit() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));
    let first = bound_names(&library, "Plain", 0);

    assert!(generator.validate_material(&mut library, DST, "Plain"));
    assert_eq!(backend.attempts(), 2);
    assert_eq!(bound_names(&library, "Plain", 0), first);
}

#[test]
fn equal_materials_share_programs() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("A", unlit_pass());
    add_material(&mut library, "B", unlit_pass());

    assert!(generate(&mut generator, &mut library, "A"));
    assert!(generate(&mut generator, &mut library, "B"));

    assert_eq!(backend.compile_count(), 2);
    assert_eq!(bound_names(&library, "A", 0), bound_names(&library, "B", 0));

    let handle = library.get("B").unwrap().technique(DST).unwrap().passes[0]
        .programs
        .vertex
        .as_ref()
        .unwrap()
        .handle;
    assert_eq!(generator.program_manager().ref_count(handle), 2);
}

#[test]
fn generation_is_deterministic_across_generators() {
    let first = MockBackend::new();
    let second = MockBackend::new();
    let mut pass = Pass::new();
    pass.create_texture_unit_state("rock.png");

    for backend in [&first, &second] {
        let mut generator = generator(backend);
        let mut library = library_with("Rock", pass.clone());
        assert!(generator.create_shader_based_technique(&library, "Rock", SRC, DST, false));
        generator
            .get_render_state(DST, "Rock", 0)
            .unwrap()
            .set_light_count([1, 1, 0]);
        assert!(generator.validate_material(&mut library, DST, "Rock"));
    }

    assert_eq!(first.sources(), second.sources());
}

#[test]
fn directional_light_count_emits_one_light_call() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Lit", Pass::new());

    assert!(generator.create_shader_based_technique(&library, "Lit", SRC, DST, false));
    generator
        .get_render_state(DST, "Lit", 0)
        .unwrap()
        .set_light_count([1, 0, 0]);
    assert!(generator.validate_material(&mut library, DST, "Lit"));

    let (_, fs_name) = bound_names(&library, "Lit", 0);
    let fs = backend.source_named(&fs_name).unwrap();
    assert_eq!(fs.matches("FFP_Light_Directional_Diffuse(").count(), 1);
    assert!(!fs.contains("FFP_Light_Point"));
}

#[test]
fn alpha_test_follows_the_pass() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);

    let mut library = library_with("Opaque", unlit_pass());
    let mut cutout = unlit_pass();
    cutout.alpha_reject_function = CompareFunction::Greater;
    cutout.alpha_reject_value = 128;
    add_material(&mut library, "Cutout", cutout);

    assert!(generate(&mut generator, &mut library, "Opaque"));
    assert!(generate(&mut generator, &mut library, "Cutout"));

    let (_, opaque_fs) = bound_names(&library, "Opaque", 0);
    let (_, cutout_fs) = bound_names(&library, "Cutout", 0);
    assert!(!backend.source_named(&opaque_fs).unwrap().contains("FFP_Alpha_Test"));
    assert!(backend.source_named(&cutout_fs).unwrap().contains("FFP_Alpha_Test("));
}

#[test]
fn unresolvable_feature_is_dropped_and_generation_retried() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Static", unlit_pass());
    let mut skinned = unlit_pass();
    skinned.vertex_layout |= VertexElements::BLEND_INDICES | VertexElements::BLEND_WEIGHTS;
    add_material(&mut library, "Skinned", skinned);

    assert!(generator.create_shader_based_technique(&library, "Static", SRC, DST, false));
    assert!(generator.create_shader_based_technique(&library, "Skinned", SRC, DST, false));
    generator
        .render_state(DST)
        .unwrap()
        .add_template_sub_render_state(Box::new(HardwareSkinning::linear(24, 2)));

    assert!(generator.validate_material(&mut library, DST, "Static"));
    assert!(generator.validate_material(&mut library, DST, "Skinned"));

    let (static_vs, _) = bound_names(&library, "Static", 0);
    let (skinned_vs, _) = bound_names(&library, "Skinned", 0);
    assert!(!backend.source_named(&static_vs).unwrap().contains("SGX_BlendWeight"));
    assert_eq!(
        backend
            .source_named(&skinned_vs)
            .unwrap()
            .matches("SGX_BlendWeight(")
            .count(),
        2
    );
}

#[test]
fn skinning_runs_before_the_transform_it_feeds() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut skinned = unlit_pass();
    skinned.vertex_layout |= VertexElements::BLEND_INDICES | VertexElements::BLEND_WEIGHTS;
    let mut library = library_with("Skinned", skinned);

    assert!(generator.create_shader_based_technique(&library, "Skinned", SRC, DST, false));
    generator
        .render_state(DST)
        .unwrap()
        .add_template_sub_render_state(Box::new(HardwareSkinning::linear(24, 2)));
    assert!(generator.validate_material(&mut library, DST, "Skinned"));

    // Both features emit at the transform stage; execution order decides.
    let (vs_name, _) = bound_names(&library, "Skinned", 0);
    let vs = backend.source_named(&vs_name).unwrap();
    let last_blend = vs.rfind("SGX_BlendWeight(").unwrap();
    let transform = vs.find("gl_Position").unwrap();
    assert!(last_blend < transform);
}

#[test]
fn fragment_features_follow_execution_order() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut cutout = Pass::new();
    cutout.alpha_reject_function = CompareFunction::Greater;
    cutout.alpha_reject_value = 128;
    let mut library = library_with("Cutout", cutout);

    assert!(generator.create_shader_based_technique(&library, "Cutout", SRC, DST, false));
    generator
        .get_render_state(DST, "Cutout", 0)
        .unwrap()
        .set_light_count([1, 0, 0]);
    assert!(generator.validate_material(&mut library, DST, "Cutout"));

    let (_, fs_name) = bound_names(&library, "Cutout", 0);
    let fs = backend.source_named(&fs_name).unwrap();
    let light = fs.find("FFP_Light_Directional_Diffuse(").unwrap();
    let alpha = fs.find("FFP_Alpha_Test(").unwrap();
    assert!(light < alpha);
}

#[test]
fn user_programmable_pass_is_skipped_unless_requested() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut pass = unlit_pass();
    pass.has_user_programs = true;
    let mut library = library_with("Custom", pass.clone());
    add_material(&mut library, "Forced", pass);

    assert!(generate(&mut generator, &mut library, "Custom"));
    assert_eq!(backend.compile_count(), 0);
    let technique = library.get("Custom").unwrap().technique(DST).unwrap();
    assert!(!technique.passes[0].has_generated_programs());

    assert!(generator.create_shader_based_technique(&library, "Forced", SRC, DST, true));
    assert!(generator.validate_material(&mut library, DST, "Forced"));
    assert_eq!(backend.compile_count(), 2);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn compile_failure_falls_back_and_is_not_retried() {
    let backend = MockBackend::new();
    backend.reject_sources_containing("void main");
    let mut generator = generator(&backend);
    let mut library = library_with("Broken", unlit_pass());

    assert!(!generate(&mut generator, &mut library, "Broken"));
    let attempts = backend.attempts();
    assert_eq!(attempts, 1);

    let technique = library.get("Broken").unwrap().technique(DST).unwrap();
    assert!(!technique.supported);
    assert!(!technique.passes[0].has_generated_programs());
    assert_eq!(generator.is_technique_supported(DST, "Broken"), Some(false));

    assert!(!generator.validate_material(&mut library, DST, "Broken"));
    assert_eq!(backend.attempts(), attempts);

    backend.accept_all();
    assert!(generator.invalidate_material(DST, "Broken"));
    assert!(generator.validate_material(&mut library, DST, "Broken"));
    assert_eq!(generator.is_technique_supported(DST, "Broken"), Some(true));
}

#[test]
fn missing_position_cannot_produce_a_program() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut pass = unlit_pass();
    pass.vertex_layout = VertexElements::NORMAL;
    let mut library = library_with("NoPosition", pass);

    assert!(!generate(&mut generator, &mut library, "NoPosition"));
    assert_eq!(backend.attempts(), 0);
    assert_eq!(generator.shader_count(GpuProgramType::Vertex), 0);
}

#[test]
fn missing_source_technique_is_rejected() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let library = library_with("Plain", unlit_pass());

    assert!(!generator.create_shader_based_technique(&library, "Plain", "Missing", DST, false));
    assert!(!generator.create_shader_based_technique(&library, "Nope", SRC, DST, false));
    assert!(!generator.create_shader_based_technique(&library, "Plain", SRC, SRC, false));
}

#[test]
fn removed_material_fails_validation() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Gone", unlit_pass());

    assert!(generator.create_shader_based_technique(&library, "Gone", SRC, DST, false));
    library.remove("Gone");
    assert!(!generator.validate_material(&mut library, DST, "Gone"));
    assert!(!generator.validate_material(&mut library, "Unknown", "Gone"));
}

// ============================================================================
// Invalidation & settings
// ============================================================================

#[test]
fn invalidation_regenerates_without_recompiling() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));
    let before = bound_names(&library, "Plain", 0);

    assert!(generator.invalidate_scheme(DST));
    assert!(generator.validate_material(&mut library, DST, "Plain"));

    assert_eq!(backend.compile_count(), 2);
    assert_eq!(bound_names(&library, "Plain", 0), before);
    assert_eq!(generator.program_manager().len(), 2);
    assert!(!generator.invalidate_scheme("Unknown"));
}

#[test]
fn pass_change_is_picked_up_without_invalidation() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));
    let source = library.get_mut("Plain").unwrap().technique_mut(SRC).unwrap();
    source.passes[0].alpha_reject_function = CompareFunction::GreaterEqual;

    assert!(generator.validate_material(&mut library, DST, "Plain"));
    assert_eq!(backend.compile_count(), 3);
    // The old fragment program lost its only reference.
    assert_eq!(backend.unload_count(), 1);
}

#[test]
fn compact_policy_change_keeps_equal_programs() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));
    generator.set_vertex_shader_outputs_compact_policy(CompactPolicy::High);
    assert_eq!(generator.vertex_shader_outputs_compact_policy(), CompactPolicy::High);

    assert!(generator.validate_material(&mut library, DST, "Plain"));
    assert_eq!(backend.compile_count(), 2);
}

#[test]
fn target_language_switch_recompiles() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));
    generator.set_target_language("hlsl").unwrap();
    assert_eq!(generator.target_language(), "hlsl");

    assert!(generator.validate_material(&mut library, DST, "Plain"));
    assert_eq!(backend.compile_count(), 4);
    let (vs_name, _) = bound_names(&library, "Plain", 0);
    assert!(backend.source_named(&vs_name).unwrap().contains("mul("));
}

#[test]
fn glsl_version_change_recompiles() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));
    generator.settings_mut().glsl_version = 150;

    assert!(generator.validate_material(&mut library, DST, "Plain"));
    assert_eq!(backend.compile_count(), 4);
    assert_eq!(backend.unload_count(), 2);
    let (vs_name, fs_name) = bound_names(&library, "Plain", 0);
    assert!(vs_name.starts_with("RTSS_VS_glsl150_"));
    assert!(backend.source_named(&vs_name).unwrap().starts_with("#version 150"));
    assert!(backend.source_named(&fs_name).unwrap().starts_with("#version 150"));
}

#[test]
fn replacing_the_writer_recompiles() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));
    let before = bound_names(&library, "Plain", 0);
    generator.register_program_writer("glsl", ProgramWriter::Glsl { version: 400 });

    assert!(generator.validate_material(&mut library, DST, "Plain"));
    assert_eq!(backend.compile_count(), 4);
    let after = bound_names(&library, "Plain", 0);
    assert_ne!(before, after);
    assert!(backend.source_named(&after.0).unwrap().starts_with("#version 400"));

    // Same writer again: nothing to rebuild.
    generator.register_program_writer("glsl", ProgramWriter::Glsl { version: 400 });
    assert!(generator.validate_material(&mut library, DST, "Plain"));
    assert_eq!(backend.compile_count(), 4);
    assert_eq!(bound_names(&library, "Plain", 0), after);
}

#[test]
fn target_language_guard() {
    let backend = MockBackend::new();
    backend.mark_profile_unsupported("ps_4_0");
    let mut generator = generator(&backend);

    assert!(matches!(
        generator.set_target_language("metal"),
        Err(RtssError::UnsupportedLanguage(_))
    ));
    assert!(matches!(
        generator.set_target_language("hlsl"),
        Err(RtssError::UnsupportedLanguage(_))
    ));
    assert_eq!(generator.target_language(), "glsl");
    assert!(generator.set_target_language("glsles").is_ok());
}

#[test]
fn unknown_language_in_settings_falls_back() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());
    generator.settings_mut().target_language = "metal".to_string();

    assert!(!generate(&mut generator, &mut library, "Plain"));
    assert_eq!(backend.attempts(), 0);
}

#[test]
fn settings_change_applies_new_name_prefix() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());
    generator.settings_mut().program_name_prefix = "Gen_".to_string();

    assert!(generate(&mut generator, &mut library, "Plain"));
    let (vs_name, _) = bound_names(&library, "Plain", 0);
    assert!(vs_name.starts_with("Gen_VS_"));
}

// ============================================================================
// Removal
// ============================================================================

#[test]
fn removing_a_technique_releases_its_programs() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));
    assert!(generator.remove_shader_based_technique(&mut library, "Plain", DST));

    assert_eq!(backend.unload_count(), 2);
    assert!(generator.program_manager().is_empty());
    assert!(library.get("Plain").unwrap().technique(DST).is_none());
    assert!(!generator.remove_shader_based_technique(&mut library, "Plain", DST));
}

#[test]
fn removing_a_scheme_releases_every_technique() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("A", unlit_pass());
    add_material(&mut library, "B", Pass::new());

    assert!(generate(&mut generator, &mut library, "A"));
    assert!(generate(&mut generator, &mut library, "B"));
    assert_eq!(generator.program_manager().len(), 4);

    assert!(generator.remove_scheme(&mut library, DST));
    assert!(!generator.has_scheme(DST));
    assert!(generator.program_manager().is_empty());
    assert!(library.get("B").unwrap().technique(DST).is_none());
}

#[test]
fn remove_all_covers_every_scheme() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());

    assert!(generator.create_shader_based_technique(&library, "Plain", SRC, DST, false));
    assert!(generator.create_shader_based_technique(&library, "Plain", SRC, "Mobile", false));
    assert!(generator.validate_scheme(&mut library, DST));
    assert!(generator.validate_scheme(&mut library, "Mobile"));
    assert_eq!(backend.compile_count(), 2);

    assert_eq!(generator.remove_all_shader_based_techniques(&mut library, "Plain"), 2);
    assert_eq!(backend.unload_count(), 2);
}

#[test]
fn kept_programs_survive_until_flush() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    generator.settings_mut().keep_unreferenced_programs = true;
    let mut library = library_with("Plain", unlit_pass());

    assert!(generate(&mut generator, &mut library, "Plain"));
    assert!(generator.remove_shader_based_technique(&mut library, "Plain", DST));
    assert_eq!(backend.unload_count(), 0);
    assert_eq!(generator.flush_cache(), 2);
    assert_eq!(backend.unload_count(), 2);
}

// ============================================================================
// Validation queue
// ============================================================================

#[test]
fn queued_requests_run_on_drain() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());
    assert!(generator.create_shader_based_technique(&library, "Plain", SRC, DST, false));

    let queue = generator.validation_queue();
    let worker = {
        let queue = queue.clone();
        thread::spawn(move || queue.validate(DST, "Plain"))
    };
    assert!(worker.join().unwrap());
    assert_eq!(backend.compile_count(), 0);

    let report = generator.drain_validation_queue(&mut library);
    assert_eq!(report.validated, 1);
    assert_eq!(backend.compile_count(), 2);
    assert_eq!(queue.stats().pending(), 0);
}

#[test]
fn invalidation_posted_before_validation_is_applied_first() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());
    assert!(generate(&mut generator, &mut library, "Plain"));

    let queue = generator.validation_queue();
    queue.invalidate_material(DST, "Plain");
    queue.validate(DST, "Plain");

    let report = generator.drain_validation_queue(&mut library);
    assert_eq!(report.invalidations, 1);
    assert_eq!(report.validated, 1);
    assert_eq!(generator.is_technique_dirty(DST, "Plain"), Some(false));
    assert_eq!(backend.compile_count(), 2);
}

#[test]
fn back_to_back_invalidations_are_coalesced() {
    let backend = MockBackend::new();
    let mut generator = generator(&backend);
    let mut library = library_with("Plain", unlit_pass());
    assert!(generate(&mut generator, &mut library, "Plain"));

    let queue = generator.validation_queue();
    queue.invalidate_scheme(DST);
    queue.validate(DST, "Plain");
    queue.invalidate_scheme(DST);
    queue.invalidate_material(DST, "Plain");
    queue.invalidate_scheme(DST);

    let report = generator.drain_validation_queue(&mut library);
    assert_eq!(report.validated, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.invalidations, 3);
    assert_eq!(report.coalesced, 1);
    assert_eq!(queue.stats().drained, 5);

    // Posted after the validation: picked up by the next one.
    assert_eq!(generator.is_technique_dirty(DST, "Plain"), Some(true));
    assert!(generator.validate_material(&mut library, DST, "Plain"));
    assert_eq!(generator.is_technique_dirty(DST, "Plain"), Some(false));
    assert_eq!(backend.compile_count(), 2);
}
