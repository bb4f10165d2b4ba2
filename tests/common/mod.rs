//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use myth_rtss::ir::VertexElements;
use myth_rtss::material::{MaterialLibrary, Pass};
use myth_rtss::{
    AssumeAllPresent, DEFAULT_SCHEME_NAME, ExternalProgramId, GpuProgramManager, GpuProgramType,
    RTSS_DEFAULT_SCHEME_NAME, ShaderGenerator, ShaderGeneratorSettings,
};

pub const SRC: &str = DEFAULT_SCHEME_NAME;
pub const DST: &str = RTSS_DEFAULT_SCHEME_NAME;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Mock backend
// ============================================================================

#[derive(Debug, Default)]
pub struct BackendState {
    /// `(name, source)` of every accepted program.
    pub compiled: Vec<(String, String)>,
    pub attempts: usize,
    pub unloaded: Vec<ExternalProgramId>,
    /// Sources containing this text fail to compile.
    pub reject_containing: Option<String>,
    pub unsupported_profiles: Vec<String>,
    next_id: u64,
}

/// Program compiler that records what it is given.
///
/// Clones share their state, so a test can keep one handle while the
/// generator owns another.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile_count(&self) -> usize {
        self.state.lock().compiled.len()
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    pub fn unload_count(&self) -> usize {
        self.state.lock().unloaded.len()
    }

    pub fn reject_sources_containing(&self, needle: &str) {
        self.state.lock().reject_containing = Some(needle.to_string());
    }

    pub fn accept_all(&self) {
        self.state.lock().reject_containing = None;
    }

    pub fn mark_profile_unsupported(&self, profile: &str) {
        self.state.lock().unsupported_profiles.push(profile.to_string());
    }

    pub fn sources(&self) -> Vec<String> {
        self.state
            .lock()
            .compiled
            .iter()
            .map(|(_, source)| source.clone())
            .collect()
    }

    pub fn source_named(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .compiled
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, source)| source.clone())
    }
}

impl GpuProgramManager for MockBackend {
    fn create_program_from_string(
        &mut self,
        name: &str,
        _language: &str,
        source: &str,
        _program_type: GpuProgramType,
    ) -> Result<ExternalProgramId, String> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if let Some(needle) = &state.reject_containing
            && source.contains(needle.as_str())
        {
            return Err(format!("0:1: error: rejected '{needle}'"));
        }
        state.next_id += 1;
        let id = ExternalProgramId(state.next_id);
        state.compiled.push((name.to_string(), source.to_string()));
        Ok(id)
    }

    fn is_syntax_supported(&self, profile: &str) -> bool {
        !self
            .state
            .lock()
            .unsupported_profiles
            .iter()
            .any(|p| p == profile)
    }

    fn unload_program(&mut self, id: ExternalProgramId) {
        self.state.lock().unloaded.push(id);
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn generator(backend: &MockBackend) -> ShaderGenerator {
    generator_with(backend, ShaderGeneratorSettings::default())
}

pub fn generator_with(backend: &MockBackend, settings: ShaderGeneratorSettings) -> ShaderGenerator {
    init_logger();
    ShaderGenerator::new(settings, Box::new(backend.clone()), Box::new(AssumeAllPresent))
}

/// Unlit pass with positions only.
pub fn unlit_pass() -> Pass {
    let mut pass = Pass::new();
    pass.lighting_enabled = false;
    pass.vertex_layout = VertexElements::POSITION;
    pass
}

/// Library holding one single-pass material in the source scheme.
pub fn library_with(name: &str, pass: Pass) -> MaterialLibrary {
    let mut library = MaterialLibrary::new();
    add_material(&mut library, name, pass);
    library
}

pub fn add_material(library: &mut MaterialLibrary, name: &str, pass: Pass) {
    let material = library.create(name);
    material.create_technique(SRC).passes.push(pass);
}

/// Registers `material` in the destination scheme and validates it.
pub fn generate(generator: &mut ShaderGenerator, library: &mut MaterialLibrary, material: &str) -> bool {
    assert!(generator.create_shader_based_technique(library, material, SRC, DST, false));
    generator.validate_material(library, DST, material)
}

/// `(vertex, fragment)` program names bound to pass `index` of the generated technique.
pub fn bound_names(library: &MaterialLibrary, material: &str, index: usize) -> (String, String) {
    let pass = &library.get(material).unwrap().technique(DST).unwrap().passes[index];
    (
        pass.programs.vertex.as_ref().unwrap().name.clone(),
        pass.programs.fragment.as_ref().unwrap().name.clone(),
    )
}
