//! Shader Generator
//!
//! [`ShaderGenerator`] is the one context object of the system. It owns the
//! sub render state registry, the scheme table, the program cache and the
//! engine's compiler, and turns source techniques into generated ones.
//!
//! | Operation                          | Effect                                            |
//! |------------------------------------|---------------------------------------------------|
//! | `create_shader_based_technique`    | Registers `(material, src scheme) → dst scheme`   |
//! | `validate_material`                | Generates (or confirms) the dst technique         |
//! | `get_render_state`                 | Per-pass override state, created on demand        |
//! | `invalidate_scheme` / `_material`  | Forces regeneration on the next validation        |
//! | `drain_validation_queue`           | Runs requests posted from other threads           |
//!
//! # Generation
//!
//! The effective state of a pass is the FFP baseline merged with the scheme
//! template and the pass overrides. Features opt in against the source pass,
//! emit into a fresh [`ProgramSet`](crate::ir::ProgramSet), and the processed
//! programs are deduplicated by the [`ProgramManager`]. A feature that fails
//! to resolve is dropped and the pass is generated again without it. Any other
//! failure leaves the destination technique unsupported, so the engine renders
//! the source technique instead; the warning is logged once per
//! `(material, scheme)`.
//!
//! Validation is cheap when nothing changed: each generated pass remembers a
//! hash of its inputs and the call returns before any state is merged.

mod builder;
mod queue;

pub use builder::FFP_BASELINE;
pub use queue::{DrainReport, QueueStats, ValidationQueue, ValidationRequest};

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use slotmap::{SlotMap, new_key_type};

use crate::errors::{Result, RtssError};
use crate::external::{GpuProgramManager, ResourceLocator};
use crate::ir::GpuProgramType;
use crate::material::{MaterialLibrary, Pass, PassPrograms};
use crate::processor::ProgramProcessor;
use crate::program_manager::{ProgramHandle, ProgramManager};
use crate::render_state::{RenderState, SrsRegistry, SubRenderState, SubRenderStateFactory};
use crate::script::{
    LIGHT_COUNT_PROPERTY, PropertyNode, RTSHADER_SYSTEM_BLOCK, ScriptSerializer, ScriptTranslator,
};
use crate::settings::{CompactPolicy, ShaderGeneratorSettings};
use crate::utils::interner;
use crate::writer::ProgramWriter;

use builder::PassBuilder;

new_key_type! {
    /// Index of a generated technique inside its scheme.
    pub struct TechniqueKey;
}

// ─── Scheme table ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct GeneratedPass {
    /// Input hash the programs were generated from.
    signature: Option<u64>,
    vertex: Option<ProgramHandle>,
    fragment: Option<ProgramHandle>,
}

#[derive(Debug)]
struct GeneratedTechnique {
    material: String,
    src_scheme: String,
    over_programmable: bool,
    dirty: bool,
    supported: bool,
    passes: Vec<GeneratedPass>,
}

fn pass_handles(passes: &[GeneratedPass]) -> Vec<ProgramHandle> {
    passes
        .iter()
        .flat_map(|p| p.vertex.into_iter().chain(p.fragment))
        .collect()
}

#[derive(Debug, Default)]
struct Scheme {
    template: RenderState,
    /// Per-material, per-pass override states.
    overrides: BTreeMap<String, BTreeMap<usize, RenderState>>,
    techniques: SlotMap<TechniqueKey, GeneratedTechnique>,
    by_material: FxHashMap<String, TechniqueKey>,
}

impl Scheme {
    fn mark_dirty(&mut self) {
        for technique in self.techniques.values_mut() {
            technique.dirty = true;
        }
    }

    fn mark_material_dirty(&mut self, material: &str) -> bool {
        let Some(&key) = self.by_material.get(material) else {
            return false;
        };
        if let Some(technique) = self.techniques.get_mut(key) {
            technique.dirty = true;
        }
        true
    }
}

// ─── ShaderGenerator ─────────────────────────────────────────────────────────

/// Runtime shader generator context.
pub struct ShaderGenerator {
    settings: ShaderGeneratorSettings,
    /// Set by `settings_mut`; applied before the next generation.
    settings_dirty: bool,
    registry: SrsRegistry,
    schemes: BTreeMap<String, Scheme>,
    program_manager: ProgramManager,
    processor: ProgramProcessor,
    backend: Box<dyn GpuProgramManager>,
    locator: Box<dyn ResourceLocator>,
    requests: flume::Receiver<ValidationRequest>,
    queue: ValidationQueue,
    queue_stats: Arc<Mutex<QueueStats>>,
    /// `(material, scheme)` pairs whose fallback was already reported.
    warned_materials: FxHashSet<(String, String)>,
    /// `(scheme, language)` pairs reported as lacking a writer.
    warned_languages: FxHashSet<(String, String)>,
}

impl fmt::Debug for ShaderGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderGenerator")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("schemes", &self.schemes.keys().collect::<Vec<_>>())
            .field("programs", &self.program_manager.len())
            .finish_non_exhaustive()
    }
}

impl ShaderGenerator {
    /// Generator with every built-in feature registered.
    pub fn new(
        settings: ShaderGeneratorSettings,
        backend: Box<dyn GpuProgramManager>,
        locator: Box<dyn ResourceLocator>,
    ) -> Self {
        interner::preload_library_names();

        let (sender, requests) = flume::unbounded();
        let queue_stats = Arc::new(Mutex::new(QueueStats::default()));

        log::info!(
            "Shader generator targeting {} ({:?} varying compaction)",
            settings.target_language,
            settings.vertex_shader_outputs_compact_policy
        );

        Self {
            program_manager: ProgramManager::new(&settings),
            processor: ProgramProcessor::new(settings.vertex_shader_outputs_compact_policy),
            settings,
            settings_dirty: false,
            registry: SrsRegistry::with_builtin(),
            schemes: BTreeMap::new(),
            backend,
            locator,
            requests,
            queue: ValidationQueue::new(sender, Arc::clone(&queue_stats)),
            queue_stats,
            warned_materials: FxHashSet::default(),
            warned_languages: FxHashSet::default(),
        }
    }

    // ── Settings ─────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &ShaderGeneratorSettings {
        &self.settings
    }

    /// Mutable settings. Every generated technique is regenerated on its next
    /// validation.
    pub fn settings_mut(&mut self) -> &mut ShaderGeneratorSettings {
        self.settings_dirty = true;
        self.invalidate_all();
        &mut self.settings
    }

    fn apply_pending_settings(&mut self) {
        if std::mem::take(&mut self.settings_dirty) {
            self.program_manager.apply_settings(&self.settings);
            self.processor
                .set_policy(self.settings.vertex_shader_outputs_compact_policy);
        }
    }

    #[inline]
    #[must_use]
    pub fn target_language(&self) -> &str {
        &self.settings.target_language
    }

    /// Switches the emitted language.
    ///
    /// Fails with [`RtssError::UnsupportedLanguage`] when no writer is
    /// registered for `language` or the backend rejects its profile.
    pub fn set_target_language(&mut self, language: &str) -> Result<()> {
        self.apply_pending_settings();
        if !self.program_manager.has_writer(language) {
            return Err(RtssError::UnsupportedLanguage(language.to_string()));
        }

        let profile = ShaderGeneratorSettings {
            target_language: language.to_string(),
            ..self.settings.clone()
        }
        .target_profile();
        if !self.backend.is_syntax_supported(&profile) {
            return Err(RtssError::UnsupportedLanguage(format!(
                "{language} (profile {profile})"
            )));
        }

        if self.settings.target_language != language {
            log::info!("Shader generator target language: {language}");
            self.settings.target_language = language.to_string();
            self.invalidate_all();
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn vertex_shader_outputs_compact_policy(&self) -> CompactPolicy {
        self.settings.vertex_shader_outputs_compact_policy
    }

    pub fn set_vertex_shader_outputs_compact_policy(&mut self, policy: CompactPolicy) {
        if self.settings.vertex_shader_outputs_compact_policy == policy {
            return;
        }
        self.settings.vertex_shader_outputs_compact_policy = policy;
        self.processor.set_policy(policy);
        self.invalidate_all();
    }

    // ── Writers and factories ────────────────────────────────────────────────

    /// Registers (or replaces) the writer for `language`.
    pub fn register_program_writer(&mut self, language: &str, writer: ProgramWriter) {
        self.program_manager.register_writer(language, writer);
        self.invalidate_all();
    }

    pub fn add_sub_render_state_factory(
        &mut self,
        factory: Box<dyn SubRenderStateFactory>,
    ) -> Result<()> {
        let type_name = factory.type_name().to_string();
        if let Err(e) = self.registry.add(factory) {
            log::warn!("{e}");
            return Err(e);
        }
        log::debug!("Registered sub render state factory {type_name}");
        self.invalidate_all();
        Ok(())
    }

    /// Unregisters a factory. Instances of its type are dropped from every
    /// template and override state.
    pub fn remove_sub_render_state_factory(
        &mut self,
        type_name: &str,
    ) -> Option<Box<dyn SubRenderStateFactory>> {
        let removed = self.registry.remove(type_name)?;
        for scheme in self.schemes.values_mut() {
            scheme.template.remove_sub_render_state(type_name);
            for state in scheme.overrides.values_mut().flat_map(BTreeMap::values_mut) {
                state.remove_sub_render_state(type_name);
            }
            scheme.mark_dirty();
        }
        Some(removed)
    }

    pub fn create_sub_render_state(&self, type_name: &str) -> Result<Box<dyn SubRenderState>> {
        self.registry.create(type_name)
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SrsRegistry {
        &self.registry
    }

    // ── Schemes ──────────────────────────────────────────────────────────────

    /// Creates an empty scheme. Returns `false` when it already exists.
    pub fn create_scheme(&mut self, name: &str) -> bool {
        if self.schemes.contains_key(name) {
            return false;
        }
        log::info!("Created shader generator scheme '{name}'");
        self.schemes.insert(name.to_string(), Scheme::default());
        true
    }

    #[must_use]
    pub fn has_scheme(&self, name: &str) -> bool {
        self.schemes.contains_key(name)
    }

    pub fn scheme_names(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }

    /// Drops a scheme, its generated techniques and their program references.
    pub fn remove_scheme(&mut self, materials: &mut MaterialLibrary, name: &str) -> bool {
        let Some(scheme) = self.schemes.remove(name) else {
            return false;
        };
        for technique in scheme.techniques.values() {
            release_handles(
                &mut self.program_manager,
                self.backend.as_mut(),
                pass_handles(&technique.passes),
            );
            detach_generated(materials, &technique.material, name);
        }
        self.warned_materials.retain(|(_, scheme)| scheme != name);
        log::info!("Removed shader generator scheme '{name}'");
        true
    }

    /// Template state of `scheme`, shared by all its materials.
    pub fn render_state(&mut self, scheme: &str) -> Option<&mut RenderState> {
        let scheme = self.schemes.get_mut(scheme)?;
        scheme.mark_dirty();
        Some(&mut scheme.template)
    }

    /// Override state of one pass, created empty on first request.
    ///
    /// The pass renders with the scheme template plus these overrides.
    pub fn get_render_state(
        &mut self,
        scheme: &str,
        material: &str,
        pass_index: usize,
    ) -> Result<&mut RenderState> {
        let scheme = self
            .schemes
            .get_mut(scheme)
            .ok_or_else(|| RtssError::SchemeNotFound(scheme.to_string()))?;
        scheme.mark_material_dirty(material);
        Ok(scheme
            .overrides
            .entry(material.to_string())
            .or_default()
            .entry(pass_index)
            .or_default())
    }

    // ── Techniques ───────────────────────────────────────────────────────────

    /// Records that `material` gets a `dst_scheme` technique generated from
    /// its `src_scheme` technique, creating the scheme if needed.
    ///
    /// Returns `false` when the material or its source technique is missing.
    pub fn create_shader_based_technique(
        &mut self,
        materials: &MaterialLibrary,
        material: &str,
        src_scheme: &str,
        dst_scheme: &str,
        over_programmable: bool,
    ) -> bool {
        let Some(source) = materials.get(material) else {
            log::warn!("{}", RtssError::MaterialNotFound(material.to_string()));
            return false;
        };
        if source.technique(src_scheme).is_none() || src_scheme == dst_scheme {
            return false;
        }
        let over_programmable =
            over_programmable || self.settings.create_shader_over_programmable_pass;

        if !self.schemes.contains_key(dst_scheme) {
            self.create_scheme(dst_scheme);
        }
        let Some(scheme) = self.schemes.get_mut(dst_scheme) else {
            return false;
        };

        if let Some(&key) = scheme.by_material.get(material)
            && let Some(technique) = scheme.techniques.get_mut(key)
        {
            if technique.src_scheme != src_scheme || technique.over_programmable != over_programmable
            {
                technique.src_scheme = src_scheme.to_string();
                technique.over_programmable = over_programmable;
                technique.dirty = true;
            }
            return true;
        }

        let key = scheme.techniques.insert(GeneratedTechnique {
            material: material.to_string(),
            src_scheme: src_scheme.to_string(),
            over_programmable,
            dirty: true,
            supported: false,
            passes: Vec::new(),
        });
        scheme.by_material.insert(material.to_string(), key);
        true
    }

    /// Removes the `dst_scheme` technique of `material` and releases its
    /// programs.
    pub fn remove_shader_based_technique(
        &mut self,
        materials: &mut MaterialLibrary,
        material: &str,
        dst_scheme: &str,
    ) -> bool {
        let Some(scheme) = self.schemes.get_mut(dst_scheme) else {
            return false;
        };
        let Some(key) = scheme.by_material.remove(material) else {
            return false;
        };
        scheme.overrides.remove(material);
        if let Some(technique) = scheme.techniques.remove(key) {
            release_handles(
                &mut self.program_manager,
                self.backend.as_mut(),
                pass_handles(&technique.passes),
            );
        }
        detach_generated(materials, material, dst_scheme);
        self.warned_materials
            .remove(&(material.to_string(), dst_scheme.to_string()));
        true
    }

    /// Removes `material`'s generated techniques from every scheme.
    pub fn remove_all_shader_based_techniques(
        &mut self,
        materials: &mut MaterialLibrary,
        material: &str,
    ) -> usize {
        let schemes: Vec<String> = self
            .schemes
            .iter()
            .filter(|(_, s)| s.by_material.contains_key(material))
            .map(|(name, _)| name.clone())
            .collect();
        schemes
            .iter()
            .filter(|scheme| self.remove_shader_based_technique(materials, material, scheme))
            .count()
    }

    // ── Validation ───────────────────────────────────────────────────────────

    /// Brings the `scheme` technique of `material` up to date.
    ///
    /// Returns `true` when the generated technique is usable. On `false` the
    /// engine keeps rendering the source technique.
    pub fn validate_material(
        &mut self,
        materials: &mut MaterialLibrary,
        scheme_name: &str,
        material_name: &str,
    ) -> bool {
        self.apply_pending_settings();

        let language = self.settings.target_language.clone();
        let Some(writer) = self.program_manager.writer(&language) else {
            if self
                .warned_languages
                .insert((scheme_name.to_string(), language.clone()))
            {
                log::warn!(
                    "{}; scheme '{scheme_name}' keeps its source techniques",
                    RtssError::UnsupportedLanguage(language)
                );
            }
            return false;
        };

        let Some(scheme) = self.schemes.get_mut(scheme_name) else {
            return false;
        };
        let Some(&key) = scheme.by_material.get(material_name) else {
            return false;
        };
        let Some(technique) = scheme.techniques.get_mut(key) else {
            return false;
        };
        let Some(material) = materials.get_mut(material_name) else {
            technique.supported = false;
            let cause = RtssError::MaterialNotFound(material_name.to_string());
            warn_once(&mut self.warned_materials, material_name, scheme_name, &cause);
            return false;
        };
        let Some(src_technique) = material.technique(&technique.src_scheme).cloned() else {
            technique.supported = false;
            let cause = RtssError::TechniqueNotFound {
                material: material_name.to_string(),
                scheme: technique.src_scheme.clone(),
            };
            warn_once(&mut self.warned_materials, material_name, scheme_name, &cause);
            return false;
        };

        let over_programmable = technique.over_programmable;
        let policy = self.processor.policy();
        let signatures: Vec<u64> = src_technique
            .passes
            .iter()
            .enumerate()
            .map(|(i, pass)| {
                let overrides = scheme.overrides.get(material_name).and_then(|m| m.get(&i));
                pass_signature(
                    &scheme.template,
                    overrides,
                    pass,
                    over_programmable,
                    writer,
                    policy,
                )
            })
            .collect();

        let up_to_date = !technique.dirty
            && technique.passes.len() == signatures.len()
            && technique
                .passes
                .iter()
                .zip(&signatures)
                .all(|(pass, signature)| pass.signature == Some(*signature))
            && material
                .technique(scheme_name)
                .is_some_and(|t| t.generated);
        if up_to_date {
            return technique.supported;
        }

        // ── Generate every pass ──
        let mut builder = PassBuilder {
            registry: &self.registry,
            processor: &self.processor,
            programs: &mut self.program_manager,
            backend: self.backend.as_mut(),
            locator: self.locator.as_ref(),
            language: &language,
        };

        let mut passes = Vec::with_capacity(signatures.len());
        let mut generated = Vec::with_capacity(signatures.len());
        let mut failure = None;
        for ((i, src_pass), &signature) in src_technique.passes.iter().enumerate().zip(&signatures)
        {
            if src_pass.has_user_programs && !over_programmable {
                passes.push(src_pass.clone());
                generated.push(GeneratedPass {
                    signature: Some(signature),
                    ..GeneratedPass::default()
                });
                continue;
            }

            let overrides = scheme.overrides.get(material_name).and_then(|m| m.get(&i));
            let built = builder
                .effective_state(&scheme.template, overrides)
                .and_then(|state| builder.build(state, src_pass));
            match built {
                Ok(built) => {
                    generated.push(GeneratedPass {
                        signature: Some(signature),
                        vertex: Some(built.vertex),
                        fragment: Some(built.fragment),
                    });
                    passes.push(built.pass);
                }
                Err(e) => {
                    failure = Some((i, e));
                    break;
                }
            }
        }

        // New programs are acquired before the old ones are released, so an
        // unchanged program keeps its cache entry.
        let previous = std::mem::take(&mut technique.passes);
        technique.dirty = false;
        let backend = self.backend.as_mut();

        let dst = material.create_technique(scheme_name);
        dst.generated = true;

        match failure {
            None => {
                release_handles(&mut self.program_manager, backend, pass_handles(&previous));
                technique.passes = generated;
                technique.supported = true;
                dst.passes = passes;
                dst.supported = true;
                log::debug!(
                    "Generated {} pass(es) of '{material_name}' in scheme '{scheme_name}'",
                    dst.passes.len()
                );
                true
            }
            Some((index, cause)) => {
                release_handles(&mut self.program_manager, backend, pass_handles(&generated));
                release_handles(&mut self.program_manager, backend, pass_handles(&previous));
                technique.passes = signatures
                    .iter()
                    .map(|&signature| GeneratedPass {
                        signature: Some(signature),
                        ..GeneratedPass::default()
                    })
                    .collect();
                technique.supported = false;
                dst.passes = src_technique
                    .passes
                    .iter()
                    .map(|pass| Pass {
                        programs: PassPrograms::default(),
                        ..pass.clone()
                    })
                    .collect();
                dst.supported = false;
                let cause = format!("pass {index}: {cause}");
                warn_once(&mut self.warned_materials, material_name, scheme_name, &cause);
                false
            }
        }
    }

    /// Validates every material registered in `scheme`. Returns `true` when
    /// all of them produced usable techniques.
    pub fn validate_scheme(&mut self, materials: &mut MaterialLibrary, scheme: &str) -> bool {
        let Some(entry) = self.schemes.get(scheme) else {
            return false;
        };
        let mut names: Vec<String> = entry.by_material.keys().cloned().collect();
        names.sort_unstable();
        names.iter().fold(true, |all, material| {
            self.validate_material(materials, scheme, material) && all
        })
    }

    /// Marks every technique of `scheme` for regeneration.
    pub fn invalidate_scheme(&mut self, scheme: &str) -> bool {
        let Some(scheme) = self.schemes.get_mut(scheme) else {
            return false;
        };
        scheme.mark_dirty();
        true
    }

    /// Marks the `scheme` technique of `material` for regeneration.
    pub fn invalidate_material(&mut self, scheme: &str, material: &str) -> bool {
        self.schemes
            .get_mut(scheme)
            .is_some_and(|s| s.mark_material_dirty(material))
    }

    fn invalidate_all(&mut self) {
        for scheme in self.schemes.values_mut() {
            scheme.mark_dirty();
        }
    }

    /// Whether the last validation of `material` in `scheme` succeeded.
    #[must_use]
    pub fn is_technique_supported(&self, scheme: &str, material: &str) -> Option<bool> {
        let scheme = self.schemes.get(scheme)?;
        let key = scheme.by_material.get(material)?;
        scheme.techniques.get(*key).map(|t| t.supported)
    }

    /// Whether the next validation of `material` in `scheme` regenerates.
    #[must_use]
    pub fn is_technique_dirty(&self, scheme: &str, material: &str) -> Option<bool> {
        let scheme = self.schemes.get(scheme)?;
        let key = scheme.by_material.get(material)?;
        scheme.techniques.get(*key).map(|t| t.dirty)
    }

    // ── Cross-thread requests ────────────────────────────────────────────────

    /// A handle other threads use to post validation requests.
    #[must_use]
    pub fn validation_queue(&self) -> ValidationQueue {
        self.queue.clone()
    }

    /// Runs every pending request in arrival order.
    ///
    /// A run of back-to-back invalidations is deduplicated and applied before
    /// the next validation, so a reload posted ahead of its validation is
    /// regenerated by it. An invalidation posted after a validation marks the
    /// result dirty for the next one.
    pub fn drain_validation_queue(&mut self, materials: &mut MaterialLibrary) -> DrainReport {
        let mut report = DrainReport::default();
        let mut pending: Vec<ValidationRequest> = Vec::new();
        let mut drained = 0_u64;

        while let Ok(request) = self.requests.try_recv() {
            drained += 1;
            match request {
                ValidationRequest::Validate { scheme, material } => {
                    self.apply_invalidations(&mut pending, &mut report);
                    if self.validate_material(materials, &scheme, &material) {
                        report.validated += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                invalidation => {
                    if pending.contains(&invalidation) {
                        report.coalesced += 1;
                    } else {
                        pending.push(invalidation);
                    }
                }
            }
        }
        self.apply_invalidations(&mut pending, &mut report);
        self.queue_stats.lock().drained += drained;
        report
    }

    fn apply_invalidations(
        &mut self,
        pending: &mut Vec<ValidationRequest>,
        report: &mut DrainReport,
    ) {
        for request in pending.drain(..) {
            match request {
                ValidationRequest::InvalidateScheme(scheme) => {
                    self.invalidate_scheme(&scheme);
                }
                ValidationRequest::InvalidateMaterial { scheme, material } => {
                    self.invalidate_material(&scheme, &material);
                }
                ValidationRequest::Validate { .. } => continue,
            }
            report.invalidations += 1;
        }
    }

    // ── Material scripts ─────────────────────────────────────────────────────

    /// Applies the properties of a pass's `rtshader_system` block to its
    /// override state. Returns the number of properties applied; the rest
    /// are recorded in `translator`.
    pub fn apply_script_properties(
        &mut self,
        scheme: &str,
        material: &str,
        pass_index: usize,
        pass: &Pass,
        nodes: &[PropertyNode],
        translator: &mut ScriptTranslator,
    ) -> Result<usize> {
        let Some(entry) = self.schemes.get_mut(scheme) else {
            return Err(RtssError::SchemeNotFound(scheme.to_string()));
        };
        entry.mark_material_dirty(material);
        let state = entry
            .overrides
            .entry(material.to_string())
            .or_default()
            .entry(pass_index)
            .or_default();

        let mut applied = 0;
        for node in nodes {
            if node.name == LIGHT_COUNT_PROPERTY {
                let counts = [0, 1, 2].map(|i| translator.parse_u32(node, i));
                if let [Some(directional), Some(point), Some(spot)] = counts {
                    state.set_light_count([directional, point, spot]);
                    applied += 1;
                }
                continue;
            }
            if let Some(srs) = translator.translate(&self.registry, node, pass) {
                state.add_template_sub_render_state(srs);
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Writes the override state of one pass as an `rtshader_system` block.
    ///
    /// Returns `false` (writing nothing) when the pass has no overrides.
    pub fn serialize_pass_attributes(
        &self,
        scheme: &str,
        material: &str,
        pass_index: usize,
        src_pass: &Pass,
        dst_pass: &Pass,
        serializer: &mut ScriptSerializer,
    ) -> bool {
        let Some(state) = self
            .schemes
            .get(scheme)
            .and_then(|s| s.overrides.get(material))
            .and_then(|m| m.get(&pass_index))
        else {
            return false;
        };
        if state.is_empty() && !state.has_light_count() {
            return false;
        }

        serializer.begin_section(RTSHADER_SYSTEM_BLOCK);
        if state.has_light_count() {
            let counts = state.light_count().map(|c| c.to_string());
            let values: Vec<&str> = counts.iter().map(String::as_str).collect();
            serializer.write_attribute(LIGHT_COUNT_PROPERTY, &values);
        }
        for srs in state.sub_render_states() {
            if let Some(factory) = self.registry.get(srs.type_name()) {
                factory.write_instance(serializer, srs.as_ref(), src_pass, dst_pass);
            }
        }
        serializer.end_section();
        true
    }

    // ── Program cache ────────────────────────────────────────────────────────

    /// Live compiled programs of `program_type`.
    #[must_use]
    pub fn shader_count(&self, program_type: GpuProgramType) -> usize {
        self.program_manager.shader_count(program_type)
    }

    #[inline]
    #[must_use]
    pub fn program_manager(&self) -> &ProgramManager {
        &self.program_manager
    }

    /// Unloads cached programs no technique references.
    pub fn flush_cache(&mut self) -> usize {
        self.program_manager.flush_cache(self.backend.as_mut())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Hash of everything the programs of one pass depend on.
fn pass_signature(
    template: &RenderState,
    overrides: Option<&RenderState>,
    pass: &Pass,
    over_programmable: bool,
    writer: ProgramWriter,
    policy: CompactPolicy,
) -> u64 {
    let mut hasher = FxHasher::default();
    template.signature().hash(&mut hasher);
    overrides.map(RenderState::signature).hash(&mut hasher);
    pass.hash_state(&mut hasher);
    over_programmable.hash(&mut hasher);
    writer.hash(&mut hasher);
    policy.hash(&mut hasher);
    hasher.finish()
}

fn release_handles(
    programs: &mut ProgramManager,
    backend: &mut dyn GpuProgramManager,
    handles: Vec<ProgramHandle>,
) {
    for handle in handles {
        programs.release_program(handle, backend);
    }
}

/// Removes the generated `scheme` technique from `material`, leaving
/// hand-authored techniques alone.
fn detach_generated(materials: &mut MaterialLibrary, material: &str, scheme: &str) {
    if let Some(material) = materials.get_mut(material)
        && material.technique(scheme).is_some_and(|t| t.generated)
    {
        material.remove_technique(scheme);
    }
}

fn warn_once(
    warned: &mut FxHashSet<(String, String)>,
    material: &str,
    scheme: &str,
    cause: &dyn fmt::Display,
) {
    if warned.insert((material.to_string(), scheme.to_string())) {
        log::warn!(
            "Material '{material}' falls back to its source technique in scheme '{scheme}': {cause}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_signature_tracks_inputs() {
        const GLSL: ProgramWriter = ProgramWriter::Glsl { version: 330 };
        let template = RenderState::new();
        let pass = Pass::new();
        let base = pass_signature(&template, None, &pass, false, GLSL, CompactPolicy::Low);

        assert_eq!(
            base,
            pass_signature(&template, None, &pass, false, GLSL, CompactPolicy::Low)
        );
        assert_ne!(
            base,
            pass_signature(&template, None, &pass, false, ProgramWriter::Hlsl, CompactPolicy::Low)
        );
        assert_ne!(
            base,
            pass_signature(
                &template,
                None,
                &pass,
                false,
                ProgramWriter::Glsl { version: 150 },
                CompactPolicy::Low
            )
        );
        assert_ne!(
            base,
            pass_signature(&template, None, &pass, false, GLSL, CompactPolicy::High)
        );

        let mut overrides = RenderState::new();
        overrides.set_light_count([1, 0, 0]);
        assert_ne!(
            base,
            pass_signature(&template, Some(&overrides), &pass, false, GLSL, CompactPolicy::Low)
        );

        let mut unlit = Pass::new();
        unlit.lighting_enabled = false;
        assert_ne!(
            base,
            pass_signature(&template, None, &unlit, false, GLSL, CompactPolicy::Low)
        );
    }

    #[test]
    fn generated_pass_handles_skip_empty_slots() {
        let passes = vec![GeneratedPass::default(), GeneratedPass::default()];
        assert!(pass_handles(&passes).is_empty());
    }
}
