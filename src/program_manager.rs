//! Program Manager
//!
//! Deduplicating cache of compiled programs.
//!
//! Each [`Program`] is keyed by its IR fingerprint plus the writer that emits
//! it, so a change of language version never hands back an old compile.
//! A hit bumps a reference count and returns the existing handle; a miss emits
//! source through the language's [`ProgramWriter`] and hands it to the
//! engine's [`GpuProgramManager`].
//!
//! | Call               | Cache hit            | Cache miss                         |
//! |--------------------|----------------------|------------------------------------|
//! | `acquire_program`  | `refs += 1`          | write, compile, insert (`refs = 1`)|
//! | `release_program`  | `refs -= 1`; unload at zero unless programs are kept |  |
//! | `flush_cache`      | unloads every entry with `refs == 0`               |  |
//!
//! Generated programs are named `{prefix}{VS|FS}_{target}_{fingerprint:032x}`
//! (`RTSS_VS_glsl330_…`), so the name alone identifies the IR and the writer
//! it was built with.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{SlotMap, new_key_type};

use crate::errors::{Result, RtssError};
use crate::external::{ExternalProgramId, GpuProgramManager, ResourceLocator};
use crate::ir::{GpuProgramType, Program, fingerprint};
use crate::material::BoundProgram;
use crate::settings::ShaderGeneratorSettings;
use crate::writer::ProgramWriter;

new_key_type! {
    /// Handle of a cached program.
    pub struct ProgramHandle;
}

/// Languages a manager writes out of the box.
pub const BUILTIN_LANGUAGES: [&str; 4] = ["glsl", "glsles", "hlsl", "cg"];

#[derive(Debug)]
struct ProgramEntry {
    fingerprint: u128,
    writer: ProgramWriter,
    program_type: GpuProgramType,
    name: String,
    source: String,
    external: ExternalProgramId,
    refs: u32,
}

/// Fingerprint-keyed program cache.
#[derive(Debug)]
pub struct ProgramManager {
    programs: SlotMap<ProgramHandle, ProgramEntry>,
    lookup: FxHashMap<(u128, ProgramWriter), ProgramHandle>,
    writers: FxHashMap<String, ProgramWriter>,
    /// Fingerprints whose compile failure has already been logged.
    reported_failures: FxHashSet<(u128, ProgramWriter)>,
    name_prefix: String,
    cache_path: Option<PathBuf>,
    keep_unreferenced: bool,
}

impl ProgramManager {
    /// Manager with the built-in writers configured from `settings`.
    #[must_use]
    pub fn new(settings: &ShaderGeneratorSettings) -> Self {
        let mut manager = Self {
            programs: SlotMap::with_key(),
            lookup: FxHashMap::default(),
            writers: FxHashMap::default(),
            reported_failures: FxHashSet::default(),
            name_prefix: String::new(),
            cache_path: None,
            keep_unreferenced: false,
        };
        manager.apply_settings(settings);
        manager
    }

    /// Re-reads naming, dump and retention options, and rebuilds the
    /// built-in writers (language versions may have changed).
    ///
    /// Cached programs are kept; their names were fixed when compiled.
    pub fn apply_settings(&mut self, settings: &ShaderGeneratorSettings) {
        for language in BUILTIN_LANGUAGES {
            if let Some(writer) = ProgramWriter::for_language(language, settings) {
                self.writers.insert(language.to_string(), writer);
            }
        }
        self.name_prefix.clone_from(&settings.program_name_prefix);
        self.cache_path.clone_from(&settings.shader_cache_path);
        self.keep_unreferenced = settings.keep_unreferenced_programs;
    }

    // ── Writers ──────────────────────────────────────────────────────────────

    /// Registers (or replaces) the writer used for `language`.
    pub fn register_writer(&mut self, language: &str, writer: ProgramWriter) {
        self.writers.insert(language.to_string(), writer);
    }

    pub fn unregister_writer(&mut self, language: &str) -> Option<ProgramWriter> {
        self.writers.remove(language)
    }

    #[must_use]
    pub fn writer(&self, language: &str) -> Option<ProgramWriter> {
        self.writers.get(language).copied()
    }

    #[must_use]
    pub fn has_writer(&self, language: &str) -> bool {
        self.writers.contains_key(language)
    }

    // ── Acquire / release ────────────────────────────────────────────────────

    /// Returns the compiled program for `program` in `language`, compiling it
    /// on first request.
    ///
    /// On a compile failure the numbered source and the backend diagnostics
    /// are logged once per program and [`RtssError::CompileFailure`] is
    /// returned.
    pub fn acquire_program(
        &mut self,
        program: &Program,
        language: &str,
        backend: &mut dyn GpuProgramManager,
        locator: &dyn ResourceLocator,
    ) -> Result<ProgramHandle> {
        let writer = self
            .writer(language)
            .ok_or_else(|| RtssError::UnsupportedLanguage(language.to_string()))?;
        let fingerprint = fingerprint(program);
        let key = (fingerprint, writer);

        if let Some(&handle) = self.lookup.get(&key)
            && let Some(entry) = self.programs.get_mut(handle)
        {
            entry.refs += 1;
            log::debug!("Program cache hit: {} (refs {})", entry.name, entry.refs);
            return Ok(handle);
        }

        let source = writer.write_source_code(program, locator)?;
        let program_type = program.program_type();
        let name = format!(
            "{}{}_{}_{fingerprint:032x}",
            self.name_prefix,
            program_type.short_name(),
            writer.target_tag()
        );

        if let Some(dir) = &self.cache_path {
            dump_source(dir, &name, writer.file_extension(), &source);
        }

        let external = match backend.create_program_from_string(
            &name,
            writer.language(),
            &source,
            program_type,
        ) {
            Ok(id) => id,
            Err(message) => {
                if self.reported_failures.insert(key) {
                    log::error!(
                        "Failed to compile {name}:\n{}\n{message}",
                        numbered_listing(&source)
                    );
                }
                return Err(RtssError::CompileFailure {
                    program: name,
                    message,
                });
            }
        };

        log::info!("Compiled {name} ({})", writer.language());
        let handle = self.programs.insert(ProgramEntry {
            fingerprint,
            writer,
            program_type,
            name,
            source,
            external,
            refs: 1,
        });
        self.lookup.insert(key, handle);
        Ok(handle)
    }

    /// Drops one reference to `handle`. Returns `true` when the program was
    /// unloaded.
    pub fn release_program(
        &mut self,
        handle: ProgramHandle,
        backend: &mut dyn GpuProgramManager,
    ) -> bool {
        let Some(entry) = self.programs.get_mut(handle) else {
            return false;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 || self.keep_unreferenced {
            return false;
        }
        self.evict(handle, backend);
        true
    }

    /// Unloads every program nobody references. Returns how many went.
    pub fn flush_cache(&mut self, backend: &mut dyn GpuProgramManager) -> usize {
        let unreferenced: Vec<ProgramHandle> = self
            .programs
            .iter()
            .filter(|(_, e)| e.refs == 0)
            .map(|(h, _)| h)
            .collect();
        for &handle in &unreferenced {
            self.evict(handle, backend);
        }
        unreferenced.len()
    }

    fn evict(&mut self, handle: ProgramHandle, backend: &mut dyn GpuProgramManager) {
        if let Some(entry) = self.programs.remove(handle) {
            self.lookup.remove(&(entry.fingerprint, entry.writer));
            backend.unload_program(entry.external);
            log::debug!("Unloaded {}", entry.name);
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Number of live programs of `program_type`.
    #[must_use]
    pub fn shader_count(&self, program_type: GpuProgramType) -> usize {
        self.programs
            .values()
            .filter(|e| e.program_type == program_type)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    #[must_use]
    pub fn contains(&self, handle: ProgramHandle) -> bool {
        self.programs.contains_key(handle)
    }

    #[must_use]
    pub fn source(&self, handle: ProgramHandle) -> Option<&str> {
        self.programs.get(handle).map(|e| e.source.as_str())
    }

    #[must_use]
    pub fn name(&self, handle: ProgramHandle) -> Option<&str> {
        self.programs.get(handle).map(|e| e.name.as_str())
    }

    #[must_use]
    pub fn external_id(&self, handle: ProgramHandle) -> Option<ExternalProgramId> {
        self.programs.get(handle).map(|e| e.external)
    }

    #[must_use]
    pub fn ref_count(&self, handle: ProgramHandle) -> u32 {
        self.programs.get(handle).map_or(0, |e| e.refs)
    }

    #[must_use]
    pub fn fingerprint_of(&self, handle: ProgramHandle) -> Option<u128> {
        self.programs.get(handle).map(|e| e.fingerprint)
    }

    /// Binding record for a pass stage.
    #[must_use]
    pub fn bound_program(&self, handle: ProgramHandle) -> Option<BoundProgram> {
        self.programs.get(handle).map(|e| BoundProgram {
            handle,
            name: e.name.clone(),
            external: e.external,
        })
    }
}

/// `source` with 1-based line numbers, for compile diagnostics.
fn numbered_listing(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + source.len() / 8);
    for (i, line) in source.lines().enumerate() {
        let _ = writeln!(out, "{:4}: {line}", i + 1);
    }
    out
}

/// Writes `source` to `{dir}/{name}.{ext}`. A failed write is not fatal.
fn dump_source(dir: &Path, name: &str, ext: &str, source: &str) {
    let path = dir.join(format!("{name}.{ext}"));
    let result = std::fs::create_dir_all(dir).and_then(|()| std::fs::write(&path, source));
    if let Err(e) = result {
        log::warn!("Could not write shader cache file {}: {e}", path.display());
    }
}
