//! Backend collaborators.
//!
//! The generator never talks to a graphics API. Compilation is delegated to a
//! [`GpuProgramManager`] supplied by the engine, and shader library files are
//! located through a [`ResourceLocator`].

use crate::ir::GpuProgramType;

/// Opaque id of a program compiled by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalProgramId(pub u64);

/// Engine-side program compiler.
pub trait GpuProgramManager: Send {
    /// Compiles `source` written in `language`.
    ///
    /// On failure returns the backend's diagnostic text.
    fn create_program_from_string(
        &mut self,
        name: &str,
        language: &str,
        source: &str,
        program_type: GpuProgramType,
    ) -> Result<ExternalProgramId, String>;

    /// Whether the backend accepts programs of `profile` (`glsl330`, `ps_4_0`, ...).
    fn is_syntax_supported(&self, profile: &str) -> bool;

    /// Unloads a program the generator no longer references.
    fn unload_program(&mut self, _id: ExternalProgramId) {}
}

/// Lookup of shader library files.
pub trait ResourceLocator: Send {
    /// Whether `filename` exists in any resource group.
    fn resource_exists(&self, filename: &str) -> bool;
}

impl<F> ResourceLocator for F
where
    F: Fn(&str) -> bool + Send,
{
    fn resource_exists(&self, filename: &str) -> bool {
        self(filename)
    }
}

/// Locator that reports every file as present; includes always use the
/// language's preferred extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeAllPresent;

impl ResourceLocator for AssumeAllPresent {
    fn resource_exists(&self, _filename: &str) -> bool {
        true
    }
}
