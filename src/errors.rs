//! Error Types
//!
//! This module defines the error types used throughout the shader generator.
//!
//! # Overview
//!
//! The main error type [`RtssError`] covers all failure modes including:
//! - Sub-render-state factory registration and lookup
//! - Parameter resolution inside a sub-render-state compiler pass
//! - Varying compaction conflicts
//! - Backend compilation failures and unsupported target languages
//! - Script translation errors
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, RtssError>`.
//!
//! ```rust,ignore
//! use myth_rtss::errors::{RtssError, Result};
//!
//! fn build() -> Result<()> {
//!     Ok(())
//! }
//! ```
//!
//! The hot path ([`ShaderGenerator::validate_material`]) never returns an
//! error: failures are logged and the material falls back to its source
//! technique.
//!
//! [`ShaderGenerator::validate_material`]: crate::generator::ShaderGenerator::validate_material

use thiserror::Error;

/// The main error type for the runtime shader generator.
#[derive(Error, Debug)]
pub enum RtssError {
    // ========================================================================
    // Registry Errors
    // ========================================================================
    /// A sub-render-state type was requested that no factory produces.
    #[error("Unknown sub render state type: {0}")]
    UnknownType(String),

    /// A factory with the same type name is already registered.
    #[error("Sub render state factory already registered: {0}")]
    DuplicateType(String),

    /// The requested scheme does not exist.
    #[error("Scheme not found: {0}")]
    SchemeNotFound(String),

    /// The requested material does not exist in the material library.
    #[error("Material not found: {0}")]
    MaterialNotFound(String),

    /// The material has no technique for the requested scheme.
    #[error("Technique for scheme '{scheme}' not found in material '{material}'")]
    TechniqueNotFound {
        /// Material name
        material: String,
        /// Scheme name
        scheme: String,
    },

    // ========================================================================
    // Generation Errors
    // ========================================================================
    /// A sub render state could not resolve a parameter it requires.
    #[error("Sub render state '{srs}' failed to resolve a parameter: {reason}")]
    ResolveFailure {
        /// Type name of the failing sub render state
        srs: String,
        /// What could not be resolved
        reason: String,
    },

    /// A varying could not be packed together with another one.
    #[error("Packing conflict on varying '{0}'")]
    PackingConflict(String),

    /// The generated program set is not a legal pipeline.
    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    // ========================================================================
    // Emission & Compilation Errors
    // ========================================================================
    /// The backend rejected the generated source.
    #[error("Failed to compile program '{program}': {message}")]
    CompileFailure {
        /// Generated program name
        program: String,
        /// Backend diagnostics
        message: String,
    },

    /// No program writer is registered for the target language.
    #[error("Unsupported target language: {0}")]
    UnsupportedLanguage(String),

    /// Translation-unit template error.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Text formatting error while emitting source.
    #[error("Format error: {0}")]
    Format(#[from] std::fmt::Error),

    // ========================================================================
    // I/O & Serialization Errors
    // ========================================================================
    /// File I/O error (shader cache directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error (settings).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Material script translation error.
    #[error("{file}:{line}: {message}")]
    Script {
        /// Script file name
        file: String,
        /// Line of the offending property
        line: u32,
        /// Description
        message: String,
    },
}

impl RtssError {
    /// Shorthand for a [`RtssError::ResolveFailure`].
    pub fn resolve(srs: &str, reason: impl Into<String>) -> Self {
        Self::ResolveFailure {
            srs: srs.to_string(),
            reason: reason.into(),
        }
    }

    /// Fills in the sub render state name of a [`RtssError::ResolveFailure`]
    /// raised below the SRS layer (function / program resolution).
    #[must_use]
    pub fn attributed_to(self, type_name: &str) -> Self {
        match self {
            Self::ResolveFailure { srs, reason } if srs.is_empty() => Self::ResolveFailure {
                srs: type_name.to_string(),
                reason,
            },
            other => other,
        }
    }

    /// Whether this error is recoverable by removing the offending sub render state.
    #[must_use]
    pub fn is_resolve_failure(&self) -> bool {
        matches!(self, Self::ResolveFailure { .. })
    }
}

/// Alias for `Result<T, RtssError>`.
pub type Result<T> = std::result::Result<T, RtssError>;
