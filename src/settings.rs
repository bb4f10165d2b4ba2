//! Shader Generator Settings
//!
//! This module defines the runtime configuration of the shader generator.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_rtss::settings::{CompactPolicy, ShaderGeneratorSettings};
//!
//! // Default: GLSL 330, no varying compaction
//! let settings = ShaderGeneratorSettings::default();
//!
//! // HLSL with aggressive varying packing
//! let settings = ShaderGeneratorSettings {
//!     target_language: "hlsl".into(),
//!     vertex_shader_outputs_compact_policy: CompactPolicy::High,
//!     ..Default::default()
//! };
//!
//! // Loaded from a JSON config file
//! let settings = ShaderGeneratorSettings::from_json(r#"{ "target_language": "glsles" }"#)?;
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Name of the engine's default material scheme.
pub const DEFAULT_SCHEME_NAME: &str = "Default";

/// Name of the scheme the shader generator creates techniques in by default.
///
/// Distinct from [`DEFAULT_SCHEME_NAME`] so generated techniques never shadow
/// hand-written ones.
pub const RTSS_DEFAULT_SCHEME_NAME: &str = "ShaderGeneratorDefaultScheme";

// ---------------------------------------------------------------------------
// CompactPolicy
// ---------------------------------------------------------------------------

/// How aggressively vertex shader outputs are packed into shared varyings.
///
/// | Policy   | Behaviour                                                         |
/// |----------|-------------------------------------------------------------------|
/// | `Low`    | Every output keeps its own slot                                   |
/// | `Medium` | Scalars / vec2 are folded into spare lanes of larger outputs      |
/// | `High`   | All packable outputs are re-ordered and bin-packed into vec4 slots |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompactPolicy {
    #[default]
    Low,
    Medium,
    High,
}

// ---------------------------------------------------------------------------
// ShaderGeneratorSettings
// ---------------------------------------------------------------------------

/// Global configuration of the shader generator.
///
/// | Field                                   | Description                              | Default   |
/// |-----------------------------------------|------------------------------------------|-----------|
/// | `target_language`                       | Language of emitted programs             | `"glsl"`  |
/// | `glsl_version`                          | `#version` for desktop GLSL              | `330`     |
/// | `glsles_version`                        | `#version` for GLSL ES                   | `300`     |
/// | `hlsl_shader_model`                     | Shader model suffix for HLSL profiles    | `"4_0"`   |
/// | `vertex_shader_outputs_compact_policy`  | Varying packing policy                   | `Low`     |
/// | `create_shader_over_programmable_pass`  | Generate for passes with own programs    | `false`   |
/// | `keep_unreferenced_programs`            | Keep zero-refcount cache entries         | `false`   |
/// | `shader_cache_path`                     | Directory receiving emitted source       | `None`    |
/// | `program_name_prefix`                   | Prefix of generated program names        | `"RTSS_"` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderGeneratorSettings {
    /// Target shading language key (`glsl`, `glsles`, `hlsl`, `cg`).
    pub target_language: String,

    /// `#version` directive emitted for desktop GLSL.
    pub glsl_version: u32,

    /// `#version` directive emitted for GLSL ES.
    pub glsles_version: u32,

    /// Shader model used to build HLSL profiles (`vs_4_0`, `ps_4_0`).
    pub hlsl_shader_model: String,

    /// Varying packing policy applied by the program processor.
    pub vertex_shader_outputs_compact_policy: CompactPolicy,

    /// Whether passes that already carry GPU programs are regenerated anyway.
    pub create_shader_over_programmable_pass: bool,

    /// When `true`, released programs stay cached until
    /// [`ProgramManager::flush_cache`](crate::program_manager::ProgramManager::flush_cache).
    pub keep_unreferenced_programs: bool,

    /// Optional directory every emitted program is written to.
    pub shader_cache_path: Option<PathBuf>,

    /// Prefix of generated program names.
    pub program_name_prefix: String,
}

impl Default for ShaderGeneratorSettings {
    fn default() -> Self {
        Self {
            target_language: "glsl".to_string(),
            glsl_version: 330,
            glsles_version: 300,
            hlsl_shader_model: "4_0".to_string(),
            vertex_shader_outputs_compact_policy: CompactPolicy::Low,
            create_shader_over_programmable_pass: false,
            keep_unreferenced_programs: false,
            shader_cache_path: None,
            program_name_prefix: "RTSS_".to_string(),
        }
    }
}

impl ShaderGeneratorSettings {
    /// Parses settings from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the settings to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Profile string handed to the backend's syntax check for the current
    /// target language.
    #[must_use]
    pub fn target_profile(&self) -> String {
        match self.target_language.as_str() {
            "glsl" => format!("glsl{}", self.glsl_version),
            "glsles" => format!("glsles{}", self.glsles_version),
            "hlsl" => format!("ps_{}", self.hlsl_shader_model),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scheme_names_are_distinct() {
        assert_ne!(DEFAULT_SCHEME_NAME, RTSS_DEFAULT_SCHEME_NAME);
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let settings = ShaderGeneratorSettings::from_json(
            r#"{ "target_language": "hlsl", "vertex_shader_outputs_compact_policy": "High" }"#,
        )
        .unwrap();

        assert_eq!(settings.target_language, "hlsl");
        assert_eq!(
            settings.vertex_shader_outputs_compact_policy,
            CompactPolicy::High
        );
        assert_eq!(settings.glsl_version, 330);
        assert_eq!(settings.program_name_prefix, "RTSS_");
    }

    #[test]
    fn json_round_trip() {
        let settings = ShaderGeneratorSettings {
            shader_cache_path: Some(PathBuf::from("cache/shaders")),
            ..Default::default()
        };
        let json = settings.to_json().unwrap();
        assert_eq!(ShaderGeneratorSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn target_profiles() {
        let mut settings = ShaderGeneratorSettings::default();
        assert_eq!(settings.target_profile(), "glsl330");
        settings.target_language = "hlsl".into();
        assert_eq!(settings.target_profile(), "ps_4_0");
        settings.target_language = "cg".into();
        assert_eq!(settings.target_profile(), "cg");
    }
}
