//! Program Writers
//!
//! Turns a [`Program`] into one self-contained translation unit.
//!
//! | Writer   | Header                | Samplers                          | Matrix multiply |
//! |----------|-----------------------|-----------------------------------|-----------------|
//! | `glsl`   | `#version N`          | `SAMPLER2D(name, unit);` (shim)   | `a * b`         |
//! | `glsles` | `#version N es` + precision | `SAMPLER2D(name, unit);` (shim) | `a * b`      |
//! | `hlsl`   | none                  | `SAMPLER2D(name, unit);` (shim)   | `mul(a, b)`     |
//! | `cg`     | none                  | `uniform sampler2D name : register(sN);` | `mul(a, b)` |
//!
//! Languages differ only in the constant tables below and in which of the two
//! unit templates lays the file out. Output is a pure function of the program
//! IR and the include locator: equal programs emit byte-identical source.

mod template;

use std::borrow::Cow;
use std::fmt::Write;

use minijinja::context;

use crate::errors::Result;
use crate::external::ResourceLocator;
use crate::ir::{
    Builtin, ConstValue, GpuConstantType, GpuProgramType, Operand, Parameter, ParameterKind,
    Program, Semantic,
};
use crate::settings::ShaderGeneratorSettings;

pub use template::get_env;

/// Include shim mapping sampler macros onto each API.
pub const UNIFIED_SHADER_SHIM: &str = "UnifiedShader.h";

// ─── Constant tables ─────────────────────────────────────────────────────────
// Indexed by `GpuConstantType as usize`.

#[rustfmt::skip]
const GLSL_TYPES: [&str; 28] = [
    "float", "vec2", "vec3", "vec4",
    "int", "ivec2", "ivec3", "ivec4",
    "uint", "uvec2", "uvec3", "uvec4",
    "mat2", "mat2x3", "mat2x4",
    "mat3x2", "mat3", "mat3x4",
    "mat4x2", "mat4x3", "mat4",
    "sampler1D", "sampler2D", "sampler3D", "samplerCube",
    "sampler2DShadow", "sampler2DArray", "samplerExternalOES",
];

#[rustfmt::skip]
const HLSL_TYPES: [&str; 28] = [
    "float", "float2", "float3", "float4",
    "int", "int2", "int3", "int4",
    "uint", "uint2", "uint3", "uint4",
    "float2x2", "float2x3", "float2x4",
    "float3x2", "float3x3", "float3x4",
    "float4x2", "float4x3", "float4x4",
    "sampler1D", "sampler2D", "sampler3D", "samplerCUBE",
    "sampler2D", "sampler2DArray", "sampler2D",
];

/// Sampler declaration macros of the shim, indexed by `ty - Sampler1D`.
const SAMPLER_MACROS: [&str; 7] = [
    "SAMPLER1D",
    "SAMPLER2D",
    "SAMPLER3D",
    "SAMPLERCUBE",
    "SAMPLER2DSHADOW",
    "SAMPLER2DARRAY",
    "SAMPLER2D",
];

/// Sampling functions provided by the shim.
const SHIM_SAMPLE_FUNCTIONS: [&str; 7] = [
    "texture1D",
    "texture2D",
    "texture3D",
    "textureCube",
    "shadow2D",
    "texture2DArray",
    "texture2D",
];

const CG_SAMPLE_FUNCTIONS: [&str; 7] = [
    "tex1D", "tex2D", "tex3D", "texCUBE", "tex2D", "tex2DARRAY", "tex2D",
];

fn sampler_slot(ty: GpuConstantType) -> usize {
    (ty as usize).saturating_sub(GpuConstantType::Sampler1D as usize)
}

// ─── ProgramWriter ───────────────────────────────────────────────────────────

/// Target-language emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramWriter {
    Glsl { version: u32 },
    GlslEs { version: u32 },
    Hlsl,
    Cg,
}

impl ProgramWriter {
    /// Writer for `language` configured from `settings`.
    #[must_use]
    pub fn for_language(language: &str, settings: &ShaderGeneratorSettings) -> Option<Self> {
        match language {
            "glsl" => Some(Self::Glsl {
                version: settings.glsl_version,
            }),
            "glsles" => Some(Self::GlslEs {
                version: settings.glsles_version,
            }),
            "hlsl" => Some(Self::Hlsl),
            "cg" => Some(Self::Cg),
            _ => None,
        }
    }

    /// Language key the writer is registered under.
    #[must_use]
    pub fn language(self) -> &'static str {
        match self {
            Self::Glsl { .. } => "glsl",
            Self::GlslEs { .. } => "glsles",
            Self::Hlsl => "hlsl",
            Self::Cg => "cg",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_glsl_family(self) -> bool {
        matches!(self, Self::Glsl { .. } | Self::GlslEs { .. })
    }

    /// Whether inputs and outputs carry semantics (`: TEXCOORD0`).
    #[inline]
    #[must_use]
    pub fn uses_semantics(self) -> bool {
        !self.is_glsl_family()
    }

    /// GLSL before 1.30 / GLSL ES before 3.00 (`attribute` / `varying`).
    fn is_legacy_glsl(self) -> bool {
        match self {
            Self::Glsl { version } => version < 130,
            Self::GlslEs { version } => version < 300,
            _ => false,
        }
    }

    /// Language plus version, e.g. `glsl330`. Part of every program name.
    #[must_use]
    pub fn target_tag(self) -> String {
        match self {
            Self::Glsl { version } | Self::GlslEs { version } => {
                format!("{}{version}", self.language())
            }
            Self::Hlsl | Self::Cg => self.language().to_string(),
        }
    }

    /// File extension of libraries and dumped sources.
    #[must_use]
    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Glsl { .. } | Self::GlslEs { .. } => "glsl",
            Self::Hlsl => "hlsl",
            Self::Cg => "cg",
        }
    }

    #[must_use]
    pub fn type_name(self, ty: GpuConstantType) -> &'static str {
        if self.is_glsl_family() {
            GLSL_TYPES[ty as usize]
        } else {
            HLSL_TYPES[ty as usize]
        }
    }

    /// Include file name of `library`: the preferred extension if the locator
    /// knows it, otherwise the first fallback that exists.
    #[must_use]
    pub fn include_file(self, library: &str, locator: &dyn ResourceLocator) -> String {
        let candidates: &[&str] = match self {
            Self::Glsl { .. } | Self::GlslEs { .. } => &["glsl", "cg"],
            Self::Hlsl => &["hlsl", "cg"],
            Self::Cg => &["cg", "glsl"],
        };
        candidates
            .iter()
            .map(|ext| format!("{library}.{ext}"))
            .find(|file| locator.resource_exists(file))
            .unwrap_or_else(|| format!("{library}.{}", candidates[0]))
    }

    /// Emits `program` as a complete translation unit.
    pub fn write_source_code(
        self,
        program: &Program,
        locator: &dyn ResourceLocator,
    ) -> Result<String> {
        let emitter = Emitter::new(self, program.program_type());

        let mut body = String::new();
        for (_, atom) in program.entry().atoms() {
            atom.emit(&mut body, &emitter)?;
        }

        let defines: Vec<String> = program
            .preprocessor_defines()
            .split(',')
            .filter(|d| !d.is_empty())
            .map(|d| d.replacen('=', " ", 1))
            .collect();

        let includes: Vec<String> = program
            .dependencies()
            .map(|dep| self.include_file(dep, locator))
            .collect();

        let uniforms: Vec<String> = program
            .sorted_uniforms()
            .iter()
            .map(|u| emitter.uniform_declaration(u))
            .collect();

        let entry = program.entry();
        let locals: Vec<String> = entry
            .locals()
            .iter()
            .map(|l| format!("{} {}{};", self.type_name(l.ty()), l.name(), array_suffix(l)))
            .collect();

        let env = get_env()?;
        let program_type = match program.program_type() {
            GpuProgramType::Vertex => "vertex",
            GpuProgramType::Fragment => "fragment",
            GpuProgramType::Geometry => "geometry",
            GpuProgramType::Domain => "domain",
            GpuProgramType::Hull => "hull",
            GpuProgramType::Compute => "compute",
        };
        let shim = (self != Self::Cg).then_some(UNIFIED_SHADER_SHIM);

        let source = if self.is_glsl_family() {
            let inputs: Vec<String> = entry
                .inputs()
                .iter()
                .filter_map(|p| emitter.glsl_input_declaration(p))
                .collect();
            let outputs: Vec<String> = entry
                .outputs()
                .iter()
                .filter_map(|p| emitter.glsl_output_declaration(p))
                .collect();
            env.get_template("glsl_unit")?.render(context! {
                header => self.header(program),
                program_type => program_type,
                language => self.language(),
                defines => defines,
                shim => shim,
                includes => includes,
                uniforms => uniforms,
                inputs => inputs,
                outputs => outputs,
                locals => locals,
                body => body.trim_end(),
            })?
        } else {
            let params: Vec<String> = entry
                .inputs()
                .iter()
                .map(|p| emitter.semantic_parameter("in", p))
                .chain(
                    entry
                        .outputs()
                        .iter()
                        .map(|p| emitter.semantic_parameter("out", p)),
                )
                .collect();
            env.get_template("hlsl_unit")?.render(context! {
                header => self.header(program),
                program_type => program_type,
                language => self.language(),
                defines => defines,
                shim => shim,
                includes => includes,
                uniforms => uniforms,
                params => params,
                locals => locals,
                body => body.trim_end(),
            })?
        };

        Ok(source)
    }

    fn header(self, program: &Program) -> Vec<String> {
        let mut lines = Vec::new();
        match self {
            Self::Glsl { version } => lines.push(format!("#version {version}")),
            Self::GlslEs { version } => {
                if version >= 300 {
                    lines.push(format!("#version {version} es"));
                } else {
                    lines.push(format!("#version {version}"));
                }
                lines.push("precision highp float;".to_string());
                lines.push("precision highp int;".to_string());
            }
            Self::Hlsl | Self::Cg => {}
        }
        if !program.column_major_matrices() {
            if self.is_glsl_family() {
                if !self.is_legacy_glsl() {
                    lines.push("layout(row_major) uniform;".to_string());
                }
            } else {
                lines.push("#pragma pack_matrix(row_major)".to_string());
            }
        }
        lines
    }
}

fn array_suffix(p: &Parameter) -> String {
    if p.array_size() > 0 {
        format!("[{}]", p.array_size())
    } else {
        String::new()
    }
}

// ─── Emitter ─────────────────────────────────────────────────────────────────

/// A writer bound to the stage being emitted.
///
/// Parameter spelling depends on the stage: a GLSL vertex output at
/// `POSITION` is `gl_Position`, a vertex input at `NORMAL` is the engine's
/// `normal` attribute, and varyings share a `vs_` name on both sides.
#[derive(Debug, Clone, Copy)]
pub struct Emitter {
    writer: ProgramWriter,
    program_type: GpuProgramType,
}

impl Emitter {
    #[must_use]
    pub fn new(writer: ProgramWriter, program_type: GpuProgramType) -> Self {
        Self {
            writer,
            program_type,
        }
    }

    #[inline]
    #[must_use]
    pub fn writer(&self) -> ProgramWriter {
        self.writer
    }

    /// Source spelling of a parameter reference.
    #[must_use]
    pub fn parameter_name<'p>(&self, p: &'p Parameter) -> Cow<'p, str> {
        if !self.writer.is_glsl_family() {
            return Cow::Borrowed(p.name());
        }
        let vertex = self.program_type == GpuProgramType::Vertex;
        match (p.kind(), vertex) {
            (ParameterKind::Input, true) => Cow::Owned(glsl_attribute_name(p)),
            (ParameterKind::Output, true) if p.semantic() == Semantic::Position => {
                Cow::Borrowed("gl_Position")
            }
            (ParameterKind::Output, true) => Cow::Owned(varying_name(p)),
            (ParameterKind::Input, false) if p.semantic() == Semantic::FrontFacing => {
                Cow::Borrowed("(gl_FrontFacing ? 1.0 : -1.0)")
            }
            (ParameterKind::Input, false) => Cow::Owned(varying_name(p)),
            (ParameterKind::Output, false) if self.writer.is_legacy_glsl() => {
                Cow::Owned(format!("gl_FragData[{}]", p.index()))
            }
            _ => Cow::Borrowed(p.name()),
        }
    }

    /// Source expression of an operand: name or literal, subscript, swizzle.
    #[must_use]
    pub fn operand_expr(&self, op: &Operand) -> String {
        let p = op.parameter();
        let mut expr = match p.const_value() {
            Some(value) => self.literal(value),
            None => self.parameter_name(p).into_owned(),
        };
        if let Some(index) = op.index() {
            let inner = self.operand_expr(index);
            if index.parameter().ty().is_float_vector() {
                let _ = write!(expr, "[int({inner})]");
            } else {
                let _ = write!(expr, "[{inner}]");
            }
        }
        expr.push_str(&op.mask().swizzle());
        expr
    }

    /// Literal spelling of a constant.
    #[must_use]
    pub fn literal(&self, value: &ConstValue) -> String {
        match value {
            ConstValue::Int(v) => v.to_string(),
            ConstValue::Float(lanes) if lanes.len() == 1 => format!("{:?}", lanes[0]),
            ConstValue::Float(lanes) => {
                let parts: Vec<String> = lanes.iter().map(|v| format!("{v:?}")).collect();
                format!(
                    "{}({})",
                    self.writer.type_name(value.constant_type()),
                    parts.join(", ")
                )
            }
        }
    }

    /// Right-hand side of a built-in call.
    #[must_use]
    pub fn builtin_call(&self, builtin: Builtin, args: &[String]) -> String {
        let glsl = self.writer.is_glsl_family();
        let name = match builtin {
            Builtin::Normalize => "normalize",
            Builtin::Dot => "dot",
            Builtin::Cross => "cross",
            Builtin::Length => "length",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Abs => "abs",
            Builtin::Mix if glsl => "mix",
            Builtin::Mix => "lerp",
            Builtin::Saturate if glsl => {
                return format!("clamp({}, 0.0, 1.0)", args.join(", "));
            }
            Builtin::Saturate => "saturate",
            Builtin::Negate => return format!("-{}", args.join(", ")),
            Builtin::Construct(ty) => self.writer.type_name(ty),
        };
        format!("{name}({})", args.join(", "))
    }

    /// Function sampling a sampler of type `ty`.
    #[must_use]
    pub fn sample_function(&self, ty: GpuConstantType) -> &'static str {
        let slot = sampler_slot(ty).min(6);
        if self.writer == ProgramWriter::Cg {
            CG_SAMPLE_FUNCTIONS[slot]
        } else {
            SHIM_SAMPLE_FUNCTIONS[slot]
        }
    }

    #[must_use]
    pub fn matrix_multiply(&self, lhs: &str, rhs: &str) -> String {
        if self.writer.is_glsl_family() {
            format!("{lhs} * {rhs}")
        } else {
            format!("mul({lhs}, {rhs})")
        }
    }

    /// Global declaration of a uniform.
    #[must_use]
    pub fn uniform_declaration(&self, p: &Parameter) -> String {
        let ty = p.ty();
        if ty.is_sampler() {
            if self.writer == ProgramWriter::Cg {
                format!(
                    "uniform {} {} : register(s{});",
                    self.writer.type_name(ty),
                    p.name(),
                    p.index()
                )
            } else {
                format!("{}({}, {});", SAMPLER_MACROS[sampler_slot(ty).min(6)], p.name(), p.index())
            }
        } else {
            format!(
                "uniform {} {}{};",
                self.writer.type_name(ty),
                p.name(),
                array_suffix(p)
            )
        }
    }

    /// GLSL global declaration of an entry input; `None` for built-ins.
    #[must_use]
    pub fn glsl_input_declaration(&self, p: &Parameter) -> Option<String> {
        if p.semantic() == Semantic::FrontFacing {
            return None;
        }
        let qualifier = match (self.writer.is_legacy_glsl(), self.program_type) {
            (true, GpuProgramType::Vertex) => "attribute",
            (true, _) => "varying",
            (false, _) => "in",
        };
        Some(format!(
            "{qualifier} {} {};",
            self.writer.type_name(p.ty()),
            self.parameter_name(p)
        ))
    }

    /// GLSL global declaration of an entry output; `None` for built-ins.
    #[must_use]
    pub fn glsl_output_declaration(&self, p: &Parameter) -> Option<String> {
        let ty = self.writer.type_name(p.ty());
        match self.program_type {
            GpuProgramType::Vertex if p.semantic() == Semantic::Position => None,
            GpuProgramType::Fragment if self.writer.is_legacy_glsl() => None,
            GpuProgramType::Fragment => Some(format!(
                "layout(location = {}) out {ty} {};",
                p.index(),
                p.name()
            )),
            _ if self.writer.is_legacy_glsl() => {
                Some(format!("varying {ty} {};", self.parameter_name(p)))
            }
            _ => Some(format!("out {ty} {};", self.parameter_name(p))),
        }
    }

    /// `in float4 iPosition_0 : POSITION` style entry parameter.
    #[must_use]
    pub fn semantic_parameter(&self, direction: &str, p: &Parameter) -> String {
        format!(
            "{direction} {} {} : {}",
            self.writer.type_name(p.ty()),
            p.name(),
            self.semantic_string(p)
        )
    }

    /// Semantic string of an entry parameter.
    #[must_use]
    pub fn semantic_string(&self, p: &Parameter) -> String {
        let hlsl = self.writer == ProgramWriter::Hlsl;
        let output = matches!(p.kind(), ParameterKind::Output);
        match p.semantic() {
            Semantic::Position if hlsl && output => "SV_Position".to_string(),
            Semantic::Position => "POSITION".to_string(),
            Semantic::FrontFacing => "VFACE".to_string(),
            Semantic::Color if output && self.program_type == GpuProgramType::Fragment => {
                if hlsl {
                    format!("SV_Target{}", p.index())
                } else {
                    format!("COLOR{}", p.index())
                }
            }
            other => format!("{}{}", other.hlsl_name(), p.index()),
        }
    }
}

/// Engine attribute name a GLSL vertex input binds to.
fn glsl_attribute_name(p: &Parameter) -> String {
    match p.semantic() {
        Semantic::Position => "vertex".to_string(),
        Semantic::Normal => "normal".to_string(),
        Semantic::Tangent => "tangent".to_string(),
        Semantic::Binormal => "binormal".to_string(),
        Semantic::BlendIndices => "blendIndices".to_string(),
        Semantic::BlendWeights => "blendWeights".to_string(),
        Semantic::Color if p.index() == 0 => "colour".to_string(),
        Semantic::Color => "secondary_colour".to_string(),
        Semantic::TexCoord => format!("uv{}", p.index()),
        Semantic::FrontFacing | Semantic::Unknown => p.name().to_string(),
    }
}

/// Name shared by a vertex output and the fragment input it links to.
fn varying_name(p: &Parameter) -> String {
    format!("vs_{}{}", p.semantic().hlsl_name(), p.index())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AutoConstantType, Content, Operand, OperandMask, Parameter};
    use std::sync::Arc;

    #[test]
    fn type_tables_follow_language_family() {
        let glsl = ProgramWriter::Glsl { version: 330 };
        assert_eq!(glsl.type_name(GpuConstantType::Matrix4x4), "mat4");
        assert_eq!(glsl.type_name(GpuConstantType::SamplerExternalOes), "samplerExternalOES");
        assert_eq!(ProgramWriter::Hlsl.type_name(GpuConstantType::Matrix3x4), "float3x4");
        assert_eq!(ProgramWriter::Cg.type_name(GpuConstantType::Float2), "float2");
    }

    #[test]
    fn include_extension_fallbacks() {
        let only_cg = |f: &str| f.ends_with(".cg");
        let glsl = ProgramWriter::Glsl { version: 330 };
        assert_eq!(glsl.include_file("FFPLib_Common", &only_cg), "FFPLib_Common.cg");
        assert_eq!(
            ProgramWriter::Hlsl.include_file("FFPLib_Common", &only_cg),
            "FFPLib_Common.cg"
        );

        let nothing = |_: &str| false;
        assert_eq!(glsl.include_file("FFPLib_Common", &nothing), "FFPLib_Common.glsl");
        let only_glsl = |f: &str| f.ends_with(".glsl");
        assert_eq!(
            ProgramWriter::Cg.include_file("FFPLib_Common", &only_glsl),
            "FFPLib_Common.glsl"
        );
    }

    #[test]
    fn glsl_spells_builtin_parameters() {
        let emitter = Emitter::new(ProgramWriter::Glsl { version: 330 }, GpuProgramType::Vertex);
        let mut f = crate::ir::Function::new(GpuProgramType::Vertex);
        let pos = f
            .resolve_output_parameter(Content::PositionProjectiveSpace)
            .unwrap();
        let uv = f.resolve_input_parameter(Content::TextureCoordinate(1)).unwrap();
        assert_eq!(emitter.parameter_name(&pos), "gl_Position");
        assert_eq!(emitter.parameter_name(&uv), "uv1");
        assert_eq!(
            emitter.operand_expr(&Operand::input(&uv).with_mask(OperandMask::X)),
            "uv1.x"
        );
    }

    #[test]
    fn matrix_multiply_per_language() {
        let glsl = Emitter::new(ProgramWriter::Glsl { version: 330 }, GpuProgramType::Vertex);
        let cg = Emitter::new(ProgramWriter::Cg, GpuProgramType::Vertex);
        assert_eq!(glsl.matrix_multiply("m", "v"), "m * v");
        assert_eq!(cg.matrix_multiply("m", "v"), "mul(m, v)");
    }

    #[test]
    fn literals_and_array_uniforms() {
        let emitter = Emitter::new(ProgramWriter::Hlsl, GpuProgramType::Vertex);
        let white = Parameter::constant_float(&[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(
            emitter.literal(white.const_value().unwrap()),
            "float4(1.0, 1.0, 1.0, 1.0)"
        );
        let bones = Parameter::auto_constant(
            AutoConstantType::WorldMatrixArray3x4,
            crate::ir::AutoConstantData::Int(64),
        );
        assert_eq!(
            emitter.uniform_declaration(&bones),
            "uniform float3x4 world_matrix_array_3x4[64];"
        );
    }

    #[test]
    fn sampler_declarations() {
        let sampler = Arc::new({
            let mut p = Parameter::uniform(
                "gTextureSampler0",
                GpuConstantType::Sampler2D,
                crate::ir::Variability::GLOBAL,
                0,
            );
            p.index = 0;
            p
        });
        let glsl = Emitter::new(ProgramWriter::Glsl { version: 330 }, GpuProgramType::Fragment);
        let cg = Emitter::new(ProgramWriter::Cg, GpuProgramType::Fragment);
        assert_eq!(glsl.uniform_declaration(&sampler), "SAMPLER2D(gTextureSampler0, 0);");
        assert_eq!(
            cg.uniform_declaration(&sampler),
            "uniform sampler2D gTextureSampler0 : register(s0);"
        );
    }
}
