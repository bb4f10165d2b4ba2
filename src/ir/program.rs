//! Programs and program sets.

use std::sync::Arc;

use super::function::Function;
use super::parameter::{AutoConstantData, AutoConstantType, Parameter, ParameterPtr};
use super::types::{GpuConstantType, GpuProgramType, Variability, VertexElements};
use crate::errors::{Result, RtssError};
use crate::utils::interner::{self, Symbol};

/// One shader stage: an entry function plus its uniforms, library
/// dependencies and compile flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    program_type: GpuProgramType,
    entry: Function,
    pub(crate) uniforms: Vec<ParameterPtr>,
    dependencies: Vec<Symbol>,
    skeletal_animation: bool,
    column_major_matrices: bool,
    preprocessor_defines: String,
}

impl Program {
    #[must_use]
    pub fn new(program_type: GpuProgramType) -> Self {
        Self {
            program_type,
            entry: Function::new(program_type),
            uniforms: Vec::new(),
            dependencies: Vec::new(),
            skeletal_animation: false,
            column_major_matrices: true,
            preprocessor_defines: String::new(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn program_type(&self) -> GpuProgramType {
        self.program_type
    }

    #[inline]
    #[must_use]
    pub fn entry(&self) -> &Function {
        &self.entry
    }

    #[inline]
    pub fn entry_mut(&mut self) -> &mut Function {
        &mut self.entry
    }

    #[inline]
    #[must_use]
    pub fn uniforms(&self) -> &[ParameterPtr] {
        &self.uniforms
    }

    /// Uniforms in emission order: sorted by `(autoType, data, type, name)`.
    #[must_use]
    pub fn sorted_uniforms(&self) -> Vec<ParameterPtr> {
        let mut sorted = self.uniforms.clone();
        sorted.sort_by(|a, b| a.uniform_sort_key().cmp(&b.uniform_sort_key()));
        sorted
    }

    /// Library includes, in first-added order.
    pub fn dependencies(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.dependencies.iter().map(|s| interner::resolve(*s))
    }

    #[inline]
    #[must_use]
    pub fn skeletal_animation_included(&self) -> bool {
        self.skeletal_animation
    }

    pub fn set_skeletal_animation_included(&mut self, included: bool) {
        self.skeletal_animation = included;
    }

    #[inline]
    #[must_use]
    pub fn column_major_matrices(&self) -> bool {
        self.column_major_matrices
    }

    pub fn set_column_major_matrices(&mut self, column_major: bool) {
        self.column_major_matrices = column_major;
    }

    /// Comma separated `NAME[=VALUE]` list.
    #[inline]
    #[must_use]
    pub fn preprocessor_defines(&self) -> &str {
        &self.preprocessor_defines
    }

    /// Appends a `NAME[=VALUE]` define. Duplicates are ignored.
    pub fn add_preprocessor_define(&mut self, define: &str) {
        if self.preprocessor_defines.split(',').any(|d| d == define) {
            return;
        }
        if !self.preprocessor_defines.is_empty() {
            self.preprocessor_defines.push(',');
        }
        self.preprocessor_defines.push_str(define);
    }

    /// Adds a library include. Adding the same library twice is a no-op.
    pub fn add_dependency(&mut self, library: &str) {
        let sym = interner::intern(library);
        if !self.dependencies.contains(&sym) {
            self.dependencies.push(sym);
        }
    }

    // ── Uniform resolution ───────────────────────────────────────────────────

    /// Returns the auto-constant uniform `(kind, data)`, creating it on first
    /// request.
    pub fn resolve_auto_parameter(
        &mut self,
        kind: AutoConstantType,
        data: AutoConstantData,
    ) -> ParameterPtr {
        if let Some(existing) = self.uniforms.iter().find(|p| {
            p.auto_constant_info()
                .is_some_and(|a| a.kind == kind && a.data == data)
        }) {
            return Arc::clone(existing);
        }
        let param = Arc::new(Parameter::auto_constant(kind, data));
        self.uniforms.push(Arc::clone(&param));
        param
    }

    /// Shorthand for an auto-constant without data argument.
    pub fn resolve_auto(&mut self, kind: AutoConstantType) -> ParameterPtr {
        self.resolve_auto_parameter(kind, AutoConstantData::None)
    }

    /// Shorthand for an indexed auto-constant (light, texture unit).
    pub fn resolve_auto_indexed(&mut self, kind: AutoConstantType, index: u32) -> ParameterPtr {
        self.resolve_auto_parameter(kind, AutoConstantData::Int(index))
    }

    /// Array auto-constant with `count` elements.
    ///
    /// A second request with a different count replaces the declaration size
    /// with the larger of the two.
    pub fn resolve_auto_array(&mut self, kind: AutoConstantType, count: u32) -> ParameterPtr {
        if let Some(pos) = self
            .uniforms
            .iter()
            .position(|p| p.auto_constant_info().is_some_and(|a| a.kind == kind))
        {
            let existing = &self.uniforms[pos];
            if existing.array_size() >= count as usize {
                return Arc::clone(existing);
            }
            let grown = Arc::new(Parameter::auto_constant(kind, AutoConstantData::Int(count)));
            let old = std::mem::replace(&mut self.uniforms[pos], Arc::clone(&grown));
            self.entry.rewrite_references(&old, &grown, |mask, _| mask);
            return grown;
        }
        self.resolve_auto_parameter(kind, AutoConstantData::Int(count))
    }

    /// Returns the plain uniform `suggested_name{index}`, creating it on first
    /// request. `index = None` keeps the suggested name as is.
    ///
    /// Fails when a uniform of the same name but another type exists.
    pub fn resolve_parameter(
        &mut self,
        ty: GpuConstantType,
        index: Option<u32>,
        variability: Variability,
        suggested_name: &str,
        array_size: usize,
    ) -> Result<ParameterPtr> {
        let name = match index {
            Some(i) => format!("{suggested_name}{i}"),
            None => suggested_name.to_string(),
        };

        if let Some(existing) = self.uniforms.iter().find(|p| p.name() == name) {
            if existing.ty() != ty || existing.array_size() != array_size {
                return Err(RtssError::resolve(
                    "",
                    format!("uniform '{name}' redeclared with another type"),
                ));
            }
            return Ok(Arc::clone(existing));
        }

        let mut param = Parameter::uniform(name, ty, variability, array_size);
        param.index = index.unwrap_or(0);
        let param = Arc::new(param);
        self.uniforms.push(Arc::clone(&param));
        Ok(param)
    }

    /// Sampler uniform bound to texture unit `unit`.
    pub fn resolve_sampler(&mut self, ty: GpuConstantType, unit: u32) -> Result<ParameterPtr> {
        if !ty.is_sampler() {
            return Err(RtssError::resolve("", format!("{ty:?} is not a sampler type")));
        }
        self.resolve_parameter(ty, Some(unit), Variability::GLOBAL, "gTextureSampler", 0)
    }

    /// Drops uniforms no atom references. Returns how many were removed.
    pub fn prune_unused_uniforms(&mut self) -> usize {
        let before = self.uniforms.len();
        let uniforms = std::mem::take(&mut self.uniforms);
        self.uniforms = uniforms
            .into_iter()
            .filter(|u| self.entry.is_referenced(u))
            .collect();
        before - self.uniforms.len()
    }
}

/// Vertex + fragment program pair operated on by sub render states.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSet {
    vs: Program,
    fs: Program,
    vertex_layout: VertexElements,
}

impl ProgramSet {
    /// Empty program set for a pass whose vertex buffers provide `vertex_layout`.
    #[must_use]
    pub fn new(vertex_layout: VertexElements) -> Self {
        let mut vs = Program::new(GpuProgramType::Vertex);
        vs.entry_mut().set_available_attributes(Some(vertex_layout));
        Self {
            vs,
            fs: Program::new(GpuProgramType::Fragment),
            vertex_layout,
        }
    }

    #[inline]
    #[must_use]
    pub fn vertex_layout(&self) -> VertexElements {
        self.vertex_layout
    }

    #[inline]
    #[must_use]
    pub fn vs(&self) -> &Program {
        &self.vs
    }

    #[inline]
    pub fn vs_mut(&mut self) -> &mut Program {
        &mut self.vs
    }

    #[inline]
    #[must_use]
    pub fn fs(&self) -> &Program {
        &self.fs
    }

    #[inline]
    pub fn fs_mut(&mut self) -> &mut Program {
        &mut self.fs
    }

    /// Both programs, mutably.
    pub fn split_mut(&mut self) -> (&mut Program, &mut Program) {
        (&mut self.vs, &mut self.fs)
    }

    #[must_use]
    pub fn program(&self, ty: GpuProgramType) -> Option<&Program> {
        match ty {
            GpuProgramType::Vertex => Some(&self.vs),
            GpuProgramType::Fragment => Some(&self.fs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_constants_are_keyed_by_type_and_data() {
        let mut p = Program::new(GpuProgramType::Fragment);
        let a = p.resolve_auto_indexed(AutoConstantType::LightPositionViewSpace, 0);
        let b = p.resolve_auto_indexed(AutoConstantType::LightPositionViewSpace, 0);
        let c = p.resolve_auto_indexed(AutoConstantType::LightPositionViewSpace, 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(p.uniforms().len(), 2);
    }

    #[test]
    fn plain_uniform_type_clash_is_rejected() {
        let mut p = Program::new(GpuProgramType::Fragment);
        p.resolve_parameter(GpuConstantType::Float4, Some(0), Variability::PER_PASS, "gTint", 0)
            .unwrap();
        assert!(
            p.resolve_parameter(GpuConstantType::Float3, Some(0), Variability::PER_PASS, "gTint", 0)
                .is_err()
        );
    }

    #[test]
    fn sorted_uniforms_put_plain_uniforms_first() {
        let mut p = Program::new(GpuProgramType::Vertex);
        p.resolve_auto(AutoConstantType::WorldViewProjMatrix);
        p.resolve_auto(AutoConstantType::WorldMatrix);
        p.resolve_parameter(GpuConstantType::Float4, None, Variability::GLOBAL, "gUser", 0)
            .unwrap();
        let names: Vec<String> = p
            .sorted_uniforms()
            .iter()
            .map(|u| u.name().to_string())
            .collect();
        assert_eq!(names, ["gUser", "world_matrix", "worldviewproj_matrix"]);
    }

    #[test]
    fn dependencies_and_defines_are_deduplicated() {
        let mut p = Program::new(GpuProgramType::Vertex);
        p.add_dependency("FFPLib_Transform");
        p.add_dependency("FFPLib_Common");
        p.add_dependency("FFPLib_Transform");
        assert_eq!(
            p.dependencies().collect::<Vec<_>>(),
            ["FFPLib_Transform", "FFPLib_Common"]
        );

        p.add_preprocessor_define("USE_SHEAR");
        p.add_preprocessor_define("MAX_BONES=64");
        p.add_preprocessor_define("USE_SHEAR");
        assert_eq!(p.preprocessor_defines(), "USE_SHEAR,MAX_BONES=64");
    }

    #[test]
    fn program_set_restricts_vertex_inputs() {
        let mut set = ProgramSet::new(VertexElements::POSITION | VertexElements::NORMAL);
        let vs = set.vs_mut().entry_mut();
        assert!(vs.resolve_input_parameter(crate::ir::Content::NormalObjectSpace).is_ok());
        assert!(vs.resolve_input_parameter(crate::ir::Content::TangentObjectSpace).is_err());
    }
}
