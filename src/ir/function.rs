//! Entry-point functions.
//!
//! A [`Function`] owns the input, output and local parameters of a program's
//! `main` plus a sparse stage → atoms map. Sub render states never create
//! parameters directly; they go through the `resolve_*` methods, which return
//! the existing parameter for a content tag or allocate a new one with a free
//! semantic slot.
//!
//! # Naming
//!
//! | Direction | Pattern                       | Example         |
//! |-----------|-------------------------------|-----------------|
//! | input     | `i{Semantic}_{index}`         | `iPosition_0`   |
//! | output    | `o{Semantic}_{index}`         | `oTexcoord_3`   |
//! | local     | `l{ContentTag}[_n]`           | `lNormalView`   |

use std::collections::BTreeMap;
use std::sync::Arc;

use super::atom::Atom;
use super::parameter::{Parameter, ParameterKind, ParameterPtr};
use super::types::{Content, GpuConstantType, GpuProgramType, Semantic, VertexElements};
use crate::errors::{Result, RtssError};

/// Well-known stage anchors.
///
/// Atoms within a stage keep insertion order; stages run in ascending order.
/// Anchors are sparse so a later feature can slot atoms in between
/// (`FS_COLOUR_END + 50`).
pub mod stages {
    pub const VS_PRE_PROCESS: i32 = 100;
    pub const VS_TRANSFORM: i32 = 200;
    pub const VS_COLOUR: i32 = 300;
    pub const VS_LIGHTING: i32 = 400;
    pub const VS_TEXTURING: i32 = 500;
    pub const VS_FOG: i32 = 600;
    pub const VS_POST_PROCESS: i32 = 700;

    pub const FS_PRE_PROCESS: i32 = 100;
    pub const FS_SAMPLING: i32 = 250;
    pub const FS_COLOUR_BEGIN: i32 = 300;
    pub const FS_TEXTURING: i32 = 400;
    pub const FS_COLOUR_END: i32 = 450;
    pub const FS_FOG: i32 = 500;
    pub const FS_ALPHA_TEST: i32 = 600;
    pub const FS_POST_PROCESS: i32 = 700;
}

/// Program entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    name: String,
    program_type: GpuProgramType,
    pub(crate) inputs: Vec<ParameterPtr>,
    pub(crate) outputs: Vec<ParameterPtr>,
    pub(crate) locals: Vec<ParameterPtr>,
    pub(crate) atoms: BTreeMap<i32, Vec<Atom>>,
    /// Vertex attributes a vertex function may read. `None` means unrestricted.
    available_attributes: Option<VertexElements>,
}

impl Function {
    #[must_use]
    pub fn new(program_type: GpuProgramType) -> Self {
        Self {
            name: "main".to_string(),
            program_type,
            inputs: Vec::new(),
            outputs: Vec::new(),
            locals: Vec::new(),
            atoms: BTreeMap::new(),
            available_attributes: None,
        }
    }

    /// Restricts which vertex attributes [`Function::resolve_input_parameter`]
    /// may bind.
    pub fn set_available_attributes(&mut self, attributes: Option<VertexElements>) {
        self.available_attributes = attributes;
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn program_type(&self) -> GpuProgramType {
        self.program_type
    }

    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[ParameterPtr] {
        &self.inputs
    }

    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &[ParameterPtr] {
        &self.outputs
    }

    #[inline]
    #[must_use]
    pub fn locals(&self) -> &[ParameterPtr] {
        &self.locals
    }

    #[must_use]
    pub fn available_attributes(&self) -> Option<VertexElements> {
        self.available_attributes
    }

    /// Input parameter carrying `content`, if resolved.
    #[must_use]
    pub fn input_by_content(&self, content: Content) -> Option<&ParameterPtr> {
        self.inputs.iter().find(|p| p.content == content)
    }

    /// Output parameter carrying `content`, if resolved.
    #[must_use]
    pub fn output_by_content(&self, content: Content) -> Option<&ParameterPtr> {
        self.outputs.iter().find(|p| p.content == content)
    }

    /// Local parameter carrying `content`, if resolved.
    #[must_use]
    pub fn local_by_content(&self, content: Content) -> Option<&ParameterPtr> {
        self.locals.iter().find(|p| p.content == content)
    }

    // ── Parameter resolution ─────────────────────────────────────────────────

    /// Returns the input for `content`, creating it with the content's default
    /// type on first request.
    pub fn resolve_input_parameter(&mut self, content: Content) -> Result<ParameterPtr> {
        self.resolve_input_parameter_typed(content, content.default_type())
    }

    /// Returns the input for `content`, creating it with type `ty` on first
    /// request. An existing input is returned unchanged whatever its type.
    ///
    /// Fails with [`RtssError::ResolveFailure`] when a vertex function asks for
    /// an attribute the vertex layout does not provide.
    pub fn resolve_input_parameter_typed(
        &mut self,
        content: Content,
        ty: GpuConstantType,
    ) -> Result<ParameterPtr> {
        if let Some(existing) = self.input_by_content(content) {
            return Ok(Arc::clone(existing));
        }

        let (semantic, index) = if self.program_type == GpuProgramType::Vertex {
            if let (Some(layout), Some(element)) =
                (self.available_attributes, content.vertex_element())
                && !layout.contains(element)
            {
                return Err(RtssError::resolve(
                    "",
                    format!("vertex attribute {element:?} is not available"),
                ));
            }
            let semantic = content.vertex_input_semantic();
            let index = match content {
                Content::TextureCoordinate(set) => u32::from(set),
                _ => content
                    .fixed_index()
                    .unwrap_or_else(|| next_free_index(&self.inputs, semantic)),
            };
            (semantic, index)
        } else {
            let semantic = content.varying_semantic();
            let index = content
                .fixed_index()
                .unwrap_or_else(|| next_free_index(&self.inputs, semantic));
            (semantic, index)
        };

        let param = Arc::new(Parameter::new(
            ParameterKind::Input,
            format!("i{}_{index}", semantic.name_fragment()),
            ty,
            semantic,
            index,
            content,
        ));
        self.inputs.push(Arc::clone(&param));
        Ok(param)
    }

    /// Returns the output for `content`, creating it with the content's
    /// default type on first request.
    pub fn resolve_output_parameter(&mut self, content: Content) -> Result<ParameterPtr> {
        self.resolve_output_parameter_typed(content, content.default_type())
    }

    /// Returns the output for `content`, creating it with type `ty` on first
    /// request.
    pub fn resolve_output_parameter_typed(
        &mut self,
        content: Content,
        ty: GpuConstantType,
    ) -> Result<ParameterPtr> {
        if let Some(existing) = self.output_by_content(content) {
            return Ok(Arc::clone(existing));
        }

        let (semantic, index) = match self.program_type {
            GpuProgramType::Fragment => {
                // Fragment outputs are render targets: colour 0 is diffuse,
                // colour 1 specular, anything else takes the next free target.
                let index = content.fixed_index().unwrap_or_else(|| {
                    next_free_index(&self.outputs, Semantic::Color).max(2)
                });
                (Semantic::Color, index)
            }
            _ => {
                let semantic = content.varying_semantic();
                if semantic == Semantic::FrontFacing {
                    return Err(RtssError::resolve(
                        "",
                        "front facing is a fragment input only",
                    ));
                }
                let index = content
                    .fixed_index()
                    .unwrap_or_else(|| next_free_index(&self.outputs, semantic));
                (semantic, index)
            }
        };

        let param = Arc::new(Parameter::new(
            ParameterKind::Output,
            format!("o{}_{index}", semantic.name_fragment()),
            ty,
            semantic,
            index,
            content,
        ));
        self.outputs.push(Arc::clone(&param));
        Ok(param)
    }

    /// Returns the local for `(content, ty)`, creating it on first request.
    pub fn resolve_local_parameter(
        &mut self,
        content: Content,
        ty: GpuConstantType,
    ) -> ParameterPtr {
        if let Some(existing) = self
            .locals
            .iter()
            .find(|p| p.content == content && p.ty == ty)
        {
            return Arc::clone(existing);
        }
        let name = self.unique_local_name(&format!("l{}", content.tag()));
        self.push_local(Parameter::new(
            ParameterKind::Local,
            name,
            ty,
            Semantic::Unknown,
            0,
            content,
        ))
    }

    /// Returns the untagged local named `name`, creating it on first request.
    pub fn resolve_local_named(&mut self, name: &str, ty: GpuConstantType) -> ParameterPtr {
        if let Some(existing) = self
            .locals
            .iter()
            .find(|p| p.content == Content::Unknown && p.name == name)
        {
            return Arc::clone(existing);
        }
        let name = self.unique_local_name(name);
        self.push_local(Parameter::new(
            ParameterKind::Local,
            name,
            ty,
            Semantic::Unknown,
            0,
            Content::Unknown,
        ))
    }

    fn push_local(&mut self, param: Parameter) -> ParameterPtr {
        let param = Arc::new(param);
        self.locals.push(Arc::clone(&param));
        param
    }

    fn unique_local_name(&self, base: &str) -> String {
        let taken = |n: &str| self.locals.iter().any(|p| p.name == n);
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{base}_{i}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    // ── Atoms ────────────────────────────────────────────────────────────────

    /// Appends `atom` to `stage`.
    pub fn add_atom(&mut self, stage: i32, atom: Atom) {
        self.atoms.entry(stage).or_default().push(atom);
    }

    /// Atoms in execution order, paired with their stage.
    pub fn atoms(&self) -> impl Iterator<Item = (i32, &Atom)> {
        self.atoms
            .iter()
            .flat_map(|(stage, atoms)| atoms.iter().map(move |a| (*stage, a)))
    }

    /// Mutable atoms in execution order.
    pub fn atoms_mut(&mut self) -> impl Iterator<Item = &mut Atom> {
        self.atoms.values_mut().flatten()
    }

    /// Atoms of a single stage.
    #[must_use]
    pub fn stage_atoms(&self, stage: i32) -> &[Atom] {
        self.atoms.get(&stage).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn atom_count(&self) -> usize {
        self.atoms.values().map(Vec::len).sum()
    }

    /// Whether any atom references `param`.
    #[must_use]
    pub fn is_referenced(&self, param: &ParameterPtr) -> bool {
        let mut found = false;
        for (_, atom) in self.atoms() {
            atom.for_each_operand(|op| found |= super::same_parameter(op.parameter(), param));
            if found {
                break;
            }
        }
        found
    }

    /// Whether any atom writes `param`.
    #[must_use]
    pub fn is_written(&self, param: &ParameterPtr) -> bool {
        let mut found = false;
        for (_, atom) in self.atoms() {
            atom.for_each_operand(|op| {
                found |= op.is_write() && super::same_parameter(op.parameter(), param);
            });
        }
        found
    }

    /// Drops locals no atom references.
    pub fn prune_unused_locals(&mut self) -> usize {
        let before = self.locals.len();
        let locals = std::mem::take(&mut self.locals);
        self.locals = locals
            .into_iter()
            .filter(|p| self.is_referenced(p))
            .collect();
        before - self.locals.len()
    }

    /// Replaces every operand referring to `from` by a reference to `to`,
    /// passing the old mask through `remap`.
    pub(crate) fn rewrite_references(
        &mut self,
        from: &ParameterPtr,
        to: &ParameterPtr,
        remap: impl Fn(super::OperandMask, GpuConstantType) -> super::OperandMask,
    ) {
        for atom in self.atoms_mut() {
            atom.for_each_operand_mut(|op| {
                if super::same_parameter(&op.param, from) {
                    op.mask = remap(op.mask, from.ty);
                    op.param = Arc::clone(to);
                }
            });
        }
    }
}

/// Lowest index of `semantic` not yet taken in `params`.
fn next_free_index(params: &[ParameterPtr], semantic: Semantic) -> u32 {
    (0..)
        .find(|i| {
            !params
                .iter()
                .any(|p| p.semantic == semantic && p.index == *i)
        })
        .unwrap_or(0)
}
