//! Built-in Sub Render States
//!
//! Each feature lives in its own module next to its factory.
//!
//! | Module            | Type string              | Order | Emits at                          |
//! |-------------------|--------------------------|-------|-----------------------------------|
//! | [`transform`]     | `FFP_Transform`          | 100   | `VS_TRANSFORM`                    |
//! | [`skinning`]      | `SGX_HardwareSkinning`   | 99    | `VS_TRANSFORM`                    |
//! | [`colour`]        | `FFP_Colour`             | 200   | `VS_COLOUR`, `FS_COLOUR_BEGIN/END`|
//! | [`lighting`]      | `FFP_Lighting`           | 300   | `FS_COLOUR_BEGIN + 1`             |
//! | [`per_pixel`]     | `SGX_PerPixelLighting`   | 300   | `FS_COLOUR_BEGIN + 1`             |
//! | [`normal_map`]    | `SGX_NormalMap`          | 300   | `FS_SAMPLING`, `FS_COLOUR_BEGIN+1`|
//! | [`cook_torrance`] | `CookTorrance`           | 300   | `FS_SAMPLING`, `FS_COLOUR_BEGIN+1`|
//! | [`texturing`]     | `FFP_Texturing`          | 400   | `VS_TEXTURING`, `FS_TEXTURING`    |
//! | [`fog`]           | `FFP_Fog`                | 500   | `VS_FOG`, `FS_FOG`                |
//! | [`alpha_test`]    | `FFP_AlphaTest`          | 600   | `FS_ALPHA_TEST`                   |
//! | [`wboit`]         | `WBOIT`                  | 700   | `FS_POST_PROCESS`                 |

pub mod alpha_test;
pub mod colour;
pub mod cook_torrance;
pub mod fog;
pub mod lighting;
pub mod normal_map;
pub mod per_pixel;
pub mod skinning;
pub mod texturing;
pub mod transform;
pub mod wboit;

use std::sync::Arc;

use crate::errors::Result;
use crate::ir::{
    Atom, AutoConstantType, Content, Operand, OperandMask, Parameter, ParameterPtr, Program,
    stages,
};
use crate::render_state::SubRenderStateFactory;

/// Shader library include names.
pub mod libs {
    pub const FFP_COMMON: &str = "FFPLib_Common";
    pub const FFP_TRANSFORM: &str = "FFPLib_Transform";
    pub const FFP_LIGHTING: &str = "FFPLib_Lighting";
    pub const FFP_TEXTURING: &str = "FFPLib_Texturing";
    pub const FFP_FOG: &str = "FFPLib_Fog";
    pub const FFP_ALPHA_TEST: &str = "FFPLib_AlphaTest";
    pub const SGX_PER_PIXEL_LIGHTING: &str = "SGXLib_PerPixelLighting";
    pub const SGX_NORMAL_MAP: &str = "SGXLib_NormalMap";
    pub const SGX_COOK_TORRANCE: &str = "SGXLib_CookTorrance";
    pub const SGX_DUAL_QUATERNION: &str = "SGXLib_DualQuaternion";
    pub const SGX_HARDWARE_SKINNING: &str = "SGXLib_HardwareSkinning";
    pub const SGX_WBOIT: &str = "SGXLib_WBOIT";
}

/// One factory per built-in feature.
#[must_use]
pub fn builtin_factories() -> Vec<Box<dyn SubRenderStateFactory>> {
    vec![
        Box::new(transform::FfpTransformFactory),
        Box::new(colour::FfpColourFactory),
        Box::new(lighting::FfpLightingFactory),
        Box::new(per_pixel::PerPixelLightingFactory),
        Box::new(normal_map::NormalMapLightingFactory),
        Box::new(cook_torrance::CookTorranceLightingFactory),
        Box::new(texturing::FfpTexturingFactory),
        Box::new(fog::FfpFogFactory),
        Box::new(alpha_test::FfpAlphaTestFactory),
        Box::new(skinning::HardwareSkinningFactory),
        Box::new(wboit::WboitFactory),
    ]
}

// ─── Shared helpers ──────────────────────────────────────────────────────────

/// Float literal parameter.
pub(crate) fn float_literal(values: &[f32]) -> ParameterPtr {
    Arc::new(Parameter::constant_float(values))
}

/// Integer literal parameter.
pub(crate) fn int_literal(value: i32) -> ParameterPtr {
    Arc::new(Parameter::constant_int(value))
}

/// View-space position varying of the vertex program, written once at
/// `VS_LIGHTING`.
///
/// Reads the skinned world-space position when skinning produced one.
pub(crate) fn resolve_view_position(vs: &mut Program) -> Result<ParameterPtr> {
    if let Some(existing) = vs.entry().output_by_content(Content::PositionViewSpace) {
        return Ok(Arc::clone(existing));
    }

    let (matrix, position) =
        match vs.entry().local_by_content(Content::PositionWorldSpace).cloned() {
            Some(world) => (vs.resolve_auto(AutoConstantType::ViewMatrix), world),
            None => (
                vs.resolve_auto(AutoConstantType::WorldViewMatrix),
                vs.entry_mut()
                    .resolve_input_parameter(Content::PositionObjectSpace)?,
            ),
        };
    let out = vs
        .entry_mut()
        .resolve_output_parameter(Content::PositionViewSpace)?;

    vs.add_dependency(libs::FFP_TRANSFORM);
    vs.entry_mut().add_atom(
        stages::VS_LIGHTING,
        Atom::invoke(
            "FFP_Transform",
            [
                Operand::input(&matrix),
                Operand::input(&position),
                Operand::output(&out),
            ],
        ),
    );
    Ok(out)
}

/// View-space normal varying of the vertex program, written once at
/// `VS_LIGHTING`.
pub(crate) fn resolve_view_normal(vs: &mut Program) -> Result<ParameterPtr> {
    if let Some(existing) = vs.entry().output_by_content(Content::NormalViewSpace) {
        return Ok(Arc::clone(existing));
    }

    let (matrix, normal) = match vs.entry().local_by_content(Content::NormalWorldSpace).cloned() {
        Some(world) => (vs.resolve_auto(AutoConstantType::ViewMatrix), world),
        None => (
            vs.resolve_auto(AutoConstantType::WorldViewMatrix),
            vs.entry_mut()
                .resolve_input_parameter(Content::NormalObjectSpace)?,
        ),
    };
    let out = vs
        .entry_mut()
        .resolve_output_parameter(Content::NormalViewSpace)?;

    vs.add_dependency(libs::FFP_TRANSFORM);
    vs.entry_mut().add_atom(
        stages::VS_LIGHTING,
        Atom::invoke(
            "FFP_TransformNormal",
            [
                Operand::input(&matrix),
                Operand::input(&normal),
                Operand::output(&out),
            ],
        ),
    );
    Ok(out)
}

/// Interpolated normal renormalised into `lNormalView` at `FS_PRE_PROCESS`.
pub(crate) fn resolve_normalised_view_normal(fs: &mut Program) -> Result<ParameterPtr> {
    let ty = Content::NormalViewSpace.default_type();
    if let Some(existing) = fs.entry().local_by_content(Content::NormalViewSpace) {
        return Ok(Arc::clone(existing));
    }
    let input = fs
        .entry_mut()
        .resolve_input_parameter(Content::NormalViewSpace)?;
    let local = fs
        .entry_mut()
        .resolve_local_parameter(Content::NormalViewSpace, ty);
    fs.entry_mut().add_atom(
        stages::FS_PRE_PROCESS,
        Atom::builtin(
            crate::ir::Builtin::Normalize,
            [Operand::input(&input)],
            Operand::output(&local),
        ),
    );
    Ok(local)
}

/// Forwards texture coordinate set `set` unchanged to a varying at
/// `VS_TEXTURING`, unless another feature already did.
pub(crate) fn forward_texcoord(vs: &mut Program, set: u8) -> Result<ParameterPtr> {
    let content = Content::TextureCoordinate(set);
    if let Some(existing) = vs.entry().output_by_content(content) {
        return Ok(Arc::clone(existing));
    }
    let input = vs.entry_mut().resolve_input_parameter(content)?;
    let out = vs
        .entry_mut()
        .resolve_output_parameter_typed(content, input.ty())?;
    vs.entry_mut().add_atom(
        stages::VS_TEXTURING,
        Atom::assign(Operand::input(&input), Operand::output(&out)),
    );
    Ok(out)
}

/// `.xyz` of a colour or position.
#[inline]
pub(crate) fn xyz(op: Operand) -> Operand {
    op.with_mask(OperandMask::XYZ)
}
