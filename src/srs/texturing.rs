//! Fixed-function texturing.
//!
//! One sample per texture unit of the source pass, blended into the running
//! colour by the unit's colour operation:
//!
//! | Operation             | Result                                  |
//! |-----------------------|-----------------------------------------|
//! | `Modulate`            | `colour * texel`                        |
//! | `Replace`             | `texel`                                 |
//! | `Add`                 | `colour.rgb + texel.rgb`, alpha modulated|
//! | `AddSigned`           | `FFP_AddSigned(colour, texel)`          |
//! | `Subtract`            | `colour.rgb - texel.rgb`                |
//! | `Blend*Alpha`         | `mix(colour, texel, alpha)`             |

use crate::errors::Result;
use crate::ir::{
    ArithOp, Atom, AutoConstantType, Builtin, Content, GpuConstantType, Operand, OperandMask,
    ParameterPtr, Program, ProgramSet, stages,
};
use crate::material::{LayerBlendOperation, Pass, TextureType};
use crate::render_state::{
    PreAddContext, SrsTag, SubRenderState, SubRenderStateFactory, execution_order,
    impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::colour::ColourStages;
use super::{libs, xyz};

/// Varyings of transformed texture coordinates are keyed per unit so two
/// units sharing a set with different matrices do not collide.
const TRANSFORMED_TEXCOORD_CONTENT_BASE: u16 = 0x100;

/// What texturing needs to know about one unit of the source pass.
#[derive(Debug, Clone, PartialEq)]
struct TextureUnitParams {
    sampler_index: u32,
    texture_type: TextureType,
    tex_coord_set: u8,
    colour_op: LayerBlendOperation,
    has_transform: bool,
}

impl TextureUnitParams {
    fn varying_content(&self) -> Content {
        if self.has_transform {
            Content::Custom(TRANSFORMED_TEXCOORD_CONTENT_BASE + self.sampler_index as u16)
        } else {
            Content::TextureCoordinate(self.tex_coord_set)
        }
    }
}

/// Samples every texture unit of the source pass.
#[derive(Debug, Clone, Default)]
pub struct FfpTexturing {
    units: Vec<TextureUnitParams>,
}

impl FfpTexturing {
    /// Number of units captured by the last `pre_add_to_render_state`.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn add_unit_vs(&self, vs: &mut Program, unit: &TextureUnitParams, coord_ty: GpuConstantType) -> Result<()> {
        let content = unit.varying_content();
        if vs.entry().output_by_content(content).is_some() {
            return Ok(());
        }
        let input = vs.entry_mut().resolve_input_parameter_typed(
            Content::TextureCoordinate(unit.tex_coord_set),
            coord_ty,
        )?;
        let out = vs
            .entry_mut()
            .resolve_output_parameter_typed(content, coord_ty)?;

        let atom = if unit.has_transform {
            let matrix =
                vs.resolve_auto_indexed(AutoConstantType::TextureMatrix, unit.sampler_index);
            Atom::invoke(
                "FFP_TransformTexCoord",
                [
                    Operand::input(&matrix),
                    Operand::input(&input),
                    Operand::output(&out),
                ],
            )
        } else {
            Atom::assign(Operand::input(&input), Operand::output(&out))
        };
        vs.entry_mut().add_atom(stages::VS_TEXTURING, atom);
        Ok(())
    }

    fn add_unit_fs(
        &self,
        fs: &mut Program,
        slot: usize,
        unit: &TextureUnitParams,
        coord_ty: GpuConstantType,
        colour: &ParameterPtr,
    ) -> Result<()> {
        let stage = stages::FS_TEXTURING + slot as i32 * 10;
        let sampler_ty = unit.texture_type.sampler_type();

        let coords = fs
            .entry_mut()
            .resolve_input_parameter_typed(unit.varying_content(), coord_ty)?;
        let sampler = fs.resolve_sampler(sampler_ty, unit.sampler_index)?;
        let texel = fs
            .entry_mut()
            .resolve_local_named(&format!("lTexel{}", unit.sampler_index), GpuConstantType::Float4);

        fs.entry_mut().add_atom(
            stage,
            Atom::sample(
                Operand::input(&sampler),
                Operand::input(&coords),
                Operand::output(&texel),
            ),
        );

        let blend = |alpha: Operand| {
            Atom::builtin(
                Builtin::Mix,
                [Operand::input(colour), Operand::input(&texel), alpha],
                Operand::output(colour),
            )
        };
        let atoms = match unit.colour_op {
            LayerBlendOperation::Modulate => vec![Atom::arith(
                ArithOp::Mul,
                Operand::input(colour),
                Operand::input(&texel),
                Operand::output(colour),
            )],
            LayerBlendOperation::Replace => {
                vec![Atom::assign(Operand::input(&texel), Operand::output(colour))]
            }
            LayerBlendOperation::Add => vec![
                Atom::arith(
                    ArithOp::Add,
                    xyz(Operand::input(colour)),
                    xyz(Operand::input(&texel)),
                    xyz(Operand::output(colour)),
                ),
                Atom::arith(
                    ArithOp::Mul,
                    Operand::input(colour).with_mask(OperandMask::W),
                    Operand::input(&texel).with_mask(OperandMask::W),
                    Operand::output(colour).with_mask(OperandMask::W),
                ),
            ],
            LayerBlendOperation::AddSigned => vec![Atom::invoke(
                "FFP_AddSigned",
                [
                    Operand::input(colour),
                    Operand::input(&texel),
                    Operand::output(colour),
                ],
            )],
            LayerBlendOperation::Subtract => vec![Atom::arith(
                ArithOp::Sub,
                xyz(Operand::input(colour)),
                xyz(Operand::input(&texel)),
                xyz(Operand::output(colour)),
            )],
            LayerBlendOperation::BlendDiffuseAlpha => {
                let vertex = fs
                    .entry_mut()
                    .resolve_input_parameter(Content::ColorDiffuse)?;
                vec![blend(Operand::input(&vertex).with_mask(OperandMask::W))]
            }
            LayerBlendOperation::BlendTextureAlpha => {
                vec![blend(Operand::input(&texel).with_mask(OperandMask::W))]
            }
            LayerBlendOperation::BlendCurrentAlpha => {
                vec![blend(Operand::input(colour).with_mask(OperandMask::W))]
            }
        };
        for atom in atoms {
            fs.entry_mut().add_atom(stage, atom);
        }
        Ok(())
    }
}

impl SubRenderState for FfpTexturing {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::FfpTexturing
    }

    fn execution_order(&self) -> i32 {
        execution_order::TEXTURING
    }

    fn pre_add_to_render_state(
        &mut self,
        ctx: &mut PreAddContext,
        src_pass: &Pass,
        _dst_pass: &mut Pass,
    ) -> bool {
        self.units = (0u32..)
            .zip(&src_pass.texture_units)
            .map(|(i, unit)| TextureUnitParams {
                sampler_index: i,
                texture_type: unit.texture_type,
                tex_coord_set: unit.tex_coord_set,
                colour_op: unit.colour_op,
                has_transform: unit.has_transform,
            })
            .collect();
        if self
            .units
            .iter()
            .any(|u| u.colour_op == LayerBlendOperation::BlendDiffuseAlpha)
        {
            ctx.colour_stages |= ColourStages::PS_INPUT_DIFFUSE;
        }
        !self.units.is_empty()
    }

    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()> {
        program_set.vs_mut().add_dependency(libs::FFP_TEXTURING);
        program_set.fs_mut().add_dependency(libs::FFP_TEXTURING);

        let colour = program_set
            .fs_mut()
            .entry_mut()
            .resolve_output_parameter(Content::ColorDiffuse)?;

        for (slot, unit) in self.units.iter().enumerate() {
            let coord_ty = unit
                .texture_type
                .sampler_type()
                .sample_coordinate_type()
                .unwrap_or(GpuConstantType::Float2);
            self.add_unit_vs(program_set.vs_mut(), unit, coord_ty)?;
            self.add_unit_fs(program_set.fs_mut(), slot, unit, coord_ty, &colour)?;
        }
        Ok(())
    }

    impl_srs_boilerplate!();
}

/// Factory of [`FfpTexturing`]. Script: `texturing_stage ffp`.
#[derive(Debug, Default)]
pub struct FfpTexturingFactory;

impl SubRenderStateFactory for FfpTexturingFactory {
    fn type_name(&self) -> &str {
        SrsTag::FfpTexturing.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(FfpTexturing::default())
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        if node.name != "texturing_stage" {
            return None;
        }
        match node.value(0) {
            Some("ffp") => Some(self.create_instance()),
            other => {
                translator.error(node, format!("unknown texturing_stage mode {other:?}"));
                None
            }
        }
    }

    fn write_instance(
        &self,
        serializer: &mut ScriptSerializer,
        _srs: &dyn SubRenderState,
        _src_pass: &Pass,
        _dst_pass: &Pass,
    ) {
        serializer.write_attribute("texturing_stage", &["ffp"]);
    }
}
