//! Hardware skinning.
//!
//! Blends the object-space position (and normal, when the layout has one)
//! by up to four bone transforms before the transform stage reads it. The
//! result lands in the `PositionWorldSpace` / `NormalWorldSpace` locals, which
//! the transform and lighting features pick up in place of the raw inputs.
//!
//! | Technique        | Bone uniform                           | Blend call              |
//! |------------------|----------------------------------------|-------------------------|
//! | `Linear`         | `world_matrix_array_3x4[bones]`        | `SGX_BlendWeight`       |
//! | `DualQuaternion` | `world_dualquaternion_array_2x4[bones]`| `SGX_BlendDQ`           |

use std::hash::{Hash, Hasher};

use crate::errors::Result;
use crate::ir::{
    Atom, AutoConstantType, Builtin, Content, GpuConstantType, Operand, OperandMask,
    ParameterPtr, Program, ProgramSet, VertexElements, stages,
};
use crate::material::Pass;
use crate::render_state::{
    PreAddContext, SrsTag, SubRenderState, SubRenderStateFactory, execution_order,
    impl_srs_boilerplate,
};
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::{float_literal, libs, xyz};

pub const MAX_BONE_COUNT: u32 = 256;
pub const MAX_WEIGHT_COUNT: u32 = 4;

const SKINNING_PROPERTY: &str = "hardware_skinning";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SkinningTechnique {
    #[default]
    Linear,
    DualQuaternion,
}

impl SkinningTechnique {
    #[must_use]
    pub fn script_name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::DualQuaternion => "dual_quaternion",
        }
    }
}

/// Bone-weighted vertex blending.
#[derive(Debug, Clone)]
pub struct HardwareSkinning {
    technique: SkinningTechnique,
    bone_count: u32,
    weight_count: u32,
    correct_antipodality: bool,
    scale_shearing: bool,
}

impl Default for HardwareSkinning {
    fn default() -> Self {
        Self::linear(0, 1)
    }
}

impl HardwareSkinning {
    /// Linear blend skinning with `bone_count` bones and `weight_count`
    /// influences per vertex.
    #[must_use]
    pub fn linear(bone_count: u32, weight_count: u32) -> Self {
        let mut srs = Self {
            technique: SkinningTechnique::Linear,
            bone_count: 0,
            weight_count: 1,
            correct_antipodality: false,
            scale_shearing: false,
        };
        srs.set_counts(bone_count, weight_count);
        srs
    }

    #[must_use]
    pub fn dual_quaternion(bone_count: u32, weight_count: u32) -> Self {
        Self {
            technique: SkinningTechnique::DualQuaternion,
            ..Self::linear(bone_count, weight_count)
        }
    }

    /// Sets the bone and weight counts, clamped to what the shader library
    /// supports.
    pub fn set_counts(&mut self, bone_count: u32, weight_count: u32) {
        self.bone_count = bone_count.min(MAX_BONE_COUNT);
        self.weight_count = weight_count.clamp(1, MAX_WEIGHT_COUNT);
    }

    #[must_use]
    pub fn technique(&self) -> SkinningTechnique {
        self.technique
    }

    #[must_use]
    pub fn bone_count(&self) -> u32 {
        self.bone_count
    }

    #[must_use]
    pub fn weight_count(&self) -> u32 {
        self.weight_count
    }

    #[must_use]
    pub fn correct_antipodality(&self) -> bool {
        self.correct_antipodality
    }

    #[must_use]
    pub fn scale_shearing(&self) -> bool {
        self.scale_shearing
    }

    /// Dual-quaternion options; ignored by linear skinning.
    pub fn set_dual_quaternion_options(&mut self, correct_antipodality: bool, scale_shearing: bool) {
        self.correct_antipodality = correct_antipodality;
        self.scale_shearing = scale_shearing;
    }

    fn weight(weights: &ParameterPtr, i: u32) -> Operand {
        Operand::input(weights).with_mask(OperandMask::lane(i))
    }

    fn bone(bones: &ParameterPtr, indices: &ParameterPtr, i: u32) -> Operand {
        Operand::input(bones).indexed_by(Operand::input(indices).with_mask(OperandMask::lane(i)))
    }

    fn emit_linear(
        &self,
        vs: &mut Program,
        has_normal: bool,
        weights: &ParameterPtr,
        indices: &ParameterPtr,
    ) -> Result<()> {
        let bones = vs.resolve_auto_array(AutoConstantType::WorldMatrixArray3x4, self.bone_count);
        let position = vs
            .entry_mut()
            .resolve_input_parameter(Content::PositionObjectSpace)?;
        let world = vs
            .entry_mut()
            .resolve_local_parameter(Content::PositionWorldSpace, GpuConstantType::Float4);

        let f = vs.entry_mut();
        f.add_atom(
            stages::VS_TRANSFORM,
            Atom::assign(
                Operand::input(&float_literal(&[0.0, 0.0, 0.0, 0.0])),
                Operand::output(&world),
            ),
        );
        for i in 0..self.weight_count {
            f.add_atom(
                stages::VS_TRANSFORM,
                Atom::invoke(
                    "SGX_BlendWeight",
                    [
                        Self::weight(weights, i),
                        Self::bone(&bones, indices, i),
                        Operand::input(&position),
                        xyz(Operand::inout(&world)),
                    ],
                ),
            );
        }
        f.add_atom(
            stages::VS_TRANSFORM,
            Atom::assign(
                Operand::input(&float_literal(&[1.0])),
                Operand::output(&world).with_mask(OperandMask::W),
            ),
        );

        if has_normal {
            let normal = f.resolve_input_parameter(Content::NormalObjectSpace)?;
            let world_normal =
                f.resolve_local_parameter(Content::NormalWorldSpace, GpuConstantType::Float3);
            f.add_atom(
                stages::VS_TRANSFORM,
                Atom::assign(
                    Operand::input(&float_literal(&[0.0, 0.0, 0.0])),
                    Operand::output(&world_normal),
                ),
            );
            for i in 0..self.weight_count {
                f.add_atom(
                    stages::VS_TRANSFORM,
                    Atom::invoke(
                        "SGX_BlendNormal",
                        [
                            Self::weight(weights, i),
                            Self::bone(&bones, indices, i),
                            Operand::input(&normal),
                            Operand::inout(&world_normal),
                        ],
                    ),
                );
            }
            f.add_atom(
                stages::VS_TRANSFORM,
                Atom::builtin(
                    Builtin::Normalize,
                    [Operand::input(&world_normal)],
                    Operand::output(&world_normal),
                ),
            );
        }
        Ok(())
    }

    fn emit_dual_quaternion(
        &self,
        vs: &mut Program,
        has_normal: bool,
        weights: &ParameterPtr,
        indices: &ParameterPtr,
    ) -> Result<()> {
        vs.add_dependency(libs::SGX_DUAL_QUATERNION);
        let dqs = vs.resolve_auto_array(
            AutoConstantType::WorldDualQuaternionArray2x4,
            self.bone_count,
        );
        let scale_shear = self.scale_shearing.then(|| {
            vs.resolve_auto_array(
                AutoConstantType::WorldScaleShearMatrixArray3x4,
                self.bone_count,
            )
        });
        let position = vs
            .entry_mut()
            .resolve_input_parameter(Content::PositionObjectSpace)?;
        let world = vs
            .entry_mut()
            .resolve_local_parameter(Content::PositionWorldSpace, GpuConstantType::Float4);

        let f = vs.entry_mut();
        let blend_dq = f.resolve_local_named("lBlendDQ", GpuConstantType::Matrix2x4);
        f.add_atom(
            stages::VS_TRANSFORM,
            Atom::builtin(
                Builtin::Construct(GpuConstantType::Matrix2x4),
                [Operand::input(&float_literal(&[0.0]))],
                Operand::output(&blend_dq),
            ),
        );
        for i in 0..self.weight_count {
            let atom = if self.correct_antipodality && i > 0 {
                Atom::invoke(
                    "SGX_AntipodalityAdjustment",
                    [
                        Self::bone(&dqs, indices, 0),
                        Self::bone(&dqs, indices, i),
                        Self::weight(weights, i),
                        Operand::inout(&blend_dq),
                    ],
                )
            } else {
                Atom::invoke(
                    "SGX_BlendDQ",
                    [
                        Self::bone(&dqs, indices, i),
                        Self::weight(weights, i),
                        Operand::inout(&blend_dq),
                    ],
                )
            };
            f.add_atom(stages::VS_TRANSFORM, atom);
        }
        f.add_atom(
            stages::VS_TRANSFORM,
            Atom::invoke("SGX_NormalizeDualQuaternion", [Operand::inout(&blend_dq)]),
        );

        // Scale and shear are applied to the bind pose before the rigid blend.
        let source = match &scale_shear {
            Some(matrices) => {
                let scaled = f.resolve_local_named("lScaledPosition", GpuConstantType::Float4);
                f.add_atom(
                    stages::VS_TRANSFORM,
                    Atom::assign(
                        Operand::input(&float_literal(&[0.0, 0.0, 0.0, 1.0])),
                        Operand::output(&scaled),
                    ),
                );
                for i in 0..self.weight_count {
                    f.add_atom(
                        stages::VS_TRANSFORM,
                        Atom::invoke(
                            "SGX_BlendWeight",
                            [
                                Self::weight(weights, i),
                                Self::bone(matrices, indices, i),
                                Operand::input(&position),
                                xyz(Operand::inout(&scaled)),
                            ],
                        ),
                    );
                }
                scaled
            }
            None => position,
        };

        f.add_atom(
            stages::VS_TRANSFORM,
            Atom::invoke(
                "SGX_CalculateBlendPosition",
                [
                    xyz(Operand::input(&source)),
                    Operand::input(&blend_dq),
                    xyz(Operand::output(&world)),
                ],
            ),
        );
        f.add_atom(
            stages::VS_TRANSFORM,
            Atom::assign(
                Operand::input(&float_literal(&[1.0])),
                Operand::output(&world).with_mask(OperandMask::W),
            ),
        );

        if has_normal {
            let normal = f.resolve_input_parameter(Content::NormalObjectSpace)?;
            let world_normal =
                f.resolve_local_parameter(Content::NormalWorldSpace, GpuConstantType::Float3);
            f.add_atom(
                stages::VS_TRANSFORM,
                Atom::invoke(
                    "SGX_CalculateBlendNormal",
                    [
                        Operand::input(&normal),
                        Operand::input(&blend_dq),
                        Operand::output(&world_normal),
                    ],
                ),
            );
        }
        Ok(())
    }
}

impl SubRenderState for HardwareSkinning {
    fn tag(&self) -> SrsTag<'_> {
        SrsTag::HardwareSkinning
    }

    fn execution_order(&self) -> i32 {
        execution_order::TRANSFORM - 1
    }

    fn pre_add_to_render_state(
        &mut self,
        _ctx: &mut PreAddContext,
        _src_pass: &Pass,
        _dst_pass: &mut Pass,
    ) -> bool {
        self.bone_count > 0
    }

    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()> {
        let has_normal = program_set
            .vertex_layout()
            .contains(VertexElements::NORMAL);
        let vs = program_set.vs_mut();
        vs.add_dependency(libs::SGX_HARDWARE_SKINNING);

        let indices = vs.entry_mut().resolve_input_parameter(Content::BlendIndices)?;
        let weights = vs.entry_mut().resolve_input_parameter(Content::BlendWeights)?;

        match self.technique {
            SkinningTechnique::Linear => self.emit_linear(vs, has_normal, &weights, &indices)?,
            SkinningTechnique::DualQuaternion => {
                self.emit_dual_quaternion(vs, has_normal, &weights, &indices)?;
            }
        }
        vs.set_skeletal_animation_included(true);
        Ok(())
    }

    fn write_signature(&self, mut state: &mut dyn Hasher) {
        self.technique.hash(&mut state);
        self.bone_count.hash(&mut state);
        self.weight_count.hash(&mut state);
        self.correct_antipodality.hash(&mut state);
        self.scale_shearing.hash(&mut state);
    }

    impl_srs_boilerplate!();
}

/// Factory of [`HardwareSkinning`].
///
/// Script: `hardware_skinning <bones> <weights> [linear|dual_quaternion]
/// [correct_antipodality] [scale_shearing]`.
#[derive(Debug, Default)]
pub struct HardwareSkinningFactory;

impl SubRenderStateFactory for HardwareSkinningFactory {
    fn type_name(&self) -> &str {
        SrsTag::HardwareSkinning.as_str()
    }

    fn create_instance(&self) -> Box<dyn SubRenderState> {
        Box::new(HardwareSkinning::default())
    }

    fn create_from_script(
        &self,
        node: &PropertyNode,
        _pass: &Pass,
        translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        if node.name != SKINNING_PROPERTY {
            return None;
        }
        let bones = translator.parse_u32(node, 0)?;
        let weights = translator.parse_u32(node, 1)?;
        let mut srs = match node.value(2) {
            None | Some("linear") => HardwareSkinning::linear(bones, weights),
            Some("dual_quaternion") => HardwareSkinning::dual_quaternion(bones, weights),
            Some(other) => {
                translator.error(node, format!("unknown skinning technique '{other}'"));
                return None;
            }
        };
        if node.values.len() > 3 {
            let antipodality = translator.parse_bool(node, 3)?;
            let scale_shearing = match node.value(4) {
                Some(_) => translator.parse_bool(node, 4)?,
                None => false,
            };
            srs.set_dual_quaternion_options(antipodality, scale_shearing);
        }
        Some(Box::new(srs))
    }

    fn write_instance(
        &self,
        serializer: &mut ScriptSerializer,
        srs: &dyn SubRenderState,
        _src_pass: &Pass,
        _dst_pass: &Pass,
    ) {
        let Some(skinning) = srs.downcast_ref::<HardwareSkinning>() else {
            return;
        };
        let bones = skinning.bone_count.to_string();
        let weights = skinning.weight_count.to_string();
        let mut values = vec![
            bones.as_str(),
            weights.as_str(),
            skinning.technique.script_name(),
        ];
        if skinning.technique == SkinningTechnique::DualQuaternion {
            values.push(if skinning.correct_antipodality { "true" } else { "false" });
            values.push(if skinning.scale_shearing { "true" } else { "false" });
        }
        serializer.write_attribute(SKINNING_PROPERTY, &values);
    }
}
