//! The sub render state plug-in contract.

use std::any::Any;
use std::fmt;
use std::hash::Hasher;

use crate::errors::Result;
use crate::ir::ProgramSet;
use crate::material::Pass;
use crate::srs::colour::ColourStages;

/// Execution-order anchors. Smaller runs first.
pub mod execution_order {
    pub const TRANSFORM: i32 = 100;
    pub const COLOUR: i32 = 200;
    pub const LIGHTING: i32 = 300;
    pub const TEXTURING: i32 = 400;
    pub const FOG: i32 = 500;
    pub const ALPHA_TEST: i32 = 600;
    pub const POST_PROCESS: i32 = 700;
}

/// Type tag of a sub render state: one variant per built-in feature plus an
/// extension case for user-registered ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SrsTag<'a> {
    FfpTransform,
    FfpColour,
    FfpLighting,
    PerPixelLighting,
    NormalMapLighting,
    CookTorranceLighting,
    FfpTexturing,
    FfpFog,
    FfpAlphaTest,
    HardwareSkinning,
    WeightedBlendedOit,
    Extension(&'a str),
}

impl<'a> SrsTag<'a> {
    /// Type string used for registry lookup, equality and serialization.
    #[must_use]
    pub fn as_str(self) -> &'a str {
        match self {
            Self::FfpTransform => "FFP_Transform",
            Self::FfpColour => "FFP_Colour",
            Self::FfpLighting => "FFP_Lighting",
            Self::PerPixelLighting => "SGX_PerPixelLighting",
            Self::NormalMapLighting => "SGX_NormalMap",
            Self::CookTorranceLighting => "CookTorrance",
            Self::FfpTexturing => "FFP_Texturing",
            Self::FfpFog => "FFP_Fog",
            Self::FfpAlphaTest => "FFP_AlphaTest",
            Self::HardwareSkinning => "SGX_HardwareSkinning",
            Self::WeightedBlendedOit => "WBOIT",
            Self::Extension(name) => name,
        }
    }

    /// Lighting models are mutually exclusive within one render state.
    #[must_use]
    pub fn is_lighting(self) -> bool {
        matches!(
            self,
            Self::FfpLighting
                | Self::PerPixelLighting
                | Self::NormalMapLighting
                | Self::CookTorranceLighting
        )
    }
}

impl fmt::Display for SrsTag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state of one `pre_add_to_render_state` sweep.
#[derive(Debug, Clone, Default)]
pub struct PreAddContext {
    /// `[directional, point, spot]` light counts of the render state.
    pub light_count: [u32; 3],
    /// Colour stages later features need the colour feature to resolve.
    pub colour_stages: ColourStages,
}

impl PreAddContext {
    #[must_use]
    pub fn new(light_count: [u32; 3]) -> Self {
        Self {
            light_count,
            colour_stages: ColourStages::empty(),
        }
    }

    /// Total number of lights.
    #[must_use]
    pub fn total_lights(&self) -> u32 {
        self.light_count.iter().sum()
    }
}

/// A pluggable feature that emits atoms into a [`ProgramSet`].
pub trait SubRenderState: Any + Send + fmt::Debug {
    fn tag(&self) -> SrsTag<'_>;

    #[inline]
    fn type_name(&self) -> &str {
        self.tag().as_str()
    }

    fn execution_order(&self) -> i32;

    /// Makes `self` value-equal to `other` when both are the same type.
    fn copy_from(&mut self, other: &dyn SubRenderState);

    /// Opt-in check against the source pass. May mutate the destination pass
    /// (blend state, extra texture units). Returns `false` to drop the
    /// feature from this generation.
    fn pre_add_to_render_state(
        &mut self,
        _ctx: &mut PreAddContext,
        _src_pass: &Pass,
        _dst_pass: &mut Pass,
    ) -> bool {
        true
    }

    /// Resolves parameters and inserts atoms.
    fn create_cpu_sub_programs(&mut self, program_set: &mut ProgramSet) -> Result<()>;

    /// Feeds the feature's parameters into a render-state signature.
    fn write_signature(&self, _state: &mut dyn Hasher) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn SubRenderState {
    #[inline]
    #[must_use]
    pub fn is_lighting(&self) -> bool {
        self.tag().is_lighting()
    }

    #[must_use]
    pub fn downcast_ref<T: SubRenderState>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: SubRenderState>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Implements the `Any` plumbing and a downcasting `copy_from` for a
/// `Clone` sub render state.
macro_rules! impl_srs_boilerplate {
    () => {
        fn copy_from(&mut self, other: &dyn $crate::render_state::SubRenderState) {
            if let Some(other) = other.as_any().downcast_ref::<Self>() {
                self.clone_from(other);
            }
        }

        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }
    };
}

pub(crate) use impl_srs_boilerplate;
