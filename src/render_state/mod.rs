//! Render States
//!
//! A [`RenderState`] is an ordered collection of [`SubRenderState`]s plus the
//! `[directional, point, spot]` light counts lighting features generate for.
//!
//! | Type                      | Role                                              |
//! |---------------------------|---------------------------------------------------|
//! | [`SubRenderState`]        | One pluggable feature (transform, fog, ...)       |
//! | [`SubRenderStateFactory`] | Creates, clones and (de)serializes one SRS type   |
//! | [`SrsRegistry`]           | Factories keyed by type string                    |
//! | [`RenderState`]           | Sorted SRS list of a scheme or a single pass      |
//!
//! Scheme templates and per-pass overrides are both `RenderState`s. The
//! effective state of a pass is [`RenderState::merge`] of the two.

mod factory;
mod sub_render_state;

pub use factory::{SrsRegistry, SubRenderStateFactory};
pub use sub_render_state::{PreAddContext, SrsTag, SubRenderState, execution_order};
pub(crate) use sub_render_state::impl_srs_boilerplate;

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::errors::Result;

/// Ordered set of sub render states, at most one per type.
#[derive(Debug, Default)]
pub struct RenderState {
    sub_render_states: Vec<Box<dyn SubRenderState>>,
    light_count: Option<[u32; 3]>,
}

impl RenderState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Sub render states ────────────────────────────────────────────────────

    /// Adds `srs`, replacing an instance of the same type.
    ///
    /// Lighting models are exclusive: adding one removes whichever lighting
    /// feature was present. Returns the replaced instance.
    pub fn add_template_sub_render_state(
        &mut self,
        srs: Box<dyn SubRenderState>,
    ) -> Option<Box<dyn SubRenderState>> {
        let replaced = self
            .sub_render_states
            .iter()
            .position(|s| {
                s.type_name() == srs.type_name() || (srs.is_lighting() && s.is_lighting())
            })
            .map(|pos| self.sub_render_states.remove(pos));

        let key = (srs.execution_order(), srs.type_name().to_string());
        let pos = self
            .sub_render_states
            .partition_point(|s| (s.execution_order(), s.type_name()) <= (key.0, key.1.as_str()));
        self.sub_render_states.insert(pos, srs);
        replaced
    }

    /// Removes the instance of `type_name`.
    pub fn remove_sub_render_state(&mut self, type_name: &str) -> Option<Box<dyn SubRenderState>> {
        let pos = self
            .sub_render_states
            .iter()
            .position(|s| s.type_name() == type_name)?;
        Some(self.sub_render_states.remove(pos))
    }

    /// Instances sorted by `(execution_order, type_name)`.
    #[inline]
    #[must_use]
    pub fn sub_render_states(&self) -> &[Box<dyn SubRenderState>] {
        &self.sub_render_states
    }

    pub(crate) fn sub_render_states_mut(&mut self) -> &mut [Box<dyn SubRenderState>] {
        &mut self.sub_render_states
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&dyn SubRenderState> {
        self.sub_render_states
            .iter()
            .find(|s| s.type_name() == type_name)
            .map(Box::as_ref)
    }

    pub fn get_mut(&mut self, type_name: &str) -> Option<&mut (dyn SubRenderState + 'static)> {
        self.sub_render_states
            .iter_mut()
            .find(|s| s.type_name() == type_name)
            .map(Box::as_mut)
    }

    /// First instance of the concrete type `T`.
    #[must_use]
    pub fn get_as<T: SubRenderState>(&self) -> Option<&T> {
        self.sub_render_states.iter().find_map(|s| s.downcast_ref::<T>())
    }

    pub fn get_as_mut<T: SubRenderState>(&mut self) -> Option<&mut T> {
        self.sub_render_states
            .iter_mut()
            .find_map(|s| s.downcast_mut::<T>())
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.get(type_name).is_some()
    }

    /// The lighting feature, if any.
    #[must_use]
    pub fn lighting(&self) -> Option<&dyn SubRenderState> {
        self.sub_render_states
            .iter()
            .find(|s| s.is_lighting())
            .map(Box::as_ref)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sub_render_states.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sub_render_states.is_empty()
    }

    /// Removes every instance and the light count.
    pub fn reset(&mut self) {
        self.sub_render_states.clear();
        self.light_count = None;
    }

    // ── Light count ──────────────────────────────────────────────────────────

    /// `[directional, point, spot]`; zero when never set.
    #[must_use]
    pub fn light_count(&self) -> [u32; 3] {
        self.light_count.unwrap_or_default()
    }

    #[must_use]
    pub fn has_light_count(&self) -> bool {
        self.light_count.is_some()
    }

    pub fn set_light_count(&mut self, light_count: [u32; 3]) {
        self.light_count = Some(light_count);
    }

    // ── Identity ─────────────────────────────────────────────────────────────

    /// Hash over the sorted `(type, parameters)` tuples and the light count.
    #[must_use]
    pub fn signature(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.light_count().hash(&mut hasher);
        self.sub_render_states.len().hash(&mut hasher);
        for srs in &self.sub_render_states {
            srs.type_name().hash(&mut hasher);
            srs.execution_order().hash(&mut hasher);
            srs.write_signature(&mut hasher);
        }
        hasher.finish()
    }

    /// Deep copy, each instance cloned by its factory.
    pub fn duplicate(&self, registry: &SrsRegistry) -> Result<Self> {
        let sub_render_states = self
            .sub_render_states
            .iter()
            .map(|s| registry.clone_instance(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            sub_render_states,
            light_count: self.light_count,
        })
    }

    /// Effective state of a pass: `template` with `overrides` applied on top.
    ///
    /// An override replaces the template instance of the same type (and any
    /// template lighting model if it is one). The override light count wins
    /// when set.
    pub fn merge(template: &Self, overrides: &Self, registry: &SrsRegistry) -> Result<Self> {
        let mut merged = template.duplicate(registry)?;
        for srs in &overrides.sub_render_states {
            merged.add_template_sub_render_state(registry.clone_instance(srs.as_ref())?);
        }
        merged.light_count = overrides.light_count.or(template.light_count);
        Ok(merged)
    }
}

impl PartialEq for RenderState {
    fn eq(&self, other: &Self) -> bool {
        self.signature() == other.signature()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srs::{
        alpha_test::FfpAlphaTest, colour::FfpColour, cook_torrance::CookTorranceLighting,
        fog::FfpFog, lighting::FfpLighting, transform::FfpTransform,
    };

    #[test]
    fn entries_stay_sorted_by_execution_order() {
        let mut rs = RenderState::new();
        rs.add_template_sub_render_state(Box::new(FfpAlphaTest::default()));
        rs.add_template_sub_render_state(Box::new(FfpTransform::default()));
        rs.add_template_sub_render_state(Box::new(FfpFog::default()));
        rs.add_template_sub_render_state(Box::new(FfpColour::default()));

        let orders: Vec<i32> = rs
            .sub_render_states()
            .iter()
            .map(|s| s.execution_order())
            .collect();
        assert_eq!(orders, vec![100, 200, 500, 600]);
    }

    #[test]
    fn same_type_is_replaced() {
        let mut rs = RenderState::new();
        assert!(rs.add_template_sub_render_state(Box::new(FfpTransform::default())).is_none());
        assert!(rs.add_template_sub_render_state(Box::new(FfpTransform::default())).is_some());
        assert_eq!(rs.len(), 1);
    }

    #[test]
    fn lighting_models_are_exclusive() {
        let mut rs = RenderState::new();
        rs.add_template_sub_render_state(Box::new(FfpLighting::default()));
        let replaced = rs.add_template_sub_render_state(Box::new(CookTorranceLighting::default()));
        assert_eq!(replaced.map(|s| s.type_name().to_string()).as_deref(), Some("FFP_Lighting"));
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.lighting().map(|s| s.type_name()), Some("CookTorrance"));
    }

    #[test]
    fn signature_tracks_parameters_and_light_count() {
        let registry = SrsRegistry::with_builtin();
        let mut a = RenderState::new();
        a.add_template_sub_render_state(Box::new(FfpTransform::default()));
        a.add_template_sub_render_state(Box::new(FfpLighting::default()));
        let b = a.duplicate(&registry).unwrap();
        assert_eq!(a, b);

        a.set_light_count([1, 0, 0]);
        assert_ne!(a, b);
    }

    #[test]
    fn merge_applies_overrides() {
        let registry = SrsRegistry::with_builtin();
        let mut template = RenderState::new();
        template.add_template_sub_render_state(Box::new(FfpTransform::default()));
        template.add_template_sub_render_state(Box::new(FfpLighting::default()));
        template.set_light_count([1, 0, 0]);

        let mut overrides = RenderState::new();
        overrides.add_template_sub_render_state(Box::new(CookTorranceLighting::default()));
        overrides.set_light_count([0, 2, 0]);

        let merged = RenderState::merge(&template, &overrides, &registry).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(merged.contains("CookTorrance"));
        assert!(!merged.contains("FFP_Lighting"));
        assert_eq!(merged.light_count(), [0, 2, 0]);
        // The template itself is untouched.
        assert!(template.contains("FFP_Lighting"));
    }
}
