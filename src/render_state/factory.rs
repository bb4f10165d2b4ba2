//! Sub render state factories and their registry.

use std::collections::BTreeMap;

use crate::errors::{Result, RtssError};
use crate::material::Pass;
use crate::script::{PropertyNode, ScriptSerializer, ScriptTranslator};

use super::SubRenderState;

/// Creator of one sub render state type.
///
/// Factories are registered once at startup and read-only afterwards.
pub trait SubRenderStateFactory: Send {
    /// Type string of the instances this factory creates.
    fn type_name(&self) -> &str;

    /// New instance with default parameters.
    fn create_instance(&self) -> Box<dyn SubRenderState>;

    /// Value-equal copy of `other`.
    fn clone_instance(&self, other: &dyn SubRenderState) -> Box<dyn SubRenderState> {
        let mut instance = self.create_instance();
        instance.copy_from(other);
        instance
    }

    /// Builds an instance from a material-script property.
    ///
    /// Returns `None` when the property is not one this factory understands.
    /// Malformed arguments of a recognised property are reported through
    /// `translator` and also yield `None`.
    fn create_from_script(
        &self,
        _node: &PropertyNode,
        _pass: &Pass,
        _translator: &mut ScriptTranslator,
    ) -> Option<Box<dyn SubRenderState>> {
        None
    }

    /// Writes the script property `srs` round-trips through.
    fn write_instance(
        &self,
        _serializer: &mut ScriptSerializer,
        _srs: &dyn SubRenderState,
        _src_pass: &Pass,
        _dst_pass: &Pass,
    ) {
    }
}

/// Factories keyed by type string.
///
/// Iteration is in type-name order, so lookups and script dispatch do not
/// depend on registration order.
#[derive(Default)]
pub struct SrsRegistry {
    factories: BTreeMap<String, Box<dyn SubRenderStateFactory>>,
}

impl std::fmt::Debug for SrsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl SrsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in feature.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for factory in crate::srs::builtin_factories() {
            let name = factory.type_name().to_string();
            registry.factories.insert(name, factory);
        }
        registry
    }

    /// Registers `factory`. Fails with [`RtssError::DuplicateType`] when its
    /// type is already present.
    pub fn add(&mut self, factory: Box<dyn SubRenderStateFactory>) -> Result<()> {
        let name = factory.type_name().to_string();
        if self.factories.contains_key(&name) {
            return Err(RtssError::DuplicateType(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn remove(&mut self, type_name: &str) -> Option<Box<dyn SubRenderStateFactory>> {
        self.factories.remove(type_name)
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&dyn SubRenderStateFactory> {
        self.factories.get(type_name).map(Box::as_ref)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered factories in type-name order.
    pub fn factories(&self) -> impl Iterator<Item = &dyn SubRenderStateFactory> {
        self.factories.values().map(Box::as_ref)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// New default instance of `type_name`.
    pub fn create(&self, type_name: &str) -> Result<Box<dyn SubRenderState>> {
        self.get(type_name)
            .map(SubRenderStateFactory::create_instance)
            .ok_or_else(|| RtssError::UnknownType(type_name.to_string()))
    }

    /// Value-equal copy of `srs`, produced by its own factory.
    pub fn clone_instance(&self, srs: &dyn SubRenderState) -> Result<Box<dyn SubRenderState>> {
        self.get(srs.type_name())
            .map(|factory| factory.clone_instance(srs))
            .ok_or_else(|| RtssError::UnknownType(srs.type_name().to_string()))
    }
}
