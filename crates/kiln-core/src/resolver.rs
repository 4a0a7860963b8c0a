//! Plugin identifier resolution.
//!
//! Resolution is a pluggable seam: the orchestrator only needs
//! "identifier in, factory out". The shipped [`RegistryResolver`] is a
//! compiled-in table; environments with real dynamic loading supply
//! their own [`PluginResolver`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::plugin::{PluginFactory, PluginId};
use crate::{CoreError, Result};

/// Resolves a plugin identifier to its factory.
pub trait PluginResolver: Send + Sync {
    fn resolve(&self, id: &PluginId) -> Result<Arc<dyn PluginFactory>>;
}

/// Static identifier → factory table.
#[derive(Default, Clone)]
pub struct RegistryResolver {
    factories: HashMap<PluginId, Arc<dyn PluginFactory>>,
}

impl RegistryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under an identifier, replacing any previous one.
    pub fn register<F>(&mut self, id: impl Into<PluginId>, factory: F)
    where
        F: PluginFactory + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    /// Chaining form of [`register`](Self::register).
    pub fn with<F>(mut self, id: impl Into<PluginId>, factory: F) -> Self
    where
        F: PluginFactory + 'static,
    {
        self.register(id, factory);
        self
    }

    pub fn contains(&self, id: &PluginId) -> bool {
        self.factories.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl PluginResolver for RegistryResolver {
    fn resolve(&self, id: &PluginId) -> Result<Arc<dyn PluginFactory>> {
        self.factories
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::Resolution {
                id: id.to_string(),
                reason: "not registered".to_string(),
            })
    }
}

impl fmt::Debug for RegistryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryResolver")
            .field("ids", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Contribution, SetupFn};
    use crate::PluginApi;

    fn noop() -> SetupFn<impl Fn(&mut PluginApi<'_>) -> anyhow::Result<Contribution> + Send + Sync>
    {
        SetupFn(|_api: &mut PluginApi<'_>| Ok(Contribution::default()))
    }

    #[test]
    fn test_resolve_registered_factory() {
        let resolver = RegistryResolver::new().with("base", noop());
        assert!(resolver.contains(&"base".into()));
        assert!(resolver.resolve(&"base".into()).is_ok());
    }

    #[test]
    fn test_unknown_identifier_is_resolution_error() {
        let resolver = RegistryResolver::new();
        let err = resolver.resolve(&"ghost".into()).unwrap_err();
        match err {
            CoreError::Resolution { id, .. } => assert_eq!(id, "ghost"),
            other => panic!("expected Resolution, got {other:?}"),
        }
    }

    #[test]
    fn test_register_replaces_previous() {
        let mut resolver = RegistryResolver::new();
        resolver.register("base", noop());
        resolver.register("base", noop());
        assert_eq!(resolver.len(), 1);
    }
}
