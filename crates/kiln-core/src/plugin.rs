//! Plugin identifiers, handles, and the factory contract.

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::PluginApi;
use crate::resolver::PluginResolver;
use crate::Result;

/// Opaque resolvable reference to a preset or plugin.
///
/// Created from initial options or a preset's contribution; consumed
/// once when resolved to a factory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PluginId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What a factory hands back to the orchestrator.
///
/// Only contributions returned while the preset queue is draining are
/// expanded further; a finalized plugin's contribution is ignored.
#[derive(Debug, Clone, Default)]
pub struct Contribution {
    /// Presets to expand next, ahead of the remaining siblings.
    pub presets: Vec<PluginId>,
    /// Plugins appended to the end of the plugin queue.
    pub plugins: Vec<PluginId>,
}

impl Contribution {
    /// Contribution carrying only presets.
    pub fn presets<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<PluginId>,
    {
        Self {
            presets: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Contribution carrying only plugins.
    pub fn plugins<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<PluginId>,
    {
        Self {
            plugins: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Factory contract for presets and plugins.
///
/// A factory observes and affects the orchestrator only through the
/// [`PluginApi`] it receives. Registrations persist after the factory
/// returns; the factory itself is dropped once initialization ends.
#[async_trait]
pub trait PluginFactory: Send + Sync {
    /// Register hooks and commands, optionally contributing further
    /// presets and plugins.
    async fn setup(&self, api: &mut PluginApi<'_>) -> anyhow::Result<Contribution>;
}

impl fmt::Debug for dyn PluginFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PluginFactory")
    }
}

/// A factory built from a synchronous setup function.
///
/// Most factories only register hooks and commands, so a plain closure
/// is enough:
///
/// ```ignore
/// RegistryResolver::new().with("minify", SetupFn(|api: &mut PluginApi<'_>| {
///     api.register_hook(keys::MODIFY_CONFIG, HookKind::Modify, |_memo, _args| async {
///         Ok(Some(serde_json::json!({ "minify": true })))
///     })?;
///     Ok(Contribution::default())
/// }));
/// ```
pub struct SetupFn<F>(pub F);

#[async_trait]
impl<F> PluginFactory for SetupFn<F>
where
    F: Fn(&mut PluginApi<'_>) -> anyhow::Result<Contribution> + Send + Sync,
{
    async fn setup(&self, api: &mut PluginApi<'_>) -> anyhow::Result<Contribution> {
        (self.0)(api)
    }
}

/// An identifier paired with its lazily resolved factory.
///
/// Owned by the orchestrator during initialization and dropped once the
/// queues drain; only registered hooks and commands outlive it.
pub struct PluginHandle {
    id: PluginId,
    factory: OnceLock<Arc<dyn PluginFactory>>,
}

impl PluginHandle {
    pub fn new(id: PluginId) -> Self {
        Self {
            id,
            factory: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &PluginId {
        &self.id
    }

    /// Resolve the factory, memoizing the result.
    pub fn factory(&self, resolver: &dyn PluginResolver) -> Result<Arc<dyn PluginFactory>> {
        if let Some(factory) = self.factory.get() {
            return Ok(factory.clone());
        }
        let factory = resolver.resolve(&self.id)?;
        let _ = self.factory.set(factory.clone());
        Ok(factory)
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("id", &self.id)
            .field("resolved", &self.factory.get().is_some())
            .finish()
    }
}
