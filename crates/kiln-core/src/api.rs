//! The capability-scoped API handed to each plugin factory.
//!
//! A fresh [`PluginApi`] is built per plugin initialization and never
//! shared across plugins, so every registration is attributed to its
//! owning plugin. The accessor set below is the whole surface a plugin
//! gets: it cannot reach orchestrator state outside it.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use kiln_config::Env;

use crate::command::Command;
use crate::core::Core;
use crate::hooks::HookKind;
use crate::plugin::PluginId;
use crate::Result;

/// Capability surface for one plugin.
///
/// Accessors read through to the orchestrator's *current* state, never
/// a snapshot: a `modifyConfig` hook registered early still observes
/// the user config loaded later in the run.
pub struct PluginApi<'core> {
    core: &'core mut Core,
    plugin: PluginId,
}

impl<'core> PluginApi<'core> {
    pub(crate) fn new(core: &'core mut Core, plugin: PluginId) -> Self {
        Self { core, plugin }
    }

    /// Identifier of the plugin this API belongs to.
    pub fn plugin_id(&self) -> &PluginId {
        &self.plugin
    }

    /// Working directory of the run.
    pub fn cwd(&self) -> &Path {
        self.core.cwd()
    }

    /// Build environment of the run.
    pub fn env(&self) -> Env {
        self.core.env()
    }

    /// Invocation argument bag of the current run.
    pub fn args(&self) -> &Value {
        self.core.args()
    }

    /// Raw user configuration, as loaded.
    pub fn user_config(&self) -> &Value {
        self.core.user_config()
    }

    /// Final configuration. Empty until the `modifyConfig` phase has
    /// resolved, then immutable for the rest of the run.
    pub fn config(&self) -> &Value {
        self.core.config()
    }

    /// Register a hook under an extension-point key.
    ///
    /// Fails when the key was already registered under a different
    /// [`HookKind`].
    pub fn register_hook<F, Fut>(&mut self, key: &str, kind: HookKind, f: F) -> Result<()>
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.core.hooks.register(
            self.plugin.clone(),
            key,
            kind,
            Arc::new(move |memo, args| Box::pin(f(memo, args))),
        )
    }

    /// Register a named command. The latest registration for a name
    /// wins.
    pub fn register_command<F, Fut>(&mut self, name: &str, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.core.commands.insert(Command {
            name: name.to_string(),
            plugin: self.plugin.clone(),
            f: Arc::new(move |args| Box::pin(f(args))),
        });
    }

    /// Apply the hooks registered under `key`, threading `initial`
    /// through them. Delegates to the orchestrator's waterfall applier.
    pub async fn apply_plugins(
        &self,
        key: &str,
        kind: HookKind,
        initial: Option<Value>,
        args: Value,
    ) -> Result<Value> {
        self.core.apply_plugins(key, kind, initial, args).await
    }
}
