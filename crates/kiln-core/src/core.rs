//! The orchestrator: discovery queues, phase sequencing, dispatch.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use kiln_config::{ConfigLoader, Env};

use crate::api::PluginApi;
use crate::command::CommandTable;
use crate::hooks::{keys, HookKind, HookRegistry};
use crate::plugin::{Contribution, PluginHandle, PluginId};
use crate::resolver::PluginResolver;
use crate::{CoreError, Result};

/// Options for constructing a [`Core`].
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Working directory of the run.
    pub cwd: PathBuf,
    /// Build environment.
    pub env: Env,
    /// Initial preset identifiers, expanded depth-first.
    pub presets: Vec<PluginId>,
    /// Initial plugin identifiers, initialized after every preset.
    pub plugins: Vec<PluginId>,
    /// Override for the config file candidate list.
    pub config_files: Option<Vec<String>>,
    /// Explicit config file, bypassing candidate search.
    pub config_path: Option<PathBuf>,
}

impl CoreOptions {
    pub fn new(cwd: impl Into<PathBuf>, env: Env) -> Self {
        Self {
            cwd: cwd.into(),
            env,
            presets: Vec::new(),
            plugins: Vec::new(),
            config_files: None,
            config_path: None,
        }
    }
}

/// Options for a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Command to dispatch once the phases complete.
    pub name: String,
    /// Argument bag handed to hooks and the command handler.
    pub args: Value,
}

impl RunOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Value::Object(Map::new()),
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }
}

/// Where a run currently stands.
///
/// Phases advance strictly in order; each is a barrier that must fully
/// resolve before the next begins. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Init,
    Check,
    Start,
    ModifyConfig,
    BuildStart,
    Dispatch,
    Done,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Init => "init",
            RunPhase::Check => "check",
            RunPhase::Start => "start",
            RunPhase::ModifyConfig => "modify-config",
            RunPhase::BuildStart => "build-start",
            RunPhase::Dispatch => "dispatch",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The orchestration core.
///
/// Owns the hook and command registries, the discovery queues, and the
/// configuration pair. Everything runs on one logical thread of
/// control: no two factories and no two hooks ever execute
/// concurrently, which is what makes registration order a meaningful
/// invariant.
pub struct Core {
    cwd: PathBuf,
    env: Env,
    resolver: Arc<dyn PluginResolver>,
    initial_presets: Vec<PluginId>,
    initial_plugins: Vec<PluginId>,
    config_files: Option<Vec<String>>,
    config_path: Option<PathBuf>,

    pub(crate) hooks: HookRegistry,
    pub(crate) commands: CommandTable,
    args: Value,
    user_config: Value,
    config: Value,
    resolved_plugins: Vec<PluginId>,
    phase: RunPhase,
}

impl Core {
    pub fn new(opts: CoreOptions, resolver: Arc<dyn PluginResolver>) -> Self {
        Self {
            cwd: opts.cwd,
            env: opts.env,
            resolver,
            initial_presets: opts.presets,
            initial_plugins: opts.plugins,
            config_files: opts.config_files,
            config_path: opts.config_path,
            hooks: HookRegistry::new(),
            commands: CommandTable::new(),
            args: Value::Object(Map::new()),
            user_config: Value::Object(Map::new()),
            config: Value::Object(Map::new()),
            resolved_plugins: Vec::new(),
            phase: RunPhase::Idle,
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn env(&self) -> Env {
        self.env
    }

    /// Argument bag of the current run.
    pub fn args(&self) -> &Value {
        &self.args
    }

    /// Raw user configuration, as loaded.
    pub fn user_config(&self) -> &Value {
        &self.user_config
    }

    /// Final configuration, produced once by the `modifyConfig` phase.
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Finalized plugin identifiers, in initialization order.
    pub fn resolved_plugins(&self) -> &[PluginId] {
        &self.resolved_plugins
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Drive a full run: load config, initialize presets and plugins,
    /// walk the lifecycle phases, dispatch the named command.
    ///
    /// Any failure is fatal: the run stops at the first error and
    /// phases not yet reached never execute.
    pub async fn run(&mut self, opts: RunOptions) -> Result<()> {
        let result = self.run_inner(opts).await;
        self.phase = match result {
            Ok(()) => RunPhase::Done,
            Err(_) => RunPhase::Failed,
        };
        result
    }

    async fn run_inner(&mut self, opts: RunOptions) -> Result<()> {
        self.phase = RunPhase::Init;
        self.args = opts.args;

        self.load_user_config()?;
        self.init_presets_and_plugins().await?;

        self.phase = RunPhase::Check;
        self.apply_plugins(keys::ON_CHECK, HookKind::Event, None, self.args.clone())
            .await?;

        self.phase = RunPhase::Start;
        self.apply_plugins(keys::ON_START, HookKind::Event, None, self.args.clone())
            .await?;

        self.phase = RunPhase::ModifyConfig;
        self.config = self
            .apply_plugins(
                keys::MODIFY_CONFIG,
                HookKind::Modify,
                Some(self.user_config.clone()),
                self.args.clone(),
            )
            .await?;
        debug!(config = %self.config, "final configuration resolved");

        self.phase = RunPhase::BuildStart;
        // Build-start listeners receive the final config as their
        // accumulator; event results are still ignored.
        self.apply_plugins(
            keys::ON_BUILD_START,
            HookKind::Event,
            Some(self.config.clone()),
            self.args.clone(),
        )
        .await?;

        self.phase = RunPhase::Dispatch;
        self.dispatch(&opts.name).await
    }

    fn load_user_config(&mut self) -> Result<()> {
        let mut loader = ConfigLoader::new(&self.cwd, self.env);
        if let Some(candidates) = &self.config_files {
            loader = loader.with_candidates(candidates.clone());
        }
        let loaded = match &self.config_path {
            Some(path) => loader.load_path(path)?,
            None => loader.load()?,
        };
        debug!(path = ?loaded.path, "user configuration loaded");
        self.user_config = loaded.config;
        Ok(())
    }

    /// Drain the discovery queues.
    ///
    /// Presets expand depth-first: a preset's contributed presets go to
    /// the front of the queue, ahead of its remaining siblings, and its
    /// contributed plugins append to the plugin queue. Plugins only
    /// initialize after the preset queue is fully drained, one at a
    /// time in queue order; their contributions are not expanded.
    async fn init_presets_and_plugins(&mut self) -> Result<()> {
        let mut presets: VecDeque<PluginId> = self.initial_presets.clone().into();
        let mut plugins: VecDeque<PluginId> = self.initial_plugins.clone().into();

        while let Some(id) = presets.pop_front() {
            debug!(preset = %id, "initializing preset");
            let contribution = self.init_plugin(&id).await?;
            for preset in contribution.presets.into_iter().rev() {
                presets.push_front(preset);
            }
            plugins.extend(contribution.plugins);
        }

        self.resolved_plugins = Vec::from(plugins);
        let finalized = self.resolved_plugins.clone();
        for id in &finalized {
            debug!(plugin = %id, "initializing plugin");
            let contribution = self.init_plugin(id).await?;
            if !contribution.presets.is_empty() || !contribution.plugins.is_empty() {
                warn!(plugin = %id, "contribution from a finalized plugin is not expanded");
            }
        }

        Ok(())
    }

    /// Resolve one identifier and run its factory through a fresh
    /// capability API.
    async fn init_plugin(&mut self, id: &PluginId) -> Result<Contribution> {
        let handle = PluginHandle::new(id.clone());
        let resolver = self.resolver.clone();
        let factory = handle.factory(resolver.as_ref())?;

        let mut api = PluginApi::new(self, id.clone());
        factory
            .setup(&mut api)
            .await
            .map_err(|source| CoreError::PluginInit {
                id: id.to_string(),
                source,
            })
    }

    /// Apply the hooks registered under `key`. See
    /// [`HookRegistry::apply`] for the waterfall semantics.
    pub async fn apply_plugins(
        &self,
        key: &str,
        kind: HookKind,
        initial: Option<Value>,
        args: Value,
    ) -> Result<Value> {
        self.hooks.apply(key, kind, initial, args).await
    }

    async fn dispatch(&mut self, name: &str) -> Result<()> {
        let handler = match self.commands.get(name) {
            Some(command) => command.f.clone(),
            None => return Err(CoreError::CommandNotFound(name.to_string())),
        };

        info!(command = name, "dispatching command");
        handler(self.args.clone())
            .await
            .map_err(|source| CoreError::Command {
                name: name.to_string(),
                source,
            })
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("phase", &self.phase)
            .field("resolved_plugins", &self.resolved_plugins)
            .field("commands", &self.commands.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::SetupFn;
    use crate::resolver::RegistryResolver;
    use serde_json::json;
    use tempfile::tempdir;

    fn command_plugin(
        name: &'static str,
    ) -> SetupFn<impl Fn(&mut PluginApi<'_>) -> anyhow::Result<Contribution> + Send + Sync> {
        SetupFn(move |api: &mut PluginApi<'_>| {
            api.register_command(name, |_args| async { Ok(()) });
            Ok(Contribution::default())
        })
    }

    #[tokio::test]
    async fn test_successful_run_reaches_done() {
        let dir = tempdir().unwrap();
        let resolver = RegistryResolver::new().with("base", command_plugin("build"));

        let mut opts = CoreOptions::new(dir.path(), Env::Development);
        opts.plugins.push("base".into());

        let mut core = Core::new(opts, Arc::new(resolver));
        assert_eq!(core.phase(), RunPhase::Idle);
        core.run(RunOptions::new("build")).await.unwrap();
        assert_eq!(core.phase(), RunPhase::Done);
    }

    #[tokio::test]
    async fn test_unknown_command_fails_run() {
        let dir = tempdir().unwrap();
        let resolver = RegistryResolver::new().with("base", command_plugin("build"));

        let mut opts = CoreOptions::new(dir.path(), Env::Development);
        opts.plugins.push("base".into());

        let mut core = Core::new(opts, Arc::new(resolver));
        let err = core.run(RunOptions::new("deploy")).await.unwrap_err();
        assert!(matches!(err, CoreError::CommandNotFound(name) if name == "deploy"));
        assert_eq!(core.phase(), RunPhase::Failed);
    }

    #[tokio::test]
    async fn test_unresolvable_preset_aborts_run() {
        let dir = tempdir().unwrap();
        let mut opts = CoreOptions::new(dir.path(), Env::Development);
        opts.presets.push("ghost".into());

        let mut core = Core::new(opts, Arc::new(RegistryResolver::new()));
        let err = core.run(RunOptions::new("build")).await.unwrap_err();
        assert!(matches!(err, CoreError::Resolution { .. }));
        assert_eq!(core.phase(), RunPhase::Failed);
    }

    #[tokio::test]
    async fn test_run_args_reach_command_handler() {
        let dir = tempdir().unwrap();
        let resolver = RegistryResolver::new().with(
            "base",
            SetupFn(|api: &mut PluginApi<'_>| {
                api.register_command("build", |args| async move {
                    anyhow::ensure!(args["watch"] == json!(true), "missing watch flag");
                    Ok(())
                });
                Ok(Contribution::default())
            }),
        );

        let mut opts = CoreOptions::new(dir.path(), Env::Development);
        opts.plugins.push("base".into());

        let mut core = Core::new(opts, Arc::new(resolver));
        core.run(RunOptions::new("build").with_args(json!({"watch": true})))
            .await
            .unwrap();
    }
}
