//! Orchestration core for Kiln
//!
//! This crate drives a build-tool run from configuration to command
//! dispatch:
//! - **Presets/Plugins**: units contributing hook and command
//!   registrations through a factory; presets additionally contribute
//!   further presets and plugins, expanded depth-first before any
//!   plugin initializes
//! - **Capability API**: the scoped surface a factory receives, with
//!   live accessors into orchestrator state and registration methods
//! - **Hooks**: named extension points applied as an ordered
//!   asynchronous waterfall
//! - **Phases**: the fixed `onCheck` → `onStart` → `modifyConfig` →
//!   `onBuildStart` sequence followed by command dispatch
//!
//! ## Run Shape
//!
//! ```text
//! Core::run
//! ├── load user config (kiln-config)
//! ├── drain preset queue (depth-first expansion)
//! ├── initialize finalized plugins, in order
//! ├── onCheck / onStart            (event hooks)
//! ├── modifyConfig                 (waterfall over user config)
//! ├── onBuildStart                 (event hooks)
//! └── dispatch requested command
//! ```

pub mod api;
pub mod command;
pub mod core;
pub mod hooks;
pub mod plugin;
pub mod resolver;

pub use api::PluginApi;
pub use command::{Command, CommandFn, CommandTable};
pub use self::core::{Core, CoreOptions, RunOptions, RunPhase};
pub use hooks::{keys, Hook, HookFn, HookKind, HookRegistry};
pub use plugin::{Contribution, PluginFactory, PluginHandle, PluginId, SetupFn};
pub use resolver::{PluginResolver, RegistryResolver};

pub use kiln_config::Env;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while orchestrating a run
///
/// Every variant is fatal: the run aborts on the first error and the
/// phases not yet reached never execute.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Plugin identifier could not be resolved to a factory
    #[error("failed to resolve plugin {id}: {reason}")]
    Resolution { id: String, reason: String },

    /// Plugin factory returned an error
    #[error("plugin {id} failed to initialize: {source}")]
    PluginInit {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A registered hook returned an error
    #[error("hook {key} registered by {plugin} failed: {source}")]
    Hook {
        key: String,
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    /// A key was registered or applied under conflicting kinds
    #[error("hook kind mismatch for {key}: registered as {registered}, requested {requested}")]
    KindMismatch {
        key: String,
        registered: HookKind,
        requested: HookKind,
    },

    /// Dispatch requested a command nobody registered
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// Command handler returned an error
    #[error("command {name} failed: {source}")]
    Command {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// User configuration could not be loaded
    #[error("config error: {0}")]
    Config(#[from] kiln_config::ConfigError),
}
