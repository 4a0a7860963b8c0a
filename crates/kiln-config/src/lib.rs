//! Configuration loading for Kiln.
//!
//! This crate locates and parses the user's `kiln.config.*` file for a
//! working directory, expands environment variables in it, and overlays
//! the environment-specific variant (`kiln.config.{env}.yaml`) over the
//! base file. The result is a loosely-typed [`serde_json::Value`] that
//! the orchestrator threads through its `modifyConfig` hooks.

pub mod env;
pub mod loader;
pub mod value;

pub use env::{load_dotenv, Env, EnvError};
pub use loader::{ConfigError, ConfigLoader, LoadedConfig, DEFAULT_CONFIG_FILES};
pub use value::shallow_merge;
